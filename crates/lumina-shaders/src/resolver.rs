//! Include resolver
//!
//! Expands `#include <name>` directives into self-contained GLSL text. The
//! repeated form `#include <name> [N]` expands a template fragment `N` times,
//! substituting `{i}` with `0..N-1`. `N` may be a literal or the name of a
//! specialization macro such as `MORPHTARGETS`.
//!
//! Expansion is purely textual. `#if`/`#ifdef` blocks are left for the GPU
//! preprocessor.

use crate::registry::FragmentRegistry;
use lumina_core::{Result, ShaderError};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use tracing::trace;

/// Template marker replaced by the repetition index
pub const INDEX_MARKER: &str = "{i}";

/// Largest repetition count accepted from a literal or a macro
pub const MAX_REPEAT: usize = u16::MAX as usize;

/// Repetition count of an `#include <name> [N]` directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepeatCount {
    Literal(usize),
    /// Count taken from a define at resolution time
    Macro(String),
}

/// A parsed `#include` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub target: String,
    pub repeat: Option<RepeatCount>,
}

/// Parse one source line.
///
/// Returns `Ok(None)` for ordinary lines and an error for lines that start
/// with `#include` but do not follow either directive form.
pub fn parse_directive(fragment: &str, line_number: usize, line: &str) -> Result<Option<Directive>> {
    static INCLUDE_PREFIX: OnceLock<Regex> = OnceLock::new();
    static INCLUDE: OnceLock<Regex> = OnceLock::new();

    let prefix = INCLUDE_PREFIX
        .get_or_init(|| Regex::new(r"^\s*#\s*include\b").expect("invalid regex pattern"));
    if !prefix.is_match(line) {
        return Ok(None);
    }

    let include = INCLUDE.get_or_init(|| {
        Regex::new(r"^\s*#\s*include\s*<\s*([A-Za-z_][A-Za-z0-9_]*)\s*>\s*(?:\[\s*([A-Za-z0-9_]+)\s*\])?\s*$")
            .expect("invalid regex pattern")
    });
    let malformed = |reason: String| ShaderError::MalformedDirective {
        fragment: fragment.to_string(),
        line: line_number,
        reason,
    };

    let caps = include
        .captures(line)
        .ok_or_else(|| malformed(format!("expected '#include <name>' or '#include <name> [N]', found '{}'", line.trim())))?;

    let target = caps[1].to_string();
    let repeat = match caps.get(2).map(|m| m.as_str()) {
        None => None,
        Some(token) if token.bytes().all(|b| b.is_ascii_digit()) => {
            let count = token
                .parse::<usize>()
                .map_err(|e| malformed(format!("invalid repetition count '{}': {}", token, e)))?;
            if count > MAX_REPEAT {
                return Err(malformed(format!(
                    "repetition count {} exceeds {}",
                    count, MAX_REPEAT
                )));
            }
            Some(RepeatCount::Literal(count))
        }
        Some(token) if token.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') => {
            Some(RepeatCount::Macro(token.to_string()))
        }
        Some(token) => {
            return Err(malformed(format!("invalid repetition count '{}'", token)));
        }
    };

    Ok(Some(Directive { target, repeat }))
}

/// Result of resolving one source unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Fully expanded text
    pub text: String,
    /// Every fragment name pulled in, directly or transitively
    pub dependencies: BTreeSet<String>,
}

/// Expands include directives against a registry
pub struct IncludeResolver<'a> {
    registry: &'a FragmentRegistry,
    defines: Option<&'a BTreeMap<String, String>>,
}

impl<'a> IncludeResolver<'a> {
    pub fn new(registry: &'a FragmentRegistry) -> Self {
        Self {
            registry,
            defines: None,
        }
    }

    /// Resolve macro repetition counts against these define values
    pub fn with_defines(mut self, defines: &'a BTreeMap<String, String>) -> Self {
        self.defines = Some(defines);
        self
    }

    /// Resolve the registered fragment `name`
    pub fn resolve(&self, name: &str) -> Result<Resolved> {
        let mut out = String::new();
        let mut stack = Vec::new();
        let mut dependencies = BTreeSet::new();
        self.enter(name, None, &mut stack, &mut out, &mut dependencies)?;
        Ok(Resolved {
            text: out,
            dependencies,
        })
    }

    /// Resolve unregistered text; `origin` only labels diagnostics.
    pub fn resolve_text(&self, origin: &str, text: &str) -> Result<Resolved> {
        let mut out = String::with_capacity(text.len());
        let mut stack = Vec::new();
        let mut dependencies = BTreeSet::new();
        self.expand(origin, text, &mut stack, &mut out, &mut dependencies)?;
        Ok(Resolved {
            text: out,
            dependencies,
        })
    }

    fn enter(
        &self,
        name: &str,
        repeat: Option<usize>,
        stack: &mut Vec<String>,
        out: &mut String,
        dependencies: &mut BTreeSet<String>,
    ) -> Result<()> {
        if let Some(pos) = stack.iter().position(|n| n == name) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(ShaderError::CyclicInclude { cycle });
        }
        let text = self.registry.lookup(name)?;
        dependencies.insert(name.to_string());

        stack.push(name.to_string());
        match repeat {
            None => {
                self.expand(name, text, stack, out, dependencies)?;
                terminate_line(out);
            }
            Some(count) => {
                for i in 0..count {
                    let instance = text.replace(INDEX_MARKER, &i.to_string());
                    self.expand(name, &instance, stack, out, dependencies)?;
                    terminate_line(out);
                }
            }
        }
        stack.pop();
        Ok(())
    }

    fn expand(
        &self,
        fragment: &str,
        text: &str,
        stack: &mut Vec<String>,
        out: &mut String,
        dependencies: &mut BTreeSet<String>,
    ) -> Result<()> {
        for (index, line) in text.split_inclusive('\n').enumerate() {
            let content = line.trim_end_matches(['\n', '\r']);
            match parse_directive(fragment, index + 1, content)? {
                None => out.push_str(line),
                Some(directive) => {
                    let repeat = match directive.repeat {
                        None => None,
                        Some(RepeatCount::Literal(count)) => Some(count),
                        Some(RepeatCount::Macro(name)) => {
                            Some(self.macro_count(fragment, index + 1, &name)?)
                        }
                    };
                    self.enter(&directive.target, repeat, stack, out, dependencies)?;
                }
            }
        }
        Ok(())
    }

    fn macro_count(&self, fragment: &str, line: usize, name: &str) -> Result<usize> {
        let Some(value) = self.defines.and_then(|d| d.get(name)) else {
            // Repeats behind an undefined macro sit inside an #ifdef of the same
            // macro, so expanding nothing matches what the GPU compiles.
            trace!("Macro '{}' undefined in '{}', repeating zero times", name, fragment);
            return Ok(0);
        };
        let malformed = |reason: String| ShaderError::MalformedDirective {
            fragment: fragment.to_string(),
            line,
            reason,
        };
        let count = value.trim().parse::<usize>().map_err(|_| {
            malformed(format!("macro '{}' = '{}' is not a repetition count", name, value))
        })?;
        if count > MAX_REPEAT {
            return Err(malformed(format!(
                "macro '{}' = {} exceeds {} repetitions",
                name, count, MAX_REPEAT
            )));
        }
        Ok(count)
    }
}

fn terminate_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}
