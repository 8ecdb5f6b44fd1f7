use anyhow::{bail, Context};
use lumina::{init_logging, HeadlessBackend, ShaderConfig, ShaderContext, BUILD_DATE, VERSION};
use std::path::PathBuf;

const USAGE: &str = "usage: lumina [--config <file>] <program> [ambient dir point spot textures]";

/// Parsed command line
#[derive(Debug, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    program: String,
    /// ambient, directional, point, spot, textures
    counts: [usize; 5],
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut config = None;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter.next().context("--config needs a file")?;
                config = Some(PathBuf::from(path));
            }
            flag if flag.starts_with('-') => bail!("unknown option {}\n{}", flag, USAGE),
            _ => positional.push(arg.as_str()),
        }
    }

    let Some((program, counts)) = positional.split_first() else {
        bail!("{}", USAGE);
    };
    if counts.len() > 5 {
        bail!("too many counts\n{}", USAGE);
    }
    let mut parsed = [0usize; 5];
    for (slot, value) in parsed.iter_mut().zip(counts) {
        *slot = value
            .parse()
            .with_context(|| format!("'{}' is not a count", value))?;
    }

    Ok(Args {
        config,
        program: program.to_string(),
        counts: parsed,
    })
}

fn main() -> anyhow::Result<()> {
    init_logging()?;
    tracing::debug!("lumina {} ({})", VERSION, BUILD_DATE);

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&argv)?;

    let config = match &args.config {
        Some(path) => ShaderConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ShaderConfig::default(),
    };

    let mut context = ShaderContext::new(HeadlessBackend::new(), config)?;
    let [ambient, directional, point, spot, textures] = args.counts;
    let builder = context
        .key(&args.program)?
        .ambient(ambient)
        .directional(directional)
        .point(point)
        .spot(spot)
        .textures(textures);
    let key = context.build_key(builder)?;

    let assembled = context.assemble(&key)?;
    for (stage, source) in &assembled.stages {
        println!("// ---- {} stage: {}", stage, key);
        print!("{}", source);
    }

    context.get_program(&key)?;
    tracing::info!("{} compiled and linked", key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_program_and_counts() {
        let args = parse_args(&strings(&["--config", "lumina.toml", "standard", "1", "2"])).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("lumina.toml")));
        assert_eq!(args.program, "standard");
        assert_eq!(args.counts, [1, 2, 0, 0, 0]);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_args(&[]).is_err());
        assert!(parse_args(&strings(&["standard", "many"])).is_err());
        assert!(parse_args(&strings(&["--verbose", "standard"])).is_err());
        assert!(parse_args(&strings(&["standard", "1", "1", "1", "1", "1", "1"])).is_err());
    }
}
