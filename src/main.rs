use anyhow::{bail, Context};
use std::path::PathBuf;
use stencilforge::{generate_stencil, init_logging, CancelFlag, StencilConfig, BUILD_DATE, VERSION};

const USAGE: &str = "usage: stencilforge <input_dir> <output.stl> [--config <file.json|file.toml>] [--trace <trace.json>]";

#[derive(Debug, Default)]
struct Args {
    input_dir: PathBuf,
    output: PathBuf,
    config: Option<PathBuf>,
    trace: Option<PathBuf>,
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut positional = Vec::new();
    let mut args = Args::default();
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--config" => args.config = Some(raw.next().context("--config needs a file")?.into()),
            "--trace" => args.trace = Some(raw.next().context("--trace needs a file")?.into()),
            "-h" | "--help" => bail!("{USAGE}"),
            "-V" | "--version" => bail!("stencilforge {VERSION} ({BUILD_DATE})"),
            flag if flag.starts_with("--") => bail!("unknown option {flag}\n{USAGE}"),
            _ => positional.push(PathBuf::from(arg)),
        }
    }
    let [input_dir, output] = <[PathBuf; 2]>::try_from(positional).map_err(|_| anyhow::anyhow!("{USAGE}"))?;
    args.input_dir = input_dir;
    args.output = output;
    Ok(args)
}

fn main() -> anyhow::Result<()> {
    init_logging()?;
    let args = parse_args(std::env::args().skip(1))?;

    let config = match &args.config {
        Some(path) => StencilConfig::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => StencilConfig::default(),
    };

    let trace = generate_stencil(&args.input_dir, &args.output, &config, &CancelFlag::new())
        .with_context(|| format!("failed to generate stencil from {}", args.input_dir.display()))?;

    if let Some(path) = &args.trace {
        std::fs::write(path, trace.to_json()?)
            .with_context(|| format!("failed to write trace {}", path.display()))?;
    }

    println!("Stencil written to {}", args.output.display());
    println!("  paste layers: {}", trace.paste_files.join(", "));
    println!(
        "  outline:      {}",
        trace.outline_file.as_deref().unwrap_or("paste bounding box")
    );
    if let Some(mesh) = &trace.mesh {
        println!(
            "  mesh:         {} faces, watertight={}, rebuild={:?}",
            mesh.faces, mesh.watertight, mesh.rebuild
        );
    }
    println!("  stl:          {} bytes, {} faces", trace.stl_bytes, trace.stl_faces);
    for d in &trace.degradations {
        println!("  degraded:     {} ({})", d.stage, d.reason);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> anyhow::Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["gerbers", "out.stl", "--config", "cfg.toml"]).unwrap();
        assert_eq!(parsed.input_dir, PathBuf::from("gerbers"));
        assert_eq!(parsed.output, PathBuf::from("out.stl"));
        assert_eq!(parsed.config, Some(PathBuf::from("cfg.toml")));
        assert!(parsed.trace.is_none());
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(args(&["only_one"]).is_err());
        assert!(args(&["a", "b", "--config"]).is_err());
        assert!(args(&["a", "b", "--bogus"]).is_err());
    }
}
