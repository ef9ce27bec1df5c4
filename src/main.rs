//! Command-line driver: parse a specification, build the decoder tree,
//! report unreachable rules, and write the generated source.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};

use decgen::config::Config;
use decgen::emit::emit;
use decgen::reach::unreachable_rules;
use decgen::spec::{parse_str, Specification, TristateBitArray};
use decgen::tree::build_tree;

/// decgen - binary-pattern decoder generator
#[derive(Parser, Debug)]
#[command(name = "decgen", version, about = "Generates C-family decoders from bit-pattern specifications")]
struct Args {
    /// Specification file
    spec: PathBuf,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the effective configuration back out as JSON
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Fix a context flag for the whole decoder: NAME, NAME=1, or NAME=0.
    /// May be given multiple times.
    #[arg(short = 'f', long = "flag")]
    flags: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log phase timings
    #[arg(long)]
    timings: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => Config::default(),
    };
    if args.verbose {
        config.verbose = true;
    }
    if args.timings {
        config.timings = true;
    }

    let level = if config.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    if let Some(path) = &args.save_config {
        config
            .save(path)
            .with_context(|| format!("saving configuration {}", path.display()))?;
        info!("configuration written to {}", path.display());
    }

    let source = fs::read_to_string(&args.spec)
        .with_context(|| format!("reading {}", args.spec.display()))?;

    let parse_started = Instant::now();
    let spec = match parse_str(&source, config.clone()) {
        Ok(spec) => spec,
        Err(err) => bail!("{}: {err}", args.spec.display()),
    };
    let parse_time = parse_started.elapsed();

    if spec.rules().is_empty() {
        bail!("{}: specification contains no rules", args.spec.display());
    }

    let fixed_flags = fixed_flags_from_args(&spec, &args.flags)?;

    let build_started = Instant::now();
    let tree = build_tree(&spec, fixed_flags.as_ref());
    let build_time = build_started.elapsed();

    for rule in unreachable_rules(&spec, &tree) {
        warn!(
            "rule at line {} can never match and was left out of the decoder",
            rule.line()
        );
    }

    let emit_started = Instant::now();
    let generated = emit(&spec, &tree)?;
    let emit_time = emit_started.elapsed();

    match &args.output {
        Some(path) => fs::write(path, &generated)
            .with_context(|| format!("writing {}", path.display()))?,
        None => print!("{generated}"),
    }

    if config.timings {
        info!(
            "parse {:.2?}, build {:.2?}, emit {:.2?}",
            parse_time, build_time, emit_time
        );
    }
    Ok(())
}

/// Turns `-f NAME[=0|1]` overrides into a fixed-flag tristate array.
fn fixed_flags_from_args(
    spec: &Specification,
    overrides: &[String],
) -> Result<Option<TristateBitArray>> {
    if overrides.is_empty() {
        return Ok(None);
    }
    let mut fixed = TristateBitArray::new(spec.num_flags());
    for item in overrides {
        let (name, value) = match item.split_once('=') {
            Some((name, "1")) => (name, true),
            Some((name, "0")) => (name, false),
            Some((_, other)) => bail!("flag value must be 0 or 1, got '{other}'"),
            None => (item.as_str(), true),
        };
        let flag = spec
            .flag_by_name(name)
            .with_context(|| format!("unknown flag '{name}'"))?;
        fixed.set_bit(flag.index(), value);
    }
    Ok(Some(fixed))
}
