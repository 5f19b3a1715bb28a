//! cadence: headless front end for the Cadence sequencer

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use commands::Length;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const USAGE: &str = "\
usage: cadence [--config <path>] <command>

commands:
  render <project.json> <out.wav> [--seconds <s> | --bars <n>]
  play <project.json> [--seconds <s> | --bars <n>]
  demo <out.json>
  info";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Render { project: PathBuf, out: PathBuf, length: Length },
    Play { project: PathBuf, length: Length },
    Demo { out: PathBuf },
    Info,
}

#[derive(Debug, Clone, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    command: Command,
}

fn parse_number(flag: &str, value: Option<String>) -> Result<f64> {
    let value = value.ok_or_else(|| anyhow!("{flag} needs a value"))?;
    let n: f64 = value.parse().map_err(|_| anyhow!("{flag}: not a number: {value}"))?;
    if !n.is_finite() || n <= 0.0 {
        bail!("{flag} must be positive");
    }
    Ok(n)
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut config = None;
    let mut length = Length::Auto;
    let mut positional = Vec::new();

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(args.next().ok_or_else(|| anyhow!("--config needs a path"))?)),
            "--seconds" => length = Length::Seconds(parse_number("--seconds", args.next())?),
            "--bars" => length = Length::Bars(parse_number("--bars", args.next())?),
            "-h" | "--help" => bail!("{USAGE}"),
            flag if flag.starts_with("--") => bail!("unknown option {flag}\n\n{USAGE}"),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let name = positional.next().ok_or_else(|| anyhow!("{USAGE}"))?;
    let mut path = |what: &str| positional.next().map(PathBuf::from).ok_or_else(|| anyhow!("{name}: missing {what}"));
    let command = match name.as_str() {
        "render" => Command::Render { project: path("project")?, out: path("output file")?, length },
        "play" => Command::Play { project: path("project")?, length },
        "demo" => Command::Demo { out: path("output file")? },
        "info" => Command::Info,
        other => bail!("unknown command {other}\n\n{USAGE}"),
    };
    Ok(Args { config, command })
}

fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    let config = config::load_config(args.config.as_deref())?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_filter))?;
    tracing_subscriber::registry().with(tracing_subscriber::fmt::layer()).with(filter).init();

    match args.command {
        Command::Render { project, out, length } => commands::render(&config, &project, &out, length),
        Command::Play { project, length } => commands::play(&config, &project, length),
        Command::Demo { out } => commands::demo(&config, &out),
        Command::Info => commands::info(&config),
    }
}
