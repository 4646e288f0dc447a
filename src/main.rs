mod countdown;
mod diagnostics;
mod time_source;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use chrono_tz::Tz;
use clap::Parser;
use serde_json::Value;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::countdown::config::{CountdownConfig, load_countdown_config};
use crate::countdown::engine::{CountdownEngine, DEFAULT_DISPLAY_TZ, EngineSettings, TickResult};
use crate::countdown::resolver::TargetResolver;
use crate::time_source::{SelectedTimeSource, select_time_source};

#[derive(Parser, Debug)]
#[command(
    name = "countdown-kiosk",
    version,
    about = "Countdown display state for a kiosk clock"
)]
struct Cli {
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// IANA zone used for daily times and offset-less instants.
    #[arg(long)]
    timezone: Option<String>,

    /// Freeze the clock at this ISO-8601 instant.
    #[arg(long)]
    at: Option<String>,

    #[arg(long)]
    watch: bool,

    #[arg(long, default_value_t = 1_000)]
    interval_ms: u64,

    /// Stop watching after this many ticks.
    #[arg(long)]
    count: Option<u64>,

    #[arg(long)]
    pretty: bool,

    /// Validate the config file and exit.
    #[arg(long)]
    check: bool,

    #[arg(long)]
    diagnostics: bool,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "countdown_kiosk=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    if cli.interval_ms == 0 {
        bail!("--interval-ms must be greater than zero");
    }

    if cli.check {
        let config = load_countdown_config(&cli.config)
            .with_context(|| format!("failed to load {}", cli.config.display()))?;
        config
            .validate()
            .with_context(|| format!("{} is not a valid countdown config", cli.config.display()))?;
        println!("config ok");
        return Ok(());
    }

    let display_tz = match cli.timezone.as_deref() {
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| anyhow!("unknown time zone '{name}'"))?,
        None => DEFAULT_DISPLAY_TZ,
    };

    let frozen_at_ms = match cli.at.as_deref() {
        Some(text) => Some(
            TargetResolver::new(display_tz)
                .iso_to_ms(text)
                .ok_or_else(|| anyhow!("--at '{text}' is not a valid ISO-8601 instant"))?,
        ),
        None => None,
    };

    let SelectedTimeSource {
        source,
        label,
        detail,
    } = select_time_source(frozen_at_ms);
    let settings = EngineSettings {
        display_tz,
        ..EngineSettings::default()
    };

    let engine = CountdownEngine::new(settings, source);

    if cli.diagnostics || !cli.watch {
        let config = load_countdown_config(&cli.config)
            .with_context(|| format!("failed to load {}", cli.config.display()))?;
        if cli.diagnostics {
            diagnostics::run_diagnostics(label, detail.as_deref(), &engine, &config, &cli.config);
            return Ok(());
        }
        return print_tick(&engine.tick(&config), cli.pretty);
    }

    let interval = Duration::from_millis(cli.interval_ms);
    let mut deadline = Instant::now();
    let mut ticks = 0_u64;
    loop {
        let config = load_countdown_config(&cli.config).unwrap_or_else(|err| {
            warn!(path = %cli.config.display(), "config unavailable: {err:#}");
            CountdownConfig::from_value(&Value::Null)
        });
        print_tick(&engine.tick(&config), cli.pretty)?;

        ticks += 1;
        if cli.count.is_some_and(|count| ticks >= count) {
            return Ok(());
        }

        deadline += interval;
        let now = Instant::now();
        if deadline < now {
            deadline = now;
        }
        diagnostics::sleep_until(deadline);
    }
}

fn print_tick(result: &TickResult, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(result)
    } else {
        serde_json::to_string(result)
    }
    .context("failed to serialize tick result")?;
    println!("{json}");
    Ok(())
}
