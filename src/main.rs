mod cli;

use spliceforge::{
    common::{AdMarker, EventBus, SignalEvent, ViewerContext},
    config,
    media::{
        manifest::{ManifestSegment, Period},
        scte35::{self, PacketOptions, SpliceCommand, SpliceInsert},
    },
    session::SessionManager,
};

use anyhow::{Context, Result};
use base64::Engine;
use clap::Parser;
use cli::{Cli, Commands, EncodeCommand, ManifestKind, OutputFormat};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "spliceforge=trace,spliceforge_media=debug,spliceforge_common=debug,reqwest=debug"
                .to_string()
        } else {
            "spliceforge=info,spliceforge_media=info,reqwest=warn".to_string()
        }
    });

    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Encode {
            command,
            format,
            section_only,
            pid,
        } => encode(command, format, section_only, pid, cli.config.as_deref()),
        Commands::Decode { input } => decode(&input),
        Commands::Simulate {
            markers,
            stream_id,
            until,
            step,
            segment_duration,
            manifest,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(simulate(
                &markers,
                &stream_id,
                until,
                step,
                segment_duration,
                manifest,
                cli.config.as_deref(),
            ))
        }
        Commands::Run {
            markers,
            stream_id,
            duration,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_live(&markers, &stream_id, duration, cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("spliceforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn seconds_arg(name: &str, secs: f64) -> Result<u64> {
    if !secs.is_finite() || secs < 0.0 {
        anyhow::bail!("--{} must be a non-negative number of seconds, got {}", name, secs);
    }
    Ok(scte35::seconds_to_pts(secs))
}

fn encode(
    command: EncodeCommand,
    format: OutputFormat,
    section_only: bool,
    pid: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let command = match command {
        EncodeCommand::SpliceInsert {
            event_id,
            pts,
            duration,
        } => {
            let duration = duration.map(|d| seconds_arg("duration", d)).transpose()?;
            let mut insert = match pts {
                Some(pts) => SpliceInsert::scheduled(event_id, seconds_arg("pts", pts)?, duration),
                None => SpliceInsert::immediate(event_id, duration),
            };
            insert.unique_program_id = config.scte35.unique_program_id;
            SpliceCommand::SpliceInsert(insert)
        }
        EncodeCommand::TimeSignal { pts } => SpliceCommand::TimeSignal {
            pts_time: seconds_arg("pts", pts)?,
        },
        EncodeCommand::Null => SpliceCommand::SpliceNull,
    };

    let bytes = if section_only {
        scte35::encode_section(&command, &[])?
    } else {
        let options = PacketOptions {
            pid: pid.unwrap_or(config.scte35.pid),
            continuity_counter: 0,
        };
        scte35::encode_with(&command, &[], &options)?
    };

    match format {
        OutputFormat::Hex => println!("{}", hex::encode(&bytes)),
        OutputFormat::Base64 => println!("{}", base64::engine::general_purpose::STANDARD.encode(&bytes)),
    }

    Ok(())
}

/// Hex when the input is an even run of hex digits, base64 otherwise.
fn parse_encoded(input: &str) -> Result<Vec<u8>> {
    let input = input.trim();
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let compact = compact.strip_prefix("0x").unwrap_or(compact.as_str());

    if compact.len() % 2 == 0 && compact.chars().all(|c| c.is_ascii_hexdigit()) {
        return hex::decode(compact).context("Invalid hex input");
    }

    base64::engine::general_purpose::STANDARD
        .decode(input)
        .context("Input is neither hex nor base64")
}

fn decode(input: &str) -> Result<()> {
    let bytes = parse_encoded(input)?;
    let section = scte35::decode_section(&bytes).context("Failed to decode SCTE-35 data")?;
    println!("{}", serde_json::to_string_pretty(&section)?);
    Ok(())
}

fn load_markers(path: &Path) -> Result<Vec<AdMarker>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read markers file: {:?}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse markers file: {:?}", path))
}

fn print_event(event: &spliceforge::common::Event) -> Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

async fn simulate(
    markers_path: &Path,
    stream_id: &str,
    until: f64,
    step: f64,
    segment_duration: f64,
    manifest: ManifestKind,
    config_path: Option<&Path>,
) -> Result<()> {
    if !(step > 0.0) || !step.is_finite() {
        anyhow::bail!("--step must be positive, got {}", step);
    }
    if !(until >= 0.0) || !until.is_finite() {
        anyhow::bail!("--until must be a non-negative number, got {}", until);
    }
    if !(segment_duration > 0.0) || !segment_duration.is_finite() {
        anyhow::bail!("--segment-duration must be positive, got {}", segment_duration);
    }

    let config = config::load_config_or_default(config_path)?;
    let markers = load_markers(markers_path)?;

    // Sized so the printer cannot lag behind the virtual clock.
    let capacity = config.events.capacity.max(markers.len() * 4 + 16);
    let bus = Arc::new(EventBus::new(capacity));
    let mut rx = bus.subscribe();

    let manager = SessionManager::from_config(&config, Arc::clone(&bus));
    manager.open(stream_id, markers, ViewerContext::default())?;

    tracing::info!(stream_id = %stream_id, until, step, "Simulating stream");

    let mut decisions_expected = 0;
    let ticks = (until / step).floor() as u64;
    for i in 0..=ticks {
        let report = manager.tick_at(stream_id, i as f64 * step)?;
        decisions_expected += report.announced;
    }

    // Wait for the spawned ad decisions, printing events as they arrive.
    let deadline = config.ad_decision.timeout() + Duration::from_secs(1);
    let mut decisions_seen = 0;
    while decisions_seen < decisions_expected {
        match tokio::time::timeout(deadline, rx.recv()).await {
            Ok(Ok(event)) => {
                if matches!(event.payload, SignalEvent::AdDecisionResolved { .. }) {
                    decisions_seen += 1;
                }
                print_event(&event)?;
            }
            Ok(Err(e)) => anyhow::bail!("Event stream failed: {}", e),
            Err(_) => {
                tracing::warn!(
                    pending = decisions_expected - decisions_seen,
                    "Gave up waiting for ad decisions"
                );
                break;
            }
        }
    }

    let text = match manifest {
        ManifestKind::Hls => {
            let count = (until / segment_duration).ceil().max(1.0) as u64;
            let segments = ManifestSegment::uniform(count, 0.0, segment_duration, "segment");
            Some(manager.render_hls(stream_id, &segments)?.text)
        }
        ManifestKind::Dash => {
            let period = Period::new("p0", 0.0, until.max(segment_duration));
            Some(manager.render_dash(stream_id, &[period])?.text)
        }
        ManifestKind::Off => None,
    };

    manager.stop(stream_id)?;
    while let Ok(event) = rx.try_recv() {
        print_event(&event)?;
    }

    if let Some(text) = text {
        print!("{}", text);
    }

    Ok(())
}

async fn run_live(
    markers_path: &Path,
    stream_id: &str,
    duration: Option<u64>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let markers = load_markers(markers_path)?;

    let bus = Arc::new(EventBus::new(config.events.capacity));
    let mut events = BroadcastStream::new(bus.subscribe());

    let manager = SessionManager::from_config(&config, Arc::clone(&bus));
    manager.start(stream_id, markers, ViewerContext::default())?;

    let stop_after = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(stop_after);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down...");
                break;
            }
            _ = &mut stop_after => break,
            next = events.next() => match next {
                Some(Ok(event)) => print_event(&event)?,
                Some(Err(e)) => tracing::warn!(error = %e, "Event stream lagged"),
                None => break,
            },
        }
    }

    let report = manager.stop(stream_id)?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  SCTE-35 PID: {:#06x}", config.scte35.pid);
            println!("  Tick interval: {} ms", config.scheduler.tick_interval_ms);
            println!(
                "  Ad decisions: {:?} (timeout {} ms)",
                config.ad_decision.strategy, config.ad_decision.timeout_ms
            );
            println!("  Fallback decisions: {}", config.ad_decision.fallbacks.len());
            println!("  Tracking enabled: {}", config.ad_decision.tracking_enabled);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  SCTE-35 PID: {:#06x}", config.scte35.pid);
            println!("  Tick interval: {} ms", config.scheduler.tick_interval_ms);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_encoded_accepts_hex_and_base64() {
        assert_eq!(parse_encoded("fc30").unwrap(), vec![0xFC, 0x30]);
        assert_eq!(parse_encoded("0xFC30").unwrap(), vec![0xFC, 0x30]);
        assert_eq!(parse_encoded("/DA=").unwrap(), vec![0xFC, 0x30]);
        assert!(parse_encoded("not encoded!").is_err());
    }
}
