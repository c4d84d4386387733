mod detect;
mod report;
mod simulate;
mod stream;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::BufReader;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stream::{SampleStream, StreamError, Summary};

#[derive(Parser)]
#[command(name = "forcegauge")]
#[command(about = "Host companion for the force gauge firmware")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read the sample stream from the gauge's debug HID node or a capture file
    Monitor {
        /// Debug interface hidraw node (e.g. /dev/hidraw3) or capture file
        path: String,
        /// Stop after this many samples
        #[arg(long)]
        limit: Option<u64>,
        /// Only print the summary
        #[arg(long)]
        quiet: bool,
    },
    /// Run the sampling pipeline on the host and report dropped samples
    Simulate {
        /// Number of conversions to produce
        #[arg(long, default_value_t = 5000)]
        samples: u16,
        /// Microseconds between conversions
        #[arg(long, default_value_t = 100)]
        produce_every_us: u64,
        /// Microseconds per main-loop pass
        #[arg(long, default_value_t = 10_000)]
        consume_every_us: u64,
    },
    /// Show the 8 bytes sent for a key state
    Report {
        /// Modifier bitmask (1=LCtrl, 2=LShift, ... 128=RGui)
        #[arg(long, default_value = "0", value_parser = report::parse_byte)]
        modifiers: u8,
        /// HID key codes, decimal or 0x-prefixed hex (at most 6)
        #[arg(value_parser = report::parse_byte)]
        keys: Vec<u8>,
    },
    /// Check whether a force gauge is attached over USB
    Detect,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("forcegauge={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Command::Monitor { path, limit, quiet } => monitor(&path, limit, quiet)?,
        Command::Simulate {
            samples,
            produce_every_us,
            consume_every_us,
        } => {
            let config = simulate::SimConfig {
                samples,
                produce_every: Duration::from_micros(produce_every_us),
                consume_every: Duration::from_micros(consume_every_us),
            };

            let pb = ProgressBar::new(u64::from(samples));
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} samples")
                    .context("building progress bar template")?
                    .progress_chars("=> "),
            );
            pb.set_message("Sampling");

            let outcome = simulate::run(&config, &pb);
            pb.finish_with_message("Done");

            println!(
                "Produced {}, delivered {}, dropped {} ({:.1}%)",
                outcome.produced,
                outcome.delivered,
                outcome.dropped,
                100.0 * f64::from(outcome.dropped) / f64::from(outcome.produced.max(1))
            );
            if !outcome.in_order {
                bail!("samples were delivered out of order");
            }
        }
        Command::Report { modifiers, keys } => {
            let bytes = report::assemble(modifiers, &keys)?;
            println!("{}", report::format_bytes(&bytes));
        }
        Command::Detect => {
            let found = detect::detect()?;
            if found.is_empty() {
                println!(
                    "No force gauge detected (looking for {:04X}:{:04X}).",
                    detect::GAUGE_VID,
                    detect::GAUGE_PID
                );
            }
            for gauge in found {
                println!(
                    "Force gauge on bus {:03} address {:03}: {}",
                    gauge.bus,
                    gauge.address,
                    gauge.product.as_deref().unwrap_or("<unreadable>")
                );
            }
        }
    }

    Ok(())
}

fn monitor(path: &str, limit: Option<u64>, quiet: bool) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path))?;
    let mut summary = Summary::default();

    for item in SampleStream::new(BufReader::new(file)) {
        match item {
            Ok(sample) => {
                summary.record(sample);
                if !quiet {
                    println!("{sample}");
                }
            }
            Err(StreamError::InvalidSample { token, offset }) => {
                warn!(%token, offset, "skipping malformed sample");
            }
            Err(e) => return Err(e).with_context(|| format!("reading {}", path)),
        }

        if limit.is_some_and(|n| summary.count >= n) {
            break;
        }
    }

    println!("{summary}");
    Ok(())
}
