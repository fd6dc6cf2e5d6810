//! Replays recorded face-tracking traces through the virtual try-on pipeline.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use virtual_try_on::{
    app::{ReplayApp, Trace},
    config::{TryOnConfig, EXAMPLE_CONFIG},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML trace of recorded detector output
    #[arg(short, long, required_unless_present = "dump_config")]
    trace: Option<String>,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<String>,

    /// Frame-width slider value (overrides the trace)
    #[arg(short, long)]
    frame_width: Option<f64>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Print an example configuration and exit
    #[arg(long)]
    dump_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.dump_config {
        print!("{EXAMPLE_CONFIG}");
        return Ok(());
    }

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    info!("Virtual try-on trace replay");

    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {path}");
            TryOnConfig::from_file(path).with_context(|| format!("loading config {path}"))?
        }
        None => TryOnConfig::default(),
    };

    let trace_path = args.trace.context("--trace is required")?;
    let trace = Trace::from_file(&trace_path).with_context(|| format!("loading trace {trace_path}"))?;

    let mut app = ReplayApp::new(&config, trace)?;
    if let Some(value) = args.frame_width {
        app.set_frame_width(value);
    }
    for report in app.run()? {
        println!("{report}");
    }

    Ok(())
}
