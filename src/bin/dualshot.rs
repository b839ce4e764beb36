//! dualshot - capture two frames and upload them as one multipart request
//!
//! Subcommands:
//! - `upload`: one attempt, exits non-zero on failure
//! - `watch`: repeat attempts on an interval until Ctrl-C
//! - `parse-url`: show how a server URL is split into host, port and path

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use dualshot::{open_source, AppConfig, NetConnector, ServerTarget, TransportKind, Uploader};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Capture two camera frames and upload them as multipart/form-data"
)]
struct Args {
    /// Config file (TOML by extension, JSON otherwise).
    #[arg(long, global = true, env = "DUALSHOT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single capture-and-upload attempt.
    Upload {
        /// Seconds between the two captures (overrides config).
        #[arg(long)]
        delay: Option<u64>,
    },
    /// Run an attempt every interval until interrupted.
    Watch {
        /// Seconds between attempts.
        #[arg(long)]
        every: u64,

        /// Seconds between the two captures (overrides config).
        #[arg(long)]
        delay: Option<u64>,
    },
    /// Print the host, port, path and transport for a server URL.
    ParseUrl { url: String },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Some(path) = &args.config {
        std::env::set_var("DUALSHOT_CONFIG", path);
    }

    match args.command {
        Command::Upload { delay } => run_upload(delay),
        Command::Watch { every, delay } => run_watch(every, delay),
        Command::ParseUrl { url } => run_parse_url(&url),
    }
}

type AppUploader = Uploader<Box<dyn dualshot::FrameSource>, NetConnector>;

fn build_uploader(cfg: &AppConfig) -> Result<AppUploader> {
    let source = open_source(&cfg.source)?;
    log::info!("frame source: {}", source.describe());
    let connector = NetConnector::new(&cfg.transport)?;
    log::info!(
        "upload target: {} (tls verification: {})",
        cfg.target,
        cfg.transport.tls
    );
    Ok(Uploader::new(source, connector, cfg.upload_settings()))
}

fn run_upload(delay: Option<u64>) -> Result<()> {
    let cfg = AppConfig::load()?;
    let delay = delay.map(Duration::from_secs).unwrap_or(cfg.delay);
    let mut uploader = build_uploader(&cfg)?;

    match uploader.upload(delay) {
        Ok(report) => {
            log::info!(
                "upload complete in {:?}: {} bytes sent (frames {} + {} bytes)",
                report.elapsed,
                report.bytes_sent,
                report.frame_lens[0],
                report.frame_lens[1]
            );
            if let Some(status) = report.status_line() {
                println!("{}", status);
            }
            Ok(())
        }
        Err(err) => Err(anyhow!("upload failed during {}: {}", err.stage(), err)),
    }
}

fn run_watch(every: u64, delay: Option<u64>) -> Result<()> {
    if every == 0 {
        return Err(anyhow!("--every must be greater than zero"));
    }
    let cfg = AppConfig::load()?;
    let delay_seconds = delay.unwrap_or(cfg.delay.as_secs());
    let mut uploader = build_uploader(&cfg)?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("dualshot watching: one upload every {}s (Ctrl-C to stop)", every);
    loop {
        uploader.upload_and_log(delay_seconds);
        match rx.recv_timeout(Duration::from_secs(every)) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::info!("shutdown signal received, stopping");
    Ok(())
}

fn run_parse_url(url: &str) -> Result<()> {
    let target = ServerTarget::parse(url)?;
    println!("host: {}", target.host);
    println!("port: {}", target.port);
    println!("path: {}", target.path);
    println!("transport: {}", TransportKind::for_port(target.port));
    Ok(())
}
