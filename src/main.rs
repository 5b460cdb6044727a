pub mod bridge;
pub mod config;
pub mod controller;
pub mod report;

use crate::bridge::BridgeHandle;
use crate::config::BridgeConfig;
use crate::report::REPORT_DESCRIPTOR;
use color_eyre::eyre::{Result, WrapErr};
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const PRINT_DESCRIPTOR_FLAG: &str = "--print-descriptor";

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let mut args = std::env::args().skip(1);
    let first = args.next();
    if first.as_deref() == Some(PRINT_DESCRIPTOR_FLAG) {
        return print_descriptor();
    }

    let config = BridgeConfig::load(first.map(PathBuf::from)).await?;
    setup_logging(config.level()?);
    debug!("Loaded configuration: {:?}", config);

    let shutdown = CancellationToken::new();
    let bridge =
        BridgeHandle::open(&config, shutdown.clone()).wrap_err("Failed to start the bridge")?;

    // Interrupt handling
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                debug!("Interrupt received, shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!("Unable to listen for interrupt: {}", e),
        }
    });

    bridge.wait().await.wrap_err("Bridge stopped")?;
    debug!("Clean shutdown");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
    info!("Logging initialized at {}", level);
}

fn print_descriptor() -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(REPORT_DESCRIPTOR)
        .and_then(|()| stdout.flush())
        .wrap_err("Failed to write report descriptor")?;
    Ok(())
}
