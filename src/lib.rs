pub mod bridge;
pub mod client;
pub mod collectors;
pub mod config;
pub mod models;

#[cfg(test)]
mod testing;

use crate::bridge::Bridge;
use crate::client::SystemPorts;
use crate::config::AppConfig;
use anyhow::Context;
use log::{error, info};
use std::sync::Arc;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    info!("Atlas USB sensor bridge starting");

    let bridge = Bridge::new(Arc::new(config), Arc::new(SystemPorts))
        .context("Failed to set up the sensor bridge")?;

    match bridge.run(shutdown_signal()).await {
        Ok(()) => info!("Sensor bridge stopped"),
        Err(e) => {
            let e = anyhow::Error::new(e);
            error!("Application error: {e:#}");
            // Print chain of error causes
            for cause in e.chain().skip(1) {
                error!("Caused by: {cause}");
            }
            return Err(e).context("Sensor bridge failed to run");
        }
    }

    Ok(())
}

/// Completes on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        // Without a signal handler the bridge runs until killed
        std::future::pending::<()>().await;
    }
}
