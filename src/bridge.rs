use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::MissedTickBehavior;

use crate::client::{EzoReader, ForwardError, PoolController, PortOpener, ReadError};
use crate::collectors::find_usb_devices;
use crate::config::{AppConfig, SensorConfig};
use crate::models::Reading;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no USB serial devices found under {0}")]
    NoDevices(String),

    #[error("failed to set up the pool controller client: {0}")]
    Controller(#[from] ForwardError),
}

#[derive(Debug)]
pub enum Outcome {
    Forwarded(Reading),
    NotForwarded(Reading, ForwardError),
    ReadFailed(ReadError),
}

/// What happened to one sensor during one cycle.
#[derive(Debug)]
pub struct SensorReport {
    pub key: String,
    pub label: String,
    pub taken_at: DateTime<Local>,
    pub outcome: Outcome,
}

impl SensorReport {
    pub fn status_line(&self) -> String {
        match &self.outcome {
            Outcome::Forwarded(reading) | Outcome::NotForwarded(reading, _) => {
                format!("[{}] {}", self.label, reading)
            }
            Outcome::ReadFailed(_) => format!("[{}] Failed to read", self.label),
        }
    }

    /// Status line prefixed with the local time of the attempt.
    pub fn summary(&self) -> String {
        format!("{} {}", self.taken_at.format("%H:%M:%S"), self.status_line())
    }
}

/// Reads every configured sensor in order and forwards each reading.
pub struct Bridge {
    config: Arc<AppConfig>,
    reader: EzoReader,
    controller: PoolController,
}

impl Bridge {
    pub fn new(config: Arc<AppConfig>, opener: Arc<dyn PortOpener>) -> Result<Self, BridgeError> {
        let reader = EzoReader::new(opener, config.serial.clone());
        let controller = PoolController::new(&config.controller)?;

        Ok(Self {
            config,
            reader,
            controller,
        })
    }

    /// Startup guard. The configured ports are polled whether or not they
    /// appear in this list.
    pub fn check_devices(&self) -> Result<Vec<String>, BridgeError> {
        let dev_dir = &self.config.serial.dev_dir;
        let devices = find_usb_devices(dev_dir);

        if devices.is_empty() {
            error!("No USB serial devices found!");
            error!("Check: ls {0}/ttyUSB* {0}/ttyACM*", dev_dir.trim_end_matches('/'));
            return Err(BridgeError::NoDevices(dev_dir.clone()));
        }

        info!("Found USB devices: {:?}", devices);
        Ok(devices)
    }

    /// One pass over the sensor table. Failures are logged and reported,
    /// never retried.
    pub async fn poll_once(&self) -> Vec<SensorReport> {
        let mut reports = Vec::with_capacity(self.config.sensors.len());

        for sensor in &self.config.sensors {
            let outcome = match self.read_sensor(sensor).await {
                Ok(reading) => {
                    info!("[{}] {}", sensor.label, reading);
                    match self.controller.send(&sensor.key, &reading).await {
                        Ok(()) => Outcome::Forwarded(reading),
                        Err(e) => {
                            warn!("[{}] Failed to forward: {}", sensor.label, e);
                            Outcome::NotForwarded(reading, e)
                        }
                    }
                }
                Err(e) => {
                    warn!("[{}] Failed to read: {}", sensor.label, e);
                    Outcome::ReadFailed(e)
                }
            };

            reports.push(SensorReport {
                key: sensor.key.clone(),
                label: sensor.label.clone(),
                taken_at: Local::now(),
                outcome,
            });
        }

        reports
    }

    async fn read_sensor(&self, sensor: &SensorConfig) -> Result<Reading, ReadError> {
        let reader = self.reader.clone();
        let port = sensor.port.clone();
        let label = sensor.label.clone();

        tokio::task::spawn_blocking(move || reader.read(&port, &label))
            .await
            .unwrap_or_else(|e| Err(ReadError::Task(e.to_string())))
    }

    /// Checks for devices, then polls until `shutdown` completes. The full
    /// interval elapses after each cycle finishes, so a slow cycle does not
    /// shorten the wait. Shutdown is observed between cycles.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), BridgeError>
    where
        F: Future<Output = ()>,
    {
        self.check_devices()?;

        let mut interval = tokio::time::interval(self.config.polling.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut cycles: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping after {} cycles", cycles);
                    return Ok(());
                }
                _ = interval.tick() => {
                    cycles += 1;
                    let reports = self.poll_once().await;
                    // Next tick is one full interval after this cycle ends
                    interval.reset();

                    let forwarded = reports
                        .iter()
                        .filter(|r| matches!(r.outcome, Outcome::Forwarded(_)))
                        .count();
                    for report in &reports {
                        debug!("Cycle {}: {}", cycles, report.summary());
                    }
                    debug!("Cycle {} forwarded {}/{} readings", cycles, forwarded, reports.len());
                }
            }
        }
    }
}
