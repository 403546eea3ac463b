use log::debug;
use reqwest::{Client, StatusCode};
use std::time::Instant;
use thiserror::Error;

use crate::config::ControllerConfig;
use crate::models::{ForwardPayload, Reading};

/// nodejs-poolController endpoint that accepts chemistry readings.
pub const CHEM_CONTROLLER_PATH: &str = "/config/chemController";

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("pool controller answered {0}")]
    Status(StatusCode),

    #[error("request to pool controller failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Pushes one reading per request to the pool controller.
#[derive(Debug, Clone)]
pub struct PoolController {
    client: Client,
    endpoint: String,
}

impl PoolController {
    pub fn new(config: &ControllerConfig) -> Result<Self, ForwardError> {
        // The controller lives on the local network
        let client = Client::builder()
            .timeout(config.timeout())
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}{}",
                config.base_url.trim_end_matches('/'),
                CHEM_CONTROLLER_PATH
            ),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Succeeds only on `200 OK`.
    pub async fn send(&self, sensor_key: &str, value: &Reading) -> Result<(), ForwardError> {
        let start = Instant::now();
        let payload = ForwardPayload::new(sensor_key, value);
        debug!("PUT {} {:?}", self.endpoint, payload);

        let response = self.client.put(&self.endpoint).json(&payload).send().await?;
        let status = response.status();

        debug!(
            "PUT {} answered {} in {} ms",
            self.endpoint,
            status,
            start.elapsed().as_millis()
        );

        match status {
            StatusCode::OK => Ok(()),
            other => Err(ForwardError::Status(other)),
        }
    }
}
