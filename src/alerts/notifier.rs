//! Outbound notification boundary.
//!
//! `send` is blocking; the outbox calls it from a blocking worker so the
//! monitor loop never waits on the network.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryReport {
    pub success: bool,
    /// HTTP status, when the channel got far enough to produce one.
    pub status: Option<u16>,
    /// Raw response body on failure, or the transport error.
    pub body: String,
}

impl DeliveryReport {
    pub fn delivered() -> Self {
        Self {
            success: true,
            status: None,
            body: String::new(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn send(&self, destination: &str, text: &str) -> DeliveryReport;
}

/// POSTs `{destination, text}` as JSON to a messaging endpoint.
///
/// Holds a blocking reqwest client: construct and drop it outside any async
/// context.
pub struct HttpNotifier {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .context("failed to build notification HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl Notifier for HttpNotifier {
    fn send(&self, destination: &str, text: &str) -> DeliveryReport {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "destination": destination, "text": text }))
            .send();

        match response {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    DeliveryReport {
                        success: true,
                        status: Some(status.as_u16()),
                        body: String::new(),
                    }
                } else {
                    DeliveryReport {
                        success: false,
                        status: Some(status.as_u16()),
                        body: resp.text().unwrap_or_default(),
                    }
                }
            }
            Err(err) => DeliveryReport {
                success: false,
                status: err.status().map(|s| s.as_u16()),
                body: err.to_string(),
            },
        }
    }
}

/// Writes alerts to the log. Used when no endpoint is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, destination: &str, text: &str) -> DeliveryReport {
        log::warn!("ALERT -> {destination}\n{text}");
        DeliveryReport::delivered()
    }
}
