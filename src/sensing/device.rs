//! Boundary towards a paired measurement device.
//!
//! Nothing in the crate talks to real hardware. A transport implements
//! [`DeviceLink`]; [`NotificationSource`] turns the text notifications it
//! yields into readings the engine can consume in place of the mock generator.

use std::{
    future::Future,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use super::ReadingSource;

/// BLE serial service exposed by the reference firmware.
pub const SERIAL_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb);
/// TX/RX characteristic inside [`SERIAL_SERVICE_UUID`].
pub const SERIAL_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb);

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: String,
    pub name: Option<String>,
}

pub trait DeviceLink: Send {
    fn discover(&mut self, service: Uuid) -> impl Future<Output = Result<DeviceInfo>> + Send;

    fn connect(&mut self, device: &DeviceInfo) -> impl Future<Output = Result<()>> + Send;

    /// Start notifications on `characteristic`; each message arrives as text.
    fn subscribe(
        &mut self,
        characteristic: Uuid,
    ) -> impl Future<Output = Result<mpsc::Receiver<String>>> + Send;

    fn disconnect(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Discover, connect and subscribe to the serial characteristic.
pub async fn pair<L: DeviceLink>(link: &mut L) -> Result<(DeviceInfo, mpsc::Receiver<String>)> {
    let device = link
        .discover(SERIAL_SERVICE_UUID)
        .await
        .context("device discovery failed")?;
    link.connect(&device)
        .await
        .with_context(|| format!("failed to connect to device {}", device.id))?;

    match link.subscribe(SERIAL_CHARACTERISTIC_UUID).await {
        Ok(messages) => {
            info!(
                "Paired with device {} ({})",
                device.id,
                device.name.as_deref().unwrap_or("unnamed")
            );
            Ok((device, messages))
        }
        Err(err) => {
            if let Err(disconnect_err) = link.disconnect().await {
                warn!("Disconnect after failed subscribe also failed: {disconnect_err:#}");
            }
            Err(err.context("failed to subscribe to notifications"))
        }
    }
}

/// Parse a notification such as `"12.34\r\n"` or `"12.34%"`.
pub fn parse_reading(message: &str) -> Option<f64> {
    let trimmed = message.trim().trim_end_matches('%').trim_end();
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Reading source fed by device notifications. Reads return the newest parsed
/// value, or `0.0` before the first one arrives.
pub struct NotificationSource {
    latest: Arc<Mutex<Option<f64>>>,
    task: JoinHandle<()>,
}

impl NotificationSource {
    pub fn spawn(mut messages: mpsc::Receiver<String>) -> Self {
        let latest = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&latest);

        let task = tokio::spawn(async move {
            while let Some(message) = messages.recv().await {
                match parse_reading(&message) {
                    Some(value) => {
                        let mut guard = match sink.lock() {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        *guard = Some(value);
                    }
                    None => warn!("Ignoring unparseable device message {message:?}"),
                }
            }
            info!("Device notification stream closed");
        });

        Self { latest, task }
    }

    pub fn latest(&self) -> Option<f64> {
        match self.latest.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl Drop for NotificationSource {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl ReadingSource for NotificationSource {
    fn read(&self, _filter_id: &str) -> f64 {
        self.latest().unwrap_or(0.0)
    }
}
