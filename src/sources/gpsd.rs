//! GPSd stream consumer
//!
//! Connects to gpsd, enables JSON watch mode and merges every report into the
//! status store, keyed by its lowercased `class`. The consumer runs until it
//! is stopped through its [`GpsdHandle`]; a closed or failed stream is
//! reconnected with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::calculate_backoff;
use crate::controller::metrics;
use crate::error::{Error, Result};
use crate::status::StatusStore;

pub const DEFAULT_GPSD_HOST: &str = "127.0.0.1";
pub const DEFAULT_GPSD_PORT: u16 = 2947;

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true}\n";

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// GPSd stream consumer feeding the status store
pub struct GpsdSource {
    endpoint: String,
    store: Arc<StatusStore>,
    base_delay: Duration,
    max_delay: Duration,
}

impl GpsdSource {
    pub fn new(endpoint: impl Into<String>, store: Arc<StatusStore>) -> Self {
        Self {
            endpoint: endpoint.into(),
            store,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Override the reconnect backoff bounds
    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Start consuming on the current runtime
    pub fn spawn(self) -> GpsdHandle {
        let (shutdown, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        GpsdHandle { shutdown, task }
    }

    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;

        info!("Starting GPSd consumer for {}", self.endpoint);

        loop {
            let mut reports: u64 = 0;

            let outcome = tokio::select! {
                _ = stop_rx.changed() => break,
                outcome = self.consume(&mut reports) => outcome,
            };

            match outcome {
                Ok(()) => warn!(
                    "GPSd stream at {} closed after {} reports",
                    self.endpoint, reports
                ),
                Err(e) => warn!(
                    "GPSd stream at {} failed after {} reports: {}",
                    self.endpoint, reports, e
                ),
            }

            if reports > 0 {
                attempt = 0;
            }

            let delay = calculate_backoff(attempt, self.base_delay, self.max_delay);
            attempt = attempt.saturating_add(1);

            info!("Reconnecting to GPSd at {} in {:?}", self.endpoint, delay);

            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("GPSd consumer for {} stopped", self.endpoint);
    }

    /// Consume one connection until the stream ends
    async fn consume(&self, reports: &mut u64) -> Result<()> {
        let stream = TcpStream::connect(&self.endpoint).await?;
        info!("Connected to GPSd at {}", self.endpoint);

        let (reader, mut writer) = stream.into_split();
        writer.write_all(WATCH_COMMAND).await?;

        // Read raw bytes; lines that are not UTF-8 are skipped like other bad records
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                break;
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match handle_report(&self.store, &line) {
                Ok(class) => {
                    *reports += 1;
                    metrics::inc_gpsd_reports(&class);
                    debug!(
                        "Received update from GPSd: {}",
                        String::from_utf8_lossy(&line).trim_end()
                    );
                }
                Err(e) => warn!("Skipping GPSd record: {}", e),
            }
        }

        Ok(())
    }
}

/// Stop handle of a running [`GpsdSource`]
///
/// Dropping the handle stops the consumer as well.
pub struct GpsdHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl GpsdHandle {
    /// Signal the consumer to stop and wait for it to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("GPSd consumer task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Merge one JSON report line into the store
///
/// Returns the lowercased class the report was stored under.
pub fn handle_report(store: &StatusStore, line: impl AsRef<[u8]>) -> Result<String> {
    let line = line.as_ref();
    let record: serde_json::Value = serde_json::from_slice(line)?;

    let class = record
        .get("class")
        .and_then(|class| class.as_str())
        .map(str::to_lowercase)
        .ok_or_else(|| {
            Error::GpsdError(format!(
                "record without class: {}",
                String::from_utf8_lossy(line).trim_end()
            ))
        })?;

    store.merge_gpsd(class.clone(), record);
    Ok(class)
}
