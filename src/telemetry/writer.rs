//! Background persistence for telemetry samples.
//!
//! The tick path only ever calls `try_send`, so a slow database never stalls
//! simulation. The writer batches whatever is queued into one transaction.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::models::TelemetrySample;
use crate::repositories::TelemetryStore;

const MAX_BATCH: usize = 256;

/// Create the queue feeding a [`SampleWriter`]
pub fn channel(
    store: Arc<dyn TelemetryStore>,
    capacity: usize,
) -> (mpsc::Sender<TelemetrySample>, SampleWriter) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, SampleWriter { store, rx })
}

pub struct SampleWriter {
    store: Arc<dyn TelemetryStore>,
    rx: mpsc::Receiver<TelemetrySample>,
}

impl SampleWriter {
    /// Write samples until cancelled or every sender is gone, then flush what is left
    pub async fn run(mut self, cancel: CancellationToken) {
        debug!("Telemetry writer started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = self.rx.recv() => match received {
                    Some(first) => {
                        let mut batch = vec![first];
                        while batch.len() < MAX_BATCH {
                            match self.rx.try_recv() {
                                Ok(sample) => batch.push(sample),
                                Err(_) => break,
                            }
                        }
                        self.write(&batch).await;
                    }
                    None => break,
                },
            }
        }

        self.rx.close();
        let mut remaining = Vec::new();
        while let Some(sample) = self.rx.recv().await {
            remaining.push(sample);
        }
        if !remaining.is_empty() {
            info!("Flushing {} queued telemetry samples", remaining.len());
            for chunk in remaining.chunks(MAX_BATCH) {
                self.write(chunk).await;
            }
        }
        debug!("Telemetry writer stopped");
    }

    async fn write(&self, batch: &[TelemetrySample]) {
        if let Err(e) = self.store.insert_samples(batch).await {
            error!("Failed to persist {} telemetry samples: {}", batch.len(), e);
        }
    }
}
