//! Audit background worker
//!
//! Drains the activity channel into the sink. Stops when every sender is
//! dropped, or on shutdown after writing what is still queued.

use super::service::ActivitySink;
use super::types::Activity;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct AuditWorker {
    sink: Arc<dyn ActivitySink>,
}

impl AuditWorker {
    pub fn new(sink: Arc<dyn ActivitySink>) -> Self {
        Self { sink }
    }

    pub async fn run(self, mut rx: mpsc::Receiver<Activity>, shutdown: CancellationToken) {
        tracing::info!("Audit worker started");

        loop {
            tokio::select! {
                biased;
                received = rx.recv() => match received {
                    Some(activity) => self.write(activity),
                    None => {
                        tracing::info!("Audit channel closed, worker stopping");
                        return;
                    }
                },
                _ = shutdown.cancelled() => break,
            }
        }

        rx.close();
        let mut drained = 0usize;
        while let Some(activity) = rx.recv().await {
            self.write(activity);
            drained += 1;
        }
        tracing::info!(drained, "Audit worker stopped");
    }

    fn write(&self, activity: Activity) {
        match self.sink.record(activity) {
            Ok(entry) => {
                tracing::debug!(
                    audit_id = entry.id,
                    action = %entry.action,
                    resource = %entry.resource_id,
                    "Audit entry recorded"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to write audit entry");
            }
        }
    }
}
