//! # Delivery Fan-out
//!
//! A completed survey is persisted first. Only a stored record is handed to
//! the best-effort channels (spreadsheet export, operator notification), each
//! in its own task so a slow or failing channel never holds up the user's
//! confirmation or the other channels. Channel failures are logged and
//! never retried.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::errors::{DeliveryError, StoreError};
use crate::store::{NewSubmission, SubmissionRecord, SubmissionStore};

/// A best-effort destination for stored submissions
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn deliver(&self, record: &SubmissionRecord) -> Result<(), DeliveryError>;
}

/// Result of one channel's attempt
#[derive(Debug)]
pub struct DeliveryOutcome {
    pub channel: &'static str,
    pub result: Result<(), DeliveryError>,
}

/// A persisted submission and its in-flight deliveries
#[derive(Debug)]
pub struct Submitted {
    pub record: SubmissionRecord,
    pub pending: Vec<JoinHandle<DeliveryOutcome>>,
}

impl Submitted {
    /// Wait for every channel to finish
    pub async fn wait(self) -> (SubmissionRecord, Vec<DeliveryOutcome>) {
        let mut outcomes = Vec::with_capacity(self.pending.len());
        for handle in self.pending {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(request_id = self.record.id, error = %e, "Delivery task panicked"),
            }
        }
        (self.record, outcomes)
    }
}

#[derive(Clone)]
pub struct DeliveryFanout {
    store: Arc<dyn SubmissionStore>,
    channels: Vec<Arc<dyn DeliveryChannel>>,
}

impl DeliveryFanout {
    pub fn new(store: Arc<dyn SubmissionStore>, channels: Vec<Arc<dyn DeliveryChannel>>) -> Self {
        Self { store, channels }
    }

    pub fn store(&self) -> &Arc<dyn SubmissionStore> {
        &self.store
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|channel| channel.name()).collect()
    }

    /// Persist the submission, then start every best-effort channel
    ///
    /// Only a persistence failure is returned. Must be called from within a
    /// tokio runtime.
    pub async fn submit(&self, submission: NewSubmission) -> Result<Submitted, StoreError> {
        let user_id = submission.user_id;
        let record = match self.store.create(submission).await {
            Ok(record) => record,
            Err(e) => {
                error!(user_id, error = %e, "Failed to persist request");
                return Err(e);
            }
        };

        let pending = self
            .channels
            .iter()
            .map(|channel| {
                let channel = Arc::clone(channel);
                let record = record.clone();
                tokio::spawn(async move {
                    let result = channel.deliver(&record).await;
                    match &result {
                        Ok(()) => info!(channel = channel.name(), request_id = record.id, "Request delivered"),
                        Err(e) => warn!(
                            channel = channel.name(),
                            request_id = record.id,
                            error = %e,
                            "Best-effort delivery failed"
                        ),
                    }
                    DeliveryOutcome {
                        channel: channel.name(),
                        result,
                    }
                })
            })
            .collect();

        Ok(Submitted { record, pending })
    }
}
