//! Best-effort last-use tracking for credentials.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::auth::repository::{CredentialRepository, UsageOutcome};
use crate::types::KeyFingerprint;

#[derive(Clone)]
pub struct UsageTracker {
    repo: Arc<dyn CredentialRepository>,
}

impl UsageTracker {
    pub fn new(repo: Arc<dyn CredentialRepository>) -> Self {
        Self { repo }
    }

    /// Stamp the credential's last-use time on a detached task.
    ///
    /// Callers on the request path drop the handle; the outcome is only logged.
    pub fn record_use(&self, credential: &str) -> JoinHandle<()> {
        let repo = self.repo.clone();
        let credential = credential.to_string();

        tokio::spawn(async move {
            let fingerprint = KeyFingerprint::of(&credential);
            match repo.update_usage(&credential).await {
                UsageOutcome::Recorded(shape) => {
                    debug!(key = %fingerprint, shape = shape.as_str(), "Recorded credential use");
                }
                UsageOutcome::NotRecorded(reason) => {
                    warn!(key = %fingerprint, reason = %reason, "Could not record credential use");
                }
            }
        })
    }
}
