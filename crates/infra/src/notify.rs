//! Outbound notification seam.
//!
//! The engine hands finished messages to a [`Notifier`]; delivery details
//! (SMTP, chat webhook, ...) live behind it. Recipients come from a
//! [`RecipientDirectory`] so the list can be reloaded without rebuilding the
//! engine.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("delivery failed: {0}")]
    Send(String),

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message; returns the transport's message id.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<String, TransportError>;
}

#[async_trait::async_trait]
impl<N> Notifier for Arc<N>
where
    N: Notifier + ?Sized,
{
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<String, TransportError> {
        (**self).send(to, subject, body).await
    }
}

pub trait RecipientDirectory: Send + Sync {
    fn recipients(&self) -> Vec<String>;
}

/// Fixed recipient list, usually taken from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticRecipients(Vec<String>);

impl StaticRecipients {
    pub fn new(recipients: impl IntoIterator<Item = String>) -> Self {
        Self(
            recipients
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
        )
    }
}

impl RecipientDirectory for StaticRecipients {
    fn recipients(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// Writes messages to the log instead of delivering them.
///
/// Intended for tests/dev and for deployments without a mail relay.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

#[async_trait::async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<String, TransportError> {
        let message_id = Uuid::now_v7().to_string();
        info!(%message_id, to, subject, body, "notification");
        Ok(message_id)
    }
}

/// Send one message to one recipient, bounded by `timeout`. The outcome is
/// logged here.
pub async fn deliver(
    notifier: &dyn Notifier,
    to: &str,
    subject: &str,
    body: &str,
    timeout: Duration,
) -> Result<String, TransportError> {
    let outcome = match tokio::time::timeout(timeout, notifier.send(to, subject, body)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(timeout)),
    };
    match &outcome {
        Ok(message_id) => info!(recipient = %to, %message_id, "notification delivered"),
        Err(err) => warn!(recipient = %to, error = %err, "notification failed"),
    }
    outcome
}

/// Start one background delivery per recipient and return immediately.
///
/// Each task is independent: a failing or slow recipient affects nobody else.
/// Callers may drop the handles; the tasks keep running on the runtime.
pub fn dispatch_to_all(
    notifier: &Arc<dyn Notifier>,
    recipients: &[String],
    subject: &str,
    body: &str,
    timeout: Duration,
) -> Vec<JoinHandle<Result<String, TransportError>>> {
    recipients
        .iter()
        .map(|to| {
            let notifier = Arc::clone(notifier);
            let to = to.clone();
            let subject = subject.to_string();
            let body = body.to_string();
            tokio::spawn(async move { deliver(notifier.as_ref(), &to, &subject, &body, timeout).await })
        })
        .collect()
}
