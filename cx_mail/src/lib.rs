//! ABOUTME: Fire-and-forget email queue decoupled from the request cycle
//! ABOUTME: Mailer trait, SMTP transport, worker with retry, recording test double

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub mod retry;
pub mod smtp;

pub use retry::RetryConfig;
pub use smtp::SmtpMailer;

/// Mail delivery error
#[derive(thiserror::Error, Debug)]
pub enum MailError {
    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Delivery failed after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<MailError>,
    },
}

pub type Result<T> = std::result::Result<T, MailError>;

/// An outbound email message
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Email transport abstraction
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;

    fn name(&self) -> &str;
}

/// Handle for enqueueing emails from request handlers.
///
/// `enqueue` never blocks and never fails the caller; delivery problems are
/// the worker's concern.
#[derive(Debug, Clone)]
pub struct MailQueue {
    tx: mpsc::UnboundedSender<EmailMessage>,
}

impl MailQueue {
    /// Spawn the delivery worker and return the queue handle plus the worker
    /// task handle so the caller can abort it on shutdown.
    pub fn start(mailer: Arc<dyn Mailer>, retry: RetryConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(deliver_loop(rx, mailer, retry));
        (Self { tx }, handle)
    }

    /// Queue a message for delivery. Returns immediately; a closed worker is
    /// logged and otherwise ignored so callers never observe mail failures.
    pub fn enqueue(&self, message: EmailMessage) {
        debug!(to = %message.to, subject = %message.subject, "Queueing email");
        if self.tx.send(message).is_err() {
            warn!("Mail worker is gone, dropping queued email");
        }
    }
}

async fn deliver_loop(
    mut rx: mpsc::UnboundedReceiver<EmailMessage>,
    mailer: Arc<dyn Mailer>,
    retry: RetryConfig,
) {
    info!(mailer = mailer.name(), "Mail worker started");

    while let Some(message) = rx.recv().await {
        match send_with_retry(mailer.as_ref(), &message, &retry).await {
            Ok(()) => {
                debug!(to = %message.to, "Email delivered");
            }
            Err(e) => {
                warn!(
                    to = %message.to,
                    subject = %message.subject,
                    error = %e,
                    "Email delivery failed permanently"
                );
            }
        }
    }

    info!("Mail worker stopped");
}

/// Deliver one message, retrying transient failures with linear delay
async fn send_with_retry(
    mailer: &dyn Mailer,
    message: &EmailMessage,
    retry: &RetryConfig,
) -> Result<()> {
    let mut attempt: u32 = 0;

    loop {
        match mailer.send(message).await {
            Ok(()) => {
                if attempt > 0 {
                    debug!(
                        mailer = mailer.name(),
                        attempt = attempt + 1,
                        "Email sent successfully after retry"
                    );
                }
                return Ok(());
            }
            Err(e) => {
                attempt += 1;

                // Malformed messages never get better with retries
                if matches!(e, MailError::InvalidMessage(_)) {
                    return Err(e);
                }

                if attempt >= retry.max_attempts {
                    return Err(MailError::RetryExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }

                let delay = retry.delay_for_attempt(attempt);
                debug!(
                    mailer = mailer.name(),
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Email send failed, retrying after delay"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Mailer used when no SMTP transport is configured. Accepts every message
/// and drops it with a log line, so the rest of the app behaves the same.
#[derive(Debug, Default)]
pub struct NullMailer;

#[async_trait::async_trait]
impl Mailer for NullMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "SMTP not configured, dropping email"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Test double that records sent messages instead of delivering them
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: std::sync::Mutex<Vec<EmailMessage>>,
    fail_times: std::sync::atomic::AtomicU32,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` sends with a transient error
    pub fn fail_next(&self, n: u32) {
        self.fail_times
            .store(n, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("sent lock poisoned").clone()
    }
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        use std::sync::atomic::Ordering;
        let remaining = self.fail_times.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_times.store(remaining - 1, Ordering::SeqCst);
            return Err(MailError::Smtp("simulated failure".to_string()));
        }
        self.sent
            .lock()
            .expect("sent lock poisoned")
            .push(message.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// A retry policy suited to tests: immediate retries, few attempts
pub fn test_retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        base_delay: Duration::from_millis(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            to: "student@example.com".to_string(),
            subject: "Application update".to_string(),
            body: "Your application was accepted.".to_string(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_delivers_through_worker() {
        let mailer = Arc::new(RecordingMailer::new());
        let (queue, worker) = MailQueue::start(mailer.clone(), test_retry_config());

        queue.enqueue(message());

        // Drop the handle so the worker drains and exits
        drop(queue);
        worker.await.unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "student@example.com");
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let mailer = RecordingMailer::new();
        mailer.fail_next(2);

        send_with_retry(&mailer, &message(), &test_retry_config())
            .await
            .unwrap();

        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_reports_attempts() {
        let mailer = RecordingMailer::new();
        mailer.fail_next(10);

        let err = send_with_retry(&mailer, &message(), &test_retry_config())
            .await
            .unwrap_err();

        match err {
            MailError::RetryExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_message_is_not_retried() {
        struct RejectingMailer;

        #[async_trait::async_trait]
        impl Mailer for RejectingMailer {
            async fn send(&self, _message: &EmailMessage) -> Result<()> {
                Err(MailError::InvalidMessage("bad address".to_string()))
            }

            fn name(&self) -> &str {
                "rejecting"
            }
        }

        let err = send_with_retry(&RejectingMailer, &message(), &test_retry_config())
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::InvalidMessage(_)));
    }

    #[tokio::test]
    async fn test_enqueue_after_worker_gone_is_silent() {
        let mailer = Arc::new(RecordingMailer::new());
        let (queue, worker) = MailQueue::start(mailer, test_retry_config());
        worker.abort();
        let _ = worker.await;

        // Must not panic or block
        queue.enqueue(message());
    }
}
