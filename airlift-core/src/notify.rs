//! Distribution completion notices.
//!
//! The dispatcher builds the message; delivery goes through the
//! `MailTransport` seam. Delivery is best-effort everywhere: a rejected
//! message is logged and surfaced to the caller, but never rolls back a
//! release state that already committed.

use crate::distribution::PlatformOutcome;
use crate::db::AttemptStatus;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("mail transport rejected message: {0}")]
    Delivery(String),
    #[error("mail transport unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &OutboundEmail) -> Result<(), NotifyError>;
}

/// Delivers mail through an HTTP mail API (Mailgun-style JSON endpoint).
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpMailer {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        HttpMailer {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl MailTransport for HttpMailer {
    async fn send(&self, message: &OutboundEmail) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.endpoint).json(&json!({
            "from": message.from,
            "to": message.to,
            "subject": message.subject,
            "html": message.html_body,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Delivery(format!(
                "mail API returned {} for message to {}",
                response.status(),
                message.to
            )));
        }
        Ok(())
    }
}

/// Logs the message instead of sending it. Used when no mail endpoint is
/// configured (local development) — keeps the rest of the pipeline honest.
pub struct LoggingMailer;

#[async_trait]
impl MailTransport for LoggingMailer {
    async fn send(&self, message: &OutboundEmail) -> Result<(), NotifyError> {
        info!(
            "mail (not sent, no endpoint configured): to={} subject={:?}",
            message.to, message.subject
        );
        Ok(())
    }
}

/// Formats and emits release notifications.
pub struct Notifier {
    transport: Arc<dyn MailTransport>,
    sender: String,
}

impl Notifier {
    pub fn new(transport: Arc<dyn MailTransport>, sender: impl Into<String>) -> Self {
        Notifier {
            transport,
            sender: sender.into(),
        }
    }

    /// One notice per distribution run, summarizing every platform outcome.
    pub async fn notify_distribution_complete(
        &self,
        recipient: &str,
        release_title: &str,
        outcomes: &[PlatformOutcome],
    ) -> Result<(), NotifyError> {
        let message = OutboundEmail {
            from: self.sender.clone(),
            to: recipient.to_string(),
            subject: format!("airlift — {release_title} Distribution Complete"),
            html_body: render_distribution_body(release_title, outcomes),
        };
        self.transport.send(&message).await?;
        info!("Distribution notification sent to {}", recipient);
        Ok(())
    }

    /// Sent when the run failed before any platform was attempted.
    pub async fn notify_distribution_failed(
        &self,
        recipient: &str,
        release_title: &str,
        reason: &str,
    ) -> Result<(), NotifyError> {
        let html_body = format!(
            "<html>\n<body>\n\
             <h2>Your release \"{release_title}\" could not be distributed</h2>\n\
             <p>{reason}</p>\n\
             <p>Fix the issue above and start a new distribution from your dashboard.</p>\n\
             </body>\n</html>"
        );
        let message = OutboundEmail {
            from: self.sender.clone(),
            to: recipient.to_string(),
            subject: format!("airlift — {release_title} Distribution Failed"),
            html_body,
        };
        self.transport.send(&message).await?;
        info!("Distribution failure notification sent to {}", recipient);
        Ok(())
    }
}

fn render_distribution_body(release_title: &str, outcomes: &[PlatformOutcome]) -> String {
    let mut body = format!(
        "<html>\n<body>\n\
         <h2>Your release \"{release_title}\" has been distributed!</h2>\n\
         <p>Here's the distribution status:</p>\n<ul>\n"
    );

    for outcome in outcomes {
        match (outcome.status, &outcome.url) {
            (AttemptStatus::Distributed, Some(url)) => {
                body.push_str(&format!(
                    "<li><strong>{}:</strong> Successfully distributed - <a href=\"{url}\">View</a></li>\n",
                    outcome.platform_name
                ));
            }
            _ => {
                body.push_str(&format!(
                    "<li><strong>{}:</strong> Failed - {}</li>\n",
                    outcome.platform_name,
                    outcome.error.as_deref().unwrap_or("Unknown error")
                ));
            }
        }
    }

    body.push_str("</ul>\n<p>Thank you for using airlift!</p>\n</body>\n</html>");
    body
}
