//! Bulk email provider: single- and multi-recipient send, HTML body,
//! explicit `From`, optional `Reply-To`. Wraps AWS SES v2.

use async_trait::async_trait;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client as SesClient;

use crate::errors::BatchError;

#[derive(Debug, Clone)]
pub struct OutboundEmail<'a> {
    pub to: &'a str,
    pub from: &'a str,
    pub reply_to: Option<&'a str>,
    pub subject: &'a str,
    pub body_html: &'a str,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: OutboundEmail<'_>) -> Result<(), BatchError>;
}

pub struct SesEmailSender {
    client: SesClient,
}

impl SesEmailSender {
    pub fn new(client: SesClient) -> Self {
        Self { client }
    }

    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(SesClient::new(&config))
    }
}

#[async_trait]
impl EmailSender for SesEmailSender {
    async fn send(&self, email: OutboundEmail<'_>) -> Result<(), BatchError> {
        let destination = Destination::builder().to_addresses(email.to).build();

        let body = Body::builder()
            .html(
                Content::builder()
                    .data(email.body_html)
                    .charset("UTF-8")
                    .build()
                    .map_err(|e| BatchError::ProviderPermanent(format!("ses body content: {e}")))?,
            )
            .build();

        let subject = Content::builder()
            .data(email.subject)
            .charset("UTF-8")
            .build()
            .map_err(|e| BatchError::ProviderPermanent(format!("ses subject content: {e}")))?;

        let message = Message::builder().subject(subject).body(body).build();
        let content = EmailContent::builder().simple(message).build();

        let mut request = self
            .client
            .send_email()
            .from_email_address(email.from)
            .destination(destination)
            .content(content);

        if let Some(reply_to) = email.reply_to {
            request = request.reply_to_addresses(reply_to);
        }

        request
            .send()
            .await
            .map_err(|e| BatchError::ProviderTransient(format!("ses send_email failed: {e}")))?;

        Ok(())
    }
}

/// In-memory stand-in used by the email dispatcher's own tests and by the
/// rate-limited scenario — records every attempted send without
/// making a network call. Exposed (test-only) so other modules' tests can
/// share it.
#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    pub struct RecordingEmailSender {
        pub sent: Arc<std::sync::Mutex<Vec<String>>>,
        pub fail_all: bool,
        pub attempts: AtomicUsize,
    }

    impl RecordingEmailSender {
        pub fn new(fail_all: bool) -> Self {
            Self {
                sent: Arc::new(std::sync::Mutex::new(Vec::new())),
                fail_all,
                attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmailSender for RecordingEmailSender {
        async fn send(&self, email: OutboundEmail<'_>) -> Result<(), BatchError> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            if self.fail_all {
                return Err(BatchError::ProviderTransient("forced test failure".into()));
            }
            self.sent.lock().unwrap().push(email.to.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingEmailSender;
    use super::*;

    #[tokio::test]
    async fn recording_sender_tracks_recipients() {
        let sender = RecordingEmailSender::new(false);
        sender
            .send(OutboundEmail {
                to: "a@x.test",
                from: "noreply@tenant.test",
                reply_to: None,
                subject: "hi",
                body_html: "<p>hi</p>",
            })
            .await
            .unwrap();
        assert_eq!(sender.sent.lock().unwrap().as_slice(), ["a@x.test"]);
    }
}
