//! Transports that never touch the network.
//!
//! [`StubMailTransport`] renders each message to JSON and hands that back
//! as the response message, keeping a copy of everything it was given.
//! [`NoopMailTransport`] is the fallback when nothing is configured.

use std::sync::{Mutex, PoisonError};

use crate::traits::{MailMessage, MailTransport, SendResponse, SendResult};

#[derive(serde::Serialize)]
struct Envelope<'a> {
    from: Option<&'a str>,
    to: &'a [String],
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct StubRecord<'a> {
    message_id: &'a str,
    envelope: Envelope<'a>,
    #[serde(flatten)]
    message: &'a MailMessage,
}

/// Synthesizes a response instead of delivering.
#[derive(Debug, Default)]
pub struct StubMailTransport {
    sent: Mutex<Vec<MailMessage>>,
}

impl StubMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages handed to this transport so far, oldest first.
    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl MailTransport for StubMailTransport {
    async fn deliver(&self, message: &MailMessage) -> SendResult {
        let message_id = format!("<{}@buildmail.stub>", uuid::Uuid::new_v4());
        let record = StubRecord {
            message_id: &message_id,
            envelope: Envelope {
                from: message.from.as_deref(),
                to: &message.to,
            },
            message,
        };
        let rendered = serde_json::to_string(&record)?;

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());

        Ok(SendResponse {
            message: Some(rendered),
            message_id: Some(message_id),
            code: None,
        })
    }

    /// Returns `"stub"`.
    fn transport_name(&self) -> &str {
        "stub"
    }
}

/// Drops every message, warning each time.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMailTransport;

#[async_trait::async_trait]
impl MailTransport for NoopMailTransport {
    async fn deliver(&self, message: &MailMessage) -> SendResult {
        tracing::warn!(
            subject = %message.subject,
            "no SMTP transport detected nor configured, cannot send email"
        );
        Ok(SendResponse::default())
    }

    /// Returns `"noop"`.
    fn transport_name(&self) -> &str {
        "noop"
    }
}
