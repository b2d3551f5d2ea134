//! Mail transport trait definition and shared error types.

/// Errors that can occur while building or delivering a message.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Message construction failed: {0}")]
    Message(String),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Send task aborted: {0}")]
    Aborted(String),
}

/// A fully resolved message, ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MailMessage {
    /// Sender address. `None` when neither the caller nor the
    /// configuration supplied one.
    pub from: Option<String>,
    /// Recipient addresses.
    pub to: Vec<String>,
    pub subject: String,
    /// Plaintext body.
    pub text: Option<String>,
    /// HTML body.
    pub html: Option<String>,
}

/// What a transport reports back after a delivery attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SendResponse {
    /// Descriptive message from the transport. The no-op transport
    /// leaves this empty.
    pub message: Option<String>,
    /// Message id assigned by the transport, if any.
    pub message_id: Option<String>,
    /// SMTP reply code, if the transport spoke SMTP.
    pub code: Option<String>,
}

/// Outcome of a single send.
pub type SendResult = Result<SendResponse, MailError>;

/// Trait for mail delivery backends.
#[async_trait::async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver a message through this transport.
    async fn deliver(&self, message: &MailMessage) -> SendResult;

    /// Human-readable name for this transport (e.g. "smtp", "stub").
    fn transport_name(&self) -> &str;
}
