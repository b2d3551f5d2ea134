//! SMTP transport via `lettre` with TLS support.
//!
//! Delivers messages through an SMTP server using opportunistic STARTTLS,
//! required STARTTLS, implicit TLS or a plain connection.

use std::fmt;
use std::time::Duration;

use lettre::{
    message::{Mailbox, MultiPart, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::{SmtpConfig, SmtpSecurity};
use crate::traits::{MailError, MailMessage, MailTransport, SendResponse, SendResult};

const IMPLICIT_TLS_PORT: u16 = 465;

/// Resolved connection settings for an SMTP transport.
///
/// Credentials are only ever stored as a complete pair; a half-filled
/// auth block yields an anonymous connection.
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub security: SmtpSecurity,
    pub timeout: Option<Duration>,
    credentials: Option<(String, String)>,
}

impl SmtpSettings {
    /// Anonymous settings for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            security: SmtpSecurity::default(),
            timeout: None,
            credentials: None,
        }
    }

    /// Attach credentials. Empty user or pass leaves the settings anonymous.
    pub fn with_credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        let (user, pass) = (user.into(), pass.into());
        self.credentials = (!user.is_empty() && !pass.is_empty()).then_some((user, pass));
        self
    }

    pub fn with_security(mut self, security: SmtpSecurity) -> Self {
        self.security = security;
        self
    }

    pub fn from_config(config: &SmtpConfig) -> Self {
        let mut settings = Self::new(config.host.clone(), config.port).with_security(config.security);
        settings.timeout = config.timeout_secs.map(Duration::from_secs);

        // Anonymous login unless both halves are present.
        if let Some((user, pass)) = config.auth.as_ref().and_then(|a| a.pair()) {
            settings = settings.with_credentials(user, pass);
        }
        settings
    }

    pub fn is_anonymous(&self) -> bool {
        self.credentials.is_none()
    }

    pub fn username(&self) -> Option<&str> {
        self.credentials.as_ref().map(|(user, _)| user.as_str())
    }

    /// Security mode actually used; port 465 always means implicit TLS.
    pub fn effective_security(&self) -> SmtpSecurity {
        if self.port == IMPLICIT_TLS_PORT {
            SmtpSecurity::Tls
        } else {
            self.security
        }
    }
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.effective_security())
            .field("timeout", &self.timeout)
            .field("user", &self.username())
            .finish()
    }
}

/// Sends messages via SMTP.
#[derive(Debug)]
pub struct SmtpMailTransport {
    /// Async SMTP transport for sending emails.
    transport: AsyncSmtpTransport<Tokio1Executor>,
    settings: SmtpSettings,
}

impl SmtpMailTransport {
    /// Build a transport from resolved settings.
    ///
    /// No connection is opened here; the first delivery connects.
    pub fn new(settings: SmtpSettings) -> Result<Self, MailError> {
        let host = settings.host.as_str();

        let mut builder = match settings.effective_security() {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| MailError::Config(e.to_string()))?,
            SmtpSecurity::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| MailError::Config(e.to_string()))?,
            SmtpSecurity::Opportunistic => {
                let params = TlsParameters::new(host.to_string())
                    .map_err(|e| MailError::Config(e.to_string()))?;
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                    .tls(Tls::Opportunistic(params))
            }
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        }
        .port(settings.port);

        if let Some((user, pass)) = &settings.credentials {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        if settings.timeout.is_some() {
            builder = builder.timeout(settings.timeout);
        }

        Ok(Self {
            transport: builder.build(),
            settings,
        })
    }

    pub fn settings(&self) -> &SmtpSettings {
        &self.settings
    }
}

#[async_trait::async_trait]
impl MailTransport for SmtpMailTransport {
    async fn deliver(&self, message: &MailMessage) -> SendResult {
        let email = build_message(message)?;

        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;

        tracing::info!(
            channel = "smtp",
            subject = %message.subject,
            recipients = message.to.len(),
            code = %response.code(),
            "email delivered"
        );

        Ok(SendResponse {
            message: Some(response.message().collect::<Vec<_>>().join(" ")),
            message_id: None,
            code: Some(response.code().to_string()),
        })
    }

    /// Returns `"smtp"`.
    fn transport_name(&self) -> &str {
        "smtp"
    }
}

fn parse_mailbox(addr: &str) -> Result<Mailbox, MailError> {
    addr.trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| MailError::Address(format!("'{addr}': {e}")))
}

/// Turn a [`MailMessage`] into a `lettre` message.
///
/// Both bodies become a `multipart/alternative`; a single body is sent
/// as a single part. A missing sender is rejected by `lettre`.
pub fn build_message(message: &MailMessage) -> Result<Message, MailError> {
    if message.to.is_empty() {
        return Err(MailError::Address("at least one recipient is required".to_string()));
    }

    let mut builder = Message::builder().subject(message.subject.as_str());
    if let Some(from) = &message.from {
        builder = builder.from(parse_mailbox(from)?);
    }
    for recipient in &message.to {
        builder = builder.to(parse_mailbox(recipient)?);
    }

    let built = match (&message.text, &message.html) {
        (Some(text), Some(html)) => {
            builder.multipart(MultiPart::alternative_plain_html(text.clone(), html.clone()))
        }
        (None, Some(html)) => builder.singlepart(SinglePart::html(html.clone())),
        (Some(text), None) => builder.singlepart(SinglePart::plain(text.clone())),
        (None, None) => builder.singlepart(SinglePart::plain(String::new())),
    };

    built.map_err(|e| MailError::Message(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmtpAuth;

    fn message(from: Option<&str>) -> MailMessage {
        MailMessage {
            from: from.map(str::to_string),
            to: vec!["dev@example.com".to_string()],
            subject: "[PASS] widgets #12".to_string(),
            text: Some("all good".to_string()),
            html: Some("<b>all good</b>".to_string()),
        }
    }

    #[test]
    fn settings_with_full_auth() {
        let mut cfg = SmtpConfig::new("smtp.example.com", 587);
        cfg.auth = Some(SmtpAuth::new("ci", "secret"));

        let settings = SmtpSettings::from_config(&cfg);
        assert!(!settings.is_anonymous());
        assert_eq!(settings.username(), Some("ci"));
    }

    #[test]
    fn settings_user_without_pass_is_anonymous() {
        let mut cfg = SmtpConfig::new("smtp.example.com", 587);
        cfg.auth = Some(SmtpAuth {
            user: Some("ci".into()),
            pass: None,
        });
        assert!(SmtpSettings::from_config(&cfg).is_anonymous());
    }

    #[test]
    fn settings_pass_without_user_is_anonymous() {
        let mut cfg = SmtpConfig::new("smtp.example.com", 587);
        cfg.auth = Some(SmtpAuth {
            user: None,
            pass: Some("secret".into()),
        });
        assert!(SmtpSettings::from_config(&cfg).is_anonymous());
    }

    #[test]
    fn port_465_is_implicit_tls() {
        let settings = SmtpSettings::new("smtp.example.com", 465);
        assert_eq!(settings.effective_security(), SmtpSecurity::Tls);
        let settings = SmtpSettings::new("smtp.example.com", 587);
        assert_eq!(settings.effective_security(), SmtpSecurity::Opportunistic);
    }

    #[test]
    fn debug_hides_password() {
        let settings = SmtpSettings::new("smtp.example.com", 587).with_credentials("ci", "hunter2");
        let rendered = format!("{settings:?}");
        assert!(rendered.contains("ci"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn transport_builds_for_each_security_mode() {
        for security in [
            SmtpSecurity::None,
            SmtpSecurity::Opportunistic,
            SmtpSecurity::Starttls,
            SmtpSecurity::Tls,
        ] {
            let settings = SmtpSettings::new("smtp.example.com", 2525).with_security(security);
            let transport = SmtpMailTransport::new(settings);
            assert!(transport.is_ok(), "security {security} failed");
        }
    }

    #[test]
    fn transport_name_is_smtp() {
        let transport = SmtpMailTransport::new(SmtpSettings::new("localhost", 25)).unwrap();
        assert_eq!(transport.transport_name(), "smtp");
        assert_eq!(transport.settings().port, 25);
    }

    #[test]
    fn build_message_with_both_bodies() {
        let email = build_message(&message(Some("CI <ci@example.com>"))).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("Subject: [PASS] widgets #12"));
    }

    #[test]
    fn build_message_without_sender_fails() {
        let result = build_message(&message(None));
        assert!(matches!(result, Err(MailError::Message(_))));
    }

    #[test]
    fn build_message_invalid_recipient() {
        let mut msg = message(Some("ci@example.com"));
        msg.to = vec!["not-an-email".to_string()];
        assert!(matches!(build_message(&msg), Err(MailError::Address(_))));
    }

    #[test]
    fn build_message_without_recipients() {
        let mut msg = message(Some("ci@example.com"));
        msg.to.clear();
        let err = build_message(&msg).unwrap_err().to_string();
        assert!(err.contains("at least one recipient"), "got: {err}");
    }
}
