//! Platform SMTP discovery.
//!
//! Hosting platforms expose mail add-ons through well-known environment
//! variables. When one is present it wins over explicit configuration.

use std::collections::HashMap;

use crate::config::DEFAULT_SMTP_PORT;
use crate::smtp::SmtpSettings;

const SENDGRID_HOST: &str = "smtp.sendgrid.net";

/// Source of platform-provided SMTP settings.
pub trait SmtpDiscovery: Send + Sync {
    /// Settings reported by the platform, or `None` when it offers none.
    fn discover(&self) -> Option<SmtpSettings>;

    /// Human-readable name, used in logs.
    fn name(&self) -> &str;
}

/// Never discovers anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDiscovery;

impl SmtpDiscovery for NoDiscovery {
    fn discover(&self) -> Option<SmtpSettings> {
        None
    }

    fn name(&self) -> &str {
        "none"
    }
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Detects Mailgun, SendGrid and Postmark add-on variables.
pub struct PaasDiscovery {
    lookup: Lookup,
}

impl PaasDiscovery {
    /// Read from the process environment.
    pub fn from_env() -> Self {
        Self {
            lookup: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// Read from a fixed set of variables.
    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        Self {
            lookup: Box::new(move |key| vars.get(key).cloned()),
        }
    }

    fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn port(&self, key: &str) -> u16 {
        self.var(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_SMTP_PORT)
    }

    fn mailgun(&self) -> Option<SmtpSettings> {
        let host = self.var("MAILGUN_SMTP_SERVER")?;
        let settings = SmtpSettings::new(host, self.port("MAILGUN_SMTP_PORT"));
        Some(match (self.var("MAILGUN_SMTP_LOGIN"), self.var("MAILGUN_SMTP_PASSWORD")) {
            (Some(user), Some(pass)) => settings.with_credentials(user, pass),
            _ => settings,
        })
    }

    fn sendgrid(&self) -> Option<SmtpSettings> {
        let user = self.var("SENDGRID_USERNAME")?;
        let pass = self.var("SENDGRID_PASSWORD")?;
        Some(SmtpSettings::new(SENDGRID_HOST, DEFAULT_SMTP_PORT).with_credentials(user, pass))
    }

    fn postmark(&self) -> Option<SmtpSettings> {
        let host = self.var("POSTMARK_SMTP_SERVER")?;
        let token = self.var("POSTMARK_API_KEY")?;
        Some(SmtpSettings::new(host, DEFAULT_SMTP_PORT).with_credentials(token.clone(), token))
    }
}

impl std::fmt::Debug for PaasDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaasDiscovery").finish_non_exhaustive()
    }
}

impl SmtpDiscovery for PaasDiscovery {
    fn discover(&self) -> Option<SmtpSettings> {
        self.mailgun()
            .or_else(|| self.sendgrid())
            .or_else(|| self.postmark())
    }

    fn name(&self) -> &str {
        "paas"
    }
}
