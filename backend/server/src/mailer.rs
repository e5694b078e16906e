use std::sync::{Arc, Mutex};

use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Outgoing mail. Sending never fails the request that triggered it.
#[derive(Clone)]
pub enum Mailer {
    /// POSTs every message as JSON to a relay service.
    Relay {
        client: Client,
        url: String,
        from: String,
    },
    /// Only logs the subject and recipient.
    Log { from: String },
    /// Keeps messages in memory, for tests.
    Outbox(Arc<Mutex<Vec<Email>>>),
}

impl Mailer {
    pub fn from_config(relay_url: Option<&str>, from: &str) -> Self {
        match relay_url {
            Some(url) => Mailer::Relay {
                client: Client::new(),
                url: url.to_string(),
                from: from.to_string(),
            },
            None => Mailer::Log {
                from: from.to_string(),
            },
        }
    }

    pub fn outbox() -> Self {
        Mailer::Outbox(Arc::default())
    }

    /// Messages collected by an [`Mailer::Outbox`], empty for other mailers.
    pub fn sent(&self) -> Vec<Email> {
        match self {
            Mailer::Outbox(sent) => sent.lock().map(|sent| sent.clone()).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub async fn send(&self, email: Email) {
        match self {
            Mailer::Relay { client, url, from } => {
                let payload = RelayPayload {
                    from,
                    to: &email.to,
                    subject: &email.subject,
                    body: &email.body,
                };

                match client.post(url).json(&payload).send().await {
                    Ok(response) if response.status().is_success() => {
                        info!(to = %email.to, subject = %email.subject, "Email sent");
                    }
                    Ok(response) => {
                        error!(to = %email.to, status = %response.status(), "Mail relay refused email");
                    }
                    Err(e) => error!(to = %email.to, "Mail relay unreachable: {e}"),
                }
            }
            Mailer::Log { from } => {
                info!(%from, to = %email.to, subject = %email.subject, "Email (not sent, no relay)");
            }
            Mailer::Outbox(sent) => match sent.lock() {
                Ok(mut sent) => sent.push(email),
                Err(_) => error!("Outbox lock poisoned"),
            },
        }
    }

    /// Sends on a background task.
    pub fn dispatch(&self, email: Email) {
        let mailer = self.clone();
        tokio::spawn(async move { mailer.send(email).await });
    }
}

pub fn welcome_email(to: &str, full_name: &str, verify_link: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "Welcome to Yugantar".to_string(),
        body: format!(
            "Hello {full_name},\n\n\
             Your Yugantar account has been created.\n\
             Please verify your email address by opening the link below:\n\n\
             {verify_link}\n\n\
             The link is valid for 24 hours."
        ),
    }
}

pub fn password_reset_email(to: &str, reset_link: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "Yugantar password reset".to_string(),
        body: format!(
            "A password reset was requested for your Yugantar account.\n\n\
             {reset_link}\n\n\
             The link is valid for 15 minutes. Ignore this message if you did not ask for it."
        ),
    }
}
