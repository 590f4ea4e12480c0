use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use serde_json::json;
use tracing::info;

use crate::config::MailConfig;

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub from_name: String,
    pub from_email: String,
    pub subject: String,
    pub html: String,
}

pub trait Mailer: Send + Sync {
    fn send<'a>(&'a self, email: &'a OutgoingEmail) -> BoxFuture<'a, Result<()>>;
}

/// Delivers through a transactional mail provider's JSON endpoint.
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl HttpMailer {
    pub fn new(client: reqwest::Client, api_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            api_url,
            api_key,
        }
    }

    async fn deliver(&self, email: &OutgoingEmail) -> Result<()> {
        let mut request = self.client.post(&self.api_url).json(&json!({
            "from": { "name": email.from_name, "email": email.from_email },
            "to": [{ "email": email.to }],
            "subject": email.subject,
            "html": email.html,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("mail API request for {} failed", email.to))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("mail API returned HTTP {}: {}", status.as_u16(), body.trim());
        }
        Ok(())
    }
}

impl Mailer for HttpMailer {
    fn send<'a>(&'a self, email: &'a OutgoingEmail) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.deliver(email))
    }
}

/// Writes emails to the log instead of sending them. Used when no mail API is configured.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send<'a>(&'a self, email: &'a OutgoingEmail) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            info!(
                to = %email.to,
                subject = %email.subject,
                bytes = email.html.len(),
                "mail delivery disabled, email logged only"
            );
            Ok(())
        })
    }
}

pub fn from_config(client: reqwest::Client, config: &MailConfig) -> Box<dyn Mailer> {
    match &config.api_url {
        Some(api_url) => Box::new(HttpMailer::new(
            client,
            api_url.clone(),
            config.api_key.clone(),
        )),
        None => Box::new(LogMailer),
    }
}
