use std::env;

use anyhow::{Context, Result};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SITE_NAME: &str = "Aviation Scholarships";
const DEFAULT_SITE_URL: &str = "http://localhost:8080";

/// Public identity of the site, used in emails and rendered pages.
#[derive(Debug, Clone)]
pub struct SiteInfo {
    pub name: String,
    pub url: String,
    pub admin_email: String,
}

impl SiteInfo {
    pub fn home_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

/// Process configuration read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub admin_token: Option<String>,
    pub site: SiteInfo,
    pub mail: MailConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to a Postgres connection string")?;

        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let site = SiteInfo {
            name: non_empty_var("SITE_NAME").unwrap_or_else(|| DEFAULT_SITE_NAME.to_string()),
            url: non_empty_var("SITE_URL").unwrap_or_else(|| DEFAULT_SITE_URL.to_string()),
            admin_email: non_empty_var("ADMIN_EMAIL")
                .unwrap_or_else(|| "admin@localhost".to_string()),
        };

        Ok(Self {
            database_url,
            port,
            admin_token: non_empty_var("ADMIN_TOKEN"),
            site,
            mail: MailConfig {
                api_url: non_empty_var("MAIL_API_URL"),
                api_key: non_empty_var("MAIL_API_KEY"),
            },
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_url_joins_without_double_slashes() {
        let site = SiteInfo {
            name: "Site".to_string(),
            url: "https://example.org/".to_string(),
            admin_email: "admin@example.org".to_string(),
        };
        assert_eq!(site.home_url("/my-account/"), "https://example.org/my-account/");
        assert_eq!(site.home_url(""), "https://example.org/");
    }
}
