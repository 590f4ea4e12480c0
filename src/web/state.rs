use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use sqlx::PgPool;
use tokio::sync::{Mutex, RwLock};

use crate::config::{Config, SiteInfo};
use crate::mailer::{self, Mailer};
use crate::models::ImportSummary;
use crate::options::RuntimeSettings;
use crate::reminders::RunOutcome;
use crate::scheduler;

#[derive(Clone)]
pub struct AppState {
    pool: PgPool,
    config: Arc<Config>,
    settings: Arc<RwLock<RuntimeSettings>>,
    http: reqwest::Client,
    mailer: Arc<dyn Mailer>,
    run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub async fn new(config: Config, pool: PgPool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("aviation-scholarships/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        let mailer: Arc<dyn Mailer> = Arc::from(mailer::from_config(http.clone(), &config.mail));

        let settings = RuntimeSettings::load(&pool)
            .await
            .context("failed to load runtime settings")?;

        Ok(Self {
            pool,
            config: Arc::new(config),
            settings: Arc::new(RwLock::new(settings)),
            http,
            mailer,
            run_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn site(&self) -> &SiteInfo {
        &self.config.site
    }

    pub fn admin_token(&self) -> Option<&str> {
        self.config.admin_token.as_deref()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }

    pub async fn settings(&self) -> RuntimeSettings {
        self.settings.read().await.clone()
    }

    /// Persists new settings, then swaps the cached copy.
    pub async fn save_settings(&self, settings: RuntimeSettings) -> Result<()> {
        settings
            .save(&self.pool)
            .await
            .context("failed to save runtime settings")?;
        let mut guard = self.settings.write().await;
        *guard = settings;
        Ok(())
    }

    /// Manual and scheduled runs share this entry point and never overlap.
    pub async fn run_reminders(&self) -> Result<RunOutcome> {
        let _guard = self.run_lock.lock().await;
        let settings = self.settings().await;
        scheduler::run_reminder_job(
            &self.pool,
            self.mailer(),
            self.site(),
            &settings,
            Local::now().date_naive(),
        )
        .await
    }

    pub async fn auto_sync(&self) -> Result<Option<ImportSummary>> {
        let settings = self.settings().await;
        scheduler::run_auto_sync_job(&self.pool, &self.http, &settings, Local::now().date_naive())
            .await
    }
}
