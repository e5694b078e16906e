use std::sync::Arc;

use chrono::Duration;

use super::{
    auth::Tokens, config::Config, database::Database, error::AppError, mailer::Mailer,
    ocr::OcrJobs, services::policy::PolicyService, sessions::Sessions,
};

pub struct State {
    pub config: Config,
    pub database: Database,
    pub policies: PolicyService,
    pub sessions: Sessions,
    pub tokens: Tokens,
    pub mailer: Mailer,
    pub ocr_jobs: OcrJobs,
}

impl State {
    pub async fn new(config: Config) -> Result<Arc<Self>, AppError> {
        let mailer = Mailer::from_config(config.mail_relay_url.as_deref(), &config.emails_from);
        let sessions = Sessions::connect(config.redis_url.as_deref()).await;

        Self::with_parts(config, sessions, mailer)
    }

    pub fn with_parts(
        config: Config,
        sessions: Sessions,
        mailer: Mailer,
    ) -> Result<Arc<Self>, AppError> {
        let database = Database::open(&config.database_path)?;

        Ok(Arc::new(Self {
            policies: PolicyService::new(database.clone()),
            tokens: Tokens::new(&config.jwt_secret),
            database,
            sessions,
            mailer,
            ocr_jobs: OcrJobs::default(),
            config,
        }))
    }

    pub fn access_ttl(&self) -> Duration {
        Duration::minutes(self.config.access_token_minutes)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::days(self.config.refresh_token_days)
    }
}
