//! Handles settings for the admin CLI. Configuration is read from an optional
//! `settings.toml` in the working directory and from `COOP__*` environment
//! variables (for example `COOP__DATABASE__URL`).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct Interest {
    pub annual_rate_bps: i64,
}

#[derive(Debug, Deserialize)]
pub struct Maturity {
    pub term_months: i32,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub database: Database,
    pub interest: Interest,
    pub maturity: Maturity,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("app.level", "info")?
            .set_default("database.url", "sqlite:./coop.db?mode=rwc")?
            .set_default("interest.annual_rate_bps", 1200)?
            .set_default("maturity.term_months", 36)?
            .add_source(File::with_name("settings").required(false))
            .add_source(Environment::with_prefix("COOP").separator("__"))
            .build()?
            .try_deserialize()
    }
}
