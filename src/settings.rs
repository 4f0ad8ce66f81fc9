use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use log::LevelFilter;
use serde::Deserialize;

use crate::api::Credits;
use crate::drawer::DrawerConfig;
use crate::retry::RetrySettings;

#[derive(Debug, Clone, Deserialize)]
pub struct SlipSettings {
    pub default_stake: Credits,
}
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub port: u16,
    pub db: Option<String>,
    pub starting_balance: Credits,
    #[serde(default)]
    pub admins: Vec<String>,
}
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_url: String,
    pub log_level: String,
    pub request_timeout_ms: u64,
    pub slip: SlipSettings,
    pub drawer: DrawerConfig,
    pub profile_retry: RetrySettings,
    pub server: ServerSettings,
}
impl Settings {
    /// Defaults, overridden by `coupon.toml` (or `path`), overridden by
    /// `COUPON_*` environment variables. Nested keys use `__`, e.g.
    /// `COUPON_SLIP__DEFAULT_STAKE`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = match path {
            Some(path) => File::with_name(path),
            None => File::with_name("coupon").required(false),
        };
        Config::builder()
            .set_default("server_url", "http://127.0.0.1:8080")?
            .set_default("log_level", "debug")?
            .set_default("request_timeout_ms", 10_000i64)?
            .set_default("slip.default_stake", "10")?
            .set_default("drawer.dismiss_distance", 100.0)?
            .set_default("drawer.dismiss_velocity", 500.0)?
            .set_default("profile_retry.attempts", 3i64)?
            .set_default("profile_retry.delay_ms", 500i64)?
            .set_default("server.port", 8080i64)?
            .set_default("server.starting_balance", "1000")?
            .add_source(file)
            .add_source(Environment::with_prefix("COUPON").separator("__"))
            .build()
            .context("couldn't read settings")?
            .try_deserialize()
            .context("couldn't parse settings")
    }
    pub fn log_level(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::Info)
    }
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.slip.default_stake, dec!(10));
        assert_eq!(settings.drawer, DrawerConfig::default());
        assert_eq!(settings.profile_retry, RetrySettings::default());
        assert_eq!(settings.server.starting_balance, dec!(1000));
        assert_eq!(settings.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("coupon-test-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "log_level = \"warn\"\n\
             [slip]\n\
             default_stake = \"25.5\"\n\
             [drawer]\n\
             dismiss_distance = 64.0\n\
             [server]\n\
             port = 9000\n\
             admins = [\"root\"]\n",
        )
        .unwrap();
        let settings = Settings::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(settings.log_level(), LevelFilter::Warn);
        assert_eq!(settings.slip.default_stake, dec!(25.5));
        assert_eq!(settings.drawer.dismiss_distance, 64.0);
        assert_eq!(settings.drawer.dismiss_velocity, 500.0);
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.admins, vec!["root".to_string()]);
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let mut settings = Settings::load(None).unwrap();
        settings.log_level = "chatty".into();
        assert_eq!(settings.log_level(), LevelFilter::Info);
    }
}
