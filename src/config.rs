// Settings come from defaults, an optional config.toml and APP_* environment
// variables (nested keys use a double underscore: APP_CACHE__CAR_PAGES_SECS).

use anyhow::Result;
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server_address: String,
    // Remote store credentials. Both must be set for the store to be usable.
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    // Local JSON seed used when no remote store is configured
    pub seed_file: Option<String>,
    pub page_size: u64,
    pub request_timeout_secs: u64,
    pub site_name: String,
    pub whatsapp_number: String,
    pub phone_number: String,
    pub cache: CacheSettings,
}

/// Staleness windows per operation, plus how long unused entries are kept.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    pub car_pages_secs: u64,
    pub car_detail_secs: u64,
    pub testimonials_secs: u64,
    pub filter_options_secs: u64,
    pub retention_secs: u64,
}

impl CacheSettings {
    pub fn car_pages(&self) -> Duration {
        Duration::from_secs(self.car_pages_secs)
    }

    pub fn car_detail(&self) -> Duration {
        Duration::from_secs(self.car_detail_secs)
    }

    pub fn testimonials(&self) -> Duration {
        Duration::from_secs(self.testimonials_secs)
    }

    pub fn filter_options(&self) -> Duration {
        Duration::from_secs(self.filter_options_secs)
    }
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let builder = Self::with_defaults()?
            // Load from a configuration file (e.g., config.toml)
            .add_source(File::with_name("config").required(false))
            // Load from environment variables (e.g., APP_SUPABASE_URL)
            .add_source(Environment::with_prefix("APP").separator("__"));

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    fn with_defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = Config::builder()
            .set_default("server_address", "127.0.0.1:3000")?
            .set_default("page_size", 9)?
            .set_default("request_timeout_secs", 10)?
            .set_default("site_name", "Power Auto ID")?
            .set_default("whatsapp_number", "628119288855")?
            .set_default("phone_number", "08119288855")?
            // Listings must follow sold/price changes closely; option lists
            // barely change.
            .set_default("cache.car_pages_secs", 15)?
            .set_default("cache.car_detail_secs", 30)?
            .set_default("cache.testimonials_secs", 300)?
            .set_default("cache.filter_options_secs", 600)?
            .set_default("cache.retention_secs", 1800)?;
        Ok(builder)
    }

    // Defaults only, no file or environment
    #[cfg(test)]
    pub fn defaults() -> Self {
        Self::with_defaults()
            .and_then(|b| Ok(b.build()?.try_deserialize()?))
            .expect("default settings deserialize")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_leave_the_store_unconfigured() {
        let settings = Settings::defaults();
        assert_eq!(settings.server_address, "127.0.0.1:3000");
        assert_eq!(settings.page_size, 9);
        assert!(settings.supabase_url.is_none());
        assert!(settings.cache.filter_options() > settings.cache.car_pages());
    }
}
