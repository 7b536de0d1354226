use chrono_tz::Tz;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::service::FanOutMode;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    pub events_api_url: Url,
    pub events_api_token: Option<String>,
    pub debug: bool,
    pub auth_token: String,
    pub enable_swagger: bool,
    pub port: u16,
    pub timezone: String,
    pub fan_out: FanOutMode,
    pub calendar_name: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            // APP_EVENTS_API_URL, APP_FAN_OUT, ...
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("events_api_url", "http://localhost:3000/api")?
            .set_default("debug", false)?
            .set_default("auth_token", "default-token-change-me")?
            .set_default("enable_swagger", true)?
            .set_default("port", 8080)?
            .set_default("timezone", "Asia/Kolkata")?
            .set_default("fan_out", "batched")?
            .set_default("calendar_name", "School Calendar")?
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.tz()?;
        Ok(settings)
    }

    /// The deployment timezone every event date is expressed in.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|err| ConfigError::Message(format!("invalid timezone: {err}")))
    }
}
