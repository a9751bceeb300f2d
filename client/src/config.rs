use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;

use dotenvy::dotenv;

use crate::mock::DEFAULT_TICK;
use crate::rest::Routes;
use crate::selector::Environment;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RestConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub routes: Routes,
}

impl Default for RestConfig {
    fn default() -> Self {
        RestConfig {
            base_url: "http://127.0.0.1:8080/api/v1".to_string(),
            timeout_secs: 10,
            routes: Routes::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MockConfig {
    pub tick_millis: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        MockConfig {
            tick_millis: DEFAULT_TICK.as_millis() as u64,
        }
    }
}

impl MockConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Raw deployment flag, only `"production"` has a meaning.
    #[serde(deserialize_with = "flag_as_string")]
    pub env: Option<String>,
    pub rest: RestConfig,
    pub mock: MockConfig,
}

/// Env values like `true` or `1` arrive typed; any of them is a valid flag.
fn flag_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(deserializer)?.map(|value| match value {
        Value::String(flag) => flag,
        other => other.to_string(),
    }))
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, figment::Error> {
        dotenv().ok();

        let config: Self = Self::figment().extract()?;

        tracing::info!("Configuration loaded successfully, full config: {:?}", config);

        Ok(config)
    }

    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file("Library.toml"))
            .merge(Env::prefixed("LIBRARY_").split("__")) // e.g., LIBRARY_REST__BASE_URL
    }

    pub fn environment(&self) -> Environment {
        Environment::from_flag(self.env.as_deref())
    }
}
