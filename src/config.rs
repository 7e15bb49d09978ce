use crate::utils::dates::DEFAULT_TIME_FORMAT;

pub const DEFAULT_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_APP_NAME: &str = "mongo-agg";

/// Connection and output defaults, read from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// `MONGODB_URI`
    pub uri: String,
    /// `MONGO_AGG_APP_NAME`, reported to the server as the driver app name.
    pub app_name: String,
    /// `MONGO_AGG_DATABASE`
    pub database: Option<String>,
    /// `MONGO_AGG_TIME_FORMAT`
    pub time_format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
            database: None,
            time_format: DEFAULT_TIME_FORMAT.to_string(),
        }
    }
}

impl Settings {
    /// Load from the process environment, after reading `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for each variable. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        Self {
            uri: get("MONGODB_URI").unwrap_or(defaults.uri),
            app_name: get("MONGO_AGG_APP_NAME").unwrap_or(defaults.app_name),
            database: get("MONGO_AGG_DATABASE"),
            time_format: get("MONGO_AGG_TIME_FORMAT").unwrap_or(defaults.time_format),
        }
    }
}
