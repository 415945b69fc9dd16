use serde::{Deserialize, Serialize};

use crate::model::Document;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Static part of the generator options. Function-valued options are
/// attached in code through [`ApiOptions`](crate::api::ApiOptions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub path: String,
    pub lowercase: bool,
    pub pluralize: bool,
    pub puts: bool,
    pub relate: bool,
    pub exclude: Vec<String>,
    /// Fixed scoping filter merged into every query and write.
    pub filter: Option<Document>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            lowercase: true,
            pluralize: false,
            puts: false,
            relate: false,
            exclude: Vec::new(),
            filter: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        config = config.add_source(config::File::with_name("config").required(false));

        // Add environment variables with prefix "DOCREST_"
        config = config.add_source(
            config::Environment::with_prefix("DOCREST")
                .separator("_")
                .prefix_separator("_")
                .list_separator(",")
                .with_list_parse_key("api.exclude")
                .try_parsing(true),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_generator_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server_address(), "127.0.0.1:3001");
        assert_eq!(config.api.path, "/");
        assert!(config.api.lowercase);
        assert!(!config.api.pluralize && !config.api.puts && !config.api.relate);
        assert!(config.api.exclude.is_empty());
        assert!(config.api.filter.is_none());
    }

    #[test]
    fn defaults_survive_the_config_layer() {
        let layered = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default()).unwrap())
            .build()
            .unwrap();
        let config: AppConfig = layered.try_deserialize().unwrap();
        assert_eq!(config.server.port, 3001);
        assert!(config.api.lowercase);
    }
}
