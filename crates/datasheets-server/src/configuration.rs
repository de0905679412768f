use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use datasheets::config::{RetrievalConfig, DEFAULT_RETRIEVAL_HOST};
use datasheets::providers::configs::OpenAiProviderConfig;
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Failed to parse socket address")
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_openai_host")]
    pub host: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Low by default to bias the model toward deterministic tool selection.
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

impl ProviderSettings {
    pub fn into_config(self) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            host: self.host,
            api_key: self.api_key,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Retrieval credentials stay optional at load time; a missing value fails
/// the first query attempt, not startup.
#[derive(Debug, Deserialize)]
pub struct RetrievalSettings {
    #[serde(default = "default_retrieval_host")]
    pub host: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub pipeline_id: Option<String>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            host: default_retrieval_host(),
            api_token: None,
            organization_id: None,
            pipeline_id: None,
        }
    }
}

impl RetrievalSettings {
    pub fn into_config(self) -> RetrievalConfig {
        RetrievalConfig::new(self.api_token, self.organization_id, self.pipeline_id)
            .with_host(self.host)
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("DATASHEETS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Missing field errors are reported as the env var that supplies them
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // Extract field name from error message "missing field `type`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches("`");
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_temperature() -> Option<f32> {
    Some(0.2)
}

fn default_retrieval_host() -> String {
    DEFAULT_RETRIEVAL_HOST.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("DATASHEETS_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("DATASHEETS_PROVIDER__API_KEY", "test-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.provider.host, "https://api.openai.com");
        assert_eq!(settings.provider.api_key, "test-key");
        assert_eq!(settings.provider.model, "gpt-4o");
        assert_eq!(settings.provider.temperature, Some(0.2));
        assert_eq!(settings.provider.max_tokens, None);
        assert_eq!(settings.retrieval.host, DEFAULT_RETRIEVAL_HOST);
        assert_eq!(settings.retrieval.api_token, None);

        env::remove_var("DATASHEETS_PROVIDER__API_KEY");
    }

    #[test]
    #[serial]
    fn test_missing_provider_key_names_env_var() {
        clean_env();
        // The provider section exists but lacks its required key
        env::set_var("DATASHEETS_PROVIDER__MODEL", "gpt-4o");

        let err = Settings::new().unwrap_err();
        match err {
            ConfigError::MissingEnvVar { env_var } => {
                assert!(env_var.starts_with("DATASHEETS_"));
                assert!(env_var.contains("API_KEY"));
            }
            other => panic!("Expected MissingEnvVar, got {:?}", other),
        }

        env::remove_var("DATASHEETS_PROVIDER__MODEL");
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("DATASHEETS_SERVER__PORT", "8080");
        env::set_var("DATASHEETS_PROVIDER__API_KEY", "test-key");
        env::set_var("DATASHEETS_PROVIDER__MODEL", "gpt-4o-mini");
        env::set_var("DATASHEETS_PROVIDER__TEMPERATURE", "0.7");
        env::set_var("DATASHEETS_RETRIEVAL__API_TOKEN", "vz-token");
        env::set_var("DATASHEETS_RETRIEVAL__ORGANIZATION_ID", "org-1");
        env::set_var("DATASHEETS_RETRIEVAL__PIPELINE_ID", "pipe-1");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.provider.model, "gpt-4o-mini");
        assert_eq!(settings.provider.temperature, Some(0.7));
        assert_eq!(settings.retrieval.api_token.as_deref(), Some("vz-token"));
        assert_eq!(
            settings.retrieval.organization_id.as_deref(),
            Some("org-1")
        );
        assert_eq!(settings.retrieval.pipeline_id.as_deref(), Some("pipe-1"));

        for var in [
            "DATASHEETS_SERVER__PORT",
            "DATASHEETS_PROVIDER__API_KEY",
            "DATASHEETS_PROVIDER__MODEL",
            "DATASHEETS_PROVIDER__TEMPERATURE",
            "DATASHEETS_RETRIEVAL__API_TOKEN",
            "DATASHEETS_RETRIEVAL__ORGANIZATION_ID",
            "DATASHEETS_RETRIEVAL__PIPELINE_ID",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let addr = server_settings.socket_addr();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }
}
