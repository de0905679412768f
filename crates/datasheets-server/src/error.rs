use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Maps a dotted settings path ("provider.api_key") to the environment
/// variable that supplies it (DATASHEETS_PROVIDER__API_KEY).
pub fn to_env_var(field: &str) -> String {
    format!("DATASHEETS_{}", field.replace('.', "__").to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_env_var() {
        assert_eq!(to_env_var("provider.api_key"), "DATASHEETS_PROVIDER__API_KEY");
        assert_eq!(to_env_var("api_key"), "DATASHEETS_API_KEY");
        assert_eq!(to_env_var("provider"), "DATASHEETS_PROVIDER");
    }
}
