use anyhow::{bail, Result};

pub const DEFAULT_RETRIEVAL_HOST: &str = "https://api.vectorize.io/v1";

/// Connection settings for the hosted retrieval pipeline.
///
/// Credentials are optional here on purpose: a missing value fails the first
/// query attempt with a descriptive error rather than failing startup.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub host: String,
    pub api_token: Option<String>,
    pub organization_id: Option<String>,
    pub pipeline_id: Option<String>,
}

impl RetrievalConfig {
    pub fn new(
        api_token: Option<String>,
        organization_id: Option<String>,
        pipeline_id: Option<String>,
    ) -> Self {
        Self {
            host: DEFAULT_RETRIEVAL_HOST.to_string(),
            api_token,
            organization_id,
            pipeline_id,
        }
    }

    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = host.into();
        self
    }

    /// Returns the backend credentials, or an error naming every missing value.
    pub fn credentials(&self) -> Result<RetrievalCredentials<'_>> {
        let missing: Vec<&str> = [
            ("api_token", &self.api_token),
            ("organization_id", &self.organization_id),
            ("pipeline_id", &self.pipeline_id),
        ]
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| *name)
        .collect();

        if !missing.is_empty() {
            bail!("Missing retrieval configuration: {}", missing.join(", "));
        }

        Ok(RetrievalCredentials {
            api_token: self.api_token.as_deref().unwrap_or_default(),
            organization_id: self.organization_id.as_deref().unwrap_or_default(),
            pipeline_id: self.pipeline_id.as_deref().unwrap_or_default(),
        })
    }
}

/// A fully resolved set of retrieval credentials.
pub struct RetrievalCredentials<'a> {
    pub api_token: &'a str,
    pub organization_id: &'a str,
    pub pipeline_id: &'a str,
}
