//! Deployment context: the caller's description of one desired deployment

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Namespace the release service runs in unless told otherwise
pub const DEFAULT_SERVICE_NAMESPACE: &str = "kube-system";

/// Timeout handed to install/update requests unless told otherwise
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Longest release name the release service accepts
pub const MAX_RELEASE_NAME_LEN: usize = 53;

/// One desired deployment, immutable for the duration of a reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentContext {
    /// Chart directory, relative to the job workspace (or absolute)
    pub chart_location: String,

    /// Namespace the release is installed into
    pub target_namespace: String,

    /// Release name
    pub release_name: String,

    /// Namespace where the release service keeps its state
    #[serde(default = "default_service_namespace", alias = "tillerNamespace")]
    pub service_namespace: String,

    /// Ask the release service to wait for resources to become ready
    #[serde(default)]
    pub wait: bool,

    /// Passed through verbatim to install/update requests
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Identifier of the stored kubeconfig credential (blank = ambient)
    #[serde(default, alias = "kubeconfigId")]
    pub credential_id: Option<String>,
}

fn default_service_namespace() -> String {
    DEFAULT_SERVICE_NAMESPACE.to_string()
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl DeploymentContext {
    /// Create a context with default service namespace, timeout and no credential
    pub fn new(
        chart_location: impl Into<String>,
        target_namespace: impl Into<String>,
        release_name: impl Into<String>,
    ) -> Self {
        Self {
            chart_location: chart_location.into(),
            target_namespace: target_namespace.into(),
            release_name: release_name.into(),
            service_namespace: default_service_namespace(),
            wait: false,
            timeout: DEFAULT_TIMEOUT,
            credential_id: None,
        }
    }

    /// Load a context from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a context from YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn with_service_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.service_namespace = namespace.into();
        self
    }

    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_credential_id(mut self, id: impl Into<String>) -> Self {
        self.credential_id = Some(id.into());
        self
    }

    /// Credential identifier, with blank values treated as absent
    pub fn credential_id(&self) -> Option<&str> {
        self.credential_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Check names before anything touches the cluster
    pub fn validate(&self) -> Result<()> {
        if self.chart_location.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "chartLocation".to_string(),
            });
        }
        validate_dns_label("release name", &self.release_name, MAX_RELEASE_NAME_LEN)?;
        validate_dns_label("target namespace", &self.target_namespace, 63)?;
        validate_dns_label("service namespace", &self.service_namespace, 63)?;
        Ok(())
    }
}

/// RFC 1123 label: lowercase alphanumerics and '-', alphanumeric at both ends
fn validate_dns_label(what: &str, value: &str, max_len: usize) -> Result<()> {
    let invalid = |reason: &str| CoreError::InvalidContext {
        message: format!("{} '{}' {}", what, value, reason),
    };

    if value.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if value.len() > max_len {
        return Err(invalid(&format!("is longer than {} characters", max_len)));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(
            "may only contain lowercase letters, digits and '-'",
        ));
    }
    if value.starts_with('-') || value.ends_with('-') {
        return Err(invalid("must start and end with a letter or digit"));
    }
    Ok(())
}
