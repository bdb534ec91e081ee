use url::Url;

use crate::error::{Error, Result};

pub const COMPUTE_BASE_URL: &str = "https://compute.googleapis.com/compute/v1/";
pub const SQL_ADMIN_BASE_URL: &str = "https://sqladmin.googleapis.com/sql/v1beta4/";
pub const CONTAINER_BASE_URL: &str = "https://container.googleapis.com/v1/";
pub const DEFAULT_USER_AGENT: &str = concat!("opwait/", env!("CARGO_PKG_VERSION"));

/// Sub-APIs whose operation endpoints live at a fixed base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Compute,
    SqlAdmin,
    Container,
}

/// Client-wide settings shared by every adapter built on one `ApiClient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    compute: String,
    sql_admin: String,
    container: String,
    user_agent: String,
    billing_project: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            compute: COMPUTE_BASE_URL.into(),
            sql_admin: SQL_ADMIN_BASE_URL.into(),
            container: CONTAINER_BASE_URL.into(),
            user_agent: DEFAULT_USER_AGENT.into(),
            billing_project: None,
        }
    }
}

impl ClientConfig {
    pub fn builder() -> Builder {
        Builder::default()
    }

    pub fn endpoint(&self, service: Service) -> &str {
        match service {
            Service::Compute => &self.compute,
            Service::SqlAdmin => &self.sql_admin,
            Service::Container => &self.container,
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Project billed for quota, sent as `X-Goog-User-Project`.
    pub fn billing_project(&self) -> Option<&str> {
        self.billing_project.as_deref()
    }
}

/// Builder for [`ClientConfig`]. Endpoint overrides are validated on
/// [`Builder::build`], so a bad URL surfaces before any poll starts.
#[derive(Debug, Default)]
pub struct Builder {
    endpoints: Vec<(Service, String)>,
    user_agent: Option<String>,
    billing_project: Option<String>,
}

impl Builder {
    /// Point `service` at a different base URL (emulators, private endpoints).
    pub fn endpoint(mut self, service: Service, base: impl Into<String>) -> Self {
        self.endpoints.push((service, base.into()));
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn billing_project(mut self, project: impl Into<String>) -> Self {
        self.billing_project = Some(project.into());
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        let mut config = ClientConfig::default();
        for (service, base) in self.endpoints {
            let base = normalize_base(&base)?;
            match service {
                Service::Compute => config.compute = base,
                Service::SqlAdmin => config.sql_admin = base,
                Service::Container => config.container = base,
            }
        }
        if let Some(user_agent) = self.user_agent {
            if user_agent.trim().is_empty() {
                return Err(Error::configuration("user agent must not be empty"));
            }
            config.user_agent = user_agent;
        }
        if let Some(project) = self.billing_project {
            if project.is_empty() {
                return Err(Error::configuration("billing project must not be empty"));
            }
            config.billing_project = Some(project);
        }
        Ok(config)
    }
}

/// Validate a base URL and make sure it ends with `/` so relative joins keep
/// the version prefix.
pub(crate) fn normalize_base(base: &str) -> Result<String> {
    let url = Url::parse(base)
        .map_err(|e| Error::configuration(format!("invalid endpoint {base:?}: {e}")))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(Error::configuration(format!(
            "endpoint {base:?} must be an absolute http(s) URL"
        )));
    }
    let mut out = url.to_string();
    if !out.ends_with('/') {
        out.push('/');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_public_endpoints() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint(Service::Compute), COMPUTE_BASE_URL);
        assert_eq!(config.endpoint(Service::SqlAdmin), SQL_ADMIN_BASE_URL);
        assert_eq!(config.billing_project(), None);
    }

    #[test]
    fn builder_overrides_and_normalizes() {
        let config = ClientConfig::builder()
            .endpoint(Service::Compute, "http://localhost:8080/compute/v1")
            .billing_project("billing-1")
            .user_agent("tests/1.0")
            .build()
            .unwrap();
        assert_eq!(
            config.endpoint(Service::Compute),
            "http://localhost:8080/compute/v1/"
        );
        assert_eq!(config.billing_project(), Some("billing-1"));
        assert_eq!(config.user_agent(), "tests/1.0");
    }

    #[test]
    fn builder_rejects_bad_endpoints() {
        for bad in ["not a url", "mailto:ops@example.com", "ftp://example.com/"] {
            let err = ClientConfig::builder()
                .endpoint(Service::SqlAdmin, bad)
                .build()
                .unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{bad}: {err}");
        }
    }
}
