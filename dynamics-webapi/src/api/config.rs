//! Client configuration with builder pattern
//!
//! Holds the server URL, the two API families (data and search), the
//! client-wide defaults for `Prefer` negotiation, impersonation, proxy and
//! timeout settings, and default headers applied to every request.

use serde::Deserialize;
use std::time::Duration;

use super::error::{Result, WebApiError};
use super::headers::Headers;

/// Path/version pair of one API family, e.g. `data` / `9.2`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiConfig {
    pub path: String,
    pub version: String,
}

impl ApiConfig {
    pub fn data() -> Self {
        Self {
            path: "data".to_string(),
            version: "9.2".to_string(),
        }
    }

    pub fn search() -> Self {
        Self {
            path: "search".to_string(),
            version: "1.0".to_string(),
        }
    }
}

/// Which API family a request is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiKind {
    #[default]
    Data,
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProxyConfig {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Organization URL, e.g. `https://myorg.crm.dynamics.com`
    pub server_url: String,
    pub data_api: ApiConfig,
    pub search_api: ApiConfig,
    pub return_representation: Option<bool>,
    pub include_annotations: Option<String>,
    pub max_page_size: Option<u32>,
    /// Systemuser id sent as `MSCRMCallerID`
    pub impersonate: Option<String>,
    /// Azure AD object id sent as `CallerObjectId`
    pub impersonate_aad: Option<String>,
    /// Accept entity logical names where collection names are expected
    pub use_entity_names: bool,
    pub timeout: Option<Duration>,
    pub proxy: Option<ProxyConfig>,
    pub headers: Headers,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            data_api: ApiConfig::data(),
            search_api: ApiConfig::search(),
            return_representation: None,
            include_annotations: None,
            max_page_size: None,
            impersonate: None,
            impersonate_aad: None,
            use_entity_names: false,
            timeout: None,
            proxy: None,
            headers: Headers::new(),
        }
    }
}

/// On-disk shape of the configuration (TOML)
#[derive(Debug, Deserialize)]
struct ConfigFile {
    server_url: String,
    data_api: Option<ApiConfig>,
    search_api: Option<ApiConfig>,
    return_representation: Option<bool>,
    include_annotations: Option<String>,
    max_page_size: Option<u32>,
    impersonate: Option<String>,
    impersonate_aad: Option<String>,
    #[serde(default)]
    use_entity_names: bool,
    timeout_ms: Option<u64>,
    proxy: Option<ProxyConfig>,
    #[serde(default)]
    headers: std::collections::BTreeMap<String, String>,
}

impl ClientConfig {
    pub fn builder(server_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(server_url)
    }

    /// Base URL of the data API, always ending in `/`
    pub fn data_api_url(&self) -> String {
        self.api_url(&self.data_api)
    }

    /// Base URL of the search API, always ending in `/`
    pub fn search_api_url(&self) -> String {
        self.api_url(&self.search_api)
    }

    pub fn api_url_for(&self, kind: ApiKind) -> String {
        match kind {
            ApiKind::Data => self.data_api_url(),
            ApiKind::Search => self.search_api_url(),
        }
    }

    fn api_url(&self, api: &ApiConfig) -> String {
        format!(
            "{}/api/{}/v{}/",
            self.server_url.trim_end_matches('/'),
            api.path,
            api.version
        )
    }

    /// Load configuration from `DYNAMICS_*` environment variables
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// `DYNAMICS_SERVER_URL` is required; everything else is optional.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let server_url = std::env::var("DYNAMICS_SERVER_URL").map_err(|_| {
            WebApiError::invalid_request("ClientConfig::from_env", "DYNAMICS_SERVER_URL is not set")
        })?;

        let mut builder = ClientConfig::builder(server_url);

        if let Ok(version) = std::env::var("DYNAMICS_API_VERSION") {
            builder = builder.data_api_version(version);
        }
        if let Ok(value) = std::env::var("DYNAMICS_INCLUDE_ANNOTATIONS") {
            builder = builder.include_annotations(value);
        }
        if let Ok(value) = std::env::var("DYNAMICS_MAX_PAGE_SIZE") {
            let size = value.parse::<u32>().map_err(|_| {
                WebApiError::parameter("ClientConfig::from_env", "DYNAMICS_MAX_PAGE_SIZE", "Number")
            })?;
            builder = builder.max_page_size(size);
        }
        if let Ok(value) = std::env::var("DYNAMICS_RETURN_REPRESENTATION") {
            builder = builder.return_representation(value.eq_ignore_ascii_case("true"));
        }
        if let Ok(value) = std::env::var("DYNAMICS_IMPERSONATE") {
            builder = builder.impersonate(value);
        }
        if let Ok(value) = std::env::var("DYNAMICS_IMPERSONATE_AAD") {
            builder = builder.impersonate_aad(value);
        }
        if let Ok(value) = std::env::var("DYNAMICS_USE_ENTITY_NAMES") {
            builder = builder.use_entity_names(value.eq_ignore_ascii_case("true"));
        }
        if let Ok(value) = std::env::var("DYNAMICS_TIMEOUT_MS") {
            let ms = value.parse::<u64>().map_err(|_| {
                WebApiError::parameter("ClientConfig::from_env", "DYNAMICS_TIMEOUT_MS", "Number")
            })?;
            builder = builder.timeout(Duration::from_millis(ms));
        }
        if let Ok(url) = std::env::var("DYNAMICS_PROXY_URL") {
            builder = builder.proxy(ProxyConfig {
                url,
                username: std::env::var("DYNAMICS_PROXY_USERNAME").ok(),
                password: std::env::var("DYNAMICS_PROXY_PASSWORD").ok(),
            });
        }

        Ok(builder.build())
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| WebApiError::invalid_request("ClientConfig::from_toml_str", e.to_string()))?;

        Ok(Self {
            server_url: file.server_url,
            data_api: file.data_api.unwrap_or_else(ApiConfig::data),
            search_api: file.search_api.unwrap_or_else(ApiConfig::search),
            return_representation: file.return_representation,
            include_annotations: file.include_annotations,
            max_page_size: file.max_page_size,
            impersonate: file.impersonate,
            impersonate_aad: file.impersonate_aad,
            use_entity_names: file.use_entity_names,
            timeout: file.timeout_ms.map(Duration::from_millis),
            proxy: file.proxy,
            headers: file.headers.into_iter().collect(),
        })
    }
}

/// Builder for ClientConfig
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            config: ClientConfig {
                server_url: server_url.into(),
                ..ClientConfig::default()
            },
        }
    }

    pub fn data_api_version(mut self, version: impl Into<String>) -> Self {
        self.config.data_api.version = version.into();
        self
    }

    pub fn search_api_version(mut self, version: impl Into<String>) -> Self {
        self.config.search_api.version = version.into();
        self
    }

    /// Ask the server to echo created/updated records by default
    pub fn return_representation(mut self, enabled: bool) -> Self {
        self.config.return_representation = Some(enabled);
        self
    }

    /// Default `odata.include-annotations` value, e.g. `*`
    pub fn include_annotations(mut self, annotations: impl Into<String>) -> Self {
        self.config.include_annotations = Some(annotations.into());
        self
    }

    pub fn max_page_size(mut self, size: u32) -> Self {
        self.config.max_page_size = Some(size);
        self
    }

    pub fn impersonate(mut self, user_id: impl Into<String>) -> Self {
        self.config.impersonate = Some(user_id.into());
        self
    }

    pub fn impersonate_aad(mut self, object_id: impl Into<String>) -> Self {
        self.config.impersonate_aad = Some(object_id.into());
        self
    }

    pub fn use_entity_names(mut self, enabled: bool) -> Self {
        self.config.use_entity_names = enabled;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    /// Add a header sent with every request
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name, value);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
