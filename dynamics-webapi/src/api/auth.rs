//! Access token acquisition
//!
//! The client does not authenticate by itself; it asks a [`TokenProvider`]
//! for a token before every request that has no `Authorization` header yet.

use async_trait::async_trait;
use serde::Deserialize;
use std::future::Future;

/// Either a bare bearer token or a token object as returned by identity libraries
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AccessToken {
    Bearer(String),
    Object {
        #[serde(rename = "accessToken")]
        access_token: String,
    },
}

impl AccessToken {
    pub fn as_str(&self) -> &str {
        match self {
            AccessToken::Bearer(token) => token,
            AccessToken::Object { access_token } => access_token,
        }
    }
}

impl From<String> for AccessToken {
    fn from(token: String) -> Self {
        AccessToken::Bearer(token)
    }
}

impl From<&str> for AccessToken {
    fn from(token: &str) -> Self {
        AccessToken::Bearer(token.to_string())
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> anyhow::Result<AccessToken>;
}

#[async_trait]
impl<F, Fut> TokenProvider for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<AccessToken>> + Send,
{
    async fn token(&self) -> anyhow::Result<AccessToken> {
        (self)().await
    }
}

/// A fixed token, for scripts and tests
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> anyhow::Result<AccessToken> {
        Ok(AccessToken::Bearer(self.0.clone()))
    }
}
