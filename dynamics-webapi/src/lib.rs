//! OData v4 client core for the Microsoft Dataverse Web API
//!
//! ```ignore
//! use dynamics_webapi::{ClientConfig, StaticToken, WebApiClient, WebApiRequest};
//!
//! let client = WebApiClient::new(ClientConfig::from_env()?)?
//!     .with_token_provider(StaticToken(token));
//!
//! let accounts = client
//!     .retrieve_multiple(WebApiRequest::new("accounts").select(&["name"]).top(10), None)
//!     .await?;
//! ```

pub mod api;

pub use api::*;
