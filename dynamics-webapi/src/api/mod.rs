//! Dataverse Web API client core
//!
//! Requests are described declaratively with [`WebApiRequest`], composed into
//! OData paths and headers, optionally serialized into a `multipart/mixed`
//! batch, sent through a [`Transport`] and parsed back into plain JSON with
//! the OData annotations rewritten into friendlier keys.

pub mod auth;
pub mod batch;
pub mod cache;
pub mod client;
pub mod config;
pub mod constants;
pub mod context;
pub mod data;
pub mod error;
pub mod headers;
pub mod operations;
pub mod request;
pub mod response;
pub mod transport;
pub mod utility;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AccessToken, StaticToken, TokenProvider};
pub use batch::{BatchItem, BatchOptions};
pub use client::WebApiClient;
pub use config::{ApiConfig, ApiKind, ClientConfig, ClientConfigBuilder, ProxyConfig};
pub use context::ParseParams;
pub use error::{Result, ServerError, WebApiError};
pub use headers::Headers;
pub use operations::{Batch, DownloadedFile, EntityCollection, FetchResult, search::SearchQuery};
pub use request::{Expand, ExpandRequest, RequestData, StringOrList, WebApiRequest};
pub use response::{FileResponse, PagingInfo, ResponseValue};
pub use transport::{AbortSignal, ReqwestTransport, Transport, TransportRequest, TransportResponse};
