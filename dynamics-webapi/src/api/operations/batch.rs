//! Batch accumulation
//!
//! A [`Batch`] collects prepared requests instead of sending them; the
//! whole set goes out as one `$batch` call through
//! [`WebApiClient::execute_batch`](crate::api::WebApiClient::execute_batch).

use serde_json::{Map, Value};
use std::time::Duration;

use super::Prepared;
use super::crud::{
    prepare_create, prepare_delete, prepare_retrieve, prepare_update, prepare_update_single_property, prepare_upsert,
};
use super::functions::{prepare_action, prepare_function};
use super::query::{prepare_count, prepare_retrieve_multiple};
use super::relationships::{prepare_associate, prepare_disassociate};
use crate::api::batch::BatchOptions;
use crate::api::context::ParseParams;
use crate::api::error::Result;
use crate::api::request::WebApiRequest;
use crate::api::transport::AbortSignal;

/// Requests queued for a single `$batch` call
///
/// ```ignore
/// let mut batch = Batch::new();
/// batch.create(WebApiRequest::new("accounts").data(json!({"name": "A"})))?;
/// batch.retrieve_multiple(WebApiRequest::new("accounts").top(5))?;
/// let results = client.execute_batch(batch).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub(crate) requests: Vec<Prepared>,
    pub(crate) options: BatchOptions,
    pub(crate) timeout: Option<Duration>,
    pub(crate) abort_signal: Option<AbortSignal>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// `false` sends every request outside of changesets
    pub fn in_change_set(mut self, enabled: bool) -> Self {
        self.options.in_change_set = Some(enabled);
        self
    }

    /// Header for the outer `$batch` request
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.headers.insert(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort_signal = Some(signal);
        self
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Queue a request as-is, with default parse parameters
    pub fn add(&mut self, request: WebApiRequest) -> &mut Self {
        self.requests.push((request, ParseParams::default()));
        self
    }

    fn push(&mut self, prepared: Result<Prepared>) -> Result<&mut Self> {
        self.requests.push(prepared?);
        Ok(self)
    }

    pub fn create(&mut self, request: WebApiRequest) -> Result<&mut Self> {
        self.push(prepare_create(request))
    }

    pub fn update(&mut self, request: WebApiRequest) -> Result<&mut Self> {
        self.push(prepare_update(request))
    }

    pub fn update_single_property(&mut self, request: WebApiRequest, field: &str, value: Value) -> Result<&mut Self> {
        self.push(prepare_update_single_property(request, field, value))
    }

    pub fn upsert(&mut self, request: WebApiRequest) -> Result<&mut Self> {
        self.push(prepare_upsert(request))
    }

    pub fn delete_record(&mut self, request: WebApiRequest) -> Result<&mut Self> {
        self.push(prepare_delete(request))
    }

    pub fn retrieve(&mut self, request: WebApiRequest) -> Result<&mut Self> {
        self.push(prepare_retrieve(request))
    }

    pub fn retrieve_multiple(&mut self, request: WebApiRequest) -> Result<&mut Self> {
        self.push(prepare_retrieve_multiple(request, None))
    }

    pub fn count(&mut self, request: WebApiRequest) -> Result<&mut Self> {
        self.push(prepare_count(request))
    }

    pub fn associate(&mut self, request: WebApiRequest, related: &str) -> Result<&mut Self> {
        self.push(prepare_associate(request, related, false))
    }

    pub fn disassociate(&mut self, request: WebApiRequest, related_key: Option<&str>) -> Result<&mut Self> {
        self.push(prepare_disassociate(request, related_key))
    }

    pub fn call_function(
        &mut self,
        request: WebApiRequest,
        name: &str,
        parameters: Option<&Map<String, Value>>,
    ) -> Result<&mut Self> {
        self.push(prepare_function(request, name, parameters))
    }

    pub fn call_action(&mut self, request: WebApiRequest, name: &str, parameters: Option<Value>) -> Result<&mut Self> {
        self.push(prepare_action(request, name, parameters))
    }
}
