//! Web API client: request orchestration
//!
//! Every operation goes through [`WebApiClient::make_request`]:
//! compose, serialize the payload, wrap oversized URLs into a `$batch`,
//! attach the access token, send, and parse. The typed operation wrappers
//! live in [`crate::api::operations`].

use log::{debug, info, warn};
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::auth::TokenProvider;
use super::batch::{BatchItem, convert_to_batch};
use super::cache::{EntitySetCache, entity_sets_from_response};
use super::config::{ApiKind, ClientConfig};
use super::constants::{MAX_URL_LENGTH, headers as names};
use super::context::{ParseParams, RegisteredRequest, RequestRegistry};
use super::data::process_data;
use super::error::{Result, ServerError, WebApiError};
use super::operations::Batch;
use super::request::{ComposedRequest, WebApiRequest, compose_request, set_standard_headers};
use super::response::{ResponseValue, parse_response};
use super::transport::{AbortSignal, ReqwestTransport, Transport, TransportRequest, TransportResponse, execute_with_abort};

const BATCH_PATH: &str = "$batch";

pub struct WebApiClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    entity_sets: EntitySetCache,
    registry: RequestRegistry,
}

impl std::fmt::Debug for WebApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebApiClient")
            .field("server_url", &self.config.server_url)
            .field("has_token_provider", &self.token_provider.is_some())
            .finish()
    }
}

impl WebApiClient {
    /// Client backed by reqwest, honoring the configured proxy
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config.proxy.as_ref())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        info!("Web API client for {}", config.server_url);
        Self {
            config,
            transport,
            token_provider: None,
            entity_sets: EntitySetCache::new(),
            registry: RequestRegistry::new(),
        }
    }

    pub fn with_token_provider(mut self, provider: impl TokenProvider + 'static) -> Self {
        self.token_provider = Some(Arc::new(provider));
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Requests whose responses have not been parsed yet
    pub fn pending_requests(&self) -> usize {
        self.registry.len()
    }

    /// Execute one request and parse its response
    pub async fn make_request(&self, request: WebApiRequest, params: ParseParams) -> Result<ResponseValue> {
        if request.abort_signal.as_ref().is_some_and(AbortSignal::is_aborted) {
            return Err(WebApiError::Aborted);
        }

        let entity_sets = self.entity_sets().await?;
        self.send(request, params, entity_sets).await
    }

    /// Execute all accumulated batch requests as one `$batch` call
    ///
    /// Parts that failed on the server are returned as `Err` items; the call
    /// itself only fails when the batch as a whole could not be executed.
    pub async fn execute_batch(&self, batch: Batch) -> Result<Vec<BatchItem>> {
        let Batch {
            requests,
            options,
            timeout,
            abort_signal,
        } = batch;

        if requests.is_empty() {
            return Err(WebApiError::EmptyBatch);
        }
        if abort_signal.as_ref().is_some_and(AbortSignal::is_aborted) {
            return Err(WebApiError::Aborted);
        }

        let entity_sets = self.entity_sets().await?;
        let registered = self
            .registry
            .register(requests.iter().map(|(_, params)| params.clone()).collect());

        let mut composed = Vec::with_capacity(requests.len());
        for (mut request, _) in requests {
            resolve_collection(&mut request, entity_sets);
            composed.push(compose_request(&request, &self.config)?);
        }

        let envelope = convert_to_batch(&composed, &self.config, Some(&options), entity_sets);
        debug!("Executing batch of {} request(s)", composed.len());

        let response = self
            .dispatch(
                batch_request(envelope.headers),
                Some(envelope.body.into_bytes()),
                timeout,
                abort_signal.as_ref(),
                registered,
            )
            .await?;

        match response {
            ResponseValue::Batch(items) => Ok(items),
            other => Err(WebApiError::Parse(format!(
                "expected a multipart batch response, got {:?}",
                other
            ))),
        }
    }

    async fn entity_sets(&self) -> Result<Option<&HashMap<String, String>>> {
        if !self.config.use_entity_names {
            return Ok(None);
        }

        self.entity_sets
            .get_or_load(|| self.load_entity_sets())
            .await
            .map(Some)
    }

    async fn load_entity_sets(&self) -> Result<HashMap<String, String>> {
        debug!("Loading entity set names");
        let request = WebApiRequest::new("EntityDefinitions")
            .select(&["EntitySetName", "LogicalName"])
            .with_function("retrieveMultiple");

        let response = self.send(request, ParseParams::default(), None).await?;
        Ok(entity_sets_from_response(&response.into_value()))
    }

    async fn send(
        &self,
        mut request: WebApiRequest,
        params: ParseParams,
        entity_sets: Option<&HashMap<String, String>>,
    ) -> Result<ResponseValue> {
        let registered = self.registry.register(vec![params]);

        resolve_collection(&mut request, entity_sets);
        let composed = compose_request(&request, &self.config)?;

        let (composed, body) = if composed.path.len() > MAX_URL_LENGTH {
            debug!(
                "URL of {} is {} characters long, sending it as a batch",
                request.function_name,
                composed.path.len()
            );
            registered.update(|params| params.converted_to_batch = true);

            let envelope = convert_to_batch(std::slice::from_ref(&composed), &self.config, None, entity_sets);
            let mut headers = envelope.headers;
            if let Some(token) = composed.headers.get(names::AUTHORIZATION) {
                headers.insert(names::AUTHORIZATION, token);
            }
            (batch_request(headers), Some(envelope.body.into_bytes()))
        } else {
            let body = composed
                .data
                .as_ref()
                .map(|data| process_data(data, &self.config, entity_sets).into_bytes());
            (composed, body)
        };

        self.dispatch(composed, body, request.timeout, request.abort_signal.as_ref(), registered)
            .await
    }

    async fn dispatch(
        &self,
        composed: ComposedRequest,
        body: Option<Vec<u8>>,
        timeout: Option<Duration>,
        abort_signal: Option<&AbortSignal>,
        registered: RegisteredRequest<'_>,
    ) -> Result<ResponseValue> {
        let ComposedRequest {
            method,
            api,
            path,
            mut headers,
            ..
        } = composed;

        self.authorize(&mut headers).await?;
        set_standard_headers(&mut headers);

        let request = TransportRequest {
            method,
            uri: format!("{}{}", self.config.api_url_for(api), path),
            headers,
            body,
            timeout: timeout.or(self.config.timeout),
        };

        let response = execute_with_abort(self.transport.as_ref(), request, abort_signal).await?;
        let params = registered.take();

        if !response.is_success() {
            let error = server_error(&response);
            warn!("Request {} failed: {}", registered.id(), error);
            return Err(WebApiError::Server(error));
        }

        parse_response(&response.body, &response.headers, &params)
    }

    async fn authorize(&self, headers: &mut crate::api::headers::Headers) -> Result<()> {
        if headers.contains(names::AUTHORIZATION) {
            return Ok(());
        }
        let Some(provider) = &self.token_provider else {
            return Ok(());
        };

        let token = provider
            .token()
            .await
            .map_err(|e| WebApiError::Token(format!("{:#}", e)))?;
        headers.insert(names::AUTHORIZATION, format!("Bearer {}", token.as_str()));
        Ok(())
    }
}

/// Swap an entity logical name for its collection name when one is cached
fn resolve_collection(request: &mut WebApiRequest, entity_sets: Option<&HashMap<String, String>>) {
    let (Some(entity_sets), Some(collection)) = (entity_sets, request.collection.as_mut()) else {
        return;
    };
    if let Some(set) = entity_sets.get(collection.as_str()) {
        *collection = set.clone();
    }
}

fn batch_request(headers: crate::api::headers::Headers) -> ComposedRequest {
    ComposedRequest {
        method: Method::POST,
        api: ApiKind::Data,
        path: BATCH_PATH.to_string(),
        headers,
        data: None,
        in_change_set: false,
    }
}

fn server_error(response: &TransportResponse) -> ServerError {
    let body = if response.body.is_empty() {
        None
    } else {
        Some(serde_json::from_slice::<Value>(&response.body).unwrap_or_else(|_| Value::String(response.text())))
    };
    ServerError::new(response.status, response.status_text.clone(), response.headers.clone(), body)
}
