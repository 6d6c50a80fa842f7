//! Per-request parse parameters and their registry
//!
//! Every dispatched request registers the parameters that shape how its
//! response is parsed under a generated request id. The entry is removed when
//! the response has been parsed, and the [`RegisteredRequest`] guard removes it
//! on every other exit path (server error, transport error, composition error).

use log::trace;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// How the response to one request should be shaped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseParams {
    /// Turn an `@odata.id` response into a `{id, collection, oDataContext}` reference
    pub is_ref: bool,
    /// Reduce the record to its `@odata.count`
    pub to_count: bool,
    /// Returned instead of deriving a value from headers when the body is empty
    pub value_if_empty: Option<Value>,
    /// Current FetchXML page; enables paging cookie extraction
    pub page_number: Option<u32>,
    /// The request was wrapped in a single-part batch because its URL was too long
    pub converted_to_batch: bool,
}

impl ParseParams {
    pub fn value_if_empty(value: Value) -> Self {
        Self {
            value_if_empty: Some(value),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct RequestRegistry {
    entries: Mutex<HashMap<Uuid, Vec<ParseParams>>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register parse parameters (one entry per part for batches)
    pub fn register(&self, params: Vec<ParseParams>) -> RegisteredRequest<'_> {
        let id = Uuid::new_v4();
        self.lock().insert(id, params);
        trace!("Registered request {}", id);
        RegisteredRequest { registry: self, id }
    }

    /// Number of requests whose responses have not been parsed yet
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Vec<ParseParams>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Registry entry that is removed when dropped
#[derive(Debug)]
pub struct RegisteredRequest<'a> {
    registry: &'a RequestRegistry,
    id: Uuid,
}

impl RegisteredRequest<'_> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Modify the registered parameters of every part
    pub fn update(&self, f: impl Fn(&mut ParseParams)) {
        if let Some(params) = self.registry.lock().get_mut(&self.id) {
            params.iter_mut().for_each(f);
        }
    }

    /// Remove the entry and hand its parameters to the parser
    pub fn take(&self) -> Vec<ParseParams> {
        self.registry.lock().remove(&self.id).unwrap_or_default()
    }
}

impl Drop for RegisteredRequest<'_> {
    fn drop(&mut self) {
        if self.registry.lock().remove(&self.id).is_some() {
            trace!("Discarded unparsed request {}", self.id);
        }
    }
}
