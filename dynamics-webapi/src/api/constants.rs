//! Wire-level constants for the Dataverse Web API

/// Composed paths longer than this are sent as a single-part `$batch` instead
pub const MAX_URL_LENGTH: usize = 2000;

/// Chunk size used when downloading file and image columns (4 MiB)
pub const DOWNLOAD_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Changeset Content-ID counter seed; the first generated id is one above this
pub const CONTENT_ID_SEED: u32 = 100_000;

pub const BATCH_BOUNDARY_PREFIX: &str = "dwa_batch_";
pub const CHANGESET_BOUNDARY_PREFIX: &str = "changeset_";

/// Marker the server uses for its own batch response boundaries
pub const BATCH_RESPONSE_MARKER: &str = "--batchresponse_";
pub const CHANGESET_RESPONSE_MARKER: &str = "--changesetresponse_";

/// Separator Dataverse uses for alias-qualified linked-entity attributes
pub const ALIAS_SEPARATOR: &str = "_x002e_";

pub mod headers {
    pub const ACCEPT: &str = "Accept";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CONTENT_ID: &str = "Content-ID";
    pub const CONTENT_RANGE: &str = "Content-Range";
    pub const CONTENT_DISPOSITION: &str = "Content-Disposition";
    pub const RANGE: &str = "Range";
    pub const LOCATION: &str = "Location";
    pub const PREFER: &str = "Prefer";
    pub const IF_MATCH: &str = "If-Match";
    pub const IF_NONE_MATCH: &str = "If-None-Match";
    pub const CACHE_CONTROL: &str = "Cache-Control";
    pub const ODATA_VERSION: &str = "OData-Version";
    pub const ODATA_MAX_VERSION: &str = "OData-MaxVersion";
    pub const ODATA_ENTITY_ID: &str = "OData-EntityId";
    pub const CALLER_ID: &str = "MSCRMCallerID";
    pub const CALLER_OBJECT_ID: &str = "CallerObjectId";
    pub const SUPPRESS_DUPLICATE_DETECTION: &str = "MSCRM.SuppressDuplicateDetection";
    pub const BYPASS_CUSTOM_PLUGIN_EXECUTION: &str = "MSCRM.BypassCustomPluginExecution";
    pub const MERGE_LABELS: &str = "MSCRM.MergeLabels";
    pub const TRANSFER_MODE: &str = "x-ms-transfer-mode";
    pub const CHUNK_SIZE: &str = "x-ms-chunk-size";
    pub const FILE_NAME: &str = "x-ms-file-name";
    pub const FILE_SIZE: &str = "x-ms-file-size";
}

pub mod content_types {
    pub const JSON: &str = "application/json";
    pub const JSON_UTF8: &str = "application/json; charset=utf-8";
    pub const XML: &str = "application/xml";
    pub const OCTET_STREAM: &str = "application/octet-stream";
    pub const HTTP: &str = "application/http";
    pub const TEXT_PLAIN: &str = "text/plain";
}

/// Annotation names recognised in `Prefer: odata.include-annotations` and in responses
pub mod annotations {
    pub const FORMATTED_VALUE: &str = "OData.Community.Display.V1.FormattedValue";
    pub const ASSOCIATED_NAVIGATION_PROPERTY: &str =
        "Microsoft.Dynamics.CRM.associatednavigationproperty";
    pub const LOOKUP_LOGICAL_NAME: &str = "Microsoft.Dynamics.CRM.lookuplogicalname";
    pub const FETCHXML_PAGING_COOKIE: &str = "Microsoft.Dynamics.CRM.fetchxmlpagingcookie";
    pub const MORE_RECORDS: &str = "Microsoft.Dynamics.CRM.morerecords";
    pub const ALL: &str = "*";
}
