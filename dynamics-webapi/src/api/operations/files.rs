//! File and image column transfer in chunks

use log::debug;
use reqwest::Method;

use super::{continuation, require_key};
use crate::api::client::WebApiClient;
use crate::api::constants::DOWNLOAD_CHUNK_SIZE;
use crate::api::context::ParseParams;
use crate::api::error::{Result, WebApiError};
use crate::api::request::{RequestData, WebApiRequest};
use crate::api::response::ResponseValue;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadedFile {
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub data: Vec<u8>,
}

fn file_request(request: WebApiRequest, function: &str, field: &str) -> Result<WebApiRequest> {
    let mut request = request.with_function(function);
    require_key(&request)?;
    if field.is_empty() {
        return Err(WebApiError::parameter(request.function_label(), "request.fieldName", "String"));
    }
    request.navigation_property = Some(field.to_string());
    Ok(request)
}

impl WebApiClient {
    /// Upload `data` into a file column of the record named by `request`
    ///
    /// Opens an upload session, then sends the content in chunks of the
    /// size the server asks for.
    pub async fn upload_file(&self, request: WebApiRequest, field: &str, file_name: &str, data: &[u8]) -> Result<()> {
        let mut session = file_request(request, "uploadFile", field)?.method(Method::PATCH);
        session.transfer_mode = Some("chunked".to_string());
        session.file_name = Some(file_name.to_string());

        let chunk_template = session.clone();
        let (location, chunk_size) = match self.make_request(session, ParseParams::default()).await? {
            ResponseValue::Location { location, chunk_size } => (location, chunk_size),
            other => {
                return Err(WebApiError::Parse(format!(
                    "upload session response has no Location header: {:?}",
                    other
                )));
            }
        };

        let chunk_size = chunk_size.filter(|size| *size > 0).unwrap_or(DOWNLOAD_CHUNK_SIZE) as usize;
        let total = data.len();
        debug!("Uploading {} bytes in chunks of {}", total, chunk_size);

        for (index, chunk) in data.chunks(chunk_size).enumerate() {
            let start = index * chunk_size;
            let mut part = continuation(&chunk_template, location.clone()).method(Method::PATCH);
            part.content_range = Some(format!("bytes {}-{}/{}", start, start + chunk.len() - 1, total));
            part.data = Some(RequestData::Binary(chunk.to_vec()));

            self.make_request(part, ParseParams::default()).await?;
        }

        Ok(())
    }

    /// Download a file column in 4 MiB ranges
    pub async fn download_file(&self, request: WebApiRequest, field: &str) -> Result<DownloadedFile> {
        let template = file_request(request, "downloadFile", field)?.method(Method::GET);
        let mut file = DownloadedFile::default();
        let mut offset: u64 = 0;

        loop {
            let mut chunk = template.clone();
            chunk.download_size = Some("full".to_string());
            chunk.range = Some(format!("bytes={}-{}", offset, offset + DOWNLOAD_CHUNK_SIZE - 1));

            let response = match self.make_request(chunk, ParseParams::default()).await? {
                ResponseValue::File(response) => response,
                ResponseValue::Empty => break,
                other => {
                    return Err(WebApiError::Parse(format!("expected file content, got {:?}", other)));
                }
            };

            let received = response.data.len() as u64;
            offset += received;
            file.data.extend(response.data);
            file.file_name = response.file_name.or(file.file_name);
            file.file_size = response.file_size.or(file.file_size);

            if received == 0 || offset >= file.file_size.unwrap_or(0) {
                break;
            }
        }

        Ok(file)
    }
}
