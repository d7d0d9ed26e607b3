pub mod camera;
pub mod health;
pub mod images;
pub mod pdf;
pub mod scanner;
pub mod settings;

use crate::errors::ApiError;
use futures_util::TryStreamExt as _;
use serde::de::DeserializeOwned;

/// Drains one multipart field into memory, refusing anything over `limit` bytes.
pub(crate) async fn read_field(field: &mut actix_multipart::Field, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|_| ApiError::BadRequest("upload read error".into()))?
    {
        buf.extend_from_slice(&chunk);
        if buf.len() > limit {
            return Err(ApiError::BadRequest("file too large".into()));
        }
    }
    Ok(buf)
}

pub(crate) async fn read_text_field(field: &mut actix_multipart::Field, limit: usize) -> Result<String, ApiError> {
    let raw = read_field(field, limit).await?;
    String::from_utf8(raw).map_err(|_| ApiError::BadRequest("form field is not valid UTF-8".into()))
}

/// Filename from the part's content disposition, if the client sent one.
pub(crate) fn field_filename(field: &actix_multipart::Field) -> Option<String> {
    field
        .content_disposition()
        .and_then(|cd| cd.get_filename())
        .map(str::to_string)
}

/// Parses an optional JSON body. An empty body is `None`; anything else must
/// deserialize or the request is rejected.
pub(crate) fn optional_json<T: DeserializeOwned>(body: &[u8]) -> Result<Option<T>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}
