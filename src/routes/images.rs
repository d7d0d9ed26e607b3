use crate::config::Config;
use crate::errors::{ApiError, SessionError};
use crate::imaging::{self, ThumbnailSpec, TrimMargins};
use crate::models::session::ImageUpdate;
use crate::routes::{field_filename, optional_json, read_field, read_text_field};
use crate::sessions::SessionStore;
use actix_files::NamedFile;
use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures_util::TryStreamExt as _;
use sanitize_filename::sanitize;
use serde::Deserialize;
use std::path::Path;

const DEFAULT_IMAGE_EXT: &str = "jpg";

/// Ids may arrive as JSON strings or numbers.
fn meta_id(meta: &serde_json::Value, key: &str) -> Option<String> {
    match meta.get(key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Lowercased extension of the uploaded filename, or jpg.
fn upload_ext(filename: Option<&str>) -> String {
    filename
        .map(sanitize)
        .as_deref()
        .and_then(|f| Path::new(f).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_IMAGE_EXT.to_string())
}

pub async fn store_temp(
    cfg: web::Data<Config>,
    store: web::Data<SessionStore>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut image: Option<(Option<String>, Vec<u8>)> = None;
    let mut metadata: Option<String> = None;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|_| ApiError::BadRequest("invalid multipart".into()))?
    {
        match field.name().unwrap_or("") {
            "image" => {
                let filename = field_filename(&field);
                let data = read_field(&mut field, cfg.max_upload_size).await?;
                image = Some((filename, data));
            }
            "metadata" => metadata = Some(read_text_field(&mut field, cfg.max_upload_size).await?),
            _ => {}
        }
    }

    let (filename, data) = image.ok_or(ApiError::BadRequest("missing image".into()))?;
    let metadata = metadata.ok_or(ApiError::BadRequest("missing metadata".into()))?;
    let meta: serde_json::Value = serde_json::from_str(&metadata)
        .map_err(|e| ApiError::BadRequest(format!("invalid metadata: {e}")))?;
    let (session_id, image_id) = match (meta_id(&meta, "sessionId"), meta_id(&meta, "id")) {
        (Some(s), Some(i)) => (s, i),
        _ => return Err(ApiError::BadRequest("Missing session ID or image ID".into())),
    };

    let path = store.image_path(&session_id, &image_id, &upload_ext(filename.as_deref()))?;
    store.create_or_get(&session_id)?;
    std::fs::create_dir_all(store.session_dir(&session_id)?)?;
    std::fs::write(&path, &data)?;
    store.add_image(&session_id, &image_id, path.clone(), meta)?;
    log::info!("stored image {image_id} ({} bytes) in session {session_id}", data.len());

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "path": path,
        "image_id": image_id,
        "session_id": session_id,
    })))
}

#[derive(Deserialize)]
pub struct ProcessQuery {
    pub session_id: String,
    pub image_id: String,
    #[serde(default = "default_enhance")]
    pub enhance: bool,
}

fn default_enhance() -> bool {
    true
}

/// Ids and the enhance flag come from the query string; trim margins, when
/// wanted, are the JSON body. An empty body or all-zero margins mean no trim.
pub async fn process_image(
    cfg: web::Data<Config>,
    store: web::Data<SessionStore>,
    q: web::Query<ProcessQuery>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let ProcessQuery { session_id, image_id, enhance } = q.into_inner();
    let margins = optional_json::<TrimMargins>(&body)?.filter(|m| !m.is_zero());
    let image = store.find_image(&session_id, &image_id)?;
    let spec = ThumbnailSpec {
        max_width: cfg.thumbnail_max_width,
        max_height: cfg.thumbnail_max_height,
        quality: cfg.thumbnail_quality,
    };

    let source = image.path.clone();
    let result = web::block(move || imaging::process(&source, margins.as_ref(), enhance, spec)).await?;

    let processed_path = result.processed_path(&image.path).to_path_buf();
    let thumbnail_path = result.thumbnail.is_applied().then(|| result.thumbnail.path().to_path_buf());
    let update = ImageUpdate {
        processed_path: Some(processed_path.clone()),
        thumbnail_path: Some(thumbnail_path.clone()),
        trim_applied: Some(result.trim.as_ref().is_some_and(|o| o.is_applied())),
        enhanced: Some(result.enhance.as_ref().is_some_and(|o| o.is_applied())),
    };
    store.update_image(&session_id, &image_id, update)?;
    log::info!("processed image {image_id} in session {session_id}");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "image_id": image_id,
        "processed_path": processed_path,
        "thumbnail_path": thumbnail_path,
        "stages": result,
    })))
}

pub async fn thumbnail(
    store: web::Data<SessionStore>,
    path: web::Path<(String, String)>,
) -> Result<NamedFile, ApiError> {
    let (session_id, image_id) = path.into_inner();
    let image = store.find_image(&session_id, &image_id)?;
    let thumb = image
        .thumbnail_path
        .filter(|p| p.is_file())
        .ok_or_else(|| ApiError::NotFound("Thumbnail not found".into()))?;
    Ok(NamedFile::open_async(thumb).await?.use_last_modified(true))
}

#[derive(Deserialize)]
pub struct PdfNameQuery {
    pub session_id: String,
    pub pdf_name: String,
}

pub async fn set_pdf_name(
    store: web::Data<SessionStore>,
    q: web::Query<PdfNameQuery>,
) -> Result<HttpResponse, ApiError> {
    store.set_pdf_name(&q.session_id, &q.pdf_name)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "session_id": q.session_id,
        "pdf_name": q.pdf_name,
    })))
}

pub async fn session_info(
    store: web::Data<SessionStore>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    let session = store
        .get(&session_id)
        .ok_or(SessionError::SessionNotFound(session_id))?;
    let images: Vec<serde_json::Value> = session
        .images
        .iter()
        .map(|img| {
            serde_json::json!({
                "id": img.id,
                "metadata": img.metadata,
                "processed": img.processed_path.is_some(),
                "has_thumbnail": img.thumbnail_path.is_some(),
            })
        })
        .collect();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "session_id": session.id,
        "created": session.created,
        "pdf_name": session.pdf_name,
        "image_count": images.len(),
        "images": images,
    })))
}

pub async fn cleanup_session(
    store: web::Data<SessionStore>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    let store = store.into_inner();
    let id = session_id.clone();
    web::block(move || store.delete(&id)).await??;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "session_id": session_id })))
}

pub async fn cleanup_old_sessions(
    cfg: web::Data<Config>,
    store: web::Data<SessionStore>,
) -> Result<HttpResponse, ApiError> {
    let max_age = cfg.session_max_age();
    let store = store.into_inner();
    let cleaned = web::block(move || store.sweep_expired(max_age)).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "cleaned_sessions": cleaned })))
}
