use crate::config::Config;
use crate::errors::ApiError;
use crate::retention;
use crate::routes::{field_filename, read_field, read_text_field};
use actix_files::NamedFile;
use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{HttpResponse, web};
use futures_util::TryStreamExt as _;
use sanitize_filename::sanitize;
use serde::{Deserialize, Serialize};

const FORMATS: [&str; 4] = ["A4", "Letter", "Legal", "A3"];
const ORIENTATIONS: [&str; 2] = ["portrait", "landscape"];
const QUALITY_LEVELS: [&str; 4] = ["draft", "standard", "high", "archive"];

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PdfOptions {
    pub format: String,
    pub orientation: String,
    pub quality: String,
    #[serde(alias = "includeMetadata")]
    pub include_metadata: bool,
    pub filename: String,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            format: "A4".into(),
            orientation: "portrait".into(),
            quality: "high".into(),
            include_metadata: true,
            filename: "scanned-booklet.pdf".into(),
        }
    }
}

#[derive(Deserialize)]
pub struct GenerateReq {
    #[serde(default)]
    pub spreads: Vec<serde_json::Value>,
    #[serde(default)]
    pub options: PdfOptions,
}

/// Unlisted layout choices are rejected; the filename is sanitised and
/// forced to a .pdf extension.
fn resolve_options(mut options: PdfOptions) -> Result<PdfOptions, ApiError> {
    if !FORMATS.contains(&options.format.as_str()) {
        return Err(ApiError::BadRequest(format!("unsupported format {:?}", options.format)));
    }
    if !ORIENTATIONS.contains(&options.orientation.as_str()) {
        return Err(ApiError::BadRequest(format!("unsupported orientation {:?}", options.orientation)));
    }
    if !QUALITY_LEVELS.contains(&options.quality.as_str()) {
        return Err(ApiError::BadRequest(format!("unsupported quality {:?}", options.quality)));
    }
    options.filename = output_filename(Some(&options.filename));
    Ok(options)
}

/// Sanitised name with a .pdf extension; falls back to a random name.
fn output_filename(requested: Option<&str>) -> String {
    let name = requested.map(sanitize).unwrap_or_default();
    let name = if name.trim().is_empty() || name.starts_with('.') {
        uuid::Uuid::new_v4().to_string()
    } else {
        name
    };
    if name.to_ascii_lowercase().ends_with(".pdf") {
        name
    } else {
        format!("{name}.pdf")
    }
}

/// The PDF itself is assembled client side; this only checks the request and
/// tells the client where the upload will be served from.
pub async fn generate(body: web::Json<GenerateReq>) -> Result<HttpResponse, ApiError> {
    let GenerateReq { spreads, options } = body.into_inner();
    if spreads.is_empty() {
        return Err(ApiError::BadRequest("No spreads provided".into()));
    }
    let options = resolve_options(options)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": "PDF options validated",
        "pdf": {
            "status": "awaiting_upload",
            "filename": options.filename,
            "pages": spreads.len(),
            "download_url": format!("/api/pdf/download/{}", options.filename),
        },
        "options": options,
    })))
}

pub async fn save_generated(cfg: web::Data<Config>, mut payload: Multipart) -> Result<HttpResponse, ApiError> {
    let mut pdf: Option<(Option<String>, Vec<u8>)> = None;
    let mut scan_duration: Option<String> = None;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|_| ApiError::BadRequest("invalid multipart".into()))?
    {
        match field.name().unwrap_or("") {
            "pdf" => {
                let filename = field_filename(&field);
                pdf = Some((filename, read_field(&mut field, cfg.max_upload_size).await?));
            }
            "scan_duration" => scan_duration = Some(read_text_field(&mut field, 64).await?),
            _ => {}
        }
    }
    let (requested, data) = pdf.ok_or(ApiError::BadRequest("missing pdf".into()))?;
    let filename = output_filename(requested.as_deref());

    let dir = cfg.generated_pdfs_dir();
    let keep = cfg.pdf_keep_count;
    let name = filename.clone();
    let (saved, cleaned) = web::block(move || {
        let saved = retention::save_output(&dir, &name, &data, scan_duration.as_deref())?;
        let cleaned = retention::enforce(&dir, keep);
        Ok::<_, std::io::Error>((saved, cleaned))
    })
    .await??;
    log::info!("saved generated pdf {filename} ({} bytes)", saved.size_bytes);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": format!("PDF saved successfully: {filename}"),
        "file_path": saved.path,
        "size_bytes": saved.size_bytes,
        "scan_duration": saved.scan_duration,
        "cleaned_up_old_files": cleaned,
    })))
}

pub async fn download(cfg: web::Data<Config>, path: web::Path<String>) -> Result<NamedFile, ApiError> {
    let filename = path.into_inner();
    if filename.is_empty() || sanitize(&filename) != filename {
        return Err(ApiError::BadRequest(format!("invalid filename {filename:?}")));
    }
    let file = cfg.generated_pdfs_dir().join(&filename);
    if !file.is_file() {
        return Err(ApiError::NotFound(format!("PDF file not found: {filename}")));
    }
    Ok(NamedFile::open_async(file).await?.set_content_disposition(ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(filename)],
    }))
}

#[derive(Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

/// Listing also enforces the window: anything beyond `limit` is deleted.
pub async fn recent(cfg: web::Data<Config>, q: web::Query<RecentQuery>) -> Result<HttpResponse, ApiError> {
    let limit = q.limit.unwrap_or(cfg.pdf_keep_count);
    let dir = cfg.generated_pdfs_dir();
    let listing_dir = dir.clone();
    let (pdfs, cleaned) = web::block(move || retention::list_recent(&listing_dir, limit)).await??;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "total_count": pdfs.len(),
        "pdfs": pdfs,
        "cleaned_up": cleaned,
        "storage_path": dir,
    })))
}

pub async fn templates() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "templates": [
            {
                "name": "Standard Booklet",
                "format": "A4",
                "orientation": "portrait",
                "description": "Standard A4 portrait layout for booklets"
            },
            {
                "name": "Landscape Spread",
                "format": "A4",
                "orientation": "landscape",
                "description": "A4 landscape layout for side-by-side pages"
            },
            {
                "name": "Large Format",
                "format": "A3",
                "orientation": "portrait",
                "description": "A3 portrait for high-quality output"
            }
        ],
        "formats": FORMATS,
        "orientations": ORIENTATIONS,
        "quality_levels": QUALITY_LEVELS,
    }))
}

pub async fn status(cfg: web::Data<Config>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ready",
        "service": "PDF Generator",
        "capabilities": {
            "formats": FORMATS,
            "orientations": ORIENTATIONS,
            "output_formats": ["PDF"],
            "max_file_size_mb": cfg.max_upload_size / (1024 * 1024),
            "keep_count": cfg.pdf_keep_count,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test as atest};

    const BOUNDARY: &str = "XpdfX";

    fn upload_body(filename: &str, bytes: &[u8], duration: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"pdf\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
        ).as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
        if let Some(d) = duration {
            body.extend_from_slice(format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"scan_duration\"\r\n\r\n{d}\r\n"
            ).as_bytes());
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn save_req(filename: &str, duration: Option<&str>) -> atest::TestRequest {
        atest::TestRequest::post()
            .uri("/api/pdf/save-generated")
            .insert_header(("content-type", format!("multipart/form-data; boundary={BOUNDARY}")))
            .set_payload(upload_body(filename, b"%PDF-1.4 test", duration))
    }

    #[test]
    fn filenames_are_sanitised() {
        assert_eq!(output_filename(Some("book.pdf")), "book.pdf");
        assert_eq!(output_filename(Some("book")), "book.pdf");
        let escaped = output_filename(Some("../../etc/passwd"));
        assert!(!escaped.contains('/') && !escaped.starts_with('.'));
        assert!(escaped.ends_with(".pdf"));
        assert!(output_filename(None).ends_with(".pdf"));
        assert!(output_filename(Some("")).len() > ".pdf".len());
    }

    #[test]
    fn options_are_validated() {
        let resolved = resolve_options(PdfOptions::default()).unwrap();
        assert_eq!(resolved, PdfOptions::default());

        let bad = PdfOptions { format: "B5".into(), ..PdfOptions::default() };
        assert!(matches!(resolve_options(bad), Err(ApiError::BadRequest(_))));
    }

    #[actix_web::test]
    async fn save_then_list_and_download() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config {
            storage_dir: tmp.path().to_string_lossy().into_owned(),
            pdf_keep_count: 2,
            ..Config::default()
        };
        let app = atest::init_service(
            App::new().app_data(web::Data::new(cfg.clone())).service(
                web::scope("/api/pdf")
                    .route("/generate", web::post().to(generate))
                    .route("/save-generated", web::post().to(save_generated))
                    .route("/download/{filename}", web::get().to(download))
                    .route("/recent", web::get().to(recent)),
            ),
        )
        .await;

        for (i, name) in ["one.pdf", "two.pdf", "three.pdf"].iter().enumerate() {
            let duration = (i == 2).then_some("125.5");
            let resp = atest::call_service(&app, save_req(name, duration).to_request()).await;
            assert_eq!(resp.status(), StatusCode::OK);
            std::thread::sleep(std::time::Duration::from_millis(25));
        }
        let dir = cfg.generated_pdfs_dir();
        assert!(!dir.join("one.pdf").exists());
        assert!(dir.join("three.json").exists());

        let req = atest::TestRequest::get().uri("/api/pdf/recent").to_request();
        let body: serde_json::Value = atest::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total_count"], 2);
        assert_eq!(body["pdfs"][0]["filename"], "three.pdf");
        assert_eq!(body["pdfs"][0]["scan_duration"], 125.5);

        let req = atest::TestRequest::get().uri("/api/pdf/download/three.pdf").to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let disposition = resp.headers().get("content-disposition").unwrap().to_str().unwrap();
        assert!(disposition.starts_with("attachment"));

        let req = atest::TestRequest::get().uri("/api/pdf/download/one.pdf").to_request();
        assert_eq!(atest::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = atest::TestRequest::post()
            .uri("/api/pdf/generate")
            .set_json(serde_json::json!({"spreads": []}))
            .to_request();
        assert_eq!(atest::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = atest::TestRequest::post()
            .uri("/api/pdf/generate")
            .set_json(serde_json::json!({"spreads": [{}, {}], "options": {"includeMetadata": false}}))
            .to_request();
        let body: serde_json::Value = atest::call_and_read_body_json(&app, req).await;
        assert_eq!(body["pdf"]["pages"], 2);
        assert_eq!(body["options"]["include_metadata"], false);
        assert_eq!(body["options"]["filename"], "scanned-booklet.pdf");
    }
}
