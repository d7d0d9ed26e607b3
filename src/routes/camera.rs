use crate::cameras::{CameraRegistry, ConfigureReq};
use crate::errors::{ApiError, CameraError};
use crate::models::camera::Side;
use actix_web::{HttpResponse, web};
use parking_lot::Mutex;

fn parse_side(raw: &str) -> Result<Side, ApiError> {
    raw.parse().map_err(|e| CameraError::InvalidSide(e).into())
}

pub async fn configure(
    cams: web::Data<Mutex<CameraRegistry>>,
    body: web::Json<ConfigureReq>,
) -> Result<HttpResponse, ApiError> {
    let (side, config) = cams.lock().configure(body.into_inner())?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": format!("{} camera configured", side.title()),
        "config": config,
    })))
}

pub async fn start(
    cams: web::Data<Mutex<CameraRegistry>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let side = parse_side(&path)?;
    let stream_info = cams.lock().start(side)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": format!("{} camera started", side.title()),
        "stream_info": stream_info,
    })))
}

pub async fn stop(
    cams: web::Data<Mutex<CameraRegistry>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let side = parse_side(&path)?;
    cams.lock().stop(side);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": format!("{} camera stopped", side.title()),
    })))
}

pub async fn status(cams: web::Data<Mutex<CameraRegistry>>) -> HttpResponse {
    HttpResponse::Ok().json(cams.lock().status())
}
