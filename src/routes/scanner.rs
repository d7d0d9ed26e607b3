use crate::errors::ApiError;
use crate::routes::optional_json;
use crate::scanner::{ScanRegistry, SpreadInput, StartConfig};
use crate::ws::server::{self, Broadcast, ScanHub};
use actix::Addr;
use actix_web::{HttpResponse, web};
use parking_lot::Mutex;

pub async fn start_session(
    scans: web::Data<Mutex<ScanRegistry>>,
    hub: web::Data<Addr<ScanHub>>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let cfg = optional_json::<StartConfig>(&body)?.unwrap_or_default();
    let session = scans.lock().start(cfg);
    let data = serde_json::to_value(&session).map_err(|e| ApiError::Internal(e.to_string()))?;
    hub.do_send(Broadcast { payload: server::session_update(&data) });
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": "Scanning session started",
        "session": session,
    })))
}

pub async fn get_session(
    scans: web::Data<Mutex<ScanRegistry>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let scans = scans.lock();
    let session = scans.get(&path)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "success", "session": session })))
}

pub async fn current_session(scans: web::Data<Mutex<ScanRegistry>>) -> Result<HttpResponse, ApiError> {
    let scans = scans.lock();
    let session = scans.current()?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "success", "session": session })))
}

pub async fn capture_spread(
    scans: web::Data<Mutex<ScanRegistry>>,
    hub: web::Data<Addr<ScanHub>>,
    body: web::Json<SpreadInput>,
) -> Result<HttpResponse, ApiError> {
    let (spread, total) = scans.lock().capture_spread(body.into_inner())?;
    let data = serde_json::to_value(&spread).map_err(|e| ApiError::Internal(e.to_string()))?;
    hub.do_send(Broadcast { payload: server::spread_update(&data) });
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": format!("Spread {} captured", spread.spread_index + 1),
        "spread": spread,
        "total_spreads": total,
    })))
}

pub async fn retake_spread(
    scans: web::Data<Mutex<ScanRegistry>>,
    path: web::Path<usize>,
    body: web::Json<SpreadInput>,
) -> Result<HttpResponse, ApiError> {
    let index = path.into_inner();
    let spread = scans.lock().retake_spread(index, body.into_inner())?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": format!("Spread {} retaken", index + 1),
        "spread": spread,
    })))
}

pub async fn spreads(scans: web::Data<Mutex<ScanRegistry>>) -> Result<HttpResponse, ApiError> {
    let scans = scans.lock();
    let session = scans.current()?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "session_id": session.session_id,
        "spreads": session.spreads,
        "total_spreads": session.spreads.len(),
        "total_pages": session.total_pages,
    })))
}

pub async fn end_session(scans: web::Data<Mutex<ScanRegistry>>) -> Result<HttpResponse, ApiError> {
    let session = scans.lock().end()?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": "Scanning session completed",
        "session_id": session.session_id,
        "total_spreads": session.spreads.len(),
    })))
}

pub async fn list_sessions(scans: web::Data<Mutex<ScanRegistry>>) -> HttpResponse {
    let scans = scans.lock();
    let sessions = scans.list();
    HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "total_sessions": sessions.len(),
        "sessions": sessions,
        "current_session": scans.current_id(),
    }))
}

pub async fn delete_session(
    scans: web::Data<Mutex<ScanRegistry>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    scans.lock().delete(&session_id)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": format!("Session {session_id} deleted"),
    })))
}
