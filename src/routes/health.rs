use crate::config::Config;
use crate::errors::ApiError;
use crate::sessions::SessionStore;
use crate::ws::server::{ConnectionCount, ScanHub};
use actix::Addr;
use actix_web::dev::ServerHandle;
use actix_web::{HttpResponse, web};
use parking_lot::Mutex;
use std::time::Duration;

pub async fn health_check(
    store: web::Data<SessionStore>,
    hub: web::Data<Addr<ScanHub>>,
) -> Result<HttpResponse, ApiError> {
    let connections = hub.send(ConnectionCount).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "message": "Booklet Scanner API is running",
        "version": env!("CARGO_PKG_VERSION"),
        "image_sessions": store.len(),
        "websocket_connections": connections,
    })))
}

/// Filled in once the server is running so the shutdown route can stop it.
#[derive(Default)]
pub struct ShutdownHandle {
    handle: Mutex<Option<ServerHandle>>,
}

impl ShutdownHandle {
    pub fn set(&self, handle: ServerHandle) {
        *self.handle.lock() = Some(handle);
    }

    /// Stops the server gracefully after `delay`, letting the current
    /// response go out first. Returns false when no server is registered.
    pub fn trigger(&self, delay: Duration) -> bool {
        let Some(handle) = self.handle.lock().clone() else {
            return false;
        };
        actix_web::rt::spawn(async move {
            actix_web::rt::time::sleep(delay).await;
            log::info!("shutting down on client request");
            handle.stop(true).await;
        });
        true
    }
}

pub async fn shutdown(cfg: web::Data<Config>, shutdown: web::Data<ShutdownHandle>) -> HttpResponse {
    if !shutdown.trigger(Duration::from_millis(cfg.shutdown_delay_ms)) {
        log::warn!("shutdown requested before the server handle was registered");
    }
    HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": "Server shutdown initiated",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix::Actor;
    use actix_web::{App, test};

    #[actix_web::test]
    async fn health_and_shutdown_without_server() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(Config::default()))
                .app_data(web::Data::new(SessionStore::new(tmp.path())))
                .app_data(web::Data::new(ShutdownHandle::default()))
                .app_data(web::Data::new(ScanHub::new().start()))
                .route("/health", web::get().to(health_check))
                .route("/api/shutdown", web::post().to(shutdown)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["image_sessions"], 0);
        assert_eq!(body["websocket_connections"], 0);

        let req = test::TestRequest::post().uri("/api/shutdown").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "success");
    }
}
