use crate::errors::ApiError;
use crate::models::settings::Settings;
use crate::settings::SettingsStore;
use actix_web::{HttpResponse, web};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct UpdateSettingsReq {
    pub settings: Settings,
}

fn settings_resp(settings: &Settings, message: &str) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "settings": settings,
        "success": true,
        "message": message,
    }))
}

pub async fn get_settings(store: web::Data<SettingsStore>) -> HttpResponse {
    settings_resp(&store.load(), "Settings retrieved successfully")
}

pub async fn update_settings(
    store: web::Data<SettingsStore>,
    body: web::Json<UpdateSettingsReq>,
) -> Result<HttpResponse, ApiError> {
    let saved = store.save(body.into_inner().settings)?;
    log::info!("settings updated");
    Ok(settings_resp(&saved, "Settings updated successfully"))
}

pub async fn reset_settings(store: web::Data<SettingsStore>) -> Result<HttpResponse, ApiError> {
    let saved = store.reset()?;
    log::info!("settings reset to defaults");
    Ok(settings_resp(&saved, "Settings reset to defaults successfully"))
}

pub async fn sync_info(store: web::Data<SettingsStore>) -> HttpResponse {
    HttpResponse::Ok().json(store.sync_info())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};

    #[actix_web::test]
    async fn update_and_reset() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(SettingsStore::new(tmp.path().join("global_settings.json"))))
                .service(
                    web::scope("/api/settings")
                        .route("", web::get().to(get_settings))
                        .route("", web::post().to(update_settings))
                        .route("/reset", web::post().to(reset_settings))
                        .route("/sync", web::get().to(sync_info)),
                ),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/settings")
            .set_json(serde_json::json!({"settings": {"mainPages": 40, "leftCameraRotate": 180}}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["settings"]["mainPages"], 40);
        assert!(body["settings"]["lastModified"].is_string());

        let req = test::TestRequest::get().uri("/api/settings").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["settings"]["leftCameraRotate"], 180);

        let req = test::TestRequest::post().uri("/api/settings/reset").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["settings"]["mainPages"], 32);

        let req = test::TestRequest::get().uri("/api/settings/sync").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["available"], true);
        assert_eq!(body["version"], "1.0.0");
    }
}
