mod cameras;
mod config;
mod errors;
mod imaging;
mod models;
mod retention;
mod routes;
mod scanner;
mod sessions;
mod settings;
mod ws;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use crate::cameras::CameraRegistry;
use crate::config::Config;
use crate::routes::{camera as camera_routes, health, images as image_routes, pdf as pdf_routes, scanner as scanner_routes, settings as settings_routes};
use crate::routes::health::ShutdownHandle;
use crate::scanner::ScanRegistry;
use crate::sessions::SessionStore;
use crate::settings::SettingsStore;
use actix_web::middleware::Logger;
use actix_web::http::header;
use actix_web::web::Data;
use env_logger::Env;
use parking_lot::Mutex;
use ws::server::ScanHub;
use actix::Actor;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Init logger to show info by default, but can be overridden by RUST_LOG
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cfg = Config::from_env_config()?;

    let store = Data::new(SessionStore::new(cfg.temp_images_dir()));
    let scans = Data::new(Mutex::new(ScanRegistry::new()));
    let cams = Data::new(Mutex::new(CameraRegistry::new()));
    let settings = Data::new(SettingsStore::new(cfg.settings_file()));
    let shutdown = Data::new(ShutdownHandle::default());
    let hub = ScanHub::new().start();
    let server_shutdown = shutdown.clone();

    spawn_session_sweep(store.clone().into_inner(), &cfg);
    log::info!("Starting server at {}", cfg.listen);

    let listen_addr = cfg.listen.clone();
    let app_cfg = cfg.clone();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(cors())
            .app_data(Data::new(app_cfg.clone()))
            .app_data(store.clone())
            .app_data(scans.clone())
            .app_data(cams.clone())
            .app_data(settings.clone())
            .app_data(shutdown.clone())
            .app_data(Data::new(hub.clone()))
            .route("/health", web::get().to(health::health_check))
            .service(
                web::scope("/api")
                    .route("/shutdown", web::post().to(health::shutdown))
                    .service(web::scope("/images")
                        .route("/store-temp", web::post().to(image_routes::store_temp))
                        .route("/process-image", web::post().to(image_routes::process_image))
                        .route("/thumbnail/{session_id}/{image_id}", web::get().to(image_routes::thumbnail))
                        .route("/set-pdf-name", web::post().to(image_routes::set_pdf_name))
                        .route("/session-info/{session_id}", web::get().to(image_routes::session_info))
                        .route("/cleanup-session/{session_id}", web::delete().to(image_routes::cleanup_session))
                        .route("/cleanup-old-sessions", web::post().to(image_routes::cleanup_old_sessions))
                    )
                    .service(web::scope("/pdf")
                        .route("/generate", web::post().to(pdf_routes::generate))
                        .route("/save-generated", web::post().to(pdf_routes::save_generated))
                        .route("/download/{filename}", web::get().to(pdf_routes::download))
                        .route("/recent", web::get().to(pdf_routes::recent))
                        .route("/templates", web::get().to(pdf_routes::templates))
                        .route("/status", web::get().to(pdf_routes::status))
                    )
                    .service(web::scope("/scanner")
                        .route("/start-session", web::post().to(scanner_routes::start_session))
                        .route("/session/{id}", web::get().to(scanner_routes::get_session))
                        .route("/session/{id}", web::delete().to(scanner_routes::delete_session))
                        .route("/current-session", web::get().to(scanner_routes::current_session))
                        .route("/capture-spread", web::post().to(scanner_routes::capture_spread))
                        .route("/retake-spread/{index}", web::put().to(scanner_routes::retake_spread))
                        .route("/spreads", web::get().to(scanner_routes::spreads))
                        .route("/end-session", web::post().to(scanner_routes::end_session))
                        .route("/sessions", web::get().to(scanner_routes::list_sessions))
                    )
                    .service(web::scope("/camera")
                        .route("/configure", web::post().to(camera_routes::configure))
                        .route("/start/{side}", web::post().to(camera_routes::start))
                        .route("/stop/{side}", web::post().to(camera_routes::stop))
                        .route("/status", web::get().to(camera_routes::status))
                    )
                    .service(web::scope("/settings")
                        .route("", web::get().to(settings_routes::get_settings))
                        .route("", web::post().to(settings_routes::update_settings))
                        .route("/reset", web::post().to(settings_routes::reset_settings))
                        .route("/sync", web::get().to(settings_routes::sync_info))
                    )
            )
            .service(
                web::scope("/ws")
                    .route("/camera-stream", web::get().to(ws::session::camera_stream_route))
                    .route("/scanner-updates", web::get().to(ws::session::scanner_updates_route))
            )
    })
    .bind(listen_addr)?
    .run();

    server_shutdown.set(server.handle());
    server.await?;
    log::info!("server stopped");
    Ok(())
}

/// The scanner UI is served from other hosts on the LAN, so any origin may call in.
fn cors() -> Cors {
    Cors::permissive()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
        .max_age(3600)
}

/// Periodically drops image sessions older than the configured age.
fn spawn_session_sweep(store: std::sync::Arc<SessionStore>, cfg: &Config) {
    let max_age = cfg.session_max_age();
    let every = cfg.session_sweep_interval();
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(every);
        loop {
            interval.tick().await;
            let store = store.clone();
            if let Err(e) = web::block(move || store.sweep_expired(max_age)).await {
                log::error!("expired session sweep failed: {e}");
            }
        }
    });
}
