use std::env;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use realeyez::cache::PredictionCache;
use realeyez::config::AppConfig;
use realeyez::inference::{self, InferencePipeline, InferenceService};
use realeyez::routes::configure_routes;
use realeyez::storage::UploadStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::load().map_err(|e| {
        log::error!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {e}"))
    })?;

    let artifact = inference::load_with(&config.model).map_err(|e| {
        log::error!("Failed to load model at startup: {}", e);
        std::io::Error::other(format!("Model loading failed: {e}"))
    })?;

    let pipeline = InferencePipeline::new(artifact).with_preprocessing(config.preprocessing.clone());
    let cache = PredictionCache::new(config.server.cache_capacity);
    let service = InferenceService::new(pipeline, cache, config.server.timeout());
    let uploads = UploadStore::new(
        config.server.media_dir.clone(),
        config.server.max_upload_bytes,
        config.server.persist_uploads,
    );

    if uploads.persist_enabled() {
        std::fs::create_dir_all(uploads.media_dir())?;
        log::info!("Persisting uploads to {}", uploads.media_dir().display());
    }
    if !service.cache().is_enabled() {
        log::info!("Prediction cache disabled");
    }

    let media_dir = config.server.media_dir.clone();
    let bind_address = config.server.bind_address();
    log::info!("Starting server on {}", bind_address);

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .app_data(web::Data::new(service.clone()))
            .app_data(web::Data::new(uploads.clone()))
            .configure(|cfg| configure_routes(cfg, media_dir.clone()))
    });
    if let Some(workers) = config.server.workers {
        server = server.workers(workers);
    }

    server.bind(&bind_address)?.run().await
}
