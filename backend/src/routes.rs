use std::path::PathBuf;
use std::sync::Arc;

use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use serde::Serialize;
use serde_json::json;
use shared::InferenceResponse;

use crate::cache::CacheError;
use crate::inference::InferenceService;
use crate::storage::{MEDIA_URL, StorageError, UploadStore};

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, media_dir: PathBuf) {
    cfg.service(web::resource("/api/inference").route(web::post().to(handle_inference)))
        .service(web::resource("/api/health").route(web::get().to(health)))
        .service(web::resource("/api/model").route(web::get().to(model_info)))
        .service(web::resource("/api/history").route(web::get().to(history)))
        .service(web::resource("/api/cache").route(web::delete().to(clear_cache)))
        .service(web::resource("/api/cache/{image_hash}").route(web::delete().to(remove_cache_entry)))
        .service(Files::new(MEDIA_URL, media_dir));
}

struct Upload {
    file_name: Option<String>,
    mime_type: Option<String>,
    data: Vec<u8>,
    size: usize,
}

async fn read_uploads(payload: &mut Multipart, limit: usize) -> Result<Vec<Upload>, Error> {
    let mut uploads = Vec::new();

    while let Ok(Some(mut field)) = payload.try_next().await {
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);
        // Plain form fields carry no filename and are not uploads.
        if file_name.is_none() {
            while let Some(chunk) = field.next().await {
                chunk?;
            }
            continue;
        }
        let mime_type = field.content_type().map(|mime| mime.essence_str().to_string());

        let mut data = Vec::new();
        let mut size = 0;
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            size += chunk.len();
            // Keep draining an oversized field so the next one can be read.
            if size <= limit {
                data.extend_from_slice(&chunk);
            }
        }
        if size > 0 {
            uploads.push(Upload {
                file_name,
                mime_type,
                data,
                size,
            });
        }
    }

    Ok(uploads)
}

async fn handle_inference(
    service: web::Data<InferenceService>,
    uploads: web::Data<UploadStore>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let files = read_uploads(&mut payload, uploads.max_upload_bytes()).await?;
    if files.is_empty() {
        return Ok(HttpResponse::BadRequest().json(ErrorResponse {
            error: "No image files in request".into(),
        }));
    }

    let mut results = Vec::with_capacity(files.len());
    for file in files {
        if let Err(e) = uploads.validate_image_size(file.size) {
            warn!(
                "Rejected {}: {}",
                file.file_name.as_deref().unwrap_or("upload"),
                e
            );
            results.push(InferenceResponse::failure(file.file_name, e.to_string()));
            continue;
        }

        let data: Arc<[u8]> = file.data.into();
        match service.classify(file.file_name.clone(), data.clone()).await {
            Ok(outcome) => {
                let image_url = if uploads.persist_enabled() {
                    persist_upload(&uploads, &outcome.image_hash, file.mime_type.as_deref(), &data)
                } else {
                    None
                };
                results.push(
                    InferenceResponse::success(
                        file.file_name,
                        outcome.image_hash,
                        outcome.classification.score,
                        outcome.classification.result,
                        outcome.cached,
                    )
                    .with_image_url(image_url),
                );
            }
            Err(e) => {
                let name = file.file_name.as_deref().unwrap_or("upload");
                if e.is_client_error() {
                    warn!("Could not classify {}: {}", name, e);
                } else {
                    error!("Model inference error for {}: {}", name, e);
                }
                results.push(InferenceResponse::failure(file.file_name, e.to_string()));
            }
        }
    }

    Ok(HttpResponse::Ok().json(json!({
        "results": results
    })))
}

fn persist_upload(
    uploads: &UploadStore,
    image_hash: &str,
    mime_type: Option<&str>,
    data: &[u8],
) -> Option<String> {
    match uploads.save(image_hash, mime_type, data) {
        Ok(stored) => Some(stored.url),
        Err(e) => {
            warn!("Failed to store upload {}: {}", image_hash, e);
            None
        }
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

async fn model_info(service: web::Data<InferenceService>) -> HttpResponse {
    HttpResponse::Ok().json(service.pipeline().artifact().summary())
}

async fn history(service: web::Data<InferenceService>) -> HttpResponse {
    HttpResponse::Ok().json(service.cache().history().await)
}

async fn clear_cache(service: web::Data<InferenceService>) -> HttpResponse {
    let cleared = service.cache().clear().await;
    info!("Cleared {} cached predictions", cleared);
    HttpResponse::Ok().json(json!({ "cleared": cleared }))
}

async fn remove_cache_entry(
    service: web::Data<InferenceService>,
    uploads: web::Data<UploadStore>,
    path: web::Path<String>,
) -> HttpResponse {
    let image_hash = path.into_inner();
    match service.cache().remove(&image_hash).await {
        Ok(entry) => {
            if uploads.persist_enabled() {
                match uploads.delete_by_hash(&image_hash) {
                    Ok(_) => {}
                    Err(StorageError::InvalidFormat) => {}
                    Err(e) => warn!("Failed to delete stored upload {}: {}", image_hash, e),
                }
            }
            info!("Removed cached prediction {}", image_hash);
            HttpResponse::Ok().json(entry)
        }
        Err(CacheError::CacheMiss) => HttpResponse::NotFound().json(ErrorResponse {
            error: format!("No cached prediction for {}", image_hash),
        }),
    }
}
