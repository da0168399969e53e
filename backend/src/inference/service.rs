use std::sync::Arc;
use std::time::Duration;

use actix_web::web;
use log::{debug, info};

use super::error::InferenceError;
use super::pipeline::{Classification, InferencePipeline};
use crate::cache::PredictionCache;
use crate::storage::UploadStore;

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub image_hash: String,
    pub classification: Classification,
    pub cached: bool,
}

/// Request-facing wrapper around the pipeline: caches results by content hash
/// and runs the synchronous work on the blocking pool under a deadline.
#[derive(Clone)]
pub struct InferenceService {
    pipeline: InferencePipeline,
    cache: PredictionCache,
    timeout: Duration,
}

impl InferenceService {
    pub fn new(pipeline: InferencePipeline, cache: PredictionCache, timeout: Duration) -> Self {
        Self {
            pipeline,
            cache,
            timeout,
        }
    }

    pub fn pipeline(&self) -> &InferencePipeline {
        &self.pipeline
    }

    pub fn cache(&self) -> &PredictionCache {
        &self.cache
    }

    pub async fn classify(
        &self,
        file_name: Option<String>,
        image_data: Arc<[u8]>,
    ) -> Result<Outcome, InferenceError> {
        let image_hash = UploadStore::calculate_image_hash(&image_data);

        if let Some(entry) = self.cache.get(&image_hash).await {
            return Ok(Outcome {
                image_hash,
                classification: entry.classification(),
                cached: true,
            });
        }

        let pipeline = self.pipeline.clone();
        let task = web::block(move || pipeline.classify(&image_data));
        // A timed-out task keeps running on the blocking pool; only the caller gives up.
        let classification = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => return Err(InferenceError::Timeout(self.timeout)),
            Ok(Err(blocking)) => {
                return Err(InferenceError::Model(format!(
                    "inference worker failed: {blocking}"
                )));
            }
            Ok(Ok(result)) => result?,
        };

        info!(
            "Classified {} as {}",
            file_name.as_deref().unwrap_or(&image_hash),
            classification.result
        );
        debug!("Raw score for {}: {}", image_hash, classification.score);

        self.cache
            .insert(image_hash.clone(), file_name, classification)
            .await;

        Ok(Outcome {
            image_hash,
            classification,
            cached: false,
        })
    }
}
