use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::PredictionResult;

use crate::inference::pipeline::Classification;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionCacheEntry {
    pub image_hash: String,
    pub file_name: Option<String>,
    pub score: f32,
    pub result: PredictionResult,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u32,
    #[serde(skip)]
    pub(crate) sequence: u64,
    #[serde(skip)]
    pub(crate) last_access_tick: u64,
}

impl PredictionCacheEntry {
    pub fn new(image_hash: String, file_name: Option<String>, classification: Classification) -> Self {
        let now = Utc::now();
        Self {
            image_hash,
            file_name,
            score: classification.score,
            result: classification.result,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            sequence: 0,
            last_access_tick: 0,
        }
    }

    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
        self.access_count += 1;
    }

    pub fn classification(&self) -> Classification {
        Classification {
            score: self.score,
            result: self.result,
        }
    }
}
