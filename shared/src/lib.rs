use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Verdict of the real-vs-generated classifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum Label {
    #[serde(rename = "Real")]
    #[strum(serialize = "Real")]
    Real,
    #[serde(rename = "AI-Generated")]
    #[strum(serialize = "AI-Generated")]
    AiGenerated,
}

/// A label together with the probability mass supporting it, as a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub label: Label,
    pub confidence_percent: f32,
}

impl fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2}%)", self.label, self.confidence_percent)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InferenceResponse {
    pub id: Uuid,
    pub file_name: Option<String>,
    pub image_hash: Option<String>,
    /// Raw sigmoid output of the model.
    pub score: Option<f32>,
    pub result: Option<PredictionResult>,
    pub display: Option<String>,
    pub image_url: Option<String>,
    pub cached: bool,
    pub error: Option<String>,
}

impl InferenceResponse {
    pub fn success(
        file_name: Option<String>,
        image_hash: String,
        score: f32,
        result: PredictionResult,
        cached: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name,
            image_hash: Some(image_hash),
            score: Some(score),
            result: Some(result),
            display: Some(result.to_string()),
            image_url: None,
            cached,
            error: None,
        }
    }

    pub fn failure(file_name: Option<String>, error: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name,
            image_hash: None,
            score: None,
            result: None,
            display: None,
            image_url: None,
            cached: false,
            error: Some(error),
        }
    }

    pub fn with_image_url(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Description of the loaded model artifact.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSummary {
    pub format: String,
    pub path: String,
    pub input_width: u32,
    pub input_height: u32,
    pub channels: u32,
    pub layout: String,
    pub apply_sigmoid: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_display_matches_rendering_format() {
        let result = PredictionResult {
            label: Label::AiGenerated,
            confidence_percent: 80.0,
        };
        assert_eq!(result.to_string(), "AI-Generated (80.00%)");

        let result = PredictionResult {
            label: Label::Real,
            confidence_percent: 73.456,
        };
        assert_eq!(result.to_string(), "Real (73.46%)");
    }

    #[test]
    fn test_label_wire_names() {
        assert_eq!(serde_json::to_string(&Label::Real).unwrap(), "\"Real\"");
        assert_eq!(
            serde_json::to_string(&Label::AiGenerated).unwrap(),
            "\"AI-Generated\""
        );
        assert_eq!(Label::from_str("AI-Generated").unwrap(), Label::AiGenerated);
        assert_eq!(Label::Real.as_ref(), "Real");
    }

    #[test]
    fn test_prediction_result_uses_camel_case() {
        let result = PredictionResult {
            label: Label::Real,
            confidence_percent: 70.0,
        };
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json["label"], "Real");
        assert_eq!(json["confidencePercent"], 70.0);
    }

    #[test]
    fn test_failure_response_has_no_result() {
        let response = InferenceResponse::failure(Some("x.png".into()), "bad".into());
        assert!(!response.is_success());
        assert!(response.result.is_none());
        assert!(response.display.is_none());
    }
}
