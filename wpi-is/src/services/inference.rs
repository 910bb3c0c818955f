//! Inference port
//!
//! Model execution and face detection run in an external inference service.
//! The inspection orchestrator only sees the [`InferenceEngine`] trait; the
//! HTTP adapter below talks to the service, tests plug in a stub.
//!
//! Wire contract of the HTTP adapter: `POST {endpoint}/predict` with a
//! multipart body (`file`, `model_path`, `model_type`, `confidence_threshold`,
//! `blur_faces`), answered by a JSON [`PredictResponse`].

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use wpi_common::domain::{ItemCounts, ModelType};

/// Inference port errors
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("No inference endpoint configured")]
    NotConfigured,

    /// Network failure, timeout or server-side error
    #[error("Inference service unreachable: {0}")]
    Unreachable(String),

    /// The service answered with data we cannot interpret
    #[error("Invalid inference response: {0}")]
    InvalidResponse(String),

    /// The service refused the request (unreadable image, unknown model)
    #[error("Inference request rejected: {0}")]
    Rejected(String),
}

/// Model file to run
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRef {
    /// Absolute path of the model file
    pub path: PathBuf,
    pub model_type: ModelType,
}

#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub image: Vec<u8>,
    pub file_name: String,
    /// `None`: the service's default model
    pub model: Option<ModelRef>,
    /// Minimum detection confidence (0–1)
    pub confidence_threshold: f64,
    pub blur_faces: bool,
}

/// Raw model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Prediction {
    /// Whole-frame label, matched against the category table by the caller
    Classification {
        #[serde(default)]
        class_id: Option<String>,
        label: String,
        confidence: f64,
    },
    /// Per-item object counts; items with zero count are missing
    Detection {
        counts: ItemCounts,
        confidence: f64,
    },
}

impl Prediction {
    pub fn confidence(&self) -> f64 {
        match self {
            Prediction::Classification { confidence, .. } | Prediction::Detection { confidence, .. } => {
                *confidence
            }
        }
    }
}

/// JSON body returned by the inference service
#[derive(Debug, Clone, Deserialize)]
pub struct PredictResponse {
    #[serde(default)]
    pub faces_detected: u32,
    /// Processed (blurred) image, base64 encoded
    #[serde(default)]
    pub image_base64: Option<String>,
    pub prediction: Prediction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutcome {
    pub faces_detected: u32,
    /// Processed image; `None` means the input image is unchanged
    pub processed_image: Option<Vec<u8>>,
    pub prediction: Prediction,
}

impl TryFrom<PredictResponse> for InferenceOutcome {
    type Error = InferenceError;

    fn try_from(response: PredictResponse) -> Result<Self, Self::Error> {
        let confidence = response.prediction.confidence();
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(InferenceError::InvalidResponse(format!(
                "confidence {} outside 0-1",
                confidence
            )));
        }

        let processed_image = response
            .image_base64
            .map(|encoded| {
                base64::engine::general_purpose::STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|e| InferenceError::InvalidResponse(format!("image_base64: {}", e)))
            })
            .transpose()?;

        Ok(InferenceOutcome {
            faces_detected: response.faces_detected,
            processed_image,
            prediction: response.prediction,
        })
    }
}

/// Port to the model runtime
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Short name for logs and the health endpoint
    fn name(&self) -> &'static str;

    /// Run face detection (when requested) and the model on one image
    async fn infer(&self, request: InferenceRequest) -> Result<InferenceOutcome, InferenceError>;

    /// False when inspections cannot be served at all
    fn is_available(&self) -> bool {
        true
    }
}

/// Engine used when no endpoint is configured; every inspection answers 503
pub struct UnconfiguredInference;

#[async_trait]
impl InferenceEngine for UnconfiguredInference {
    fn name(&self) -> &'static str {
        "unconfigured"
    }

    async fn infer(&self, _request: InferenceRequest) -> Result<InferenceOutcome, InferenceError> {
        Err(InferenceError::NotConfigured)
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// HTTP adapter for an external inference service
pub struct HttpInferenceEngine {
    http_client: reqwest::Client,
    predict_url: String,
}

impl HttpInferenceEngine {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, InferenceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("wpi-is/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Unreachable(e.to_string()))?;

        Ok(Self {
            http_client,
            predict_url: format!("{}/predict", endpoint.trim_end_matches('/')),
        })
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }
}

#[async_trait]
impl InferenceEngine for HttpInferenceEngine {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn infer(&self, request: InferenceRequest) -> Result<InferenceOutcome, InferenceError> {
        let file_part = reqwest::multipart::Part::bytes(request.image)
            .file_name(request.file_name)
            .mime_str("application/octet-stream")
            .map_err(|e| InferenceError::Rejected(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("confidence_threshold", request.confidence_threshold.to_string())
            .text("blur_faces", request.blur_faces.to_string());
        if let Some(model) = request.model {
            form = form
                .text("model_path", model.path.to_string_lossy().into_owned())
                .text("model_type", model.model_type.as_str());
        }

        tracing::debug!(url = %self.predict_url, "Calling inference service");

        let response = self
            .http_client
            .post(&self.predict_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| InferenceError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::Rejected(format!("{}: {}", status, error_text)));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::Unreachable(format!("{}: {}", status, error_text)));
        }

        let body: PredictResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;

        InferenceOutcome::try_from(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_classification_response() {
        let body: PredictResponse = serde_json::from_str(
            r#"{
                "faces_detected": 0,
                "prediction": {"type": "classification", "class_id": "2", "label": "NOK-hamer_weg", "confidence": 0.87}
            }"#,
        )
        .unwrap();

        let outcome = InferenceOutcome::try_from(body).unwrap();
        assert_eq!(outcome.faces_detected, 0);
        assert!(outcome.processed_image.is_none());
        assert_eq!(
            outcome.prediction,
            Prediction::Classification {
                class_id: Some("2".into()),
                label: "NOK-hamer_weg".into(),
                confidence: 0.87,
            }
        );
    }

    #[test]
    fn test_parse_detection_response_with_image() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"jpegbytes");
        let json = format!(
            r#"{{
                "faces_detected": 1,
                "image_base64": "{}",
                "prediction": {{"type": "detection", "counts": {{"hamer": 1, "schaar": 0}}, "confidence": 0.66}}
            }}"#,
            encoded
        );
        let body: PredictResponse = serde_json::from_str(&json).unwrap();
        let outcome = InferenceOutcome::try_from(body).unwrap();

        assert_eq!(outcome.faces_detected, 1);
        assert_eq!(outcome.processed_image.as_deref(), Some(&b"jpegbytes"[..]));
        match outcome.prediction {
            Prediction::Detection { counts, .. } => assert_eq!(counts["schaar"], 0),
            other => panic!("unexpected prediction {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_confidence_rejected() {
        let body: PredictResponse = serde_json::from_str(
            r#"{"prediction": {"type": "classification", "label": "OK", "confidence": 87}}"#,
        )
        .unwrap();
        assert!(matches!(
            InferenceOutcome::try_from(body),
            Err(InferenceError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_endpoint_trailing_slash() {
        let engine = HttpInferenceEngine::new("http://127.0.0.1:9000/", Duration::from_secs(1)).unwrap();
        assert_eq!(engine.predict_url(), "http://127.0.0.1:9000/predict");
    }

    #[tokio::test]
    async fn test_unconfigured_engine() {
        let engine = UnconfiguredInference;
        assert!(!engine.is_available());

        let result = engine
            .infer(InferenceRequest {
                image: vec![1, 2, 3],
                file_name: "a.jpg".into(),
                model: None,
                confidence_threshold: 0.25,
                blur_faces: true,
            })
            .await;
        assert!(matches!(result, Err(InferenceError::NotConfigured)));
    }
}
