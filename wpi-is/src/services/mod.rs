//! Service layer: inspection orchestration, review and exporters

pub mod correction;
pub mod csv_export;
pub mod dataset_export;
pub mod inference;
pub mod inspection;
pub mod training_export;
pub mod user_agent;

pub use inference::{HttpInferenceEngine, InferenceEngine, UnconfiguredInference};
