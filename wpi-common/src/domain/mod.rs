//! Data model shared by the computation units and the service

pub mod analysis;
pub mod model;
pub mod training_image;
pub mod workplace;

pub use analysis::{Analysis, InspectionStatus, ItemCounts};
pub use model::{ModelStatus, ModelType, ModelVersion};
pub use training_image::{ImageSource, TrainingImage, TrainingLabel};
pub use workplace::{WhiteboardRegion, Workplace};
