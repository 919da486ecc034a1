pub mod camera;
pub mod classifier;
pub mod metrics;

pub use camera::{Camera, CameraConfig, DefectSite, Frame, SyntheticCamera};
pub use classifier::{ClassifierConfig, DefectClassifier, Detection, ThresholdClassifier};
pub use metrics::{init_metrics, serve_metrics};
