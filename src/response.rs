//! JSON documents returned to callers.

use crate::pipeline::{PipelineError, Prediction};
use crate::statistics::SegmentationStatistics;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Tag identifying this implementation in every successful response.
pub const METHOD_TAG: &str = "rust_api";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub success: bool,
    /// Class id per voxel, row-major over `shape`.
    pub prediction: Vec<u32>,
    pub shape: [usize; 3],
    pub statistics: SegmentationStatistics,
    pub timestamp: String,
    pub method: &'static str,
}

impl PredictionResponse {
    pub fn new(prediction: Prediction, at: DateTime<Utc>) -> Self {
        let (x, y, z) = prediction.shape();
        Self {
            success: true,
            prediction: prediction.flattened(),
            shape: [x, y, z],
            statistics: prediction.statistics,
            timestamp: format_timestamp(at),
            method: METHOD_TAG,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(detail: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            detail: format!("Prediction failed: {detail}"),
        }
    }

    pub fn from_error(error: &PipelineError) -> Self {
        Self::new(error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub message: &'static str,
    pub status: &'static str,
    pub model_loaded: bool,
}

impl ServiceStatus {
    pub fn new(model_loaded: bool) -> Self {
        Self {
            message: "Brain Tumor Detection API",
            status: "running",
            model_loaded,
        }
    }
}

/// UTC timestamp with microsecond precision, e.g. `2024-05-01T12:00:00.000000Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineUnavailableError;
    use crate::statistics::RegionStatistics;
    use chrono::TimeZone;
    use ndarray::Array3;

    fn prediction() -> Prediction {
        let mut segmentation = Array3::<u32>::zeros((2, 2, 2));
        segmentation[[1, 1, 1]] = 1;
        let statistics = RegionStatistics::summarize(&segmentation);
        Prediction {
            segmentation,
            statistics,
        }
    }

    #[test]
    fn formats_timestamp_with_microseconds() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();
        assert_eq!(format_timestamp(at), "2024-05-01T12:30:05.000000Z");
    }

    #[test]
    fn prediction_response_shape() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let json = serde_json::to_value(PredictionResponse::new(prediction(), at)).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["method"], "rust_api");
        assert_eq!(json["shape"], serde_json::json!([2, 2, 2]));
        assert_eq!(json["prediction"].as_array().unwrap().len(), 8);
        assert_eq!(json["prediction"][7], 1);
        assert_eq!(json["statistics"]["tumorVoxels"], 1);
        assert_eq!(json["statistics"]["regions"]["1"]["name"], "NCR/NET");
        assert_eq!(json["timestamp"], "2024-05-01T00:00:00.000000Z");
    }

    #[test]
    fn error_response_carries_detail() {
        let error = PipelineError::from(EngineUnavailableError::new("no weights"));
        let response = ErrorResponse::from_error(&error);

        assert!(!response.success);
        assert_eq!(
            response.detail,
            "Prediction failed: segmentation engine unavailable: no weights"
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "detail": response.detail}));
    }

    #[test]
    fn status_uses_camel_case() {
        let json = serde_json::to_value(ServiceStatus::new(false)).unwrap();
        assert_eq!(json["modelLoaded"], false);
        assert_eq!(json["status"], "running");
    }
}
