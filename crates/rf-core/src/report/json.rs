//! JSON report generation

use crate::{AnalysisReport, CoreResult};

pub fn generate(report: &AnalysisReport) -> CoreResult<String> {
    serde_json::to_string_pretty(report)
        .map_err(|e| crate::CoreError::Serialization(format!("JSON serialization failed: {}", e)))
}

pub fn generate_compact(report: &AnalysisReport) -> CoreResult<String> {
    serde_json::to_string(report)
        .map_err(|e| crate::CoreError::Serialization(format!("JSON serialization failed: {}", e)))
}
