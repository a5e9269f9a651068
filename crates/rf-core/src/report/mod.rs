//! Report generation

pub mod json;

use crate::AnalysisReport;
use crate::CoreResult;

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Indented JSON document
    Json,
    /// Single-line JSON document
    CompactJson,
}

/// Generate report in specified format
pub fn generate_report(report: &AnalysisReport, format: ReportFormat) -> CoreResult<String> {
    match format {
        ReportFormat::Json => json::generate(report),
        ReportFormat::CompactJson => json::generate_compact(report),
    }
}
