//! Shared response envelope types for API handlers.
//!
//! All API responses use a `{ "data": ... }` envelope. Use [`DataResponse`]
//! instead of ad-hoc `serde_json::json!({ "data": ... })`.

use serde::Serialize;
use tripod_core::command::AnalysisParams;
use tripod_core::results::ResultSet;
use tripod_worker::JobSummary;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// Body of `GET /jobs/{token}/wait`.
#[derive(Debug, Serialize)]
pub struct WaitResponse {
    pub timed_out: bool,
    pub job: JobSummary,
}

/// Body of `GET /jobs/{token}/results`.
#[derive(Debug, Serialize)]
pub struct JobReport {
    pub job: JobSummary,
    /// Short build label, e.g. `hg18`.
    pub build: Option<String>,
    pub params: Option<AnalysisParams>,
    pub results: Option<ResultSet>,
    /// Headline locus, e.g. `chr2:150-250`.
    pub locus: Option<String>,
    pub genome_browser_url: Option<String>,
    /// Why aggregation failed; the job state is unaffected.
    pub aggregation_error: Option<String>,
}
