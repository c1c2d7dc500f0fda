//! Request/response bodies for the HTTP routes and the mapping from
//! controller failures to wire errors.

use std::path::PathBuf;

use axum::{http::StatusCode, Json};
use controller::{AnalysisOutcome, ControllerError, RefusalReason};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{PointId, ReconstructionOption, ReconstructionPair, ViewId, ViewKind},
    error::{ApiError, ErrorCode},
};

pub type HttpError = (StatusCode, Json<ApiError>);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewSummary {
    pub view_id: ViewId,
    pub kind: ViewKind,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PointResponse {
    pub point_id: Option<PointId>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SelectRequest {
    #[serde(default)]
    pub point_id: Option<PointId>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PointsFileRequest {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoadedResponse {
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SavedResponse {
    pub written: Vec<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RunAnalysisRequest {
    pub rec_a: usize,
    #[serde(default)]
    pub rec_b: Option<usize>,
    #[serde(default)]
    pub rigid: bool,
    #[serde(default)]
    pub covariance: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub pair: ReconstructionPair,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RefocusRequest {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReconstructionEntry {
    pub label: String,
    #[serde(flatten)]
    pub option: ReconstructionOption,
}

impl From<ReconstructionOption> for ReconstructionEntry {
    fn from(option: ReconstructionOption) -> Self {
        Self {
            label: option.label(),
            option,
        }
    }
}

pub fn analysis_response(outcome: AnalysisOutcome) -> Result<Json<AnalysisResponse>, HttpError> {
    match outcome {
        AnalysisOutcome::Completed { pair } => Ok(Json(AnalysisResponse { pair })),
        AnalysisOutcome::Refused(reason) => Err(refused(reason)),
    }
}

pub fn refused(reason: RefusalReason) -> HttpError {
    (
        StatusCode::CONFLICT,
        Json(ApiError::new(ErrorCode::Conflict, reason.message())),
    )
}

pub fn controller_error(error: ControllerError) -> HttpError {
    let status = match &error {
        ControllerError::UnknownPoint(_) | ControllerError::UnknownView(_) => {
            StatusCode::NOT_FOUND
        }
        ControllerError::NotASequenceView(_) => StatusCode::BAD_REQUEST,
        ControllerError::Analysis(_) | ControllerError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(api_error(error)))
}

/// Wire form of a controller failure, also pushed to views as `ViewUpdate::Error`.
pub fn api_error(error: ControllerError) -> ApiError {
    let code = match &error {
        ControllerError::UnknownPoint(_) | ControllerError::UnknownView(_) => ErrorCode::NotFound,
        ControllerError::NotASequenceView(_) => ErrorCode::Validation,
        ControllerError::Analysis(_) | ControllerError::Storage(_) => ErrorCode::Internal,
    };
    ApiError::new(code, error.to_string())
}

pub fn unavailable(error: ApiError) -> HttpError {
    let status = match error.code {
        ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(error))
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
