//! Term reconciliation handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use audience_common::{
    errors::{AppError, Result},
    TermRole,
};
use audience_reconcile::{ReconciliationResult, Target, TermSource};

/// Reconcile request; one of `description` or `terms` is required
#[derive(Debug, Deserialize, Validate)]
pub struct ReconcileRequest {
    #[validate(length(min = 1, max = 4000))]
    pub description: Option<String>,

    /// Candidate terms, in priority order
    #[validate(length(min = 1, max = 100))]
    pub terms: Option<Vec<String>>,

    pub role: TermRole,

    /// Overrides the role's configured column
    #[validate(length(min = 1, max = 128))]
    pub column: Option<String>,
}

/// Reconcile response
#[derive(Serialize)]
pub struct ReconcileResponse {
    pub column: String,
    pub results: Vec<ReconciliationResult>,
    pub warnings: Vec<String>,
    pub processing_time_ms: u64,
}

/// Reconcile candidate terms against one column
pub async fn reconcile(
    State(state): State<AppState>,
    Json(request): Json<ReconcileRequest>,
) -> Result<Json<ReconcileResponse>> {
    let start = Instant::now();

    request.validate()?;

    let source = match (request.terms, request.description.as_deref()) {
        (Some(terms), _) => TermSource::Terms(terms),
        (None, Some(description)) if !description.trim().is_empty() => {
            TermSource::Description(description)
        }
        _ => {
            return Err(AppError::validation(
                "terms",
                "one of description or terms is required",
            ))
        }
    };

    let target = Target {
        role: request.role,
        column: request.column.clone(),
    };
    let reconciled = state.pipeline.reconcile_role(source, &target).await;

    Ok(Json(ReconcileResponse {
        column: reconciled.column,
        results: reconciled.results,
        warnings: reconciled.warnings,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}
