//! Audience building handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use audience_common::errors::Result;
use audience_reconcile::{FilterRule, RoleReconciliation, Target};

/// Audience request
#[derive(Debug, Deserialize, Validate)]
pub struct AudienceRequest {
    #[validate(length(min = 1, max = 4000))]
    pub description: String,

    /// Roles to reconcile; every role when omitted
    #[validate(length(min = 1, max = 16))]
    pub targets: Option<Vec<Target>>,
}

/// Audience response
#[derive(Serialize)]
pub struct AudienceResponse {
    pub targets: Vec<RoleReconciliation>,
    pub rules: Vec<FilterRule>,
    /// Elasticsearch query DSL
    pub query: Value,
    pub warnings: Vec<String>,
    pub processing_time_ms: u64,
}

/// Build a full audience definition from a description
pub async fn build_audience(
    State(state): State<AppState>,
    Json(request): Json<AudienceRequest>,
) -> Result<Json<AudienceResponse>> {
    let start = Instant::now();

    request.validate()?;

    let targets = request.targets.unwrap_or_else(Target::all_roles);
    let audience = state.pipeline.build(&request.description, &targets).await;

    Ok(Json(AudienceResponse {
        targets: audience.targets,
        query: audience.query.to_dsl(&state.fields),
        rules: audience.rules,
        warnings: audience.warnings,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}
