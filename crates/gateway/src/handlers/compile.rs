//! Filter compilation handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AppState;
use audience_common::{
    errors::{AppError, Result},
    metrics,
};
use audience_reconcile::{compile, validate_rules, FilterRule};

/// Upper bound on rules per request
const MAX_RULES: usize = 256;

/// Compile request
#[derive(Debug, Deserialize)]
pub struct CompileRequest {
    pub rules: Vec<FilterRule>,

    /// Widen location filters across sibling columns first
    #[serde(default = "default_expand")]
    pub expand_locations: bool,
}

fn default_expand() -> bool { true }

/// Compile response
#[derive(Serialize)]
pub struct CompileResponse {
    /// Rules actually compiled, after any expansion
    pub rules: Vec<FilterRule>,
    /// Elasticsearch query DSL
    pub query: Value,
}

/// Compile filter rules into one boolean query
pub async fn compile_rules(
    State(state): State<AppState>,
    Json(request): Json<CompileRequest>,
) -> Result<Json<CompileResponse>> {
    if request.rules.len() > MAX_RULES {
        return Err(AppError::PayloadTooLarge {
            size: request.rules.len(),
            limit: MAX_RULES,
        });
    }

    validate_rules(&request.rules)?;

    let rules = if request.expand_locations {
        state.pipeline.expander().expand_all(&request.rules)
    } else {
        request.rules
    };

    let query = compile(&rules).to_dsl(&state.fields);
    metrics::record_compile(rules.len());

    tracing::debug!(rules = rules.len(), "Rules compiled");

    Ok(Json(CompileResponse { rules, query }))
}
