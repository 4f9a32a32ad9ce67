//! Request metrics middleware

use audience_common::metrics::RequestMetrics;
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};

/// Count and time every request by route template
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let metrics = RequestMetrics::start(request.method().as_str(), &endpoint);
    let response = next.run(request).await;
    metrics.finish(response.status().as_u16());

    response
}
