use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::{self, Next},
    response::Response,
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::token_handler;
use crate::cache::TokenCache;
use crate::observability::RefreshMetrics;

#[derive(Clone)]
pub struct ApiState {
    pub cache: Arc<TokenCache>,
    pub metrics: RefreshMetrics,
}

impl ApiState {
    pub fn new(cache: Arc<TokenCache>) -> Self {
        Self { cache, metrics: RefreshMetrics::new() }
    }
}

/// Every path and method serves tokens. Once `draining` is set responses
/// carry `Connection: close` so keep-alive clients disconnect.
pub fn build_router(state: ApiState, draining: Arc<AtomicBool>) -> Router {
    Router::new()
        .fallback(token_handler)
        .with_state(state)
        .layer(middleware::from_fn_with_state(draining, close_when_draining))
        .layer(TraceLayer::new_for_http())
}

async fn close_when_draining(
    State(draining): State<Arc<AtomicBool>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    if draining.load(Ordering::Acquire) {
        response.headers_mut().insert(header::CONNECTION, HeaderValue::from_static("close"));
    }
    response
}
