//! # Redirect Dispatcher
//!
//! Per-request logic: ask the selector for a destination and answer with a
//! `307 Temporary Redirect` to that destination, carrying the original path and
//! query string over unchanged.
//!
//! Every path is matched. Only `GET` and `HEAD` are routed (axum answers `HEAD`
//! through the `GET` handler and strips the body); other methods get `405`.
//!
//! Selection failures are returned as [`BalancerError`] values and rendered as a
//! `503` response. They never unwind through the serving task.

use crate::core::error::BalancerError;
use crate::load_balancing::Selector;
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, compression::CompressionLayer, trace::TraceLayer};
use tracing::{debug, instrument};

/// Shared dispatcher state
#[derive(Clone)]
pub struct DispatcherState {
    pub selector: Arc<dyn Selector>,
}

impl DispatcherState {
    pub fn new(selector: Arc<dyn Selector>) -> Self {
        Self { selector }
    }
}

/// Build the catch-all redirect router around a selector
///
/// The router carries request tracing, gzip compression and panic recovery.
pub fn redirect_router(selector: Arc<dyn Selector>) -> Router {
    Router::new()
        .route("/", get(redirect_handler))
        .route("/*path", get(redirect_handler))
        .with_state(DispatcherState::new(selector))
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::new())
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new()),
        )
}

/// Redirect target: destination URL immediately followed by the original path and query
pub fn redirect_location(destination: &str, uri: &Uri) -> String {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("{}{}", destination, path_and_query)
}

#[instrument(skip(state))]
async fn redirect_handler(State(state): State<DispatcherState>, uri: Uri) -> Response {
    match dispatch(state.selector.as_ref(), &uri) {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

fn dispatch(selector: &dyn Selector, uri: &Uri) -> Result<Response, BalancerError> {
    let destination = selector.next()?;
    let location = redirect_location(&destination, uri);

    let value = HeaderValue::from_str(&location).map_err(|e| {
        BalancerError::internal(format!("Invalid redirect location {:?}: {}", location, e))
    })?;

    debug!(location = %location, "Redirecting request");
    Ok((StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, value)]).into_response())
}
