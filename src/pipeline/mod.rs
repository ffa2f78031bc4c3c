//! The ordered request-processing pipeline.
//!
//! The pipeline is an append-only sequence of tagged [`Stage`] variants built
//! during the single-threaded setup phase and never mutated once the listener
//! is serving. Stages execute in registration order for every request; the
//! assembly below translates that sequence into axum layers (the last layer
//! added to a `Router` is the outermost, so stages are applied in reverse).
use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    http::{Method, StatusCode},
    middleware::from_fn,
    response::{IntoResponse, Response},
};
use http::HeaderValue;
use tower_http::compression::CompressionLayer;

use crate::events::EventBus;

pub mod decode;
pub mod middleware;

/// Request-body kinds the opt-in decoding stages understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeKind {
    Json,
    Raw,
    Text,
    UrlEncoded,
}

impl DecodeKind {
    /// Canonical content type this decoder reacts to.
    pub fn content_type(&self) -> &'static str {
        match self {
            DecodeKind::Json => "application/json",
            DecodeKind::Raw => "application/octet-stream",
            DecodeKind::Text => "text/plain",
            DecodeKind::UrlEncoded => "application/x-www-form-urlencoded",
        }
    }
}

/// One unit of per-request processing in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Fixed security/permission response headers
    Headers,
    /// Configurable `Access-Control-Allow-Origin`
    Cors,
    /// Response compression; present only when enabled at construction
    Compression,
    /// Publishes one `request` event per inbound request
    Observer,
    /// Opt-in body decoding
    Decode(DecodeKind),
    /// Pre-flight/not-found tail, installed once the lifecycle reaches ready
    Fallback,
}

/// Wrap `router` with the layer a single stage contributes. The fallback
/// stage is installed as the router fallback, not a layer, so it is a no-op
/// here.
pub(crate) fn attach(
    router: Router,
    stage: &Stage,
    allow_origin: &HeaderValue,
    events: &Arc<EventBus>,
) -> Router {
    match stage {
        Stage::Headers => router.layer(from_fn(middleware::policy_headers)),
        Stage::Cors => router.layer(from_fn(middleware::create_cors_middleware(
            allow_origin.clone(),
        ))),
        Stage::Compression => router.layer(CompressionLayer::new()),
        Stage::Observer => router.layer(from_fn(middleware::create_observer_middleware(
            events.clone(),
        ))),
        Stage::Decode(kind) => router.layer(from_fn(decode::create_decode_middleware(
            *kind,
            events.clone(),
        ))),
        Stage::Fallback => router,
    }
}

/// Tail of the pipeline: answer pre-flight requests with an empty success
/// response and everything else that reached the tail unhandled with an empty
/// not-found response.
pub(crate) async fn tail(req: Request) -> Response {
    if req.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}
