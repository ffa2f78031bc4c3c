//! Opt-in request-body decoding stages.
//!
//! Each enabled decoder buffers the body, parses it when the request
//! content-type matches its canonical type, and attaches the result to the
//! request extensions as [`DecodedBody`]. A decode failure is converted into
//! an empty 400 response plus one `error` event; the chain is not delegated
//! further for that request. When several decoders are enabled, the first one
//! whose content-type matches wins and later ones pass the request through
//! untouched.
use std::{future::Future, pin::Pin, sync::Arc};

use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http::{HeaderMap, header};
use http_body_util::BodyExt;

use crate::{events::EventBus, pipeline::DecodeKind};

/// A request body parsed by one of the decoding stages, stored in the request
/// extensions for downstream handlers.
#[derive(Debug, Clone)]
pub enum DecodedBody {
    Json(serde_json::Value),
    Raw(Bytes),
    Text(String),
    Form(Vec<(String, String)>),
}

/// Create a cloneable decoding middleware for one body kind.
pub fn create_decode_middleware(
    kind: DecodeKind,
    events: Arc<EventBus>,
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Clone {
    move |req, next| {
        let events = events.clone();
        Box::pin(async move { decode_body(kind, events, req, next).await })
    }
}

async fn decode_body(
    kind: DecodeKind,
    events: Arc<EventBus>,
    req: Request,
    next: Next,
) -> Response {
    if !matches_content_type(req.headers(), kind.content_type())
        || req.extensions().get::<DecodedBody>().is_some()
    {
        return next.run(req).await;
    }

    let (mut parts, body) = req.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            // Transport failure while reading the body, not a decode error:
            // no error event is published.
            tracing::warn!("Failed to read request body: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    if bytes.is_empty() {
        return next.run(Request::from_parts(parts, Body::empty())).await;
    }

    match parse(kind, &bytes) {
        Ok(decoded) => {
            parts.extensions.insert(decoded);
            next.run(Request::from_parts(parts, Body::from(bytes))).await
        }
        Err(description) => {
            tracing::debug!("Rejecting request body: {}", description);
            events.emit_error(&description);
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

fn parse(kind: DecodeKind, bytes: &Bytes) -> Result<DecodedBody, String> {
    match kind {
        DecodeKind::Json => serde_json::from_slice(bytes)
            .map(DecodedBody::Json)
            .map_err(|e| format!("JSON body decode failed: {e}")),
        DecodeKind::Raw => Ok(DecodedBody::Raw(bytes.clone())),
        DecodeKind::Text => std::str::from_utf8(bytes)
            .map(|text| DecodedBody::Text(text.to_owned()))
            .map_err(|e| format!("text body decode failed: {e}")),
        DecodeKind::UrlEncoded => match std::str::from_utf8(bytes) {
            Ok(_) => Ok(DecodedBody::Form(
                url::form_urlencoded::parse(bytes).into_owned().collect(),
            )),
            Err(e) => Err(format!("URL-encoded body decode failed: {e}")),
        },
    }
}

fn matches_content_type(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|value| value.trim().eq_ignore_ascii_case(expected))
}
