//! Atrium - a secure HTTP front-end bootstrap.
//!
//! Atrium establishes a deterministic, ordered chain of request-processing
//! stages in front of application-supplied route logic: hardened response
//! headers, CORS policy, optional compression, request observation, opt-in
//! body decoding and a pre-flight/not-found fallback. A small lifecycle
//! contract (configure → listen → ready / error) is surfaced through
//! synchronous event notification.
//!
//! # Features
//! - Fixed security/permission response headers on every response
//! - Configurable `Access-Control-Allow-Origin` (env `CORS_DOMAIN`)
//! - Optional response compression (env `USE_COMPRESSION`)
//! - One `request` event per inbound request with resolved remote address
//! - Opt-in JSON / raw / text / URL-encoded body decoding with uniform
//!   400-on-decode-failure semantics
//! - Static content serving via `tower-http`
//!
//! # Quick Example
//! ```no_run
//! use atrium::{App, BindConfig};
//! use axum::routing::get;
//!
//! # #[tokio::main] async fn main() -> Result<(), atrium::StartError> {
//! let mut app = App::new(BindConfig {
//!     port: 8080,
//!     ..Default::default()
//! });
//! app.enable_json_body();
//! app.route("/health", get(|| async { "ok" }));
//! app.on_request(|req| tracing::info!("{} {} from {}", req.method, req.url, req.remote_ip));
//! app.start().await?;
//! # Ok(()) }
//! ```
//!
//! # Lifecycle
//! All registration — routes, body decoders, event listeners — happens
//! between construction and [`App::start`]. Once `start` resolves the
//! pipeline is frozen; the fallback stage is appended behind application
//! routes when the listener is confirmed bound, so consumer routes always
//! answer first.
//!
//! # Error Handling
//! Body-decode failures are recovered locally: the client receives an empty
//! 400 response and one `error` event fires. Bind failures are fatal to
//! [`App::start`] and leave the instance in a terminal failed state.
//!
//! # Concurrency
//! The pipeline and listener registry are written only during the
//! single-threaded setup phase; the serving runtime treats both as
//! read-only.
pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod static_files;
pub mod tracing_setup;

pub use crate::{
    app::{App, Lifecycle},
    config::{BindConfig, Options},
    error::StartError,
    events::{EventBus, RequestEvent},
    pipeline::{DecodeKind, Stage, decode::DecodedBody},
    static_files::static_content,
};
