//! Lifecycle event notification.
//!
//! A closed set of events — `ready`, `request`, `error` — each with a fixed
//! payload shape. Listeners are dispatched synchronously, in subscription
//! order. The registry is written during the single-threaded setup phase and
//! only read once the server is accepting traffic.
use std::sync::RwLock;

/// Payload of the `request` event, published once per inbound request.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    /// Resolved remote address: `x-forwarded-for`, then `cf-connecting-ip`,
    /// then the transport peer address; first non-empty wins.
    pub remote_ip: String,
    pub method: String,
    pub url: String,
}

type ReadyListener = Box<dyn Fn() + Send + Sync>;
type RequestListener = Box<dyn Fn(&RequestEvent) + Send + Sync>;
type ErrorListener = Box<dyn Fn(&str) + Send + Sync>;

/// Listener registry for the three lifecycle events.
#[derive(Default)]
pub struct EventBus {
    ready: RwLock<Vec<ReadyListener>>,
    request: RwLock<Vec<RequestListener>>,
    error: RwLock<Vec<ErrorListener>>,
}

impl EventBus {
    /// Subscribe to the `ready` event. Fires at most once per application
    /// instance, after the listener is bound.
    pub fn on_ready(&self, listener: impl Fn() + Send + Sync + 'static) {
        match self.ready.write() {
            Ok(mut listeners) => listeners.push(Box::new(listener)),
            Err(e) => tracing::warn!("Failed to register ready listener: {}", e),
        }
    }

    /// Subscribe to the `request` event.
    pub fn on_request(&self, listener: impl Fn(&RequestEvent) + Send + Sync + 'static) {
        match self.request.write() {
            Ok(mut listeners) => listeners.push(Box::new(listener)),
            Err(e) => tracing::warn!("Failed to register request listener: {}", e),
        }
    }

    /// Subscribe to the `error` event. Carries a description of body-decode
    /// failures and startup failures.
    pub fn on_error(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        match self.error.write() {
            Ok(mut listeners) => listeners.push(Box::new(listener)),
            Err(e) => tracing::warn!("Failed to register error listener: {}", e),
        }
    }

    pub(crate) fn emit_ready(&self) {
        match self.ready.read() {
            Ok(listeners) => {
                for listener in listeners.iter() {
                    listener();
                }
            }
            Err(e) => tracing::warn!("Failed to dispatch ready event: {}", e),
        }
    }

    pub(crate) fn emit_request(&self, event: &RequestEvent) {
        match self.request.read() {
            Ok(listeners) => {
                for listener in listeners.iter() {
                    listener(event);
                }
            }
            Err(e) => tracing::warn!("Failed to dispatch request event: {}", e),
        }
    }

    pub(crate) fn emit_error(&self, description: &str) {
        match self.error.read() {
            Ok(listeners) => {
                for listener in listeners.iter() {
                    listener(description);
                }
            }
            Err(e) => tracing::warn!("Failed to dispatch error event: {}", e),
        }
    }
}
