//! Header, CORS and request-observation middleware for the front-end pipeline.
//!
//! These functions are lightweight composable layers attached to the axum
//! `Router` in registration order. They stay stateless except for the shared
//! event registry captured by the observer, to minimize contention and
//! complexity.
use std::{future::Future, net::SocketAddr, pin::Pin, sync::Arc};

use axum::{
    extract::{ConnectInfo, Request},
    middleware::Next,
    response::Response,
};
use http::{HeaderName, HeaderValue, header};
use once_cell::sync::Lazy;

use crate::events::{EventBus, RequestEvent};

/// Fixed response-header policy applied to every request. Values are part of
/// the wire contract and must not change. `Access-Control-Allow-Origin` is
/// handled separately by the CORS stage since it is configurable.
static POLICY_HEADERS: Lazy<[(HeaderName, HeaderValue); 8]> = Lazy::new(|| {
    [
        (
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("*"),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Origin, X-Requested-With, Content-Type, Accept, User-Agent"),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, HEAD, POST, PUT, DELETE, CONNECT, OPTIONS, TRACE, PATCH"),
        ),
        (
            header::CACHE_CONTROL,
            HeaderValue::from_static("max-age=30, public"),
        ),
        (
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ),
        (
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'"),
        ),
        (
            HeaderName::from_static("feature-policy"),
            HeaderValue::from_static(
                "geolocation none;midi none;notifications none;push none;sync-xhr none;\
                 microphone none;camera none;magnetometer none;gyroscope none;speaker self;\
                 vibrate none;fullscreen self;payment none;",
            ),
        ),
        (
            HeaderName::from_static("permissions-policy"),
            HeaderValue::from_static(
                "geolocation=(), midi=(), notifications=(), push=(), sync-xhr=(), \
                 microphone=(), camera=(), magnetometer=(), gyroscope=(), speaker=(self), \
                 vibrate=(), fullscreen=(self), payment=()",
            ),
        ),
    ]
});

/// Set the fixed security/permission policy headers on every response.
pub async fn policy_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    for (name, value) in POLICY_HEADERS.iter() {
        headers.insert(name.clone(), value.clone());
    }

    response
}

/// Create a cloneable CORS middleware setting `Access-Control-Allow-Origin`
/// to the captured value.
pub fn create_cors_middleware(
    allow_origin: HeaderValue,
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Clone {
    move |req, next| {
        let allow_origin = allow_origin.clone();
        Box::pin(async move {
            let mut response = next.run(req).await;
            response
                .headers_mut()
                .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
            response
        })
    }
}

/// Publish a `request` event for every inbound request, then delegate.
pub async fn observe_request(req: Request, next: Next, events: Arc<EventBus>) -> Response {
    let event = RequestEvent {
        remote_ip: resolve_remote_ip(&req),
        method: req.method().to_string(),
        url: req.uri().to_string(),
    };
    events.emit_request(&event);

    next.run(req).await
}

/// Create a cloneable closure wrapping [`observe_request`].
pub fn create_observer_middleware(
    events: Arc<EventBus>,
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Clone {
    move |req, next| {
        let events = events.clone();
        Box::pin(async move { observe_request(req, next, events).await })
    }
}

/// Resolution order: `x-forwarded-for` header, `cf-connecting-ip` header,
/// transport peer address. First non-empty wins.
fn resolve_remote_ip(req: &Request) -> String {
    header_text(req, "x-forwarded-for")
        .or_else(|| header_text(req, "cf-connecting-ip"))
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_default()
}

fn header_text(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
    };
    use tower::ServiceExt; // for oneshot

    use super::*;

    fn ok_router() -> Router {
        Router::new().route(
            "/",
            get(|| async {
                axum::response::Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::empty())
                    .unwrap()
            }),
        )
    }

    #[tokio::test]
    async fn test_policy_headers_exact_values() {
        let app = ok_router().layer(middleware::from_fn(policy_headers));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let headers = response.headers();

        assert_eq!(headers.get("x-requested-with").unwrap(), "*");
        assert_eq!(
            headers.get("access-control-allow-headers").unwrap(),
            "Origin, X-Requested-With, Content-Type, Accept, User-Agent"
        );
        assert_eq!(
            headers.get("access-control-allow-methods").unwrap(),
            "GET, HEAD, POST, PUT, DELETE, CONNECT, OPTIONS, TRACE, PATCH"
        );
        assert_eq!(headers.get("cache-control").unwrap(), "max-age=30, public");
        assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
        assert_eq!(
            headers.get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
        assert_eq!(
            headers.get("feature-policy").unwrap(),
            "geolocation none;midi none;notifications none;push none;sync-xhr none;\
             microphone none;camera none;magnetometer none;gyroscope none;speaker self;\
             vibrate none;fullscreen self;payment none;"
        );
        assert_eq!(
            headers.get("permissions-policy").unwrap(),
            "geolocation=(), midi=(), notifications=(), push=(), sync-xhr=(), \
             microphone=(), camera=(), magnetometer=(), gyroscope=(), speaker=(self), \
             vibrate=(), fullscreen=(self), payment=()"
        );
    }

    #[tokio::test]
    async fn test_cors_middleware_sets_configured_origin() {
        let app = ok_router().layer(middleware::from_fn(create_cors_middleware(
            HeaderValue::from_static("https://example.com"),
        )));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "https://example.com"
        );
    }

    #[tokio::test]
    async fn test_observer_emits_one_event_per_request() {
        let events = Arc::new(EventBus::default());
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        events.on_request(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let app = ok_router().layer(middleware::from_fn(create_observer_middleware(
            events.clone(),
        )));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remote_ip_resolution_order() {
        let events = Arc::new(EventBus::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let capture = seen.clone();
        events.on_request(move |event| {
            capture.lock().unwrap().push(event.remote_ip.clone());
        });

        let app = ok_router().layer(middleware::from_fn(create_observer_middleware(
            events.clone(),
        )));

        // forwarded-for beats everything else
        app.clone()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-forwarded-for", "203.0.113.9")
                    .header("cf-connecting-ip", "198.51.100.2")
                    .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // then the CDN header
        app.clone()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("cf-connecting-ip", "198.51.100.2")
                    .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // then the transport peer address
        app.clone()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["203.0.113.9", "198.51.100.2", "127.0.0.1"]
        );
    }

    #[tokio::test]
    async fn test_empty_forwarded_for_falls_through() {
        let events = Arc::new(EventBus::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let capture = seen.clone();
        events.on_request(move |event| {
            capture.lock().unwrap().push(event.remote_ip.clone());
        });

        let app = ok_router().layer(middleware::from_fn(create_observer_middleware(
            events.clone(),
        )));

        app.oneshot(
            Request::builder()
                .uri("/")
                .header("x-forwarded-for", "")
                .header("cf-connecting-ip", "198.51.100.2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["198.51.100.2"]);
    }
}
