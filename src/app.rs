//! The application front end: pipeline ownership and lifecycle control.
use std::{
    convert::Infallible,
    mem,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use axum::{Router, extract::Request, response::IntoResponse, routing::MethodRouter};
use http::HeaderValue;
use tokio::net::{TcpListener, TcpSocket};
use tower::Service;

use crate::{
    config::{BindConfig, Options},
    error::StartError,
    events::{EventBus, RequestEvent},
    pipeline::{self, DecodeKind, Stage},
};

/// Lifecycle phase of an [`App`].
///
/// `Constructed → Binding` on [`App::start`], `Binding → Ready` on a
/// successful bind, `Binding → Failed` on a bind error. `Ready` and `Failed`
/// are terminal; there is no restart contract, and calling `start` a second
/// time on one instance is unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Constructed,
    Binding,
    Ready,
    Failed,
}

/// A secure HTTP front end.
///
/// Owns the bind configuration, the ordered pipeline of [`Stage`]s, the
/// event-subscriber registry and a router for application-supplied routes.
/// All registration happens before [`App::start`]; afterwards the pipeline
/// and registry are treated as read-only by the serving runtime.
pub struct App {
    bind: BindConfig,
    options: Options,
    allow_origin: HeaderValue,
    stages: Vec<Stage>,
    routes: Router,
    events: Arc<EventBus>,
    state: Lifecycle,
    fallback_installed: bool,
    local_addr: Option<SocketAddr>,
}

impl App {
    /// Construct a front end with options read from the process environment
    /// (`CORS_DOMAIN`, `USE_COMPRESSION`).
    pub fn new(bind: BindConfig) -> Self {
        Self::with_options(bind, Options::from_env())
    }

    /// Construct a front end with explicit options.
    pub fn with_options(bind: BindConfig, options: Options) -> Self {
        let allow_origin = HeaderValue::from_str(&options.cors_domain).unwrap_or_else(|_| {
            tracing::warn!(
                "CORS domain {:?} is not a valid header value, falling back to *",
                options.cors_domain
            );
            HeaderValue::from_static("*")
        });

        let mut stages = vec![Stage::Headers, Stage::Cors];
        if options.use_compression {
            stages.push(Stage::Compression);
        }
        stages.push(Stage::Observer);

        Self {
            bind,
            options,
            allow_origin,
            stages,
            routes: Router::new(),
            events: Arc::new(EventBus::default()),
            state: Lifecycle::Constructed,
            fallback_installed: false,
            local_addr: None,
        }
    }

    /// Subscribe to the `ready` event.
    pub fn on_ready(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.events.on_ready(listener);
    }

    /// Subscribe to the `request` event.
    pub fn on_request(&self, listener: impl Fn(&RequestEvent) + Send + Sync + 'static) {
        self.events.on_request(listener);
    }

    /// Subscribe to the `error` event.
    pub fn on_error(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.events.on_error(listener);
    }

    /// Enable decoding of `application/json` request bodies.
    pub fn enable_json_body(&mut self) {
        self.push_decoder(DecodeKind::Json);
    }

    /// Enable buffering of `application/octet-stream` request bodies.
    pub fn enable_raw_body(&mut self) {
        self.push_decoder(DecodeKind::Raw);
    }

    /// Enable decoding of `text/plain` request bodies.
    pub fn enable_text_body(&mut self) {
        self.push_decoder(DecodeKind::Text);
    }

    /// Enable decoding of `application/x-www-form-urlencoded` request bodies.
    pub fn enable_urlencoded_body(&mut self) {
        self.push_decoder(DecodeKind::UrlEncoded);
    }

    fn push_decoder(&mut self, kind: DecodeKind) {
        tracing::debug!("Enabling {:?} body decoding", kind);
        self.stages.push(Stage::Decode(kind));
    }

    /// Register an application route ahead of the fallback stage.
    pub fn route(&mut self, path: &str, method_router: MethodRouter) {
        self.routes = mem::take(&mut self.routes).route(path, method_router);
    }

    /// Merge a whole application router ahead of the fallback stage.
    pub fn merge(&mut self, other: Router) {
        self.routes = mem::take(&mut self.routes).merge(other);
    }

    /// Nest a service (for example [`static_content`](crate::static_content))
    /// under a path prefix.
    pub fn nest_service<S>(&mut self, path: &str, service: S)
    where
        S: Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
        S::Response: IntoResponse,
        S::Future: Send + 'static,
    {
        self.routes = mem::take(&mut self.routes).nest_service(path, service);
    }

    /// The ordered pipeline as registered so far.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Current lifecycle phase.
    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Options this instance was constructed with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Address the listener is bound to, once [`App::start`] has succeeded.
    /// Useful with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Snapshot of the assembled pipeline and routes as an axum [`Router`],
    /// for embedding into an external server or for tests. The fallback stage
    /// is part of the snapshot only once the lifecycle has reached ready.
    pub fn router(&self) -> Router {
        self.assemble()
    }

    /// Bind the configured listener and begin serving on a background task.
    ///
    /// Suspends until the bind attempt completes. On success the lifecycle
    /// transitions to [`Lifecycle::Ready`], the `ready` event fires (at most
    /// once per instance) and the fallback stage is installed behind all
    /// application routes. On failure the lifecycle transitions to
    /// [`Lifecycle::Failed`], the `error` event fires, and the error is
    /// returned; `ready` never fires in that case.
    pub async fn start(&mut self) -> Result<(), StartError> {
        self.state = Lifecycle::Binding;

        let ip: IpAddr = match self.bind.address.parse() {
            Ok(ip) => ip,
            Err(source) => {
                let err = StartError::InvalidAddress {
                    address: self.bind.address.clone(),
                    source,
                };
                self.fail(&err);
                return Err(err);
            }
        };
        let addr = SocketAddr::new(ip, self.bind.port);

        let listener = match self.bind_listener(addr) {
            Ok(listener) => listener,
            Err(source) => {
                let err = StartError::Bind { addr, source };
                self.fail(&err);
                return Err(err);
            }
        };
        self.local_addr = listener.local_addr().ok();

        self.state = Lifecycle::Ready;
        self.install_fallback();
        self.events.emit_ready();

        let router = self.assemble();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            {
                tracing::error!("Server task exited with error: {}", e);
            }
        });

        tracing::info!(
            "Listening on {} (backlog {})",
            self.local_addr
                .map(|a| a.to_string())
                .unwrap_or_else(|| addr.to_string()),
            self.bind.backlog
        );
        Ok(())
    }

    fn bind_listener(&self, addr: SocketAddr) -> std::io::Result<TcpListener> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.bind(addr)?;
        socket.listen(self.bind.backlog)
    }

    fn fail(&mut self, err: &StartError) {
        tracing::error!("Startup failed: {}", err);
        self.state = Lifecycle::Failed;
        self.events.emit_error(&err.to_string());
    }

    /// Append the fallback stage behind every application route. Guarded so
    /// it happens exactly once per instance.
    fn install_fallback(&mut self) {
        if self.fallback_installed {
            return;
        }
        self.fallback_installed = true;
        self.stages.push(Stage::Fallback);
    }

    fn assemble(&self) -> Router {
        let mut router = self.routes.clone();
        if self.fallback_installed {
            router = router.fallback(pipeline::tail);
        }

        // The last layer added to a Router is the outermost, so walking the
        // stage list in reverse makes requests traverse it in registration
        // order.
        for stage in self.stages.iter().rev() {
            router = pipeline::attach(router, stage, &self.allow_origin, &self.events);
        }
        router
    }
}
