//! Application builder: route and middleware registration.

use std::sync::Arc;

use cyber_config::{AppConfig, ExecutorConfig};
use cyber_core::{Handler, Middleware};
use cyber_middleware::stages::{timeout_with, TimeoutConfig};
use cyber_middleware::MiddlewareRegistry;
use cyber_router::{normalize_path, Router};
use http::Method;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::dispatcher::{not_found_handler, Dispatcher};
use crate::error::{ServerError, ServerResult};
use crate::server::{self, ServeOptions};
use crate::shutdown::ShutdownSignal;

struct PendingRoute {
    method: Method,
    pattern: String,
    handler: Handler,
}

/// A cyber application.
///
/// Routes and middleware can be registered in any order. Nothing is
/// composed until [`build`](Self::build), which resolves every route's
/// chain once and produces an immutable [`Dispatcher`].
///
/// # Example
///
/// ```rust
/// use cyber_core::handler_fn;
/// use cyber_middleware::stages;
/// use cyber_server::App;
/// use http::StatusCode;
///
/// let mut app = App::default();
/// app.use_global([stages::recovery(), stages::logger()]);
/// app.get("/health", handler_fn(|ctx| async move {
///     ctx.string(StatusCode::OK, "ok");
/// }));
///
/// let mut api = app.group("/api");
/// api.get("/users/:id", handler_fn(|ctx| async move {
///     let id = ctx.param("id").unwrap_or_default();
///     ctx.string(StatusCode::OK, id);
/// }));
///
/// let dispatcher = app.build().unwrap();
/// assert_eq!(dispatcher.route_count(), 2);
/// ```
pub struct App {
    config: AppConfig,
    registry: MiddlewareRegistry,
    routes: Vec<PendingRoute>,
    not_found: Option<Handler>,
}

impl App {
    /// Creates an application with `config`.
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            registry: MiddlewareRegistry::new(),
            routes: Vec::new(),
            not_found: None,
        }
    }

    /// The application configuration.
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Installs the `tracing` subscriber described by the logging section.
    pub fn init_logging(&self) -> ServerResult<()> {
        cyber_telemetry::init_logging(&self.config.logging.to_log_config())?;
        Ok(())
    }

    /// Appends middleware applied to every route and to the not-found
    /// handler.
    pub fn use_global(&mut self, middlewares: impl IntoIterator<Item = Middleware>) -> &mut Self {
        self.registry.use_global(middlewares);
        self
    }

    /// Appends middleware applied to every route under `prefix`.
    pub fn use_group(
        &mut self,
        prefix: &str,
        middlewares: impl IntoIterator<Item = Middleware>,
    ) -> &mut Self {
        self.registry.use_group(prefix, middlewares);
        self
    }

    /// Appends middleware for a single route. An unsupported method name is
    /// logged and ignored.
    pub fn use_route(
        &mut self,
        method: &str,
        pattern: &str,
        middlewares: impl IntoIterator<Item = Middleware>,
    ) -> &mut Self {
        self.registry.use_route(method, pattern, middlewares);
        self
    }

    /// Registers `handler` for `method` and `pattern`.
    pub fn handle(&mut self, method: Method, pattern: &str, handler: Handler) -> &mut Self {
        let pattern = normalize_path(pattern).into_owned();
        info!(%method, route = %pattern, "route registered");
        self.routes.push(PendingRoute {
            method,
            pattern,
            handler,
        });
        self
    }

    /// Registers a `GET` route.
    pub fn get(&mut self, pattern: &str, handler: Handler) -> &mut Self {
        self.handle(Method::GET, pattern, handler)
    }

    /// Registers a `POST` route.
    pub fn post(&mut self, pattern: &str, handler: Handler) -> &mut Self {
        self.handle(Method::POST, pattern, handler)
    }

    /// Registers a `PUT` route.
    pub fn put(&mut self, pattern: &str, handler: Handler) -> &mut Self {
        self.handle(Method::PUT, pattern, handler)
    }

    /// Registers a `DELETE` route.
    pub fn delete(&mut self, pattern: &str, handler: Handler) -> &mut Self {
        self.handle(Method::DELETE, pattern, handler)
    }

    /// Registers a `PATCH` route.
    pub fn patch(&mut self, pattern: &str, handler: Handler) -> &mut Self {
        self.handle(Method::PATCH, pattern, handler)
    }

    /// Replaces the handler run when no route matches. It is still
    /// decorated with the global middleware.
    pub fn not_found(&mut self, handler: Handler) -> &mut Self {
        self.not_found = Some(handler);
        self
    }

    /// Opens a route group under `prefix`.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        RouteGroup {
            prefix: join_paths("/", prefix),
            app: self,
        }
    }

    /// Resolves every route's middleware chain and builds the route table.
    ///
    /// Each route is decorated as global, then matching groups, then its
    /// own middleware, and finally wrapped by the bounded executor when
    /// `executor.enabled`. A later registration of the same method and
    /// pattern replaces an earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Route`] for a pattern the router rejects.
    pub fn build(&self) -> ServerResult<Dispatcher> {
        let executor = self
            .config
            .executor
            .enabled
            .then(|| timeout_with(timeout_config(&self.config.executor)));

        let mut router = Router::new();
        for route in &self.routes {
            let mut handler =
                self.registry
                    .resolve(&route.method, &route.pattern, route.handler.clone());
            if let Some(executor) = &executor {
                handler = executor(handler);
            }

            match router.add_route(route.method.clone(), &route.pattern, handler) {
                Ok(None) => {}
                Ok(Some(_)) => warn!(
                    method = %route.method,
                    route = %route.pattern,
                    "duplicate route, previous handler replaced"
                ),
                Err(source) => {
                    error!(
                        method = %route.method,
                        route = %route.pattern,
                        error = %source,
                        "invalid route pattern"
                    );
                    return Err(ServerError::Route {
                        method: route.method.to_string(),
                        pattern: route.pattern.clone(),
                        source,
                    });
                }
            }
        }

        let not_found = self
            .registry
            .apply_global(self.not_found.clone().unwrap_or_else(not_found_handler));

        info!(
            routes = router.len(),
            executor = executor.is_some(),
            "application built"
        );
        Ok(Dispatcher::new(router, not_found))
    }

    /// Binds `host:port` and serves until SIGINT or SIGTERM.
    pub async fn run(self) -> ServerResult<()> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals())
            .await
    }

    /// Binds `host:port` and serves until `shutdown` is triggered.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        self.config.validate()?;
        let addr = self.config.server.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` is triggered.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> ServerResult<()> {
        let dispatcher = Arc::new(self.build()?);
        let options = ServeOptions::from(&self.config.server);
        server::serve(dispatcher, listener, shutdown, options).await
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("routes", &self.routes.len())
            .finish_non_exhaustive()
    }
}

/// Routes and middleware under a common prefix.
///
/// Created by [`App::group`]; nested with [`RouteGroup::group`].
#[derive(Debug)]
pub struct RouteGroup<'a> {
    app: &'a mut App,
    prefix: String,
}

impl RouteGroup<'_> {
    /// The normalized prefix of this group.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Appends middleware applied to every route under this prefix,
    /// including routes registered directly on the app.
    pub fn use_(&mut self, middlewares: impl IntoIterator<Item = Middleware>) -> &mut Self {
        self.app.use_group(&self.prefix, middlewares);
        self
    }

    /// Appends middleware for a single route of this group.
    pub fn use_route(
        &mut self,
        method: &str,
        path: &str,
        middlewares: impl IntoIterator<Item = Middleware>,
    ) -> &mut Self {
        let pattern = join_paths(&self.prefix, path);
        self.app.use_route(method, &pattern, middlewares);
        self
    }

    /// Registers `handler` for `method` at `prefix + path`.
    pub fn handle(&mut self, method: Method, path: &str, handler: Handler) -> &mut Self {
        let pattern = join_paths(&self.prefix, path);
        self.app.handle(method, &pattern, handler);
        self
    }

    /// Registers a `GET` route.
    pub fn get(&mut self, path: &str, handler: Handler) -> &mut Self {
        self.handle(Method::GET, path, handler)
    }

    /// Registers a `POST` route.
    pub fn post(&mut self, path: &str, handler: Handler) -> &mut Self {
        self.handle(Method::POST, path, handler)
    }

    /// Registers a `PUT` route.
    pub fn put(&mut self, path: &str, handler: Handler) -> &mut Self {
        self.handle(Method::PUT, path, handler)
    }

    /// Registers a `DELETE` route.
    pub fn delete(&mut self, path: &str, handler: Handler) -> &mut Self {
        self.handle(Method::DELETE, path, handler)
    }

    /// Registers a `PATCH` route.
    pub fn patch(&mut self, path: &str, handler: Handler) -> &mut Self {
        self.handle(Method::PATCH, path, handler)
    }

    /// Opens a nested group under `prefix + path`.
    pub fn group(&mut self, path: &str) -> RouteGroup<'_> {
        RouteGroup {
            prefix: join_paths(&self.prefix, path),
            app: &mut *self.app,
        }
    }
}

fn timeout_config(executor: &ExecutorConfig) -> TimeoutConfig {
    TimeoutConfig {
        base_timeout: executor.base_timeout(),
        max_attempts: executor.max_attempts,
        max_timeout: executor.max_timeout(),
    }
}

/// Joins a group prefix and a path with exactly one `/` between them.
fn join_paths(base: &str, path: &str) -> String {
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    normalize_path(&joined).into_owned()
}
