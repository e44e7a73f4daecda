//! Request context types.
//!
//! The [`RequestContext`] carries all per-request state through the
//! middleware chain and into the handler: the request itself, the route
//! parameters, a key/value store shared between stages, the active
//! cancellation token and the single response slot.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use cyber_router::Params;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::futures::TaskLocalFuture;
use tracing::{debug, error};
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::error::{codes, BindError, ContextError, ErrorBody};
use crate::validation::Schema;

tokio::task_local! {
    /// Token bound to the current task for one context, keyed by its scope id.
    static SCOPED_TOKEN: (u64, CancellationToken);
}

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

/// Route recorded for requests that matched no pattern.
pub const UNMATCHED_ROUTE: &str = "<unmatched>";

const JSON_CONTENT_TYPE: &str = "application/json";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, so ids sort by arrival and line up with logs.
///
/// # Example
///
/// ```
/// use cyber_core::RequestId;
///
/// let id = RequestId::new();
/// assert_ne!(id, RequestId::new());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new request id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parses an id supplied by the client, e.g. an `x-request-id` header.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

type StoreValue = Arc<dyn Any + Send + Sync>;

/// Per-request state shared by every middleware stage and the handler.
///
/// A context is created for one inbound request and dropped once its
/// response is taken. It is never pooled, so nothing stored in it can leak
/// into another request.
///
/// All mutation goes through `&self`: the context is handed around as an
/// `Arc<RequestContext>` and each mutable part carries its own lock.
///
/// # Responses
///
/// The first call to a response helper ([`json`](Self::json),
/// [`string`](Self::string), [`error`](Self::error), ...) commits the
/// response. Later writes are dropped, which is what keeps an abandoned
/// handler attempt from overwriting the timeout response that replaced it.
///
/// # Example
///
/// ```
/// use cyber_core::RequestContext;
/// use http::StatusCode;
///
/// let ctx = RequestContext::mock();
/// ctx.set("tenant", String::from("acme"));
///
/// ctx.string(StatusCode::OK, "first");
/// ctx.string(StatusCode::IM_A_TEAPOT, "second");
///
/// assert_eq!(ctx.get_string("tenant").unwrap(), "acme");
/// let response = ctx.take_response();
/// assert_eq!(response.status(), StatusCode::OK);
/// ```
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    started_at: Instant,
    scope: u64,

    params: RwLock<Params>,
    route: RwLock<Option<String>>,
    store: RwLock<HashMap<String, StoreValue>>,
    token: Mutex<CancellationToken>,

    status: AtomicU16,
    written: AtomicBool,
    response: Mutex<Option<Response<Bytes>>>,
    pending_headers: Mutex<HeaderMap>,
}

impl RequestContext {
    /// Creates a context from the parts of a request and its collected body.
    #[must_use]
    pub fn new(parts: http::request::Parts, body: Bytes) -> Self {
        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .and_then(RequestId::parse)
            .unwrap_or_default();

        Self {
            request_id,
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            remote_addr: None,
            started_at: Instant::now(),
            scope: NEXT_SCOPE.fetch_add(1, Ordering::Relaxed),
            params: RwLock::new(Params::new()),
            route: RwLock::new(None),
            store: RwLock::new(HashMap::new()),
            token: Mutex::new(CancellationToken::new()),
            status: AtomicU16::new(StatusCode::OK.as_u16()),
            written: AtomicBool::new(false),
            response: Mutex::new(None),
            pending_headers: Mutex::new(HeaderMap::new()),
        }
    }

    /// Creates a context from a buffered request.
    #[must_use]
    pub fn from_request(request: Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self::new(parts, body)
    }

    /// Sets the peer address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// A `GET /` context with an empty body, for tests.
    #[must_use]
    pub fn mock() -> Self {
        let (parts, ()) = Request::new(()).into_parts();
        Self::new(parts, Bytes::new())
    }

    // ------------------------------------------------------------------
    // Request accessors
    // ------------------------------------------------------------------

    /// Returns the request id.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the raw query string.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Returns the first decoded value of a query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_str(self.query()?).ok()?;
        pairs.into_iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Returns a request header as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns all request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the buffered request body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the peer address, when known.
    #[must_use]
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    // ------------------------------------------------------------------
    // Route parameters
    // ------------------------------------------------------------------

    /// Replaces the route parameters. Called by the dispatcher after a match.
    pub fn set_params(&self, params: Params) {
        *self.params.write() = params;
    }

    /// Returns a route parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<String> {
        self.params.read().get(name).map(str::to_string)
    }

    /// Returns a snapshot of every route parameter.
    #[must_use]
    pub fn params(&self) -> Params {
        self.params.read().clone()
    }

    /// Records the pattern this request was routed by, or [`UNMATCHED_ROUTE`].
    pub fn set_route(&self, pattern: impl Into<String>) {
        *self.route.write() = Some(pattern.into());
    }

    /// The pattern this request was routed by, once dispatched.
    #[must_use]
    pub fn route(&self) -> Option<String> {
        self.route.read().clone()
    }

    // ------------------------------------------------------------------
    // Key/value store
    // ------------------------------------------------------------------

    /// Stores a value under `key`, replacing any previous value.
    pub fn set<T>(&self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.store.write().insert(key.into(), Arc::new(value));
    }

    /// Returns the type-erased value under `key`.
    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.store.read().get(key).cloned()
    }

    /// Returns the value under `key` as a `T`.
    pub fn get<T>(&self, key: &str) -> Result<Arc<T>, ContextError>
    where
        T: Any + Send + Sync,
    {
        let value = self
            .get_value(key)
            .ok_or_else(|| ContextError::not_found(key))?;
        value
            .downcast::<T>()
            .map_err(|_| ContextError::mismatch(key, type_name::<T>()))
    }

    /// Returns a string value. Accepts `String` and `&'static str`.
    pub fn get_string(&self, key: &str) -> Result<String, ContextError> {
        let value = self
            .get_value(key)
            .ok_or_else(|| ContextError::not_found(key))?;
        if let Some(s) = value.downcast_ref::<String>() {
            return Ok(s.clone());
        }
        if let Some(s) = value.downcast_ref::<&'static str>() {
            return Ok((*s).to_string());
        }
        Err(ContextError::mismatch(key, "string"))
    }

    /// Returns an `i64` value.
    pub fn get_int(&self, key: &str) -> Result<i64, ContextError> {
        self.get::<i64>(key).map(|v| *v)
    }

    /// Returns a `bool` value.
    pub fn get_bool(&self, key: &str) -> Result<bool, ContextError> {
        self.get::<bool>(key).map(|v| *v)
    }

    /// Returns `true` if a value is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.store.read().contains_key(key)
    }

    /// Removes and returns the value under `key`.
    pub fn remove(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.store.write().remove(key)
    }

    // ------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------

    /// Installs `token` as the active cancellation token.
    pub fn with_context(&self, token: CancellationToken) {
        *self.token.lock() = token;
    }

    /// Runs `fut` with `token` as this context's token on the current task.
    ///
    /// Inside the scope [`context`](Self::context) returns `token` rather than
    /// the installed one, so concurrent copies of a handler each see their
    /// own token. Tasks spawned from inside `fut` do not inherit the scope.
    pub fn scope_context<F: Future>(
        &self,
        token: CancellationToken,
        fut: F,
    ) -> TaskLocalFuture<(u64, CancellationToken), F> {
        SCOPED_TOKEN.scope((self.scope, token), fut)
    }

    /// Returns the active cancellation token: the one scoped to the current
    /// task, else the installed one.
    #[must_use]
    pub fn context(&self) -> CancellationToken {
        SCOPED_TOKEN
            .try_with(|(scope, token)| (*scope == self.scope).then(|| token.clone()))
            .ok()
            .flatten()
            .unwrap_or_else(|| self.token.lock().clone())
    }

    // ------------------------------------------------------------------
    // Response
    // ------------------------------------------------------------------

    /// Returns `true` once a response has been committed.
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.written.load(Ordering::Acquire)
    }

    /// The committed status, or `200` if nothing has been written yet.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status.load(Ordering::Acquire)).unwrap_or(StatusCode::OK)
    }

    /// Stages a header for the response.
    ///
    /// Staged headers are merged when the response is taken; a header the
    /// handler set itself is not overridden.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.pending_headers.lock().insert(name, value);
    }

    /// Commits `response` unless one was already committed.
    ///
    /// Returns `true` if this call won.
    pub fn write_response(&self, response: Response<Bytes>) -> bool {
        let mut slot = self.response.lock();
        if self.written.swap(true, Ordering::AcqRel) {
            debug!(
                request_id = %self.request_id,
                status = response.status().as_u16(),
                "response already written, dropping late write"
            );
            return false;
        }
        self.status
            .store(response.status().as_u16(), Ordering::Release);
        *slot = Some(response);
        true
    }

    /// Runs `f` against the committed response, if any.
    pub fn with_response<R>(&self, f: impl FnOnce(&Response<Bytes>) -> R) -> Option<R> {
        self.response.lock().as_ref().map(f)
    }

    /// Takes the committed response with staged headers merged in.
    ///
    /// Seals the context; if nothing was written an empty `200` is returned.
    pub fn take_response(&self) -> Response<Bytes> {
        let taken = {
            let mut slot = self.response.lock();
            self.written.store(true, Ordering::Release);
            slot.take()
        };
        let mut response = taken.unwrap_or_else(|| Response::new(Bytes::new()));

        let pending = std::mem::take(&mut *self.pending_headers.lock());
        let headers = response.headers_mut();
        let mut last = None;
        for (name, value) in pending {
            if let Some(name) = name {
                last = Some(name);
            }
            if let Some(name) = &last {
                if !headers.contains_key(name) {
                    headers.insert(name.clone(), value);
                }
            }
        }
        response
    }

    fn write_bytes(&self, status: StatusCode, content_type: &'static str, body: Bytes) -> bool {
        let mut response = Response::new(body);
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        self.write_response(response)
    }

    /// Writes an empty response with `status`.
    pub fn status(&self, status: StatusCode) -> bool {
        let mut response = Response::new(Bytes::new());
        *response.status_mut() = status;
        self.write_response(response)
    }

    /// Writes `value` as JSON.
    ///
    /// A value that fails to serialize produces `500 INTERNAL_ERROR` instead.
    pub fn json<T: Serialize + ?Sized>(&self, status: StatusCode, value: &T) -> bool {
        match serde_json::to_vec(value) {
            Ok(body) => self.write_bytes(status, JSON_CONTENT_TYPE, Bytes::from(body)),
            Err(e) => {
                error!(request_id = %self.request_id, error = %e, "failed to serialize response");
                self.error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    codes::INTERNAL_ERROR,
                    "failed to serialize response",
                )
            }
        }
    }

    /// Writes `value` as a `200` JSON response.
    pub fn success<T: Serialize + ?Sized>(&self, value: &T) -> bool {
        self.json(StatusCode::OK, value)
    }

    /// Writes a plain-text response.
    pub fn string(&self, status: StatusCode, body: impl Into<String>) -> bool {
        self.write_bytes(status, TEXT_CONTENT_TYPE, Bytes::from(body.into()))
    }

    /// Writes an HTML response.
    pub fn html(&self, status: StatusCode, body: impl Into<String>) -> bool {
        self.write_bytes(status, HTML_CONTENT_TYPE, Bytes::from(body.into()))
    }

    /// Writes a redirect to `location`.
    pub fn redirect(&self, status: StatusCode, location: &str) -> bool {
        let Ok(value) = HeaderValue::from_str(location) else {
            return self.error(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL_ERROR,
                "invalid redirect location",
            );
        };
        let mut response = Response::new(Bytes::new());
        *response.status_mut() = status;
        response.headers_mut().insert(header::LOCATION, value);
        self.write_response(response)
    }

    /// Writes the `{code, message}` error envelope.
    pub fn error(&self, status: StatusCode, code: &str, message: impl Into<String>) -> bool {
        self.json(status, &ErrorBody::new(code, message))
    }

    // ------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------

    /// Deserializes the body as JSON.
    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Deserializes the query string.
    pub fn bind_query<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        Ok(serde_urlencoded::from_str(self.query().unwrap_or(""))?)
    }

    /// Deserializes the body as JSON after checking it against `schema`.
    pub fn bind_and_validate<T: DeserializeOwned>(&self, schema: &Schema) -> Result<T, BindError> {
        let value: serde_json::Value = serde_json::from_slice(&self.body)?;
        schema.validate(&value)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Writes `400` with the envelope of a failed bind: `VALIDATION_ERROR`
    /// for schema failures, `BAD_REQUEST` otherwise.
    pub fn reject(&self, err: &BindError) -> bool {
        self.json(StatusCode::BAD_REQUEST, &err.to_body())
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("remote_addr", &self.remote_addr)
            .field("written", &self.is_written())
            .finish_non_exhaustive()
    }
}
