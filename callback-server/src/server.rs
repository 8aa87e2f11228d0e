//! HTTP dispatch server for UPnP event notifications and media requests.

use std::any::Any;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, watch, Mutex, OwnedMutexGuard};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use warp::http::{HeaderMap, Method, Response, StatusCode};
use warp::hyper::Body;
use warp::path::FullPath;
use warp::Filter;

use crate::config::CallbackServerConfig;
use crate::error::ServerError;
use crate::failure::{DispatchFailure, FailureKind, FailureReporter, RequestSummary};
use crate::media::{self, MediaEntry, MEDIA_PREFIX};
use crate::router::{normalize_path, EventHandler, EventNotification, Registry, Route};

/// Lifecycle of the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not listening; initial state, the state after `stop()` and after the
    /// listener broke on its own
    Stopped,
    /// Accepting and dispatching requests
    Listening,
    /// Listener torn down by `abort()`, in-flight work discarded
    Aborted,
}

/// HTTP server that dispatches UPnP NOTIFY requests to registered event
/// handlers and serves registered media files.
///
/// Requests are handled strictly one at a time: a request is not read until
/// the previous one has been fully handled, including streaming a media body
/// to the end. Registration does not take part in that ordering and may
/// happen at any time.
///
/// # Example
///
/// ```no_run
/// use callback_server::{CallbackServerConfig, DispatchServer, EventNotification};
/// use tokio::sync::mpsc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), callback_server::ServerError> {
///     let (failure_tx, _failure_rx) = mpsc::unbounded_channel();
///     let mut server = DispatchServer::new(CallbackServerConfig::default(), failure_tx)?;
///     server.start().await?;
///
///     let (event_tx, mut event_rx) = mpsc::unbounded_channel::<EventNotification>();
///     server.register_event_handler("/events/avtransport", event_tx).await;
///     println!("Subscribe with callback {}", server.url_for("/events/avtransport"));
///
///     while let Some(notification) = event_rx.recv().await {
///         println!("{} changed {} instances", notification.sid, notification.changes.len());
///     }
///     server.stop().await;
///     Ok(())
/// }
/// ```
pub struct DispatchServer {
    config: CallbackServerConfig,
    port: u16,
    base_url: String,
    registry: Registry,
    failures: FailureReporter,
    /// Held by whichever request is being dispatched
    gate: Arc<Mutex<()>>,
    /// Shared with the listener watcher, which marks a broken listener stopped
    state: Arc<watch::Sender<ServerState>>,
    running: Option<Running>,
    /// Watcher of an aborted listener, awaited before the port is bound again
    aborted: Option<JoinHandle<()>>,
}

struct Running {
    shutdown_tx: oneshot::Sender<()>,
    stop_requested: Arc<AtomicBool>,
    cancel: CancellationToken,
    listener: AbortHandle,
    watcher: JoinHandle<()>,
}

/// Everything a request needs, shared by all requests of one listener
struct DispatchContext {
    registry: Registry,
    failures: FailureReporter,
    cancel: CancellationToken,
}

impl DispatchServer {
    /// Pick a port and the advertised address. The server starts in
    /// `ServerState::Stopped`; call [`start`](Self::start) to listen.
    ///
    /// Failures of individual requests and of the listener are sent to
    /// `failure_sender`.
    pub fn new(
        config: CallbackServerConfig,
        failure_sender: mpsc::UnboundedSender<DispatchFailure>,
    ) -> Result<Self, ServerError> {
        let (start, end) = config.port_range;
        let port = Self::find_available_port(config.bind_ip, start, end)
            .ok_or(ServerError::NoAvailablePort { start, end })?;

        let local_ip = match config.advertised_ip {
            Some(ip) => ip,
            None => Self::detect_local_ip().ok_or(ServerError::LocalIpUnavailable)?,
        };

        let base_url = format!("http://{}", SocketAddr::new(local_ip, port));
        let (state, _) = watch::channel(ServerState::Stopped);

        Ok(Self {
            config,
            port,
            base_url,
            registry: Registry::new(),
            failures: FailureReporter::new(failure_sender),
            gate: Arc::new(Mutex::new(())),
            state: Arc::new(state),
            running: None,
            aborted: None,
        })
    }

    /// Begin accepting requests.
    ///
    /// # Errors
    ///
    /// `AlreadyListening` if the server is listening, `Bind` if the port can
    /// no longer be bound.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        if self.is_listening() {
            return Err(ServerError::AlreadyListening);
        }
        if let Some(watcher) = self.aborted.take() {
            let _ = watcher.await;
        }
        // Left behind by a listener that broke on its own
        if let Some(broken) = self.running.take() {
            let _ = broken.watcher.await;
        }

        let cancel = CancellationToken::new();
        let context = Arc::new(DispatchContext {
            registry: self.registry.clone(),
            failures: self.failures.clone(),
            cancel: cancel.clone(),
        });
        let routes = dispatch_routes(context, Arc::clone(&self.gate));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let addr = SocketAddr::new(self.config.bind_ip, self.port);
        let (bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, async move {
                let _ = shutdown_rx.await;
            })
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        let server_task = tokio::spawn(server);
        let listener = server_task.abort_handle();
        let stop_requested = Arc::new(AtomicBool::new(false));
        let watcher = tokio::spawn(watch_listener(
            server_task,
            Arc::clone(&stop_requested),
            Arc::clone(&self.state),
            self.failures.clone(),
        ));

        self.running = Some(Running {
            shutdown_tx,
            stop_requested,
            cancel,
            listener,
            watcher,
        });
        self.state.send_replace(ServerState::Listening);
        tracing::info!("dispatch server listening on {} as {}", bound, self.base_url);
        Ok(())
    }

    /// Stop accepting requests and wait for in-flight handling to finish.
    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.stop_requested.store(true, Ordering::SeqCst);
            let _ = running.shutdown_tx.send(());
            let _ = running.watcher.await;
            tracing::info!("dispatch server on port {} stopped", self.port);
        }
        self.state.send_replace(ServerState::Stopped);
    }

    /// Tear the listener down immediately. Handlers in progress are not
    /// waited for and media streams are cut off.
    pub fn abort(&mut self) {
        if let Some(running) = self.running.take() {
            running.stop_requested.store(true, Ordering::SeqCst);
            running.cancel.cancel();
            running.listener.abort();
            self.aborted = Some(running.watcher);
            tracing::info!("dispatch server on port {} aborted", self.port);
        }
        self.state.send_replace(ServerState::Aborted);
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    pub fn is_listening(&self) -> bool {
        self.state() == ServerState::Listening
    }

    /// `http://<advertised ip>:<port>`
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Absolute URL of a path on this server
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, normalize_path(path))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// See [`Registry::register_event_handler`]
    pub async fn register_event_handler(&self, path: &str, handler: impl EventHandler) {
        self.registry.register_event_handler(path, handler).await;
    }

    pub async fn unregister_event_handler(&self, path: &str) -> bool {
        self.registry.unregister_event_handler(path).await
    }

    /// Publish a local file and return the URL renderers can fetch it from.
    ///
    /// # Errors
    ///
    /// `MediaNotFound` if `file` is not an existing regular file.
    pub async fn add_media(&self, file: impl AsRef<Path>) -> Result<String, ServerError> {
        let file = file.as_ref();
        match tokio::fs::metadata(file).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(ServerError::MediaNotFound(file.to_path_buf())),
        }

        let path = media::media_path_for(file);
        self.registry
            .insert_media(&path, MediaEntry::new(file.to_path_buf()))
            .await;
        tracing::debug!("publishing {} at {}", file.display(), path);
        Ok(self.url_for(&path))
    }

    /// Withdraw a file published by [`add_media`](Self::add_media). Accepts the
    /// returned URL, its path, or the file path. Returns false if nothing was
    /// published under it.
    pub async fn remove_media(&self, url_or_path: &str) -> bool {
        let relative = url_or_path.strip_prefix(&self.base_url).unwrap_or(url_or_path);
        let path = if relative.starts_with(MEDIA_PREFIX) {
            relative.to_string()
        } else {
            media::media_path_for(Path::new(url_or_path))
        };
        self.registry.remove_media(&path).await
    }

    fn find_available_port(ip: IpAddr, start: u16, end: u16) -> Option<u16> {
        (start..=end).find(|&port| Self::is_port_available(ip, port))
    }

    fn is_port_available(ip: IpAddr, port: u16) -> bool {
        TcpListener::bind(SocketAddr::new(ip, port)).is_ok()
    }

    fn detect_local_ip() -> Option<IpAddr> {
        // No data is sent; connecting only selects the outbound interface
        let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        let local_addr = socket.local_addr().ok()?;
        match local_addr.ip() {
            IpAddr::V4(ip) if ip == Ipv4Addr::UNSPECIFIED => None,
            ip => Some(ip),
        }
    }
}

impl Drop for DispatchServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.stop_requested.store(true, Ordering::SeqCst);
            running.cancel.cancel();
            running.listener.abort();
        }
    }
}

async fn watch_listener(
    server_task: JoinHandle<()>,
    stop_requested: Arc<AtomicBool>,
    state: Arc<watch::Sender<ServerState>>,
    failures: FailureReporter,
) {
    let error = match server_task.await {
        Ok(()) if stop_requested.load(Ordering::SeqCst) => {
            tracing::debug!("listener finished after stop");
            return;
        }
        Ok(()) => "listener exited without a stop request".to_string(),
        Err(e) if e.is_cancelled() => {
            tracing::debug!("listener aborted");
            return;
        }
        Err(e) => format!("listener task failed: {e}"),
    };
    state.send_replace(ServerState::Stopped);
    failures.report(FailureKind::ListenerBroken, None, error);
}

fn dispatch_routes(
    context: Arc<DispatchContext>,
    gate: Arc<Mutex<()>>,
) -> impl Filter<Extract = (Response<Body>,), Error = Infallible> + Clone + Send + Sync + 'static {
    // The gate is taken before the body is read, so one request is in
    // progress at any time.
    let acquire_gate = warp::any()
        .map(move || Arc::clone(&gate))
        .then(|gate: Arc<Mutex<()>>| async move { gate.lock_owned().await });

    // A body read failure is handed on as a value so `dispatch` can report it
    // against the request it belongs to.
    let body = warp::body::bytes()
        .map(Ok::<Bytes, String>)
        .recover(|rejection: warp::Rejection| async move {
            Ok::<_, Infallible>(Err(format!("{rejection:?}")))
        })
        .unify();

    warp::any()
        .map(move || Arc::clone(&context))
        .and(acquire_gate)
        .and(warp::method())
        .and(warp::path::full())
        .and(warp::header::headers_cloned())
        .and(warp::addr::remote())
        .and(body)
        .then(dispatch)
}

async fn dispatch(
    context: Arc<DispatchContext>,
    guard: OwnedMutexGuard<()>,
    method: Method,
    path: FullPath,
    headers: HeaderMap,
    remote: Option<SocketAddr>,
    body: Result<Bytes, String>,
) -> Response<Body> {
    let summary = RequestSummary {
        method: method.to_string(),
        path: path.as_str().to_string(),
        remote,
    };

    if context.cancel.is_cancelled() {
        return status_response(StatusCode::SERVICE_UNAVAILABLE);
    }
    tracing::debug!("{} {} from {:?}", summary.method, summary.path, remote);

    let body = match body {
        Ok(body) => body,
        Err(e) => {
            context.failures.report(
                FailureKind::Unhandled,
                Some(summary),
                format!("request body could not be read: {e}"),
            );
            return status_response(StatusCode::BAD_REQUEST);
        }
    };

    match context.registry.route(path.as_str()).await {
        Some(Route::Event(handler)) => {
            let response = handle_event(&context, handler.as_ref(), &method, &headers, body, summary);
            drop(guard);
            response
        }
        Some(Route::Media(entry)) => {
            serve_media(&context, entry, &method, &headers, summary, guard).await
        }
        None => {
            context.failures.report(
                FailureKind::Unhandled,
                Some(summary),
                "no handler registered for path",
            );
            status_response(StatusCode::NOT_FOUND)
        }
    }
}

fn handle_event(
    context: &DispatchContext,
    handler: &dyn EventHandler,
    method: &Method,
    headers: &HeaderMap,
    body: Bytes,
    summary: RequestSummary,
) -> Response<Body> {
    let reject = |status: StatusCode, error: String| {
        context
            .failures
            .report(FailureKind::EventAnalyzeFailed, Some(summary.clone()), error);
        status_response(status)
    };

    if method.as_str() != "NOTIFY" {
        return reject(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("expected NOTIFY, got {method}"),
        );
    }

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);
    let sid = match validate_gena_headers(header("sid"), header("nt"), header("nts")) {
        Ok(sid) => sid.to_string(),
        Err(reason) => return reject(StatusCode::BAD_REQUEST, reason.to_string()),
    };
    let seq = match header("seq").map(str::parse::<u32>) {
        None => None,
        Some(Ok(seq)) => Some(seq),
        Some(Err(e)) => return reject(StatusCode::BAD_REQUEST, format!("invalid SEQ header: {e}")),
    };

    let body = match String::from_utf8(body.to_vec()) {
        Ok(body) => body,
        Err(e) => return reject(StatusCode::BAD_REQUEST, format!("body is not UTF-8: {e}")),
    };
    let parsed = match upnp_parser::parse_notification(&body) {
        Ok(parsed) => parsed,
        Err(e) => return reject(StatusCode::BAD_REQUEST, format!("unparsable notification: {e}")),
    };

    let notification = EventNotification {
        path: summary.path.clone(),
        sid,
        seq,
        changes: parsed.instances,
        property_set: parsed.properties,
        body,
    };
    match panic::catch_unwind(AssertUnwindSafe(|| handler.handle_event(notification))) {
        Ok(()) => status_response(StatusCode::OK),
        Err(payload) => {
            context.failures.report(
                FailureKind::HandlerFailed,
                Some(summary),
                format!("handler panicked: {}", panic_message(payload.as_ref())),
            );
            status_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// `SID` is required. `NT` and `NTS`, when sent, must carry the GENA values.
fn validate_gena_headers<'a>(
    sid: Option<&'a str>,
    nt: Option<&str>,
    nts: Option<&str>,
) -> Result<&'a str, &'static str> {
    let sid = sid.filter(|s| !s.is_empty()).ok_or("missing SID header")?;
    if nt.is_some_and(|nt| nt != "upnp:event") {
        return Err("NT header is not upnp:event");
    }
    if nts.is_some_and(|nts| nts != "upnp:propchange") {
        return Err("NTS header is not upnp:propchange");
    }
    Ok(sid)
}

async fn serve_media(
    context: &DispatchContext,
    entry: MediaEntry,
    method: &Method,
    headers: &HeaderMap,
    summary: RequestSummary,
    guard: OwnedMutexGuard<()>,
) -> Response<Body> {
    if method != Method::GET && method != Method::HEAD {
        context.failures.report(
            FailureKind::Unhandled,
            Some(summary),
            "media paths only answer GET and HEAD",
        );
        return status_response(StatusCode::METHOD_NOT_ALLOWED);
    }

    let failures = context.failures.clone();
    let stream_summary = summary.clone();
    let cancel = context.cancel.clone();
    let result = media::respond(&entry, method, headers, move |stream| {
        let stream = stream.take_until(async move { cancel.cancelled().await });
        media::guarded_stream(stream, guard, move |e| {
            failures.report(
                FailureKind::MediaTransportFailed,
                Some(stream_summary.clone()),
                e.to_string(),
            )
        })
    })
    .await;

    match result {
        Ok(response) => response,
        Err(e) => {
            let status = if e.kind() == std::io::ErrorKind::NotFound {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            context.failures.report(
                FailureKind::MediaTransportFailed,
                Some(summary),
                format!("{}: {}", entry.file.display(), e),
            );
            status_response(status)
        }
    }
}

fn status_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}
