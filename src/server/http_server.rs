use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};

use may::coroutine::JoinHandle;
use may_minihttp::HttpServerWithHeaders;
use tracing::info;

use super::service::AppService;
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;

/// Request headers accepted per request; proxies add identity and tracing headers.
pub const MAX_REQUEST_HEADERS: usize = 32;

/// How long [`ServerHandle::wait_ready`] polls before giving up.
pub const READY_TIMEOUT: Duration = Duration::from_millis(250);

static RUNTIME: Once = Once::new();

/// Serves a [`Dispatcher`] with the `server` section of its configuration.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use waypost::server::HttpServer;
/// use waypost::AppBuilder;
///
/// let app = AppBuilder::new().build()?;
/// let handle = HttpServer::new(Arc::new(app)).bind("127.0.0.1:8080").start()?;
/// handle.wait_ready()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct HttpServer {
    service: AppService,
    config: ServerConfig,
}

impl HttpServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        let config = dispatcher.config().server.clone();
        Self {
            service: AppService::new(dispatcher),
            config,
        }
    }

    /// Listen on `addr` instead of `server.addr`.
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.config.addr = addr.into();
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Configure the coroutine runtime, bind and start accepting.
    ///
    /// The stack size applies to every server started; the worker count is
    /// taken from the first one in the process.
    ///
    /// # Errors
    ///
    /// Fails if `server.addr` does not resolve or cannot be bound.
    pub fn start(self) -> io::Result<ServerHandle> {
        let addr = self
            .config
            .addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing"))?;

        may::config().set_stack_size(self.config.stack_size);
        RUNTIME.call_once(|| {
            if let Some(workers) = self.config.workers {
                may::config().set_workers(workers);
            }
        });

        let handle = HttpServerWithHeaders::<_, MAX_REQUEST_HEADERS>(self.service).start(addr)?;
        info!(
            addr = %addr,
            stack_size = self.config.stack_size,
            workers = ?self.config.workers,
            "HTTP server listening"
        );
        Ok(ServerHandle {
            addr,
            handle,
            started: Instant::now(),
        })
    }
}

/// A running server.
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
    started: Instant,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Poll the listening address until it accepts connections.
    ///
    /// # Errors
    ///
    /// `TimedOut` if nothing accepts within [`READY_TIMEOUT`].
    pub fn wait_ready(&self) -> io::Result<()> {
        let deadline = Instant::now() + READY_TIMEOUT;
        while Instant::now() < deadline {
            if TcpStream::connect_timeout(&self.addr, Duration::from_millis(20)).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("server on {} not ready after {:?}", self.addr, READY_TIMEOUT),
        ))
    }

    /// Cancel the accept loop and wait for it to unwind.
    pub fn stop(self) {
        let uptime_ms = self.uptime().as_millis();
        // SAFETY: the handle is owned, so the coroutine is still valid, and
        // cancellation is how the accept loop is shut down.
        unsafe {
            self.handle.coroutine().cancel();
        }
        let cancelled = self.handle.join().is_err();
        info!(addr = %self.addr, uptime_ms, cancelled, "HTTP server stopped");
    }

    /// Block until the server coroutine finishes.
    ///
    /// # Errors
    ///
    /// The panic payload if the server coroutine panicked.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}
