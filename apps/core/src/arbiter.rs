use std::fmt::{Display, Formatter};
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::logging;

#[cfg(unix)]
use fs2::FileExt;
#[cfg(unix)]
use std::fs::{File, OpenOptions};
#[cfg(unix)]
use std::os::unix::fs::MetadataExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::sync::mpsc;

const MAX_MESSAGE_BYTES: u64 = 4096;
const ACCEPT_POLL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub enum ArbiterError {
    Bind { endpoint: String, source: std::io::Error },
    Io(std::io::Error),
}

impl Display for ArbiterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bind { endpoint, source } => {
                write!(f, "failed to bind rendezvous endpoint {endpoint}: {source}")
            }
            Self::Io(error) => write!(f, "rendezvous io error: {error}"),
        }
    }
}

impl std::error::Error for ArbiterError {}

impl From<std::io::Error> for ArbiterError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendezvousEndpoint {
    #[cfg(unix)]
    Socket(PathBuf),
    Loopback(u16),
}

impl RendezvousEndpoint {
    #[cfg(unix)]
    pub fn from_config(config: &Config) -> Self {
        Self::Socket(runtime_dir().join(format!("{}.sock", config.rendezvous_name)))
    }

    #[cfg(not(unix))]
    pub fn from_config(config: &Config) -> Self {
        Self::Loopback(config.rendezvous_port)
    }
}

impl Display for RendezvousEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(unix)]
            Self::Socket(path) => write!(f, "unix:{}", path.display()),
            Self::Loopback(port) => write!(f, "tcp:127.0.0.1:{port}"),
        }
    }
}

#[cfg(unix)]
fn runtime_dir() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArbiterMessage {
    Activate { pid: u32 },
}

pub enum Acquisition {
    Acquired(ArbiterToken),
    AlreadyRunning,
}

impl std::fmt::Debug for Acquisition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acquired(token) => write!(f, "Acquired({})", token.endpoint),
            Self::AlreadyRunning => write!(f, "AlreadyRunning"),
        }
    }
}

enum Listener {
    #[cfg(unix)]
    Unix(UnixListener),
    Tcp(TcpListener),
}

impl Listener {
    fn set_nonblocking(&self) -> std::io::Result<()> {
        match self {
            #[cfg(unix)]
            Self::Unix(listener) => listener.set_nonblocking(true),
            Self::Tcp(listener) => listener.set_nonblocking(true),
        }
    }

    fn accept(&self) -> std::io::Result<Connection> {
        match self {
            #[cfg(unix)]
            Self::Unix(listener) => listener.accept().map(|(s, _)| Connection::Unix(s)),
            Self::Tcp(listener) => listener.accept().map(|(s, _)| Connection::Tcp(s)),
        }
    }
}

enum Connection {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Connection {
    fn set_timeouts(&self, timeout: Duration) -> std::io::Result<()> {
        match self {
            #[cfg(unix)]
            Self::Unix(stream) => {
                stream.set_nonblocking(false)?;
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))
            }
            Self::Tcp(stream) => {
                stream.set_nonblocking(false)?;
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))
            }
        }
    }

    fn send(&mut self, payload: &[u8]) -> std::io::Result<()> {
        match self {
            #[cfg(unix)]
            Self::Unix(stream) => stream.write_all(payload),
            Self::Tcp(stream) => stream.write_all(payload),
        }
    }

    fn read_message(&mut self) -> std::io::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        match self {
            #[cfg(unix)]
            Self::Unix(stream) => stream.take(MAX_MESSAGE_BYTES).read_to_end(&mut buffer)?,
            Self::Tcp(stream) => stream.take(MAX_MESSAGE_BYTES).read_to_end(&mut buffer)?,
        };
        Ok(buffer)
    }
}

// The socket file this instance bound, identified by inode and change time so
// a replacement bound by another instance at the same path is never unlinked.
#[cfg(unix)]
struct SocketFile {
    path: PathBuf,
    dev: u64,
    ino: u64,
    ctime: (i64, i64),
}

#[cfg(unix)]
impl SocketFile {
    fn bound(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            dev: meta.dev(),
            ino: meta.ino(),
            ctime: (meta.ctime(), meta.ctime_nsec()),
        })
    }

    fn is_ours(&self) -> bool {
        std::fs::metadata(&self.path)
            .map(|meta| {
                meta.dev() == self.dev
                    && meta.ino() == self.ino
                    && (meta.ctime(), meta.ctime_nsec()) == self.ctime
            })
            .unwrap_or(false)
    }

    fn release(&self) {
        let _lock = lock_rendezvous(&self.path).ok();
        if self.is_ours() {
            let _ = std::fs::remove_file(&self.path);
        } else {
            logging::warn(&format!(
                "rendezvous {} was replaced by another instance; leaving it",
                self.path.display()
            ));
        }
    }
}

// Serializes acquisition and release between instances. The lock is released
// when the returned file is closed.
#[cfg(unix)]
fn lock_rendezvous(socket_path: &Path) -> std::io::Result<File> {
    let lock_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(socket_path.with_extension("lock"))?;
    lock_file.lock_exclusive()?;
    Ok(lock_file)
}

pub struct InstanceArbiter {
    endpoint: RendezvousEndpoint,
    timeout: Duration,
}

impl InstanceArbiter {
    pub fn new(endpoint: RendezvousEndpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            RendezvousEndpoint::from_config(config),
            config.rendezvous_timeout(),
        )
    }

    pub fn endpoint(&self) -> &RendezvousEndpoint {
        &self.endpoint
    }

    pub fn try_acquire(&self) -> Result<Acquisition, ArbiterError> {
        #[cfg(unix)]
        let _lock = match &self.endpoint {
            RendezvousEndpoint::Socket(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| self.bind_error(e))?;
                }
                Some(lock_rendezvous(path).map_err(|e| self.bind_error(e))?)
            }
            RendezvousEndpoint::Loopback(_) => None,
        };

        match self.connect() {
            ConnectOutcome::Connected(mut connection) => {
                self.signal_activation(&mut connection);
                logging::info(&format!("instance already running at {}", self.endpoint));
                Ok(Acquisition::AlreadyRunning)
            }
            ConnectOutcome::NoListener => self.bind(false),
            ConnectOutcome::TimedOut => {
                logging::warn(&format!(
                    "rendezvous {} unresponsive after {:?}; taking ownership",
                    self.endpoint, self.timeout
                ));
                self.bind(true)
            }
        }
    }

    fn bind_error(&self, source: std::io::Error) -> ArbiterError {
        ArbiterError::Bind {
            endpoint: self.endpoint.to_string(),
            source,
        }
    }

    fn signal_activation(&self, connection: &mut Connection) {
        let message = ArbiterMessage::Activate {
            pid: std::process::id(),
        };
        let sent = serde_json::to_vec(&message)
            .map_err(std::io::Error::from)
            .and_then(|payload| {
                connection.set_timeouts(self.timeout)?;
                connection.send(&payload)
            });
        if let Err(error) = sent {
            logging::warn(&format!("activation message not delivered: {error}"));
        }
    }

    fn connect(&self) -> ConnectOutcome {
        match &self.endpoint {
            #[cfg(unix)]
            RendezvousEndpoint::Socket(path) => {
                let (tx, rx) = mpsc::channel();
                let path = path.clone();
                thread::spawn(move || {
                    let _ = tx.send(UnixStream::connect(path));
                });
                match rx.recv_timeout(self.timeout) {
                    Ok(Ok(stream)) => ConnectOutcome::Connected(Connection::Unix(stream)),
                    Ok(Err(_)) => ConnectOutcome::NoListener,
                    Err(_) => ConnectOutcome::TimedOut,
                }
            }
            RendezvousEndpoint::Loopback(port) => {
                let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, *port));
                match TcpStream::connect_timeout(&addr, self.timeout) {
                    Ok(stream) => ConnectOutcome::Connected(Connection::Tcp(stream)),
                    Err(error)
                        if error.kind() == ErrorKind::TimedOut
                            || error.kind() == ErrorKind::WouldBlock =>
                    {
                        ConnectOutcome::TimedOut
                    }
                    Err(_) => ConnectOutcome::NoListener,
                }
            }
        }
    }

    fn bind(&self, after_timeout: bool) -> Result<Acquisition, ArbiterError> {
        let listener = match &self.endpoint {
            #[cfg(unix)]
            RendezvousEndpoint::Socket(path) => {
                match std::fs::remove_file(path) {
                    Ok(()) => logging::info(&format!("removed stale rendezvous {}", path.display())),
                    Err(error) if error.kind() == ErrorKind::NotFound => {}
                    Err(error) => return Err(self.bind_error(error)),
                }
                match UnixListener::bind(path) {
                    Ok(listener) => Listener::Unix(listener),
                    Err(error) if error.kind() == ErrorKind::AddrInUse => {
                        return Ok(Acquisition::AlreadyRunning)
                    }
                    Err(error) => return Err(self.bind_error(error)),
                }
            }
            RendezvousEndpoint::Loopback(port) => {
                match TcpListener::bind((Ipv4Addr::LOCALHOST, *port)) {
                    Ok(listener) => Listener::Tcp(listener),
                    Err(error) if error.kind() == ErrorKind::AddrInUse => {
                        if after_timeout {
                            logging::warn("unresponsive instance still owns the rendezvous port");
                        }
                        return Ok(Acquisition::AlreadyRunning);
                    }
                    Err(error) => return Err(self.bind_error(error)),
                }
            }
        };
        listener
            .set_nonblocking()
            .map_err(|e| self.bind_error(e))?;

        #[cfg(unix)]
        let socket = match &self.endpoint {
            RendezvousEndpoint::Socket(path) => {
                Some(SocketFile::bound(path).map_err(|e| self.bind_error(e))?)
            }
            RendezvousEndpoint::Loopback(_) => None,
        };

        let token = ArbiterToken {
            endpoint: self.endpoint.clone(),
            listener: Some(listener),
            #[cfg(unix)]
            socket,
            timeout: self.timeout,
        };

        logging::info(&format!("rendezvous acquired at {}", self.endpoint));
        Ok(Acquisition::Acquired(token))
    }
}

enum ConnectOutcome {
    Connected(Connection),
    NoListener,
    TimedOut,
}

pub struct ArbiterToken {
    endpoint: RendezvousEndpoint,
    listener: Option<Listener>,
    #[cfg(unix)]
    socket: Option<SocketFile>,
    timeout: Duration,
}

impl ArbiterToken {
    pub fn endpoint(&self) -> &RendezvousEndpoint {
        &self.endpoint
    }

    pub fn listen<F>(mut self, on_activate: F) -> ArbiterGuard
    where
        F: Fn() + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread = self.listener.take().map(|listener| {
            let shutdown = Arc::clone(&shutdown);
            let timeout = self.timeout;
            thread::spawn(move || accept_loop(listener, shutdown, timeout, on_activate))
        });

        ArbiterGuard {
            shutdown,
            thread,
            #[cfg(unix)]
            socket: self.socket.take(),
        }
    }
}

#[cfg(unix)]
impl Drop for ArbiterToken {
    fn drop(&mut self) {
        self.listener.take();
        if let Some(socket) = self.socket.take() {
            socket.release();
        }
    }
}

pub struct ArbiterGuard {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    #[cfg(unix)]
    socket: Option<SocketFile>,
}

impl Drop for ArbiterGuard {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        #[cfg(unix)]
        {
            if let Some(socket) = self.socket.take() {
                socket.release();
            }
        }
    }
}

fn accept_loop<F>(listener: Listener, shutdown: Arc<AtomicBool>, timeout: Duration, on_activate: F)
where
    F: Fn(),
{
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok(mut connection) => {
                let message = connection
                    .set_timeouts(timeout)
                    .and_then(|_| connection.read_message())
                    .ok()
                    .and_then(|bytes| serde_json::from_slice::<ArbiterMessage>(&bytes).ok());
                match message {
                    Some(ArbiterMessage::Activate { pid }) => {
                        logging::info(&format!("activation requested by pid={pid}"));
                    }
                    None => logging::info("activation requested by anonymous connection"),
                }
                on_activate();
            }
            Err(error) if error.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(error) => {
                logging::warn(&format!("rendezvous accept failed: {error}"));
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}
