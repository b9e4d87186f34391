/// Chat server core — supervisor, per-connection session workers, and
/// message routing.
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use futures::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::codec::{CodecError, LineCodec};
use super::directive::{self, Directive};
use super::mailbox::Mailbox;
use super::registry::{ConnId, Registry};

/// Prompt sent immediately on connect.
pub const WELCOME: &str = "Welcome : enter your nick :";
/// Notice sent when the registry is at capacity, before closing.
pub const SERVER_FULL: &str = "Server is full!";

const DEFAULT_BIND: &str = "0.0.0.0:7878";
const DEFAULT_MAX_CLIENTS: usize = 50;

/// Server configuration, read from the environment in production.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (`ESTUARY_BIND`).
    pub bind: String,
    /// Registry capacity (`ESTUARY_MAX_CLIENTS`).
    pub max_clients: usize,
    /// Mailbox spool directory (`ESTUARY_SPOOL`).
    pub spool_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_owned(),
            max_clients: DEFAULT_MAX_CLIENTS,
            spool_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind: std::env::var("ESTUARY_BIND").unwrap_or(defaults.bind),
            max_clients: std::env::var("ESTUARY_MAX_CLIENTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_clients),
            spool_dir: std::env::var("ESTUARY_SPOOL")
                .map(PathBuf::from)
                .unwrap_or(defaults.spool_dir),
        }
    }
}

/// Startup errors. The server never partially starts: if `bind` fails
/// there is nothing to run.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to open spool directory {dir}: {source}")]
    Spool {
        dir: String,
        #[source]
        source: io::Error,
    },
}

/// State shared by every session worker: the registry behind its single
/// lock, and the mailbox store.
#[derive(Debug)]
struct Shared {
    registry: Mutex<Registry>,
    mailbox: Mailbox,
}

type SharedState = Arc<Shared>;

/// Triggers cooperative shutdown: the supervisor stops accepting and
/// every session worker exits its wait loop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// The server supervisor: owns the listener, spawns one session worker
/// per accepted connection, and coordinates shutdown.
#[derive(Debug)]
pub struct ChatServer {
    listener: TcpListener,
    addr: SocketAddr,
    state: SharedState,
    shutdown: ShutdownHandle,
}

impl ChatServer {
    /// Bind the listener and open the spool directory. Both are eager:
    /// a failure here is fatal and `serve` is never reached.
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        let mailbox = Mailbox::new(&config.spool_dir).map_err(|source| ServerError::Spool {
            dir: config.spool_dir.display().to_string(),
            source,
        })?;
        let listener =
            TcpListener::bind(&config.bind)
                .await
                .map_err(|source| ServerError::Bind {
                    addr: config.bind.clone(),
                    source,
                })?;
        let addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: config.bind.clone(),
            source,
        })?;
        let (tx, _rx) = watch::channel(false);

        Ok(Self {
            listener,
            addr,
            state: Arc::new(Shared {
                registry: Mutex::new(Registry::with_capacity(config.max_clients)),
                mailbox,
            }),
            shutdown: ShutdownHandle { tx },
        })
    }

    /// The actual bound address — useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept connections until shutdown, then wait for every session
    /// worker to finish before closing anything still registered.
    pub async fn serve(self) -> Result<(), ServerError> {
        let tracker = TaskTracker::new();
        let mut shutdown_rx = self.shutdown.tx.subscribe();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, addr)) => {
                        info!(%addr, "new connection");
                        let state = Arc::clone(&self.state);
                        let shutdown_rx = shutdown_rx.clone();
                        tracker.spawn(async move {
                            handle_client(socket, addr, state, shutdown_rx).await;
                            info!(%addr, "disconnected");
                        });
                    }
                    // Transient accept failure: same as "no new client".
                    Err(e) => warn!("accept failed: {e}"),
                },
                _ = shutdown_rx.changed() => break,
            }
        }

        info!("no longer accepting; waiting for session workers");
        tracker.close();
        tracker.wait().await;
        // Drop anything still registered so its socket closes.
        self.state.registry.lock().await.clear();
        info!("shutdown complete");
        Ok(())
    }
}

/// One session worker. Claims a registry slot (or turns the client away
/// with a full notice), runs the session state machine, and removes the
/// slot exactly once on the way out — a no-op when the router already
/// evicted this session.
async fn handle_client(
    socket: TcpStream,
    addr: SocketAddr,
    state: SharedState,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut framed = Framed::new(socket, LineCodec);
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let id = state.registry.lock().await.add(tx);
    let Some(id) = id else {
        warn!(%addr, "registry full, turning client away");
        let _ = framed.send(SERVER_FULL.to_owned()).await;
        return;
    };

    if let Err(e) = session(&mut framed, id, addr, &state, &mut shutdown, &mut rx).await {
        warn!(%addr, "session error: {e}");
    }

    state.registry.lock().await.remove(id);
}

/// The per-connection state machine: AwaitingRegistration → Active.
///
/// Every wait is a `select!` over the peer's frames, the delivery
/// channel, and the shutdown signal, so the worker exits promptly on
/// any of: read error, orderly close, eviction (delivery channel
/// closed), or shutdown.
async fn session(
    framed: &mut Framed<TcpStream, LineCodec>,
    id: ConnId,
    addr: SocketAddr,
    state: &SharedState,
    shutdown: &mut watch::Receiver<bool>,
    rx: &mut mpsc::UnboundedReceiver<String>,
) -> Result<(), CodecError> {
    framed.send(WELCOME.to_owned()).await?;

    // AwaitingRegistration: the first line is the nickname. The session
    // already occupies a slot, so broadcasts can reach it before the
    // nickname arrives.
    let nickname = loop {
        tokio::select! {
            frame = framed.next() => match frame {
                Some(Ok(line)) => break line,
                Some(Err(e)) => return Err(e),
                None => return Ok(()),
            },
            delivery = rx.recv() => match delivery {
                Some(line) => framed.send(line).await?,
                None => return Ok(()),
            },
            _ = shutdown.changed() => return Ok(()),
        }
    };

    {
        let mut registry = state.registry.lock().await;
        registry.set_nickname(id, &nickname);
        info!(%addr, %nickname, "registered");
        debug!(sessions = ?registry.snapshot(), "registry state");
    }

    replay_pending(framed, &state.mailbox, &nickname).await;

    // Active: each input line goes through the parser with this
    // session's nickname as the sender; non-directives are dropped
    // silently.
    loop {
        tokio::select! {
            frame = framed.next() => match frame {
                Some(Ok(line)) => match directive::parse(&line) {
                    Some(d) => {
                        let mut registry = state.registry.lock().await;
                        route(&mut registry, &state.mailbox, &nickname, d);
                    }
                    None => debug!(%addr, "ignoring unrecognized input"),
                },
                Some(Err(e)) => return Err(e),
                None => return Ok(()),
            },
            delivery = rx.recv() => match delivery {
                Some(line) => framed.send(line).await?,
                None => return Ok(()),
            },
            _ = shutdown.changed() => return Ok(()),
        }
    }
}

/// Stream any spooled messages to a freshly registered session, then
/// delete the mailbox. Write failures are logged and skipped — the
/// drain completes and the mailbox is still cleared.
async fn replay_pending(
    framed: &mut Framed<TcpStream, LineCodec>,
    mailbox: &Mailbox,
    nickname: &str,
) {
    let entries = match mailbox.pending(nickname) {
        Ok(Some(entries)) => entries,
        Ok(None) => return,
        Err(e) => {
            error!(nickname, "failed to read mailbox: {e}");
            return;
        }
    };

    info!(nickname, count = entries.len(), "replaying spooled messages");
    for line in entries {
        if let Err(e) = framed.send(line).await {
            warn!(nickname, "replay write failed: {e}");
        }
    }
    mailbox.clear(nickname);
}

/// Route one directive. Called with the registry lock held; delivery
/// failures are resolved by evicting the broken peer, never surfaced to
/// the sender.
fn route(registry: &mut Registry, mailbox: &Mailbox, sender: &str, directive: Directive) {
    match directive {
        Directive::Broadcast { text } => {
            let line = format!("msg from {sender}: {text}");
            let delivered = registry.fan_out(&line);
            debug!(sender, delivered, "broadcast");
        }
        Directive::Direct { recipient, text } => {
            let line = format!("msg from {sender}: {text}");
            if !registry.deliver_to(&recipient, &line) {
                // No connected session matched anywhere in the
                // registry: spool exactly one copy for later.
                if let Err(e) = mailbox.append(&recipient, &line) {
                    error!(%recipient, "failed to spool message: {e}");
                }
            }
        }
    }
}
