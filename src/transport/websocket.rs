//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! ## Concurrency model
//!
//! - A single background **actor task** owns the WebSocket stream.
//! - The actor is responsible for:
//!   - opening the connection with the protoo subprotocol,
//!   - writing outbound text frames,
//!   - reading inbound frames and reporting them to the listener,
//!   - reconnecting with backoff after a failure or a lost connection,
//!   - clean shutdown of the connection.
//! - `send()` only queues a command for the actor, so it never waits on the
//!   network.
//!
//! ## Connection behavior
//!
//! Every connection attempt that fails is reported as `Fail`, whether it is
//! the first one or a retry. Losing an established connection is reported as
//! `Disconnected`. In both cases the actor retries following the configured
//! [`ReconnectPolicy`] and reports `Open` again on success. When attempts
//! are exhausted, or the server closes the connection, the transport is
//! closed for good and reports `Close`.
//!
//! Frames queued while no connection is up are dropped; requests they carried
//! time out at the peer.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{
    //
    log_debug,
    log_error,
    log_info,
    log_warn,
    Backoff,
    ReconnectPolicy,
    Result,
    RpcError,
    Transport,
    TransportListener,
    TransportPtr,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

//
// Actor commands
//

enum Cmd {
    //
    Send(String),
    Close { resp: oneshot::Sender<()> },
}

/// How a connection attempt ended.
enum Attempt {
    //
    Connected(Box<WsStream>),
    Failed(RpcError),
    Closed,
}

/// How an established connection ended.
enum Served {
    //
    Lost(String),
    RemoteClosed,
    Closed,
}

/// Connection settings for the actor.
#[derive(Debug, Clone)]
pub(crate) struct WebSocketConfig {
    pub url: String,
    pub subprotocol: String,
    pub reconnect: Option<ReconnectPolicy>,
}

/// WebSocket-based implementation of the `Transport` trait.
struct WebSocketTransport {
    // ---
    config: WebSocketConfig,
    cmd_tx: Mutex<Option<mpsc::UnboundedSender<Cmd>>>,
    closed: Arc<AtomicBool>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    // ---

    /// Spawn the actor. The outcome is reported through `listener`.
    async fn connect(&self, listener: TransportListener) -> Result<()> {
        // ---
        if self.closed.load(Ordering::SeqCst) {
            return Err(RpcError::TransportClosed);
        }

        let mut slot = lock(&self.cmd_tx);
        if slot.is_some() {
            return Err(RpcError::Transport("already connected".into()));
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        *slot = Some(cmd_tx);

        let actor = WsActor {
            backoff: Backoff::new(self.config.reconnect.clone()),
            config: self.config.clone(),
            listener,
            cmd_rx,
            closed: self.closed.clone(),
        };
        tokio::spawn(actor.run());
        Ok(())
    }

    fn send(&self, message: &str) -> Result<usize> {
        // ---
        if self.closed.load(Ordering::SeqCst) {
            return Err(RpcError::TransportClosed);
        }

        let slot = lock(&self.cmd_tx);
        let cmd_tx = slot
            .as_ref()
            .ok_or_else(|| RpcError::Transport("not connected".into()))?;
        cmd_tx
            .send(Cmd::Send(message.to_owned()))
            .map_err(|_| RpcError::TransportClosed)?;

        Ok(message.len())
    }

    async fn close(&self) -> Result<()> {
        // ---
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        log_debug!("{}: closing websocket transport", self.config.url);

        let cmd_tx = lock(&self.cmd_tx).take();
        if let Some(cmd_tx) = cmd_tx {
            let (resp, done) = oneshot::channel();
            if cmd_tx.send(Cmd::Close { resp }).is_ok() {
                let _ = done.await;
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct WsActor {
    // ---
    config: WebSocketConfig,
    backoff: Backoff,
    listener: TransportListener,
    cmd_rx: mpsc::UnboundedReceiver<Cmd>,
    closed: Arc<AtomicBool>,
}

impl WsActor {
    // ---

    async fn run(mut self) {
        // ---
        loop {
            match self.attempt().await {
                Attempt::Closed => return,
                Attempt::Failed(err) => {
                    log_warn!("{}: connection attempt failed: {err}", self.config.url);
                    self.listener.on_fail();
                }
                Attempt::Connected(ws) => {
                    log_info!("{}: websocket open", self.config.url);
                    self.backoff.reset();
                    self.listener.on_open();

                    match self.serve(*ws).await {
                        Served::Closed => return,
                        Served::RemoteClosed => {
                            log_info!("{}: closed by remote", self.config.url);
                            self.finish(None);
                            return;
                        }
                        Served::Lost(reason) => {
                            log_warn!("{}: connection lost: {reason}", self.config.url);
                            self.listener.on_disconnected();
                        }
                    }
                }
            }

            let Some(delay) = self.backoff.next_delay() else {
                log_error!(
                    "{}: giving up after {} reconnection attempt(s)",
                    self.config.url,
                    self.backoff.attempt()
                );
                self.finish(None);
                return;
            };

            log_debug!(
                "{}: reconnecting in {delay:?} (attempt {})",
                self.config.url,
                self.backoff.attempt()
            );
            if !self.pause(delay).await {
                return;
            }
        }
    }

    /// Try to open the socket while still answering commands.
    async fn attempt(&mut self) -> Attempt {
        // ---
        let connecting = open_socket(self.config.clone());
        tokio::pin!(connecting);

        loop {
            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Cmd::Send(_)) => {
                        log_warn!("{}: not connected, dropping frame", self.config.url);
                    }
                    Some(Cmd::Close { resp }) => {
                        self.finish(Some(resp));
                        return Attempt::Closed;
                    }
                    None => {
                        self.finish(None);
                        return Attempt::Closed;
                    }
                },

                result = &mut connecting => {
                    return match result {
                        Ok(ws) => Attempt::Connected(Box::new(ws)),
                        Err(err) => Attempt::Failed(err),
                    };
                }
            }
        }
    }

    /// Wait out a backoff delay. Returns `false` if closed meanwhile.
    async fn pause(&mut self, delay: Duration) -> bool {
        // ---
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Cmd::Send(_)) => {
                        log_warn!("{}: not connected, dropping frame", self.config.url);
                    }
                    Some(Cmd::Close { resp }) => {
                        self.finish(Some(resp));
                        return false;
                    }
                    None => {
                        self.finish(None);
                        return false;
                    }
                },

                _ = &mut sleep => return true,
            }
        }
    }

    /// Pump frames in both directions until the connection ends.
    async fn serve(&mut self, ws: WsStream) -> Served {
        // ---
        let (mut sink, mut stream) = ws.split();

        loop {
            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Cmd::Send(text)) => {
                        if let Err(err) = sink.send(WsMessage::text(text)).await {
                            return Served::Lost(err.to_string());
                        }
                    }
                    Some(Cmd::Close { resp }) => {
                        let _ = sink.close().await;
                        self.finish(Some(resp));
                        return Served::Closed;
                    }
                    None => {
                        let _ = sink.close().await;
                        self.finish(None);
                        return Served::Closed;
                    }
                },

                frame = stream.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        self.listener.on_message(text.as_str());
                    }
                    Some(Ok(WsMessage::Binary(_))) => {
                        log_debug!("{}: ignoring binary frame", self.config.url);
                    }
                    Some(Ok(WsMessage::Close(_))) => return Served::RemoteClosed,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Served::Lost(err.to_string()),
                    None => return Served::Lost("stream ended".into()),
                },
            }
        }
    }

    /// Enter the terminal state and report the single `Close`.
    fn finish(&mut self, resp: Option<oneshot::Sender<()>>) {
        // ---
        self.closed.store(true, Ordering::SeqCst);
        self.cmd_rx.close();
        self.listener.on_close();
        if let Some(resp) = resp {
            let _ = resp.send(());
        }
    }
}

async fn open_socket(config: WebSocketConfig) -> Result<WsStream> {
    // ---
    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| RpcError::Transport(e.to_string()))?;

    let protocol = HeaderValue::from_str(&config.subprotocol)
        .map_err(|e| RpcError::InvalidConfig(e.to_string()))?;
    request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);

    let (ws, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| RpcError::Transport(e.to_string()))?;
    Ok(ws)
}

/// Create a WebSocket transport. Nothing is opened until `connect()`.
pub(crate) fn create_transport(config: WebSocketConfig) -> TransportPtr {
    // ---
    log_debug!("{}: create websocket transport", config.url);

    Arc::new(WebSocketTransport {
        config,
        cmd_tx: Mutex::new(None),
        closed: Arc::new(AtomicBool::new(false)),
    })
}
