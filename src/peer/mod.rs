//! Protoo peer: request/response correlation over one transport.
//!
//! A [`Peer`] owns a transport and a dispatcher task. The dispatcher is the
//! only place the pending-request map is touched: registrations from
//! [`Peer::request`], responses and lifecycle events from the transport, and
//! request deadlines are all serialized through it.
//!
//! Inbound requests and notifications, as well as connection lifecycle
//! changes, reach the application as [`PeerEvent`]s on the [`PeerEvents`]
//! stream returned by [`Peer::new`].

mod dispatcher;
mod pending;

use crate::protocol::{self, IdGenerator, Notification, Request, RequestId};
use crate::{log_debug, PeerConfig, Result, RpcError, TimeoutPolicy, TransportListener, TransportPtr};
use dispatcher::{Command, Dispatcher};
use pending::PendingRequest;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Connection state of a [`Peer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Constructed, transport not yet asked to connect.
    Idle,

    /// Transport is connecting.
    Connecting,

    /// Transport is connected.
    Open,

    /// The connection could not be established. Not terminal.
    Failed,

    /// An established connection was lost. Not terminal.
    Disconnected,

    /// Terminal.
    Closed,
}

/// Something the application should react to.
#[derive(Debug)]
pub enum PeerEvent {
    /// The transport is connected.
    Open,

    /// The transport could not connect.
    Fail,

    /// The remote sent a request; answer it through the [`Responder`].
    Request(Request, Responder),

    /// The remote sent a notification.
    Notification(Notification),

    /// The connection was lost; the transport may recover.
    Disconnected,

    /// The peer is closed. Always the last event.
    Close,
}

/// Stream of [`PeerEvent`]s for one peer.
///
/// Ends (returns `None`) after [`PeerEvent::Close`].
pub struct PeerEvents {
    // ---
    rx: mpsc::UnboundedReceiver<PeerEvent>,
}

impl PeerEvents {
    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<PeerEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<PeerEvent> {
        self.rx.try_recv().ok()
    }
}

/// State shared between the peer handles, the dispatcher and responders.
pub(crate) struct Shared {
    // ---
    label: String,
    transport: TransportPtr,
    timeout: TimeoutPolicy,
    ids: IdGenerator,
    state: Mutex<PeerState>,
}

/// Acquire mutex guard, ignoring poisoning
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Shared {
    // ---

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn transport(&self) -> &TransportPtr {
        &self.transport
    }

    pub(crate) fn state(&self) -> PeerState {
        *lock_ignore_poison(&self.state)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state() == PeerState::Closed
    }

    /// Move to a non-terminal state. Returns `false` (and changes nothing)
    /// once the peer is closed.
    pub(crate) fn set_state(&self, next: PeerState) -> bool {
        // ---
        let mut state = lock_ignore_poison(&self.state);
        if *state == PeerState::Closed {
            return false;
        }
        *state = next;
        true
    }

    /// Enter the terminal state. Returns `true` only for the call that
    /// actually closed the peer.
    pub(crate) fn mark_closed(&self) -> bool {
        // ---
        let mut state = lock_ignore_poison(&self.state);
        if *state == PeerState::Closed {
            return false;
        }
        *state = PeerState::Closed;
        true
    }

    /// Send an encoded message, refusing once the peer is closed.
    fn send(&self, encoded: &str) -> Result<usize> {
        // ---
        if self.is_closed() {
            return Err(RpcError::PeerClosed);
        }
        self.transport.send(encoded)
    }
}

/// One-shot capability to answer an inbound request.
///
/// Exactly one of [`accept`](Self::accept) or [`reject`](Self::reject) can
/// be called, since both consume the responder. Dropping it without
/// answering leaves the remote to time out.
pub struct Responder {
    // ---
    shared: Arc<Shared>,
    id: RequestId,
    method: String,
}

impl Responder {
    // ---

    pub(crate) fn new(shared: Arc<Shared>, id: RequestId, method: impl Into<String>) -> Self {
        Self {
            shared,
            id,
            method: method.into(),
        }
    }

    /// Id of the request being answered.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Method of the request being answered.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Send a success response. `Value::Null` is sent as an empty object.
    pub fn accept(self, data: Value) -> Result<()> {
        // ---
        let encoded = protocol::encode_success(self.id, Some(data))?;
        self.shared.send(&encoded)?;
        log_debug!(
            "{}: accepted request [method:{}, id:{}]",
            self.shared.label(),
            self.method,
            self.id
        );
        Ok(())
    }

    /// Send an error response.
    pub fn reject(self, code: i64, reason: impl AsRef<str>) -> Result<()> {
        // ---
        let encoded = protocol::encode_error(self.id, code, reason.as_ref())?;
        self.shared.send(&encoded)?;
        log_debug!(
            "{}: rejected request [method:{}, id:{}, code:{code}]",
            self.shared.label(),
            self.method,
            self.id
        );
        Ok(())
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("id", &self.id)
            .field("method", &self.method)
            .finish()
    }
}

/// Completion of one outbound request.
///
/// Resolves to the response data, [`RpcError::Remote`] for an error
/// response, [`RpcError::Timeout`] when the deadline passes first, or
/// [`RpcError::PeerClosed`] when the peer closes first.
///
/// The request is already on its way when this future is created; dropping
/// it does not cancel the request, it only discards the outcome.
#[derive(Debug)]
pub struct ResponseFuture {
    // ---
    id: RequestId,
    rx: oneshot::Receiver<Result<Value>>,
}

impl ResponseFuture {
    /// Id the request was sent with.
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl Future for ResponseFuture {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // ---
        // A dropped handler means the dispatcher went away with the request.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(RpcError::PeerClosed)))
    }
}

/// A protoo peer bound to one transport.
///
/// Cloning is cheap; all clones drive the same connection. When the last
/// clone is dropped the peer closes itself.
///
/// # Example
///
/// ```no_run
/// use protoo_peer::{create_memory_transport, Peer, PeerConfig, PeerEvent};
/// use serde_json::json;
///
/// # async fn example() -> protoo_peer::Result<()> {
/// let (transport, _remote) = create_memory_transport();
/// let (peer, mut events) = Peer::new(transport, PeerConfig::new("alice"));
///
/// let pending = peer.request("join", json!({"room": "lobby"}))?;
///
/// while let Some(event) = events.recv().await {
///     match event {
///         PeerEvent::Request(request, responder) => {
///             responder.accept(json!({"echo": request.method}))?;
///         }
///         PeerEvent::Close => break,
///         _ => {}
///     }
/// }
///
/// let _ = pending.await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Peer {
    // ---
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Peer {
    // ---

    /// Create a peer over `transport` and start connecting.
    ///
    /// Spawns the dispatcher task, so this must be called from within a
    /// tokio runtime.
    pub fn new(transport: TransportPtr, config: PeerConfig) -> (Self, PeerEvents) {
        // ---
        let shared = Arc::new(Shared {
            label: config.label,
            transport,
            timeout: config.timeout,
            ids: IdGenerator::new(),
            state: Mutex::new(PeerState::Idle),
        });

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (listener, transport_rx) = TransportListener::channel();

        let dispatcher = Dispatcher::new(
            shared.clone(),
            commands_rx,
            listener,
            transport_rx,
            events_tx,
        );
        tokio::spawn(dispatcher.run());

        let peer = Self {
            shared,
            commands: commands_tx,
        };
        (peer, PeerEvents { rx: events_rx })
    }

    /// Label this peer logs under.
    pub fn label(&self) -> &str {
        self.shared.label()
    }

    pub fn state(&self) -> PeerState {
        self.shared.state()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state() == PeerState::Open
    }

    /// Send a request.
    ///
    /// Returns as soon as the request is handed to the transport; the outcome
    /// arrives through the returned [`ResponseFuture`]. The request's
    /// deadline grows with its encoded size, see [`TimeoutPolicy`].
    ///
    /// `Value::Null` is sent as an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::PeerClosed`] if the peer is closed, or the
    /// transport's error if it refused the message.
    pub fn request(&self, method: &str, data: Value) -> Result<ResponseFuture> {
        // ---
        if self.shared.is_closed() {
            return Err(RpcError::PeerClosed);
        }

        let (encoded, id) = protocol::encode_request(&self.shared.ids, method, Some(data))?;
        let timeout = self.shared.timeout.timeout_for(encoded.len());

        // Register before sending so the response can never overtake the entry.
        let (tx, rx) = oneshot::channel();
        let entry = PendingRequest::new(id, method, Instant::now() + timeout, tx);
        self.commands
            .send(Command::Register(entry))
            .map_err(|_| RpcError::PeerClosed)?;

        log_debug!(
            "{}: request() [method:{method}, id:{id}, timeout:{timeout:?}]",
            self.shared.label()
        );

        if let Err(err) = self.shared.send(&encoded) {
            let _ = self.commands.send(Command::Forget(id));
            return Err(err);
        }

        Ok(ResponseFuture { id, rx })
    }

    /// Send a request with a typed payload and decode the typed response.
    ///
    /// # Errors
    ///
    /// Everything [`request`](Self::request) and its [`ResponseFuture`] can
    /// return, plus [`RpcError::Serialization`] if either payload does not
    /// (de)serialize.
    pub async fn request_as<Req, Resp>(&self, method: &str, req: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        // ---
        let data = serde_json::to_value(req)?;
        let response = self.request(method, data)?.await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Send a notification. No response is expected or possible.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::PeerClosed`] if the peer is closed, or the
    /// transport's error if it refused the message.
    pub fn notify(&self, method: &str, data: Value) -> Result<()> {
        // ---
        if self.shared.is_closed() {
            return Err(RpcError::PeerClosed);
        }
        let encoded = protocol::encode_notification(method, Some(data))?;
        log_debug!("{}: notify() [method:{method}]", self.shared.label());
        self.shared.send(&encoded)?;
        Ok(())
    }

    /// Send a notification with a typed payload.
    pub fn notify_as<T: Serialize>(&self, method: &str, data: &T) -> Result<()> {
        self.notify(method, serde_json::to_value(data)?)
    }

    /// Number of requests still waiting for a response.
    ///
    /// Zero once the peer is closed.
    pub async fn pending_count(&self) -> usize {
        // ---
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::PendingCount(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Close the peer.
    ///
    /// The first call closes the transport, fails every outstanding request
    /// with [`RpcError::PeerClosed`], cancels their deadlines and emits
    /// [`PeerEvent::Close`]; it returns once all of that has happened.
    /// Later calls do nothing.
    pub async fn close(&self) {
        // ---
        if !self.shared.mark_closed() {
            return;
        }

        log_debug!("{}: close()", self.shared.label());

        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Close(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("label", &self.shared.label)
            .field("state", &self.shared.state())
            .finish()
    }
}
