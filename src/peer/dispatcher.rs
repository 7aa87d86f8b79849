//! Peer dispatcher task.
//!
//! Owns the pending-request map and serializes every mutation of it:
//! registrations coming from [`Peer`](super::Peer) handles, responses and
//! lifecycle events coming from the transport, and deadline expiry.

use super::pending::{PendingRequest, PendingRequests};
use super::{PeerEvent, PeerState, Responder, Shared};
use crate::protocol::{self, Message, RequestId, Response};
use crate::{log_debug, log_error, log_info, log_warn, RpcError, TransportEvent, TransportListener};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Commands sent from peer handles to the dispatcher.
pub(crate) enum Command {
    /// Track a request that is about to be sent.
    Register(PendingRequest),

    /// Drop a request the transport refused, without completing it.
    Forget(RequestId),

    /// Report the number of outstanding requests.
    PendingCount(oneshot::Sender<usize>),

    /// Run the terminal sequence and acknowledge once it is done.
    Close(oneshot::Sender<()>),
}

pub(crate) struct Dispatcher {
    // ---
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    listener: Option<TransportListener>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    events: mpsc::UnboundedSender<PeerEvent>,
    pending: PendingRequests,
    shut_down: bool,
}

impl Dispatcher {
    // ---

    pub(crate) fn new(
        shared: Arc<Shared>,
        commands: mpsc::UnboundedReceiver<Command>,
        listener: TransportListener,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        // ---
        Self {
            shared,
            commands,
            listener: Some(listener),
            transport_events,
            events,
            pending: PendingRequests::new(),
            shut_down: false,
        }
    }

    /// Connect the transport, then serve until the peer is closed.
    pub(crate) async fn run(mut self) {
        // ---
        self.start().await;

        while !self.shut_down {
            let deadline = self.pending.next_deadline();

            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        // Every peer handle is gone.
                        log_debug!("{}: all handles dropped, closing", self.shared.label());
                        self.shared.mark_closed();
                        self.shutdown().await;
                    }
                },

                event = self.transport_events.recv() => match event {
                    Some(event) => self.handle_transport_event(event).await,
                    None => {
                        log_warn!("{}: transport dropped its listener", self.shared.label());
                        self.shared.mark_closed();
                        self.shutdown().await;
                    }
                },

                _ = sleep_until(deadline) => self.expire(),
            }
        }

        self.drain_commands();
        log_debug!("{}: dispatcher stopped", self.shared.label());
    }

    async fn start(&mut self) {
        // ---
        let Some(listener) = self.listener.take() else {
            return;
        };

        if self.shared.transport().is_closed() {
            log_warn!("{}: transport already closed", self.shared.label());
            self.shared.mark_closed();
            self.shutdown().await;
            return;
        }

        if !self.shared.set_state(PeerState::Connecting) {
            // Closed before the task got to run.
            self.shutdown().await;
            return;
        }

        if let Err(err) = self.shared.transport().connect(listener).await {
            log_error!("{}: transport connect failed: {err}", self.shared.label());
            if self.shared.set_state(PeerState::Failed) {
                self.emit(PeerEvent::Fail);
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        // ---
        match command {
            Command::Register(entry) => {
                if self.shared.is_closed() {
                    entry.reject(RpcError::PeerClosed);
                    return;
                }
                if let Some(previous) = self.pending.insert(entry) {
                    log_error!(
                        "{}: request id reused [id:{}]",
                        self.shared.label(),
                        previous.id()
                    );
                    previous.reject(RpcError::PeerClosed);
                }
            }
            Command::Forget(id) => {
                // Dropping the entry drops its handler; the caller already has its error.
                self.pending.take(&id);
            }
            Command::PendingCount(reply) => {
                let _ = reply.send(self.pending.len());
            }
            Command::Close(ack) => {
                self.shutdown().await;
                let _ = ack.send(());
            }
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        // ---
        if self.shared.is_closed() {
            // A close is in flight; nothing but its own sequence may run.
            if event == TransportEvent::Close {
                self.shutdown().await;
            }
            return;
        }

        match event {
            TransportEvent::Open => {
                log_info!("{}: transport open", self.shared.label());
                if self.shared.set_state(PeerState::Open) {
                    self.emit(PeerEvent::Open);
                }
            }
            TransportEvent::Fail => {
                log_warn!("{}: transport failed to connect", self.shared.label());
                if self.shared.set_state(PeerState::Failed) {
                    self.emit(PeerEvent::Fail);
                }
            }
            TransportEvent::Disconnected => {
                log_warn!("{}: transport disconnected", self.shared.label());
                if self.shared.set_state(PeerState::Disconnected) {
                    self.emit(PeerEvent::Disconnected);
                }
            }
            TransportEvent::Close => {
                log_info!("{}: transport closed", self.shared.label());
                self.shared.mark_closed();
                self.shutdown().await;
            }
            TransportEvent::Message(raw) => self.handle_message(&raw),
        }
    }

    fn handle_message(&mut self, raw: &str) {
        // ---
        let message = match protocol::decode(raw) {
            Ok(message) => message,
            Err(err) => {
                log_warn!("{}: dropping invalid message: {err}", self.shared.label());
                return;
            }
        };

        log_debug!(
            "{}: received {} message",
            self.shared.label(),
            message.kind()
        );

        match message {
            Message::Response(response) => self.handle_response(response),
            Message::Request(request) => {
                let responder =
                    Responder::new(self.shared.clone(), request.id, request.method.clone());
                self.emit(PeerEvent::Request(request, responder));
            }
            Message::Notification(notification) => {
                self.emit(PeerEvent::Notification(notification));
            }
        }
    }

    fn handle_response(&mut self, response: Response) {
        // ---
        let Some(entry) = self.pending.take(&response.id) else {
            log_warn!(
                "{}: received response does not match any sent request [id:{}]",
                self.shared.label(),
                response.id
            );
            return;
        };

        log_debug!(
            "{}: response [method:{}, id:{}, ok:{}]",
            self.shared.label(),
            entry.method(),
            entry.id(),
            response.is_ok()
        );

        match response.into_result() {
            Ok(data) => entry.resolve(data),
            Err(err) => entry.reject(err),
        }
    }

    fn expire(&mut self) {
        // ---
        if self.shared.is_closed() {
            // The queued close rejects these with PeerClosed.
            return;
        }
        for entry in self.pending.expire(Instant::now()) {
            log_warn!(
                "{}: request timeout [method:{}, id:{}]",
                self.shared.label(),
                entry.method(),
                entry.id()
            );
            entry.time_out();
        }
    }

    /// Terminal sequence. Runs at most once.
    async fn shutdown(&mut self) {
        // ---
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let transport = self.shared.transport();
        if !transport.is_closed() {
            if let Err(err) = transport.close().await {
                log_warn!("{}: transport close failed: {err}", self.shared.label());
            }
        }

        if !self.pending.is_empty() {
            log_debug!(
                "{}: rejecting {} pending request(s)",
                self.shared.label(),
                self.pending.len()
            );
        }
        for entry in self.pending.drain() {
            entry.reject(RpcError::PeerClosed);
        }

        log_info!("{}: closed", self.shared.label());
        self.emit(PeerEvent::Close);
    }

    /// Answer whatever was queued behind the terminal sequence.
    fn drain_commands(&mut self) {
        // ---
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Register(entry) => entry.reject(RpcError::PeerClosed),
                Command::Forget(_) => {}
                Command::PendingCount(reply) => {
                    let _ = reply.send(0);
                }
                Command::Close(ack) => {
                    let _ = ack.send(());
                }
            }
        }
    }

    fn emit(&self, event: PeerEvent) {
        // ---
        // The application may have dropped its event stream.
        let _ = self.events.send(event);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    // ---
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
