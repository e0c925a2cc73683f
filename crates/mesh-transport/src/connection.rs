//! TCP session lifecycle: accepting and dialing peers, driving the
//! handshake, and handing authenticated envelopes off to the rest of the
//! node.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mesh_core::envelope::{EnvelopeBody, MessageEnvelope};
use mesh_core::error::TransportError;
use mesh_core::event::{EventLog, NetworkEvent};
use mesh_core::identity::NodeId;
use mesh_crypto::SignatureService;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::handshake::HandshakeEngine;
use crate::protocol::{frame_message, MAX_MESSAGE_SIZE};
use crate::session::{Session, SessionPhase};

const HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Tracks live authenticated sessions and forwards their traffic to the
/// rest of the node over `inbound_tx`.
pub struct ConnectionRegistry {
    local_id: NodeId,
    signature: Arc<SignatureService>,
    sessions: DashMap<NodeId, Arc<Session>>,
    inbound_tx: mpsc::Sender<(NodeId, MessageEnvelope)>,
    connected_tx: broadcast::Sender<NodeId>,
    events: Arc<Mutex<EventLog>>,
    running: AtomicBool,
    listener_handle: AsyncMutex<Option<JoinHandle<()>>>,
}

impl ConnectionRegistry {
    pub fn new(
        local_id: NodeId,
        signature: Arc<SignatureService>,
        inbound_tx: mpsc::Sender<(NodeId, MessageEnvelope)>,
        events: Arc<Mutex<EventLog>>,
    ) -> Arc<Self> {
        let (connected_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            local_id,
            signature,
            sessions: DashMap::new(),
            inbound_tx,
            connected_tx,
            events,
            running: AtomicBool::new(false),
            listener_handle: AsyncMutex::new(None),
        })
    }

    /// Subscribe to notifications of newly authenticated peers. Fired once
    /// per completed handshake, on both the initiator and acceptor side.
    pub fn subscribe_connected(&self) -> broadcast::Receiver<NodeId> {
        self.connected_tx.subscribe()
    }

    /// Bind a TCP listener and accept connections in the background. Safe
    /// to call once; subsequent calls are a no-op.
    pub async fn listen(self: &Arc<Self>, bind_addr: impl ToSocketAddrs) -> Result<SocketAddr, TransportError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(TransportError::BindFailed("already listening".into()));
        }

        let listener = TcpListener::bind(bind_addr).await.map_err(|e| TransportError::BindFailed(e.to_string()))?;
        let local_addr = listener.local_addr().map_err(|e| TransportError::BindFailed(e.to_string()))?;

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer_addr)) => {
                        debug!(%peer_addr, "accepted connection");
                        let this2 = Arc::clone(&this);
                        tokio::spawn(async move { this2.handle_incoming(stream).await });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept loop terminating");
                        break;
                    }
                }
            }
        });
        *self.listener_handle.lock().await = Some(handle);

        Ok(local_addr)
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.listener_handle.lock().await.take() {
            handle.abort();
        }
        self.sessions.clear();
    }

    async fn handle_incoming(self: Arc<Self>, stream: TcpStream) {
        let (read_half, write_half) = tokio::io::split(stream);
        let session = Arc::new(Session::new(write_half));
        self.read_loop(read_half, session, None).await;
    }

    /// Dial a peer and drive the handshake as initiator. Resolves once the
    /// peer's [`NodeId`] is confirmed, or times out.
    #[instrument(skip(self, addr))]
    pub async fn connect(self: &Arc<Self>, addr: impl ToSocketAddrs) -> Result<NodeId, TransportError> {
        let stream = TcpStream::connect(addr).await.map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let (read_half, write_half) = tokio::io::split(stream);
        let session = Arc::new(Session::new(write_half));
        *session.phase.lock().await = SessionPhase::AwaitingResponse;

        let (message_id, init, challenge) = HandshakeEngine::create_initial(&self.signature, &self.local_id);
        session.pending_challenges.lock().await.insert(message_id, challenge);

        let init_env = MessageEnvelope::new(message_id, self.local_id.clone(), EnvelopeBody::HandshakeInit(init));
        write_envelope(&session, &init_env).await?;

        let (done_tx, done_rx) = oneshot::channel();
        let this = Arc::clone(self);
        tokio::spawn(async move { this.read_loop(read_half, session, Some(done_tx)).await });

        tokio::time::timeout(std::time::Duration::from_secs(HANDSHAKE_TIMEOUT_SECS), done_rx)
            .await
            .map_err(|_| TransportError::ConnectFailed("handshake timed out".into()))?
            .map_err(|_| TransportError::ConnectFailed("handshake channel closed".into()))
    }

    async fn read_loop(
        self: Arc<Self>,
        mut read_half: ReadHalf<TcpStream>,
        session: Arc<Session>,
        mut initiator_done: Option<oneshot::Sender<NodeId>>,
    ) {
        loop {
            let envelope = match read_envelope(&mut read_half).await {
                Ok(e) => e,
                Err(_) => break,
            };
            session.touch().await;
            if self.dispatch(&envelope, &session, &mut initiator_done).await.is_err() {
                break;
            }
        }

        if let Some(peer_id) = session.remote_peer_id.lock().await.clone() {
            self.sessions.remove(&peer_id);
            self.events.lock().push(NetworkEvent::peer_disconnected(peer_id.clone()));
            debug!(peer = %peer_id, "session closed");
        }
    }

    async fn dispatch(
        &self,
        envelope: &MessageEnvelope,
        session: &Arc<Session>,
        initiator_done: &mut Option<oneshot::Sender<NodeId>>,
    ) -> Result<(), TransportError> {
        let phase = *session.phase.lock().await;

        match (&envelope.body, phase) {
            (EnvelopeBody::HandshakeInit(init), SessionPhase::AwaitingInit) => {
                let (response, challenge) =
                    HandshakeEngine::handle_init(&self.signature, &self.local_id, &envelope.sender_id, init)
                        .map_err(|_| TransportError::ReceiveFailed("handshake init rejected".into()))?;

                *session.remote_public_key.lock().await = Some(init.public_key.clone());
                session.pending_challenges.lock().await.insert(envelope.message_id, challenge);
                *session.phase.lock().await = SessionPhase::AwaitingConfirm;

                let resp_env = MessageEnvelope::new(
                    envelope.message_id,
                    self.local_id.clone(),
                    EnvelopeBody::HandshakeResponse(response),
                );
                write_envelope(session, &resp_env).await
            }
            (EnvelopeBody::HandshakeResponse(resp), SessionPhase::AwaitingResponse) => {
                let stored = session
                    .pending_challenges
                    .lock()
                    .await
                    .remove(&envelope.message_id)
                    .ok_or_else(|| TransportError::ReceiveFailed("no pending challenge for response".into()))?;

                let confirm =
                    HandshakeEngine::handle_response(&self.signature, &envelope.sender_id, stored, resp)
                        .map_err(|_| TransportError::ReceiveFailed("handshake response rejected".into()))?;

                *session.remote_public_key.lock().await = Some(resp.public_key.clone());
                *session.remote_peer_id.lock().await = Some(envelope.sender_id.clone());
                *session.phase.lock().await = SessionPhase::Authenticated;

                let confirm_env = MessageEnvelope::new(
                    envelope.message_id,
                    self.local_id.clone(),
                    EnvelopeBody::HandshakeConfirm(confirm),
                );
                write_envelope(session, &confirm_env).await?;

                self.register_session(envelope.sender_id.clone(), Arc::clone(session));
                let _ = self.connected_tx.send(envelope.sender_id.clone());
                if let Some(tx) = initiator_done.take() {
                    let _ = tx.send(envelope.sender_id.clone());
                }
                Ok(())
            }
            (EnvelopeBody::HandshakeConfirm(confirm), SessionPhase::AwaitingConfirm) => {
                let stored = session
                    .pending_challenges
                    .lock()
                    .await
                    .remove(&envelope.message_id)
                    .ok_or_else(|| TransportError::ReceiveFailed("no pending challenge for confirm".into()))?;
                let public_key = session
                    .remote_public_key
                    .lock()
                    .await
                    .clone()
                    .ok_or_else(|| TransportError::ReceiveFailed("confirm received before response".into()))?;

                if !HandshakeEngine::verify_confirm(&public_key, stored, confirm) {
                    return Err(TransportError::ReceiveFailed("handshake confirm signature invalid".into()));
                }

                *session.remote_peer_id.lock().await = Some(envelope.sender_id.clone());
                *session.phase.lock().await = SessionPhase::Authenticated;
                self.register_session(envelope.sender_id.clone(), Arc::clone(session));
                let _ = self.connected_tx.send(envelope.sender_id.clone());
                Ok(())
            }
            (_, SessionPhase::Authenticated) => self
                .inbound_tx
                .send((envelope.sender_id.clone(), envelope.clone()))
                .await
                .map_err(|_| TransportError::SendFailed("inbound channel closed".into())),
            _ => Err(TransportError::ReceiveFailed("unexpected message for session phase".into())),
        }
    }

    /// Resolve a simultaneous-dial race deterministically: whichever side
    /// has the lexicographically smaller [`NodeId`] keeps its own
    /// initiator session; the other side's session for that peer is
    /// replaced.
    fn register_session(&self, peer_id: NodeId, session: Arc<Session>) {
        match self.sessions.entry(peer_id) {
            Entry::Occupied(mut existing) => {
                if self.local_id < *existing.key() {
                    existing.insert(session);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(session);
            }
        }
    }

    pub async fn send_to(&self, peer_id: &NodeId, envelope: &MessageEnvelope) -> Result<(), TransportError> {
        let session = self.sessions
            .get(peer_id)
            .map(|e| Arc::clone(&e))
            .ok_or_else(|| TransportError::PeerNotConnected(peer_id.to_string()))?;
        write_envelope(&session, envelope).await
    }

    pub fn all_peers(&self) -> Vec<NodeId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn is_connected(&self, peer_id: &NodeId) -> bool {
        self.sessions.contains_key(peer_id)
    }
}

async fn write_envelope(session: &Session, envelope: &MessageEnvelope) -> Result<(), TransportError> {
    let framed = frame_message(envelope).map_err(|e| TransportError::SendFailed(e.to_string()))?;
    let mut writer = session.write_half.lock().await;
    writer.write_all(&framed).await.map_err(|e| TransportError::SendFailed(e.to_string()))
}

async fn read_envelope(reader: &mut ReadHalf<TcpStream>) -> Result<MessageEnvelope, TransportError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(TransportError::ReceiveFailed("declared frame length exceeds maximum".into()));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
    postcard::from_bytes(&body).map_err(|e| TransportError::ReceiveFailed(e.to_string()))
}
