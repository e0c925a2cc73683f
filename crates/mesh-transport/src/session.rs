//! Per-connection state shared between the reader task and the registry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use mesh_core::envelope::MessageId;
use mesh_core::identity::NodeId;
use tokio::io::WriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    AwaitingInit,
    AwaitingResponse,
    AwaitingConfirm,
    Authenticated,
}

/// State for one peer connection, shared between the socket reader task and
/// anyone sending through [`crate::connection::ConnectionRegistry`]. The
/// write half lives behind a mutex so both the handshake driver and later
/// outbound sends can use the same handle.
pub struct Session {
    pub write_half: Mutex<WriteHalf<TcpStream>>,
    pub phase: Mutex<SessionPhase>,
    pub remote_peer_id: Mutex<Option<NodeId>>,
    pub remote_public_key: Mutex<Option<Vec<u8>>>,
    pub pending_challenges: Mutex<HashMap<MessageId, [u8; 32]>>,
    pub last_activity: Mutex<DateTime<Utc>>,
}

impl Session {
    pub fn new(write_half: WriteHalf<TcpStream>) -> Self {
        Self {
            write_half: Mutex::new(write_half),
            phase: Mutex::new(SessionPhase::AwaitingInit),
            remote_peer_id: Mutex::new(None),
            remote_public_key: Mutex::new(None),
            pending_challenges: Mutex::new(HashMap::new()),
            last_activity: Mutex::new(Utc::now()),
        }
    }

    pub async fn touch(&self) {
        *self.last_activity.lock().await = Utc::now();
    }

    pub async fn is_authenticated(&self) -> bool {
        *self.phase.lock().await == SessionPhase::Authenticated
    }
}
