//! Mesh transport collaborator.
//!
//! The core never does network I/O itself. Everything goes through
//! [`MeshTransport`]; notifications come back as [`MeshEvent`]s on a
//! channel owned by whoever drives the runtime.
//!
//! In production: impl by the platform mesh service.
//! In tests and the simulator: [`memory::MemoryTransport`].

pub mod memory;

use crate::error::{NoRouteError, TransportError};
use crate::types::PeerId;

/// Join/leave direction of a peer notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerChange {
    Joined,
    Left,
}

/// Session state reported by the transport after `connect()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshState {
    /// Session established, local identity assigned.
    Ready { local_id: PeerId },
    /// Session could not be established.
    Failed { reason: String },
}

/// Notifications emitted by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshEvent {
    StateChanged(MeshState),
    DataReceived {
        from: PeerId,
        port: u16,
        payload: Vec<u8>,
    },
    PeerChanged {
        peer: PeerId,
        change: PeerChange,
    },
}

/// What the core needs from the mesh.
#[async_trait::async_trait]
pub trait MeshTransport: Send + Sync {
    /// Local identity, once a session exists.
    fn local_identity(&self) -> Option<PeerId>;

    /// Adjacent peer on the path toward `target`.
    async fn resolve_next_hop(&self, target: PeerId) -> Result<PeerId, NoRouteError>;

    /// Reliable send to an immediate neighbour.
    async fn send_reliable(
        &self,
        next_hop: PeerId,
        port: u16,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    /// Start a session. Completion is reported as [`MeshEvent::StateChanged`].
    async fn connect(&self) -> Result<(), TransportError>;

    /// Listen on the application port.
    async fn bind(&self, port: u16) -> Result<(), TransportError>;

    async fn resume(&self) -> Result<(), TransportError>;

    async fn stop(&self) -> Result<(), TransportError>;
}

// ── MockTransport (tests) ───────────────────────────────────────────
