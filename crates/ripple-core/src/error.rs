use crate::lifecycle::ConnectionState;
use crate::types::PeerId;

/// A string that is not a valid [`PeerId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed peer id: {input:?}")]
pub struct MalformedIdError {
    pub input: String,
}

impl MalformedIdError {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// Why an inbound payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("payload has no ':' separator")]
    MissingSeparator,

    #[error("invalid recipient: {0}")]
    InvalidPeerId(#[from] MalformedIdError),

    #[error("unknown colour: {0:?}")]
    UnknownColour(String),
}

/// Rejected roster operation. The roster is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    #[error("{0} is not a roster member")]
    NotAMember(PeerId),
}

/// The transport has no next hop toward `target`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no route to {target}")]
pub struct NoRouteError {
    pub target: PeerId,
}

/// Errors raised by the mesh transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("mesh service disconnected")]
    Disconnected,

    #[error("port {0} already bound")]
    PortInUse(u16),

    #[error("{peer} has no listener on port {port}")]
    PortNotBound { peer: PeerId, port: u16 },

    #[error("{peer} is not an adjacent neighbour")]
    NotNeighbour { peer: PeerId },

    #[error("send to {peer} failed: {reason}")]
    Send { peer: PeerId, reason: String },
}

/// Failure of a locally originated or relayed send.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("no recipient selected")]
    NoRecipientSelected,

    #[error(transparent)]
    NoRoute(#[from] NoRouteError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Connection lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot {op} while {from:?}")]
    InvalidTransition {
        from: ConnectionState,
        op: &'static str,
    },

    #[error("mesh session failed: {0}")]
    SessionFailed(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Umbrella error for the application-facing runtime API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RippleError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("runtime shut down")]
    RuntimeClosed,
}
