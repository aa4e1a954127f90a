//! Ripple relay core.
//!
//! Colour-change messages travel across a mesh toward their recipient;
//! every node they pass through paints itself with the colour on the way.
//! This crate holds the relay and roster logic on top of a mesh transport
//! collaborator (next-hop resolution, reliable neighbour sends, peer and
//! data notifications).
//!
//! Wire format: UTF-8 `"<recipient>:<COLOUR>"`.

pub mod codec;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod roster;
pub mod router;
pub mod runtime;
pub mod transport;
pub mod types;

pub use codec::{decode, encode};
pub use config::{RippleConfig, DEFAULT_MESH_PORT};
pub use error::{
    DecodeError, LifecycleError, MalformedIdError, NoRouteError, RippleError, RosterError,
    SendError, TransportError,
};
pub use lifecycle::{Connection, ConnectionState};
pub use roster::{Departure, Roster, RosterEntry};
pub use router::{decide, FanoutReport, RelayAction, RelayDecision, RelayRouter};
pub use runtime::{AppEvent, ColourSource, RippleRuntime, RuntimeChannels, RuntimeHandle};
pub use transport::memory::{MemoryMesh, MemoryTransport};
pub use transport::{MeshEvent, MeshState, MeshTransport, PeerChange};
pub use types::{short_id, ColourState, DisplayColour, Message, PeerId};
