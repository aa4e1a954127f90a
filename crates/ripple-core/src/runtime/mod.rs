/// Ripple runtime: wires the lifecycle, roster and relay router to a
/// transport event channel.
///
/// The runtime task owns the connection and the router. The roster is
/// shared with every [`RuntimeHandle`] so reads and selection never wait
/// on the event loop. Everything else is a command on a channel.
mod r#loop;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::config::RippleConfig;
use crate::error::{DecodeError, LifecycleError, RippleError, RosterError, SendError};
use crate::lifecycle::ConnectionState;
use crate::roster::{Roster, RosterEntry};
use crate::router::FanoutReport;
use crate::transport::{MeshEvent, MeshTransport};
use crate::types::{ColourState, Message, PeerId};

// ── Commands (app → runtime) ──────────────────────────────────────────

type Reply<T> = oneshot::Sender<Result<T, RippleError>>;

pub(crate) enum RuntimeCommand {
    Connect { reply: Reply<()> },
    Resume { reply: Reply<()> },
    Stop { reply: Reply<()> },
    /// User picked a colour: repaint locally, nothing is sent.
    SetColour { colour: ColourState },
    /// Send the current colour to the selected recipient.
    SendToSelected { reply: Reply<PeerId> },
    /// Send the current colour to every roster member but self.
    SendToAll { reply: Reply<FanoutReport> },
    GetState { reply: oneshot::Sender<ConnectionState> },
    GetColour { reply: oneshot::Sender<ColourState> },
    Shutdown,
}

// ── Events (runtime → app) ───────────────────────────────────────────

/// Why the display colour changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourSource {
    /// Chosen locally.
    User,
    /// Received from the mesh, as final recipient or on the way through.
    Mesh,
}

/// Events the application observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    StateChanged(ConnectionState),
    /// The mesh assigned our identity.
    SelfRegistered { local_id: PeerId },
    ColourChanged {
        colour: ColourState,
        source: ColourSource,
    },
    /// `first` is set for the first peer other than ourselves.
    PeerJoined { peer: PeerId, first: bool },
    /// `was_selected` means the selection is now empty.
    PeerLeft { peer: PeerId, was_selected: bool },
    /// The runtime picked a default recipient.
    RecipientSelected { peer: PeerId },
    /// We passed a message on.
    Relayed { message: Message, next_hop: PeerId },
    /// We could not pass a message on. The local colour was still applied.
    RelayFailed { message: Message, error: SendError },
    /// An inbound payload was undecodable.
    Dropped { reason: DecodeError },
    /// Lifecycle failure reported by the transport.
    Error { error: LifecycleError },
}

// ── RuntimeHandle (app-facing API) ───────────────────────────────────

/// Handle to a running [`RippleRuntime`]. Cheap to clone.
#[derive(Clone)]
pub struct RuntimeHandle {
    cmd_tx: mpsc::Sender<RuntimeCommand>,
    roster: Arc<Roster>,
}

impl RuntimeHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> RuntimeCommand,
    ) -> Result<T, RippleError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RippleError::RuntimeClosed)?;
        rx.await.map_err(|_| RippleError::RuntimeClosed)?
    }

    /// Start the mesh session. Returns once the transport accepted the
    /// request; `StateChanged(Bound)` follows when the port is bound.
    pub async fn connect(&self) -> Result<(), RippleError> {
        self.request(|reply| RuntimeCommand::Connect { reply }).await
    }

    pub async fn resume(&self) -> Result<(), RippleError> {
        self.request(|reply| RuntimeCommand::Resume { reply }).await
    }

    pub async fn stop(&self) -> Result<(), RippleError> {
        self.request(|reply| RuntimeCommand::Stop { reply }).await
    }

    /// Repaint locally with a user-chosen colour.
    pub async fn set_colour(&self, colour: ColourState) -> Result<(), RippleError> {
        self.cmd_tx
            .send(RuntimeCommand::SetColour { colour })
            .await
            .map_err(|_| RippleError::RuntimeClosed)
    }

    /// Send the current colour to the selected recipient. Returns the next hop.
    pub async fn send_to_selected(&self) -> Result<PeerId, RippleError> {
        self.request(|reply| RuntimeCommand::SendToSelected { reply })
            .await
    }

    /// Send the current colour to every roster member except ourselves.
    /// The local display already shows it, so no message is looped back.
    /// Individual failures are in the report.
    pub async fn send_to_all(&self) -> Result<FanoutReport, RippleError> {
        self.request(|reply| RuntimeCommand::SendToAll { reply }).await
    }

    pub async fn state(&self) -> ConnectionState {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(RuntimeCommand::GetState { reply: tx }).await;
        rx.await.unwrap_or(ConnectionState::Disconnected)
    }

    /// Current display colour, `None` once the runtime is gone.
    pub async fn colour(&self) -> Option<ColourState> {
        let (tx, rx) = oneshot::channel();
        let _ = self
            .cmd_tx
            .send(RuntimeCommand::GetColour { reply: tx })
            .await;
        rx.await.ok()
    }

    /// Choose the recipient for [`send_to_selected`](Self::send_to_selected).
    pub fn select(&self, peer: PeerId) -> Result<(), RosterError> {
        self.roster.select(peer)
    }

    pub fn selection(&self) -> Option<PeerId> {
        self.roster.current_selection()
    }

    pub fn local_id(&self) -> Option<PeerId> {
        self.roster.self_id()
    }

    /// All roster members, self first.
    pub fn members(&self) -> Vec<PeerId> {
        self.roster.members()
    }

    /// Roster members other than self.
    pub fn peers(&self) -> Vec<PeerId> {
        self.roster.peers()
    }

    pub fn entries(&self) -> Vec<RosterEntry> {
        self.roster.entries()
    }

    /// Graceful shutdown.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(RuntimeCommand::Shutdown).await;
    }
}

// ── RuntimeChannels ──────────────────────────────────────────────────

/// Channels returned to the application when the runtime starts.
pub struct RuntimeChannels {
    pub handle: RuntimeHandle,
    pub events: mpsc::Receiver<AppEvent>,
}

// ── RippleRuntime ────────────────────────────────────────────────────

/// The runtime. Spawn it and talk to it through channels.
pub struct RippleRuntime;

impl RippleRuntime {
    /// Start the event loop as a tokio task.
    ///
    /// `mesh_events` is the transport's notification channel. Nothing is
    /// sent or received until [`RuntimeHandle::connect`] is called.
    pub fn spawn<T>(
        transport: T,
        mesh_events: mpsc::Receiver<MeshEvent>,
        config: RippleConfig,
    ) -> RuntimeChannels
    where
        T: MeshTransport + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let roster = Arc::new(Roster::new());

        tokio::spawn(r#loop::runtime_loop(
            Arc::new(transport),
            Arc::clone(&roster),
            config,
            mesh_events,
            cmd_rx,
            event_tx,
        ));

        RuntimeChannels {
            handle: RuntimeHandle { cmd_tx, roster },
            events: event_rx,
        }
    }
}
