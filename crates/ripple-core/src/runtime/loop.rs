/// The runtime event loop.
///
/// A single async task that owns the connection, the router and the
/// display colour, and multiplexes over transport events and application
/// commands.
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::RippleConfig;
use crate::error::{LifecycleError, RippleError, SendError};
use crate::lifecycle::{Connection, ConnectionState};
use crate::roster::{Departure, Roster};
use crate::router::{FanoutReport, RelayAction, RelayRouter};
use crate::transport::{MeshEvent, MeshState, MeshTransport, PeerChange};
use crate::types::{ColourState, PeerId};

use super::{AppEvent, ColourSource, RuntimeCommand};

/// Mutable state owned by the loop.
struct LoopState<T> {
    connection: Connection<T>,
    router: Option<RelayRouter<T>>,
    roster: Arc<Roster>,
    colour: ColourState,
    config: RippleConfig,
    event_tx: mpsc::Sender<AppEvent>,
}

impl<T: MeshTransport> LoopState<T> {
    fn emit(&self, event: AppEvent) {
        // try_send: never block the loop on a slow consumer
        if let Err(e) = self.event_tx.try_send(event) {
            tracing::debug!("runtime: app event dropped: {e}");
        }
    }

    fn emit_state(&self) {
        self.emit(AppEvent::StateChanged(self.connection.state()));
    }

    fn paint(&mut self, colour: ColourState, source: ColourSource) {
        self.colour = colour;
        self.emit(AppEvent::ColourChanged { colour, source });
    }

    /// The router, if traffic is currently allowed.
    fn active_router(&self) -> Option<&RelayRouter<T>> {
        if self.connection.state().accepts_traffic() {
            self.router.as_ref()
        } else {
            None
        }
    }

    fn not_bound(&self, op: &'static str) -> RippleError {
        LifecycleError::InvalidTransition {
            from: self.connection.state(),
            op,
        }
        .into()
    }

    // ── Transport events ───────────────────────────────────────────

    async fn handle_mesh_event(&mut self, event: MeshEvent) {
        match event {
            MeshEvent::StateChanged(mesh_state) => match (self.connection.state(), mesh_state) {
                (ConnectionState::Connecting, mesh_state) => {
                    match self.connection.on_mesh_state(mesh_state, &self.roster).await {
                        Ok(router) => {
                            let local_id = router.local_id();
                            self.router = Some(router);
                            self.emit_state();
                            self.emit(AppEvent::SelfRegistered { local_id });
                        }
                        Err(error) => {
                            self.emit_state();
                            self.emit(AppEvent::Error { error });
                        }
                    }
                }
                (_, MeshState::Failed { reason }) => {
                    if self.connection.on_session_lost(&reason).is_ok() {
                        self.router = None;
                        self.emit_state();
                        self.emit(AppEvent::Error {
                            error: LifecycleError::SessionFailed(reason),
                        });
                    } else {
                        tracing::debug!(%reason, "runtime: session failure without a session");
                    }
                }
                (_, mesh_state) => {
                    tracing::debug!(?mesh_state, "runtime: ignoring unsolicited mesh state");
                }
            },

            MeshEvent::DataReceived {
                from,
                port,
                payload,
            } => {
                let Some(router) = self.active_router() else {
                    tracing::debug!(%from, "runtime: data before bind, ignored");
                    return;
                };
                if port != router.port() {
                    tracing::debug!(%from, port, "runtime: data on foreign port, ignored");
                    return;
                }
                let actions = router.on_data_received(&payload).await;
                for action in actions {
                    self.apply(action);
                }
            }

            MeshEvent::PeerChanged { peer, change } => {
                if self.active_router().is_none() {
                    tracing::debug!(%peer, ?change, "runtime: peer event before bind, ignored");
                    return;
                }
                match change {
                    PeerChange::Joined => self.peer_joined(peer),
                    PeerChange::Left => self.peer_left(peer),
                }
            }
        }
    }

    fn apply(&mut self, action: RelayAction) {
        match action {
            RelayAction::ApplyLocal(colour) => self.paint(colour, ColourSource::Mesh),
            RelayAction::Forward { message, next_hop } => {
                self.emit(AppEvent::Relayed { message, next_hop });
            }
            RelayAction::ForwardFailed { message, error } => {
                self.emit(AppEvent::RelayFailed {
                    message,
                    error: SendError::NoRoute(error),
                });
            }
            RelayAction::SendFailed { message, error } => {
                self.emit(AppEvent::RelayFailed {
                    message,
                    error: SendError::Transport(error),
                });
            }
            RelayAction::Drop { reason } => self.emit(AppEvent::Dropped { reason }),
        }
    }

    fn peer_joined(&mut self, peer: PeerId) {
        if self.roster.contains(&peer) {
            return;
        }
        let first = self.roster.on_peer_joined(peer);
        self.emit(AppEvent::PeerJoined { peer, first });
        if first && self.config.auto_select_first_peer && self.roster.select(peer).is_ok() {
            self.emit(AppEvent::RecipientSelected { peer });
        }
    }

    fn peer_left(&mut self, peer: PeerId) {
        match self.roster.on_peer_left(peer) {
            Departure::Absent => {}
            Departure::Removed => self.emit(AppEvent::PeerLeft {
                peer,
                was_selected: false,
            }),
            Departure::RemovedSelected => {
                tracing::info!(%peer, "runtime: recipient disconnected");
                self.emit(AppEvent::PeerLeft {
                    peer,
                    was_selected: true,
                });
            }
        }
    }

    // ── Application commands ───────────────────────────────────────

    async fn handle_command(&mut self, cmd: RuntimeCommand) {
        match cmd {
            RuntimeCommand::Connect { reply } => {
                let result = self.connection.connect().await;
                self.emit_state();
                let _ = reply.send(result.map_err(Into::into));
            }
            RuntimeCommand::Resume { reply } => {
                let result = self.connection.resume().await;
                if result.is_ok() {
                    self.emit_state();
                }
                let _ = reply.send(result.map_err(Into::into));
            }
            RuntimeCommand::Stop { reply } => {
                let result = self.connection.stop().await;
                if result.is_ok() {
                    self.emit_state();
                }
                let _ = reply.send(result.map_err(Into::into));
            }
            RuntimeCommand::SetColour { colour } => self.paint(colour, ColourSource::User),
            RuntimeCommand::SendToSelected { reply } => {
                let result = self.send_to_selected().await;
                let _ = reply.send(result);
            }
            RuntimeCommand::SendToAll { reply } => {
                let result = self.send_to_all().await;
                let _ = reply.send(result);
            }
            RuntimeCommand::GetState { reply } => {
                let _ = reply.send(self.connection.state());
            }
            RuntimeCommand::GetColour { reply } => {
                let _ = reply.send(self.colour);
            }
            RuntimeCommand::Shutdown => {}
        }
    }

    async fn send_to_selected(&self) -> Result<PeerId, RippleError> {
        let router = self
            .active_router()
            .ok_or_else(|| self.not_bound("send"))?;
        let recipient = self.roster.current_selection();
        Ok(router.send_new(recipient, self.colour).await?)
    }

    async fn send_to_all(&self) -> Result<FanoutReport, RippleError> {
        let router = self
            .active_router()
            .ok_or_else(|| self.not_bound("send"))?;
        let peers = self.roster.peers();
        Ok(router.send_to_all(&peers, self.colour).await)
    }
}

/// Main event loop. Owns all relay state.
pub(super) async fn runtime_loop<T: MeshTransport>(
    transport: Arc<T>,
    roster: Arc<Roster>,
    config: RippleConfig,
    mut mesh_rx: mpsc::Receiver<MeshEvent>,
    mut cmd_rx: mpsc::Receiver<RuntimeCommand>,
    event_tx: mpsc::Sender<AppEvent>,
) {
    let mut state = LoopState {
        connection: Connection::new(transport, config.mesh_port),
        router: None,
        roster,
        colour: config.initial_colour,
        config,
        event_tx,
    };
    let mut mesh_open = true;

    loop {
        tokio::select! {
            event = mesh_rx.recv(), if mesh_open => match event {
                Some(event) => state.handle_mesh_event(event).await,
                None => {
                    tracing::info!("runtime: mesh event channel closed");
                    mesh_open = false;
                }
            },
            cmd = cmd_rx.recv() => match cmd {
                Some(RuntimeCommand::Shutdown) | None => break,
                Some(cmd) => state.handle_command(cmd).await,
            },
        }
    }

    tracing::info!("runtime: shut down");
}
