/// Connection lifecycle.
///
/// `Disconnected → Connecting → Bound → (Resumed | Stopped)`, with `Error`
/// reachable from `Connecting`, `Bound` and `Resumed`. Relay and roster traffic is
/// only accepted while `Bound` or `Resumed`.
use std::sync::Arc;

use crate::error::LifecycleError;
use crate::roster::Roster;
use crate::router::RelayRouter;
use crate::transport::{MeshState, MeshTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Bound,
    Resumed,
    Stopped,
    Error,
}

impl ConnectionState {
    /// Whether inbound data and peer events may be processed.
    pub fn accepts_traffic(self) -> bool {
        matches!(self, ConnectionState::Bound | ConnectionState::Resumed)
    }
}

pub struct Connection<T> {
    transport: Arc<T>,
    port: u16,
    state: ConnectionState,
}

impl<T: MeshTransport> Connection<T> {
    pub fn new(transport: Arc<T>, port: u16) -> Self {
        Self {
            transport,
            port,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn transition(&mut self, to: ConnectionState) {
        tracing::info!(from = ?self.state, to = ?to, "lifecycle: transition");
        self.state = to;
    }

    fn require(&self, allowed: &[ConnectionState], op: &'static str) -> Result<(), LifecycleError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                from: self.state,
                op,
            })
        }
    }

    /// Ask the transport for a session. The session outcome arrives later
    /// as a [`MeshState`] and is fed to [`Connection::on_mesh_state`].
    pub async fn connect(&mut self) -> Result<(), LifecycleError> {
        self.require(&[ConnectionState::Disconnected], "connect")?;
        self.transition(ConnectionState::Connecting);
        if let Err(e) = self.transport.connect().await {
            tracing::error!("lifecycle: connect failed: {e}");
            self.transition(ConnectionState::Error);
            return Err(e.into());
        }
        Ok(())
    }

    /// Handle the transport's session callback.
    ///
    /// On success binds the application port, registers the local identity
    /// in `roster`, and returns the router that becomes the data sink. A
    /// bind failure is fatal to the session.
    pub async fn on_mesh_state(
        &mut self,
        mesh_state: MeshState,
        roster: &Roster,
    ) -> Result<RelayRouter<T>, LifecycleError> {
        self.require(&[ConnectionState::Connecting], "bind")?;
        let local_id = match mesh_state {
            MeshState::Ready { local_id } => local_id,
            MeshState::Failed { reason } => {
                tracing::error!("lifecycle: session failed: {reason}");
                self.transition(ConnectionState::Error);
                return Err(LifecycleError::SessionFailed(reason));
            }
        };

        if let Err(e) = self.transport.bind(self.port).await {
            tracing::error!(port = self.port, "lifecycle: bind failed: {e}");
            self.transition(ConnectionState::Error);
            return Err(e.into());
        }

        self.transition(ConnectionState::Bound);
        roster.register_self(local_id);
        Ok(RelayRouter::new(Arc::clone(&self.transport), local_id, self.port))
    }

    /// The transport reported that an established session is gone.
    /// Traffic stops until a new connection is made.
    pub fn on_session_lost(&mut self, reason: &str) -> Result<(), LifecycleError> {
        self.require(&[ConnectionState::Bound, ConnectionState::Resumed], "lose session")?;
        tracing::error!("lifecycle: session lost: {reason}");
        self.transition(ConnectionState::Error);
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<(), LifecycleError> {
        self.require(&[ConnectionState::Bound, ConnectionState::Resumed], "resume")?;
        self.transport.resume().await.map_err(|e| {
            tracing::warn!("lifecycle: resume failed: {e}");
            LifecycleError::from(e)
        })?;
        self.transition(ConnectionState::Resumed);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), LifecycleError> {
        self.require(&[ConnectionState::Bound, ConnectionState::Resumed], "stop")?;
        self.transport.stop().await.map_err(|e| {
            tracing::warn!("lifecycle: stop failed: {e}");
            LifecycleError::from(e)
        })?;
        self.transition(ConnectionState::Stopped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::mock::MockTransport;
    use crate::types::{PeerId, PEER_ID_LEN};

    const PORT: u16 = 9001;

    fn me() -> PeerId {
        PeerId::from_bytes([0x01; PEER_ID_LEN])
    }

    fn connection() -> (Connection<MockTransport>, MockTransport) {
        let transport = MockTransport::new();
        (Connection::new(Arc::new(transport.clone()), PORT), transport)
    }

    async fn bound() -> (Connection<MockTransport>, MockTransport, Roster) {
        let (mut conn, transport) = connection();
        let roster = Roster::new();
        conn.connect().await.unwrap();
        conn.on_mesh_state(MeshState::Ready { local_id: me() }, &roster)
            .await
            .unwrap();
        (conn, transport, roster)
    }

    #[tokio::test]
    async fn happy_path_binds_and_registers_self() {
        let (mut conn, transport) = connection();
        let roster = Roster::new();
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        conn.connect().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(!conn.state().accepts_traffic());

        let router = conn
            .on_mesh_state(MeshState::Ready { local_id: me() }, &roster)
            .await
            .unwrap();
        assert_eq!(conn.state(), ConnectionState::Bound);
        assert!(conn.state().accepts_traffic());
        assert_eq!(router.local_id(), me());
        assert_eq!(router.port(), PORT);
        assert_eq!(roster.self_id(), Some(me()));
        assert_eq!(transport.calls(), vec!["connect", "bind"]);
    }

    #[tokio::test]
    async fn bind_failure_is_fatal() {
        let (mut conn, transport) = connection();
        let roster = Roster::new();
        transport.set_fail_bind(TransportError::PortInUse(PORT));

        conn.connect().await.unwrap();
        let err = conn
            .on_mesh_state(MeshState::Ready { local_id: me() }, &roster)
            .await
            .err();
        assert_eq!(
            err,
            Some(LifecycleError::Transport(TransportError::PortInUse(PORT)))
        );
        assert_eq!(conn.state(), ConnectionState::Error);
        assert_eq!(roster.self_id(), None);
        // Not retried.
        assert_eq!(transport.calls(), vec!["connect", "bind"]);
    }

    #[tokio::test]
    async fn connect_failure_enters_error() {
        let (mut conn, transport) = connection();
        transport.set_disconnected(true);
        assert_eq!(
            conn.connect().await,
            Err(LifecycleError::Transport(TransportError::Disconnected))
        );
        assert_eq!(conn.state(), ConnectionState::Error);
    }

    #[tokio::test]
    async fn failed_session_enters_error() {
        let (mut conn, _transport) = connection();
        let roster = Roster::new();
        conn.connect().await.unwrap();
        let err = conn
            .on_mesh_state(
                MeshState::Failed {
                    reason: "radio off".into(),
                },
                &roster,
            )
            .await
            .err();
        assert_eq!(err, Some(LifecycleError::SessionFailed("radio off".into())));
        assert_eq!(conn.state(), ConnectionState::Error);
    }

    #[tokio::test]
    async fn resume_and_stop_from_bound() {
        let (mut conn, transport, _roster) = bound().await;
        conn.resume().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Resumed);
        conn.resume().await.unwrap();
        conn.stop().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Stopped);
        assert_eq!(
            transport.calls(),
            vec!["connect", "bind", "resume", "resume", "stop"]
        );
    }

    #[tokio::test]
    async fn invalid_transitions_are_rejected() {
        let (mut conn, transport) = connection();
        let roster = Roster::new();
        assert!(matches!(
            conn.stop().await,
            Err(LifecycleError::InvalidTransition { op: "stop", .. })
        ));
        assert!(matches!(
            conn.resume().await,
            Err(LifecycleError::InvalidTransition { op: "resume", .. })
        ));
        assert!(conn
            .on_mesh_state(MeshState::Ready { local_id: me() }, &roster)
            .await
            .is_err());
        assert!(transport.calls().is_empty());

        conn.connect().await.unwrap();
        assert!(matches!(
            conn.connect().await,
            Err(LifecycleError::InvalidTransition {
                from: ConnectionState::Connecting,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn session_loss_while_bound_enters_error() {
        let (mut conn, _transport, _roster) = bound().await;
        conn.on_session_lost("service gone").unwrap();
        assert_eq!(conn.state(), ConnectionState::Error);
        assert!(!conn.state().accepts_traffic());
        assert!(matches!(
            conn.resume().await,
            Err(LifecycleError::InvalidTransition {
                from: ConnectionState::Error,
                ..
            })
        ));

        let (mut conn, _transport, _roster) = bound().await;
        conn.resume().await.unwrap();
        conn.on_session_lost("service gone").unwrap();
        assert_eq!(conn.state(), ConnectionState::Error);
    }

    #[tokio::test]
    async fn session_loss_needs_a_session() {
        let (mut conn, _transport) = connection();
        assert!(matches!(
            conn.on_session_lost("nothing to lose"),
            Err(LifecycleError::InvalidTransition {
                from: ConnectionState::Disconnected,
                ..
            })
        ));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn transport_errors_on_stop_are_reported() {
        let (mut conn, transport, _roster) = bound().await;
        transport.set_disconnected(true);
        assert_eq!(
            conn.stop().await,
            Err(LifecycleError::Transport(TransportError::Disconnected))
        );
        assert_eq!(conn.state(), ConnectionState::Bound);
    }
}
