/// Relay router: one hop of store-and-forward.
///
/// `decide()` is pure: payload in, decision out. `RelayRouter` executes a
/// decision against the transport. It carries no mutable state, so inbound
/// relays and outbound sends may run concurrently on clones of it.
use std::sync::Arc;

use crate::codec;
use crate::error::{DecodeError, NoRouteError, SendError, TransportError};
use crate::transport::MeshTransport;
use crate::types::{ColourState, Message, PeerId};

// ── Decisions ──────────────────────────────────────────────────────────

/// What to do with a decoded inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayDecision {
    /// Addressed to us: apply, stop here.
    Terminal(Message),
    /// Addressed elsewhere: apply (colour trail), then pass it on.
    PassThrough(Message),
}

/// Decode `payload` and decide its fate at `local_id`.
pub fn decide(payload: &[u8], local_id: PeerId) -> Result<RelayDecision, DecodeError> {
    let message = codec::decode(payload)?;
    if message.recipient == local_id {
        Ok(RelayDecision::Terminal(message))
    } else {
        Ok(RelayDecision::PassThrough(message))
    }
}

/// Observable result of handling one inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Paint the local display.
    ApplyLocal(ColourState),
    /// Re-sent toward the recipient through `next_hop`.
    Forward { message: Message, next_hop: PeerId },
    /// No next hop toward the recipient. The local apply stands.
    ForwardFailed {
        message: Message,
        error: NoRouteError,
    },
    /// Next hop known but the transport refused the send. Not retried.
    SendFailed {
        message: Message,
        error: TransportError,
    },
    /// Undecodable payload, never forwarded.
    Drop { reason: DecodeError },
}

/// Per-peer outcome of a fan-out send.
#[derive(Debug, Default)]
pub struct FanoutReport {
    pub outcomes: Vec<(PeerId, Result<PeerId, SendError>)>,
}

impl FanoutReport {
    /// Peers the message left for.
    pub fn sent(&self) -> Vec<PeerId> {
        self.outcomes
            .iter()
            .filter(|(_, r)| r.is_ok())
            .map(|(p, _)| *p)
            .collect()
    }

    pub fn failures(&self) -> Vec<(PeerId, &SendError)> {
        self.outcomes
            .iter()
            .filter_map(|(p, r)| r.as_ref().err().map(|e| (*p, e)))
            .collect()
    }
}

/// Failure of a single hop.
enum HopError {
    NoRoute(NoRouteError),
    Transport(TransportError),
}

impl From<HopError> for SendError {
    fn from(e: HopError) -> Self {
        match e {
            HopError::NoRoute(e) => SendError::NoRoute(e),
            HopError::Transport(e) => SendError::Transport(e),
        }
    }
}

// ── Router ─────────────────────────────────────────────────────────────

pub struct RelayRouter<T> {
    transport: Arc<T>,
    local_id: PeerId,
    port: u16,
}

impl<T> Clone for RelayRouter<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            local_id: self.local_id,
            port: self.port,
        }
    }
}

impl<T: MeshTransport> RelayRouter<T> {
    pub fn new(transport: Arc<T>, local_id: PeerId, port: u16) -> Self {
        Self {
            transport,
            local_id,
            port,
        }
    }

    /// The local node's identity.
    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Handle an inbound payload.
    ///
    /// Every decodable message is applied locally. Messages for another
    /// recipient are also forwarded; a forward failure is reported after
    /// the apply and does not undo it.
    pub async fn on_data_received(&self, payload: &[u8]) -> Vec<RelayAction> {
        let decision = match decide(payload, self.local_id) {
            Ok(d) => d,
            Err(reason) => {
                tracing::warn!(len = payload.len(), "relay: dropping payload: {reason}");
                return vec![RelayAction::Drop { reason }];
            }
        };

        match decision {
            RelayDecision::Terminal(message) => {
                tracing::debug!(colour = %message.colour, "relay: terminal");
                vec![RelayAction::ApplyLocal(message.colour)]
            }
            RelayDecision::PassThrough(message) => {
                let forwarded = match self.forward(message).await {
                    Ok(next_hop) => RelayAction::Forward { message, next_hop },
                    Err(HopError::NoRoute(error)) => {
                        tracing::warn!(recipient = %message.recipient, "relay: {error}");
                        RelayAction::ForwardFailed { message, error }
                    }
                    Err(HopError::Transport(error)) => {
                        tracing::warn!(recipient = %message.recipient, "relay: {error}");
                        RelayAction::SendFailed { message, error }
                    }
                };
                vec![RelayAction::ApplyLocal(message.colour), forwarded]
            }
        }
    }

    /// Send a locally chosen colour. Returns the next hop used.
    pub async fn send_new(
        &self,
        recipient: Option<PeerId>,
        colour: ColourState,
    ) -> Result<PeerId, SendError> {
        let recipient = recipient.ok_or(SendError::NoRecipientSelected)?;
        Ok(self.forward(Message::new(recipient, colour)).await?)
    }

    /// One independent `send_new` per peer. Failures never stop the loop.
    pub async fn send_to_all(&self, peers: &[PeerId], colour: ColourState) -> FanoutReport {
        let mut report = FanoutReport::default();
        for peer in peers {
            let result = self.send_new(Some(*peer), colour).await;
            if let Err(e) = &result {
                tracing::warn!(peer = %peer, "fan-out: {e}");
            }
            report.outcomes.push((*peer, result));
        }
        report
    }

    async fn forward(&self, message: Message) -> Result<PeerId, HopError> {
        let next_hop = self
            .transport
            .resolve_next_hop(message.recipient)
            .await
            .map_err(HopError::NoRoute)?;
        let payload = codec::encode_message(&message);
        self.transport
            .send_reliable(next_hop, self.port, &payload)
            .await
            .map_err(HopError::Transport)?;
        tracing::debug!(
            recipient = %message.recipient,
            next_hop = %next_hop,
            colour = %message.colour,
            "relay: sent"
        );
        Ok(next_hop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use crate::transport::mock::MockTransport;
    use crate::types::PEER_ID_LEN;

    const PORT: u16 = 9001;

    fn peer(seed: u8) -> PeerId {
        PeerId::from_bytes([seed; PEER_ID_LEN])
    }

    fn router(me: PeerId) -> (RelayRouter<MockTransport>, MockTransport) {
        let transport = MockTransport::with_local(me);
        (RelayRouter::new(Arc::new(transport.clone()), me, PORT), transport)
    }

    // ── Pure decisions ─────────────────────────────────────────────────

    #[test]
    fn decide_terminal_and_pass_through() {
        let me = peer(1);
        let other = peer(2);
        assert_eq!(
            decide(&encode(me, ColourState::Red), me),
            Ok(RelayDecision::Terminal(Message::new(me, ColourState::Red)))
        );
        assert_eq!(
            decide(&encode(other, ColourState::Red), me),
            Ok(RelayDecision::PassThrough(Message::new(other, ColourState::Red)))
        );
    }

    // ── Inbound ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn terminal_applies_without_forward() {
        let me = peer(1);
        let (router, transport) = router(me);

        let actions = router.on_data_received(&encode(me, ColourState::Green)).await;
        assert_eq!(actions, vec![RelayAction::ApplyLocal(ColourState::Green)]);
        assert_eq!(transport.send_attempts(), 0);
    }

    #[tokio::test]
    async fn pass_through_applies_and_forwards() {
        let me = peer(1);
        let other = peer(2);
        let hop = peer(3);
        let (router, transport) = router(me);
        transport.set_hop(other, hop);

        let actions = router.on_data_received(&encode(other, ColourState::Blue)).await;
        assert_eq!(
            actions,
            vec![
                RelayAction::ApplyLocal(ColourState::Blue),
                RelayAction::Forward {
                    message: Message::new(other, ColourState::Blue),
                    next_hop: hop,
                },
            ]
        );
        assert_eq!(
            transport.sent(),
            vec![(hop, PORT, encode(other, ColourState::Blue))]
        );
    }

    #[tokio::test]
    async fn lowercase_colour_is_dropped_not_forwarded() {
        let me = peer(1);
        let other = peer(2);
        let (router, transport) = router(me);

        let actions = router
            .on_data_received(format!("{other}:green").as_bytes())
            .await;
        assert_eq!(
            actions,
            vec![RelayAction::Drop {
                reason: DecodeError::UnknownColour("green".into())
            }]
        );
        assert_eq!(transport.send_attempts(), 0);
    }

    #[tokio::test]
    async fn no_route_keeps_local_apply() {
        let me = peer(1);
        let other = peer(2);
        let (router, transport) = router(me);
        transport.set_unreachable(other);

        let actions = router.on_data_received(&encode(other, ColourState::Red)).await;
        assert_eq!(
            actions,
            vec![
                RelayAction::ApplyLocal(ColourState::Red),
                RelayAction::ForwardFailed {
                    message: Message::new(other, ColourState::Red),
                    error: NoRouteError { target: other },
                },
            ]
        );
        assert_eq!(transport.send_attempts(), 0);
    }

    #[tokio::test]
    async fn transport_failure_is_reported_not_retried() {
        let me = peer(1);
        let other = peer(2);
        let (router, transport) = router(me);
        transport.set_disconnected(true);

        let actions = router.on_data_received(&encode(other, ColourState::Red)).await;
        assert!(matches!(
            actions.as_slice(),
            [
                RelayAction::ApplyLocal(ColourState::Red),
                RelayAction::SendFailed {
                    error: TransportError::Disconnected,
                    ..
                }
            ]
        ));
        assert_eq!(transport.send_attempts(), 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped() {
        let (router, transport) = router(peer(1));

        let actions = router.on_data_received(b"garbage").await;
        assert_eq!(
            actions,
            vec![RelayAction::Drop {
                reason: DecodeError::MissingSeparator
            }]
        );

        let actions = router
            .on_data_received(format!("{}:MAUVE", peer(2)).as_bytes())
            .await;
        assert!(matches!(
            actions.as_slice(),
            [RelayAction::Drop {
                reason: DecodeError::UnknownColour(_)
            }]
        ));
        assert_eq!(transport.send_attempts(), 0);
    }

    // ── Outbound ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn send_new_without_recipient_sends_nothing() {
        let (router, transport) = router(peer(1));
        assert_eq!(
            router.send_new(None, ColourState::Red).await,
            Err(SendError::NoRecipientSelected)
        );
        assert_eq!(transport.send_attempts(), 0);
    }

    #[tokio::test]
    async fn send_new_goes_through_next_hop() {
        let (router, transport) = router(peer(1));
        transport.set_hop(peer(5), peer(4));

        assert_eq!(
            router.send_new(Some(peer(5)), ColourState::Green).await,
            Ok(peer(4))
        );
        assert_eq!(
            transport.sent(),
            vec![(peer(4), PORT, encode(peer(5), ColourState::Green))]
        );
    }

    #[tokio::test]
    async fn fan_out_survives_one_failure() {
        let (router, transport) = router(peer(1));
        let (a, b, c) = (peer(10), peer(11), peer(12));
        transport.fail_sends_to(b);

        let report = router.send_to_all(&[a, b, c], ColourState::Blue).await;

        assert_eq!(transport.send_attempts(), 3);
        assert_eq!(report.sent(), vec![a, c]);
        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, b);
        assert!(matches!(failures[0].1, SendError::Transport(TransportError::Send { .. })));
    }

    #[tokio::test]
    async fn fan_out_to_nobody_is_empty() {
        let (router, transport) = router(peer(1));
        let report = router.send_to_all(&[], ColourState::Red).await;
        assert!(report.outcomes.is_empty());
        assert_eq!(transport.send_attempts(), 0);
    }
}
