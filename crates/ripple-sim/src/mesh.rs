use std::time::{Duration, Instant};

use ripple_core::{
    short_id, AppEvent, ColourSource, ColourState, ConnectionState, MemoryMesh, PeerId,
    RippleConfig, RippleRuntime, RuntimeHandle,
};
use tokio::sync::mpsc;

use crate::events::{emit, EventHop, EventNode};

pub struct SimSettings {
    pub config: RippleConfig,
    pub timeout: Duration,
    pub json: bool,
}

/// A runtime on the in-memory mesh plus its event stream.
pub struct SimNode {
    pub index: usize,
    pub id: PeerId,
    pub handle: RuntimeHandle,
    pub events: mpsc::Receiver<AppEvent>,
}

impl SimNode {
    pub fn label(&self) -> String {
        format!("#{} {}", self.index, short_id(&self.id))
    }

    /// Pull events until one matches.
    pub async fn wait_for(
        &mut self,
        timeout: Duration,
        pred: impl Fn(&AppEvent) -> bool,
    ) -> anyhow::Result<AppEvent> {
        let label = self.label();
        let events = &mut self.events;
        tokio::time::timeout(timeout, async {
            while let Some(event) = events.recv().await {
                if pred(&event) {
                    return Ok(event);
                }
            }
            Err(anyhow::anyhow!("node {label}: runtime stopped"))
        })
        .await
        .map_err(|_| anyhow::anyhow!("node {label}: timed out"))?
    }

    /// Wait until `count` peers other than self are in the roster.
    pub async fn wait_for_peers(&mut self, count: usize, timeout: Duration) -> anyhow::Result<()> {
        let deadline = Instant::now() + timeout;
        while self.handle.peers().len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            self.wait_for(remaining, |e| matches!(e, AppEvent::PeerJoined { .. }))
                .await
                .map_err(|e| anyhow::anyhow!("{e} waiting for {count} peers"))?;
        }
        Ok(())
    }

    /// Wait for the mesh to repaint this node, then for the relay outcome
    /// if the node was only on the way.
    pub async fn record_hop(
        &mut self,
        colour: ColourState,
        relay: bool,
        settings: &SimSettings,
        start: Instant,
    ) -> anyhow::Result<Hop> {
        self.wait_for(settings.timeout, |e| {
            *e == AppEvent::ColourChanged {
                colour,
                source: ColourSource::Mesh,
            }
        })
        .await?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut outcome = HopOutcome::Delivered;
        if relay {
            match self
                .wait_for(settings.timeout, |e| {
                    matches!(e, AppEvent::Relayed { .. } | AppEvent::RelayFailed { .. })
                })
                .await?
            {
                AppEvent::Relayed { next_hop, .. } => outcome = HopOutcome::Relayed(next_hop),
                AppEvent::RelayFailed { error, .. } => {
                    outcome = HopOutcome::Failed(error.to_string())
                }
                _ => {}
            }
        }

        Ok(Hop {
            index: self.index,
            id: self.id,
            colour,
            outcome,
            elapsed_ms,
        })
    }
}

pub enum HopOutcome {
    Delivered,
    Relayed(PeerId),
    Failed(String),
}

/// One node repainted by the mesh.
pub struct Hop {
    pub index: usize,
    pub id: PeerId,
    pub colour: ColourState,
    pub outcome: HopOutcome,
    pub elapsed_ms: f64,
}

impl Hop {
    pub fn print(&self, json: bool) {
        if json {
            emit(&EventHop::from(self));
            return;
        }
        let head = format!(
            "  #{} {} → {} ({:.1}ms)",
            self.index,
            short_id(&self.id),
            self.colour,
            self.elapsed_ms
        );
        match &self.outcome {
            HopOutcome::Delivered => println!("{head}, delivered"),
            HopOutcome::Relayed(next) => println!("{head}, relayed to {}", short_id(next)),
            HopOutcome::Failed(err) => println!("{head}, relay failed: {err}"),
        }
    }
}

impl From<&Hop> for EventHop {
    fn from(hop: &Hop) -> Self {
        let (relayed_to, error) = match &hop.outcome {
            HopOutcome::Delivered => (None, None),
            HopOutcome::Relayed(next) => (Some(*next), None),
            HopOutcome::Failed(err) => (None, Some(err.clone())),
        };
        EventHop {
            event: "hop",
            index: hop.index,
            node: hop.id,
            colour: hop.colour,
            relayed_to,
            error,
            elapsed_ms: hop.elapsed_ms,
        }
    }
}

/// Spawn `count` runtimes on `mesh`, connect them and wait until bound.
pub async fn spawn_nodes(
    mesh: &MemoryMesh,
    count: usize,
    settings: &SimSettings,
) -> anyhow::Result<Vec<SimNode>> {
    let mut nodes = Vec::with_capacity(count);
    for index in 0..count {
        let (transport, mesh_rx) = mesh.add_node();
        let channels = RippleRuntime::spawn(transport.clone(), mesh_rx, settings.config.clone());
        let mut node = SimNode {
            index,
            id: transport.id(),
            handle: channels.handle,
            events: channels.events,
        };

        node.handle.connect().await?;
        let bound = node
            .wait_for(settings.timeout, |e| {
                matches!(e, AppEvent::StateChanged(_) | AppEvent::Error { .. })
            })
            .await?;
        match bound {
            AppEvent::StateChanged(ConnectionState::Bound) => {}
            AppEvent::Error { error } => anyhow::bail!("node {}: {error}", node.label()),
            other => anyhow::bail!("node {}: unexpected {other:?}", node.label()),
        }

        if settings.json {
            emit(&EventNode {
                event: "node",
                index,
                id: node.id,
            });
        } else {
            eprintln!("  node {} bound", node.label());
        }
        nodes.push(node);
    }
    Ok(nodes)
}
