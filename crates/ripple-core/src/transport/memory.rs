//! In-process mesh.
//!
//! Nodes are wired together with explicit links. A node is reachable once
//! it is connected and bound; every topology change recomputes what each
//! online node can reach and emits the join/leave difference on its event
//! channel. Next hop is the first hop of a shortest path.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use super::{MeshEvent, MeshState, MeshTransport, PeerChange};
use crate::error::{NoRouteError, TransportError};
use crate::types::PeerId;

/// Event channel capacity per node.
const NODE_EVENT_BUFFER: usize = 1024;

struct NodeSlot {
    events: mpsc::Sender<MeshEvent>,
    connected: bool,
    port: Option<u16>,
    reserved: HashSet<u16>,
    visible: BTreeSet<PeerId>,
}

impl NodeSlot {
    fn online(&self) -> bool {
        self.connected && self.port.is_some()
    }
}

#[derive(Default)]
struct MeshInner {
    nodes: BTreeMap<PeerId, NodeSlot>,
    links: HashMap<PeerId, BTreeSet<PeerId>>,
}

impl MeshInner {
    fn online(&self, id: &PeerId) -> bool {
        self.nodes.get(id).is_some_and(NodeSlot::online)
    }

    fn neighbours(&self, id: &PeerId) -> impl Iterator<Item = PeerId> + '_ {
        self.links
            .get(id)
            .into_iter()
            .flatten()
            .copied()
            .filter(|n| self.online(n))
    }

    fn reachable_from(&self, start: PeerId) -> BTreeSet<PeerId> {
        let mut seen = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(cur) = queue.pop_front() {
            for n in self.neighbours(&cur) {
                if seen.insert(n) {
                    queue.push_back(n);
                }
            }
        }
        seen.remove(&start);
        seen
    }

    /// First hop of a shortest online path `from` → `to`.
    fn first_hop(&self, from: PeerId, to: PeerId) -> Option<PeerId> {
        let mut parent: HashMap<PeerId, PeerId> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        while let Some(cur) = queue.pop_front() {
            if cur == to {
                let mut hop = to;
                while let Some(p) = parent.get(&hop) {
                    if *p == from {
                        return Some(hop);
                    }
                    hop = *p;
                }
                return None;
            }
            for n in self.neighbours(&cur) {
                if n != from && !parent.contains_key(&n) {
                    parent.insert(n, cur);
                    queue.push_back(n);
                }
            }
        }
        None
    }

    /// Recompute reachability and notify every node of its differences.
    fn refresh(&mut self) {
        let ids: Vec<PeerId> = self.nodes.keys().copied().collect();
        let mut updates = Vec::with_capacity(ids.len());
        for id in ids {
            let now = if self.online(&id) {
                self.reachable_from(id)
            } else {
                BTreeSet::new()
            };
            updates.push((id, now));
        }

        for (id, now) in updates {
            let Some(slot) = self.nodes.get_mut(&id) else {
                continue;
            };
            let notify = slot.online();
            let joined: Vec<PeerId> = now.difference(&slot.visible).copied().collect();
            let left: Vec<PeerId> = slot.visible.difference(&now).copied().collect();
            slot.visible = now;
            if !notify {
                continue;
            }
            for (peer, change) in left
                .into_iter()
                .map(|p| (p, PeerChange::Left))
                .chain(joined.into_iter().map(|p| (p, PeerChange::Joined)))
            {
                if let Err(e) = slot.events.try_send(MeshEvent::PeerChanged { peer, change }) {
                    tracing::debug!(node = %id, "memory mesh: dropped peer event: {e}");
                }
            }
        }
    }
}

/// Shared in-process mesh. Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryMesh {
    inner: Arc<Mutex<MeshInner>>,
}

impl MemoryMesh {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MeshInner> {
        lock(&self.inner)
    }

    /// Add a node with a fresh identity. Returns its transport and the
    /// receiving end of its event channel.
    pub fn add_node(&self) -> (MemoryTransport, mpsc::Receiver<MeshEvent>) {
        let (tx, rx) = mpsc::channel(NODE_EVENT_BUFFER);
        let mut inner = self.lock();
        let mut id = PeerId::random();
        while inner.nodes.contains_key(&id) {
            id = PeerId::random();
        }
        inner.nodes.insert(
            id,
            NodeSlot {
                events: tx,
                connected: false,
                port: None,
                reserved: HashSet::new(),
                visible: BTreeSet::new(),
            },
        );
        let transport = MemoryTransport {
            id,
            inner: Arc::clone(&self.inner),
        };
        (transport, rx)
    }

    /// Create a bidirectional link.
    pub fn link(&self, a: PeerId, b: PeerId) {
        if a == b {
            return;
        }
        let mut inner = self.lock();
        inner.links.entry(a).or_default().insert(b);
        inner.links.entry(b).or_default().insert(a);
        inner.refresh();
    }

    /// Remove a bidirectional link.
    pub fn unlink(&self, a: PeerId, b: PeerId) {
        let mut inner = self.lock();
        if let Some(set) = inner.links.get_mut(&a) {
            set.remove(&b);
        }
        if let Some(set) = inner.links.get_mut(&b) {
            set.remove(&a);
        }
        inner.refresh();
    }

    /// Peers `id` can currently reach.
    pub fn reachable(&self, id: PeerId) -> Vec<PeerId> {
        self.lock().reachable_from(id).into_iter().collect()
    }
}

fn lock(inner: &Mutex<MeshInner>) -> MutexGuard<'_, MeshInner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

/// One node's view of a [`MemoryMesh`].
#[derive(Clone)]
pub struct MemoryTransport {
    id: PeerId,
    inner: Arc<Mutex<MeshInner>>,
}

impl MemoryTransport {
    /// Identity this node will report after connecting.
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Mark `port` as taken by another application on this node.
    pub fn reserve_port(&self, port: u16) {
        if let Some(slot) = lock(&self.inner).nodes.get_mut(&self.id) {
            slot.reserved.insert(port);
        }
    }

    /// Run `f` against this node's slot, failing if the node is gone.
    fn with_slot<R>(
        &self,
        f: impl FnOnce(&mut MeshInner, PeerId) -> Result<R, TransportError>,
    ) -> Result<R, TransportError> {
        let mut inner = lock(&self.inner);
        if !inner.nodes.contains_key(&self.id) {
            return Err(TransportError::Disconnected);
        }
        f(&mut inner, self.id)
    }
}

#[async_trait::async_trait]
impl MeshTransport for MemoryTransport {
    fn local_identity(&self) -> Option<PeerId> {
        let inner = lock(&self.inner);
        inner
            .nodes
            .get(&self.id)
            .filter(|slot| slot.connected)
            .map(|_| self.id)
    }

    async fn resolve_next_hop(&self, target: PeerId) -> Result<PeerId, NoRouteError> {
        let inner = lock(&self.inner);
        if !inner.online(&self.id) {
            return Err(NoRouteError { target });
        }
        if target == self.id {
            return Ok(self.id);
        }
        inner
            .first_hop(self.id, target)
            .ok_or(NoRouteError { target })
    }

    async fn send_reliable(
        &self,
        next_hop: PeerId,
        port: u16,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        self.with_slot(|inner, me| {
            if !inner.online(&me) {
                return Err(TransportError::Disconnected);
            }
            let adjacent = next_hop == me
                || inner
                    .links
                    .get(&me)
                    .is_some_and(|set| set.contains(&next_hop));
            if !adjacent || !inner.online(&next_hop) {
                return Err(TransportError::NotNeighbour { peer: next_hop });
            }
            let slot = inner
                .nodes
                .get(&next_hop)
                .ok_or(TransportError::NotNeighbour { peer: next_hop })?;
            if slot.port != Some(port) {
                return Err(TransportError::PortNotBound {
                    peer: next_hop,
                    port,
                });
            }
            slot.events
                .try_send(MeshEvent::DataReceived {
                    from: me,
                    port,
                    payload: payload.to_vec(),
                })
                .map_err(|e| TransportError::Send {
                    peer: next_hop,
                    reason: e.to_string(),
                })
        })
    }

    async fn connect(&self) -> Result<(), TransportError> {
        self.with_slot(|inner, me| {
            let slot = inner
                .nodes
                .get_mut(&me)
                .ok_or(TransportError::Disconnected)?;
            slot.connected = true;
            slot.events
                .try_send(MeshEvent::StateChanged(MeshState::Ready { local_id: me }))
                .map_err(|_| TransportError::Disconnected)
        })
    }

    async fn bind(&self, port: u16) -> Result<(), TransportError> {
        self.with_slot(|inner, me| {
            let slot = inner
                .nodes
                .get_mut(&me)
                .ok_or(TransportError::Disconnected)?;
            if !slot.connected {
                return Err(TransportError::Disconnected);
            }
            if slot.port == Some(port) || slot.reserved.contains(&port) {
                return Err(TransportError::PortInUse(port));
            }
            slot.port = Some(port);
            inner.refresh();
            Ok(())
        })
    }

    async fn resume(&self) -> Result<(), TransportError> {
        self.with_slot(|inner, me| match inner.nodes.get(&me) {
            Some(slot) if slot.connected => Ok(()),
            _ => Err(TransportError::Disconnected),
        })
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.with_slot(|inner, me| {
            let slot = inner
                .nodes
                .get_mut(&me)
                .ok_or(TransportError::Disconnected)?;
            if !slot.connected {
                return Err(TransportError::Disconnected);
            }
            slot.connected = false;
            slot.port = None;
            inner.refresh();
            Ok(())
        })
    }
}
