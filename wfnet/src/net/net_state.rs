use std::{
    collections::HashMap,
    sync::{
        self,
        atomic::{AtomicBool, Ordering},
    },
};

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::{
    Arc, Element, ElementId, Marking, NetChange, NetChangeEvent, Node, Place, Position, Revision,
    Transition,
};
use crate::error::{PetriError, Result};

/// Incoming and outgoing arc ids of a single node.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
struct Adjacency {
    incoming: Vec<ElementId>,
    outgoing: Vec<ElementId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckState {
    Unchecked,
    Checking,
    Valid,
    Invalid,
}

/// Validation flags of a net.
///
/// Shared between the live net and the validation worker, readable without holding the net's
/// lock. A stale read only delays or repeats one validation pass.
#[derive(Debug, Default)]
pub struct NetStatus {
    checked: AtomicBool,
    valid: AtomicBool,
    checking: AtomicBool,
}

impl NetStatus {
    pub fn is_checked(&self) -> bool {
        self.checked.load(Ordering::SeqCst)
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    pub fn is_checking(&self) -> bool {
        self.checking.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> CheckState {
        if self.is_checked() {
            if self.is_valid() {
                CheckState::Valid
            } else {
                CheckState::Invalid
            }
        } else if self.is_checking() {
            CheckState::Checking
        } else {
            CheckState::Unchecked
        }
    }

    pub(crate) fn invalidate(&self) {
        self.checked.store(false, Ordering::SeqCst);
    }

    pub(crate) fn begin_check(&self) {
        self.checking.store(true, Ordering::SeqCst);
    }

    pub(crate) fn finish_check(&self, valid: bool) {
        self.valid.store(valid, Ordering::SeqCst);
        self.checked.store(true, Ordering::SeqCst);
        self.checking.store(false, Ordering::SeqCst);
    }

    pub(crate) fn abort_check(&self) {
        self.checking.store(false, Ordering::SeqCst);
    }

    fn copy(&self) -> NetStatus {
        NetStatus {
            checked: AtomicBool::new(self.is_checked()),
            valid: AtomicBool::new(self.is_valid()),
            checking: AtomicBool::new(false),
        }
    }
}

/// A single workflow net.
///
/// Elements are kept in insertion order. The adjacency index mirrors the arc set and is only
/// ever touched by the methods of this type.
#[derive(Default)]
pub struct Net {
    elements: IndexMap<ElementId, Element>,
    adjacency: HashMap<ElementId, Adjacency>,
    status: sync::Arc<NetStatus>,
    modified: bool,
    revision: Revision,
    pending: Vec<NetChange>,
}

macro_rules! get_node_mut {
    ($self:expr, $id:expr) => {
        match $self.elements.get_mut($id) {
            Some(Element::Node(node)) => Ok(node),
            _ => Err(PetriError::NotFound($id.into())),
        }
    };
}

impl Net {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> sync::Arc<NetStatus> {
        sync::Arc::clone(&self.status)
    }

    pub fn is_checked(&self) -> bool {
        self.status.is_checked()
    }

    pub fn is_valid(&self) -> bool {
        self.status.is_valid()
    }

    pub fn check_state(&self) -> CheckState {
        self.status.state()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Reset the modification flag, e.g. after the net has been saved.
    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    /// Snapshot of all elements in insertion order.
    pub fn elements(&self) -> Vec<Element> {
        self.elements.values().cloned().collect()
    }

    pub fn element(&self, id: &str) -> Result<&Element> {
        self.elements.get(id).ok_or_else(|| PetriError::NotFound(id.into()))
    }

    pub fn node(&self, id: &str) -> Result<&Node> {
        self.element(id)?.as_node().ok_or_else(|| PetriError::NotFound(id.into()))
    }

    pub fn place(&self, id: &str) -> Result<&Place> {
        self.node(id)?.as_place().ok_or_else(|| PetriError::NotFound(id.into()))
    }

    pub fn transition(&self, id: &str) -> Result<&Transition> {
        self.node(id)?.as_transition().ok_or_else(|| PetriError::NotFound(id.into()))
    }

    pub fn arc(&self, id: &str) -> Result<&Arc> {
        self.element(id)?.as_arc().ok_or_else(|| PetriError::NotFound(id.into()))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.elements.values().filter_map(|e| e.as_node())
    }

    pub fn places(&self) -> impl Iterator<Item = &Node> {
        self.nodes().filter(|n| n.is_place())
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Node> {
        self.nodes().filter(|n| n.is_transition())
    }

    pub fn arcs(&self) -> impl Iterator<Item = &Arc> {
        self.elements.values().filter_map(|e| e.as_arc())
    }

    /// Ids of the arcs ending in the given node.
    pub fn predecessors(&self, id: &str) -> Result<&[ElementId]> {
        self.adjacency
            .get(id)
            .map(|adj| adj.incoming.as_slice())
            .ok_or_else(|| PetriError::NotFound(id.into()))
    }

    /// Ids of the arcs starting at the given node.
    pub fn successors(&self, id: &str) -> Result<&[ElementId]> {
        self.adjacency
            .get(id)
            .map(|adj| adj.outgoing.as_slice())
            .ok_or_else(|| PetriError::NotFound(id.into()))
    }

    pub fn add_place(
        &mut self,
        id: impl Into<ElementId>,
        name: impl Into<String>,
        marking: Marking,
        position: Position,
    ) -> Result<()> {
        let node = Node::place(id, name, marking, position);
        let change =
            NetChange::PlaceAdded(node.id().clone(), node.name().into(), marking, position);
        self._insert_node(node)?;
        self._structural(change);
        Ok(())
    }

    pub fn add_transition(
        &mut self,
        id: impl Into<ElementId>,
        name: impl Into<String>,
        position: Position,
    ) -> Result<()> {
        let node = Node::transition(id, name, position);
        let change = NetChange::TransitionAdded(node.id().clone(), node.name().into(), position);
        self._insert_node(node)?;
        self._structural(change);
        Ok(())
    }

    /// Add an arc between two existing nodes and register it in both adjacency lists.
    pub fn add_arc(
        &mut self,
        id: impl Into<ElementId>,
        source_id: &str,
        target_id: &str,
    ) -> Result<()> {
        let id = id.into();
        if self.elements.contains_key(&id) {
            return Err(PetriError::DuplicateId(id));
        }
        let source = self._endpoint(&id, source_id)?;
        let target = self._endpoint(&id, target_id)?;
        let arc = Arc::new(id, source, target)?;
        let change =
            NetChange::ArcAdded(arc.id().clone(), arc.source_id().clone(), arc.target_id().clone());
        self._attach(&arc);
        self.elements.insert(arc.id().clone(), Element::Arc(arc));
        self._structural(change);
        Ok(())
    }

    /// Remove an element.
    ///
    /// Removing a node also removes every arc touching it: first the incoming, then the outgoing
    /// arcs, each one reported individually. Returns the ids of all removed arcs.
    pub fn remove_element(&mut self, id: &str) -> Result<Vec<ElementId>> {
        let arc = match self.elements.get(id) {
            None => return Err(PetriError::NotFound(id.into())),
            Some(element) => element.as_arc().cloned(),
        };
        if let Some(arc) = arc {
            self.elements.shift_remove(id);
            self._detach(&arc);
            trace!(arc = id, "Removed arc.");
            self._structural(NetChange::ArcRemoved(arc.id().clone()));
            return Ok(vec![arc.id().clone()]);
        }

        let adjacency = self.adjacency.remove(id).unwrap_or_default();
        if let Some((node_id, _)) = self.elements.shift_remove_entry(id) {
            self._structural(NetChange::NodeRemoved(node_id));
        }
        let mut removed = Vec::with_capacity(adjacency.incoming.len() + adjacency.outgoing.len());
        for arc_id in adjacency.incoming.into_iter().chain(adjacency.outgoing) {
            removed.extend(self.remove_element(arc_id.as_str())?);
        }
        debug!(node = id, arcs = removed.len(), "Removed node.");
        Ok(removed)
    }

    /// Remove all elements. Reported as a single `Cleared` change.
    pub fn clear(&mut self) {
        self.elements.clear();
        self.adjacency.clear();
        self._structural(NetChange::Cleared());
    }

    pub fn rename(&mut self, id: &str, name: impl Into<String>) -> Result<()> {
        let node = get_node_mut!(self, id)?;
        node.set_name(name);
        let change = NetChange::NodeRenamed(node.id().clone(), node.name().into());
        self._attribute(change);
        Ok(())
    }

    pub fn move_node(&mut self, id: &str, position: Position) -> Result<()> {
        let node = get_node_mut!(self, id)?;
        node.set_position(position);
        let change = NetChange::NodeMoved(node.id().clone(), position);
        self._attribute(change);
        Ok(())
    }

    /// Set the marking of a place as an edit, e.g. the initial marking.
    pub fn set_marking(&mut self, id: &str, marking: Marking) -> Result<()> {
        let node = get_node_mut!(self, id)?;
        let place = node.as_place_mut().ok_or_else(|| PetriError::NotFound(id.into()))?;
        place.set_marking(marking);
        self._attribute(NetChange::MarkingChanged(id.into(), marking));
        Ok(())
    }

    /// Drain all changes recorded since the last call.
    pub fn take_changes(&mut self) -> NetChangeEvent {
        NetChangeEvent { changes: std::mem::take(&mut self.pending), revision: self.revision }
    }

    /// Replace the contents of this net with a snapshot and return the previous contents.
    ///
    /// The revision keeps increasing across replacements so that validation results for the
    /// previous contents are recognized as stale.
    pub fn replace_with(&mut self, snapshot: Net) -> Net {
        let mut previous = std::mem::replace(self, snapshot);
        self.pending = std::mem::take(&mut previous.pending);
        self.revision = previous.revision;
        // the live status handle stays with the live net
        std::mem::swap(&mut self.status, &mut previous.status);
        self._structural(NetChange::Restored());
        previous
    }

    pub(crate) fn record(&mut self, change: NetChange) {
        self.pending.push(change);
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Result<&mut Node> {
        get_node_mut!(self, id)
    }

    fn _structural(&mut self, change: NetChange) {
        self.revision.0 += 1;
        self.modified = true;
        self.status.invalidate();
        self.record(change);
    }

    fn _attribute(&mut self, change: NetChange) {
        self.modified = true;
        self.record(change);
    }

    fn _insert_node(&mut self, node: Node) -> Result<()> {
        if self.elements.contains_key(node.id()) {
            return Err(PetriError::DuplicateId(node.id().clone()));
        }
        self.adjacency.insert(node.id().clone(), Adjacency::default());
        self.elements.insert(node.id().clone(), Element::Node(node));
        Ok(())
    }

    fn _endpoint(&self, arc_id: &ElementId, node_id: &str) -> Result<&Node> {
        self.elements.get(node_id).and_then(|e| e.as_node()).ok_or_else(|| {
            PetriError::UnknownEndpoint { arc: arc_id.clone(), endpoint: node_id.into() }
        })
    }

    fn _attach(&mut self, arc: &Arc) {
        if let Some(adj) = self.adjacency.get_mut(arc.source_id()) {
            adj.outgoing.push(arc.id().clone());
        }
        if let Some(adj) = self.adjacency.get_mut(arc.target_id()) {
            adj.incoming.push(arc.id().clone());
        }
    }

    fn _detach(&mut self, arc: &Arc) {
        // the endpoint may already be gone while a node removal cascades
        if let Some(adj) = self.adjacency.get_mut(arc.source_id()) {
            adj.outgoing.retain(|a| a != arc.id());
        }
        if let Some(adj) = self.adjacency.get_mut(arc.target_id()) {
            adj.incoming.retain(|a| a != arc.id());
        }
    }

    fn _rebuild_adjacency(&mut self) {
        self.adjacency =
            self.nodes().map(|node| (node.id().clone(), Adjacency::default())).collect();
        let arcs: Vec<Arc> = self.arcs().cloned().collect();
        for arc in &arcs {
            self._attach(arc);
        }
    }
}

impl Clone for Net {
    /// Structural copy: every element is copied and the adjacency index is rebuilt from the
    /// copied arcs. Pending changes are not carried over.
    fn clone(&self) -> Self {
        let mut net = Net {
            elements: self.elements.clone(),
            adjacency: Default::default(),
            status: sync::Arc::new(self.status.copy()),
            modified: self.modified,
            revision: self.revision,
            pending: Default::default(),
        };
        net._rebuild_adjacency();
        net
    }
}

impl std::fmt::Debug for Net {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Net")
            .field("elements", &self.elements.len())
            .field("revision", &self.revision.0)
            .field("state", &self.check_state())
            .finish()
    }
}
