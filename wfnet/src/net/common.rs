use std::{borrow::Borrow, fmt::Display};

use crate::error::{PetriError, Result};

#[derive(Eq, PartialEq, Clone, PartialOrd, Ord, Hash, Debug)]
pub struct ElementId(pub String);

impl ElementId {
    pub fn new(id: impl Into<String>) -> Self {
        ElementId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        ElementId(value.to_string())
    }
}

impl From<String> for ElementId {
    fn from(value: String) -> Self {
        ElementId(value)
    }
}

impl Borrow<str> for ElementId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Structural revision of a net, bumped by every structural mutation.
#[derive(Eq, PartialEq, Clone, Copy, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Revision(pub u64);

impl Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Eq, PartialEq, Clone, Copy, Hash, Debug, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Position { x, y }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Marking of a place in a 1-bounded net.
#[derive(Eq, PartialEq, Clone, Copy, Hash, Debug, Default)]
pub enum Marking {
    #[default]
    Empty,
    Marked,
}

impl Marking {
    pub fn is_marked(&self) -> bool {
        *self == Marking::Marked
    }

    pub fn tokens(&self) -> u8 {
        match self {
            Marking::Empty => 0,
            Marking::Marked => 1,
        }
    }
}

impl TryFrom<u8> for Marking {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Marking::Empty),
            1 => Ok(Marking::Marked),
            other => Err(other),
        }
    }
}

impl From<bool> for Marking {
    fn from(value: bool) -> Self {
        if value {
            Marking::Marked
        } else {
            Marking::Empty
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Place {
    pub(super) marking: Marking,
}

impl Place {
    pub fn new(marking: Marking) -> Self {
        Place { marking }
    }

    pub fn marking(&self) -> Marking {
        self.marking
    }

    pub fn set_marking(&mut self, marking: Marking) {
        self.marking = marking;
    }
}

/// Transition state. Both flags are derived by the firing engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub(crate) enabled: bool,
    pub(crate) safe: bool,
}

impl Default for Transition {
    fn default() -> Self {
        Transition { enabled: false, safe: true }
    }
}

impl Transition {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn safe(&self) -> bool {
        self.safe
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Place(Place),
    Transition(Transition),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    id: ElementId,
    name: String,
    position: Position,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub fn place(
        id: impl Into<ElementId>,
        name: impl Into<String>,
        marking: Marking,
        position: Position,
    ) -> Self {
        Node {
            id: id.into(),
            name: name.into(),
            position,
            kind: NodeKind::Place(Place::new(marking)),
        }
    }

    pub fn transition(id: impl Into<ElementId>, name: impl Into<String>, position: Position) -> Self {
        Node {
            id: id.into(),
            name: name.into(),
            position,
            kind: NodeKind::Transition(Transition::default()),
        }
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn as_place(&self) -> Option<&Place> {
        match &self.kind {
            NodeKind::Place(place) => Some(place),
            NodeKind::Transition(_) => None,
        }
    }

    pub fn as_place_mut(&mut self) -> Option<&mut Place> {
        match &mut self.kind {
            NodeKind::Place(place) => Some(place),
            NodeKind::Transition(_) => None,
        }
    }

    pub fn as_transition(&self) -> Option<&Transition> {
        match &self.kind {
            NodeKind::Transition(transition) => Some(transition),
            NodeKind::Place(_) => None,
        }
    }

    pub(crate) fn as_transition_mut(&mut self) -> Option<&mut Transition> {
        match &mut self.kind {
            NodeKind::Transition(transition) => Some(transition),
            NodeKind::Place(_) => None,
        }
    }

    pub fn is_place(&self) -> bool {
        matches!(self.kind, NodeKind::Place(_))
    }

    pub fn is_transition(&self) -> bool {
        matches!(self.kind, NodeKind::Transition(_))
    }
}

/// Directed edge between one place and one transition.
///
/// The endpoints are fixed at construction. Reconnecting an arc means removing it and adding a
/// new one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Arc {
    id: ElementId,
    source: ElementId,
    target: ElementId,
}

impl Arc {
    /// Create an arc between two nodes.
    ///
    /// Fails with `InvalidConnection` unless exactly one endpoint is a place and the other one a
    /// transition.
    pub fn new(id: impl Into<ElementId>, source: &Node, target: &Node) -> Result<Self> {
        let reason = match (source.kind(), target.kind()) {
            (NodeKind::Place(_), NodeKind::Transition(_))
            | (NodeKind::Transition(_), NodeKind::Place(_)) => None,
            (NodeKind::Place(_), NodeKind::Place(_)) => Some("cannot connect two places"),
            (NodeKind::Transition(_), NodeKind::Transition(_)) => {
                Some("cannot connect two transitions")
            }
        };
        if let Some(reason) = reason {
            return Err(PetriError::InvalidConnection {
                source_id: source.id().clone(),
                target_id: target.id().clone(),
                reason: reason.into(),
            });
        }
        Ok(Arc { id: id.into(), source: source.id().clone(), target: target.id().clone() })
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn source_id(&self) -> &ElementId {
        &self.source
    }

    pub fn target_id(&self) -> &ElementId {
        &self.target
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Element {
    Node(Node),
    Arc(Arc),
}

impl Element {
    pub fn id(&self) -> &ElementId {
        match self {
            Element::Node(node) => node.id(),
            Element::Arc(arc) => arc.id(),
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Element::Node(node) => Some(node),
            Element::Arc(_) => None,
        }
    }

    pub fn as_arc(&self) -> Option<&Arc> {
        match self {
            Element::Arc(arc) => Some(arc),
            Element::Node(_) => None,
        }
    }
}
