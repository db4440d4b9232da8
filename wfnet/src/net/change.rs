use std::fmt::Display;

use unicode_segmentation::UnicodeSegmentation;

use super::{ElementId, Marking, Position, Revision};

/// Notification for presentation adapters. Fire-and-forget, never a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetChange {
    // structural changes
    PlaceAdded(ElementId, String, Marking, Position),
    TransitionAdded(ElementId, String, Position),
    ArcAdded(ElementId, ElementId, ElementId),
    NodeRemoved(ElementId),
    ArcRemoved(ElementId),
    Cleared(),
    Restored(), // whole net replaced by an undo/redo snapshot
    // attribute changes
    NodeRenamed(ElementId, String),
    NodeMoved(ElementId, Position),
    MarkingChanged(ElementId, Marking),
    // simulation
    TokenAdded(ElementId),
    TokenRemoved(ElementId),
    TransitionEnabled(ElementId),
    TransitionDisabled(ElementId),
    TransitionUnsafe(ElementId),
    TransitionReset(ElementId),
    TransitionFired(ElementId),
}

impl NetChange {
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            NetChange::PlaceAdded(..)
                | NetChange::TransitionAdded(..)
                | NetChange::ArcAdded(..)
                | NetChange::NodeRemoved(..)
                | NetChange::ArcRemoved(..)
                | NetChange::Cleared()
                | NetChange::Restored()
        )
    }
}

#[derive(Default, Debug, Clone)]
pub struct NetChangeEvent {
    pub changes: Vec<NetChange>,
    pub revision: Revision,
}

impl NetChangeEvent {
    pub fn new(revision: Revision) -> Self {
        NetChangeEvent { changes: Default::default(), revision }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl Display for NetChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "revision={}, changes=[", self.revision.0)?;
        for (idx, change) in self.changes.iter().enumerate() {
            if idx == 0 {
                write!(f, "{}", change)?;
            } else {
                write!(f, ", {}", change)?;
            }
        }
        write!(f, "]")?;
        Ok(())
    }
}

/// At most `max_len` graphemes of `name`. A cut is marked by up to three dots.
fn _truncate_name(name: &str, max_len: usize) -> String {
    let graphemes: Vec<&str> = name.graphemes(true).take(max_len + 1).collect();
    if graphemes.len() <= max_len {
        return name.into();
    }
    let dots = max_len.min(3);
    let mut short = graphemes[..max_len - dots].concat();
    short.push_str(&".".repeat(dots));
    short
}

impl Display for NetChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetChange::PlaceAdded(id, name, marking, position) => write!(
                f,
                "PlaceAdded({} '{}' tokens={} at {})",
                id,
                _truncate_name(name, 40),
                marking.tokens(),
                position
            ),
            NetChange::TransitionAdded(id, name, position) => {
                write!(f, "TransitionAdded({} '{}' at {})", id, _truncate_name(name, 40), position)
            }
            NetChange::ArcAdded(id, source, target) => {
                write!(f, "ArcAdded({}: {} -> {})", id, source, target)
            }
            NetChange::NodeRemoved(id) => write!(f, "NodeRemoved({})", id),
            NetChange::ArcRemoved(id) => write!(f, "ArcRemoved({})", id),
            NetChange::Cleared() => write!(f, "Cleared()"),
            NetChange::Restored() => write!(f, "Restored()"),
            NetChange::NodeRenamed(id, name) => {
                write!(f, "NodeRenamed({}: '{}')", id, _truncate_name(name, 40))
            }
            NetChange::NodeMoved(id, position) => write!(f, "NodeMoved({} to {})", id, position),
            NetChange::MarkingChanged(id, marking) => {
                write!(f, "MarkingChanged({}: tokens={})", id, marking.tokens())
            }
            NetChange::TokenAdded(id) => write!(f, "TokenAdded({})", id),
            NetChange::TokenRemoved(id) => write!(f, "TokenRemoved({})", id),
            NetChange::TransitionEnabled(id) => write!(f, "TransitionEnabled({})", id),
            NetChange::TransitionDisabled(id) => write!(f, "TransitionDisabled({})", id),
            NetChange::TransitionUnsafe(id) => write!(f, "TransitionUnsafe({})", id),
            NetChange::TransitionReset(id) => write!(f, "TransitionReset({})", id),
            NetChange::TransitionFired(id) => write!(f, "TransitionFired({})", id),
        }
    }
}
