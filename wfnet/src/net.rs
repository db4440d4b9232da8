mod change;
mod common;
mod net_state;

pub use change::{NetChange, NetChangeEvent};
pub use common::{
    Arc, Element, ElementId, Marking, Node, NodeKind, Place, Position, Revision, Transition,
};
pub use net_state::{CheckState, Net, NetStatus};
