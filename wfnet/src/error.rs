use std::io;

use crate::net::ElementId;
use crate::workspace::{NetId, WorkspaceConfigBuilderError};

#[derive(thiserror::Error, Debug)]
pub enum PetriError {
    #[error("Element id '{0}' is already in use")]
    DuplicateId(ElementId),
    #[error("Element '{0}' not found")]
    NotFound(ElementId),
    #[error("Arc '{arc}' references unknown node '{endpoint}'")]
    UnknownEndpoint { arc: ElementId, endpoint: ElementId },
    #[error("Invalid connection '{source_id}' -> '{target_id}': {reason}")]
    InvalidConnection { source_id: ElementId, target_id: ElementId, reason: String },
    #[error("Transition '{transition}' is unsafe, output place(s) already marked: {}", join_ids(.places))]
    UnsafeState { transition: ElementId, places: Vec<ElementId> },
    #[error("Marking invariant violated: {0}")]
    LogicError(String),
    #[error("Simulation did not terminate after {0} firings")]
    ValidationTimeout(usize),
    #[error("Net {0} is not open")]
    UnknownNet(NetId),
    #[error("Action Cancelled")]
    Cancelled(),
    #[error("Configuration error: {0}")]
    ConfigError(#[from] WorkspaceConfigBuilderError),
    #[error("Filesystem error: {0}")]
    IOError(#[from] io::Error),
    #[error("XML error: {0}")]
    XmlError(#[from] quick_xml::Error),
}

pub type Result<T> = std::result::Result<T, PetriError>;

pub(crate) fn join_ids(ids: &[ElementId]) -> String {
    ids.iter().map(|id| id.as_str()).collect::<Vec<&str>>().join(", ")
}
