pub mod error;
pub mod firing;
pub mod history;
pub mod net;
pub mod pnml;
pub mod validate;
pub mod workspace;

pub use error::{PetriError, Result};
pub use validate::{Diagnostic, DiagnosticKind, ValidationReport, Validator};
pub use workspace::{
    NetId, Workspace, WorkspaceConfig, WorkspaceConfigBuilder, WorkspaceConfigBuilderError,
    WorkspaceEvent,
};
