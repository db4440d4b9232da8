//! PNML persistence.
//!
//! Layout written and understood:
//!
//! ```text
//! <pnml><net id type>
//!   <place id> <name><value>..</value></name>
//!              <initialMarking><token><value>0|1</value></token></initialMarking>
//!              <graphics><position x y/></graphics> </place>
//!   <transition id> <name>..</name> <graphics>..</graphics> </transition>
//!   <arc id source target/>
//! </net></pnml>
//! ```
//!
//! Reading is lenient: an element with missing or invalid values is skipped and the rest of the
//! document is still loaded. Every problem sets a bit in the `ReadStatus` of the load report.
mod reader;
mod writer;

use bitflags::bitflags;

use crate::net::Net;

pub use reader::{read_file, read_str};
pub use writer::{write_file, write_string};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ReadStatus: u8 {
        /// An element the reader does not know was ignored.
        const UNKNOWN_ELEMENT = 1 << 0;
        /// An attribute the reader does not know was ignored.
        const UNKNOWN_VALUE = 1 << 1;
        /// An element was skipped because a required value is missing.
        const MISSING_VALUE = 1 << 2;
        /// An element was skipped because a value could not be used.
        const INVALID_VALUE = 1 << 3;
        /// The document could not be read to its end.
        const READ_ERROR = 1 << 4;
    }
}

impl ReadStatus {
    /// A file is accepted unless values were missing or invalid or reading failed. Unknown
    /// elements and attributes are informational.
    pub fn accepted(&self) -> bool {
        !self.intersects(ReadStatus::MISSING_VALUE | ReadStatus::INVALID_VALUE | ReadStatus::READ_ERROR)
    }
}

pub struct LoadReport {
    pub net: Net,
    pub status: ReadStatus,
    pub warnings: Vec<String>,
}

impl LoadReport {
    pub fn accepted(&self) -> bool {
        self.status.accepted()
    }
}
