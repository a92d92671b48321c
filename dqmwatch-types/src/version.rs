//! Version of the report document layout.
//!
//! A report document carries the version it was written with. The major
//! number changes when a reader built for the previous layout would
//! misread a document: a report field is renamed or removed, or the verdict
//! encoding changes. The minor number changes when something a reader may
//! ignore is added, such as a new extra-info key or an optional field.

use crate::{SCHEMA_VERSION, SCHEMA_VERSION_MINOR};

/// Layout version stamped on every report document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct SchemaVersion {
    /// Bumped when existing report fields change meaning or disappear.
    #[cfg_attr(feature = "minicbor", n(0))]
    pub major: u32,

    /// Bumped when optional report content is added.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub minor: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// The layout this crate writes.
    pub const fn current() -> Self {
        Self::new(SCHEMA_VERSION, SCHEMA_VERSION_MINOR)
    }

    /// Whether reports written with this version can be read by this crate.
    ///
    /// Only the major number matters: documents from a newer minor version
    /// may hold extra infos or fields this crate skips.
    pub fn is_compatible(&self) -> bool {
        self.major == SCHEMA_VERSION
    }

    /// Whether the document was written by a newer minor revision and may
    /// hold content this crate does not know about.
    pub fn is_newer_revision(&self) -> bool {
        self.is_compatible() && self.minor > SCHEMA_VERSION_MINOR
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::current()
    }
}

impl core::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
