//! # dqmwatch-types
//!
//! Core types for data quality monitoring. This crate defines the monitored
//! objects (histograms, graphs, scalars) that quality tests judge, and the
//! quality reports those tests produce.
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: Core types work without any serialization framework
//! - **Optional serialization**: Enable `serde` and/or `minicbor` features as needed
//! - **Closed object model**: Every monitored payload is a [`MonitorObject`] variant
//! - **Versioned schema**: Report documents include version info for forward compatibility
//! - **Ergonomic builders**: Fluent API for constructing reports
//!
//! ## Features
//!
//! - `serde`: JSON/TOML/etc. serialization via serde
//! - `minicbor`: Compact binary serialization via CBOR
//! - `all`: Enable all serialization formats
//!
//! ## Example
//!
//! ```rust
//! use dqmwatch_types::{Axis, Histogram1D, MonitorObject};
//!
//! let mut hist = Histogram1D::new("energy", "Deposited energy", Axis::new(100, 0.0, 50.0));
//! hist.fill(12.5);
//! hist.fill(13.0);
//! hist.fill(99.0); // overflow
//!
//! assert_eq!(hist.entries(), 3.0);
//! assert_eq!(hist.overflow(), 1.0);
//!
//! let object = MonitorObject::from(hist);
//! assert_eq!(object.class_name(), "H1F");
//! ```
//!
//! ## Schema Version
//!
//! Report documents carry a [`SchemaVersion`], currently **1.0**. Readers
//! accept any document with the same major number and ignore content added
//! by later minor revisions.

mod graph;
mod histogram;
mod object;
mod report;
mod scalar;
mod version;

pub use graph::*;
pub use histogram::*;
pub use object::*;
pub use report::*;
pub use scalar::*;
pub use version::*;

/// Major version of the report document layout. See [`SchemaVersion`].
pub const SCHEMA_VERSION: u32 = 1;

/// Minor version of the report document layout.
pub const SCHEMA_VERSION_MINOR: u32 = 0;
