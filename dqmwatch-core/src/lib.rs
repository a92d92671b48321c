//! # dqmwatch-core
//!
//! Monitor element storage and quality-test engine.
//!
//! Monitor elements (histograms, graphs, scalars) are booked into a
//! hierarchical [`Storage`], named quality tests are created from
//! configuration and attached to elements, and running them fills a
//! [`ReportStorage`] with one [`QualityReport`] per (element, test).
//!
//! ## Quick Start
//!
//! ```rust
//! use dqmwatch_core::{ConfigElement, MonitorElementManager, ReportStorage, Verdict};
//! use dqmwatch_types::{Axis, Histogram1D};
//!
//! let mut manager = MonitorElementManager::new();
//!
//! let mut hist = Histogram1D::new("energy", "", Axis::new(10, 0.0, 10.0));
//! hist.fill(4.5);
//! let reference = hist.clone();
//!
//! manager.book_object("/calo", hist.into()).unwrap();
//! manager
//!     .get_monitor_element_mut("/calo", "energy")
//!     .unwrap()
//!     .set_reference(reference.into());
//!
//! manager
//!     .create_quality_test(&ConfigElement::qtest("identical", "ExactRefCompareTest"))
//!     .unwrap();
//! manager.add_quality_test("/calo", "energy", "identical").unwrap();
//!
//! let mut reports = ReportStorage::new();
//! manager.run_quality_tests(&mut reports).unwrap();
//!
//! let report = reports.report("/calo", "energy", "identical").unwrap();
//! assert_eq!(report.verdict, Verdict::Success);
//! ```
//!
//! ## Features
//!
//! - `tokio` (default): the [`QualityService`] worker and report [`Output`]s

pub mod analysis;
pub mod config;
mod directory;
mod element;
mod error;
pub mod fitter;
pub mod formula;
mod manager;
mod object_types;
pub mod path;
pub mod qtest;
mod report;
pub mod stats;
mod storage;
mod store;

#[cfg(feature = "tokio")]
mod output;
#[cfg(feature = "tokio")]
mod service;

pub use config::{ConfigElement, QualityTestDefinition};
pub use directory::{Directory, DirectoryId, Named};
pub use element::{MonitorElement, ObjectHandle};
pub use error::{DqmError, Result, StatusCode};
pub use manager::MonitorElementManager;
pub use object_types::{Capabilities, ObjectTypeRegistry};
pub use path::DirPath;
pub use qtest::{FactoryRegistry, QualityTest, QualityTestFactory};
pub use report::{ReportDocument, ReportMeta, ReportStorage};
pub use storage::Storage;
pub use store::{JsonFileStore, MemoryStore, ObjectStore};

#[cfg(feature = "tokio")]
pub use output::Output;
#[cfg(feature = "tokio")]
pub use service::{QualityService, QualityServiceBuilder, ServiceHandle};

// Re-export types for convenience
pub use dqmwatch_types::{MonitorObject, QualityReport, Verdict};
