//! # vaultmirror
//!
//! A verified multi-destination backup engine: it copies a source
//! folder into one to four destinations, computing a cryptographic
//! content hash for every file once at the source and checking it
//! again at every destination before the run is called complete.
//! Pre-existing files at a destination are quarantined, never deleted.
//!
//! ## Quick Start
//!
//! ```no_run
//! use vaultmirror::config::{EngineDefaults, Options, OutputFormat, RunConfig, TypeFilter};
//! use vaultmirror::core::Orchestrator;
//! use vaultmirror::safety::CancelSignal;
//! use std::path::PathBuf;
//! use uuid::Uuid;
//!
//! let config = RunConfig {
//!     source: PathBuf::from("/photos"),
//!     destinations: vec![PathBuf::from("/Volumes/BackupA")],
//!     filter: TypeFilter::AllFiles,
//!     custom_extensions: Vec::new(),
//!     options: Options {
//!         exclude_cache: true,
//!         skip_hidden: false,
//!         organization_name: None,
//!         session_id: Uuid::new_v4(),
//!     },
//!     defaults: EngineDefaults::default(),
//!     output_format: OutputFormat::Text,
//!     quiet: false,
//! };
//!
//! let orchestrator = Orchestrator::new(config, None);
//! let summary = orchestrator.run(CancelSignal::new()).unwrap();
//! assert!(summary.fully_succeeded() || summary.cancelled);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod fs;
pub mod hash;
pub mod manifest;
pub mod progress;
pub mod safety;

pub use config::RunConfig;
pub use core::{DestinationOutcome, Orchestrator, RunSummary};
pub use error::{BackupError, Result};
pub use manifest::Manifest;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenient re-exports for common usage
pub mod prelude {
    //! ```no_run
    //! use vaultmirror::prelude::*;
    //! ```

    pub use crate::config::{HashAlgorithm, OutputFormat, RunConfig, TypeFilter};
    pub use crate::core::{DestinationOutcome, Orchestrator, RunSummary};
    pub use crate::error::{BackupError, Result};
    pub use crate::events::{Event, EventLog, Session};
    pub use crate::manifest::{Manifest, ManifestBuilder};
    pub use crate::safety::CancelSignal;
}
