//! Asset pipeline for assetflow
//!
//! Compiles named asset classes from a source tree into a single build root.
//!
//! # Overview
//!
//! The pipeline consists of:
//! - **Discovery**: Find source files using each class's glob pattern
//! - **Transformation**: Run each file through the class's ordered transforms
//! - **Output**: Atomically write results under the class destination
//!
//! # Example
//!
//! ```ignore
//! use assetflow::build::{BuildContext, Orchestrator};
//! use assetflow::config::load_config;
//!
//! let config = load_config(None)?;
//! let context = BuildContext::new(config, project_root);
//! let orchestrator = Orchestrator::from_context(context)?;
//!
//! let report = orchestrator.run_all()?;
//! println!("{}", report.summary());
//! ```

pub mod asset_class;
pub mod context;
pub mod discovery;
pub mod error;
pub mod incremental;
pub mod output;
pub mod pipeline;
pub mod result;
pub mod transform;

pub use asset_class::*;
pub use context::*;
pub use discovery::*;
pub use error::*;
pub use incremental::*;
pub use output::*;
pub use pipeline::*;
pub use result::*;
pub use transform::*;
