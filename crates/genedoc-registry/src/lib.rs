//! Registry for genedoc builds.
//!
//! The registry holds what a build reads before it starts and what it
//! leaves behind:
//!
//! - **Source descriptors** name each parsed source, its id space, whether it
//!   is a root, and the field schema it contributes.
//! - **Build configs** list the sources of a build in merge order, its root
//!   sources and an optional species filter.
//! - **Run history** keeps the last few [`BuildRunRecord`]s per build so an
//!   interrupted run can be resumed and the latest successful generation
//!   can be found for sync.
//!
//! # Modules
//!
//! - [`traits`] -- The [`Registry`] trait
//! - [`memory`] -- [`InMemoryRegistry`] for tests
//! - [`file`] -- [`FileRegistry`], one JSON file replaced atomically
//!
//! [`BuildRunRecord`]: genedoc_types::BuildRunRecord

pub mod error;
pub mod file;
pub mod memory;
mod state;
pub mod traits;

pub use error::{RegistryError, RegistryResult};
pub use file::FileRegistry;
pub use memory::InMemoryRegistry;
pub use traits::{Registry, DEFAULT_HISTORY_LIMIT};
