//! Root identity resolution for genedoc builds.
//!
//! Before any annotation source is merged, the canonical id space is fixed
//! from the build's root sources:
//!
//! 1. The primary root's ids are the current canonical ids. Together with the
//!    retired-id history they form a [`RetireMap`].
//! 2. A secondary root keyed by another id space is reconciled through an
//!    [`IdentityMap`] built from that space's cross-references.
//! 3. [`RootResolver`] inserts the root documents and returns the canonical
//!    id set every later merge step is checked against.
//!
//! Reference data comes from an [`IdCatalog`]: [`InMemoryIdCatalog`] or a
//! directory of TSV files ([`DirIdCatalog`]).

pub mod catalog;
pub mod error;
pub mod identity;
pub mod resolver;
pub mod retire;

pub use catalog::{DirIdCatalog, IdCatalog, InMemoryIdCatalog};
pub use error::{ResolveError, ResolveResult};
pub use identity::{IdentityMap, MappingPolicy};
pub use resolver::{
    Identity, Resolution, RootPlan, RootResolver, RootStats, SecondaryRoot, DEFAULT_ROOT_BATCH,
};
pub use retire::RetireMap;
