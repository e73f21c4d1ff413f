//! Device model, category taxonomy, and capability specs.
//!
//! Provides:
//! - The [`Device`] data model and its command specs
//! - The closed category taxonomy and fail-open category filter
//! - The profile-keyed capability spec index
//! - Corpus document rendering with verb-synonym enrichment
//! - The external catalog adapter

pub mod catalog;
pub mod category;
pub mod enrich;
pub mod model;
pub mod spec;

// Re-export commonly used types
pub use catalog::{devices_from_catalog, CatalogSnapshot};
pub use category::{filter_by_category, map_type_to_category, CATEGORIES, CATEGORY_UNKNOWN};
pub use enrich::{capability_document, enrich_description, fallback_document};
pub use model::{CommandSpec, Device, ValueOption, ValueRange};
pub use spec::{CapabilityDoc, SpecIndex};
