//! Collaborator contracts consumed by the orchestrator
//!
//! - **catalog**: item name, price and availability at placement time
//! - **profile**: notification preferences, contact points, referral linkage

pub mod catalog;
pub mod profile;

pub use catalog::{Catalog, CatalogItem, InMemoryCatalog};
pub use profile::{InMemoryProfileStore, ProfileStore, TimeoutProfileStore};
