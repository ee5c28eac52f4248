//! Cache invalidation graph for the client data layer.
//!
//! After a mutation commits, every cached read keyed by the mutated entity's
//! own collection/item keys, plus the keys declared as its dependents, must be
//! treated as stale. The declaration is a single static table in [`graph`].

pub mod entity;
pub mod graph;
pub mod key;

pub use entity::{EntityKind, UnknownEntity};
pub use graph::{Dependent, InvalidationGraph};
pub use key::QueryKey;
