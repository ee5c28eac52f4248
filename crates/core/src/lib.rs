//! `stockroom-core` — domain building blocks for document numbering.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod number;

pub use error::{DomainError, DomainResult};
pub use id::DocumentId;
pub use number::{
    DEFAULT_SEPARATOR, DocumentNumber, MAX_PAD_WIDTH, MalformedNumber, NumberFormat, SequenceKey,
};
