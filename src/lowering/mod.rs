//! Lowering pass.
//!
//! Turns the transient syntax tree into the typed, dialect-neutral IR:
//! expression lowering for predicates/selectors/values, operation lowering
//! for the chain itself, and the scope machinery both share.

pub mod expression;
pub mod operation;
pub mod scope;

pub use operation::{lower_source, LoweredQuery};
