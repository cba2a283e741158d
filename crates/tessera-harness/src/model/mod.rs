//! Reference model for model-based testing.
//!
//! The model tracks what a client of the crypto service can observe: which
//! connections are open, which key ids exist and who owns them, what each
//! key permits, and which multi-part operations are active. It knows nothing
//! about cryptography.
//!
//! # Design Principles
//!
//! - Simplicity: every rule is a few lines over plain collections
//! - Behaviour not mechanism: limits and error codes, not handle tables
//! - Deterministic: same operations, same results

pub mod operation;
mod world;

pub use operation::{
    ClientIndex, KeyRef, Operation, OperationResult, SlotIndex, SmallData, SmallUsage, resolve_key,
};
pub use world::{ModelWorld, ObservableState, WorldConfig};
