//! Deterministic test harness for the tessera crypto service.
//!
//! [`SimEnv`] is a seeded `Environment`: keys, IVs, nonces and connection
//! tokens replay exactly for a given seed.
//!
//! # Model-Based Testing
//!
//! The `model` module is a reference implementation of the service's
//! observable behaviour: key ownership and policy, volatile id allocation,
//! slot limits, and the multi-part operation lifecycle. Operations are
//! applied to both the model and the real service, and their results and
//! observable states are compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod sim_env;

pub use model::{
    ClientIndex, KeyRef, ModelWorld, ObservableState, Operation, OperationResult, SlotIndex, SmallData,
    SmallUsage, WorldConfig,
};
pub use sim_env::SimEnv;
