//! Tessera crypto service.
//!
//! The crypto partition sits on top of the `tessera-core` partition manager
//! and serves the operations named by `tessera-proto` request descriptors.
//!
//! ## Architecture
//!
//! ```text
//! tessera-server
//!   ├─ CryptoPartition        (service loop, connection tokens)
//!   │    ├─ dispatch          (request → handler, multi-part bookkeeping)
//!   │    ├─ KeyStore          (volatile slots + KeyStorage for persistent keys)
//!   │    └─ OperationContextStore
//!   ├─ LocalRuntime           (single thread, cooperative)
//!   ├─ SharedRuntime          (tokio, mutex-guarded partition manager)
//!   └─ SystemEnv              (OS randomness)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
mod dispatch;
pub mod error;
mod handlers;
mod io;
pub mod key_store;
pub mod partition;
pub mod runtime;
pub mod selftest;
mod system_env;

pub use config::{CRYPTO_SID, CRYPTO_VERSION, ServiceConfig};
pub use context::{OperationContextStore, OperationKind};
pub use error::{ServerError, ServiceError};
pub use key_store::{KeyStorage, KeyStore, MemoryStorage, StorageError};
pub use partition::CryptoPartition;
pub use runtime::{BlockingClient, LocalRuntime, SharedClient, SharedRuntime};
pub use selftest::{SelfTestError, SelfTestReport, run_selftest};
pub use system_env::SystemEnv;
