//! Runtimes driving the partition manager and the crypto partition.
//!
//! - [`LocalRuntime`]: one thread. A call queues its message and then runs
//!   the service loop until the reply is in.
//! - [`SharedRuntime`]: tokio. The partition manager sits behind a mutex,
//!   the service loop is its own task, and clients await their replies.

mod local;
mod shared;

pub use local::LocalRuntime;
pub use shared::{BlockingClient, SharedClient, SharedRuntime};
use tessera_core::{Reply, SpmError};
use tessera_proto::ErrorCode;

/// Turn the reply to a CONNECT into the connect outcome.
fn connect_outcome(reply: &Reply) -> Result<(), SpmError> {
    if reply.is_success() {
        return Ok(());
    }
    let code = ErrorCode::from_code(reply.status).unwrap_or(ErrorCode::ConnectionRefused);
    Err(code.into())
}
