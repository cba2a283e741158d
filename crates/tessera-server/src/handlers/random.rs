//! Random generation.

use tessera_core::Environment;
use zeroize::Zeroizing;

use super::Call;
use crate::error::ServiceError;

/// Fill `out[0]` with random bytes from the environment. An empty or absent
/// output is a successful no-op.
pub(crate) fn generate<E: Environment>(call: &mut Call<'_, E>) -> Result<(), ServiceError> {
    let len = call.io.output_capacity(0);
    if len == 0 {
        return Ok(());
    }
    let mut buf = Zeroizing::new(vec![0u8; len]);
    call.env.random_bytes(&mut buf);
    call.io.write(0, &buf)
}
