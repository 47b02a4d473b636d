use tokio_util::sync::CancellationToken;

/// A run stopped at a cooperative cancellation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("run cancelled")]
pub struct Cancelled;

/// Bail out between units of work (documents, price batches) once shutdown
/// has been requested.
pub fn checkpoint(token: &CancellationToken) -> Result<(), Cancelled> {
    if token.is_cancelled() {
        Err(Cancelled)
    } else {
        Ok(())
    }
}
