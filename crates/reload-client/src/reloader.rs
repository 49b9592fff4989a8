use std::sync::Arc;

use tokio::task::JoinError;

/// Capability supplied by the embedding application and invoked on every
/// reload notification with the watcher's hint.
///
/// Runs on a blocking worker; the next inbound message is not processed
/// until it returns.
pub trait Reloader: Send + Sync + 'static {
    fn reload(&self, hint: &str);
}

impl<F> Reloader for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn reload(&self, hint: &str) {
        self(hint)
    }
}

/// Run the reloader off the async workers and wait for it to finish.
///
/// A panicking reloader surfaces as a `JoinError` instead of unwinding into
/// the caller.
pub(crate) async fn invoke(reloader: &Arc<dyn Reloader>, hint: String) -> Result<(), JoinError> {
    let reloader = Arc::clone(reloader);
    tokio::task::spawn_blocking(move || reloader.reload(&hint)).await
}
