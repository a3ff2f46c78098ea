//! Named worker threads with a bounded join.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::CompositorError;

pub(crate) fn spawn_worker<F>(name: &'static str, body: F) -> Result<JoinHandle<()>, CompositorError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|source| CompositorError::ThreadSpawn { name, source })
}

/// Waits up to `timeout` for `handle` to finish. A worker that overruns is
/// detached and left to exit on its own. Returns whether the join happened.
pub(crate) fn join_with_timeout(handle: JoinHandle<()>, name: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!(thread = name, ?timeout, "Worker did not stop in time, detaching it");
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    if handle.join().is_err() {
        tracing::error!(thread = name, "Worker thread panicked");
    }
    true
}
