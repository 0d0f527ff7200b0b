//! Asynchronous utilities for use with Tokio.

use std::panic;

/// Wrapper around [`tokio::task::spawn_blocking`] that propagates panics from
/// the background task.
///
/// Use this for CPU-heavy work like image decoding, so we don't stall the
/// executor.
pub async fn spawn_blocking_propagating_panics<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(err) => match err.try_into_panic() {
            Ok(payload) => panic::resume_unwind(payload),
            // We never abort blocking tasks, so this only happens at runtime
            // shutdown.
            Err(err) => panic!("blocking task failed to complete: {err}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_value() {
        assert_eq!(spawn_blocking_propagating_panics(|| 2 + 2).await, 4);
    }

    #[tokio::test]
    #[should_panic(expected = "boom")]
    async fn propagates_panics() {
        spawn_blocking_propagating_panics(|| panic!("boom")).await
    }
}
