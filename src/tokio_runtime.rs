//! Global Tokio runtime for the exchange call
//!
//! The conversation runs on a plain thread, but reqwest needs a Tokio runtime.
//! This module provides a lazily initialized global runtime for it.

use std::future::Future;
use std::sync::OnceLock;
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

static TOKIO_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Initialize the global Tokio runtime. Call this during startup.
pub fn init() -> Result<(), String> {
    if TOKIO_RUNTIME.get().is_some() {
        return Ok(());
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("talkback-exchange")
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to create Tokio runtime: {}", e))?;
    // Losing a race to another initializer is fine; theirs is kept
    let _ = TOKIO_RUNTIME.set(runtime);
    Ok(())
}

/// Get the global Tokio runtime handle
pub fn handle() -> Result<Handle, String> {
    TOKIO_RUNTIME
        .get()
        .map(|runtime| runtime.handle().clone())
        .ok_or_else(|| "Tokio runtime not initialized - call tokio_runtime::init() first".to_string())
}

/// Spawn a future on the global runtime
pub fn spawn<F>(future: F) -> Result<JoinHandle<F::Output>, String>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    Ok(handle()?.spawn(future))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_after_init() {
        init().unwrap();
        init().unwrap();
        let task = spawn(async { 21 * 2 }).unwrap();
        assert_eq!(handle().unwrap().block_on(task).unwrap(), 42);
    }
}
