//! Runtime abstraction layer for async operations
//!
//! Network work (HTTP tile fetches, the streaming connection) runs as spawned
//! tasks that report back over channels. The spawner is pluggable so the
//! delivery layer does not hard-wire a particular executor.

use futures::Future;
use std::pin::Pin;

/// A trait for spawning async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Spawn a future and return a handle to it, or `None` when no executor
    /// is reachable from the calling thread.
    fn spawn_boxed(
        &self,
        future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
    ) -> Option<Box<dyn AsyncHandle>>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    /// Check if the task is finished
    fn is_finished(&self) -> bool;

    /// Cancel the task
    fn cancel(&self);
}

/// Spawns on the global spawner.
pub fn spawn<F>(future: F) -> Option<Box<dyn AsyncHandle>>
where
    F: Future<Output = ()> + Send + 'static,
{
    match runtime() {
        Some(spawner) => spawner.spawn_boxed(Box::pin(future)),
        None => {
            log::error!("no async runtime configured; enable 'tokio-runtime' or call init_runtime");
            None
        }
    }
}

/// Default spawner implementations
pub mod spawners {
    use super::*;

    #[cfg(feature = "tokio-runtime")]
    pub mod tokio_impl {
        use super::*;
        use ::tokio::{runtime::Handle, task::JoinHandle};

        /// Spawns onto the tokio runtime the caller is running inside.
        pub struct TokioSpawner;

        impl AsyncSpawner for TokioSpawner {
            fn spawn_boxed(
                &self,
                future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
            ) -> Option<Box<dyn AsyncHandle>> {
                match Handle::try_current() {
                    Ok(handle) => Some(Box::new(TokioHandle(handle.spawn(future)))),
                    Err(e) => {
                        log::error!("cannot spawn task outside a tokio runtime: {}", e);
                        None
                    }
                }
            }
        }

        struct TokioHandle(JoinHandle<()>);

        impl AsyncHandle for TokioHandle {
            fn is_finished(&self) -> bool {
                self.0.is_finished()
            }

            fn cancel(&self) {
                self.0.abort();
            }
        }
    }
}

/// Global runtime instance
static RUNTIME: once_cell::sync::OnceCell<Box<dyn AsyncSpawner>> = once_cell::sync::OnceCell::new();

/// Initialize the runtime with a specific spawner. Only the first call wins.
pub fn init_runtime(spawner: Box<dyn AsyncSpawner>) {
    if RUNTIME.set(spawner).is_err() {
        log::debug!("runtime already initialized");
    }
}

/// Get the global runtime spawner
pub fn runtime() -> Option<&'static dyn AsyncSpawner> {
    #[cfg(feature = "tokio-runtime")]
    {
        Some(
            RUNTIME
                .get_or_init(|| Box::new(spawners::tokio_impl::TokioSpawner))
                .as_ref(),
        )
    }

    #[cfg(not(feature = "tokio-runtime"))]
    {
        RUNTIME.get().map(|spawner| spawner.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "tokio-runtime")]
    #[::tokio::test]
    async fn test_tokio_spawner() {
        let (tx, rx) = futures::channel::oneshot::channel();
        let handle = spawn(async move {
            ::tokio::time::sleep(::tokio::time::Duration::from_millis(10)).await;
            let _ = tx.send(());
        })
        .expect("spawned inside a runtime");

        rx.await.unwrap();
        ::tokio::time::sleep(::tokio::time::Duration::from_millis(5)).await;
        assert!(handle.is_finished());
    }

    #[cfg(feature = "tokio-runtime")]
    #[test]
    fn test_spawn_outside_runtime_is_refused() {
        assert!(spawn(async {}).is_none());
    }
}
