//! Process-wide shared browser for the facet pipeline.
//!
//! The browser is launched on the first `acquire` and reused until
//! `shutdown`. Each request still opens and closes its own page.

use crate::renderer::{Renderer, RendererFactory};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Lazily-initialised shared renderer.
pub struct BrowserPool {
    factory: Arc<dyn RendererFactory>,
    shared: Mutex<Option<Arc<dyn Renderer>>>,
}

impl BrowserPool {
    pub fn new(factory: Arc<dyn RendererFactory>) -> Self {
        Self {
            factory,
            shared: Mutex::new(None),
        }
    }

    /// The shared renderer, launching it if needed.
    ///
    /// Concurrent first callers wait on the same launch; a failed launch
    /// leaves the pool empty so the next call retries.
    pub async fn acquire(&self) -> Result<Arc<dyn Renderer>> {
        let mut shared = self.shared.lock().await;
        if let Some(renderer) = shared.as_ref() {
            return Ok(Arc::clone(renderer));
        }
        info!("launching shared browser");
        let renderer = self.factory.launch().await?;
        *shared = Some(Arc::clone(&renderer));
        Ok(renderer)
    }

    /// Whether a shared renderer is currently running.
    pub async fn is_initialized(&self) -> bool {
        self.shared.lock().await.is_some()
    }

    /// Shut the shared renderer down. A later `acquire` launches a new one.
    pub async fn shutdown(&self) {
        let Some(renderer) = self.shared.lock().await.take() else {
            return;
        };
        info!(
            "shutting down shared browser ({} open pages)",
            renderer.active_contexts()
        );
        if let Err(e) = renderer.shutdown().await {
            warn!("shared browser shutdown failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::fixture::{FixtureLauncher, FixtureRenderer};

    fn pool() -> (BrowserPool, FixtureLauncher) {
        let launcher = FixtureLauncher::new(FixtureRenderer::new());
        (BrowserPool::new(Arc::new(launcher.clone())), launcher)
    }

    #[tokio::test]
    async fn test_lazy_launch_and_reuse() {
        let (pool, launcher) = pool();
        assert!(!pool.is_initialized().await);
        assert_eq!(launcher.launches(), 0);

        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(launcher.launches(), 1);
        assert!(pool.is_initialized().await);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_launches_once() {
        let (pool, launcher) = pool();
        let pool = Arc::new(pool);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_releases_and_relaunches() {
        let (pool, launcher) = pool();
        pool.acquire().await.unwrap();
        pool.shutdown().await;
        assert!(!pool.is_initialized().await);
        assert_eq!(launcher.renderer().shutdowns(), 1);

        pool.shutdown().await;
        assert_eq!(launcher.renderer().shutdowns(), 1);

        pool.acquire().await.unwrap();
        assert_eq!(launcher.launches(), 2);
    }
}
