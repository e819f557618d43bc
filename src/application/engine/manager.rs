//! Lifecycle manager for the shared rendering engine.

use std::{future::Future, sync::Arc};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::EngineSettings;

use super::{EngineError, EngineLauncher, RenderEngine};

enum EngineState {
    Empty,
    Live {
        engine: Arc<dyn RenderEngine>,
        ref_count: usize,
    },
}

/// Single point of truth for the shared engine's existence and for
/// exclusive-use scheduling.
///
/// The engine process is expensive to start and unsafe to drive from two
/// logical requests at once, so one instance is kept alive while any request
/// holds a reference and captures are serialized through a dedicated lock.
/// The instance is torn down when the last reference is released and
/// re-launched on the next acquisition.
pub struct EngineManager {
    launcher: Arc<dyn EngineLauncher>,
    settings: EngineSettings,
    state: Mutex<EngineState>,
    exclusive: Mutex<()>,
}

impl EngineManager {
    pub fn new(launcher: Arc<dyn EngineLauncher>, settings: EngineSettings) -> Self {
        Self {
            launcher,
            settings,
            state: Mutex::new(EngineState::Empty),
            exclusive: Mutex::new(()),
        }
    }

    /// Hand out the live engine, launching it first if no instance exists.
    ///
    /// The state lock is held across the launch so concurrent first callers
    /// wait for one construction instead of racing to create two processes.
    /// A failed launch leaves the state `Empty` and the reference count
    /// untouched, so a later caller retries from scratch.
    pub async fn acquire(&self) -> Result<Arc<dyn RenderEngine>, EngineError> {
        let mut state = self.state.lock().await;
        match &mut *state {
            EngineState::Live { engine, ref_count } => {
                *ref_count += 1;
                debug!(
                    target = "application::engine::manager",
                    ref_count = *ref_count,
                    "engine reference acquired"
                );
                Ok(Arc::clone(engine))
            }
            EngineState::Empty => {
                let engine = self.launcher.launch(&self.settings).await?;
                *state = EngineState::Live {
                    engine: Arc::clone(&engine),
                    ref_count: 1,
                };
                info!(
                    target = "application::engine::manager",
                    "engine launched on first acquisition"
                );
                Ok(engine)
            }
        }
    }

    /// Drop one reference; the last one out tears the engine down.
    ///
    /// Teardown errors are logged, never propagated, and the state is reset
    /// to `Empty` regardless so the next acquisition launches a fresh
    /// instance. A release without a matching acquisition is a no-op.
    pub async fn release(&self) {
        let mut state = self.state.lock().await;
        match &mut *state {
            EngineState::Empty => {}
            EngineState::Live { ref_count, .. } if *ref_count > 1 => {
                *ref_count -= 1;
                debug!(
                    target = "application::engine::manager",
                    ref_count = *ref_count,
                    "engine reference released"
                );
            }
            EngineState::Live { engine, .. } => {
                let engine = Arc::clone(engine);
                if let Err(err) = engine.quit().await {
                    warn!(
                        target = "application::engine::manager",
                        error = %err,
                        "engine teardown failed; a fresh instance will be launched on next use"
                    );
                }
                *state = EngineState::Empty;
                info!(
                    target = "application::engine::manager",
                    "engine closed after last release"
                );
            }
        }
    }

    /// Run `op` against the engine with the exclusive-use window held.
    ///
    /// Acquisition happens outside the window so queued callers keep the
    /// instance alive; `op` itself is serialized against every other
    /// exclusive-use caller. The reference is released on both the success
    /// and the error path before the result is returned.
    pub async fn with_exclusive_use<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        E: From<EngineError>,
        F: FnOnce(Arc<dyn RenderEngine>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let engine = self.acquire().await.map_err(E::from)?;
        let result = {
            let _window = self.exclusive.lock().await;
            op(engine).await
        };
        self.release().await;
        result
    }

    /// Force-destroy any live instance regardless of reference count.
    /// Intended for process teardown only.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let EngineState::Live { engine, .. } = &*state {
            let engine = Arc::clone(engine);
            if let Err(err) = engine.quit().await {
                warn!(
                    target = "application::engine::manager",
                    error = %err,
                    "engine teardown failed during shutdown"
                );
            }
        }
        *state = EngineState::Empty;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        num::NonZeroU32,
        path::Path,
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;

    use super::*;

    fn test_settings() -> EngineSettings {
        EngineSettings {
            binary_path: None,
            viewport_width: NonZeroU32::new(800).expect("nonzero"),
            viewport_height: NonZeroU32::new(600).expect("nonzero"),
            settle_delay: Duration::from_millis(0),
        }
    }

    #[derive(Default)]
    struct FakeEngine {
        quits: AtomicUsize,
        quit_fails: AtomicBool,
    }

    #[async_trait]
    impl RenderEngine for FakeEngine {
        async fn navigate(&self, _url: &str) -> Result<(), EngineError> {
            Ok(())
        }

        async fn capture_screenshot(&self, _destination: &Path) -> Result<(), EngineError> {
            Ok(())
        }

        async fn quit(&self) -> Result<(), EngineError> {
            self.quits.fetch_add(1, Ordering::SeqCst);
            if self.quit_fails.load(Ordering::SeqCst) {
                return Err(EngineError::shutdown("scripted teardown failure"));
            }
            Ok(())
        }
    }

    struct FakeLauncher {
        launches: AtomicUsize,
        failures_remaining: AtomicUsize,
        quit_fails: bool,
        last_engine: Mutex<Option<Arc<FakeEngine>>>,
    }

    impl FakeLauncher {
        fn new() -> Self {
            Self {
                launches: AtomicUsize::new(0),
                failures_remaining: AtomicUsize::new(0),
                quit_fails: false,
                last_engine: Mutex::new(None),
            }
        }

        fn failing_first(count: usize) -> Self {
            let launcher = Self::new();
            launcher.failures_remaining.store(count, Ordering::SeqCst);
            launcher
        }

        fn with_failing_quit() -> Self {
            let mut launcher = Self::new();
            launcher.quit_fails = true;
            launcher
        }
    }

    #[async_trait]
    impl EngineLauncher for FakeLauncher {
        async fn launch(
            &self,
            _settings: &EngineSettings,
        ) -> Result<Arc<dyn RenderEngine>, EngineError> {
            if self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                    remaining.checked_sub(1)
                })
                .is_ok()
            {
                return Err(EngineError::launch("scripted launch failure"));
            }

            self.launches.fetch_add(1, Ordering::SeqCst);
            let engine = Arc::new(FakeEngine::default());
            engine.quit_fails.store(self.quit_fails, Ordering::SeqCst);
            *self.last_engine.lock().await = Some(Arc::clone(&engine));
            Ok(engine)
        }
    }

    fn manager_with(launcher: Arc<FakeLauncher>) -> Arc<EngineManager> {
        Arc::new(EngineManager::new(launcher, test_settings()))
    }

    #[tokio::test]
    async fn concurrent_first_acquirers_share_one_launch() {
        let launcher = Arc::new(FakeLauncher::new());
        let manager = manager_with(Arc::clone(&launcher));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move { manager.acquire().await }));
        }
        for result in futures::future::join_all(handles).await {
            result.expect("task completes").expect("acquire succeeds");
        }

        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);

        for _ in 0..8 {
            manager.release().await;
        }
        let engine = launcher
            .last_engine
            .lock()
            .await
            .clone()
            .expect("engine launched");
        assert_eq!(engine.quits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn release_without_acquisition_is_a_noop() {
        let launcher = Arc::new(FakeLauncher::new());
        let manager = manager_with(Arc::clone(&launcher));

        manager.release().await;
        manager.release().await;

        manager.acquire().await.expect("acquire succeeds");
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
        manager.release().await;
    }

    #[tokio::test]
    async fn last_release_tears_down_and_next_acquire_relaunches() {
        let launcher = Arc::new(FakeLauncher::new());
        let manager = manager_with(Arc::clone(&launcher));

        manager.acquire().await.expect("first acquire");
        manager.acquire().await.expect("second acquire");
        manager.release().await;

        let engine = launcher
            .last_engine
            .lock()
            .await
            .clone()
            .expect("engine launched");
        assert_eq!(
            engine.quits.load(Ordering::SeqCst),
            0,
            "engine must stay alive while a reference is held"
        );

        manager.release().await;
        assert_eq!(engine.quits.load(Ordering::SeqCst), 1);

        manager.acquire().await.expect("relaunch");
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);
        manager.release().await;
    }

    #[tokio::test]
    async fn launch_failure_leaves_state_empty_for_retry() {
        let launcher = Arc::new(FakeLauncher::failing_first(1));
        let manager = manager_with(Arc::clone(&launcher));

        let err = match manager.acquire().await {
            Ok(_) => panic!("scripted failure"),
            Err(err) => err,
        };
        assert!(matches!(err, EngineError::Launch { .. }));

        manager.acquire().await.expect("retry succeeds");
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
        manager.release().await;
    }

    #[tokio::test]
    async fn failed_teardown_still_resets_state() {
        let launcher = Arc::new(FakeLauncher::with_failing_quit());
        let manager = manager_with(Arc::clone(&launcher));

        manager.acquire().await.expect("acquire");
        manager.release().await;

        manager.acquire().await.expect("acquire after failed teardown");
        assert_eq!(
            launcher.launches.load(Ordering::SeqCst),
            2,
            "a fresh instance must be launched after a failed teardown"
        );
        manager.release().await;
    }

    #[tokio::test]
    async fn exclusive_use_windows_never_overlap() {
        let launcher = Arc::new(FakeLauncher::new());
        let manager = manager_with(Arc::clone(&launcher));
        let in_window = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let manager = Arc::clone(&manager);
            let in_window = Arc::clone(&in_window);
            handles.push(tokio::spawn(async move {
                manager
                    .with_exclusive_use::<_, EngineError, _, _>(|_engine| {
                        let in_window = Arc::clone(&in_window);
                        async move {
                            let active = in_window.fetch_add(1, Ordering::SeqCst) + 1;
                            assert_eq!(active, 1, "two callers inside the exclusive window");
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            in_window.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        }
                    })
                    .await
            }));
        }
        for result in futures::future::join_all(handles).await {
            result
                .expect("task completes")
                .expect("exclusive use succeeds");
        }

        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
        let engine = launcher
            .last_engine
            .lock()
            .await
            .clone()
            .expect("engine launched");
        assert_eq!(
            engine.quits.load(Ordering::SeqCst),
            1,
            "engine must close once all exclusive users are done"
        );
    }

    #[tokio::test]
    async fn exclusive_use_releases_on_error() {
        let launcher = Arc::new(FakeLauncher::new());
        let manager = manager_with(Arc::clone(&launcher));

        let result: Result<(), EngineError> = manager
            .with_exclusive_use(|_engine| async { Err(EngineError::capture("scripted")) })
            .await;
        assert!(result.is_err());

        let engine = launcher
            .last_engine
            .lock()
            .await
            .clone()
            .expect("engine launched");
        assert_eq!(
            engine.quits.load(Ordering::SeqCst),
            1,
            "reference must be released on the error path"
        );
    }

    #[tokio::test]
    async fn shutdown_forces_teardown_despite_held_references() {
        let launcher = Arc::new(FakeLauncher::new());
        let manager = manager_with(Arc::clone(&launcher));

        manager.acquire().await.expect("acquire");
        manager.shutdown().await;

        let engine = launcher
            .last_engine
            .lock()
            .await
            .clone()
            .expect("engine launched");
        assert_eq!(engine.quits.load(Ordering::SeqCst), 1);

        manager.acquire().await.expect("acquire after shutdown");
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);
        manager.release().await;
    }
}
