//! Shared rendering-engine lifecycle: session traits, the Chromium driver,
//! and the manager that arbitrates concurrent use of the single instance.

pub mod chrome;
pub mod manager;

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::EngineSettings;

pub use chrome::ChromeLauncher;
pub use manager::EngineManager;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine launch failed: {message}")]
    Launch { message: String },
    #[error("navigation failed: {message}")]
    Navigation { message: String },
    #[error("screenshot capture failed: {message}")]
    Capture { message: String },
    #[error("engine shutdown failed: {message}")]
    Shutdown { message: String },
}

impl EngineError {
    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch {
            message: message.into(),
        }
    }

    pub fn navigation(message: impl Into<String>) -> Self {
        Self::Navigation {
            message: message.into(),
        }
    }

    pub fn capture(message: impl Into<String>) -> Self {
        Self::Capture {
            message: message.into(),
        }
    }

    pub fn shutdown(message: impl Into<String>) -> Self {
        Self::Shutdown {
            message: message.into(),
        }
    }
}

/// A live session against the headless rendering process.
///
/// Implementations are not required to tolerate concurrent calls; the
/// manager guarantees callers drive a session one at a time.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), EngineError>;

    /// Capture a full-viewport screenshot of the current page to `destination`.
    async fn capture_screenshot(&self, destination: &Path) -> Result<(), EngineError>;

    /// Tear the underlying process down. Must be idempotent.
    async fn quit(&self) -> Result<(), EngineError>;
}

/// Constructs engine sessions on demand. The manager launches at most one
/// session per lifetime of the shared instance; tests substitute scripted
/// fakes through this seam.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(
        &self,
        settings: &EngineSettings,
    ) -> Result<Arc<dyn RenderEngine>, EngineError>;
}
