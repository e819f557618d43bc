use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::application::engine::EngineError;

/// Selects how the caller hands the artifact to its audience.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// The artifact is returned for inline display to the requester.
    Inline,
    /// The artifact is pushed to an output channel without a request waiting
    /// on it, e.g. an automatically converted chat reply.
    Channel,
}

/// Rendering request passed into the pipeline. Created per incoming call and
/// discarded once the artifact is returned.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub text: String,
    pub delivery: DeliveryMode,
}

impl RenderRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            delivery: DeliveryMode::Inline,
        }
    }

    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }
}

/// Captured artifact. Ownership of the file transfers to the caller, who
/// either persists it somewhere durable or schedules its removal after
/// delivery.
#[derive(Debug)]
pub struct RenderedImage {
    path: PathBuf,
    delivery: DeliveryMode,
}

impl RenderedImage {
    pub(crate) fn new(path: PathBuf, delivery: DeliveryMode) -> Self {
        Self { path, delivery }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn delivery(&self) -> DeliveryMode {
        self.delivery
    }

    /// Copy the artifact to `destination`.
    pub async fn persist(&self, destination: &Path) -> Result<(), RenderError> {
        tokio::fs::copy(&self.path, destination)
            .await
            .map(|_| ())
            .map_err(|err| {
                RenderError::artifact(format!(
                    "failed to copy image to {}: {err}",
                    destination.display()
                ))
            })
    }

    /// Delete the artifact once the grace period elapses. Detached; deletion
    /// failures are logged and swallowed since the file lives in the temp
    /// directory anyway.
    pub fn schedule_removal(self, grace: Duration) {
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => debug!(
                    target = "application::render",
                    path = %self.path.display(),
                    "delivered artifact removed"
                ),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(
                    target = "application::render",
                    path = %self.path.display(),
                    error = %err,
                    "failed to remove delivered artifact"
                ),
            }
        });
    }

    /// Delete the artifact immediately.
    pub async fn discard(self) {
        if let Err(err) = tokio::fs::remove_file(&self.path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    target = "application::render",
                    path = %self.path.display(),
                    error = %err,
                    "failed to remove artifact"
                );
            }
        }
    }
}

/// Result of one render request.
pub type RenderOutcome = Result<RenderedImage, RenderError>;

/// Structured errors surfaced by the render pipeline. These map directly to
/// short user-facing failure messages.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("nothing to render: input is empty")]
    EmptyInput,
    #[error("markdown conversion failed: {message}")]
    Markup { message: String },
    #[error("document assembly failed: {message}")]
    Document { message: String },
    #[error("rendering engine unavailable: {message}")]
    EngineUnavailable { message: String },
    #[error("navigation or capture failed: {message}")]
    Capture { message: String },
    #[error("artifact handling failed: {message}")]
    Artifact { message: String },
}

impl RenderError {
    pub fn markup(message: impl Into<String>) -> Self {
        Self::Markup {
            message: message.into(),
        }
    }

    pub fn document(message: impl Into<String>) -> Self {
        Self::Document {
            message: message.into(),
        }
    }

    pub fn capture(message: impl Into<String>) -> Self {
        Self::Capture {
            message: message.into(),
        }
    }

    pub fn artifact(message: impl Into<String>) -> Self {
        Self::Artifact {
            message: message.into(),
        }
    }
}

impl From<EngineError> for RenderError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Launch { message } => RenderError::EngineUnavailable { message },
            EngineError::Navigation { message }
            | EngineError::Capture { message }
            | EngineError::Shutdown { message } => RenderError::Capture { message },
        }
    }
}
