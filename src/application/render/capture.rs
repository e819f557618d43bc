//! Document capture through an acquired engine session.

use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use metrics::histogram;
use tempfile::Builder as TempFileBuilder;
use tracing::debug;
use url::Url;

use crate::application::engine::RenderEngine;

use super::types::RenderError;

/// Write `document` to a fresh temporary file, drive the engine through
/// navigate, settle, and screenshot, and return the image path. The document
/// file is removed on every exit path; the image belongs to the caller.
pub(crate) async fn capture_document(
    engine: &Arc<dyn RenderEngine>,
    document: &str,
    settle_delay: Duration,
) -> Result<PathBuf, RenderError> {
    let started_at = Instant::now();

    let mut document_file = TempFileBuilder::new()
        .prefix("scatto-")
        .suffix(".html")
        .tempfile()
        .map_err(|err| RenderError::capture(format!("failed to create document file: {err}")))?;
    document_file
        .write_all(document.as_bytes())
        .and_then(|()| document_file.flush())
        .map_err(|err| RenderError::capture(format!("failed to write document file: {err}")))?;

    let document_path = document_file.path().to_path_buf();
    let image_path = document_path.with_extension("png");
    let uri = Url::from_file_path(&document_path).map_err(|()| {
        RenderError::capture(format!(
            "document path is not absolute: {}",
            document_path.display()
        ))
    })?;

    debug!(
        target = "application::render::capture",
        document = %document_path.display(),
        "capturing document"
    );

    // The guard held in `document_file` deletes the document on success,
    // failure, and unwind alike; only the image survives this function.
    let result = drive_engine(engine, uri.as_str(), &image_path, settle_delay).await;
    drop(document_file);

    if result.is_err() {
        // A failed run must not leave a partial image behind.
        let _ = std::fs::remove_file(&image_path);
    }

    histogram!("scatto_capture_ms").record(started_at.elapsed().as_millis() as f64);
    result.map(|()| image_path)
}

async fn drive_engine(
    engine: &Arc<dyn RenderEngine>,
    uri: &str,
    image_path: &Path,
    settle_delay: Duration,
) -> Result<(), RenderError> {
    engine.navigate(uri).await?;

    // Client-side typesetting exposes no completion signal over the wire, so
    // a fixed settle delay stands in for one. Configured, not hardcoded.
    tokio::time::sleep(settle_delay).await;

    engine.capture_screenshot(image_path).await?;
    Ok(())
}
