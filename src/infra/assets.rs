//! Embedded theme stylesheets, materialized to disk for the capture document.

use std::{fs, path::PathBuf};

use include_dir::{Dir, include_dir};

use crate::config::ThemeVariant;

use super::error::InfraError;

static THEME_DIR: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/assets/themes");

const MATERIALIZED_DIR: &str = "scatto-themes";

/// Write the embedded stylesheet for `theme` into the platform temp directory
/// and return its absolute path. The rendered document references the
/// stylesheet by path, so it has to exist as a real file next to the capture.
/// Re-materializing is cheap and keeps the file current across upgrades.
pub fn materialize_theme_stylesheet(theme: ThemeVariant) -> Result<PathBuf, InfraError> {
    let file_name = theme.stylesheet_name();
    let contents = THEME_DIR
        .get_file(file_name)
        .ok_or_else(|| {
            InfraError::configuration(format!("embedded stylesheet `{file_name}` is missing"))
        })?
        .contents();

    let dir = std::env::temp_dir().join(MATERIALIZED_DIR);
    fs::create_dir_all(&dir)?;
    let path = dir.join(file_name);
    fs::write(&path, contents)?;
    Ok(path)
}
