//! Deterministic assembly of the self-contained capture document.

use std::path::{Path, PathBuf};

use askama::Template;
use tracing::warn;

use crate::{config::RenderSettings, infra::assets};

use super::{highlight, types::RenderError};

/// Styling for the article container and the math containers produced by the
/// rewrite stage.
const PAGE_STYLE: &str = r#"
.markdown-body {
    box-sizing: border-box;
    min-width: 200px;
    max-width: 980px;
    margin: 0 auto;
    padding: 45px;
}

body { font-family: sans-serif; padding: 20px; }

@media (max-width: 767px) {
    .markdown-body {
        padding: 15px;
    }
}

.math-inline {
    display: inline !important;
    white-space: nowrap;
    vertical-align: middle;
}

.math-block {
    display: block;
    margin: 0.5em 0;
    text-align: center;
}

pre.syntax-highlight {
    padding: 12px;
    border-radius: 6px;
    overflow-x: auto;
}
"#;

/// Typesetter runtime configuration; the delimiters must match the ones the
/// rewrite stage re-adds around relocated math sources.
const TYPESETTER_CONFIG: &str = r#"
MathJax = {
    tex: {
        inlineMath: [
            ['$', '$']
        ],
        displayMath: [
            ['\\[', '\\]']
        ],
        tags: 'ams'
    }
};
"#;

const TYPESETTER_SRC: &str = "https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js";

#[derive(Template)]
#[template(path = "document.html")]
struct DocumentTemplate<'a> {
    theme_css_href: &'a str,
    page_style: &'a str,
    highlight_style: &'a str,
    typesetter_config: &'a str,
    typesetter_src: &'a str,
    body_background: &'a str,
    body: &'a str,
}

/// Merges theme CSS, highlight CSS, typesetter payload, and the converted
/// article body into one document through a fixed template.
pub(crate) struct DocumentBuilder {
    theme_css_href: String,
    highlight_style: String,
    background_image: Option<PathBuf>,
}

impl DocumentBuilder {
    pub(crate) fn new(settings: &RenderSettings) -> Result<Self, RenderError> {
        let theme_path = assets::materialize_theme_stylesheet(settings.theme)
            .map_err(|err| RenderError::document(err.to_string()))?;
        let highlight_style = highlight::highlight_stylesheet(settings.theme)?;

        Ok(Self {
            theme_css_href: theme_path.display().to_string(),
            highlight_style,
            background_image: settings.background_image.clone(),
        })
    }

    pub(crate) fn build(&self, body: &str) -> Result<String, RenderError> {
        let body_background = self.background_fragment();
        let template = DocumentTemplate {
            theme_css_href: &self.theme_css_href,
            page_style: PAGE_STYLE,
            highlight_style: &self.highlight_style,
            typesetter_config: TYPESETTER_CONFIG,
            typesetter_src: TYPESETTER_SRC,
            body_background: &body_background,
            body,
        };

        template
            .render()
            .map_err(|err| RenderError::document(format!("template rendering failed: {err}")))
    }

    /// Attribute fragment for the `<body>` tag. Empty when no background is
    /// configured or the configured file is missing; the latter is logged and
    /// the document degrades to the plain variant instead of failing.
    fn background_fragment(&self) -> String {
        let Some(configured) = self.background_image.as_ref() else {
            return String::new();
        };

        match resolve_background(configured) {
            Some(url) => format!(
                "background=\"{url}\" style=\"background-size:100% 100%; background-attachment: fixed;\""
            ),
            None => {
                warn!(
                    target = "application::render::document",
                    path = %configured.display(),
                    "background image not found; rendering without it"
                );
                String::new()
            }
        }
    }
}

fn resolve_background(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    let absolute = std::path::absolute(path).ok()?;
    Some(absolute.display().to_string().replace(' ', "%20"))
}
