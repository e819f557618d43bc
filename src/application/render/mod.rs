//! Multi-stage render pipeline: normalize, convert, rewrite, assemble, capture.

mod capture;
mod document;
mod highlight;
mod markup;
mod preprocess;
mod rewrite;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{info, warn};

use crate::application::engine::EngineManager;
use crate::config::Settings;

use document::DocumentBuilder;
use markup::{ComrakConverter, MarkupConverter};

pub use types::{DeliveryMode, RenderError, RenderOutcome, RenderRequest, RenderedImage};

/// Sequences one render request end to end and returns the image artifact or
/// a single typed failure. Nothing is partially delivered: a failed run
/// leaves no image behind and the capture stage always cleans up its
/// transient document.
pub struct RenderPipeline {
    manager: Arc<EngineManager>,
    converter: ComrakConverter,
    documents: DocumentBuilder,
    command_prefix: Option<String>,
    settle_delay: Duration,
    auto_render_min_chars: usize,
}

impl RenderPipeline {
    pub fn new(manager: Arc<EngineManager>, settings: &Settings) -> Result<Self, RenderError> {
        Ok(Self {
            manager,
            converter: ComrakConverter::new(),
            documents: DocumentBuilder::new(&settings.render)?,
            command_prefix: settings.render.command_prefix.clone(),
            settle_delay: settings.engine.settle_delay,
            auto_render_min_chars: settings.render.auto_render_min_chars,
        })
    }

    /// Whether `text` is long enough to be worth rasterizing when the caller
    /// converts replies automatically. A threshold of zero disables
    /// auto-rendering altogether.
    pub fn meets_auto_render_threshold(&self, text: &str) -> bool {
        self.auto_render_min_chars > 0 && text.chars().count() > self.auto_render_min_chars
    }

    pub async fn render(&self, request: &RenderRequest) -> RenderOutcome {
        counter!("scatto_render_total").increment(1);
        let outcome = self.render_inner(request).await;
        if let Err(err) = &outcome {
            counter!("scatto_render_failure_total").increment(1);
            warn!(
                target = "application::render",
                error = %err,
                "render request failed"
            );
        }
        outcome
    }

    async fn render_inner(&self, request: &RenderRequest) -> RenderOutcome {
        let text = preprocess::prepare(&request.text, self.command_prefix.as_deref());
        if text.trim().is_empty() {
            return Err(RenderError::EmptyInput);
        }

        let html = self.converter.convert(&text)?;
        let html = rewrite::relocate_math_spans(&html);
        let html = rewrite::rehighlight_code_spans(&html);
        let document = self.documents.build(&html)?;

        let settle_delay = self.settle_delay;
        let image_path = self
            .manager
            .with_exclusive_use::<_, RenderError, _, _>(move |engine| async move {
                capture::capture_document(&engine, &document, settle_delay).await
            })
            .await?;

        info!(
            target = "application::render",
            delivery = ?request.delivery,
            image = %image_path.display(),
            "render complete"
        );
        Ok(RenderedImage::new(image_path, request.delivery))
    }
}
