use std::{
    fs,
    num::NonZeroU32,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use scatto::{
    application::{
        engine::{EngineError, EngineLauncher, EngineManager, RenderEngine},
        render::{DeliveryMode, RenderError, RenderPipeline, RenderRequest},
    },
    config::{
        EngineSettings, LogFormat, LoggingSettings, RenderSettings, Settings, ThemeVariant,
    },
};
use tracing::level_filters::LevelFilter;
use url::Url;

/// Engine fake that records every document it is pointed at and produces a
/// placeholder image on capture.
#[derive(Default)]
struct RecordingEngine {
    documents: Mutex<Vec<String>>,
}

impl RecordingEngine {
    fn last_document(&self) -> String {
        self.documents
            .lock()
            .expect("lock")
            .last()
            .cloned()
            .expect("engine navigated at least once")
    }
}

#[async_trait]
impl RenderEngine for RecordingEngine {
    async fn navigate(&self, url: &str) -> Result<(), EngineError> {
        let path = Url::parse(url)
            .map_err(|err| EngineError::navigation(err.to_string()))?
            .to_file_path()
            .map_err(|()| EngineError::navigation("not a file url"))?;
        let document = fs::read_to_string(path)
            .map_err(|err| EngineError::navigation(format!("document unreadable: {err}")))?;
        self.documents.lock().expect("lock").push(document);
        Ok(())
    }

    async fn capture_screenshot(&self, destination: &Path) -> Result<(), EngineError> {
        fs::write(destination, b"\x89PNG placeholder")
            .map_err(|err| EngineError::capture(format!("failed to write image: {err}")))
    }

    async fn quit(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

struct RecordingLauncher {
    engine: Arc<RecordingEngine>,
}

#[async_trait]
impl EngineLauncher for RecordingLauncher {
    async fn launch(
        &self,
        _settings: &EngineSettings,
    ) -> Result<Arc<dyn RenderEngine>, EngineError> {
        Ok(Arc::clone(&self.engine) as Arc<dyn RenderEngine>)
    }
}

fn test_settings() -> Settings {
    Settings {
        logging: LoggingSettings {
            level: LevelFilter::INFO,
            format: LogFormat::Compact,
        },
        engine: EngineSettings {
            binary_path: None,
            viewport_width: NonZeroU32::new(1200).expect("nonzero"),
            viewport_height: NonZeroU32::new(800).expect("nonzero"),
            settle_delay: Duration::ZERO,
        },
        render: RenderSettings {
            theme: ThemeVariant::Light,
            background_image: None,
            command_prefix: Some("md2img".to_string()),
            auto_render_min_chars: 100,
            artifact_grace: Duration::from_millis(20),
        },
    }
}

fn pipeline_with_engine() -> (Arc<RenderPipeline>, Arc<RecordingEngine>) {
    let engine = Arc::new(RecordingEngine::default());
    let launcher = Arc::new(RecordingLauncher {
        engine: Arc::clone(&engine),
    });
    let settings = test_settings();
    let manager = Arc::new(EngineManager::new(launcher, settings.engine.clone()));
    let pipeline =
        Arc::new(RenderPipeline::new(manager, &settings).expect("pipeline constructs"));
    (pipeline, engine)
}

#[tokio::test]
async fn heading_and_inline_math_end_up_in_the_document() {
    let (pipeline, engine) = pipeline_with_engine();

    let request = RenderRequest::new("md2img # Hi $x^2$");
    let image = pipeline.render(&request).await.expect("render succeeds");

    let document = engine.last_document();
    assert!(document.contains("<h1>"), "missing heading: {document}");
    assert!(
        document.contains("<span class=\"math-inline\">$x^2$</span>"),
        "missing inline math container: {document}"
    );
    assert!(document.contains("markdown-body"), "{document}");

    assert!(image.path().exists(), "image artifact must exist");
    image.discard().await;
}

#[tokio::test]
async fn unterminated_fence_renders_as_plain_text() {
    let (pipeline, engine) = pipeline_with_engine();

    let request = RenderRequest::new("intro\n```\nlooks like code but is not");
    let image = pipeline.render(&request).await.expect("render succeeds");

    let document = engine.last_document();
    assert!(
        !document.contains("<pre><code"),
        "unterminated fence must not become a code block: {document}"
    );
    assert!(
        document.contains("```"),
        "the fence characters should surface as plain text: {document}"
    );

    image.discard().await;
}

#[tokio::test]
async fn fenced_code_is_highlighted_in_the_final_document() {
    let (pipeline, engine) = pipeline_with_engine();

    let request = RenderRequest::new("```rust\nfn main() {}\n```");
    let image = pipeline.render(&request).await.expect("render succeeds");

    let document = engine.last_document();
    assert!(
        document.contains("syntax-lang-rust"),
        "code block should be re-rendered by the highlighter: {document}"
    );

    image.discard().await;
}

#[tokio::test]
async fn concurrent_renders_produce_distinct_valid_artifacts() {
    let (pipeline, _engine) = pipeline_with_engine();

    let first = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            pipeline
                .render(&RenderRequest::new("# First document"))
                .await
        })
    };
    let second = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            pipeline
                .render(&RenderRequest::new("# Second document"))
                .await
        })
    };

    let first = first
        .await
        .expect("task completes")
        .expect("first render succeeds");
    let second = second
        .await
        .expect("task completes")
        .expect("second render succeeds");

    assert_ne!(first.path(), second.path(), "artifacts must never be shared");
    assert!(first.path().exists());
    assert!(second.path().exists());

    first.discard().await;
    second.discard().await;
}

#[tokio::test]
async fn empty_input_is_a_typed_user_error() {
    let (pipeline, _engine) = pipeline_with_engine();

    let err = pipeline
        .render(&RenderRequest::new("md2img   "))
        .await
        .expect_err("nothing to render");
    assert!(matches!(err, RenderError::EmptyInput));
}

#[tokio::test]
async fn delivery_mode_travels_with_the_artifact() {
    let (pipeline, _engine) = pipeline_with_engine();

    let request = RenderRequest::new("# Pushed reply").with_delivery(DeliveryMode::Channel);
    let image = pipeline.render(&request).await.expect("render succeeds");

    assert_eq!(image.delivery(), DeliveryMode::Channel);
    image.discard().await;
}

#[tokio::test]
async fn scheduled_removal_deletes_the_artifact_after_the_grace_period() {
    let (pipeline, _engine) = pipeline_with_engine();

    let image = pipeline
        .render(&RenderRequest::new("# Soon to be deleted"))
        .await
        .expect("render succeeds");
    let path = image.path().to_path_buf();
    assert!(path.exists());

    image.schedule_removal(Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!path.exists(), "artifact must be gone after the grace period");
}

#[tokio::test]
async fn auto_render_threshold_follows_configuration() {
    let (pipeline, _engine) = pipeline_with_engine();

    assert!(!pipeline.meets_auto_render_threshold("short reply"));
    let long_text = "long ".repeat(50);
    assert!(pipeline.meets_auto_render_threshold(&long_text));
}
