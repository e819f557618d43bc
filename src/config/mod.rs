//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "scatto";
const DEFAULT_VIEWPORT_WIDTH: u32 = 1200;
const DEFAULT_VIEWPORT_HEIGHT: u32 = 800;
const DEFAULT_SETTLE_DELAY_MS: u64 = 2000;
const DEFAULT_AUTO_RENDER_MIN_CHARS: usize = 100;
const DEFAULT_ARTIFACT_GRACE_SECS: u64 = 10;

/// Command-line arguments for the Scatto binary.
#[derive(Debug, Parser)]
#[command(name = "scatto", version, about = "Markdown-to-image capture tool")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SCATTO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render Markdown input into a raster image.
    Render(Box<RenderArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderArgs {
    /// Read Markdown from this file instead of standard input.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub input: Option<PathBuf>,

    /// Write the captured image to this path instead of printing the
    /// temporary artifact location.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Only rasterize inputs longer than the configured threshold; shorter
    /// inputs are echoed back as plain text.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub auto: bool,

    #[command(flatten)]
    pub overrides: RenderOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the rendering-engine executable path.
    #[arg(long = "engine-binary-path", value_name = "PATH")]
    pub engine_binary_path: Option<PathBuf>,

    /// Override the capture viewport width in pixels.
    #[arg(long = "engine-viewport-width", value_name = "PIXELS")]
    pub viewport_width: Option<u32>,

    /// Override the capture viewport height in pixels.
    #[arg(long = "engine-viewport-height", value_name = "PIXELS")]
    pub viewport_height: Option<u32>,

    /// Override the post-navigation settle delay in milliseconds.
    #[arg(long = "engine-settle-delay-ms", value_name = "MILLIS")]
    pub settle_delay_ms: Option<u64>,

    /// Override the document theme (light|dark).
    #[arg(long = "render-theme", value_name = "THEME")]
    pub theme: Option<String>,

    /// Override the page background image.
    #[arg(long = "render-background-image", value_name = "PATH")]
    pub background_image: Option<PathBuf>,

    /// Override the command prefix stripped from incoming text.
    #[arg(long = "render-command-prefix", value_name = "TOKEN")]
    pub command_prefix: Option<String>,

    /// Override the auto-render length threshold.
    #[arg(long = "render-auto-min-chars", value_name = "CHARS")]
    pub auto_render_min_chars: Option<usize>,

    /// Override the grace period before delivered artifacts are deleted.
    #[arg(long = "render-artifact-grace-seconds", value_name = "SECONDS")]
    pub artifact_grace_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub engine: EngineSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Immutable snapshot handed to the engine launcher. Never mutated mid-request.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Explicit engine executable; `None` lets the driver locate an installed one.
    pub binary_path: Option<PathBuf>,
    pub viewport_width: NonZeroU32,
    pub viewport_height: NonZeroU32,
    /// Wait inserted after navigation so client-side typesetting can finish.
    pub settle_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub theme: ThemeVariant,
    pub background_image: Option<PathBuf>,
    /// Leading token stripped from incoming text, e.g. a chat trigger word.
    pub command_prefix: Option<String>,
    /// Inputs at or below this length are not worth rasterizing in auto mode.
    pub auto_render_min_chars: usize,
    /// How long delivered artifacts stay on disk before scheduled deletion.
    pub artifact_grace: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeVariant {
    Light,
    Dark,
}

impl ThemeVariant {
    pub fn stylesheet_name(self) -> &'static str {
        match self {
            ThemeVariant::Light => "github-markdown-light.css",
            ThemeVariant::Dark => "github-markdown-dark.css",
        }
    }

    /// Syntect theme paired with each document theme.
    pub fn highlight_theme_name(self) -> &'static str {
        match self {
            ThemeVariant::Light => "InspiredGitHub",
            ThemeVariant::Dark => "base16-ocean.dark",
        }
    }
}

impl FromStr for ThemeVariant {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(ThemeVariant::Light),
            "dark" => Ok(ThemeVariant::Dark),
            other => Err(format!("unknown theme `{other}`, expected light or dark")),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SCATTO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Render(args)) => raw.apply_render_overrides(&args.overrides),
        None => raw.apply_render_overrides(&RenderOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Parse CLI arguments and resolve settings in one step.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    engine: RawEngineSettings,
    render: RawRenderSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEngineSettings {
    binary_path: Option<PathBuf>,
    viewport_width: Option<u32>,
    viewport_height: Option<u32>,
    settle_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    theme: Option<String>,
    background_image: Option<PathBuf>,
    command_prefix: Option<String>,
    auto_render_min_chars: Option<usize>,
    artifact_grace_seconds: Option<u64>,
}

impl RawSettings {
    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(path) = overrides.engine_binary_path.as_ref() {
            self.engine.binary_path = Some(path.clone());
        }
        if let Some(width) = overrides.viewport_width {
            self.engine.viewport_width = Some(width);
        }
        if let Some(height) = overrides.viewport_height {
            self.engine.viewport_height = Some(height);
        }
        if let Some(millis) = overrides.settle_delay_ms {
            self.engine.settle_delay_ms = Some(millis);
        }
        if let Some(theme) = overrides.theme.as_ref() {
            self.render.theme = Some(theme.clone());
        }
        if let Some(path) = overrides.background_image.as_ref() {
            self.render.background_image = Some(path.clone());
        }
        if let Some(prefix) = overrides.command_prefix.as_ref() {
            self.render.command_prefix = Some(prefix.clone());
        }
        if let Some(chars) = overrides.auto_render_min_chars {
            self.render.auto_render_min_chars = Some(chars);
        }
        if let Some(seconds) = overrides.artifact_grace_seconds {
            self.render.artifact_grace_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            engine,
            render,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let engine = build_engine_settings(engine)?;
        let render = build_render_settings(render)?;

        Ok(Self {
            logging,
            engine,
            render,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_engine_settings(engine: RawEngineSettings) -> Result<EngineSettings, LoadError> {
    let binary_path = engine.binary_path.filter(|path| !path.as_os_str().is_empty());

    let width = engine.viewport_width.unwrap_or(DEFAULT_VIEWPORT_WIDTH);
    let viewport_width = NonZeroU32::new(width)
        .ok_or_else(|| LoadError::invalid("engine.viewport_width", "must be greater than zero"))?;

    let height = engine.viewport_height.unwrap_or(DEFAULT_VIEWPORT_HEIGHT);
    let viewport_height = NonZeroU32::new(height)
        .ok_or_else(|| LoadError::invalid("engine.viewport_height", "must be greater than zero"))?;

    let settle_delay =
        Duration::from_millis(engine.settle_delay_ms.unwrap_or(DEFAULT_SETTLE_DELAY_MS));

    Ok(EngineSettings {
        binary_path,
        viewport_width,
        viewport_height,
        settle_delay,
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let theme = match render.theme {
        Some(value) => ThemeVariant::from_str(&value)
            .map_err(|reason| LoadError::invalid("render.theme", reason))?,
        None => ThemeVariant::Light,
    };

    let background_image = render
        .background_image
        .filter(|path| !path.as_os_str().is_empty());

    let command_prefix = render.command_prefix.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let auto_render_min_chars = render
        .auto_render_min_chars
        .unwrap_or(DEFAULT_AUTO_RENDER_MIN_CHARS);

    let artifact_grace = Duration::from_secs(
        render
            .artifact_grace_seconds
            .unwrap_or(DEFAULT_ARTIFACT_GRACE_SECS),
    );

    Ok(RenderSettings {
        theme,
        background_image,
        command_prefix,
        auto_render_min_chars,
        artifact_grace,
    })
}
