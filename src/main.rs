use std::{io::Read, path::Path, process, sync::Arc};

use scatto::{
    application::{
        engine::{ChromeLauncher, EngineManager},
        error::AppError,
        render::{DeliveryMode, RenderPipeline, RenderRequest},
    },
    config,
    infra::telemetry,
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let command = cli_args
        .command
        .unwrap_or_else(|| config::Command::Render(Box::default()));

    match command {
        config::Command::Render(args) => run_render(settings, *args).await,
    }
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let text = read_input(args.input.as_deref()).await?;

    let manager = Arc::new(EngineManager::new(
        Arc::new(ChromeLauncher),
        settings.engine.clone(),
    ));
    let pipeline = RenderPipeline::new(Arc::clone(&manager), &settings)?;

    if args.auto && !pipeline.meets_auto_render_threshold(&text) {
        // Short inputs read better as text; pass them through untouched.
        print!("{text}");
        return Ok(());
    }

    let delivery = if args.auto {
        DeliveryMode::Channel
    } else {
        DeliveryMode::Inline
    };
    let request = RenderRequest::new(text).with_delivery(delivery);

    let result = pipeline.render(&request).await;
    manager.shutdown().await;
    let image = result?;

    match args.output.as_deref() {
        Some(destination) => {
            image.persist(destination).await?;
            image.discard().await;
            info!(
                target = "scatto",
                destination = %destination.display(),
                "image written"
            );
            println!("{}", destination.display());
        }
        None => {
            // Without a destination the temp artifact is the deliverable;
            // the caller owns it from here.
            println!("{}", image.path().display());
        }
    }

    Ok(())
}

async fn read_input(input: Option<&Path>) -> Result<String, AppError> {
    match input {
        Some(path) => tokio::fs::read_to_string(path).await.map_err(|err| {
            AppError::unexpected(format!("failed to read {}: {err}", path.display()))
        }),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|err| AppError::unexpected(format!("failed to read stdin: {err}")))?;
            Ok(buffer)
        }
    }
}
