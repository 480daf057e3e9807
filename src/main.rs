use std::{collections::HashMap, process, sync::Arc, time::Duration};

use clap::Parser;
use tracing::{error, info};

use scrivano::{
    application::{
        error::AppError,
        filters::{FilterBinding, FilterService},
        render::{RenderConfig, RenderRequest, RenderService},
        scheduler::{self, ScheduledInvocation},
    },
    config::{self, CliArgs, Command, ServeArgs, Settings},
    domain::DocumentName,
    engine::{DocumentStore, FileSourceProvider, OutputStore},
    infra::{
        error::InfraError,
        http::{self, HttpState},
        script::RhaiRuntime,
        telemetry,
    },
};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let settings = match config::load(&args) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("configuration error: {err}");
            process::exit(2);
        }
    };

    if let Err(err) = telemetry::init(&settings.logging) {
        eprintln!("telemetry error: {err}");
        process::exit(2);
    }

    let command = args
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    let result = match command {
        Command::Serve(_) => serve(&settings).await,
        Command::Render(render_args) => render_once(&settings, &render_args.document).await,
    };

    if let Err(err) = result {
        error!(error = %err, "scrivano exited with failure");
        process::exit(1);
    }
}

fn build_render_service(settings: &Settings) -> Arc<RenderService> {
    let sources = Arc::new(FileSourceProvider::new(
        settings.documents.root.clone(),
        settings.documents.extension.clone(),
    ));
    let runtime = Arc::new(RhaiRuntime::new(settings.documents.max_operations));
    let documents = Arc::new(DocumentStore::new(sources, runtime));
    let outputs = Arc::new(OutputStore::new(settings.cache.output_limit));

    Arc::new(RenderService::new(
        documents,
        outputs,
        RenderConfig {
            application: settings.site.application.clone(),
            base_path: settings.site.base_path.clone(),
            index_document: settings.site.index_document.clone(),
            cache_key_pattern: settings.site.cache_key_pattern.clone(),
            default_media_type: settings.site.default_media_type.clone(),
            default_charset: settings.site.default_charset.clone(),
            enable_output_cache: settings.cache.enable_output_cache,
        },
    ))
}

fn filter_bindings(settings: &Settings) -> Result<Vec<FilterBinding>, AppError> {
    settings
        .filters
        .iter()
        .map(|filter| {
            Ok(FilterBinding {
                prefix: filter.prefix.clone(),
                document: DocumentName::new(filter.document.clone())?,
                before_entry: filter.before.clone(),
                after_entry: filter.after.clone(),
                default_action: filter.default_action.to_action(),
            })
        })
        .collect()
}

fn scheduled_tasks(settings: &Settings) -> Result<Vec<ScheduledInvocation>, AppError> {
    settings
        .scheduler
        .tasks
        .iter()
        .map(|task| {
            Ok(ScheduledInvocation {
                document: DocumentName::new(task.document.clone())?,
                entry: task.entry.clone(),
                every: Duration::from_secs(task.every_secs),
            })
        })
        .collect()
}

async fn serve(settings: &Settings) -> Result<(), AppError> {
    let render = build_render_service(settings);
    let filters = Arc::new(FilterService::new(
        filter_bindings(settings)?,
        Arc::clone(render.documents()),
        render.clone(),
    ));

    let scheduler_handles = scheduler::spawn(
        Arc::clone(render.documents()),
        scheduled_tasks(settings)?,
    );
    if !scheduler_handles.is_empty() {
        info!(tasks = scheduler_handles.len(), "scheduler started");
    }

    let router = http::build_router(HttpState { render, filters });

    let addr = settings
        .server
        .addr()
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %addr, "scrivano listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(settings.server.graceful_shutdown()))
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal(grace: Duration) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!(grace_secs = grace.as_secs(), "shutdown signal received, draining connections");

    // Backstop: a connection that refuses to drain must not hold the process
    // open past the configured window.
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        error!("graceful shutdown window elapsed, aborting");
        process::exit(1);
    });
}

async fn render_once(settings: &Settings, document: &str) -> Result<(), AppError> {
    let render = build_render_service(settings);
    let name = DocumentName::new(document.to_string())?;

    let request = RenderRequest {
        document: name,
        path: format!("/{document}"),
        variables: HashMap::from([
            ("method".to_string(), "CLI".to_string()),
            ("path".to_string(), format!("/{document}")),
        ]),
        cache_pattern: None,
    };

    let rendered = render.render(&request).await?;
    println!("{}", String::from_utf8_lossy(&rendered.payload.body));
    Ok(())
}
