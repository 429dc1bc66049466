use std::{future::IntoFuture, process, sync::Arc};

use bacheca::{
    application::{error::AppError, store::ArticleStore, submission::SubmissionService},
    config,
    infra::{
        articles::ArticleArchive,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let store = Arc::new(ArticleStore::load(settings.storage.data_dir.clone()).await?);
    let archive = Arc::new(
        ArticleArchive::new(settings.storage.data_dir.join("articles"))
            .map_err(|err| AppError::from(InfraError::Io(err)))?,
    );

    let upload_limit_bytes = settings.uploads.max_request_bytes.get();
    let submission = Arc::new(SubmissionService::new(
        store.clone(),
        archive.clone(),
        upload_limit_bytes,
    ));

    let state = HttpState {
        store,
        archive,
        submission,
        upload_limit_bytes,
    };
    let router = http::build_router(state, upload_limit_bytes as usize);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::Io(err)))?;

    info!(
        target = "bacheca::server",
        addr = %settings.server.addr,
        data_dir = %settings.storage.data_dir.display(),
        "listening"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            let _ = shutdown_rx.await;
        },
    );
    let server = server.into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            return result.map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        () = shutdown_signal() => {
            let _ = shutdown_tx.send(());
        }
    }

    // Drain in-flight connections, but only up to the configured timeout.
    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
        Ok(result) => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?
        }
        Err(_) => warn!(
            target = "bacheca::server",
            timeout_secs = settings.server.graceful_shutdown.as_secs(),
            "graceful shutdown timed out, abandoning in-flight connections"
        ),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(
            target = "bacheca::server",
            error = %err,
            "failed to listen for shutdown signal"
        );
    }
}
