use std::{io::ErrorKind, sync::Arc};

use axum::{
    Router,
    extract::{DefaultBodyLimit, Path, State},
    http::{StatusCode, header::CONTENT_TYPE},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::Multipart;
use axum_extra::extract::multipart::MultipartError;
use futures::StreamExt;
use tracing::error;

use crate::{
    application::{
        store::ArticleStore,
        submission::{NewSubmission, SubmissionError, SubmissionService, UploadPart},
    },
    infra::articles::{ArchiveError, ArticleArchive},
    presentation::views::{ArticleListItem, BoardTemplate, render_template_response},
};

use super::{
    error::{ErrorReport, HttpError},
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<ArticleStore>,
    pub archive: Arc<ArticleArchive>,
    pub submission: Arc<SubmissionService>,
    pub upload_limit_bytes: u64,
}

pub fn build_router(state: HttpState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/submit", post(submit))
        .route("/articles/{*path}", get(serve_article))
        .route("/_health", get(health))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn index(State(state): State<HttpState>) -> Response {
    let articles = state
        .store
        .list()
        .await
        .into_iter()
        .map(ArticleListItem::from)
        .collect();
    render_template_response(BoardTemplate { articles }, StatusCode::OK)
}

async fn submit(State(state): State<HttpState>, mut multipart: Multipart) -> Response {
    const SOURCE: &str = "infra::http::public::submit";

    let mut title: Option<String> = None;
    let mut message: Option<String> = None;
    let mut file = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => match field.name() {
                Some("title") => match field.text().await {
                    Ok(value) => title = Some(value),
                    Err(err) => return multipart_error_response(SOURCE, &state, err),
                },
                Some("message") => match field.text().await {
                    Ok(value) => message = Some(value),
                    Err(err) => return multipart_error_response(SOURCE, &state, err),
                },
                Some("file") => {
                    let filename = field
                        .file_name()
                        .map(|value| value.to_string())
                        .filter(|value| !value.trim().is_empty());
                    // An empty file input still posts a nameless part; that
                    // counts as "no attachment", not an error.
                    if let Some(filename) = filename {
                        // The upload streams straight to disk, so parts after
                        // it are never read. Text fields must come first.
                        if title.is_none() || message.is_none() {
                            return HttpError::new(
                                SOURCE,
                                StatusCode::BAD_REQUEST,
                                "The title and message fields must come before the file field",
                                "file part arrived before both text fields were read",
                            )
                            .into_response();
                        }
                        file = Some((filename, field));
                        break;
                    }
                }
                _ => {}
            },
            Ok(None) => break,
            Err(err) => return multipart_error_response(SOURCE, &state, err),
        }
    }

    let (Some(title), Some(message)) = (title, message) else {
        return HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Both title and message are required",
            "form did not include both title and message fields",
        )
        .into_response();
    };

    let upload = file.map(|(filename, field)| UploadPart {
        filename,
        stream: field.map(|result| {
            result.map_err(|err| {
                if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    ArchiveError::UploadTooLarge
                } else {
                    ArchiveError::UploadStream {
                        source: Box::new(err),
                    }
                }
            })
        }),
    });

    match state
        .submission
        .submit(NewSubmission {
            title,
            message,
            upload,
        })
        .await
    {
        Ok(id) => Redirect::to(&format!("/articles/{id}/")).into_response(),
        Err(err) => submission_error_response(SOURCE, &state, err),
    }
}

async fn serve_article(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_article";

    match state.archive.read(&path).await {
        Ok((resolved, bytes)) => {
            let mime = mime_guess::from_path(&resolved).first_or_octet_stream();
            ([(CONTENT_TYPE, mime.to_string())], bytes).into_response()
        }
        Err(ArchiveError::InvalidPath) => article_not_found(SOURCE),
        Err(ArchiveError::Io(err)) if err.kind() == ErrorKind::NotFound => {
            article_not_found(SOURCE)
        }
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored article file"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read article",
                err.to_string(),
            )
            .into_response()
        }
    }
}

async fn health(State(state): State<HttpState>) -> Response {
    if state.archive.is_available().await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
        ErrorReport::from_message(
            "infra::http::public::health",
            StatusCode::SERVICE_UNAVAILABLE,
            "article archive root is not available",
        )
        .attach(&mut response);
        response
    }
}

fn article_not_found(source: &'static str) -> Response {
    HttpError::new(
        source,
        StatusCode::NOT_FOUND,
        "Article not found",
        "The requested article is not available",
    )
    .into_response()
}

fn multipart_error_response(
    source: &'static str,
    state: &HttpState,
    err: MultipartError,
) -> Response {
    match err.status() {
        StatusCode::PAYLOAD_TOO_LARGE => HttpError::from_error(
            source,
            StatusCode::BAD_REQUEST,
            upload_too_large_message(state.upload_limit_bytes),
            &err,
        )
        .into_response(),
        _ => {
            HttpError::from_error(source, StatusCode::BAD_REQUEST, "Invalid form data", &err)
                .into_response()
        }
    }
}

fn submission_error_response(
    source: &'static str,
    state: &HttpState,
    err: SubmissionError,
) -> Response {
    match err {
        SubmissionError::Validation(domain) => HttpError::new(
            source,
            StatusCode::BAD_REQUEST,
            domain.public_reason().to_string(),
            domain.to_string(),
        )
        .into_response(),
        SubmissionError::UploadTooLarge => HttpError::new(
            source,
            StatusCode::BAD_REQUEST,
            upload_too_large_message(state.upload_limit_bytes),
            "upload exceeded the configured size limit",
        )
        .into_response(),
        SubmissionError::UploadStream(err) => HttpError::from_error(
            source,
            StatusCode::BAD_REQUEST,
            "Upload could not be read",
            err.as_ref(),
        )
        .into_response(),
        err @ (SubmissionError::Storage(_)
        | SubmissionError::Render(_)
        | SubmissionError::Store(_)) => HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Could not store the article, please retry later",
            &err,
        )
        .into_response(),
    }
}

fn upload_too_large_message(limit_bytes: u64) -> String {
    let limit_mib = limit_bytes.div_ceil(1_048_576);
    format!("File is too large (limit is {limit_mib} MiB)")
}
