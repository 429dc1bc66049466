use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

use crate::domain::article::{Article, MediaKind};
use crate::infra::http::error::HttpError;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

/// One row in the board listing.
#[derive(Clone)]
pub struct ArticleListItem {
    pub id: u64,
    pub title: String,
}

impl From<Article> for ArticleListItem {
    fn from(article: Article) -> Self {
        Self {
            id: article.id,
            title: article.title,
        }
    }
}

/// The landing page: submission form plus the current listing.
#[derive(Template)]
#[template(path = "board.html")]
pub struct BoardTemplate {
    pub articles: Vec<ArticleListItem>,
}

/// The static page rendered to disk for one article. Askama escapes title
/// and message, so submitter text never reaches the markup raw.
#[derive(Template)]
#[template(path = "article.html")]
pub struct ArticlePageTemplate<'a> {
    pub title: &'a str,
    pub message: &'a str,
    pub image: bool,
    pub video: bool,
    pub audio: bool,
    pub attachment_link: bool,
}

impl<'a> ArticlePageTemplate<'a> {
    pub fn new(title: &'a str, message: &'a str, media: Option<MediaKind>) -> Self {
        Self {
            title,
            message,
            image: media == Some(MediaKind::Image),
            video: media == Some(MediaKind::Video),
            audio: media == Some(MediaKind::Audio),
            // Unrecognized attachments get a plain link instead of an embed.
            attachment_link: media == Some(MediaKind::Other),
        }
    }
}

/// Render an article's static page to HTML.
pub fn render_article_page(
    title: &str,
    message: &str,
    media: Option<MediaKind>,
) -> Result<String, AskamaError> {
    ArticlePageTemplate::new(title, message, media).render()
}
