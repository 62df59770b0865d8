#![cfg(not(tarpaulin_include))]

use actix_web::dev::HttpResponseBuilder;
use actix_web::error::ResponseError;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde_json::json;
use thiserror::Error;

/// Errors raised by the core engine (validators, resolver, reconciler,
/// queue, facade, mirror). Reconciliation-local failures (per-tag,
/// per-branch) are *not* represented here — they never escape the
/// reconciliation pass, they're accumulated into `Package::errors`
/// instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation failed: `{0}`")]
    Validation(String),
    #[error("Repository error: `{0}`")]
    Repository(String),
    #[error("Recipe parse failed in `{file}`: {message}")]
    RecipeParse { file: String, message: String },
    #[error("Not Found")]
    NotFound,
    #[error("Package already exists: `{0}`")]
    AlreadyExists(String),
    #[error("IO error: `{0}`")]
    IO(#[from] std::io::Error),
    #[error("JSON error: `{0}`")]
    Json(#[from] serde_json::Error),
    #[error("Git error: `{0}`")]
    Git2(#[from] git2::Error),
    #[error("Database error: `{0}`")]
    Db(#[from] rusqlite::Error),
    #[error("HTTP error: `{0}`")]
    Http(#[from] reqwest::Error),
}

/// Error surfaced at the HTTP boundary. Mirrors the teacher's
/// `ApiError`/`ResponseError` split: a registry's API errors get
/// translated into a "detail" JSON body rather than a bare status code,
/// a convention we keep for this engine's own operator surface.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Engine error: `{0}`")]
    Engine(#[from] EngineError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self {
            ApiError::Engine(EngineError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Engine(EngineError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Engine(EngineError::AlreadyExists(_)) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponseBuilder::new(self.status_code())
            .json(json!({"errors": [{ "detail": self.to_string() }]}))
    }
}
