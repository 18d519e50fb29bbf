//! Error types for the pdf-print-service library.
//!
//! Two distinct failure channels exist:
//!
//! * [`ServiceError`]: the request could not be turned into a renderer
//!   invocation at all (malformed body, broken template, unwritable temp
//!   directory, bad configuration) or was rejected by the auth stage.
//!
//! * [`crate::pipeline::invoke::RenderOutcome`]: the renderer was (or was
//!   meant to be) run. Its failures are ordinary values, classified into HTTP
//!   statuses by [`crate::response`], never propagated as `Err`.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// All non-renderer errors returned by the pdf-print-service library.
#[derive(Debug, Error)]
pub enum ServiceError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The request body is not valid JSON or misses required fields.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The template failed to parse or evaluate against the supplied data.
    #[error("Template error: {0}")]
    Template(String),

    // ── Auth errors ───────────────────────────────────────────────────────
    /// No credentials, or credentials that do not match any account.
    #[error("Authentication required")]
    Unauthorized,

    /// Valid credentials for an account that may not use the service.
    #[error("Account '{user}' is not allowed to use the PDF service")]
    Forbidden { user: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the temporary HTML file for the renderer.
    #[error("Failed to prepare temporary HTML file: {source}")]
    TempFile {
        #[source]
        source: std::io::Error,
    },

    /// Could not write the rendered PDF to its destination.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Renderer errors ───────────────────────────────────────────────────
    /// The renderer ran but produced no PDF. Only raised where no HTTP
    /// response is built (e.g. when writing straight to a file).
    #[error("Rendering failed: {0}")]
    RenderFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// A failure response was requested for an outcome that is not a failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// HTTP status reported to the caller for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::InvalidRequest(_) | ServiceError::Template(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ServiceError::TempFile { .. }
            | ServiceError::OutputWriteFailed { .. }
            | ServiceError::RenderFailed(_)
            | ServiceError::InvalidConfig(_)
            | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code used in JSON bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidRequest(_) => "INVALID_REQUEST",
            ServiceError::Template(_) => "TEMPLATE_ERROR",
            ServiceError::Unauthorized => "UNAUTHORIZED",
            ServiceError::Forbidden { .. } => "FORBIDDEN",
            ServiceError::TempFile { .. } => "TEMP_FILE_ERROR",
            ServiceError::OutputWriteFailed { .. } => "OUTPUT_WRITE_FAILED",
            ServiceError::RenderFailed(_) => "RENDER_FAILED",
            ServiceError::InvalidConfig(_) => "INVALID_CONFIG",
            ServiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// JSON body shared by every failure response of the service.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
            code: code.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = ErrorBody::new(self.code(), self.to_string());
        let mut response = (status, Json(body)).into_response();

        if matches!(self, ServiceError::Unauthorized) {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"pdf\""),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_display_names_user() {
        let e = ServiceError::Forbidden {
            user: "mallory".into(),
        };
        assert!(e.to_string().contains("mallory"));
        assert_eq!(e.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn request_errors_are_client_errors() {
        assert_eq!(
            ServiceError::InvalidRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::Template("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unauthorized_response_challenges_for_basic_auth() {
        let resp = ServiceError::Unauthorized.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let challenge = resp.headers().get(header::WWW_AUTHENTICATE).unwrap();
        assert!(challenge.to_str().unwrap().starts_with("Basic"));
    }

    #[test]
    fn internal_error_is_a_json_500() {
        let e = ServiceError::Internal("no render failure".into());
        assert_eq!(e.code(), "INTERNAL_ERROR");
        let resp = e.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp.headers().get(header::WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn temp_file_display_includes_source() {
        let e = ServiceError::TempFile {
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only fs"),
        };
        assert!(e.to_string().contains("read-only fs"));
        assert_eq!(e.code(), "TEMP_FILE_ERROR");
    }
}
