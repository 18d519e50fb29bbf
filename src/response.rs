//! HTTP responses for rendered documents and renderer failures.
//!
//! A successful render becomes `200 application/pdf` with an optional
//! `Content-Disposition` header. Every failure becomes a JSON body of the same
//! shape as [`crate::error::ErrorBody`], with a status derived from the
//! [`RenderOutcome`].
//!
//! ## Stderr classification
//!
//! wkhtmltopdf reports network problems only as text on stderr, e.g.
//! `Exit with code 1 due to network error: ContentNotFoundError`. Matching on
//! these signatures is a best-effort heuristic tied to the renderer's wording:
//! an unrecognised message still yields a 500 with the (sanitized) stderr, so
//! a change in wording degrades the status code, never the diagnostics.

use crate::error::{ErrorBody, ServiceError};
use crate::pipeline::invoke::RenderOutcome;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Longest stderr excerpt echoed back to the caller.
const MAX_STDERR_CHARS: usize = 1000;

const CONNECTION_REFUSED_SIGNATURE: &str = "ConnectionRefusedError";
const CONTENT_NOT_FOUND_SIGNATURE: &str = "ContentNotFoundError";

/// How the browser should present the PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// Download as a file. (default)
    #[default]
    Attachment,
    /// Display in the browser.
    Inline,
}

impl Disposition {
    fn as_str(self) -> &'static str {
        match self {
            Disposition::Attachment => "attachment",
            Disposition::Inline => "inline",
        }
    }
}

/// A rendered PDF ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfDocument {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
    pub disposition: Disposition,
}

impl PdfDocument {
    /// Value of the `Content-Disposition` header, `None` without a filename.
    pub fn content_disposition(&self) -> Option<String> {
        self.filename.as_deref().map(|name| {
            format!(
                "{}; filename={}",
                self.disposition.as_str(),
                content_disposition_filename(name)
            )
        })
    }
}

impl IntoResponse for PdfDocument {
    fn into_response(self) -> Response {
        let disposition = self.content_disposition();
        let mut response = (
            StatusCode::OK,
            [(header::CONTENT_TYPE, HeaderValue::from_static(PDF_CONTENT_TYPE))],
            self.bytes,
        )
            .into_response();

        if let Some(value) = disposition {
            match HeaderValue::from_str(&value) {
                Ok(v) => {
                    response.headers_mut().insert(header::CONTENT_DISPOSITION, v);
                }
                Err(e) => warn!("Dropping unrepresentable Content-Disposition {:?}: {}", value, e),
            }
        }
        response
    }
}

/// Sanitize a filename for the `Content-Disposition` header.
///
/// `;` and `"` are removed, control characters dropped, non-ASCII
/// transliterated (unmappable characters become `?`), and the result is
/// returned as a quoted string.
pub fn content_disposition_filename(filename: &str) -> String {
    let stripped: String = filename
        .chars()
        .filter(|c| *c != ';' && *c != '"' && !c.is_control())
        .collect();
    http_quote(&stripped)
}

/// ASCII-only quoted-string form of `s`, escaping `\` and `"`.
pub fn http_quote(s: &str) -> String {
    let ascii = deunicode::deunicode_with_tofu(s, "?");
    let escaped = ascii
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .replace('\\', "\\\\")
        .replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// A renderer failure mapped onto HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFailure {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for RenderFailure {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody::new(self.code, self.message))).into_response()
    }
}

/// Classify a non-successful outcome. `source` names what was rendered
/// (the URL, or a label for inline documents) for use in messages.
pub fn classify(outcome: &RenderOutcome, source: &str) -> Option<RenderFailure> {
    let failure = match outcome {
        RenderOutcome::Success(_) => return None,
        RenderOutcome::ProcessFailure { code, stderr } => {
            if stderr.contains(CONNECTION_REFUSED_SIGNATURE) {
                RenderFailure {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "CONNECTION_REFUSED",
                    message: format!("Could not connect to '{source}': connection refused"),
                }
            } else if stderr.contains(CONTENT_NOT_FOUND_SIGNATURE) {
                RenderFailure {
                    status: StatusCode::NOT_FOUND,
                    code: "CONTENT_NOT_FOUND",
                    message: format!("Content not found: '{source}'"),
                }
            } else {
                let exit = code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}"));
                RenderFailure {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "RENDER_FAILED",
                    message: format!(
                        "PDF renderer exited with {exit}: {}",
                        sanitize_stderr(stderr)
                    ),
                }
            }
        }
        RenderOutcome::TimedOut { after, .. } => RenderFailure {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "RENDER_TIMEOUT",
            message: format!(
                "Rendering '{source}' timed out after {:.1}s",
                after.as_secs_f64()
            ),
        },
        RenderOutcome::SpawnError { program, reason } => RenderFailure {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "RENDERER_UNAVAILABLE",
            message: format!("PDF renderer '{program}' could not be started: {reason}"),
        },
    };
    Some(failure)
}

/// Keep stderr printable and bounded before echoing it to a client.
pub fn sanitize_stderr(stderr: &str) -> String {
    let printable: String = stderr
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    let trimmed = printable.trim();
    if trimmed.chars().count() > MAX_STDERR_CHARS {
        let head: String = trimmed.chars().take(MAX_STDERR_CHARS - 1).collect();
        format!("{head}\u{2026}")
    } else {
        trimmed.to_string()
    }
}

/// Turn a render outcome into the HTTP response for the caller.
pub fn build(
    outcome: RenderOutcome,
    filename: Option<&str>,
    disposition: Disposition,
    source: &str,
) -> Response {
    let bytes = match outcome {
        RenderOutcome::Success(bytes) => bytes,
        failed => return failure_response(&failed, source),
    };
    info!("Responding with {} byte PDF for '{}'", bytes.len(), source);
    PdfDocument {
        bytes,
        filename: filename.map(str::to_string),
        disposition,
    }
    .into_response()
}

fn failure_response(outcome: &RenderOutcome, source: &str) -> Response {
    let Some(failure) = classify(outcome, source) else {
        return ServiceError::Internal(format!("no render failure to report for '{source}'"))
            .into_response();
    };
    match outcome {
        RenderOutcome::ProcessFailure { code, stderr } => warn!(
            "Render of '{}' failed (exit {:?}) → {}: {}",
            source,
            code,
            failure.status,
            stderr.trim()
        ),
        _ => warn!("Render of '{}' failed → {}: {}", source, failure.status, failure.message),
    }
    failure.into_response()
}
