//! # pdf-print-service
//!
//! An HTTP service that turns web pages and HTML templates into PDFs by
//! driving the external `wkhtmltopdf` renderer.
//!
//! ## Why an external renderer?
//!
//! wkhtmltopdf ships a full WebKit engine: CSS paged media, web fonts and
//! JavaScript all behave the way they do in a browser. Re-implementing that
//! in-process is out of reach, so the service treats the renderer as a black
//! box: compose an argument vector, run one child process per request, and
//! classify what comes back.
//!
//! ## Request Flow
//!
//! ```text
//! POST /pdf
//!  │
//!  ├─ 1. Auth      HTTP Basic → Identity (or 401 / 403)
//!  ├─ 2. Parse     JSON body → RenderRequest (url | template)
//!  ├─ 3. Prepare   template → HTML → file:// asset paths → temp file
//!  ├─ 4. Render    wkhtmltopdf [options] <page> - (timeout, captured pipes)
//!  └─ 5. Respond   application/pdf + Content-Disposition, or JSON error
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_print_service::{ConversionService, RenderRequest, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = ConversionService::with_config(ServiceConfig::builder().build()?);
//!     let request = RenderRequest::inline("<h1>{{ title }}</h1>", serde_json::json!({"title": "Hi"}));
//!     let bytes = service.render_to_file(request, "hello.pdf").await?;
//!     eprintln!("wrote {bytes} bytes");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-print-service` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod auth;
pub mod config;
pub mod convert;
pub mod error;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use auth::{AuthDecision, Authenticator, Identity, StaticCredentials};
pub use config::{AssetOverride, ServiceConfig, ServiceConfigBuilder};
pub use convert::{ConversionService, Rendered};
pub use error::{ErrorBody, ServiceError};
pub use pipeline::invoke::{RenderJob, RenderOutcome};
pub use pipeline::options::{OptionValue, RenderOptions};
pub use pipeline::template::{JinjaTemplates, TemplateEngine};
pub use request::{RenderRequest, RenderSource};
pub use response::{Disposition, PdfDocument};
pub use server::{router, serve, AppState};
