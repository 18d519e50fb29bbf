//! Request orchestration: one [`RenderRequest`] in, one PDF (or failure) out.
//!
//! ## Stages
//!
//! ```text
//! Received ──▶ Preparing ──▶ Rendering ──▶ Responding
//!  (parsed)    (inline only:   (one child    (status, headers,
//!              template,       process)      body)
//!              absolutize,
//!              temp files)
//! ```
//!
//! The first failing stage ends the request. Temporary files created while
//! preparing are owned by [`ResolvedPage`] guards that live until the
//! renderer has exited, so they are removed on every path out of
//! [`ConversionService::render`].

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::pipeline::absolutize::absolutize;
use crate::pipeline::input::{materialize, ResolvedPage};
use crate::pipeline::invoke::{self, OutputTarget, RenderJob, RenderOutcome};
use crate::pipeline::template::{JinjaTemplates, TemplateEngine};
use crate::request::{RenderRequest, RenderSource};
use crate::response::{self, classify, Disposition};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of running one request through the renderer.
#[derive(Debug)]
pub struct Rendered {
    pub outcome: RenderOutcome,
    pub filename: String,
    pub disposition: Disposition,
    /// URL or label of what was rendered, used in messages.
    pub source: String,
}

impl IntoResponse for Rendered {
    fn into_response(self) -> Response {
        response::build(
            self.outcome,
            Some(&self.filename),
            self.disposition,
            &self.source,
        )
    }
}

/// Converts requests to PDFs. Cheap to clone; shared by all handlers.
#[derive(Clone)]
pub struct ConversionService {
    config: Arc<ServiceConfig>,
    templates: Arc<dyn TemplateEngine>,
}

impl std::fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConversionService {
    pub fn new(config: Arc<ServiceConfig>, templates: Arc<dyn TemplateEngine>) -> Self {
        Self { config, templates }
    }

    /// Service with the default Jinja template engine.
    pub fn with_config(config: ServiceConfig) -> Self {
        Self::new(Arc::new(config), Arc::new(JinjaTemplates::new()))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Run the renderer for `request`.
    ///
    /// `Err` means the renderer was never started (bad template, temp file
    /// trouble). Renderer failures come back as `Ok` with a failed outcome.
    pub async fn render(&self, request: RenderRequest) -> Result<Rendered, ServiceError> {
        let started = Instant::now();
        let source = request.describe().to_string();
        info!("Received request for '{}'", source);

        let overrides = request.effective_options();
        let (outcome, default_filename) = match &request.source {
            RenderSource::Remote { url, .. } => {
                info!("Rendering remote page '{}'", url);
                let page = ResolvedPage::Remote(url.clone());
                let job = RenderJob::new(
                    &self.config,
                    &[&page],
                    &OutputTarget::Stdout,
                    &overrides,
                );
                (invoke::run(job).await, &self.config.remote_filename)
            }
            RenderSource::Inline {
                markup,
                data,
                header,
                footer,
            } => {
                info!("Preparing inline document");
                let body = self.prepare(markup, data, "")?;
                let header = header
                    .as_deref()
                    .map(|h| self.prepare(h, data, "header"))
                    .transpose()?;
                let footer = footer
                    .as_deref()
                    .map(|f| self.prepare(f, data, "footer"))
                    .transpose()?;

                let mut overrides = overrides;
                if let Some(page) = &header {
                    overrides.set("header_html", page.as_arg());
                }
                if let Some(page) = &footer {
                    overrides.set("footer_html", page.as_arg());
                }

                info!("Rendering inline document");
                let job = RenderJob::new(
                    &self.config,
                    &[&body],
                    &OutputTarget::Stdout,
                    &overrides,
                );
                let outcome = invoke::run(job).await;
                // Temp files go away only once the renderer is done with them.
                drop((body, header, footer));
                (outcome, &self.config.inline_filename)
            }
        };

        info!(
            "Responding for '{}' after {}ms (success: {})",
            source,
            started.elapsed().as_millis(),
            outcome.is_success()
        );
        Ok(Rendered {
            outcome,
            filename: request
                .filename
                .unwrap_or_else(|| default_filename.clone()),
            disposition: request.disposition,
            source,
        })
    }

    /// Run `request` and build the HTTP response, whatever happened.
    pub async fn handle(&self, request: RenderRequest) -> Response {
        match self.render(request).await {
            Ok(rendered) => rendered.into_response(),
            Err(e) => {
                warn!("Request failed before rendering: {}", e);
                e.into_response()
            }
        }
    }

    /// Render `request` and write the PDF to `path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    /// Returns the number of bytes written.
    pub async fn render_to_file(
        &self,
        request: RenderRequest,
        path: impl AsRef<Path>,
    ) -> Result<usize, ServiceError> {
        let rendered = self.render(request).await?;
        let bytes = match rendered.outcome {
            RenderOutcome::Success(bytes) => bytes,
            failed => {
                let message = classify(&failed, &rendered.source)
                    .map(|f| f.message)
                    .unwrap_or_else(|| "renderer produced no document".to_string());
                return Err(ServiceError::RenderFailed(message));
            }
        };

        let path = path.as_ref();
        let write_err = |source| ServiceError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let tmp_path = path.with_extension("pdf.tmp");
        tokio::fs::write(&tmp_path, &bytes).await.map_err(write_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

        info!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(bytes.len())
    }

    /// Template → absolute asset URLs → scoped temp file.
    fn prepare(&self, markup: &str, data: &Value, label: &str) -> Result<ResolvedPage, ServiceError> {
        let html = self.templates.render(markup, data)?;
        let html = absolutize(&html, &self.config.asset_overrides);
        debug!("Prepared HTML ({}): {}", if label.is_empty() { "body" } else { label }, html);
        materialize(&html, label, &self.config)
    }
}
