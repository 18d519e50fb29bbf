//! Page resolution: turn a request source into something the renderer can open.
//!
//! ## Why write inline HTML to a temp file?
//!
//! wkhtmltopdf reads its pages from paths or URLs. Inline HTML is therefore
//! written to a `NamedTempFile` and the renderer is pointed at its path. The
//! file's [`TempPath`] is kept inside [`ResolvedPage`], so the file is
//! deleted when the page is dropped: after the response is built, on an
//! early `?` return, or during a panic unwind.
//!
//! With `keep_temp_files` (debug mode) the path is detached from its guard
//! and logged instead, so the exact HTML the renderer saw can be inspected.

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use std::io::Write;
use tempfile::{Builder, TempPath};
use tracing::{debug, info};

/// A page argument for the renderer: either a URL or a local HTML file.
#[derive(Debug)]
pub enum ResolvedPage {
    /// Remote URL passed through untouched.
    Remote(String),
    /// Inline HTML written to disk. `None` guard means the file is retained.
    Materialized {
        path: String,
        _guard: Option<TempPath>,
    },
}

impl ResolvedPage {
    /// The argument to hand to the renderer.
    pub fn as_arg(&self) -> &str {
        match self {
            ResolvedPage::Remote(url) => url,
            ResolvedPage::Materialized { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL the renderer fetches itself.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Write `html` to a scoped temporary `.html` file.
///
/// `label` is folded into the file name prefix (`wkhtmltopdf-<label>-`) to
/// tell the body, header and footer of one request apart when retained.
pub fn materialize(
    html: &str,
    label: &str,
    config: &ServiceConfig,
) -> Result<ResolvedPage, ServiceError> {
    let prefix = if label.is_empty() {
        "wkhtmltopdf-".to_string()
    } else {
        format!("wkhtmltopdf-{label}-")
    };

    let mut builder = Builder::new();
    builder.prefix(&prefix).suffix(".html");
    let mut file = match &config.temp_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|source| ServiceError::TempFile { source })?;

    // On a write error `file` is dropped here and the partial file removed.
    file.write_all(html.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|source| ServiceError::TempFile { source })?;

    let temp_path = file.into_temp_path();
    let path = temp_path.to_string_lossy().into_owned();

    if config.keep_temp_files {
        let kept = temp_path
            .keep()
            .map_err(|e| ServiceError::TempFile { source: e.error })?;
        info!("Keeping rendered HTML for inspection: {}", kept.display());
        return Ok(ResolvedPage::Materialized { path, _guard: None });
    }

    debug!("Materialized {} bytes of HTML at {}", html.len(), path);
    Ok(ResolvedPage::Materialized {
        path,
        _guard: Some(temp_path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir, keep: bool) -> ServiceConfig {
        ServiceConfig {
            temp_dir: Some(dir.path().to_path_buf()),
            keep_temp_files: keep,
            ..ServiceConfig::default()
        }
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/invoice"));
        assert!(is_url("http://example.com/invoice"));
        assert!(!is_url("/tmp/page.html"));
        assert!(!is_url("file:///tmp/page.html"));
        assert!(!is_url(""));
    }

    #[test]
    fn materialized_file_is_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let page = materialize("<b>Jo</b>", "", &config_in(&dir, false)).unwrap();
        let path = Path::new(page.as_arg()).to_path_buf();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<b>Jo</b>");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("wkhtmltopdf-") && name.ends_with(".html"), "{name}");

        drop(page);
        assert!(!path.exists());
    }

    #[test]
    fn debug_mode_keeps_the_file() {
        let dir = TempDir::new().unwrap();
        let page = materialize("<p>keep</p>", "header", &config_in(&dir, true)).unwrap();
        let path = Path::new(page.as_arg()).to_path_buf();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("wkhtmltopdf-header-"));

        drop(page);
        assert!(path.exists());
    }

    #[test]
    fn missing_temp_dir_is_a_temp_file_error() {
        let dir = TempDir::new().unwrap();
        let config = ServiceConfig {
            temp_dir: Some(dir.path().join("does-not-exist")),
            ..ServiceConfig::default()
        };
        let err = materialize("<p/>", "", &config).unwrap_err();
        assert!(matches!(err, ServiceError::TempFile { .. }));
    }

    #[test]
    fn remote_pages_pass_through() {
        let page = ResolvedPage::Remote("http://x/page".into());
        assert_eq!(page.as_arg(), "http://x/page");
    }
}
