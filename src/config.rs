//! Configuration types for the print service.
//!
//! Everything that is process-wide and read-only after startup lives in
//! [`ServiceConfig`]: where the renderer binary is, which options it always
//! receives, which URL prefixes map to which directories, and how temporary
//! files are handled. The struct is built once (via
//! [`ServiceConfigBuilder`]), wrapped in an `Arc` and shared by every
//! request.

use crate::error::ServiceError;
use crate::pipeline::options::{OptionValue, RenderOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Renderer used when neither the configuration nor the environment names one.
pub const DEFAULT_RENDERER: &str = "wkhtmltopdf";

/// Environment variable consulted for the renderer command line.
pub const RENDERER_ENV_VAR: &str = "WKHTMLTOPDF_CMD";

/// Attachment name for documents rendered from inline templates.
pub const DEFAULT_INLINE_FILENAME: &str = "expense-claim.pdf";

/// Attachment name for documents rendered from a remote URL.
pub const DEFAULT_REMOTE_FILENAME: &str = "document.pdf";

/// Maps a URL prefix served by the web server to the directory backing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetOverride {
    /// Directory on disk, e.g. `/srv/www/static`.
    pub root: PathBuf,
    /// URL prefix, e.g. `/static/`.
    pub url_prefix: String,
}

impl AssetOverride {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.into(),
        }
    }
}

impl FromStr for AssetOverride {
    type Err = ServiceError;

    /// Parse `PREFIX=ROOT`, e.g. `/static/=/srv/www/static`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, root) = s.split_once('=').ok_or_else(|| {
            ServiceError::InvalidConfig(format!("asset override '{s}' must look like PREFIX=ROOT"))
        })?;
        Ok(AssetOverride::new(root.trim(), prefix.trim()))
    }
}

/// Process-wide configuration of the print service.
///
/// # Example
/// ```rust
/// use pdf_print_service::{AssetOverride, ServiceConfig};
/// use std::time::Duration;
///
/// let config = ServiceConfig::builder()
///     .renderer_command("/usr/local/bin/wkhtmltopdf")
///     .render_timeout(Duration::from_secs(30))
///     .asset_override(AssetOverride::new("/srv/www/static", "/static/"))
///     .build()
///     .unwrap();
/// assert_eq!(config.renderer_command, vec!["/usr/local/bin/wkhtmltopdf"]);
/// ```
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Renderer program followed by any fixed leading arguments.
    pub renderer_command: Vec<String>,

    /// Options passed on every invocation unless a request overrides them.
    /// Default: `quiet`.
    pub default_options: RenderOptions,

    /// Extra environment variables for the renderer, on top of the
    /// service's own environment.
    pub renderer_env: BTreeMap<String, String>,

    /// Upper bound on a single renderer run. `None` waits indefinitely.
    pub render_timeout: Option<Duration>,

    /// URL-prefix → directory table used to absolutize inline HTML.
    pub asset_overrides: Vec<AssetOverride>,

    /// Directory for temporary HTML files. `None` uses the system temp dir.
    pub temp_dir: Option<PathBuf>,

    /// Keep temporary HTML files after rendering so they can be inspected.
    pub keep_temp_files: bool,

    /// Attachment filename for inline-template documents.
    pub inline_filename: String,

    /// Default attachment filename for remote-URL documents.
    pub remote_filename: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            renderer_command: vec![DEFAULT_RENDERER.to_string()],
            default_options: RenderOptions::new().with("quiet", OptionValue::Flag),
            renderer_env: BTreeMap::new(),
            render_timeout: None,
            asset_overrides: Vec::new(),
            temp_dir: None,
            keep_temp_files: false,
            inline_filename: DEFAULT_INLINE_FILENAME.to_string(),
            remote_filename: DEFAULT_REMOTE_FILENAME.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
            command: None,
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
    command: Option<String>,
}

impl ServiceConfigBuilder {
    /// Renderer command line, split with shell-word rules at build time.
    pub fn renderer_command(mut self, cmd: impl Into<String>) -> Self {
        self.command = Some(cmd.into());
        self
    }

    /// Replace the default option set entirely.
    pub fn default_options(mut self, options: RenderOptions) -> Self {
        self.config.default_options = options;
        self
    }

    /// Add or replace one default option.
    pub fn default_option(mut self, name: &str, value: impl Into<OptionValue>) -> Self {
        self.config.default_options.set(name, value);
        self
    }

    pub fn renderer_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.renderer_env.insert(key.into(), value.into());
        self
    }

    pub fn render_timeout(mut self, timeout: Duration) -> Self {
        self.config.render_timeout = Some(timeout);
        self
    }

    pub fn asset_override(mut self, ov: AssetOverride) -> Self {
        self.config.asset_overrides.push(ov);
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn keep_temp_files(mut self, v: bool) -> Self {
        self.config.keep_temp_files = v;
        self
    }

    pub fn inline_filename(mut self, name: impl Into<String>) -> Self {
        self.config.inline_filename = name.into();
        self
    }

    pub fn remote_filename(mut self, name: impl Into<String>) -> Self {
        self.config.remote_filename = name.into();
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// The renderer command comes from [`Self::renderer_command`], else the
    /// `WKHTMLTOPDF_CMD` environment variable, else `wkhtmltopdf`.
    pub fn build(mut self) -> Result<ServiceConfig, ServiceError> {
        let env_command = std::env::var(RENDERER_ENV_VAR).ok();
        self.config.renderer_command =
            resolve_renderer_command(self.command.as_deref(), env_command.as_deref())?;

        let c = &self.config;
        if let Some(timeout) = c.render_timeout {
            if timeout.is_zero() {
                return Err(ServiceError::InvalidConfig(
                    "Render timeout must be greater than zero".into(),
                ));
            }
        }
        for ov in &c.asset_overrides {
            if !ov.root.is_absolute() {
                return Err(ServiceError::InvalidConfig(format!(
                    "Asset root for '{}' must be an absolute path, got {}",
                    ov.url_prefix,
                    ov.root.display()
                )));
            }
        }
        if c.inline_filename.trim().is_empty() || c.remote_filename.trim().is_empty() {
            return Err(ServiceError::InvalidConfig(
                "Attachment filenames must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Resolve the renderer command: configured value, else environment, else default.
pub fn resolve_renderer_command(
    configured: Option<&str>,
    from_env: Option<&str>,
) -> Result<Vec<String>, ServiceError> {
    let raw = configured
        .filter(|s| !s.trim().is_empty())
        .or(from_env.filter(|s| !s.trim().is_empty()))
        .unwrap_or(DEFAULT_RENDERER);

    let tokens = shlex::split(raw).ok_or_else(|| {
        ServiceError::InvalidConfig(format!("Renderer command has unbalanced quotes: {raw}"))
    })?;
    if tokens.is_empty() {
        return Err(ServiceError::InvalidConfig("Renderer command is empty".into()));
    }
    Ok(tokens)
}
