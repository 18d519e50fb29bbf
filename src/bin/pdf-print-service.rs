//! CLI binary for pdf-print-service.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ServiceConfig` and either serves HTTP or renders one document.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pdf_print_service::pipeline::input::is_url;
use pdf_print_service::{
    router, serve, AppState, AssetOverride, ConversionService, OptionValue, RenderOptions,
    RenderRequest, RenderSource, ServiceConfig, StaticCredentials,
};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on localhost:8000 with two accounts, one disabled
  pdf-print-service serve --users 'alice:s3cret,!bob:old'

  # Map /static/ URLs in templates to files on disk
  pdf-print-service serve --asset /static/=/srv/www/static

  # Render a page to a file without the server
  pdf-print-service render https://example.com/invoice/42 -o invoice.pdf

  # Render a local template with JSON data, A4, 30s limit
  pdf-print-service render claim.html --data claim.json -O page-size=A4 --timeout 30 -o claim.pdf

  # Call the server
  curl -u alice:s3cret -H 'Content-Type: application/json' \
       -d '{"template": "<h1>{{ who }}</h1>", "data": {"who": "Jo"}}' \
       http://127.0.0.1:8000/pdf -o out.pdf

ENVIRONMENT VARIABLES:
  WKHTMLTOPDF_CMD        Renderer command line (default: wkhtmltopdf)
  PDF_SERVICE_BIND       Listen address for `serve`
  PDF_SERVICE_USERS      Accounts for `serve`: user:password[,!disabled:password]
  PDF_SERVICE_ASSETS     Asset overrides: PREFIX=ROOT[,PREFIX=ROOT]
  PDF_SERVICE_TIMEOUT    Render timeout in seconds
  PDF_SERVICE_DEBUG      Keep temporary HTML files for inspection
  RUST_LOG               Log filter, overrides --verbose/--quiet
"#;

/// Render web pages and HTML templates to PDF with wkhtmltopdf.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-print-service",
    version,
    about = "Render web pages and HTML templates to PDF with wkhtmltopdf",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Renderer command line, e.g. "xvfb-run -a wkhtmltopdf".
    #[arg(long, global = true, env = "WKHTMLTOPDF_CMD")]
    renderer: Option<String>,

    /// Extra renderer option, NAME or NAME=VALUE; `!NAME` drops a default.
    /// Repeat a name to pass it several times.
    #[arg(short = 'O', long = "option", global = true, value_name = "NAME[=VALUE]")]
    options: Vec<String>,

    /// Map a URL prefix to a directory: PREFIX=ROOT.
    #[arg(
        long = "asset",
        global = true,
        env = "PDF_SERVICE_ASSETS",
        value_delimiter = ',',
        value_name = "PREFIX=ROOT"
    )]
    assets: Vec<AssetOverride>,

    /// Kill the renderer after this many seconds.
    #[arg(long, global = true, env = "PDF_SERVICE_TIMEOUT")]
    timeout: Option<u64>,

    /// Directory for temporary HTML files.
    #[arg(long, global = true, env = "PDF_SERVICE_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Keep temporary HTML files and log their paths.
    #[arg(long, global = true, env = "PDF_SERVICE_DEBUG")]
    debug: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF_SERVICE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Render one URL or template file to a PDF file.
    Render(RenderArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "PDF_SERVICE_BIND", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Accounts: user:password[,…]; prefix a user with `!` to disable it.
    #[arg(long, env = "PDF_SERVICE_USERS", hide_env_values = true)]
    users: Option<String>,

    /// Allow cross-origin browser requests.
    #[arg(long, env = "PDF_SERVICE_CORS")]
    cors: bool,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// HTTP/HTTPS URL, or path to a template file.
    input: String,

    /// Write the PDF to this file.
    #[arg(short, long)]
    output: PathBuf,

    /// JSON file with template data.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Header template file.
    #[arg(long)]
    header: Option<PathBuf>,

    /// Footer template file.
    #[arg(long)]
    footer: Option<PathBuf>,

    /// Cookie sent with URL requests, NAME=VALUE.
    #[arg(long = "cookie", value_name = "NAME=VALUE")]
    cookies: Vec<String>,

    /// Render URLs with the screen media type instead of print.
    #[arg(long)]
    screen_media: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    let service = ConversionService::with_config(config);

    match cli.command {
        Command::Serve(args) => run_server(args, service).await,
        Command::Render(args) => run_render(args, service, cli.quiet).await,
    }
}

fn build_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut builder = ServiceConfig::builder().keep_temp_files(cli.debug);
    if let Some(cmd) = &cli.renderer {
        builder = builder.renderer_command(cmd.clone());
    }
    for (name, value) in parse_options(&cli.options)?.iter() {
        builder = builder.default_option(name, value.clone());
    }
    for asset in &cli.assets {
        builder = builder.asset_override(asset.clone());
    }
    if let Some(secs) = cli.timeout {
        builder = builder.render_timeout(Duration::from_secs(secs));
    }
    if let Some(dir) = &cli.temp_dir {
        builder = builder.temp_dir(dir.clone());
    }
    builder.build().context("Invalid configuration")
}

/// `NAME` → flag, `NAME=VALUE` → value (repeats accumulate), `!NAME` → drop.
fn parse_options(raw: &[String]) -> Result<RenderOptions> {
    let mut options = RenderOptions::new();
    for entry in raw {
        if let Some(name) = entry.strip_prefix('!') {
            options.set(name, OptionValue::Absent);
            continue;
        }
        let Some((name, value)) = entry.split_once('=') else {
            if entry.trim().is_empty() {
                bail!("Empty renderer option");
            }
            options.set(entry, OptionValue::Flag);
            continue;
        };
        let merged = match options.get(name) {
            Some(OptionValue::Scalar(prev)) => {
                OptionValue::repeated([prev.as_str(), value])
            }
            Some(OptionValue::Repeated(prev)) => {
                OptionValue::repeated(prev.iter().map(String::as_str).chain([value]))
            }
            _ => OptionValue::scalar(value),
        };
        options.set(name, merged);
    }
    Ok(options)
}

async fn run_server(args: ServeArgs, service: ConversionService) -> Result<()> {
    let credentials: StaticCredentials = args
        .users
        .as_deref()
        .unwrap_or_default()
        .parse()
        .context("Invalid --users list")?;
    if credentials.is_empty() {
        warn!("No accounts configured; every PDF request will be rejected with 401");
    } else {
        info!("{} account(s) configured", credentials.len());
    }

    info!("Renderer: {:?}", service.config().renderer_command);
    let state = AppState::new(service, Arc::new(credentials));
    let app = router(state, args.cors);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    serve(listener, app).await.context("Server error")
}

async fn run_render(args: RenderArgs, service: ConversionService, quiet: bool) -> Result<()> {
    let request = if is_url(&args.input) {
        let cookies = args
            .cookies
            .iter()
            .map(|c| {
                c.split_once('=')
                    .map(|(n, v)| (n.to_string(), v.to_string()))
                    .with_context(|| format!("Cookie '{c}' must look like NAME=VALUE"))
            })
            .collect::<Result<Vec<_>>>()?;
        RenderRequest {
            source: RenderSource::Remote {
                url: args.input.clone(),
                cookies,
                print_media_type: !args.screen_media,
            },
            ..RenderRequest::remote(&args.input)
        }
    } else {
        let markup = tokio::fs::read_to_string(&args.input)
            .await
            .with_context(|| format!("Failed to read template {}", args.input))?;
        let data = match &args.data {
            Some(path) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read data file {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Data file {} is not valid JSON", path.display()))?
            }
            None => serde_json::json!({}),
        };
        let header = read_optional(args.header.as_ref()).await?;
        let footer = read_optional(args.footer.as_ref()).await?;
        let mut request = RenderRequest::inline(markup, data);
        if let RenderSource::Inline {
            header: h,
            footer: f,
            ..
        } = &mut request.source
        {
            *h = header;
            *f = footer;
        }
        request
    };

    let bytes = service
        .render_to_file(request, &args.output)
        .await
        .with_context(|| format!("Failed to render {}", args.input))?;

    if !quiet {
        eprintln!("Wrote {} ({} bytes)", args.output.display(), bytes);
    }
    Ok(())
}

async fn read_optional(path: Option<&PathBuf>) -> Result<Option<String>> {
    match path {
        None => Ok(None),
        Some(p) => tokio::fs::read_to_string(p)
            .await
            .map(Some)
            .with_context(|| format!("Failed to read {}", p.display())),
    }
}
