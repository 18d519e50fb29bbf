//! Renderer invocation: run wkhtmltopdf once and classify what happened.
//!
//! ## Process lifetime
//!
//! Every [`run`] owns exactly one child process and reaps it before
//! returning, whatever the outcome:
//!
//! * normal exit: `wait()` collects the status;
//! * timeout: the child is killed (`SIGKILL`) and waited on. The deadline
//!   also bounds draining the pipes after a normal exit;
//! * the `run` future is dropped mid-flight (client disconnected): the
//!   command is spawned with `kill_on_drop(true)`, so tokio kills the child
//!   and reaps it in the background.
//!
//! stdout and stderr are drained by two reader tasks while the child runs.
//! Reading only after `wait()` would deadlock as soon as the renderer fills
//! the pipe buffer (a PDF is usually larger than 64 KiB).

use crate::config::ServiceConfig;
use crate::pipeline::input::ResolvedPage;
use crate::pipeline::options::{encode, RenderOptions};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long to wait for the pipes to close after killing a timed-out child.
/// A grandchild that inherited stdout could otherwise keep them open forever.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Where the renderer writes the PDF.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputTarget {
    /// `-`: the PDF arrives on stdout.
    #[default]
    Stdout,
    /// The renderer writes the PDF to this path itself.
    File(PathBuf),
}

impl OutputTarget {
    fn as_arg(&self) -> String {
        match self {
            OutputTarget::Stdout => "-".to_string(),
            OutputTarget::File(p) => p.to_string_lossy().into_owned(),
        }
    }
}

/// A fully resolved renderer invocation.
#[derive(Debug, Clone)]
pub struct RenderJob {
    argv: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl RenderJob {
    /// Compose the invocation for `pages`.
    ///
    /// argv = renderer command ++ encoded options ++ pages ++ [output], where
    /// the options are the configured defaults overlaid with `overrides` and
    /// `encoding=utf8` unless either of them mentions `encoding`.
    pub fn new(
        config: &ServiceConfig,
        pages: &[&ResolvedPage],
        output: &OutputTarget,
        overrides: &RenderOptions,
    ) -> Self {
        let mut options = config.default_options.clone();
        options.merge(overrides);
        options.set_default("encoding", "utf8");

        let mut argv = config.renderer_command.clone();
        argv.extend(encode(&options));
        argv.extend(pages.iter().map(|page| page.as_arg().to_string()));
        argv.push(output.as_arg());

        Self {
            argv,
            env: config.renderer_env.clone(),
            timeout: config.render_timeout,
        }
    }

    /// Build a job from a raw argument vector (program first).
    pub fn from_argv(argv: Vec<String>) -> Self {
        Self {
            argv,
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

/// What a single renderer run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Exit status 0; stdout bytes (the PDF when writing to `-`).
    Success(Vec<u8>),
    /// The renderer ran and reported failure.
    ProcessFailure {
        /// Exit code, `None` when the process died from a signal.
        code: Option<i32>,
        stderr: String,
    },
    /// The deadline passed; the process was killed. Carries partial output.
    TimedOut {
        after: Duration,
        stdout: Vec<u8>,
        stderr: String,
    },
    /// The renderer could not be started at all.
    SpawnError { program: String, reason: String },
}

impl RenderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RenderOutcome::Success(_))
    }
}

/// Spawn the renderer for `job` and wait for it.
pub async fn run(job: RenderJob) -> RenderOutcome {
    let program = job.program().to_string();
    if program.is_empty() {
        return RenderOutcome::SpawnError {
            program,
            reason: "renderer command is empty".into(),
        };
    }

    debug!("CMDLINE: {:?} env={:?}", job.argv, job.env);

    let mut command = Command::new(&program);
    command
        .args(&job.argv[1..])
        .envs(&job.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let started = Instant::now();
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to start renderer '{}': {}", program, e);
            return RenderOutcome::SpawnError {
                program,
                reason: e.to_string(),
            };
        }
    };

    let mut stdout_task = child.stdout.take().map(drain);
    let mut stderr_task = child.stderr.take().map(drain);
    let mut stdout_buf = None;
    let mut stderr_buf = None;

    // The deadline covers the pipes as well as the exit: a helper that
    // inherited stdout can hold it open long after the renderer is gone.
    let finished = async {
        let status = child.wait().await;
        stdout_buf = Some(join(&mut stdout_task).await);
        stderr_buf = Some(join(&mut stderr_task).await);
        status
    };
    let waited = match job.timeout {
        Some(limit) => tokio::time::timeout(limit, finished).await.ok(),
        None => Some(finished.await),
    };

    let status = match waited {
        Some(Ok(status)) => status,
        Some(Err(e)) => {
            warn!("Waiting for renderer '{}' failed: {}", program, e);
            if let Err(e) = child.kill().await {
                warn!("Could not kill renderer '{}': {}", program, e);
            }
            return RenderOutcome::SpawnError {
                program,
                reason: format!("lost track of the renderer process: {e}"),
            };
        }
        None => {
            let after = started.elapsed();
            match child.try_wait() {
                Ok(Some(status)) => warn!(
                    "Renderer '{}' exited with {} but kept its pipes open past {:?}",
                    program,
                    status,
                    job.timeout.unwrap_or_default()
                ),
                _ => {
                    warn!(
                        "Renderer '{}' exceeded {:?}; killing it",
                        program,
                        job.timeout.unwrap_or_default()
                    );
                    if let Err(e) = child.kill().await {
                        warn!("Could not kill renderer '{}': {}", program, e);
                    }
                }
            }
            let stdout = match stdout_buf {
                Some(buf) => buf,
                None => collect(stdout_task, DRAIN_GRACE).await,
            };
            let stderr = match stderr_buf {
                Some(buf) => buf,
                None => collect(stderr_task, DRAIN_GRACE).await,
            };
            return RenderOutcome::TimedOut {
                after,
                stdout,
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            };
        }
    };

    let stdout = stdout_buf.unwrap_or_default();
    let stderr = stderr_buf.unwrap_or_default();
    info!(
        "Renderer exited with {} after {}ms ({} bytes on stdout)",
        status,
        started.elapsed().as_millis(),
        stdout.len()
    );

    if status.success() {
        RenderOutcome::Success(stdout)
    } else {
        RenderOutcome::ProcessFailure {
            code: status.code(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        }
    }
}

fn drain<R>(mut pipe: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("Renderer pipe closed with error: {}", e);
        }
        buf
    })
}

/// Wait for a reader task to hit EOF. The handle is cleared once joined so
/// a later [`collect`] never polls a finished task.
async fn join(task: &mut Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(handle) = task.as_mut() else {
        return Vec::new();
    };
    let joined = handle.await;
    *task = None;
    joined.unwrap_or_default()
}

/// Join a reader task, giving up after `grace`.
async fn collect(task: Option<JoinHandle<Vec<u8>>>, grace: Duration) -> Vec<u8> {
    let Some(mut task) = task else {
        return Vec::new();
    };
    match tokio::time::timeout(grace, &mut task).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            task.abort();
            debug!("Gave up draining renderer output after {:?}", grace);
            Vec::new()
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::pipeline::options::OptionValue;
    use std::path::Path;
    use tempfile::TempDir;

    /// Write a renderer script and return the command that runs it through `sh`.
    fn script(dir: &TempDir, body: &str) -> Vec<String> {
        let path = dir.path().join("renderer.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        vec!["/bin/sh".to_string(), path.to_string_lossy().into_owned()]
    }

    #[test]
    fn job_composes_argv_in_order() {
        let config = ServiceConfig {
            renderer_command: vec!["xvfb-run".into(), "wkhtmltopdf".into()],
            ..ServiceConfig::default()
        };
        let overrides = RenderOptions::new()
            .with("print-media-type", true)
            .with("cookie", OptionValue::tuples([["sessionid", "abc"]]));
        let page = ResolvedPage::Remote("http://x/page".into());
        let job = RenderJob::new(
            &config,
            &[&page],
            &OutputTarget::Stdout,
            &overrides,
        );
        assert_eq!(
            job.argv(),
            [
                "xvfb-run",
                "wkhtmltopdf",
                "--cookie",
                "sessionid",
                "abc",
                "--encoding",
                "utf8",
                "--print-media-type",
                "--quiet",
                "http://x/page",
                "-",
            ]
        );
    }

    #[test]
    fn overrides_can_cancel_defaults_and_encoding() {
        let overrides = RenderOptions::new()
            .with("quiet", OptionValue::Absent)
            .with("encoding", "latin1");
        let page = ResolvedPage::Materialized {
            path: "/tmp/page.html".into(),
            _guard: None,
        };
        let job = RenderJob::new(
            &ServiceConfig::default(),
            &[&page],
            &OutputTarget::File("/tmp/out.pdf".into()),
            &overrides,
        );
        assert_eq!(
            job.argv(),
            ["wkhtmltopdf", "--encoding", "latin1", "/tmp/page.html", "/tmp/out.pdf"]
        );
    }

    #[tokio::test]
    async fn zero_exit_yields_stdout_bytes() {
        let dir = TempDir::new().unwrap();
        let argv = script(&dir, "printf '%%PDF-1.4 fake'");
        let outcome = run(RenderJob::from_argv(argv)).await;
        assert_eq!(outcome, RenderOutcome::Success(b"%PDF-1.4 fake".to_vec()));
    }

    #[tokio::test]
    async fn large_output_does_not_deadlock() {
        let dir = TempDir::new().unwrap();
        let argv = script(&dir, "head -c 1048576 /dev/zero");
        let outcome = run(RenderJob::from_argv(argv).with_timeout(Some(Duration::from_secs(20)))).await;
        match outcome {
            RenderOutcome::Success(bytes) => assert_eq!(bytes.len(), 1_048_576),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn arguments_reach_the_renderer() {
        let dir = TempDir::new().unwrap();
        let mut argv = script(&dir, r#"printf '%s|' "$@""#);
        argv.extend(["--quiet".to_string(), "page.html".to_string(), "-".to_string()]);
        let outcome = run(RenderJob::from_argv(argv)).await;
        assert_eq!(outcome, RenderOutcome::Success(b"--quiet|page.html|-|".to_vec()));
    }

    #[tokio::test]
    async fn environment_overrides_are_visible() {
        let dir = TempDir::new().unwrap();
        let argv = script(&dir, r#"printf '%s' "$PDF_TEST_MARKER""#);
        let outcome = run(RenderJob::from_argv(argv).with_env("PDF_TEST_MARKER", "42")).await;
        assert_eq!(outcome, RenderOutcome::Success(b"42".to_vec()));
    }

    #[tokio::test]
    async fn non_zero_exit_carries_code_and_stderr() {
        let dir = TempDir::new().unwrap();
        let argv = script(&dir, "echo 'Exit with code 1 due to network error: HostNotFoundError' >&2\nexit 3");
        match run(RenderJob::from_argv(argv)).await {
            RenderOutcome::ProcessFailure { code, stderr } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("HostNotFoundError"));
            }
            other => panic!("expected process failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_kills_and_reaps_the_renderer() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        let argv = script(
            &dir,
            &format!("echo $$ > '{}'\nprintf partial\nexec sleep 30", pid_file.display()),
        );

        let started = Instant::now();
        let outcome =
            run(RenderJob::from_argv(argv).with_timeout(Some(Duration::from_millis(500)))).await;
        assert!(started.elapsed() < Duration::from_secs(10));

        match outcome {
            RenderOutcome::TimedOut { after, stdout, .. } => {
                assert!(after >= Duration::from_millis(500));
                assert_eq!(stdout, b"partial");
            }
            other => panic!("expected timeout, got {other:?}"),
        }

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let proc_entry = format!("/proc/{}", pid.trim());
        if Path::new("/proc/self").exists() {
            assert!(!Path::new(&proc_entry).exists(), "renderer {pid} still around");
        }
    }

    #[tokio::test]
    async fn timeout_covers_pipes_held_open_after_exit() {
        let dir = TempDir::new().unwrap();
        let argv = script(&dir, "sleep 8 &\nprintf PDF\nexit 0");

        let started = Instant::now();
        let outcome =
            run(RenderJob::from_argv(argv).with_timeout(Some(Duration::from_millis(500)))).await;
        let elapsed = started.elapsed();

        assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
        match outcome {
            RenderOutcome::TimedOut { after, .. } => {
                assert!(after >= Duration::from_millis(500));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let argv = vec!["/nonexistent/bin/wkhtmltopdf".to_string(), "-".to_string()];
        match run(RenderJob::from_argv(argv)).await {
            RenderOutcome::SpawnError { program, reason } => {
                assert_eq!(program, "/nonexistent/bin/wkhtmltopdf");
                assert!(!reason.is_empty());
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_command_is_a_spawn_error() {
        let outcome = run(RenderJob::from_argv(Vec::new())).await;
        assert!(matches!(outcome, RenderOutcome::SpawnError { .. }));
    }
}
