//! External encoder invocation.
//!
//! The encoder is run as an argument vector, never through a shell. The
//! shell rendering produced by [`EncoderCommand::to_shell_string`] exists for
//! logs and reports only.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use heliomovie_common::config::EncoderConfig;
use heliomovie_common::error::{MovieError, MovieResult};
use heliomovie_movie_model::ProfileKind;

/// A fully-resolved encoder command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl EncoderCommand {
    /// Shell-quoted rendering, one opaque token per argument.
    pub fn to_shell_string(&self) -> String {
        let program = self.program.to_string_lossy();
        let words = std::iter::once(program.as_ref()).chain(self.args.iter().map(String::as_str));
        shlex::try_join(words)
            .unwrap_or_else(|e| format!("<unprintable command {:?}: {e}>", self.program))
    }
}

/// Everything needed to encode one profile of one job.
#[derive(Debug, Clone)]
pub struct EncodeRequest<'a> {
    pub job_id: &'a str,
    pub working_dir: &'a Path,
    /// Numeric frame pattern, e.g. `<dir>/frame%03d.jpg`.
    pub frame_pattern: &'a Path,
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
    pub profile: ProfileKind,
    pub timeout: Duration,
}

/// Outcome of a successful encoder run.
#[derive(Debug, Clone)]
pub struct EncodeResult {
    pub profile: ProfileKind,
    pub path: PathBuf,
    pub exit_code: i32,
    /// Encoder stderr, trimmed.
    pub diagnostics: String,
    pub elapsed: Duration,
}

/// Runs the external encoder binary.
#[derive(Debug, Clone)]
pub struct EncoderInvoker {
    program: PathBuf,
}

impl EncoderInvoker {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn from_config(config: &EncoderConfig) -> Self {
        Self::new(&config.ffmpeg_path)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Whether the encoder binary can be started (`<program> -version`).
    pub fn is_available(&self) -> bool {
        std::process::Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Build the command for `req`, returning it with the artifact path.
    pub fn build_command(&self, req: &EncodeRequest<'_>) -> MovieResult<(EncoderCommand, PathBuf)> {
        let profile = req.profile.profile();
        let name = req.profile.name();

        // Paths are the only externally derived strings; absolute paths can
        // never be mistaken for options.
        let input = path_arg(name, req.frame_pattern)?;
        let artifact = req.working_dir.join(profile.artifact_name(req.job_id));
        let output = path_arg(name, &artifact)?;

        let (width, height) = profile.output_geometry(req.width, req.height);

        let mut args: Vec<String> = [
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostdin",
            "-framerate",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(req.frame_rate.to_string());
        args.extend(["-start_number".to_string(), "0".to_string()]);
        args.extend(["-i".to_string(), input]);
        args.extend(["-c:v".to_string(), profile.codec.to_string()]);
        args.extend(profile.params.iter().map(|s| s.to_string()));
        args.extend(["-pix_fmt".to_string(), profile.pixel_format.to_string()]);
        args.extend(["-s".to_string(), format!("{width}x{height}")]);
        args.push("-an".to_string());
        args.extend(["-f".to_string(), profile.container.to_string()]);
        args.push(output);

        Ok((
            EncoderCommand {
                program: self.program.clone(),
                args,
            },
            artifact,
        ))
    }

    /// Run the encoder for one profile.
    ///
    /// Returns once the process exits, is killed after `req.timeout`, or is
    /// killed because `cancel` fired.
    pub async fn invoke(
        &self,
        req: &EncodeRequest<'_>,
        cancel: &CancellationToken,
    ) -> MovieResult<EncodeResult> {
        let name = req.profile.name();
        let (command, artifact) = self.build_command(req)?;
        tracing::debug!(profile = name, command = %command.to_shell_string(), "Running encoder");

        let started = Instant::now();
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(req.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                MovieError::encoder(
                    name,
                    None,
                    format!("failed to start {}: {e}", command.program.display()),
                )
            })?;

        // Drain stderr concurrently so the encoder never blocks on a full pipe.
        let stderr = child.stderr.take();
        let drain = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut stderr) = stderr {
                if let Err(e) = stderr.read_to_string(&mut buf).await {
                    buf.push_str(&format!("<failed to read encoder stderr: {e}>"));
                }
            }
            buf
        });

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| {
                MovieError::encoder(name, None, format!("failed to wait on encoder: {e}"))
            })?,
            _ = tokio::time::sleep(req.timeout) => {
                terminate(&mut child, name).await;
                drain.abort();
                tracing::warn!(profile = name, timeout_secs = req.timeout.as_secs_f64(), "Encoder timed out");
                return Err(MovieError::EncoderTimeout {
                    profile: name.to_string(),
                    timeout: req.timeout,
                });
            }
            _ = cancel.cancelled() => {
                terminate(&mut child, name).await;
                drain.abort();
                return Err(MovieError::Cancelled);
            }
        };

        let diagnostics = drain.await.unwrap_or_default().trim().to_string();
        let elapsed = started.elapsed();

        if !status.success() {
            let message = if diagnostics.is_empty() {
                format!("encoder exited with {status}")
            } else {
                diagnostics
            };
            return Err(MovieError::encoder(name, status.code(), message));
        }

        let size = std::fs::metadata(&artifact).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(MovieError::encoder(
                name,
                status.code(),
                format!("encoder produced no artifact at {}", artifact.display()),
            ));
        }

        tracing::info!(
            profile = name,
            path = %artifact.display(),
            bytes = size,
            elapsed_ms = elapsed.as_millis() as u64,
            "Encoded movie"
        );

        Ok(EncodeResult {
            profile: req.profile,
            path: artifact,
            exit_code: status.code().unwrap_or(0),
            diagnostics,
            elapsed,
        })
    }
}

fn path_arg(profile: &str, path: &Path) -> MovieResult<String> {
    if !path.is_absolute() {
        return Err(MovieError::encoder(
            profile,
            None,
            format!("encoder path must be absolute: {}", path.display()),
        ));
    }
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| {
            MovieError::encoder(
                profile,
                None,
                format!("encoder path is not valid UTF-8: {}", path.display()),
            )
        })
}

async fn terminate(child: &mut Child, profile: &str) {
    if let Err(e) = child.kill().await {
        tracing::warn!(profile, error = %e, "Failed to kill encoder");
    }
}
