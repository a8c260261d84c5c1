//! Running external rendering engines.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Timeout applied to `--version` probes.
pub const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit status.
    pub status: ExitStatus,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
    /// Wall-clock run time.
    pub elapsed: Duration,
}

impl CommandOutput {
    /// Whether the command exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Standard error if present, standard output otherwise, trimmed.
    pub fn diagnostics(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Run `command` to completion, killing it after `timeout`.
///
/// Output is captured through anonymous temporary files so a chatty child
/// cannot block on a full pipe. A timeout is reported as
/// [`io::ErrorKind::TimedOut`].
pub fn run(command: &mut Command, timeout: Duration) -> io::Result<CommandOutput> {
    let mut stdout = tempfile::tempfile()?;
    let mut stderr = tempfile::tempfile()?;

    command
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout.try_clone()?))
        .stderr(Stdio::from(stderr.try_clone()?));

    log::debug!("Running {:?}", command);
    let started = Instant::now();
    let mut child = command.spawn()?;

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("process timed out after {}s", timeout.as_secs_f32()),
            ));
        }
        thread::sleep(POLL_INTERVAL);
    };

    let elapsed = started.elapsed();
    log::debug!("Process exited with {status} after {:.3}s", elapsed.as_secs_f64());

    Ok(CommandOutput {
        status,
        stdout: read_back(&mut stdout)?,
        stderr: read_back(&mut stderr)?,
        elapsed,
    })
}

fn read_back(file: &mut File) -> io::Result<String> {
    let mut buf = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// First non-empty line printed by `bin --version`, if the binary runs.
pub fn probe_version(bin: &Path) -> Option<String> {
    let output = run(Command::new(bin).arg("--version"), VERSION_TIMEOUT).ok()?;
    if !output.success() {
        return None;
    }
    output
        .stdout
        .lines()
        .chain(output.stderr.lines())
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_output() {
        let output = run(
            Command::new("sh").args(["-c", "echo out; echo err >&2"]),
            Duration::from_secs(10),
        )
        .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.diagnostics(), "err");
    }

    #[test]
    fn test_run_reports_failure_status() {
        let output = run(
            Command::new("sh").args(["-c", "exit 3"]),
            Duration::from_secs(10),
        )
        .unwrap();
        assert!(!output.success());
        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn test_run_times_out() {
        let err = run(
            Command::new("sh").args(["-c", "sleep 5"]),
            Duration::from_millis(100),
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_probe_version_missing_binary() {
        assert_eq!(probe_version(Path::new("/nonexistent/engine")), None);
    }
}
