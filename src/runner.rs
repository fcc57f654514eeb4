//! Running the wrapped test command
//!
//! Stdout is teed: every chunk goes to the console as it arrives and into a
//! capture buffer for upload. Stderr is forwarded untouched.

use crate::error::{Error, Result};
use std::io::{self, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use tracing::debug;

const CHUNK_SIZE: usize = 8 * 1024;

/// Outcome of one test command
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub succeeded: bool,
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
}

impl ExecutionResult {
    fn new(status: ExitStatus, stdout: Vec<u8>) -> Self {
        Self {
            succeeded: status.success(),
            exit_code: status.code(),
            stdout,
        }
    }
}

/// Run `args` with stdout teed to our own stdout.
pub fn run(args: &[String]) -> Result<ExecutionResult> {
    run_with_console(args, io::stdout(), io::stderr())
}

/// Run `args`, echoing the child's stdout to `console` and its stderr to
/// `errors`, and capturing stdout.
///
/// A failing exit status is not an error; only failing to start or observe
/// the process is.
pub fn run_with_console<O, E>(args: &[String], console: O, errors: E) -> Result<ExecutionResult>
where
    O: Write + Send + 'static,
    E: Write + Send + 'static,
{
    let (program, rest) = args.split_first().ok_or(Error::EmptyCommand)?;

    let mut child = Command::new(program)
        .args(rest)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| Error::Spawn {
            program: program.clone(),
            source,
        })?;

    let stdout = child.stdout.take().ok_or(Error::StreamHandle("stdout"))?;
    let stderr = child.stderr.take().ok_or(Error::StreamHandle("stderr"))?;

    let stdout_handle = thread::spawn(move || tee(stdout, console));
    let stderr_handle = thread::spawn(move || {
        forward(stderr, errors);
    });

    let status = child.wait().map_err(Error::Wait)?;

    // Both readers end at EOF once the child (and anything holding its pipes) exits.
    let captured = stdout_handle.join().unwrap_or_default();
    let _ = stderr_handle.join();

    debug!(?status, bytes = captured.len(), "test command finished");
    Ok(ExecutionResult::new(status, captured))
}

/// Copy `reader` into `console` chunk by chunk, keeping a copy of every byte.
fn tee<R: Read, W: Write>(mut reader: R, mut console: W) -> Vec<u8> {
    let mut captured = Vec::new();
    let mut buf = [0u8; CHUNK_SIZE];
    let mut console_ok = true;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "stdout read failed");
                break;
            }
        };

        captured.extend_from_slice(&buf[..n]);
        if console_ok {
            if let Err(e) = console.write_all(&buf[..n]).and_then(|_| console.flush()) {
                // Keep capturing even if nobody is watching.
                debug!(error = %e, "console write failed");
                console_ok = false;
            }
        }
    }

    captured
}

fn forward<R: Read, W: Write>(mut reader: R, mut writer: W) {
    if let Err(e) = io::copy(&mut reader, &mut writer) {
        debug!(error = %e, "stderr passthrough failed");
    }
    let _ = writer.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Writer that can be inspected after the runner has dropped its clone
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _data: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_tee_copies_everything_to_both_sides() {
        let input: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let console = SharedBuf::default();

        let captured = tee(&input[..], console.clone());

        assert_eq!(captured, input);
        assert_eq!(console.contents(), input);
    }

    #[test]
    fn test_tee_keeps_capturing_after_console_fails() {
        let captured = tee(&b"line one\nline two\n"[..], BrokenPipe);
        assert_eq!(captured, b"line one\nline two\n");
    }

    #[test]
    fn test_empty_command() {
        assert!(matches!(
            run_with_console(&[], SharedBuf::default(), SharedBuf::default()),
            Err(Error::EmptyCommand)
        ));
    }

    #[test]
    fn test_spawn_failure_is_fatal() {
        let args = vec!["definitely-not-a-real-binary-7f3a".to_string()];
        let err = run_with_console(&args, SharedBuf::default(), SharedBuf::default()).unwrap_err();
        assert!(matches!(err, Error::Spawn { program, .. } if program == "definitely-not-a-real-binary-7f3a"));
    }

    #[cfg(unix)]
    #[test]
    fn test_stdout_is_teed_and_stderr_passed_through() {
        let console = SharedBuf::default();
        let errors = SharedBuf::default();

        let result = run_with_console(
            &sh("echo out1; echo err1 >&2; echo out2"),
            console.clone(),
            errors.clone(),
        )
        .unwrap();

        assert!(result.succeeded);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, b"out1\nout2\n");
        assert_eq!(console.contents(), b"out1\nout2\n");
        assert_eq!(errors.contents(), b"err1\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_command_is_not_an_error() {
        let result = run_with_console(
            &sh("echo partial; exit 3"),
            SharedBuf::default(),
            SharedBuf::default(),
        )
        .unwrap();

        assert!(!result.succeeded);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stdout, b"partial\n");
    }
}
