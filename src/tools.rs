use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::ToolError;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Runs an external program to completion and returns its stdout.
///
/// Both pipes are drained on background threads so a chatty tool cannot
/// block on a full pipe while we poll for the deadline. On expiry the child
/// is killed and reaped and the reader threads are detached: a process the
/// tool spawned may still hold the pipes open, and its output is not waited
/// for.
pub fn run_tool(mut command: Command, timeout: Option<Duration>) -> Result<Vec<u8>, ToolError> {
    let program = command.get_program().to_string_lossy().into_owned();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|source| ToolError::Spawn {
        program: program.clone(),
        source,
    })?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let waited = match timeout {
        Some(limit) => wait_with_deadline(&mut child, limit),
        None => child.wait().map(Some),
    };

    let status = match waited {
        Ok(Some(status)) => status,
        Ok(None) => {
            return Err(ToolError::TimedOut {
                program,
                timeout: timeout.unwrap_or_default(),
            });
        }
        Err(source) => return Err(ToolError::Wait { program, source }),
    };

    let stdout = collect_output(&program, stdout)?;
    let stderr = collect_output(&program, stderr)?;

    if !status.success() {
        return Err(ToolError::Status {
            program,
            code: status.code(),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }

    Ok(stdout)
}

pub fn command_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

fn wait_with_deadline(child: &mut Child, limit: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            // The child may exit between try_wait and kill.
            let _ = child.kill();
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn collect_output(
    program: &str,
    handle: Option<JoinHandle<io::Result<Vec<u8>>>>,
) -> Result<Vec<u8>, ToolError> {
    let Some(handle) = handle else {
        return Ok(Vec::new());
    };
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("output reader thread panicked")))
        .map_err(|source| ToolError::Output {
            program: program.to_string(),
            source,
        })
}
