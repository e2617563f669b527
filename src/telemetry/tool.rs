use std::ffi::OsStr;
use std::io::{ErrorKind, Read};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs an external tool and returns its stdout.
///
/// A missing binary, a non-zero exit and running past `timeout` are all
/// errors; on timeout the child is killed before returning. Collecting the
/// output is bounded by the same deadline.
pub fn run<I, S>(program: &str, args: I, timeout: Duration) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::ToolUnavailable(program.to_string()),
            _ => Error::Io(e),
        })?;

    // drained on a separate thread so a chatty tool can't block on a full pipe
    let reader = child.stdout.take().map(|mut stdout| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = tx.send(stdout.read_to_end(&mut buf).map(|_| buf));
        });
        rx
    });

    let started = Instant::now();
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();

                return Err(Error::ToolTimeout {
                    tool: program.to_string(),
                    timeout,
                });
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    };

    // a process the tool left behind may hold the pipe open past its exit
    let output = match reader {
        Some(rx) => match rx.recv_timeout(timeout.saturating_sub(started.elapsed()).max(POLL_INTERVAL)) {
            Ok(res) => res?,
            Err(RecvTimeoutError::Timeout) => {
                return Err(Error::ToolTimeout {
                    tool: program.to_string(),
                    timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(Error::malformed(format!("{} output reader stopped", program)))
            }
        },
        None => Vec::new(),
    };

    if !status.success() {
        return Err(Error::ToolFailed {
            tool: program.to_string(),
            status: status.code().unwrap_or(-1),
        });
    }

    Ok(output)
}
