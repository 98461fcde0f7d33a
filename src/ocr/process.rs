//! Running external recognizers under a time budget.

use std::io::{self, Read};
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Run `command` to completion and collect its output.
///
/// With a budget, the child is killed once the budget runs out and the call
/// fails with [`io::ErrorKind::TimedOut`]. Pipes are drained on helper
/// threads so a child writing a lot of output never stalls on a full pipe.
pub fn output_within(command: &mut Command, budget: Option<Duration>) -> io::Result<Output> {
    let Some(budget) = budget else {
        return command.output();
    };

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + budget;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                warn!(
                    "Killing {:?} after {}s",
                    command.get_program(),
                    budget.as_secs()
                );
                let _ = child.kill();
                let _ = child.wait();
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("killed after {}s", budget.as_secs()),
                ));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                return Err(e);
            }
        }
    };

    Ok(Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn collect(reader: JoinHandle<Vec<u8>>) -> Vec<u8> {
    reader.join().unwrap_or_default()
}
