// src/exec/pump.rs

//! Output pumps for child processes.
//!
//! - [`spawn_line_pump`] forwards stdout lines to the instance controller
//!   until the controller stops listening, then keeps draining (and
//!   dropping) output so the child never blocks on a full pipe.
//! - [`spawn_drain`] consumes a stream, logging lines at `debug`.
//! - [`spawn_collector`] buffers stdout and stderr together for batch mode.
//!
//! Every pump is bound to a [`CancellationToken`] so it ends with its
//! instance instead of lingering on a pipe held open by a descendant.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::unit::UnitName;

/// Read one line, lossily decoded, without its line terminator.
async fn next_line<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    buf: &mut Vec<u8>,
) -> io::Result<Option<String>> {
    buf.clear();
    let n = reader.read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Forward lines from `reader` over `tx`.
///
/// Once `tx`'s receiver is dropped the pump switches to discard mode. The
/// task ends at EOF, on a read error, or when `token` is cancelled.
pub fn spawn_line_pump<R>(
    unit: UnitName,
    reader: R,
    tx: mpsc::Sender<String>,
    token: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut forwarding = true;

        loop {
            let line = tokio::select! {
                _ = token.cancelled() => break,
                line = next_line(&mut reader, &mut buf) => line,
            };

            match line {
                Ok(Some(line)) => {
                    trace!(unit = %unit, "stdout: {}", line);
                    if forwarding && tx.send(line).await.is_err() {
                        debug!(unit = %unit, "readiness scan finished; discarding further stdout");
                        forwarding = false;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(unit = %unit, error = %e, "stdout read failed");
                    break;
                }
            }
        }

        debug!(unit = %unit, "stdout pump ended");
    })
}

/// Consume `reader` to keep the pipe flowing, logging each line.
pub fn spawn_drain<R>(unit: UnitName, reader: R, token: CancellationToken) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            let line = tokio::select! {
                _ = token.cancelled() => break,
                line = next_line(&mut reader, &mut buf) => line,
            };
            match line {
                Ok(Some(line)) => debug!(unit = %unit, "stderr: {}", line),
                Ok(None) | Err(_) => break,
            }
        }
    })
}

/// Buffer stdout and stderr lines, in arrival order, until both streams end.
pub fn spawn_collector<O, E>(
    stdout: Option<O>,
    stderr: Option<E>,
    token: CancellationToken,
) -> JoinHandle<Vec<String>>
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        if let Some(stdout) = stdout {
            spawn_forwarder(stdout, tx.clone(), token.clone());
        }
        if let Some(stderr) = stderr {
            spawn_forwarder(stderr, tx.clone(), token.clone());
        }
        drop(tx);

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        lines
    })
}

fn spawn_forwarder<R>(reader: R, tx: mpsc::UnboundedSender<String>, token: CancellationToken)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            let line = tokio::select! {
                _ = token.cancelled() => break,
                line = next_line(&mut reader, &mut buf) => line,
            };
            match line {
                Ok(Some(line)) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
    });
}
