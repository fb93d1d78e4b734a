//! Firefox child process ownership
//!
//! A watcher task owns the child. It resolves the close notification when the
//! process exits and kills the process when termination is requested.

use anyhow::Result;
use extrun_core::BrowserProcess;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct FirefoxProcess {
    pid: Option<u32>,
    shutdown: CancellationToken,
}

impl BrowserProcess for FirefoxProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn kill(&self) -> Result<()> {
        self.shutdown.cancel();
        Ok(())
    }
}

/// Hand `child` to a watcher task. Returns the process handle and its close notification.
pub fn watch_child(mut child: Child) -> (FirefoxProcess, oneshot::Receiver<()>) {
    let pid = child.id();
    let shutdown = CancellationToken::new();
    let (closed_tx, closed_rx) = oneshot::channel();

    if let Some(stdout) = child.stdout.take() {
        forward_output("stdout", stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        forward_output("stderr", stderr);
    }

    let token = shutdown.clone();
    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            _ = token.cancelled() => {
                debug!(pid = ?pid, "Killing Firefox");
                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill Firefox: {}", e);
                }
                child.wait().await
            }
        };

        match status {
            Ok(status) => info!("Firefox closed ({})", status),
            Err(e) => warn!("Failed to wait for Firefox: {}", e),
        }
        let _ = closed_tx.send(());
    });

    (FirefoxProcess { pid, shutdown }, closed_rx)
}

/// Log each output line of the browser at debug level
fn forward_output<R>(stream: &'static str, output: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(output).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(stream, "Firefox: {}", line);
        }
    });
}
