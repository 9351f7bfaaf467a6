//! Launch the proxy and supervise it until it exits
//!
//! The child's stdout is forwarded as it arrives. SIGINT/SIGTERM received by
//! this process are passed on to the child as SIGTERM, followed by SIGKILL
//! once the grace period runs out. The child is spawned with
//! `kill_on_drop`, so it never outlives the supervisor.

use crate::config::ProxySettings;
use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

const FORWARD_BUFFER_SIZE: usize = 1024;

/// Program, arguments and shutdown policy of the proxy process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyCommand {
    pub program: String,
    pub args: Vec<String>,
    pub grace_period: Duration,
}

impl ProxyCommand {
    pub fn new(program: &str, args: Vec<String>, grace_period: Duration) -> Self {
        Self {
            program: program.to_string(),
            args,
            grace_period,
        }
    }

    pub fn from_settings(settings: &ProxySettings) -> anyhow::Result<Self> {
        let mut argv = settings.argv().map_err(|e| anyhow::anyhow!(e))?;
        let program = argv.remove(0);
        Ok(Self {
            program,
            args: argv,
            grace_period: settings.shutdown_grace_period(),
        })
    }
}

pub struct ProxySupervisor {
    command: ProxyCommand,
}

impl ProxySupervisor {
    pub fn new(command: ProxyCommand) -> Self {
        Self { command }
    }

    fn spawn(&self) -> anyhow::Result<Child> {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());
        cmd.kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            anyhow::anyhow!("Failed to start proxy '{}': {}", self.command.program, e)
        })?;
        info!(
            program = %self.command.program,
            args = ?self.command.args,
            pid = child.id().unwrap_or(0),
            "Proxy process spawned"
        );
        Ok(child)
    }

    /// Run the proxy, forwarding its stdout to this process's stdout
    pub async fn run(&self) -> anyhow::Result<ExitStatus> {
        self.run_with_output(tokio::io::stdout()).await
    }

    /// Run the proxy, forwarding its stdout to `output`
    pub async fn run_with_output<W>(&self, output: W) -> anyhow::Result<ExitStatus>
    where
        W: AsyncWrite + Unpin,
    {
        self.run_with_shutdown(output, shutdown_signal()).await
    }

    /// Run the proxy until it exits or `shutdown` resolves. `shutdown`
    /// yields the name of the trigger for logging.
    pub async fn run_with_shutdown<W, S>(
        &self,
        output: W,
        shutdown: S,
    ) -> anyhow::Result<ExitStatus>
    where
        W: AsyncWrite + Unpin,
        S: Future<Output = &'static str>,
    {
        let mut child = self.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Proxy stdout was not captured"))?;

        tokio::pin!(shutdown);

        let signal = tokio::select! {
            result = forward_output(stdout, output) => {
                match result {
                    Ok(bytes) => debug!(bytes, "Proxy output closed"),
                    Err(e) => warn!(error = %e, "Error forwarding proxy output"),
                }
                None
            }
            signal = &mut shutdown => Some(signal),
        };

        let signal = match signal {
            Some(signal) => signal,
            None => tokio::select! {
                status = child.wait() => {
                    let status = status?;
                    info!(?status, "Proxy process exited");
                    return Ok(status);
                }
                signal = &mut shutdown => signal,
            },
        };

        info!(signal, "Received shutdown signal, stopping proxy");
        self.stop(&mut child).await
    }

    async fn stop(&self, child: &mut Child) -> anyhow::Result<ExitStatus> {
        if let Some(pid) = child.id() {
            info!(pid, "Sending SIGTERM to proxy");

            #[cfg(unix)]
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }

            #[cfg(not(unix))]
            {
                let _ = child.start_kill();
            }
        }

        match tokio::time::timeout(self.command.grace_period, child.wait()).await {
            Ok(status) => {
                let status = status?;
                info!(?status, "Proxy exited gracefully");
                Ok(status)
            }
            Err(_) => {
                warn!(
                    grace_period_secs = self.command.grace_period.as_secs(),
                    "Grace period exceeded, sending SIGKILL"
                );
                child.kill().await?;
                Ok(child.wait().await?)
            }
        }
    }
}

/// Copy bytes from `reader` to `writer` as they arrive, flushing each chunk.
/// Returns the number of bytes forwarded once `reader` reaches EOF.
pub async fn forward_output<R, W>(mut reader: R, mut writer: W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; FORWARD_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        total += n as u64;
    }

    Ok(total)
}

/// Resolves with the name of the first termination signal received
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c() => "SIGINT",
                    _ = sigterm.recv() => "SIGTERM",
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                ctrl_c().await;
                "SIGINT"
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
        "Ctrl+C"
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
