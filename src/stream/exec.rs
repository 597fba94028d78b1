use super::{fetch_pod, select_container};
use crate::error::{GatewayError, Result};
use crate::resources::PodTarget;
use futures::{Sink, SinkExt};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams, AttachedProcess};
use kube::Client;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, info, instrument, warn};

/// One command invocation in a pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSession {
    pub target: PodTarget,
    pub command: Vec<String>,
    /// Attach stdin and hand back a duplex stream instead of collected output
    pub interactive: bool,
    pub tty: bool,
}

impl ExecSession {
    pub fn new(target: PodTarget, command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            target,
            command: command.into_iter().map(Into::into).collect(),
            interactive: false,
            tty: false,
        }
    }

    /// Run `line` through `/bin/sh -c`
    pub fn shell(target: PodTarget, line: impl Into<String>) -> Self {
        Self::new(target, ["/bin/sh".to_string(), "-c".to_string(), line.into()])
    }

    #[must_use]
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Allocate a terminal (implies interactive)
    #[must_use]
    pub fn tty(mut self) -> Self {
        self.interactive = true;
        self.tty = true;
        self
    }
}

/// Collected result of a non-interactive command
///
/// A non-zero `exit_code` is a successful exec of a failing command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

pub enum ExecResult {
    Completed(ExecOutput),
    Interactive(ExecStream),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub width: u16,
    pub height: u16,
}

impl From<TerminalSize> for kube::api::TerminalSize {
    fn from(size: TerminalSize) -> Self {
        kube::api::TerminalSize {
            width: size.width,
            height: size.height,
        }
    }
}

/// Exit code carried by the exec status channel
///
/// `Success` is 0 and `NonZeroExitCode` yields the reported code. Any other
/// status is an infrastructure failure and comes back as `Err(reason)`.
pub fn exit_code_from_status(status: &Value) -> std::result::Result<i32, String> {
    let field = |name: &str| status.get(name).and_then(Value::as_str).unwrap_or_default();

    if field("status") == "Success" {
        return Ok(0);
    }

    if field("reason") == "NonZeroExitCode" {
        let code = status
            .pointer("/details/causes")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find(|cause| cause.get("reason").and_then(Value::as_str) == Some("ExitCode"))
            .and_then(|cause| cause.get("message").and_then(Value::as_str))
            .and_then(|message| message.trim().parse::<i32>().ok());

        return code.ok_or_else(|| format!("unparseable exit status: {}", field("message")));
    }

    let message = field("message");
    Err(if message.is_empty() {
        "exec failed without a status message".to_string()
    } else {
        message.to_string()
    })
}

fn status_exit_code(status: Option<Status>) -> std::result::Result<i32, String> {
    let status = status.ok_or_else(|| "connection closed before an exit status arrived".to_string())?;
    let value = serde_json::to_value(&status).map_err(|e| e.to_string())?;
    exit_code_from_status(&value)
}

async fn read_all(reader: Option<impl AsyncRead + Unpin>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Runs commands in pods
#[derive(Clone)]
pub struct CommandExecutor {
    client: Client,
}

impl CommandExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Resolve the pod and container and check the pod can take an exec
    async fn prepare(&self, session: &ExecSession) -> Result<(Api<Pod>, String)> {
        let target = &session.target;
        if session.command.is_empty() {
            return Err(GatewayError::ExecFailure {
                pod: target.pod.clone(),
                reason: "command cannot be empty".to_string(),
            });
        }

        let (pods, pod) = fetch_pod(&self.client, target).await?;

        let phase = pod
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or("Unknown");
        if phase != "Running" {
            return Err(GatewayError::ExecFailure {
                pod: target.pod.clone(),
                reason: format!("pod is {phase}, not Running"),
            });
        }

        let container = select_container(&pod, target.container.as_deref())?;
        Ok((pods, container))
    }

    async fn attach(
        &self,
        session: &ExecSession,
        pods: &Api<Pod>,
        params: &AttachParams,
    ) -> Result<AttachedProcess> {
        pods.exec(&session.target.pod, session.command.clone(), params)
            .await
            .map_err(|e| GatewayError::ExecFailure {
                pod: session.target.pod.clone(),
                reason: e.to_string(),
            })
    }

    /// Run to completion and collect output
    #[instrument(skip(self), fields(namespace = %session.target.namespace, pod = %session.target.pod))]
    pub async fn run(&self, session: &ExecSession) -> Result<ExecOutput> {
        let (pods, container) = self.prepare(session).await?;
        let params = AttachParams::default()
            .container(container.as_str())
            .stdin(false)
            .stdout(true)
            .stderr(true);

        let mut attached = self.attach(session, &pods, &params).await?;
        let stdout = attached.stdout();
        let stderr = attached.stderr();
        let status = attached.take_status();

        let exec_failure = |reason: String| GatewayError::ExecFailure {
            pod: session.target.pod.clone(),
            reason,
        };

        let (stdout, stderr) = tokio::join!(read_all(stdout), read_all(stderr));
        let stdout = stdout.map_err(|e| exec_failure(format!("reading stdout: {e}")))?;
        let stderr = stderr.map_err(|e| exec_failure(format!("reading stderr: {e}")))?;

        let status = match status {
            Some(status) => status.await,
            None => None,
        };
        if let Err(e) = attached.join().await {
            debug!(error = %e, "exec connection closed with error");
        }

        let exit_code = status_exit_code(status).map_err(exec_failure)?;
        info!(container = %container, exit_code, "executed command");

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    /// Start an interactive session
    #[instrument(skip(self), fields(namespace = %session.target.namespace, pod = %session.target.pod))]
    pub async fn open(&self, session: &ExecSession) -> Result<ExecStream> {
        let (pods, container) = self.prepare(session).await?;
        let params = AttachParams::default()
            .container(container.as_str())
            .stdin(true)
            .stdout(true)
            .stderr(!session.tty)
            .tty(session.tty);

        let mut attached = self.attach(session, &pods, &params).await?;
        let status = attached
            .take_status()
            .map(|s| Box::pin(s) as StatusFuture);
        let resize = attached
            .terminal_size()
            .map(|tx| Box::pin(tx.sink_map_err(|e| e.to_string())) as ResizeSink);

        info!(container = %container, tty = session.tty, "opened exec session");
        Ok(ExecStream {
            pod: session.target.pod.clone(),
            attached: Some(attached),
            status,
            resize,
        })
    }

    /// Run or open, depending on `session.interactive`
    pub async fn execute(&self, session: &ExecSession) -> Result<ExecResult> {
        if session.interactive {
            self.open(session).await.map(ExecResult::Interactive)
        } else {
            self.run(session).await.map(ExecResult::Completed)
        }
    }
}

type StatusFuture = Pin<Box<dyn Future<Output = Option<Status>> + Send>>;
type ResizeSink = Pin<Box<dyn Sink<kube::api::TerminalSize, Error = String> + Send>>;

/// A live exec session
///
/// Each of stdin, stdout and stderr can be taken once. Dropping the stream
/// without calling [`ExecStream::wait`] or [`ExecStream::close`] aborts the
/// remote process connection.
pub struct ExecStream {
    pod: String,
    attached: Option<AttachedProcess>,
    status: Option<StatusFuture>,
    resize: Option<ResizeSink>,
}

impl ExecStream {
    pub fn stdin(&mut self) -> Option<impl AsyncWrite + Unpin + '_> {
        self.attached.as_mut()?.stdin()
    }

    pub fn stdout(&mut self) -> Option<impl AsyncRead + Unpin + '_> {
        self.attached.as_mut()?.stdout()
    }

    /// Absent for tty sessions, where stderr is merged into stdout
    pub fn stderr(&mut self) -> Option<impl AsyncRead + Unpin + '_> {
        self.attached.as_mut()?.stderr()
    }

    /// No-op for sessions without a terminal
    pub async fn resize(&mut self, size: TerminalSize) -> Result<()> {
        let Some(resize) = self.resize.as_mut() else {
            return Ok(());
        };
        resize
            .send(size.into())
            .await
            .map_err(|e| GatewayError::ExecFailure {
                pod: self.pod.clone(),
                reason: format!("resize failed: {e}"),
            })
    }

    /// Wait for the remote command to finish and return its exit code
    pub async fn wait(mut self) -> Result<i32> {
        let status = match self.status.take() {
            Some(status) => status.await,
            None => None,
        };
        if let Some(attached) = self.attached.take() {
            if let Err(e) = attached.join().await {
                debug!(error = %e, "exec connection closed with error");
            }
        }

        status_exit_code(status).map_err(|reason| GatewayError::ExecFailure {
            pod: self.pod.clone(),
            reason,
        })
    }

    /// Abort the session and release the connection
    pub fn close(mut self) {
        if let Some(attached) = self.attached.take() {
            attached.abort();
            debug!(pod = %self.pod, "closed exec session");
        }
    }
}

impl Drop for ExecStream {
    fn drop(&mut self) {
        if let Some(attached) = self.attached.take() {
            warn!(pod = %self.pod, "exec session dropped while open, aborting");
            attached.abort();
        }
    }
}
