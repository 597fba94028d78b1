use super::{fetch_pod, pod_error, select_container};
use crate::error::{ApiFailure, GatewayError, Result};
use crate::resources::PodTarget;
use futures::{AsyncBufReadExt, Stream, StreamExt};
use kube::api::LogParams;
use kube::Client;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, instrument};

/// Options for reading a container's log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogRequest {
    /// Only the last N lines; `None` returns everything the kubelet holds
    pub tail_lines: Option<i64>,
    /// Log of the previous (crashed) container instance
    pub previous: bool,
    pub since_seconds: Option<i64>,
    pub timestamps: bool,
}

impl LogRequest {
    pub fn tail(lines: i64) -> Self {
        Self {
            tail_lines: Some(lines),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn previous(mut self) -> Self {
        self.previous = true;
        self
    }

    fn params(&self, container: String, follow: bool) -> LogParams {
        LogParams {
            container: Some(container),
            follow,
            tail_lines: self.tail_lines,
            previous: self.previous,
            since_seconds: self.since_seconds,
            timestamps: self.timestamps,
            ..Default::default()
        }
    }
}

/// Reads pod logs
#[derive(Clone)]
pub struct LogStreamer {
    client: Client,
}

impl LogStreamer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetch the log as lines
    #[instrument(skip(self), fields(namespace = %target.namespace, pod = %target.pod))]
    pub async fn fetch(&self, target: &PodTarget, request: &LogRequest) -> Result<Vec<String>> {
        let (pods, pod) = fetch_pod(&self.client, target).await?;
        let container = select_container(&pod, target.container.as_deref())?;

        let text = pods
            .logs(&target.pod, &request.params(container.clone(), false))
            .await
            .map_err(|e| pod_error(ApiFailure::from(e), target))?;

        let lines = bounded_lines(&text, request.tail_lines);
        debug!(container = %container, lines = lines.len(), "fetched pod logs");
        Ok(lines)
    }

    /// Follow the log until the container stops or the stream is closed
    #[instrument(skip(self), fields(namespace = %target.namespace, pod = %target.pod))]
    pub async fn follow(&self, target: &PodTarget, request: &LogRequest) -> Result<LogStream> {
        let (pods, pod) = fetch_pod(&self.client, target).await?;
        let container = select_container(&pod, target.container.as_deref())?;

        let reader = pods
            .log_stream(&target.pod, &request.params(container.clone(), true))
            .await
            .map_err(|e| pod_error(ApiFailure::from(e), target))?;

        debug!(container = %container, "following pod logs");

        let source = target.reference().to_string();
        let lines = reader.lines().map(move |line| {
            line.map_err(|e| GatewayError::TransientNetwork {
                target: source.clone(),
                message: e.to_string(),
                code: None,
            })
        });
        Ok(LogStream::new(lines))
    }
}

/// Split a log body into lines, keeping at most the last `tail` of them
fn bounded_lines(text: &str, tail: Option<i64>) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let skip = match tail {
        Some(n) => lines
            .len()
            .saturating_sub(usize::try_from(n.max(0)).unwrap_or(usize::MAX)),
        None => 0,
    };
    lines[skip..].iter().map(|l| (*l).to_string()).collect()
}

type LineStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A followed log, one line per item
///
/// Ends when the remote side closes, after [`LogStream::close`], or when
/// dropped. Closing drops the underlying connection immediately.
pub struct LogStream {
    inner: Option<LineStream>,
}

impl LogStream {
    pub fn new(lines: impl Stream<Item = Result<String>> + Send + 'static) -> Self {
        Self {
            inner: Some(Box::pin(lines)),
        }
    }

    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            debug!("closed log stream");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl Stream for LogStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match inner.as_mut().poll_next(cx) {
            Poll::Ready(None) => {
                self.inner = None;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}
