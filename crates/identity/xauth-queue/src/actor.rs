//! Queue actor owning the state of one provider queue.

use crate::error::{QueueError, TransportError};
use crate::queue::{QueueSettings, QueueStats, RequestQueue};
use crate::request::{ProviderRequest, QueueResponse};
use crate::transport::HttpTransport;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use xauth_core::QueueResultCode;

enum Command {
    Submit {
        request: ProviderRequest,
        retry_count: u32,
        reply: oneshot::Sender<QueueResponse>,
    },
    Completed {
        response: QueueResponse,
        reply: oneshot::Sender<QueueResponse>,
        probe: bool,
    },
}

struct Pending {
    request: ProviderRequest,
    retry_count: u32,
    reply: oneshot::Sender<QueueResponse>,
    enqueued_at: Instant,
}

/// Handle to a running provider queue.
///
/// Clones share the same actor. The actor stops once every handle is gone and
/// the last in-flight request has completed.
#[derive(Clone)]
pub struct ProviderQueue {
    name: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
    stats: watch::Receiver<QueueStats>,
}

impl ProviderQueue {
    /// Start the queue actor on the current tokio runtime.
    pub fn spawn(
        name: impl Into<String>,
        settings: QueueSettings,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let (commands, receiver) = mpsc::unbounded_channel();
        let (stats_tx, stats) = watch::channel(QueueStats::default());

        let actor = QueueActor {
            name: name.clone(),
            settings,
            transport,
            completions: commands.downgrade(),
            pending: VecDeque::new(),
            in_flight: 0,
            offline_until: None,
            probe_in_flight: false,
            stats: QueueStats::default(),
            stats_tx,
        };
        tokio::spawn(actor.run(receiver));

        Self {
            name,
            commands,
            stats,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receiver that observes every stats change.
    pub fn subscribe_stats(&self) -> watch::Receiver<QueueStats> {
        self.stats.clone()
    }
}

impl std::fmt::Debug for ProviderQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderQueue")
            .field("name", &self.name)
            .field("stats", &*self.stats.borrow())
            .finish()
    }
}

#[async_trait]
impl RequestQueue for ProviderQueue {
    async fn enqueue(&self, request: ProviderRequest, retry_count: u32) -> QueueResponse {
        let started = Instant::now();
        let (reply, answer) = oneshot::channel();

        let command = Command::Submit {
            request,
            retry_count,
            reply,
        };
        let mut response = if self.commands.send(command).is_err() {
            closed()
        } else {
            answer.await.unwrap_or_else(|_| closed())
        };

        response.elapsed = started.elapsed();
        response
    }

    fn stats(&self) -> QueueStats {
        self.stats.borrow().clone()
    }
}

struct QueueActor {
    name: Arc<str>,
    settings: QueueSettings,
    transport: Arc<dyn HttpTransport>,
    completions: mpsc::WeakUnboundedSender<Command>,
    pending: VecDeque<Pending>,
    in_flight: usize,
    offline_until: Option<Instant>,
    probe_in_flight: bool,
    stats: QueueStats,
    stats_tx: watch::Sender<QueueStats>,
}

impl QueueActor {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        debug!(queue = %self.name, "Request queue started");

        loop {
            let deadline = self
                .pending
                .front()
                .map(|pending| pending.enqueued_at + self.settings.queue_timeout);

            tokio::select! {
                command = receiver.recv() => match command {
                    Some(Command::Submit { request, retry_count, reply }) => {
                        self.submit(request, retry_count, reply)
                    }
                    Some(Command::Completed { response, reply, probe }) => {
                        self.complete(response, reply, probe)
                    }
                    None => break,
                },
                _ = sleep_until(deadline) => self.expire_pending(),
            }

            self.publish_stats();
        }

        debug!(queue = %self.name, "Request queue stopped");
    }

    fn submit(
        &mut self,
        request: ProviderRequest,
        retry_count: u32,
        reply: oneshot::Sender<QueueResponse>,
    ) {
        self.stats.total_requests += 1;
        let now = Instant::now();

        if let Some(until) = self.offline_until {
            if now < until || self.probe_in_flight {
                let _ = reply.send(offline());
                return;
            }
            debug!(queue = %self.name, "Probing offline provider");
            self.probe_in_flight = true;
            self.start(request, retry_count, reply, true);
            return;
        }

        if self.in_flight < self.settings.max_concurrent_requests {
            self.start(request, retry_count, reply, false);
        } else if self.pending.len() < self.settings.max_queued_requests {
            self.pending.push_back(Pending {
                request,
                retry_count,
                reply,
                enqueued_at: now,
            });
        } else {
            warn!(queue = %self.name, queued = self.pending.len(), "Request queue full");
            let _ = reply.send(QueueResponse::failure(
                QueueResultCode::QueueFull,
                "Request queue is full",
            ));
        }
    }

    fn start(
        &mut self,
        request: ProviderRequest,
        retry_count: u32,
        reply: oneshot::Sender<QueueResponse>,
        probe: bool,
    ) {
        let Some(completions) = self.completions.upgrade() else {
            let _ = reply.send(closed());
            return;
        };

        self.in_flight += 1;
        let transport = self.transport.clone();
        let timeout = self.settings.request_timeout;

        tokio::spawn(async move {
            let response = execute(transport.as_ref(), &request, timeout, retry_count).await;
            let command = Command::Completed {
                response,
                reply,
                probe,
            };
            // The actor is gone; answer the caller directly.
            if let Err(mpsc::error::SendError(Command::Completed { response, reply, .. })) =
                completions.send(command)
            {
                let _ = reply.send(response);
            }
        });
    }

    fn complete(
        &mut self,
        response: QueueResponse,
        reply: oneshot::Sender<QueueResponse>,
        probe: bool,
    ) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if probe {
            self.probe_in_flight = false;
        }

        match response.result {
            QueueResultCode::Success => {
                self.stats.consecutive_errors = 0;
                if self.offline_until.take().is_some() {
                    info!(queue = %self.name, "Provider back online");
                }
            }
            QueueResultCode::Error | QueueResultCode::RequestTimeout => {
                if response.result == QueueResultCode::RequestTimeout {
                    self.stats.total_timeouts += 1;
                } else {
                    self.stats.total_errors += 1;
                }
                self.stats.consecutive_errors += 1;
                self.record_failure(probe);
            }
            _ => {}
        }

        self.publish_stats();
        let _ = reply.send(response);
        self.drain();
    }

    fn record_failure(&mut self, probe: bool) {
        let threshold = self.settings.offline_error_threshold;
        let retry_in = self.settings.offline_retry_interval;

        if probe {
            self.offline_until = Some(Instant::now() + retry_in);
            warn!(queue = %self.name, "Provider still offline");
        } else if self.offline_until.is_none()
            && threshold > 0
            && self.stats.consecutive_errors >= threshold
        {
            self.offline_until = Some(Instant::now() + retry_in);
            warn!(
                queue = %self.name,
                errors = self.stats.consecutive_errors,
                retry_in_ms = retry_in.as_millis() as u64,
                "Provider marked offline"
            );
        }
    }

    fn drain(&mut self) {
        if self.offline_until.is_some() {
            for pending in self.pending.drain(..) {
                let _ = pending.reply.send(offline());
            }
            return;
        }

        let now = Instant::now();
        while self.in_flight < self.settings.max_concurrent_requests {
            let Some(next) = self.pending.pop_front() else {
                break;
            };
            if next.reply.is_closed() {
                continue;
            }
            if now.duration_since(next.enqueued_at) >= self.settings.queue_timeout {
                let _ = next.reply.send(queue_timeout());
                continue;
            }
            self.start(next.request, next.retry_count, next.reply, false);
        }
    }

    fn expire_pending(&mut self) {
        let now = Instant::now();
        while let Some(front) = self.pending.front() {
            if now.duration_since(front.enqueued_at) < self.settings.queue_timeout {
                break;
            }
            if let Some(expired) = self.pending.pop_front() {
                debug!(queue = %self.name, "Queued request timed out");
                let _ = expired.reply.send(queue_timeout());
            }
        }
    }

    fn publish_stats(&mut self) {
        self.stats.in_flight = self.in_flight;
        self.stats.queued = self.pending.len();
        self.stats.offline = self.offline_until.is_some();
        self.stats_tx.send_replace(self.stats.clone());
    }
}

async fn execute(
    transport: &dyn HttpTransport,
    request: &ProviderRequest,
    timeout: Duration,
    retry_count: u32,
) -> QueueResponse {
    let mut attempt = 0;
    loop {
        match transport.send(request, timeout).await {
            Ok(answer) => return QueueResponse::success(answer.status, answer.body),
            Err(err) if err.is_retryable() && attempt < retry_count => {
                attempt += 1;
                debug!(attempt, error = %err, "Retrying provider request");
            }
            Err(TransportError::Timeout) => {
                return QueueResponse::failure(
                    QueueResultCode::RequestTimeout,
                    TransportError::Timeout.to_string(),
                );
            }
            Err(TransportError::Status { status, body }) => {
                let mut response = QueueResponse::failure(
                    QueueResultCode::Error,
                    format!("Provider returned HTTP {status}"),
                );
                response.status = Some(status);
                response.body = body.into();
                return response;
            }
            Err(err) => return QueueResponse::failure(QueueResultCode::Error, err.to_string()),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn offline() -> QueueResponse {
    QueueResponse::failure(QueueResultCode::Offline, "Provider is offline")
}

fn queue_timeout() -> QueueResponse {
    QueueResponse::failure(
        QueueResultCode::QueueTimeout,
        "Request timed out waiting in queue",
    )
}

fn closed() -> QueueResponse {
    QueueResponse::failure(QueueResultCode::Error, QueueError::Closed.to_string())
}
