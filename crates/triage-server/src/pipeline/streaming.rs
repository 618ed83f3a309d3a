//! Streaming duplex triage.
//!
//! One live inference session per call. Queue items are forwarded as they
//! arrive while model output is read concurrently: text fragments are
//! assembled into reports by a [`ReportBuffer`], and `flag_critical` calls
//! are published immediately as `critical_flag` events. A failed or lost
//! session publishes a degraded report and is reopened after a delay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use triage_core::CallId;
use triage_llm::{InferenceError, InferenceResult, LiveEvent, LiveProvider, LiveSender, LiveSession};

use super::buffer::ReportBuffer;
use super::{ReportSink, StopReason, TriageStrategy};
use crate::calls::media::MediaItem;

/// Live-session strategy.
pub struct StreamingStrategy {
    provider: Arc<dyn LiveProvider>,
    buffer_limit: usize,
    reconnect_delay: Duration,
}

enum SessionEnd {
    Stopped(StopReason),
    Lost(InferenceError),
}

impl StreamingStrategy {
    /// Build a strategy around a duplex provider.
    pub fn new(provider: Arc<dyn LiveProvider>, buffer_limit: usize, reconnect_delay: Duration) -> Self {
        Self {
            provider,
            buffer_limit,
            reconnect_delay,
        }
    }

    async fn forward(sender: &dyn LiveSender, item: &MediaItem) -> InferenceResult<()> {
        match item {
            MediaItem::Audio(pcm) => sender.send_audio(pcm).await,
            MediaItem::Frame(jpeg_b64) => sender.send_image(jpeg_b64).await,
            MediaItem::EndOfStream => Ok(()),
        }
    }

    async fn drive(
        &self,
        call_id: &CallId,
        session: LiveSession,
        rx: &mut mpsc::Receiver<MediaItem>,
        sink: &ReportSink,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let LiveSession { sender, mut events } = session;
        let mut buffer = ReportBuffer::new(self.buffer_limit);

        let end = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break SessionEnd::Stopped(StopReason::Cancelled),
                event = events.next() => match event {
                    Some(Ok(LiveEvent::Text(fragment))) => {
                        for report in buffer.push(&fragment) {
                            let _ = sink.publish_report(report);
                        }
                    }
                    Some(Ok(LiveEvent::Critical { reason, severity })) => {
                        warn!(call_id = %call_id, %reason, severity, "critical flag raised");
                        let _ = sink.publish_critical(reason, severity);
                    }
                    Some(Ok(LiveEvent::TurnComplete)) => buffer.clear(),
                    Some(Err(e)) => break SessionEnd::Lost(e),
                    None => break SessionEnd::Lost(InferenceError::Connection("live session closed".into())),
                },
                item = rx.recv() => {
                    let item = match item {
                        Some(MediaItem::EndOfStream) => break SessionEnd::Stopped(StopReason::EndOfStream),
                        None => break SessionEnd::Stopped(StopReason::QueueClosed),
                        Some(item) => item,
                    };
                    let sent = tokio::select! {
                        biased;
                        () = cancel.cancelled() => Err(InferenceError::Cancelled),
                        result = Self::forward(sender.as_ref(), &item) => result,
                    };
                    match sent {
                        Ok(()) => {}
                        Err(InferenceError::Cancelled) => break SessionEnd::Stopped(StopReason::Cancelled),
                        Err(e) => break SessionEnd::Lost(e),
                    }
                }
            }
        };

        sender.close().await;
        end
    }

    /// Sleep before reconnecting. `false` if cancelled meanwhile.
    async fn backoff(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(self.reconnect_delay) => true,
        }
    }
}

#[async_trait]
impl TriageStrategy for StreamingStrategy {
    fn name(&self) -> &'static str {
        "streaming"
    }

    async fn run(
        &self,
        call_id: CallId,
        mut rx: mpsc::Receiver<MediaItem>,
        sink: ReportSink,
        cancel: CancellationToken,
    ) -> StopReason {
        loop {
            let connected = tokio::select! {
                biased;
                () = cancel.cancelled() => return StopReason::Cancelled,
                result = self.provider.connect() => result,
            };
            let failure = match connected {
                Ok(session) => {
                    info!(call_id = %call_id, provider = self.provider.name(), "live session open");
                    match self.drive(&call_id, session, &mut rx, &sink, &cancel).await {
                        SessionEnd::Stopped(reason) => return reason,
                        SessionEnd::Lost(e) => e,
                    }
                }
                Err(e) => e,
            };
            let _ = sink.publish_degraded(&failure);
            if !self.backoff(&cancel).await {
                return StopReason::Cancelled;
            }
        }
    }
}
