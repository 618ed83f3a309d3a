//! Accumulate-then-infer triage.
//!
//! Each round collects queued media for one window, wraps the audio in a
//! WAV container, attaches the most recent camera frame, and submits a
//! single request whose prompt carries the previous round's summary.
//! Rounds without audio are skipped. The latest frame outlives its round
//! until a newer one arrives.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use triage_core::{CallError, CallId, extract_json_object, situation_summary};
use triage_llm::prompt::window_prompt;
use triage_llm::{InferenceError, InferenceProvider, InferenceResult, PcmFormat, TriageRequest, pcm_to_wav};

use super::{ReportSink, StopReason, TriageStrategy};
use crate::calls::media::MediaItem;

/// Fixed-window batch strategy. The default.
pub struct WindowedStrategy {
    provider: Arc<dyn InferenceProvider>,
    window: Duration,
    inference_timeout: Duration,
    format: PcmFormat,
}

#[derive(Debug, Default)]
struct RoundState {
    audio: Vec<u8>,
    frame: Option<String>,
    summary: Option<String>,
    round: u32,
}

impl WindowedStrategy {
    /// Build a strategy around a one-shot provider.
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        window: Duration,
        inference_timeout: Duration,
        format: PcmFormat,
    ) -> Self {
        Self {
            provider,
            window,
            inference_timeout,
            format,
        }
    }

    /// Collect items until the window closes. `Err` means the run is over.
    async fn collect(
        &self,
        state: &mut RoundState,
        rx: &mut mpsc::Receiver<MediaItem>,
        cancel: &CancellationToken,
    ) -> Result<(), StopReason> {
        let deadline = tokio::time::sleep_until(Instant::now() + self.window);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(StopReason::Cancelled),
                () = &mut deadline => return Ok(()),
                item = rx.recv() => match item {
                    Some(MediaItem::Audio(chunk)) => state.audio.extend_from_slice(&chunk),
                    Some(MediaItem::Frame(frame)) => state.frame = Some(frame),
                    Some(MediaItem::EndOfStream) => return Err(StopReason::EndOfStream),
                    None => return Err(StopReason::QueueClosed),
                },
            }
        }
    }

    /// Decode the held frame, forgetting it if it is not valid base64.
    fn take_image(call_id: &CallId, state: &mut RoundState) -> Option<Vec<u8>> {
        let frame = state.frame.as_deref()?;
        match STANDARD.decode(frame) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                let err = CallError::FrameDecode(e.to_string());
                warn!(call_id = %call_id, error = %err, "skipping camera frame");
                state.frame = None;
                None
            }
        }
    }

    #[instrument(skip_all, fields(call_id = %call_id, round = state.round, provider = self.provider.name()))]
    async fn analyze(
        &self,
        call_id: &CallId,
        pcm: &[u8],
        state: &mut RoundState,
        cancel: &CancellationToken,
    ) -> InferenceResult<Value> {
        let image_jpeg = Self::take_image(call_id, state);
        let prompt = window_prompt(state.summary.as_deref(), state.round, image_jpeg.is_some());
        let request = TriageRequest {
            audio_wav: pcm_to_wav(pcm, self.format)?,
            image_jpeg,
            prompt,
        };
        info!(
            audio_ms = self.format.duration_ms(pcm.len()),
            with_frame = request.image_jpeg.is_some(),
            "submitting triage window"
        );

        let call = tokio::time::timeout(self.inference_timeout, self.provider.analyze(request));
        let text = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(InferenceError::Cancelled),
            result = call => result.map_err(|_| InferenceError::Timeout {
                secs: self.inference_timeout.as_secs(),
            })??,
        };
        debug!(chars = text.len(), "triage response received");

        extract_json_object(&text).ok_or_else(|| {
            let preview: String = text.chars().take(200).collect();
            InferenceError::MalformedOutput(format!("no JSON object in response: {preview}"))
        })
    }
}

#[async_trait]
impl TriageStrategy for WindowedStrategy {
    fn name(&self) -> &'static str {
        "windowed"
    }

    async fn run(
        &self,
        call_id: CallId,
        mut rx: mpsc::Receiver<MediaItem>,
        sink: ReportSink,
        cancel: CancellationToken,
    ) -> StopReason {
        let mut state = RoundState::default();
        loop {
            if let Err(reason) = self.collect(&mut state, &mut rx, &cancel).await {
                return reason;
            }
            if state.audio.is_empty() {
                continue;
            }
            let pcm = std::mem::take(&mut state.audio);
            state.round += 1;

            match self.analyze(&call_id, &pcm, &mut state, &cancel).await {
                Ok(report) => {
                    if let Some(summary) = situation_summary(&report) {
                        state.summary = Some(summary.to_owned());
                    }
                    let _ = sink.publish_report(report);
                }
                Err(InferenceError::Cancelled) => return StopReason::Cancelled,
                Err(e) => {
                    let _ = sink.publish_degraded(&e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::registry::CallRegistry;
    use crate::pipeline::TriageHandle;
    use crate::pipeline::testing::{HangingProvider, ScriptedProvider};
    use crate::websocket::connection::{ChannelKind, drain_json, test_connection};
    use bytes::Bytes;
    use serde_json::json;
    use tokio::sync::mpsc::Receiver;
    use triage_core::{Location, Role};

    const WINDOW: Duration = Duration::from_secs(10);

    struct Harness {
        tx: mpsc::Sender<MediaItem>,
        dash_rx: Receiver<Arc<String>>,
        handle: TriageHandle,
        _caller_rx: Receiver<Arc<String>>,
    }

    fn start(provider: Arc<dyn InferenceProvider>) -> Harness {
        let registry = Arc::new(CallRegistry::new(16));
        let (caller, caller_rx) = test_connection(ChannelKind::Signal(Role::Caller));
        let session = registry
            .create(CallId::from("X"), caller, Location::default())
            .unwrap();
        let (dash, dash_rx) = test_connection(ChannelKind::Dashboard);
        let _ = session.bind_dispatcher(&dash);

        let (tx, rx) = mpsc::channel(16);
        let strategy = Arc::new(WindowedStrategy::new(
            provider,
            WINDOW,
            Duration::from_secs(30),
            PcmFormat::default(),
        ));
        let sink = ReportSink::new(CallId::from("X"), registry);
        let handle = TriageHandle::spawn(strategy, CallId::from("X"), rx, sink);
        Harness {
            tx,
            dash_rx,
            handle,
            _caller_rx: caller_rx,
        }
    }

    fn audio() -> MediaItem {
        MediaItem::Audio(Bytes::from(vec![0u8; 3200]))
    }

    async fn wait_window() {
        tokio::time::sleep(WINDOW + Duration::from_millis(100)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_report_and_carries_summary() {
        let provider = ScriptedProvider::new(vec![
            Ok("```json\n{\"situation_summary\": \"fall at home\", \"severity\": 3}\n```".into()),
            Ok("{\"situation_summary\": \"fall, conscious\", \"severity\": 2}".into()),
        ]);
        let mut h = start(provider.clone());

        h.tx.send(audio()).await.unwrap();
        wait_window().await;
        h.tx.send(audio()).await.unwrap();
        wait_window().await;

        let msgs = drain_json(&mut h.dash_rx);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["type"], "triage_update");
        assert_eq!(msgs[0]["call_id"], "X");
        assert_eq!(msgs[0]["report"], json!({"situation_summary": "fall at home", "severity": 3}));
        assert_eq!(msgs[1]["report"]["severity"], 2);

        let requests = provider.requests.lock();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].audio_wav.starts_with(b"RIFF"));
        assert!(!requests[0].prompt.contains("Previous analysis"));
        assert!(requests[1].prompt.contains("Previous analysis: fall at home"));
        assert!(requests[1].prompt.contains("update #2"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_window_is_skipped() {
        let provider = ScriptedProvider::new(vec![]);
        let mut h = start(provider.clone());
        h.tx.send(MediaItem::Frame(STANDARD.encode(b"jpeg"))).await.unwrap();
        wait_window().await;
        wait_window().await;
        assert!(provider.requests.lock().is_empty());
        assert!(drain_json(&mut h.dash_rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn latest_frame_attached_and_kept() {
        let provider = ScriptedProvider::new(vec![
            Ok("{\"severity\": 1}".into()),
            Ok("{\"severity\": 1}".into()),
        ]);
        let h = start(provider.clone());
        h.tx.send(MediaItem::Frame(STANDARD.encode(b"old"))).await.unwrap();
        h.tx.send(MediaItem::Frame(STANDARD.encode(b"new"))).await.unwrap();
        h.tx.send(audio()).await.unwrap();
        wait_window().await;
        h.tx.send(audio()).await.unwrap();
        wait_window().await;

        let requests = provider.requests.lock();
        assert_eq!(requests[0].image_jpeg.as_deref(), Some(&b"new"[..]));
        assert!(requests[0].prompt.contains("camera frame"));
        assert_eq!(requests[1].image_jpeg.as_deref(), Some(&b"new"[..]));
    }

    #[tokio::test(start_paused = true)]
    async fn bad_frame_is_skipped_audio_still_sent() {
        let provider = ScriptedProvider::new(vec![Ok("{\"severity\": 2}".into())]);
        let mut h = start(provider.clone());
        h.tx.send(MediaItem::Frame("%%% not base64 %%%".into())).await.unwrap();
        h.tx.send(audio()).await.unwrap();
        wait_window().await;

        let requests = provider.requests.lock();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].image_jpeg.is_none());
        assert!(!requests[0].prompt.contains("camera frame"));
        drop(requests);
        assert_eq!(drain_json(&mut h.dash_rx).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_publishes_degraded_and_continues() {
        let provider = ScriptedProvider::new(vec![
            Err(InferenceError::Api {
                status: 503,
                message: "overloaded".into(),
                retryable: true,
            }),
            Ok("no json here".into()),
            Ok("{\"severity\": 4}".into()),
        ]);
        let mut h = start(provider);
        for _ in 0..3 {
            h.tx.send(audio()).await.unwrap();
            wait_window().await;
        }

        let msgs = drain_json(&mut h.dash_rx);
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0]["report"]["severity"], 0);
        assert_eq!(
            msgs[0]["report"]["situation_summary"],
            "AI analysis error, retrying... (ApiError)"
        );
        assert_eq!(msgs[0]["report"]["detected_keywords"], json!([]));
        assert_eq!(
            msgs[1]["report"]["situation_summary"],
            "AI analysis error, retrying... (MalformedOutput)"
        );
        assert_eq!(msgs[2]["report"]["severity"], 4);
        assert!(!h.handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_inference_times_out_into_degraded() {
        let mut h = start(Arc::new(HangingProvider));
        h.tx.send(audio()).await.unwrap();
        wait_window().await;
        tokio::time::sleep(Duration::from_secs(31)).await;

        let msgs = drain_json(&mut h.dash_rx);
        assert_eq!(msgs.len(), 1);
        assert_eq!(
            msgs[0]["report"]["situation_summary"],
            "AI analysis error, retrying... (Timeout)"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_inference() {
        let h = start(Arc::new(HangingProvider));
        h.tx.send(audio()).await.unwrap();
        wait_window().await;
        assert_eq!(
            h.handle.stop(Duration::from_secs(1)).await,
            Some(StopReason::Cancelled)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn end_of_stream_stops_mid_window() {
        let provider = ScriptedProvider::new(vec![]);
        let h = start(provider.clone());
        h.tx.send(audio()).await.unwrap();
        h.tx.send(MediaItem::EndOfStream).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(h.handle.is_finished());
        assert!(provider.requests.lock().is_empty());
        assert_eq!(
            h.handle.stop(Duration::from_secs(1)).await,
            Some(StopReason::EndOfStream)
        );
    }
}
