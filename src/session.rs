//! Recording session lifecycle
//!
//! One session drives the state machine `Idle → Active → Finalizing → Idle`.
//! Exactly one session may be Active at a time; starting while Active and
//! stopping while Idle are benign no-ops, logged but never returned as
//! errors. Frame ingestion from the render loop is fire-and-forget, so
//! ingests are strictly serialized per session: the pipeline lives behind a
//! fair (FIFO) async mutex, and `stop` acquires the same queue to wait for
//! any in-flight ingest before finalizing.

use crate::config::RecordingConfig;
use crate::error::RecordingResult;
use crate::strategy::{self, EncodingStrategy, FramePayload};
use crate::surface::RenderSurface;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

/// Current state of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No recording in progress
    Idle,
    /// Currently capturing frames
    Active,
    /// Stop requested; waiting for the strategy to finalize
    Finalizing,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Events emitted during recording
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Recording started
    Started { id: Uuid },
    /// Progress update, emitted every 60 captured frames
    Progress { frames: u64 },
    /// Recording stopped and finalized
    Stopped { frames: u64 },
    /// Error occurred
    Error(String),
}

/// Everything the active recording owns: strategy, bound surface, config
/// and the frame counter. Lives behind the FIFO queue so ingests never
/// observe it half-updated.
struct Pipeline {
    strategy: Box<dyn EncodingStrategy>,
    surface: Arc<dyn RenderSurface>,
    config: RecordingConfig,
    frame_index: u64,
    id: Uuid,
    started_at: DateTime<Utc>,
}

/// Orchestrates the recording lifecycle
pub struct RecordingSession {
    /// Current session state
    state: RwLock<SessionState>,

    /// The active pipeline, behind the fair ingest queue
    pipeline: Mutex<Option<Pipeline>>,

    /// Event broadcaster
    event_tx: broadcast::Sender<SessionEvent>,
}

impl RecordingSession {
    /// Create a new idle session
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            state: RwLock::new(SessionState::Idle),
            pipeline: Mutex::new(None),
            event_tx,
        }
    }

    /// Get the current session state
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// True while a recording is active or finalizing
    pub fn is_recording(&self) -> bool {
        self.state() != SessionState::Idle
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Number of frames captured so far (0 when idle)
    pub async fn frame_count(&self) -> u64 {
        self.pipeline
            .lock()
            .await
            .as_ref()
            .map(|p| p.frame_index)
            .unwrap_or(0)
    }

    /// Start recording from the given surface
    ///
    /// A warn-level no-op if a recording is already in progress. On failure
    /// the session stays Idle and is safe to retry.
    pub async fn start(
        &self,
        surface: Arc<dyn RenderSurface>,
        config: RecordingConfig,
    ) -> RecordingResult<()> {
        if self.state() != SessionState::Idle {
            tracing::warn!("start ignored: a recording is already in progress");
            return Ok(());
        }
        config.validate()?;

        let mut guard = self.pipeline.lock().await;
        // Re-check under the queue: a concurrent start may have won the race
        if self.state() != SessionState::Idle {
            tracing::warn!("start ignored: a recording is already in progress");
            return Ok(());
        }

        let id = Uuid::new_v4();
        let mut strategy = strategy::strategy_for(config.strategy);
        tracing::info!(
            %id,
            strategy = strategy.id(),
            width = config.width,
            height = config.height,
            frame_rate = config.frame_rate,
            "starting recording"
        );
        strategy.open(&config).await?;

        *guard = Some(Pipeline {
            strategy,
            surface,
            config,
            frame_index: 0,
            id,
            started_at: Utc::now(),
        });
        *self.state.write() = SessionState::Active;
        let _ = self.event_tx.send(SessionEvent::Started { id });
        Ok(())
    }

    /// Capture one frame from the bound surface
    ///
    /// A no-op unless the session is Active. Ingests are serialized FIFO;
    /// the frame counter advances only after a successful ingest. A failed
    /// ingest propagates but does not stop the session; the caller decides.
    pub async fn add_frame(&self) -> RecordingResult<()> {
        if self.state() != SessionState::Active {
            return Ok(());
        }

        let mut guard = self.pipeline.lock().await;
        // A stop may have finalized while this call waited in the queue
        let Some(pipeline) = guard.as_mut() else {
            return Ok(());
        };
        if self.state() != SessionState::Active {
            return Ok(());
        }

        let result = pipeline
            .strategy
            .ingest(
                pipeline.frame_index,
                pipeline.config.frame_rate,
                pipeline.surface.as_ref(),
            )
            .await;
        match result {
            Ok(()) => {
                pipeline.frame_index += 1;
                if pipeline.frame_index % 60 == 0 {
                    tracing::debug!(frames = pipeline.frame_index, "recorded frames");
                    let _ = self.event_tx.send(SessionEvent::Progress {
                        frames: pipeline.frame_index,
                    });
                }
                Ok(())
            }
            Err(err) => {
                let _ = self.event_tx.send(SessionEvent::Error(err.to_string()));
                Err(err)
            }
        }
    }

    /// Stop recording and finalize the payload
    ///
    /// A warn-level no-op returning `None` if no recording is in progress.
    /// Waits for any in-flight ingest, then finalizes. The session returns
    /// to Idle even when finalization fails.
    pub async fn stop(&self) -> RecordingResult<Option<FramePayload>> {
        {
            let mut state = self.state.write();
            if *state != SessionState::Active {
                tracing::warn!("stop ignored: no recording in progress");
                return Ok(None);
            }
            // New add_frame calls become no-ops from here on
            *state = SessionState::Finalizing;
        }

        let mut guard = self.pipeline.lock().await;
        let Some(mut pipeline) = guard.take() else {
            *self.state.write() = SessionState::Idle;
            return Ok(None);
        };
        drop(guard);

        let elapsed_ms = (Utc::now() - pipeline.started_at).num_milliseconds();
        tracing::info!(
            id = %pipeline.id,
            frames = pipeline.frame_index,
            elapsed_ms,
            "stopping recording"
        );

        let result = pipeline.strategy.finalize().await;
        // Back to Idle no matter what; a finalize failure must not leave
        // the session stuck
        *self.state.write() = SessionState::Idle;

        match result {
            Ok(payload) => {
                tracing::info!(
                    bytes = payload.bytes.len(),
                    mime = payload.mime_type,
                    "recording finalized"
                );
                let _ = self.event_tx.send(SessionEvent::Stopped {
                    frames: pipeline.frame_index,
                });
                Ok(Some(payload))
            }
            Err(err) => {
                let _ = self.event_tx.send(SessionEvent::Error(err.to_string()));
                Err(err)
            }
        }
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContainerFormat, StrategyKind};
    use crate::error::RecordingError;
    use crate::surface::{BufferSurface, RenderSurface, RgbaFrame};
    use async_trait::async_trait;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn video_config() -> RecordingConfig {
        RecordingConfig::new(640, 480)
            .with_strategy(StrategyKind::ContainerVideo)
            .with_container(ContainerFormat::Webm)
            .with_frame_rate(30.0)
            .with_bitrate(2_000_000)
    }

    fn archive_config() -> RecordingConfig {
        RecordingConfig::new(8, 8).with_strategy(StrategyKind::ImageArchive)
    }

    /// Surface whose snapshots take a while, to probe ingest serialization
    struct SlowSurface {
        width: u32,
        height: u32,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl SlowSurface {
        fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RenderSurface for SlowSurface {
        fn width(&self) -> u32 {
            self.width
        }

        fn height(&self) -> u32 {
            self.height
        }

        async fn snapshot(&self) -> RecordingResult<RgbaFrame> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            RgbaFrame::new(
                self.width,
                self.height,
                vec![0; self.width as usize * self.height as usize * 4],
            )
        }
    }

    /// Surface whose snapshots always fail
    struct FailingSurface;

    #[async_trait]
    impl RenderSurface for FailingSurface {
        fn width(&self) -> u32 {
            8
        }

        fn height(&self) -> u32 {
            8
        }

        async fn snapshot(&self) -> RecordingResult<RgbaFrame> {
            Err(RecordingError::FrameSnapshotFailed(
                "surface gone".to_string(),
            ))
        }
    }

    #[tokio::test]
    async fn test_end_to_end_webm() {
        let session = RecordingSession::new();
        let surface = Arc::new(BufferSurface::new(640, 480));

        session.start(surface, video_config()).await.unwrap();
        assert!(session.is_recording());

        for _ in 0..90 {
            session.add_frame().await.unwrap();
        }
        assert_eq!(session.frame_count().await, 90);

        let payload = session.stop().await.unwrap().unwrap();
        assert!(!payload.bytes.is_empty());
        assert_eq!(payload.mime_type, "video/webm");
        assert!(!session.is_recording());
    }

    #[tokio::test]
    async fn test_end_to_end_mp4() {
        let session = RecordingSession::new();
        let surface = Arc::new(BufferSurface::new(640, 480));
        let config = video_config().with_container(ContainerFormat::Mp4);

        session.start(surface, config).await.unwrap();
        for _ in 0..10 {
            session.add_frame().await.unwrap();
        }
        let payload = session.stop().await.unwrap().unwrap();
        assert_eq!(payload.mime_type, "video/mp4");
        assert_eq!(&payload.bytes[4..8], b"ftyp");
    }

    #[tokio::test]
    async fn test_start_while_active_is_noop() {
        let session = RecordingSession::new();
        let surface = Arc::new(BufferSurface::new(640, 480));

        session
            .start(surface.clone(), video_config())
            .await
            .unwrap();
        session.add_frame().await.unwrap();

        // Second start must not reset the frame counter or the state
        session.start(surface, video_config()).await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.frame_count().await, 1);

        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_while_idle_returns_none() {
        let session = RecordingSession::new();
        let result = session.stop().await.unwrap();
        assert!(result.is_none());
        assert!(!session.is_recording());
    }

    #[tokio::test]
    async fn test_add_frame_while_idle_is_noop() {
        let session = RecordingSession::new();
        session.add_frame().await.unwrap();
        assert_eq!(session.frame_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_config_leaves_session_idle() {
        let session = RecordingSession::new();
        let surface = Arc::new(BufferSurface::new(640, 480));
        let config = video_config().with_frame_rate(0.0);

        let err = session.start(surface.clone(), config).await.unwrap_err();
        assert!(matches!(err, RecordingError::InvalidConfiguration(_)));
        assert!(!session.is_recording());

        // The session is safe to retry with a good config
        session.start(surface, video_config()).await.unwrap();
        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_ingest_leaves_frame_index_unchanged() {
        let session = RecordingSession::new();
        session
            .start(Arc::new(FailingSurface), archive_config())
            .await
            .unwrap();

        let err = session.add_frame().await.unwrap_err();
        assert!(matches!(err, RecordingError::FrameSnapshotFailed(_)));
        assert_eq!(session.frame_count().await, 0);
        // A failed ingest does not stop the session
        assert!(session.is_recording());

        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_archive_entries_match_captured_frames() {
        let session = RecordingSession::new();
        session
            .start(Arc::new(BufferSurface::new(8, 8)), archive_config())
            .await
            .unwrap();
        for _ in 0..3 {
            session.add_frame().await.unwrap();
        }
        let payload = session.stop().await.unwrap().unwrap();

        let archive = zip::ZipArchive::new(Cursor::new(payload.bytes)).unwrap();
        assert_eq!(archive.len(), 3);
    }

    #[tokio::test]
    async fn test_overlapping_add_frames_are_serialized() {
        let session = Arc::new(RecordingSession::new());
        let surface = Arc::new(SlowSurface::new(8, 8));
        session
            .start(surface.clone(), archive_config())
            .await
            .unwrap();

        let a = tokio::spawn({
            let session = session.clone();
            async move { session.add_frame().await }
        });
        let b = tokio::spawn({
            let session = session.clone();
            async move { session.add_frame().await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(surface.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(session.frame_count().await, 2);

        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_ingest() {
        let session = Arc::new(RecordingSession::new());
        let surface = Arc::new(SlowSurface::new(8, 8));
        session
            .start(surface.clone(), archive_config())
            .await
            .unwrap();

        let ingest = tokio::spawn({
            let session = session.clone();
            async move { session.add_frame().await }
        });
        // Let the ingest enter the queue and start its slow snapshot
        tokio::time::sleep(Duration::from_millis(5)).await;

        let payload = session.stop().await.unwrap().unwrap();
        ingest.await.unwrap().unwrap();

        // The in-flight frame made it into the archive
        let archive = zip::ZipArchive::new(Cursor::new(payload.bytes)).unwrap();
        assert_eq!(archive.len(), 1);
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let session = RecordingSession::new();
        let mut events = session.subscribe();

        session
            .start(Arc::new(BufferSurface::new(8, 8)), archive_config())
            .await
            .unwrap();
        session.add_frame().await.unwrap();
        session.stop().await.unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::Started { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::Stopped { frames: 1 }
        ));
    }
}
