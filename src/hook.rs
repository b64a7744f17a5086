//! Render-loop integration
//!
//! The render loop calls [`RenderLoopHook::on_tick`] once per frame,
//! best-effort. The hook checks whether a session is active and forwards
//! the capture request without waiting for it to complete; the session's
//! internal FIFO queue keeps the resulting ingests serialized.

use crate::session::RecordingSession;
use std::sync::Arc;

/// Per-tick capture trigger owned by the render-loop driver
pub struct RenderLoopHook {
    session: Arc<RecordingSession>,
}

impl RenderLoopHook {
    /// Create a hook driving the given session
    pub fn new(session: Arc<RecordingSession>) -> Self {
        Self { session }
    }

    /// Get the session this hook drives
    pub fn session(&self) -> &Arc<RecordingSession> {
        &self.session
    }

    /// Call once per render tick
    ///
    /// Fire-and-forget: the capture request is spawned onto the current
    /// tokio runtime and its completion is not awaited. Failures are
    /// reported through tracing and the session's event stream, and do not
    /// stop the recording; the user decides whether to stop or restart.
    pub fn on_tick(&self) {
        if !self.session.is_recording() {
            return;
        }
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            if let Err(err) = session.add_frame().await {
                tracing::error!("failed to record frame: {err}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RecordingConfig, StrategyKind};
    use crate::surface::BufferSurface;

    #[tokio::test]
    async fn test_on_tick_is_inert_while_idle() {
        let session = Arc::new(RecordingSession::new());
        let hook = RenderLoopHook::new(session.clone());

        hook.on_tick();
        tokio::task::yield_now().await;
        assert_eq!(session.frame_count().await, 0);
    }

    #[tokio::test]
    async fn test_on_tick_captures_frames() {
        let session = Arc::new(RecordingSession::new());
        let surface = Arc::new(BufferSurface::new(8, 8));
        let config = RecordingConfig::new(8, 8).with_strategy(StrategyKind::ImageArchive);
        session.start(surface, config).await.unwrap();

        let hook = RenderLoopHook::new(session.clone());
        for _ in 0..5 {
            hook.on_tick();
        }
        // Drain the spawned captures by queueing behind them
        while session.frame_count().await < 5 {
            tokio::task::yield_now().await;
        }

        let payload = session.stop().await.unwrap().unwrap();
        assert_eq!(payload.mime_type, "application/zip");
    }
}
