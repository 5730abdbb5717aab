use super::worker::{RecordingWorker, StampedFrame};
use super::{CaptureDevice, CaptureSettings, MetadataSampleBuffer};
use crate::events::{CaptureEvent, EventBus};
use crate::store::{AssetHandle, AssetStore};
use crate::{Error, Result};
use bytes::Bytes;
use metatrack_common::{Clock, MediaTime, SessionId, SystemClock, TimeBase, TimedSample};
use metatrack_media::{MuxedAsset, TrackMuxer};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Observable phase of a [`CaptureCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapturePhase {
    Idle,
    Configuring,
    Recording,
    Finishing,
    Failed,
}

impl std::fmt::Display for CapturePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Configuring => "configuring",
            Self::Recording => "recording",
            Self::Finishing => "finishing",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A raw video frame from the capture device.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Encoded payload, forwarded unmodified.
    pub data: Bytes,
    /// Raw capture clock reading for this frame.
    pub capture_time: MediaTime,
    pub duration: MediaTime,
    pub is_keyframe: bool,
}

/// Everything owned by one recording.
struct RecordingSession {
    id: SessionId,
    time_base: TimeBase,
    buffer: Arc<MetadataSampleBuffer>,
    /// Taken on stop; closing it ends the worker's frame loop.
    frames: Mutex<Option<mpsc::Sender<StampedFrame>>>,
    last_video_time: Mutex<Option<MediaTime>>,
    worker: Mutex<Option<JoinHandle<Result<MuxedAsset>>>>,
    /// Cause reported by a worker that gave up mid-recording.
    worker_failure: Mutex<oneshot::Receiver<String>>,
}

impl RecordingSession {
    fn worker_failure(&self) -> Option<String> {
        self.worker_failure.lock().try_recv().ok()
    }
}

enum CaptureState {
    Idle,
    Configuring,
    Recording(Arc<RecordingSession>),
    Finishing,
    Failed(String),
}

impl CaptureState {
    fn phase(&self) -> CapturePhase {
        match self {
            Self::Idle => CapturePhase::Idle,
            Self::Configuring => CapturePhase::Configuring,
            Self::Recording(_) => CapturePhase::Recording,
            Self::Finishing => CapturePhase::Finishing,
            Self::Failed(_) => CapturePhase::Failed,
        }
    }
}

/// Owns the capture lifecycle and routes frames and metadata events.
///
/// Frame and metadata calls are synchronous and never wait on the worker,
/// so they are safe from a capture callback. Start and stop are async.
pub struct CaptureCoordinator {
    settings: CaptureSettings,
    device: Arc<dyn CaptureDevice>,
    store: Arc<dyn AssetStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<CaptureState>,
    events: EventBus,
}

impl CaptureCoordinator {
    pub fn new(
        settings: CaptureSettings,
        device: Arc<dyn CaptureDevice>,
        store: Arc<dyn AssetStore>,
    ) -> Self {
        Self {
            settings,
            device,
            store,
            clock: Arc::new(SystemClock::new()),
            state: Mutex::new(CaptureState::Idle),
            events: EventBus::new(),
        }
    }

    /// Use `clock` for capture timestamps instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn phase(&self) -> CapturePhase {
        self.state.lock().phase()
    }

    /// Cause of the terminal failure, if the coordinator is `Failed`.
    pub fn failure(&self) -> Option<String> {
        match &*self.state.lock() {
            CaptureState::Failed(cause) => Some(cause.clone()),
            _ => None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }

    /// Id of the active recording.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session().map(|s| s.id)
    }

    /// Current presentation time of the active recording.
    pub fn now(&self) -> Result<MediaTime> {
        Ok(self.active_session("read the clock")?.time_base.now()?)
    }

    /// Metadata samples waiting for the next flush.
    pub fn pending_metadata(&self) -> usize {
        self.session().map_or(0, |s| s.buffer.len())
    }

    /// Begin a recording.
    ///
    /// An unavailable device returns the coordinator to `Idle`; failing to
    /// prepare the output directory is terminal.
    pub async fn start_recording(&self) -> Result<SessionId> {
        {
            let mut state = self.state.lock();
            if !matches!(*state, CaptureState::Idle) {
                return Err(Error::InvalidTransition {
                    phase: state.phase(),
                    action: "start recording",
                });
            }
            *state = CaptureState::Configuring;
        }
        self.announce(CapturePhase::Configuring);

        if !self.device.is_available() {
            warn!(device = self.device.name(), "Capture device unavailable");
            self.set_state(CaptureState::Idle);
            return Err(Error::device_unavailable(self.device.name()));
        }

        let output_dir = self.settings.muxer.output_dir.clone();
        if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
            return Err(self.fail(format!(
                "cannot prepare output directory {}: {}",
                output_dir.display(),
                e
            )));
        }
        let spool = match tempfile::tempfile_in(&output_dir) {
            Ok(file) => file,
            Err(e) => return Err(self.fail(format!("cannot open video spool: {}", e))),
        };

        let session = match self.open_session(spool) {
            Ok(session) => session,
            Err(e) => return Err(self.fail(e.to_string())),
        };
        let id = session.id;

        self.set_state(CaptureState::Recording(session));
        info!(session_id = %id, device = self.device.name(), "Recording started");
        Ok(id)
    }

    fn open_session(&self, spool: std::fs::File) -> Result<Arc<RecordingSession>> {
        let settings = &self.settings;
        let muxer = TrackMuxer::new(settings.muxer.clone())?;
        let time_base = TimeBase::new(self.clock.clone(), settings.timescale())?;
        time_base.establish_epoch()?;

        let buffer = Arc::new(MetadataSampleBuffer::new(
            settings.buffer_capacity,
            settings.backpressure,
            settings.block_timeout,
        ));
        let (tx, rx) = mpsc::channel(settings.video_queue_depth.max(1));
        let (failure_tx, failure_rx) = oneshot::channel();
        let id = SessionId::new();

        let worker = RecordingWorker {
            session_id: id,
            frames: rx,
            buffer: buffer.clone(),
            muxer,
            flush_interval: settings.flush_interval,
            drain_timeout: settings.drain_timeout,
            failure: Some(failure_tx),
        };
        let handle = tokio::spawn(worker.run(spool));

        Ok(Arc::new(RecordingSession {
            id,
            time_base,
            buffer,
            frames: Mutex::new(Some(tx)),
            last_video_time: Mutex::new(None),
            worker: Mutex::new(Some(handle)),
            worker_failure: Mutex::new(failure_rx),
        }))
    }

    /// Forward a video frame to the recording, stamped on the session
    /// timeline. Never blocks.
    pub fn push_video_frame(&self, frame: VideoFrame) -> Result<MediaTime> {
        let session = self.active_session("push video frame")?;
        self.check_worker(&session)?;
        let presentation_time = session.time_base.to_presentation(frame.capture_time)?;

        // Held until the frame is queued so concurrent producers enqueue in order.
        let mut last = session.last_video_time.lock();
        if let Some(prev) = *last {
            if presentation_time < prev {
                return Err(Error::OutOfOrder {
                    last: prev,
                    got: presentation_time,
                });
            }
        }

        let sender = session.frames.lock().clone().ok_or(Error::InvalidTransition {
            phase: CapturePhase::Finishing,
            action: "push video frame",
        })?;
        let stamped = StampedFrame {
            data: frame.data,
            presentation_time,
            duration: frame.duration,
            is_keyframe: frame.is_keyframe,
        };
        match sender.try_send(stamped) {
            Ok(()) => {
                *last = Some(presentation_time);
                Ok(presentation_time)
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(Error::FrameQueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                drop(last);
                let cause = session
                    .worker_failure()
                    .unwrap_or_else(|| "recording worker stopped unexpectedly".to_string());
                Err(self.fail(cause))
            }
        }
    }

    /// Stamp `payload` with the current presentation time and enqueue it.
    pub fn push_metadata(&self, payload: impl Into<Bytes>) -> Result<MediaTime> {
        let session = self.active_session("push metadata")?;
        self.check_worker(&session)?;
        let payload = payload.into();
        let result = session
            .buffer
            .enqueue_with(|| Ok(TimedSample::new(payload, session.time_base.now()?)));
        self.report_rejection(&session, result)
    }

    /// Enqueue `payload` at the presentation time of a raw capture reading.
    pub fn push_metadata_at(
        &self,
        payload: impl Into<Bytes>,
        capture_time: MediaTime,
    ) -> Result<MediaTime> {
        let session = self.active_session("push metadata")?;
        self.check_worker(&session)?;
        let payload = payload.into();
        let result = session.buffer.enqueue_with(|| {
            let time = session.time_base.to_presentation(capture_time)?;
            Ok(TimedSample::new(payload, time))
        });
        self.report_rejection(&session, result)
    }

    /// Enter `Failed` with the worker's cause if it gave up.
    fn check_worker(&self, session: &RecordingSession) -> Result<()> {
        match session.worker_failure() {
            Some(cause) => Err(self.fail(cause)),
            None => Ok(()),
        }
    }

    fn report_rejection(
        &self,
        session: &RecordingSession,
        result: Result<MediaTime>,
    ) -> Result<MediaTime> {
        if let Err(Error::InvalidTransition { .. }) = &result {
            // The worker closes the buffer when it fails.
            self.check_worker(session)?;
        }
        if let Err(e) = &result {
            warn!(error = %e, "Metadata event rejected");
            self.events.publish(CaptureEvent::metadata_rejected(e.to_string()));
        }
        result
    }

    /// Stop the active recording, finalize it and hand it to the store.
    ///
    /// Bounded by the configured finish timeout. On any failure the
    /// coordinator enters `Failed`, no asset is produced and the partial
    /// output is removed.
    pub async fn stop_recording(&self) -> Result<AssetHandle> {
        let session = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, CaptureState::Finishing) {
                CaptureState::Recording(session) => session,
                other => {
                    let phase = other.phase();
                    *state = other;
                    return Err(Error::InvalidTransition {
                        phase,
                        action: "stop recording",
                    });
                }
            }
        };
        self.announce(CapturePhase::Finishing);
        info!(session_id = %session.id, "Stopping recording");

        // No further events: wake blocked producers, then end the frame loop.
        session.buffer.close();
        drop(session.frames.lock().take());

        let asset = match self.await_worker(&session).await {
            Ok(asset) => asset,
            Err(Error::Failed { cause }) => return Err(self.fail(cause)),
            Err(e) => return Err(self.fail(e.to_string())),
        };

        let store = self.store.clone();
        let stored = tokio::task::spawn_blocking(move || store.store(asset))
            .await
            .map_err(|e| Error::failed(format!("store task failed: {}", e)))
            .and_then(|r| r);
        let handle = match stored {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail(format!("storing asset: {}", e))),
        };

        self.events.publish(CaptureEvent::asset_stored(handle.id));
        self.set_state(CaptureState::Idle);
        info!(session_id = %session.id, asset_id = %handle.id, "Recording stored");
        Ok(handle)
    }

    async fn await_worker(&self, session: &RecordingSession) -> Result<MuxedAsset> {
        let mut handle = session
            .worker
            .lock()
            .take()
            .ok_or_else(|| Error::failed("recording worker already collected"))?;

        match tokio::time::timeout(self.settings.finish_timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::failed(format!("recording worker panicked: {}", e))),
            Err(_) => {
                handle.abort();
                Err(Error::failed(format!(
                    "finalize did not complete within {:?}",
                    self.settings.finish_timeout
                )))
            }
        }
    }

    fn session(&self) -> Option<Arc<RecordingSession>> {
        match &*self.state.lock() {
            CaptureState::Recording(session) => Some(session.clone()),
            _ => None,
        }
    }

    fn active_session(&self, action: &'static str) -> Result<Arc<RecordingSession>> {
        let state = self.state.lock();
        match &*state {
            CaptureState::Recording(session) => Ok(session.clone()),
            other => Err(Error::InvalidTransition {
                phase: other.phase(),
                action,
            }),
        }
    }

    fn set_state(&self, state: CaptureState) {
        let phase = state.phase();
        *self.state.lock() = state;
        self.announce(phase);
    }

    fn announce(&self, phase: CapturePhase) {
        self.events.publish(CaptureEvent::state_changed(phase));
    }

    /// Enter `Failed` and build the error surfaced to the caller.
    fn fail(&self, cause: impl Into<String>) -> Error {
        let cause = cause.into();
        {
            let mut state = self.state.lock();
            if let CaptureState::Recording(session) = &*state {
                session.buffer.close();
                drop(session.frames.lock().take());
                if let Some(worker) = session.worker.lock().take() {
                    worker.abort();
                }
            }
            *state = CaptureState::Failed(cause.clone());
        }
        error!(cause = %cause, "Capture failed");
        self.announce(CapturePhase::Failed);
        self.events.publish(CaptureEvent::failed(cause.clone()));
        Error::Failed { cause }
    }
}

impl std::fmt::Debug for CaptureCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureCoordinator")
            .field("phase", &self.phase())
            .field("device", &self.device.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticDevice;
    use crate::store::MemoryAssetStore;
    use assert_matches::assert_matches;
    use metatrack_common::ManualClock;
    use std::time::Duration;
    use tempfile::TempDir;

    fn coordinator(dir: &TempDir) -> CaptureCoordinator {
        let mut settings = CaptureSettings::default();
        settings.muxer.output_dir = dir.path().to_path_buf();
        settings.flush_interval = Duration::from_secs(3600);
        CaptureCoordinator::new(
            settings,
            Arc::new(SyntheticDevice::new("test-camera")),
            Arc::new(MemoryAssetStore::new()),
        )
        .with_clock(Arc::new(ManualClock::new()))
    }

    /// Enter `Recording` with a spool the worker cannot write to.
    fn start_with_read_only_spool(coordinator: &CaptureCoordinator, dir: &TempDir) {
        let path = dir.path().join("read-only.spool");
        std::fs::write(&path, b"").unwrap();
        let spool = std::fs::File::open(&path).unwrap();
        let session = coordinator.open_session(spool).unwrap();
        coordinator.set_state(CaptureState::Recording(session));
    }

    /// Larger than the spool's write buffer, so writes reach the file.
    fn large_frame(index: i64) -> VideoFrame {
        VideoFrame {
            data: Bytes::from(vec![0u8; 64 * 1024]),
            capture_time: MediaTime::new(index * 20, 600),
            duration: MediaTime::new(20, 600),
            is_keyframe: index == 0,
        }
    }

    /// Call `push` until it returns something other than success or a
    /// transient rejection.
    async fn first_hard_error<F>(mut push: F) -> Error
    where
        F: FnMut() -> Result<MediaTime>,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match push() {
                    Ok(_) => {}
                    Err(e) if e.is_transient() => {}
                    Err(e) => return e,
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("worker failure was never reported")
    }

    #[tokio::test]
    async fn test_spool_error_fails_metadata_with_cause() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir);
        let mut events = coordinator.subscribe();
        start_with_read_only_spool(&coordinator, &dir);

        // The file reports a failed write on the following operation.
        coordinator.push_video_frame(large_frame(0)).unwrap();
        coordinator.push_video_frame(large_frame(1)).unwrap();

        let err = first_hard_error(|| coordinator.push_metadata(&b"{}"[..])).await;
        assert_matches!(&err, Error::Failed { cause } if cause.contains("I/O error"));
        assert_eq!(coordinator.phase(), CapturePhase::Failed);
        assert!(coordinator.failure().unwrap().contains("I/O error"));
        assert_matches!(
            coordinator.push_metadata(&b"{}"[..]),
            Err(Error::InvalidTransition {
                phase: CapturePhase::Failed,
                ..
            })
        );

        let mut causes = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let CaptureEvent::Failed { cause, .. } = event {
                causes.push(cause);
            }
        }
        assert_eq!(causes.len(), 1);
        assert!(causes[0].contains("I/O error"));
    }

    #[tokio::test]
    async fn test_spool_error_fails_video_with_cause() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir);
        start_with_read_only_spool(&coordinator, &dir);

        let mut index = 0;
        let err = first_hard_error(|| {
            index += 1;
            coordinator.push_video_frame(large_frame(index))
        })
        .await;

        assert_matches!(&err, Error::Failed { cause } if cause.contains("I/O error"));
        assert_eq!(coordinator.phase(), CapturePhase::Failed);
        assert_matches!(
            coordinator.stop_recording().await,
            Err(Error::InvalidTransition {
                phase: CapturePhase::Failed,
                ..
            })
        );
    }
}
