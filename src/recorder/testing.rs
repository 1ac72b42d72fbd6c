//! In-memory encoder and library doubles for recorder tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::machine::RecordingStateMachine;
use super::state::RecordingConfig;
use crate::capture::CaptureFrame;
use crate::encoder::{
    AppendOutcome, EncoderError, EncoderResult, EncoderSink, SinkFactory, VideoSettings,
};
use crate::library::MediaLibrary;

/// What one sink saw over its lifetime
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    pub settings: Option<VideoSettings>,
    pub output_path: PathBuf,
    pub appended: Vec<Duration>,
    pub marked_finished: bool,
    pub finalized: bool,
}

#[derive(Default)]
struct Shared {
    sessions: Mutex<Vec<SessionLog>>,
    not_ready: AtomicBool,
    skipping: AtomicBool,
    fail_open: AtomicBool,
    finalize_fails: AtomicBool,
    created: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MemorySinkFactory {
    shared: Arc<Shared>,
}

impl MemorySinkFactory {
    pub fn sessions(&self) -> Vec<SessionLog> {
        self.shared.sessions.lock().clone()
    }

    pub fn created(&self) -> usize {
        self.shared.created.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self, ready: bool) {
        self.shared.not_ready.store(!ready, Ordering::SeqCst);
    }

    /// Accept appends without encoding them
    pub fn set_skipping(&self, skipping: bool) {
        self.shared.skipping.store(skipping, Ordering::SeqCst);
    }

    pub fn fail_open(&self, fail: bool) {
        self.shared.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn finalize_result(&self, success: bool) {
        self.shared.finalize_fails.store(!success, Ordering::SeqCst);
    }
}

impl SinkFactory for MemorySinkFactory {
    fn create_sink(&self) -> EncoderResult<Box<dyn EncoderSink>> {
        self.shared.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySink {
            shared: self.shared.clone(),
            settings: None,
            session: None,
        }))
    }
}

pub struct MemorySink {
    shared: Arc<Shared>,
    settings: Option<VideoSettings>,
    session: Option<usize>,
}

impl MemorySink {
    fn with_log(&self, f: impl FnOnce(&mut SessionLog)) {
        if let Some(index) = self.session {
            f(&mut self.shared.sessions.lock()[index]);
        }
    }
}

#[async_trait]
impl EncoderSink for MemorySink {
    fn configure(&mut self, settings: &VideoSettings) -> EncoderResult<()> {
        self.settings = Some(settings.clone());
        Ok(())
    }

    fn open(&mut self, output_path: &Path) -> EncoderResult<()> {
        if self.settings.is_none() {
            return Err(EncoderError::NotConfigured);
        }
        if self.shared.fail_open.load(Ordering::SeqCst) {
            return Err(EncoderError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "output not writable",
            )));
        }
        let mut sessions = self.shared.sessions.lock();
        sessions.push(SessionLog {
            settings: self.settings.clone(),
            output_path: output_path.to_path_buf(),
            ..SessionLog::default()
        });
        self.session = Some(sessions.len() - 1);
        Ok(())
    }

    fn is_ready_for_more_data(&self) -> bool {
        !self.shared.not_ready.load(Ordering::SeqCst)
    }

    fn append(
        &mut self,
        _data: &[u8],
        pts: Duration,
        _duration: Duration,
    ) -> EncoderResult<AppendOutcome> {
        if self.session.is_none() {
            return Err(EncoderError::NotOpen);
        }
        if self.shared.skipping.load(Ordering::SeqCst) {
            return Ok(AppendOutcome::Skipped);
        }
        self.with_log(|log| log.appended.push(pts));
        Ok(AppendOutcome::Written)
    }

    fn mark_finished(&mut self) {
        self.with_log(|log| log.marked_finished = true);
    }

    async fn finalize(&mut self) -> bool {
        self.with_log(|log| log.finalized = true);
        !self.shared.finalize_fails.load(Ordering::SeqCst)
    }
}

/// Records every path it is asked to save
#[derive(Default)]
pub struct MemoryLibrary {
    saved: Mutex<Vec<PathBuf>>,
}

impl MemoryLibrary {
    pub fn saved(&self) -> Vec<PathBuf> {
        self.saved.lock().clone()
    }
}

impl MediaLibrary for MemoryLibrary {
    fn save(&self, path: PathBuf) {
        self.saved.lock().push(path);
    }
}

/// A recorder wired to in-memory doubles
pub fn recorder() -> (RecordingStateMachine, MemorySinkFactory, Arc<MemoryLibrary>) {
    let factory = MemorySinkFactory::default();
    let library = Arc::new(MemoryLibrary::default());
    let machine = RecordingStateMachine::new(
        RecordingConfig::default(),
        Arc::new(factory.clone()),
        library.clone(),
    );
    (machine, factory, library)
}

/// A small BGRA frame at the given device timestamp
pub fn frame(pts: Duration) -> CaptureFrame {
    CaptureFrame {
        data: Arc::from(vec![0u8; 16]),
        width: 2,
        height: 2,
        pts,
        duration: Duration::from_micros(33_300),
        intrinsic_attachment: None,
    }
}
