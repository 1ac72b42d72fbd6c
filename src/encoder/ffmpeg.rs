//! FFmpeg-backed encoder sink
//!
//! Raw frames are queued on a bounded channel and written to an `ffmpeg`
//! process's stdin by a writer thread, so the capture thread never blocks on
//! the encoder. A full queue is reported as "not ready". The raw pipe carries
//! no timestamps; frames are placed on the nominal frame grid by their
//! presentation time and repeated to cover gaps. A frame whose grid slot is
//! already taken is skipped and reported as such.
//!
//! Once FFmpeg has exited, the encoded calibration block is embedded in the
//! movie (see `mov`) and also written as a JSON sidecar.

use async_trait::async_trait;
use crossbeam_channel::{bounded, Sender, TrySendError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::mov::embed_calibration;
use super::sink::{
    AppendOutcome, EncoderError, EncoderResult, EncoderSink, SinkFactory, VideoSettings,
};
use crate::capture::PixelEncoding;

/// Longest gap (in frames) filled by repeating the previous frame
const MAX_REPEAT_FRAMES: u64 = 120;

/// FFmpeg pixel format name for a capture pixel encoding
pub fn ffmpeg_pixel_format(encoding: PixelEncoding) -> Option<&'static str> {
    match encoding {
        PixelEncoding::BGRA => Some("bgra"),
        PixelEncoding::YUV420_VIDEO_RANGE | PixelEncoding::YUV420_FULL_RANGE => Some("nv12"),
        _ => None,
    }
}

/// Bytes in one frame of the given encoding
pub fn frame_size(encoding: PixelEncoding, width: u32, height: u32) -> Option<usize> {
    let pixels = width as usize * height as usize;
    match encoding {
        PixelEncoding::BGRA => Some(pixels * 4),
        PixelEncoding::YUV420_VIDEO_RANGE | PixelEncoding::YUV420_FULL_RANGE => {
            Some(pixels * 3 / 2)
        }
        _ => None,
    }
}

/// Path of the calibration sidecar written next to a movie
pub fn sidecar_path(output_path: &Path) -> PathBuf {
    let mut name = output_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".calibration.json");
    output_path.with_file_name(name)
}

/// Build the FFmpeg command line for a configured sink
pub fn build_args(settings: &VideoSettings, output_path: &Path) -> EncoderResult<Vec<String>> {
    let pix_fmt = ffmpeg_pixel_format(settings.pixel_format).ok_or_else(|| {
        EncoderError::Ffmpeg(format!("Unsupported pixel format {}", settings.pixel_format))
    })?;

    let mut args = vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pixel_format".to_string(),
        pix_fmt.to_string(),
        "-video_size".to_string(),
        format!("{}x{}", settings.width, settings.height),
        "-framerate".to_string(),
        settings.frame_rate.to_string(),
        "-i".to_string(),
        "-".to_string(), // stdin for video frames
        "-c:v".to_string(),
        settings.codec.ffmpeg_encoder().to_string(),
        "-tag:v".to_string(),
        settings.codec.codec_tag().to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ];

    if settings.expects_real_time {
        args.extend(["-preset".to_string(), "veryfast".to_string()]);
    }

    args.extend([
        "-movflags".to_string(),
        "+use_metadata_tags".to_string(),
        "-metadata".to_string(),
        format!(
            "com.widefov.horizontal-fov-millidegrees={}",
            settings.calibration.horizontal_fov_millidegrees
        ),
        "-metadata".to_string(),
        "com.widefov.projection=parametric-immersive".to_string(),
    ]);

    args.push(output_path.to_string_lossy().to_string());
    Ok(args)
}

/// Encoder sink writing through an `ffmpeg` child process
pub struct FfmpegSink {
    ffmpeg_path: String,
    queue_depth: usize,
    settings: Option<VideoSettings>,
    output_path: Option<PathBuf>,
    process: Option<Child>,
    frame_tx: Option<Sender<Arc<[u8]>>>,
    writer: Option<JoinHandle<std::io::Result<u64>>>,
    /// Next slot on the nominal frame grid
    next_index: u64,
    finished: bool,
}

impl FfmpegSink {
    pub fn new(ffmpeg_path: impl Into<String>, queue_depth: usize) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            queue_depth: queue_depth.max(1),
            settings: None,
            output_path: None,
            process: None,
            frame_tx: None,
            writer: None,
            next_index: 0,
            finished: false,
        }
    }

    async fn embed_calibration(&self) -> EncoderResult<()> {
        let (Some(settings), Some(output_path)) = (&self.settings, &self.output_path) else {
            return Err(EncoderError::NotOpen);
        };
        let block = settings.calibration.encode();
        let path = output_path.clone();
        let placement = tokio::task::spawn_blocking(move || embed_calibration(&path, &block))
            .await
            .map_err(|e| EncoderError::Channel(format!("Embed task failed: {}", e)))??;
        tracing::debug!("Calibration embedded in {:?} ({:?})", output_path, placement);
        Ok(())
    }

    async fn write_sidecar(&self) -> EncoderResult<()> {
        let (Some(settings), Some(output_path)) = (&self.settings, &self.output_path) else {
            return Err(EncoderError::NotOpen);
        };
        let json = serde_json::to_vec_pretty(&settings.calibration)?;
        tokio::fs::write(sidecar_path(output_path), json).await?;
        Ok(())
    }
}

#[async_trait]
impl EncoderSink for FfmpegSink {
    fn configure(&mut self, settings: &VideoSettings) -> EncoderResult<()> {
        if self.process.is_some() {
            return Err(EncoderError::AlreadyOpen);
        }
        if frame_size(settings.pixel_format, settings.width, settings.height).is_none() {
            return Err(EncoderError::Ffmpeg(format!(
                "Unsupported pixel format {}",
                settings.pixel_format
            )));
        }
        self.settings = Some(settings.clone());
        Ok(())
    }

    fn open(&mut self, output_path: &Path) -> EncoderResult<()> {
        if self.process.is_some() {
            return Err(EncoderError::AlreadyOpen);
        }
        let settings = self.settings.as_ref().ok_or(EncoderError::NotConfigured)?;
        let args = build_args(settings, output_path)?;

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut process = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EncoderError::Ffmpeg(format!("Failed to start FFmpeg: {}", e)))?;

        let mut stdin = process
            .stdin
            .take()
            .ok_or_else(|| EncoderError::Ffmpeg("Failed to capture FFmpeg stdin".to_string()))?;

        let (frame_tx, frame_rx) = bounded::<Arc<[u8]>>(self.queue_depth);
        let writer = std::thread::Builder::new()
            .name("widefov-ffmpeg-writer".into())
            .spawn(move || -> std::io::Result<u64> {
                let mut written = 0u64;
                for frame in frame_rx.iter() {
                    stdin.write_all(&frame)?;
                    written += 1;
                }
                // Dropping stdin signals EOF to FFmpeg
                Ok(written)
            })
            .map_err(|e| EncoderError::Channel(format!("Failed to spawn writer thread: {}", e)))?;

        tracing::info!(
            "Started FFmpeg encoder: {}x{} @ {}fps, {}, output: {:?}",
            settings.width,
            settings.height,
            settings.frame_rate,
            settings.codec.ffmpeg_encoder(),
            output_path
        );

        self.output_path = Some(output_path.to_path_buf());
        self.process = Some(process);
        self.frame_tx = Some(frame_tx);
        self.writer = Some(writer);
        self.next_index = 0;
        self.finished = false;
        Ok(())
    }

    fn is_ready_for_more_data(&self) -> bool {
        self.frame_tx.as_ref().map(|tx| !tx.is_full()).unwrap_or(false)
    }

    fn append(
        &mut self,
        data: &[u8],
        pts: Duration,
        _duration: Duration,
    ) -> EncoderResult<AppendOutcome> {
        if self.finished {
            return Err(EncoderError::Finished);
        }
        let settings = self.settings.as_ref().ok_or(EncoderError::NotConfigured)?;
        let tx = self.frame_tx.as_ref().ok_or(EncoderError::NotOpen)?;

        let expected = frame_size(settings.pixel_format, settings.width, settings.height)
            .ok_or(EncoderError::NotConfigured)?;
        if data.len() != expected {
            return Err(EncoderError::FrameSize {
                expected,
                actual: data.len(),
            });
        }

        let slot = (pts.as_secs_f64() * settings.frame_rate).round() as u64;
        if slot < self.next_index {
            return Ok(AppendOutcome::Skipped);
        }
        let copies = (slot - self.next_index + 1).min(MAX_REPEAT_FRAMES);

        let frame: Arc<[u8]> = Arc::from(data);
        let mut queued = 0;
        for _ in 0..copies {
            match tx.try_send(frame.clone()) {
                Ok(()) => {
                    self.next_index += 1;
                    queued += 1;
                }
                Err(TrySendError::Full(_)) => break,
                Err(TrySendError::Disconnected(_)) => {
                    return Err(EncoderError::Channel("FFmpeg writer disconnected".into()));
                }
            }
        }
        if queued == 0 {
            return Ok(AppendOutcome::Skipped);
        }
        if copies == MAX_REPEAT_FRAMES {
            self.next_index = slot + 1;
        }
        Ok(AppendOutcome::Written)
    }

    fn mark_finished(&mut self) {
        self.finished = true;
        // Closing the channel ends the writer loop
        self.frame_tx = None;
    }

    async fn finalize(&mut self) -> bool {
        self.mark_finished();

        let (Some(writer), Some(process)) = (self.writer.take(), self.process.take()) else {
            tracing::warn!("FFmpeg sink finalized without being opened");
            return false;
        };

        let joined = tokio::task::spawn_blocking(move || {
            let written = writer.join();
            let output = process.wait_with_output();
            (written, output)
        })
        .await;

        let mut success = true;
        match joined {
            Ok((written, output)) => {
                match written {
                    Ok(Ok(frames)) => tracing::info!("FFmpeg writer finished: {} frames", frames),
                    Ok(Err(e)) => {
                        tracing::error!("FFmpeg writer failed: {}", e);
                        success = false;
                    }
                    Err(_) => {
                        tracing::error!("FFmpeg writer thread panicked");
                        success = false;
                    }
                }
                match output {
                    Ok(output) if output.status.success() => {}
                    Ok(output) => {
                        let stderr = String::from_utf8_lossy(&output.stderr);
                        tracing::warn!("FFmpeg exited with status {}: {}", output.status, stderr);
                        success = false;
                    }
                    Err(e) => {
                        tracing::error!("Failed to wait for FFmpeg: {}", e);
                        success = false;
                    }
                }
            }
            Err(e) => {
                tracing::error!("FFmpeg finalize task failed: {}", e);
                success = false;
            }
        }

        if success {
            if let Err(e) = self.embed_calibration().await {
                tracing::error!("Failed to embed calibration metadata: {}", e);
                success = false;
            }
        }

        if let Err(e) = self.write_sidecar().await {
            tracing::warn!("Failed to write calibration sidecar: {}", e);
        }

        success
    }
}

/// Creates `FfmpegSink`s, checking that FFmpeg can be run
pub struct FfmpegSinkFactory {
    ffmpeg_path: String,
    queue_depth: usize,
}

impl FfmpegSinkFactory {
    pub fn new(ffmpeg_path: impl Into<String>, queue_depth: usize) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            queue_depth,
        }
    }
}

impl SinkFactory for FfmpegSinkFactory {
    fn create_sink(&self) -> EncoderResult<Box<dyn EncoderSink>> {
        if Command::new(&self.ffmpeg_path).arg("-version").output().is_err() {
            return Err(EncoderError::Ffmpeg(format!(
                "FFmpeg not found at '{}'",
                self.ffmpeg_path
            )));
        }
        Ok(Box::new(FfmpegSink::new(self.ffmpeg_path.clone(), self.queue_depth)))
    }
}
