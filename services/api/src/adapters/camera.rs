//! services/api/src/adapters/camera.rs
//!
//! This module contains the capture adapter, which implements the `CaptureDevice`
//! port by driving FFmpeg subprocesses: one reads raw frames from the camera, and
//! one per chunk encodes raw frames into an MP4 file.

use async_trait::async_trait;
use recording_core::domain::FrameSettings;
use recording_core::ports::{CaptureDevice, FrameSink, FrameSource, PortError, PortResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{info, warn};

/// Raw pixel layout exchanged between the two FFmpeg processes.
const PIXEL_FORMAT: &str = "bgr24";
const BYTES_PER_PIXEL: usize = 3;

/// How long the camera gets to deliver its first frame before it counts as unavailable.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(10);

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `CaptureDevice` port with the `ffmpeg` binary.
#[derive(Clone, Debug)]
pub struct FfmpegCameraAdapter {
    ffmpeg_path: PathBuf,
    input_format: String,
    device: String,
    overlay: bool,
}

impl FfmpegCameraAdapter {
    /// Creates a new `FfmpegCameraAdapter`.
    pub fn new(ffmpeg_path: PathBuf, input_format: String, device: String) -> Self {
        Self {
            ffmpeg_path,
            input_format,
            device,
            overlay: true,
        }
    }

    /// Turns the user/time caption on or off. FFmpeg builds without libfreetype
    /// have no `drawtext` filter and need it off.
    pub fn with_overlay(mut self, overlay: bool) -> Self {
        self.overlay = overlay;
        self
    }

    /// Scales to the requested size and, with the overlay on, captions every frame
    /// with `User: {name}` and the local capture time.
    fn video_filter(&self, user_name: &str, settings: &FrameSettings) -> String {
        let scale = format!("scale={}:{}", settings.width, settings.height);
        if !self.overlay {
            return scale;
        }
        // User names are limited to [A-Za-z0-9_.-], so they need no escaping. The
        // time format's colons are escaped once for the option parser and once for
        // drawtext's own function arguments.
        let user = format!(
            r"drawtext=text='User\: {user_name}':x=10:y=10:fontsize=20:fontcolor=lime"
        );
        let time = r"drawtext=text='Time\: %{localtime\:%Y-%m-%d %H\\\:%M\\\:%S}':x=10:y=40:fontsize=20:fontcolor=lime";
        format!("{scale},{user},{time}")
    }

    fn frame_len(settings: &FrameSettings) -> usize {
        settings.width as usize * settings.height as usize * BYTES_PER_PIXEL
    }

    fn capture_command(&self, user_name: &str, settings: &FrameSettings) -> Command {
        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(["-hide_banner", "-loglevel", "error"])
            .arg("-f")
            .arg(&self.input_format)
            .arg("-framerate")
            .arg(settings.frame_rate.to_string())
            .arg("-video_size")
            .arg(format!("{}x{}", settings.width, settings.height))
            .arg("-i")
            .arg(&self.device)
            // Scale in case the camera ignores the requested size.
            .arg("-vf")
            .arg(self.video_filter(user_name, settings))
            .args(["-f", "rawvideo", "-pix_fmt", PIXEL_FORMAT, "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }

    fn encode_command(&self, path: &Path, settings: &FrameSettings) -> Command {
        let mut command = Command::new(&self.ffmpeg_path);
        command
            // Never overwrite: an existing file already belongs to a recorded chunk.
            .args(["-n", "-hide_banner", "-loglevel", "error"])
            .args(["-f", "rawvideo", "-pixel_format", PIXEL_FORMAT])
            .arg("-video_size")
            .arg(format!("{}x{}", settings.width, settings.height))
            .arg("-framerate")
            .arg(settings.frame_rate.to_string())
            .args(["-i", "-"])
            .args(["-c:v", "libx264", "-preset", "veryfast", "-pix_fmt", "yuv420p"])
            .args(["-movflags", "+faststart"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }
}

//=========================================================================================
// `CaptureDevice` Trait Implementation
//=========================================================================================

#[async_trait]
impl CaptureDevice for FfmpegCameraAdapter {
    async fn open_source(
        &self,
        user_name: &str,
        settings: &FrameSettings,
    ) -> PortResult<Box<dyn FrameSource>> {
        let mut child = self.capture_command(user_name, settings).spawn().map_err(|e| {
            PortError::Unexpected(format!("Failed to start {}: {}", self.ffmpeg_path.display(), e))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PortError::Unexpected("Camera process has no stdout".to_string()))?;

        let mut source = FfmpegFrameSource {
            child,
            stdout,
            frame_len: Self::frame_len(settings),
            pending: None,
        };

        // The process starts even without a camera; only a delivered frame proves the device is open.
        let first_frame = tokio::time::timeout(FIRST_FRAME_TIMEOUT, source.read_raw()).await;
        match first_frame {
            Ok(Ok(frame)) => {
                info!("Camera {} opened via {}", self.device, self.input_format);
                source.pending = Some(frame);
                Ok(Box::new(source))
            }
            Ok(Err(e)) => {
                source.shutdown().await;
                Err(PortError::Unexpected(format!("Cannot open webcam {}: {}", self.device, e)))
            }
            Err(_) => {
                source.shutdown().await;
                Err(PortError::Unexpected(format!(
                    "Webcam {} produced no frame within {:?}",
                    self.device, FIRST_FRAME_TIMEOUT
                )))
            }
        }
    }

    async fn open_sink(
        &self,
        path: &Path,
        settings: &FrameSettings,
    ) -> PortResult<Box<dyn FrameSink>> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Unexpected(format!("Cannot create {}: {}", parent.display(), e)))?;
        }

        let mut child = self.encode_command(path, settings).spawn().map_err(|e| {
            PortError::Unexpected(format!("Cannot create video writer for {}: {}", path.display(), e))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PortError::Unexpected("Encoder process has no stdin".to_string()))?;

        Ok(Box::new(FfmpegFrameSink {
            child,
            stdin: Some(stdin),
            path: path.to_path_buf(),
        }))
    }
}

//=========================================================================================
// Frame Source and Sink
//=========================================================================================

struct FfmpegFrameSource {
    child: Child,
    stdout: ChildStdout,
    frame_len: usize,
    /// The frame read while opening, handed out by the first `read_frame`.
    pending: Option<Vec<u8>>,
}

impl FfmpegFrameSource {
    async fn read_raw(&mut self) -> std::io::Result<Vec<u8>> {
        let mut frame = vec![0u8; self.frame_len];
        self.stdout.read_exact(&mut frame).await?;
        Ok(frame)
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!("Failed to stop camera process: {}", e);
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn read_frame(&mut self) -> PortResult<Vec<u8>> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        self.read_raw()
            .await
            .map_err(|e| PortError::Unexpected(format!("Error reading frame from webcam: {}", e)))
    }

    async fn close(mut self: Box<Self>) {
        self.shutdown().await;
    }
}

struct FfmpegFrameSink {
    child: Child,
    stdin: Option<ChildStdin>,
    path: PathBuf,
}

#[async_trait]
impl FrameSink for FfmpegFrameSink {
    async fn write_frame(&mut self, frame: &[u8]) -> PortResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| PortError::Unexpected("Encoder input already closed".to_string()))?;
        stdin
            .write_all(frame)
            .await
            .map_err(|e| PortError::Unexpected(format!("Encoder for {} stopped: {}", self.path.display(), e)))
    }

    async fn finish(mut self: Box<Self>) -> PortResult<()> {
        // Closing stdin signals end of input; FFmpeg then writes the trailer.
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.shutdown().await {
                warn!("Failed to flush encoder input for {}: {}", self.path.display(), e);
            }
        }

        let status = self
            .child
            .wait()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(PortError::Unexpected(format!(
                "Encoder for {} exited with {}",
                self.path.display(),
                status
            )))
        }
    }

    async fn discard(mut self: Box<Self>) {
        self.stdin.take();
        if let Err(e) = self.child.kill().await {
            warn!("Failed to stop encoder for {}: {}", self.path.display(), e);
        }
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not delete file {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> FfmpegCameraAdapter {
        FfmpegCameraAdapter::new(
            PathBuf::from("ffmpeg"),
            "v4l2".to_string(),
            "/dev/video0".to_string(),
        )
    }

    fn args(command: &Command) -> Vec<String> {
        command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn frame_len_covers_every_pixel() {
        assert_eq!(FfmpegCameraAdapter::frame_len(&FrameSettings::default()), 640 * 480 * 3);
    }

    #[test]
    fn capture_command_streams_raw_frames_to_stdout() {
        let args = args(&adapter().capture_command("alice", &FrameSettings::default()));
        let joined = args.join(" ");
        assert!(joined.contains("-f v4l2"));
        assert!(joined.contains("-video_size 640x480"));
        assert!(joined.contains("-i /dev/video0"));
        assert!(joined.ends_with("-f rawvideo -pix_fmt bgr24 -"));
    }

    #[test]
    fn encode_command_writes_to_the_chunk_path() {
        let path = Path::new("recordings/alice_20240101_000000_chunk_1.mp4");
        let args = args(&adapter().encode_command(path, &FrameSettings::default()));
        assert_eq!(args.last().map(String::as_str), path.to_str());
        assert!(args.join(" ").contains("-i -"));
        assert_eq!(args.first().map(String::as_str), Some("-n"));
        assert!(!args.iter().any(|a| a == "-y"));
    }

    #[test]
    fn capture_command_captions_frames_with_user_and_time() {
        let args = args(&adapter().capture_command("alice", &FrameSettings::default()));
        let filter = args
            .iter()
            .skip_while(|a| a.as_str() != "-vf")
            .nth(1)
            .cloned()
            .unwrap();

        assert!(filter.starts_with("scale=640:480,"));
        assert!(filter.contains(r"drawtext=text='User\: alice'"));
        assert!(filter.contains("%{localtime"));
        assert_eq!(filter.matches("drawtext=").count(), 2);
    }

    #[test]
    fn overlay_can_be_turned_off() {
        let adapter = adapter().with_overlay(false);
        let args = args(&adapter.capture_command("alice", &FrameSettings::default()));

        assert!(args.iter().any(|a| a == "scale=640:480"));
        assert!(!args.iter().any(|a| a.contains("drawtext")));
    }

    #[tokio::test]
    async fn missing_ffmpeg_binary_means_no_sink() {
        let adapter = FfmpegCameraAdapter::new(
            PathBuf::from("/nonexistent/ffmpeg"),
            "v4l2".to_string(),
            "/dev/video0".to_string(),
        );
        let dir = std::env::temp_dir().join("camera-adapter-test");

        let result = adapter
            .open_sink(&dir.join("chunk.mp4"), &FrameSettings::default())
            .await;

        assert!(result.is_err());
    }
}
