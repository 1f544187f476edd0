//! Camera capture
//!
//! Opens the USB camera through nokhwa and runs the read/decode loop on a
//! dedicated thread, so the window stays responsive while the driver
//! blocks. The render thread polls [`CameraCapture::latest_frame`] and
//! skips anything it has already displayed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use parking_lot::Mutex;
use thiserror::Error;

use crate::view::FrameImage;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open camera {index}: {source}")]
    Open {
        index: u32,
        source: nokhwa::NokhwaError,
    },
    #[error("failed to start stream on camera {index}: {source}")]
    Stream {
        index: u32,
        source: nokhwa::NokhwaError,
    },
    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// One decoded camera frame, already converted to display RGBA.
#[derive(Clone)]
pub struct CapturedFrame {
    pub image: FrameImage,
    /// Monotonic frame number, starts at 1
    pub seq: u64,
}

/// An enumerated capture device.
#[derive(Clone, Debug)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
}

/// Handle to the background capture thread.
///
/// Dropping the handle stops the thread and joins it.
pub struct CameraCapture {
    latest: Arc<Mutex<Option<CapturedFrame>>>,
    running: Arc<AtomicBool>,
    frame_count: Arc<AtomicU64>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl CameraCapture {
    /// Enumerate available cameras. Failures are logged and yield an empty
    /// list rather than an error; the UI treats "none found" the same way.
    pub fn list_cameras() -> Vec<CameraInfo> {
        match nokhwa::query(ApiBackend::Auto) {
            Ok(devices) => devices
                .iter()
                .enumerate()
                .map(|(index, info)| CameraInfo {
                    index: index as u32,
                    name: info.human_name().to_string(),
                })
                .collect(),
            Err(e) => {
                log::warn!("Failed to enumerate cameras: {e}");
                Vec::new()
            }
        }
    }

    /// Start capturing from the camera at `index`.
    ///
    /// The device itself is opened on the capture thread; an unopenable
    /// camera logs an error there and the thread exits, which
    /// [`is_running`](Self::is_running) reports.
    pub fn start(index: u32) -> Result<Self, CaptureError> {
        let latest: Arc<Mutex<Option<CapturedFrame>>> = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let frame_count = Arc::new(AtomicU64::new(0));

        let thread_latest = latest.clone();
        let thread_running = running.clone();
        let thread_count = frame_count.clone();

        let thread_handle = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                capture_loop(index, thread_latest, thread_running.clone(), thread_count);
                thread_running.store(false, Ordering::Release);
            })?;

        Ok(Self {
            latest,
            running,
            frame_count,
            thread_handle: Some(thread_handle),
        })
    }

    /// Most recent decoded frame, if any has arrived yet.
    pub fn latest_frame(&self) -> Option<CapturedFrame> {
        self.latest.lock().clone()
    }

    /// Whether the capture thread is still alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Total frames decoded since the stream opened.
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Stop the capture thread and wait for it to finish.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Open the device, preferring the highest resolution the backend offers
/// and falling back to progressively looser format requests.
fn open_camera(index: u32) -> Result<Camera, CaptureError> {
    let camera_index = CameraIndex::Index(index);

    let attempts = [
        ("highest resolution", RequestedFormatType::AbsoluteHighestResolution),
        (
            "1280x720",
            RequestedFormatType::HighestResolution(Resolution::new(1280, 720)),
        ),
        ("any format", RequestedFormatType::None),
    ];

    let mut last_err = None;
    for (label, format_type) in attempts {
        let requested = RequestedFormat::new::<RgbAFormat>(format_type);
        match Camera::new(camera_index.clone(), requested) {
            Ok(camera) => return Ok(camera),
            Err(e) => {
                log::warn!("Camera {index} rejected {label}: {e}");
                last_err = Some(e);
            }
        }
    }

    Err(CaptureError::Open {
        index,
        source: last_err.expect("attempts is non-empty"),
    })
}

fn capture_loop(
    index: u32,
    latest: Arc<Mutex<Option<CapturedFrame>>>,
    running: Arc<AtomicBool>,
    frame_count: Arc<AtomicU64>,
) {
    log::info!("Starting camera capture thread (camera {index})");

    let mut camera = match open_camera(index) {
        Ok(camera) => camera,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };

    if let Err(source) = camera.open_stream() {
        log::error!("{}", CaptureError::Stream { index, source });
        return;
    }

    log::info!(
        "Camera opened: {} ({}x{})",
        camera.info().human_name(),
        camera.resolution().width(),
        camera.resolution().height()
    );

    while running.load(Ordering::Acquire) {
        let frame = match camera.frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Failed to capture frame: {e}");
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
        };

        let decoded = match frame.decode_image::<RgbAFormat>() {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Failed to decode frame: {e}");
                continue;
            }
        };

        let (width, height) = (decoded.width(), decoded.height());
        let Some(image) = FrameImage::from_rgba(width, height, decoded.into_raw()) else {
            log::warn!("Decoded frame has inconsistent dimensions, dropping");
            continue;
        };

        let seq = frame_count.fetch_add(1, Ordering::Relaxed) + 1;
        *latest.lock() = Some(CapturedFrame { image, seq });
    }

    log::info!("Camera capture thread stopped");
}
