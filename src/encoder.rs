//! Encoder Pipeline: screen capture -> BGRA->YUV420P conversion -> H.264
//! encode, grounded in `ScreenCaptureEncoder.cpp`. Capture and pixel
//! conversion live behind the [`DesktopCapture`] trait (same seam shape as
//! the teacher's `Encoder`/`EncoderFactory` pair in `video/encoder/traits.rs`)
//! so the 20fps pacing loop and `hwcodec` wiring stay platform-agnostic.

use std::time::Duration;

use hwcodec::common::{Quality, RateControl};
use hwcodec::ffmpeg::AVPixelFormat;
use hwcodec::ffmpeg_ram::encode::{EncodeContext, Encoder as HwEncoder};
use tokio::sync::mpsc;
use tokio::time::interval;

use crate::events::EventBus;

/// Landscape target; portrait screens encode at the swapped dimensions,
/// matching `ScreenCaptureEncoder::getFixedSize`'s landscape/portrait branch.
const FIXED_LANDSCAPE: (i32, i32) = (1920, 1080);
const FRAME_FPS: i32 = 20;
const GOP_SIZE: i32 = 10;
const MAX_B_FRAMES: i32 = 1;
const FRAME_INTERVAL: Duration = Duration::from_millis(1000 / FRAME_FPS as u64);
/// Bound on waiting for the capture/encode task to stop before it is
/// aborted outright, matching `RelayManager.cpp`'s 3000ms thread joins.
const STOP_GRACE: Duration = Duration::from_secs(3);

fn bitrate_kbps(width: i32, height: i32) -> i32 {
    // Matches `bit_rate = width * height * 2` (bits/sec) from the original,
    // converted to the kbps unit `hwcodec::EncodeContext` expects.
    (width as i64 * height as i64 * 2 / 1000) as i32
}

/// Captures raw BGRA frames from the desktop. Implemented per-platform; a
/// headless test double can swap in a synthetic source.
pub trait DesktopCapture: Send {
    /// Current screen size, landscape-normalized per `getFixedSize`.
    fn screen_size(&self) -> (i32, i32);
    /// Grab one BGRA frame sized to `screen_size()`.
    fn capture(&mut self) -> Option<Vec<u8>>;
}

#[cfg(target_os = "windows")]
pub use windows_capture::WindowsCapture as PlatformCapture;

#[cfg(not(target_os = "windows"))]
pub use blank_capture::BlankCapture as PlatformCapture;

#[cfg(target_os = "windows")]
mod windows_capture {
    use super::DesktopCapture;
    use windows::Win32::Graphics::Gdi::{
        BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC,
        GetDIBits, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS,
        SRCCOPY,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

    /// GDI `BitBlt` screen grab, the Win32 equivalent of the original's
    /// `grabDXG`/`QScreen` capture path. DXGI desktop duplication would
    /// lower latency further but needs a Direct3D device the rest of this
    /// agent has no other use for; BitBlt is a reasonable fit for a 20fps
    /// software-encode target.
    pub struct WindowsCapture;

    impl WindowsCapture {
        pub fn new() -> Self {
            Self
        }
    }

    impl Default for WindowsCapture {
        fn default() -> Self {
            Self::new()
        }
    }

    impl DesktopCapture for WindowsCapture {
        fn screen_size(&self) -> (i32, i32) {
            let w = unsafe { GetSystemMetrics(SM_CXSCREEN) };
            let h = unsafe { GetSystemMetrics(SM_CYSCREEN) };
            (w.max(1), h.max(1))
        }

        fn capture(&mut self) -> Option<Vec<u8>> {
            let (width, height) = self.screen_size();
            unsafe {
                let screen_dc = GetDC(windows::Win32::Foundation::HWND(0));
                let mem_dc = CreateCompatibleDC(screen_dc);
                let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
                let old = SelectObject(mem_dc, bitmap);

                let ok = BitBlt(mem_dc, 0, 0, width, height, screen_dc, 0, 0, SRCCOPY).is_ok();

                let mut buf = vec![0u8; (width * height * 4) as usize];
                if ok {
                    let mut bmi = BITMAPINFO {
                        bmiHeader: BITMAPINFOHEADER {
                            biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                            biWidth: width,
                            biHeight: -height, // top-down DIB
                            biPlanes: 1,
                            biBitCount: 32,
                            biCompression: BI_RGB.0,
                            ..Default::default()
                        },
                        ..Default::default()
                    };
                    GetDIBits(
                        mem_dc,
                        bitmap,
                        0,
                        height as u32,
                        Some(buf.as_mut_ptr() as *mut _),
                        &mut bmi,
                        DIB_RGB_COLORS,
                    );
                }

                let _ = SelectObject(mem_dc, old);
                let _ = DeleteObject(bitmap);
                let _ = DeleteDC(mem_dc);
                ReleaseDC(windows::Win32::Foundation::HWND(0), screen_dc);

                ok.then_some(buf)
            }
        }
    }
}

#[cfg(not(target_os = "windows"))]
mod blank_capture {
    use super::DesktopCapture;
    use super::FIXED_LANDSCAPE;

    /// Non-Windows builds have no `SendInput`-grade capture API in this
    /// agent's dependency stack; emits a fixed gray BGRA frame so the
    /// pipeline still runs end to end in CI/development.
    pub struct BlankCapture;

    impl BlankCapture {
        pub fn new() -> Self {
            Self
        }
    }

    impl Default for BlankCapture {
        fn default() -> Self {
            Self::new()
        }
    }

    impl DesktopCapture for BlankCapture {
        fn screen_size(&self) -> (i32, i32) {
            FIXED_LANDSCAPE
        }

        fn capture(&mut self) -> Option<Vec<u8>> {
            let (w, h) = self.screen_size();
            Some(vec![128u8; (w * h * 4) as usize])
        }
    }
}

enum Command {
    Stop,
}

pub struct EncoderPipeline {
    cmd_tx: Option<mpsc::Sender<Command>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl EncoderPipeline {
    pub fn new() -> Self {
        Self {
            cmd_tx: None,
            task: None,
        }
    }

    /// Start the capture/encode loop at the fixed 20fps cadence and return a
    /// channel of encoded H.264 access units.
    pub fn start(&mut self, events: EventBus) -> mpsc::Receiver<Vec<u8>> {
        let (frame_tx, frame_rx) = mpsc::channel(8);
        let (cmd_tx, cmd_rx) = mpsc::channel(4);

        let task = tokio::spawn(run_pipeline(events, frame_tx, cmd_rx));
        self.cmd_tx = Some(cmd_tx);
        self.task = Some(task);
        frame_rx
    }

    /// Ask the capture/encode loop to stop and wait up to [`STOP_GRACE`];
    /// abort the task if it hasn't wound down by then, matching
    /// `RelayManager::stop()`'s `m_encoderThread->wait(3000)` /
    /// `terminate()` pair.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(Command::Stop).await;
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
    }
}

impl Default for EncoderPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// On a fresh capture, remember it and use it. On failure, fall back to the
/// last successful capture; never fabricate a frame when none exists yet.
fn resolve_capture(captured: Option<Vec<u8>>, last: &mut Option<Vec<u8>>) -> Option<Vec<u8>> {
    match captured {
        Some(bgra) => {
            *last = Some(bgra.clone());
            Some(bgra)
        }
        None => last.clone(),
    }
}

fn build_encoder(width: i32, height: i32) -> Result<HwEncoder, ()> {
    let ctx = EncodeContext {
        name: "libx264".to_string(),
        mc_name: None,
        width,
        height,
        pixfmt: AVPixelFormat::AV_PIX_FMT_YUV420P,
        align: 0,
        fps: FRAME_FPS,
        gop: GOP_SIZE,
        rc: RateControl::RC_CBR,
        quality: Quality::Quality_Default,
        kbs: bitrate_kbps(width, height),
        q: -1,
        thread_count: 1,
    };
    HwEncoder::new(ctx)
}

async fn run_pipeline(
    events: EventBus,
    frame_tx: mpsc::Sender<Vec<u8>>,
    mut cmd_rx: mpsc::Receiver<Command>,
) {
    let mut capture = PlatformCapture::default();
    let (mut width, mut height) = capture.screen_size();
    let mut encoder = match build_encoder(width, height) {
        Ok(e) => e,
        Err(_) => {
            events.error("failed to open H.264 encoder");
            return;
        }
    };

    let mut ticker = interval(FRAME_INTERVAL);
    let mut pts = 0i64;
    let mut frame_size = (width * height * 3 / 2) as usize; // I420 plane size
    let mut last_capture: Option<Vec<u8>> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                if matches!(cmd, Some(Command::Stop) | None) {
                    break;
                }
            }
            _ = ticker.tick() => {
                let (cur_w, cur_h) = capture.screen_size();
                if cur_w != width || cur_h != height {
                    width = cur_w;
                    height = cur_h;
                    frame_size = (width * height * 3 / 2) as usize;
                    last_capture = None;
                    encoder = match build_encoder(width, height) {
                        Ok(e) => e,
                        Err(_) => {
                            events.error("failed to reinitialize H.264 encoder after resolution change");
                            continue;
                        }
                    };
                    continue; // one cycle skipped, matching the original's reinit behavior
                }

                let captured = capture.capture();
                if captured.is_none() {
                    events.error("desktop capture failed");
                }
                let Some(bgra) = resolve_capture(captured, &mut last_capture) else {
                    continue;
                };

                let mut yuv = vec![0u8; frame_size];
                if libyuv::bgra_to_i420(&bgra, &mut yuv, width, height).is_err() {
                    events.error("BGRA->YUV420P conversion failed");
                    continue;
                }

                match encoder.encode(&yuv, pts) {
                    Ok(frames) => {
                        for f in frames.drain(..) {
                            if frame_tx.send(f.data).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(_) => events.error("H.264 encode failed"),
                }
                pts += (1000 / FRAME_FPS) as i64;
            }
        }
    }

    tracing::debug!("encoder pipeline stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_matches_width_height_times_two() {
        assert_eq!(bitrate_kbps(1920, 1080), 1920 * 1080 * 2 / 1000);
    }

    #[test]
    fn resolve_capture_falls_back_to_last_successful_frame() {
        let mut last = None;
        assert_eq!(resolve_capture(Some(vec![1, 2, 3]), &mut last), Some(vec![1, 2, 3]));
        assert_eq!(resolve_capture(None, &mut last), Some(vec![1, 2, 3]));
    }

    #[test]
    fn resolve_capture_drops_cycle_when_nothing_captured_yet() {
        let mut last = None;
        assert_eq!(resolve_capture(None, &mut last), None);
    }

    #[test]
    fn blank_capture_reports_fixed_landscape_size() {
        #[cfg(not(target_os = "windows"))]
        {
            let capture = blank_capture::BlankCapture::new();
            assert_eq!(capture.screen_size(), FIXED_LANDSCAPE);
        }
    }
}
