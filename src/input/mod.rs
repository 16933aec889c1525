//! Input Injector: turns wire `InputControlEvent`s into OS input, grounded
//! in `RemoteInputSimulator.cpp`. The trait split mirrors the teacher's
//! `HidBackend` surface (`hid/backend.rs`) so platform coupling lives behind
//! one seam instead of leaking into the relay session's dispatch loop.

pub mod keymap;

use crate::protocol::{input_control_event, InputControlEvent, MouseMask, TouchPhase};

/// Viewer-side coordinate space the wire protocol assumes for mouse/touch
/// `x`/`y`, matching the original's hardcoded `1920x1080` viewer canvas.
/// Known limitation carried over verbatim: a viewer at any other resolution
/// needs its own client-side scaling, same as in the original program.
pub const VIEWER_WIDTH: i32 = 1920;
pub const VIEWER_HEIGHT: i32 = 1080;

/// Rescale a viewer-space coordinate into local screen pixels.
pub fn rescale(value: i32, viewer_extent: i32, local_extent: i32) -> i32 {
    if viewer_extent == 0 {
        return value;
    }
    (value as i64 * local_extent as i64 / viewer_extent as i64) as i32
}

pub trait InputSink: Send + Sync {
    fn handle_mouse(&self, x: i32, y: i32, mask: u32, value: i32);
    fn handle_touch(&self, timestamp: u64, points: &[crate::protocol::TouchPoint]);
    fn handle_keyboard(&self, key_code: u32, pressed: bool);

    /// Dispatch a decoded [`InputControlEvent`] to the right handler.
    fn dispatch(&self, event: InputControlEvent) {
        match event.input {
            Some(input_control_event::Input::Mouse(m)) => {
                self.handle_mouse(m.x, m.y, m.mask, m.value)
            }
            Some(input_control_event::Input::Touch(t)) => {
                self.handle_touch(t.timestamp, &t.points)
            }
            Some(input_control_event::Input::Keyboard(k)) => {
                self.handle_keyboard(k.key_code, k.pressed)
            }
            None => {}
        }
    }
}

/// Bit positions within `MouseEvent.mask`; `MOUSE_MOVE` carries no bit of its
/// own since a move is implied by every event carrying fresh coordinates.
fn mask_has(mask: u32, bit: MouseMask) -> bool {
    match bit {
        MouseMask::MouseMove => false,
        other => mask & (1 << (other as u32 - 1)) != 0,
    }
}

#[cfg(target_os = "windows")]
pub use windows_impl::PlatformInputSink;

#[cfg(not(target_os = "windows"))]
pub use noop_impl::PlatformInputSink;

/// Up to 10 simultaneous contacts, matching §4.6's touch contract.
const MAX_TOUCH_CONTACTS: u32 = 10;

#[cfg(target_os = "windows")]
mod windows_impl {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use windows::Win32::Foundation::{POINT, RECT};
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS, KEYEVENTF_KEYUP,
        MOUSEEVENTF_ABSOLUTE, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MIDDLEDOWN,
        MOUSEEVENTF_MIDDLEUP, MOUSEEVENTF_MOVE, MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP,
        MOUSEEVENTF_WHEEL, MOUSEINPUT, VIRTUAL_KEY,
    };
    use windows::Win32::UI::Input::Pointer::{
        POINTER_FLAGS, POINTER_FLAG_CANCELED, POINTER_FLAG_DOWN, POINTER_FLAG_INCONTACT,
        POINTER_FLAG_INRANGE, POINTER_FLAG_UP, POINTER_FLAG_UPDATE, POINTER_INFO,
        POINTER_INPUT_TYPE,
    };
    use windows::Win32::UI::Input::Touch::{
        InitializeTouchInjection, InjectTouchInput, POINTER_TOUCH_INFO, TOUCH_FEEDBACK_DEFAULT,
        TOUCH_FLAG_NONE, TOUCH_MASK_CONTACTAREA, TOUCH_MASK_PRESSURE,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

    const PT_TOUCH: POINTER_INPUT_TYPE = POINTER_INPUT_TYPE(2);

    /// Win32 `SendInput`-backed injector. Every call runs on whatever tokio
    /// worker thread handles the relay session; `SendInput` itself is
    /// thread-agnostic so no dedicated OS thread is needed here, unlike the
    /// original's realtime-priority worker thread (not replicated: a
    /// headless agent has no UI thread to starve).
    pub struct PlatformInputSink;

    impl PlatformInputSink {
        pub fn new() -> Self {
            Self
        }

        fn to_screen_coords(x: i32, y: i32) -> (i32, i32) {
            let (local_x, local_y, screen_w, screen_h) = Self::to_local_pixel_coords(x, y);
            (
                (65535i64 * local_x as i64 / screen_w as i64) as i32,
                (65535i64 * local_y as i64 / screen_h as i64) as i32,
            )
        }

        /// Rescale viewer-space coordinates into local screen pixels,
        /// alongside the screen extents they were scaled against.
        fn to_local_pixel_coords(x: i32, y: i32) -> (i32, i32, i32, i32) {
            let screen_w = unsafe { GetSystemMetrics(SM_CXSCREEN) }.max(1);
            let screen_h = unsafe { GetSystemMetrics(SM_CYSCREEN) }.max(1);
            let local_x = rescale(x, VIEWER_WIDTH, screen_w);
            let local_y = rescale(y, VIEWER_HEIGHT, screen_h);
            (local_x, local_y, screen_w, screen_h)
        }

        /// `InitializeTouchInjection` must run once per process before the
        /// first `InjectTouchInput` call; a racing second caller is harmless
        /// since the API is idempotent, so a relaxed flag (not a `OnceLock`)
        /// is enough to skip the call on the common warm path.
        fn ensure_touch_injection_ready() -> bool {
            static READY: AtomicBool = AtomicBool::new(false);
            if READY.load(Ordering::Relaxed) {
                return true;
            }
            let ok = unsafe {
                InitializeTouchInjection(MAX_TOUCH_CONTACTS, TOUCH_FEEDBACK_DEFAULT).is_ok()
            };
            if ok {
                READY.store(true, Ordering::Relaxed);
            }
            ok
        }

        /// Flags for the phase transition, matching §4.6: Begin -> down,
        /// Move -> update, End -> up, Cancel -> up with the canceled bit set.
        fn pointer_flags_for_phase(phase: i32) -> POINTER_FLAGS {
            match phase {
                p if p == TouchPhase::Begin as i32 => {
                    POINTER_FLAG_DOWN | POINTER_FLAG_INRANGE | POINTER_FLAG_INCONTACT
                }
                p if p == TouchPhase::Move as i32 => {
                    POINTER_FLAG_UPDATE | POINTER_FLAG_INRANGE | POINTER_FLAG_INCONTACT
                }
                p if p == TouchPhase::Cancel as i32 => POINTER_FLAG_UP | POINTER_FLAG_CANCELED,
                _ => POINTER_FLAG_UP,
            }
        }

        fn mouse_input(dx: i32, dy: i32, flags: u32, data: i32) -> INPUT {
            INPUT {
                r#type: INPUT_MOUSE,
                Anonymous: INPUT_0 {
                    mi: MOUSEINPUT {
                        dx,
                        dy,
                        mouseData: data as u32,
                        dwFlags: windows::Win32::UI::Input::KeyboardAndMouse::MOUSE_EVENT_FLAGS(
                            flags,
                        ),
                        time: 0,
                        dwExtraInfo: 0,
                    },
                },
            }
        }

        fn send(inputs: &[INPUT]) {
            if !inputs.is_empty() {
                unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
            }
        }
    }

    impl Default for PlatformInputSink {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InputSink for PlatformInputSink {
        fn handle_mouse(&self, x: i32, y: i32, mask: u32, value: i32) {
            let (sx, sy) = Self::to_screen_coords(x, y);
            let move_flags = MOUSEEVENTF_ABSOLUTE.0 | MOUSEEVENTF_MOVE.0;
            let move_input = Self::mouse_input(sx, sy, move_flags, 0);

            if mask_has(mask, MouseMask::DoubleClick) {
                let down = Self::mouse_input(0, 0, MOUSEEVENTF_LEFTDOWN.0, 0);
                let up = Self::mouse_input(0, 0, MOUSEEVENTF_LEFTUP.0, 0);
                Self::send(&[move_input, down, up]);

                let second = [move_input, down, up];
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Self::send(&second);
                });
                return;
            }

            let mut inputs = vec![move_input];
            if mask_has(mask, MouseMask::LeftDown) {
                inputs.push(Self::mouse_input(0, 0, MOUSEEVENTF_LEFTDOWN.0, 0));
            }
            if mask_has(mask, MouseMask::LeftUp) {
                inputs.push(Self::mouse_input(0, 0, MOUSEEVENTF_LEFTUP.0, 0));
            }
            if mask_has(mask, MouseMask::RightClick) {
                inputs.push(Self::mouse_input(0, 0, MOUSEEVENTF_RIGHTDOWN.0, 0));
                inputs.push(Self::mouse_input(0, 0, MOUSEEVENTF_RIGHTUP.0, 0));
            }
            if mask_has(mask, MouseMask::MiddleClick) {
                inputs.push(Self::mouse_input(0, 0, MOUSEEVENTF_MIDDLEDOWN.0, 0));
                inputs.push(Self::mouse_input(0, 0, MOUSEEVENTF_MIDDLEUP.0, 0));
            }
            if mask_has(mask, MouseMask::Wheel) {
                inputs.push(Self::mouse_input(sx, sy, MOUSEEVENTF_WHEEL.0, value));
            }
            Self::send(&inputs);
        }

        fn handle_touch(&self, _timestamp: u64, points: &[crate::protocol::TouchPoint]) {
            if points.is_empty() {
                return;
            }
            if !Self::ensure_touch_injection_ready() {
                tracing::warn!("InitializeTouchInjection failed, dropping touch batch");
                return;
            }

            let infos: Vec<POINTER_TOUCH_INFO> = points
                .iter()
                .take(MAX_TOUCH_CONTACTS as usize)
                .map(|point| {
                    let (local_x, local_y, _, _) = Self::to_local_pixel_coords(point.x, point.y);
                    // Contact area: a square of side 2*size centered on (x, y).
                    let size = point.size as i32;
                    let rc_contact = RECT {
                        left: local_x - size,
                        top: local_y - size,
                        right: local_x + size,
                        bottom: local_y + size,
                    };
                    // Pressure scales from the wire's 0.0-1.0 float to a
                    // 0-1024 integer.
                    let pressure = (point.pressure.clamp(0.0, 1.0) * 1024.0) as u32;

                    POINTER_TOUCH_INFO {
                        pointerInfo: POINTER_INFO {
                            pointerType: PT_TOUCH,
                            pointerId: point.id,
                            ptPixelLocation: POINT {
                                x: local_x,
                                y: local_y,
                            },
                            pointerFlags: Self::pointer_flags_for_phase(point.phase),
                            ..Default::default()
                        },
                        touchFlags: TOUCH_FLAG_NONE,
                        touchMask: TOUCH_MASK_CONTACTAREA | TOUCH_MASK_PRESSURE,
                        rcContact: rc_contact,
                        orientation: 0,
                        pressure,
                        ..Default::default()
                    }
                })
                .collect();

            if unsafe { InjectTouchInput(&infos) }.is_err() {
                tracing::warn!("InjectTouchInput failed for {} contact(s)", infos.len());
            }
        }

        fn handle_keyboard(&self, key_code: u32, pressed: bool) {
            let Some(vk) = keymap::to_virtual_key(key_code) else {
                tracing::debug!(key_code, "unmapped key code");
                return;
            };
            let flags = if pressed {
                KEYBD_EVENT_FLAGS(0)
            } else {
                KEYEVENTF_KEYUP
            };
            let input = INPUT {
                r#type: windows::Win32::UI::Input::KeyboardAndMouse::INPUT_KEYBOARD,
                Anonymous: INPUT_0 {
                    ki: KEYBDINPUT {
                        wVk: VIRTUAL_KEY(vk as u16),
                        wScan: 0,
                        dwFlags: flags,
                        time: 0,
                        dwExtraInfo: 0,
                    },
                },
            };
            Self::send(&[input]);
        }
    }
}

#[cfg(not(target_os = "windows"))]
mod noop_impl {
    use super::*;

    /// Non-Windows builds (CI, development) log what would have been
    /// injected instead of touching OS input, since there is no portable
    /// equivalent to `SendInput`/`InjectTouchInput` in this agent's
    /// dependency stack.
    #[derive(Default)]
    pub struct PlatformInputSink;

    impl PlatformInputSink {
        pub fn new() -> Self {
            Self
        }
    }

    impl InputSink for PlatformInputSink {
        fn handle_mouse(&self, x: i32, y: i32, mask: u32, value: i32) {
            tracing::debug!(x, y, mask, value, "mouse event (no-op platform sink)");
        }

        fn handle_touch(&self, timestamp: u64, points: &[crate::protocol::TouchPoint]) {
            tracing::debug!(
                timestamp,
                count = points.len(),
                "touch event (no-op platform sink)"
            );
        }

        fn handle_keyboard(&self, key_code: u32, pressed: bool) {
            tracing::debug!(key_code, pressed, "keyboard event (no-op platform sink)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_identity_when_extents_match() {
        assert_eq!(rescale(960, 1920, 1920), 960);
    }

    #[test]
    fn rescale_halves_into_smaller_local_screen() {
        assert_eq!(rescale(1920, 1920, 960), 960);
    }

    #[test]
    fn mouse_move_carries_no_bit() {
        assert!(!mask_has(0, MouseMask::MouseMove));
    }

    #[test]
    fn left_down_bit_is_detected() {
        let mask = 1 << (MouseMask::LeftDown as u32 - 1);
        assert!(mask_has(mask, MouseMask::LeftDown));
        assert!(!mask_has(mask, MouseMask::RightClick));
    }
}
