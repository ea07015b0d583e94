#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub(crate) mod uinput_ffi;

#[cfg(target_os = "linux")]
pub use linux::VirtualJoypad;

/// Joypad state to be emitted
#[derive(Debug, Clone, Default)]
pub struct JoypadState {
    /// Left stick X axis (-1.0 to 1.0)
    pub left_stick_x: f32,
    /// Left stick Y axis (-1.0 to 1.0)
    pub left_stick_y: f32,
    /// Right stick X axis (-1.0 to 1.0)
    pub right_stick_x: f32,
    /// Right stick Y axis (-1.0 to 1.0)
    pub right_stick_y: f32,
    /// Left trigger (0.0 to 1.0)
    pub left_trigger: f32,
    /// Right trigger (0.0 to 1.0)
    pub right_trigger: f32,
    pub buttons: JoypadButtons,
}

#[derive(Debug, Clone, Default)]
pub struct JoypadButtons {
    pub south: bool,
    pub east: bool,
    pub north: bool,
    pub west: bool,
    pub left_bumper: bool,
    pub right_bumper: bool,
    pub select: bool,
    pub start: bool,
    pub mode: bool,
    pub left_thumb: bool,
    pub right_thumb: bool,
    pub dpad_up: bool,
    pub dpad_down: bool,
    pub dpad_left: bool,
    pub dpad_right: bool,
}

impl JoypadButtons {
    /// Hat position from the d-pad, opposite directions cancel out
    pub fn hat(&self) -> (i32, i32) {
        let hat_x = match (self.dpad_left, self.dpad_right) {
            (true, false) => -1,
            (false, true) => 1,
            _ => 0,
        };
        let hat_y = match (self.dpad_up, self.dpad_down) {
            (true, false) => -1,
            (false, true) => 1,
            _ => 0,
        };
        (hat_x, hat_y)
    }
}
