use super::uinput_ffi::*;
use super::JoypadState;
use crate::config::{Config, DeviceConfig};
use crate::error::{Error, Result};
use crate::force_feedback::{self, RumbleCallback};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::fd::AsFd;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A uinput gamepad with rumble support.
///
/// Rumble effects played on the device are simulated on a background thread and reported to
/// the callback passed to [`VirtualJoypad::new`]. The device is destroyed on drop.
pub struct VirtualJoypad {
    uinput_file: File,
    stop_listening: Arc<AtomicBool>,
    listener_handle: Option<JoinHandle<()>>,
}

impl VirtualJoypad {
    pub fn new(config: &Config, on_rumble: Option<RumbleCallback>) -> Result<Self> {
        let uinput_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(UINPUT_PATH)
            .map_err(|source| Error::Open {
                path: UINPUT_PATH,
                source,
            })?;

        create_device(&uinput_file, &config.device)?;
        log::info!("Uinput joypad \"{}\" created", config.device.name);

        let stop_listening = Arc::new(AtomicBool::new(false));
        let listener_handle = match force_feedback::spawn_listener(
            uinput_file.as_fd(),
            config.feedback.clone(),
            on_rumble,
            Arc::clone(&stop_listening),
        ) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Unable to start FF listener, force feedback will be disabled: {}", e);
                None
            }
        };

        Ok(Self {
            uinput_file,
            stop_listening,
            listener_handle,
        })
    }

    pub fn update(&mut self, state: &JoypadState) -> Result<()> {
        let lx = (state.left_stick_x.clamp(-1.0, 1.0) * AXIS_MAX as f32) as i32;
        let ly = (state.left_stick_y.clamp(-1.0, 1.0) * AXIS_MAX as f32) as i32;
        let rx = (state.right_stick_x.clamp(-1.0, 1.0) * AXIS_MAX as f32) as i32;
        let ry = (state.right_stick_y.clamp(-1.0, 1.0) * AXIS_MAX as f32) as i32;
        let lt = (state.left_trigger.clamp(0.0, 1.0) * TRIGGER_MAX as f32) as i32;
        let rt = (state.right_trigger.clamp(0.0, 1.0) * TRIGGER_MAX as f32) as i32;

        self.write_event(EV_ABS, ABS_X, lx)?;
        self.write_event(EV_ABS, ABS_Y, ly)?;
        self.write_event(EV_ABS, ABS_RX, rx)?;
        self.write_event(EV_ABS, ABS_RY, ry)?;
        self.write_event(EV_ABS, ABS_Z, lt)?;
        self.write_event(EV_ABS, ABS_RZ, rt)?;

        let buttons = &state.buttons;
        for (code, pressed) in [
            (BTN_SOUTH, buttons.south),
            (BTN_EAST, buttons.east),
            (BTN_NORTH, buttons.north),
            (BTN_WEST, buttons.west),
            (BTN_TL, buttons.left_bumper),
            (BTN_TR, buttons.right_bumper),
            (BTN_SELECT, buttons.select),
            (BTN_START, buttons.start),
            (BTN_MODE, buttons.mode),
            (BTN_THUMBL, buttons.left_thumb),
            (BTN_THUMBR, buttons.right_thumb),
        ] {
            self.write_event(EV_KEY, code, pressed as i32)?;
        }

        let (hat_x, hat_y) = buttons.hat();
        self.write_event(EV_ABS, ABS_HAT0X, hat_x)?;
        self.write_event(EV_ABS, ABS_HAT0Y, hat_y)?;

        self.sync()
    }

    /// Whether the FF listener thread is still running
    pub fn is_listening(&self) -> bool {
        self.listener_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Device nodes of the joypad: its `event*` node followed by the legacy `js*` node, if any.
    ///
    /// The nodes are created by udev and may not exist right after the device was created.
    pub fn device_nodes(&self) -> Result<Vec<PathBuf>> {
        let sys_path = Path::new(SYS_VIRTUAL_INPUT_PATH).join(self.sysname()?);

        let mut nodes = Vec::new();
        for entry in fs::read_dir(&sys_path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if entry.file_type()?.is_dir() && (name.starts_with("event") || name.starts_with("js")) {
                nodes.push(Path::new(DEV_INPUT_PATH).join(&*name));
            }
        }
        nodes.sort();
        Ok(nodes)
    }

    /// The `/dev/input/event*` node of the joypad
    pub fn event_node(&self) -> Result<Option<PathBuf>> {
        Ok(self.device_nodes()?.into_iter().find(|node| {
            node.file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with("event"))
        }))
    }

    fn sysname(&self) -> Result<String> {
        let mut buffer = [0u8; 64];
        unsafe { ui_get_sysname(self.uinput_file.as_raw_fd(), &mut buffer) }.map_err(|e| {
            Error::Ioctl {
                request: "UI_GET_SYSNAME",
                source: e.into(),
            }
        })?;

        let len = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
        Ok(String::from_utf8_lossy(&buffer[..len]).into_owned())
    }

    fn write_event(&mut self, type_: u16, code: u16, value: i32) -> Result<()> {
        let event = input_event::new(type_, code, value);
        let bytes = unsafe {
            std::slice::from_raw_parts(
                &event as *const _ as *const u8,
                std::mem::size_of::<input_event>(),
            )
        };
        self.uinput_file.write_all(bytes)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.write_event(EV_SYN, SYN_REPORT, 0)?;
        self.uinput_file.flush()?;
        Ok(())
    }
}

fn create_device(uinput_file: &File, device: &DeviceConfig) -> Result<()> {
    let fd = uinput_file.as_raw_fd();

    let name = device.name.as_bytes();
    // leave room for the terminating NUL
    if name.len() >= UINPUT_MAX_NAME_SIZE {
        return Err(Error::NameTooLong {
            max: UINPUT_MAX_NAME_SIZE - 1,
        });
    }

    let ioctl_error = |request: &'static str| {
        move |e: nix::Error| Error::Ioctl {
            request,
            source: e.into(),
        }
    };

    unsafe {
        // Enable event types
        for ev in [EV_KEY, EV_ABS, EV_SYN, EV_FF] {
            ui_set_evbit(fd, ev.into()).map_err(ioctl_error("UI_SET_EVBIT"))?;
        }

        for btn in [
            BTN_SOUTH, BTN_EAST, BTN_NORTH, BTN_WEST, BTN_TL, BTN_TR, BTN_SELECT, BTN_START,
            BTN_MODE, BTN_THUMBL, BTN_THUMBR,
        ] {
            ui_set_keybit(fd, btn.into()).map_err(ioctl_error("UI_SET_KEYBIT"))?;
        }

        for axis in [ABS_X, ABS_Y, ABS_RX, ABS_RY, ABS_Z, ABS_RZ, ABS_HAT0X, ABS_HAT0Y] {
            ui_set_absbit(fd, axis.into()).map_err(ioctl_error("UI_SET_ABSBIT"))?;
        }

        // Every effect type the listener can render, plus the waveforms periodic effects need
        for ff in [
            FF_RUMBLE,
            FF_CONSTANT,
            FF_PERIODIC,
            FF_SQUARE,
            FF_TRIANGLE,
            FF_SINE,
            FF_RAMP,
            FF_GAIN,
        ] {
            ui_set_ffbit(fd, ff.into()).map_err(ioctl_error("UI_SET_FFBIT"))?;
        }
    }

    let mut dev: uinput_user_dev = unsafe { std::mem::zeroed() };
    dev.name[..name.len()].copy_from_slice(name);
    dev.id = input_id {
        bustype: BUS_USB,
        vendor: device.vendor,
        product: device.product,
        version: device.version,
    };
    dev.ff_effects_max = device.ff_effects_max;

    for axis in [ABS_X, ABS_Y, ABS_RX, ABS_RY] {
        dev.absmin[axis as usize] = AXIS_MIN;
        dev.absmax[axis as usize] = AXIS_MAX;
    }
    for axis in [ABS_Z, ABS_RZ] {
        dev.absmin[axis as usize] = TRIGGER_MIN;
        dev.absmax[axis as usize] = TRIGGER_MAX;
    }
    for axis in [ABS_HAT0X, ABS_HAT0Y] {
        dev.absmin[axis as usize] = -1;
        dev.absmax[axis as usize] = 1;
    }

    let dev_bytes = unsafe {
        std::slice::from_raw_parts(
            &dev as *const _ as *const u8,
            std::mem::size_of::<uinput_user_dev>(),
        )
    };
    (&*uinput_file).write_all(dev_bytes)?;

    unsafe { ui_dev_create(fd) }.map_err(ioctl_error("UI_DEV_CREATE"))?;
    Ok(())
}

impl Drop for VirtualJoypad {
    fn drop(&mut self) {
        self.stop_listening.store(true, Ordering::SeqCst);

        // Wait for the thread to finish
        if let Some(handle) = self.listener_handle.take() {
            if let Err(e) = handle.join() {
                log::error!("FF listener thread panicked: {:?}", e);
            }
        }

        if let Err(e) = unsafe { ui_dev_destroy(self.uinput_file.as_raw_fd()) } {
            log::warn!("UI_DEV_DESTROY failed: {}", e);
        }
    }
}

impl std::fmt::Debug for VirtualJoypad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualJoypad")
            .field("fd", &self.uinput_file.as_raw_fd())
            .field("listening", &self.is_listening())
            .finish()
    }
}
