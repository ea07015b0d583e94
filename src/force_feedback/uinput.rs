use std::io;
use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::effect::{EffectDefinition, EffectId, EffectKind, Envelope};
use super::event::RawEvent;
use super::listener::{EventSource, FeedbackListener};
use super::RumbleCallback;
use crate::config::FeedbackConfig;
use crate::virtual_controller::uinput_ffi::*;

/// [`EventSource`] reading from a uinput device descriptor.
///
/// The source owns its own duplicate of the descriptor and switches it to non-blocking mode.
#[derive(Debug)]
pub struct UinputEventSource {
    fd: OwnedFd,
}

impl UinputEventSource {
    pub fn new(fd: OwnedFd) -> io::Result<Self> {
        set_nonblocking(&fd)?;
        Ok(Self { fd })
    }
}

fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    let raw_fd = fd.as_raw_fd();

    // Make sure reads can't block when draining the event queue
    unsafe {
        let flags = libc::fcntl(raw_fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(raw_fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

impl EventSource for UinputEventSource {
    fn read_events(&mut self, events: &mut Vec<RawEvent>) -> io::Result<()> {
        let mut buffer = [0u8; mem::size_of::<input_event>()];

        loop {
            let result = unsafe {
                libc::read(
                    self.fd.as_raw_fd(),
                    buffer.as_mut_ptr() as *mut libc::c_void,
                    buffer.len(),
                )
            };

            if result < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::WouldBlock => return Ok(()), // No more events
                    io::ErrorKind::Interrupted => continue,
                    _ => return Err(err),
                }
            }

            if result as usize != buffer.len() {
                return Ok(()); // Incomplete read
            }

            let event = unsafe { std::ptr::read_unaligned(buffer.as_ptr() as *const input_event) };
            events.push(RawEvent::new(event.type_, event.code, event.value));
        }
    }

    fn begin_upload(&mut self, request_id: u32) -> io::Result<Option<EffectDefinition>> {
        let mut upload: uinput_ff_upload = unsafe { mem::zeroed() };
        upload.request_id = request_id;

        // kernel fills in the effect
        unsafe { ui_begin_ff_upload(self.fd.as_raw_fd(), &mut upload) }?;

        Ok(effect_from_raw(&upload.effect))
    }

    fn end_upload(&mut self, request_id: u32, retval: i32) -> io::Result<()> {
        let mut upload: uinput_ff_upload = unsafe { mem::zeroed() };
        upload.request_id = request_id;
        upload.retval = retval;

        unsafe { ui_end_ff_upload(self.fd.as_raw_fd(), &upload) }?;
        Ok(())
    }

    fn begin_erase(&mut self, request_id: u32) -> io::Result<EffectId> {
        let mut erase = uinput_ff_erase {
            request_id,
            retval: 0,
            effect_id: 0,
        };

        // kernel fills in effect_id
        unsafe { ui_begin_ff_erase(self.fd.as_raw_fd(), &mut erase) }?;

        Ok(erase.effect_id as EffectId)
    }

    fn end_erase(&mut self, request_id: u32, retval: i32) -> io::Result<()> {
        let erase = uinput_ff_erase {
            request_id,
            retval,
            effect_id: 0,
        };

        unsafe { ui_end_ff_erase(self.fd.as_raw_fd(), &erase) }?;
        Ok(())
    }
}

/// Converts a kernel effect, `None` for kinds that can't be played as rumble
fn effect_from_raw(effect: &ff_effect) -> Option<EffectDefinition> {
    // Safety: the union member read matches the effect type
    let kind = unsafe {
        match effect.type_ {
            FF_CONSTANT => EffectKind::Constant {
                level: effect.u.constant.level.unsigned_abs(),
                envelope: envelope_from_raw(&effect.u.constant.envelope),
            },
            FF_PERIODIC => EffectKind::Periodic {
                magnitude: effect.u.periodic.magnitude.unsigned_abs(),
                envelope: envelope_from_raw(&effect.u.periodic.envelope),
            },
            FF_RAMP => EffectKind::Ramp {
                start_level: effect.u.ramp.start_level.unsigned_abs(),
                end_level: effect.u.ramp.end_level.unsigned_abs(),
                envelope: envelope_from_raw(&effect.u.ramp.envelope),
            },
            FF_RUMBLE => EffectKind::Rumble {
                strong_magnitude: effect.u.rumble.strong_magnitude,
                weak_magnitude: effect.u.rumble.weak_magnitude,
            },
            other => {
                log::warn!(
                    "Uploaded FF effect {} has unsupported type {:#x}",
                    effect.id,
                    other
                );
                return None;
            }
        }
    };

    Some(EffectDefinition::new(effect.id, kind).with_replay(effect.replay.length, effect.replay.delay))
}

fn envelope_from_raw(envelope: &ff_envelope) -> Envelope {
    Envelope {
        attack_length: envelope.attack_length,
        attack_level: envelope.attack_level,
        fade_length: envelope.fade_length,
        fade_level: envelope.fade_level,
    }
}

/// Starts the feedback listener of a uinput device on its own thread.
///
/// The thread waits for the configured grace period before reading, a freshly created device
/// can't be read from right away. If the descriptor can't be configured the thread logs the
/// error and exits; the device keeps working without force feedback.
pub fn spawn_listener(
    fd: BorrowedFd<'_>,
    config: FeedbackConfig,
    on_rumble: Option<RumbleCallback>,
    stop: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    // Duplicate the file descriptor so the thread has its own reference
    let thread_fd = fd.try_clone_to_owned()?;

    thread::Builder::new()
        .name("ff-listener".to_string())
        .spawn(move || {
            thread::sleep(config.startup_grace());

            let source = match UinputEventSource::new(thread_fd) {
                Ok(source) => source,
                Err(e) => {
                    log::error!(
                        "Unable to configure uinput device, force feedback will be disabled: {}",
                        e
                    );
                    return;
                }
            };

            FeedbackListener::new(source, config, on_rumble).run(&stop);
        })
}
