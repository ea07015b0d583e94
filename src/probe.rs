//! Client side of a virtual joypad: opens its event node the way a game would and plays effects.

use crate::virtual_controller::VirtualJoypad;
use evdev::{Device, FFEffect, FFEffectData, FFEffectKind, FFEnvelope, FFReplay, FFTrigger};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

pub struct FeedbackProbe {
    device: Device,
    path: PathBuf,
}

impl FeedbackProbe {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let device = Device::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open device {}: {}", path.display(), e))?;

        match device.supported_ff() {
            Some(supported_ff) if supported_ff.iter().next().is_some() => {
                let ff_types: Vec<_> = supported_ff.iter().collect();
                log::info!("Device supports {} FF effect types: {:?}", ff_types.len(), ff_types);
            }
            _ => {
                return Err(anyhow::anyhow!(
                    "Device {} does not support force feedback",
                    path.display()
                ))
            }
        }

        log::info!(
            "Connected to force feedback device: {} at {}",
            device.name().unwrap_or("Unknown"),
            path.display()
        );
        Ok(Self {
            device,
            path: path.to_path_buf(),
        })
    }

    /// Opens the event node of `joypad` once udev has created it
    pub fn wait_for(joypad: &VirtualJoypad, timeout: Duration) -> anyhow::Result<Self> {
        let deadline = Instant::now() + timeout;
        loop {
            let last_error = match joypad.event_node() {
                Ok(Some(node)) => match Self::open(&node) {
                    Ok(probe) => return Ok(probe),
                    Err(e) => e,
                },
                Ok(None) => anyhow::anyhow!("No event node appeared within {:?}", timeout),
                Err(e) => e.into(),
            };

            if Instant::now() >= deadline {
                return Err(last_error);
            }
            log::debug!("Event node not ready yet: {}", last_error);
            thread::sleep(Duration::from_millis(20));
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn upload_rumble(
        &mut self,
        strong_magnitude: u16,
        weak_magnitude: u16,
        length_ms: u16,
    ) -> anyhow::Result<FFEffect> {
        self.upload(
            FFReplay {
                length: length_ms,
                delay: 0,
            },
            FFEffectKind::Rumble {
                strong_magnitude,
                weak_magnitude,
            },
        )
    }

    pub fn upload_constant(
        &mut self,
        level: i16,
        envelope: FFEnvelope,
        length_ms: u16,
    ) -> anyhow::Result<FFEffect> {
        self.upload(
            FFReplay {
                length: length_ms,
                delay: 0,
            },
            FFEffectKind::Constant { level, envelope },
        )
    }

    fn upload(&mut self, replay: FFReplay, kind: FFEffectKind) -> anyhow::Result<FFEffect> {
        let effect_data = FFEffectData {
            direction: 0,
            trigger: FFTrigger::default(),
            replay,
            kind,
        };

        let effect = self
            .device
            .upload_ff_effect(effect_data)
            .map_err(|e| anyhow::anyhow!("Failed to upload effect: {}", e))?;
        log::info!("Uploaded effect with ID: {}", effect.id());
        Ok(effect)
    }
}

/// Uploads a rumble effect, plays it for `length_ms` and erases it again
pub fn play_rumble(
    probe: &mut FeedbackProbe,
    strong_magnitude: u16,
    weak_magnitude: u16,
    length_ms: u16,
) -> anyhow::Result<()> {
    let mut effect = probe.upload_rumble(strong_magnitude, weak_magnitude, length_ms)?;
    effect
        .play(1)
        .map_err(|e| anyhow::anyhow!("Failed to play effect: {}", e))?;

    thread::sleep(Duration::from_millis(length_ms.into()));

    effect
        .stop()
        .map_err(|e| anyhow::anyhow!("Failed to stop effect: {}", e))?;
    // Effect is erased when dropped
    Ok(())
}
