//! Polyphonic port buffers.
//!
//! A port carries up to [`MAX_CHANNELS`] independent voltages ("polyphonic
//! channels" in Eurorack terms). Ports that aren't driven by a cable read as
//! a single channel at 0V.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// Maximum polyphonic channel count carried by a single port.
pub const MAX_CHANNELS: usize = 16;

/// Plain snapshot of a port's voltages, passed to [`crate::module::Module::process`].
///
/// This is the value type modules see. It has no notion of what, if
/// anything, is connected to it — that's engine-internal bookkeeping done in
/// [`PortRegister`].
#[derive(Debug, Clone, Copy)]
pub struct PortBuffer {
    data: [f32; MAX_CHANNELS],
    channels: u8,
}

impl PortBuffer {
    pub const fn silent() -> Self {
        Self {
            data: [0.0; MAX_CHANNELS],
            channels: 1,
        }
    }

    pub fn new(data: [f32; MAX_CHANNELS], channels: u8) -> Self {
        Self {
            data,
            channels: channels.clamp(1, MAX_CHANNELS as u8),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels as usize
    }

    pub fn set_channels(&mut self, channels: usize) {
        self.channels = (channels.max(1).min(MAX_CHANNELS)) as u8;
    }

    /// Reads channel `ch`, returning 0V for channels beyond what's connected.
    pub fn get(&self, ch: usize) -> f32 {
        if ch < self.channels() {
            self.data[ch]
        } else {
            0.0
        }
    }

    pub fn set(&mut self, ch: usize, value: f32) {
        if ch < MAX_CHANNELS {
            self.data[ch] = value;
            if ch >= self.channels() {
                self.channels = (ch + 1) as u8;
            }
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data[..self.channels()]
    }
}

impl Default for PortBuffer {
    fn default() -> Self {
        Self::silent()
    }
}

/// Lock-free publication point for a single output port's voltages.
///
/// Writers (the owning module's worker, once per frame) store with
/// `Relaxed` ordering; readers (any module wired downstream, possibly mid
/// frame on another worker) load with `Relaxed` ordering. A reader either
/// sees this frame's freshly published value or the previous frame's, never
/// a torn or uninitialized one, the same guarantee a live-pointer cable
/// model would have. Which of the two a reader gets is not left to chance,
/// though: `graph::worker` gates every cable read on the producer's
/// `ModuleSlot::frames_done` counter, so a same-block forward cable
/// (producer earlier in insertion order) deterministically sees the current
/// frame, and a cable closing a feedback cycle deterministically sees the
/// previous one.
#[derive(Debug)]
pub struct PortRegister {
    data: [AtomicU32; MAX_CHANNELS],
    channels: AtomicU8,
}

impl PortRegister {
    pub fn new() -> Self {
        Self {
            data: std::array::from_fn(|_| AtomicU32::new(0.0f32.to_bits())),
            channels: AtomicU8::new(1),
        }
    }

    pub fn publish(&self, buf: &PortBuffer) {
        let n = buf.channels();
        for (i, slot) in self.data.iter().enumerate().take(n) {
            slot.store(buf.get(i).to_bits(), Ordering::Relaxed);
        }
        self.channels.store(n as u8, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PortBuffer {
        let channels = self.channels.load(Ordering::Relaxed).max(1);
        let mut data = [0.0f32; MAX_CHANNELS];
        for (i, slot) in self.data.iter().enumerate().take(channels as usize) {
            data[i] = f32::from_bits(slot.load(Ordering::Relaxed));
        }
        PortBuffer::new(data, channels)
    }
}

impl Default for PortRegister {
    fn default() -> Self {
        Self::new()
    }
}
