//! A 1V/octave sine VCO, demonstrating [`Module`] against the engine's
//! push/block scheduling model.
//!
//! Not part of the engine's product surface — a fixture used by tests and
//! the CLI's demo patches.

use crate::module::{Module, ProcessContext};
use crate::port::PortBuffer;

#[cfg(test)]
use crate::module::EngineHandle;

pub struct Sine {
    phase: f32,
}

impl Sine {
    pub fn new() -> Self {
        Self { phase: 0.0 }
    }
}

impl Default for Sine {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Sine {
    fn module_type(&self) -> &'static str {
        "sine"
    }

    fn num_inputs(&self) -> usize {
        1 // 1V/octave pitch CV
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn num_params(&self) -> usize {
        1 // base frequency, Hz
    }

    fn process(&mut self, ctx: &mut ProcessContext) {
        // Monophonic: a fuller polyphonic implementation would track one
        // phase accumulator per channel, but this fixture only needs to
        // demonstrate 1V/octave tracking and cable wiring.
        let base_hz = ctx.params[0];
        let volts = ctx.inputs[0].get(0);
        let freq = base_hz * 2f32.powf(volts);

        let sample = (self.phase * std::f32::consts::TAU).sin();
        let mut out = PortBuffer::default();
        out.set(0, sample * 5.0); // +/-5V Eurorack audio convention

        self.phase += freq / ctx.sample_rate;
        self.phase -= self.phase.floor();

        ctx.outputs[0] = out;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settles_into_periodic_output() {
        let mut sine = Sine::new();
        let params = [440.0f32];
        let inputs = [PortBuffer::silent()];
        let mut outputs = [PortBuffer::silent()];
        let sample_rate = 44_100.0;

        let mut samples = Vec::new();
        for frame in 0..200 {
            let mut ctx = ProcessContext {
                inputs: &inputs,
                outputs: &mut outputs,
                params: &params,
                sample_rate,
                frame,
                engine: EngineHandle::noop(),
            };
            sine.process(&mut ctx);
            samples.push(outputs[0].get(0));
        }
        assert!(samples.iter().any(|s| *s > 4.0));
        assert!(samples.iter().any(|s| *s < -4.0));
    }
}
