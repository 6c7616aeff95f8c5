//! A fixed 4-input mixer, each input independently gained.

use crate::module::{Module, ProcessContext};
use crate::port::PortBuffer;

#[cfg(test)]
use crate::module::EngineHandle;

const NUM_INPUTS: usize = 4;

pub struct Mix;

impl Mix {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Mix {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Mix {
    fn module_type(&self) -> &'static str {
        "mix"
    }

    fn num_inputs(&self) -> usize {
        NUM_INPUTS
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn num_params(&self) -> usize {
        NUM_INPUTS
    }

    fn process(&mut self, ctx: &mut ProcessContext) {
        let channels = ctx
            .inputs
            .iter()
            .map(|i| i.channels())
            .max()
            .unwrap_or(1)
            .max(1);

        let mut out = PortBuffer::default();
        out.set_channels(channels);
        for ch in 0..channels {
            let sum: f32 = ctx
                .inputs
                .iter()
                .zip(ctx.params.iter())
                .map(|(input, gain)| input.get(ch) * gain)
                .sum();
            out.set(ch, sum);
        }
        ctx.outputs[0] = out;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_gained_inputs() {
        let mut mix = Mix::new();
        let mut inputs = [PortBuffer::silent(); NUM_INPUTS];
        inputs[0].set(0, 1.0);
        inputs[1].set(0, 2.0);
        let params = [1.0, 0.5, 0.0, 0.0];
        let mut outputs = [PortBuffer::silent()];
        let mut ctx = ProcessContext {
            inputs: &inputs,
            outputs: &mut outputs,
            params: &params,
            sample_rate: 44_100.0,
            frame: 0,
            engine: EngineHandle::noop(),
        };
        mix.process(&mut ctx);
        assert_eq!(outputs[0].get(0), 2.0); // 1*1.0 + 2*0.5
    }
}
