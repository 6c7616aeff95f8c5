//! A CV-controllable VCA, channel-wise over whatever polyphony its signal
//! input carries.

use crate::module::{BypassRoute, EngineHandle, Module, ProcessContext};
use crate::port::{PortBuffer, MAX_CHANNELS};

const SIGNAL_IN: usize = 0;
const CV_IN: usize = 1;
const OUT: usize = 0;

pub struct Gain {
    routes: [BypassRoute; 1],
}

impl Gain {
    pub fn new() -> Self {
        Self {
            routes: [BypassRoute {
                input: SIGNAL_IN,
                output: OUT,
            }],
        }
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Gain {
    fn module_type(&self) -> &'static str {
        "gain"
    }

    fn num_inputs(&self) -> usize {
        2 // signal, CV
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn num_params(&self) -> usize {
        1 // base gain, linear
    }

    fn process(&mut self, ctx: &mut ProcessContext) {
        let gain = ctx.params[0];
        let channels = ctx.inputs[SIGNAL_IN].channels().max(1).min(MAX_CHANNELS);
        let cv_channels = ctx.inputs[CV_IN].channels().max(1);

        let mut out = PortBuffer::default();
        out.set_channels(channels);
        for ch in 0..channels {
            let signal = ctx.inputs[SIGNAL_IN].get(ch);
            // An unpatched CV input reads as 0V like any other unpatched
            // port, so an unpatched VCA is silent — matching Eurorack
            // convention for a module with no normalled CV reference.
            let cv = ctx.inputs[CV_IN].get(ch.min(cv_channels - 1)) / 10.0;
            out.set(ch, signal * gain * cv);
        }
        ctx.outputs[OUT] = out;
    }

    fn bypass_routes(&self) -> &[BypassRoute] {
        &self.routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_signal_by_gain() {
        let mut gain = Gain::new();
        let mut signal = PortBuffer::silent();
        signal.set(0, 2.0);
        let mut cv = PortBuffer::silent();
        cv.set(0, 10.0); // fully patched open (+10V)
        let inputs = [signal, cv];
        let mut outputs = [PortBuffer::silent()];
        let params = [0.5f32];
        let mut ctx = ProcessContext {
            inputs: &inputs,
            outputs: &mut outputs,
            params: &params,
            sample_rate: 44_100.0,
            frame: 0,
            engine: EngineHandle::noop(),
        };
        gain.process(&mut ctx);
        assert_eq!(outputs[0].get(0), 1.0);
    }
}
