//! A free-running gate clock: high for half its period, low for the other
//! half, retriggerable via `Reset`.

use crate::module::{Module, ModuleEvent, ProcessContext};
use crate::port::PortBuffer;

#[cfg(test)]
use crate::module::EngineHandle;

pub struct Clock {
    phase: f32,
}

impl Clock {
    pub fn new() -> Self {
        Self { phase: 0.0 }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Clock {
    fn module_type(&self) -> &'static str {
        "clock"
    }

    fn num_inputs(&self) -> usize {
        0
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn num_params(&self) -> usize {
        1 // rate, Hz
    }

    fn process(&mut self, ctx: &mut ProcessContext) {
        let rate_hz = ctx.params[0].max(0.0);
        let mut out = PortBuffer::default();
        let high = self.phase < 0.5;
        out.set(0, if high { 10.0 } else { 0.0 });

        self.phase += rate_hz / ctx.sample_rate;
        self.phase -= self.phase.floor();

        ctx.outputs[0] = out;
    }

    fn on_event(&mut self, event: ModuleEvent) {
        if event == ModuleEvent::Reset {
            self.phase = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_gate_across_the_period() {
        let mut clock = Clock::new();
        let params = [1.0f32]; // 1 Hz
        let sample_rate = 1_000.0;
        let inputs: [PortBuffer; 0] = [];
        let mut outputs = [PortBuffer::silent()];

        let mut high_seen = false;
        let mut low_seen = false;
        for frame in 0..1_000 {
            let mut ctx = ProcessContext {
                inputs: &inputs,
                outputs: &mut outputs,
                params: &params,
                sample_rate,
                frame,
                engine: EngineHandle::noop(),
            };
            clock.process(&mut ctx);
            if outputs[0].get(0) > 5.0 {
                high_seen = true;
            } else {
                low_seen = true;
            }
        }
        assert!(high_seen && low_seen);
    }

    #[test]
    fn reset_restarts_phase() {
        let mut clock = Clock::new();
        let params = [1.0f32];
        let inputs: [PortBuffer; 0] = [];
        let mut outputs = [PortBuffer::silent()];
        for frame in 0..600 {
            let mut ctx = ProcessContext {
                inputs: &inputs,
                outputs: &mut outputs,
                params: &params,
                sample_rate: 1_000.0,
                frame,
                engine: EngineHandle::noop(),
            };
            clock.process(&mut ctx);
        }
        assert_eq!(outputs[0].get(0), 0.0); // past the halfway point, gate is low
        clock.on_event(ModuleEvent::Reset);
        let mut ctx = ProcessContext {
            inputs: &inputs,
            outputs: &mut outputs,
            params: &params,
            sample_rate: 1_000.0,
            frame: 600,
            engine: EngineHandle::noop(),
        };
        clock.process(&mut ctx);
        assert_eq!(outputs[0].get(0), 10.0); // reset snapped phase back to 0 (high)
    }
}
