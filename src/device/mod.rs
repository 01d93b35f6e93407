pub mod cpal_backend;

pub use cpal_backend::CpalBackend;

use crate::errors::DeviceError;

/// Interleaved stereo render function handed to a backend. Invoked from
/// the device's realtime context.
pub type RenderFn = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// Observer for fatal device failures. Never invoked from inside the
/// audio path once the failure is reported.
pub type ErrorFn = Box<dyn Fn(DeviceError) + Send + Sync + 'static>;

/// Pull-model stereo float output contract. The device drives timing: it
/// repeatedly pulls interleaved stereo blocks from the render function.
/// The backend is a replaceable layer; anything satisfying this trait can
/// host the audio graph.
pub trait OutputBackend: Send {
    /// Output sample rate the render function will be pulled at.
    fn sample_rate(&self) -> u32;

    /// Begin pulling. The render function must already be realtime-safe.
    fn start(&mut self, render: RenderFn, on_error: ErrorFn) -> Result<(), DeviceError>;

    /// Stop pulling. Idempotent.
    fn stop(&mut self);
}

/// Test/bench backend that never pulls on its own; callers drive the
/// render function by hand.
pub struct ManualBackend {
    sample_rate: u32,
    render: Option<RenderFn>,
}

impl ManualBackend {
    pub fn new(sample_rate: u32) -> Self {
        ManualBackend {
            sample_rate,
            render: None,
        }
    }

    /// Pull one block, as the device callback would.
    pub fn pump(&mut self, output: &mut [f32]) {
        if let Some(render) = self.render.as_mut() {
            render(output);
        } else {
            output.fill(0.0);
        }
    }
}

impl OutputBackend for ManualBackend {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self, render: RenderFn, _on_error: ErrorFn) -> Result<(), DeviceError> {
        self.render = Some(render);
        Ok(())
    }

    fn stop(&mut self) {
        self.render = None;
    }
}
