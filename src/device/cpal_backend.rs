use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::{ErrorFn, OutputBackend, RenderFn};
use crate::errors::DeviceError;

/// Preferred fallback rates when the device cannot run at the requested
/// rate directly.
const FALLBACK_RATES: [u32; 2] = [48_000, 44_100];

/// cpal-backed implementation of the stereo-f32 pull contract, using the
/// host's default output device. The stream lives on a dedicated thread
/// because platform stream handles are not `Send`.
pub struct CpalBackend {
    device_name: String,
    config: StreamConfig,
    worker: Option<StreamWorker>,
}

struct StreamWorker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

fn pick_config(device: &cpal::Device, preferred_rate: u32) -> Result<StreamConfig, DeviceError> {
    let supported: Vec<_> = device.supported_output_configs()?.collect();

    let stereo_f32 = |rate: u32| {
        supported.iter().find(|range| {
            range.sample_format() == cpal::SampleFormat::F32
                && range.channels() == 2
                && range.min_sample_rate().0 <= rate
                && range.max_sample_rate().0 >= rate
        })
    };

    for rate in std::iter::once(preferred_rate).chain(FALLBACK_RATES) {
        if stereo_f32(rate).is_some() {
            return Ok(StreamConfig {
                channels: 2,
                sample_rate: SampleRate(rate),
                buffer_size: cpal::BufferSize::Default,
            });
        }
    }

    // Last resort: any stereo f32 range at its maximum rate.
    supported
        .iter()
        .filter(|range| {
            range.sample_format() == cpal::SampleFormat::F32 && range.channels() == 2
        })
        .max_by_key(|range| range.max_sample_rate().0)
        .map(|range| StreamConfig {
            channels: 2,
            sample_rate: range.max_sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        })
        .ok_or(DeviceError::NoUsableConfig)
}

impl CpalBackend {
    /// Open the default output device, preferring `preferred_rate` and
    /// falling back to 48 kHz / 44.1 kHz.
    pub fn default_device(preferred_rate: u32) -> Result<Self, DeviceError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(DeviceError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".into());
        let config = pick_config(&device, preferred_rate)?;
        log::info!(
            "Audio device: '{}' at {} Hz stereo f32",
            device_name,
            config.sample_rate.0
        );
        Ok(CpalBackend {
            device_name,
            config,
            worker: None,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl OutputBackend for CpalBackend {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn start(&mut self, mut render: RenderFn, on_error: ErrorFn) -> Result<(), DeviceError> {
        if self.worker.is_some() {
            return Ok(());
        }

        let config = self.config.clone();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), DeviceError>>(1);

        let handle = std::thread::Builder::new()
            .name("crossdeck-output".into())
            .spawn(move || {
                let host = cpal::default_host();
                let Some(device) = host.default_output_device() else {
                    let _ = ready_tx.send(Err(DeviceError::NoDevice));
                    return;
                };

                let error_cb = move |err: cpal::StreamError| {
                    log::error!("Output stream failed: {}", err);
                    on_error(DeviceError::Stream(err.to_string()));
                };
                let data_cb = move |output: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    render(output);
                };

                let stream = match device.build_output_stream(&config, data_cb, error_cb, None) {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(DeviceError::BuildStream(e)));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(DeviceError::PlayStream(e)));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive until the backend asks us to stop
                // or is dropped.
                let _ = stop_rx.recv();
                drop(stream);
                log::info!("Output stream stopped");
            })
            .map_err(|e| DeviceError::Stream(format!("failed to spawn stream thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(StreamWorker { stop_tx, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(DeviceError::Stream("stream thread died during start".into()))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.handle.join();
        }
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::super::{ManualBackend, OutputBackend};

    #[test]
    fn manual_backend_pumps_through_installed_render() {
        let mut backend = ManualBackend::new(48_000);
        assert_eq!(backend.sample_rate(), 48_000);
        backend
            .start(
                Box::new(|out: &mut [f32]| out.fill(0.25)),
                Box::new(|_| {}),
            )
            .unwrap();
        let mut block = vec![0.0f32; 64];
        backend.pump(&mut block);
        assert!(block.iter().all(|&s| s == 0.25));
        backend.stop();
        backend.pump(&mut block);
        assert!(block.iter().all(|&s| s == 0.0));
    }
}
