// src/audio_io.rs

use crate::audio_device::{find_input_device, find_output_device, get_host};
use crate::error::{LooperError, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, Device, FromSample, Sample, SampleFormat, SampleRate, Stream, StreamConfig};
use ringbuf::HeapConsumer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Receives each captured chunk, already mono and exactly one chunk wide.
pub type CaptureSink = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// The hardware side of the engine: one input and one output stream.
///
/// The output stream drains mixed samples from the ring buffer filled by the
/// playback thread; the input stream hands captured chunks to `sink`.
pub trait AudioBackend {
    fn start_output(&mut self, source: HeapConsumer<f32>) -> Result<()>;
    fn start_input(&mut self, sink: CaptureSink) -> Result<()>;
    fn stop_input(&mut self);
    fn stop_output(&mut self);
}

#[derive(Debug, Clone, Default)]
pub struct CpalConfig {
    pub host_name: Option<String>,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub sample_rate: u32,
    pub chunk_size: usize,
}

pub struct CpalBackend {
    config: CpalConfig,
    xrun_count: Arc<AtomicUsize>,
    input_stream: Option<Stream>,
    output_stream: Option<Stream>,
}

impl CpalBackend {
    pub fn new(config: CpalConfig, xrun_count: Arc<AtomicUsize>) -> Self {
        Self {
            config,
            xrun_count,
            input_stream: None,
            output_stream: None,
        }
    }

    fn stream_config(&self, default: StreamConfig) -> StreamConfig {
        StreamConfig {
            channels: default.channels,
            sample_rate: SampleRate(self.config.sample_rate),
            buffer_size: BufferSize::Fixed(self.config.chunk_size as u32),
        }
    }
}

impl AudioBackend for CpalBackend {
    fn start_output(&mut self, source: HeapConsumer<f32>) -> Result<()> {
        let host = get_host(self.config.host_name.as_deref())?;
        let device = find_output_device(&host, self.config.output_device.as_deref())?;
        info!("Using output device: {}", device.name().unwrap_or_default());

        let default_config = device
            .default_output_config()
            .map_err(|e| LooperError::device("No output config", e))?;
        let config = self.stream_config(default_config.config());
        let xruns = self.xrun_count.clone();

        let stream = match default_config.sample_format() {
            SampleFormat::F32 => build_output_stream::<f32>(&device, &config, source, xruns)?,
            SampleFormat::I16 => build_output_stream::<i16>(&device, &config, source, xruns)?,
            SampleFormat::U16 => build_output_stream::<u16>(&device, &config, source, xruns)?,
            format => {
                return Err(LooperError::Device(format!(
                    "Unsupported sample format {}",
                    format
                )))
            }
        };
        stream
            .play()
            .map_err(|e| LooperError::device("Failed to start output stream", e))?;
        info!(
            "Output stream running at {} Hz, {} samples per chunk",
            config.sample_rate.0, self.config.chunk_size
        );
        self.output_stream = Some(stream);
        Ok(())
    }

    fn start_input(&mut self, sink: CaptureSink) -> Result<()> {
        let host = get_host(self.config.host_name.as_deref())?;
        let device = find_input_device(&host, self.config.input_device.as_deref())?;
        info!("Using input device: {}", device.name().unwrap_or_default());

        let default_config = device
            .default_input_config()
            .map_err(|e| LooperError::device("No input config", e))?;
        let config = self.stream_config(default_config.config());
        let chunker = InputChunker::new(self.config.chunk_size, sink);
        let xruns = self.xrun_count.clone();

        let stream = match default_config.sample_format() {
            SampleFormat::F32 => build_input_stream::<f32>(&device, &config, chunker, xruns)?,
            SampleFormat::I16 => build_input_stream::<i16>(&device, &config, chunker, xruns)?,
            SampleFormat::U16 => build_input_stream::<u16>(&device, &config, chunker, xruns)?,
            format => {
                return Err(LooperError::Device(format!(
                    "Unsupported sample format {}",
                    format
                )))
            }
        };
        stream
            .play()
            .map_err(|e| LooperError::device("Failed to start input stream", e))?;
        self.input_stream = Some(stream);
        Ok(())
    }

    fn stop_input(&mut self) {
        if let Some(stream) = self.input_stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Error pausing input stream: {}", e);
            }
            info!("Input stream closed");
        }
    }

    fn stop_output(&mut self) {
        if let Some(stream) = self.output_stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Error pausing output stream: {}", e);
            }
            info!("Output stream closed");
        }
    }
}

/// Collects single samples into fixed-width chunks for the capture sink.
pub(crate) struct InputChunker {
    pending: Vec<f32>,
    chunk_size: usize,
    sink: CaptureSink,
}

impl InputChunker {
    pub(crate) fn new(chunk_size: usize, sink: CaptureSink) -> Self {
        Self {
            pending: Vec::with_capacity(chunk_size),
            chunk_size: chunk_size.max(1),
            sink,
        }
    }

    #[inline]
    pub(crate) fn push(&mut self, sample: f32) {
        self.pending.push(sample);
        if self.pending.len() == self.chunk_size {
            (self.sink)(&self.pending);
            self.pending.clear();
        }
    }
}

fn build_input_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut chunker: InputChunker,
    xrun_count: Arc<AtomicUsize>,
) -> Result<Stream>
where
    T: Sample + cpal::SizedSample,
    f32: FromSample<T>,
{
    let err_fn = move |err: cpal::StreamError| {
        warn!("an error occurred on input stream: {}", err);
        xrun_count.fetch_add(1, Ordering::Relaxed);
    };
    let channels = config.channels as usize;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                for frame in data.chunks(channels) {
                    let mono_sample =
                        frame.iter().map(|s| f32::from_sample(*s)).sum::<f32>() / (channels as f32);
                    chunker.push(mono_sample);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| LooperError::device("Failed to build input stream", e))
}

fn build_output_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut source: HeapConsumer<f32>,
    xrun_count: Arc<AtomicUsize>,
) -> Result<Stream>
where
    T: Sample + cpal::SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let err_fn = move |err: cpal::StreamError| {
        warn!("an error occurred on output stream: {}", err);
        xrun_count.fetch_add(1, Ordering::Relaxed);
    };
    let mut mono_buffer: Vec<f32> = vec![];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let num_frames = data.len() / channels;
                mono_buffer.resize(num_frames, 0.0);
                let samples_read = source.pop_slice(&mut mono_buffer);
                mono_buffer[samples_read..].iter_mut().for_each(|s| *s = 0.0);

                for (frame, &sample_value) in data.chunks_mut(channels).zip(&mono_buffer) {
                    for sample in frame.iter_mut() {
                        *sample = T::from_sample(sample_value);
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| LooperError::device("Failed to build output stream", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn chunker_emits_exact_chunks() {
        let seen = Arc::new(Mutex::new(Vec::<Vec<f32>>::new()));
        let sink_seen = seen.clone();
        let mut chunker = InputChunker::new(
            4,
            Box::new(move |chunk: &[f32]| sink_seen.lock().push(chunk.to_vec())),
        );
        for i in 0..10 {
            chunker.push(i as f32);
        }
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], vec![4.0, 5.0, 6.0, 7.0]);
    }
}
