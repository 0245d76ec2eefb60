// FILE: src\audio_engine\helpers.rs
// =================================

use crate::error::{LooperError, Result};
use chrono::Local;
use std::path::{Path, PathBuf};

/// Encodes a finished session recording to a file.
pub trait SessionWriter {
    fn write_session(&self, samples: &[f32], sample_rate: u32, path: &Path) -> Result<()>;
}

/// Writes mono 16-bit PCM WAV files.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavSessionWriter;

impl SessionWriter for WavSessionWriter {
    fn write_session(&self, samples: &[f32], sample_rate: u32, path: &Path) -> Result<()> {
        if samples.is_empty() {
            return Err(LooperError::EmptyRecording);
        }
        write_wav_file(path, samples, sample_rate)
    }
}

pub fn write_wav_file(path: &Path, audio_buffer: &[f32], sample_rate: u32) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    let amplitude = i16::MAX as f32;
    for &sample in audio_buffer {
        writer.write_sample((sample.clamp(-1.0, 1.0) * amplitude) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// `session_<YYYYmmdd_HHMMSS>.wav` inside `dir`.
pub fn timestamped_session_path(dir: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("session_{}.wav", stamp))
}
