//! RIFF/WAVE file sink backed by hound

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};

use super::{pcm16_samples, SinkError, SinkSummary, SinkWriter, Timeline};
use crate::domain::recording::EncoderProfile;

/// Writes PCM16 into a WAVE container
pub struct WavSink {
    path: PathBuf,
    writer: WavWriter<BufWriter<File>>,
    timeline: Timeline,
}

impl WavSink {
    pub fn create(path: &Path, profile: &EncoderProfile) -> Result<Self, SinkError> {
        let spec = WavSpec {
            channels: profile.num_channels,
            sample_rate: profile.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(path, spec).map_err(|e| SinkError::Create {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            timeline: Timeline::new(profile),
        })
    }
}

impl SinkWriter for WavSink {
    fn write_sample(&mut self, timestamp: Duration, data: &[u8]) -> Result<(), SinkError> {
        for sample in pcm16_samples(data) {
            self.writer
                .write_sample(sample)
                .map_err(|e| SinkError::Write(e.to_string()))?;
        }
        self.timeline.advance(timestamp, data.len());
        Ok(())
    }

    /// Flush and let hound fill in the RIFF and data chunk sizes
    fn finalize(self: Box<Self>) -> Result<SinkSummary, SinkError> {
        let Self {
            path,
            writer,
            timeline,
        } = *self;
        writer
            .finalize()
            .map_err(|e| SinkError::Write(format!("WAV finalize: {}", e)))?;
        Ok(SinkSummary {
            path,
            data_len: timeline.written(),
        })
    }
}
