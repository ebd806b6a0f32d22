//! Headerless PCM16 file sink

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{pcm16_le, SinkError, SinkSummary, SinkWriter, Timeline};
use crate::domain::recording::EncoderProfile;

/// Writes little-endian interleaved samples with no container
pub struct RawPcmSink {
    path: PathBuf,
    file: BufWriter<File>,
    timeline: Timeline,
}

impl RawPcmSink {
    pub fn create(path: &Path, profile: &EncoderProfile) -> Result<Self, SinkError> {
        let file = File::create(path).map_err(|e| SinkError::Create {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file: BufWriter::new(file),
            timeline: Timeline::new(profile),
        })
    }
}

impl SinkWriter for RawPcmSink {
    fn write_sample(&mut self, timestamp: Duration, data: &[u8]) -> Result<(), SinkError> {
        self.file
            .write_all(&pcm16_le(data))
            .map_err(|e| SinkError::Write(e.to_string()))?;
        self.timeline.advance(timestamp, data.len());
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<SinkSummary, SinkError> {
        self.file
            .flush()
            .map_err(|e| SinkError::Write(e.to_string()))?;
        Ok(SinkSummary {
            path: self.path,
            data_len: self.timeline.written(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recording::AudioEncoder;

    #[test]
    fn writes_little_endian_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pcm");
        let profile = EncoderProfile::for_format(AudioEncoder::Pcm16Bits, 0, 16_000, 1);

        let mut sink = Box::new(RawPcmSink::create(&path, &profile).unwrap());
        let data: Vec<u8> = [256i16, -1].iter().flat_map(|s| s.to_ne_bytes()).collect();
        sink.write_sample(Duration::ZERO, &data).unwrap();
        let summary = sink.finalize().unwrap();

        assert_eq!(summary.data_len, 4);
        assert_eq!(std::fs::read(&path).unwrap(), vec![0x00, 0x01, 0xff, 0xff]);
    }
}
