//! FLAC file sink
//!
//! Frames are encoded with flacenc as soon as a block fills and appended to
//! the file. STREAMINFO is rewritten in place at finalize once the sample
//! count, frame sizes and MD5 are known.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use flacenc::bitsink::ByteSink;
use flacenc::component::{BitRepr, Stream, StreamInfo};
use flacenc::config;
use flacenc::error::{Verified, Verify, VerifyError};
use flacenc::source::{Context, Fill, FrameBuf};

use super::{pcm16_samples, SinkError, SinkSummary, SinkWriter};
use crate::domain::recording::{CodecTuning, EncoderProfile, FLAC_COMPRESSION_LEVEL};

/// Block size used for compression levels 3 and above
pub const FLAC_BLOCK_SIZE: usize = 4096;

const FAST_BLOCK_SIZE: usize = 1152;

const BITS_PER_SAMPLE: usize = 16;

/// Verified encoder settings for a compression level
pub(crate) fn encoder_config(
    compression_level: u8,
) -> Result<Verified<config::Encoder>, VerifyError> {
    let mut encoder = config::Encoder::default();
    encoder.block_size = if compression_level < 3 {
        FAST_BLOCK_SIZE
    } else {
        FLAC_BLOCK_SIZE
    };
    encoder.into_verified().map_err(|(_, e)| e)
}

/// Whether flacenc accepts the settings for `compression_level`
pub fn flac_encoder_available(compression_level: u8) -> bool {
    encoder_config(compression_level).is_ok()
}

/// "fLaC" marker plus the STREAMINFO block
fn stream_header(info: &StreamInfo) -> Result<Vec<u8>, SinkError> {
    let mut sink = ByteSink::new();
    Stream::with_stream_info(info.clone())
        .write(&mut sink)
        .map_err(|e| SinkError::Encode(e.to_string()))?;
    Ok(sink.into_inner())
}

/// Encodes PCM16 into FLAC frames one block at a time
pub struct FlacSink {
    path: PathBuf,
    file: BufWriter<File>,
    config: Verified<config::Encoder>,
    stream_info: StreamInfo,
    framebuf: FrameBuf,
    context: Context,
    /// Interleaved samples of the block being filled
    pending: Vec<i32>,
    block_len: usize,
    frames_written: usize,
    data_len: u64,
}

impl FlacSink {
    pub fn create(path: &Path, profile: &EncoderProfile) -> Result<Self, SinkError> {
        let create_error = |message: String| SinkError::Create {
            path: path.display().to_string(),
            message,
        };

        let compression_level = match profile.tuning {
            CodecTuning::Flac { compression_level } => compression_level,
            _ => FLAC_COMPRESSION_LEVEL,
        };
        let config = encoder_config(compression_level)
            .map_err(|e| create_error(format!("FLAC config: {:?}", e)))?;

        let channels = usize::from(profile.num_channels);
        let block_size = config.block_size;
        let stream_info = StreamInfo::new(profile.sample_rate as usize, channels, BITS_PER_SAMPLE)
            .map_err(|e| create_error(format!("FLAC stream: {:?}", e)))?;
        let framebuf = FrameBuf::with_size(channels, block_size)
            .map_err(|e| create_error(format!("FLAC block: {:?}", e)))?;

        let file = File::create(path).map_err(|e| create_error(e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: BufWriter::new(file),
            config,
            stream_info,
            framebuf,
            context: Context::new(BITS_PER_SAMPLE, channels, block_size),
            pending: Vec::with_capacity(block_size * channels),
            block_len: block_size * channels,
            frames_written: 0,
            data_len: 0,
        })
    }

    /// Encode `pending` as the next frame and append it to the file
    fn flush_block(&mut self) -> Result<(), SinkError> {
        if self.frames_written == 0 {
            // Placeholder, rewritten at finalize
            let header = stream_header(&self.stream_info)?;
            self.write_all(&header)?;
        }

        self.framebuf
            .fill_interleaved(&self.pending)
            .map_err(|e| SinkError::Encode(format!("{:?}", e)))?;
        self.context
            .fill_interleaved(&self.pending)
            .map_err(|e| SinkError::Encode(format!("{:?}", e)))?;
        self.pending.clear();

        let frame = flacenc::encode_fixed_size_frame(
            &self.config,
            &self.framebuf,
            self.frames_written,
            &self.stream_info,
        )
        .map_err(|e| SinkError::Encode(format!("{:?}", e)))?;
        self.stream_info.update_frame_info(&frame);

        let mut sink = ByteSink::new();
        frame
            .write(&mut sink)
            .map_err(|e| SinkError::Encode(e.to_string()))?;
        self.write_all(sink.as_slice())?;
        self.frames_written += 1;
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.file
            .write_all(bytes)
            .map_err(|e| SinkError::Write(e.to_string()))
    }
}

impl SinkWriter for FlacSink {
    fn write_sample(&mut self, _timestamp: Duration, data: &[u8]) -> Result<(), SinkError> {
        for sample in pcm16_samples(data) {
            self.pending.push(i32::from(sample));
            if self.pending.len() == self.block_len {
                self.flush_block()?;
            }
        }
        self.data_len += data.len() as u64;
        Ok(())
    }

    /// Encode the trailing partial block and patch STREAMINFO.
    /// A session without samples leaves an empty file.
    fn finalize(mut self: Box<Self>) -> Result<SinkSummary, SinkError> {
        // Drop a trailing half frame
        let channels = self.framebuf.channels();
        let whole = self.pending.len() - self.pending.len() % channels;
        self.pending.truncate(whole);
        if !self.pending.is_empty() {
            self.flush_block()?;
        }

        if self.frames_written > 0 {
            self.stream_info
                .set_total_samples(self.context.total_samples());
            self.stream_info
                .set_md5_digest(&self.context.md5_digest());
            let header = stream_header(&self.stream_info)?;

            self.file
                .seek(SeekFrom::Start(0))
                .map_err(|e| SinkError::Write(e.to_string()))?;
            self.write_all(&header)?;
        }
        self.file
            .flush()
            .map_err(|e| SinkError::Write(e.to_string()))?;

        Ok(SinkSummary {
            path: self.path,
            data_len: self.data_len,
        })
    }
}
