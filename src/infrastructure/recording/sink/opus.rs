//! Opus-in-Ogg file sink

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ogg::writing::{PacketWriteEndInfo, PacketWriter};

use super::{pcm16_samples, SinkError, SinkSummary, SinkWriter};
use crate::domain::recording::{CodecTuning, EncoderProfile};

/// Sample rates libopus accepts
const OPUS_RATES: &[u32] = &[8_000, 12_000, 16_000, 24_000, 48_000];

/// Largest packet libopus produces
const MAX_PACKET: usize = 4000;

/// Whether libopus can create an encoder at all
pub fn opus_available() -> bool {
    opus::Encoder::new(48_000, opus::Channels::Stereo, opus::Application::Audio).is_ok()
}

/// Encodes 20 ms frames as they fill and streams them into an Ogg file
pub struct OpusSink {
    path: PathBuf,
    writer: PacketWriter<'static, BufWriter<File>>,
    encoder: opus::Encoder,
    serial: u32,
    channels: usize,
    frame_len: usize,
    pending: Vec<i16>,
    granule_pos: u64,
    /// Granule positions are counted at 48 kHz regardless of input rate
    granule_step: u64,
    data_len: u64,
}

impl OpusSink {
    pub fn create(path: &Path, profile: &EncoderProfile) -> Result<Self, SinkError> {
        let create_error = |message: String| SinkError::Create {
            path: path.display().to_string(),
            message,
        };

        if !OPUS_RATES.contains(&profile.sample_rate) {
            return Err(create_error(format!(
                "Opus cannot encode at {} Hz",
                profile.sample_rate
            )));
        }
        let channels = match profile.num_channels {
            1 => opus::Channels::Mono,
            _ => opus::Channels::Stereo,
        };
        let mut encoder =
            opus::Encoder::new(profile.sample_rate, channels, opus::Application::Audio)
                .map_err(|e| create_error(e.to_string()))?;

        if let CodecTuning::Opus { bitrate_kbps } = profile.tuning {
            encoder
                .set_bitrate(opus::Bitrate::Bits(bitrate_kbps as i32 * 1000))
                .map_err(|e| create_error(e.to_string()))?;
        }
        encoder
            .set_vbr(true)
            .map_err(|e| create_error(e.to_string()))?;

        let file = File::create(path).map_err(|e| create_error(e.to_string()))?;

        let frame_samples = (profile.sample_rate / 50) as usize;
        let mut sink = Self {
            path: path.to_path_buf(),
            writer: PacketWriter::new(BufWriter::new(file)),
            encoder,
            serial: stream_serial(),
            channels: usize::from(profile.num_channels),
            frame_len: frame_samples * usize::from(profile.num_channels),
            pending: Vec::new(),
            granule_pos: 0,
            granule_step: (48_000 / profile.sample_rate as u64) * frame_samples as u64,
            data_len: 0,
        };
        sink.write_headers(profile)?;
        Ok(sink)
    }

    fn write_headers(&mut self, profile: &EncoderProfile) -> Result<(), SinkError> {
        let mut id_header = Vec::with_capacity(19);
        id_header.extend_from_slice(b"OpusHead");
        id_header.push(1);
        id_header.push(self.channels as u8);
        id_header.extend_from_slice(&0u16.to_le_bytes());
        id_header.extend_from_slice(&profile.sample_rate.to_le_bytes());
        id_header.extend_from_slice(&0i16.to_le_bytes());
        id_header.push(0);

        self.writer
            .write_packet(id_header, self.serial, PacketWriteEndInfo::EndPage, 0)
            .map_err(|e| SinkError::Write(e.to_string()))?;

        let vendor = env!("CARGO_PKG_NAME").as_bytes();
        let mut comment_header = Vec::new();
        comment_header.extend_from_slice(b"OpusTags");
        comment_header.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        comment_header.extend_from_slice(vendor);
        comment_header.extend_from_slice(&0u32.to_le_bytes());

        self.writer
            .write_packet(comment_header, self.serial, PacketWriteEndInfo::EndPage, 0)
            .map_err(|e| SinkError::Write(e.to_string()))
    }

    fn encode_frame(&mut self, frame: &[i16], end: PacketWriteEndInfo) -> Result<(), SinkError> {
        let mut packet = vec![0u8; MAX_PACKET];
        let len = self
            .encoder
            .encode(frame, &mut packet)
            .map_err(|e| SinkError::Encode(e.to_string()))?;
        packet.truncate(len);

        self.granule_pos += self.granule_step;
        self.writer
            .write_packet(packet, self.serial, end, self.granule_pos)
            .map_err(|e| SinkError::Write(e.to_string()))
    }
}

impl SinkWriter for OpusSink {
    fn write_sample(&mut self, _timestamp: Duration, data: &[u8]) -> Result<(), SinkError> {
        self.pending.extend(pcm16_samples(data));
        self.data_len += data.len() as u64;

        // Keep the last full frame back so finalize can mark end of stream
        while self.pending.len() > self.frame_len {
            let frame: Vec<i16> = self.pending.drain(..self.frame_len).collect();
            self.encode_frame(&frame, PacketWriteEndInfo::NormalPacket)?;
        }
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<SinkSummary, SinkError> {
        if !self.pending.is_empty() {
            let mut frame = std::mem::take(&mut self.pending);
            frame.resize(self.frame_len, 0);
            self.encode_frame(&frame, PacketWriteEndInfo::EndStream)?;
        }

        let Self {
            path,
            writer,
            data_len,
            ..
        } = *self;
        let mut file = writer.into_inner();
        file.flush().map_err(|e| SinkError::Write(e.to_string()))?;

        Ok(SinkSummary { path, data_len })
    }
}

/// Pseudo-random serial number for the Ogg stream
fn stream_serial() -> u32 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now.as_secs() as u32) ^ now.subsec_nanos()
}
