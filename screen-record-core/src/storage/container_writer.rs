use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;
use crate::models::media::{Codec, EncodedSample, MediaFormat};
use crate::traits::container::{ContainerWriter, MuxSummary};

pub const MAGIC: &[u8; 4] = b"SRMX";
pub const VERSION: u16 = 1;

const RECORD_SAMPLE: u8 = 0x01;
const RECORD_TRAILER: u8 = 0xFF;

const KIND_VIDEO: u8 = 0;
const KIND_AUDIO: u8 = 1;

const FLAG_KEY_FRAME: u8 = 0x01;
const FLAG_END_OF_STREAM: u8 = 0x02;

/// Streaming writer for the interleaved recording container.
///
/// ## File Format
///
/// All integers little-endian.
/// ```text
/// "SRMX" | u16 version | u16 track count
/// [track entry...]
///   video: u8 0 | u8 codec | u32 width | u32 height | u32 fps | u32 bitrate
///          | u32 key frame interval | u32 config len | config
///   audio: u8 1 | u8 codec | u32 sample rate | u16 channels | u32 bitrate
///          | u32 config len | config
/// [sample record...]
///   u8 0x01 | u8 track | u8 flags | i64 pts (us) | u32 len | payload
/// trailer
///   u8 0xFF | u64 samples per track... | "SRMX"
/// ```
/// The header is written by `start`; the file does not exist before that.
pub struct InterleavedFileWriter {
    file_path: PathBuf,
    tracks: Vec<MediaFormat>,
    samples_per_track: Vec<u64>,
    file: Option<BufWriter<File>>,
    total_bytes_written: u64,
    finished: bool,
}

impl InterleavedFileWriter {
    /// Prepare a writer for `file_path`, creating its parent directory.
    pub fn create(file_path: PathBuf) -> Result<Self, CaptureError> {
        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::StorageError(format!("failed to create directory: {}", e)))?;
        }
        Ok(Self {
            file_path,
            tracks: Vec::new(),
            samples_per_track: Vec::new(),
            file: None,
            total_bytes_written: 0,
            finished: false,
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Total bytes written so far, header included.
    pub fn bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::StorageError("file is not open".into()))?;
        file.write_all(data)
            .map_err(|e| CaptureError::StorageError(format!("write failed: {}", e)))?;
        self.total_bytes_written += data.len() as u64;
        Ok(())
    }
}

fn encode_track(format: &MediaFormat, out: &mut Vec<u8>) {
    match format {
        MediaFormat::Video {
            codec,
            width,
            height,
            frame_rate,
            bitrate,
            key_frame_interval_secs,
            codec_config,
        } => {
            out.push(KIND_VIDEO);
            out.push(codec.wire_id());
            for value in [*width, *height, *frame_rate, *bitrate, *key_frame_interval_secs] {
                out.extend_from_slice(&value.to_le_bytes());
            }
            out.extend_from_slice(&(codec_config.len() as u32).to_le_bytes());
            out.extend_from_slice(codec_config);
        }
        MediaFormat::Audio {
            codec,
            sample_rate,
            channels,
            bitrate,
            codec_config,
        } => {
            out.push(KIND_AUDIO);
            out.push(codec.wire_id());
            out.extend_from_slice(&sample_rate.to_le_bytes());
            out.extend_from_slice(&channels.to_le_bytes());
            out.extend_from_slice(&bitrate.to_le_bytes());
            out.extend_from_slice(&(codec_config.len() as u32).to_le_bytes());
            out.extend_from_slice(codec_config);
        }
    }
}

impl ContainerWriter for InterleavedFileWriter {
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize, CaptureError> {
        if self.file.is_some() || self.finished {
            return Err(CaptureError::StorageError("tracks must be added before start".into()));
        }
        if self.tracks.len() >= u8::MAX as usize {
            return Err(CaptureError::StorageError("too many tracks".into()));
        }
        self.tracks.push(format.clone());
        self.samples_per_track.push(0);
        Ok(self.tracks.len() - 1)
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        if self.finished {
            return Err(CaptureError::AlreadyFinalized);
        }
        if self.file.is_some() {
            return Ok(());
        }
        let file = File::create(&self.file_path)
            .map_err(|e| CaptureError::StorageError(format!("failed to create file: {}", e)))?;
        self.file = Some(BufWriter::new(file));

        let mut header = Vec::with_capacity(64);
        header.extend_from_slice(MAGIC);
        header.extend_from_slice(&VERSION.to_le_bytes());
        header.extend_from_slice(&(self.tracks.len() as u16).to_le_bytes());
        for format in &self.tracks {
            encode_track(format, &mut header);
        }
        self.write_raw(&header)?;
        log::debug!("opened container {} with {} tracks", self.file_path.display(), self.tracks.len());
        Ok(())
    }

    fn write_sample(&mut self, track: usize, sample: &EncodedSample) -> Result<(), CaptureError> {
        if self.finished {
            return Err(CaptureError::AlreadyFinalized);
        }
        if track >= self.tracks.len() {
            return Err(CaptureError::UnknownTrack(track));
        }
        let mut flags = 0u8;
        if sample.is_key_frame {
            flags |= FLAG_KEY_FRAME;
        }
        if sample.is_end_of_stream {
            flags |= FLAG_END_OF_STREAM;
        }
        let mut record = Vec::with_capacity(15);
        record.push(RECORD_SAMPLE);
        record.push(track as u8);
        record.push(flags);
        record.extend_from_slice(&sample.presentation_time_us.to_le_bytes());
        record.extend_from_slice(&(sample.payload.len() as u32).to_le_bytes());
        self.write_raw(&record)?;
        self.write_raw(&sample.payload)?;
        self.samples_per_track[track] += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<MuxSummary, CaptureError> {
        if self.finished {
            return Err(CaptureError::AlreadyFinalized);
        }
        if self.file.is_none() {
            self.start()?;
        }

        let mut trailer = vec![RECORD_TRAILER];
        for count in &self.samples_per_track {
            trailer.extend_from_slice(&count.to_le_bytes());
        }
        trailer.extend_from_slice(MAGIC);
        self.write_raw(&trailer)?;

        if let Some(mut file) = self.file.take() {
            file.flush().map_err(|e| CaptureError::StorageError(e.to_string()))?;
        }
        self.finished = true;

        let checksum = sha256_file(&self.file_path)?;
        log::info!(
            "finalized {} ({} bytes, samples per track {:?})",
            self.file_path.display(),
            self.total_bytes_written,
            self.samples_per_track
        );
        Ok(MuxSummary {
            path: self.file_path.clone(),
            bytes_written: self.total_bytes_written,
            samples_per_track: self.samples_per_track.clone(),
            checksum,
        })
    }
}

/// Compute SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let data =
        fs::read(path).map_err(|e| CaptureError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Decoded contents of a finished container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerContents {
    pub tracks: Vec<MediaFormat>,
    /// Samples in file order with their track index.
    pub samples: Vec<(usize, EncodedSample)>,
    /// Counts recorded in the trailer.
    pub samples_per_track: Vec<u64>,
}

impl ContainerContents {
    pub fn track_samples(&self, track: usize) -> impl Iterator<Item = &EncodedSample> {
        self.samples.iter().filter(move |(t, _)| *t == track).map(|(_, s)| s)
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CaptureError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| CaptureError::StorageError(format!("truncated container at byte {}", self.pos)))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, CaptureError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CaptureError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, CaptureError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, CaptureError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn i64(&mut self) -> Result<i64, CaptureError> {
        Ok(self.u64()? as i64)
    }

    fn bytes(&mut self) -> Result<Vec<u8>, CaptureError> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn codec(&mut self) -> Result<Codec, CaptureError> {
        let id = self.u8()?;
        Codec::from_wire_id(id).ok_or_else(|| CaptureError::StorageError(format!("unknown codec id {}", id)))
    }

    fn track(&mut self) -> Result<MediaFormat, CaptureError> {
        match self.u8()? {
            KIND_VIDEO => Ok(MediaFormat::Video {
                codec: self.codec()?,
                width: self.u32()?,
                height: self.u32()?,
                frame_rate: self.u32()?,
                bitrate: self.u32()?,
                key_frame_interval_secs: self.u32()?,
                codec_config: self.bytes()?,
            }),
            KIND_AUDIO => Ok(MediaFormat::Audio {
                codec: self.codec()?,
                sample_rate: self.u32()?,
                channels: self.u16()?,
                bitrate: self.u32()?,
                codec_config: self.bytes()?,
            }),
            kind => Err(CaptureError::StorageError(format!("unknown track kind {}", kind))),
        }
    }
}

/// Parse a container written by [`InterleavedFileWriter`].
pub fn read_container(path: &Path) -> Result<ContainerContents, CaptureError> {
    let data = fs::read(path).map_err(|e| CaptureError::StorageError(format!("failed to read container: {}", e)))?;
    let mut reader = Reader { data: &data, pos: 0 };

    if reader.take(4)? != MAGIC {
        return Err(CaptureError::StorageError("not a recording container".into()));
    }
    let version = reader.u16()?;
    if version != VERSION {
        return Err(CaptureError::StorageError(format!("unsupported container version {}", version)));
    }
    let track_count = reader.u16()? as usize;
    let tracks = (0..track_count).map(|_| reader.track()).collect::<Result<Vec<_>, _>>()?;

    let mut samples = Vec::new();
    loop {
        match reader.u8()? {
            RECORD_SAMPLE => {
                let track = reader.u8()? as usize;
                let format = tracks.get(track).ok_or(CaptureError::UnknownTrack(track))?;
                let flags = reader.u8()?;
                let presentation_time_us = reader.i64()?;
                let payload = reader.bytes()?;
                samples.push((
                    track,
                    EncodedSample {
                        track_type: format.track_type(),
                        presentation_time_us,
                        payload,
                        is_key_frame: flags & FLAG_KEY_FRAME != 0,
                        is_end_of_stream: flags & FLAG_END_OF_STREAM != 0,
                    },
                ));
            }
            RECORD_TRAILER => break,
            tag => return Err(CaptureError::StorageError(format!("unknown record tag 0x{:02x}", tag))),
        }
    }

    let samples_per_track = (0..track_count).map(|_| reader.u64()).collect::<Result<Vec<_>, _>>()?;
    if reader.take(4)? != MAGIC {
        return Err(CaptureError::StorageError("missing trailer magic".into()));
    }

    Ok(ContainerContents {
        tracks,
        samples,
        samples_per_track,
    })
}
