//! Software video encoder: run-length coded RGBA.
//!
//! Key frames carry the frame itself; the frames in between carry the XOR
//! against the previous frame, which is mostly zero runs for screen content.
//! A key frame is forced every `key_frame_interval_secs` of presentation time.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use screen_record_core::models::error::CaptureError;
use screen_record_core::models::media::{Codec, EncodedSample, MediaFormat, TrackType, VideoFrame};
use screen_record_core::traits::encoder::{Encoder, EncoderInput, EncoderOutput, InputSurfaceSink, VideoEncoder};

use crate::output_queue::OutputQueue;

const CODEC_TAG: &[u8; 4] = b"RLE1";

/// Encode `pixels` as `[run: u16 LE][pixel: u32 LE]` records.
pub fn rle_encode(pixels: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut iter = pixels.iter().peekable();
    while let Some(&pixel) = iter.next() {
        let mut run: u16 = 1;
        while run < u16::MAX && iter.peek() == Some(&&pixel) {
            iter.next();
            run += 1;
        }
        out.extend_from_slice(&run.to_le_bytes());
        out.extend_from_slice(&pixel.to_le_bytes());
    }
    out
}

pub fn rle_decode(data: &[u8]) -> Result<Vec<u32>, CaptureError> {
    if data.len() % 6 != 0 {
        return Err(CaptureError::EncodingFailed(format!("truncated run record ({} bytes)", data.len())));
    }
    let mut pixels = Vec::new();
    for record in data.chunks_exact(6) {
        let run = u16::from_le_bytes([record[0], record[1]]) as usize;
        let pixel = u32::from_le_bytes([record[2], record[3], record[4], record[5]]);
        pixels.extend(std::iter::repeat(pixel).take(run));
    }
    Ok(pixels)
}

/// Rebuilds frames from a sequence of encoded samples.
#[derive(Debug, Default)]
pub struct RleDecoder {
    previous: Option<Vec<u32>>,
}

impl RleDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, sample: &EncodedSample) -> Result<Vec<u32>, CaptureError> {
        let mut pixels = rle_decode(&sample.payload)?;
        if !sample.is_key_frame {
            let previous = self
                .previous
                .as_ref()
                .ok_or_else(|| CaptureError::EncodingFailed("delta frame without key frame".into()))?;
            if previous.len() != pixels.len() {
                return Err(CaptureError::EncodingFailed("frame size changed mid-stream".into()));
            }
            for (pixel, prev) in pixels.iter_mut().zip(previous) {
                *pixel ^= prev;
            }
        }
        self.previous = Some(pixels.clone());
        Ok(pixels)
    }
}

/// Counters of one encoder instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoEncoderStats {
    /// Frames accepted on the input surface.
    pub frames_received: u64,
    pub frames_encoded: u64,
    pub key_frames: u64,
    /// Frames presented while the encoder was not accepting input.
    pub frames_dropped: u64,
    pub bytes_out: u64,
}

enum Input {
    Frame(VideoFrame, i64),
    End,
}

#[derive(Debug, Default)]
struct EncodeState {
    width: u32,
    height: u32,
    key_interval_us: i64,
    accepting: bool,
    previous: Option<Arc<[u32]>>,
    last_key_us: Option<i64>,
    stats: VideoEncoderStats,
}

#[derive(Default)]
struct Shared {
    state: Mutex<EncodeState>,
    input: Mutex<Option<Sender<Input>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    output: OutputQueue,
}

impl Shared {
    /// Input surface side: accept the frame and hand it to the worker.
    fn accept(&self, frame: VideoFrame, presentation_time_ns: i64) {
        let mut state = self.state.lock();
        if !state.accepting {
            state.stats.frames_dropped += 1;
            return;
        }
        if frame.width != state.width || frame.height != state.height {
            log::warn!(
                "dropping {}x{} frame on {}x{} encoder",
                frame.width,
                frame.height,
                state.width,
                state.height
            );
            state.stats.frames_dropped += 1;
            return;
        }
        let sent = self
            .input
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(Input::Frame(frame, presentation_time_ns)).is_ok());
        if sent {
            state.stats.frames_received += 1;
        } else {
            state.stats.frames_dropped += 1;
        }
    }

    fn encode(&self, frame: VideoFrame, presentation_time_ns: i64) {
        let sample = {
            let mut state = self.state.lock();
            let pts_us = presentation_time_ns / 1000;
            let key = match (state.last_key_us, &state.previous) {
                (Some(last), Some(_)) => pts_us - last >= state.key_interval_us,
                _ => true,
            };
            let payload = match (&state.previous, key) {
                (Some(previous), false) => {
                    let delta: Vec<u32> = frame.pixels.iter().zip(previous.iter()).map(|(a, b)| a ^ b).collect();
                    rle_encode(&delta)
                }
                _ => rle_encode(&frame.pixels),
            };
            state.stats.frames_encoded += 1;
            state.stats.bytes_out += payload.len() as u64;
            if key {
                state.stats.key_frames += 1;
                state.last_key_us = Some(pts_us);
            }
            state.previous = Some(frame.pixels);
            let sample = EncodedSample::new(TrackType::Video, pts_us, payload);
            if key {
                sample.key_frame()
            } else {
                sample
            }
        };
        self.output.push(sample);
    }

    fn run_worker(&self, input: Receiver<Input>) {
        for item in input {
            match item {
                Input::Frame(frame, pts) => self.encode(frame, pts),
                Input::End => {
                    self.output.end_input();
                    break;
                }
            }
        }
    }

    /// Close the input side and wait for queued frames to be encoded.
    fn close_input(&self, end_of_stream: bool) {
        self.state.lock().accepting = false;
        if let Some(tx) = self.input.lock().take() {
            if end_of_stream {
                let _ = tx.send(Input::End);
            }
        }
        if !end_of_stream {
            self.join_worker();
        }
    }

    fn join_worker(&self) {
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                log::error!("soft video encoder worker panicked");
            }
        }
    }
}

struct InputSink(Arc<Shared>);

impl InputSurfaceSink for InputSink {
    fn queue_frame(&self, frame: VideoFrame, presentation_time_ns: i64) {
        self.0.accept(frame, presentation_time_ns);
    }
}

/// Software [`VideoEncoder`]. Frames presented on the input surface are
/// encoded on a worker thread, like a hardware encoder working behind its
/// input queue. Clones share the same encoder, so a clone can be kept to
/// read [`SoftVideoEncoder::stats`].
#[derive(Clone, Default)]
pub struct SoftVideoEncoder {
    shared: Arc<Shared>,
    format: Option<MediaFormat>,
}

impl SoftVideoEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> VideoEncoderStats {
        self.shared.state.lock().stats
    }
}

impl Encoder for SoftVideoEncoder {
    fn configure(&mut self, format: &MediaFormat) -> Result<(), CaptureError> {
        let MediaFormat::Video {
            width,
            height,
            frame_rate,
            bitrate,
            key_frame_interval_secs,
            ..
        } = *format
        else {
            return Err(CaptureError::ConfigurationFailed("video encoder needs a video format".into()));
        };
        if width == 0 || height == 0 {
            return Err(CaptureError::ConfigurationFailed(format!("invalid frame size {}x{}", width, height)));
        }
        let mut codec_config = CODEC_TAG.to_vec();
        codec_config.extend_from_slice(&width.to_le_bytes());
        codec_config.extend_from_slice(&height.to_le_bytes());
        self.format = Some(MediaFormat::Video {
            codec: Codec::RleRgba,
            width,
            height,
            frame_rate,
            bitrate,
            key_frame_interval_secs,
            codec_config,
        });
        *self.shared.state.lock() = EncodeState {
            width,
            height,
            key_interval_us: i64::from(key_frame_interval_secs) * 1_000_000,
            ..Default::default()
        };
        log::debug!("soft video encoder configured for {}x{} @{}fps", width, height, frame_rate);
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        let format = self
            .format
            .clone()
            .ok_or_else(|| CaptureError::EncodingFailed("encoder not configured".into()))?;
        if self.shared.worker.lock().is_some() {
            return Err(CaptureError::EncodingFailed("encoder already started".into()));
        }
        self.shared.output.reset(format);

        let (tx, rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("soft-video-encoder".into())
            .spawn(move || shared.run_worker(rx))
            .map_err(|e| CaptureError::EncodingFailed(format!("failed to spawn encoder thread: {}", e)))?;
        *self.shared.worker.lock() = Some(handle);
        *self.shared.input.lock() = Some(tx);
        self.shared.state.lock().accepting = true;
        Ok(())
    }

    fn dequeue_output(&mut self, timeout: Duration) -> Result<EncoderOutput, CaptureError> {
        Ok(self.shared.output.dequeue(timeout))
    }

    fn stop(&mut self) {
        self.shared.close_input(false);
    }

    fn release(&mut self) {
        self.stop();
        self.shared.output.clear();
        self.shared.state.lock().previous = None;
    }
}

impl VideoEncoder for SoftVideoEncoder {
    fn create_input_surface(&mut self) -> Result<EncoderInput, CaptureError> {
        let Some(MediaFormat::Video { width, height, .. }) = self.format else {
            return Err(CaptureError::EncodingFailed("encoder not configured".into()));
        };
        Ok(EncoderInput {
            width,
            height,
            sink: Arc::new(InputSink(Arc::clone(&self.shared))),
        })
    }

    fn signal_end_of_input_stream(&mut self) -> Result<(), CaptureError> {
        self.shared.close_input(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screen_record_core::models::config::RecordingConfig;

    fn started_encoder(width: u32, height: u32) -> (SoftVideoEncoder, EncoderInput) {
        let config = RecordingConfig {
            width,
            height,
            key_frame_interval_secs: 1,
            ..Default::default()
        };
        let mut encoder = SoftVideoEncoder::new();
        encoder.configure(&config.video_format()).unwrap();
        let input = encoder.create_input_surface().unwrap();
        encoder.start().unwrap();
        (encoder, input)
    }

    fn next_sample(encoder: &mut SoftVideoEncoder) -> EncodedSample {
        match encoder.dequeue_output(Duration::from_secs(2)).unwrap() {
            EncoderOutput::Sample(sample) => sample,
            other => panic!("expected a sample, got {:?}", other),
        }
    }

    #[test]
    fn rle_round_trips_runs() {
        let pixels = [7, 7, 7, 1, 2, 2];
        let encoded = rle_encode(&pixels);
        assert_eq!(encoded.len(), 3 * 6);
        assert_eq!(rle_decode(&encoded).unwrap(), pixels.to_vec());
        assert!(rle_decode(&encoded[..5]).is_err());
    }

    #[test]
    fn reports_rle_format_before_samples() {
        let (mut encoder, input) = started_encoder(4, 2);
        input.sink.queue_frame(VideoFrame::solid(4, 2, 0xff, 0), 0);
        match encoder.dequeue_output(Duration::ZERO).unwrap() {
            EncoderOutput::FormatChanged(MediaFormat::Video { codec, codec_config, .. }) => {
                assert_eq!(codec, Codec::RleRgba);
                assert_eq!(&codec_config[..4], CODEC_TAG);
            }
            other => panic!("expected format, got {:?}", other),
        }
        let sample = next_sample(&mut encoder);
        assert!(sample.is_key_frame);
        assert_eq!(sample.payload.len(), 6);
        encoder.release();
    }

    #[test]
    fn delta_frames_decode_against_previous() {
        let (mut encoder, input) = started_encoder(4, 1);
        input.sink.queue_frame(VideoFrame::new(4, 1, vec![1, 2, 3, 4], 0), 0);
        input.sink.queue_frame(VideoFrame::new(4, 1, vec![1, 2, 9, 4], 40_000_000), 40_000_000);
        input.sink.queue_frame(VideoFrame::new(4, 1, vec![5, 5, 5, 5], 1_040_000_000), 1_040_000_000);
        encoder.dequeue_output(Duration::ZERO).unwrap();

        let mut decoder = RleDecoder::new();
        let key = next_sample(&mut encoder);
        let delta = next_sample(&mut encoder);
        let forced_key = next_sample(&mut encoder);
        assert!(key.is_key_frame);
        assert!(!delta.is_key_frame);
        assert!(forced_key.is_key_frame);
        assert_eq!(delta.presentation_time_us, 40_000);

        assert_eq!(decoder.decode(&key).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(decoder.decode(&delta).unwrap(), vec![1, 2, 9, 4]);
        assert_eq!(decoder.decode(&forced_key).unwrap(), vec![5, 5, 5, 5]);

        let stats = encoder.stats();
        assert_eq!(stats.frames_received, 3);
        assert_eq!(stats.frames_encoded, 3);
        assert_eq!(stats.key_frames, 2);
        encoder.release();
    }

    #[test]
    fn end_of_stream_after_signal() {
        let (mut encoder, input) = started_encoder(2, 2);
        encoder.dequeue_output(Duration::ZERO).unwrap();
        encoder.signal_end_of_input_stream().unwrap();
        input.sink.queue_frame(VideoFrame::solid(2, 2, 0, 0), 0);
        assert_eq!(encoder.dequeue_output(Duration::from_secs(2)).unwrap(), EncoderOutput::EndOfStream);
        assert_eq!(encoder.stats().frames_dropped, 1);
        encoder.release();
    }

    #[test]
    fn rejects_audio_format() {
        let mut encoder = SoftVideoEncoder::new();
        let err = encoder.configure(&RecordingConfig::default().audio_format()).unwrap_err();
        assert!(matches!(err, CaptureError::ConfigurationFailed(_)));
        assert!(encoder.create_input_surface().is_err());
    }
}
