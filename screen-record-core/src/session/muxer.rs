use std::collections::VecDeque;

use crate::models::error::CaptureError;
use crate::models::media::{EncodedSample, MediaFormat, Track};
use crate::models::recording_result::TrackSummary;
use crate::traits::container::{ContainerWriter, MuxSummary};

#[derive(Debug)]
struct TrackSlot {
    track: Track,
    writer_id: usize,
    pending: VecDeque<EncodedSample>,
    first_pts_us: Option<i64>,
    last_pts_us: Option<i64>,
    first_written_us: Option<i64>,
    last_written_us: Option<i64>,
    written: u64,
    ended: bool,
}

/// Interleaves the encoded samples of all tracks into one container.
///
/// Samples are buffered per track until every expected track has been
/// registered and the muxer started, however many arrive meanwhile; the
/// `max_buffered_samples` cap only applies once writing. Presentation times are normalized by
/// subtracting the earliest first timestamp seen across tracks, and samples
/// are written in normalized-time order. The container is finalized once,
/// when the last track ends or [`Multiplexer::finalize`] is called.
pub struct Multiplexer {
    writer: Box<dyn ContainerWriter>,
    expected_tracks: usize,
    tracks: Vec<TrackSlot>,
    started: bool,
    base_pts_us: Option<i64>,
    max_buffered_samples: usize,
    paused: bool,
    summary: Option<MuxSummary>,
}

impl Multiplexer {
    pub fn new(writer: Box<dyn ContainerWriter>, expected_tracks: usize, max_buffered_samples: usize) -> Self {
        Self {
            writer,
            expected_tracks,
            tracks: Vec::new(),
            started: false,
            base_pts_us: None,
            max_buffered_samples: max_buffered_samples.max(1),
            paused: false,
            summary: None,
        }
    }

    /// Declare a track. Must happen before `start`.
    pub fn register_track(&mut self, format: MediaFormat) -> Result<usize, CaptureError> {
        if self.summary.is_some() {
            return Err(CaptureError::AlreadyFinalized);
        }
        if self.started {
            return Err(CaptureError::ConfigurationFailed("track registered after start".into()));
        }
        if self.tracks.len() >= self.expected_tracks {
            return Err(CaptureError::ConfigurationFailed(format!(
                "all {} expected tracks already registered",
                self.expected_tracks
            )));
        }
        let writer_id = self.writer.add_track(&format)?;
        let id = self.tracks.len();
        log::info!("registered {} track {} ({:?})", format.track_type(), id, format.codec());
        self.tracks.push(TrackSlot {
            track: Track { id, format },
            writer_id,
            pending: VecDeque::new(),
            first_pts_us: None,
            last_pts_us: None,
            first_written_us: None,
            last_written_us: None,
            written: 0,
            ended: false,
        });
        Ok(id)
    }

    /// Start writing. Fails with `NotAllTracksReady` until every expected
    /// track is registered; starting twice is a no-op.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.summary.is_some() {
            return Err(CaptureError::AlreadyFinalized);
        }
        if self.started {
            return Ok(());
        }
        if self.tracks.len() < self.expected_tracks || self.expected_tracks == 0 {
            return Err(CaptureError::NotAllTracksReady {
                registered: self.tracks.len(),
                expected: self.expected_tracks,
            });
        }
        self.writer.start()?;
        self.started = true;
        log::info!("muxer started with {} tracks", self.tracks.len());
        self.interleave(false)
    }

    /// A track that will never register (its task failed before its encoder
    /// reported a format). Lets the remaining tracks start.
    pub fn abandon_track(&mut self) -> Result<Option<MuxSummary>, CaptureError> {
        if self.summary.is_some() || self.started {
            return Ok(None);
        }
        self.expected_tracks = self.expected_tracks.saturating_sub(1);
        log::warn!("track abandoned, expecting {} tracks", self.expected_tracks);
        if self.expected_tracks > 0 && self.tracks.len() == self.expected_tracks {
            self.start()?;
        }
        self.finalize_if_complete()
    }

    /// Queue one sample of `track`. An end-of-stream sample ends the track.
    pub fn write_sample(&mut self, track: usize, sample: EncodedSample) -> Result<(), CaptureError> {
        if self.summary.is_some() {
            return Err(CaptureError::AlreadyFinalized);
        }
        if sample.is_end_of_stream {
            return self.track_finished(track).map(|_| ());
        }
        let slot = self.tracks.get_mut(track).ok_or(CaptureError::UnknownTrack(track))?;
        if slot.ended {
            return Err(CaptureError::EncodingFailed(format!("sample after end of track {}", track)));
        }
        let pts = sample.presentation_time_us;
        if let Some(last) = slot.last_pts_us {
            if pts < last {
                return Err(CaptureError::NonMonotonicTimestamp {
                    track,
                    pts_us: pts,
                    last_us: last,
                });
            }
        }
        slot.last_pts_us = Some(pts);
        slot.first_pts_us.get_or_insert(pts);
        slot.pending.push_back(sample);
        // Nothing is dropped before start; the cap only applies once writing.
        self.interleave(false)
    }

    /// Mark `track` as complete. Finalizes the container when it was the
    /// last open track, returning the summary.
    pub fn track_finished(&mut self, track: usize) -> Result<Option<MuxSummary>, CaptureError> {
        if self.summary.is_some() {
            return Ok(None);
        }
        let slot = self.tracks.get_mut(track).ok_or(CaptureError::UnknownTrack(track))?;
        if !slot.ended {
            slot.ended = true;
            log::info!("{} track {} ended after {} samples", slot.track.format.track_type(), track, slot.written);
        }
        self.interleave(false)?;
        self.finalize_if_complete()
    }

    fn finalize_if_complete(&mut self) -> Result<Option<MuxSummary>, CaptureError> {
        let complete = self.started
            && self.tracks.len() == self.expected_tracks
            && self.tracks.iter().all(|slot| slot.ended);
        if complete {
            self.finalize().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Flush everything pending and close the container. Returns the same
    /// summary on every call after the first.
    pub fn finalize(&mut self) -> Result<MuxSummary, CaptureError> {
        if let Some(summary) = &self.summary {
            return Ok(summary.clone());
        }
        if !self.started {
            if self.tracks.len() < self.expected_tracks {
                log::warn!(
                    "finalizing with {} of {} tracks registered",
                    self.tracks.len(),
                    self.expected_tracks
                );
            }
            self.writer.start()?;
            self.started = true;
        }
        self.interleave(true)?;
        let summary = self.writer.finish()?;
        self.summary = Some(summary.clone());
        Ok(summary)
    }

    /// Write every sample that can be ordered safely.
    ///
    /// A sample is safe once every other open track has something pending
    /// (its next sample cannot be earlier). `flush` writes regardless, and a
    /// track holding more than `max_buffered_samples` forces its oldest out.
    fn interleave(&mut self, flush: bool) -> Result<(), CaptureError> {
        if !self.started {
            return Ok(());
        }
        if self.base_pts_us.is_none() {
            let all_known = self.tracks.iter().all(|slot| slot.first_pts_us.is_some() || slot.ended);
            let overflowing = self.tracks.iter().any(|slot| slot.pending.len() > self.max_buffered_samples);
            if all_known || flush || overflowing {
                self.base_pts_us = self.tracks.iter().filter_map(|slot| slot.first_pts_us).min();
            }
            if let Some(base) = self.base_pts_us {
                log::debug!("timestamp base {} us", base);
            } else {
                return Ok(());
            }
        }

        loop {
            let blocked = self.tracks.iter().any(|slot| slot.pending.is_empty() && !slot.ended);
            let next = self
                .tracks
                .iter()
                .enumerate()
                .filter_map(|(i, slot)| slot.pending.front().map(|s| (i, s.presentation_time_us)))
                .min_by_key(|&(i, pts)| (pts, i));
            let Some((index, _)) = next else {
                return Ok(());
            };
            let index = if !blocked || flush {
                index
            } else if let Some(over) = self
                .tracks
                .iter()
                .position(|slot| slot.pending.len() > self.max_buffered_samples)
            {
                log::warn!(
                    "track {} exceeded {} pending samples, writing ahead of stalled tracks",
                    over,
                    self.max_buffered_samples
                );
                over
            } else {
                return Ok(());
            };
            self.write_front(index)?;
        }
    }

    fn write_front(&mut self, index: usize) -> Result<(), CaptureError> {
        let base = self.base_pts_us.unwrap_or(0);
        let slot = &mut self.tracks[index];
        let Some(mut sample) = slot.pending.pop_front() else {
            return Ok(());
        };
        let mut normalized = sample.presentation_time_us - base;
        if normalized < 0 {
            log::warn!("track {} sample {} us precedes timestamp base", index, normalized);
            normalized = 0;
        }
        if let Some(last) = slot.last_written_us {
            normalized = normalized.max(last);
        }
        sample.presentation_time_us = normalized;
        slot.first_written_us.get_or_insert(normalized);
        slot.last_written_us = Some(normalized);
        slot.written += 1;
        log::trace!("mux track {} pts {} us", index, normalized);
        self.writer.write_sample(slot.writer_id, &sample)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_finalized(&self) -> bool {
        self.summary.is_some()
    }

    /// Status flag for the controller; capture keeps running while paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn expected_tracks(&self) -> usize {
        self.expected_tracks
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.tracks.iter().map(|slot| slot.track.clone()).collect()
    }

    /// Earliest first timestamp across tracks, once fixed.
    pub fn base_pts_us(&self) -> Option<i64> {
        self.base_pts_us
    }

    pub fn pending_samples(&self, track: usize) -> usize {
        self.tracks.get(track).map_or(0, |slot| slot.pending.len())
    }

    /// Per-track summary with normalized first/last timestamps.
    pub fn track_summaries(&self) -> Vec<TrackSummary> {
        self.tracks
            .iter()
            .map(|slot| TrackSummary {
                track_type: slot.track.format.track_type(),
                codec: slot.track.format.codec(),
                samples: slot.written,
                first_pts_us: slot.first_written_us,
                last_pts_us: slot.last_written_us,
            })
            .collect()
    }
}
