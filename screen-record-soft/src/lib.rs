//! # screen-record-soft
//!
//! Pure-software backend for screen-record-core.
//!
//! Provides:
//! - `SoftGpu`: CPU rasteriser implementing `GraphicsDevice`
//! - `ManualDisplay` / `TestPatternDisplay`: synthetic virtual displays
//! - `ToneInput`: sine tone audio input
//! - `SoftVideoEncoder`: run-length coded RGBA with periodic key frames
//! - `SoftAudioEncoder`: PCM16 passthrough
//! - `SoftBackend`: `MediaBackend` bundling the above
//!
//! ## Usage
//! ```no_run
//! use std::path::Path;
//! use screen_record_core::{RecordingConfig, RecordingController};
//! use screen_record_soft::{SoftBackend, TestPatternDisplay, ToneInput};
//!
//! let config = RecordingConfig::default();
//! let controller = RecordingController::new(SoftBackend::new(), config).unwrap();
//! controller
//!     .start(
//!         Box::new(TestPatternDisplay::new(25)),
//!         Some(Box::new(ToneInput::new(440.0, 44100, 1))),
//!         Path::new("capture.srmx"),
//!     )
//!     .unwrap();
//! controller.stop().unwrap();
//! ```

pub mod audio_encoder;
pub mod backend;
pub mod display;
mod output_queue;
pub mod soft_gpu;
pub mod tone;
pub mod video_encoder;

pub use audio_encoder::SoftAudioEncoder;
pub use backend::SoftBackend;
pub use display::{FrameInjector, ManualDisplay, TestPatternDisplay};
pub use soft_gpu::{ResourceCounts, SoftGpu};
pub use tone::ToneInput;
pub use video_encoder::{RleDecoder, SoftVideoEncoder};
