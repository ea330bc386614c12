pub mod audio_task;
pub mod controller;
pub mod muxer;
pub mod recording;
pub mod task;
pub mod video_task;
