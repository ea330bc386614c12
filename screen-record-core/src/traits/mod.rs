pub mod audio_input;
pub mod backend;
pub mod container;
pub mod display;
pub mod encoder;
pub mod graphics;
pub mod recorder_delegate;
