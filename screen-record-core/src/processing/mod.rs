pub mod clock;
pub mod pcm;
pub mod ring_buffer;
pub mod signal;
