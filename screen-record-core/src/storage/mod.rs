pub mod container_writer;
pub mod metadata;
