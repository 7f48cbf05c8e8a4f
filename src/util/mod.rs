pub mod archive;
pub mod checksum;
pub mod download;
pub mod substitute;
