//! Build outputs.
//!
//! - [`image`] - serializing the block device to the output file

pub mod image;

pub use image::{persist_image, write_image, ImageSummary};
