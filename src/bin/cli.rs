use clap::Parser;
use std::path::PathBuf;

use flashfs_builder::ImageSettings;

#[derive(Parser, Debug)]
#[command(
    name = "flashfs-builder",
    about = "Build a FAT flash image from a directory tree",
    long_about = "Format an in-memory block device with FAT, copy a host directory tree onto it and write the raw image to a file"
)]
pub struct Args {
    /// Directory whose contents become the volume root
    pub source: Option<PathBuf>,

    /// Image file to write [default: filesystem.bin]
    pub output: Option<PathBuf>,

    /// Bytes per sector [default: 4096]
    #[arg(long = "sector-size")]
    pub sector_size: Option<u32>,

    /// Number of sectors [default: 512]
    #[arg(long = "sector-count")]
    pub sector_count: Option<u64>,

    /// Write the full device instead of stopping at the last written byte
    #[arg(long = "full")]
    pub full: bool,

    /// Overwrite the output if it exists
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    /// Glob for entry names to leave out (repeatable, replaces the defaults)
    #[arg(long = "ignore", value_name = "PATTERN")]
    pub ignore: Vec<String>,

    /// FAT volume label
    #[arg(long = "label")]
    pub label: Option<String>,

    /// TOML file with an [image] table; flags override its values
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Write a JSON build report here
    #[arg(long = "report")]
    pub report: Option<PathBuf>,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Args {
    /// The settings given on the command line. Unset flags stay `None`.
    pub fn settings(&self) -> ImageSettings {
        ImageSettings {
            source_root: self.source.clone(),
            output_path: self.output.clone(),
            sector_size: self.sector_size,
            sector_count: self.sector_count,
            truncate: self.full.then_some(false),
            force_overwrite: self.force.then_some(true),
            ignore: (!self.ignore.is_empty()).then(|| self.ignore.clone()),
            volume_label: self.label.clone(),
        }
    }
}
