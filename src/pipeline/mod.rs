//! The image build, stage by stage.
//!
//! ```text
//! Unconfigured ──allocate──▶ Allocated ──format──▶ Formatted
//!                                                      │
//!            Written ◀──write_image── Populated ◀──populate
//! ```
//!
//! Stages run strictly in this order and never move backwards. Any failure
//! moves the build to [`BuildStage::Aborted`] and drops the in-memory device;
//! the output file is only created by the final stage.
//!
//! - [`config`] - [`BuildConfig`] and the layered [`ImageSettings`]
//! - [`report`] - [`BuildReport`], what a finished build produced

pub mod config;
pub mod report;

use log::{debug, info};

use crate::artifact::image::persist_image;
use crate::device::BlockDevice;
use crate::error::BuildError;
use crate::volume::{format_volume, FatVolume, FormatOptions};
use crate::walker::{walk_tree, IgnoreList, Populator, TargetPath};

pub use config::{BuildConfig, ImageSettings};
pub use report::BuildReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Unconfigured,
    Allocated,
    Formatted,
    Populated,
    Written,
    /// A stage failed. Terminal.
    Aborted,
}

/// State of one build. Nothing is shared between contexts.
pub struct BuildContext {
    config: BuildConfig,
    ignore: IgnoreList,
    stage: BuildStage,
    device: Option<BlockDevice>,
    report: BuildReport,
}

impl BuildContext {
    /// Validate `config` and check the destination.
    ///
    /// An existing output without `force_overwrite` is refused here, before
    /// any memory is allocated.
    pub fn new(config: BuildConfig) -> Result<Self, BuildError> {
        config.validate()?;
        config.check_destination()?;
        let ignore = IgnoreList::new(&config.ignore)?;

        let report = BuildReport {
            source_root: config.source_root.clone(),
            output_path: config.output_path.clone(),
            sector_size: config.sector_size,
            sector_count: config.sector_count,
            ..Default::default()
        };

        Ok(Self {
            config,
            ignore,
            stage: BuildStage::Unconfigured,
            device: None,
            report,
        })
    }

    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Allocate the zero-filled block device.
    pub fn allocate(&mut self) -> Result<(), BuildError> {
        self.advance("allocate", BuildStage::Unconfigured, BuildStage::Allocated, |ctx| {
            let config = &ctx.config;
            info!(
                "Allocating {} sectors of {} bytes...",
                config.sector_count, config.sector_size
            );
            ctx.device = Some(BlockDevice::new(config.sector_size, config.sector_count)?);
            Ok(())
        })
    }

    /// Lay an empty FAT filesystem onto the device.
    pub fn format(&mut self) -> Result<(), BuildError> {
        self.advance("format", BuildStage::Allocated, BuildStage::Formatted, |ctx| {
            let device = device_mut(&mut ctx.device, "format")?;
            let options = FormatOptions::for_device(device, ctx.config.volume_label.as_deref())?;
            info!("Formatting volume...");
            format_volume(device, &options)?;
            debug!("format touched {} bytes", device.high_water_mark());
            Ok(())
        })
    }

    /// Replay the source tree onto the formatted volume.
    pub fn populate(&mut self) -> Result<(), BuildError> {
        self.advance("populate", BuildStage::Formatted, BuildStage::Populated, |ctx| {
            let device = device_mut(&mut ctx.device, "populate")?;
            info!("Populating from {}...", ctx.config.source_root.display());

            let mut volume = FatVolume::mount(device)?;
            let mut populator = Populator::new(&mut volume);
            let walk = walk_tree(&ctx.config.source_root, &ctx.ignore, &mut populator)?;
            let stats = populator.stats();
            let usage = volume
                .usage()
                .map_err(|source| BuildError::volume_write(TargetPath::root(), source))?;
            volume.unmount()?;

            let report = &mut ctx.report;
            report.directories = stats.directories;
            report.files = stats.files;
            report.bytes_copied = stats.bytes;
            report.ignored = walk.ignored;
            report.skipped = walk.skipped;
            report.free_bytes = usage.free_bytes();
            Ok(())
        })
    }

    /// Persist the device to the output path and release it.
    pub fn write_image(&mut self) -> Result<(), BuildError> {
        self.advance("write the image", BuildStage::Populated, BuildStage::Written, |ctx| {
            let device = device_mut(&mut ctx.device, "write the image")?;
            let config = &ctx.config;
            info!("Writing {}...", config.output_path.display());

            let summary = persist_image(
                device,
                config.truncate,
                &config.output_path,
                config.force_overwrite,
            )?;

            let report = &mut ctx.report;
            report.high_water_mark = device.high_water_mark();
            report.image_bytes = summary.bytes;
            report.image_sha256 = summary.sha256;
            ctx.device = None;
            Ok(())
        })
    }

    /// Run every remaining stage in order.
    pub fn run(mut self) -> Result<BuildReport, BuildError> {
        self.allocate()?;
        self.format()?;
        self.populate()?;
        self.write_image()?;
        Ok(self.report)
    }

    fn advance(
        &mut self,
        requested: &'static str,
        from: BuildStage,
        to: BuildStage,
        stage: impl FnOnce(&mut Self) -> Result<(), BuildError>,
    ) -> Result<(), BuildError> {
        if self.stage != from {
            return Err(BuildError::InvalidStage {
                requested,
                found: self.stage,
            });
        }
        match stage(self) {
            Ok(()) => {
                self.stage = to;
                Ok(())
            }
            Err(err) => {
                self.stage = BuildStage::Aborted;
                self.device = None;
                Err(err)
            }
        }
    }
}

fn device_mut<'a>(
    device: &'a mut Option<BlockDevice>,
    requested: &'static str,
) -> Result<&'a mut BlockDevice, BuildError> {
    device.as_mut().ok_or(BuildError::InvalidStage {
        requested,
        found: BuildStage::Unconfigured,
    })
}

/// Build an image from `config` in one go.
pub fn build(config: BuildConfig) -> Result<BuildReport, BuildError> {
    BuildContext::new(config)?.run()
}
