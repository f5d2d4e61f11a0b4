mod cli;

use std::fs;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Args;
use flashfs_builder::{build, BuildError, BuildReport, ImageSettings};

/// Exit code for failures outside the build taxonomy.
const EXIT_OTHER: u8 = 1;

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_timestamp(None)
        .format_target(false)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            let build_err = err.downcast_ref::<BuildError>();
            if let Some(hint) = build_err.and_then(hint_for) {
                eprintln!("  {}", hint);
            }
            let code = build_err
                .map(|build_err| build_err.category().exit_code())
                .unwrap_or(EXIT_OTHER);
            ExitCode::from(code)
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let file_settings = match &args.config {
        Some(path) => ImageSettings::load(path).map_err(BuildError::from)?,
        None => ImageSettings::default(),
    };
    let config = file_settings
        .merge(args.settings())
        .into_config()
        .map_err(BuildError::from)?;

    let source = config.source_root.clone();
    let output = config.output_path.clone();
    let report = build(config).with_context(|| {
        format!(
            "building image from '{}' to '{}'",
            source.display(),
            output.display()
        )
    })?;

    print_summary(&report);

    if let Some(path) = &args.report {
        let json = report.to_json().context("serializing build report")?;
        fs::write(path, json).map_err(|source| BuildError::DestinationWrite {
            path: path.clone(),
            source,
        })?;
        println!("  Report: {}", path.display());
    }
    Ok(())
}

/// What the user can do about an error, in terms of this binary's flags.
fn hint_for(err: &BuildError) -> Option<&'static str> {
    match err {
        BuildError::Refusal(_) => Some("pass -f/--force to overwrite it"),
        BuildError::ShortWrite { .. } => Some("increase --sector-count or --sector-size"),
        _ => None,
    }
}

fn print_summary(report: &BuildReport) {
    println!();
    println!("=== Image Built ===");
    println!("  Output: {}", report.output_path.display());
    println!(
        "  Geometry: {} x {} bytes",
        report.sector_count, report.sector_size
    );
    println!(
        "  Copied: {} directories, {} files, {} bytes",
        report.directories, report.files, report.bytes_copied
    );
    if report.ignored > 0 || report.skipped > 0 {
        println!(
            "  Left out: {} ignored, {} skipped",
            report.ignored, report.skipped
        );
    }
    println!(
        "  Image: {} bytes ({} free on volume)",
        report.image_bytes, report.free_bytes
    );
    println!("  SHA256: {}", report.image_sha256);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_refusal_hint_names_force_flag() {
        let err = BuildError::Refusal(PathBuf::from("filesystem.bin"));
        assert!(hint_for(&err).unwrap().contains("--force"));
        assert_eq!(hint_for(&BuildError::Format(std::io::ErrorKind::Other.into())), None);
    }
}
