use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use szs_builder::{archive, ctd::FormatVersion};

/// Convert an intermediate course document into a compressed SZS track
/// archive.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// The input course document (.szs.data)
    input: PathBuf,

    /// The revision of the input document
    #[arg(long, value_enum, default_value_t = Version::V4)]
    format_version: Version,

    /// The output path. Defaults to the input path with an szs extension.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Version {
    V1,
    V2,
    V3,
    V4,
}

impl From<Version> for FormatVersion {
    fn from(version: Version) -> Self {
        match version {
            Version::V1 => FormatVersion::V1,
            Version::V2 => FormatVersion::V2,
            Version::V3 => FormatVersion::V3,
            Version::V4 => FormatVersion::V4,
        }
    }
}

fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    let cli = Cli::parse();
    let start = std::time::Instant::now();

    let document = std::fs::read(&cli.input)
        .with_context(|| format!("failed to read {:?}", cli.input))?;

    let szs = archive::build_archive(&document, cli.format_version.into())
        .with_context(|| format!("failed to build archive from {:?}", cli.input))?;

    let output = cli
        .output
        .unwrap_or_else(|| cli.input.with_extension("szs"));
    std::fs::write(&output, szs).with_context(|| format!("failed to write {output:?}"))?;

    println!("Wrote {output:?} in {:?}", start.elapsed());
    Ok(())
}
