// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

mod cache;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::num::NonZero;
use std::path::{Path, PathBuf};
use thin_diff::{
    ApplySummary, Device, DiffOptions, DiffSummary, Operation, Record,
    RecordReader, StdRead, StdWrite, apply_diff, find_device, make_diff,
    parse_thin_dump,
};
use tabled::builder::Builder;
use tabled::settings::object::Columns;
use tabled::settings::{Alignment, Style};
use tracing_subscriber::EnvFilter;

/// Create and apply diffs between thin-provisioned devices.
#[derive(Parser)]
struct Opt {
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Write the diff stream between two devices of a pool.
    MakeDiff(MakeDiffArgs),

    /// Print the records of a diff stream.
    Show {
        /// Path of the diff stream.
        diff: PathBuf,
    },

    /// Apply a diff stream to an image of the old device.
    Apply {
        /// Path of the diff stream.
        diff: PathBuf,

        /// Path of the device image to modify.
        image: PathBuf,
    },

    /// List the devices in a pool.
    Devices(MetadataArgs),
}

#[derive(Args)]
struct MetadataArgs {
    /// Path of the XML written by `thin_dump`.
    #[arg(long)]
    metadata_dump_file: PathBuf,

    /// Path of a cache of the parsed metadata.
    #[arg(long)]
    cache_file: Option<PathBuf>,
}

#[derive(Args)]
struct MakeDiffArgs {
    #[command(flatten)]
    metadata: MetadataArgs,

    /// Id of the old device.
    #[arg(long)]
    from_dev_id: u32,

    /// Id of the new device.
    #[arg(long)]
    to_dev_id: u32,

    /// Path of the pool's data device.
    #[arg(long)]
    data_file: PathBuf,

    /// Where to write the diff stream, or `-` for stdout.
    #[arg(long, default_value = "-")]
    output: PathBuf,

    /// Maximum size in bytes of each data chunk.
    #[arg(
        long,
        default_value_t = DiffOptions::DEFAULT_CHUNK_SIZE.get(),
        value_parser = clap::value_parser!(u32).range(1..),
    )]
    chunk_size: u32,
}

/// Load the devices described by `args`, using the cache if possible.
fn load_devices(args: &MetadataArgs) -> Result<Vec<Device>> {
    let path = &args.metadata_dump_file;
    let mtime = fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("failed to stat {}", path.display()))?;

    if let Some(cache_path) = &args.cache_file {
        if let Some(devices) = cache::load(cache_path, mtime) {
            return Ok(devices);
        }
    }

    let file = File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let devices = parse_thin_dump(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))?;

    if let Some(cache_path) = &args.cache_file {
        if let Err(err) = cache::save(cache_path, mtime, &devices) {
            tracing::warn!("failed to save device cache: {err:#}");
        }
    }
    Ok(devices)
}

fn run_make_diff(args: &MakeDiffArgs) -> Result<DiffSummary> {
    let devices = load_devices(&args.metadata)?;
    let from = find_device(&devices, args.from_dev_id)?;
    let to = find_device(&devices, args.to_dev_id)?;

    let mut store = File::open(&args.data_file).with_context(|| {
        format!("failed to open {}", args.data_file.display())
    })?;
    let options = DiffOptions {
        chunk_size: NonZero::new(args.chunk_size)
            .context("chunk size must be non-zero")?,
    };

    let out: Box<dyn Write> = if args.output == Path::new("-") {
        Box::new(io::stdout().lock())
    } else {
        Box::new(File::create(&args.output).with_context(|| {
            format!("failed to create {}", args.output.display())
        })?)
    };
    let mut out = StdWrite(BufWriter::new(out));
    let summary = make_diff(from, to, &mut store, &mut out, &options)?;
    out.0.flush().context("failed to flush output")?;
    Ok(summary)
}

/// Format the records of the diff stream at `path` as a table.
fn show_to_string(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut src = StdRead(BufReader::new(file));
    let reader = RecordReader::new(&mut src)?;

    let mut builder = Builder::new();
    builder.push_record(["Operation:", "Offset:", "Length:", "Chunks:"]);

    // Chunk count of the write in the last row, if any.
    let mut chunks: Option<u64> = None;
    let mut rows: Vec<[String; 4]> = Vec::new();
    let mut total_records = 0;
    for record in reader {
        match record? {
            Record::Patch(patch) => {
                if let (Some(row), Some(n)) = (rows.last_mut(), chunks.take()) {
                    row[3] = n.to_string();
                }
                if patch.operation == Operation::Write {
                    chunks = Some(0);
                }
                rows.push([
                    patch.operation.to_string(),
                    patch.offset.to_string(),
                    patch.length.to_string(),
                    String::new(),
                ]);
            }
            Record::Chunk(_) => {
                if let Some(n) = &mut chunks {
                    *n += 1;
                }
            }
            Record::End { records } => total_records = records,
        }
    }
    if let (Some(row), Some(n)) = (rows.last_mut(), chunks) {
        row[3] = n.to_string();
    }

    let num_patches = rows.len();
    for row in rows {
        builder.push_record(row);
    }
    let table = builder
        .build()
        .modify(Columns::new(1..), Alignment::right())
        .with(Style::empty())
        .to_string();

    Ok(format!(
        "{table}\n{num_patches} patches, {total_records} records"
    ))
}

fn run_apply(diff: &Path, image: &Path) -> Result<ApplySummary> {
    let file = File::open(diff)
        .with_context(|| format!("failed to open {}", diff.display()))?;
    let mut src = StdRead(BufReader::new(file));
    let mut image = OpenOptions::new()
        .write(true)
        .open(image)
        .with_context(|| format!("failed to open {}", image.display()))?;
    Ok(apply_diff(&mut src, &mut image)?)
}

fn devices_to_string(devices: &[Device]) -> String {
    let mut builder = Builder::new();
    builder.push_record(["Device:", "Extents:", "Mapped bytes:"]);
    for device in devices {
        builder.push_record([
            device.id.to_string(),
            device.extents.len().to_string(),
            device.extents.mapped_bytes().to_string(),
        ]);
    }
    builder
        .build()
        .modify(Columns::new(..), Alignment::right())
        .with(Style::empty())
        .to_string()
}

fn run(opt: &Opt) -> Result<()> {
    match &opt.action {
        Action::MakeDiff(args) => {
            run_make_diff(args)?;
        }
        Action::Show { diff } => {
            println!("{}", show_to_string(diff)?);
        }
        Action::Apply { diff, image } => {
            run_apply(diff, image)?;
        }
        Action::Devices(args) => {
            let devices = load_devices(args)?;
            println!("{}", devices_to_string(&devices));
        }
    }
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // Log to stderr; stdout may be carrying a diff stream.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    init_logging();
    run(&opt)
}
