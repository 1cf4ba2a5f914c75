// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use radarwire::{
    config::RadarConfiguration,
    index::{self, IndexRow},
    record::{
        read_magnitudes_parallel, stream, to_decibels, ErrorPolicy, RadarRecord, RecordReader,
    },
    settings::{RadarSettings, SETTINGS_FILE_NAME},
};
use std::path::PathBuf;
use tracing::{info, info_span, warn};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt as _, Layer as _, Registry};

#[cfg(feature = "profiling")]
#[global_allocator]
static GLOBAL: tracy_client::ProfiledAllocator<std::alloc::System> =
    tracy_client::ProfiledAllocator::new(std::alloc::System, 100);

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Capture file
    file: PathBuf,

    /// Radar settings JSON, defaults to the settings next to the capture
    #[arg(long, env)]
    settings: Option<PathBuf>,

    /// Record index to use instead of scanning the capture
    #[arg(long)]
    index: Option<PathBuf>,

    /// Write the record index next to the capture
    #[arg(long)]
    write_index: bool,

    /// First index row to export
    #[arg(long, default_value = "0")]
    start: usize,

    /// Number of frames to export, defaults to all remaining
    #[arg(long)]
    count: Option<usize>,

    /// Decoder threads for the export
    #[arg(long, env, default_value = "1")]
    workers: usize,

    /// Export magnitudes as a (frames, range, doppler) .npy file
    #[arg(long)]
    numpy: Option<PathBuf>,

    /// Convert exported magnitudes to dB
    #[arg(long)]
    db: bool,

    /// End the scan at the first broken record instead of failing
    #[arg(long)]
    stop_at_error: bool,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    rust_log: LevelFilter,

    /// Enable Tracy profiler broadcast
    #[arg(long, env)]
    tracy: bool,
}

fn load_configuration(args: &Args) -> Result<RadarConfiguration, Box<dyn std::error::Error>> {
    let path = match &args.settings {
        Some(path) => path.clone(),
        None => args.file.with_file_name(SETTINGS_FILE_NAME),
    };

    if args.settings.is_none() && !path.exists() {
        warn!("no settings at {}, using defaults", path.display());
        return Ok(RadarConfiguration::default());
    }

    let config = RadarSettings::load(&path)?.configuration()?;
    info!("{}: {}", path.display(), config);
    Ok(config)
}

fn summarize(records: &[RadarRecord]) {
    let (Some(first), Some(last)) = (records.first(), records.last()) else {
        warn!("no records");
        return;
    };

    let count = |bit: u16| records.iter().filter(|r| r.stream_mask & bit != 0).count();
    let duration = (last.effective_time_micros() - first.effective_time_micros()) as f64 / 1e6;
    info!(
        "{} records, frames {}..={}, {:.3} s, magnitudes {}, detections {}, trackings {}",
        records.len(),
        first.index,
        last.index,
        duration,
        count(stream::MAGNITUDES),
        count(stream::DETECTIONS),
        count(stream::TRACKINGS)
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    args.tracy.then(tracy_client::Client::start);

    let stdout_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(args.rust_log);

    let journald = match tracing_journald::layer() {
        Ok(journald) => Some(journald.with_filter(args.rust_log)),
        Err(_) => None,
    };

    let tracy = match args.tracy {
        true => Some(tracing_tracy::TracyLayer::default().with_filter(args.rust_log)),
        false => None,
    };

    let subscriber = Registry::default()
        .with(stdout_log)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    let config = load_configuration(&args)?;

    let rows = match &args.index {
        Some(path) if !args.write_index => index::read_index(path)?,
        _ => {
            let data = std::fs::read(&args.file)?;
            let policy = match args.stop_at_error {
                true => ErrorPolicy::Stop,
                false => ErrorPolicy::Fatal,
            };

            let _span = info_span!("scan").entered();
            let mut reader = RecordReader::new(&data, policy);
            let mut records = Vec::new();
            for record in reader.by_ref() {
                records.push(record?);
            }
            if let Some(err) = reader.error() {
                warn!("scan stopped at offset {}: {}", reader.offset(), err);
            }
            summarize(&records);

            records.iter().map(IndexRow::from).collect::<Vec<_>>()
        }
    };

    if args.write_index {
        let path = args
            .index
            .clone()
            .unwrap_or_else(|| index::index_path(&args.file));
        index::write_index(&path, &rows)?;
        info!("wrote {} index rows to {}", rows.len(), path.display());
    }

    if let Some(path) = &args.numpy {
        let first = rows
            .get(args.start)
            .ok_or_else(|| format!("start row {} out of {} rows", args.start, rows.len()))?;
        let count = args.count.unwrap_or(rows.len() - args.start);

        let magnitudes =
            read_magnitudes_parallel(&args.file, first.offset as u64, &config, count, args.workers)?;
        info!("exporting {:?} magnitudes to {}", magnitudes.shape(), path.display());

        match args.db {
            true => ndarray_npy::write_npy(path, &to_decibels(&magnitudes))?,
            false => ndarray_npy::write_npy(path, &magnitudes)?,
        }
    }

    Ok(())
}
