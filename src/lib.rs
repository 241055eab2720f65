pub mod cli;
pub mod clustering;
pub mod consensus;
pub mod io;
pub mod merge_pass;
pub mod qual_seq;
pub mod store;
pub mod summary;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::Local;

use cli::Args;
use summary::RunSummary;

/// Runs the full ingest → (optional merge pass) → write pipeline
/// described by `args`, then writes a `RunSummary` report alongside the
/// FASTQ output (`<output>.summary.json`).
pub fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::from(args.log))
        .env()
        .init()?;

    let process_start_time = Local::now();
    log::info!("reading {}", args.input);
    let reader = io::open_input(Path::new(&args.input))?;
    let clustering = clustering::Clustering::from_fastq(
        reader,
        args.id_length,
        &args.adapter,
        args.id_tolerance,
        args.prefix_length,
        args.read_length,
    );
    log::info!(
        "ingest complete: {} clusters, {} corrupted UIDs",
        clustering.len(),
        clustering.fail_count()
    );
    let mut summary = RunSummary::new(process_start_time, args.input.clone()).from_clustering(&clustering);

    let output = File::create(&args.output)?;
    let mut writer = BufWriter::new(output);

    match (args.merge_size, args.merge_target) {
        (Some(merge_size), Some(merge_target)) => {
            let merged = merge_pass::run(&clustering, merge_size, merge_target, args.id_tolerance);
            summary.set_merge_pass_applied(true);
            summary.set_clusters_after_merge(Some(merged.len()));
            for consensus in &merged {
                use std::io::Write;
                writer.write_all(consensus.to_fastq_record().as_bytes())?;
            }
        }
        _ => {
            clustering.write(&mut writer)?;
        }
    }

    let summary = summary.finish();
    let summary_path = format!("{}.summary.json", args.output);
    std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;
    log::info!("wrote run summary to {}", summary_path);

    Ok(())
}
