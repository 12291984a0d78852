//! # Streaming windowed coverage tracks
//!
//! Reads a coordinate-sorted alignment stream once and aggregates it into fixed-width
//! windows: mean depth per window, optionally split by fragment strand, plus auxiliary
//! tracks for mismatch rate, insert size, pair orientation and a depth histogram.
//!
//! The engine lives in [`engine::CoverageCounter`]; [`count_main`] wires it to a BAM
//! file and the usual set of output files.
//!
pub mod bucket;
pub mod bucket_map;
pub mod config;
pub mod consts;
pub mod engine;
pub mod histogram;
pub mod reading;
pub mod reference;
pub mod sink;
pub mod wig;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

use covtrack_core::errors::{CountError, Result};
use covtrack_core::utils::{FileType, get_file_info, read_chrom_sizes};

use self::config::CountConfig;
use self::consts::{
    HISTOGRAM_SUFFIX, INSERT_SIZE_SUFFIX, MISMATCH_SUFFIX, ORIENTATION_SUFFIX, PROGRESS_INTERVAL,
};
use self::engine::{CountStats, CoverageCounter};
use self::reading::BamAlignments;
use self::reference::{FastaReference, NoReference, ReferenceSource};
use self::sink::BedGraphSink;
use self::wig::{StepSink, WigWriter};

///
/// Files involved in one counting run.
///
#[derive(Debug, Clone, Default)]
pub struct CountJob {
    /// Coordinate-sorted BAM file.
    pub input: PathBuf,
    /// Primary bedGraph output. Auxiliary outputs are named after it.
    pub output: PathBuf,
    /// Optional variableStep wig copy of the window coverage.
    pub wig: Option<PathBuf>,
    /// Reference FASTA for mismatch calling, bound to `CountConfig::genome`.
    pub fasta: Option<PathBuf>,
    /// chrom.sizes file; its lengths override the ones in the BAM header.
    pub chrom_sizes: Option<PathBuf>,
    pub show_progress: bool,
}

///
/// Path of an auxiliary output: the primary output with its extension replaced by `suffix`.
///
/// ```
/// use covtrack_count::aux_output_path;
/// use std::path::{Path, PathBuf};
///
/// assert_eq!(
///     aux_output_path(Path::new("out/sample.bedGraph"), ".isize.wig"),
///     PathBuf::from("out/sample.isize.wig")
/// );
/// ```
///
pub fn aux_output_path(output: &Path, suffix: &str) -> PathBuf {
    let mut name = output
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    output.with_file_name(name)
}

fn open_step_output(path: &Path, span: u32, keep_zeros: bool) -> Option<Box<dyn StepSink>> {
    match WigWriter::create(path, span, keep_zeros) {
        Ok(writer) => Some(Box::new(writer)),
        Err(e) => {
            warn!(
                "{}; continuing without it",
                CountError::auxiliary(&path.display().to_string(), e)
            );
            None
        }
    }
}

fn progress_bar(show: bool, input: &Path) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg} ({pos} records)")
    {
        pb.set_style(style);
    }
    pb.set_message(format!(
        "Counting {:?}",
        input.file_name().unwrap_or_default()
    ));
    pb
}

///
/// Count a BAM file into a bedGraph of window coverage plus every auxiliary output
/// enabled in `config`.
///
/// All outputs are flushed and closed before this returns, whether the run succeeded,
/// was cancelled through `cancel`, or stopped on a fatal input error.
///
/// # Arguments
///
/// - job: input and output files
/// - config: window size, extension, filters and auxiliary options
/// - cancel: checked between records; set it to stop early
///
pub fn count_main(job: &CountJob, config: &CountConfig, cancel: Option<&AtomicBool>) -> Result<CountStats> {
    config.validate()?;

    let input_info = get_file_info(&job.input);
    if input_info.file_type != FileType::BAM {
        warn!(
            "{:?} does not look like a BAM file; trying to read it as one anyway",
            job.input
        );
    }

    let alignments = BamAlignments::open(&job.input)?;

    let mut chrom_sizes = alignments.chrom_sizes();
    if let Some(path) = job.chrom_sizes.as_ref() {
        chrom_sizes.extend(read_chrom_sizes(path)?);
    }

    let reference: Box<dyn ReferenceSource> = match (job.fasta.as_ref(), config.genome.as_deref()) {
        (Some(fasta), Some(genome)) => Box::new(FastaReference::new(genome, fasta)),
        (Some(fasta), None) => {
            warn!(
                "Reference {:?} given without a genome build; mismatches will not be called",
                fasta
            );
            Box::new(NoReference)
        }
        _ => Box::new(NoReference),
    };

    let sink = BedGraphSink::create(&job.output)?;
    let mut counter = CoverageCounter::with_reference(config.clone(), sink, reference)?
        .with_chrom_sizes(chrom_sizes);

    if let Some(wig) = job.wig.as_ref() {
        if let Some(output) = open_step_output(wig, config.window_size, false) {
            counter = counter.with_coverage_wig(output);
        }
    }
    if config.aux.mismatch {
        let path = aux_output_path(&job.output, MISMATCH_SUFFIX);
        if let Some(output) = open_step_output(&path, config.window_size, false) {
            counter = counter.with_mismatch_output(output);
        }
    }
    if config.aux.insert_size {
        let path = aux_output_path(&job.output, INSERT_SIZE_SUFFIX);
        if let Some(output) = open_step_output(&path, 1, false) {
            counter = counter.with_insert_size_output(output);
        }
    }
    if config.aux.orientation {
        let path = aux_output_path(&job.output, ORIENTATION_SUFFIX);
        if let Some(output) = open_step_output(&path, 1, false) {
            counter = counter.with_orientation_output(output);
        }
    }
    if config.aux.histogram {
        let path = aux_output_path(&job.output, HISTOGRAM_SUFFIX);
        match File::create(&path) {
            Ok(file) => counter = counter.with_histogram_output(Box::new(BufWriter::new(file))),
            Err(e) => warn!(
                "{}; continuing without it",
                CountError::auxiliary(&path.display().to_string(), e)
            ),
        }
    }

    info!(
        "Counting {:?} in windows of {} (extension {}, sort tolerance {})",
        job.input,
        config.window_size,
        config.extension_factor,
        config.tolerance()
    );

    let pb = progress_bar(job.show_progress, &job.input);
    let mut seen: u64 = 0;
    let records = alignments.inspect(|_| {
        seen += 1;
        if seen % PROGRESS_INTERVAL == 0 {
            pb.set_position(seen);
        }
    });

    let run_result = counter.run(records, cancel);
    let summary = counter.finish();

    pb.finish_with_message(format!("Processed {} records", seen));

    run_result?;
    let summary = summary?;

    info!(
        "Wrote {} windows to {:?} ({} late bases dropped, {} records skipped)",
        summary.stats.windows_emitted,
        job.output,
        summary.stats.late_bases,
        summary.stats.skipped
    );

    Ok(summary.stats)
}
