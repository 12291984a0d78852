//! Streaming windowed aggregation of alignment records.
//!
//! Reads arrive roughly sorted by start position. Each read adds one count per covered
//! base to the window bucket owning that base. Buckets stay open until the input has
//! moved far enough past them (the sort tolerance) that no later read, even one
//! extended backwards, can reach them; they are then emitted exactly once and dropped.
//! Memory therefore stays proportional to the tolerance, not to the chromosome.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use covtrack_core::errors::{CountError, ErrorAction, Result};
use covtrack_core::models::{Alignment, Strand};

use crate::bucket::WindowBucket;
use crate::bucket_map::BucketMap;
use crate::config::CountConfig;
use crate::consts::{MAX_INSERT_SIZE, TOTAL_COUNT_ATTRIBUTE};
use crate::histogram::Histogram;
use crate::reference::{NoReference, ReferenceSource};
use crate::sink::{CoverageSink, WindowRecord};
use crate::wig::StepSink;

/// Counters describing what happened during a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CountStats {
    pub records: u64,
    pub passed_filter: u64,
    pub skipped: u64,
    /// Bases dropped because their window had already been emitted.
    pub late_bases: u64,
    /// Bases dropped because they fell past the end of the chromosome.
    pub clipped_bases: u64,
    pub windows_emitted: u64,
    /// Most frequent per-base depth, when the histogram is enabled.
    pub histogram_peak: Option<u32>,
}

/// What a finished run hands back.
pub struct CountSummary<S> {
    pub sink: S,
    pub histogram: Option<Histogram>,
    pub stats: CountStats,
}

///
/// Map a pair-orientation code onto a score: 1 for outward facing pairs (duplication or
/// translocation), -1 for same-strand pairs (inversion), 0 otherwise.
///
pub fn orientation_score(code: &str) -> f32 {
    match code {
        "R1F2" | "R2F1" => 1.0,
        "F1F2" | "F2F1" | "R1R2" | "R2R1" => -1.0,
        _ => 0.0,
    }
}

///
/// An auxiliary step output that turns itself off after its first I/O failure.
///
struct AuxSlot {
    name: &'static str,
    sink: Option<Box<dyn StepSink>>,
}

impl AuxSlot {
    fn empty(name: &'static str) -> Self {
        AuxSlot { name, sink: None }
    }

    fn is_active(&self) -> bool {
        self.sink.is_some()
    }

    fn disable(&mut self, source: std::io::Error) {
        warn!("{}; disabling it for the rest of the run", CountError::auxiliary(self.name, source));
        self.sink = None;
    }

    fn add_data(&mut self, chr: &str, start: u32, end: u32, value: f32) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.add_data(chr, start, end, value) {
                self.disable(e);
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close() {
                warn!("{}", CountError::auxiliary(self.name, e));
            }
        }
    }
}

///
/// The aggregation engine. Owns the open buckets of the current chromosome and every
/// output the closed buckets are written to.
///
pub struct CoverageCounter<S: CoverageSink, R: ReferenceSource = NoReference> {
    config: CountConfig,
    tolerance: u32,
    sink: S,
    reference: R,
    chrom_sizes: HashMap<String, u32>,
    map: BucketMap,
    coverage_wig: AuxSlot,
    mismatch_wig: AuxSlot,
    insert_size_wig: AuxSlot,
    orientation_wig: AuxSlot,
    histogram: Option<Histogram>,
    histogram_out: Option<Box<dyn Write>>,
    seen_chromosomes: HashSet<String>,
    warned_late: bool,
    stats: CountStats,
}

impl<S: CoverageSink> CoverageCounter<S, NoReference> {
    pub fn new(config: CountConfig, sink: S) -> Result<Self> {
        CoverageCounter::with_reference(config, sink, NoReference)
    }
}

impl<S: CoverageSink, R: ReferenceSource> CoverageCounter<S, R> {
    pub fn with_reference(config: CountConfig, mut sink: S, reference: R) -> Result<Self> {
        config.validate()?;
        let tolerance = config.tolerance();
        sink.set_sort_tolerance(tolerance);

        if config.aux.mismatch && config.genome.is_none() {
            warn!("Mismatch output requested without a genome build; no mismatches will be called");
        }

        let histogram = config
            .aux
            .histogram
            .then(|| Histogram::new(config.histogram_capacity));

        Ok(CoverageCounter {
            map: BucketMap::new(config.window_size),
            tolerance,
            sink,
            reference,
            chrom_sizes: HashMap::new(),
            coverage_wig: AuxSlot::empty("coverage wig"),
            mismatch_wig: AuxSlot::empty("mismatch"),
            insert_size_wig: AuxSlot::empty("insert size"),
            orientation_wig: AuxSlot::empty("orientation"),
            histogram,
            histogram_out: None,
            seen_chromosomes: HashSet::new(),
            warned_late: false,
            stats: CountStats::default(),
            config,
        })
    }

    /// Known chromosome lengths; windows are clipped to them.
    pub fn with_chrom_sizes(mut self, chrom_sizes: HashMap<String, u32>) -> Self {
        self.chrom_sizes = chrom_sizes;
        self
    }

    /// Also write each window's coverage to a step output.
    pub fn with_coverage_wig(mut self, sink: Box<dyn StepSink>) -> Self {
        self.coverage_wig.sink = Some(sink);
        self
    }

    pub fn with_mismatch_output(mut self, sink: Box<dyn StepSink>) -> Self {
        if self.config.aux.mismatch {
            self.mismatch_wig.sink = Some(sink);
        }
        self
    }

    pub fn with_insert_size_output(mut self, sink: Box<dyn StepSink>) -> Self {
        if self.config.aux.insert_size {
            self.insert_size_wig.sink = Some(sink);
        }
        self
    }

    pub fn with_orientation_output(mut self, sink: Box<dyn StepSink>) -> Self {
        if self.config.aux.orientation {
            self.orientation_wig.sink = Some(sink);
        }
        self
    }

    pub fn with_histogram_output(mut self, writer: Box<dyn Write>) -> Self {
        if self.config.aux.histogram {
            self.histogram_out = Some(writer);
        }
        self
    }

    pub fn config(&self) -> &CountConfig {
        &self.config
    }

    pub fn stats(&self) -> &CountStats {
        &self.stats
    }

    pub fn open_buckets(&self) -> usize {
        self.map.len()
    }

    fn pass_filter(&self, alignment: &Alignment) -> bool {
        if let Some(option) = self.config.strand_option() {
            if alignment.fragment_strand(option) == Strand::None {
                return false;
            }
        }
        alignment.flags.is_mapped
            && !alignment.flags.is_duplicate
            && !alignment.flags.is_vendor_failed
            && alignment.mapping_quality >= self.config.min_mapping_quality
    }

    ///
    /// Count one alignment.
    ///
    /// Filtered alignments are ignored. Errors returned here are either a skippable
    /// record error or a failure of the primary sink.
    ///
    pub fn process(&mut self, alignment: &Alignment) -> Result<()> {
        self.stats.records += 1;

        if !self.pass_filter(alignment) {
            return Ok(());
        }
        if alignment.end < alignment.start {
            return Err(CountError::SkippableRecord(format!(
                "{} ends before it starts",
                alignment
            )));
        }

        self.stats.passed_filter += 1;

        if self.map.chr() != Some(alignment.chr.as_str()) {
            self.start_chromosome(&alignment.chr)?;
        } else {
            let threshold = self
                .map
                .window_index(alignment.start.saturating_sub(self.tolerance));
            self.close_buckets_before(threshold)?;
        }

        if alignment.is_proper_pair_on_same_chr() {
            self.record_pair_stats(alignment);
        }

        let strand = match self.config.strand_option() {
            Some(option) => alignment.fragment_strand(option),
            None => alignment.strand(),
        };
        let is_negative = alignment.flags.is_negative_strand;

        if alignment.blocks.is_empty() {
            let (start, end) = self.extend(alignment.start, alignment.end, is_negative);
            for position in start..end {
                self.increment(position, 0, strand);
            }
        } else {
            for block in &alignment.blocks {
                let (start, end) = self.extend(block.start, block.end(), is_negative);
                for position in start..end {
                    let base = block.base_at(position).unwrap_or(0);
                    self.increment(position, base, strand);
                }
            }
        }

        Ok(())
    }

    /// Fragment extension: negative strand reads grow backwards, others forwards.
    fn extend(&self, start: u32, end: u32, is_negative: bool) -> (u32, u32) {
        let extension = self.config.extension_factor;
        if is_negative {
            (start.saturating_sub(extension), end)
        } else {
            (start, end.saturating_add(extension))
        }
    }

    fn start_chromosome(&mut self, chr: &str) -> Result<()> {
        self.close_all_buckets()?;

        if !self.seen_chromosomes.insert(chr.to_string()) {
            warn!(
                "Chromosome {} seen again after other chromosomes; input is not sorted and its windows may be reported twice",
                chr
            );
        }
        debug!("Counting {}", chr);
        self.map
            .switch_chromosome(chr, self.chrom_sizes.get(chr).copied());
        self.warned_late = false;
        Ok(())
    }

    fn record_pair_stats(&mut self, alignment: &Alignment) {
        if self.config.aux.insert_size {
            let insert_size =
                (alignment.inferred_insert_size.unsigned_abs() as f32).min(MAX_INSERT_SIZE);
            self.insert_size_wig.add_data(
                &alignment.chr,
                alignment.start,
                alignment.start + 1,
                insert_size,
            );
            if let Some(bucket) = self.bucket_for(alignment.start) {
                bucket.increment_insert_size(alignment.inferred_insert_size);
            }
        }

        if self.orientation_wig.is_active() {
            if let Some(code) = alignment.pair_orientation.as_deref() {
                self.orientation_wig.add_data(
                    &alignment.chr,
                    alignment.start,
                    alignment.start + 1,
                    orientation_score(code),
                );
            }
        }
    }

    fn bucket_for(&mut self, position: u32) -> Option<&mut WindowBucket> {
        let CoverageCounter {
            map,
            reference,
            config,
            ..
        } = self;
        let genome = config.genome.as_deref().filter(|_| config.aux.mismatch);

        map.bucket_for(position, |chr, start, end| {
            genome.and_then(|genome| reference.read_sequence(genome, chr, start, end))
        })
    }

    fn increment(&mut self, position: u32, base: u8, strand: Strand) {
        if let Some(bucket) = self.bucket_for(position) {
            bucket.increment(position, base, strand);
            return;
        }

        if self.map.chrom_size().is_some_and(|size| position >= size) {
            self.stats.clipped_bases += 1;
        } else {
            self.stats.late_bases += 1;
            if !self.warned_late {
                warn!(
                    "Alignment on {} reaches position {} whose window was already written; input is out of order beyond the sort tolerance of {}",
                    self.map.chr().unwrap_or_default(),
                    position,
                    self.tolerance
                );
                self.warned_late = true;
            }
        }
    }

    ///
    /// Emit and evict every open bucket with a window index below `threshold`.
    ///
    pub fn close_buckets_before(&mut self, threshold: u32) -> Result<()> {
        let closing = self.map.close_before(threshold);
        self.emit(closing)
    }

    fn close_all_buckets(&mut self) -> Result<()> {
        let closing = self.map.close_all();
        self.emit(closing)
    }

    fn emit(&mut self, buckets: Vec<WindowBucket>) -> Result<()> {
        if buckets.is_empty() {
            return Ok(());
        }
        let chr = self.map.chr().unwrap_or_default().to_string();
        let strand_split = self.config.strand_option().is_some();

        for bucket in buckets {
            let record = WindowRecord {
                chr: chr.clone(),
                start: bucket.start,
                end: bucket.end,
                coverage: bucket.coverage(),
                strand_coverage: strand_split.then(|| bucket.strand_coverage()),
                mean_insert_size: self
                    .config
                    .aux
                    .insert_size
                    .then(|| bucket.average_insert_size()),
            };
            self.sink.add_record(&record)?;

            self.coverage_wig
                .add_data(&chr, bucket.start, bucket.end, record.coverage);

            if self.mismatch_wig.is_active() {
                self.mismatch_wig.add_data(
                    &chr,
                    bucket.start,
                    bucket.end,
                    bucket.max_mismatch_fraction(),
                );
            }

            if let Some(histogram) = self.histogram.as_mut() {
                for count in bucket.base_counts() {
                    histogram.add_data_point(*count);
                }
            }

            self.stats.windows_emitted += 1;
        }
        Ok(())
    }

    ///
    /// Feed every alignment from `alignments` through [`CoverageCounter::process`].
    ///
    /// Skippable errors are logged and counted. The first fatal error stops the loop
    /// and is returned; buckets are left open for [`CoverageCounter::finish`] to drain.
    /// `cancel` is checked once per record.
    ///
    pub fn run<I>(&mut self, alignments: I, cancel: Option<&AtomicBool>) -> Result<()>
    where
        I: IntoIterator<Item = Result<Alignment>>,
    {
        for item in alignments {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                info!("Counting cancelled after {} records", self.stats.records);
                break;
            }

            let outcome = item.and_then(|alignment| self.process(&alignment));
            if let Err(e) = outcome {
                match e.action() {
                    ErrorAction::Skip | ErrorAction::DisableSink => {
                        self.stats.skipped += 1;
                        warn!("{}", e);
                    }
                    ErrorAction::Abort => return Err(e),
                }
            }
        }
        Ok(())
    }

    ///
    /// Drain every open bucket, close all auxiliary outputs and write the histogram.
    ///
    /// Auxiliary failures are logged and do not fail the run; a failure of the primary
    /// sink is returned after every other output has been closed.
    ///
    pub fn finish(mut self) -> Result<CountSummary<S>> {
        let drained = self.close_all_buckets();

        self.sink.set_attribute(
            TOTAL_COUNT_ATTRIBUTE,
            &self.stats.passed_filter.to_string(),
        );
        let completed = self.sink.parsing_complete();

        self.coverage_wig.close();
        self.mismatch_wig.close();
        self.insert_size_wig.close();
        self.orientation_wig.close();

        if let Some(histogram) = self.histogram.as_ref() {
            self.stats.histogram_peak = histogram.mode();
            debug!(
                "Depth histogram over {} bases peaks at {:?}",
                histogram.total(),
                self.stats.histogram_peak
            );
            if let Some(mut writer) = self.histogram_out.take() {
                if let Err(e) = histogram.render(&mut writer) {
                    warn!("{}", CountError::auxiliary("histogram", e));
                }
            }
        }

        info!(
            "Counted {} of {} alignments into {} windows",
            self.stats.passed_filter, self.stats.records, self.stats.windows_emitted
        );

        drained?;
        completed?;

        Ok(CountSummary {
            sink: self.sink,
            histogram: self.histogram,
            stats: self.stats,
        })
    }
}
