use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::ArgMatches;
use log::info;

use covtrack_core::models::StrandOption;
use covtrack_count::config::{AuxOptions, CountConfig, StrandMode};
use covtrack_count::{CountJob, count_main};

///
/// Settings come from the TOML file when one is given, then individual flags override them.
///
fn config_from_matches(matches: &ArgMatches) -> Result<CountConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => CountConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path))?,
        None => CountConfig::default(),
    };

    if let Some(window_size) = matches.get_one::<u32>("window-size") {
        config.window_size = *window_size;
    }
    if let Some(extension) = matches.get_one::<u32>("extension") {
        config.extension_factor = *extension;
    }
    if let Some(min_mapq) = matches.get_one::<u8>("min-mapq") {
        config.min_mapping_quality = *min_mapq;
    }
    if let Some(strand) = matches.get_one::<String>("strand") {
        let option: StrandOption = strand.parse().map_err(|e: String| anyhow!(e))?;
        config.strand_mode = StrandMode::StrandSplit(option);
    }
    if let Some(options) = matches.get_one::<String>("options") {
        config.aux = AuxOptions::parse(options);
    }
    if let Some(genome) = matches.get_one::<String>("genome") {
        config.genome = Some(genome.clone());
    }

    config.validate()?;
    Ok(config)
}

/// Matches items from CLAP args before running count_main
pub fn run_count(matches: &ArgMatches) -> Result<()> {
    let input = matches
        .get_one::<String>("input")
        .expect("An input BAM file is required.");
    let output = matches
        .get_one::<String>("output")
        .expect("An output path is required.");

    let config = config_from_matches(matches)?;

    let job = CountJob {
        input: PathBuf::from(input),
        output: PathBuf::from(output),
        wig: matches.get_one::<String>("wig").map(PathBuf::from),
        fasta: matches.get_one::<String>("fasta").map(PathBuf::from),
        chrom_sizes: matches.get_one::<String>("chromsizes").map(PathBuf::from),
        show_progress: !matches.get_flag("no-progress"),
    };

    let stats = count_main(&job, &config, None)
        .with_context(|| format!("Counting {} failed", input))?;

    info!(
        "{} of {} records counted into {} windows",
        stats.passed_filter, stats.records, stats.windows_emitted
    );

    Ok(())
}
