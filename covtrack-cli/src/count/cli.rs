use clap::{Arg, ArgAction, Command};

pub const COUNT_CMD: &str = "count";

/// Creates the count CLI Command object
pub fn create_count_cli() -> Command {
    Command::new(COUNT_CMD)
        .author("Databio")
        .about("Stream a sorted BAM file into windowed coverage, with optional mismatch, insert size, orientation and depth histogram tracks.")
        .arg(
            Arg::new("input")
                .help("Coordinate-sorted BAM file")
                .required(true),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .help("Output bedGraph; auxiliary outputs are named after it")
                .required(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("TOML file with counting settings; command line flags take precedence"),
        )
        .arg(
            Arg::new("window-size")
                .long("window-size")
                .short('w')
                .value_parser(clap::value_parser!(u32))
                .help("Window width in bases [default: 25]"),
        )
        .arg(
            Arg::new("extension")
                .long("extension")
                .short('e')
                .value_parser(clap::value_parser!(u32))
                .help("Extend every read by this many bases in its 3' direction [default: 0]"),
        )
        .arg(
            Arg::new("min-mapq")
                .long("min-mapq")
                .short('q')
                .value_parser(clap::value_parser!(u8))
                .help("Minimum mapping quality [default: 0]"),
        )
        .arg(
            Arg::new("strand")
                .long("strand")
                .short('s')
                .help("Split coverage by fragment strand, taken from the first or second read of the pair (first|second)"),
        )
        .arg(
            Arg::new("options")
                .long("options")
                .short('x')
                .help("Comma separated auxiliary outputs: i (insert size), o (orientation), m (mismatch), h (histogram)"),
        )
        .arg(
            Arg::new("wig")
                .long("wig")
                .help("Also write window coverage as a variableStep wig file"),
        )
        .arg(
            Arg::new("fasta")
                .long("fasta")
                .short('f')
                .help("Reference FASTA (optionally gzipped) used to call mismatches"),
        )
        .arg(
            Arg::new("genome")
                .long("genome")
                .short('g')
                .help("Genome build of the reference, e.g. hg38"),
        )
        .arg(
            Arg::new("chromsizes")
                .long("chromsizes")
                .help("chrom.sizes file; overrides the lengths in the BAM header"),
        )
        .arg(
            Arg::new("no-progress")
                .long("no-progress")
                .help("Don't show a progress spinner")
                .action(ArgAction::SetTrue),
        )
}
