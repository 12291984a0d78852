pub const DEFAULT_WINDOW_SIZE: u32 = 25;
pub const DEFAULT_EXTENSION_FACTOR: u32 = 0;
pub const DEFAULT_MIN_MAPPING_QUALITY: u8 = 0;
pub const DEFAULT_HISTOGRAM_CAPACITY: usize = 1000;

/// Insert sizes are capped before they are written to the insert-size track.
pub const MAX_INSERT_SIZE: f32 = 1000.0;

pub const MISMATCH_SUFFIX: &str = ".mismatch.wig";
pub const INSERT_SIZE_SUFFIX: &str = ".isize.wig";
pub const ORIENTATION_SUFFIX: &str = ".orientation.wig";
pub const HISTOGRAM_SUFFIX: &str = ".hist.txt";

pub const TOTAL_COUNT_ATTRIBUTE: &str = "totalCount";

/// How many records pass between progress bar refreshes.
pub const PROGRESS_INTERVAL: u64 = 100_000;
