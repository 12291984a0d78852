pub mod alignment;

// re-export for cleaner imports
pub use self::alignment::{
    Alignment, AlignmentBlock, AlignmentFlags, ReadMate, Strand, StrandOption,
    pair_orientation_code,
};
