use std::fmt::{self, Display};
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

///
/// Strand of a read or of the fragment it came from.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    Positive,
    Negative,
    None,
}

impl Strand {
    fn from_negative(is_negative: bool) -> Self {
        if is_negative {
            Strand::Negative
        } else {
            Strand::Positive
        }
    }
}

///
/// Which read of a pair determines the strand of the whole fragment.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum StrandOption {
    FirstOfPair,
    SecondOfPair,
}

impl FromStr for StrandOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first" | "first-of-pair" | "1" => Ok(StrandOption::FirstOfPair),
            "second" | "second-of-pair" | "2" => Ok(StrandOption::SecondOfPair),
            _ => Err(format!("Invalid strand option: {}", s)),
        }
    }
}

///
/// One gapless aligned segment of a read, with the read bases that cover it.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentBlock {
    pub start: u32,
    pub bases: Vec<u8>,
}

impl AlignmentBlock {
    pub fn new(start: u32, bases: Vec<u8>) -> Self {
        AlignmentBlock { start, bases }
    }

    pub fn end(&self) -> u32 {
        self.start + self.bases.len() as u32
    }

    /// Base observed at a reference position, if the block covers it.
    pub fn base_at(&self, position: u32) -> Option<u8> {
        position
            .checked_sub(self.start)
            .and_then(|offset| self.bases.get(offset as usize))
            .copied()
    }
}

///
/// What we know about the other read of a pair.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadMate {
    pub chr: String,
    pub start: u32,
    pub is_mapped: bool,
    pub is_negative_strand: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignmentFlags {
    pub is_mapped: bool,
    pub is_duplicate: bool,
    pub is_vendor_failed: bool,
    pub is_paired: bool,
    pub is_proper_pair: bool,
    pub is_negative_strand: bool,
    pub is_first_of_pair: bool,
    pub is_second_of_pair: bool,
}

///
/// A decoded alignment record. Coordinates are 0-based, end exclusive.
///
/// `blocks` is empty when the record was not decomposed into aligned segments,
/// in which case the whole `[start, end)` span counts as covered.
///
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub chr: String,
    pub start: u32,
    pub end: u32,
    pub mapping_quality: u8,
    pub flags: AlignmentFlags,
    pub blocks: Vec<AlignmentBlock>,
    pub mate: Option<ReadMate>,
    pub inferred_insert_size: i32,
    pub pair_orientation: Option<String>,
}

impl Alignment {
    ///
    /// A mapped, unpaired, positive strand alignment with no blocks.
    ///
    pub fn new(chr: &str, start: u32, end: u32) -> Self {
        Alignment {
            chr: chr.to_string(),
            start,
            end,
            mapping_quality: 255,
            flags: AlignmentFlags {
                is_mapped: true,
                ..Default::default()
            },
            blocks: vec![],
            mate: None,
            inferred_insert_size: 0,
            pair_orientation: None,
        }
    }

    pub fn with_negative_strand(mut self) -> Self {
        self.flags.is_negative_strand = true;
        self
    }

    pub fn with_mapping_quality(mut self, mapping_quality: u8) -> Self {
        self.mapping_quality = mapping_quality;
        self
    }

    pub fn with_blocks(mut self, blocks: Vec<AlignmentBlock>) -> Self {
        self.blocks = blocks;
        self
    }

    pub fn width(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn strand(&self) -> Strand {
        Strand::from_negative(self.flags.is_negative_strand)
    }

    fn mate_strand(&self) -> Strand {
        match &self.mate {
            Some(mate) if mate.is_mapped => Strand::from_negative(mate.is_negative_strand),
            _ => Strand::None,
        }
    }

    ///
    /// Strand of the fragment this read belongs to, as seen from the chosen read of the pair.
    ///
    /// Unpaired reads report their own strand. For paired reads the strand of the selected
    /// read is used: our own if we are that read, otherwise the mate's, which is
    /// `Strand::None` when the mate is unmapped or unknown.
    ///
    pub fn fragment_strand(&self, option: StrandOption) -> Strand {
        if !self.flags.is_paired {
            return self.strand();
        }

        let we_are_selected = match option {
            StrandOption::FirstOfPair => self.flags.is_first_of_pair,
            StrandOption::SecondOfPair => self.flags.is_second_of_pair,
        };
        let mate_is_selected = match option {
            StrandOption::FirstOfPair => self.flags.is_second_of_pair,
            StrandOption::SecondOfPair => self.flags.is_first_of_pair,
        };

        if we_are_selected {
            self.strand()
        } else if mate_is_selected {
            self.mate_strand()
        } else {
            Strand::None
        }
    }

    ///
    /// True for a proper pair whose mate is mapped on the same chromosome.
    ///
    pub fn is_proper_pair_on_same_chr(&self) -> bool {
        self.flags.is_paired
            && self.flags.is_proper_pair
            && self
                .mate
                .as_ref()
                .is_some_and(|mate| mate.is_mapped && mate.chr == self.chr)
    }
}

impl Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strand = match self.strand() {
            Strand::Positive => '+',
            Strand::Negative => '-',
            Strand::None => '.',
        };
        write!(f, "{}:{}-{}({})", self.chr, self.start, self.end, strand)
    }
}

///
/// Build a pair-orientation code such as `F1R2` for a read and its mate.
///
/// The leftmost read of the fragment (positive insert size) is written first.
/// Each read contributes its strand (`F`/`R`) followed by its number in the pair.
///
pub fn pair_orientation_code(
    is_negative_strand: bool,
    mate_is_negative_strand: bool,
    is_first_of_pair: bool,
    is_second_of_pair: bool,
    inferred_insert_size: i32,
) -> String {
    let s1 = if is_negative_strand { 'R' } else { 'F' };
    let s2 = if mate_is_negative_strand { 'R' } else { 'F' };

    let (o1, o2) = if is_first_of_pair {
        ('1', '2')
    } else if is_second_of_pair {
        ('2', '1')
    } else {
        (' ', ' ')
    };

    if inferred_insert_size > 0 {
        [s1, o1, s2, o2].iter().collect()
    } else {
        [s2, o2, s1, o1].iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn paired_first() -> Alignment {
        let mut alignment = Alignment::new("chr1", 100, 150);
        alignment.flags.is_paired = true;
        alignment.flags.is_proper_pair = true;
        alignment.flags.is_first_of_pair = true;
        alignment.mate = Some(ReadMate {
            chr: "chr1".to_string(),
            start: 300,
            is_mapped: true,
            is_negative_strand: true,
        });
        alignment.inferred_insert_size = 250;
        alignment
    }

    #[rstest]
    fn test_block_base_lookup() {
        let block = AlignmentBlock::new(10, b"ACGT".to_vec());
        assert_eq!(block.end(), 14);
        assert_eq!(block.base_at(9), None);
        assert_eq!(block.base_at(10), Some(b'A'));
        assert_eq!(block.base_at(13), Some(b'T'));
        assert_eq!(block.base_at(14), None);
    }

    #[rstest]
    fn test_unpaired_fragment_strand_is_read_strand() {
        let alignment = Alignment::new("chr1", 0, 10).with_negative_strand();
        assert_eq!(
            alignment.fragment_strand(StrandOption::FirstOfPair),
            Strand::Negative
        );
        assert_eq!(
            alignment.fragment_strand(StrandOption::SecondOfPair),
            Strand::Negative
        );
    }

    #[rstest]
    fn test_paired_fragment_strand(paired_first: Alignment) {
        assert_eq!(
            paired_first.fragment_strand(StrandOption::FirstOfPair),
            Strand::Positive
        );
        // mate is the second read and sits on the negative strand
        assert_eq!(
            paired_first.fragment_strand(StrandOption::SecondOfPair),
            Strand::Negative
        );
    }

    #[rstest]
    fn test_fragment_strand_with_unmapped_mate(mut paired_first: Alignment) {
        if let Some(mate) = paired_first.mate.as_mut() {
            mate.is_mapped = false;
        }
        assert_eq!(
            paired_first.fragment_strand(StrandOption::SecondOfPair),
            Strand::None
        );
        assert!(!paired_first.is_proper_pair_on_same_chr());
    }

    #[rstest]
    fn test_proper_pair_requires_same_chromosome(mut paired_first: Alignment) {
        assert!(paired_first.is_proper_pair_on_same_chr());
        if let Some(mate) = paired_first.mate.as_mut() {
            mate.chr = "chr2".to_string();
        }
        assert!(!paired_first.is_proper_pair_on_same_chr());
    }

    #[rstest]
    #[case(false, true, true, false, 250, "F1R2")]
    #[case(true, false, false, true, -250, "F1R2")]
    #[case(true, false, true, false, 250, "R1F2")]
    #[case(false, false, true, false, 100, "F1F2")]
    #[case(true, true, false, true, -80, "R1R2")]
    fn test_pair_orientation_code(
        #[case] negative: bool,
        #[case] mate_negative: bool,
        #[case] first: bool,
        #[case] second: bool,
        #[case] isize: i32,
        #[case] expected: &str,
    ) {
        assert_eq!(
            pair_orientation_code(negative, mate_negative, first, second, isize),
            expected
        );
    }

    #[rstest]
    #[case("first", StrandOption::FirstOfPair)]
    #[case("Second-Of-Pair", StrandOption::SecondOfPair)]
    #[case("2", StrandOption::SecondOfPair)]
    fn test_parse_strand_option(#[case] input: &str, #[case] expected: StrandOption) {
        assert_eq!(input.parse::<StrandOption>().unwrap(), expected);
    }
}
