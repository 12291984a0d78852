//! Fixed-width accumulator for a single genomic window.

use covtrack_core::models::Strand;

#[derive(Debug, Clone, PartialEq)]
pub struct WindowBucket {
    pub index: u32,
    pub start: u32,
    pub end: u32,
    reference: Option<Vec<u8>>,
    base_count: Vec<u32>,
    mismatch_count: Vec<u32>,
    total_count: u64,
    negative_count: u64,
    proper_pair_count: u32,
    total_insert_size: f32,
}

impl WindowBucket {
    ///
    /// Create an empty bucket covering `[start, end)`.
    ///
    /// `reference` holds the reference bases for the same range when mismatch
    /// tracking is enabled; a shorter or missing sequence means unknown reference.
    ///
    pub fn new(index: u32, start: u32, end: u32, reference: Option<Vec<u8>>) -> Self {
        let width = end.saturating_sub(start) as usize;
        WindowBucket {
            index,
            start,
            end,
            reference,
            base_count: vec![0; width],
            mismatch_count: vec![0; width],
            total_count: 0,
            negative_count: 0,
            proper_pair_count: 0,
            total_insert_size: 0.0,
        }
    }

    pub fn width(&self) -> u32 {
        self.end - self.start
    }

    ///
    /// Count one base at `position`. `base` is 0 when the read base is unknown.
    ///
    /// A mismatch is recorded only when both the observed and the reference base are
    /// known and differ, ignoring case and `N`.
    ///
    pub fn increment(&mut self, position: u32, base: u8, strand: Strand) {
        let offset = (position - self.start) as usize;

        self.base_count[offset] += 1;
        self.total_count += 1;
        if strand == Strand::Negative {
            self.negative_count += 1;
        }

        let reference_base = self
            .reference
            .as_ref()
            .and_then(|seq| seq.get(offset))
            .copied();

        if let Some(reference_base) = reference_base {
            if is_known_base(base)
                && is_known_base(reference_base)
                && !base.eq_ignore_ascii_case(&reference_base)
            {
                self.mismatch_count[offset] += 1;
            }
        }
    }

    pub fn increment_insert_size(&mut self, inferred_insert_size: i32) {
        self.proper_pair_count += 1;
        self.total_insert_size += inferred_insert_size.unsigned_abs() as f32;
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn base_counts(&self) -> &[u32] {
        &self.base_count
    }

    pub fn mismatch_counts(&self) -> &[u32] {
        &self.mismatch_count
    }

    /// Mean depth over the window: total count divided by window width.
    pub fn coverage(&self) -> f32 {
        per_base(self.total_count, self.width())
    }

    /// Mean depth over the window split into `[positive, negative]` fragment strands.
    pub fn strand_coverage(&self) -> [f32; 2] {
        let positive = self.total_count - self.negative_count;
        [
            per_base(positive, self.width()),
            per_base(self.negative_count, self.width()),
        ]
    }

    ///
    /// Highest per-position mismatch fraction in the window.
    ///
    /// Positions with no coverage contribute 0.
    ///
    pub fn max_mismatch_fraction(&self) -> f32 {
        self.base_count
            .iter()
            .zip(self.mismatch_count.iter())
            .filter(|(bases, _)| **bases > 0)
            .map(|(bases, mismatches)| *mismatches as f32 / *bases as f32)
            .fold(0.0, f32::max)
    }

    pub fn average_insert_size(&self) -> f32 {
        if self.proper_pair_count == 0 {
            0.0
        } else {
            self.total_insert_size / self.proper_pair_count as f32
        }
    }
}

fn per_base(count: u64, width: u32) -> f32 {
    if width == 0 {
        0.0
    } else {
        count as f32 / width as f32
    }
}

fn is_known_base(base: u8) -> bool {
    base != 0 && !base.eq_ignore_ascii_case(&b'N')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn bucket_with_reference() -> WindowBucket {
        WindowBucket::new(1, 10, 14, Some(b"ACGT".to_vec()))
    }

    #[rstest]
    fn test_coverage_is_normalized_by_width() {
        let mut bucket = WindowBucket::new(0, 0, 10, None);
        for _ in 0..30 {
            for pos in 0..10 {
                bucket.increment(pos, 0, Strand::Positive);
            }
        }
        assert_eq!(bucket.total_count(), 300);
        assert_eq!(bucket.coverage(), 30.0);
    }

    #[rstest]
    fn test_mismatch_counting(mut bucket_with_reference: WindowBucket) {
        bucket_with_reference.increment(10, b'A', Strand::Positive);
        bucket_with_reference.increment(11, b'T', Strand::Positive);
        bucket_with_reference.increment(11, b'c', Strand::Positive);
        bucket_with_reference.increment(12, 0, Strand::Positive);
        bucket_with_reference.increment(13, b'N', Strand::Positive);

        assert_eq!(bucket_with_reference.base_counts(), &[1, 2, 1, 1]);
        assert_eq!(bucket_with_reference.mismatch_counts(), &[0, 1, 0, 0]);
        assert_eq!(bucket_with_reference.max_mismatch_fraction(), 0.5);
    }

    #[rstest]
    fn test_mismatch_fraction_ignores_empty_positions(mut bucket_with_reference: WindowBucket) {
        assert_eq!(bucket_with_reference.max_mismatch_fraction(), 0.0);
        bucket_with_reference.increment(13, b'G', Strand::Positive);
        let fraction = bucket_with_reference.max_mismatch_fraction();
        assert_eq!(fraction, 1.0);
        assert!(fraction.is_finite());
    }

    #[rstest]
    fn test_base_count_bounds_mismatch_count(mut bucket_with_reference: WindowBucket) {
        for base in [b'T', b'T', b'G', b'A', b'C'] {
            for pos in 10..14 {
                bucket_with_reference.increment(pos, base, Strand::Positive);
            }
        }
        for (bases, mismatches) in bucket_with_reference
            .base_counts()
            .iter()
            .zip(bucket_with_reference.mismatch_counts())
        {
            assert!(bases >= mismatches);
        }
        let fraction = bucket_with_reference.max_mismatch_fraction();
        assert!((0.0..=1.0).contains(&fraction));
    }

    #[rstest]
    fn test_strand_coverage() {
        let mut bucket = WindowBucket::new(0, 0, 4, None);
        for pos in 0..4 {
            bucket.increment(pos, 0, Strand::Positive);
            bucket.increment(pos, 0, Strand::Negative);
            bucket.increment(pos, 0, Strand::Negative);
        }
        assert_eq!(bucket.strand_coverage(), [1.0, 2.0]);
        assert_eq!(bucket.coverage(), 3.0);
    }

    #[rstest]
    fn test_average_insert_size() {
        let mut bucket = WindowBucket::new(0, 0, 10, None);
        assert_eq!(bucket.average_insert_size(), 0.0);
        bucket.increment_insert_size(200);
        bucket.increment_insert_size(-300);
        assert_eq!(bucket.average_insert_size(), 250.0);
    }
}
