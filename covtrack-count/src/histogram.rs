use std::collections::BTreeMap;
use std::io::{self, Write};

///
/// Occurrence counts of integer values (coverage depths).
///
/// Values below `capacity` are tallied in a dense vector; anything larger falls back to
/// an ordered map, so the key range is unbounded.
///
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    dense: Vec<u64>,
    overflow: BTreeMap<u32, u64>,
}

impl Histogram {
    pub fn new(capacity: usize) -> Self {
        Histogram {
            dense: vec![0; capacity],
            overflow: BTreeMap::new(),
        }
    }

    pub fn add_data_point(&mut self, value: u32) {
        match self.dense.get_mut(value as usize) {
            Some(count) => *count += 1,
            None => *self.overflow.entry(value).or_insert(0) += 1,
        }
    }

    pub fn count(&self, value: u32) -> u64 {
        match self.dense.get(value as usize) {
            Some(count) => *count,
            None => self.overflow.get(&value).copied().unwrap_or(0),
        }
    }

    /// Non-zero `(value, count)` pairs in ascending value order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.dense
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(value, count)| (value as u32, *count))
            .chain(self.overflow.iter().map(|(value, count)| (*value, *count)))
    }

    pub fn total(&self) -> u64 {
        self.iter().map(|(_, count)| count).sum()
    }

    /// Value with the highest count; ties go to the smaller value.
    pub fn mode(&self) -> Option<u32> {
        self.iter()
            .fold(None, |best: Option<(u32, u64)>, (value, count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((value, count)),
            })
            .map(|(value, _)| value)
    }

    ///
    /// Write one `value<TAB>count` line per observed value, ascending.
    ///
    pub fn render<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for (value, count) in self.iter() {
            writeln!(writer, "{}\t{}", value, count)?;
        }
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn test_counts_and_render_order() {
        let mut histogram = Histogram::new(10);
        for value in [3, 1, 3, 0, 12, 3, 1500, 12] {
            histogram.add_data_point(value);
        }
        assert_eq!(histogram.count(3), 3);
        assert_eq!(histogram.count(12), 2);
        assert_eq!(histogram.count(7), 0);
        assert_eq!(histogram.total(), 8);

        let mut out = Vec::new();
        histogram.render(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "0\t1\n1\t1\n3\t3\n12\t2\n1500\t1\n"
        );
    }

    #[rstest]
    fn test_mode() {
        let mut histogram = Histogram::new(1000);
        assert_eq!(histogram.mode(), None);
        for value in [4, 4, 3, 4, 3, 5] {
            histogram.add_data_point(value);
        }
        assert_eq!(histogram.mode(), Some(4));
    }

    #[rstest]
    fn test_zero_capacity_still_counts() {
        let mut histogram = Histogram::new(0);
        histogram.add_data_point(0);
        histogram.add_data_point(0);
        assert_eq!(histogram.count(0), 2);
    }
}
