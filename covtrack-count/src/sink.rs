//! Consumers of finalized window records.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

///
/// One closed window, ready to be written out.
///
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRecord {
    pub chr: String,
    pub start: u32,
    pub end: u32,
    /// Mean depth over the window.
    pub coverage: f32,
    /// `[positive, negative]` fragment-strand depth, in strand-split mode.
    pub strand_coverage: Option<[f32; 2]>,
    /// Mean absolute insert size of proper pairs starting in the window, when tracked.
    pub mean_insert_size: Option<f32>,
}

impl WindowRecord {
    pub fn values(&self) -> Vec<f32> {
        match self.strand_coverage {
            Some(split) => split.to_vec(),
            None => vec![self.coverage],
        }
    }
}

impl Display for WindowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.chr, self.start, self.end)?;
        for value in self.values() {
            write!(f, "\t{}", value)?;
        }
        Ok(())
    }
}

///
/// The narrow contract the counting engine needs from its primary output.
///
pub trait CoverageSink {
    /// Told once, before any record, how far behind the input position records may lag.
    fn set_sort_tolerance(&mut self, _tolerance: u32) {}

    fn add_record(&mut self, record: &WindowRecord) -> io::Result<()>;

    fn set_attribute(&mut self, _key: &str, _value: &str) {}

    /// Called once after the last record.
    fn parsing_complete(&mut self) -> io::Result<()> {
        Ok(())
    }
}

///
/// Keeps every record in memory. Handy for library callers and tests.
///
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<WindowRecord>,
    pub attributes: HashMap<String, String>,
    pub sort_tolerance: Option<u32>,
    pub complete: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records_for<'a>(&'a self, chr: &'a str) -> impl Iterator<Item = &'a WindowRecord> {
        self.records.iter().filter(move |r| r.chr == chr)
    }
}

impl CoverageSink for MemorySink {
    fn set_sort_tolerance(&mut self, tolerance: u32) {
        self.sort_tolerance = Some(tolerance);
    }

    fn add_record(&mut self, record: &WindowRecord) -> io::Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn set_attribute(&mut self, key: &str, value: &str) {
        self.attributes.insert(key.to_string(), value.to_string());
    }

    fn parsing_complete(&mut self) -> io::Result<()> {
        self.complete = true;
        Ok(())
    }
}

///
/// Writes records as bedGraph lines: `chrom start end value[ value]`, 0-based half-open.
///
/// Attributes are written as `#key=value` comment lines at the end of the file.
///
pub struct BedGraphSink<W: Write> {
    writer: W,
    attributes: Vec<(String, String)>,
}

impl BedGraphSink<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Ok(BedGraphSink::new(BufWriter::new(file)))
    }
}

impl<W: Write> BedGraphSink<W> {
    pub fn new(writer: W) -> Self {
        BedGraphSink {
            writer,
            attributes: vec![],
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> CoverageSink for BedGraphSink<W> {
    fn add_record(&mut self, record: &WindowRecord) -> io::Result<()> {
        writeln!(self.writer, "{}", record)
    }

    fn set_attribute(&mut self, key: &str, value: &str) {
        self.attributes.push((key.to_string(), value.to_string()));
    }

    fn parsing_complete(&mut self) -> io::Result<()> {
        for (key, value) in &self.attributes {
            writeln!(self.writer, "#{}={}", key, value)?;
        }
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn record() -> WindowRecord {
        WindowRecord {
            chr: "chr1".to_string(),
            start: 100,
            end: 125,
            coverage: 3.5,
            strand_coverage: None,
            mean_insert_size: None,
        }
    }

    #[rstest]
    fn test_bedgraph_lines(record: WindowRecord) {
        let mut sink = BedGraphSink::new(Vec::new());
        sink.add_record(&record).unwrap();
        sink.add_record(&WindowRecord {
            strand_coverage: Some([1.5, 2.0]),
            ..record
        })
        .unwrap();
        sink.set_attribute("totalCount", "42");
        sink.parsing_complete().unwrap();

        assert_eq!(
            String::from_utf8(sink.into_inner()).unwrap(),
            "chr1\t100\t125\t3.5\nchr1\t100\t125\t1.5\t2\n#totalCount=42\n"
        );
    }

    #[rstest]
    fn test_memory_sink(record: WindowRecord) {
        let mut sink = MemorySink::new();
        sink.set_sort_tolerance(50);
        sink.add_record(&record).unwrap();
        sink.set_attribute("totalCount", "1");
        sink.parsing_complete().unwrap();

        assert_eq!(sink.sort_tolerance, Some(50));
        assert_eq!(sink.records_for("chr1").count(), 1);
        assert_eq!(sink.records_for("chr2").count(), 0);
        assert_eq!(sink.attributes["totalCount"], "1");
        assert!(sink.complete);
    }
}
