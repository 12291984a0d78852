//! variableStep wiggle output.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

///
/// Anything that accepts `(chr, start, end, value)` points, such as a wig file.
///
pub trait StepSink {
    fn add_data(&mut self, chr: &str, start: u32, end: u32, value: f32) -> io::Result<()>;

    /// Flush and release the underlying resource. Calling it again is a no-op.
    fn close(&mut self) -> io::Result<()>;
}

///
/// Stateful variableStep wig writer that tracks chromosome and span across calls.
///
/// A `variableStep chrom=<chr> span=<span>` header is written whenever the chromosome or
/// the span of the incoming point changes. Positions are written 1-based.
///
pub struct WigWriter<W: Write> {
    writer: Option<W>,
    last_chr: Option<String>,
    span: u32,
    keep_zeros: bool,
}

impl WigWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P, span: u32, keep_zeros: bool) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Ok(WigWriter::new(BufWriter::new(file), span, keep_zeros))
    }
}

impl<W: Write> WigWriter<W> {
    pub fn new(writer: W, span: u32, keep_zeros: bool) -> Self {
        WigWriter {
            writer: Some(writer),
            last_chr: None,
            span,
            keep_zeros,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }
}

impl<W: Write> StepSink for WigWriter<W> {
    fn add_data(&mut self, chr: &str, start: u32, end: u32, value: f32) -> io::Result<()> {
        if value.is_nan() || end <= start || (!self.keep_zeros && value == 0.0) {
            return Ok(());
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(io::Error::other("wig writer is already closed"));
        };

        let data_span = end - start;
        if self.last_chr.as_deref() != Some(chr) || data_span != self.span {
            self.span = data_span;
            writeln!(writer, "variableStep chrom={} span={}", chr, self.span)?;
            self.last_chr = Some(chr.to_string());
        }
        writeln!(writer, "{}\t{}", start + 1, value)
    }

    fn close(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write> Drop for WigWriter<W> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn write_points(points: &[(&str, u32, u32, f32)], keep_zeros: bool) -> String {
        let mut out = Vec::new();
        let mut writer = WigWriter::new(&mut out, 100, keep_zeros);
        for (chr, start, end, value) in points {
            writer.add_data(chr, *start, *end, *value).unwrap();
        }
        writer.close().unwrap();
        drop(writer);
        String::from_utf8(out).unwrap()
    }

    #[rstest]
    fn test_zero_values_are_suppressed() {
        let out = write_points(&[("chr1", 100, 200, 0.5), ("chr1", 100, 200, 0.0)], false);
        assert_eq!(out, "variableStep chrom=chr1 span=100\n101\t0.5\n");
    }

    #[rstest]
    fn test_zero_values_can_be_kept() {
        let out = write_points(&[("chr1", 0, 100, 0.0)], true);
        assert_eq!(out, "variableStep chrom=chr1 span=100\n1\t0\n");
    }

    #[rstest]
    fn test_nan_and_empty_regions_are_never_written() {
        let out = write_points(
            &[("chr1", 0, 100, f32::NAN), ("chr1", 50, 50, 3.0), ("chr1", 60, 40, 3.0)],
            true,
        );
        assert_eq!(out, "");
    }

    #[rstest]
    fn test_header_on_chromosome_or_span_change() {
        let out = write_points(
            &[
                ("chr1", 0, 100, 1.0),
                ("chr1", 100, 200, 2.0),
                ("chr1", 250, 251, 7.0),
                ("chr2", 250, 251, 8.0),
                ("chr2", 300, 301, 9.5),
            ],
            false,
        );
        assert_eq!(
            out,
            "variableStep chrom=chr1 span=100\n\
             1\t1\n\
             101\t2\n\
             variableStep chrom=chr1 span=1\n\
             251\t7\n\
             variableStep chrom=chr2 span=1\n\
             251\t8\n\
             301\t9.5\n"
        );
    }

    #[rstest]
    fn test_close_is_idempotent_and_final() {
        let mut out = Vec::new();
        {
            let mut writer = WigWriter::new(&mut out, 10, false);
            writer.add_data("chr1", 0, 10, 1.0).unwrap();
            writer.close().unwrap();
            assert!(writer.is_closed());
            writer.close().unwrap();
            assert!(writer.add_data("chr1", 10, 20, 1.0).is_err());
        }
        assert_eq!(out.len(), "variableStep chrom=chr1 span=10\n1\t1\n".len());
    }

    #[rstest]
    fn test_drop_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropped.wig");
        {
            let mut writer = WigWriter::create(&path, 10, false).unwrap();
            writer.add_data("chr2", 0, 10, 2.0).unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "variableStep chrom=chr2 span=10\n1\t2\n");
    }

    #[rstest]
    fn test_create_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cov.wig");
        let mut writer = WigWriter::create(&path, 25, false).unwrap();
        writer.add_data("chrX", 25, 50, 4.25).unwrap();
        writer.close().unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "variableStep chrom=chrX span=25\n26\t4.25\n");
    }
}
