use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;

use crate::errors::CountError;

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum FileType {
    BAM,
    FASTA,
    SIZES,
    UNKNOWN,
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bam" => Ok(FileType::BAM),
            "fa" | "fasta" | "fna" => Ok(FileType::FASTA),
            "sizes" => Ok(FileType::SIZES),
            _ => Ok(FileType::UNKNOWN),
        }
    }
}

pub struct FileInfo {
    pub file_type: FileType,
    pub is_gzipped: bool,
}

pub fn get_file_info(path: &Path) -> FileInfo {
    let mut file_type = FileType::UNKNOWN;
    let mut is_gzipped = false;

    if let Some(filename) = path.file_name().and_then(|f| f.to_str()) {
        if let Some(base_filename) = filename.strip_suffix(".gz") {
            is_gzipped = true;
            // extension before .gz, e.g. genome.fa.gz
            if let Some(ext) = PathBuf::from(base_filename)
                .extension()
                .and_then(|e| e.to_str())
            {
                file_type = FileType::from_str(ext).unwrap_or(FileType::UNKNOWN);
            }
        } else if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            file_type = FileType::from_str(ext).unwrap_or(FileType::UNKNOWN);
        }
    }

    FileInfo {
        file_type,
        is_gzipped,
    }
}

///
/// Get a reader for either a gzip'd or non-gzip'd file.
///
/// # Arguments
///
/// - path: path to the file to read
///
pub fn get_dynamic_reader(path: &Path) -> Result<BufReader<Box<dyn Read>>> {
    let is_gzipped = path.extension() == Some(OsStr::new("gz"));
    let file = File::open(path).with_context(|| format!("Failed to open file: {:?}", path))?;
    let file: Box<dyn Read> = match is_gzipped {
        true => Box::new(MultiGzDecoder::new(file)),
        false => Box::new(file),
    };

    Ok(BufReader::new(file))
}

///
/// Parse a chrom.sizes file (`name<TAB>size`) from any reader.
///
/// Blank lines and `#` comments are ignored.
///
pub fn parse_chrom_sizes<R: BufRead>(reader: R) -> Result<HashMap<String, u32>, CountError> {
    let mut sizes = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut fields = trimmed.split_whitespace();
        let (Some(name), Some(size)) = (fields.next(), fields.next()) else {
            return Err(CountError::ChromSizesParse(format!(
                "line has fewer than 2 fields: '{}'",
                trimmed
            )));
        };
        let size: u32 = size.parse().map_err(|e| {
            CountError::ChromSizesParse(format!("cannot parse size '{}': {}", size, e))
        })?;
        sizes.insert(name.to_string(), size);
    }
    Ok(sizes)
}

///
/// Read a (possibly gzipped) chrom.sizes file from disk.
///
pub fn read_chrom_sizes<T: AsRef<Path>>(path: T) -> Result<HashMap<String, u32>, CountError> {
    let path = path.as_ref();
    let reader = get_dynamic_reader(path)
        .map_err(|e| CountError::ChromSizesParse(format!("{}: {:#}", path.display(), e)))?;
    parse_chrom_sizes(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::io::{Cursor, Write};

    #[rstest]
    #[case("sample.bam", FileType::BAM, false)]
    #[case("hg38.fa.gz", FileType::FASTA, true)]
    #[case("hg38.chrom.sizes", FileType::SIZES, false)]
    #[case("notes.txt", FileType::UNKNOWN, false)]
    fn test_get_file_info(
        #[case] name: &str,
        #[case] file_type: FileType,
        #[case] is_gzipped: bool,
    ) {
        let info = get_file_info(Path::new(name));
        assert_eq!(info.file_type, file_type);
        assert_eq!(info.is_gzipped, is_gzipped);
    }

    #[rstest]
    fn test_parse_chrom_sizes() {
        let data = "# comment\nchr1\t248956422\n\nchr2 242193529\n";
        let sizes = parse_chrom_sizes(Cursor::new(data)).unwrap();
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes["chr1"], 248956422);
        assert_eq!(sizes["chr2"], 242193529);
    }

    #[rstest]
    fn test_parse_chrom_sizes_rejects_bad_size() {
        let result = parse_chrom_sizes(Cursor::new("chr1\tlots\n"));
        assert!(matches!(result, Err(CountError::ChromSizesParse(_))));
    }

    #[rstest]
    fn test_read_gzipped_chrom_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.chrom.sizes.gz");
        let file = File::create(&path).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(b"chrX\t156040895\n").unwrap();
        encoder.finish().unwrap();

        let sizes = read_chrom_sizes(&path).unwrap();
        assert_eq!(sizes.get("chrX"), Some(&156040895));
    }
}
