//! Reference sequence lookup used to classify mismatching bases.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use covtrack_core::utils::{get_dynamic_reader, get_file_info};

///
/// Source of reference bases for a chromosome sub-range.
///
/// The genome build is passed on every call so a source bound to one build never
/// silently answers for another.
///
pub trait ReferenceSource {
    /// Bases for `[start, end)` on `chr`, or `None` when unknown. The result may be
    /// shorter than requested near the chromosome end.
    fn read_sequence(&mut self, genome: &str, chr: &str, start: u32, end: u32) -> Option<Vec<u8>>;
}

impl<R: ReferenceSource + ?Sized> ReferenceSource for Box<R> {
    fn read_sequence(&mut self, genome: &str, chr: &str, start: u32, end: u32) -> Option<Vec<u8>> {
        (**self).read_sequence(genome, chr, start, end)
    }
}

/// A reference that knows nothing; every base is treated as unknown.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReference;

impl ReferenceSource for NoReference {
    fn read_sequence(&mut self, _genome: &str, _chr: &str, _start: u32, _end: u32) -> Option<Vec<u8>> {
        None
    }
}

fn slice_range(sequence: &[u8], start: u32, end: u32) -> Option<Vec<u8>> {
    let start = start as usize;
    if start >= sequence.len() {
        return None;
    }
    let end = (end as usize).min(sequence.len());
    Some(sequence[start..end].to_vec())
}

///
/// Whole chromosome sequences held in memory.
///
#[derive(Debug, Clone)]
pub struct MemoryReference {
    genome: String,
    sequences: HashMap<String, Vec<u8>>,
}

impl MemoryReference {
    pub fn new(genome: &str) -> Self {
        MemoryReference {
            genome: genome.to_string(),
            sequences: HashMap::new(),
        }
    }

    pub fn with_sequence(mut self, chr: &str, sequence: &[u8]) -> Self {
        self.sequences.insert(chr.to_string(), sequence.to_vec());
        self
    }
}

impl ReferenceSource for MemoryReference {
    fn read_sequence(&mut self, genome: &str, chr: &str, start: u32, end: u32) -> Option<Vec<u8>> {
        if genome != self.genome {
            return None;
        }
        self.sequences
            .get(chr)
            .and_then(|seq| slice_range(seq, start, end))
    }
}

///
/// Where one sequence lives inside an uncompressed FASTA file, as in a `.fai` index.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FaiEntry {
    length: u64,
    offset: u64,
    line_bases: u64,
    line_bytes: u64,
}

impl FaiEntry {
    /// Byte offset of base `position` (0-based).
    fn byte_offset(&self, position: u64) -> u64 {
        self.offset + position / self.line_bases * self.line_bytes + position % self.line_bases
    }
}

/// Parse a samtools `.fai` index: name, length, offset, line bases, line bytes.
fn parse_fai<R: BufRead>(reader: R) -> anyhow::Result<HashMap<String, FaiEntry>> {
    let mut index = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 5 {
            anyhow::bail!("malformed fai line: {}", line);
        }
        let entry = FaiEntry {
            length: fields[1].parse()?,
            offset: fields[2].parse()?,
            line_bases: fields[3].parse()?,
            line_bytes: fields[4].parse()?,
        };
        index.insert(fields[0].to_string(), entry);
    }
    Ok(index)
}

/// Index an uncompressed FASTA file in one pass.
fn index_fasta<R: BufRead>(mut reader: R) -> anyhow::Result<HashMap<String, FaiEntry>> {
    let mut index = HashMap::new();
    let mut current: Option<(String, FaiEntry)> = None;
    let mut position: u64 = 0;
    let mut line = Vec::new();

    loop {
        line.clear();
        let bytes_read = reader.read_until(b'\n', &mut line)?;
        if bytes_read == 0 {
            break;
        }
        position += bytes_read as u64;

        if line[0] == b'>' {
            if let Some((name, entry)) = current.take() {
                index.insert(name, entry);
            }
            let header = String::from_utf8_lossy(&line[1..]);
            let name = header.split_whitespace().next().unwrap_or_default().to_string();
            current = Some((
                name,
                FaiEntry {
                    length: 0,
                    offset: position,
                    line_bases: 0,
                    line_bytes: 0,
                },
            ));
            continue;
        }

        if let Some((_, entry)) = current.as_mut() {
            let bases = line
                .iter()
                .take_while(|b| **b != b'\n' && **b != b'\r')
                .count() as u64;
            if entry.line_bases == 0 {
                entry.line_bases = bases;
                entry.line_bytes = bytes_read as u64;
            }
            entry.length += bases;
        }
    }

    if let Some((name, entry)) = current {
        index.insert(name, entry);
    }
    Ok(index)
}

///
/// Random access into an uncompressed FASTA file through its index.
///
struct IndexedFasta {
    file: BufReader<File>,
    index: HashMap<String, FaiEntry>,
}

impl IndexedFasta {
    fn open(path: &Path) -> anyhow::Result<Self> {
        let mut fai_path = path.as_os_str().to_os_string();
        fai_path.push(".fai");
        let fai_path = PathBuf::from(fai_path);

        let index = if fai_path.exists() {
            debug!("Using index {:?}", fai_path);
            parse_fai(BufReader::new(File::open(&fai_path)?))?
        } else {
            debug!("No index next to {:?}; indexing it", path);
            index_fasta(BufReader::new(File::open(path)?))?
        };

        Ok(IndexedFasta {
            file: BufReader::new(File::open(path)?),
            index,
        })
    }

    fn contains(&self, chr: &str) -> bool {
        self.index.contains_key(chr)
    }

    fn fetch(&mut self, chr: &str, start: u32, end: u32) -> anyhow::Result<Option<Vec<u8>>> {
        let Some(entry) = self.index.get(chr).copied() else {
            return Ok(None);
        };
        let start = start as u64;
        let end = (end as u64).min(entry.length);
        if start >= end || entry.line_bases == 0 {
            return Ok(None);
        }

        let first = entry.byte_offset(start);
        let last = entry.byte_offset(end - 1);
        let mut raw = vec![0; (last - first + 1) as usize];
        self.file.seek(SeekFrom::Start(first))?;
        self.file.read_exact(&mut raw)?;
        raw.retain(|b| *b != b'\n' && *b != b'\r');
        Ok(Some(raw))
    }
}

///
/// Forward-only scan over a compressed FASTA file.
///
/// The reader only rewinds when a chromosome that was already passed is asked for
/// again, so chromosomes requested in file order cost a single pass in total.
///
struct StreamingFasta {
    path: PathBuf,
    reader: Option<BufReader<Box<dyn Read>>>,
    next_header: Option<String>,
    passed: HashSet<String>,
    /// Every sequence name, known once the file has been read to the end.
    all_names: Option<HashSet<String>>,
}

impl StreamingFasta {
    fn new(path: &Path) -> Self {
        StreamingFasta {
            path: path.to_path_buf(),
            reader: None,
            next_header: None,
            passed: HashSet::new(),
            all_names: None,
        }
    }

    fn rewind(&mut self) -> anyhow::Result<()> {
        self.reader = Some(get_dynamic_reader(&self.path)?);
        self.next_header = None;
        self.passed.clear();
        Ok(())
    }

    /// Read up to the next header line; returns the sequence read on the way.
    fn read_to_next_header(&mut self, keep: bool) -> anyhow::Result<Vec<u8>> {
        let mut sequence = Vec::new();
        let Some(reader) = self.reader.as_mut() else {
            return Ok(sequence);
        };
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                self.next_header = None;
                self.reader = None;
                if self.all_names.is_none() {
                    self.all_names = Some(self.passed.clone());
                }
                return Ok(sequence);
            }
            if let Some(header) = line.strip_prefix('>') {
                self.next_header = header.split_whitespace().next().map(str::to_string);
                return Ok(sequence);
            }
            if keep {
                sequence.extend_from_slice(line.trim_end().as_bytes());
            }
        }
    }

    fn load_chromosome(&mut self, chr: &str) -> anyhow::Result<Option<Vec<u8>>> {
        if self
            .all_names
            .as_ref()
            .is_some_and(|names| !names.contains(chr))
        {
            return Ok(None);
        }
        if self.reader.is_none() || self.passed.contains(chr) {
            self.rewind()?;
            self.read_to_next_header(false)?;
        }

        while let Some(name) = self.next_header.take() {
            self.passed.insert(name.clone());
            let is_target = name == chr;
            let sequence = self.read_to_next_header(is_target)?;
            if is_target {
                return Ok(Some(sequence));
            }
        }
        Ok(None)
    }
}

enum FastaSource {
    Indexed(IndexedFasta),
    Streaming {
        scanner: StreamingFasta,
        cached: Option<(String, Vec<u8>)>,
    },
}

///
/// FASTA file (plain or gzipped) for one genome build.
///
/// Plain files are read through a `.fai` index, taken from `<fasta>.fai` when present
/// and built in one pass otherwise, so each lookup only reads the requested range.
/// Gzipped files are scanned forward and keep the current chromosome in memory.
///
pub struct FastaReference {
    genome: String,
    path: PathBuf,
    source: Option<FastaSource>,
    failed: bool,
    missing: HashSet<String>,
    warned_genomes: HashSet<String>,
}

impl FastaReference {
    pub fn new<P: AsRef<Path>>(genome: &str, path: P) -> Self {
        FastaReference {
            genome: genome.to_string(),
            path: path.as_ref().to_path_buf(),
            source: None,
            failed: false,
            missing: HashSet::new(),
            warned_genomes: HashSet::new(),
        }
    }

    fn open_source(&self) -> anyhow::Result<FastaSource> {
        if get_file_info(&self.path).is_gzipped {
            Ok(FastaSource::Streaming {
                scanner: StreamingFasta::new(&self.path),
                cached: None,
            })
        } else {
            Ok(FastaSource::Indexed(IndexedFasta::open(&self.path)?))
        }
    }

    fn lookup(&mut self, chr: &str, start: u32, end: u32) -> anyhow::Result<Option<Vec<u8>>> {
        if self.source.is_none() {
            self.source = Some(self.open_source()?);
        }
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };

        match source {
            FastaSource::Indexed(indexed) => {
                if !indexed.contains(chr) {
                    return Ok(None);
                }
                indexed.fetch(chr, start, end)
            }
            FastaSource::Streaming { scanner, cached } => {
                let is_cached = cached.as_ref().is_some_and(|(name, _)| name == chr);
                if !is_cached {
                    match scanner.load_chromosome(chr)? {
                        Some(sequence) => {
                            debug!("Loaded {} bases of {} from {:?}", sequence.len(), chr, self.path);
                            *cached = Some((chr.to_string(), sequence));
                        }
                        None => return Ok(None),
                    }
                }
                Ok(cached
                    .as_ref()
                    .and_then(|(_, seq)| slice_range(seq, start, end)))
            }
        }
    }
}

impl ReferenceSource for FastaReference {
    fn read_sequence(&mut self, genome: &str, chr: &str, start: u32, end: u32) -> Option<Vec<u8>> {
        if genome != self.genome {
            if self.warned_genomes.insert(genome.to_string()) {
                warn!(
                    "Reference {:?} holds genome {}, not {}; mismatches will not be called",
                    self.path, self.genome, genome
                );
            }
            return None;
        }
        if self.failed || self.missing.contains(chr) {
            return None;
        }

        let had_source = self.source.is_some();
        match self.lookup(chr, start, end) {
            Ok(Some(sequence)) => Some(sequence),
            Ok(None) => {
                let known = match self.source.as_ref() {
                    Some(FastaSource::Indexed(indexed)) => indexed.contains(chr),
                    Some(FastaSource::Streaming { cached, .. }) => {
                        cached.as_ref().is_some_and(|(name, _)| name == chr)
                    }
                    None => false,
                };
                if !known {
                    warn!("Chromosome {} not found in reference {:?}", chr, self.path);
                    self.missing.insert(chr.to_string());
                }
                None
            }
            Err(e) => {
                warn!("Can't read reference {:?}: {:#}", self.path, e);
                if had_source {
                    self.missing.insert(chr.to_string());
                } else {
                    self.failed = true;
                }
                None
            }
        }
    }
}
