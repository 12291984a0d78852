use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::Path;

use noodles::bam;
use noodles::bgzf;
use noodles::sam;
use noodles::sam::alignment::record::cigar::op::Kind;

use covtrack_core::errors::{CountError, Result};
use covtrack_core::models::{
    Alignment, AlignmentBlock, AlignmentFlags, ReadMate, pair_orientation_code,
};

/// Mapping quality reported when a record carries none.
const MISSING_MAPPING_QUALITY: u8 = 255;

///
/// Chromosome lengths declared in a BAM header.
///
pub fn header_chrom_sizes(header: &sam::Header) -> HashMap<String, u32> {
    header
        .reference_sequences()
        .iter()
        .map(|(name, reference_sequence)| {
            let length = u32::try_from(reference_sequence.length().get()).unwrap_or(u32::MAX);
            (name.to_string(), length)
        })
        .collect()
}

fn reference_name(header: &sam::Header, id: usize) -> Result<String> {
    header
        .reference_sequences()
        .get_index(id)
        .map(|(name, _)| name.to_string())
        .ok_or_else(|| {
            CountError::SkippableRecord(format!("reference sequence id {} is not in the header", id))
        })
}

fn skippable(e: io::Error) -> CountError {
    CountError::SkippableRecord(e.to_string())
}

///
/// Walk the CIGAR and cut the read into gapless aligned blocks.
///
/// Returns the blocks and the exclusive reference end of the alignment.
///
fn aligned_blocks(record: &bam::Record, start: u32) -> Result<(Vec<AlignmentBlock>, u32)> {
    let sequence: Vec<u8> = record.sequence().iter().collect();

    let mut blocks = vec![];
    let mut reference_position = start;
    let mut read_position = 0usize;

    for op in record.cigar().iter() {
        let op = op.map_err(skippable)?;
        let len = op.len();

        match op.kind() {
            Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch => {
                let bases = match sequence.get(read_position..read_position + len) {
                    Some(bases) => bases.to_vec(),
                    // no stored sequence (`*`): every base is unknown
                    None => vec![0; len],
                };
                blocks.push(AlignmentBlock::new(reference_position, bases));
                reference_position += len as u32;
                read_position += len;
            }
            Kind::Insertion | Kind::SoftClip => read_position += len,
            Kind::Deletion | Kind::Skip => reference_position += len as u32,
            Kind::HardClip | Kind::Pad => {}
        }
    }

    Ok((blocks, reference_position))
}

///
/// Decode one BAM record into an [`Alignment`].
///
/// Unplaced records come back unmapped with an empty chromosome, so the counter
/// filters them like any other unmapped read.
///
pub fn to_alignment(record: &bam::Record, header: &sam::Header) -> Result<Alignment> {
    let flags = record.flags();

    let alignment_flags = AlignmentFlags {
        is_mapped: !flags.is_unmapped(),
        is_duplicate: flags.is_duplicate(),
        is_vendor_failed: flags.is_qc_fail(),
        is_paired: flags.is_segmented(),
        is_proper_pair: flags.is_properly_segmented(),
        is_negative_strand: flags.is_reverse_complemented(),
        is_first_of_pair: flags.is_first_segment(),
        is_second_of_pair: flags.is_last_segment(),
    };

    let (chr, start) = match (record.reference_sequence_id(), record.alignment_start()) {
        (Some(id), Some(position)) => {
            let id = id.map_err(skippable)?;
            let position = position.map_err(skippable)?;
            (reference_name(header, id)?, (position.get() - 1) as u32)
        }
        _ => {
            let mut alignment = Alignment::new("", 0, 0);
            alignment.flags = AlignmentFlags {
                is_mapped: false,
                ..alignment_flags
            };
            return Ok(alignment);
        }
    };

    let (blocks, end) = aligned_blocks(record, start)?;

    let mate = if flags.is_segmented() {
        match (record.mate_reference_sequence_id(), record.mate_alignment_start()) {
            (Some(id), Some(position)) => Some(ReadMate {
                chr: reference_name(header, id.map_err(skippable)?)?,
                start: (position.map_err(skippable)?.get() - 1) as u32,
                is_mapped: !flags.is_mate_unmapped(),
                is_negative_strand: flags.is_mate_reverse_complemented(),
            }),
            _ => None,
        }
    } else {
        None
    };

    let inferred_insert_size = record.template_length();

    let pair_orientation = mate
        .as_ref()
        .filter(|mate| mate.is_mapped && !flags.is_unmapped())
        .map(|mate| {
            pair_orientation_code(
                flags.is_reverse_complemented(),
                mate.is_negative_strand,
                flags.is_first_segment(),
                flags.is_last_segment(),
                inferred_insert_size,
            )
        });

    Ok(Alignment {
        chr,
        start,
        end: end.max(start),
        mapping_quality: record
            .mapping_quality()
            .map(|q| q.get())
            .unwrap_or(MISSING_MAPPING_QUALITY),
        flags: alignment_flags,
        blocks,
        mate,
        inferred_insert_size,
        pair_orientation,
    })
}

///
/// Streams alignments out of a BAM file one record at a time.
///
/// A read failure of the underlying file ends the stream with a fatal error; a record
/// that cannot be decoded yields a skippable error and the stream carries on.
///
pub struct BamAlignments {
    path: String,
    reader: bam::io::Reader<bgzf::Reader<File>>,
    header: sam::Header,
    record: bam::Record,
    done: bool,
}

impl BamAlignments {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let fatal = |e: io::Error| CountError::FatalInput {
            path: display.clone(),
            reason: e.to_string(),
        };

        let file = File::open(path).map_err(fatal)?;
        let mut reader = bam::io::reader::Builder::default().build_from_reader(file);
        let header = reader.read_header().map_err(fatal)?;

        Ok(BamAlignments {
            path: display,
            reader,
            header,
            record: bam::Record::default(),
            done: false,
        })
    }

    pub fn chrom_sizes(&self) -> HashMap<String, u32> {
        header_chrom_sizes(&self.header)
    }
}

impl Iterator for BamAlignments {
    type Item = Result<Alignment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.reader.read_record(&mut self.record) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => Some(to_alignment(&self.record, &self.header)),
            Err(e) => {
                self.done = true;
                Some(Err(CountError::FatalInput {
                    path: self.path.clone(),
                    reason: e.to_string(),
                }))
            }
        }
    }
}
