//! Run-length codec for per-chromosome read position arrays.
//!
//! Reads arrive pre-sorted, so duplicates sit in runs. Each chromosome block
//! is a `name\t<entry count>` header followed by one line per run: the bare
//! packed value for a run of one, `value\tcount` otherwise. An empty
//! chromosome is a header with count 0 and no data lines.

use super::{FormatError, LineReader};
use crate::progress::SectionProgress;
use crate::types::Location;
use std::io::{BufRead, Write};

fn run_length(reads: &[Location], from: usize) -> usize {
    let mut n = 0;
    while from + n < reads.len() && reads[from + n] == reads[from] {
        n += 1;
    }
    n
}

pub(crate) fn encode<W: Write>(
    out: &mut W,
    chromosome: &str,
    reads: &[Location],
    progress: &mut SectionProgress<'_>,
) -> Result<(), FormatError> {
    let mut entries = 0u64;
    let mut i = 0;
    while i < reads.len() {
        entries += 1;
        i += run_length(reads, i);
    }
    writeln!(out, "{chromosome}\t{entries}")?;

    let mut i = 0;
    while i < reads.len() {
        let run = run_length(reads, i);
        if run == 0 {
            return Err(FormatError::Consistency(format!(
                "zero-length run for a read on {chromosome}"
            )));
        }
        progress.tick()?;
        if run == 1 {
            writeln!(out, "{}", reads[i].packed())?;
        } else {
            writeln!(out, "{}\t{run}", reads[i].packed())?;
        }
        i += run;
    }
    Ok(())
}

pub(crate) fn decode<R: BufRead>(
    lines: &mut LineReader<R>,
    expected_chromosome: &str,
    progress: &mut SectionProgress<'_>,
) -> Result<Vec<Location>, FormatError> {
    let header = lines.require("chromosome read block")?;
    let fields: Vec<&str> = header.split('\t').collect();
    if fields.len() != 2 {
        return Err(lines.corrupt("malformed chromosome read header"));
    }
    if fields[0] != expected_chromosome {
        return Err(lines.corrupt(format!(
            "expected reads for {expected_chromosome} but found {}",
            fields[0]
        )));
    }
    let entries: u64 = fields[1]
        .parse()
        .map_err(|_| lines.corrupt("invalid read entry count"))?;

    let mut reads = Vec::with_capacity(entries as usize);
    for _ in 0..entries {
        progress.tick()?;
        let line = lines.require("read entry")?;
        let fields: Vec<&str> = line.split('\t').collect();
        let packed: u64 = fields[0]
            .parse()
            .map_err(|_| lines.corrupt("invalid packed read position"))?;
        let location = Location::from_packed(packed)
            .ok_or_else(|| lines.corrupt("packed read position has invalid strand bits"))?;
        match fields.len() {
            1 => reads.push(location),
            2 => {
                let count: u64 = fields[1]
                    .parse()
                    .map_err(|_| lines.corrupt("invalid run length"))?;
                if count == 0 {
                    return Err(FormatError::Consistency(
                        "zero-length run in a read block".to_string(),
                    ));
                }
                reads.extend(std::iter::repeat(location).take(count as usize));
            }
            _ => return Err(lines.corrupt("malformed read entry")),
        }
    }
    Ok(reads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressContext;
    use crate::types::Strand;
    use std::io::Cursor;

    fn roundtrip(reads: Vec<Location>) -> Vec<Location> {
        let ctx = ProgressContext::new(Vec::new());
        let mut progress = SectionProgress::new(&ctx, "test", reads.len() as u64);
        let mut buffer = Vec::new();
        encode(&mut buffer, "chr1", &reads, &mut progress).unwrap();
        let mut lines = LineReader::new(Cursor::new(buffer));
        decode(&mut lines, "chr1", &mut progress).unwrap()
    }

    #[test]
    fn runs_collapse_and_expand() {
        let a = Location::new(100, 100, Strand::Forward);
        let b = Location::new(150, 150, Strand::Forward);
        let reads = vec![a, a, b];
        assert_eq!(roundtrip(reads.clone()), reads);
    }

    #[test]
    fn emitted_text_matches_expected_block() {
        let ctx = ProgressContext::new(Vec::new());
        let mut progress = SectionProgress::new(&ctx, "test", 3);
        let a = Location::new(100, 100, Strand::Forward);
        let b = Location::new(150, 150, Strand::Forward);

        let mut buffer = Vec::new();
        encode(&mut buffer, "chr1", &[a, a, b], &mut progress).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let expected = format!("chr1\t2\n{}\t2\n{}\n", a.packed(), b.packed());
        assert_eq!(text, expected);

        let mut buffer = Vec::new();
        encode(&mut buffer, "chr2", &[], &mut progress).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "chr2\t0\n");
    }

    #[test]
    fn empty_chromosome_roundtrips_empty() {
        assert!(roundtrip(Vec::new()).is_empty());
    }

    #[test]
    fn all_distinct_and_single_run_inputs() {
        let distinct: Vec<Location> = (0..5)
            .map(|i| Location::new(i * 10, i * 10 + 5, Strand::Forward))
            .collect();
        assert_eq!(roundtrip(distinct.clone()), distinct);

        let single_run = vec![Location::new(7, 7, Strand::Reverse); 4];
        assert_eq!(roundtrip(single_run.clone()), single_run);
    }

    #[test]
    fn zero_run_length_is_rejected() {
        let ctx = ProgressContext::new(Vec::new());
        let mut progress = SectionProgress::new(&ctx, "test", 1);
        let block = "chr1\t1\n42\t0\n";
        let mut lines = LineReader::new(Cursor::new(block.as_bytes()));
        assert!(matches!(
            decode(&mut lines, "chr1", &mut progress),
            Err(FormatError::Consistency(_))
        ));
    }

    #[test]
    fn chromosome_name_mismatch_is_corrupt() {
        let ctx = ProgressContext::new(Vec::new());
        let mut progress = SectionProgress::new(&ctx, "test", 1);
        let mut lines = LineReader::new(Cursor::new("chr2\t0\n".as_bytes()));
        assert!(matches!(
            decode(&mut lines, "chr1", &mut progress),
            Err(FormatError::Corrupt(_))
        ));
    }
}
