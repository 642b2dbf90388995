//! Codec for chromosome-pair (HiC) read associations.
//!
//! Each source chromosome emits a `name\t<valid pair count>` header followed
//! by one `source_position\thit_chromosome\thit_position` row per pair,
//! grouped by hit chromosome in genome order but never re-sorted within a
//! group. The dataset-level read total doubles the pair sum because each
//! pair contributes both of its ends; that factor is applied by the caller.

use super::{FormatError, LineReader};
use crate::genome::Genome;
use crate::progress::SectionProgress;
use crate::project::PairBucket;
use crate::types::Location;
use std::collections::HashMap;
use std::io::{BufRead, Write};

pub(crate) fn encode<W: Write>(
    out: &mut W,
    genome: &Genome,
    source_chromosome: usize,
    buckets: &HashMap<(usize, usize), PairBucket>,
    progress: &mut SectionProgress<'_>,
) -> Result<(), FormatError> {
    let source_name = chromosome_name(genome, source_chromosome)?;

    let mut ordered: Vec<(usize, &PairBucket)> = Vec::new();
    let mut valid_pairs = 0u64;
    for hit in 0..genome.chromosome_count() {
        if let Some(bucket) = buckets.get(&(source_chromosome, hit)) {
            if bucket.source.len() != bucket.hit.len() {
                return Err(FormatError::Consistency(format!(
                    "unbalanced pair arrays for {source_name}"
                )));
            }
            valid_pairs += bucket.len() as u64;
            ordered.push((hit, bucket));
        }
    }

    writeln!(out, "{source_name}\t{valid_pairs}")?;
    for (hit, bucket) in ordered {
        let hit_name = chromosome_name(genome, hit)?;
        for k in 0..bucket.len() {
            progress.tick()?;
            writeln!(
                out,
                "{}\t{}\t{}",
                bucket.source[k].packed(),
                hit_name,
                bucket.hit[k].packed()
            )?;
        }
    }
    Ok(())
}

/// Decodes one source chromosome's block into (hit chromosome, source
/// position, hit position) rows in file order.
pub(crate) fn decode<R: BufRead>(
    lines: &mut LineReader<R>,
    genome: &Genome,
    expected_chromosome: &str,
    progress: &mut SectionProgress<'_>,
) -> Result<Vec<(usize, Location, Location)>, FormatError> {
    let header = lines.require("chromosome pair block")?;
    let fields: Vec<&str> = header.split('\t').collect();
    if fields.len() != 2 {
        return Err(lines.corrupt("malformed chromosome pair header"));
    }
    if fields[0] != expected_chromosome {
        return Err(lines.corrupt(format!(
            "expected pairs for {expected_chromosome} but found {}",
            fields[0]
        )));
    }
    let valid_pairs: u64 = fields[1]
        .parse()
        .map_err(|_| lines.corrupt("invalid pair count"))?;

    let mut rows = Vec::with_capacity(valid_pairs as usize);
    for _ in 0..valid_pairs {
        progress.tick()?;
        let line = lines.require("pair entry")?;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 3 {
            return Err(lines.corrupt("malformed pair entry"));
        }
        let source = parse_location(lines, fields[0])?;
        let hit_chromosome = genome
            .index_of(fields[1])
            .ok_or_else(|| lines.corrupt(format!("unknown hit chromosome {}", fields[1])))?;
        let hit = parse_location(lines, fields[2])?;
        rows.push((hit_chromosome, source, hit));
    }
    Ok(rows)
}

fn parse_location<R: BufRead>(
    lines: &LineReader<R>,
    field: &str,
) -> Result<Location, FormatError> {
    let packed: u64 = field
        .parse()
        .map_err(|_| lines.corrupt("invalid packed pair position"))?;
    Location::from_packed(packed)
        .ok_or_else(|| lines.corrupt("packed pair position has invalid strand bits"))
}

fn chromosome_name(genome: &Genome, index: usize) -> Result<&str, FormatError> {
    genome
        .chromosome(index)
        .map(|c| c.name.as_str())
        .ok_or_else(|| {
            FormatError::Consistency(format!("chromosome index {index} outside the genome"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressContext;
    use crate::types::Strand;
    use std::io::Cursor;
    use std::sync::Arc;

    fn test_genome() -> Arc<Genome> {
        let mut genome = Genome::new("Test", "v1");
        genome.add_chromosome("chr1", 10_000);
        genome.add_chromosome("chr2", 8_000);
        Arc::new(genome)
    }

    #[test]
    fn pairs_roundtrip_grouped_by_hit_chromosome() {
        let genome = test_genome();
        let a = Location::new(10, 60, Strand::Forward);
        let b = Location::new(700, 750, Strand::Reverse);
        let c = Location::new(20, 70, Strand::Forward);

        let mut buckets: HashMap<(usize, usize), PairBucket> = HashMap::new();
        buckets.entry((0, 1)).or_default().push(a, b);
        buckets.entry((0, 0)).or_default().push(c, a);
        buckets.entry((0, 1)).or_default().push(b, c);

        let ctx = ProgressContext::new(Vec::new());
        let mut progress = SectionProgress::new(&ctx, "test", 3);
        let mut buffer = Vec::new();
        encode(&mut buffer, &genome, 0, &buckets, &mut progress).unwrap();

        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.starts_with("chr1\t3\n"));

        let mut lines = LineReader::new(Cursor::new(buffer));
        let rows = decode(&mut lines, &genome, "chr1", &mut progress).unwrap();
        // chr1-hit rows precede chr2-hit rows; order within a group is kept.
        assert_eq!(rows, vec![(0, c, a), (1, a, b), (1, b, c)]);
    }

    #[test]
    fn empty_source_chromosome_emits_zero_header() {
        let genome = test_genome();
        let ctx = ProgressContext::new(Vec::new());
        let mut progress = SectionProgress::new(&ctx, "test", 0);
        let mut buffer = Vec::new();
        encode(&mut buffer, &genome, 1, &HashMap::new(), &mut progress).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "chr2\t0\n");
    }

    #[test]
    fn unknown_hit_chromosome_is_corrupt() {
        let genome = test_genome();
        let ctx = ProgressContext::new(Vec::new());
        let mut progress = SectionProgress::new(&ctx, "test", 1);
        let block = format!("chr1\t1\n{}\tchr9\t{}\n", 4u64 << 33, 8u64 << 33);
        let mut lines = LineReader::new(Cursor::new(block.into_bytes()));
        assert!(matches!(
            decode(&mut lines, &genome, "chr1", &mut progress),
            Err(FormatError::Corrupt(_))
        ));
    }
}
