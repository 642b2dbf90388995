//! Codec for the probe section: the probe array plus its per-store
//! quantitation matrix.
//!
//! The header row carries the probe count, free-text description, current
//! quantitation label and comments (newlines replaced by a backtick). Each
//! probe row lists name-or-`null`, chromosome, packed location, then one
//! value cell per quantitated sample in index order and one per quantitated
//! group in index order. A store with no value for a probe contributes no
//! cell, which is distinct from a `NaN` cell; on read, cells are consumed
//! left-to-right against the same store sequence.

use super::{decode_multiline, encode_multiline, FormatError, LineReader};
use crate::genome::Genome;
use crate::probes::{Probe, ProbeSet};
use crate::progress::{ProgressContext, SectionProgress};
use crate::project::{DataGroup, DataSet};
use std::io::{BufRead, Write};

pub(crate) fn encode<W: Write>(
    out: &mut W,
    probe_set: &ProbeSet,
    genome: &Genome,
    samples: &[DataSet],
    groups: &[DataGroup],
    ctx: &ProgressContext,
) -> Result<(), FormatError> {
    writeln!(
        out,
        "Probes\t{}\t{}\t{}\t{}",
        probe_set.probes.len(),
        probe_set.description,
        probe_set.current_quantitation,
        encode_multiline(&probe_set.comments)
    )?;

    let mut progress =
        SectionProgress::new(ctx, "Saving probes", probe_set.probes.len() as u64);
    let mut row = String::new();
    for (index, probe) in probe_set.probes.iter().enumerate() {
        progress.tick()?;
        row.clear();
        row.push_str(probe.name.as_deref().unwrap_or("null"));
        row.push('\t');
        let chromosome = genome.chromosome(probe.chromosome).ok_or_else(|| {
            FormatError::Consistency(format!(
                "probe {index} sits on chromosome index {} outside the genome",
                probe.chromosome
            ))
        })?;
        row.push_str(&chromosome.name);
        row.push('\t');
        row.push_str(&probe.location.packed().to_string());

        for sample in samples {
            push_value_cell(&mut row, sample.quantitation.as_deref(), index);
        }
        for group in groups {
            push_value_cell(&mut row, group.quantitation.as_deref(), index);
        }
        writeln!(out, "{row}")?;
    }
    Ok(())
}

fn push_value_cell(row: &mut String, quantitation: Option<&[Option<f32>]>, probe: usize) {
    if let Some(values) = quantitation {
        if let Some(Some(value)) = values.get(probe) {
            row.push('\t');
            row.push_str(&value.to_string());
        }
    }
}

pub(crate) fn decode<R: BufRead>(
    lines: &mut LineReader<R>,
    header_fields: &[&str],
    genome: &Genome,
    samples: &mut [DataSet],
    groups: &mut [DataGroup],
    ctx: &ProgressContext,
) -> Result<ProbeSet, FormatError> {
    if header_fields.len() != 5 {
        return Err(lines.corrupt("malformed probe section header"));
    }
    let count: usize = header_fields[1]
        .parse()
        .map_err(|_| lines.corrupt("invalid probe count"))?;
    let description = header_fields[2].to_string();
    let current_quantitation = header_fields[3].to_string();
    let comments = decode_multiline(header_fields[4]);

    let store_count = samples.len() + groups.len();
    let mut probes = Vec::with_capacity(count);
    let mut progress = SectionProgress::new(ctx, "Loading probes", count as u64);

    for index in 0..count {
        progress.tick()?;
        let line = lines.require("probe row")?;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            return Err(lines.corrupt("malformed probe row"));
        }

        let name = match fields[0] {
            "null" => None,
            other => Some(other.to_string()),
        };
        let chromosome = genome
            .index_of(fields[1])
            .ok_or_else(|| lines.corrupt(format!("unknown probe chromosome {}", fields[1])))?;
        let packed: u64 = fields[2]
            .parse()
            .map_err(|_| lines.corrupt("invalid packed probe position"))?;
        let location = crate::types::Location::from_packed(packed)
            .ok_or_else(|| lines.corrupt("packed probe position has invalid strand bits"))?;
        probes.push(Probe {
            name,
            chromosome,
            location,
        });

        let cells = &fields[3..];
        if cells.len() > store_count {
            return Err(lines.corrupt("probe row has more value cells than stores"));
        }
        for (slot, cell) in cells.iter().enumerate() {
            let value: f32 = cell
                .parse()
                .map_err(|_| lines.corrupt("invalid quantitation value"))?;
            let quantitation = if slot < samples.len() {
                &mut samples[slot].quantitation
            } else {
                &mut groups[slot - samples.len()].quantitation
            };
            quantitation.get_or_insert_with(|| vec![None; count])[index] = Some(value);
        }
    }

    Ok(ProbeSet::new(
        probes,
        description,
        current_quantitation,
        comments,
    ))
}
