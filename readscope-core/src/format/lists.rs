//! Codec for the nested probe-list hierarchy.
//!
//! Two passes. The first emits every non-root list in pre-order as
//! `depth\tname\tvalue_label\tdescription\tcomments`, depth counted from the
//! implicit "All probes" root. The second walks every probe once in global
//! order and emits one membership row with, per list, that list's value cell
//! (consumed from a private cursor over the list's ordered members) or an
//! empty cell. After the walk every cursor must sit at the end of its list;
//! anything else means a list references probes outside the global array.
//!
//! Decoding rebuilds the tree purely from the depth sequence: a node at depth
//! d attaches to the most recently seen node at depth d - 1.

use super::{decode_multiline, encode_multiline, FormatError, LineReader};
use crate::probes::{ProbeList, ProbeSet};
use crate::progress::{ProgressContext, SectionProgress};
use std::io::{BufRead, Write};

pub(crate) fn encode<W: Write>(
    out: &mut W,
    probe_set: &ProbeSet,
    ctx: &ProgressContext,
) -> Result<(), FormatError> {
    let order = probe_set.preorder();
    if order.len() != probe_set.lists.len() {
        return Err(FormatError::Consistency(
            "probe list tree contains unreachable lists".to_string(),
        ));
    }

    writeln!(out, "Lists\t{}", order.len())?;
    for (depth, index) in &order {
        let list = &probe_set.lists[*index];
        writeln!(
            out,
            "{depth}\t{}\t{}\t{}\t{}",
            list.name,
            list.value_label,
            encode_multiline(&list.description),
            encode_multiline(&list.comments)
        )?;
    }

    writeln!(out, "Probes\t{}", probe_set.probes.len())?;
    let mut progress = SectionProgress::new(
        ctx,
        "Saving probe lists",
        probe_set.probes.len() as u64,
    );
    let mut cursors = vec![0usize; order.len()];
    let mut row = String::new();
    for (probe_index, probe) in probe_set.probes.iter().enumerate() {
        progress.tick()?;
        row.clear();
        row.push_str(probe.name.as_deref().unwrap_or("null"));
        for (slot, (_, list_index)) in order.iter().enumerate() {
            let list = &probe_set.lists[*list_index];
            row.push('\t');
            let cursor = cursors[slot];
            if cursor < list.members.len() && list.members[cursor].0 == probe_index {
                match list.members[cursor].1 {
                    Some(value) => row.push_str(&value.to_string()),
                    None => row.push_str("null"),
                }
                cursors[slot] += 1;
            }
        }
        writeln!(out, "{row}")?;
    }

    for (slot, (_, list_index)) in order.iter().enumerate() {
        let list = &probe_set.lists[*list_index];
        if cursors[slot] != list.members.len() {
            return Err(FormatError::Consistency(format!(
                "probe list '{}' references probes outside the probe set",
                list.name
            )));
        }
    }
    Ok(())
}

pub(crate) fn decode<R: BufRead>(
    lines: &mut LineReader<R>,
    header_fields: &[&str],
    probe_set: &mut ProbeSet,
    ctx: &ProgressContext,
) -> Result<(), FormatError> {
    if !probe_set.lists.is_empty() {
        return Err(lines.corrupt("duplicate probe list section"));
    }
    if header_fields.len() != 2 {
        return Err(lines.corrupt("malformed list section header"));
    }
    let count: usize = header_fields[1]
        .parse()
        .map_err(|_| lines.corrupt("invalid list count"))?;

    // Column slot -> arena index, plus the depth stack for tree rebuild.
    let mut slots = Vec::with_capacity(count);
    let mut stack: Vec<(usize, usize)> = Vec::new();
    for _ in 0..count {
        let line = lines.require("list definition")?;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 5 {
            return Err(lines.corrupt("malformed list definition"));
        }
        let depth: usize = fields[0]
            .parse()
            .map_err(|_| lines.corrupt("invalid list depth"))?;
        if depth == 0 {
            return Err(lines.corrupt("list depth of zero"));
        }
        while stack.last().is_some_and(|(d, _)| *d >= depth) {
            stack.pop();
        }
        let parent = if depth == 1 {
            None
        } else {
            match stack.last() {
                Some((d, index)) if *d == depth - 1 => Some(*index),
                _ => return Err(lines.corrupt("list depth skips a level")),
            }
        };

        let index = probe_set.lists.len();
        probe_set.lists.push(ProbeList {
            name: fields[1].to_string(),
            value_label: fields[2].to_string(),
            description: decode_multiline(fields[3]),
            comments: decode_multiline(fields[4]),
            parent,
            members: Vec::new(),
        });
        stack.push((depth, index));
        slots.push(index);
    }

    let probes_header = lines.require("list membership header")?;
    let fields: Vec<&str> = probes_header.split('\t').collect();
    if fields.len() != 2 || fields[0] != "Probes" {
        return Err(lines.corrupt("expected probe membership header"));
    }
    let rows: usize = fields[1]
        .parse()
        .map_err(|_| lines.corrupt("invalid membership row count"))?;
    if rows != probe_set.probes.len() {
        return Err(lines.corrupt(format!(
            "membership rows cover {rows} probes but the probe set holds {}",
            probe_set.probes.len()
        )));
    }

    let mut progress = SectionProgress::new(ctx, "Loading probe lists", rows as u64);
    for probe_index in 0..rows {
        progress.tick()?;
        let line = lines.require("membership row")?;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() - 1 > count {
            return Err(lines.corrupt("membership row has more cells than lists"));
        }
        for (slot, cell) in fields[1..].iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            let value = if *cell == "null" {
                None
            } else {
                Some(
                    cell.parse::<f32>()
                        .map_err(|_| lines.corrupt("invalid list value"))?,
                )
            };
            probe_set.lists[slots[slot]].members.push((probe_index, value));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::Probe;
    use crate::types::{Location, Strand};
    use std::io::Cursor;

    fn probe_set(probe_count: u32) -> ProbeSet {
        let probes = (0..probe_count)
            .map(|i| Probe {
                name: Some(format!("p{i}")),
                chromosome: 0,
                location: Location::new(i * 100, i * 100 + 50, Strand::Unknown),
            })
            .collect();
        ProbeSet::new(probes, "windows", "raw", "")
    }

    fn roundtrip(set: &ProbeSet) -> ProbeSet {
        let ctx = ProgressContext::new(Vec::new());
        let mut buffer = Vec::new();
        encode(&mut buffer, set, &ctx).unwrap();

        let text = String::from_utf8(buffer.clone()).unwrap();
        let header = text.lines().next().unwrap().to_string();
        let header_fields: Vec<&str> = header.split('\t').collect();

        let mut decoded = ProbeSet::new(set.probes.clone(), "windows", "raw", "");
        let mut lines = LineReader::new(Cursor::new(buffer));
        lines.require("header").unwrap();
        decode(&mut lines, &header_fields, &mut decoded, &ctx).unwrap();
        decoded
    }

    #[test]
    fn nested_tree_and_memberships_roundtrip() {
        let mut set = probe_set(4);
        let top = set.add_list(None, "peaks", "p-value", "macs peaks");
        let child = set.add_list(Some(top), "strong", "p-value", "");
        let sibling = set.add_list(None, "background", "score", "");

        set.lists[top].members = vec![(0, Some(0.01)), (2, Some(0.2)), (3, None)];
        set.lists[child].members = vec![(2, Some(0.001))];
        set.lists[sibling].members = vec![(1, None)];
        set.lists[sibling].comments = "two\nlines".to_string();

        let decoded = roundtrip(&set);
        assert_eq!(decoded.lists.len(), 3);
        assert_eq!(decoded.lists[top].parent, None);
        assert_eq!(decoded.lists[child].parent, Some(top));
        assert_eq!(decoded.lists[sibling].parent, None);
        assert_eq!(decoded.lists[top].members, set.lists[top].members);
        assert_eq!(decoded.lists[child].members, set.lists[child].members);
        assert_eq!(decoded.lists[sibling].comments, "two\nlines");
    }

    #[test]
    fn deep_chain_rebuilds_from_depths_alone() {
        let mut set = probe_set(1);
        let mut parent = None;
        for name in ["a", "b", "c", "d"] {
            parent = Some(set.add_list(parent, name, "v", ""));
        }
        let decoded = roundtrip(&set);
        assert_eq!(decoded.lists[3].parent, Some(2));
        assert_eq!(decoded.lists[2].parent, Some(1));
        assert_eq!(decoded.lists[0].parent, None);
    }

    #[test]
    fn unconsumed_cursor_fails_fast() {
        let mut set = probe_set(2);
        let list = set.add_list(None, "bad", "v", "");
        // Member index 9 never appears in the global probe walk.
        set.lists[list].members = vec![(0, None), (9, Some(1.0))];

        let ctx = ProgressContext::new(Vec::new());
        let mut buffer = Vec::new();
        assert!(matches!(
            encode(&mut buffer, &set, &ctx),
            Err(FormatError::Consistency(_))
        ));
    }

    #[test]
    fn depth_skip_is_corrupt() {
        let ctx = ProgressContext::new(Vec::new());
        let block = "1\ta\tv\t\t\n3\tb\tv\t\t\nProbes\t0\n";
        let mut set = probe_set(0);
        let mut lines = LineReader::new(Cursor::new(block.as_bytes()));
        assert!(matches!(
            decode(&mut lines, &["Lists", "2"], &mut set, &ctx),
            Err(FormatError::Corrupt(_))
        ));
    }
}
