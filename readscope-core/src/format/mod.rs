//! The project file format.
//!
//! A project is one tab-separated text file (optionally gzipped) written in a
//! fixed section order: version tag, genome, samples with their per-chromosome
//! read blocks, groups, replicate sets, annotation sets, the probe matrix,
//! visible stores, probe lists and display preferences. Cross-references
//! between sections are positional indices resolved through session-scoped
//! index tables, never names.

mod index;
mod lists;
mod matrix;
mod paired;
mod rle;

use crate::display::{DisplayPrefs, ReadDensity, ScaleMode};
use crate::genome::GenomeStore;
use crate::progress::{ProgressContext, SectionProgress};
use crate::project::{
    AnnotationSet, Feature, Project, ReadData, ReplicateMember, StoreRef,
};
use crate::types::{Location, Strand, MAX_POSITION};
use index::IndexTable;
use serde::Serialize;
use std::io::{BufRead, Write};
use std::sync::Arc;
use thiserror::Error;

/// Current project data version. Readers accept anything up to and including
/// this value and reject newer files outright.
pub const PROJECT_DATA_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("project data version {0} is newer than this build understands")]
    UnsupportedVersion(u32),

    #[error("corrupted project file: {0}")]
    Corrupt(String),

    #[error("internal consistency failure: {0}")]
    Consistency(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// Everything a project file reconstructs.
#[derive(Debug, PartialEq)]
pub struct LoadedProject {
    pub project: Project,
    pub prefs: DisplayPrefs,
}

/// Section counts for a project, used by reporting callers.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub species: String,
    pub assembly: String,
    pub samples: usize,
    pub hic_samples: usize,
    pub total_reads: u64,
    pub groups: usize,
    pub replicate_sets: usize,
    pub annotation_sets: usize,
    pub features: usize,
    pub probes: usize,
    pub probe_lists: usize,
    pub visible_stores: usize,
}

impl ProjectSummary {
    pub fn of(project: &Project) -> Self {
        Self {
            species: project.genome.species().to_string(),
            assembly: project.genome.assembly().to_string(),
            samples: project.samples.len(),
            hic_samples: project.samples.iter().filter(|s| s.is_hic()).count(),
            total_reads: project.total_read_count(),
            groups: project.groups.len(),
            replicate_sets: project.replicate_sets.len(),
            annotation_sets: project.annotation_sets.len(),
            features: project
                .annotation_sets
                .iter()
                .map(|a| a.features.len())
                .sum(),
            probes: project.probe_set.as_ref().map_or(0, |p| p.probes.len()),
            probe_lists: project.probe_set.as_ref().map_or(0, |p| p.lists.len()),
            visible_stores: project.visible_stores.len(),
        }
    }
}

/// Newlines inside free-text fields are carried as backticks so the field
/// stays on one line.
pub(crate) fn encode_multiline(text: &str) -> String {
    text.replace('\n', "`")
}

pub(crate) fn decode_multiline(field: &str) -> String {
    field.replace('`', "\n")
}

/// Line-oriented reader that tracks the current line number for error
/// context.
pub(crate) struct LineReader<R> {
    inner: R,
    line_no: u64,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, line_no: 0 }
    }

    pub fn next(&mut self) -> Result<Option<String>, FormatError> {
        let mut buffer = String::new();
        if self.inner.read_line(&mut buffer)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        while buffer.ends_with('\n') || buffer.ends_with('\r') {
            buffer.pop();
        }
        Ok(Some(buffer))
    }

    pub fn require(&mut self, what: &str) -> Result<String, FormatError> {
        self.next()?.ok_or_else(|| {
            FormatError::Corrupt(format!(
                "unexpected end of file while reading {what} (after line {})",
                self.line_no
            ))
        })
    }

    pub fn corrupt(&self, message: impl AsRef<str>) -> FormatError {
        FormatError::Corrupt(format!("line {}: {}", self.line_no, message.as_ref()))
    }
}

fn format_feature_location(location: Location) -> String {
    match location.strand() {
        Strand::Reverse => format!("complement({}..{})", location.start(), location.end()),
        _ => format!("{}..{}", location.start(), location.end()),
    }
}

fn parse_feature_location<R: BufRead>(
    lines: &LineReader<R>,
    field: &str,
) -> Result<Location, FormatError> {
    let (body, strand) = match field
        .strip_prefix("complement(")
        .and_then(|s| s.strip_suffix(')'))
    {
        Some(inner) => (inner, Strand::Reverse),
        None => (field, Strand::Forward),
    };
    let (start, end) = body
        .split_once("..")
        .ok_or_else(|| lines.corrupt(format!("malformed feature location '{field}'")))?;
    let start: u32 = start
        .parse()
        .map_err(|_| lines.corrupt("invalid feature start"))?;
    let end: u32 = end
        .parse()
        .map_err(|_| lines.corrupt("invalid feature end"))?;
    if start > MAX_POSITION || end > MAX_POSITION {
        return Err(lines.corrupt("feature position out of range"));
    }
    Ok(Location::new(start, end, strand))
}

/// Serializes one project graph in the fixed section order. Index tables are
/// built from the same iteration order the sections below walk, which is what
/// keeps every emitted index resolvable on the way back in.
pub struct ProjectWriter<'a> {
    project: &'a Project,
    prefs: &'a DisplayPrefs,
    ctx: &'a ProgressContext,
    samples: IndexTable,
    groups: IndexTable,
    replicate_sets: IndexTable,
}

impl<'a> ProjectWriter<'a> {
    pub fn new(project: &'a Project, prefs: &'a DisplayPrefs, ctx: &'a ProgressContext) -> Self {
        Self {
            project,
            prefs,
            ctx,
            samples: IndexTable::build(project.samples.iter().map(|s| s.id)),
            groups: IndexTable::build(project.groups.iter().map(|g| g.id)),
            replicate_sets: IndexTable::build(project.replicate_sets.iter().map(|r| r.id)),
        }
    }

    pub fn write<W: Write>(&self, out: &mut W) -> Result<(), FormatError> {
        writeln!(out, "Project Data Version\t{PROJECT_DATA_VERSION}")?;
        self.write_genome(out)?;
        self.write_samples(out)?;
        self.write_groups(out)?;
        self.write_replicate_sets(out)?;
        self.write_annotations(out)?;
        if let Some(probe_set) = &self.project.probe_set {
            matrix::encode(
                out,
                probe_set,
                &self.project.genome,
                &self.project.samples,
                &self.project.groups,
                self.ctx,
            )?;
        }
        self.write_visible_stores(out)?;
        if let Some(probe_set) = &self.project.probe_set {
            if !probe_set.lists.is_empty() {
                lists::encode(out, probe_set, self.ctx)?;
            }
        }
        self.write_display(out)?;
        Ok(())
    }

    fn write_genome<W: Write>(&self, out: &mut W) -> Result<(), FormatError> {
        let genome = &self.project.genome;
        writeln!(out, "Genome\t{}\t{}", genome.species(), genome.assembly())?;
        if !self.project.visible_feature_types.is_empty() {
            writeln!(
                out,
                "Features\t{}",
                self.project.visible_feature_types.len()
            )?;
            for name in &self.project.visible_feature_types {
                writeln!(out, "{name}")?;
            }
        }
        Ok(())
    }

    fn write_samples<W: Write>(&self, out: &mut W) -> Result<(), FormatError> {
        let genome = &self.project.genome;
        writeln!(out, "Samples\t{}", self.project.samples.len())?;
        for sample in &self.project.samples {
            writeln!(
                out,
                "{}\t{}\t{}",
                sample.name,
                sample.source_file,
                if sample.is_hic() { "HiC" } else { "" }
            )?;
        }
        for sample in &self.project.samples {
            let total = sample.total_read_count();
            writeln!(out, "{}\t{total}", sample.name)?;
            let mut progress = SectionProgress::new(
                self.ctx,
                format!("Saving reads for {}", sample.name),
                total,
            );
            for (chr_index, chromosome) in genome.chromosomes().iter().enumerate() {
                match &sample.reads {
                    ReadData::Single(_) => rle::encode(
                        out,
                        &chromosome.name,
                        sample.reads_for(chr_index),
                        &mut progress,
                    )?,
                    ReadData::Paired(buckets) => {
                        paired::encode(out, genome, chr_index, buckets, &mut progress)?
                    }
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }

    fn write_groups<W: Write>(&self, out: &mut W) -> Result<(), FormatError> {
        writeln!(out, "Data Groups\t{}", self.project.groups.len())?;
        for group in &self.project.groups {
            let mut line = group.name.clone();
            for member in &group.members {
                line.push('\t');
                line.push_str(&self.samples.index_of(*member)?.to_string());
            }
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    fn write_replicate_sets<W: Write>(&self, out: &mut W) -> Result<(), FormatError> {
        writeln!(out, "Replicate Sets\t{}", self.project.replicate_sets.len())?;
        for set in &self.project.replicate_sets {
            let mut line = set.name.clone();
            for member in &set.members {
                line.push('\t');
                match member {
                    ReplicateMember::Sample(id) => {
                        line.push('s');
                        line.push_str(&self.samples.index_of(*id)?.to_string());
                    }
                    ReplicateMember::Group(id) => {
                        line.push('g');
                        line.push_str(&self.groups.index_of(*id)?.to_string());
                    }
                }
            }
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    fn write_annotations<W: Write>(&self, out: &mut W) -> Result<(), FormatError> {
        let genome = &self.project.genome;
        for set in &self.project.annotation_sets {
            writeln!(out, "Annotation\t{}\t{}", set.name, set.features.len())?;
            let mut progress = SectionProgress::new(
                self.ctx,
                format!("Saving features for {}", set.name),
                set.features.len() as u64,
            );
            for feature in &set.features {
                progress.tick()?;
                let chromosome = genome.chromosome(feature.chromosome).ok_or_else(|| {
                    FormatError::Consistency(format!(
                        "feature on chromosome index {} outside the genome",
                        feature.chromosome
                    ))
                })?;
                let mut line = format!(
                    "{}\t{}\t{}",
                    feature.feature_type,
                    chromosome.name,
                    format_feature_location(feature.location)
                );
                for (tag, value) in &feature.tags {
                    line.push('\t');
                    line.push_str(tag);
                    line.push('\t');
                    line.push_str(value);
                }
                writeln!(out, "{line}")?;
            }
        }
        Ok(())
    }

    fn write_visible_stores<W: Write>(&self, out: &mut W) -> Result<(), FormatError> {
        writeln!(out, "Visible Stores\t{}", self.project.visible_stores.len())?;
        for store in &self.project.visible_stores {
            let (index, kind) = match store {
                StoreRef::Sample(id) => (self.samples.index_of(*id)?, "set"),
                StoreRef::Group(id) => (self.groups.index_of(*id)?, "group"),
                StoreRef::ReplicateSet(id) => (self.replicate_sets.index_of(*id)?, "replicate"),
            };
            writeln!(out, "{index}\t{kind}")?;
        }
        Ok(())
    }

    fn write_display<W: Write>(&self, out: &mut W) -> Result<(), FormatError> {
        let prefs = self.prefs;
        let entries = [
            ("DataZoom", prefs.data_zoom.to_string()),
            ("ScaleMode", prefs.scale_mode.as_str().to_string()),
            ("ReadDensity", prefs.read_density.as_str().to_string()),
            ("Gradient", prefs.gradient.clone()),
            ("ReplicateExpansion", prefs.expand_replicates.to_string()),
        ];
        writeln!(out, "Display Preferences\t{}", entries.len())?;
        for (key, value) in entries {
            writeln!(out, "{key}\t{value}")?;
        }
        Ok(())
    }
}

/// Rebuilds a project graph by dispatching on section tags. Sections arrive
/// in write order; cross-references are resolved positionally against the
/// collections read so far.
pub struct ProjectReader<'a> {
    genomes: &'a dyn GenomeStore,
    ctx: &'a ProgressContext,
}

impl<'a> ProjectReader<'a> {
    pub fn new(genomes: &'a dyn GenomeStore, ctx: &'a ProgressContext) -> Self {
        Self { genomes, ctx }
    }

    pub fn read<R: BufRead>(&self, input: R) -> Result<LoadedProject, FormatError> {
        let mut lines = LineReader::new(input);

        let header = lines.require("project header")?;
        let fields: Vec<&str> = header.split('\t').collect();
        if fields.len() != 2 || fields[0] != "Project Data Version" {
            return Err(lines.corrupt("not a project file"));
        }
        let version: u32 = fields[1]
            .parse()
            .map_err(|_| lines.corrupt("invalid data version"))?;
        if version > PROJECT_DATA_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }
        if version == 0 {
            return Err(lines.corrupt("invalid data version"));
        }

        let mut project: Option<Project> = None;
        let mut prefs = DisplayPrefs::default();

        while let Some(line) = lines.next()? {
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            match fields[0] {
                "Genome" => {
                    if project.is_some() {
                        return Err(lines.corrupt("duplicate Genome section"));
                    }
                    if fields.len() != 3 {
                        return Err(lines.corrupt("malformed Genome section"));
                    }
                    self.ctx.updated("Loading genome", 0, 1);
                    let genome = self.genomes.resolve(fields[1], fields[2])?;
                    project = Some(Project::new(genome));
                }
                "Features" => {
                    let project = required(&mut project, &lines)?;
                    let count = section_count(&lines, &fields)?;
                    for _ in 0..count {
                        let name = lines.require("feature type name")?;
                        project.visible_feature_types.push(name);
                    }
                }
                "Samples" => {
                    let project = required(&mut project, &lines)?;
                    self.read_samples(&mut lines, project, &fields)?;
                }
                "Data Groups" => {
                    let project = required(&mut project, &lines)?;
                    self.read_groups(&mut lines, project, &fields)?;
                }
                "Replicate Sets" => {
                    let project = required(&mut project, &lines)?;
                    self.read_replicate_sets(&mut lines, project, &fields)?;
                }
                "Annotation" => {
                    let project = required(&mut project, &lines)?;
                    self.read_annotation(&mut lines, project, &fields)?;
                }
                "Probes" => {
                    let project = required(&mut project, &lines)?;
                    if project.probe_set.is_some() {
                        return Err(lines.corrupt("duplicate probe section"));
                    }
                    let genome = Arc::clone(&project.genome);
                    let probe_set = matrix::decode(
                        &mut lines,
                        &fields,
                        &genome,
                        &mut project.samples,
                        &mut project.groups,
                        self.ctx,
                    )?;
                    project.probe_set = Some(probe_set);
                }
                "Visible Stores" => {
                    let project = required(&mut project, &lines)?;
                    self.read_visible_stores(&mut lines, project, &fields)?;
                }
                "Lists" => {
                    let project = required(&mut project, &lines)?;
                    let probe_set = project
                        .probe_set
                        .as_mut()
                        .ok_or_else(|| lines.corrupt("probe lists without a probe section"))?;
                    lists::decode(&mut lines, &fields, probe_set, self.ctx)?;
                }
                "Display Preferences" => {
                    self.read_display(&mut lines, &mut prefs, &fields)?;
                }
                tag => {
                    return Err(lines.corrupt(format!("unrecognized section '{tag}'")));
                }
            }
        }

        let project = project
            .ok_or_else(|| FormatError::Corrupt("project file has no Genome section".into()))?;
        Ok(LoadedProject { project, prefs })
    }

    fn read_samples<R: BufRead>(
        &self,
        lines: &mut LineReader<R>,
        project: &mut Project,
        fields: &[&str],
    ) -> Result<(), FormatError> {
        if !project.samples.is_empty() {
            return Err(lines.corrupt("duplicate Samples section"));
        }
        let count = section_count(lines, fields)?;
        for _ in 0..count {
            let line = lines.require("sample header")?;
            let f: Vec<&str> = line.split('\t').collect();
            if f.len() < 2 || f.len() > 3 {
                return Err(lines.corrupt("malformed sample header"));
            }
            let hic = f.get(2).copied() == Some("HiC");
            project.add_sample(f[0], f[1], hic);
        }

        let genome = Arc::clone(&project.genome);
        for i in 0..count {
            let header = lines.require("sample data header")?;
            let f: Vec<&str> = header.split('\t').collect();
            if f.len() != 2 {
                return Err(lines.corrupt("malformed sample data header"));
            }
            if f[0] != project.samples[i].name {
                return Err(lines.corrupt(format!(
                    "sample data out of order: expected {} but found {}",
                    project.samples[i].name, f[0]
                )));
            }
            let declared: u64 = f[1]
                .parse()
                .map_err(|_| lines.corrupt("invalid sample read count"))?;

            let mut progress = SectionProgress::new(
                self.ctx,
                format!("Loading reads for {}", project.samples[i].name),
                declared,
            );
            let hic = project.samples[i].is_hic();
            for (chr_index, chromosome) in genome.chromosomes().iter().enumerate() {
                if hic {
                    let rows = paired::decode(lines, &genome, &chromosome.name, &mut progress)?;
                    let sample = &mut project.samples[i];
                    for (hit_chromosome, source, hit) in rows {
                        sample.add_pair(chr_index, hit_chromosome, source, hit);
                    }
                } else {
                    let reads = rle::decode(lines, &chromosome.name, &mut progress)?;
                    if !reads.is_empty() {
                        if let ReadData::Single(map) = &mut project.samples[i].reads {
                            map.insert(chr_index, reads);
                        }
                    }
                }
            }

            let actual = project.samples[i].total_read_count();
            if actual != declared {
                return Err(FormatError::Consistency(format!(
                    "read count for {} is {actual} but its header declared {declared}",
                    project.samples[i].name
                )));
            }
            match lines.next()? {
                Some(l) if l.is_empty() => {}
                Some(_) => return Err(lines.corrupt("expected a blank line after sample data")),
                None => return Err(lines.corrupt("unexpected end of file inside sample data")),
            }
        }
        Ok(())
    }

    fn read_groups<R: BufRead>(
        &self,
        lines: &mut LineReader<R>,
        project: &mut Project,
        fields: &[&str],
    ) -> Result<(), FormatError> {
        if !project.groups.is_empty() {
            return Err(lines.corrupt("duplicate Data Groups section"));
        }
        let count = section_count(lines, fields)?;
        for _ in 0..count {
            let line = lines.require("group definition")?;
            let f: Vec<&str> = line.split('\t').collect();
            let mut members = Vec::with_capacity(f.len() - 1);
            for token in &f[1..] {
                let index: usize = token
                    .parse()
                    .map_err(|_| lines.corrupt("invalid group member index"))?;
                let sample = project
                    .samples
                    .get(index)
                    .ok_or_else(|| lines.corrupt(format!("group member index {index} out of range")))?;
                members.push(sample.id);
            }
            project.add_group(f[0], members);
        }
        Ok(())
    }

    fn read_replicate_sets<R: BufRead>(
        &self,
        lines: &mut LineReader<R>,
        project: &mut Project,
        fields: &[&str],
    ) -> Result<(), FormatError> {
        if !project.replicate_sets.is_empty() {
            return Err(lines.corrupt("duplicate Replicate Sets section"));
        }
        let count = section_count(lines, fields)?;
        for _ in 0..count {
            let line = lines.require("replicate set definition")?;
            let f: Vec<&str> = line.split('\t').collect();
            let mut members = Vec::with_capacity(f.len() - 1);
            for token in &f[1..] {
                let mut chars = token.chars();
                let kind = chars.next();
                let index: usize = chars
                    .as_str()
                    .parse()
                    .map_err(|_| lines.corrupt("invalid replicate member index"))?;
                match kind {
                    Some('s') => {
                        let sample = project.samples.get(index).ok_or_else(|| {
                            lines.corrupt(format!("replicate member s{index} out of range"))
                        })?;
                        members.push(ReplicateMember::Sample(sample.id));
                    }
                    Some('g') => {
                        let group = project.groups.get(index).ok_or_else(|| {
                            lines.corrupt(format!("replicate member g{index} out of range"))
                        })?;
                        members.push(ReplicateMember::Group(group.id));
                    }
                    _ => return Err(lines.corrupt("malformed replicate member")),
                }
            }
            project.add_replicate_set(f[0], members);
        }
        Ok(())
    }

    fn read_annotation<R: BufRead>(
        &self,
        lines: &mut LineReader<R>,
        project: &mut Project,
        fields: &[&str],
    ) -> Result<(), FormatError> {
        if fields.len() != 3 {
            return Err(lines.corrupt("malformed Annotation section"));
        }
        let name = fields[1].to_string();
        let count: usize = fields[2]
            .parse()
            .map_err(|_| lines.corrupt("invalid feature count"))?;

        let mut features = Vec::with_capacity(count);
        let mut progress = SectionProgress::new(
            self.ctx,
            format!("Loading features for {name}"),
            count as u64,
        );
        for _ in 0..count {
            progress.tick()?;
            let line = lines.require("feature row")?;
            let f: Vec<&str> = line.split('\t').collect();
            if f.len() < 3 || (f.len() - 3) % 2 != 0 {
                return Err(lines.corrupt("malformed feature row"));
            }
            let Some(chromosome) = project.genome.index_of(f[1]) else {
                self.ctx
                    .warning(&format!("skipped a feature on unknown chromosome {}", f[1]));
                continue;
            };
            let location = parse_feature_location(lines, f[2])?;
            let tags = f[3..]
                .chunks(2)
                .map(|pair| (pair[0].to_string(), pair[1].to_string()))
                .collect();
            features.push(Feature {
                feature_type: f[0].to_string(),
                chromosome,
                location,
                tags,
            });
        }
        project.annotation_sets.push(AnnotationSet { name, features });
        Ok(())
    }

    fn read_visible_stores<R: BufRead>(
        &self,
        lines: &mut LineReader<R>,
        project: &mut Project,
        fields: &[&str],
    ) -> Result<(), FormatError> {
        if !project.visible_stores.is_empty() {
            return Err(lines.corrupt("duplicate Visible Stores section"));
        }
        let count = section_count(lines, fields)?;
        for _ in 0..count {
            let line = lines.require("visible store entry")?;
            let f: Vec<&str> = line.split('\t').collect();
            if f.len() != 2 {
                return Err(lines.corrupt("malformed visible store entry"));
            }
            let index: usize = f[0]
                .parse()
                .map_err(|_| lines.corrupt("invalid visible store index"))?;
            let store = match f[1] {
                "set" => StoreRef::Sample(store_id(&project.samples, index, lines, |s| s.id)?),
                "group" => StoreRef::Group(store_id(&project.groups, index, lines, |g| g.id)?),
                "replicate" => StoreRef::ReplicateSet(store_id(
                    &project.replicate_sets,
                    index,
                    lines,
                    |r| r.id,
                )?),
                other => {
                    return Err(lines.corrupt(format!("unknown visible store kind '{other}'")))
                }
            };
            project.visible_stores.push(store);
        }
        Ok(())
    }

    fn read_display<R: BufRead>(
        &self,
        lines: &mut LineReader<R>,
        prefs: &mut DisplayPrefs,
        fields: &[&str],
    ) -> Result<(), FormatError> {
        let count = section_count(lines, fields)?;
        for _ in 0..count {
            let line = lines.require("display preference")?;
            let f: Vec<&str> = line.split('\t').collect();
            if f.len() != 2 {
                return Err(lines.corrupt("malformed display preference"));
            }
            match f[0] {
                "DataZoom" => {
                    prefs.data_zoom = f[1]
                        .parse()
                        .map_err(|_| lines.corrupt("invalid DataZoom value"))?;
                }
                "ScaleMode" => {
                    prefs.scale_mode = ScaleMode::parse(f[1])
                        .ok_or_else(|| lines.corrupt("invalid ScaleMode value"))?;
                }
                "ReadDensity" => {
                    prefs.read_density = ReadDensity::parse(f[1])
                        .ok_or_else(|| lines.corrupt("invalid ReadDensity value"))?;
                }
                "Gradient" => {
                    prefs.gradient = f[1].to_string();
                }
                "ReplicateExpansion" => {
                    prefs.expand_replicates = f[1]
                        .parse()
                        .map_err(|_| lines.corrupt("invalid ReplicateExpansion value"))?;
                }
                key => {
                    self.ctx
                        .warning(&format!("ignored unknown display preference '{key}'"));
                }
            }
        }
        Ok(())
    }
}

fn required<'p, R: BufRead>(
    project: &'p mut Option<Project>,
    lines: &LineReader<R>,
) -> Result<&'p mut Project, FormatError> {
    project
        .as_mut()
        .ok_or_else(|| lines.corrupt("section appears before the Genome section"))
}

fn section_count<R: BufRead>(
    lines: &LineReader<R>,
    fields: &[&str],
) -> Result<usize, FormatError> {
    if fields.len() != 2 {
        return Err(lines.corrupt(format!("malformed {} section header", fields[0])));
    }
    fields[1]
        .parse()
        .map_err(|_| lines.corrupt(format!("invalid {} count", fields[0])))
}

fn store_id<T, R: BufRead>(
    stores: &[T],
    index: usize,
    lines: &LineReader<R>,
    id: impl Fn(&T) -> crate::types::StoreId,
) -> Result<crate::types::StoreId, FormatError> {
    stores
        .get(index)
        .map(id)
        .ok_or_else(|| lines.corrupt(format!("visible store index {index} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::{Genome, StaticGenomeStore};
    use crate::probes::{Probe, ProbeSet};
    use std::io::Cursor;

    fn test_genome() -> Arc<Genome> {
        let mut genome = Genome::new("Homo sapiens", "GRCh38");
        genome.add_chromosome("chr1", 10_000);
        genome.add_chromosome("chr2", 8_000);
        Arc::new(genome)
    }

    fn store_for(genome: &Arc<Genome>) -> StaticGenomeStore {
        let mut store = StaticGenomeStore::new();
        store.add(Arc::clone(genome));
        store
    }

    fn write_to_string(project: &Project, prefs: &DisplayPrefs) -> String {
        let ctx = ProgressContext::new(Vec::new());
        let mut buffer = Vec::new();
        ProjectWriter::new(project, prefs, &ctx)
            .write(&mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    fn read_back(text: &str, genome: &Arc<Genome>) -> LoadedProject {
        let ctx = ProgressContext::new(Vec::new());
        let store = store_for(genome);
        ProjectReader::new(&store, &ctx)
            .read(Cursor::new(text.as_bytes()))
            .unwrap()
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let genome = test_genome();
        let mut project = Project::new(Arc::clone(&genome));
        let s = project.add_sample("input", "input.bam", false);
        project.add_group("all", vec![s]);
        project.visible_stores.push(StoreRef::Sample(s));
        project.visible_feature_types.push("gene".to_string());
        project.probe_set = Some(ProbeSet::new(
            vec![Probe {
                name: None,
                chromosome: 0,
                location: Location::new(1, 100, Strand::Unknown),
            }],
            "",
            "raw",
            "",
        ));

        let text = write_to_string(&project, &DisplayPrefs::default());
        let tags: Vec<&str> = text
            .lines()
            .filter_map(|l| l.split('\t').next())
            .filter(|t| {
                [
                    "Project Data Version",
                    "Genome",
                    "Features",
                    "Samples",
                    "Data Groups",
                    "Replicate Sets",
                    "Probes",
                    "Visible Stores",
                    "Display Preferences",
                ]
                .contains(t)
            })
            .collect();
        assert_eq!(
            tags,
            vec![
                "Project Data Version",
                "Genome",
                "Features",
                "Samples",
                "Data Groups",
                "Replicate Sets",
                "Probes",
                "Visible Stores",
                "Display Preferences"
            ]
        );
    }

    #[test]
    fn future_version_is_rejected() {
        let genome = test_genome();
        let ctx = ProgressContext::new(Vec::new());
        let store = store_for(&genome);
        let text = format!("Project Data Version\t{}\n", PROJECT_DATA_VERSION + 1);
        let result = ProjectReader::new(&store, &ctx).read(Cursor::new(text.as_bytes()));
        assert!(matches!(result, Err(FormatError::UnsupportedVersion(v)) if v == PROJECT_DATA_VERSION + 1));
    }

    #[test]
    fn minimal_project_roundtrips() {
        let genome = test_genome();
        let mut project = Project::new(Arc::clone(&genome));
        let a = project.add_sample("a", "a.bam", false);
        let b = project.add_sample("b", "b.bam", false);
        let g = project.add_group("pair", vec![a, b]);
        project.add_replicate_set(
            "mixed",
            vec![ReplicateMember::Sample(a), ReplicateMember::Group(g)],
        );
        project.visible_stores.push(StoreRef::Group(g));

        project.sample_mut(a).unwrap().set_reads(
            0,
            vec![
                Location::new(100, 100, Strand::Forward),
                Location::new(100, 100, Strand::Forward),
                Location::new(150, 150, Strand::Forward),
            ],
        );

        let prefs = DisplayPrefs {
            data_zoom: 2.5,
            scale_mode: ScaleMode::Log,
            read_density: ReadDensity::High,
            gradient: "Greyscale".to_string(),
            expand_replicates: true,
        };
        let text = write_to_string(&project, &prefs);
        let loaded = read_back(&text, &genome);
        assert_eq!(loaded.project, project);
        assert_eq!(loaded.prefs, prefs);
    }

    #[test]
    fn annotation_features_roundtrip_and_unknown_chromosomes_warn() {
        let genome = test_genome();
        let mut project = Project::new(Arc::clone(&genome));
        project.annotation_sets.push(AnnotationSet {
            name: "refseq".to_string(),
            features: vec![
                Feature {
                    feature_type: "gene".to_string(),
                    chromosome: 0,
                    location: Location::new(500, 900, Strand::Reverse),
                    tags: vec![("name".to_string(), "Abc1".to_string())],
                },
                Feature {
                    feature_type: "exon".to_string(),
                    chromosome: 1,
                    location: Location::new(10, 20, Strand::Forward),
                    tags: Vec::new(),
                },
            ],
        });

        let text = write_to_string(&project, &DisplayPrefs::default());
        let loaded = read_back(&text, &genome);
        assert_eq!(loaded.project.annotation_sets, project.annotation_sets);

        // A feature on a chromosome the genome does not know is dropped.
        let doctored = text.replace("exon\tchr2", "exon\tchr17");
        let loaded = read_back(&doctored, &genome);
        assert_eq!(loaded.project.annotation_sets[0].features.len(), 1);
    }

    #[test]
    fn unknown_display_keys_warn_and_are_ignored() {
        let genome = test_genome();
        let project = Project::new(Arc::clone(&genome));
        let mut text = write_to_string(&project, &DisplayPrefs::default());
        text = text.replace("Display Preferences\t5", "Display Preferences\t6");
        text.push_str("CursorBlink\tfast\n");

        let loaded = read_back(&text, &genome);
        assert_eq!(loaded.prefs, DisplayPrefs::default());
    }

    #[test]
    fn sample_count_mismatch_is_a_consistency_failure() {
        let genome = test_genome();
        let mut project = Project::new(Arc::clone(&genome));
        let a = project.add_sample("a", "a.bam", false);
        project.sample_mut(a).unwrap().set_reads(
            0,
            vec![Location::new(100, 100, Strand::Forward)],
        );
        let text = write_to_string(&project, &DisplayPrefs::default());
        let doctored = text.replace("a\t1\nchr1", "a\t7\nchr1");

        let ctx = ProgressContext::new(Vec::new());
        let store = store_for(&genome);
        let result = ProjectReader::new(&store, &ctx).read(Cursor::new(doctored.as_bytes()));
        assert!(matches!(result, Err(FormatError::Consistency(_))));
    }

    #[test]
    fn feature_locations_format_both_strands() {
        assert_eq!(
            format_feature_location(Location::new(5, 10, Strand::Forward)),
            "5..10"
        );
        assert_eq!(
            format_feature_location(Location::new(5, 10, Strand::Reverse)),
            "complement(5..10)"
        );
    }
}
