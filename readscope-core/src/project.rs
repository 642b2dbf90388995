use crate::genome::Genome;
use crate::probes::ProbeSet;
use crate::types::{Location, StoreId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One imported source of aligned reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    pub id: StoreId,
    pub name: String,
    pub source_file: String,
    pub reads: ReadData,
    /// Per-probe quantitation indexed by probe position. `None` means the
    /// whole store is unquantitated; `Some(vec)` entries of `None` mean no
    /// value for that probe.
    pub quantitation: Option<Vec<Option<f32>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReadData {
    /// Chromosome index to sorted packed reads.
    Single(HashMap<usize, Vec<Location>>),
    /// (source, hit) chromosome indices to parallel position arrays.
    Paired(HashMap<(usize, usize), PairBucket>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairBucket {
    pub source: Vec<Location>,
    pub hit: Vec<Location>,
}

impl PairBucket {
    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn push(&mut self, source: Location, hit: Location) {
        self.source.push(source);
        self.hit.push(hit);
    }
}

impl DataSet {
    pub fn is_hic(&self) -> bool {
        matches!(self.reads, ReadData::Paired(_))
    }

    /// Total read count for this store. Each valid HiC pair counts both ends.
    pub fn total_read_count(&self) -> u64 {
        match &self.reads {
            ReadData::Single(map) => map.values().map(|v| v.len() as u64).sum(),
            ReadData::Paired(map) => 2 * map.values().map(|b| b.len() as u64).sum::<u64>(),
        }
    }

    pub fn reads_for(&self, chromosome: usize) -> &[Location] {
        match &self.reads {
            ReadData::Single(map) => map.get(&chromosome).map_or(&[], |v| v.as_slice()),
            ReadData::Paired(_) => &[],
        }
    }

    /// Replaces the reads for one chromosome, keeping them sorted. Has no
    /// effect on HiC stores.
    pub fn set_reads(&mut self, chromosome: usize, mut reads: Vec<Location>) {
        if let ReadData::Single(map) = &mut self.reads {
            reads.sort_unstable();
            if reads.is_empty() {
                map.remove(&chromosome);
            } else {
                map.insert(chromosome, reads);
            }
        }
    }

    /// Appends one resolved pair to a HiC store. Has no effect on
    /// single-ended stores.
    pub fn add_pair(
        &mut self,
        source_chromosome: usize,
        hit_chromosome: usize,
        source: Location,
        hit: Location,
    ) {
        if let ReadData::Paired(map) = &mut self.reads {
            map.entry((source_chromosome, hit_chromosome))
                .or_default()
                .push(source, hit);
        }
    }
}

/// Named aggregate of samples, referenced by identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataGroup {
    pub id: StoreId,
    pub name: String,
    pub members: Vec<StoreId>,
    pub quantitation: Option<Vec<Option<f32>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicateMember {
    Sample(StoreId),
    Group(StoreId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateSet {
    pub id: StoreId,
    pub name: String,
    pub members: Vec<ReplicateMember>,
}

/// Reference to any store kind, used for the visible-store selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreRef {
    Sample(StoreId),
    Group(StoreId),
    ReplicateSet(StoreId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub feature_type: String,
    pub chromosome: usize,
    pub location: Location,
    pub tags: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSet {
    pub name: String,
    pub features: Vec<Feature>,
}

/// The live workspace graph: one genome, the imported samples and everything
/// derived from them. Mutated by the application on a single thread; save and
/// load operations take it as a stable snapshot by caller convention.
#[derive(Debug, PartialEq)]
pub struct Project {
    pub genome: Arc<Genome>,
    pub samples: Vec<DataSet>,
    pub groups: Vec<DataGroup>,
    pub replicate_sets: Vec<ReplicateSet>,
    pub annotation_sets: Vec<AnnotationSet>,
    pub probe_set: Option<ProbeSet>,
    pub visible_stores: Vec<StoreRef>,
    pub visible_feature_types: Vec<String>,
    next_id: StoreId,
}

impl Project {
    pub fn new(genome: Arc<Genome>) -> Self {
        Self {
            genome,
            samples: Vec::new(),
            groups: Vec::new(),
            replicate_sets: Vec::new(),
            annotation_sets: Vec::new(),
            probe_set: None,
            visible_stores: Vec::new(),
            visible_feature_types: Vec::new(),
            next_id: 0,
        }
    }

    fn take_id(&mut self) -> StoreId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn add_sample(
        &mut self,
        name: impl Into<String>,
        source_file: impl Into<String>,
        hic: bool,
    ) -> StoreId {
        let id = self.take_id();
        self.samples.push(DataSet {
            id,
            name: name.into(),
            source_file: source_file.into(),
            reads: if hic {
                ReadData::Paired(HashMap::new())
            } else {
                ReadData::Single(HashMap::new())
            },
            quantitation: None,
        });
        id
    }

    pub fn add_group(&mut self, name: impl Into<String>, members: Vec<StoreId>) -> StoreId {
        let id = self.take_id();
        self.groups.push(DataGroup {
            id,
            name: name.into(),
            members,
            quantitation: None,
        });
        id
    }

    pub fn add_replicate_set(
        &mut self,
        name: impl Into<String>,
        members: Vec<ReplicateMember>,
    ) -> StoreId {
        let id = self.take_id();
        self.replicate_sets.push(ReplicateSet {
            id,
            name: name.into(),
            members,
        });
        id
    }

    pub fn sample(&self, id: StoreId) -> Option<&DataSet> {
        self.samples.iter().find(|s| s.id == id)
    }

    pub fn sample_mut(&mut self, id: StoreId) -> Option<&mut DataSet> {
        self.samples.iter_mut().find(|s| s.id == id)
    }

    pub fn group(&self, id: StoreId) -> Option<&DataGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn total_read_count(&self) -> u64 {
        self.samples.iter().map(|s| s.total_read_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Strand;

    fn test_genome() -> Arc<Genome> {
        let mut genome = Genome::new("Test", "v1");
        genome.add_chromosome("chr1", 10_000);
        genome.add_chromosome("chr2", 8_000);
        Arc::new(genome)
    }

    #[test]
    fn ids_are_unique_across_store_kinds() {
        let mut project = Project::new(test_genome());
        let s = project.add_sample("a", "a.bam", false);
        let g = project.add_group("g", vec![s]);
        let r = project.add_replicate_set("r", vec![ReplicateMember::Group(g)]);
        assert_eq!(vec![s, g, r], vec![0, 1, 2]);
    }

    #[test]
    fn single_read_counts() {
        let mut project = Project::new(test_genome());
        let id = project.add_sample("a", "a.bam", false);
        let sample = project.sample_mut(id).unwrap();
        sample.set_reads(
            0,
            vec![
                Location::new(100, 150, Strand::Forward),
                Location::new(100, 150, Strand::Forward),
            ],
        );
        sample.set_reads(1, vec![Location::new(5, 10, Strand::Reverse)]);
        assert_eq!(sample.total_read_count(), 3);
        assert_eq!(sample.reads_for(0).len(), 2);
        assert!(sample.reads_for(5).is_empty());
    }

    #[test]
    fn hic_counts_both_ends() {
        let mut project = Project::new(test_genome());
        let id = project.add_sample("hic", "hic.bam", true);
        let sample = project.sample_mut(id).unwrap();
        let a = Location::new(10, 60, Strand::Forward);
        let b = Location::new(500, 550, Strand::Reverse);
        sample.add_pair(0, 1, a, b);
        sample.add_pair(0, 0, a, a);
        assert_eq!(sample.total_read_count(), 4);
    }
}
