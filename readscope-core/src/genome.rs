use crate::format::FormatError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chromosome {
    pub name: String,
    pub length: u64,
}

/// A read-only reference genome: species, assembly and the canonical ordered
/// chromosome list. All per-chromosome project data is written and read in
/// this order.
#[derive(Debug, PartialEq)]
pub struct Genome {
    species: String,
    assembly: String,
    chromosomes: Vec<Chromosome>,
    name_map: HashMap<String, usize>,
}

impl Genome {
    pub fn new(species: impl Into<String>, assembly: impl Into<String>) -> Self {
        Self {
            species: species.into(),
            assembly: assembly.into(),
            chromosomes: Vec::new(),
            name_map: HashMap::new(),
        }
    }

    pub fn add_chromosome(&mut self, name: impl Into<String>, length: u64) -> usize {
        let name = name.into();
        let index = self.chromosomes.len();
        self.name_map.insert(name.clone(), index);
        self.chromosomes.push(Chromosome { name, length });
        index
    }

    pub fn species(&self) -> &str {
        &self.species
    }

    pub fn assembly(&self) -> &str {
        &self.assembly
    }

    pub fn chromosomes(&self) -> &[Chromosome] {
        &self.chromosomes
    }

    pub fn chromosome_count(&self) -> usize {
        self.chromosomes.len()
    }

    pub fn chromosome(&self, index: usize) -> Option<&Chromosome> {
        self.chromosomes.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_map.get(name).copied()
    }
}

/// Source of installed genomes, injected into the project loader.
pub trait GenomeStore: Send + Sync {
    fn resolve(&self, species: &str, assembly: &str) -> Result<Arc<Genome>, FormatError>;
}

/// Fixed in-memory genome collection, mainly for tests and embedding callers.
#[derive(Default)]
pub struct StaticGenomeStore {
    genomes: Vec<Arc<Genome>>,
}

impl StaticGenomeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, genome: Arc<Genome>) {
        self.genomes.push(genome);
    }
}

impl GenomeStore for StaticGenomeStore {
    fn resolve(&self, species: &str, assembly: &str) -> Result<Arc<Genome>, FormatError> {
        self.genomes
            .iter()
            .find(|g| g.species() == species && g.assembly() == assembly)
            .cloned()
            .ok_or_else(|| {
                FormatError::Corrupt(format!("genome {species}/{assembly} is not installed"))
            })
    }
}

/// Genome collection backed by a directory tree of
/// `<root>/<species>/<assembly>/chr_list` files, one `name\tlength` line per
/// chromosome in canonical order.
pub struct FolderGenomeStore {
    root: PathBuf,
}

impl FolderGenomeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl GenomeStore for FolderGenomeStore {
    fn resolve(&self, species: &str, assembly: &str) -> Result<Arc<Genome>, FormatError> {
        let path = self.root.join(species).join(assembly).join("chr_list");
        let file = File::open(&path).map_err(|_| {
            FormatError::Corrupt(format!(
                "genome {species}/{assembly} is not installed under {}",
                self.root.display()
            ))
        })?;

        let mut genome = Genome::new(species, assembly);
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut parts = line.split('\t');
            let name = parts.next().unwrap_or("");
            let length: u64 = parts
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| {
                    FormatError::Corrupt(format!("malformed chromosome entry in {}", path.display()))
                })?;
            genome.add_chromosome(name, length);
        }

        if genome.chromosome_count() == 0 {
            return Err(FormatError::Corrupt(format!(
                "genome {species}/{assembly} has an empty chromosome list"
            )));
        }
        Ok(Arc::new(genome))
    }
}
