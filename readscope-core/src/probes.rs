use crate::types::Location;
use serde::{Deserialize, Serialize};

/// A fixed genomic interval values are recorded against. Identity is the
/// probe's position in its `ProbeSet`, never its name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    pub name: Option<String>,
    pub chromosome: usize,
    pub location: Location,
}

/// A named, possibly nested, ordered subset of probes with optional per-probe
/// values. `parent` of `None` attaches the list to the implicit "All probes"
/// root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeList {
    pub name: String,
    pub value_label: String,
    pub description: String,
    pub comments: String,
    pub parent: Option<usize>,
    /// (probe index, optional value), ordered by probe index.
    pub members: Vec<(usize, Option<f32>)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSet {
    pub probes: Vec<Probe>,
    pub description: String,
    pub current_quantitation: String,
    pub comments: String,
    /// List arena; tree edges live in each list's `parent` link.
    pub lists: Vec<ProbeList>,
}

impl ProbeSet {
    pub fn new(
        probes: Vec<Probe>,
        description: impl Into<String>,
        current_quantitation: impl Into<String>,
        comments: impl Into<String>,
    ) -> Self {
        Self {
            probes,
            description: description.into(),
            current_quantitation: current_quantitation.into(),
            comments: comments.into(),
            lists: Vec::new(),
        }
    }

    pub fn add_list(
        &mut self,
        parent: Option<usize>,
        name: impl Into<String>,
        value_label: impl Into<String>,
        description: impl Into<String>,
    ) -> usize {
        debug_assert!(parent.map_or(true, |p| p < self.lists.len()));
        self.lists.push(ProbeList {
            name: name.into(),
            value_label: value_label.into(),
            description: description.into(),
            comments: String::new(),
            parent,
            members: Vec::new(),
        });
        self.lists.len() - 1
    }

    /// Pre-order walk of the list tree as (depth, arena index) pairs, depth 1
    /// being a direct child of the implicit root. Lists whose parent link
    /// does not resolve are not visited.
    pub fn preorder(&self) -> Vec<(usize, usize)> {
        // Slot 0 holds the root's children; slot i + 1 holds list i's.
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.lists.len() + 1];
        for (i, list) in self.lists.iter().enumerate() {
            let slot = match list.parent {
                None => 0,
                Some(p) => p + 1,
            };
            if let Some(bucket) = children.get_mut(slot) {
                bucket.push(i);
            }
        }

        let mut out = Vec::with_capacity(self.lists.len());
        let mut stack: Vec<(usize, usize)> =
            children[0].iter().rev().map(|&i| (1, i)).collect();
        while let Some((depth, index)) = stack.pop() {
            out.push((depth, index));
            for &child in children[index + 1].iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Strand;

    fn probe(start: u32) -> Probe {
        Probe {
            name: None,
            chromosome: 0,
            location: Location::new(start, start + 50, Strand::Unknown),
        }
    }

    #[test]
    fn preorder_emits_parents_before_descendants() {
        let mut set = ProbeSet::new(vec![probe(0), probe(100)], "", "raw", "");
        let a = set.add_list(None, "a", "v", "");
        let b = set.add_list(Some(a), "b", "v", "");
        let c = set.add_list(Some(b), "c", "v", "");
        let d = set.add_list(None, "d", "v", "");

        assert_eq!(set.preorder(), vec![(1, a), (2, b), (3, c), (1, d)]);
    }

    #[test]
    fn preorder_skips_orphaned_lists() {
        let mut set = ProbeSet::new(vec![probe(0)], "", "raw", "");
        set.add_list(None, "ok", "v", "");
        set.lists.push(ProbeList {
            name: "orphan".into(),
            value_label: "v".into(),
            description: String::new(),
            comments: String::new(),
            parent: Some(42),
            members: Vec::new(),
        });
        assert_eq!(set.preorder().len(), 1);
    }
}
