use super::FormatError;
use crate::types::StoreId;
use std::collections::HashMap;

/// Session-scoped mapping from store identity to its position in the
/// iteration order a section was (or will be) written in. Built from the same
/// ordered sequence the section writer walks, so a resolved index always
/// names the object at that position.
pub(crate) struct IndexTable {
    map: HashMap<StoreId, usize>,
}

impl IndexTable {
    pub fn build<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = StoreId>,
    {
        Self {
            map: ids
                .into_iter()
                .enumerate()
                .map(|(position, id)| (id, position))
                .collect(),
        }
    }

    /// Resolves a cross-reference. A miss means the graph references a store
    /// that is not part of the section it points into, which is a programming
    /// error surfaced before anything dangling reaches the file.
    pub fn index_of(&self, id: StoreId) -> Result<usize, FormatError> {
        self.map.get(&id).copied().ok_or_else(|| {
            FormatError::Consistency(format!(
                "store {id} is referenced but absent from its section's iteration order"
            ))
        })
    }
}
