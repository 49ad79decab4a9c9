//! Grouping of resolved folders into per-stand file groups.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::classify::Category;
use crate::paths::ResolvedFolder;

/// Composite grouping key.
///
/// Field order defines the order groups are emitted in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupKey {
    /// Content category.
    pub category: Category,
    /// Client id.
    pub client_id: String,
    /// Project id.
    pub project_id: String,
    /// Stand id.
    pub stand_id: String,
}

/// All paths sharing one [`GroupKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileGroup {
    /// The shared key.
    #[serde(flatten)]
    pub key: GroupKey,
    /// Member paths in first-seen order.
    pub full_paths: Vec<String>,
}

/// Partition folders by (category, client, project, stand).
///
/// Groups come out ordered by key; paths inside a group keep input order.
/// Empty input yields no groups.
#[must_use]
pub fn aggregate(folders: &[ResolvedFolder]) -> Vec<FileGroup> {
    let mut groups: BTreeMap<GroupKey, Vec<String>> = BTreeMap::new();

    for resolved in folders {
        let folder = &resolved.folder;
        let key = GroupKey {
            category: folder.category,
            client_id: folder.client_id.clone(),
            project_id: folder.project_id.clone(),
            stand_id: folder.stand_id.clone(),
        };
        groups
            .entry(key)
            .or_default()
            .push(resolved.full_path.clone());
    }

    groups
        .into_iter()
        .map(|(key, full_paths)| FileGroup { key, full_paths })
        .collect()
}
