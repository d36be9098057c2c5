//! Symbol index construction over the complete extracted file set.

use indexmap::IndexMap;

use crate::index::FileRecord;

/// Consolidate entity locations into a flat `name -> "path:line"` map.
///
/// Files iterate in discovery order and entities in extraction order; a
/// name collision keeps the most recently processed location. This
/// last-writer-wins behavior is an accepted ambiguity of the flat index,
/// not an error condition.
pub fn build_symbol_index(files: &[FileRecord]) -> IndexMap<String, String> {
    let mut symbol_index = IndexMap::new();
    for file in files {
        for entity in &file.entities {
            symbol_index.insert(
                entity.name.clone(),
                format!("{}:{}", file.path, entity.lineno),
            );
        }
    }
    symbol_index
}
