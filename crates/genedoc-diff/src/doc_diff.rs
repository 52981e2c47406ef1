//! Document-level diff: compare the field maps of one id in two generations.

use genedoc_types::{DocDiff, DocId, Fields};

/// Compute the diff of document `id` between `old` and `new`.
///
/// Fields present in both with unequal values are changed, fields only in
/// `old` are removed, and fields only in `new` are added. Changed and added
/// fields carry their new value. Fields named in `ignore` are skipped on both
/// sides. Returns `None` when the documents are equal.
pub fn diff_docs(id: &DocId, old: &Fields, new: &Fields, ignore: &[String]) -> Option<DocDiff> {
    let ignored = |name: &str| ignore.iter().any(|f| f == name);
    let mut diff = DocDiff {
        id: id.clone(),
        ..DocDiff::default()
    };

    for (name, old_val) in old {
        if ignored(name) {
            continue;
        }
        match new.get(name) {
            Some(new_val) if new_val != old_val => {
                diff.changed_fields.insert(name.clone(), new_val.clone());
            }
            Some(_) => {}
            None => diff.removed_field_names.push(name.clone()),
        }
    }

    for (name, new_val) in new {
        if !ignored(name) && !old.contains_key(name) {
            diff.added_fields.insert(name.clone(), new_val.clone());
        }
    }

    (!diff.is_empty()).then_some(diff)
}
