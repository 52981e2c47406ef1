//! Behavior every [`DocBackend`] must share, run against all three backends.

use serde_json::json;
use tempfile::TempDir;

use genedoc_types::{DocId, Document};

use crate::backend::{Backend, BackendConfig, Storage};
use crate::error::StoreError;
use crate::traits::{DocBackend, DocBackendExt, DocPatch, UpdateOutcome};

fn with_each_backend(check: impl Fn(&Backend)) {
    let dir = TempDir::new().unwrap();
    let configs = [
        BackendConfig::Memory,
        BackendConfig::DocStore {
            path: dir.path().join("contract.redb"),
        },
        BackendConfig::SearchIndex {
            path: Some(dir.path().join("index")),
        },
    ];
    for config in configs {
        let storage = Storage::open(&config).unwrap();
        let backend = storage.collection("genes").unwrap();
        check(&backend);
    }
}

fn gene(id: &str) -> Document {
    Document::empty(id).with_field("symbol", format!("G{id}"))
}

fn seeded(backend: &Backend, ids: &[&str]) {
    backend.prepare(&Default::default()).unwrap();
    let docs: Vec<Document> = ids.iter().map(|id| gene(id)).collect();
    backend.insert(&docs).unwrap();
    backend.finalize().unwrap();
}

#[test]
fn update_never_creates() {
    with_each_backend(|b| {
        seeded(b, &["1"]);
        let patch = DocPatch::default().with_field("go", "GO:1");
        assert_eq!(b.update(&"2".into(), &patch).unwrap(), UpdateOutcome::Missing, "{}", b.kind());
        b.finalize().unwrap();
        assert_eq!(b.count().unwrap(), 1);
        assert!(b.get(&"2".into()).unwrap().is_none());
    });
}

#[test]
fn update_is_shallow_and_reports_unchanged() {
    with_each_backend(|b| {
        seeded(b, &["1"]);
        let patch = DocPatch::default().with_field("go", json!({"BP": ["GO:1"]}));
        assert_eq!(b.update(&"1".into(), &patch).unwrap(), UpdateOutcome::Modified);
        assert_eq!(b.update(&"1".into(), &patch).unwrap(), UpdateOutcome::Unchanged);
        b.finalize().unwrap();
        let doc = b.get(&"1".into()).unwrap().unwrap();
        assert_eq!(doc.fields["symbol"], "G1");
        assert_eq!(doc.fields["go"], json!({"BP": ["GO:1"]}));
    });
}

#[test]
fn unset_follows_capability() {
    with_each_backend(|b| {
        seeded(b, &["1"]);
        let patch = DocPatch::default().with_unset(["symbol"]);
        b.update(&"1".into(), &patch).unwrap();
        b.finalize().unwrap();
        let doc = b.get(&"1".into()).unwrap().unwrap();
        assert_eq!(doc.fields.contains_key("symbol"), !b.supports_unset());
    });
}

#[test]
fn ids_page_in_order() {
    with_each_backend(|b| {
        seeded(b, &["3", "1", "5", "2", "4"]);
        let pages: Vec<Vec<DocId>> = b.id_pages(2).map(|p| p.unwrap()).collect();
        assert_eq!(pages.len(), 3);
        let flat: Vec<&str> = pages.iter().flatten().map(DocId::as_str).collect();
        assert_eq!(flat, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(b.id_list().unwrap().len(), 5);
    });
}

#[test]
fn get_many_keeps_order_and_misses() {
    with_each_backend(|b| {
        seeded(b, &["1", "2"]);
        let got = b.get_many(&["2".into(), "9".into(), "1".into()]).unwrap();
        let ids: Vec<Option<&str>> = got.iter().map(|d| d.as_ref().map(|d| d.id.as_str())).collect();
        assert_eq!(ids, vec![Some("2"), None, Some("1")]);
    });
}

#[test]
fn remove_and_count() {
    with_each_backend(|b| {
        seeded(b, &["1", "2", "3"]);
        assert_eq!(b.remove_many(&["1".into(), "9".into()]).unwrap(), 1);
        b.finalize().unwrap();
        assert_eq!(b.count().unwrap(), 2);
        assert_eq!(b.count_where("symbol", &json!("G2")).unwrap(), 1);
    });
}

#[test]
fn drop_is_idempotent() {
    with_each_backend(|b| {
        b.drop_collection().unwrap();
        seeded(b, &["1"]);
        b.drop_collection().unwrap();
        b.drop_collection().unwrap();
        b.finalize().unwrap();
        assert_eq!(b.count().unwrap(), 0);
        b.prepare(&Default::default()).unwrap();
        b.prepare(&Default::default()).unwrap();
    });
}

#[test]
fn insert_collision_per_backend() {
    with_each_backend(|b| {
        seeded(b, &["1"]);
        let result = b.insert(&[Document::empty("1").with_field("symbol", "new")]);
        b.finalize().unwrap();
        let symbol = b.get(&"1".into()).unwrap().unwrap().fields["symbol"].clone();
        match b.kind() {
            "search" => {
                assert!(result.is_ok());
                assert_eq!(symbol, "new");
            }
            _ => {
                assert!(matches!(result, Err(StoreError::DuplicateId { .. })));
                assert_eq!(symbol, "G1");
            }
        }
    });
}

#[test]
fn concurrent_updates_on_distinct_ids() {
    with_each_backend(|b| {
        let ids: Vec<String> = (0..32).map(|i| format!("{i:03}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        seeded(b, &refs);
        std::thread::scope(|scope| {
            for chunk in ids.chunks(8) {
                scope.spawn(move || {
                    for id in chunk {
                        let patch = DocPatch::default().with_field("seen", true);
                        assert_eq!(
                            b.update(&id.as_str().into(), &patch).unwrap(),
                            UpdateOutcome::Modified
                        );
                    }
                });
            }
        });
        b.finalize().unwrap();
        assert_eq!(b.count_where("seen", &json!(true)).unwrap(), 32);
    });
}
