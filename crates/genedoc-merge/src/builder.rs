//! Build orchestration: validate, insert roots, merge sources, record the run.

use std::collections::{BTreeMap, HashSet};

use genedoc_registry::Registry;
use genedoc_resolve::{IdCatalog, RootPlan, RootResolver};
use genedoc_store::{doc_feeder, DocBackend, DocBackendExt, SourceFilter, SourceStore};
use genedoc_types::{BuildConfig, BuildRunRecord, DocId, SourceDescriptor};
use rayon::ThreadPool;
use tracing::{error, info, warn};

use crate::apply::{apply_partitioned, apply_sequential, translate_batch, SourceReport};
use crate::cache::IdMapCache;
use crate::config::{ExecutionMode, MergeConfig};
use crate::error::{MergeError, MergeResult};
use crate::schema::merged_schema;
use crate::task::{dispatch, plan_tasks, WorkerEnv};

/// Everything a build reads, checked up front.
struct Validated {
    config: BuildConfig,
    descriptors: BTreeMap<String, SourceDescriptor>,
}

impl Validated {
    fn descriptor(&self, name: &str) -> MergeResult<&SourceDescriptor> {
        self.descriptors
            .get(name)
            .ok_or_else(|| MergeError::UnknownSource {
                build: self.config.name.clone(),
                name: name.to_string(),
            })
    }
}

/// Builds one generation of a merged gene-document collection.
///
/// The target collection is handed in by the caller; the builder never
/// decides where a generation lives.
pub struct GeneDocBuilder<'a> {
    registry: &'a dyn Registry,
    sources: &'a dyn SourceStore,
    catalog: &'a dyn IdCatalog,
    config: MergeConfig,
}

impl<'a> GeneDocBuilder<'a> {
    pub fn new(
        registry: &'a dyn Registry,
        sources: &'a dyn SourceStore,
        catalog: &'a dyn IdCatalog,
    ) -> Self {
        Self {
            registry,
            sources,
            catalog,
            config: MergeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MergeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Build `build` into `target` and return the final run record.
    ///
    /// Nothing is written (not even a run record) until the build config,
    /// every source it names, and `restart_at` have been validated. Once the
    /// run has started, any failure is recorded on the run before it is
    /// returned.
    pub fn build(&self, build: &str, target: &dyn DocBackend) -> MergeResult<BuildRunRecord> {
        let validated = self.validate(build)?;
        let mut record = BuildRunRecord::begin(target.name(), self.config.restart_at);
        self.registry.upsert_run(build, &record)?;
        info!(
            build,
            target = target.name(),
            backend = target.kind(),
            restart_at = self.config.restart_at,
            "build started"
        );

        let mut stats = BTreeMap::new();
        match self.run(&validated, target, &mut stats) {
            Ok(()) => {
                record.succeed(stats);
                self.registry.upsert_run(build, &record)?;
                info!(build, target = target.name(), "build finished");
                Ok(record)
            }
            Err(e) => {
                error!(build, target = target.name(), error = %e, "build failed");
                record.fail(e.to_string(), stats);
                self.registry.upsert_run(build, &record)?;
                Err(e)
            }
        }
    }

    fn validate(&self, build: &str) -> MergeResult<Validated> {
        let config = self
            .registry
            .build_config(build)?
            .ok_or_else(|| MergeError::UnknownBuild(build.to_string()))?;
        config.validate()?;

        let mut descriptors = BTreeMap::new();
        for name in config.all_sources() {
            let descriptor =
                self.registry
                    .source(name)?
                    .ok_or_else(|| MergeError::UnknownSource {
                        build: build.to_string(),
                        name: name.to_string(),
                    })?;
            if !self.sources.has_source(name)? {
                return Err(MergeError::MissingSource(name.to_string()));
            }
            let needs_xref = config.primary_root() != Some(name);
            if let (true, Some(id_type)) = (needs_xref, descriptor.id_type.as_deref()) {
                if !self.catalog.has_cross_references(id_type)? {
                    return Err(MergeError::MissingCrossReference {
                        name: name.to_string(),
                        id_type: id_type.to_string(),
                    });
                }
            }
            descriptors.insert(name.to_string(), descriptor);
        }

        let merge_count = config.merge_sources().len();
        if self.config.restart_at > merge_count {
            return Err(MergeError::InvalidRestart {
                restart_at: self.config.restart_at,
                sources: merge_count,
            });
        }
        Ok(Validated {
            config,
            descriptors,
        })
    }

    fn run(
        &self,
        validated: &Validated,
        target: &dyn DocBackend,
        stats: &mut BTreeMap<String, u64>,
    ) -> MergeResult<()> {
        let config = &validated.config;
        let secondary = match config.secondary_root() {
            Some(name) => Some(validated.descriptor(name)?),
            None => None,
        };
        let plan = RootPlan::for_build(config, secondary)
            .ok_or_else(|| MergeError::UnknownBuild(config.name.clone()))?;
        let resolver = RootResolver::new(self.sources, self.catalog)
            .batch_size(self.config.batch_size)
            .policy(self.config.mapping_policy);

        let (identity, geneid_set) = if self.config.restart_at == 0 {
            target.drop_collection()?;
            target.prepare(&merged_schema(validated.descriptors.values()))?;
            let resolution = resolver.resolve(&plan, target)?;
            resolution.stats.record_into(stats);
            (resolution.identity, resolution.geneid_set)
        } else {
            let identity = resolver.load_identity(&plan)?;
            // A failed run never finalized; make its roots visible to reads.
            target.finalize()?;
            let geneid_set: HashSet<DocId> = target.id_list()?.into_iter().collect();
            stats.insert("total_canonical".into(), geneid_set.len() as u64);
            info!(
                restart_at = self.config.restart_at,
                canonical = geneid_set.len(),
                "resuming build"
            );
            (identity, geneid_set)
        };
        if geneid_set.is_empty() {
            warn!(build = %config.name, "no canonical documents to merge into");
        }

        let cache = IdMapCache::new(self.catalog, identity, self.config.mapping_policy);
        let pool = self.pool()?;

        for (i, name) in config.merge_sources().into_iter().enumerate() {
            let index = i + 1;
            if index < self.config.restart_at {
                continue;
            }
            let descriptor = validated.descriptor(name)?;
            let env = WorkerEnv {
                sources: self.sources,
                target,
                cache: &cache,
                geneid_set: &geneid_set,
                batch_size: self.config.batch_size,
            };
            let report = self
                .merge_source(&config.name, descriptor, &env, pool.as_ref())
                .map_err(|e| MergeError::SourceFailed {
                    index,
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
            report.record_into(name, stats);
            info!(
                index,
                source = name,
                read = report.read,
                updated = report.tally.modified,
                unchanged = report.tally.unchanged,
                missing = report.tally.missing,
                dropped = report.dropped,
                "source merged"
            );
        }

        target.finalize()?;
        Ok(())
    }

    fn pool(&self) -> MergeResult<Option<ThreadPool>> {
        match self.config.mode {
            ExecutionMode::Sequential => Ok(None),
            ExecutionMode::Pool { .. } | ExecutionMode::Tasks { .. } => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(self.config.mode.workers())
                    .thread_name(|i| format!("genedoc-merge-{i}"))
                    .build()
                    .map_err(|e| MergeError::WorkerPool(e.to_string()))?;
                Ok(Some(pool))
            }
        }
    }

    /// Merge one non-root source into the target.
    fn merge_source(
        &self,
        build: &str,
        descriptor: &SourceDescriptor,
        env: &WorkerEnv<'_>,
        pool: Option<&ThreadPool>,
    ) -> MergeResult<SourceReport> {
        let name = descriptor.name.as_str();
        if let (ExecutionMode::Tasks { window, .. }, Some(pool)) = (&self.config.mode, pool) {
            let total = self.sources.count(name, &SourceFilter::all())?;
            let tasks = plan_tasks(
                build,
                env.target.name(),
                name,
                descriptor.id_type.as_deref(),
                total,
                *window,
            );
            return dispatch(pool, &tasks, env);
        }

        let map = descriptor
            .id_type
            .as_deref()
            .map(|t| env.cache.get(t))
            .transpose()?;
        let mut report = SourceReport::default();
        let feeder = doc_feeder(self.sources, name, SourceFilter::all(), self.config.batch_size, 0);
        for batch in feeder {
            let batch = batch?;
            report.read += batch.len() as u64;
            let (updates, dropped) = translate_batch(batch, map.as_deref(), env.geneid_set);
            report.dropped += dropped;
            let tally = match pool {
                Some(pool) => apply_partitioned(pool, updates, env.target)?,
                None => apply_sequential(updates, env.target)?,
            };
            report.tally.absorb(tally);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genedoc_registry::InMemoryRegistry;
    use genedoc_resolve::InMemoryIdCatalog;
    use genedoc_store::{
        InMemoryBackend, InMemorySourceStore, SearchIndexBackend, StoreError, StoreResult,
    };
    use genedoc_types::{Document, RunStatus};
    use serde_json::json;

    fn gene(id: &str) -> Document {
        Document::empty(id).with_field("taxid", 9606)
    }

    struct Fixture {
        registry: InMemoryRegistry,
        sources: InMemorySourceStore,
        catalog: InMemoryIdCatalog,
    }

    /// Two roots (entrez {1,2,3}, ensembl {A->1, B}) and one ensembl-keyed
    /// annotation source.
    fn fixture(annotation: Vec<Document>, xrefs: &[(&str, &str)]) -> Fixture {
        let registry = InMemoryRegistry::new();
        registry
            .put_source(&SourceDescriptor::canonical("entrez_gene").root())
            .unwrap();
        registry
            .put_source(&SourceDescriptor::keyed_by("ensembl_gene", "ensembl").root())
            .unwrap();
        registry
            .put_source(&SourceDescriptor::keyed_by("ensembl_symbol", "ensembl"))
            .unwrap();
        registry
            .put_build_config(&BuildConfig::new(
                "mygene",
                ["entrez_gene", "ensembl_gene", "ensembl_symbol"],
                ["entrez_gene", "ensembl_gene"],
            ))
            .unwrap();

        let sources = InMemorySourceStore::new()
            .with_source("entrez_gene", vec![gene("1"), gene("2"), gene("3")])
            .with_source("ensembl_gene", vec![gene("A"), gene("B")])
            .with_source("ensembl_symbol", annotation);
        let mut catalog = InMemoryIdCatalog::new().with_xref("ensembl", "A", "1");
        for (secondary, canonical) in xrefs {
            catalog = catalog.with_xref("ensembl", *secondary, *canonical);
        }
        Fixture {
            registry,
            sources,
            catalog,
        }
    }

    impl Fixture {
        fn builder(&self) -> GeneDocBuilder<'_> {
            GeneDocBuilder::new(&self.registry, &self.sources, &self.catalog)
        }
    }

    #[test]
    fn merge_with_id_translation() {
        let fx = fixture(
            vec![Document::empty("X").with_field("symbol", "foo")],
            &[("X", "2")],
        );
        let target = InMemoryBackend::new("mygene_20130415_aaaaaaaa");
        let record = fx.builder().build("mygene", &target).unwrap();

        assert_eq!(record.status, RunStatus::Success);
        assert_eq!(record.stats["total_canonical"], 4);
        assert_eq!(record.stats["ensembl_symbol.updated"], 1);
        let two = target.get(&"2".into()).unwrap().unwrap();
        assert_eq!(two.fields["symbol"], "foo");
        for id in ["1", "3"] {
            let doc = target.get(&id.into()).unwrap().unwrap();
            assert!(!doc.fields.contains_key("symbol"));
        }
    }

    #[test]
    fn unmatched_annotation_is_dropped() {
        let fx = fixture(
            vec![Document::empty("X").with_field("symbol", "foo")],
            &[("X", "99")],
        );
        let target = InMemoryBackend::new("t");
        let record = fx.builder().build("mygene", &target).unwrap();
        assert_eq!(record.stats["ensembl_symbol.dropped"], 1);
        assert_eq!(record.stats["ensembl_symbol.updated"], 0);
        assert_eq!(target.count_where("symbol", &json!("foo")).unwrap(), 0);
    }

    #[test]
    fn rebuild_is_idempotent() {
        let fx = fixture(
            vec![
                Document::empty("X").with_field("symbol", "foo"),
                Document::empty("Y").with_field("symbol", "bar"),
            ],
            &[("X", "2"), ("Y", "1"), ("Y", "3")],
        );
        let first = InMemoryBackend::new("a");
        let second = InMemoryBackend::new("b");
        fx.builder().build("mygene", &first).unwrap();
        fx.builder().build("mygene", &second).unwrap();
        fx.builder().build("mygene", &second).unwrap();
        let ids = first.id_list().unwrap();
        assert_eq!(ids, second.id_list().unwrap());
        assert_eq!(first.get_many(&ids).unwrap(), second.get_many(&ids).unwrap());
        assert_eq!(first.count_where("symbol", &json!("bar")).unwrap(), 2);
    }

    #[test]
    fn execution_modes_agree() {
        let annotation: Vec<Document> = (0..30)
            .map(|i| Document::empty(format!("E{i}")).with_field(format!("f{}", i % 7), i))
            .collect();
        let xrefs: Vec<(String, String)> = (0..30)
            .map(|i| (format!("E{i}"), ((i % 3) + 1).to_string()))
            .collect();
        let pairs: Vec<(&str, &str)> = xrefs.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        let fx = fixture(annotation, &pairs);

        let modes = [
            ExecutionMode::Sequential,
            ExecutionMode::Pool { workers: 3 },
            ExecutionMode::Tasks { workers: 3, window: 4 },
        ];
        let mut outputs = Vec::new();
        for mode in modes {
            let target = InMemoryBackend::new("t");
            let config = MergeConfig::default().with_batch_size(5).with_mode(mode);
            fx.builder().with_config(config).build("mygene", &target).unwrap();
            let ids = target.id_list().unwrap();
            outputs.push(target.get_many(&ids).unwrap());
        }
        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[0], outputs[2]);
    }

    #[test]
    fn unmatched_secondary_root_takes_annotations() {
        let fx = fixture(
            vec![Document::empty("B").with_field("symbol", "bar")],
            &[],
        );
        let target = InMemoryBackend::new("t");
        let record = fx.builder().build("mygene", &target).unwrap();
        assert_eq!(record.stats["ensembl_symbol.updated"], 1);
        assert_eq!(record.stats["ensembl_symbol.dropped"], 0);
        let b = target.get(&"B".into()).unwrap().unwrap();
        assert_eq!(b.fields["symbol"], "bar");
    }

    #[test]
    fn validation_happens_before_any_write() {
        let fx = fixture(Vec::new(), &[]);
        fx.registry
            .put_build_config(&BuildConfig::new(
                "broken",
                ["entrez_gene", "not_registered"],
                ["entrez_gene"],
            ))
            .unwrap();
        let target = InMemoryBackend::with_documents("t", [gene("old")]);
        let err = fx.builder().build("broken", &target).unwrap_err();
        assert!(matches!(err, MergeError::UnknownSource { .. }));
        assert_eq!(target.count().unwrap(), 1);
        assert!(fx.registry.runs("broken").unwrap().is_empty());

        let err = fx.builder().build("nope", &target).unwrap_err();
        assert!(matches!(err, MergeError::UnknownBuild(_)));

        let err = fx
            .builder()
            .with_config(MergeConfig::default().restart_at(5))
            .build("mygene", &target)
            .unwrap_err();
        assert!(matches!(err, MergeError::InvalidRestart { .. }));
    }

    #[test]
    fn missing_source_collection_is_rejected() {
        let fx = fixture(Vec::new(), &[]);
        fx.registry
            .put_source(&SourceDescriptor::canonical("entrez_go"))
            .unwrap();
        fx.registry
            .put_build_config(&BuildConfig::new(
                "go_build",
                ["entrez_gene", "entrez_go"],
                ["entrez_gene"],
            ))
            .unwrap();
        let target = InMemoryBackend::new("t");
        let err = fx.builder().build("go_build", &target).unwrap_err();
        assert!(matches!(err, MergeError::MissingSource(ref s) if s == "entrez_go"));
    }

    /// Source store that fails on one source, to exercise failure records.
    struct Failing<'a> {
        inner: &'a InMemorySourceStore,
        broken: &'a str,
    }

    impl SourceStore for Failing<'_> {
        fn sources(&self) -> StoreResult<Vec<String>> {
            self.inner.sources()
        }

        fn count(&self, name: &str, filter: &SourceFilter) -> StoreResult<u64> {
            self.inner.count(name, filter)
        }

        fn read_window(
            &self,
            name: &str,
            filter: &SourceFilter,
            skip: usize,
            limit: usize,
        ) -> StoreResult<Vec<Document>> {
            if name == self.broken {
                return Err(StoreError::Io(std::io::Error::other("disk gone")));
            }
            self.inner.read_window(name, filter, skip, limit)
        }
    }

    #[test]
    fn failure_is_recorded_and_resumable() {
        let fx = fixture(
            vec![Document::empty("X").with_field("symbol", "foo")],
            &[("X", "2")],
        );
        let target = InMemoryBackend::new("mygene_20130415_aaaaaaaa");
        let failing = Failing {
            inner: &fx.sources,
            broken: "ensembl_symbol",
        };
        let err = GeneDocBuilder::new(&fx.registry, &failing, &fx.catalog)
            .build("mygene", &target)
            .unwrap_err();
        assert!(matches!(err, MergeError::SourceFailed { index: 1, .. }));

        let failed = fx.registry.latest_run("mygene").unwrap().unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert!(failed.failure.unwrap().contains("source #1 ensembl_symbol"));
        // Roots were inserted before the failure.
        assert_eq!(target.count().unwrap(), 4);

        let resumed = fx
            .builder()
            .with_config(MergeConfig::default().restart_at(1))
            .build("mygene", &target)
            .unwrap();
        assert!(resumed.is_success());
        assert_eq!(resumed.restart_at, 1);
        assert_eq!(resumed.stats["ensembl_symbol.updated"], 1);
        assert_eq!(fx.registry.runs("mygene").unwrap().len(), 2);
    }

    #[test]
    fn resume_sees_unrefreshed_roots() {
        let fx = fixture(
            vec![Document::empty("X").with_field("symbol", "foo")],
            &[("X", "2")],
        );
        let target = SearchIndexBackend::new("mygene_20130415_aaaaaaaa");
        let failing = Failing {
            inner: &fx.sources,
            broken: "ensembl_symbol",
        };
        GeneDocBuilder::new(&fx.registry, &failing, &fx.catalog)
            .build("mygene", &target)
            .unwrap_err();

        let resumed = fx
            .builder()
            .with_config(MergeConfig::default().restart_at(1))
            .build("mygene", &target)
            .unwrap();
        assert!(resumed.is_success());
        assert_eq!(resumed.stats["total_canonical"], 4);
        assert_eq!(resumed.stats["ensembl_symbol.updated"], 1);
        assert_eq!(resumed.stats["ensembl_symbol.dropped"], 0);
        let two = target.get(&"2".into()).unwrap().unwrap();
        assert_eq!(two.fields["symbol"], "foo");
    }

    #[test]
    fn builds_into_a_docstore_collection() {
        let fx = fixture(
            vec![Document::empty("X").with_field("symbol", "foo")],
            &[("X", "2")],
        );
        let dir = tempfile::tempdir().unwrap();
        let store = genedoc_store::DocStore::open(dir.path().join("genedoc.redb")).unwrap();
        let target = store.collection("mygene_20130415_aaaaaaaa");
        let config = MergeConfig::default().with_mode(ExecutionMode::Pool { workers: 2 });
        fx.builder().with_config(config).build("mygene", &target).unwrap();
        assert_eq!(target.count().unwrap(), 4);
        assert_eq!(target.count_where("symbol", &json!("foo")).unwrap(), 1);
    }

    #[test]
    fn schema_is_prepared() {
        let fx = fixture(Vec::new(), &[]);
        fx.registry
            .put_source(
                &SourceDescriptor::canonical("entrez_gene")
                    .root()
                    .with_mapping(json!({"symbol": {"type": "string"}}).as_object().cloned().unwrap()),
            )
            .unwrap();
        let target = InMemoryBackend::new("t");
        fx.builder().build("mygene", &target).unwrap();
        let schema = target.schema().unwrap().unwrap();
        assert!(schema["properties"].as_object().unwrap().contains_key("symbol"));
    }
}
