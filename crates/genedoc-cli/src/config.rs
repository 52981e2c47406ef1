use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use genedoc_diff::DiffConfig;
use genedoc_merge::MergeConfig;
use genedoc_registry::DEFAULT_HISTORY_LIMIT;
use genedoc_store::BackendConfig;
use genedoc_sync::SyncConfig;
use genedoc_types::{BuildConfig, SourceDescriptor};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Everything the `genedoc` binary needs, read from one TOML file.
///
/// ```toml
/// sources = "data/sources"
/// catalog = "data/catalog"
/// registry = "data/registry.json"
///
/// [backend]
/// kind = "doc_store"
/// path = "data/genedoc.redb"
///
/// [merge]
/// batch_size = 50000
/// mode = { kind = "pool", workers = 8 }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub backend: BackendConfig,
    /// Directory of `<source>.jsonl` files.
    pub sources: PathBuf,
    /// Directory with `retired.tsv` and `xref/<id_type>.tsv`.
    pub catalog: PathBuf,
    /// Registry JSON file.
    pub registry: PathBuf,
    pub history_limit: usize,
    pub merge: MergeConfig,
    pub diff: DiffConfig,
    pub sync: SyncConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::DocStore {
                path: PathBuf::from("data/genedoc.redb"),
            },
            sources: PathBuf::from("data/sources"),
            catalog: PathBuf::from("data/catalog"),
            registry: PathBuf::from("data/registry.json"),
            history_limit: DEFAULT_HISTORY_LIMIT,
            merge: MergeConfig::default(),
            diff: DiffConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Read `path`, or fall back to defaults when it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}

/// Contents of a `genedoc register` input file.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RegisterFile {
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
    #[serde(default)]
    pub builds: Vec<BuildConfig>,
}

impl RegisterFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genedoc_merge::ExecutionMode;

    #[test]
    fn pipeline_config_from_toml() {
        let config: PipelineConfig = toml::from_str(
            r#"
            sources = "/srv/genedoc/sources"

            [backend]
            kind = "search_index"
            path = "/srv/genedoc/index"

            [merge]
            batch_size = 500
            mode = { kind = "tasks", workers = 4, window = 1000 }

            [sync]
            timestamp_field = "_ts"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::SearchIndex {
                path: Some("/srv/genedoc/index".into())
            }
        );
        assert_eq!(config.sources, PathBuf::from("/srv/genedoc/sources"));
        assert_eq!(config.catalog, PathBuf::from("data/catalog"));
        assert_eq!(config.merge.batch_size, 500);
        assert_eq!(
            config.merge.mode,
            ExecutionMode::Tasks {
                workers: 4,
                window: 1000
            }
        );
        assert_eq!(config.sync.timestamp_field, "_ts");
        assert_eq!(config.diff, DiffConfig::default());
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn register_file_from_toml() {
        let file: RegisterFile = toml::from_str(
            r#"
            [[sources]]
            name = "entrez_gene"
            is_root = true
            field_mapping = { symbol = { type = "string" } }

            [[sources]]
            name = "ensembl_gene"
            id_type = "ensembl"
            is_root = true

            [[builds]]
            name = "mygene"
            sources = ["entrez_gene", "ensembl_gene"]
            root_sources = ["entrez_gene", "ensembl_gene"]
            species_filter = [9606, 10090]
            "#,
        )
        .unwrap();
        assert_eq!(file.sources.len(), 2);
        assert_eq!(file.sources[1].id_type.as_deref(), Some("ensembl"));
        assert!(file.sources[0].field_mapping.contains_key("symbol"));
        assert_eq!(file.builds[0].primary_root(), Some("entrez_gene"));
        assert!(file.builds[0].species_filter.as_ref().unwrap().contains(&9606));
    }
}
