use crate::error::{FilingsError, Result};
use crate::ingestion::{read_filings, FilingSource};
use crate::schema::DatasetView;
use crate::FilingsPipeline;
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Session memo of the built dataset, keyed by the SHA-256 of the input files.
pub struct DatasetCache {
    pipeline: FilingsPipeline,
    entry: Option<CacheEntry>,
}

struct CacheEntry {
    key: String,
    view: Arc<DatasetView>,
}

struct LoadedSource<'a> {
    source: &'a FilingSource,
    bytes: Vec<u8>,
}

fn read_sources(sources: &[FilingSource]) -> Result<Vec<LoadedSource<'_>>> {
    sources
        .iter()
        .map(|source| {
            let bytes = std::fs::read(&source.path).map_err(|e| FilingsError::MissingInput {
                path: source.path.display().to_string(),
                source: e,
            })?;
            Ok(LoadedSource { source, bytes })
        })
        .collect()
}

fn hash_sources(loaded: &[LoadedSource<'_>]) -> String {
    let mut hasher = Sha256::new();
    for item in loaded {
        hasher.update(item.source.entity_type.label().as_bytes());
        hasher.update((item.bytes.len() as u64).to_le_bytes());
        hasher.update(&item.bytes);
    }
    format!("{:x}", hasher.finalize())
}

/// Content hash of the given input files, as used for the cache key.
pub fn content_key(sources: &[FilingSource]) -> Result<String> {
    Ok(hash_sources(&read_sources(sources)?))
}

impl DatasetCache {
    pub fn new(pipeline: FilingsPipeline) -> Self {
        Self {
            pipeline,
            entry: None,
        }
    }

    /// Returns the cached dataset when the inputs are unchanged, rebuilding otherwise.
    pub fn get_or_build(&mut self, sources: &[FilingSource]) -> Result<Arc<DatasetView>> {
        let loaded = read_sources(sources)?;
        let key = hash_sources(&loaded);

        if let Some(entry) = &self.entry {
            if entry.key == key {
                debug!("Dataset cache hit ({})", &key[..12]);
                return Ok(Arc::clone(&entry.view));
            }
        }

        info!("Dataset cache miss ({}); rebuilding", &key[..12]);
        let mut rows = Vec::new();
        for item in &loaded {
            let label = item.source.path.display().to_string();
            let mut parsed = read_filings(item.bytes.as_slice(), item.source.entity_type, &label)?;
            rows.append(&mut parsed);
        }

        let view = Arc::new(self.pipeline.build(rows));
        self.entry = Some(CacheEntry {
            key,
            view: Arc::clone(&view),
        });
        Ok(view)
    }

    pub fn invalidate(&mut self) {
        if self.entry.take().is_some() {
            debug!("Dataset cache invalidated");
        }
    }

    pub fn cached_key(&self) -> Option<&str> {
        self.entry.as_ref().map(|e| e.key.as_str())
    }

    pub fn pipeline(&self) -> &FilingsPipeline {
        &self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::schema::EntityType;
    use std::io::Write;

    const HEADER: &str = "entidad,año,mes,comisiones_percibidas,comisiones_netas,margen_bruto,gastos_explotacion,resultados_antes_impuestos,fondos_propios,activos_totales";

    fn write_csv(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", HEADER).unwrap();
        write!(file, "{}", body).unwrap();
        path
    }

    #[test]
    fn test_cache_hit_miss_and_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "sociedades.csv",
            "ACME S.V.,2023,Marzo,100,90,80,50,30,400,1000\nACME S.V.,2023,Junio,220,200,170,100,60,410,1100\n",
        );
        let sources = vec![FilingSource::new(&path, EntityType::SecuritiesFirm)];

        let pipeline = FilingsPipeline::new(PipelineConfig::default()).unwrap();
        let mut cache = DatasetCache::new(pipeline);
        assert!(cache.cached_key().is_none());

        let first = cache.get_or_build(&sources).unwrap();
        let second = cache.get_or_build(&sources).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 2);
        assert_eq!(cache.cached_key().unwrap(), content_key(&sources).unwrap());

        write_csv(
            &dir,
            "sociedades.csv",
            "ACME S.V.,2023,Marzo,100,90,80,50,30,400,1000\n",
        );
        let third = cache.get_or_build(&sources).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(third.is_empty(), "a single quarter is filtered out");

        cache.invalidate();
        assert!(cache.cached_key().is_none());
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let present = write_csv(&dir, "agencias.csv", "");
        let sources = vec![
            FilingSource::new(&present, EntityType::SecuritiesAgency),
            FilingSource::new(dir.path().join("missing.csv"), EntityType::SecuritiesFirm),
        ];

        let mut cache = DatasetCache::new(FilingsPipeline::new(PipelineConfig::default()).unwrap());
        let err = cache.get_or_build(&sources).unwrap_err();
        assert!(matches!(err, FilingsError::MissingInput { .. }));
        assert!(cache.cached_key().is_none());
    }

    #[test]
    fn test_entity_type_is_part_of_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "data.csv", "");
        let as_firm = content_key(&[FilingSource::new(&path, EntityType::SecuritiesFirm)]).unwrap();
        let as_agency =
            content_key(&[FilingSource::new(&path, EntityType::SecuritiesAgency)]).unwrap();
        assert_ne!(as_firm, as_agency);
        assert_eq!(as_firm.len(), 64);
    }
}
