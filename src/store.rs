use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::common::{geometry_to_json, json_to_geometry};
use crate::types::{Layer, LayerMetadata, LayerStats, StyleConfig, UploadRecord};

/// Persistence boundary for layers and their upload history. The pipeline is
/// a pure producer: it hands a fully-built layer to this boundary in one
/// write. Transactionality beyond that is the backing store's business.
pub trait LayerStore {
    fn allocate_layer_id(&mut self) -> u64;
    fn insert_layer(&mut self, layer: Layer) -> Result<()>;
    fn layer(&self, id: u64) -> Option<&Layer>;
    fn layers(&self) -> Vec<&Layer>;
    /// Case-insensitive substring search over name and description.
    fn search_layers(&self, query: &str) -> Vec<&Layer>;
    fn update_layer(&mut self, id: u64, apply: &mut dyn FnMut(&mut Layer)) -> Result<()>;
    /// Logical deletion: the visibility flag is cleared, the row is retained.
    fn hide_layer(&mut self, id: u64) -> Result<()>;

    fn allocate_upload_id(&mut self) -> u64;
    fn insert_upload(&mut self, record: UploadRecord) -> Result<()>;
    fn update_upload(&mut self, id: u64, apply: &mut dyn FnMut(&mut UploadRecord)) -> Result<()>;
    fn uploads(&self) -> Vec<&UploadRecord>;
}

/// In-memory store: the default for tests and embedding callers that bring
/// their own persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    layers: BTreeMap<u64, Layer>,
    uploads: BTreeMap<u64, UploadRecord>,
    next_layer_id: u64,
    next_upload_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LayerStore for MemoryStore {
    fn allocate_layer_id(&mut self) -> u64 {
        self.next_layer_id += 1;
        self.next_layer_id
    }

    fn insert_layer(&mut self, layer: Layer) -> Result<()> {
        self.layers.insert(layer.id, layer);
        Ok(())
    }

    fn layer(&self, id: u64) -> Option<&Layer> {
        self.layers.get(&id)
    }

    fn layers(&self) -> Vec<&Layer> {
        self.layers.values().collect()
    }

    fn search_layers(&self, query: &str) -> Vec<&Layer> {
        let needle = query.to_lowercase();
        self.layers
            .values()
            .filter(|layer| {
                layer.name.to_lowercase().contains(&needle)
                    || layer
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            })
            .collect()
    }

    fn update_layer(&mut self, id: u64, apply: &mut dyn FnMut(&mut Layer)) -> Result<()> {
        let layer = self
            .layers
            .get_mut(&id)
            .ok_or_else(|| anyhow!("layer {id} not found"))?;
        apply(layer);
        layer.updated_at = Utc::now();
        Ok(())
    }

    fn hide_layer(&mut self, id: u64) -> Result<()> {
        self.update_layer(id, &mut |layer| layer.is_visible = false)
    }

    fn allocate_upload_id(&mut self) -> u64 {
        self.next_upload_id += 1;
        self.next_upload_id
    }

    fn insert_upload(&mut self, record: UploadRecord) -> Result<()> {
        self.uploads.insert(record.id, record);
        Ok(())
    }

    fn update_upload(&mut self, id: u64, apply: &mut dyn FnMut(&mut UploadRecord)) -> Result<()> {
        let record = self
            .uploads
            .get_mut(&id)
            .ok_or_else(|| anyhow!("upload record {id} not found"))?;
        apply(record);
        Ok(())
    }

    fn uploads(&self) -> Vec<&UploadRecord> {
        self.uploads.values().collect()
    }
}

/// Single-file JSON snapshot store, used by the CLI composition root. Every
/// mutation rewrites the snapshot.
pub struct JsonStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonStore {
    pub fn open(path: &Path) -> Result<Self> {
        let inner = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read store {}", path.display()))?;
            let snapshot: Value = serde_json::from_str(&content)
                .with_context(|| format!("corrupt store snapshot {}", path.display()))?;
            store_from_snapshot(&snapshot)?
        } else {
            MemoryStore::new()
        };
        Ok(Self { path: path.to_path_buf(), inner })
    }

    fn save(&self) -> Result<()> {
        let snapshot = snapshot_from_store(&self.inner);
        let content = serde_json::to_string_pretty(&snapshot)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        std::fs::write(&self.path, content)
            .with_context(|| format!("failed to write store {}", self.path.display()))
    }
}

impl LayerStore for JsonStore {
    fn allocate_layer_id(&mut self) -> u64 {
        self.inner.allocate_layer_id()
    }

    fn insert_layer(&mut self, layer: Layer) -> Result<()> {
        self.inner.insert_layer(layer)?;
        self.save()
    }

    fn layer(&self, id: u64) -> Option<&Layer> {
        self.inner.layer(id)
    }

    fn layers(&self) -> Vec<&Layer> {
        self.inner.layers()
    }

    fn search_layers(&self, query: &str) -> Vec<&Layer> {
        self.inner.search_layers(query)
    }

    fn update_layer(&mut self, id: u64, apply: &mut dyn FnMut(&mut Layer)) -> Result<()> {
        self.inner.update_layer(id, apply)?;
        self.save()
    }

    fn hide_layer(&mut self, id: u64) -> Result<()> {
        self.inner.hide_layer(id)?;
        self.save()
    }

    fn allocate_upload_id(&mut self) -> u64 {
        self.inner.allocate_upload_id()
    }

    fn insert_upload(&mut self, record: UploadRecord) -> Result<()> {
        self.inner.insert_upload(record)?;
        self.save()
    }

    fn update_upload(&mut self, id: u64, apply: &mut dyn FnMut(&mut UploadRecord)) -> Result<()> {
        self.inner.update_upload(id, apply)?;
        self.save()
    }

    fn uploads(&self) -> Vec<&UploadRecord> {
        self.inner.uploads()
    }
}

fn snapshot_from_store(store: &MemoryStore) -> Value {
    let layers: Vec<Value> = store
        .layers
        .values()
        .map(|layer| {
            let mut row = layer.to_json();
            row["geometry"] = geometry_to_json(&layer.geometry);
            row
        })
        .collect();
    json!({
        "nextLayerId": store.next_layer_id,
        "nextUploadId": store.next_upload_id,
        "layers": layers,
        "uploads": store.uploads.values().collect::<Vec<_>>(),
    })
}

fn store_from_snapshot(snapshot: &Value) -> Result<MemoryStore> {
    let mut store = MemoryStore::new();
    store.next_layer_id = snapshot["nextLayerId"].as_u64().unwrap_or(0);
    store.next_upload_id = snapshot["nextUploadId"].as_u64().unwrap_or(0);

    for row in snapshot["layers"].as_array().into_iter().flatten() {
        let layer = layer_from_json(row)?;
        store.layers.insert(layer.id, layer);
    }
    for row in snapshot["uploads"].as_array().into_iter().flatten() {
        let record: UploadRecord =
            serde_json::from_value(row.clone()).context("corrupt upload record")?;
        store.uploads.insert(record.id, record);
    }
    Ok(store)
}

fn parse_timestamp(value: &Value) -> DateTime<Utc> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn layer_from_json(row: &Value) -> Result<Layer> {
    let str_field = |key: &str| -> Result<&str> {
        row.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("layer row missing {key}"))
    };

    let metadata: LayerMetadata = serde_json::from_value(row["metadata"].clone())
        .context("corrupt layer metadata")?;
    let style: StyleConfig =
        serde_json::from_value(row["styleConfig"].clone()).context("corrupt style config")?;
    let geometry = json_to_geometry(&row["geometry"]).context("corrupt layer geometry")?;

    Ok(Layer {
        id: row["id"].as_u64().ok_or_else(|| anyhow!("layer row missing id"))?,
        name: str_field("name")?.to_string(),
        description: row["description"].as_str().map(str::to_string),
        layer_type: str_field("layerType")?
            .parse()
            .map_err(|e| anyhow!("{e}"))?,
        geometry_kind: str_field("geometryType")?
            .parse()
            .map_err(|e| anyhow!("{e}"))?,
        source_format: serde_json::from_value(row["sourceFormat"].clone())
            .context("corrupt source format")?,
        status: str_field("status")?.parse().map_err(|e| anyhow!("{e}"))?,
        is_visible: row["isVisible"].as_bool().unwrap_or(true),
        is_public: row["isPublic"].as_bool().unwrap_or(true),
        style,
        metadata,
        stats: LayerStats {
            area_km2: row["areaKm2"].as_f64(),
            length_km: row["lengthKm"].as_f64(),
            point_count: row["pointCount"].as_u64(),
        },
        geometry,
        created_at: parse_timestamp(&row["createdAt"]),
        updated_at: parse_timestamp(&row["updatedAt"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileFormat, GeometryKind, LayerStatus, LayerType, ProcessingInfo, SourceInfo};
    use geo::point;

    fn sample_layer(id: u64) -> Layer {
        Layer {
            id,
            name: format!("layer {id}"),
            description: Some("test".to_string()),
            layer_type: LayerType::Custom,
            geometry_kind: GeometryKind::Point,
            source_format: FileFormat::GeoJson,
            status: LayerStatus::Active,
            is_visible: true,
            is_public: true,
            style: StyleConfig::default(),
            metadata: LayerMetadata {
                properties: vec![],
                source: SourceInfo {
                    original_crs: "EPSG:4326".to_string(),
                    feature_count: 1,
                    geometry_types: [("Point".to_string(), 1)].into_iter().collect(),
                    bounds: [1.0, 2.0, 1.0, 2.0],
                },
                processing: ProcessingInfo { import_date: Utc::now(), file_size_bytes: 10 },
                geojson: None,
                original_payload: None,
            },
            stats: LayerStats { point_count: Some(1), ..Default::default() },
            geometry: geo::Geometry::Point(point!(x: 1.0, y: 2.0)),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn memory_store_roundtrip() {
        let mut store = MemoryStore::new();
        let id = store.allocate_layer_id();
        store.insert_layer(sample_layer(id)).unwrap();
        assert!(store.layer(id).is_some());
        assert_eq!(store.search_layers("LAYER").len(), 1);
        assert_eq!(store.search_layers("nothing").len(), 0);

        store.hide_layer(id).unwrap();
        assert!(!store.layer(id).unwrap().is_visible);
        assert_eq!(store.layers().len(), 1, "logical deletion retains the row");
    }

    #[test]
    fn json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layers.json");

        {
            let mut store = JsonStore::open(&path).unwrap();
            let id = store.allocate_layer_id();
            store.insert_layer(sample_layer(id)).unwrap();
            let upload_id = store.allocate_upload_id();
            store
                .insert_upload(UploadRecord::started(upload_id, "wells.geojson", 10, FileFormat::GeoJson))
                .unwrap();
        }

        let store = JsonStore::open(&path).unwrap();
        assert_eq!(store.layers().len(), 1);
        assert_eq!(store.uploads().len(), 1);
        let layer = store.layers()[0];
        assert_eq!(layer.geometry_kind, GeometryKind::Point);
        assert_eq!(layer.stats.point_count, Some(1));
        assert!(matches!(layer.geometry, geo::Geometry::Point(_)));
    }
}
