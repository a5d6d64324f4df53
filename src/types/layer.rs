use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use geo::Geometry;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::common::geometry_to_json;
use crate::error::PipelineError;
use crate::types::{FileFormat, GeometryKind};

/// Thematic category of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Deposit,
    Infrastructure,
    Zone,
    Custom,
}

impl LayerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerType::Deposit => "deposit",
            LayerType::Infrastructure => "infrastructure",
            LayerType::Zone => "zone",
            LayerType::Custom => "custom",
        }
    }
}

impl FromStr for LayerType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, PipelineError> {
        match s.to_ascii_lowercase().as_str() {
            "deposit" => Ok(LayerType::Deposit),
            "infrastructure" => Ok(LayerType::Infrastructure),
            "zone" => Ok(LayerType::Zone),
            "custom" => Ok(LayerType::Custom),
            other => Err(PipelineError::Validation(anyhow::anyhow!(
                "invalid layer type: {other} (expected deposit, infrastructure, zone or custom)"
            ))),
        }
    }
}

/// Operational status of a layer. Drives the default color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerStatus {
    Active,
    InDevelopment,
    Exploratory,
    Closed,
}

impl LayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerStatus::Active => "active",
            LayerStatus::InDevelopment => "in-development",
            LayerStatus::Exploratory => "exploratory",
            LayerStatus::Closed => "closed",
        }
    }
}

impl FromStr for LayerStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, PipelineError> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(LayerStatus::Active),
            "in-development" | "in_development" => Ok(LayerStatus::InDevelopment),
            "exploratory" => Ok(LayerStatus::Exploratory),
            "closed" => Ok(LayerStatus::Closed),
            other => Err(PipelineError::Validation(anyhow::anyhow!(
                "invalid status: {other} (expected active, in-development, exploratory or closed)"
            ))),
        }
    }
}

/// Rendering style for the map client. Serialized with the camelCase keys the
/// client expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleConfig {
    pub color: String,
    pub fill_color: String,
    pub fill_opacity: f64,
    pub weight: f64,
    pub opacity: f64,
    pub icon_url: Option<String>,
    pub icon_size: [u32; 2],
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            color: "#3b82f6".to_string(),
            fill_color: "#3b82f6".to_string(),
            fill_opacity: 0.3,
            weight: 2.0,
            opacity: 0.8,
            icon_url: None,
            icon_size: [20, 20],
        }
    }
}

/// Provenance captured at import time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub original_crs: String,
    pub feature_count: usize,
    /// Histogram of geometry type names in the source feature set.
    pub geometry_types: BTreeMap<String, usize>,
    /// [min-lon, min-lat, max-lon, max-lat]
    pub bounds: [f64; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingInfo {
    pub import_date: DateTime<Utc>,
    pub file_size_bytes: u64,
}

/// Free-form layer metadata: import provenance plus the original per-feature
/// properties that do not survive the single-geometry merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerMetadata {
    /// Property maps of every source feature, in original order.
    pub properties: Vec<Map<String, Value>>,
    pub source: SourceInfo,
    pub processing: ProcessingInfo,
    /// Rendered GeoJSON feature, cached for fast replay on export.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geojson: Option<Value>,
    /// Degraded-mode imports keep the original interchange payload verbatim:
    /// the canonical geometry may be only an approximation of it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_payload: Option<Value>,
}

/// Derived measurements. Exactly one field is populated, according to the
/// layer's geometry family; all stay `None` for degraded-mode imports.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LayerStats {
    pub area_km2: Option<f64>,
    pub length_km: Option<f64>,
    pub point_count: Option<u64>,
}

/// The persisted, single-geometry record exposed to the map client.
#[derive(Debug, Clone)]
pub struct Layer {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub layer_type: LayerType,
    pub geometry_kind: GeometryKind,
    pub source_format: FileFormat,
    pub status: LayerStatus,
    /// Cleared on logical deletion; the row is retained.
    pub is_visible: bool,
    pub is_public: bool,
    pub style: StyleConfig,
    pub metadata: LayerMetadata,
    pub stats: LayerStats,
    /// Canonical geometry, WGS84. Its variant always matches `geometry_kind`.
    pub geometry: Geometry<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Layer {
    /// API representation (camelCase contract of the map client).
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "description": self.description,
            "layerType": self.layer_type.as_str(),
            "geometryType": self.geometry_kind.as_str(),
            "sourceFormat": self.source_format.as_str(),
            "status": self.status.as_str(),
            "isVisible": self.is_visible,
            "isPublic": self.is_public,
            "styleConfig": serde_json::to_value(&self.style).unwrap_or(Value::Null),
            "metadata": serde_json::to_value(&self.metadata).unwrap_or(Value::Null),
            "areaKm2": self.stats.area_km2,
            "lengthKm": self.stats.length_km,
            "pointCount": self.stats.point_count,
            "createdAt": self.created_at.to_rfc3339(),
            "updatedAt": self.updated_at.to_rfc3339(),
        })
    }

    /// GeoJSON Feature for map display: geometry verbatim, properties from
    /// the layer's display metadata.
    pub fn to_geojson_feature(&self) -> Value {
        json!({
            "type": "Feature",
            "id": self.id,
            "geometry": geometry_to_json(&self.geometry),
            "properties": {
                "id": self.id,
                "name": self.name,
                "description": self.description,
                "layerType": self.layer_type.as_str(),
                "geometryType": self.geometry_kind.as_str(),
                "status": self.status.as_str(),
                "styleConfig": serde_json::to_value(&self.style).unwrap_or(Value::Null),
                "areaKm2": self.stats.area_km2,
                "lengthKm": self.stats.length_km,
                "pointCount": self.stats.point_count,
            }
        })
    }
}

/// Caller-supplied configuration for one upload. Unrecognized layer types and
/// statuses are rejected here, before any parsing begins.
#[derive(Debug, Clone)]
pub struct LayerConfig {
    pub name: String,
    pub description: Option<String>,
    pub layer_type: LayerType,
    pub status: LayerStatus,
    pub visible: bool,
    pub public: bool,
}

impl LayerConfig {
    pub fn parse(
        name: &str,
        description: &str,
        layer_type: &str,
        status: &str,
    ) -> Result<Self, PipelineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PipelineError::Validation(anyhow::anyhow!(
                "layer name is required"
            )));
        }
        let description = description.trim();
        Ok(Self {
            name: name.to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
            layer_type: layer_type.parse()?,
            status: status.parse()?,
            visible: true,
            public: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_unknown_tags() {
        assert!(LayerConfig::parse("wells", "", "deposit", "active").is_ok());
        assert!(LayerConfig::parse("wells", "", "pipeline", "active").is_err());
        assert!(LayerConfig::parse("wells", "", "zone", "abandoned").is_err());
        assert!(LayerConfig::parse("  ", "", "zone", "active").is_err());
    }

    #[test]
    fn config_accepts_status_spellings() {
        let cfg = LayerConfig::parse("a", "", "custom", "in_development").unwrap();
        assert_eq!(cfg.status, LayerStatus::InDevelopment);
        let cfg = LayerConfig::parse("a", "", "custom", "In-Development").unwrap();
        assert_eq!(cfg.status, LayerStatus::InDevelopment);
    }
}
