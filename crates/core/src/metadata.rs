//! Archive metadata
//!
//! Descriptive record attached to an archive as header and/or footer. Every
//! field is optional; writers must omit absent fields rather than emit
//! defaults, so the `Option`s here are load-bearing.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bounding envelope in the archive's coordinate system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Minimum x (west)
    pub min_x: f64,
    /// Minimum y (south)
    pub min_y: f64,
    /// Maximum x (east)
    pub max_x: f64,
    /// Maximum y (north)
    pub max_y: f64,
}

impl Envelope {
    /// Create an envelope
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Envelope {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Whole-world envelope in degrees
    pub fn world() -> Self {
        Envelope::new(-180.0, -85.051_128_78, 180.0, 85.051_128_78)
    }
}

/// Default view center
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CenterPoint {
    /// Longitude / x
    pub x: f64,
    /// Latitude / y
    pub y: f64,
}

/// Type of a vector layer attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Numeric attribute
    Number,
    /// Boolean attribute
    Boolean,
    /// String attribute
    String,
}

impl FieldType {
    /// Combine two observations of the same attribute.
    ///
    /// Disagreeing observations widen to `String`.
    pub fn merge(self, other: FieldType) -> FieldType {
        if self == other {
            self
        } else {
            FieldType::String
        }
    }
}

/// Schema of one vector layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorLayer {
    /// Layer id
    pub id: String,
    /// Attribute name -> type
    #[serde(default)]
    pub fields: BTreeMap<String, FieldType>,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Lowest zoom the layer appears at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<i32>,
    /// Highest zoom the layer appears at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<i32>,
}

impl VectorLayer {
    /// Create a layer with no fields
    pub fn new(id: impl Into<String>) -> Self {
        VectorLayer {
            id: id.into(),
            fields: BTreeMap::new(),
            description: None,
            min_zoom: None,
            max_zoom: None,
        }
    }

    /// Add a field (builder pattern)
    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }

    /// Set the description (builder pattern)
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the zoom range (builder pattern)
    pub fn with_zoom_range(mut self, min_zoom: i32, max_zoom: i32) -> Self {
        self.min_zoom = Some(min_zoom);
        self.max_zoom = Some(max_zoom);
        self
    }
}

/// Archive-level metadata
///
/// Created once before the first tile is written and finalized once after
/// the last one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    /// Tileset name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tileset description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Attribution HTML
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    /// Tileset version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// `overlay` or `baselayer`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Tile format, e.g. `pbf`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Bounding envelope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Envelope>,
    /// Default view center
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<CenterPoint>,
    /// Default view zoom
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    /// Lowest zoom present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<i32>,
    /// Highest zoom present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<i32>,
    /// Vector layer schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_layers: Option<Vec<VectorLayer>>,
    /// Extension entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub others: Option<BTreeMap<String, String>>,
}

impl ArchiveMetadata {
    /// Create empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name (builder pattern)
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description (builder pattern)
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the attribution (builder pattern)
    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = Some(attribution.into());
        self
    }

    /// Set the version (builder pattern)
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the tileset type (builder pattern)
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Set the tile format (builder pattern)
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Set the bounds (builder pattern)
    pub fn with_bounds(mut self, bounds: Envelope) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Set the center (builder pattern)
    pub fn with_center(mut self, x: f64, y: f64) -> Self {
        self.center = Some(CenterPoint { x, y });
        self
    }

    /// Set the default zoom (builder pattern)
    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = Some(zoom);
        self
    }

    /// Set the zoom range (builder pattern)
    pub fn with_zoom_range(mut self, min_zoom: i32, max_zoom: i32) -> Self {
        self.min_zoom = Some(min_zoom);
        self.max_zoom = Some(max_zoom);
        self
    }

    /// Set the vector layers (builder pattern)
    pub fn with_vector_layers(mut self, layers: Vec<VectorLayer>) -> Self {
        self.vector_layers = Some(layers);
        self
    }

    /// Add an extension entry (builder pattern)
    pub fn with_other(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.others
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if let (Some(min), Some(max)) = (self.min_zoom, self.max_zoom) {
            if min > max {
                return Err(Error::InvalidMetadata(format!(
                    "min_zoom {} > max_zoom {}",
                    min, max
                )));
            }
        }
        if let Some(bounds) = &self.bounds {
            if bounds.min_x > bounds.max_x || bounds.min_y > bounds.max_y {
                return Err(Error::InvalidMetadata(format!(
                    "inverted bounds {:?}",
                    bounds
                )));
            }
        }
        if let Some(layers) = &self.vector_layers {
            if layers.iter().any(|l| l.id.is_empty()) {
                return Err(Error::InvalidMetadata(
                    "vector layer with empty id".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_merge() {
        assert_eq!(FieldType::Number.merge(FieldType::Number), FieldType::Number);
        assert_eq!(FieldType::Number.merge(FieldType::Boolean), FieldType::String);
    }

    #[test]
    fn test_builder() {
        let meta = ArchiveMetadata::new()
            .with_name("osm")
            .with_zoom_range(0, 14)
            .with_other("planetiler:version", "1.0");
        assert_eq!(meta.name.as_deref(), Some("osm"));
        assert_eq!(meta.min_zoom, Some(0));
        assert_eq!(
            meta.others.unwrap().get("planetiler:version").map(String::as_str),
            Some("1.0")
        );
    }

    #[test]
    fn test_validate_rejects_inverted_zoom() {
        let meta = ArchiveMetadata::new().with_zoom_range(5, 2);
        assert!(matches!(meta.validate(), Err(Error::InvalidMetadata(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let meta = ArchiveMetadata::new().with_bounds(Envelope::new(10.0, 0.0, -10.0, 1.0));
        assert!(meta.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_empty() {
        assert!(ArchiveMetadata::new().validate().is_ok());
    }

    #[test]
    fn test_json_omits_absent_fields() {
        let meta = ArchiveMetadata::new().with_name("x").with_kind("baselayer");
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"name":"x","type":"baselayer"}"#);
        let parsed: ArchiveMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_field_type_serde_lowercase() {
        let layer = VectorLayer::new("roads").with_field("lanes", FieldType::Number);
        let json = serde_json::to_string(&layer).unwrap();
        assert!(json.contains(r#""lanes":"number""#));
    }
}
