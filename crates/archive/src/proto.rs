//! Length-delimited protobuf stream archive
//!
//! Messages mirror `proto/stream_archive.proto`. Each record on the wire is
//! a varint length followed by one encoded [`Entry`].

use crate::error::{ArchiveError, ArchiveResult};
use crate::writer::EntryEncoder;
use prost::Message;
use std::collections::BTreeMap;
use std::io::Write;
use tilepress_core::{
    ArchiveMetadata, CenterPoint, Envelope as CoreEnvelope, FieldType as CoreFieldType,
    TileEncodingResult, VectorLayer as CoreVectorLayer,
};

/// One record of the stream.
#[derive(Clone, PartialEq, Message)]
pub struct Entry {
    /// Record body
    #[prost(oneof = "entry::Entry", tags = "1, 2, 3")]
    pub entry: Option<entry::Entry>,
}

/// Nested types of [`Entry`].
pub mod entry {
    /// Record body variants
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Entry {
        /// A tile
        #[prost(message, tag = "1")]
        Tile(super::TileEntry),
        /// Stream header
        #[prost(message, tag = "2")]
        Initialization(super::InitializationEntry),
        /// Stream footer
        #[prost(message, tag = "3")]
        Finish(super::FinishEntry),
    }
}

/// One tile.
#[derive(Clone, PartialEq, Message)]
pub struct TileEntry {
    /// Column
    #[prost(int32, tag = "1")]
    pub x: i32,
    /// Row
    #[prost(int32, tag = "2")]
    pub y: i32,
    /// Zoom
    #[prost(int32, tag = "3")]
    pub z: i32,
    /// Tile bytes, empty for a tile without data
    #[prost(bytes = "vec", tag = "4")]
    pub encoded_data: Vec<u8>,
}

/// Stream header.
#[derive(Clone, PartialEq, Message)]
pub struct InitializationEntry {
    /// Metadata known before any tile
    #[prost(message, optional, tag = "1")]
    pub metadata: Option<Metadata>,
}

/// Stream footer.
#[derive(Clone, PartialEq, Message)]
pub struct FinishEntry {
    /// Final metadata
    #[prost(message, optional, tag = "1")]
    pub metadata: Option<Metadata>,
}

/// Archive metadata. Absent fields stay absent on the wire.
#[derive(Clone, PartialEq, Message)]
pub struct Metadata {
    /// Name
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    /// Description
    #[prost(string, optional, tag = "2")]
    pub description: Option<String>,
    /// Attribution
    #[prost(string, optional, tag = "3")]
    pub attribution: Option<String>,
    /// Version
    #[prost(string, optional, tag = "4")]
    pub version: Option<String>,
    /// Tileset type
    #[prost(string, optional, tag = "5")]
    pub r#type: Option<String>,
    /// Tile format
    #[prost(string, optional, tag = "6")]
    pub format: Option<String>,
    /// Bounds
    #[prost(message, optional, tag = "7")]
    pub bounds: Option<Envelope>,
    /// Center
    #[prost(message, optional, tag = "8")]
    pub center: Option<CoordinateXy>,
    /// Default zoom
    #[prost(double, optional, tag = "9")]
    pub zoom: Option<f64>,
    /// Minimum zoom
    #[prost(int32, optional, tag = "10")]
    pub min_zoom: Option<i32>,
    /// Maximum zoom
    #[prost(int32, optional, tag = "11")]
    pub max_zoom: Option<i32>,
    /// Layer schemas
    #[prost(message, repeated, tag = "12")]
    pub vector_layers: Vec<VectorLayer>,
    /// Free-form entries
    #[prost(btree_map = "string, string", tag = "13")]
    pub others: BTreeMap<String, String>,
}

/// Bounding box.
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    /// West
    #[prost(double, tag = "1")]
    pub min_x: f64,
    /// East
    #[prost(double, tag = "2")]
    pub max_x: f64,
    /// South
    #[prost(double, tag = "3")]
    pub min_y: f64,
    /// North
    #[prost(double, tag = "4")]
    pub max_y: f64,
}

/// Point.
#[derive(Clone, PartialEq, Message)]
pub struct CoordinateXy {
    /// Longitude
    #[prost(double, tag = "1")]
    pub x: f64,
    /// Latitude
    #[prost(double, tag = "2")]
    pub y: f64,
}

/// Schema of one vector layer.
#[derive(Clone, PartialEq, Message)]
pub struct VectorLayer {
    /// Layer id
    #[prost(string, tag = "1")]
    pub id: String,
    /// Attribute types by name
    #[prost(btree_map = "string, enumeration(vector_layer::FieldType)", tag = "2")]
    pub fields: BTreeMap<String, i32>,
    /// Description
    #[prost(string, optional, tag = "3")]
    pub description: Option<String>,
    /// Minimum zoom
    #[prost(int32, optional, tag = "4")]
    pub min_zoom: Option<i32>,
    /// Maximum zoom
    #[prost(int32, optional, tag = "5")]
    pub max_zoom: Option<i32>,
}

/// Nested types of [`VectorLayer`].
pub mod vector_layer {
    /// Attribute type
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum FieldType {
        /// Unknown
        Unspecified = 0,
        /// Number
        Number = 1,
        /// Boolean
        Boolean = 2,
        /// String
        String = 3,
    }
}

impl From<CoreFieldType> for vector_layer::FieldType {
    fn from(t: CoreFieldType) -> Self {
        match t {
            CoreFieldType::Number => vector_layer::FieldType::Number,
            CoreFieldType::Boolean => vector_layer::FieldType::Boolean,
            CoreFieldType::String => vector_layer::FieldType::String,
        }
    }
}

impl From<&CoreVectorLayer> for VectorLayer {
    fn from(layer: &CoreVectorLayer) -> Self {
        VectorLayer {
            id: layer.id.clone(),
            fields: layer
                .fields
                .iter()
                .map(|(name, t)| (name.clone(), vector_layer::FieldType::from(*t) as i32))
                .collect(),
            description: layer.description.clone(),
            min_zoom: layer.min_zoom,
            max_zoom: layer.max_zoom,
        }
    }
}

impl TryFrom<VectorLayer> for CoreVectorLayer {
    type Error = ArchiveError;

    fn try_from(layer: VectorLayer) -> ArchiveResult<Self> {
        let mut fields = BTreeMap::new();
        for (name, raw) in layer.fields {
            let field_type = match vector_layer::FieldType::try_from(raw) {
                Ok(vector_layer::FieldType::Number) => CoreFieldType::Number,
                Ok(vector_layer::FieldType::Boolean) => CoreFieldType::Boolean,
                Ok(vector_layer::FieldType::String) => CoreFieldType::String,
                _ => {
                    return Err(ArchiveError::decode(format!(
                        "layer {}: field {} has unknown type {}",
                        layer.id, name, raw
                    )))
                }
            };
            fields.insert(name, field_type);
        }
        Ok(CoreVectorLayer {
            id: layer.id,
            fields,
            description: layer.description,
            min_zoom: layer.min_zoom,
            max_zoom: layer.max_zoom,
        })
    }
}

impl From<&ArchiveMetadata> for Metadata {
    fn from(m: &ArchiveMetadata) -> Self {
        Metadata {
            name: m.name.clone(),
            description: m.description.clone(),
            attribution: m.attribution.clone(),
            version: m.version.clone(),
            r#type: m.kind.clone(),
            format: m.format.clone(),
            bounds: m.bounds.map(|b| Envelope {
                min_x: b.min_x,
                max_x: b.max_x,
                min_y: b.min_y,
                max_y: b.max_y,
            }),
            center: m.center.map(|c| CoordinateXy { x: c.x, y: c.y }),
            zoom: m.zoom,
            min_zoom: m.min_zoom,
            max_zoom: m.max_zoom,
            vector_layers: m
                .vector_layers
                .iter()
                .flatten()
                .map(VectorLayer::from)
                .collect(),
            others: m.others.clone().unwrap_or_default(),
        }
    }
}

impl TryFrom<Metadata> for ArchiveMetadata {
    type Error = ArchiveError;

    /// Repeated and map fields have no presence on the wire; empty ones
    /// decode as absent.
    fn try_from(m: Metadata) -> ArchiveResult<Self> {
        let vector_layers = if m.vector_layers.is_empty() {
            None
        } else {
            Some(
                m.vector_layers
                    .into_iter()
                    .map(CoreVectorLayer::try_from)
                    .collect::<ArchiveResult<Vec<_>>>()?,
            )
        };
        Ok(ArchiveMetadata {
            name: m.name,
            description: m.description,
            attribution: m.attribution,
            version: m.version,
            kind: m.r#type,
            format: m.format,
            bounds: m
                .bounds
                .map(|b| CoreEnvelope::new(b.min_x, b.min_y, b.max_x, b.max_y)),
            center: m.center.map(|c| CenterPoint { x: c.x, y: c.y }),
            zoom: m.zoom,
            min_zoom: m.min_zoom,
            max_zoom: m.max_zoom,
            vector_layers,
            others: if m.others.is_empty() { None } else { Some(m.others) },
        })
    }
}

impl Entry {
    /// Header entry for `metadata`.
    pub fn initialization(metadata: &ArchiveMetadata) -> Self {
        Entry {
            entry: Some(entry::Entry::Initialization(InitializationEntry {
                metadata: Some(metadata.into()),
            })),
        }
    }

    /// Tile entry. A tile without data is written with empty bytes.
    pub fn tile(tile: &TileEncodingResult) -> Self {
        Entry {
            entry: Some(entry::Entry::Tile(TileEntry {
                x: tile.coord.x() as i32,
                y: tile.coord.y() as i32,
                z: tile.coord.z() as i32,
                encoded_data: tile.tile_data.clone().unwrap_or_default(),
            })),
        }
    }

    /// Footer entry for `metadata`.
    pub fn finish(metadata: &ArchiveMetadata) -> Self {
        Entry {
            entry: Some(entry::Entry::Finish(FinishEntry {
                metadata: Some(metadata.into()),
            })),
        }
    }
}

/// Encoder for length-delimited protobuf archives.
///
/// The header entry is mandatory: tiles are rejected until `initialize`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtoEncoder;

impl ProtoEncoder {
    fn write_entry(entry: &Entry, out: &mut dyn Write) -> ArchiveResult<()> {
        out.write_all(&entry.encode_length_delimited_to_vec())?;
        Ok(())
    }
}

impl EntryEncoder for ProtoEncoder {
    fn requires_initialize(&self) -> bool {
        true
    }

    fn encode_initialize(&self, metadata: &ArchiveMetadata, out: &mut dyn Write) -> ArchiveResult<()> {
        Self::write_entry(&Entry::initialization(metadata), out)
    }

    fn encode_tile(&self, tile: &TileEncodingResult, out: &mut dyn Write) -> ArchiveResult<()> {
        Self::write_entry(&Entry::tile(tile), out)
    }

    fn encode_finish(&self, metadata: &ArchiveMetadata, out: &mut dyn Write) -> ArchiveResult<()> {
        Self::write_entry(&Entry::finish(metadata), out)
    }
}
