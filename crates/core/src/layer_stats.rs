//! Per-layer schema accumulation
//!
//! Rendered tiles report which attributes each layer carried. `LayerStats`
//! folds those reports into one `vector_layers` list for the archive footer.

use crate::metadata::{ArchiveMetadata, FieldType, VectorLayer};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct LayerAccumulator {
    fields: BTreeMap<String, FieldType>,
    description: Option<String>,
    min_zoom: i32,
    max_zoom: i32,
}

/// Accumulator of vector layer schemas across tiles.
#[derive(Debug, Clone, Default)]
pub struct LayerStats {
    layers: BTreeMap<String, LayerAccumulator>,
}

impl LayerStats {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in the layers reported by one tile at `zoom`.
    ///
    /// A layer's zoom range is the range it reports, or the tile's zoom when
    /// it reports none.
    pub fn accept(&mut self, zoom: u8, layers: &[VectorLayer]) {
        let zoom = zoom as i32;
        for layer in layers {
            let min = layer.min_zoom.unwrap_or(zoom);
            let max = layer.max_zoom.unwrap_or(zoom);
            let acc = self
                .layers
                .entry(layer.id.clone())
                .or_insert_with(|| LayerAccumulator {
                    fields: BTreeMap::new(),
                    description: None,
                    min_zoom: min,
                    max_zoom: max,
                });
            acc.min_zoom = acc.min_zoom.min(min);
            acc.max_zoom = acc.max_zoom.max(max);
            if acc.description.is_none() {
                acc.description = layer.description.clone();
            }
            for (name, field_type) in &layer.fields {
                acc.fields
                    .entry(name.clone())
                    .and_modify(|t| *t = t.merge(*field_type))
                    .or_insert(*field_type);
            }
        }
    }

    /// Whether no layer has been seen
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layers seen so far, sorted by id.
    pub fn to_vector_layers(&self) -> Vec<VectorLayer> {
        self.layers
            .iter()
            .map(|(id, acc)| VectorLayer {
                id: id.clone(),
                fields: acc.fields.clone(),
                description: acc.description.clone(),
                min_zoom: Some(acc.min_zoom),
                max_zoom: Some(acc.max_zoom),
            })
            .collect()
    }

    /// Metadata for the archive footer: `metadata` with the accumulated
    /// layers filled in, unless it already declares its own.
    pub fn finalize(&self, metadata: &ArchiveMetadata) -> ArchiveMetadata {
        let mut finalized = metadata.clone();
        if finalized.vector_layers.is_none() && !self.is_empty() {
            finalized.vector_layers = Some(self.to_vector_layers());
        }
        finalized
    }
}
