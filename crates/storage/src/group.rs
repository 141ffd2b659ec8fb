//! Grouping of sorted features by tile

use crate::error::{SortError, SortResult};
use tilepress_core::{EncodedFeature, TileCoord};

/// All features of one tile, in sort-key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFeatures {
    /// Tile the features belong to
    pub coord: TileCoord,
    /// Features of the tile, never empty
    pub features: Vec<EncodedFeature>,
}

impl TileFeatures {
    /// Number of features in the tile.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Always false for groups produced by [`TileGrouper`].
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Payloads of the tile's features.
    pub fn payloads(&self) -> impl Iterator<Item = &[u8]> {
        self.features.iter().map(|f| f.payload.as_slice())
    }
}

/// Adapts a sorted feature stream into one [`TileFeatures`] per tile.
///
/// Tiles come out in strictly increasing tile order. A feature whose tile
/// is lower than the current one means the input was not sorted and ends
/// the stream with [`SortError::OutOfOrder`]; an undecodable tile id ends
/// it with [`SortError::Corruption`].
pub struct TileGrouper<I> {
    inner: I,
    pending: Option<EncodedFeature>,
    pending_error: Option<SortError>,
    last_tile: Option<u32>,
    done: bool,
}

impl<I> TileGrouper<I>
where
    I: Iterator<Item = SortResult<EncodedFeature>>,
{
    /// Group the features of `inner`.
    pub fn new(inner: I) -> Self {
        TileGrouper {
            inner,
            pending: None,
            pending_error: None,
            last_tile: None,
            done: false,
        }
    }

    fn fail(&mut self, error: SortError) -> Option<SortResult<TileFeatures>> {
        self.done = true;
        self.pending = None;
        Some(Err(error))
    }
}

impl<I> Iterator for TileGrouper<I>
where
    I: Iterator<Item = SortResult<EncodedFeature>>,
{
    type Item = SortResult<TileFeatures>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(e) = self.pending_error.take() {
            return self.fail(e);
        }

        let first = match self.pending.take() {
            Some(f) => f,
            None => match self.inner.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => return self.fail(e),
                Some(Ok(f)) => f,
            },
        };

        let tile_id = first.tile_id();
        if let Some(previous) = self.last_tile {
            if tile_id <= previous {
                return self.fail(SortError::OutOfOrder {
                    previous,
                    current: tile_id,
                });
            }
        }
        let coord = match first.coord() {
            Ok(coord) => coord,
            Err(e) => return self.fail(SortError::Corruption(e.to_string())),
        };

        let mut features = vec![first];
        loop {
            match self.inner.next() {
                None => break,
                Some(Err(e)) => {
                    // Emit the tile collected so far, fail on the next call
                    self.pending_error = Some(e);
                    break;
                }
                Some(Ok(f)) if f.tile_id() == tile_id => features.push(f),
                Some(Ok(f)) => {
                    self.pending = Some(f);
                    break;
                }
            }
        }

        self.last_tile = Some(tile_id);
        Some(Ok(TileFeatures { coord, features }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(z: u8, x: u32, y: u32, secondary: u32) -> SortResult<EncodedFeature> {
        Ok(EncodedFeature::new(
            TileCoord::new(z, x, y).unwrap(),
            secondary,
            vec![secondary as u8],
        ))
    }

    #[test]
    fn test_empty_input() {
        let mut grouper = TileGrouper::new(std::iter::empty());
        assert!(grouper.next().is_none());
    }

    #[test]
    fn test_groups_by_tile() {
        let input = vec![
            feature(0, 0, 0, 1),
            feature(1, 0, 0, 1),
            feature(1, 0, 0, 2),
            feature(1, 1, 0, 0),
            feature(1, 1, 1, 5),
            feature(1, 1, 1, 6),
        ];
        let groups: Vec<_> = TileGrouper::new(input.into_iter())
            .collect::<SortResult<Vec<_>>>()
            .unwrap();

        let shape: Vec<_> = groups.iter().map(|g| (g.coord.to_string(), g.len())).collect();
        assert_eq!(
            shape,
            vec![
                ("0/0/0".to_string(), 1),
                ("1/0/0".to_string(), 2),
                ("1/1/0".to_string(), 1),
                ("1/1/1".to_string(), 2),
            ]
        );
        assert_eq!(groups[3].payloads().collect::<Vec<_>>(), vec![&[5u8][..], &[6u8][..]]);
    }

    #[test]
    fn test_out_of_order_detected() {
        let input = vec![feature(1, 1, 0, 0), feature(1, 0, 0, 0)];
        let results: Vec<_> = TileGrouper::new(input.into_iter()).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(SortError::OutOfOrder { .. })));
    }

    #[test]
    fn test_upstream_error_after_partial_group() {
        let input = vec![
            feature(0, 0, 0, 0),
            Err(SortError::Corruption("bad chunk".into())),
            feature(1, 0, 0, 0),
        ];
        let mut grouper = TileGrouper::new(input.into_iter());
        assert_eq!(grouper.next().unwrap().unwrap().len(), 1);
        assert!(matches!(grouper.next(), Some(Err(SortError::Corruption(_)))));
        assert!(grouper.next().is_none());
    }

    #[test]
    fn test_invalid_tile_id_rejected() {
        let input = vec![Ok(EncodedFeature::from_raw(u64::MAX, vec![]))];
        let results: Vec<_> = TileGrouper::new(input.into_iter()).collect();
        assert!(matches!(results[0], Err(SortError::Corruption(_))));
    }
}
