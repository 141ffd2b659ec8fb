//! Sorter → merge → grouper integration tests

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;
use tilepress_core::{EncodedFeature, TileCoord};
use tilepress_storage::{FeatureSorter, SorterConfig, TileGrouper};

fn all_tiles(max_zoom: u8) -> Vec<TileCoord> {
    let mut coords = Vec::new();
    for z in 0..=max_zoom {
        for y in 0..(1u32 << z) {
            for x in 0..(1u32 << z) {
                coords.push(TileCoord::new(z, x, y).unwrap());
            }
        }
    }
    coords
}

#[test]
fn test_shuffled_input_groups_by_tile() {
    let dir = TempDir::new().unwrap();
    let config = SorterConfig::for_testing().with_chunk_features(50);
    let sorter = FeatureSorter::new(dir.path().join("feature.db"), config).unwrap();

    let coords = all_tiles(4);
    let mut features: Vec<_> = coords
        .iter()
        .flat_map(|&coord| (0..3u32).map(move |i| EncodedFeature::new(coord, i, vec![i as u8])))
        .collect();
    features.shuffle(&mut StdRng::seed_from_u64(7));

    for feature in features {
        sorter.add(feature).unwrap();
    }
    assert!(sorter.counters().chunks_spilled > 1);

    let groups: Vec<_> = TileGrouper::new(sorter.sort().unwrap())
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(groups.len(), coords.len());
    for (group, coord) in groups.iter().zip(&coords) {
        assert_eq!(group.coord, *coord);
        let payloads: Vec<_> = group.payloads().map(|p| p[0]).collect();
        assert_eq!(payloads, vec![0, 1, 2]);
    }
}

#[test]
fn test_parallel_producers() {
    let dir = TempDir::new().unwrap();
    let config = SorterConfig::for_testing().with_threads(4).with_compression(true);
    let sorter = Arc::new(FeatureSorter::new(dir.path(), config).unwrap());

    let handles: Vec<_> = (0..4u32)
        .map(|worker| {
            let sorter = Arc::clone(&sorter);
            thread::spawn(move || {
                for coord in all_tiles(3) {
                    sorter
                        .add(EncodedFeature::new(coord, worker, worker.to_le_bytes().to_vec()))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut tiles = 0;
    let mut previous: Option<TileCoord> = None;
    for group in TileGrouper::new(sorter.sort().unwrap()) {
        let group = group.unwrap();
        assert!(previous.map_or(true, |p| p < group.coord));
        assert_eq!(group.len(), 4);
        previous = Some(group.coord);
        tiles += 1;
    }
    assert_eq!(tiles, all_tiles(3).len());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_groups_partition_input(
        keys in prop::collection::vec((0u8..=5, 0u32..32, 0u32..32, 0u32..4), 0..300),
        chunk in 1usize..40,
    ) {
        let dir = TempDir::new().unwrap();
        let config = SorterConfig::for_testing().with_chunk_features(chunk);
        let sorter = FeatureSorter::new(dir.path(), config).unwrap();

        let mut expected = std::collections::BTreeMap::new();
        for (z, x, y, secondary) in keys {
            let span = 1u32 << z;
            let coord = TileCoord::new(z, x % span, y % span).unwrap();
            sorter.add(EncodedFeature::new(coord, secondary, Vec::new())).unwrap();
            *expected.entry(coord).or_insert(0usize) += 1;
        }

        let groups: Vec<_> = TileGrouper::new(sorter.sort().unwrap())
            .collect::<Result<_, _>>()
            .unwrap();
        let actual: Vec<_> = groups.iter().map(|g| (g.coord, g.len())).collect();
        let expected: Vec<_> = expected.into_iter().collect();
        prop_assert_eq!(actual, expected);
        for group in &groups {
            prop_assert!(group.features.windows(2).all(|w| w[0].secondary() <= w[1].secondary()));
        }
    }
}
