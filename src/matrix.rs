//! Precomputed distance matrix oracle.
//!
//! Distinct locations are deduplicated by coordinate key and every pair is
//! resolved once up front, so lookups during search are a hash probe plus
//! an index.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::model::{Location, LocationKey};
use crate::traits::{Distance, DistanceMatrixProvider, DistanceOracle};

#[derive(Debug, Clone, Default)]
pub struct MatrixOracle {
    index: HashMap<LocationKey, usize>,
    size: usize,
    data: Vec<Distance>,
}

impl MatrixOracle {
    /// Resolves every location pair through `oracle`, rows in parallel.
    pub fn precompute<O>(oracle: &O, locations: &[Location]) -> Self
    where
        O: DistanceOracle + ?Sized,
    {
        let unique = dedupe_locations(locations);
        let data = unique
            .par_iter()
            .flat_map_iter(|from| unique.iter().map(move |to| oracle.distance(from, to)))
            .collect();
        Self::assemble(&unique, data)
    }

    /// Adopts a matrix from a batch backend. Missing or short rows are
    /// padded with [`Distance::UNREACHABLE`].
    pub fn from_provider<P>(provider: &P, locations: &[Location]) -> Self
    where
        P: DistanceMatrixProvider + ?Sized,
    {
        let unique = dedupe_locations(locations);
        let rows = provider.matrix_for(&unique);
        let n = unique.len();
        let mut data = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                let cell = rows
                    .get(i)
                    .and_then(|row| row.get(j))
                    .copied()
                    .unwrap_or(if i == j { Distance::ZERO } else { Distance::UNREACHABLE });
                data.push(cell);
            }
        }
        Self::assemble(&unique, data)
    }

    fn assemble(unique: &[Location], data: Vec<Distance>) -> Self {
        let index = unique
            .iter()
            .enumerate()
            .map(|(i, location)| (location.key(), i))
            .collect();
        Self {
            index,
            size: unique.len(),
            data,
        }
    }

    /// Number of distinct locations held.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn contains(&self, location: &Location) -> bool {
        self.index.contains_key(&location.key())
    }
}

impl DistanceOracle for MatrixOracle {
    fn distance(&self, from: &Location, to: &Location) -> Distance {
        match (self.index.get(&from.key()), self.index.get(&to.key())) {
            (Some(&i), Some(&j)) => self.data[i * self.size + j],
            _ => Distance::UNREACHABLE,
        }
    }
}

fn dedupe_locations(locations: &[Location]) -> Vec<Location> {
    let mut seen = HashMap::new();
    let mut unique = Vec::new();
    for location in locations {
        if seen.insert(location.key(), unique.len()).is_none() {
            unique.push(*location);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::haversine::HaversineOracle;

    fn locations() -> Vec<Location> {
        vec![
            Location::origin(36.1, -115.1),
            Location::pickup(36.2, -115.2),
            Location::dropoff(36.3, -115.3),
            Location::pickup(36.1, -115.1),
        ]
    }

    #[test]
    fn test_precompute_matches_inner_oracle() {
        let inner = HaversineOracle::default();
        let matrix = MatrixOracle::precompute(&inner, &locations());
        assert_eq!(matrix.size(), 3, "duplicate coordinates share a row");
        for from in locations() {
            for to in locations() {
                assert_eq!(matrix.distance(&from, &to), inner.distance(&from, &to));
            }
        }
    }

    #[test]
    fn test_unknown_location_is_unreachable() {
        let matrix = MatrixOracle::precompute(&HaversineOracle::default(), &locations());
        let stranger = Location::dropoff(10.0, 10.0);
        assert!(!matrix.contains(&stranger));
        assert!(matrix.distance(&locations()[0], &stranger).is_unreachable());
    }

    struct ShortProvider;

    impl DistanceMatrixProvider for ShortProvider {
        fn matrix_for(&self, locations: &[Location]) -> Vec<Vec<Distance>> {
            // Only the first row comes back.
            vec![vec![Distance::new(5, 7); locations.len()]]
        }
    }

    #[test]
    fn test_from_provider_pads_missing_rows() {
        let locs = locations();
        let matrix = MatrixOracle::from_provider(&ShortProvider, &locs);
        assert_eq!(matrix.distance(&locs[0], &locs[1]), Distance::new(5, 7));
        assert_eq!(matrix.distance(&locs[1], &locs[1]), Distance::ZERO);
        assert!(matrix.distance(&locs[1], &locs[2]).is_unreachable());
    }
}
