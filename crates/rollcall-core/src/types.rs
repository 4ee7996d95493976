use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Fixed-length face descriptor vector (512-dimensional, L2-normalized).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Euclidean distance to another descriptor.
    pub fn distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A known individual from the reference image set.
///
/// `roll_number` comes from the roster table; names absent from the roster
/// are still recognized, with no roll number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub roll_number: Option<u32>,
}

/// One (identity, descriptor) pair in the descriptor store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEntry {
    pub identity: Identity,
    pub descriptor: Descriptor,
}

/// An accepted match of a probe descriptor against the store.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub identity: Identity,
    /// Euclidean distance of the winning entry.
    pub distance: f32,
}

/// Strategy for resolving a probe descriptor to a known identity.
pub trait Matcher {
    /// Return the closest entry within `tolerance`, or `None` if the probe
    /// is unknown (no entry, or the minimum distance exceeds the tolerance).
    fn nearest(
        &self,
        probe: &Descriptor,
        gallery: &[StoreEntry],
        tolerance: f32,
    ) -> Option<MatchResult>;
}

/// Euclidean nearest-neighbor matcher.
///
/// The running best is replaced only on a strictly smaller distance, so
/// equidistant entries resolve to the earliest one in store insertion
/// order. A distance exactly at the tolerance is accepted.
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn nearest(
        &self,
        probe: &Descriptor,
        gallery: &[StoreEntry],
        tolerance: f32,
    ) -> Option<MatchResult> {
        let mut best: Option<(usize, f32)> = None;

        for (i, entry) in gallery.iter().enumerate() {
            let dist = probe.distance(&entry.descriptor);
            match best {
                Some((_, d)) if dist >= d => {}
                _ => best = Some((i, dist)),
            }
        }

        match best {
            Some((i, dist)) if dist <= tolerance => Some(MatchResult {
                identity: gallery[i].identity.clone(),
                distance: dist,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, values: Vec<f32>) -> StoreEntry {
        StoreEntry {
            identity: Identity {
                name: name.to_string(),
                roll_number: None,
            },
            descriptor: Descriptor::new(values),
        }
    }

    #[test]
    fn test_distance_identical() {
        let a = Descriptor::new(vec![0.5, 0.5, 0.0]);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_distance_pythagorean() {
        let a = Descriptor::new(vec![0.0, 0.0]);
        let b = Descriptor::new(vec![3.0, 4.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_nearest_picks_minimum() {
        let gallery = vec![
            entry("far", vec![1.0, 0.0]),
            entry("near", vec![0.1, 0.0]),
        ];
        let probe = Descriptor::new(vec![0.0, 0.0]);

        let result = NearestMatcher.nearest(&probe, &gallery, 0.5).unwrap();
        assert_eq!(result.identity.name, "near");
        assert!((result.distance - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_tolerance_boundary_accepted() {
        let gallery = vec![entry("a", vec![0.5, 0.0])];
        let probe = Descriptor::new(vec![0.0, 0.0]);

        // distance is exactly the tolerance
        let result = NearestMatcher.nearest(&probe, &gallery, 0.5);
        assert!(result.is_some());
    }

    #[test]
    fn test_above_tolerance_rejected() {
        let gallery = vec![entry("a", vec![0.5001, 0.0])];
        let probe = Descriptor::new(vec![0.0, 0.0]);

        let result = NearestMatcher.nearest(&probe, &gallery, 0.5);
        assert!(result.is_none());
    }

    #[test]
    fn test_tie_break_insertion_order() {
        // Both entries are equidistant from the probe; the first wins.
        let gallery = vec![
            entry("first", vec![0.3, 0.0]),
            entry("second", vec![-0.3, 0.0]),
        ];
        let probe = Descriptor::new(vec![0.0, 0.0]);

        let result = NearestMatcher.nearest(&probe, &gallery, 0.5).unwrap();
        assert_eq!(result.identity.name, "first");
    }

    #[test]
    fn test_empty_gallery() {
        let probe = Descriptor::new(vec![0.0, 0.0]);
        assert!(NearestMatcher.nearest(&probe, &[], 0.5).is_none());
    }

    #[test]
    fn test_distinct_identities_resolve_separately() {
        let gallery = vec![
            entry("Alice", vec![1.0, 0.0, 0.0]),
            entry("Bob", vec![0.0, 1.0, 0.0]),
        ];

        let probe = Descriptor::new(vec![1.0, 0.0, 0.0]);
        let result = NearestMatcher.nearest(&probe, &gallery, 0.5).unwrap();
        assert_eq!(result.identity.name, "Alice");
        assert_eq!(result.distance, 0.0);

        let probe = Descriptor::new(vec![0.0, 1.0, 0.0]);
        let result = NearestMatcher.nearest(&probe, &gallery, 0.5).unwrap();
        assert_eq!(result.identity.name, "Bob");
    }
}
