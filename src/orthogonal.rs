//! Search for the surface vertex underneath a planar (grid or strip) bipolar pair.
//!
//! The vertex nearest to a pair's midpoint is a poor choice for contacts lying tangent on the
//! cortex. Instead, the vertex closest to the midpoint whose line to the midpoint is about
//! perpendicular to the electrode axis is used.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use std::cmp::Ordering;
use std::f64::consts::FRAC_PI_2;

use crate::error::{LocalizeError, Result};
use crate::mesh::SurfaceMesh;
use crate::nearest::vertex_distances;
use crate::store::{CoordinateSystem, CoordinateType, LocalizationStore, PairName};

/// Search radius around the pair midpoint. Doubled once if no vertex lies within it.
pub const ORTHOGONAL_SEARCH_RADIUS: f64 = 5.0;

/// Maximum deviation from a right angle, in radians.
pub const ORTHOGONALITY_TOLERANCE: f64 = 0.1;


/// Parameters of the orthogonal vertex search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrthogonalSearch {
    pub radius: f64,
    pub tolerance: f64,
}

impl Default for OrthogonalSearch {
    fn default() -> OrthogonalSearch {
        OrthogonalSearch {
            radius: ORTHOGONAL_SEARCH_RADIUS,
            tolerance: ORTHOGONALITY_TOLERANCE,
        }
    }
}


/// Result for one planar pair. `vertex` is `None` and `coordinate` is the origin if no vertex qualified.
#[derive(Debug, Clone, PartialEq)]
pub struct OrthogonalMatch {
    pub pair: PairName,
    pub coordinate: Point3<f64>,
    pub vertex: Option<usize>,
}

impl OrthogonalMatch {
    pub fn is_found(&self) -> bool {
        self.vertex.is_some()
    }
}


impl OrthogonalSearch {

    /// Find the orthogonal vertex for the pair with contact coordinates `first` and `second`.
    ///
    /// Candidates within `radius` of the midpoint are tried nearest first; if there are none, the candidates within
    /// twice the radius are used instead. Returns `None` if no candidate is within `tolerance` of a right angle.
    pub fn find(&self, first: &Point3<f64>, second: &Point3<f64>, mesh: &SurfaceMesh) -> Result<Option<usize>> {
        let midpoint = nalgebra::center(first, second);
        let axis = midpoint - first;
        let distances = vertex_distances(&midpoint, mesh)?;

        let mut candidates = within(&distances, self.radius);
        if candidates.is_empty() {
            candidates = within(&distances, 2.0 * self.radius);
        }
        debug!("{} candidate vertices around bipolar midpoint {}", candidates.len(), midpoint);

        candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));

        for (index, _) in candidates {
            let direction = midpoint - mesh.vertex_coordinate(index)?;
            if direction.norm() == 0.0 {
                continue;
            }
            if (axis.angle(&direction) - FRAC_PI_2).abs() < self.tolerance {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }
}

fn within(distances: &ndarray::Array1<f64>, radius: f64) -> Vec<(usize, f64)> {
    distances
        .iter()
        .enumerate()
        .filter(|(_, &d)| d < radius)
        .map(|(i, &d)| (i, d))
        .collect()
}


/// Run the orthogonal search for every pair whose first contact is a grid or strip contact, using corrected surface coordinates.
///
/// Pairs of other electrode types are left out. Pairs with unknown contacts or without corrected coordinates are skipped with a warning.
pub fn orthogonal_vertices<S: LocalizationStore + ?Sized>(store: &S, mesh: &SurfaceMesh, search: &OrthogonalSearch) -> Result<Vec<OrthogonalMatch>> {
    let mut matches = Vec::new();
    for pair in store.get_pairs() {
        let contact_type = match store.get_contact_type(&pair.0) {
            Ok(t) => t,
            Err(LocalizeError::InvalidContact(name)) => {
                warn!("Skipping pair {}-{}: invalid contact {}", pair.0, pair.1, name);
                continue;
            }
            Err(e) => return Err(e),
        };
        if !contact_type.is_planar() {
            continue;
        }

        let (first, second) = match corrected_pair_coordinates(store, &pair)? {
            Some(coords) => coords,
            None => {
                warn!("Skipping pair {}-{}: no corrected surface coordinates", pair.0, pair.1);
                continue;
            }
        };

        let vertex = search.find(&first, &second, mesh)?;
        let coordinate = match vertex {
            Some(index) => mesh.vertex_coordinate(index)?,
            None => Point3::origin(),
        };
        debug!("Orthogonal vertex for {}-{}: {:?} at {}", pair.0, pair.1, vertex, coordinate);
        matches.push(OrthogonalMatch { pair, coordinate, vertex });
    }
    Ok(matches)
}

fn corrected_pair_coordinates<S: LocalizationStore + ?Sized>(store: &S, pair: &PairName) -> Result<Option<(Point3<f64>, Point3<f64>)>> {
    let mut coords = Vec::with_capacity(2);
    for name in &[&pair.0, &pair.1] {
        match store.get_contact_coordinate(CoordinateSystem::Fs, name, CoordinateType::Corrected) {
            Ok(Some(c)) => coords.push(c),
            Ok(None) => return Ok(None),
            Err(LocalizeError::InvalidContact(_)) => return Ok(None),
            Err(e) => return Err(e),
        }
    }
    Ok(Some((coords[0], coords[1])))
}
