//! Exact nearest-vertex search on a [`SurfaceMesh`].

use nalgebra::Point3;
use ndarray::{arr1, Array1, Axis};
use ndarray_stats::QuantileExt;

use crate::error::{LocalizeError, Result};
use crate::mesh::SurfaceMesh;


/// The mesh vertex closest to a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexMatch {
    pub index: usize,
    pub coordinate: Point3<f64>,
    pub distance: f64,
}


/// Euclidean distance from `point` to every mesh vertex, indexed like the vertices.
pub fn vertex_distances(point: &Point3<f64>, mesh: &SurfaceMesh) -> Result<Array1<f64>> {
    if !point.coords.iter().all(|c| c.is_finite()) {
        return Err(LocalizeError::InvalidCoordinate(format!("non-finite query point {}", point)));
    }
    let query = arr1(&[point.x, point.y, point.z]);
    let diff = mesh.vertices() - &query;
    Ok((&diff * &diff).sum_axis(Axis(1)).mapv(f64::sqrt))
}


/// Find the mesh vertex closest to `point`. Of several vertices at the same distance, the one with the lowest index wins.
///
/// # Examples
///
/// ```no_run
/// use std::collections::BTreeMap;
/// use nalgebra::Point3;
/// use neurolocalize::{nearest, SurfaceMesh};
///
/// let mesh = SurfaceMesh::load("/path/to/surf/lh.pial", "/path/to/surf/rh.pial", &BTreeMap::new()).unwrap();
/// let hit = nearest(&Point3::new(-40.0, 10.0, 22.5), &mesh).unwrap();
/// println!("vertex {} at distance {}", hit.index, hit.distance);
/// ```
pub fn nearest(point: &Point3<f64>, mesh: &SurfaceMesh) -> Result<VertexMatch> {
    let distances = vertex_distances(point, mesh)?;
    // argmin keeps the first of equal minima.
    let index = distances
        .argmin()
        .map_err(|e| LocalizeError::MeshLoad(mesh.to_string(), format!("no nearest vertex: {}", e)))?;
    Ok(VertexMatch {
        index,
        coordinate: mesh.vertex_coordinate(index)?,
        distance: distances[index],
    })
}


/// Nearest vertex for each point, in input order.
pub fn nearest_batch(points: &[Point3<f64>], mesh: &SurfaceMesh) -> Result<Vec<VertexMatch>> {
    points.iter().map(|p| nearest(p, mesh)).collect()
}


/// Atlas label of the nearest vertex for each point, in input order.
pub fn nearest_labels(points: &[Point3<f64>], mesh: &SurfaceMesh, atlas: &str) -> Result<Vec<String>> {
    labels_at(&nearest_batch(points, mesh)?, mesh, atlas)
}


/// Atlas label of each matched vertex, in input order.
pub fn labels_at(hits: &[VertexMatch], mesh: &SurfaceMesh, atlas: &str) -> Result<Vec<String>> {
    hits.iter()
        .map(|hit| {
            mesh.label(atlas, hit.index)
                .map(|l| l.to_string())
                .ok_or_else(|| LocalizeError::MeshLoad(mesh.to_string(), format!("atlas '{}' not loaded", atlas)))
        })
        .collect()
}
