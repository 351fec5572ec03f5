//! Mapping of subject surface vertices onto a template surface.
//!
//! FreeSurfer template meshes such as fsaverage are vertex-aligned with subjects resampled onto them,
//! so a vertex index of the subject mesh addresses the same anatomical location in the template mesh.

use nalgebra::Point3;
use tracing::debug;

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{LocalizeError, Result};
use crate::mesh::SurfaceMesh;


/// A template mesh, loaded once and reused for every subject.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateMapper {
    mesh: SurfaceMesh,
}

impl TemplateMapper {
    pub fn new(mesh: SurfaceMesh) -> TemplateMapper {
        TemplateMapper { mesh }
    }

    /// Load the template from its two hemisphere surface files. No atlases are needed.
    pub fn load<P: AsRef<Path>>(left_surface: P, right_surface: P) -> Result<TemplateMapper> {
        let mesh = SurfaceMesh::load(left_surface, right_surface, &BTreeMap::new())?;
        debug!("Loaded template: {}", mesh);
        Ok(TemplateMapper::new(mesh))
    }

    /// Load `surf/{lh,rh}.{surface}` of a template subject directory.
    pub fn from_subject_dir<P: AsRef<Path>>(subject_dir: P, surface: &str) -> Result<TemplateMapper> {
        let surf_dir = subject_dir.as_ref().join("surf");
        TemplateMapper::load(surf_dir.join(format!("lh.{}", surface)), surf_dir.join(format!("rh.{}", surface)))
    }

    pub fn mesh(&self) -> &SurfaceMesh {
        &self.mesh
    }

    /// Template coordinates of the given subject vertex indices, in input order.
    pub fn to_template(&self, vertex_indices: &[usize]) -> Result<Vec<Point3<f64>>> {
        vertex_indices
            .iter()
            .map(|&index| match self.mesh.vertex_coordinate(index) {
                Err(LocalizeError::IndexOutOfRange(..)) => Err(LocalizeError::IndexOutOfRange(index, self.mesh.vertex_count())),
                other => other,
            })
            .collect()
    }
}
