//! A single brain mesh spanning both hemispheres, with one or more surface atlases.
//!
//! Left hemisphere vertices come first, right hemisphere vertices are appended, so every
//! vertex has one global index. Atlas region names are combined the same way: the right
//! hemisphere's region indices are offset by the number of left hemisphere regions.

use nalgebra::Point3;
use ndarray::Array2;
use tracing::debug;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{LocalizeError, Result};
use crate::fs_annot::{read_annot, FsAnnot, UNMATCHED_REGION_INDEX};
use crate::fs_surface::{read_surf, BrainMesh};


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hemisphere {
    Left,
    Right,
}

impl Hemisphere {
    /// FreeSurfer file name prefix, `lh` or `rh`.
    pub fn prefix(&self) -> &'static str {
        match self {
            Hemisphere::Left => "lh",
            Hemisphere::Right => "rh",
        }
    }

    fn label_prefix(&self) -> &'static str {
        match self {
            Hemisphere::Left => "L_",
            Hemisphere::Right => "R_",
        }
    }
}


/// Left and right annot files of one atlas.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasFiles {
    pub left: PathBuf,
    pub right: PathBuf,
}

impl AtlasFiles {
    /// The `label/{lh,rh}.{annot}.annot` files of a FreeSurfer subject directory.
    pub fn in_subject_dir<P: AsRef<Path>>(subject_dir: P, annot: &str) -> AtlasFiles {
        let label_dir = subject_dir.as_ref().join("label");
        AtlasFiles {
            left: label_dir.join(format!("lh.{}.annot", annot)),
            right: label_dir.join(format!("rh.{}.annot", annot)),
        }
    }
}


/// Region names and the per-vertex region index of one hemisphere. A region index of `-1` marks a vertex without region.
#[derive(Debug, Clone, PartialEq)]
pub struct HemisphereLabels {
    pub names: Vec<String>,
    pub vertex_regions: Vec<i32>,
}

impl From<&FsAnnot> for HemisphereLabels {
    fn from(annot: &FsAnnot) -> HemisphereLabels {
        HemisphereLabels {
            names: annot.regions(),
            vertex_regions: annot.vertex_region_indices(),
        }
    }
}


#[derive(Debug, Clone, PartialEq)]
struct Atlas {
    names: Vec<String>,
    vertex_labels: Vec<usize>,
}


/// An immutable two-hemisphere surface mesh with atlas labels.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceMesh {
    vertices: Array2<f64>,
    faces: Vec<i32>,
    left_vertex_count: usize,
    atlases: BTreeMap<String, Atlas>,
}

impl SurfaceMesh {

    /// Load both hemisphere surfaces and the given atlases, keyed by atlas name.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::collections::BTreeMap;
    /// use neurolocalize::{AtlasFiles, SurfaceMesh};
    ///
    /// let subject = "/path/to/subjects_dir/subject1";
    /// let mut atlases = BTreeMap::new();
    /// atlases.insert(String::from("dk"), AtlasFiles::in_subject_dir(subject, "aparc"));
    /// let mesh = SurfaceMesh::load(format!("{}/surf/lh.pial", subject), format!("{}/surf/rh.pial", subject), &atlases).unwrap();
    /// println!("{}", mesh.label("dk", 0).unwrap());
    /// ```
    pub fn load<P: AsRef<Path>>(left_surface: P, right_surface: P, atlases: &BTreeMap<String, AtlasFiles>) -> Result<SurfaceMesh> {
        let lh = read_surf(&left_surface).map_err(|e| mesh_load_error(left_surface.as_ref(), e))?;
        let rh = read_surf(&right_surface).map_err(|e| mesh_load_error(right_surface.as_ref(), e))?;

        let mut labels = BTreeMap::new();
        for (atlas, files) in atlases {
            let lh_annot = read_annot(&files.left).map_err(|e| mesh_load_error(&files.left, e))?;
            let rh_annot = read_annot(&files.right).map_err(|e| mesh_load_error(&files.right, e))?;
            debug!("Atlas {}: {} / {}", atlas, lh_annot, rh_annot);
            labels.insert(atlas.clone(), (HemisphereLabels::from(&lh_annot), HemisphereLabels::from(&rh_annot)));
        }

        SurfaceMesh::from_hemispheres(&lh.mesh, &rh.mesh, labels)
    }

    /// Combine in-memory hemisphere meshes and their atlas labels into one mesh.
    pub fn from_hemispheres(lh: &BrainMesh, rh: &BrainMesh, atlases: BTreeMap<String, (HemisphereLabels, HemisphereLabels)>) -> Result<SurfaceMesh> {
        let left_vertex_count = lh.num_vertices();
        let merged = lh.merge(rh);
        let num_vertices = merged.num_vertices();

        let vertices = Array2::from_shape_vec(
            (num_vertices, 3),
            merged.vertices.iter().map(|&c| c as f64).collect(),
        ).map_err(|e| LocalizeError::MeshLoad(String::from("combined mesh"), e.to_string()))?;

        let mut combined = BTreeMap::new();
        for (atlas, (left, right)) in atlases {
            let atlas_labels = combine_atlas(&atlas, &left, &right, left_vertex_count, rh.num_vertices())?;
            combined.insert(atlas, atlas_labels);
        }

        Ok(SurfaceMesh {
            vertices,
            faces: merged.faces,
            left_vertex_count,
            atlases: combined,
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.nrows()
    }

    pub fn left_vertex_count(&self) -> usize {
        self.left_vertex_count
    }

    /// All vertex coordinates, one row per global vertex index.
    pub fn vertices(&self) -> &Array2<f64> {
        &self.vertices
    }

    /// Face vertex indices, 3 per face, in the global index space.
    pub fn faces(&self) -> &[i32] {
        &self.faces
    }

    pub fn atlas_names(&self) -> Vec<String> {
        self.atlases.keys().cloned().collect()
    }

    pub fn vertex_coordinate(&self, index: usize) -> Result<Point3<f64>> {
        self.check_index(index)?;
        let row = self.vertices.row(index);
        Ok(Point3::new(row[0], row[1], row[2]))
    }

    /// The region name of the vertex in the given atlas, `None` if the atlas was not loaded or the index is out of range.
    pub fn label(&self, atlas: &str, index: usize) -> Option<&str> {
        let atlas = self.atlases.get(atlas)?;
        let region = *atlas.vertex_labels.get(index)?;
        Some(atlas.names[region].as_str())
    }

    pub fn hemisphere_of(&self, index: usize) -> Result<Hemisphere> {
        self.local_index(index).map(|(hemi, _)| hemi)
    }

    /// Map a global vertex index back to its hemisphere and the vertex index within that hemisphere.
    pub fn local_index(&self, index: usize) -> Result<(Hemisphere, usize)> {
        self.check_index(index)?;
        if index < self.left_vertex_count {
            Ok((Hemisphere::Left, index))
        } else {
            Ok((Hemisphere::Right, index - self.left_vertex_count))
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.vertex_count() {
            return Err(LocalizeError::IndexOutOfRange(index, self.vertex_count()));
        }
        Ok(())
    }
}

impl fmt::Display for SurfaceMesh {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Surface mesh with {} vertices ({} left hemisphere) and {} atlases.", self.vertex_count(), self.left_vertex_count, self.atlases.len())
    }
}


fn mesh_load_error(path: &Path, err: LocalizeError) -> LocalizeError {
    LocalizeError::MeshLoad(path.display().to_string(), err.to_string())
}

fn prefixed_name(hemi: Hemisphere, name: &str) -> String {
    let prefix = hemi.label_prefix();
    if name.starts_with(prefix) {
        name.to_string()
    } else {
        format!("{}{}", prefix, name)
    }
}

fn combine_atlas(atlas: &str, left: &HemisphereLabels, right: &HemisphereLabels, lh_vertices: usize, rh_vertices: usize) -> Result<Atlas> {
    let mut names: Vec<String> = left.names.iter().map(|n| prefixed_name(Hemisphere::Left, n)).collect();
    names.extend(right.names.iter().map(|n| prefixed_name(Hemisphere::Right, n)));

    let mut vertex_labels = Vec::with_capacity(lh_vertices + rh_vertices);
    for (hemi, labels, expected, offset) in &[
        (Hemisphere::Left, left, lh_vertices, 0),
        (Hemisphere::Right, right, rh_vertices, left.names.len()),
    ] {
        let origin = format!("{} atlas '{}'", hemi.prefix(), atlas);
        if labels.vertex_regions.len() != *expected {
            return Err(LocalizeError::MeshLoad(
                origin,
                format!("{} vertex labels for a hemisphere with {} vertices", labels.vertex_regions.len(), expected),
            ));
        }
        for &region in &labels.vertex_regions {
            // Vertices without region keep the hemisphere's own entry 0 before offsetting.
            let region = if region == UNMATCHED_REGION_INDEX { 0 } else { region };
            if region < 0 || region as usize >= labels.names.len() {
                return Err(LocalizeError::MeshLoad(
                    origin,
                    format!("region index {} outside colortable with {} entries", region, labels.names.len()),
                ));
            }
            vertex_labels.push(region as usize + offset);
        }
    }

    Ok(Atlas { names, vertex_labels })
}
