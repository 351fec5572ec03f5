//! Functions for reading FreeSurfer brain surface parcellations from annot files.
//!
//! These files assign each vertex of a brain surface mesh to exactly one brain region
//! or label. A so-called colortable contains data on the regions, including the region's
//! name, an RGB display color, and a unique identifier.

use byteordered::ByteOrdered;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::fmt;

use crate::util::read_fixed_length_string;
use crate::error::{LocalizeError, Result};

/// Region index assigned to vertices whose label matches no colortable entry.
pub const UNMATCHED_REGION_INDEX: i32 = -1;


#[derive(Debug, Clone, PartialEq)]
pub struct FsAnnotColortable {
    pub id: Vec<i32>,  // A region index, not really needed. The 'label' is unique as well and more relevant, see below.
    pub name: Vec<String>,
    pub r: Vec<i32>,
    pub g: Vec<i32>,
    pub b: Vec<i32>,
    pub a: Vec<i32>,
    pub label: Vec<i32>, // A unique label computed from r,g,b. Used in annot.vertex_labels to identify the region.
}

impl FsAnnotColortable {

    /// Read a colortable in format version 2 from a reader. The reader must be positioned right after the entry count that follows the version tag.
    pub fn from_reader<S>(input: &mut S) -> Result<FsAnnotColortable>
    where
        S: Read,
    {
        let mut input = ByteOrdered::be(input);

        let num_chars_orig_filename: i32 = input.read_i32()?; // Length of following string.
        let _orig_filename = read_fixed_length_string(&mut input, num_chars_orig_filename as usize)?;
        let num_colortable_entries: i32 = input.read_i32()?; // Yes, it is stored twice. Once here, once before.

        if num_colortable_entries < 0 {
            return Err(LocalizeError::UnsupportedFsAnnotFormatVersion);
        }
        let n = num_colortable_entries as usize;

        let mut id: Vec<i32> = Vec::with_capacity(n);
        let mut name: Vec<String> = Vec::with_capacity(n);
        let mut r: Vec<i32> = Vec::with_capacity(n);
        let mut g: Vec<i32> = Vec::with_capacity(n);
        let mut b: Vec<i32> = Vec::with_capacity(n);
        let mut a: Vec<i32> = Vec::with_capacity(n);
        let mut label: Vec<i32> = Vec::with_capacity(n);

        for idx in 0..n {
            id.push(input.read_i32()?);
            let num_chars_region_name: i32 = input.read_i32()?; // Length of following string.
            name.push(read_fixed_length_string(&mut input, num_chars_region_name as usize)?);
            r.push(input.read_i32()?);
            g.push(input.read_i32()?);
            b.push(input.read_i32()?);
            a.push(input.read_i32()?);

            label.push(r[idx] + g[idx] * (1 << 8) + b[idx] * (1 << 16) + a[idx] * (1 << 24));
        }

        Ok(FsAnnotColortable { id, name, r, g, b, a, label })
    }
}

impl fmt::Display for FsAnnotColortable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Colortable for {} brain regions.", self.id.len())
    }
}


/// Models a FreeSurfer brain surface parcellation from an annot file. This is the result of applying a brain atlas (like Desikan-Killiani) to a subject. The `vertex_labels` field contains one entry per mesh vertex, in vertex order, and assigns to each vertex a brain region using the `label` field (not the `id` field!) from the `colortable`.
#[derive(Debug, Clone, PartialEq)]
pub struct FsAnnot {
    pub vertex_indices: Vec<i32>,
    pub vertex_labels: Vec<i32>,
    pub colortable: FsAnnotColortable,
}

impl FsAnnot {
    /// Read an FsAnnot instance from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<FsAnnot> {
        let mut file = BufReader::new(File::open(path)?);
        FsAnnot::from_reader(&mut file)
    }

    /// Read an FsAnnot instance from the given byte stream.
    pub fn from_reader<S>(input: &mut S) -> Result<FsAnnot>
    where
        S: Read,
    {
        let mut file = ByteOrdered::be(input);

        let num_vertices: i32 = file.read_i32()?;
        if num_vertices < 0 {
            return Err(LocalizeError::UnsupportedFsAnnotFormatVersion);
        }

        // The entries are read before anything is sized by the count, a corrupt count ends in an I/O error.
        let mut entries : Vec<(i32, i32)> = Vec::new();
        for _ in 0..num_vertices {
            let vertex_index = file.read_i32()?;
            let label = file.read_i32()?;
            if vertex_index < 0 || vertex_index >= num_vertices {
                return Err(LocalizeError::UnsupportedFsAnnotFormatVersion);
            }
            entries.push((vertex_index, label));
        }

        // Entries may come in any vertex order, labels are stored by vertex index.
        let vertex_indices : Vec<i32> = (0..num_vertices).collect();
        let mut vertex_labels : Vec<i32> = vec![0; num_vertices as usize];
        for (vertex_index, label) in entries {
            vertex_labels[vertex_index as usize] = label;
        }

        let has_colortable: i32 = file.read_i32()?;

        if has_colortable != 1 {
            return Err(LocalizeError::UnsupportedFsAnnotFormatVersion);
        }

        let num_colortable_entries: i32 = file.read_i32()?;

        if num_colortable_entries == -2 { // If this is negative, the absolute value encodes the file format version. We only support version 2.
            let _max_structure_id: i32 = file.read_i32()?;

            let colortable: FsAnnotColortable = FsAnnotColortable::from_reader(&mut file)?;

            Ok(FsAnnot { vertex_indices, vertex_labels, colortable })
        } else {
            Err(LocalizeError::UnsupportedFsAnnotFormatVersion)
        }
    }

    /// Get the region names contained in the [`FsAnnot`] struct.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let annot = neurolocalize::read_annot("/path/to/subjects_dir/subject1/label/lh.aparc.annot").unwrap();
    /// annot.regions();
    /// ```
    pub fn regions(&self) -> Vec<String> {
        self.colortable.name.clone()
    }


    /// Get the number of regions contained in the [`FsAnnot`] struct, or its [`FsAnnotColortable`].
    pub fn num_regions(&self) -> usize {
        self.colortable.name.len()
    }


    /// Returns, for each vertex, the index of its region in the colortable fields.
    ///
    /// Vertices with a label that does not match any region label get [`UNMATCHED_REGION_INDEX`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let annot = neurolocalize::read_annot("/path/to/subjects_dir/subject1/label/lh.aparc.annot").unwrap();
    /// let regions = annot.regions();
    /// for idx in annot.vertex_region_indices().iter().filter(|&&i| i >= 0) {
    ///     println!("{}", regions[*idx as usize]);
    /// }
    /// ```
    pub fn vertex_region_indices(&self) -> Vec<i32> {
        self.vertex_labels
            .iter()
            .map(|vlabel| {
                self.colortable
                    .label
                    .iter()
                    .position(|region_label| region_label == vlabel)
                    .map(|idx| idx as i32)
                    .unwrap_or(UNMATCHED_REGION_INDEX)
            })
            .collect()
    }
}


impl fmt::Display for FsAnnot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Surface parcellation assigning {} vertices to {} brain regions.", self.vertex_indices.len(), self.colortable.id.len())
    }
}


/// Read a brain parcellation from a FreeSurfer annot file.
///
/// A parcellation assigns each vertex of a brain surface mesh to exactly one brain region.
/// The colortable contains data on the regions, including the region's
/// name, an RGB display color, and a unique identifier.
///
/// # Examples
///
/// ```no_run
/// let annot = neurolocalize::read_annot("/path/to/subjects_dir/subject1/label/lh.aparc.annot").unwrap();
/// println!("Annotation assigns the {} brain mesh vertices to {} different regions.", annot.vertex_indices.len(), annot.regions().len());
/// ```
pub fn read_annot<P: AsRef<Path>>(path: P) -> Result<FsAnnot> {
    FsAnnot::from_file(path)
}
