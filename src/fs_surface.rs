// Functions for reading FreeSurfer brain surface meshes from binary 'surf' files.
// These files store a triangular mesh, where each vertex is defined by its x,y,z coord and
// each face is defined by 3 vertices, stored as 3 indices into the vertices.


use byteordered::ByteOrdered;
use flate2::bufread::GzDecoder;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::util::{is_gz_file, read_double_newline_terminated_string};
use crate::error::{LocalizeError, Result};

pub const TRIS_MAGIC_FILE_TYPE_NUMBER: i32 = 16777214;

#[derive(Debug, Clone, PartialEq)]
pub struct FsSurfaceHeader {
    pub surf_magic: [u8; 3],
    pub info_line: String,
    pub num_vertices: i32,
    pub num_faces: i32,
}


impl Default for FsSurfaceHeader {
    fn default() -> FsSurfaceHeader {
        FsSurfaceHeader {
            surf_magic: [255; 3],
            info_line: String::from(""),
            num_vertices: 0,
            num_faces: 0
        }
    }
}

impl FsSurfaceHeader {

    /// Read an FsSurface header from the given byte stream.
    /// It is assumed that the input is currently at the start of the
    /// FsSurface header. After this call the input is positioned at the first vertex.
    pub fn from_reader<S>(input: &mut S) -> Result<FsSurfaceHeader>
    where
        S: Read,
    {
        let mut hdr = FsSurfaceHeader::default();

        let mut input = ByteOrdered::be(input);

        for v in &mut hdr.surf_magic {
            *v = input.read_u8()?;
        }

        let magic: i32 = interpret_fs_int24(hdr.surf_magic[0], hdr.surf_magic[1], hdr.surf_magic[2]);
        if magic != TRIS_MAGIC_FILE_TYPE_NUMBER {
            return Err(LocalizeError::InvalidFsSurfaceFormat);
        }

        hdr.info_line = read_double_newline_terminated_string(&mut input)?;
        hdr.num_vertices = input.read_i32()?;
        hdr.num_faces = input.read_i32()?;

        if hdr.num_vertices < 0 || hdr.num_faces < 0 {
            return Err(LocalizeError::InvalidFsSurfaceFormat);
        }
        Ok(hdr)
    }
}


/// Interpret three bytes as a single 24 bit integer, FreeSurfer style.
pub fn interpret_fs_int24(b1: u8, b2:u8, b3:u8) -> i32 {
    ((b1 as i32) << 16) + ((b2 as i32) << 8) + b3 as i32
}


// An FsSurface object
#[derive(Debug, PartialEq, Clone)]
pub struct FsSurface {
    pub header: FsSurfaceHeader,
    pub mesh: BrainMesh,
}

/// A triangular brain mesh. `vertices` holds x,y,z for each vertex in order, `faces` holds 3 vertex indices per face.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct BrainMesh {
    pub vertices: Vec<f32>,
    pub faces: Vec<i32>,
}

impl BrainMesh {

    pub fn num_vertices(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len() / 3
    }

    /// Get the coordinates of the vertex with the given index.
    ///
    /// # Panics
    ///
    /// If `idx` is out of range, see [`BrainMesh::num_vertices`].
    pub fn vertex(&self, idx: usize) -> [f32; 3] {
        [self.vertices[idx * 3], self.vertices[idx * 3 + 1], self.vertices[idx * 3 + 2]]
    }

    /// Append another mesh to this one. The face indices of `other` are shifted by the vertex count of `self`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let lh = neurolocalize::read_surf("/path/to/subjects_dir/subject1/surf/lh.pial").unwrap();
    /// let rh = neurolocalize::read_surf("/path/to/subjects_dir/subject1/surf/rh.pial").unwrap();
    /// let brain = lh.mesh.merge(&rh.mesh);
    /// assert_eq!(brain.num_vertices(), lh.mesh.num_vertices() + rh.mesh.num_vertices());
    /// ```
    pub fn merge(&self, other: &BrainMesh) -> BrainMesh {
        let offset = self.num_vertices() as i32;
        let mut vertices = self.vertices.clone();
        vertices.extend_from_slice(&other.vertices);
        let mut faces = self.faces.clone();
        faces.extend(other.faces.iter().map(|f| f + offset));
        BrainMesh { vertices, faces }
    }
}


/// Read a brain mesh from a FreeSurfer surf file.
///
/// # Examples
///
/// ```no_run
/// let surf = neurolocalize::read_surf("/path/to/subjects_dir/subject1/surf/lh.pial").unwrap();
/// println!("Mesh with {} vertices.", surf.mesh.num_vertices());
/// ```
pub fn read_surf<P: AsRef<Path>>(path: P) -> Result<FsSurface> {
    FsSurface::from_file(path)
}


impl FsSurface {
    /// Read an FsSurface instance from a file.
    /// If the file's name ends with ".gz", the file is assumed to need GZip decoding. This is not typically the case
    /// for FreeSurfer Surface files, but very handy (and it helps us to reduce the size of our test data).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<FsSurface> {
        let gz = is_gz_file(&path);
        let file = BufReader::new(File::open(path)?);
        if gz {
            FsSurface::from_reader(&mut GzDecoder::new(file))
        } else {
            let mut file = file;
            FsSurface::from_reader(&mut file)
        }
    }

    /// Read a complete surface, header first, from the given byte stream.
    pub fn from_reader<S>(input: &mut S) -> Result<FsSurface>
    where
        S: Read,
    {
        let hdr = FsSurfaceHeader::from_reader(input)?;
        let mesh = FsSurface::mesh_from_reader(input, &hdr)?;
        Ok(FsSurface { header: hdr, mesh })
    }

    /// Read the vertex and face blocks. The input must be positioned right after the header.
    pub fn mesh_from_reader<S>(input: &mut S, hdr: &FsSurfaceHeader) -> Result<BrainMesh>
    where
        S: Read,
    {
        let mut input = ByteOrdered::be(input);

        // The vectors grow while reading, a corrupt count ends in an I/O error at the end of the input.
        let num_vertex_values = hdr.num_vertices as usize * 3;
        let mut vertex_data : Vec<f32> = Vec::new();
        for _ in 0..num_vertex_values {
            vertex_data.push(input.read_f32()?);
        }

        let num_face_values = hdr.num_faces as usize * 3;
        let mut face_data : Vec<i32> = Vec::new();
        for _ in 0..num_face_values {
            let vertex_index = input.read_i32()?;
            if vertex_index < 0 || vertex_index >= hdr.num_vertices {
                return Err(LocalizeError::InvalidFsSurfaceFormat);
            }
            face_data.push(vertex_index);
        }

        Ok(BrainMesh {
            vertices : vertex_data,
            faces : face_data
        })
    }
}
