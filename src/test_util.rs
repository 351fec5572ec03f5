// Writers for small synthetic FreeSurfer files used by the unit tests.

use byteordered::ByteOrdered;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write a binary surf file with the given vertices and faces.
pub fn write_surf_file<P: AsRef<Path>>(path: P, vertices: &[[f32; 3]], faces: &[[i32; 3]]) -> std::io::Result<()> {
    let mut out = ByteOrdered::be(BufWriter::new(File::create(path)?));
    out.write_all(&[0xff, 0xff, 0xfe])?;
    out.write_all(b"created by test_util\n\n")?;
    out.write_i32(vertices.len() as i32)?;
    out.write_i32(faces.len() as i32)?;
    for v in vertices {
        for c in v {
            out.write_f32(*c)?;
        }
    }
    for f in faces {
        for i in f {
            out.write_i32(*i)?;
        }
    }
    out.flush()
}

/// Color label of the region at `idx` in colortables written by [`write_annot_file`].
pub fn region_color_label(idx: usize) -> i32 {
    let (r, g, b) = region_color(idx);
    r + g * 256 + b * 65536
}

fn region_color(idx: usize) -> (i32, i32, i32) {
    (10 + 3 * idx as i32, 20 + idx as i32, 30 + idx as i32)
}

/// Write a version 2 annot file. `vertex_regions` holds a colortable row per vertex, `-1` writes a label that matches no region.
pub fn write_annot_file<P: AsRef<Path>>(path: P, vertex_regions: &[i32], names: &[&str]) -> std::io::Result<()> {
    let mut out = ByteOrdered::be(BufWriter::new(File::create(path)?));
    out.write_i32(vertex_regions.len() as i32)?;
    for (vno, region) in vertex_regions.iter().enumerate() {
        out.write_i32(vno as i32)?;
        let label = if *region < 0 { 0 } else { region_color_label(*region as usize) };
        out.write_i32(label)?;
    }
    out.write_i32(1)?;
    out.write_i32(-2)?;
    out.write_i32(names.len() as i32)?;
    let orig_filename = b"colortable.txt";
    out.write_i32(orig_filename.len() as i32)?;
    out.write_all(orig_filename)?;
    out.write_i32(names.len() as i32)?;
    for (idx, name) in names.iter().enumerate() {
        let (r, g, b) = region_color(idx);
        out.write_i32(idx as i32)?;
        out.write_i32(name.len() as i32 + 1)?;
        out.write_all(name.as_bytes())?;
        out.write_all(&[0])?;
        out.write_i32(r)?;
        out.write_i32(g)?;
        out.write_i32(b)?;
        out.write_i32(0)?;
    }
    out.flush()
}

/// One atlas of a synthetic subject: annot base name, per-vertex regions per hemisphere and the region names.
pub struct AnnotSpec<'a> {
    pub annot: &'a str,
    pub lh: &'a [i32],
    pub rh: &'a [i32],
    pub names: &'a [&'a str],
}

/// Write both hemispheres of a FreeSurfer subject directory: `surf/{lh,rh}.{surface}` and `label/{lh,rh}.{annot}.annot` for each atlas.
pub fn write_subject_dir(
    dir: &Path,
    surface: &str,
    lh_vertices: &[[f32; 3]],
    rh_vertices: &[[f32; 3]],
    annots: &[AnnotSpec],
) -> std::io::Result<()> {
    std::fs::create_dir_all(dir.join("surf"))?;
    std::fs::create_dir_all(dir.join("label"))?;
    write_surf_file(dir.join("surf").join(format!("lh.{}", surface)), lh_vertices, &[])?;
    write_surf_file(dir.join("surf").join(format!("rh.{}", surface)), rh_vertices, &[])?;
    for atlas in annots {
        write_annot_file(dir.join("label").join(format!("lh.{}.annot", atlas.annot)), atlas.lh, atlas.names)?;
        write_annot_file(dir.join("label").join(format!("rh.{}.annot", atlas.annot)), atlas.rh, atlas.names)?;
    }
    Ok(())
}
