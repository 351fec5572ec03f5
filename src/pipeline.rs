//! The per-subject localization run: brain shift correction, surface labels for contacts and pairs,
//! template vertices and FreeSurfer label files of the pair vertices.

use nalgebra::Point3;
use tracing::{info, warn};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::brainshift::{BrainShiftCorrector, CorrectionRunner};
use crate::config::PipelineConfig;
use crate::error::{LocalizeError, Result};
use crate::mesh::{Hemisphere, SurfaceMesh};
use crate::nearest::{labels_at, nearest_batch, VertexMatch};
use crate::orthogonal::orthogonal_vertices;
use crate::pair_labels::apply_pair_labels;
use crate::store::{CoordinateSystem, CoordinateType, InfoValue, LocalizationStore, PairName};
use crate::template::TemplateMapper;

pub const INFO_CLOSEST_ORTHO_VERTEX_COORDINATE: &str = "closest_ortho_vertex_coordinate";
pub const INFO_PAIR_CLOSEST_VERTEX_COORDINATE: &str = "closest_vertex_coordinate";
pub const INFO_FSAVERAGE_VERTEX_COORDINATE: &str = "fsaverage_vertex_coordinate";


/// Where a subject's data lives.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectPaths {
    pub subject: String,
    /// Receives the exchange files, the corrector output and the label files.
    pub output_dir: PathBuf,
    /// The subject's FreeSurfer directory, containing `surf/` and `label/`.
    pub freesurfer_dir: PathBuf,
}

impl SubjectPaths {
    /// FreeSurfer label file with the pair vertices of one hemisphere.
    pub fn pair_label_file(&self, hemi: Hemisphere) -> PathBuf {
        self.output_dir.join(format!("{}_bipolar_{}.label", self.subject, hemi.prefix()))
    }
}


/// Counts of a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalizationSummary {
    pub corrector_invoked: bool,
    pub corrected_contacts: usize,
    pub labeled_contacts: usize,
    pub labeled_pairs: usize,
    pub orthogonal_found: usize,
    pub orthogonal_missed: usize,
    pub left_pair_vertices: usize,
    pub right_pair_vertices: usize,
}


/// Localize all contacts and pairs of one subject and write the results into `store`.
///
/// The template is passed in so it is loaded once for many subjects. The config is validated first. Any error
/// ends the run, results already written to the store are kept.
pub fn localize_subject<S, R>(
    store: &mut S,
    config: &PipelineConfig,
    paths: &SubjectPaths,
    corrector: &BrainShiftCorrector<R>,
    template: &TemplateMapper,
    overwrite: bool,
) -> Result<LocalizationSummary>
where
    S: LocalizationStore + ?Sized,
    R: CorrectionRunner,
{
    config.validate()?;
    let mut summary = LocalizationSummary::default();

    let report = corrector.correct(store, &paths.subject, &paths.output_dir, &paths.freesurfer_dir, overwrite)?;
    summary.corrector_invoked = report.invoked();
    summary.corrected_contacts = report.contacts.len() - report.skipped.len();

    let (left, right) = config.surface.surface_files(&paths.freesurfer_dir);
    let mesh = SurfaceMesh::load(left, right, &config.surface.atlas_files(&paths.freesurfer_dir))?;
    info!("Loaded {} for subject {}", mesh, paths.subject);

    for found in orthogonal_vertices(store, &mesh, &config.orthogonal)? {
        if found.is_found() {
            summary.orthogonal_found += 1;
        } else {
            summary.orthogonal_missed += 1;
        }
        store.set_pair_info(INFO_CLOSEST_ORTHO_VERTEX_COORDINATE, &found.pair, InfoValue::from(found.coordinate))?;
    }

    summary.labeled_contacts = label_contacts(store, &mesh, &config.surface.contact_atlases)?;

    let pair_vertices = label_pairs(store, &mesh)?;
    summary.labeled_pairs = pair_vertices.len();

    let indices: Vec<usize> = pair_vertices.iter().map(|(_, hit)| hit.index).collect();
    for ((pair, _), coordinate) in pair_vertices.iter().zip(template.to_template(&indices)?) {
        store.set_pair_info(INFO_FSAVERAGE_VERTEX_COORDINATE, pair, InfoValue::from(coordinate))?;
    }

    summary.left_pair_vertices = write_pair_label_file(&paths.pair_label_file(Hemisphere::Left), Hemisphere::Left, &pair_vertices, &mesh)?;
    summary.right_pair_vertices = write_pair_label_file(&paths.pair_label_file(Hemisphere::Right), Hemisphere::Right, &pair_vertices, &mesh)?;

    for atlas in &config.pair_label_atlases {
        let labeled = apply_pair_labels(store, atlas)?;
        info!("Derived {} pair labels of {} from contact labels", labeled, atlas);
    }

    info!("Localization of {} done: {:?}", paths.subject, summary);
    Ok(summary)
}


/// Label every contact with a corrected surface coordinate in each of `atlases`. Returns the number of labeled contacts.
fn label_contacts<S: LocalizationStore + ?Sized>(store: &mut S, mesh: &SurfaceMesh, atlases: &[String]) -> Result<usize> {
    let mut names = Vec::new();
    let mut points = Vec::new();
    for name in store.get_contacts() {
        match store.get_contact_coordinate(CoordinateSystem::Fs, &name, CoordinateType::Corrected)? {
            Some(point) => {
                names.push(name);
                points.push(point);
            }
            None => warn!("Contact {} has no corrected surface coordinate, not labeled", name),
        }
    }

    let hits = nearest_batch(&points, mesh)?;
    for atlas in atlases {
        let labels = labels_at(&hits, mesh, atlas)?;
        store.set_contact_labels(atlas, &names, &labels)?;
    }
    Ok(names.len())
}


/// Label every pair at the nearest vertex of its corrected midpoint in all atlases of the mesh,
/// and store that vertex. Returns the labeled pairs with their vertex.
fn label_pairs<S: LocalizationStore + ?Sized>(store: &mut S, mesh: &SurfaceMesh) -> Result<Vec<(PairName, VertexMatch)>> {
    let mut pairs = Vec::new();
    let mut points: Vec<Point3<f64>> = Vec::new();
    for pair in store.get_pairs() {
        match store.get_pair_coordinate(CoordinateSystem::Fs, &pair, CoordinateType::Corrected) {
            Ok(Some(point)) => {
                pairs.push(pair);
                points.push(point);
            }
            Ok(None) => warn!("Pair {}-{} has no corrected surface coordinate, not labeled", pair.0, pair.1),
            Err(LocalizeError::InvalidContact(name)) => warn!("Skipping pair {}-{}: invalid contact {}", pair.0, pair.1, name),
            Err(e) => return Err(e),
        }
    }

    let hits = nearest_batch(&points, mesh)?;
    for atlas in mesh.atlas_names() {
        let labels = labels_at(&hits, mesh, &atlas)?;
        store.set_pair_labels(&atlas, &pairs, &labels)?;
    }
    let vertices: Vec<InfoValue> = hits.iter().map(|hit| InfoValue::from(hit.coordinate)).collect();
    store.set_pair_infos(INFO_PAIR_CLOSEST_VERTEX_COORDINATE, &pairs, &vertices)?;

    Ok(pairs.into_iter().zip(hits).collect())
}

/// Write the pair vertices of one hemisphere as an ASCII FreeSurfer label file, with hemisphere-local vertex indices.
/// Returns the number of vertices written.
fn write_pair_label_file(path: &Path, hemi: Hemisphere, pair_vertices: &[(PairName, VertexMatch)], mesh: &SurfaceMesh) -> Result<usize> {
    let mut rows = Vec::new();
    for (_, hit) in pair_vertices {
        let (vertex_hemi, local) = mesh.local_index(hit.index)?;
        if vertex_hemi == hemi {
            rows.push((local, hit.coordinate));
        }
    }

    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "#!ascii label of bipolar pair vertices")?;
    writeln!(out, "{}", rows.len())?;
    for (local, c) in &rows {
        writeln!(out, "{} {:.6} {:.6} {:.6} 0.000000", local, c.x, c.y, c.z)?;
    }
    out.flush()?;
    info!("Wrote {} {} pair vertices to {}", rows.len(), hemi.prefix(), path.display());
    Ok(rows.len())
}
