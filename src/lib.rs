//! Localization of intracranial electrode contacts on FreeSurfer cortical surfaces.
//!
//! Contacts are corrected for brain shift by an external optimizer, mapped to their nearest surface
//! vertex and labeled with the regions of one or more surface atlases. Grid and strip pairs also get the
//! vertex orthogonally below them, and pair vertices are mapped into a template space such as fsaverage.

pub mod brainshift;
pub mod config;
pub mod error;
pub mod fs_annot;
pub mod fs_surface;
pub mod mesh;
pub mod nearest;
pub mod orthogonal;
pub mod pair_labels;
pub mod pipeline;
pub mod store;
pub mod template;
pub mod util;

#[cfg(test)]
pub(crate) mod test_util;

pub use brainshift::{BrainShiftCorrector, CorrectionReport, CorrectionRunner, ExternalCorrector, ProcessOutcome};
pub use config::PipelineConfig;
pub use error::{LocalizeError, Result};
pub use fs_annot::{read_annot, FsAnnot};
pub use fs_surface::{read_surf, BrainMesh, FsSurface};
pub use mesh::{AtlasFiles, Hemisphere, SurfaceMesh};
pub use nearest::{nearest, nearest_batch, nearest_labels, VertexMatch};
pub use orthogonal::{orthogonal_vertices, OrthogonalMatch, OrthogonalSearch};
pub use pair_labels::{apply_pair_labels, resolve_pair_label};
pub use pipeline::{localize_subject, LocalizationSummary, SubjectPaths};
pub use store::{Contact, ContactType, CoordinateSystem, CoordinateType, InfoValue, Localization, LocalizationStore, Pair, PairName};
pub use template::TemplateMapper;
