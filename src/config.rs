//! Pipeline configuration, read from a TOML file. Every field has a default, so an empty file is a valid configuration.
//!
//! ```toml
//! [orthogonal]
//! radius = 5.0
//! tolerance = 0.1
//!
//! [corrector]
//! program = "R"
//! timeout_secs = 7200
//!
//! [surface.atlases]
//! dk = "aparc"
//! hcp = "HCP-MMP1"
//! ```

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::f64::consts::FRAC_PI_2;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LocalizeError, Result};
use crate::mesh::AtlasFiles;
use crate::orthogonal::OrthogonalSearch;


/// How the external brain shift corrector is started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectorConfig {
    pub program: String,
    /// Argument templates, see [`crate::brainshift::ExternalCorrector`] for the placeholders.
    pub args: Vec<String>,
    pub script: PathBuf,
    /// Zero disables the timeout.
    pub timeout_secs: u64,
}

impl Default for CorrectorConfig {
    fn default() -> CorrectorConfig {
        CorrectorConfig {
            program: String::from("R"),
            args: vec![
                String::from("CMD"),
                String::from("BATCH"),
                String::from("--no-save"),
                String::from("--no-restore"),
                String::from("--args sub=\"{subject}\" outfolder=\"{output_dir}\" fsfolder=\"{freesurfer_dir}\""),
                String::from("{script}"),
                String::from("{output_dir}/{subject}_shiftCorrection.Rlog"),
            ],
            script: PathBuf::from("brainshift/duralDykstra.R"),
            timeout_secs: 7200,
        }
    }
}

impl CorrectorConfig {
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }

    /// The corrector runs in the script's directory, if that directory exists.
    pub fn working_dir(&self) -> Option<&Path> {
        self.script.parent().filter(|dir| !dir.as_os_str().is_empty() && dir.is_dir())
    }
}


/// Which surface and atlases are loaded for a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Surface file name without hemisphere prefix, as in `surf/lh.pial`.
    pub surface: String,
    /// Atlas name to annot base name, as in `label/lh.aparc.annot`.
    pub atlases: BTreeMap<String, String>,
    /// Atlases assigned to single contacts by nearest vertex.
    pub contact_atlases: Vec<String>,
}

impl Default for SurfaceConfig {
    fn default() -> SurfaceConfig {
        let mut atlases = BTreeMap::new();
        atlases.insert(String::from("dk"), String::from("aparc"));
        atlases.insert(String::from("hcp"), String::from("HCP-MMP1"));
        SurfaceConfig {
            surface: String::from("pial"),
            atlases,
            contact_atlases: vec![String::from("dk")],
        }
    }
}

impl SurfaceConfig {
    pub fn surface_files<P: AsRef<Path>>(&self, subject_dir: P) -> (PathBuf, PathBuf) {
        let surf_dir = subject_dir.as_ref().join("surf");
        (surf_dir.join(format!("lh.{}", self.surface)), surf_dir.join(format!("rh.{}", self.surface)))
    }

    pub fn atlas_files<P: AsRef<Path>>(&self, subject_dir: P) -> BTreeMap<String, AtlasFiles> {
        self.atlases
            .iter()
            .map(|(atlas, annot)| (atlas.clone(), AtlasFiles::in_subject_dir(subject_dir.as_ref(), annot)))
            .collect()
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// FreeSurfer directory of the template subject.
    pub subject_dir: PathBuf,
}

impl Default for TemplateConfig {
    fn default() -> TemplateConfig {
        TemplateConfig {
            subject_dir: PathBuf::from("/data/eeg/freesurfer/subjects/fsaverage"),
        }
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub orthogonal: OrthogonalSearch,
    pub corrector: CorrectorConfig,
    pub surface: SurfaceConfig,
    pub template: TemplateConfig,
    /// Pair labels derived from the contact labels of these atlases.
    pub pair_label_atlases: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> PipelineConfig {
        PipelineConfig {
            orthogonal: OrthogonalSearch::default(),
            corrector: CorrectorConfig::default(),
            surface: SurfaceConfig::default(),
            template: TemplateConfig::default(),
            pair_label_atlases: vec![String::from("whole_brain"), String::from("mtl")],
        }
    }
}

impl PipelineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
        let text = std::fs::read_to_string(path)?;
        PipelineConfig::from_toml_str(&text)
    }

    /// Parse and validate a configuration.
    pub fn from_toml_str(text: &str) -> Result<PipelineConfig> {
        let config: PipelineConfig = toml::from_str(text).map_err(|e| LocalizeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.orthogonal.radius > 0.0) {
            return Err(LocalizeError::Config(format!("orthogonal search radius must be positive, got {}", self.orthogonal.radius)));
        }
        if !(self.orthogonal.tolerance > 0.0 && self.orthogonal.tolerance < FRAC_PI_2) {
            return Err(LocalizeError::Config(format!("orthogonality tolerance must be in (0, pi/2), got {}", self.orthogonal.tolerance)));
        }
        if self.corrector.program.trim().is_empty() {
            return Err(LocalizeError::Config(String::from("corrector program is empty")));
        }
        if self.surface.surface.trim().is_empty() {
            return Err(LocalizeError::Config(String::from("surface name is empty")));
        }
        for atlas in &self.surface.contact_atlases {
            if !self.surface.atlases.contains_key(atlas) {
                return Err(LocalizeError::Config(format!("contact atlas '{}' has no annot file configured", atlas)));
            }
        }
        // Pair labels from contact labels are kept apart from the nearest-vertex pair labels of the surface atlases.
        for atlas in &self.pair_label_atlases {
            if self.surface.atlases.contains_key(atlas) {
                return Err(LocalizeError::Config(format!("pair label atlas '{}' is also a surface atlas", atlas)));
            }
        }
        Ok(())
    }
}
