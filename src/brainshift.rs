//! Brain shift correction through an external optimizer.
//!
//! The contact geometry of a subject is exported to plain delimited text files, the external
//! corrector is run as a blocking subprocess and its result table is parsed back into the store.
//! If a result table already exists it is reused unless `overwrite` is requested.

use nalgebra::Point3;
use tracing::{debug, info, warn};

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::CorrectorConfig;
use crate::error::{LocalizeError, Result};
use crate::fs_annot::read_annot;
use crate::mesh::{AtlasFiles, Hemisphere};
use crate::store::{CoordinateSystem, CoordinateType, InfoValue, LocalizationStore};

/// Atlas whose per-vertex regions are handed to the corrector.
pub const EXCHANGE_ANNOT: &str = "aparc";

pub const INFO_DISPLACEMENT: &str = "displacement";
pub const INFO_CLOSEST_VERTEX_DISTANCE: &str = "closest_vertex_distance";
pub const INFO_LINKED_ELECTRODES: &str = "linked_electrodes";
pub const INFO_LINK_DISPLACED: &str = "link_displaced";
pub const INFO_GROUP_CORRECTED: &str = "group_corrected";
pub const INFO_CLOSEST_VERTEX_COORDINATE: &str = "closest_vertex_coordinate";

const POLL_INTERVAL: Duration = Duration::from_millis(25);


/// Files exchanged with the corrector for one subject, all inside the output directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeFiles {
    pub coords: PathBuf,
    pub eltypes: PathBuf,
    pub bpairs: PathBuf,
    pub elnames: PathBuf,
    pub lhvertex: PathBuf,
    pub lhname: PathBuf,
    pub rhvertex: PathBuf,
    pub rhname: PathBuf,
    pub corrected: PathBuf,
    pub log: PathBuf,
}

impl ExchangeFiles {
    pub fn new<P: AsRef<Path>>(output_dir: P, subject: &str) -> ExchangeFiles {
        let file = |suffix: &str| output_dir.as_ref().join(format!("{}_{}", subject, suffix));
        ExchangeFiles {
            coords: file("shift_coords.csv"),
            eltypes: file("shift_eltypes.csv"),
            bpairs: file("shift_bpairs.csv"),
            elnames: file("shift_elnames.csv"),
            lhvertex: file("shift_lhvertex.csv"),
            lhname: file("shift_lhname.csv"),
            rhvertex: file("shift_rhvertex.csv"),
            rhname: file("shift_rhname.csv"),
            corrected: file("shift_corrected.csv"),
            log: file("shiftCorrection.log"),
        }
    }
}


/// Everything a runner needs to start the corrector for one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionRequest {
    pub subject: String,
    pub output_dir: PathBuf,
    pub freesurfer_dir: PathBuf,
    pub files: ExchangeFiles,
}

/// How a corrector run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    pub exit_code: Option<i32>,
    pub log_file: PathBuf,
    pub elapsed: Duration,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}


/// Runs the external correction step. The corrector must leave its result table at `request.files.corrected`.
pub trait CorrectionRunner {
    fn run(&self, request: &CorrectionRequest) -> Result<ProcessOutcome>;
}


/// Runs the corrector as a subprocess, built from a program and argument templates.
///
/// The arguments may contain the placeholders `{subject}`, `{output_dir}`, `{freesurfer_dir}`, `{script}` and `{log_file}`.
/// Standard output and error are written to the log file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalCorrector {
    config: CorrectorConfig,
}

impl ExternalCorrector {
    pub fn new(config: CorrectorConfig) -> ExternalCorrector {
        ExternalCorrector { config }
    }

    /// The argument list with all placeholders filled in for the given request.
    ///
    /// Paths are made absolute against the current directory, as the corrector runs in the script's directory.
    pub fn arguments(&self, request: &CorrectionRequest) -> Result<Vec<String>> {
        let output_dir = absolute(&request.output_dir)?;
        let freesurfer_dir = absolute(&request.freesurfer_dir)?;
        let script = absolute(&self.config.script)?;
        let log_file = absolute(&request.files.log)?;
        Ok(self
            .config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{subject}", &request.subject)
                    .replace("{output_dir}", &output_dir.display().to_string())
                    .replace("{freesurfer_dir}", &freesurfer_dir.display().to_string())
                    .replace("{script}", &script.display().to_string())
                    .replace("{log_file}", &log_file.display().to_string())
            })
            .collect())
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

impl CorrectionRunner for ExternalCorrector {
    fn run(&self, request: &CorrectionRequest) -> Result<ProcessOutcome> {
        let args = self.arguments(request)?;
        let log = File::create(&request.files.log)?;
        let mut command = Command::new(&self.config.program);
        command.args(&args).stdout(Stdio::from(log.try_clone()?)).stderr(Stdio::from(log));
        if let Some(dir) = self.config.working_dir() {
            command.current_dir(dir);
        }
        debug!("Executing {} {:?}", self.config.program, args);

        let started = Instant::now();
        let mut child = command.spawn()?;
        let timeout = self.config.timeout();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    warn!("Brain shift correction for {} timed out after {:?}, killing it", request.subject, limit);
                    child.kill()?;
                    child.wait()?;
                    return Err(LocalizeError::CorrectionTimeout(request.subject.clone(), limit));
                }
            }
            thread::sleep(POLL_INTERVAL);
        };

        Ok(ProcessOutcome {
            exit_code: status.code(),
            log_file: request.files.log.clone(),
            elapsed: started.elapsed(),
        })
    }
}


/// One parsed row of the corrector's result table.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedContact {
    pub name: String,
    pub corrected: Point3<f64>,
    pub displaced: Option<bool>,
    pub closest_vertex_distance: Option<f64>,
    pub linked_to: Option<String>,
    pub link_displaced: Option<bool>,
    pub group: Option<String>,
    pub closest_vertex: Point3<f64>,
}

/// Outcome of [`BrainShiftCorrector::correct`].
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionReport {
    /// `None` if an existing result table was reused.
    pub outcome: Option<ProcessOutcome>,
    pub contacts: Vec<CorrectedContact>,
    /// Names from the result table that are not contacts of the store.
    pub skipped: Vec<String>,
}

impl CorrectionReport {
    pub fn invoked(&self) -> bool {
        self.outcome.is_some()
    }
}


/// Orchestrates the external brain shift correction of one subject.
#[derive(Debug, Clone)]
pub struct BrainShiftCorrector<R: CorrectionRunner> {
    runner: R,
}

impl<R: CorrectionRunner> BrainShiftCorrector<R> {
    pub fn new(runner: R) -> BrainShiftCorrector<R> {
        BrainShiftCorrector { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Correct the contacts of `store` for brain shift and write the results back into it.
    ///
    /// An existing result table is reused unless `overwrite` is set. Otherwise the exchange files are written, the
    /// corrector is run and a non-zero exit status fails with [`LocalizeError::CorrectionProcess`].
    pub fn correct<S: LocalizationStore + ?Sized>(
        &self,
        store: &mut S,
        subject: &str,
        output_dir: &Path,
        freesurfer_dir: &Path,
        overwrite: bool,
    ) -> Result<CorrectionReport> {
        let files = ExchangeFiles::new(output_dir, subject);

        let outcome = if files.corrected.is_file() && !overwrite {
            info!("Corrected file {} already exists for {}, reusing it", files.corrected.display(), subject);
            None
        } else {
            export_exchange_files(store, &files, freesurfer_dir)?;
            let request = CorrectionRequest {
                subject: subject.to_string(),
                output_dir: output_dir.to_path_buf(),
                freesurfer_dir: freesurfer_dir.to_path_buf(),
                files: files.clone(),
            };
            let outcome = self.runner.run(&request)?;
            if !outcome.success() {
                return Err(LocalizeError::CorrectionProcess(subject.to_string(), outcome.exit_code, outcome.log_file));
            }
            info!("Brain shift correction for {} finished in {:?}", subject, outcome.elapsed);
            Some(outcome)
        };

        let contacts = read_corrected_file(&files.corrected, store.get_contacts().len())?;
        let skipped = write_back(store, &contacts)?;
        Ok(CorrectionReport { outcome, contacts, skipped })
    }
}


/// Write the exchange files the corrector reads.
pub fn export_exchange_files<S: LocalizationStore + ?Sized>(store: &S, files: &ExchangeFiles, freesurfer_dir: &Path) -> Result<()> {
    let names = store.get_contacts();

    let mut coords = plain_writer(&files.coords)?;
    let mut eltypes = plain_writer(&files.eltypes)?;
    let mut elnames = plain_writer(&files.elnames)?;
    for name in &names {
        let raw = store
            .get_contact_coordinate(CoordinateSystem::Fs, name, CoordinateType::Raw)?
            .ok_or_else(|| LocalizeError::InvalidCoordinate(format!("contact {} has no raw surface coordinate", name)))?;
        coords.write_record(&[raw.x.to_string(), raw.y.to_string(), raw.z.to_string()])?;
        eltypes.write_record(&[store.get_contact_type(name)?.code()])?;
        elnames.write_record(&[name])?;
    }
    coords.flush()?;
    eltypes.flush()?;
    elnames.flush()?;

    let mut bpairs = plain_writer(&files.bpairs)?;
    for (first, second) in store.get_pairs() {
        bpairs.write_record(&[first, second])?;
    }
    bpairs.flush()?;

    let annots = AtlasFiles::in_subject_dir(freesurfer_dir, EXCHANGE_ANNOT);
    for (hemi, annot_file, vertex_file, name_file) in &[
        (Hemisphere::Left, &annots.left, &files.lhvertex, &files.lhname),
        (Hemisphere::Right, &annots.right, &files.rhvertex, &files.rhname),
    ] {
        let annot = read_annot(annot_file).map_err(|e| LocalizeError::MeshLoad(annot_file.display().to_string(), e.to_string()))?;
        let mut vertices = plain_writer(vertex_file)?;
        for region in annot.vertex_region_indices() {
            vertices.write_record(&[region.to_string()])?;
        }
        vertices.flush()?;
        let mut regions = plain_writer(name_file)?;
        for region in annot.regions() {
            regions.write_record(&[region])?;
        }
        regions.flush()?;
        debug!("Exported {} {} vertex regions", annot.vertex_labels.len(), hemi.prefix());
    }

    info!("Exported {} contacts for brain shift correction to {}", names.len(), files.coords.display());
    Ok(())
}

fn plain_writer(path: &Path) -> Result<csv::Writer<File>> {
    Ok(csv::WriterBuilder::new().has_headers(false).from_path(path)?)
}


const COL_CORRX: &str = "corrx";
const COL_CORRY: &str = "corry";
const COL_CORRZ: &str = "corrz";
const COL_DISPLACED: &str = "displaced";
const COL_CLOSEST_DIST: &str = "closestvertexdist";
const COL_LINKED_TO: &str = "linkedto";
const COL_LINK_DISPLACED: &str = "linkdisplaced";
const COL_GROUP: &str = "group";
const COL_CLOSEST_X: &str = "closestvertexx";
const COL_CLOSEST_Y: &str = "closestvertexy";
const COL_CLOSEST_Z: &str = "closestvertexz";

/// Named columns of the result table. The contact name is always the first column.
pub const CORRECTED_COLUMNS: [&str; 11] = [
    COL_CORRX, COL_CORRY, COL_CORRZ, COL_DISPLACED, COL_CLOSEST_DIST, COL_LINKED_TO,
    COL_LINK_DISPLACED, COL_GROUP, COL_CLOSEST_X, COL_CLOSEST_Y, COL_CLOSEST_Z,
];


/// Parse the corrector's result table. It must hold exactly `expected_rows` rows and all of [`CORRECTED_COLUMNS`].
pub fn read_corrected_file(path: &Path, expected_rows: usize) -> Result<Vec<CorrectedContact>> {
    let parse_error = |reason: String| LocalizeError::CorrectionOutputParse(path.to_path_buf(), reason);

    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut columns = [0usize; 11];
    for (slot, name) in columns.iter_mut().zip(CORRECTED_COLUMNS.iter()) {
        *slot = headers
            .iter()
            .skip(1)
            .position(|h| h.trim() == *name)
            .map(|p| p + 1)
            .ok_or_else(|| parse_error(format!("missing column '{}'", name)))?;
    }

    let mut contacts = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let cell = |col: usize| record.get(columns[col]).unwrap_or("").trim();
        let name = record.get(0).unwrap_or("").trim();
        let context = |reason: String| parse_error(format!("row {} ({}): {}", row + 1, name, reason));

        let number = |col: usize| -> Result<Option<f64>> { parse_number(cell(col)).map_err(|e| context(format!("column '{}': {}", CORRECTED_COLUMNS[col], e))) };
        let required = |col: usize| -> Result<f64> {
            number(col)?.ok_or_else(|| context(format!("column '{}' is NA", CORRECTED_COLUMNS[col])))
        };
        let flag = |col: usize| parse_flag(cell(col)).map_err(|e| context(format!("column '{}': {}", CORRECTED_COLUMNS[col], e)));

        contacts.push(CorrectedContact {
            name: name.to_string(),
            corrected: Point3::new(required(0)?, required(1)?, required(2)?),
            displaced: flag(3)?,
            closest_vertex_distance: number(4)?,
            linked_to: parse_text(cell(5)),
            link_displaced: flag(6)?,
            group: parse_text(cell(7)),
            closest_vertex: Point3::new(required(8)?, required(9)?, required(10)?),
        });
    }

    if contacts.len() != expected_rows {
        return Err(parse_error(format!("{} rows for {} exported contacts", contacts.len(), expected_rows)));
    }
    Ok(contacts)
}

fn is_na(cell: &str) -> bool {
    cell.is_empty() || cell.eq_ignore_ascii_case("na") || cell.eq_ignore_ascii_case("nan")
}

fn parse_number(cell: &str) -> std::result::Result<Option<f64>, String> {
    if is_na(cell) {
        return Ok(None);
    }
    cell.parse::<f64>().map(Some).map_err(|_| format!("'{}' is not a number", cell))
}

fn parse_flag(cell: &str) -> std::result::Result<Option<bool>, String> {
    if is_na(cell) {
        return Ok(None);
    }
    match cell.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Ok(Some(true)),
        "false" | "f" | "0" => Ok(Some(false)),
        _ => Err(format!("'{}' is not a flag", cell)),
    }
}

fn parse_text(cell: &str) -> Option<String> {
    if is_na(cell) {
        None
    } else {
        Some(cell.to_string())
    }
}


/// Store the corrected coordinates and diagnostics. Returns the names that are not contacts of the store.
fn write_back<S: LocalizationStore + ?Sized>(store: &mut S, contacts: &[CorrectedContact]) -> Result<Vec<String>> {
    let mut skipped = Vec::new();
    for contact in contacts {
        match store.set_contact_coordinate(CoordinateSystem::Fs, &contact.name, contact.corrected, CoordinateType::Corrected) {
            Ok(()) => {}
            Err(LocalizeError::InvalidContact(name)) => {
                warn!("Invalid contact {} in brain shift correction output", name);
                skipped.push(name);
                continue;
            }
            Err(e) => return Err(e),
        }
        store.set_contact_info(INFO_DISPLACEMENT, &contact.name, InfoValue::from(contact.displaced))?;
        store.set_contact_info(INFO_CLOSEST_VERTEX_DISTANCE, &contact.name, InfoValue::from(contact.closest_vertex_distance))?;
        store.set_contact_info(INFO_LINKED_ELECTRODES, &contact.name, InfoValue::from(contact.linked_to.clone()))?;
        store.set_contact_info(INFO_LINK_DISPLACED, &contact.name, InfoValue::from(contact.link_displaced))?;
        store.set_contact_info(INFO_GROUP_CORRECTED, &contact.name, InfoValue::from(contact.group.clone()))?;
        store.set_contact_info(INFO_CLOSEST_VERTEX_COORDINATE, &contact.name, InfoValue::from(contact.closest_vertex))?;
    }
    Ok(skipped)
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::store::{Contact, Localization};
    use crate::test_util::{write_subject_dir, AnnotSpec};
    use std::cell::Cell;
    use tempfile::tempdir;

    const HEADER: &str = "\"\",\"corrx\",\"corry\",\"corrz\",\"displaced\",\"closestvertexdist\",\"linkedto\",\"linkdisplaced\",\"group\",\"closestvertexx\",\"closestvertexy\",\"closestvertexz\"\n";

    fn corrected_table() -> String {
        let mut table = String::from(HEADER);
        table.push_str("\"G1\",1.5,2,3,TRUE,0.7,\"G2\",FALSE,1,1.4,2,3.1\n");
        table.push_str("\"G2\",4,5,6,FALSE,NA,NA,NA,NA,4,5,6\n");
        table
    }

    /// Writes a fixed result table and counts its invocations.
    struct FakeCorrector {
        calls: Cell<usize>,
        exit_code: i32,
    }

    impl FakeCorrector {
        fn new(exit_code: i32) -> FakeCorrector {
            FakeCorrector { calls: Cell::new(0), exit_code }
        }
    }

    impl CorrectionRunner for FakeCorrector {
        fn run(&self, request: &CorrectionRequest) -> Result<ProcessOutcome> {
            self.calls.set(self.calls.get() + 1);
            std::fs::write(&request.files.corrected, corrected_table())?;
            Ok(ProcessOutcome {
                exit_code: Some(self.exit_code),
                log_file: request.files.log.clone(),
                elapsed: Duration::from_millis(1),
            })
        }
    }

    fn grid_localization() -> Localization {
        let mut loc = Localization::new("R1001P");
        loc.add_contact(Contact::new("G1", "G").with_coordinate(CoordinateSystem::Fs, CoordinateType::Raw, Point3::new(1.0, 2.0, 3.0)));
        loc.add_contact(Contact::new("G2", "G").with_coordinate(CoordinateSystem::Fs, CoordinateType::Raw, Point3::new(4.0, 5.0, 6.0)));
        loc.add_pair("G1", "G2").unwrap();
        loc
    }

    fn freesurfer_dir(dir: &Path) {
        write_subject_dir(
            dir,
            "pial",
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            &[[5.0, 0.0, 0.0]],
            &[AnnotSpec { annot: EXCHANGE_ANNOT, lh: &[1, -1], rh: &[2], names: &["unknown", "bankssts", "insula"] }],
        ).unwrap();
    }

    #[test]
    fn corrected_output_is_written_into_the_store() {
        let out = tempdir().unwrap();
        let fs = tempdir().unwrap();
        freesurfer_dir(fs.path());
        let mut loc = grid_localization();
        let corrector = BrainShiftCorrector::new(FakeCorrector::new(0));

        let report = corrector.correct(&mut loc, "R1001P", out.path(), fs.path(), false).unwrap();

        assert!(report.invoked());
        assert!(report.skipped.is_empty());
        let g1 = loc.contact("G1").unwrap();
        assert_eq!(Some(Point3::new(1.5, 2.0, 3.0)), g1.coordinate(CoordinateSystem::Fs, CoordinateType::Corrected));
        assert_eq!(Some(Point3::new(1.0, 2.0, 3.0)), g1.coordinate(CoordinateSystem::Fs, CoordinateType::Raw));
        assert_eq!(Some(&InfoValue::Flag(true)), g1.info(INFO_DISPLACEMENT));
        assert_eq!(Some(&InfoValue::Number(0.7)), g1.info(INFO_CLOSEST_VERTEX_DISTANCE));
        assert_eq!(Some(&InfoValue::Text(String::from("G2"))), g1.info(INFO_LINKED_ELECTRODES));
        assert_eq!(Some(&InfoValue::Flag(false)), g1.info(INFO_LINK_DISPLACED));
        assert_eq!(Some(&InfoValue::Text(String::from("1"))), g1.info(INFO_GROUP_CORRECTED));
        assert_eq!(Some(&InfoValue::Point(Point3::new(1.4, 2.0, 3.1))), g1.info(INFO_CLOSEST_VERTEX_COORDINATE));
        let g2 = loc.contact("G2").unwrap();
        assert_eq!(Some(&InfoValue::Missing), g2.info(INFO_CLOSEST_VERTEX_DISTANCE));
        assert_eq!(Some(&InfoValue::Missing), g2.info(INFO_LINKED_ELECTRODES));
    }

    #[test]
    fn exchange_files_hold_one_row_per_entity() {
        let out = tempdir().unwrap();
        let fs = tempdir().unwrap();
        freesurfer_dir(fs.path());
        let files = ExchangeFiles::new(out.path(), "R1001P");

        export_exchange_files(&grid_localization(), &files, fs.path()).unwrap();

        assert_eq!("1,2,3\n4,5,6\n", std::fs::read_to_string(&files.coords).unwrap());
        assert_eq!("G\nG\n", std::fs::read_to_string(&files.eltypes).unwrap());
        assert_eq!("G1\nG2\n", std::fs::read_to_string(&files.elnames).unwrap());
        assert_eq!("G1,G2\n", std::fs::read_to_string(&files.bpairs).unwrap());
        assert_eq!("1\n-1\n", std::fs::read_to_string(&files.lhvertex).unwrap());
        assert_eq!("2\n", std::fs::read_to_string(&files.rhvertex).unwrap());
        assert_eq!("unknown\nbankssts\ninsula\n", std::fs::read_to_string(&files.rhname).unwrap());
    }

    #[test]
    fn existing_output_is_reused_without_running_the_corrector() {
        let out = tempdir().unwrap();
        let fs = tempdir().unwrap();
        freesurfer_dir(fs.path());
        let corrector = BrainShiftCorrector::new(FakeCorrector::new(0));

        let mut first = grid_localization();
        let report1 = corrector.correct(&mut first, "R1001P", out.path(), fs.path(), false).unwrap();
        let mut second = grid_localization();
        let report2 = corrector.correct(&mut second, "R1001P", out.path(), fs.path(), false).unwrap();

        assert_eq!(1, corrector.runner().calls.get());
        assert!(!report2.invoked());
        assert_eq!(report1.contacts, report2.contacts);
        assert_eq!(first, second);

        corrector.correct(&mut second, "R1001P", out.path(), fs.path(), true).unwrap();
        assert_eq!(2, corrector.runner().calls.get());
    }

    #[test]
    fn a_failing_corrector_is_an_error() {
        let out = tempdir().unwrap();
        let fs = tempdir().unwrap();
        freesurfer_dir(fs.path());
        let mut loc = grid_localization();
        let corrector = BrainShiftCorrector::new(FakeCorrector::new(1));

        let res = corrector.correct(&mut loc, "R1001P", out.path(), fs.path(), false);

        assert!(matches!(res, Err(LocalizeError::CorrectionProcess(_, Some(1), _))));
        assert_eq!(None, loc.contact("G1").unwrap().coordinate(CoordinateSystem::Fs, CoordinateType::Corrected));
    }

    #[test]
    fn row_count_and_columns_are_validated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("R1001P_shift_corrected.csv");
        std::fs::write(&path, corrected_table()).unwrap();
        assert!(matches!(read_corrected_file(&path, 3), Err(LocalizeError::CorrectionOutputParse(_, _))));
        assert_eq!(2, read_corrected_file(&path, 2).unwrap().len());

        std::fs::write(&path, "\"\",\"corrx\",\"corry\",\"corrz\"\n\"G1\",1,2,3\n").unwrap();
        match read_corrected_file(&path, 1) {
            Err(LocalizeError::CorrectionOutputParse(_, reason)) => assert!(reason.contains("displaced")),
            other => panic!("expected parse error, got {:?}", other),
        }

        std::fs::write(&path, corrected_table().replace("1.5", "abc")).unwrap();
        assert!(matches!(read_corrected_file(&path, 2), Err(LocalizeError::CorrectionOutputParse(_, _))));
    }

    #[test]
    fn unknown_contacts_in_the_output_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("R1001P_shift_corrected.csv");
        std::fs::write(&path, corrected_table()).unwrap();
        let contacts = read_corrected_file(&path, 2).unwrap();

        let mut loc = Localization::new("R1001P");
        loc.add_contact(Contact::new("G2", "G"));
        let skipped = write_back(&mut loc, &contacts).unwrap();

        assert_eq!(vec![String::from("G1")], skipped);
        assert!(loc.contact("G2").unwrap().coordinate(CoordinateSystem::Fs, CoordinateType::Corrected).is_some());
    }

    #[cfg(unix)]
    fn shell_corrector(script: &str, timeout_secs: u64) -> ExternalCorrector {
        ExternalCorrector::new(CorrectorConfig {
            program: String::from("sh"),
            args: vec![String::from("-c"), script.to_string()],
            timeout_secs,
            ..CorrectorConfig::default()
        })
    }

    #[cfg(unix)]
    fn request(dir: &Path) -> CorrectionRequest {
        CorrectionRequest {
            subject: String::from("R1001P"),
            output_dir: dir.to_path_buf(),
            freesurfer_dir: dir.to_path_buf(),
            files: ExchangeFiles::new(dir, "R1001P"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn subprocess_output_goes_to_the_log_and_placeholders_are_filled() {
        let dir = tempdir().unwrap();
        let corrector = shell_corrector("echo corrected {subject}; exit 3", 0);

        let outcome = corrector.run(&request(dir.path())).unwrap();

        assert_eq!(Some(3), outcome.exit_code);
        assert!(!outcome.success());
        assert_eq!("corrected R1001P\n", std::fs::read_to_string(&outcome.log_file).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn a_hanging_subprocess_times_out() {
        let dir = tempdir().unwrap();
        let corrector = shell_corrector("sleep 30", 1);

        let started = Instant::now();
        let res = corrector.run(&request(dir.path()));

        assert!(matches!(res, Err(LocalizeError::CorrectionTimeout(_, _))));
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[cfg(unix)]
    #[test]
    fn a_relative_script_is_found_from_its_own_directory() {
        // A scratch directory below the current one, addressed by a relative path.
        let scripts = tempfile::Builder::new().tempdir_in(".").unwrap();
        let name = scripts.path().file_name().unwrap();
        std::fs::write(scripts.path().join("run.sh"), "echo ran in $(basename $(pwd))\n").unwrap();
        let corrector = ExternalCorrector::new(CorrectorConfig {
            program: String::from("sh"),
            args: vec![String::from("{script}")],
            script: Path::new(name).join("run.sh"),
            timeout_secs: 0,
        });
        let out = tempdir().unwrap();

        let outcome = corrector.run(&request(out.path())).unwrap();

        assert_eq!(Some(0), outcome.exit_code);
        let log = std::fs::read_to_string(&outcome.log_file).unwrap();
        assert_eq!(format!("ran in {}\n", name.to_string_lossy()), log);
    }

    #[test]
    fn relative_paths_in_arguments_are_made_absolute() {
        let corrector = ExternalCorrector::new(CorrectorConfig {
            args: vec![String::from("{script}"), String::from("out={output_dir}"), String::from("{subject}")],
            ..CorrectorConfig::default()
        });
        let request = CorrectionRequest {
            subject: String::from("R1001P"),
            output_dir: PathBuf::from("results"),
            freesurfer_dir: PathBuf::from("/subjects/R1001P"),
            files: ExchangeFiles::new("results", "R1001P"),
        };
        let cwd = std::env::current_dir().unwrap();

        let args = corrector.arguments(&request).unwrap();

        assert_eq!(cwd.join("brainshift/duralDykstra.R").display().to_string(), args[0]);
        assert_eq!(format!("out={}", cwd.join("results").display()), args[1]);
        assert_eq!("R1001P", args[2]);
    }
}
