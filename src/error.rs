use quick_error::quick_error;
use std::io::Error as IOError;
use std::path::PathBuf;
use std::time::Duration;

quick_error! {
    /// Error type for all error variants originated by this crate.
    #[derive(Debug)]
    pub enum LocalizeError {
        /// A surface or atlas file is missing, malformed or inconsistent with its hemisphere.
        MeshLoad(origin: String, reason: String) {
            display("Failed to load surface data from '{}': {}", origin, reason)
        }

        /// Invalid surf file: wrong magic number.
        InvalidFsSurfaceFormat {
            display("Invalid FreeSurfer surf file")
        }

        /// Only version 2 colortables are supported.
        UnsupportedFsAnnotFormatVersion {
            display("Unsupported FreeSurfer annot file format version")
        }

        /// The external brain shift corrector exited with a non-zero status.
        CorrectionProcess(subject: String, code: Option<i32>, log: PathBuf) {
            display("Brain shift correction for subject {} failed with exit code {:?}, see log '{}'", subject, code, log.display())
        }

        /// The external brain shift corrector did not finish in time and was killed.
        CorrectionTimeout(subject: String, timeout: Duration) {
            display("Brain shift correction for subject {} did not finish within {:?}", subject, timeout)
        }

        /// The corrector's output table does not match the expected schema.
        CorrectionOutputParse(path: PathBuf, reason: String) {
            display("Invalid brain shift correction output '{}': {}", path.display(), reason)
        }

        /// A vertex index is beyond the vertex count of the mesh it is looked up in.
        IndexOutOfRange(index: usize, len: usize) {
            display("Vertex index {} out of range for mesh with {} vertices", index, len)
        }

        /// A contact name that is not part of the localization.
        InvalidContact(name: String) {
            display("Invalid contact '{}'", name)
        }

        /// A coordinate that cannot be used for a distance search.
        InvalidCoordinate(reason: String) {
            display("Invalid coordinate: {}", reason)
        }

        /// Batch operation with differently sized name and value lists.
        LengthMismatch(what: String, expected: usize, found: usize) {
            display("Length mismatch for {}: expected {} values, found {}", what, expected, found)
        }

        /// Invalid or inconsistent configuration.
        Config(reason: String) {
            display("Invalid configuration: {}", reason)
        }

        /// I/O Error
        Io(err: IOError) {
            from()
            source(err)
        }

        /// Delimited text error
        Csv(err: csv::Error) {
            from()
            source(err)
        }

        /// JSON error
        Json(err: serde_json::Error) {
            from()
            source(err)
        }
    }
}

/// Alias type for results originated from this crate.
pub type Result<T> = ::std::result::Result<T, LocalizeError>;
