use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::OpenOptionsExt;
use tracing::debug;
use ysh_types::{YshError, YshResult};

use super::io::Endpoint;

const OUTPUT_MODE: u32 = 0o644;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// `< file`
    Input(String),
    /// `> file`
    StdoutOutput(String),
    /// `2> file`
    StderrOutput(String),
}

impl Redirect {
    pub fn path(&self) -> &str {
        match self {
            Redirect::Input(path) | Redirect::StdoutOutput(path) | Redirect::StderrOutput(path) => {
                path
            }
        }
    }

    /// Open the target. Files are close-on-exec; the child only sees them
    /// through the duplicated standard stream.
    pub fn open(&self) -> YshResult<Endpoint> {
        let file = match self {
            Redirect::Input(path) => File::open(path).map_err(|err| match err.kind() {
                ErrorKind::NotFound => YshError::MissingInput { path: path.clone() },
                _ => YshError::Redirect {
                    path: path.clone(),
                    source: err,
                },
            })?,
            Redirect::StdoutOutput(path) | Redirect::StderrOutput(path) => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(OUTPUT_MODE)
                .open(path)
                .map_err(|err| YshError::Redirect {
                    path: path.clone(),
                    source: err,
                })?,
        };
        debug!("REDIRECT_OPEN: {:?}", self);
        Ok(Endpoint::from(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_input_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt").display().to_string();
        let err = Redirect::Input(path.clone()).open().unwrap_err();
        assert_eq!(err.to_string(), format!("file {path} does not exist."));
    }

    #[test]
    fn output_truncates_existing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "old contents").unwrap();
        let path = file.path().display().to_string();

        let endpoint = Redirect::StdoutOutput(path.clone()).open().unwrap();
        assert!(!endpoint.is_inherited());
        drop(endpoint);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn error_output_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("err.log");
        let redirect = Redirect::StderrOutput(path.display().to_string());
        assert_eq!(redirect.path(), path.display().to_string());
        let _endpoint = redirect.open().unwrap();
        assert!(path.exists());
    }
}
