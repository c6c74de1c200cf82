//! Local log files
//!
//! Files are named `<program>-YYYYMMDD-HHMMSS.log` and created in the first
//! candidate directory that works. The configured directory comes first and
//! the current directory is always the last resort.

use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::SinkConfig;
use crate::error::SinkError;
use crate::process;
use crate::time::file_stamp;

/// Name suffixes tried when a file of the same name already exists
const MAX_NAME_COLLISIONS: u32 = 1000;

/// Creates timestamped log files
#[derive(Debug, Clone)]
pub struct LogFileSink {
    dirs: Vec<PathBuf>,
    program: String,
}

impl LogFileSink {
    /// Sink writing to `config.log_dir`, falling back to the current directory
    pub fn new(config: &SinkConfig) -> Self {
        let mut dirs = vec![config.log_dir.clone()];
        let cwd = PathBuf::from(".");
        if config.log_dir != cwd && config.log_dir != Path::new("./") {
            dirs.push(cwd);
        }
        Self::with_dirs(dirs, process::program_name())
    }

    /// Sink trying `dirs` in order
    pub fn with_dirs(dirs: Vec<PathBuf>, program: impl Into<String>) -> Self {
        Self {
            dirs,
            program: program.into(),
        }
    }

    /// Candidate directories, in order
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// `<program>-YYYYMMDD-HHMMSS.log`
    pub fn file_name(&self, t: &DateTime<Local>) -> String {
        format!("{}-{}.log", self.program, file_stamp(t))
    }

    /// Create a new log file named after `t`.
    ///
    /// Never truncates: if the name is taken, `.1`, `.2`, ... is inserted
    /// before the extension.
    pub fn create_log_file(&self, t: &DateTime<Local>) -> Result<(File, PathBuf), SinkError> {
        if self.dirs.is_empty() {
            return Err(SinkError::NoLogDirs);
        }

        let stem = format!("{}-{}", self.program, file_stamp(t));
        let mut last_error = None;

        for dir in &self.dirs {
            if let Err(e) = fs::create_dir_all(dir) {
                tracing::debug!("Cannot use log dir {}: {}", dir.display(), e);
                last_error = Some(e);
                continue;
            }

            match create_unique(dir, &stem) {
                Ok(created) => return Ok(created),
                Err(e) => {
                    tracing::debug!("Cannot create log file in {}: {}", dir.display(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(SinkError::Create {
            name: format!("{}.log", stem),
            source: last_error.unwrap_or_else(|| io::Error::other("no usable log directory")),
        })
    }
}

fn create_unique(dir: &Path, stem: &str) -> io::Result<(File, PathBuf)> {
    let mut path = dir.join(format!("{}.log", stem));

    for n in 1..=MAX_NAME_COLLISIONS {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                path = dir.join(format!("{}.{}.log", stem, n));
            }
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("too many log files named {}", stem),
    ))
}

/// Log file that moves on to a fresh file once it grows past `max_size`
///
/// Wrap it in a `Mutex` to use it as a `tracing_subscriber` writer.
#[derive(Debug)]
pub struct RotatingFile {
    sink: LogFileSink,
    max_size: u64,
    file: File,
    path: PathBuf,
    written: u64,
}

impl RotatingFile {
    /// Open the first file
    pub fn open(sink: LogFileSink, max_size: u64) -> Result<Self, SinkError> {
        let (file, path) = sink.create_log_file(&Local::now())?;
        Ok(Self {
            sink,
            max_size,
            file,
            path,
            written: 0,
        })
    }

    /// File currently written to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written to the current file
    pub fn written(&self) -> u64 {
        self.written
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let (file, path) = self
            .sink
            .create_log_file(&Local::now())
            .map_err(io::Error::other)?;
        tracing::debug!("Rotating log file to {}", path.display());
        self.file = file;
        self.path = path;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_file_name_format() {
        let sink = LogFileSink::with_dirs(vec![], "billing");
        assert_eq!(sink.file_name(&noon()), "billing-20240501-120000.log");
    }

    #[test]
    fn test_default_dirs_end_with_cwd() {
        let config = SinkConfig {
            log_dir: PathBuf::from("/var/log/logcast"),
            ..Default::default()
        };
        let sink = LogFileSink::new(&config);
        assert_eq!(sink.dirs(), &[PathBuf::from("/var/log/logcast"), PathBuf::from(".")]);

        let sink = LogFileSink::new(&SinkConfig::default());
        assert_eq!(sink.dirs().len(), 1);
    }

    #[test]
    fn test_creates_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("logs").join("nested");
        let sink = LogFileSink::with_dirs(vec![dir.clone()], "billing");

        let (_file, path) = sink.create_log_file(&noon()).unwrap();
        assert_eq!(path, dir.join("billing-20240501-120000.log"));
        assert!(path.exists());
    }

    #[test]
    fn test_falls_back_to_next_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();
        let fallback = tmp.path().join("fallback");

        let sink = LogFileSink::with_dirs(vec![blocker.join("logs"), fallback.clone()], "billing");
        let (_file, path) = sink.create_log_file(&noon()).unwrap();
        assert!(path.starts_with(&fallback));
    }

    #[test]
    fn test_name_collision_gets_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = LogFileSink::with_dirs(vec![tmp.path().to_path_buf()], "billing");

        let (_a, first) = sink.create_log_file(&noon()).unwrap();
        let (_b, second) = sink.create_log_file(&noon()).unwrap();

        assert_ne!(first, second);
        assert_eq!(second.file_name().unwrap(), "billing-20240501-120000.1.log");
    }

    #[test]
    fn test_all_dirs_fail() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, b"").unwrap();

        let sink = LogFileSink::with_dirs(vec![blocker.join("a")], "billing");
        assert!(matches!(
            sink.create_log_file(&noon()),
            Err(SinkError::Create { .. })
        ));
        assert!(matches!(
            LogFileSink::with_dirs(vec![], "billing").create_log_file(&noon()),
            Err(SinkError::NoLogDirs)
        ));
    }

    #[test]
    fn test_rotates_past_max_size() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = LogFileSink::with_dirs(vec![tmp.path().to_path_buf()], "billing");
        let mut file = RotatingFile::open(sink, 16).unwrap();
        let first = file.path().to_path_buf();

        file.write_all(b"0123456789\n").unwrap();
        assert_eq!(file.path(), first);

        file.write_all(b"0123456789\n").unwrap();
        assert_ne!(file.path(), first);
        assert_eq!(file.written(), 11);

        assert_eq!(fs::read(&first).unwrap(), b"0123456789\n");
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 2);
    }
}
