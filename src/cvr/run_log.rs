// The log of a run: everything shown on the console is also appended to a file.

use chrono::Local;
use env_logger::{Env, Target};
use log::warn;
use snafu::ResultExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::cvr::*;

/// Copies the diagnostics of env_logger to stderr and to the log file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // The console copy is best effort, the file copy is not.
        let _ = io::stderr().write_all(buf);
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

pub struct RunLog {
    path: Option<PathBuf>,
    file: Option<File>,
}

impl RunLog {
    pub fn create(path: &Path) -> CvrResult<RunLog> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .context(WritingOutputSnafu {
                path: path.display().to_string(),
            })?;
        Ok(RunLog {
            path: Some(path.to_path_buf()),
            file: Some(file),
        })
    }

    /// A log that only writes to the console.
    pub fn console() -> RunLog {
        RunLog {
            path: None,
            file: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Installs env_logger (default level: info), with its output mirrored
    /// into the log file.
    pub fn init_logger(&self) -> CvrResult<()> {
        let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        });
        if let Some(file) = self.file.as_ref() {
            let file = file.try_clone().context(WritingOutputSnafu {
                path: self.path_name(),
            })?;
            builder.target(Target::Pipe(Box::new(TeeWriter { file })));
        }
        builder.try_init().context(LoggerInitSnafu {})
    }

    fn path_name(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }

    /// Writes a line to the console and to the log file.
    pub fn line(&mut self, s: impl AsRef<str>) {
        println!("{}", s.as_ref());
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = writeln!(file, "{}", s.as_ref()) {
                // Keep going on the console only.
                warn!("Could not write to the run log {:?}: {}", self.path, e);
                self.file = None;
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
    }
}
