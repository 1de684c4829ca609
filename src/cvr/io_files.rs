// Walking the folders of a corpus.

use chrono::{DateTime, Local, NaiveDateTime};
use log::debug;
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};

use crate::cvr::*;

/// A CVR file with the timestamps of the file system.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CvrFile {
    pub path: PathBuf,
    /// Not reported by every platform.
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
}

fn to_local(t: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(t).naive_local()
}

fn is_xml(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
        && entry
            .path()
            .extension()
            .map(|e| e.eq_ignore_ascii_case("xml"))
            .unwrap_or(false)
}

/// The XML files below a folder, sorted by name at each level.
pub fn walk_cvr_files(folder: &Path) -> impl Iterator<Item = CvrResult<CvrFile>> {
    let folder_name = folder.display().to_string();
    WalkDir::new(folder)
        .sort_by_file_name()
        .into_iter()
        .filter_map(move |entry| match entry {
            Err(e) => Some(Err(e).context(WalkingFolderSnafu {
                path: folder_name.clone(),
            })),
            Ok(e) if is_xml(&e) => Some(cvr_file(&e)),
            Ok(e) => {
                debug!("walk_cvr_files: skipping {:?}", e.path());
                None
            }
        })
}

fn cvr_file(entry: &DirEntry) -> CvrResult<CvrFile> {
    let metadata = entry.metadata().context(WalkingFolderSnafu {
        path: entry.path().display().to_string(),
    })?;
    Ok(CvrFile {
        path: entry.path().to_path_buf(),
        created: metadata.created().ok().map(to_local),
        modified: metadata.modified().ok().map(to_local),
    })
}
