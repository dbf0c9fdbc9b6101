use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
/// Opens the first of `candidates` that can be opened for reading.
pub fn open_first(candidates: &[PathBuf]) -> Option<(PathBuf, File)> {
    candidates
        .iter()
        .find_map(|path| File::open(path).ok().map(|file| (path.clone(), file)))
}
/// Reads the whole of the first openable candidate.
pub fn read_first(candidates: &[PathBuf]) -> Option<(PathBuf, String)> {
    let (path, mut file) = open_first(candidates)?;
    let mut contents = String::new();
    match file.read_to_string(&mut contents) {
        Ok(_) => Some((path, contents)),
        Err(err) => {
            log::warn!("failed to read {}: {err}", path.display());
            None
        }
    }
}
/// Opens an existing attribute for writing. Attributes are never created, the
/// same way sysfs refuses to create them.
pub fn open_attr(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).truncate(true).open(path)
}
pub fn write_attr(path: &Path, value: &str) -> io::Result<()> {
    let mut file = open_attr(path)?;
    file.write_all(value.as_bytes())
}
