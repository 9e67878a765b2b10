//! The archive triple on disk: `<name>`, `<name>-index`, `<name>-log`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::NamedTempFile;

use crate::entry;

/// Window used when reading a file backwards for its last line.
const TAIL_WINDOW: u64 = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePaths {
    pub data:  PathBuf,
    pub index: PathBuf,
    pub log:   PathBuf,
}

impl ArchivePaths {
    pub fn new<P: AsRef<Path>>(data: P) -> Self {
        let data = data.as_ref().to_path_buf();
        Self { index: sibling(&data, "index"), log: sibling(&data, "log"), data }
    }

    /// Make sure all three files exist.  Missing index/log files receive a
    /// header line; a missing data file is created empty.
    pub fn touch(&self, owner: &str) -> io::Result<()> {
        if let Some(parent) = self.data.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        touch_with(&self.data, None)?;
        touch_with(&self.index, Some(entry::header("index", owner)))?;
        touch_with(&self.log, Some(entry::header("log", owner)))?;
        Ok(())
    }

    pub fn data_len(&self) -> io::Result<u64> {
        Ok(fs::metadata(&self.data)?.len())
    }

    /// File name of the data file, for diagnostics.
    pub fn name(&self) -> String {
        self.data
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.data.display().to_string())
    }
}

fn sibling(data: &Path, designation: &str) -> PathBuf {
    let mut name = data.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push("-");
    name.push(designation);
    data.with_file_name(name)
}

fn touch_with(path: &Path, header: Option<String>) -> io::Result<()> {
    if path.exists() {
        return Ok(());
    }
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Some(header) = header {
        writeln!(file, "{header}")?;
    }
    file.sync_all()?;
    debug!("created {}", path.display());
    Ok(())
}

/// Last non-empty line of a text file, without its line terminator.
/// Reads backwards in growing windows, so large logs stay cheap.
pub fn last_line(path: &Path) -> io::Result<Option<String>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut window = TAIL_WINDOW.min(len);

    loop {
        let start = len - window;
        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::with_capacity(window as usize);
        (&mut file).take(window).read_to_end(&mut buf)?;

        let text = String::from_utf8_lossy(&buf);
        let trimmed = text.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            if start == 0 {
                return Ok(None);
            }
        } else if let Some(pos) = trimmed.rfind('\n') {
            return Ok(Some(trimmed[pos + 1..].trim_end_matches('\r').to_owned()));
        } else if start == 0 {
            return Ok(Some(trimmed.trim_end_matches('\r').to_owned()));
        }
        window = (window * 2).min(len);
    }
}

/// Replace a text file with `lines` (each newline-terminated) through a
/// temporary sibling and a rename.
pub fn rewrite_lines<I, S>(path: &Path, lines: I) -> io::Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = io::BufWriter::new(tmp.as_file_mut());
        for line in lines {
            writer.write_all(line.as_ref().as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// All lines of a text file, without terminators.
pub fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    let text = fs::read(path)?;
    Ok(String::from_utf8_lossy(&text)
        .lines()
        .map(|l| l.to_owned())
        .collect())
}

/// True when the file is empty or its last byte is a newline, so a new line
/// can be appended directly.
pub fn ends_with_newline(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
