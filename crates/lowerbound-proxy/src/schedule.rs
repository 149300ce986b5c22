//! Newline-delimited URL lists.
//!
//! Two shapes are loaded from the same file format:
//! - [`Schedule`]: URL -> zero-based line position (the recorded request order)
//! - [`UrlSet`]: plain membership (important or prefetch URL lists)
//!
//! A trailing `\r` is stripped from every line. Empty lines still consume a
//! position in a [`Schedule`] but are never stored.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Failure to load a list file.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("failed to read URL list '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Immutable mapping from URL to its position in the recorded request order.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    positions: HashMap<String, usize>,
}

impl Schedule {
    /// Load a schedule file. Duplicate URLs keep their last position.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScheduleError> {
        let path = path.as_ref();
        open_list(path)
            .and_then(Self::from_reader)
            .map_err(|source| ScheduleError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut positions = HashMap::new();
        for_each_line(reader, |position, url| {
            positions.insert(url.to_string(), position);
        })?;
        Ok(Self { positions })
    }

    /// Position of `url` in the schedule, if it was recorded.
    pub fn position(&self, url: &str) -> Option<usize> {
        self.positions.get(url).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Schedule {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut positions = HashMap::new();
        for (position, url) in iter.into_iter().enumerate() {
            positions.insert(url.into(), position);
        }
        Self { positions }
    }
}

/// Set of URLs loaded from a list file.
#[derive(Debug, Clone, Default)]
pub struct UrlSet {
    urls: HashSet<String>,
}

impl UrlSet {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScheduleError> {
        let path = path.as_ref();
        open_list(path)
            .and_then(Self::from_reader)
            .map_err(|source| ScheduleError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut urls = HashSet::new();
        for_each_line(reader, |_, url| {
            urls.insert(url.to_string());
        })?;
        Ok(Self { urls })
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for UrlSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            urls: iter.into_iter().map(Into::into).collect(),
        }
    }
}

fn open_list(path: &Path) -> io::Result<BufReader<File>> {
    File::open(path).map(BufReader::new)
}

/// Visit every non-empty line with its zero-based line index.
fn for_each_line<R, F>(mut reader: R, mut visit: F) -> io::Result<()>
where
    R: BufRead,
    F: FnMut(usize, &str),
{
    let mut buf = Vec::new();
    let mut index = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches('\n').trim_end_matches('\r');
        if !line.is_empty() {
            visit(index, line);
        }
        index += 1;
    }
}
