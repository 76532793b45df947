//! Uniform line-by-line access to compressed bulk files.
//!
//! An [`Archive`] describes a container file, its format, and a rule selecting the wanted entries inside it.
//! The supported formats are plain text, gzip, zip, tar + gzip, and block-compressed gzip (BGZF).
//! See [`ArchiveFormat`].
//!
//! [`Archive::lines`] returns a lazy, forward-only sequence of text lines over all wanted entries.
//! Entries of multi-entry containers are visited in sorted order by name, which makes downstream merges reproducible.
//! [`Archive::lines_of`] reads an entry list that was already obtained with [`Archive::entries`].
//! The sequence knows the entry and the line number within the entry for the most recent line.
//! An entry is decompressed a second time if its name ends with `.gz`, `.bgz`, or `.bgzf`.
//!
//! The lines are read by a background thread and passed to the consumer in chunks over a bounded channel.
//! Memory usage is therefore independent of the size of the archive.
//!
//! If the archive cannot be opened or read, the failure is logged and the sequence simply ends.
//! An unreadable archive and an empty archive are therefore indistinguishable from the sequence alone.
//! Callers should use [`Archive::entries`] and the number of lines or records for sanity checks.

use crate::utils;

use std::collections::VecDeque;
use std::fmt::{self, Display};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use flate2::read::MultiGzDecoder;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zip::ZipArchive;

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// Container format of an archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// Plain text. Gzip compression is still detected from the magic number.
    None,
    /// Single-stream or multi-member gzip.
    Gz,
    /// Zip archive with multiple entries.
    Zip,
    /// Gzip-compressed tar archive with multiple entries.
    Tgz,
    /// Block-compressed gzip.
    Bgz,
}

impl ArchiveFormat {
    /// Guesses the format from the file name.
    pub fn detect<P: AsRef<Path>>(filename: P) -> Self {
        let name = filename.as_ref().to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".zip") {
            ArchiveFormat::Zip
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            ArchiveFormat::Tgz
        } else if name.ends_with(".bgz") || name.ends_with(".bgzf") {
            ArchiveFormat::Bgz
        } else if name.ends_with(".gz") {
            ArchiveFormat::Gz
        } else {
            ArchiveFormat::None
        }
    }

    /// Returns `true` if the format contains multiple named entries.
    pub fn is_multi_entry(self) -> bool {
        matches!(self, ArchiveFormat::Zip | ArchiveFormat::Tgz)
    }
}

impl Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArchiveFormat::None => "none",
            ArchiveFormat::Gz => "gz",
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tgz => "tgz",
            ArchiveFormat::Bgz => "bgz",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(ArchiveFormat::None),
            "gz" | "gzip" => Ok(ArchiveFormat::Gz),
            "zip" => Ok(ArchiveFormat::Zip),
            "tgz" | "tar.gz" => Ok(ArchiveFormat::Tgz),
            "bgz" | "bgzf" => Ok(ArchiveFormat::Bgz),
            _ => Err(format!("Unknown archive format: {}", s)),
        }
    }
}

//-----------------------------------------------------------------------------

/// A compressed bulk file and the rule for selecting the wanted entries.
///
/// # Examples
///
/// ```
/// use allele_base::archive::{Archive, ArchiveFormat};
///
/// let archive = Archive::new("gnomad.zip", ArchiveFormat::Zip, Some("data.chr*.gz")).unwrap();
/// assert!(archive.is_wanted("data.chr1.gz"));
/// assert!(archive.is_wanted("release/data.chr2.gz"));
/// assert!(!archive.is_wanted("README.txt"));
/// ```
#[derive(Clone, Debug)]
pub struct Archive {
    path: PathBuf,
    format: ArchiveFormat,
    selector: Option<Pattern>,
}

impl Archive {
    /// Number of lines sent over the channel at once.
    pub const CHUNK_SIZE: usize = 1024;

    /// Number of chunks buffered in the channel.
    pub const BUFFERED_CHUNKS: usize = 4;

    /// Creates a new archive descriptor.
    ///
    /// The selection pattern is a glob pattern (`*`, `?`, `[...]`) matched against the file name of an entry.
    /// If the pattern contains `/`, it is matched against the full entry name instead.
    /// Without a pattern, all regular files are wanted.
    ///
    /// Returns an error if the pattern is invalid.
    pub fn new<P: AsRef<Path>>(path: P, format: ArchiveFormat, pattern: Option<&str>) -> Result<Self, String> {
        let selector = match pattern {
            Some(pattern) => Some(Pattern::new(pattern).map_err(|x| format!("Invalid entry pattern {}: {}", pattern, x))?),
            None => None,
        };
        Ok(Archive {
            path: path.as_ref().to_path_buf(),
            format,
            selector,
        })
    }

    /// Returns the path to the container file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the container format.
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Returns the entry selection pattern, if any.
    pub fn pattern(&self) -> Option<&str> {
        self.selector.as_ref().map(|x| x.as_str())
    }

    /// Returns `true` if the entry with the given name is wanted.
    pub fn is_wanted(&self, entry_name: &str) -> bool {
        if entry_name.ends_with('/') {
            return false;
        }
        match &self.selector {
            Some(pattern) => {
                if pattern.as_str().contains('/') {
                    pattern.matches(entry_name)
                } else {
                    let file_name = entry_name.rsplit('/').next().unwrap_or(entry_name);
                    pattern.matches(file_name)
                }
            },
            None => true,
        }
    }

    /// Returns the names of the wanted entries in the order they will be read.
    ///
    /// Single-stream formats have one entry named after the file.
    /// Returns an error if the container cannot be opened or listed.
    pub fn entries(&self) -> Result<Vec<String>, String> {
        match self.format {
            ArchiveFormat::None | ArchiveFormat::Gz | ArchiveFormat::Bgz => {
                File::open(&self.path).map_err(|x| format!("{}: {}", self.path.display(), x))?;
                Ok(vec![self.stream_name()])
            },
            ArchiveFormat::Zip => {
                let zip = self.open_zip()?;
                Ok(self.zip_entries(&zip))
            },
            ArchiveFormat::Tgz => self.tar_entries(),
        }
    }

    /// Returns a lazy sequence of lines over all wanted entries.
    ///
    /// This never fails.
    /// If the archive cannot be read, the failure is logged and the sequence ends early.
    pub fn lines(&self) -> ArchiveLines {
        self.start_reader(None)
    }

    /// Returns a lazy sequence of lines over the given entries of a multi-entry container.
    ///
    /// The entries should come from [`Archive::entries`], which saves listing the container again.
    /// Single-stream formats ignore the list.
    /// Like [`Archive::lines`], this never fails.
    pub fn lines_of(&self, entries: Vec<String>) -> ArchiveLines {
        self.start_reader(Some(entries))
    }

    fn start_reader(&self, entries: Option<Vec<String>>) -> ArchiveLines {
        let (sender, receiver) = mpsc::sync_channel(Self::BUFFERED_CHUNKS);
        let archive = self.clone();
        let reader = thread::spawn(move || {
            match archive.read_into(&sender, entries) {
                Ok(true) => debug!("Finished reading {}", archive.path.display()),
                Ok(false) => debug!("Stopped reading {} early", archive.path.display()),
                Err(message) => warn!("Failed to read archive {}: {}", archive.path.display(), message),
            }
        });
        ArchiveLines {
            receiver: Some(receiver),
            buffer: Vec::new().into_iter(),
            lines: 0,
            entry: None,
            entry_line: 0,
            reader: Some(reader),
        }
    }

    // Name of the only entry in a single-stream format.
    fn stream_name(&self) -> String {
        self.path.file_name().map(|x| x.to_string_lossy().into_owned()).unwrap_or_default()
    }

    // Sends all lines to the channel, listing the entries if necessary.
    // Returns `Ok(false)` if the receiver was dropped.
    fn read_into(&self, sender: &SyncSender<LineChunk>, entries: Option<Vec<String>>) -> Result<bool, String> {
        match self.format {
            ArchiveFormat::None | ArchiveFormat::Gz => {
                let reader = utils::open_file(&self.path)?;
                send_lines(reader, sender, &self.stream_name())
            },
            ArchiveFormat::Bgz => {
                let file = File::open(&self.path).map_err(|x| format!("{}: {}", self.path.display(), x))?;
                let reader = noodles_bgzf::io::Reader::new(file);
                let reader = BufReader::with_capacity(utils::READ_BUFFER_SIZE, reader);
                send_lines(reader, sender, &self.stream_name())
            },
            ArchiveFormat::Zip => self.read_zip(sender, entries),
            ArchiveFormat::Tgz => self.read_tar(sender, entries),
        }
    }
}

//-----------------------------------------------------------------------------

// Zip archives.

impl Archive {
    fn open_zip(&self) -> Result<ZipArchive<BufReader<File>>, String> {
        let file = File::open(&self.path).map_err(|x| format!("{}: {}", self.path.display(), x))?;
        ZipArchive::new(BufReader::new(file)).map_err(|x| format!("{}: {}", self.path.display(), x))
    }

    fn zip_entries(&self, zip: &ZipArchive<BufReader<File>>) -> Vec<String> {
        let mut result: Vec<String> = zip.file_names()
            .filter(|name| self.is_wanted(name))
            .map(String::from)
            .collect();
        result.sort();
        result
    }

    fn read_zip(&self, sender: &SyncSender<LineChunk>, entries: Option<Vec<String>>) -> Result<bool, String> {
        let mut zip = self.open_zip()?;
        let entries = entries.unwrap_or_else(|| self.zip_entries(&zip));
        for name in entries {
            debug!("Reading entry {} in {}", name, self.path.display());
            let entry = zip.by_name(&name).map_err(|x| format!("{}: {}", name, x))?;
            let reader = entry_reader(&name, entry);
            if !send_lines(reader, sender, &name)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

//-----------------------------------------------------------------------------

// Tar archives.

impl Archive {
    fn open_tar(&self) -> Result<tar::Archive<Box<dyn Read>>, String> {
        let inner: Box<dyn Read> = if utils::is_gzipped(&self.path) {
            let file = File::open(&self.path).map_err(|x| format!("{}: {}", self.path.display(), x))?;
            Box::new(MultiGzDecoder::new(BufReader::with_capacity(utils::READ_BUFFER_SIZE, file)))
        } else {
            let file = File::open(&self.path).map_err(|x| format!("{}: {}", self.path.display(), x))?;
            Box::new(BufReader::with_capacity(utils::READ_BUFFER_SIZE, file))
        };
        Ok(tar::Archive::new(inner))
    }

    fn tar_entries(&self) -> Result<Vec<String>, String> {
        let mut archive = self.open_tar()?;
        let mut result = Vec::new();
        let entries = archive.entries().map_err(|x| format!("{}: {}", self.path.display(), x))?;
        for entry in entries {
            let entry = entry.map_err(|x| format!("{}: {}", self.path.display(), x))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = tar_entry_name(&entry)?;
            if self.is_wanted(&name) {
                result.push(name);
            }
        }
        result.sort();
        Ok(result)
    }

    // A tar stream cannot seek. We read the entries in one pass if the archive order matches the sorted order.
    // Otherwise each additional pass picks up the next entries in sorted order.
    fn read_tar(&self, sender: &SyncSender<LineChunk>, entries: Option<Vec<String>>) -> Result<bool, String> {
        let entries = match entries {
            Some(entries) => entries,
            None => self.tar_entries()?,
        };
        let mut remaining: VecDeque<String> = entries.into();
        let mut passes = 0;
        while !remaining.is_empty() {
            let before = remaining.len();
            let mut archive = self.open_tar()?;
            let entries = archive.entries().map_err(|x| format!("{}: {}", self.path.display(), x))?;
            for entry in entries {
                let entry = entry.map_err(|x| format!("{}: {}", self.path.display(), x))?;
                if !entry.header().entry_type().is_file() {
                    continue;
                }
                let name = tar_entry_name(&entry)?;
                if remaining.front() != Some(&name) {
                    continue;
                }
                remaining.pop_front();
                debug!("Reading entry {} in {}", name, self.path.display());
                let reader = entry_reader(&name, entry);
                if !send_lines(reader, sender, &name)? {
                    return Ok(false);
                }
                if remaining.is_empty() {
                    break;
                }
            }
            if remaining.len() == before {
                return Err(format!("Entry {} disappeared from {}", remaining[0], self.path.display()));
            }
            passes += 1;
        }
        if passes > 1 {
            debug!("Read {} in {} passes", self.path.display(), passes);
        }
        Ok(true)
    }
}

fn tar_entry_name<R: Read>(entry: &tar::Entry<'_, R>) -> Result<String, String> {
    let path = entry.path().map_err(|x| x.to_string())?;
    Ok(path.to_string_lossy().into_owned())
}

//-----------------------------------------------------------------------------

// Returns a buffered reader for an archive entry, decompressing it if the name indicates gzip compression.
fn entry_reader<'a, R: Read + 'a>(name: &str, reader: R) -> Box<dyn BufRead + 'a> {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".gz") || lower.ends_with(".bgz") || lower.ends_with(".bgzf") {
        Box::new(BufReader::with_capacity(utils::READ_BUFFER_SIZE, MultiGzDecoder::new(reader)))
    } else {
        Box::new(BufReader::with_capacity(utils::READ_BUFFER_SIZE, reader))
    }
}

// Lines from a single entry, starting from the given 1-based line number.
#[derive(Debug)]
struct LineChunk {
    entry: Arc<str>,
    first_line: usize,
    lines: Vec<String>,
}

impl LineChunk {
    fn new(entry: &Arc<str>, first_line: usize) -> Self {
        LineChunk { entry: entry.clone(), first_line, lines: Vec::with_capacity(Archive::CHUNK_SIZE) }
    }
}

// Sends the lines from the reader in chunks.
// Returns `Ok(false)` if the receiver was dropped.
fn send_lines<R: BufRead>(mut reader: R, sender: &SyncSender<LineChunk>, name: &str) -> Result<bool, String> {
    let entry: Arc<str> = Arc::from(name);
    let mut line_num = 1;
    let mut chunk = LineChunk::new(&entry, line_num);
    let mut buf: Vec<u8> = Vec::new();
    loop {
        buf.clear();
        let len = match reader.read_until(b'\n', &mut buf) {
            Ok(len) => len,
            Err(err) => {
                // Deliver what we have before reporting the failure.
                let _ = sender.send(chunk);
                return Err(format!("{} line {}: {}", name, line_num, err));
            },
        };
        if len == 0 {
            break;
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        chunk.lines.push(String::from_utf8_lossy(&buf).into_owned());
        line_num += 1;
        if chunk.lines.len() >= Archive::CHUNK_SIZE {
            if sender.send(chunk).is_err() {
                return Ok(false);
            }
            chunk = LineChunk::new(&entry, line_num);
        }
    }
    if !chunk.lines.is_empty() && sender.send(chunk).is_err() {
        return Ok(false);
    }
    Ok(true)
}

//-----------------------------------------------------------------------------

/// A lazy, forward-only sequence of lines from an [`Archive`].
///
/// Trailing newline and carriage return characters are removed.
/// Invalid UTF-8 is replaced with the replacement character.
/// Dropping the sequence stops the background reader.
///
/// # Examples
///
/// ```
/// use allele_base::archive::{Archive, ArchiveFormat};
/// use simple_sds::serialize;
/// use std::fs;
///
/// let filename = serialize::temp_file_name("archive-lines");
/// fs::write(&filename, "first\nsecond\n").unwrap();
/// let archive = Archive::new(&filename, ArchiveFormat::None, None).unwrap();
///
/// let mut lines = archive.lines();
/// assert_eq!(lines.next().as_deref(), Some("first"));
/// assert_eq!(lines.next().as_deref(), Some("second"));
/// assert_eq!(lines.entry_line(), 2);
/// assert_eq!(lines.current_entry(), filename.file_name().and_then(|x| x.to_str()));
/// assert!(lines.next().is_none());
/// drop(lines);
/// fs::remove_file(&filename).unwrap();
/// ```
#[derive(Debug)]
pub struct ArchiveLines {
    receiver: Option<Receiver<LineChunk>>,
    buffer: std::vec::IntoIter<String>,
    lines: usize,
    entry: Option<Arc<str>>,
    entry_line: usize,
    reader: Option<JoinHandle<()>>,
}

impl ArchiveLines {
    /// Returns the number of lines returned so far.
    pub fn lines_read(&self) -> usize {
        self.lines
    }

    /// Returns the name of the entry the most recent line came from.
    pub fn current_entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    /// Returns the 1-based line number of the most recent line within its entry, or 0 before the first line.
    pub fn entry_line(&self) -> usize {
        self.entry_line
    }
}

impl Iterator for ArchiveLines {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.buffer.next() {
                self.lines += 1;
                self.entry_line += 1;
                return Some(line);
            }
            let receiver = self.receiver.as_ref()?;
            match receiver.recv() {
                Ok(chunk) => {
                    if chunk.lines.is_empty() {
                        continue;
                    }
                    self.entry = Some(chunk.entry);
                    self.entry_line = chunk.first_line - 1;
                    self.buffer = chunk.lines.into_iter();
                },
                Err(_) => {
                    self.receiver = None;
                    return None;
                },
            }
        }
    }
}

impl Drop for ArchiveLines {
    fn drop(&mut self) {
        // Disconnecting the channel makes the reader thread stop at the next chunk.
        self.receiver = None;
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

//-----------------------------------------------------------------------------
