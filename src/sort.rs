//! External memory sorting of variant records.
//!
//! [`ExternalSorter`] collects `(VariantKey, VariantRecord)` pairs from a single source.
//! When the buffer fills up, the pairs are sorted and written to a zstd-compressed temporary file (a run).
//! [`ExternalSorter::finish`] merges the runs with a multiway merge and returns the pairs in canonical key order.
//!
//! Duplicate keys are combined with [`VariantRecord::combine_duplicate`] in the order the pairs were pushed.
//! The sort is stable: the first pair pushed for a key is the one whose rsID and clinical interpretation survive.
//! Each key appears at most once in the output.
//!
//! Temporary files are removed when they are no longer needed, including when the sorter or the output is dropped early.

use crate::codec::{self, Codec, KeyCodec, RecordCodec};
use crate::error::{Error, Result};
use crate::variant::{VariantKey, VariantRecord};

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use simple_sds::serialize;
use tracing::debug;


//-----------------------------------------------------------------------------

/// Parameters for external sorting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortParameters {
    /// Number of records buffered in memory before writing a run.
    pub records_per_run: usize,
    /// Number of runs to merge at once.
    pub files_per_merge: usize,
    /// Directory for temporary files, or [`None`] for the system default.
    pub work_dir: Option<PathBuf>,
}

impl SortParameters {
    /// Default for `records_per_run`.
    pub const DEFAULT_RECORDS_PER_RUN: usize = 1_000_000;
    /// Default for `files_per_merge`.
    pub const DEFAULT_FILES_PER_MERGE: usize = 32;
    /// Compression level for temporary files.
    pub const COMPRESSION_LEVEL: i32 = 3;
}

impl Default for SortParameters {
    fn default() -> Self {
        Self {
            records_per_run: Self::DEFAULT_RECORDS_PER_RUN,
            files_per_merge: Self::DEFAULT_FILES_PER_MERGE,
            work_dir: None,
        }
    }
}

//-----------------------------------------------------------------------------

/// A temporary file storing a sorted run.
#[derive(Debug)]
struct TempFile {
    path: Option<PathBuf>,
    records: usize,
}

impl TempFile {
    fn create(work_dir: Option<&Path>) -> Self {
        let path = serialize::temp_file_name("allele-sort");
        let path = match (work_dir, path.file_name()) {
            (Some(dir), Some(name)) => dir.join(name),
            _ => path,
        };
        Self { path: Some(path), records: 0 }
    }

    fn path(&self) -> Result<&Path> {
        self.path.as_deref().ok_or(Error::Configuration(String::from("Temporary file has already been removed")))
    }

    // Writes the entries and returns the number of entries written.
    fn write<I: IntoIterator<Item = Result<(VariantKey, VariantRecord)>>>(&mut self, entries: I) -> Result<usize> {
        let file = File::create(self.path()?)?;
        let encoder = zstd::Encoder::new(file, SortParameters::COMPRESSION_LEVEL)?;
        let mut writer = BufWriter::new(encoder);
        let mut records = 0;
        for entry in entries {
            let (key, record) = entry?;
            writer.write_all(&KeyCodec::encode(&key))?;
            writer.write_all(&RecordCodec::encode(&record))?;
            records += 1;
        }
        writer.into_inner().map_err(|x| x.into_error())?.finish()?;
        self.records = records;
        Ok(records)
    }

    fn reader(&self) -> Result<RunReader> {
        let file = File::open(self.path()?)?;
        let decoder = zstd::Decoder::new(file)?;
        Ok(RunReader::File(decoder, self.records))
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            let _ = fs::remove_file(path);
        }
    }
}

// A source of sorted entries without duplicate keys.
enum RunReader {
    Memory(std::vec::IntoIter<(VariantKey, VariantRecord)>),
    File(zstd::Decoder<'static, BufReader<File>>, usize),
}

impl RunReader {
    fn next_entry(&mut self) -> Result<Option<(VariantKey, VariantRecord)>> {
        match self {
            RunReader::Memory(iter) => Ok(iter.next()),
            RunReader::File(reader, remaining) => {
                if *remaining == 0 {
                    return Ok(None);
                }
                let key = codec::read_entry(reader)?;
                let record = codec::read_entry(reader)?;
                match (key, record) {
                    (Some(key), Some(record)) => {
                        *remaining -= 1;
                        Ok(Some((KeyCodec::decode(&key)?, RecordCodec::decode(&record)?)))
                    },
                    _ => Err(Error::CorruptRecord(String::from("Unexpected end of a temporary run"))),
                }
            },
        }
    }
}

//-----------------------------------------------------------------------------

/// Sorts the pairs by key and combines duplicates in their original order.
pub fn sort_and_combine(mut entries: Vec<(VariantKey, VariantRecord)>) -> Vec<(VariantKey, VariantRecord)> {
    // Stable sort keeps duplicates in push order.
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let mut result: Vec<(VariantKey, VariantRecord)> = Vec::with_capacity(entries.len());
    for (key, record) in entries {
        match result.last_mut() {
            Some((last_key, last_record)) if *last_key == key => last_record.combine_duplicate(&record),
            _ => result.push((key, record)),
        }
    }
    result
}

/// External memory sorter for the pairs from a single source.
///
/// # Examples
///
/// ```
/// use allele_base::sort::{ExternalSorter, SortParameters};
/// use allele_base::{FrequencySource, VariantKey, VariantRecord};
///
/// let mut sorter = ExternalSorter::new(SortParameters::default());
/// let second = VariantKey::new(2, 50, "C", "G").unwrap();
/// let first = VariantKey::new(1, 999, "A", "T").unwrap();
/// sorter.push(second.clone(), VariantRecord::with_frequency(FrequencySource::Topmed, 1.0)).unwrap();
/// sorter.push(first.clone(), VariantRecord::with_frequency(FrequencySource::Topmed, 2.0)).unwrap();
/// sorter.push(first.clone(), VariantRecord::with_frequency(FrequencySource::Topmed, 5.0)).unwrap();
///
/// let sorted: Vec<_> = sorter.finish().unwrap().map(|x| x.unwrap()).collect();
/// assert_eq!(sorted.len(), 2);
/// assert_eq!(sorted[0].0, first);
/// assert_eq!(sorted[0].1.frequencies[&FrequencySource::Topmed], 5.0);
/// assert_eq!(sorted[1].0, second);
/// ```
#[derive(Debug)]
pub struct ExternalSorter {
    params: SortParameters,
    buffer: Vec<(VariantKey, VariantRecord)>,
    runs: Vec<TempFile>,
    pushed: usize,
}

impl ExternalSorter {
    /// Creates a new sorter with the given parameters.
    pub fn new(params: SortParameters) -> Self {
        let capacity = params.records_per_run.min(SortParameters::DEFAULT_RECORDS_PER_RUN);
        ExternalSorter {
            params,
            buffer: Vec::with_capacity(capacity),
            runs: Vec::new(),
            pushed: 0,
        }
    }

    /// Returns the number of pairs pushed so far.
    pub fn len(&self) -> usize {
        self.pushed
    }

    /// Returns `true` if no pairs have been pushed.
    pub fn is_empty(&self) -> bool {
        self.pushed == 0
    }

    /// Returns the number of runs written to temporary files.
    pub fn runs(&self) -> usize {
        self.runs.len()
    }

    /// Adds a pair to the sorter.
    ///
    /// Returns an error if writing a temporary file fails.
    pub fn push(&mut self, key: VariantKey, record: VariantRecord) -> Result<()> {
        self.buffer.push((key, record));
        self.pushed += 1;
        if self.buffer.len() >= self.params.records_per_run.max(1) {
            self.write_run()?;
        }
        Ok(())
    }

    fn write_run(&mut self) -> Result<()> {
        let entries = sort_and_combine(std::mem::take(&mut self.buffer));
        let mut run = TempFile::create(self.params.work_dir.as_deref());
        let records = run.write(entries.into_iter().map(Ok))?;
        debug!("Wrote run {} with {} records", self.runs.len(), records);
        self.runs.push(run);
        Ok(())
    }

    /// Finishes sorting and returns the pairs in sorted order.
    ///
    /// Runs are merged in rounds until at most `files_per_merge` remain.
    /// The final merge happens lazily as the output is consumed.
    pub fn finish(mut self) -> Result<SortedEntries> {
        let memory = sort_and_combine(std::mem::take(&mut self.buffer));
        let files_per_merge = self.params.files_per_merge.max(2);

        let mut runs = std::mem::take(&mut self.runs);
        let mut round = 0;
        while runs.len() + 1 > files_per_merge {
            debug!("Merge round {}: {} runs", round, runs.len());
            let mut next_runs = Vec::new();
            let mut iter = runs.into_iter().peekable();
            while iter.peek().is_some() {
                let group: Vec<TempFile> = iter.by_ref().take(files_per_merge).collect();
                if group.len() == 1 {
                    next_runs.extend(group);
                    continue;
                }
                let readers = group.iter().map(|run| run.reader()).collect::<Result<Vec<RunReader>>>()?;
                let merged = SortedEntries::new(readers, Vec::new())?;
                let mut output = TempFile::create(self.params.work_dir.as_deref());
                output.write(merged)?;
                next_runs.push(output);
            }
            runs = next_runs;
            round += 1;
        }

        let mut readers = runs.iter().map(|run| run.reader()).collect::<Result<Vec<RunReader>>>()?;
        readers.push(RunReader::Memory(memory.into_iter()));
        SortedEntries::new(readers, runs)
    }
}

//-----------------------------------------------------------------------------

// Heap entry ordered so that the smallest key from the earliest run is at the top of the max-heap.
struct HeapEntry {
    key: VariantKey,
    run: usize,
    record: VariantRecord,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.run == other.run
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key.cmp(&self.key).then_with(|| other.run.cmp(&self.run))
    }
}

/// Sorted pairs from an [`ExternalSorter`].
///
/// Each key appears once.
/// Reading a temporary file may fail, so the items are results.
/// The temporary files are removed when this is dropped.
pub struct SortedEntries {
    readers: Vec<RunReader>,
    heap: BinaryHeap<HeapEntry>,
    failed: bool,
    _runs: Vec<TempFile>,
}

impl SortedEntries {
    fn new(mut readers: Vec<RunReader>, runs: Vec<TempFile>) -> Result<Self> {
        let mut heap = BinaryHeap::with_capacity(readers.len());
        for (run, reader) in readers.iter_mut().enumerate() {
            if let Some((key, record)) = reader.next_entry()? {
                heap.push(HeapEntry { key, run, record });
            }
        }
        Ok(SortedEntries { readers, heap, failed: false, _runs: runs })
    }

    // Pops the smallest entry and refills the heap from the same run.
    fn pop(&mut self) -> Result<Option<HeapEntry>> {
        let entry = match self.heap.pop() {
            Some(entry) => entry,
            None => return Ok(None),
        };
        if let Some((key, record)) = self.readers[entry.run].next_entry()? {
            self.heap.push(HeapEntry { key, run: entry.run, record });
        }
        Ok(Some(entry))
    }

    fn next_combined(&mut self) -> Result<Option<(VariantKey, VariantRecord)>> {
        let mut entry = match self.pop()? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        while self.heap.peek().map(|next| next.key == entry.key).unwrap_or(false) {
            if let Some(duplicate) = self.pop()? {
                entry.record.combine_duplicate(&duplicate.record);
            }
        }
        Ok(Some((entry.key, entry.record)))
    }
}

impl Iterator for SortedEntries {
    type Item = Result<(VariantKey, VariantRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_combined() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            },
        }
    }
}

//-----------------------------------------------------------------------------
