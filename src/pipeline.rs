//! Building the store from external resources.
//!
//! [`IngestionPipeline`] runs the download, extract, and parse stages for each configured resource on a pool of worker threads.
//! Each resource produces an independent stream of `(VariantKey, VariantRecord)` pairs in canonical key order.
//! The streams are then merged with [`merge_sources`] in registration order:
//! fields from later resources are only added if they were absent ([`VariantRecord::augment`]).
//! Clinical-significance payloads are only accepted from the ClinVar source.
//!
//! The merged entries are encoded in blocks and sent to an insertion thread that owns the [`StoreBuilder`].
//! A record contributes to the [`ALLELE_MAP`] if it has frequencies, scores, or an rsID, and to the [`CLINVAR_MAP`] if it has a clinical payload.
//!
//! A resource that cannot be downloaded, extracted, or parsed only loses its own contribution.
//! This includes failures to write the temporary files for sorting the resource.
//! Configuration errors are reported before any expensive work starts.
//! I/O errors while merging and database errors end the build, and the partial output file is removed.

use crate::codec::{ClinVarCodec, Codec, RecordCodec};
use crate::db::{StoreBuilder, ALLELE_MAP, CLINVAR_MAP};
use crate::error::{Error, Result};
use crate::archive::ArchiveLines;
use crate::resource::{self, Resource, ResourceConfig, ResourceState};
use crate::sort::{ExternalSorter, SortParameters, SortedEntries};
use crate::sources::{ParsedLine, SkipLog, SourceId};
use crate::variant::{VariantKey, VariantRecord};

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use tracing::{debug, info, warn};


//-----------------------------------------------------------------------------

/// Parameters for building the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineParams {
    /// Maximum number of resources processed concurrently.
    pub threads: usize,
    /// Number of records buffered in memory for each resource before writing a sorted run.
    pub records_per_run: usize,
    /// Number of sorted runs merged at once.
    pub files_per_merge: usize,
    /// Number of merged entries inserted into the store in a single transaction.
    pub block_size: usize,
    /// Directory for temporary files, or [`None`] for the system default.
    pub work_dir: Option<PathBuf>,
    /// Fetch missing cache files from their remote locations.
    pub download: bool,
}

impl PipelineParams {
    /// Default value for `threads`.
    pub const DEFAULT_THREADS: usize = 4;
    /// Default value for `block_size`.
    pub const DEFAULT_BLOCK_SIZE: usize = 10_000;

    /// Returns the sort parameters for a single resource.
    pub fn sort_parameters(&self) -> SortParameters {
        SortParameters {
            records_per_run: self.records_per_run,
            files_per_merge: self.files_per_merge,
            work_dir: self.work_dir.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(Error::Configuration(String::from("Number of threads must be positive")));
        }
        if self.records_per_run == 0 {
            return Err(Error::Configuration(String::from("Records per run must be positive")));
        }
        if self.files_per_merge < 2 {
            return Err(Error::Configuration(String::from("Files per merge must be at least 2")));
        }
        if self.block_size == 0 {
            return Err(Error::Configuration(String::from("Block size must be positive")));
        }
        if let Some(work_dir) = &self.work_dir {
            if !work_dir.is_dir() {
                return Err(Error::Configuration(format!("Work directory {} does not exist", work_dir.display())));
            }
        }
        Ok(())
    }
}

impl Default for PipelineParams {
    fn default() -> Self {
        PipelineParams {
            threads: Self::DEFAULT_THREADS,
            records_per_run: SortParameters::DEFAULT_RECORDS_PER_RUN,
            files_per_merge: SortParameters::DEFAULT_FILES_PER_MERGE,
            block_size: Self::DEFAULT_BLOCK_SIZE,
            work_dir: None,
            download: false,
        }
    }
}

//-----------------------------------------------------------------------------

/// Outcome of ingesting a single resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceReport {
    /// Name of the resource.
    pub name: String,
    /// Source parser used for the resource.
    pub source: SourceId,
    /// Final state of the resource.
    pub state: ResourceState,
    /// Number of lines read.
    pub lines: usize,
    /// Number of records ingested before combining duplicates.
    pub ingested: usize,
    /// Number of malformed lines skipped.
    pub skipped: usize,
    /// Number of lines on contigs other than the stored chromosomes.
    pub other_contigs: usize,
    /// Number of clinical payloads dropped because the source is not ClinVar.
    pub clinvar_dropped: usize,
}

impl SourceReport {
    fn new(resource: &Resource) -> Self {
        SourceReport {
            name: resource.name().to_string(),
            source: resource.source(),
            state: resource.status().state(),
            lines: 0,
            ingested: 0,
            skipped: 0,
            other_contigs: 0,
            clinvar_dropped: 0,
        }
    }
}

/// Summary of a build.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Reports for each resource in registration order.
    pub sources: Vec<SourceReport>,
    /// Number of entries in each map.
    pub map_sizes: BTreeMap<String, usize>,
}

impl BuildReport {
    /// Returns the report for the named resource.
    pub fn source(&self, name: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|report| report.name == name)
    }

    /// Returns the number of entries in the named map.
    pub fn map_size(&self, name: &str) -> usize {
        self.map_sizes.get(name).copied().unwrap_or(0)
    }

    /// Returns the names of the resources that failed.
    pub fn failed_sources(&self) -> Vec<&str> {
        self.sources.iter().filter(|report| report.state.is_failed()).map(|report| report.name.as_str()).collect()
    }

    /// Writes the report to the log.
    pub fn log(&self) {
        for report in self.sources.iter() {
            info!(
                "{} ({}): {}; {} lines, {} records ingested, {} lines skipped, {} lines on other contigs",
                report.name, report.source, report.state, report.lines, report.ingested, report.skipped, report.other_contigs
            );
        }
        for (name, size) in self.map_sizes.iter() {
            info!("Map {}: {} entries", name, size);
        }
        let failed = self.failed_sources();
        if !failed.is_empty() {
            warn!("Failed resources: {}", failed.join(", "));
        }
    }
}

//-----------------------------------------------------------------------------

/// Ingestion pipeline for a list of resources.
///
/// The order of the resources is their registration order, which determines precedence when merging.
#[derive(Clone, Debug)]
pub struct IngestionPipeline {
    resources: Vec<Resource>,
    params: PipelineParams,
}

impl IngestionPipeline {
    /// Creates a pipeline for the given resources with cache files in the data directory.
    ///
    /// Returns [`Error::Configuration`] if the parameters or a resource configuration are invalid.
    pub fn new<P: AsRef<Path>>(configs: Vec<ResourceConfig>, data_dir: P, params: PipelineParams) -> Result<Self> {
        params.validate()?;
        if configs.is_empty() {
            return Err(Error::Configuration(String::from("No resources configured")));
        }
        let mut names = BTreeSet::new();
        for config in configs.iter() {
            if !names.insert(config.name.as_str()) {
                return Err(Error::Configuration(format!("Duplicate resource name: {}", config.name)));
            }
        }
        let resources = configs.into_iter()
            .map(|config| Resource::new(config, data_dir.as_ref()))
            .collect::<Result<Vec<Resource>>>()?;
        Ok(IngestionPipeline { resources, params })
    }

    /// Creates a pipeline from a TOML configuration file.
    pub fn from_config_file<P: AsRef<Path>, Q: AsRef<Path>>(config_file: P, data_dir: Q, params: PipelineParams) -> Result<Self> {
        let configs = resource::load_config(config_file)?;
        Self::new(configs, data_dir, params)
    }

    /// Returns the resources in registration order.
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Returns the parameters.
    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    /// Builds a new store in the given file.
    ///
    /// Returns an error if the file already exists.
    /// If the build fails, the partial file is removed.
    pub fn build<P: AsRef<Path>>(self, output: P) -> Result<BuildReport> {
        let output = output.as_ref();
        let builder = StoreBuilder::create(output)?;
        let result = self.run(builder);
        if result.is_err() {
            let _ = fs::remove_file(output);
        }
        result
    }

    fn run(self, mut builder: StoreBuilder) -> Result<BuildReport> {
        builder.create_map::<RecordCodec>(ALLELE_MAP)?;
        builder.create_map::<ClinVarCodec>(CLINVAR_MAP)?;

        info!("Ingesting {} resources using {} threads", self.resources.len(), self.params.threads);
        let outputs = ingest_all(self.resources, &self.params)?;
        let mut sources = Vec::with_capacity(outputs.len());
        let mut streams = Vec::new();
        for output in outputs {
            if let Some(entries) = output.entries {
                streams.push(entries);
            }
            sources.push(output.report);
        }

        let parsed: Vec<&str> = sources.iter()
            .filter(|report| report.state == ResourceState::Parsed)
            .map(|report| report.name.as_str())
            .collect();
        builder.set_tag("sources", &parsed.join(","))?;
        info!("Merging {} sources", streams.len());
        let map_sizes = insert_entries(builder, merge_sources(streams), self.params.block_size)?;

        let report = BuildReport { sources, map_sizes };
        report.log();
        Ok(report)
    }
}

//-----------------------------------------------------------------------------

// Sorted output from a single resource.
struct SourceOutput {
    report: SourceReport,
    entries: Option<SortedEntries>,
}

// Processes the resources on worker threads and returns the outputs in registration order.
fn ingest_all(resources: Vec<Resource>, params: &PipelineParams) -> Result<Vec<SourceOutput>> {
    let count = resources.len();
    let workers = params.threads.min(count).max(1);
    let queue: Arc<Mutex<VecDeque<(usize, Resource)>>> = Arc::new(Mutex::new(resources.into_iter().enumerate().collect()));

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let queue = queue.clone();
        let params = params.clone();
        handles.push(thread::spawn(move || -> Result<Vec<(usize, SourceOutput)>> {
            let mut outputs = Vec::new();
            loop {
                let next = match queue.lock() {
                    Ok(mut queue) => queue.pop_front(),
                    Err(_) => None,
                };
                let (index, resource) = match next {
                    Some(next) => next,
                    None => break,
                };
                outputs.push((index, ingest_source(resource, &params)?));
            }
            Ok(outputs)
        }));
    }

    let mut outputs: Vec<Option<SourceOutput>> = (0..count).map(|_| None).collect();
    let mut first_error: Option<Error> = None;
    for handle in handles {
        match handle.join() {
            Ok(Ok(result)) => {
                for (index, output) in result {
                    outputs[index] = Some(output);
                }
            },
            Ok(Err(error)) => {
                first_error.get_or_insert(error);
            },
            Err(_) => {
                first_error.get_or_insert(Error::Io(io::Error::other("Worker thread panicked")));
            },
        }
    }
    if let Some(error) = first_error {
        return Err(error);
    }
    Ok(outputs.into_iter().flatten().collect())
}

// Runs the stages for a single resource.
// Failed stages are recorded in the report. Errors are only returned if the stages are used incorrectly.
fn ingest_source(mut resource: Resource, params: &PipelineParams) -> Result<SourceOutput> {
    let mut report = SourceReport::new(&resource);

    if let Err(error) = resource.download(params.download) {
        if !error.is_recoverable() {
            return Err(error);
        }
        warn!("{}", error);
        report.state = resource.status().state();
        return Ok(SourceOutput { report, entries: None });
    }
    let entries = match resource.extract() {
        Ok(entries) => entries,
        Err(error) => {
            if !error.is_recoverable() {
                return Err(error);
            }
            report.state = resource.status().state();
            return Ok(SourceOutput { report, entries: None });
        },
    };

    resource.start_parse()?;
    let sorted = parse_resource(&resource, entries, params, &mut report).and_then(|sorter| sorter.finish());
    let sorted = match sorted {
        Ok(sorted) => sorted,
        Err(error) => {
            warn!("{}: parsing failed: {}", resource.name(), error);
            resource.fail_parse()?;
            report.state = resource.status().state();
            return Ok(SourceOutput { report, entries: None });
        },
    };

    let success = resource.finish_parse(report.ingested)?;
    report.state = resource.status().state();
    let entries = if success { Some(sorted) } else { None };
    Ok(SourceOutput { report, entries })
}

// Parses the given entries of the resource into a sorter.
// Returns an error if writing the temporary files fails.
fn parse_resource(resource: &Resource, entries: Vec<String>, params: &PipelineParams, report: &mut SourceReport) -> Result<ExternalSorter> {
    let mut parser = resource.parser();
    let clinical = resource.source().is_clinical();
    let multi_entry = resource.archive().format().is_multi_entry();
    let mut skips = SkipLog::new(resource.name());
    let mut sorter = ExternalSorter::new(params.sort_parameters());
    let mut lines = resource.archive().lines_of(entries);
    while let Some(line) = lines.next() {
        report.lines += 1;
        match parser.parse_line(&line) {
            ParsedLine::Parsed(pairs) => {
                for (key, mut record) in pairs {
                    if !clinical && record.take_clinvar().is_some() {
                        report.clinvar_dropped += 1;
                    }
                    if record.is_empty() {
                        continue;
                    }
                    sorter.push(key, record)?;
                }
            },
            ParsedLine::Header => {},
            ParsedLine::OtherContig(_) => report.other_contigs += 1,
            ParsedLine::Skipped(reason) => {
                skips.skip(&line_location(resource, &lines, multi_entry), lines.entry_line(), &reason);
            },
        }
    }
    drop(lines);

    report.ingested = sorter.len();
    report.skipped = skips.skipped();
    if report.clinvar_dropped > 0 {
        warn!("{}: dropped {} clinical payloads from a non-clinical source", resource.name(), report.clinvar_dropped);
    }
    if report.other_contigs > 0 {
        debug!("{}: {} lines on other contigs", resource.name(), report.other_contigs);
    }
    info!("{}: {} records from {} lines, {} lines skipped", resource.name(), report.ingested, report.lines, report.skipped);
    Ok(sorter)
}

// Returns `archive:entry` for multi-entry containers and the path of the file otherwise.
fn line_location(resource: &Resource, lines: &ArchiveLines, multi_entry: bool) -> String {
    match lines.current_entry() {
        Some(entry) if multi_entry => format!("{}:{}", resource.path().display(), entry),
        _ => resource.path().display().to_string(),
    }
}

//-----------------------------------------------------------------------------

/// Merges sorted streams from multiple sources by key.
///
/// Each stream must be in canonical key order with unique keys.
/// Records for the same key are combined in stream order: later streams only add fields that were absent.
/// The first error from a stream is returned and ends the iteration.
///
/// # Examples
///
/// ```
/// use allele_base::pipeline::merge_sources;
/// use allele_base::{FrequencySource, VariantKey, VariantRecord};
///
/// let key = VariantKey::new(1, 100, "A", "T").unwrap();
/// let first = vec![Ok((key.clone(), VariantRecord::with_frequency(FrequencySource::Topmed, 15.0)))];
/// let second = vec![Ok((key.clone(), VariantRecord::with_frequency(FrequencySource::Topmed, 20.0)))];
///
/// let merged: Vec<_> = merge_sources(vec![first.into_iter(), second.into_iter()]).map(|x| x.unwrap()).collect();
/// assert_eq!(merged.len(), 1);
/// assert_eq!(merged[0].1.frequencies[&FrequencySource::Topmed], 15.0);
/// ```
pub fn merge_sources<I>(streams: Vec<I>) -> MergedEntries<I>
where
    I: Iterator<Item = Result<(VariantKey, VariantRecord)>>,
{
    let records = (0..streams.len()).map(|_| None).collect();
    MergedEntries {
        heap: BinaryHeap::with_capacity(streams.len()),
        streams,
        records,
        started: false,
        failed: false,
    }
}

/// Merged entries from [`merge_sources`].
#[derive(Debug)]
pub struct MergedEntries<I> {
    streams: Vec<I>,
    // Smallest key first; ties broken by stream order.
    heap: BinaryHeap<Reverse<(VariantKey, usize)>>,
    records: Vec<Option<VariantRecord>>,
    started: bool,
    failed: bool,
}

impl<I> MergedEntries<I>
where
    I: Iterator<Item = Result<(VariantKey, VariantRecord)>>,
{
    // Reads the next entry from the stream into the heap.
    fn advance(&mut self, stream: usize) -> Result<()> {
        if let Some(entry) = self.streams[stream].next() {
            let (key, record) = entry?;
            self.records[stream] = Some(record);
            self.heap.push(Reverse((key, stream)));
        }
        Ok(())
    }

    fn next_entry(&mut self) -> Result<Option<(VariantKey, VariantRecord)>> {
        if !self.started {
            self.started = true;
            for stream in 0..self.streams.len() {
                self.advance(stream)?;
            }
        }

        let (key, stream) = match self.heap.pop() {
            Some(Reverse(next)) => next,
            None => return Ok(None),
        };
        let mut record = self.records[stream].take().unwrap_or_default();
        self.advance(stream)?;
        while self.heap.peek().is_some_and(|Reverse((next, _))| *next == key) {
            if let Some(Reverse((_, other))) = self.heap.pop() {
                if let Some(addition) = self.records[other].take() {
                    record.augment(&addition);
                }
                self.advance(other)?;
            }
        }
        Ok(Some((key, record)))
    }
}

impl<I> Iterator for MergedEntries<I>
where
    I: Iterator<Item = Result<(VariantKey, VariantRecord)>>,
{
    type Item = Result<(VariantKey, VariantRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_entry() {
            Ok(entry) => entry.map(Ok),
            Err(error) => {
                self.failed = true;
                Some(Err(error))
            },
        }
    }
}

//-----------------------------------------------------------------------------

// A block of encoded entries for both maps.
#[derive(Debug, Default)]
struct EncodedBlock {
    alleles: Vec<(VariantKey, Vec<u8>)>,
    clinvar: Vec<(VariantKey, Vec<u8>)>,
}

impl EncodedBlock {
    fn push(&mut self, key: VariantKey, mut record: VariantRecord) {
        let clinvar = record.take_clinvar();
        if record.has_allele_data() {
            self.alleles.push((key.clone(), RecordCodec::encode(&record)));
        }
        if let Some(data) = clinvar {
            self.clinvar.push((key, ClinVarCodec::encode(&data)));
        }
    }

    fn len(&self) -> usize {
        self.alleles.len() + self.clinvar.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Encodes the merged entries in blocks and inserts them into the store.
// Returns the number of entries in each map.
fn insert_entries<I>(builder: StoreBuilder, entries: I, block_size: usize) -> Result<BTreeMap<String, usize>>
where
    I: Iterator<Item = Result<(VariantKey, VariantRecord)>>,
{
    // The main thread encodes the merged entries and sends them in blocks to an insertion thread.
    // If something fails, the error is sent to the next thread, which passes it through and stops.
    // An empty block indicates that we are done.
    let (to_insert, from_merge) = mpsc::sync_channel::<Result<EncodedBlock>>(4);
    let (to_report, from_insert) = mpsc::sync_channel(1);

    let insert_thread = thread::spawn(move || {
        let mut builder = builder;
        let mut blocks = 0;
        loop {
            let block = match from_merge.recv() {
                Ok(block) => block,
                Err(_) => return,
            };
            match block {
                Ok(block) => {
                    if block.is_empty() {
                        break;
                    }
                    let result = builder.insert_block(ALLELE_MAP, &block.alleles)
                        .and_then(|_| builder.insert_block(CLINVAR_MAP, &block.clinvar));
                    if let Err(error) = result {
                        let _ = to_report.send(Err(error));
                        return;
                    }
                    blocks += 1;
                },
                Err(error) => {
                    let _ = to_report.send(Err(error));
                    return;
                },
            }
        }
        debug!("Inserted {} blocks", blocks);
        let _ = to_report.send(builder.finish());
    });

    let mut block = EncodedBlock::default();
    let mut failed = false;
    for entry in entries {
        match entry {
            Ok((key, record)) => {
                block.push(key, record);
                if block.len() >= block_size && to_insert.send(Ok(std::mem::take(&mut block))).is_err() {
                    failed = true;
                    break;
                }
            },
            Err(error) => {
                let _ = to_insert.send(Err(error));
                failed = true;
                break;
            },
        }
    }
    if !failed {
        if !block.is_empty() {
            let _ = to_insert.send(Ok(block));
        }
        let _ = to_insert.send(Ok(EncodedBlock::default()));
    }
    drop(to_insert);

    let _ = insert_thread.join();
    match from_insert.recv() {
        Ok(result) => result,
        Err(_) => Err(Error::Io(io::Error::other("Insertion thread stopped without a result"))),
    }
}

//-----------------------------------------------------------------------------
