//! External resources and their processing stages.
//!
//! A [`Resource`] is a named external data source with a remote location, a local cache file, an archive format, and a source parser.
//! Resources are described in a TOML configuration file with one `[[resource]]` table per resource:
//!
//! ```toml
//! [[resource]]
//! name = "gnomad-exomes"
//! source = "gnomad_exome"
//! url = "https://example.org/gnomad.exomes.vcf.bgz"
//! file = "gnomad/gnomad.exomes.vcf.bgz"
//! format = "bgz"
//! min_records = 1000
//! ```
//!
//! Each resource goes through three stages: download, extract, and parse.
//! The stages and their outcomes are tracked by [`ResourceStatus`].
//! A failed stage is terminal for the resource but not for the build.

use crate::archive::{Archive, ArchiveFormat};
use crate::error::{Error, Result};
use crate::sources::{Assembly, SourceId, SourceParser};
use crate::utils;

use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// Outcome of a single processing stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    NotStarted,
    Succeeded,
    Failed,
}

/// Processing stages of a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Download,
    Extract,
    Parse,
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Download => "download",
            Stage::Extract => "extract",
            Stage::Parse => "parse",
        };
        write!(f, "{}", name)
    }
}

/// Combined state of a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceState {
    NotStarted,
    Downloading,
    Downloaded,
    DownloadFailed,
    Extracting,
    Extracted,
    ExtractFailed,
    Parsing,
    Parsed,
    ParseFailed,
}

impl ResourceState {
    /// Returns `true` if no further stages can run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::DownloadFailed | Self::ExtractFailed | Self::Parsed | Self::ParseFailed)
    }

    /// Returns `true` if a stage has failed.
    pub fn is_failed(self) -> bool {
        matches!(self, Self::DownloadFailed | Self::ExtractFailed | Self::ParseFailed)
    }
}

impl Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Downloading => "DOWNLOADING",
            Self::Downloaded => "DOWNLOADED",
            Self::DownloadFailed => "DOWNLOAD_FAILED",
            Self::Extracting => "EXTRACTING",
            Self::Extracted => "EXTRACTED",
            Self::ExtractFailed => "EXTRACT_FAILED",
            Self::Parsing => "PARSING",
            Self::Parsed => "PARSED",
            Self::ParseFailed => "PARSE_FAILED",
        };
        write!(f, "{}", name)
    }
}

/// Status of the processing stages of a resource.
///
/// Stages must run in order, and each stage runs at most once.
/// A stage can only start after the previous stage has succeeded.
///
/// # Examples
///
/// ```
/// use allele_base::resource::{ResourceState, ResourceStatus, Stage};
///
/// let mut status = ResourceStatus::default();
/// assert_eq!(status.state(), ResourceState::NotStarted);
/// status.start(Stage::Download).unwrap();
/// assert_eq!(status.state(), ResourceState::Downloading);
/// status.finish(Stage::Download, true).unwrap();
/// assert_eq!(status.state(), ResourceState::Downloaded);
///
/// // Parsing cannot start before extraction.
/// assert!(status.start(Stage::Parse).is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceStatus {
    download: Status,
    extract: Status,
    parse: Status,
    running: Option<Stage>,
}

impl ResourceStatus {
    /// Returns the status of the given stage.
    pub fn status(&self, stage: Stage) -> Status {
        match stage {
            Stage::Download => self.download,
            Stage::Extract => self.extract,
            Stage::Parse => self.parse,
        }
    }

    /// Returns the combined state.
    pub fn state(&self) -> ResourceState {
        match self.running {
            Some(Stage::Download) => return ResourceState::Downloading,
            Some(Stage::Extract) => return ResourceState::Extracting,
            Some(Stage::Parse) => return ResourceState::Parsing,
            None => {},
        }
        match (self.download, self.extract, self.parse) {
            (Status::NotStarted, _, _) => ResourceState::NotStarted,
            (Status::Failed, _, _) => ResourceState::DownloadFailed,
            (Status::Succeeded, Status::NotStarted, _) => ResourceState::Downloaded,
            (Status::Succeeded, Status::Failed, _) => ResourceState::ExtractFailed,
            (Status::Succeeded, Status::Succeeded, Status::NotStarted) => ResourceState::Extracted,
            (Status::Succeeded, Status::Succeeded, Status::Failed) => ResourceState::ParseFailed,
            (Status::Succeeded, Status::Succeeded, Status::Succeeded) => ResourceState::Parsed,
        }
    }

    fn previous(stage: Stage) -> Option<Stage> {
        match stage {
            Stage::Download => None,
            Stage::Extract => Some(Stage::Download),
            Stage::Parse => Some(Stage::Extract),
        }
    }

    /// Starts the given stage.
    ///
    /// Returns an error if the transition is not allowed.
    pub fn start(&mut self, stage: Stage) -> Result<()> {
        if let Some(running) = self.running {
            return Err(Error::Configuration(format!("Cannot start {} while {} is running", stage, running)));
        }
        if self.status(stage) != Status::NotStarted {
            return Err(Error::Configuration(format!("Stage {} has already run", stage)));
        }
        if let Some(previous) = Self::previous(stage) {
            if self.status(previous) != Status::Succeeded {
                return Err(Error::Configuration(format!("Cannot start {} before {} has succeeded", stage, previous)));
            }
        }
        self.running = Some(stage);
        Ok(())
    }

    /// Finishes the running stage with the given outcome.
    ///
    /// Returns an error if the stage is not running.
    pub fn finish(&mut self, stage: Stage, success: bool) -> Result<()> {
        if self.running != Some(stage) {
            return Err(Error::Configuration(format!("Stage {} is not running", stage)));
        }
        let status = if success { Status::Succeeded } else { Status::Failed };
        match stage {
            Stage::Download => self.download = status,
            Stage::Extract => self.extract = status,
            Stage::Parse => self.parse = status,
        }
        self.running = None;
        Ok(())
    }
}

//-----------------------------------------------------------------------------

/// Configuration of a single resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    /// Unique name of the resource.
    pub name: String,
    /// Source parser for the resource.
    pub source: SourceId,
    /// Remote location: `http(s)://`, `file://`, or a local path.
    #[serde(default)]
    pub url: Option<String>,
    /// Cache file relative to the data directory.
    pub file: PathBuf,
    /// Archive format. Detected from the file name if absent.
    #[serde(default)]
    pub format: Option<ArchiveFormat>,
    /// Glob pattern selecting the wanted entries in a multi-entry archive.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Minimum number of records for the resource to be considered successfully parsed.
    #[serde(default)]
    pub min_records: Option<usize>,
    /// Reference assembly for dbNSFP.
    #[serde(default)]
    pub assembly: Option<Assembly>,
}

impl ResourceConfig {
    /// Creates a configuration for a local file with the format detected from the file name.
    pub fn new(name: &str, source: SourceId, file: &str) -> Self {
        ResourceConfig {
            name: String::from(name),
            source,
            url: None,
            file: PathBuf::from(file),
            format: None,
            pattern: None,
            min_records: None,
            assembly: None,
        }
    }

    /// Returns the archive format, detecting it from the file name if necessary.
    pub fn archive_format(&self) -> ArchiveFormat {
        self.format.unwrap_or_else(|| ArchiveFormat::detect(&self.file))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default, rename = "resource")]
    resources: Vec<ResourceConfig>,
}

/// Parses resource configurations from TOML text.
///
/// Returns an error if the text is not valid, if a resource name is empty or repeated, or if a selection pattern is invalid.
pub fn parse_config(text: &str) -> Result<Vec<ResourceConfig>> {
    let config: ConfigFile = toml::from_str(text).map_err(|x| Error::Configuration(x.to_string()))?;
    let mut names = BTreeSet::new();
    for resource in config.resources.iter() {
        if resource.name.is_empty() {
            return Err(Error::Configuration(String::from("Resource without a name")));
        }
        if !names.insert(resource.name.clone()) {
            return Err(Error::Configuration(format!("Duplicate resource name: {}", resource.name)));
        }
        if resource.file.as_os_str().is_empty() {
            return Err(Error::Configuration(format!("Resource {} has no cache file", resource.name)));
        }
        if let Some(pattern) = &resource.pattern {
            glob::Pattern::new(pattern).map_err(|x| {
                Error::Configuration(format!("Resource {}: invalid pattern {}: {}", resource.name, pattern, x))
            })?;
        }
    }
    Ok(config.resources)
}

/// Loads resource configurations from a TOML file.
pub fn load_config<P: AsRef<Path>>(filename: P) -> Result<Vec<ResourceConfig>> {
    let text = fs::read_to_string(&filename).map_err(|x| {
        Error::Configuration(format!("Cannot read configuration file {}: {}", filename.as_ref().display(), x))
    })?;
    parse_config(&text)
}

//-----------------------------------------------------------------------------

/// A configured resource with its processing status.
#[derive(Clone, Debug)]
pub struct Resource {
    config: ResourceConfig,
    archive: Archive,
    status: ResourceStatus,
}

impl Resource {
    /// Creates a resource with the cache file in the given data directory.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new<P: AsRef<Path>>(config: ResourceConfig, data_dir: P) -> Result<Self> {
        let path = data_dir.as_ref().join(&config.file);
        let archive = Archive::new(&path, config.archive_format(), config.pattern.as_deref()).map_err(|x| {
            Error::Configuration(format!("Resource {}: {}", config.name, x))
        })?;
        if config.assembly.is_some() && config.source != SourceId::Dbnsfp {
            return Err(Error::Configuration(format!("Resource {}: assembly is only supported for dbNSFP", config.name)));
        }
        Ok(Resource { config, archive, status: ResourceStatus::default() })
    }

    /// Returns the name of the resource.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the source of the resource.
    pub fn source(&self) -> SourceId {
        self.config.source
    }

    /// Returns the configuration of the resource.
    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    /// Returns the path to the local cache file.
    pub fn path(&self) -> &Path {
        self.archive.path()
    }

    /// Returns the archive for the local cache file.
    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// Returns the processing status.
    pub fn status(&self) -> &ResourceStatus {
        &self.status
    }

    /// Returns a new parser for the resource.
    pub fn parser(&self) -> SourceParser {
        SourceParser::with_assembly(self.config.source, self.config.assembly.unwrap_or_default())
    }

    /// Runs the download stage.
    ///
    /// An existing cache file is used as is.
    /// Otherwise the file is fetched from the remote location if `fetch` is `true`.
    /// Returns [`Error::TransientResource`] if the file is not available after the stage.
    pub fn download(&mut self, fetch: bool) -> Result<()> {
        self.status.start(Stage::Download)?;
        let result = if utils::file_exists(self.path()) {
            info!("{}: using cached file {}", self.name(), self.path().display());
            Ok(())
        } else if !fetch {
            Err(format!("{} not found and downloading is disabled", self.path().display()))
        } else {
            match &self.config.url {
                Some(url) => {
                    info!("{}: downloading {}", self.name(), url);
                    fetch_file(url, self.path())
                },
                None => Err(format!("{} not found and no URL was given", self.path().display())),
            }
        };
        self.status.finish(Stage::Download, result.is_ok())?;
        result.map_err(|message| Error::TransientResource { resource: self.name().to_string(), message })
    }

    /// Runs the extract stage and returns the wanted entries.
    ///
    /// The stage fails with [`Error::Extraction`] if the archive cannot be listed or contains no wanted entries.
    pub fn extract(&mut self) -> Result<Vec<String>> {
        self.status.start(Stage::Extract)?;
        let entries = match self.archive.entries() {
            Ok(entries) if entries.is_empty() => Err(String::from("No wanted entries in the archive")),
            result => result,
        };
        self.status.finish(Stage::Extract, entries.is_ok())?;
        match entries {
            Ok(entries) => {
                if let Some(size) = utils::file_size(self.path()) {
                    info!("{}: {} entries in {} ({})", self.name(), entries.len(), self.path().display(), size);
                }
                Ok(entries)
            },
            Err(message) => {
                warn!("{}: extraction failed: {}", self.name(), message);
                Err(Error::Extraction { resource: self.name().to_string(), message })
            },
        }
    }

    /// Starts the parse stage.
    pub fn start_parse(&mut self) -> Result<()> {
        self.status.start(Stage::Parse)
    }

    /// Finishes the parse stage with the given number of records.
    ///
    /// Returns `false` if the resource yielded no records or fewer than the configured minimum.
    pub fn finish_parse(&mut self, records: usize) -> Result<bool> {
        let minimum = self.config.min_records.unwrap_or(1).max(1);
        let success = records >= minimum;
        if !success {
            warn!("{}: parsed {} records, expected at least {}", self.name(), records, minimum);
        }
        self.status.finish(Stage::Parse, success)?;
        Ok(success)
    }

    /// Marks the running parse stage as failed.
    pub fn fail_parse(&mut self) -> Result<()> {
        self.status.finish(Stage::Parse, false)
    }
}

//-----------------------------------------------------------------------------

// Copies or downloads the file from the location into the target path.
// The data is written to a partial file that is renamed after a successful transfer.
fn fetch_file(location: &str, target: &Path) -> std::result::Result<(), String> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|x| format!("Cannot create {}: {}", parent.display(), x))?;
    }
    let mut partial = target.as_os_str().to_os_string();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let result = if location.starts_with("http://") || location.starts_with("https://") {
        download_url(location, &partial)
    } else {
        let source = location.strip_prefix("file://").unwrap_or(location);
        fs::copy(source, &partial).map(|_| ()).map_err(|x| format!("Cannot copy {}: {}", source, x))
    };
    if let Err(message) = result {
        let _ = fs::remove_file(&partial);
        return Err(message);
    }
    fs::rename(&partial, target).map_err(|x| format!("Cannot rename {}: {}", partial.display(), x))
}

fn download_url(url: &str, target: &Path) -> std::result::Result<(), String> {
    let response = ureq::get(url).call().map_err(|x| format!("{}: {}", url, x))?;
    let mut reader = response.into_body().into_reader();
    let mut file = File::create(target).map_err(|x| format!("Cannot create {}: {}", target.display(), x))?;
    io::copy(&mut reader, &mut file).map_err(|x| format!("{}: {}", url, x))?;
    Ok(())
}

//-----------------------------------------------------------------------------
