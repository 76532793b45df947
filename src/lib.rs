//! # Allele-base: a variant annotation store using an SQLite database.
//!
//! Allele-base collects allele frequencies, pathogenicity predictions, and clinical significance for genomic variants from bulk reference files.
//! The annotations are merged into a single coordinate-ordered store that downstream analysis can query with point lookups.
//!
//! ### Basic concepts
//!
//! A variant is identified by a [`VariantKey`]: chromosome (1 to 22, 23 = X, 24 = Y, 25 = mitochondrial), 1-based position, reference allele, and alternate allele.
//! Keys are ordered by chromosome, position, reference allele, and alternate allele.
//! The annotations for a variant form a [`VariantRecord`].
//! All frequencies are stored as percentages in `[0, 100]`, regardless of how the source reported them.
//!
//! Keys and records are serialized with the versioned binary encodings in [`codec`].
//!
//! ### Building the store
//!
//! Each external resource is described by a [`ResourceConfig`] and goes through three stages:
//!
//! * Download: the resource is copied into a local cache file.
//! * Extract: the wanted entries of the archive are listed (see [`Archive`]).
//! * Parse: the lines are turned into partial records by a [`SourceParser`] and sorted in external memory.
//!
//! [`IngestionPipeline`] runs the stages for each resource and merges the sorted streams in registration order.
//! A later source may only add fields that are absent, and only ClinVar may provide clinical significance.
//! A failed resource only loses its own contribution.
//!
//! ### Querying the store
//!
//! See [`AlleleBase`] for the database, [`MapHandle`] for named maps, and [`MapInterface`] for lookups.
//! The store has two maps: [`db::ALLELE_MAP`] for frequencies, scores, and rsIDs, and [`db::CLINVAR_MAP`] for clinical-significance payloads.

pub mod archive;
pub mod codec;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod resource;
pub mod sort;
pub mod sources;
pub mod utils;
pub mod variant;

pub use archive::{Archive, ArchiveFormat, ArchiveLines};
pub use codec::{ClinVarCodec, Codec, KeyCodec, RecordCodec};
pub use db::{AlleleBase, MapHandle, MapInterface, StoreBuilder};
pub use error::{Error, Result};
pub use pipeline::{BuildReport, IngestionPipeline, PipelineParams};
pub use resource::{Resource, ResourceConfig, ResourceState};
pub use sources::{SourceId, SourceParser};
pub use variant::{ClinVarData, ClinicalSignificance, FrequencySource, PathogenicitySource, ReviewStatus};
pub use variant::{VariantKey, VariantRecord};
