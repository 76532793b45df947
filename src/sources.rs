//! Parsers for the external data sources.
//!
//! Every source has its own line grammar, but all parsers normalize a line into `(VariantKey, VariantRecord)` pairs.
//! See [`ParsedLine`] for the possible outcomes.
//! The parser for a source is resolved from the closed [`SourceId`] enumeration.
//!
//! Normalization rules shared by all sources:
//!
//! * Header and comment lines are ignored.
//! * Lines on contigs other than the stored chromosomes are counted separately from malformed lines.
//! * Missing trailing columns are treated as absent fields.
//! * Frequencies are converted to percentages.
//!   Proportions in `[0, 1]` are multiplied by 100.
//! * Alleles are converted to the minimal representation with [`VariantKey::normalized`].
//!   Symbolic (`<DEL>`), missing (`.`), and spanning-deletion (`*`) alleles are ignored.
//! * A multi-allelic line yields one pair for each usable alternate allele.
//!
//! Duplicate keys within a source are resolved later by the sorter with [`VariantRecord::combine_duplicate`].

use crate::error::Error;
use crate::variant::{VariantKey, VariantRecord};

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

mod dbnsfp;
mod vcf;

pub use dbnsfp::DbnsfpColumns;

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// Identifiers of the supported data sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// dbSNP VCF with `CAF` (1000 Genomes) and `TOPMED` proportions.
    Dbsnp,
    /// TOPMed VCF with `AF` proportions.
    Topmed,
    /// UK10K VCF with `AF` proportions.
    Uk10k,
    /// Exome Sequencing Project VCF with `MAF` percentages for EA, AA, and all samples.
    Esp,
    /// ExAC VCF with per-population `AC_*` and `AN_*` counts.
    Exac,
    /// gnomAD exomes VCF with per-population `AC_*` and `AN_*` counts.
    GnomadExome,
    /// gnomAD genomes VCF with per-population `AC_*` and `AN_*` counts.
    GnomadGenome,
    /// dbNSFP tab-separated pathogenicity predictions with a column header.
    Dbnsfp,
    /// ClinVar VCF with clinical significance.
    Clinvar,
}

impl SourceId {
    /// All sources.
    pub const ALL: [SourceId; 9] = [
        Self::Dbsnp, Self::Topmed, Self::Uk10k, Self::Esp, Self::Exac,
        Self::GnomadExome, Self::GnomadGenome, Self::Dbnsfp, Self::Clinvar,
    ];

    /// Returns the name of the source used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            Self::Dbsnp => "dbsnp",
            Self::Topmed => "topmed",
            Self::Uk10k => "uk10k",
            Self::Esp => "esp",
            Self::Exac => "exac",
            Self::GnomadExome => "gnomad_exome",
            Self::GnomadGenome => "gnomad_genome",
            Self::Dbnsfp => "dbnsfp",
            Self::Clinvar => "clinvar",
        }
    }

    /// Returns `true` if the source may supply clinical-significance payloads.
    pub fn is_clinical(self) -> bool {
        self == Self::Clinvar
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_ascii_lowercase().replace('-', "_");
        Self::ALL.iter().copied().find(|source| source.name() == name).ok_or(
            format!("Unknown source: {}", s)
        )
    }
}

/// Reference assembly for sources that report coordinates on multiple assemblies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Assembly {
    Hg19,
    #[default]
    Hg38,
}

impl FromStr for Assembly {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hg19" | "grch37" => Ok(Assembly::Hg19),
            "hg38" | "grch38" => Ok(Assembly::Hg38),
            _ => Err(format!("Unknown assembly: {}", s)),
        }
    }
}

//-----------------------------------------------------------------------------

/// Result of parsing a single line.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedLine {
    /// Variants with their partial records.
    /// The list may be empty if the line carries no annotations.
    Parsed(Vec<(VariantKey, VariantRecord)>),
    /// Header, comment, or empty line.
    Header,
    /// The line was malformed and skipped for the given reason.
    Skipped(String),
    /// The line is on the named contig, which is not one of the stored chromosomes.
    /// Unplaced contigs and alternate haplotypes (`chrUn_*`, `*_random`, `*_alt`) end up here.
    OtherContig(String),
}

impl ParsedLine {
    /// Returns `true` if the line was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self, ParsedLine::Skipped(_))
    }

    // Outcome for a line on a contig that is not a stored chromosome.
    fn unsupported_contig(name: &str) -> Self {
        if name.is_empty() || name == "." || name.contains(char::is_whitespace) {
            ParsedLine::Skipped(format!("Invalid chromosome: {:?}", name))
        } else {
            ParsedLine::OtherContig(String::from(name))
        }
    }
}

/// Line parser for a single source.
///
/// Most sources are stateless.
/// dbNSFP parser state is created from the column header line.
///
/// # Examples
///
/// ```
/// use allele_base::sources::{ParsedLine, SourceId, SourceParser};
/// use allele_base::{FrequencySource, VariantKey};
///
/// let mut parser = SourceParser::new(SourceId::Topmed);
/// assert_eq!(parser.parse_line("##fileformat=VCFv4.2"), ParsedLine::Header);
///
/// let result = parser.parse_line("1\t100\trs1\tA\tT\t.\tPASS\tAF=0.25");
/// if let ParsedLine::Parsed(pairs) = result {
///     assert_eq!(pairs.len(), 1);
///     assert_eq!(pairs[0].0, VariantKey::new(1, 100, "A", "T").unwrap());
///     assert_eq!(pairs[0].1.frequencies[&FrequencySource::Topmed], 25.0);
/// } else {
///     panic!("Expected a parsed line");
/// }
/// ```
#[derive(Clone, Debug)]
pub struct SourceParser {
    source: SourceId,
    assembly: Assembly,
    columns: Option<DbnsfpColumns>,
}

impl SourceParser {
    /// Creates a parser for the given source using the default assembly.
    pub fn new(source: SourceId) -> Self {
        Self::with_assembly(source, Assembly::default())
    }

    /// Creates a parser for the given source using the given assembly.
    ///
    /// The assembly only matters for dbNSFP.
    pub fn with_assembly(source: SourceId, assembly: Assembly) -> Self {
        SourceParser { source, assembly, columns: None }
    }

    /// Returns the source of the parser.
    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Parses a line without the trailing newline.
    pub fn parse_line(&mut self, line: &str) -> ParsedLine {
        match self.source {
            SourceId::Dbnsfp => {
                if line.trim().is_empty() {
                    return ParsedLine::Header;
                }
                if line.starts_with('#') {
                    if line.starts_with("#chr") {
                        match DbnsfpColumns::from_header(line, self.assembly) {
                            Ok(columns) => self.columns = Some(columns),
                            Err(message) => {
                                warn!("dbNSFP: {}", message);
                                self.columns = None;
                            },
                        }
                    }
                    return ParsedLine::Header;
                }
                match &self.columns {
                    Some(columns) => dbnsfp::parse_line(columns, line),
                    None => ParsedLine::Skipped(String::from("No valid column header before the data")),
                }
            },
            source => vcf::parse_line(line, vcf::extractor(source)),
        }
    }
}

//-----------------------------------------------------------------------------

/// Counts skipped lines and logs the first few of them in full.
#[derive(Clone, Debug)]
pub struct SkipLog {
    source_name: String,
    skipped: usize,
}

impl SkipLog {
    /// Number of skipped lines logged in full for each source.
    pub const MAX_REPORTED: usize = 10;

    /// Creates a new skip log for the named source.
    pub fn new(source_name: &str) -> Self {
        SkipLog { source_name: String::from(source_name), skipped: 0 }
    }

    /// Records a skipped line.
    pub fn skip(&mut self, file: &str, line: usize, reason: &str) {
        self.skipped += 1;
        if self.skipped <= Self::MAX_REPORTED {
            let error = Error::StructuralParse {
                source_name: self.source_name.clone(),
                file: String::from(file),
                line,
                message: String::from(reason),
            };
            warn!("Skipped line: {}", error);
            if self.skipped == Self::MAX_REPORTED {
                warn!("{}: further skipped lines are only counted", self.source_name);
            }
        }
    }

    /// Returns the number of skipped lines.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

//-----------------------------------------------------------------------------

// Value conversions shared by the parsers.

// Parses a numeric value. Missing values (`.` or empty) and non-finite values are absent.
fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() || value == "." {
        return None;
    }
    let result = value.parse::<f64>().ok()?;
    if result.is_finite() { Some(result) } else { None }
}

// Converts a proportion in `[0, 1]` into a percentage.
// The multiplication is done with double precision so that equal values on different scales converge.
fn proportion(value: &str) -> Option<f32> {
    let value = parse_number(value)?;
    if (0.0..=1.0).contains(&value) { Some((value * 100.0) as f32) } else { None }
}

// Validates a percentage in `[0, 100]`.
fn percentage(value: &str) -> Option<f32> {
    let value = parse_number(value)?;
    if (0.0..=100.0).contains(&value) { Some(value as f32) } else { None }
}

// Computes a percentage from allele count and allele number.
fn count_ratio(count: &str, number: &str) -> Option<f32> {
    let count = parse_number(count)?;
    let number = parse_number(number)?;
    if number <= 0.0 || count < 0.0 || count > number {
        return None;
    }
    Some((count / number * 100.0) as f32)
}

// Parses a list of scores separated by `;` or `,`, ignoring missing values.
fn scores(value: &str) -> Vec<f32> {
    value.split(|c| c == ';' || c == ',')
        .filter_map(parse_number)
        .map(|x| x as f32)
        .collect()
}

// Returns `true` if the allele cannot be represented as a key.
fn is_unusable_allele(allele: &str) -> bool {
    allele.is_empty() || allele == "." || allele == "*" || allele.starts_with('<') || allele.contains('[') || allele.contains(']')
}

//-----------------------------------------------------------------------------
