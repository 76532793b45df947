//! Variant identities and their annotation payloads.
//!
//! A [`VariantKey`] identifies a variant by (chromosome, position, reference allele, alternate allele).
//! The derived ordering of the key is the canonical order of the store: chromosome, then position, then the reference allele, then the alternate allele.
//!
//! A [`VariantRecord`] is a sparse collection of annotations.
//! An absent field means that no source reported it; it never means zero.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};
use std::str::FromStr;


//-----------------------------------------------------------------------------

/// Largest chromosome identifier (mitochondrial genome).
pub const MAX_CHROMOSOME: u8 = 25;

/// Chromosome identifier for chromosome X.
pub const CHROMOSOME_X: u8 = 23;

/// Chromosome identifier for chromosome Y.
pub const CHROMOSOME_Y: u8 = 24;

/// Chromosome identifier for the mitochondrial genome.
pub const CHROMOSOME_MT: u8 = 25;

/// Parses a chromosome name into an identifier in `1..=25`.
///
/// Accepts an optional `chr` prefix in any case, autosome numbers `1` to `22`, `X`, `Y`, `M`, and `MT`.
/// Returns [`None`] for anything else, including unplaced contigs and alternate haplotypes.
///
/// # Examples
///
/// ```
/// use allele_base::variant::parse_chromosome;
///
/// assert_eq!(parse_chromosome("chr7"), Some(7));
/// assert_eq!(parse_chromosome("X"), Some(23));
/// assert_eq!(parse_chromosome("chrM"), Some(25));
/// assert_eq!(parse_chromosome("chr1_KI270706v1_random"), None);
/// ```
pub fn parse_chromosome(name: &str) -> Option<u8> {
    let name = match name.get(..3) {
        Some(prefix) if name.len() > 3 && prefix.eq_ignore_ascii_case("chr") => &name[3..],
        _ => name,
    };
    match name {
        "X" | "x" => Some(CHROMOSOME_X),
        "Y" | "y" => Some(CHROMOSOME_Y),
        "M" | "m" | "MT" | "mt" | "Mt" => Some(CHROMOSOME_MT),
        _ => {
            if name.is_empty() || !name.bytes().all(|c| c.is_ascii_digit()) || name.starts_with('0') {
                return None;
            }
            let value = name.parse::<u8>().ok()?;
            if (1..CHROMOSOME_X).contains(&value) { Some(value) } else { None }
        },
    }
}

/// Returns the conventional name of the chromosome (`1` to `22`, `X`, `Y`, `MT`).
pub fn chromosome_name(chromosome: u8) -> String {
    match chromosome {
        CHROMOSOME_X => String::from("X"),
        CHROMOSOME_Y => String::from("Y"),
        CHROMOSOME_MT => String::from("MT"),
        _ => chromosome.to_string(),
    }
}

// Returns `true` if the allele is a plain nucleotide sequence.
fn is_nucleotide_sequence(allele: &str) -> bool {
    !allele.is_empty() && allele.bytes().all(|c| matches!(c, b'A' | b'C' | b'G' | b'T' | b'N'))
}

//-----------------------------------------------------------------------------

/// Canonical identity of a variant.
///
/// Positions are 1-based.
/// Alleles are upper-case nucleotide sequences over `ACGTN`.
/// The derived ordering compares the chromosome, the position, the reference allele, and the alternate allele, in this order.
///
/// # Examples
///
/// ```
/// use allele_base::VariantKey;
///
/// let first = VariantKey::new(1, 999, "A", "T").unwrap();
/// let second = VariantKey::new(2, 50, "C", "G").unwrap();
/// assert!(first < second);
///
/// // Padded representations collapse onto the same key.
/// let padded = VariantKey::normalized(1, 998, "GAC", "GTC").unwrap();
/// assert_eq!(padded, first);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantKey {
    chromosome: u8,
    position: u32,
    ref_allele: String,
    alt_allele: String,
}

impl VariantKey {
    /// Creates a new key from the given fields.
    ///
    /// The alleles are converted to upper case but otherwise kept as given.
    /// Returns an error if the chromosome is not in `1..=25`, the position is 0, or an allele is not a nucleotide sequence.
    pub fn new(chromosome: u8, position: u32, ref_allele: &str, alt_allele: &str) -> Result<Self, String> {
        if chromosome == 0 || chromosome > MAX_CHROMOSOME {
            return Err(format!("Invalid chromosome identifier: {}", chromosome));
        }
        if position == 0 {
            return Err(String::from("Positions are 1-based"));
        }
        let ref_allele = ref_allele.to_ascii_uppercase();
        let alt_allele = alt_allele.to_ascii_uppercase();
        if !is_nucleotide_sequence(&ref_allele) {
            return Err(format!("Invalid reference allele: {}", ref_allele));
        }
        if !is_nucleotide_sequence(&alt_allele) {
            return Err(format!("Invalid alternate allele: {}", alt_allele));
        }
        Ok(VariantKey { chromosome, position, ref_allele, alt_allele })
    }

    /// Creates a new key using the minimal representation of the alleles.
    ///
    /// Shared trailing bases are removed first, and then shared leading bases, as long as both alleles keep at least one base.
    /// The position is advanced by the number of leading bases removed.
    /// This collapses padded representations of the same variant onto one key, while indels keep their anchor base.
    pub fn normalized(chromosome: u8, position: u32, ref_allele: &str, alt_allele: &str) -> Result<Self, String> {
        let ref_allele = ref_allele.to_ascii_uppercase();
        let alt_allele = alt_allele.to_ascii_uppercase();
        let (offset, ref_allele, alt_allele) = trim_alleles(ref_allele.as_bytes(), alt_allele.as_bytes());
        let position = position.checked_add(offset as u32).ok_or(
            format!("Position overflow: {} + {}", position, offset)
        )?;
        // Anything that is not a nucleotide sequence is rejected by `new`.
        let ref_allele = String::from_utf8_lossy(ref_allele);
        let alt_allele = String::from_utf8_lossy(alt_allele);
        Self::new(chromosome, position, &ref_allele, &alt_allele)
    }

    /// Returns the chromosome identifier.
    #[inline]
    pub fn chromosome(&self) -> u8 {
        self.chromosome
    }

    /// Returns the 1-based position.
    #[inline]
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Returns the reference allele.
    #[inline]
    pub fn ref_allele(&self) -> &str {
        &self.ref_allele
    }

    /// Returns the alternate allele.
    #[inline]
    pub fn alt_allele(&self) -> &str {
        &self.alt_allele
    }

    /// Returns `true` if both alleles are single bases.
    pub fn is_snv(&self) -> bool {
        self.ref_allele.len() == 1 && self.alt_allele.len() == 1
    }
}

/// Removes shared suffixes and prefixes from the alleles.
///
/// Returns the number of removed leading bases and the trimmed alleles.
/// Both alleles always keep at least one base.
pub fn trim_alleles<'a>(ref_allele: &'a [u8], alt_allele: &'a [u8]) -> (usize, &'a [u8], &'a [u8]) {
    let mut ref_allele = ref_allele;
    let mut alt_allele = alt_allele;
    while ref_allele.len() > 1 && alt_allele.len() > 1 && ref_allele.last() == alt_allele.last() {
        ref_allele = &ref_allele[..ref_allele.len() - 1];
        alt_allele = &alt_allele[..alt_allele.len() - 1];
    }
    let mut offset = 0;
    while ref_allele.len() > 1 && alt_allele.len() > 1 && ref_allele[0] == alt_allele[0] {
        ref_allele = &ref_allele[1..];
        alt_allele = &alt_allele[1..];
        offset += 1;
    }
    (offset, ref_allele, alt_allele)
}

impl Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}-{}", chromosome_name(self.chromosome), self.position, self.ref_allele, self.alt_allele)
    }
}

impl FromStr for VariantKey {
    type Err = String;

    /// Parses a key of the form `chr-pos-ref-alt` or `chr:pos:ref:alt`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(|c| c == '-' || c == ':').collect();
        if fields.len() != 4 {
            return Err(format!("Expected chr-pos-ref-alt, got {}", s));
        }
        let chromosome = parse_chromosome(fields[0]).ok_or(format!("Invalid chromosome: {}", fields[0]))?;
        let position = fields[1].parse::<u32>().map_err(|x| format!("Invalid position {}: {}", fields[1], x))?;
        Self::new(chromosome, position, fields[2], fields[3])
    }
}

//-----------------------------------------------------------------------------

/// Sources of allele frequencies.
///
/// The discriminant is the identifier used in the binary encoding and must never change.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrequencySource {
    ThousandGenomes = 0,
    Topmed = 1,
    Uk10k = 2,
    EspEa = 3,
    EspAa = 4,
    EspAll = 5,
    ExacAfr = 6,
    ExacAmr = 7,
    ExacEas = 8,
    ExacFin = 9,
    ExacNfe = 10,
    ExacOth = 11,
    ExacSas = 12,
    GnomadExomeAfr = 13,
    GnomadExomeAmr = 14,
    GnomadExomeAsj = 15,
    GnomadExomeEas = 16,
    GnomadExomeFin = 17,
    GnomadExomeNfe = 18,
    GnomadExomeOth = 19,
    GnomadExomeSas = 20,
    GnomadGenomeAfr = 21,
    GnomadGenomeAmr = 22,
    GnomadGenomeAsj = 23,
    GnomadGenomeEas = 24,
    GnomadGenomeFin = 25,
    GnomadGenomeNfe = 26,
    GnomadGenomeOth = 27,
    GnomadGenomeSas = 28,
}

impl FrequencySource {
    /// All frequency sources in identifier order.
    pub const ALL: [FrequencySource; 29] = [
        Self::ThousandGenomes, Self::Topmed, Self::Uk10k,
        Self::EspEa, Self::EspAa, Self::EspAll,
        Self::ExacAfr, Self::ExacAmr, Self::ExacEas, Self::ExacFin, Self::ExacNfe, Self::ExacOth, Self::ExacSas,
        Self::GnomadExomeAfr, Self::GnomadExomeAmr, Self::GnomadExomeAsj, Self::GnomadExomeEas,
        Self::GnomadExomeFin, Self::GnomadExomeNfe, Self::GnomadExomeOth, Self::GnomadExomeSas,
        Self::GnomadGenomeAfr, Self::GnomadGenomeAmr, Self::GnomadGenomeAsj, Self::GnomadGenomeEas,
        Self::GnomadGenomeFin, Self::GnomadGenomeNfe, Self::GnomadGenomeOth, Self::GnomadGenomeSas,
    ];

    const NAMES: [&'static str; 29] = [
        "KG", "TOPMED", "UK10K",
        "ESP_EA", "ESP_AA", "ESP_ALL",
        "EXAC_AFR", "EXAC_AMR", "EXAC_EAS", "EXAC_FIN", "EXAC_NFE", "EXAC_OTH", "EXAC_SAS",
        "GNOMAD_E_AFR", "GNOMAD_E_AMR", "GNOMAD_E_ASJ", "GNOMAD_E_EAS",
        "GNOMAD_E_FIN", "GNOMAD_E_NFE", "GNOMAD_E_OTH", "GNOMAD_E_SAS",
        "GNOMAD_G_AFR", "GNOMAD_G_AMR", "GNOMAD_G_ASJ", "GNOMAD_G_EAS",
        "GNOMAD_G_FIN", "GNOMAD_G_NFE", "GNOMAD_G_OTH", "GNOMAD_G_SAS",
    ];

    /// Returns the identifier used in the binary encoding.
    #[inline]
    pub fn id(self) -> usize {
        self as usize
    }

    /// Returns the source with the given identifier.
    pub fn from_id(id: usize) -> Option<Self> {
        Self::ALL.get(id).copied()
    }

    /// Returns the short name of the source.
    pub fn name(self) -> &'static str {
        Self::NAMES[self.id()]
    }
}

impl Display for FrequencySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Sources of pathogenicity predictions.
///
/// The discriminant is the identifier used in the binary encoding and must never change.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathogenicitySource {
    Sift = 0,
    Polyphen = 1,
    MutationTaster = 2,
    Cadd = 3,
    Revel = 4,
    Mvp = 5,
}

impl PathogenicitySource {
    /// All pathogenicity sources in identifier order.
    pub const ALL: [PathogenicitySource; 6] = [
        Self::Sift, Self::Polyphen, Self::MutationTaster, Self::Cadd, Self::Revel, Self::Mvp,
    ];

    const NAMES: [&'static str; 6] = ["SIFT", "POLYPHEN", "MUTATION_TASTER", "CADD", "REVEL", "MVP"];

    /// Returns the identifier used in the binary encoding.
    #[inline]
    pub fn id(self) -> usize {
        self as usize
    }

    /// Returns the source with the given identifier.
    pub fn from_id(id: usize) -> Option<Self> {
        Self::ALL.get(id).copied()
    }

    /// Returns the short name of the source.
    pub fn name(self) -> &'static str {
        Self::NAMES[self.id()]
    }
}

impl Display for PathogenicitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

//-----------------------------------------------------------------------------

/// Clinical significance categories used by ClinVar.
///
/// The discriminant is the identifier used in the binary encoding and must never change.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClinicalSignificance {
    #[default]
    NotProvided = 0,
    Benign = 1,
    BenignOrLikelyBenign = 2,
    LikelyBenign = 3,
    UncertainSignificance = 4,
    LikelyPathogenic = 5,
    PathogenicOrLikelyPathogenic = 6,
    Pathogenic = 7,
    ConflictingPathogenicityInterpretations = 8,
    Affects = 9,
    Association = 10,
    DrugResponse = 11,
    Other = 12,
    Protective = 13,
    RiskFactor = 14,
}

impl ClinicalSignificance {
    /// All categories in identifier order.
    pub const ALL: [ClinicalSignificance; 15] = [
        Self::NotProvided, Self::Benign, Self::BenignOrLikelyBenign, Self::LikelyBenign,
        Self::UncertainSignificance, Self::LikelyPathogenic, Self::PathogenicOrLikelyPathogenic,
        Self::Pathogenic, Self::ConflictingPathogenicityInterpretations,
        Self::Affects, Self::Association, Self::DrugResponse, Self::Other, Self::Protective, Self::RiskFactor,
    ];

    /// Returns the identifier used in the binary encoding.
    #[inline]
    pub fn id(self) -> usize {
        self as usize
    }

    /// Returns the category with the given identifier.
    pub fn from_id(id: usize) -> Option<Self> {
        Self::ALL.get(id).copied()
    }

    /// Parses a ClinVar VCF `CLNSIG` token such as `Likely_pathogenic` or `Benign/Likely_benign`.
    ///
    /// Unknown tokens are reported as [`ClinicalSignificance::Other`].
    pub fn parse(token: &str) -> Self {
        let token = token.trim().trim_start_matches('_').to_ascii_lowercase().replace(' ', "_");
        match token.as_str() {
            "benign" => Self::Benign,
            "benign/likely_benign" => Self::BenignOrLikelyBenign,
            "likely_benign" => Self::LikelyBenign,
            "uncertain_significance" => Self::UncertainSignificance,
            "likely_pathogenic" => Self::LikelyPathogenic,
            "pathogenic/likely_pathogenic" => Self::PathogenicOrLikelyPathogenic,
            "pathogenic" => Self::Pathogenic,
            "conflicting_interpretations_of_pathogenicity" | "conflicting_classifications_of_pathogenicity" => {
                Self::ConflictingPathogenicityInterpretations
            },
            "affects" => Self::Affects,
            "association" => Self::Association,
            "drug_response" => Self::DrugResponse,
            "protective" => Self::Protective,
            "risk_factor" => Self::RiskFactor,
            "not_provided" | "" => Self::NotProvided,
            _ => Self::Other,
        }
    }
}

/// ClinVar review status of an interpretation.
///
/// The discriminant is the identifier used in the binary encoding and must never change.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReviewStatus {
    #[default]
    NoAssertionProvided = 0,
    NoAssertionCriteriaProvided = 1,
    NoInterpretationForSingleVariant = 2,
    CriteriaProvidedSingleSubmitter = 3,
    CriteriaProvidedConflictingInterpretations = 4,
    CriteriaProvidedMultipleSubmittersNoConflicts = 5,
    ReviewedByExpertPanel = 6,
    PracticeGuideline = 7,
}

impl ReviewStatus {
    /// All review statuses in identifier order.
    pub const ALL: [ReviewStatus; 8] = [
        Self::NoAssertionProvided, Self::NoAssertionCriteriaProvided, Self::NoInterpretationForSingleVariant,
        Self::CriteriaProvidedSingleSubmitter, Self::CriteriaProvidedConflictingInterpretations,
        Self::CriteriaProvidedMultipleSubmittersNoConflicts, Self::ReviewedByExpertPanel, Self::PracticeGuideline,
    ];

    /// Returns the identifier used in the binary encoding.
    #[inline]
    pub fn id(self) -> usize {
        self as usize
    }

    /// Returns the status with the given identifier.
    pub fn from_id(id: usize) -> Option<Self> {
        Self::ALL.get(id).copied()
    }

    /// Parses a ClinVar VCF `CLNREVSTAT` value such as `criteria_provided,_single_submitter`.
    ///
    /// Unknown values are reported as [`ReviewStatus::NoAssertionProvided`].
    pub fn parse(value: &str) -> Self {
        let normalized: String = value.to_ascii_lowercase().split(',')
            .map(|part| part.trim().trim_matches('_').replace('_', " "))
            .collect::<Vec<String>>()
            .join(", ");
        match normalized.as_str() {
            "no assertion criteria provided" => Self::NoAssertionCriteriaProvided,
            "no interpretation for the single variant" | "no classification for the single variant" => {
                Self::NoInterpretationForSingleVariant
            },
            "criteria provided, single submitter" => Self::CriteriaProvidedSingleSubmitter,
            "criteria provided, conflicting interpretations" | "criteria provided, conflicting classifications" => {
                Self::CriteriaProvidedConflictingInterpretations
            },
            "criteria provided, multiple submitters, no conflicts" => Self::CriteriaProvidedMultipleSubmittersNoConflicts,
            "reviewed by expert panel" => Self::ReviewedByExpertPanel,
            "practice guideline" => Self::PracticeGuideline,
            _ => Self::NoAssertionProvided,
        }
    }

    /// Returns the ClinVar star rating (0 to 4) for the status.
    pub fn stars(self) -> usize {
        match self {
            Self::PracticeGuideline => 4,
            Self::ReviewedByExpertPanel => 3,
            Self::CriteriaProvidedMultipleSubmittersNoConflicts => 2,
            Self::CriteriaProvidedSingleSubmitter | Self::CriteriaProvidedConflictingInterpretations => 1,
            _ => 0,
        }
    }
}

/// Clinical-significance payload for a variant.
///
/// Only the ClinVar source may produce this payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClinVarData {
    /// ClinVar allele identifier.
    pub allele_id: Option<u64>,
    /// Primary interpretation.
    pub primary_interpretation: ClinicalSignificance,
    /// Secondary and conflicting interpretations.
    pub secondary_interpretations: BTreeSet<ClinicalSignificance>,
    /// Review status of the primary interpretation.
    pub review_status: ReviewStatus,
    /// Associated conditions.
    pub conditions: Vec<String>,
}

impl ClinVarData {
    /// Returns `true` if the payload carries no information.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Combines a duplicate record from the same source into this one.
    ///
    /// The existing interpretation is kept.
    /// Secondary interpretations and conditions from the duplicate are added if they are new.
    pub fn combine_duplicate(&mut self, other: &ClinVarData) {
        if self.allele_id.is_none() {
            self.allele_id = other.allele_id;
        }
        self.secondary_interpretations.extend(other.secondary_interpretations.iter().copied());
        for condition in other.conditions.iter() {
            if !self.conditions.contains(condition) {
                self.conditions.push(condition.clone());
            }
        }
    }
}

//-----------------------------------------------------------------------------

/// Annotation payload for a variant.
///
/// Frequencies are percentages in `[0, 100]`.
/// Maps are ordered by source identifier, which makes the binary encoding deterministic.
///
/// # Examples
///
/// ```
/// use allele_base::{FrequencySource, VariantRecord};
///
/// let mut record = VariantRecord::default();
/// record.frequencies.insert(FrequencySource::Topmed, 1.5);
///
/// let mut other = VariantRecord::default();
/// other.frequencies.insert(FrequencySource::Topmed, 3.0);
/// other.frequencies.insert(FrequencySource::Uk10k, 2.0);
///
/// // Augmenting only adds fields that were absent.
/// record.augment(&other);
/// assert_eq!(record.frequencies[&FrequencySource::Topmed], 1.5);
/// assert_eq!(record.frequencies[&FrequencySource::Uk10k], 2.0);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VariantRecord {
    /// dbSNP identifier.
    pub rs_id: Option<String>,
    /// Allele frequencies as percentages.
    pub frequencies: BTreeMap<FrequencySource, f32>,
    /// Pathogenicity prediction scores.
    pub pathogenicity: BTreeMap<PathogenicitySource, f32>,
    /// Clinical-significance payload.
    pub clinvar: Option<ClinVarData>,
}

impl VariantRecord {
    /// Returns a record with a single frequency.
    pub fn with_frequency(source: FrequencySource, frequency: f32) -> Self {
        let mut result = Self::default();
        result.frequencies.insert(source, frequency);
        result
    }

    /// Returns `true` if no field has been set.
    pub fn is_empty(&self) -> bool {
        self.rs_id.is_none() && self.frequencies.is_empty() && self.pathogenicity.is_empty() && self.clinvar.is_none()
    }

    /// Returns `true` if the record has fields stored in the allele map.
    pub fn has_allele_data(&self) -> bool {
        self.rs_id.is_some() || !self.frequencies.is_empty() || !self.pathogenicity.is_empty()
    }

    /// Returns the maximum frequency over all sources, or [`None`] if there are no frequencies.
    pub fn max_frequency(&self) -> Option<f32> {
        self.frequencies.values().copied().reduce(f32::max)
    }

    /// Adds the fields of `other` that are absent from this record.
    ///
    /// Fields already present are never overwritten.
    /// Applying the same record twice has the same effect as applying it once.
    pub fn augment(&mut self, other: &VariantRecord) {
        if self.rs_id.is_none() {
            self.rs_id.clone_from(&other.rs_id);
        }
        for (source, frequency) in other.frequencies.iter() {
            self.frequencies.entry(*source).or_insert(*frequency);
        }
        for (source, score) in other.pathogenicity.iter() {
            self.pathogenicity.entry(*source).or_insert(*score);
        }
        if self.clinvar.is_none() {
            self.clinvar.clone_from(&other.clinvar);
        }
    }

    /// Combines a duplicate record from the same source into this record.
    ///
    /// The maximum frequency and the maximum score win.
    /// The first rsID and the first clinical interpretation are kept.
    pub fn combine_duplicate(&mut self, other: &VariantRecord) {
        if self.rs_id.is_none() {
            self.rs_id.clone_from(&other.rs_id);
        }
        for (source, frequency) in other.frequencies.iter() {
            let value = self.frequencies.entry(*source).or_insert(*frequency);
            *value = value.max(*frequency);
        }
        for (source, score) in other.pathogenicity.iter() {
            let value = self.pathogenicity.entry(*source).or_insert(*score);
            *value = value.max(*score);
        }
        match (&mut self.clinvar, &other.clinvar) {
            (Some(existing), Some(duplicate)) => existing.combine_duplicate(duplicate),
            (None, Some(duplicate)) => self.clinvar = Some(duplicate.clone()),
            _ => {},
        }
    }

    /// Removes and returns the clinical-significance payload.
    pub fn take_clinvar(&mut self) -> Option<ClinVarData> {
        self.clinvar.take()
    }
}

//-----------------------------------------------------------------------------
