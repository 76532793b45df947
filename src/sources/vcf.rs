//! Parsers for VCF-based sources.

use super::{count_ratio, is_unusable_allele, percentage, proportion, ParsedLine, SourceId};

use crate::utils;
use crate::variant::{self, ClinVarData, ClinicalSignificance, FrequencySource, ReviewStatus, VariantKey, VariantRecord};

//-----------------------------------------------------------------------------

/// The fields of a VCF data line used by the parsers.
#[derive(Clone, Debug)]
pub(super) struct VcfLine<'a> {
    pub chromosome: u8,
    pub position: u32,
    pub id: &'a str,
    pub ref_allele: &'a str,
    pub alt_alleles: Vec<&'a str>,
    pub info: &'a str,
}

impl<'a> VcfLine<'a> {
    // Columns after ALT are optional.
    fn parse(line: &'a str) -> Result<Self, ParsedLine> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 5 {
            return Err(ParsedLine::Skipped(format!("Expected at least 5 columns, found {}", fields.len())));
        }
        let chromosome = variant::parse_chromosome(fields[0]).ok_or_else(|| ParsedLine::unsupported_contig(fields[0]))?;
        let position = fields[1].parse::<u32>().map_err(|x| {
            ParsedLine::Skipped(format!("Invalid position {}: {}", fields[1], x))
        })?;
        if position == 0 {
            return Err(ParsedLine::Skipped(String::from("Position 0 is not valid")));
        }
        let info = fields.get(7).copied().unwrap_or("");
        Ok(VcfLine {
            chromosome,
            position,
            id: fields[2],
            ref_allele: fields[3],
            alt_alleles: fields[4].split(',').collect(),
            info,
        })
    }

    // Returns the value for the given alternate allele in a per-allele INFO list.
    fn allele_value(&self, key: &str, alt_index: usize) -> Option<&'a str> {
        utils::info_value(self.info, key)?.split(',').nth(alt_index)
    }

    // Returns the value for the given alternate allele in an INFO list that starts with the reference allele.
    fn allele_value_with_ref(&self, key: &str, alt_index: usize) -> Option<&'a str> {
        utils::info_value(self.info, key)?.split(',').nth(alt_index + 1)
    }
}

//-----------------------------------------------------------------------------

/// Extracts the annotations for the alternate allele with the given index.
pub(super) type Extractor = fn(&VcfLine<'_>, usize) -> VariantRecord;

/// Returns the extractor for a VCF-based source.
pub(super) fn extractor(source: SourceId) -> Extractor {
    match source {
        SourceId::Dbsnp => dbsnp,
        SourceId::Topmed => topmed,
        SourceId::Uk10k => uk10k,
        SourceId::Esp => esp,
        SourceId::Exac => exac,
        SourceId::GnomadExome => gnomad_exome,
        SourceId::GnomadGenome => gnomad_genome,
        SourceId::Clinvar => clinvar,
        // The dbNSFP parser never reaches this point.
        SourceId::Dbnsfp => empty,
    }
}

/// Parses a VCF line with the given extractor.
pub(super) fn parse_line(line: &str, extractor: Extractor) -> ParsedLine {
    if line.starts_with('#') || line.trim().is_empty() {
        return ParsedLine::Header;
    }
    let vcf_line = match VcfLine::parse(line) {
        Ok(vcf_line) => vcf_line,
        Err(outcome) => return outcome,
    };

    let mut result = Vec::new();
    let mut usable = 0;
    let mut first_error: Option<String> = None;
    for (alt_index, alt_allele) in vcf_line.alt_alleles.iter().enumerate() {
        if is_unusable_allele(alt_allele) {
            continue;
        }
        usable += 1;
        let key = match VariantKey::normalized(vcf_line.chromosome, vcf_line.position, vcf_line.ref_allele, alt_allele) {
            Ok(key) => key,
            Err(message) => {
                first_error.get_or_insert(message);
                continue;
            },
        };
        let record = extractor(&vcf_line, alt_index);
        if !record.is_empty() {
            result.push((key, record));
        }
    }

    if usable == 0 {
        return ParsedLine::Skipped(String::from("No usable alternate alleles"));
    }
    if let Some(message) = first_error {
        if result.is_empty() {
            return ParsedLine::Skipped(message);
        }
    }
    ParsedLine::Parsed(result)
}

//-----------------------------------------------------------------------------

fn empty(_: &VcfLine<'_>, _: usize) -> VariantRecord {
    VariantRecord::default()
}

fn dbsnp(line: &VcfLine<'_>, alt_index: usize) -> VariantRecord {
    let mut record = VariantRecord::default();
    record.rs_id = line.id.split(';').find(|id| id.starts_with("rs")).map(String::from);
    if let Some(value) = line.allele_value_with_ref("CAF", alt_index).and_then(proportion) {
        record.frequencies.insert(FrequencySource::ThousandGenomes, value);
    }
    if let Some(value) = line.allele_value_with_ref("TOPMED", alt_index).and_then(proportion) {
        record.frequencies.insert(FrequencySource::Topmed, value);
    }
    record
}

fn single_frequency(line: &VcfLine<'_>, alt_index: usize, source: FrequencySource) -> VariantRecord {
    let mut record = VariantRecord::default();
    if let Some(value) = line.allele_value("AF", alt_index).and_then(proportion) {
        record.frequencies.insert(source, value);
    }
    record
}

fn topmed(line: &VcfLine<'_>, alt_index: usize) -> VariantRecord {
    single_frequency(line, alt_index, FrequencySource::Topmed)
}

fn uk10k(line: &VcfLine<'_>, alt_index: usize) -> VariantRecord {
    single_frequency(line, alt_index, FrequencySource::Uk10k)
}

// ESP reports minor allele frequencies for the site as percentages in the order EA, AA, ALL.
fn esp(line: &VcfLine<'_>, _: usize) -> VariantRecord {
    let mut record = VariantRecord::default();
    if let Some(values) = utils::info_value(line.info, "MAF") {
        let sources = [FrequencySource::EspEa, FrequencySource::EspAa, FrequencySource::EspAll];
        for (source, value) in sources.iter().zip(values.split(',')) {
            if let Some(value) = percentage(value) {
                record.frequencies.insert(*source, value);
            }
        }
    }
    record
}

// Population frequencies from `AC_<pop>` (per allele) and `AN_<pop>` (per site).
fn population_frequencies(line: &VcfLine<'_>, alt_index: usize, populations: &[(&str, FrequencySource)]) -> VariantRecord {
    let mut record = VariantRecord::default();
    for (population, source) in populations.iter() {
        let count = line.allele_value(&format!("AC_{}", population), alt_index)
            .or_else(|| line.allele_value(&format!("AC_{}", population.to_ascii_uppercase()), alt_index));
        let number = utils::info_value(line.info, &format!("AN_{}", population))
            .or_else(|| utils::info_value(line.info, &format!("AN_{}", population.to_ascii_uppercase())));
        if let (Some(count), Some(number)) = (count, number) {
            if let Some(value) = count_ratio(count, number) {
                record.frequencies.insert(*source, value);
            }
        }
    }
    record
}

const EXAC_POPULATIONS: [(&str, FrequencySource); 7] = [
    ("AFR", FrequencySource::ExacAfr),
    ("AMR", FrequencySource::ExacAmr),
    ("EAS", FrequencySource::ExacEas),
    ("FIN", FrequencySource::ExacFin),
    ("NFE", FrequencySource::ExacNfe),
    ("OTH", FrequencySource::ExacOth),
    ("SAS", FrequencySource::ExacSas),
];

const GNOMAD_EXOME_POPULATIONS: [(&str, FrequencySource); 8] = [
    ("afr", FrequencySource::GnomadExomeAfr),
    ("amr", FrequencySource::GnomadExomeAmr),
    ("asj", FrequencySource::GnomadExomeAsj),
    ("eas", FrequencySource::GnomadExomeEas),
    ("fin", FrequencySource::GnomadExomeFin),
    ("nfe", FrequencySource::GnomadExomeNfe),
    ("oth", FrequencySource::GnomadExomeOth),
    ("sas", FrequencySource::GnomadExomeSas),
];

const GNOMAD_GENOME_POPULATIONS: [(&str, FrequencySource); 8] = [
    ("afr", FrequencySource::GnomadGenomeAfr),
    ("amr", FrequencySource::GnomadGenomeAmr),
    ("asj", FrequencySource::GnomadGenomeAsj),
    ("eas", FrequencySource::GnomadGenomeEas),
    ("fin", FrequencySource::GnomadGenomeFin),
    ("nfe", FrequencySource::GnomadGenomeNfe),
    ("oth", FrequencySource::GnomadGenomeOth),
    ("sas", FrequencySource::GnomadGenomeSas),
];

fn exac(line: &VcfLine<'_>, alt_index: usize) -> VariantRecord {
    population_frequencies(line, alt_index, &EXAC_POPULATIONS)
}

fn gnomad_exome(line: &VcfLine<'_>, alt_index: usize) -> VariantRecord {
    population_frequencies(line, alt_index, &GNOMAD_EXOME_POPULATIONS)
}

fn gnomad_genome(line: &VcfLine<'_>, alt_index: usize) -> VariantRecord {
    population_frequencies(line, alt_index, &GNOMAD_GENOME_POPULATIONS)
}

//-----------------------------------------------------------------------------

// ClinVar annotates the site, so every alternate allele gets the same payload.
fn clinvar(line: &VcfLine<'_>, _: usize) -> VariantRecord {
    let mut record = VariantRecord::default();
    if let Some(rs) = utils::info_value(line.info, "RS") {
        if let Some(first) = rs.split('|').next().filter(|x| !x.is_empty()) {
            record.rs_id = Some(format!("rs{}", first));
        }
    }

    let mut data = ClinVarData::default();
    data.allele_id = utils::info_value(line.info, "ALLELEID").and_then(|x| x.parse::<u64>().ok());
    if let Some(value) = utils::info_value(line.info, "CLNSIG") {
        let mut tokens = value.split(|c| c == '|' || c == ',').filter(|x| !x.is_empty());
        if let Some(primary) = tokens.next() {
            data.primary_interpretation = ClinicalSignificance::parse(primary);
        }
        for token in tokens {
            data.secondary_interpretations.insert(ClinicalSignificance::parse(token));
        }
    }
    if let Some(value) = utils::info_value(line.info, "CLNSIGCONF") {
        // Entries look like `Pathogenic(2)`.
        for token in value.split(|c| c == '|' || c == ',').filter(|x| !x.is_empty()) {
            let name = token.split('(').next().unwrap_or(token);
            data.secondary_interpretations.insert(ClinicalSignificance::parse(name));
        }
    }
    data.secondary_interpretations.remove(&data.primary_interpretation);
    if let Some(value) = utils::info_value(line.info, "CLNREVSTAT") {
        data.review_status = ReviewStatus::parse(value);
    }
    if let Some(value) = utils::info_value(line.info, "CLNDN") {
        for condition in value.split('|') {
            let condition = condition.replace('_', " ");
            let condition = condition.trim();
            if !condition.is_empty() && !data.conditions.iter().any(|x| x == condition) {
                data.conditions.push(String::from(condition));
            }
        }
    }

    if !data.is_empty() {
        record.clinvar = Some(data);
    }
    record
}

//-----------------------------------------------------------------------------
