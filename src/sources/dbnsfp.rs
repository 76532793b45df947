//! Parser for dbNSFP tab-separated files.
//!
//! The column layout changes between dbNSFP releases, so the parser locates the columns from the header line starting with `#chr`.
//! Multiple transcript-level scores in a cell are separated by `;`.

use super::{is_unusable_allele, parse_number, scores, Assembly, ParsedLine};

use crate::variant::{self, PathogenicitySource, VariantKey, VariantRecord};

//-----------------------------------------------------------------------------

/// Column positions in a dbNSFP file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DbnsfpColumns {
    chromosome: usize,
    position: usize,
    ref_allele: usize,
    alt_allele: usize,
    rs_id: Option<usize>,
    sift: Option<usize>,
    polyphen: Option<usize>,
    mutation_taster: Option<usize>,
    cadd: Option<usize>,
    revel: Option<usize>,
    mvp: Option<usize>,
}

impl DbnsfpColumns {
    /// Locates the columns from the header line.
    ///
    /// Returns an error if the coordinate or allele columns for the assembly are missing.
    pub fn from_header(header: &str, assembly: Assembly) -> Result<Self, String> {
        let names: Vec<&str> = header.trim_start_matches('#').split('\t').collect();
        let find = |name: &str| names.iter().position(|x| *x == name);
        let find_prefix = |prefix: &str| names.iter().position(|x| x.starts_with(prefix));

        let (chromosome, position) = match assembly {
            Assembly::Hg38 => (find("chr"), find("pos(1-based)")),
            Assembly::Hg19 => (find("hg19_chr"), find("hg19_pos(1-based)")),
        };
        let chromosome = chromosome.ok_or(format!("Missing chromosome column for {:?}", assembly))?;
        let position = position.ok_or(format!("Missing position column for {:?}", assembly))?;
        let ref_allele = find("ref").ok_or(String::from("Missing column ref"))?;
        let alt_allele = find("alt").ok_or(String::from("Missing column alt"))?;

        Ok(DbnsfpColumns {
            chromosome,
            position,
            ref_allele,
            alt_allele,
            rs_id: find_prefix("rs_dbSNP"),
            sift: find("SIFT_score"),
            polyphen: find("Polyphen2_HVAR_score"),
            mutation_taster: find("MutationTaster_score"),
            cadd: find("CADD_phred"),
            revel: find("REVEL_score"),
            mvp: find("MVP_score"),
        })
    }
}

//-----------------------------------------------------------------------------

/// Parses a data line using the given column layout.
pub(super) fn parse_line(columns: &DbnsfpColumns, line: &str) -> ParsedLine {
    let fields: Vec<&str> = line.split('\t').collect();
    let required = [columns.chromosome, columns.position, columns.ref_allele, columns.alt_allele];
    if let Some(missing) = required.iter().find(|column| **column >= fields.len()) {
        return ParsedLine::Skipped(format!("Missing required column {}", missing + 1));
    }

    let chromosome_name = fields[columns.chromosome];
    let position = fields[columns.position];
    if chromosome_name == "." || position == "." {
        // Not present on the selected assembly.
        return ParsedLine::Parsed(Vec::new());
    }
    let chromosome = match variant::parse_chromosome(chromosome_name) {
        Some(chromosome) => chromosome,
        None => return ParsedLine::unsupported_contig(chromosome_name),
    };
    let position = match position.parse::<u32>() {
        Ok(position) if position > 0 => position,
        _ => return ParsedLine::Skipped(format!("Invalid position: {}", position)),
    };
    let alt_allele = fields[columns.alt_allele];
    if is_unusable_allele(alt_allele) {
        return ParsedLine::Skipped(format!("Unusable alternate allele: {}", alt_allele));
    }
    let key = match VariantKey::normalized(chromosome, position, fields[columns.ref_allele], alt_allele) {
        Ok(key) => key,
        Err(message) => return ParsedLine::Skipped(message),
    };

    // Missing trailing columns are absent values.
    let cell = |column: Option<usize>| column.and_then(|i| fields.get(i).copied());
    let mut record = VariantRecord::default();
    record.rs_id = cell(columns.rs_id).filter(|x| x.starts_with("rs")).map(String::from);
    let mut insert = |source: PathogenicitySource, value: Option<f32>| {
        if let Some(value) = value {
            record.pathogenicity.insert(source, value);
        }
    };
    // Lower SIFT scores are more damaging, so the score is inverted.
    insert(PathogenicitySource::Sift, cell(columns.sift).and_then(min_score).map(|x| 1.0 - x));
    insert(PathogenicitySource::Polyphen, cell(columns.polyphen).and_then(max_score));
    insert(PathogenicitySource::MutationTaster, cell(columns.mutation_taster).and_then(max_score));
    insert(PathogenicitySource::Cadd, cell(columns.cadd).and_then(first_score));
    insert(PathogenicitySource::Revel, cell(columns.revel).and_then(first_score));
    insert(PathogenicitySource::Mvp, cell(columns.mvp).and_then(first_score));

    if record.is_empty() {
        ParsedLine::Parsed(Vec::new())
    } else {
        ParsedLine::Parsed(vec![(key, record)])
    }
}

fn min_score(value: &str) -> Option<f32> {
    scores(value).into_iter().reduce(f32::min)
}

fn max_score(value: &str) -> Option<f32> {
    scores(value).into_iter().reduce(f32::max)
}

fn first_score(value: &str) -> Option<f32> {
    value.split(';').find_map(parse_number).map(|x| x as f32)
}

//-----------------------------------------------------------------------------
