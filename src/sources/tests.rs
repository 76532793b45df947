use super::*;

use crate::variant::{ClinicalSignificance, FrequencySource, PathogenicitySource, ReviewStatus};

//-----------------------------------------------------------------------------

fn key(chromosome: u8, position: u32, ref_allele: &str, alt_allele: &str) -> VariantKey {
    VariantKey::new(chromosome, position, ref_allele, alt_allele).unwrap()
}

fn vcf_line(chromosome: &str, position: u32, ref_allele: &str, alt_allele: &str, info: &str) -> String {
    format!("{}\t{}\t.\t{}\t{}\t.\tPASS\t{}", chromosome, position, ref_allele, alt_allele, info)
}

// Parses a line that is expected to produce variants.
fn parse_pairs(parser: &mut SourceParser, line: &str) -> Vec<(VariantKey, VariantRecord)> {
    match parser.parse_line(line) {
        ParsedLine::Parsed(pairs) => pairs,
        other => panic!("Expected parsed variants from {}, got {:?}", line, other),
    }
}

fn parse_single(parser: &mut SourceParser, line: &str) -> (VariantKey, VariantRecord) {
    let mut pairs = parse_pairs(parser, line);
    assert_eq!(pairs.len(), 1, "Expected a single variant from {}", line);
    pairs.pop().unwrap()
}

fn assert_frequency(record: &VariantRecord, source: FrequencySource, expected: f32) {
    let value = record.frequencies.get(&source);
    assert!(value.is_some(), "Missing frequency for {}", source);
    let value = *value.unwrap();
    assert!((value - expected).abs() < 1e-4, "Wrong frequency for {}: {} (expected {})", source, value, expected);
}

//-----------------------------------------------------------------------------

#[test]
fn source_names() {
    for source in SourceId::ALL {
        assert_eq!(source.name().parse::<SourceId>(), Ok(source), "Wrong source after parsing {}", source);
    }
    assert_eq!("gnomad-exome".parse::<SourceId>(), Ok(SourceId::GnomadExome));
    assert_eq!("ClinVar".parse::<SourceId>(), Ok(SourceId::Clinvar));
    assert!("hgmd".parse::<SourceId>().is_err());
    assert!(SourceId::Clinvar.is_clinical());
    assert!(!SourceId::Dbsnp.is_clinical());

    assert_eq!("GRCh37".parse::<Assembly>(), Ok(Assembly::Hg19));
    assert_eq!("hg38".parse::<Assembly>(), Ok(Assembly::Hg38));
    assert!("hg18".parse::<Assembly>().is_err());
}

#[test]
fn headers_and_comments() {
    for source in SourceId::ALL {
        let mut parser = SourceParser::new(source);
        assert_eq!(parser.parse_line("##fileformat=VCFv4.1"), ParsedLine::Header, "Wrong result for {}", source);
        assert_eq!(parser.parse_line("#CHROM\tPOS\tID\tREF\tALT"), ParsedLine::Header, "Wrong result for {}", source);
        assert_eq!(parser.parse_line(""), ParsedLine::Header, "Wrong result for {}", source);
    }
}

#[test]
fn one_malformed_line_in_ten() {
    let mut parser = SourceParser::new(SourceId::Topmed);
    let mut lines: Vec<String> = (1..=9).map(|i| vcf_line("1", 100 * i, "A", "G", "AF=0.01")).collect();
    lines.insert(4, String::from("1\tnot-a-position\t.\tA\tG\t.\tPASS\tAF=0.01"));
    assert_eq!(lines.len(), 10);

    let mut records = 0;
    let mut skips = SkipLog::new("topmed");
    for (i, line) in lines.iter().enumerate() {
        match parser.parse_line(line) {
            ParsedLine::Parsed(pairs) => records += pairs.len(),
            ParsedLine::Header => {},
            ParsedLine::Skipped(reason) => skips.skip("test.vcf", i + 1, &reason),
            ParsedLine::OtherContig(_) => {},
        }
    }
    assert_eq!(records, 9, "Wrong number of parsed records");
    assert_eq!(skips.skipped(), 1, "Wrong number of skipped lines");
}

#[test]
fn malformed_lines() {
    let mut parser = SourceParser::new(SourceId::Uk10k);
    let malformed = [
        "1\t100\t.\tA",
        "\t100\t.\tA\tG\t.\tPASS\tAF=0.1",
        "1\t0\t.\tA\tG\t.\tPASS\tAF=0.1",
        "1\t-5\t.\tA\tG\t.\tPASS\tAF=0.1",
        "1\t100\t.\tA\t<DEL>\t.\tPASS\tAF=0.1",
        "1\t100\t.\tAQ\tG\t.\tPASS\tAF=0.1",
    ];
    for line in malformed.iter() {
        assert!(parser.parse_line(line).is_skipped(), "Did not skip {}", line);
    }
}

#[test]
fn other_contigs_are_not_malformed() {
    let contigs = ["chrUn_gl000220", "chr1_KI270706v1_random", "chr6_GL000251v2_alt", "GL000192.1", "HLA-A*01:01:01:01"];
    for source in [SourceId::Dbsnp, SourceId::GnomadGenome] {
        let mut parser = SourceParser::new(source);
        for contig in contigs.iter() {
            let line = vcf_line(contig, 100, "A", "G", "AF=0.1");
            assert_eq!(
                parser.parse_line(&line), ParsedLine::OtherContig(String::from(*contig)),
                "Wrong result for {} with {}", contig, source
            );
        }
    }
}

#[test]
fn missing_trailing_columns() {
    // No QUAL, FILTER, or INFO: the variant exists but has no annotations.
    let mut parser = SourceParser::new(SourceId::Dbsnp);
    let (variant, record) = parse_single(&mut parser, "1\t100\trs42\tA\tG");
    assert_eq!(variant, key(1, 100, "A", "G"));
    assert_eq!(record.rs_id.as_deref(), Some("rs42"));
    assert!(record.frequencies.is_empty());

    // Without an rsID there is nothing to report.
    let mut parser = SourceParser::new(SourceId::Topmed);
    assert_eq!(parser.parse_line("1\t100\t.\tA\tG"), ParsedLine::Parsed(Vec::new()));
}

//-----------------------------------------------------------------------------

#[test]
fn dbsnp_frequencies() {
    let mut parser = SourceParser::new(SourceId::Dbsnp);
    let line = "chr7\t117559590\trs113993960\tATCT\tA,AT\t.\t.\tRS=113993960;CAF=0.99,0.008,.;TOPMED=0.98,0.015,0.005";
    let pairs = parse_pairs(&mut parser, line);
    assert_eq!(pairs.len(), 2);

    let (first, record) = &pairs[0];
    assert_eq!(*first, key(7, 117559590, "ATCT", "A"));
    assert_eq!(record.rs_id.as_deref(), Some("rs113993960"));
    assert_frequency(record, FrequencySource::ThousandGenomes, 0.8);
    assert_frequency(record, FrequencySource::Topmed, 1.5);

    // Trimming the shared suffix leaves ATC -> A.
    let (second, record) = &pairs[1];
    assert_eq!(*second, key(7, 117559590, "ATC", "A"));
    assert!(!record.frequencies.contains_key(&FrequencySource::ThousandGenomes), "Missing value was reported");
    assert_frequency(record, FrequencySource::Topmed, 0.5);
}

#[test]
fn multiallelic_with_symbolic_allele() {
    let mut parser = SourceParser::new(SourceId::Topmed);
    let pairs = parse_pairs(&mut parser, &vcf_line("X", 5000, "C", "T,<DEL>,*,G", "AF=0.1,0.2,0.3,0.4"));
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].0, key(23, 5000, "C", "T"));
    assert_frequency(&pairs[0].1, FrequencySource::Topmed, 10.0);
    assert_eq!(pairs[1].0, key(23, 5000, "C", "G"));
    assert_frequency(&pairs[1].1, FrequencySource::Topmed, 40.0);
}

#[test]
fn padded_alleles_are_normalized() {
    let mut parser = SourceParser::new(SourceId::Uk10k);
    let (first, _) = parse_single(&mut parser, &vcf_line("2", 1000, "A", "T", "AF=0.5"));
    let (second, _) = parse_single(&mut parser, &vcf_line("2", 999, "GAC", "GTC", "AF=0.5"));
    assert_eq!(first, second);
    let (lower, _) = parse_single(&mut parser, &vcf_line("2", 1000, "a", "t", "AF=0.5"));
    assert_eq!(first, lower);
}

#[test]
fn proportions_and_percentages_converge() {
    let mut topmed = SourceParser::new(SourceId::Topmed);
    let (_, proportion) = parse_single(&mut topmed, &vcf_line("1", 100, "A", "G", "AF=0.15"));
    let mut esp = SourceParser::new(SourceId::Esp);
    let (_, percentage) = parse_single(&mut esp, &vcf_line("1", 100, "A", "G", "MAF=15.0,15.0,15.0"));

    assert_eq!(proportion.frequencies[&FrequencySource::Topmed], 15.0);
    assert_eq!(percentage.frequencies[&FrequencySource::EspEa], 15.0);
    assert_eq!(percentage.frequencies[&FrequencySource::EspAll], 15.0);
}

#[test]
fn out_of_range_values_are_absent() {
    let mut parser = SourceParser::new(SourceId::Topmed);
    assert_eq!(parser.parse_line(&vcf_line("1", 100, "A", "G", "AF=1.5")), ParsedLine::Parsed(Vec::new()));
    let mut parser = SourceParser::new(SourceId::Esp);
    let (_, record) = parse_single(&mut parser, &vcf_line("1", 100, "A", "G", "MAF=101.0,nan,3.5"));
    assert_eq!(record.frequencies.len(), 1);
    assert_frequency(&record, FrequencySource::EspAll, 3.5);
}

#[test]
fn population_counts() {
    let mut parser = SourceParser::new(SourceId::GnomadGenome);
    let info = "AC_afr=5,1;AN_afr=100;AC_nfe=0,2;AN_nfe=200;AC_eas=3,3;AN_eas=0;AC_sas=1,1";
    let pairs = parse_pairs(&mut parser, &vcf_line("22", 300, "G", "A,C", info));
    assert_eq!(pairs.len(), 2);
    let first = &pairs[0].1;
    assert_frequency(first, FrequencySource::GnomadGenomeAfr, 5.0);
    assert_frequency(first, FrequencySource::GnomadGenomeNfe, 0.0);
    assert!(!first.frequencies.contains_key(&FrequencySource::GnomadGenomeEas), "Reported a frequency with AN = 0");
    assert!(!first.frequencies.contains_key(&FrequencySource::GnomadGenomeSas), "Reported a frequency without AN");
    let second = &pairs[1].1;
    assert_frequency(second, FrequencySource::GnomadGenomeAfr, 1.0);
    assert_frequency(second, FrequencySource::GnomadGenomeNfe, 1.0);

    let mut parser = SourceParser::new(SourceId::Exac);
    let (_, record) = parse_single(&mut parser, &vcf_line("1", 100, "A", "G", "AC_FIN=1;AN_FIN=4;AC_Adj=3"));
    assert_eq!(record.frequencies.len(), 1);
    assert_frequency(&record, FrequencySource::ExacFin, 25.0);
}

//-----------------------------------------------------------------------------

#[test]
fn clinvar_payload() {
    let mut parser = SourceParser::new(SourceId::Clinvar);
    let info = "ALLELEID=15041;CLNDN=Cystic_fibrosis|not_provided|Cystic_fibrosis;\
        CLNREVSTAT=criteria_provided,_multiple_submitters,_no_conflicts;CLNSIG=Pathogenic|_risk_factor;RS=113993960";
    let (variant, record) = parse_single(&mut parser, &format!("7\t117559590\t7105\tATCT\tA\t.\t.\t{}", info));
    assert_eq!(variant, key(7, 117559590, "ATCT", "A"));
    assert_eq!(record.rs_id.as_deref(), Some("rs113993960"));

    let data = record.clinvar.as_ref().unwrap();
    assert_eq!(data.allele_id, Some(15041));
    assert_eq!(data.primary_interpretation, ClinicalSignificance::Pathogenic);
    assert!(data.secondary_interpretations.contains(&ClinicalSignificance::RiskFactor));
    assert_eq!(data.review_status, ReviewStatus::CriteriaProvidedMultipleSubmittersNoConflicts);
    assert_eq!(data.conditions, vec![String::from("Cystic fibrosis"), String::from("not provided")]);
}

#[test]
fn clinvar_conflicts() {
    let mut parser = SourceParser::new(SourceId::Clinvar);
    let info = "ALLELEID=1;CLNSIG=Conflicting_interpretations_of_pathogenicity;\
        CLNSIGCONF=Pathogenic(1)|Uncertain_significance(2);CLNREVSTAT=criteria_provided,_conflicting_interpretations";
    let (_, record) = parse_single(&mut parser, &vcf_line("13", 32_900_000, "C", "T", info));
    let data = record.clinvar.unwrap();
    assert_eq!(data.primary_interpretation, ClinicalSignificance::ConflictingPathogenicityInterpretations);
    assert_eq!(data.secondary_interpretations.len(), 2);
    assert!(data.secondary_interpretations.contains(&ClinicalSignificance::Pathogenic));
    assert!(data.secondary_interpretations.contains(&ClinicalSignificance::UncertainSignificance));
    assert_eq!(data.review_status.stars(), 1);
}

#[test]
fn only_clinvar_produces_clinical_payloads() {
    let line = vcf_line("1", 100, "A", "G", "CLNSIG=Pathogenic;AF=0.1;CAF=0.9,0.1;MAF=1,1,1;ALLELEID=5");
    for source in SourceId::ALL {
        if source == SourceId::Clinvar || source == SourceId::Dbnsfp {
            continue;
        }
        let mut parser = SourceParser::new(source);
        if let ParsedLine::Parsed(pairs) = parser.parse_line(&line) {
            for (_, record) in pairs {
                assert!(record.clinvar.is_none(), "Source {} produced a clinical payload", source);
            }
        }
    }
}

//-----------------------------------------------------------------------------

const DBNSFP_HEADER: &str = "#chr\tpos(1-based)\tref\talt\taaref\trs_dbSNP\thg19_chr\thg19_pos(1-based)\t\
    SIFT_score\tPolyphen2_HVAR_score\tMutationTaster_score\tCADD_phred\tREVEL_score\tMVP_score";

#[test]
fn dbnsfp_scores() {
    let mut parser = SourceParser::new(SourceId::Dbnsfp);
    assert_eq!(parser.parse_line(DBNSFP_HEADER), ParsedLine::Header);

    let line = "1\t69091\tA\tC\tM\trs1\t1\t69091\t0.2;0.05;.\t0.5;0.9\t0.3;0.7\t23.1\t.\t0.66";
    let (variant, record) = parse_single(&mut parser, line);
    assert_eq!(variant, key(1, 69091, "A", "C"));
    assert_eq!(record.rs_id.as_deref(), Some("rs1"));
    let score = |source| record.pathogenicity.get(&source).copied();
    assert!((score(PathogenicitySource::Sift).unwrap() - 0.95).abs() < 1e-6);
    assert_eq!(score(PathogenicitySource::Polyphen), Some(0.9));
    assert_eq!(score(PathogenicitySource::MutationTaster), Some(0.7));
    assert_eq!(score(PathogenicitySource::Cadd), Some(23.1));
    assert_eq!(score(PathogenicitySource::Revel), None);
    assert_eq!(score(PathogenicitySource::Mvp), Some(0.66));
}

#[test]
fn dbnsfp_assemblies() {
    let line = "1\t69091\tA\tC\tM\t.\t1\t59000\t0.1\t.\t.\t.\t.\t.";
    let mut hg38 = SourceParser::new(SourceId::Dbnsfp);
    hg38.parse_line(DBNSFP_HEADER);
    assert_eq!(parse_single(&mut hg38, line).0, key(1, 69091, "A", "C"));

    let mut hg19 = SourceParser::with_assembly(SourceId::Dbnsfp, Assembly::Hg19);
    hg19.parse_line(DBNSFP_HEADER);
    assert_eq!(parse_single(&mut hg19, line).0, key(1, 59000, "A", "C"));

    // Not present on hg19.
    let unmapped = "1\t69091\tA\tC\tM\t.\t.\t.\t0.1\t.\t.\t.\t.\t.";
    assert_eq!(hg19.parse_line(unmapped), ParsedLine::Parsed(Vec::new()));
}

#[test]
fn dbnsfp_missing_columns() {
    let mut parser = SourceParser::new(SourceId::Dbnsfp);
    assert!(parser.parse_line("1\t100\tA\tC").is_skipped(), "Parsed data without a header");

    parser.parse_line(DBNSFP_HEADER);
    // Truncated after the SIFT column.
    let (_, record) = parse_single(&mut parser, "1\t100\tA\tC\tM\t.\t1\t100\t0.0");
    assert_eq!(record.pathogenicity.len(), 1);
    assert_eq!(record.pathogenicity[&PathogenicitySource::Sift], 1.0);
    // Truncated before the alleles.
    assert!(parser.parse_line("1\t100\tA").is_skipped());

    let mut parser = SourceParser::new(SourceId::Dbnsfp);
    parser.parse_line("#chr\tpos(1-based)\tSIFT_score");
    assert!(parser.parse_line("1\t100\t0.5").is_skipped(), "Parsed data with an invalid header");
}

//-----------------------------------------------------------------------------
