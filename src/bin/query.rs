use std::io::{self, Write};
use std::{env, process};

use allele_base::variant;
use allele_base::{AlleleBase, ClinVarData, MapInterface, VariantKey, VariantRecord};
use getopts::Options;
use tracing::info;
use tracing_subscriber::EnvFilter;

//-----------------------------------------------------------------------------

fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    // Parse arguments.
    let config = Config::new()?;

    // Open the database and the maps.
    let database = AlleleBase::open(&config.filename).map_err(|x| x.to_string())?;
    info!("Database {}: {}", config.filename, database.version());
    for map in database.maps() {
        info!("Map {}: {} entries ({} v{})", map.name, map.entries, map.codec, map.codec_version);
    }
    let alleles = database.allele_map().map_err(|x| x.to_string())?;
    let clinvar = database.clinvar_map().map_err(|x| x.to_string())?;
    let mut allele_interface = MapInterface::new(&database, &alleles).map_err(|x| x.to_string())?;
    let mut clinvar_interface = MapInterface::new(&database, &clinvar).map_err(|x| x.to_string())?;

    // Collect the entries.
    let mut entries: Vec<(VariantKey, Option<VariantRecord>, Option<ClinVarData>)> = Vec::new();
    for key in config.keys.iter() {
        let record = allele_interface.get(key).map_err(|x| x.to_string())?;
        let data = clinvar_interface.get(key).map_err(|x| x.to_string())?;
        entries.push((key.clone(), record, data));
    }
    if let Some((chromosome, start, end)) = config.range {
        let records = allele_interface.range(chromosome, start, end).map_err(|x| x.to_string())?;
        for (key, record) in records {
            let data = clinvar_interface.get(&key).map_err(|x| x.to_string())?;
            entries.push((key, Some(record), data));
        }
    }

    // TSV output.
    let mut output = io::stdout().lock();
    writeln!(output, "#variant\trs_id\tfrequencies\tscores\tclinvar").map_err(|x| x.to_string())?;
    for (key, record, data) in entries.iter() {
        write_entry(&mut output, key, record.as_ref(), data.as_ref()).map_err(|x| x.to_string())?;
    }

    Ok(())
}

//-----------------------------------------------------------------------------

pub struct Config {
    pub filename: String,
    pub keys: Vec<VariantKey>,
    pub range: Option<(u8, u32, u32)>,
}

impl Config {
    pub fn new() -> Result<Config, String> {
        let args: Vec<String> = env::args().collect();
        let program = args[0].clone();

        let mut opts = Options::new();
        opts.optflag("h", "help", "print this help");
        opts.optopt("r", "range", "also list the variants in a half-open interval", "CHR:START:END");
        opts.optflag("n", "normalize", "trim shared leading and trailing bases from the alleles");
        let matches = opts.parse(&args[1..]).map_err(|x| x.to_string())?;

        let header = format!("Usage: {} [options] alleles.db [chr-pos-ref-alt ...]", program);
        if matches.opt_present("h") {
            eprint!("{}", opts.usage(&header));
            process::exit(0);
        }

        let filename = if let Some(s) = matches.free.first() {
            s.clone()
        } else {
            eprint!("{}", opts.usage(&header));
            process::exit(1);
        };

        let normalize = matches.opt_present("n");
        let mut keys = Vec::new();
        for s in matches.free.iter().skip(1) {
            let key: VariantKey = s.parse()?;
            let key = if normalize {
                VariantKey::normalized(key.chromosome(), key.position(), key.ref_allele(), key.alt_allele())?
            } else {
                key
            };
            keys.push(key);
        }

        let range = match matches.opt_str("r") {
            Some(s) => Some(parse_range(&s)?),
            None => None,
        };
        if keys.is_empty() && range.is_none() {
            return Err(String::from("No variants or ranges to query"));
        }

        Ok(Config { filename, keys, range })
    }
}

fn parse_range(s: &str) -> Result<(u8, u32, u32), String> {
    let fields: Vec<&str> = s.split(':').collect();
    if fields.len() != 3 {
        return Err(format!("--range: expected CHR:START:END, got {}", s));
    }
    let chromosome = variant::parse_chromosome(fields[0]).ok_or(format!("--range: invalid chromosome {}", fields[0]))?;
    let start = fields[1].parse::<u32>().map_err(|x| format!("--range: {}", x))?;
    let end = fields[2].parse::<u32>().map_err(|x| format!("--range: {}", x))?;
    Ok((chromosome, start, end))
}

//-----------------------------------------------------------------------------

fn write_entry<W: Write>(output: &mut W, key: &VariantKey, record: Option<&VariantRecord>, data: Option<&ClinVarData>) -> io::Result<()> {
    let (rs_id, frequencies, scores) = match record {
        Some(record) => {
            let frequencies: Vec<String> = record.frequencies.iter()
                .map(|(source, value)| format!("{}={}", source, value))
                .collect();
            let scores: Vec<String> = record.pathogenicity.iter()
                .map(|(source, value)| format!("{}={}", source, value))
                .collect();
            (record.rs_id.clone().unwrap_or(String::from(".")), join_or_dot(&frequencies), join_or_dot(&scores))
        },
        None => (String::from("."), String::from("."), String::from(".")),
    };
    let clinvar = match data {
        Some(data) => format!(
            "{:?} ({} stars){}",
            data.primary_interpretation,
            data.review_status.stars(),
            if data.conditions.is_empty() { String::new() } else { format!(": {}", data.conditions.join("; ")) }
        ),
        None => String::from("."),
    };
    writeln!(output, "{}\t{}\t{}\t{}\t{}", key, rs_id, frequencies, scores, clinvar)
}

fn join_or_dot(values: &[String]) -> String {
    if values.is_empty() { String::from(".") } else { values.join(",") }
}

//-----------------------------------------------------------------------------
