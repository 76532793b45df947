use super::*;

use simple_sds::serialize;

//-----------------------------------------------------------------------------

const CONFIG: &str = r#"
[[resource]]
name = "clinvar"
source = "clinvar"
url = "https://example.org/clinvar.vcf.gz"
file = "clinvar/clinvar.vcf.gz"

[[resource]]
name = "gnomad-exomes"
source = "gnomad_exome"
file = "gnomad.zip"
format = "zip"
pattern = "data.chr*.gz"
min_records = 1000

[[resource]]
name = "dbnsfp"
source = "dbnsfp"
file = "dbNSFP.zip"
assembly = "hg19"
"#;

// Creates a data directory with a file named `file` containing the given text.
fn data_dir_with(file: &str, text: &str) -> PathBuf {
    let dir = serialize::temp_file_name("resource-data");
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join(file), text).unwrap();
    dir
}

fn check_state(resource: &Resource, expected: ResourceState) {
    assert_eq!(resource.status().state(), expected, "Wrong state for resource {}", resource.name());
}

//-----------------------------------------------------------------------------

#[test]
fn stage_transitions() {
    let mut status = ResourceStatus::default();
    assert!(status.start(Stage::Extract).is_err(), "Started extraction before download");
    assert!(status.finish(Stage::Download, true).is_err(), "Finished a stage that was not running");

    status.start(Stage::Download).unwrap();
    assert!(status.start(Stage::Download).is_err(), "Started a running stage");
    status.finish(Stage::Download, true).unwrap();
    assert!(status.start(Stage::Download).is_err(), "Restarted a finished stage");

    status.start(Stage::Extract).unwrap();
    assert_eq!(status.state(), ResourceState::Extracting);
    status.finish(Stage::Extract, true).unwrap();
    assert_eq!(status.state(), ResourceState::Extracted);

    status.start(Stage::Parse).unwrap();
    assert_eq!(status.state(), ResourceState::Parsing);
    status.finish(Stage::Parse, true).unwrap();
    assert_eq!(status.state(), ResourceState::Parsed);
    assert!(status.state().is_terminal());
    assert!(!status.state().is_failed());
    assert_eq!(status.status(Stage::Parse), Status::Succeeded);
}

#[test]
fn failures_are_terminal() {
    let mut status = ResourceStatus::default();
    status.start(Stage::Download).unwrap();
    status.finish(Stage::Download, false).unwrap();
    assert_eq!(status.state(), ResourceState::DownloadFailed);
    assert!(status.state().is_failed());
    assert!(status.start(Stage::Extract).is_err(), "Extracted after a failed download");

    let mut status = ResourceStatus::default();
    status.start(Stage::Download).unwrap();
    status.finish(Stage::Download, true).unwrap();
    status.start(Stage::Extract).unwrap();
    status.finish(Stage::Extract, false).unwrap();
    assert_eq!(status.state(), ResourceState::ExtractFailed);
    assert!(status.start(Stage::Parse).is_err(), "Parsed after a failed extraction");
}

//-----------------------------------------------------------------------------

#[test]
fn valid_config() {
    let config = parse_config(CONFIG);
    assert!(config.is_ok(), "Failed to parse the configuration: {}", config.unwrap_err());
    let config = config.unwrap();
    assert_eq!(config.len(), 3);

    assert_eq!(config[0].source, SourceId::Clinvar);
    assert_eq!(config[0].url.as_deref(), Some("https://example.org/clinvar.vcf.gz"));
    assert_eq!(config[0].archive_format(), ArchiveFormat::Gz);

    assert_eq!(config[1].source, SourceId::GnomadExome);
    assert_eq!(config[1].archive_format(), ArchiveFormat::Zip);
    assert_eq!(config[1].pattern.as_deref(), Some("data.chr*.gz"));
    assert_eq!(config[1].min_records, Some(1000));

    assert_eq!(config[2].assembly, Some(Assembly::Hg19));
    assert!(config[2].url.is_none());
}

#[test]
fn invalid_configs() {
    let unknown_source = "[[resource]]\nname = \"x\"\nsource = \"hgmd\"\nfile = \"x.vcf\"\n";
    let unknown_field = "[[resource]]\nname = \"x\"\nsource = \"esp\"\nfile = \"x.vcf\"\ncolour = \"red\"\n";
    let missing_file = "[[resource]]\nname = \"x\"\nsource = \"esp\"\n";
    let bad_format = "[[resource]]\nname = \"x\"\nsource = \"esp\"\nfile = \"x\"\nformat = \"rar\"\n";
    let bad_pattern = "[[resource]]\nname = \"x\"\nsource = \"esp\"\nfile = \"x.zip\"\npattern = \"[\"\n";
    let duplicate = "[[resource]]\nname = \"x\"\nsource = \"esp\"\nfile = \"a\"\n\
        [[resource]]\nname = \"x\"\nsource = \"uk10k\"\nfile = \"b\"\n";
    let cases = [
        (unknown_source, "unknown source"),
        (unknown_field, "unknown field"),
        (missing_file, "missing file"),
        (bad_format, "unknown format"),
        (bad_pattern, "invalid pattern"),
        (duplicate, "duplicate name"),
        ("this is not toml", "invalid syntax"),
    ];
    for (text, what) in cases.iter() {
        let result = parse_config(text);
        assert!(matches!(result, Err(Error::Configuration(_))), "Expected a configuration error for {}", what);
    }

    assert!(parse_config("").unwrap().is_empty(), "An empty file should have no resources");
    assert!(matches!(load_config(serialize::temp_file_name("missing-config")), Err(Error::Configuration(_))));
}

#[test]
fn assembly_requires_dbnsfp() {
    let mut config = ResourceConfig::new("esp", SourceId::Esp, "esp.vcf");
    config.assembly = Some(Assembly::Hg19);
    assert!(matches!(Resource::new(config, "data"), Err(Error::Configuration(_))));
}

//-----------------------------------------------------------------------------

#[test]
fn cached_resource() {
    let dir = data_dir_with("topmed.vcf", "1\t100\t.\tA\tG\t.\t.\tAF=0.1\n");
    let mut resource = Resource::new(ResourceConfig::new("topmed", SourceId::Topmed, "topmed.vcf"), &dir).unwrap();
    check_state(&resource, ResourceState::NotStarted);

    assert!(resource.download(false).is_ok(), "Cached file was not accepted");
    check_state(&resource, ResourceState::Downloaded);
    let entries = resource.extract();
    assert!(entries.is_ok(), "Failed to extract: {}", entries.unwrap_err());
    assert_eq!(entries.unwrap(), vec![String::from("topmed.vcf")]);
    check_state(&resource, ResourceState::Extracted);

    resource.start_parse().unwrap();
    assert!(resource.finish_parse(1).unwrap());
    check_state(&resource, ResourceState::Parsed);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn copy_from_local_url() {
    let origin = data_dir_with("origin.vcf", "1\t100\t.\tA\tG\t.\t.\tAF=0.1\n");
    let dir = serialize::temp_file_name("resource-cache");
    let mut config = ResourceConfig::new("uk10k", SourceId::Uk10k, "nested/uk10k.vcf");
    config.url = Some(format!("file://{}", origin.join("origin.vcf").display()));
    let mut resource = Resource::new(config, &dir).unwrap();

    let result = resource.download(true);
    assert!(result.is_ok(), "Failed to copy the resource: {}", result.unwrap_err());
    assert!(utils::file_exists(dir.join("nested/uk10k.vcf")), "Cache file was not created");
    assert!(!utils::file_exists(dir.join("nested/uk10k.vcf.part")), "Partial file was left behind");

    let _ = fs::remove_dir_all(&origin);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_resource() {
    let dir = serialize::temp_file_name("resource-missing");
    let mut resource = Resource::new(ResourceConfig::new("esp", SourceId::Esp, "esp.vcf"), &dir).unwrap();
    let result = resource.download(false);
    assert!(matches!(result, Err(Error::TransientResource { .. })), "Expected a transient resource error");
    check_state(&resource, ResourceState::DownloadFailed);
    assert!(resource.extract().is_err(), "Extracted a missing resource");

    let mut config = ResourceConfig::new("esp", SourceId::Esp, "esp.vcf");
    config.url = Some(format!("file://{}", dir.join("nowhere.vcf").display()));
    let mut resource = Resource::new(config, &dir).unwrap();
    assert!(matches!(resource.download(true), Err(Error::TransientResource { .. })));
    check_state(&resource, ResourceState::DownloadFailed);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn extraction_without_wanted_entries() {
    let dir = data_dir_with("archive.zip", "");
    let mut config = ResourceConfig::new("gnomad", SourceId::GnomadGenome, "archive.zip");
    config.pattern = Some(String::from("*.vcf.gz"));
    let mut resource = Resource::new(config, &dir).unwrap();
    resource.download(false).unwrap();
    let result = resource.extract();
    assert!(matches!(result, Err(Error::Extraction { .. })), "Expected an extraction error, got {:?}", result);
    check_state(&resource, ResourceState::ExtractFailed);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn record_count_check() {
    let dir = data_dir_with("topmed.vcf", "##fileformat=VCFv4.2\n");
    let mut config = ResourceConfig::new("topmed", SourceId::Topmed, "topmed.vcf");
    config.min_records = Some(10);
    let mut resource = Resource::new(config, &dir).unwrap();
    resource.download(false).unwrap();
    resource.extract().unwrap();
    resource.start_parse().unwrap();
    assert!(!resource.finish_parse(9).unwrap(), "Accepted too few records");
    check_state(&resource, ResourceState::ParseFailed);

    let mut resource = Resource::new(ResourceConfig::new("topmed", SourceId::Topmed, "topmed.vcf"), &dir).unwrap();
    resource.download(false).unwrap();
    resource.extract().unwrap();
    resource.start_parse().unwrap();
    assert!(!resource.finish_parse(0).unwrap(), "Accepted an empty resource");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn failed_parse() {
    let dir = data_dir_with("topmed.vcf", "1\t100\t.\tA\tG\t.\t.\tAF=0.1\n");
    let mut resource = Resource::new(ResourceConfig::new("topmed", SourceId::Topmed, "topmed.vcf"), &dir).unwrap();
    resource.download(false).unwrap();
    resource.extract().unwrap();
    assert!(resource.fail_parse().is_err(), "Failed a parse stage that was not running");

    resource.start_parse().unwrap();
    check_state(&resource, ResourceState::Parsing);
    assert!(resource.fail_parse().is_ok(), "Could not fail the running parse stage");
    check_state(&resource, ResourceState::ParseFailed);
    assert!(resource.finish_parse(1).is_err(), "Finished a failed parse stage");

    let _ = fs::remove_dir_all(&dir);
}

//-----------------------------------------------------------------------------
