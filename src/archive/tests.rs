use super::*;

use std::fs;
use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use simple_sds::serialize;

//-----------------------------------------------------------------------------

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn numbered_lines(prefix: &str, count: usize) -> String {
    let mut result = String::new();
    for i in 0..count {
        result.push_str(&format!("{}\t{}\n", prefix, i));
    }
    result
}

// Entries are written in the given order.
fn create_zip(entries: &[(&str, Vec<u8>)]) -> PathBuf {
    let filename = serialize::temp_file_name("archive-zip");
    let file = File::create(&filename).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in entries.iter() {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
    }
    zip.finish().unwrap();
    filename
}

// Entries are written in the given order.
fn create_tgz(entries: &[(&str, Vec<u8>)]) -> PathBuf {
    let filename = serialize::temp_file_name("archive-tgz");
    let file = File::create(&filename).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, data) in entries.iter() {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, *name, data.as_slice()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
    filename
}

fn create_file(data: &[u8]) -> PathBuf {
    let filename = serialize::temp_file_name("archive-plain");
    fs::write(&filename, data).unwrap();
    filename
}

fn create_bgzf(data: &[u8]) -> PathBuf {
    let filename = serialize::temp_file_name("archive-bgz");
    let file = File::create(&filename).unwrap();
    {
        let mut writer = noodles_bgzf::io::Writer::new(file);
        writer.write_all(data).unwrap();
    }
    filename
}

fn read_all(archive: &Archive) -> Vec<String> {
    archive.lines().collect()
}

fn chromosome_entries() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("README.txt", b"This is not data\n".to_vec()),
        ("data.chr2.gz", gzip(b"chr2\t1\nchr2\t2\n")),
        ("data.chr1.gz", gzip(b"chr1\t1\nchr1\t2\n")),
    ]
}

//-----------------------------------------------------------------------------

#[test]
fn format_detection() {
    assert_eq!(ArchiveFormat::detect("clinvar.vcf.gz"), ArchiveFormat::Gz);
    assert_eq!(ArchiveFormat::detect("dbNSFP4.4a.zip"), ArchiveFormat::Zip);
    assert_eq!(ArchiveFormat::detect("ESP6500SI.snps_indels.vcf.tar.gz"), ArchiveFormat::Tgz);
    assert_eq!(ArchiveFormat::detect("release.TGZ"), ArchiveFormat::Tgz);
    assert_eq!(ArchiveFormat::detect("gnomad.exomes.vcf.bgz"), ArchiveFormat::Bgz);
    assert_eq!(ArchiveFormat::detect("variants.tsv"), ArchiveFormat::None);

    for format in [ArchiveFormat::None, ArchiveFormat::Gz, ArchiveFormat::Zip, ArchiveFormat::Tgz, ArchiveFormat::Bgz] {
        assert_eq!(format.to_string().parse::<ArchiveFormat>(), Ok(format), "Wrong format after parsing {}", format);
    }
    assert!("rar".parse::<ArchiveFormat>().is_err());

    assert!(ArchiveFormat::Zip.is_multi_entry());
    assert!(ArchiveFormat::Tgz.is_multi_entry());
    assert!(!ArchiveFormat::Gz.is_multi_entry());
    assert!(!ArchiveFormat::Bgz.is_multi_entry());
}

#[test]
fn entry_selection() {
    let archive = Archive::new("test.zip", ArchiveFormat::Zip, Some("data.chr*.gz")).unwrap();
    assert_eq!(archive.pattern(), Some("data.chr*.gz"));
    assert!(archive.is_wanted("data.chr1.gz"));
    assert!(archive.is_wanted("nested/dir/data.chrX.gz"));
    assert!(!archive.is_wanted("README.txt"));
    assert!(!archive.is_wanted("data.chr1.gz.tbi"));
    assert!(!archive.is_wanted("data.chr1/"));

    let archive = Archive::new("test.zip", ArchiveFormat::Zip, Some("release/*.vcf")).unwrap();
    assert!(archive.is_wanted("release/a.vcf"));
    assert!(!archive.is_wanted("a.vcf"));

    let archive = Archive::new("test.zip", ArchiveFormat::Zip, None).unwrap();
    assert!(archive.is_wanted("anything"));
    assert!(!archive.is_wanted("directory/"));

    assert!(Archive::new("test.zip", ArchiveFormat::Zip, Some("[")).is_err(), "Accepted an invalid pattern");
}

//-----------------------------------------------------------------------------

#[test]
fn zip_selection_in_name_order() {
    let filename = create_zip(&chromosome_entries());
    let archive = Archive::new(&filename, ArchiveFormat::Zip, Some("data.chr*.gz")).unwrap();

    let entries = archive.entries();
    assert!(entries.is_ok(), "Failed to list entries: {}", entries.unwrap_err());
    assert_eq!(entries.unwrap(), vec![String::from("data.chr1.gz"), String::from("data.chr2.gz")]);

    let lines = read_all(&archive);
    assert_eq!(lines, vec!["chr1\t1", "chr1\t2", "chr2\t1", "chr2\t2"]);

    let _ = fs::remove_file(&filename);
}

#[test]
fn zip_without_pattern() {
    let entries = vec![
        ("b.txt", b"b\n".to_vec()),
        ("dir/", Vec::new()),
        ("a.txt", b"a\n".to_vec()),
    ];
    let filename = create_zip(&entries);
    let archive = Archive::new(&filename, ArchiveFormat::Zip, None).unwrap();
    assert_eq!(archive.entries().unwrap(), vec![String::from("a.txt"), String::from("b.txt")]);
    assert_eq!(read_all(&archive), vec!["a", "b"]);
    let _ = fs::remove_file(&filename);
}

#[test]
fn zip_without_wanted_entries() {
    let filename = create_zip(&chromosome_entries());
    let archive = Archive::new(&filename, ArchiveFormat::Zip, Some("*.vcf")).unwrap();
    assert!(archive.entries().unwrap().is_empty());
    assert!(read_all(&archive).is_empty());
    let _ = fs::remove_file(&filename);
}

// Reads the lines with their entry names and line numbers within the entry.
fn read_with_positions(mut lines: ArchiveLines) -> Vec<(String, usize, String)> {
    let mut result = Vec::new();
    while let Some(line) = lines.next() {
        let entry = lines.current_entry().unwrap_or("").to_string();
        result.push((entry, lines.entry_line(), line));
    }
    result
}

#[test]
fn entry_positions() {
    let long_entry = numbered_lines("chr3", Archive::CHUNK_SIZE + 5);
    let entries = vec![
        ("b.chr2.vcf", b"chr2\t1\nchr2\t2\nchr2\t3\n".to_vec()),
        ("a.chr1.vcf", b"chr1\t1\nchr1\t2\n".to_vec()),
        ("c.chr3.vcf.gz", gzip(long_entry.as_bytes())),
    ];
    let filename = create_zip(&entries);
    let archive = Archive::new(&filename, ArchiveFormat::Zip, Some("*.chr*")).unwrap();

    let lines = archive.lines();
    assert!(lines.current_entry().is_none(), "Entry before the first line");
    assert_eq!(lines.entry_line(), 0);
    let positions = read_with_positions(lines);
    assert_eq!(positions.len(), 5 + Archive::CHUNK_SIZE + 5, "Wrong number of lines");
    assert_eq!(positions[0], (String::from("a.chr1.vcf"), 1, String::from("chr1\t1")));
    assert_eq!(positions[1], (String::from("a.chr1.vcf"), 2, String::from("chr1\t2")));
    assert_eq!(positions[3], (String::from("b.chr2.vcf"), 2, String::from("chr2\t2")));
    assert_eq!(positions[4], (String::from("b.chr2.vcf"), 3, String::from("chr2\t3")));
    for (i, (entry, line_num, line)) in positions[5..].iter().enumerate() {
        assert_eq!(entry, "c.chr3.vcf.gz", "Wrong entry for line {}", i);
        assert_eq!(*line_num, i + 1, "Wrong line number in the long entry");
        assert_eq!(*line, format!("chr3\t{}", i), "Wrong line {}", i);
    }

    let _ = fs::remove_file(&filename);
}

#[test]
fn single_stream_positions() {
    let filename = create_file(&gzip(b"first\nsecond\n"));
    let archive = Archive::new(&filename, ArchiveFormat::Gz, None).unwrap();
    let name = archive.entries().unwrap()[0].clone();
    let positions = read_with_positions(archive.lines());
    assert_eq!(positions, vec![(name.clone(), 1, String::from("first")), (name, 2, String::from("second"))]);
    let _ = fs::remove_file(&filename);
}

#[test]
fn tgz_selection_in_name_order() {
    // The archive order does not match the sorted order, so this needs two passes.
    let filename = create_tgz(&chromosome_entries());
    let archive = Archive::new(&filename, ArchiveFormat::Tgz, Some("data.chr*.gz")).unwrap();
    assert_eq!(archive.entries().unwrap(), vec![String::from("data.chr1.gz"), String::from("data.chr2.gz")]);
    assert_eq!(read_all(&archive), vec!["chr1\t1", "chr1\t2", "chr2\t1", "chr2\t2"]);
    let _ = fs::remove_file(&filename);
}

#[test]
fn tgz_with_plain_entries() {
    let entries = vec![
        ("esp/ESP.chr1.txt", b"# header\n1\t100\n".to_vec()),
        ("esp/ESP.chr2.txt", b"2\t200\n".to_vec()),
    ];
    let filename = create_tgz(&entries);
    let archive = Archive::new(&filename, ArchiveFormat::Tgz, Some("ESP.chr*.txt")).unwrap();
    assert_eq!(read_all(&archive), vec!["# header", "1\t100", "2\t200"]);
    let _ = fs::remove_file(&filename);
}

#[test]
fn read_listed_entries() {
    for format in [ArchiveFormat::Zip, ArchiveFormat::Tgz] {
        let filename = if format == ArchiveFormat::Zip {
            create_zip(&chromosome_entries())
        } else {
            create_tgz(&chromosome_entries())
        };
        let archive = Archive::new(&filename, format, Some("data.chr*.gz")).unwrap();
        let entries = archive.entries().unwrap();
        let lines: Vec<String> = archive.lines_of(entries).collect();
        assert_eq!(lines, read_all(&archive), "Different lines from the listed entries in {}", format);

        // Only the given entries are read.
        let lines: Vec<String> = archive.lines_of(vec![String::from("data.chr2.gz")]).collect();
        assert_eq!(lines, vec!["chr2\t1", "chr2\t2"], "Wrong lines from a single entry in {}", format);

        // An entry that does not exist ends the sequence.
        let lines: Vec<String> = archive.lines_of(vec![String::from("data.chr9.gz")]).collect();
        assert!(lines.is_empty(), "Read a missing entry in {}", format);

        let _ = fs::remove_file(&filename);
    }
}

//-----------------------------------------------------------------------------

#[test]
fn plain_and_gzip_files() {
    let text = "first\r\nsecond\n\nlast";
    let plain = create_file(text.as_bytes());
    let compressed = create_file(&gzip(text.as_bytes()));
    let expected = vec!["first", "second", "", "last"];

    let archive = Archive::new(&plain, ArchiveFormat::None, None).unwrap();
    assert_eq!(read_all(&archive), expected, "Wrong lines from a plain file");
    let archive = Archive::new(&compressed, ArchiveFormat::Gz, None).unwrap();
    assert_eq!(archive.entries().unwrap().len(), 1);
    assert_eq!(read_all(&archive), expected, "Wrong lines from a gzip file");

    let _ = fs::remove_file(&plain);
    let _ = fs::remove_file(&compressed);
}

#[test]
fn concatenated_gzip_members() {
    let mut data = gzip(b"one\ntwo\n");
    data.extend(gzip(b"three\n"));
    let filename = create_file(&data);
    let archive = Archive::new(&filename, ArchiveFormat::Gz, None).unwrap();
    assert_eq!(read_all(&archive), vec!["one", "two", "three"]);
    let _ = fs::remove_file(&filename);
}

#[test]
fn bgzf_file() {
    let text = numbered_lines("bgzf", 1000);
    let filename = create_bgzf(text.as_bytes());
    let archive = Archive::new(&filename, ArchiveFormat::Bgz, None).unwrap();
    let lines = read_all(&archive);
    assert_eq!(lines.len(), 1000);
    assert_eq!(lines[0], "bgzf\t0");
    assert_eq!(lines[999], "bgzf\t999");
    let _ = fs::remove_file(&filename);
}

#[test]
fn invalid_utf8_is_replaced() {
    let filename = create_file(b"ok\nbad\xFFbyte\n");
    let archive = Archive::new(&filename, ArchiveFormat::None, None).unwrap();
    let lines = read_all(&archive);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1], "bad\u{FFFD}byte");
    let _ = fs::remove_file(&filename);
}

//-----------------------------------------------------------------------------

#[test]
fn missing_archive_is_empty() {
    let filename = serialize::temp_file_name("archive-missing");
    for format in [ArchiveFormat::None, ArchiveFormat::Gz, ArchiveFormat::Zip, ArchiveFormat::Tgz, ArchiveFormat::Bgz] {
        let archive = Archive::new(&filename, format, None).unwrap();
        assert!(archive.entries().is_err(), "Listed entries of a missing {} archive", format);
        let mut lines = archive.lines();
        assert!(lines.next().is_none(), "Read lines from a missing {} archive", format);
        assert_eq!(lines.lines_read(), 0);
    }
}

#[test]
fn corrupt_zip_is_empty() {
    let filename = create_file(b"this is not a zip file\n");
    let archive = Archive::new(&filename, ArchiveFormat::Zip, None).unwrap();
    assert!(archive.entries().is_err(), "Listed entries of a corrupt zip");
    assert!(read_all(&archive).is_empty());
    let _ = fs::remove_file(&filename);
}

#[test]
fn many_chunks_and_early_drop() {
    let count = 5 * Archive::CHUNK_SIZE + 17;
    let text = numbered_lines("line", count);
    let filename = create_file(&gzip(text.as_bytes()));
    let archive = Archive::new(&filename, ArchiveFormat::Gz, None).unwrap();

    let mut lines = archive.lines();
    for (i, line) in lines.by_ref().enumerate() {
        assert_eq!(line, format!("line\t{}", i));
    }
    assert_eq!(lines.lines_read(), count);

    // Dropping an unfinished sequence must not hang.
    let mut lines = archive.lines();
    assert_eq!(lines.next(), Some(String::from("line\t0")));
    drop(lines);

    let _ = fs::remove_file(&filename);
}

//-----------------------------------------------------------------------------
