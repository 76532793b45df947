//! Utility functions and structures.

use std::fs::{self, File};
use std::path::Path;
use std::io::{BufRead, BufReader, Read};

use flate2::read::MultiGzDecoder;

//-----------------------------------------------------------------------------

// Utilities for working with files.

const SIZE_UNITS: [(f64, &str); 6] = [
    (1.0, "B"),
    (1024.0, "KiB"),
    (1024.0 * 1024.0, "MiB"),
    (1024.0 * 1024.0 * 1024.0, "GiB"),
    (1024.0 * 1024.0 * 1024.0 * 1024.0, "TiB"),
    (1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0, "PiB"),
];

/// Returns a human-readable representation of the given number of bytes.
pub fn human_readable_size(bytes: usize) -> String {
    let mut unit = 0;
    let value = bytes as f64;
    while unit + 1 < SIZE_UNITS.len() && value >= SIZE_UNITS[unit + 1].0 {
        unit += 1;
    }
    format!("{:.3} {}", value / SIZE_UNITS[unit].0, SIZE_UNITS[unit].1)
}

/// Returns a human-readable size of the file.
pub fn file_size<P: AsRef<Path>>(filename: P) -> Option<String> {
    let metadata = fs::metadata(filename).ok()?;
    Some(human_readable_size(metadata.len() as usize))
}

/// Returns `true` if the file exists.
pub fn file_exists<P: AsRef<Path>>(filename: P) -> bool {
    fs::metadata(filename).is_ok()
}

/// Returns `true` if the data starts with the gzip magic number.
pub fn has_gzip_magic(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1F && data[1] == 0x8B
}

/// Returns `true` if the file appears to be gzip-compressed.
pub fn is_gzipped<P: AsRef<Path>>(filename: P) -> bool {
    let file = match File::open(filename) {
        Ok(file) => file,
        Err(_) => return false,
    };
    let mut reader = BufReader::new(file);
    let mut magic = [0; 2];
    let len = reader.read(&mut magic).ok();
    len == Some(2) && has_gzip_magic(&magic)
}

/// Buffer size for reading large input files.
pub const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Returns a buffered reader for the file, which may be gzip-compressed.
///
/// Concatenated gzip members and block-compressed gzip are decompressed as a single stream.
pub fn open_file<P: AsRef<Path>>(filename: P) -> Result<Box<dyn BufRead + Send>, String> {
    let file = File::open(&filename).map_err(|x| format!("{}: {}", filename.as_ref().display(), x))?;
    if is_gzipped(&filename) {
        let inner = MultiGzDecoder::new(BufReader::with_capacity(READ_BUFFER_SIZE, file));
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, inner)))
    } else {
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file)))
    }
}

//-----------------------------------------------------------------------------

/// Returns the value of a `KEY=VALUE` entry in a VCF INFO field, or [`None`] if the key is absent.
///
/// Flags without a value are reported as an empty string.
pub fn info_value<'a>(info: &'a str, key: &str) -> Option<&'a str> {
    for entry in info.split(';') {
        match entry.split_once('=') {
            Some((name, value)) if name == key => return Some(value),
            None if entry == key => return Some(""),
            _ => {},
        }
    }
    None
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readable_sizes() {
        assert_eq!(human_readable_size(0), "0.000 B");
        assert_eq!(human_readable_size(1536), "1.500 KiB");
        assert_eq!(human_readable_size(3 * 1024 * 1024), "3.000 MiB");
    }

    #[test]
    fn info_fields() {
        let info = "RS=123;CAF=0.9,0.1;COMMON;TOPMED=0.8,0.2";
        assert_eq!(info_value(info, "RS"), Some("123"));
        assert_eq!(info_value(info, "CAF"), Some("0.9,0.1"));
        assert_eq!(info_value(info, "COMMON"), Some(""));
        assert_eq!(info_value(info, "TOPMED"), Some("0.8,0.2"));
        assert_eq!(info_value(info, "AF"), None);
        assert_eq!(info_value(".", "AF"), None);
    }
}

//-----------------------------------------------------------------------------
