//! Binary encoding for variant keys and annotation records.
//!
//! Every encoded value is self-describing:
//!
//! * A byte code integer storing the length of the payload in bytes.
//! * The payload: the codec version followed by a fixed field layout for that version.
//!
//! Integers are stored using [`ByteCode`], where each byte contains 7 bits of data and the high bit marks that more bytes follow.
//! Strings are stored as their length followed by the bytes.
//! Floating-point values are stored as their IEEE-754 bit patterns.
//! The encoding is therefore independent of the endianness of the platform.
//!
//! Because of the length prefix, the total size of an encoded entry can be determined with [`entry_size`] without decoding the payload.
//! Ordering comparisons must always use decoded keys, as the byte order of encoded keys does not respect numeric order.
//!
//! Decoding failures are reported as [`Error::CorruptRecord`].
//! They affect only the entry being decoded.

use crate::{ClinVarData, VariantKey, VariantRecord};
use crate::variant::{ClinicalSignificance, FrequencySource, PathogenicitySource, ReviewStatus};
use crate::error::{Error, Result};

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Read};

use gbwt::support::{ByteCode, ByteCodeIter};


//-----------------------------------------------------------------------------

/// A reversible binary encoding with an explicit version.
///
/// Implementations provide the payload layout.
/// The length prefix and the version are handled by the provided methods.
pub trait Codec {
    /// Type of the encoded values.
    type Value;

    /// Name of the codec, as stored in the map catalog of the database.
    const NAME: &'static str;

    /// Current version of the payload layout.
    const VERSION: usize;

    /// Appends the fields of the value to the encoder.
    fn encode_fields(value: &Self::Value, encoder: &mut ByteCode);

    /// Decodes the fields of a value from the iterator.
    ///
    /// Returns an error message if the fields are inconsistent.
    fn decode_fields(iter: &mut ByteCodeIter) -> std::result::Result<Self::Value, String>;

    /// Encodes the value.
    fn encode(value: &Self::Value) -> Vec<u8> {
        let mut payload = ByteCode::new();
        payload.write(Self::VERSION);
        Self::encode_fields(value, &mut payload);
        let payload: Vec<u8> = Vec::from(payload);

        let mut result = Vec::from(byte_code(payload.len()));
        result.extend_from_slice(&payload);
        result
    }

    /// Decodes a value encoded with [`Codec::encode`].
    ///
    /// Returns [`Error::CorruptRecord`] if the bytes are not a valid encoding of a value.
    fn decode(bytes: &[u8]) -> Result<Self::Value> {
        let size = entry_size(bytes)?;
        if size != bytes.len() {
            return Err(corrupt(Self::NAME, format!("Expected {} bytes, got {}", size, bytes.len())));
        }
        let prefix_len = size - payload_len(bytes)?;
        let payload = &bytes[prefix_len..];
        check_byte_code(payload).map_err(|x| corrupt(Self::NAME, x))?;

        let mut iter = ByteCodeIter::new(payload);
        let version = iter.next().ok_or(corrupt(Self::NAME, String::from("Missing version")))?;
        if version != Self::VERSION {
            return Err(corrupt(Self::NAME, format!("Unsupported version {} (expected {})", version, Self::VERSION)));
        }
        let value = Self::decode_fields(&mut iter).map_err(|x| corrupt(Self::NAME, x))?;
        if iter.next().is_some() {
            return Err(corrupt(Self::NAME, String::from("Trailing bytes after the payload")));
        }
        Ok(value)
    }
}

fn corrupt(codec: &str, message: String) -> Error {
    Error::CorruptRecord(format!("{}: {}", codec, message))
}

// Returns the byte code encoding of a single integer.
fn byte_code(value: usize) -> ByteCode {
    let mut encoder = ByteCode::new();
    encoder.write(value);
    encoder
}

// A 64-bit integer needs at most 10 bytes.
const MAX_CODE_LEN: usize = 10;

// Checks that the bytes consist of complete byte code integers that fit in 64 bits.
fn check_byte_code(bytes: &[u8]) -> std::result::Result<(), String> {
    let mut code_len = 0;
    for byte in bytes {
        code_len += 1;
        if code_len > MAX_CODE_LEN {
            return Err(String::from("Integer does not fit in 64 bits"));
        }
        if byte & 0x80 == 0 {
            code_len = 0;
        }
    }
    if code_len > 0 {
        return Err(String::from("Truncated integer"));
    }
    Ok(())
}

// Returns the length of the length prefix.
fn prefix_len(bytes: &[u8]) -> Result<usize> {
    match bytes.iter().take(MAX_CODE_LEN).position(|byte| byte & 0x80 == 0) {
        Some(last) => Ok(last + 1),
        None => Err(Error::CorruptRecord(String::from("Invalid length prefix"))),
    }
}

// Returns the payload length stored in the prefix.
fn payload_len(bytes: &[u8]) -> Result<usize> {
    let prefix = &bytes[..prefix_len(bytes)?];
    ByteCodeIter::new(prefix).next().ok_or(Error::CorruptRecord(String::from("Invalid length prefix")))
}

/// Returns the total size of the encoded entry in bytes, using only the length prefix.
///
/// The bytes may continue past the end of the entry.
/// Returns [`Error::CorruptRecord`] if the prefix is invalid.
///
/// # Examples
///
/// ```
/// use allele_base::{VariantKey, codec};
/// use allele_base::codec::{Codec, KeyCodec};
///
/// let key = VariantKey::new(1, 100, "A", "T").unwrap();
/// let encoded = KeyCodec::encode(&key);
/// assert_eq!(codec::entry_size(&encoded).unwrap(), encoded.len());
/// ```
pub fn entry_size(bytes: &[u8]) -> Result<usize> {
    let prefix_len = prefix_len(bytes)?;
    let payload_len = payload_len(bytes)?;
    Ok(prefix_len + payload_len)
}

/// Reads the next encoded entry from the reader.
///
/// Returns [`None`] at the end of the input.
/// Returns an error if the input ends in the middle of an entry.
pub fn read_entry<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut result: Vec<u8> = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let len = reader.read(&mut byte)?;
        if len == 0 {
            if result.is_empty() {
                return Ok(None);
            }
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Truncated length prefix"));
        }
        result.push(byte[0]);
        if byte[0] & 0x80 == 0 {
            break;
        }
        if result.len() >= MAX_CODE_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "Invalid length prefix"));
        }
    }

    let payload_len = ByteCodeIter::new(&result).next().ok_or(
        io::Error::new(io::ErrorKind::InvalidData, "Invalid length prefix")
    )?;
    let prefix_len = result.len();
    result.resize(prefix_len + payload_len, 0);
    reader.read_exact(&mut result[prefix_len..])?;
    Ok(Some(result))
}

//-----------------------------------------------------------------------------

// Field encoding helpers shared by the codecs.

fn write_bytes(encoder: &mut ByteCode, bytes: &[u8]) {
    encoder.write(bytes.len());
    for byte in bytes {
        encoder.write(*byte as usize);
    }
}

fn read_bytes(iter: &mut ByteCodeIter) -> std::result::Result<Vec<u8>, String> {
    let len = read_value(iter, "string length")?;
    let mut result = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        let byte = read_value(iter, "string")?;
        if byte > u8::MAX as usize {
            return Err(format!("Invalid byte value {}", byte));
        }
        result.push(byte as u8);
    }
    Ok(result)
}

fn read_string(iter: &mut ByteCodeIter) -> std::result::Result<String, String> {
    let bytes = read_bytes(iter)?;
    String::from_utf8(bytes).map_err(|x| x.to_string())
}

fn read_value(iter: &mut ByteCodeIter, field: &str) -> std::result::Result<usize, String> {
    iter.next().ok_or(format!("Missing {}", field))
}

fn read_flag(iter: &mut ByteCodeIter, field: &str) -> std::result::Result<bool, String> {
    match read_value(iter, field)? {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(format!("Invalid {} flag {}", field, value)),
    }
}

fn write_float(encoder: &mut ByteCode, value: f32) {
    encoder.write(value.to_bits() as usize);
}

fn read_float(iter: &mut ByteCodeIter, field: &str) -> std::result::Result<f32, String> {
    let bits = read_value(iter, field)?;
    let bits = u32::try_from(bits).map_err(|_| format!("Invalid {} value", field))?;
    Ok(f32::from_bits(bits))
}

// Writes a map from source identifiers to values in identifier order.
fn write_scores<K: Copy>(encoder: &mut ByteCode, values: &BTreeMap<K, f32>, id: impl Fn(K) -> usize) {
    encoder.write(values.len());
    for (source, value) in values.iter() {
        encoder.write(id(*source));
        write_float(encoder, *value);
    }
}

// Reads a map written with `write_scores`. Identifiers must be strictly increasing.
fn read_scores<K: Ord>(
    iter: &mut ByteCodeIter, field: &str, from_id: impl Fn(usize) -> Option<K>
) -> std::result::Result<BTreeMap<K, f32>, String> {
    let len = read_value(iter, field)?;
    let mut result = BTreeMap::new();
    let mut prev: Option<usize> = None;
    for _ in 0..len {
        let id = read_value(iter, field)?;
        if prev.is_some_and(|prev| id <= prev) {
            return Err(format!("Unsorted {} source {}", field, id));
        }
        prev = Some(id);
        let source = from_id(id).ok_or(format!("Unknown {} source {}", field, id))?;
        let value = read_float(iter, field)?;
        result.insert(source, value);
    }
    Ok(result)
}

fn write_clinvar(encoder: &mut ByteCode, data: &ClinVarData) {
    match data.allele_id {
        Some(id) => {
            encoder.write(1);
            encoder.write(id as usize);
        },
        None => encoder.write(0),
    }
    encoder.write(data.primary_interpretation.id());
    encoder.write(data.secondary_interpretations.len());
    for value in data.secondary_interpretations.iter() {
        encoder.write(value.id());
    }
    encoder.write(data.review_status.id());
    encoder.write(data.conditions.len());
    for condition in data.conditions.iter() {
        write_bytes(encoder, condition.as_bytes());
    }
}

fn read_clinvar(iter: &mut ByteCodeIter) -> std::result::Result<ClinVarData, String> {
    let allele_id = if read_flag(iter, "allele id")? { Some(read_value(iter, "allele id")? as u64) } else { None };
    let primary = read_value(iter, "interpretation")?;
    let primary_interpretation = ClinicalSignificance::from_id(primary).ok_or(
        format!("Unknown clinical significance {}", primary)
    )?;
    let len = read_value(iter, "secondary interpretations")?;
    let mut secondary_interpretations = BTreeSet::new();
    for _ in 0..len {
        let id = read_value(iter, "secondary interpretation")?;
        let value = ClinicalSignificance::from_id(id).ok_or(format!("Unknown clinical significance {}", id))?;
        secondary_interpretations.insert(value);
    }
    let review = read_value(iter, "review status")?;
    let review_status = ReviewStatus::from_id(review).ok_or(format!("Unknown review status {}", review))?;
    let len = read_value(iter, "conditions")?;
    let mut conditions = Vec::with_capacity(len.min(64));
    for _ in 0..len {
        conditions.push(read_string(iter)?);
    }
    Ok(ClinVarData { allele_id, primary_interpretation, secondary_interpretations, review_status, conditions })
}

//-----------------------------------------------------------------------------

/// Codec for [`VariantKey`].
///
/// Layout (version 1): chromosome, position, reference allele, alternate allele.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyCodec;

impl Codec for KeyCodec {
    type Value = VariantKey;
    const NAME: &'static str = "variant-key";
    const VERSION: usize = 1;

    fn encode_fields(value: &VariantKey, encoder: &mut ByteCode) {
        encoder.write(value.chromosome() as usize);
        encoder.write(value.position() as usize);
        write_bytes(encoder, value.ref_allele().as_bytes());
        write_bytes(encoder, value.alt_allele().as_bytes());
    }

    fn decode_fields(iter: &mut ByteCodeIter) -> std::result::Result<VariantKey, String> {
        let chromosome = read_value(iter, "chromosome")?;
        let chromosome = u8::try_from(chromosome).map_err(|_| format!("Invalid chromosome {}", chromosome))?;
        let position = read_value(iter, "position")?;
        let position = u32::try_from(position).map_err(|_| format!("Invalid position {}", position))?;
        let ref_allele = read_string(iter)?;
        let alt_allele = read_string(iter)?;
        VariantKey::new(chromosome, position, &ref_allele, &alt_allele)
    }
}

/// Codec for [`VariantRecord`] stored in the allele map.
///
/// Layout (version 2):
///
/// * rsID flag, followed by the rsID if the flag is set.
/// * Number of frequencies, followed by (source identifier, value) pairs in identifier order.
/// * Number of pathogenicity scores, followed by (source identifier, value) pairs in identifier order.
/// * ClinVar flag, followed by the [`ClinVarCodec`] fields if the flag is set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordCodec;

impl Codec for RecordCodec {
    type Value = VariantRecord;
    const NAME: &'static str = "variant-record";
    const VERSION: usize = 2;

    fn encode_fields(value: &VariantRecord, encoder: &mut ByteCode) {
        match &value.rs_id {
            Some(rs_id) => {
                encoder.write(1);
                write_bytes(encoder, rs_id.as_bytes());
            },
            None => encoder.write(0),
        }
        write_scores(encoder, &value.frequencies, FrequencySource::id);
        write_scores(encoder, &value.pathogenicity, PathogenicitySource::id);
        match &value.clinvar {
            Some(data) => {
                encoder.write(1);
                write_clinvar(encoder, data);
            },
            None => encoder.write(0),
        }
    }

    fn decode_fields(iter: &mut ByteCodeIter) -> std::result::Result<VariantRecord, String> {
        let rs_id = if read_flag(iter, "rsID")? { Some(read_string(iter)?) } else { None };
        let frequencies = read_scores(iter, "frequency", FrequencySource::from_id)?;
        let pathogenicity = read_scores(iter, "pathogenicity", PathogenicitySource::from_id)?;
        let clinvar = if read_flag(iter, "ClinVar")? { Some(read_clinvar(iter)?) } else { None };
        Ok(VariantRecord { rs_id, frequencies, pathogenicity, clinvar })
    }
}

/// Codec for [`ClinVarData`] stored in the ClinVar map.
///
/// Layout (version 2): allele identifier flag, followed by the identifier if the flag is set, primary interpretation, secondary interpretations, review status, conditions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClinVarCodec;

impl Codec for ClinVarCodec {
    type Value = ClinVarData;
    const NAME: &'static str = "clinvar";
    const VERSION: usize = 2;

    fn encode_fields(value: &ClinVarData, encoder: &mut ByteCode) {
        write_clinvar(encoder, value);
    }

    fn decode_fields(iter: &mut ByteCodeIter) -> std::result::Result<ClinVarData, String> {
        read_clinvar(iter)
    }
}

//-----------------------------------------------------------------------------
