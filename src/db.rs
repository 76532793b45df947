//! Allele-base: an SQLite database mapping variants to their annotations.
//!
//! The database contains the following tables:
//!
//! * `Tags`: key-value pairs with the database version and build metadata.
//! * `Maps`: catalog of named maps with their tables, codecs, and entry counts.
//! * One table for each named map.
//!   The primary key consists of the decoded [`VariantKey`] fields, and the value is a blob encoded with the codec of the map.
//!   The tables are `WITHOUT ROWID`, so the rows are stored in canonical key order.
//!
//! [`StoreBuilder`] creates a new database.
//! [`AlleleBase`] opens an existing database for reading, and [`MapInterface`] performs lookups in a single map.

use crate::codec::{self, ClinVarCodec, Codec, RecordCodec};
use crate::error::{Error, Result};
use crate::utils;
use crate::variant::VariantKey;

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, Statement};
use tracing::{debug, info};


//-----------------------------------------------------------------------------

/// Name of the map storing frequencies, pathogenicity scores, and rsIDs.
pub const ALLELE_MAP: &str = "alleles";

/// Name of the map storing clinical-significance payloads.
pub const CLINVAR_MAP: &str = "clinvar";

/// Catalog entry for a named map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapInfo {
    /// Name of the map.
    pub name: String,
    /// Name of the table storing the map.
    pub table: String,
    /// Name of the codec used for the values.
    pub codec: String,
    /// Version of the codec used for the values.
    pub codec_version: usize,
    /// Number of entries in the map.
    pub entries: usize,
}

/// A handle to a named map bound to its codec.
///
/// Handles are obtained from [`AlleleBase::map`].
/// Opening the same map twice through the same database returns the same handle.
#[derive(Debug)]
pub struct MapHandle<C: Codec> {
    info: MapInfo,
    _codec: PhantomData<fn() -> C>,
}

impl<C: Codec> MapHandle<C> {
    /// Returns the catalog entry for the map.
    pub fn info(&self) -> &MapInfo {
        &self.info
    }

    /// Returns the name of the map.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.info.entries
    }

    /// Returns `true` if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.info.entries == 0
    }
}

//-----------------------------------------------------------------------------

/// A database connection to an Allele-base database.
///
/// This structure stores a database connection, the header information, and the map catalog.
/// The database is opened in read-only mode.
/// In multi-threaded applications, each thread should have its own connection.
///
/// # Examples
///
/// ```
/// use allele_base::{AlleleBase, FrequencySource, StoreBuilder, VariantKey, VariantRecord};
/// use allele_base::codec::{Codec, RecordCodec};
/// use allele_base::db::{MapInterface, ALLELE_MAP};
/// use simple_sds::serialize;
/// use std::fs;
///
/// // Create a database with a single entry.
/// let db_file = serialize::temp_file_name("allele-base");
/// let key = VariantKey::new(1, 100, "A", "T").unwrap();
/// let record = VariantRecord::with_frequency(FrequencySource::Topmed, 15.0);
/// let mut builder = StoreBuilder::create(&db_file).unwrap();
/// builder.create_map::<RecordCodec>(ALLELE_MAP).unwrap();
/// builder.insert_block(ALLELE_MAP, &[(key.clone(), RecordCodec::encode(&record))]).unwrap();
/// builder.finish().unwrap();
///
/// // Open the database and look up the entry.
/// let database = AlleleBase::open(&db_file).unwrap();
/// let map = database.map::<RecordCodec>(ALLELE_MAP).unwrap();
/// assert_eq!(map.len(), 1);
/// let mut interface = MapInterface::new(&database, &map).unwrap();
/// assert_eq!(interface.get(&key).unwrap(), Some(record));
///
/// // Clean up.
/// drop(interface);
/// drop(database);
/// fs::remove_file(&db_file).unwrap();
/// ```
#[derive(Debug)]
pub struct AlleleBase {
    connection: Connection,
    version: String,
    maps: BTreeMap<String, MapInfo>,
    handles: RefCell<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

/// Using the database.
impl AlleleBase {
    // Key for database version.
    const KEY_VERSION: &'static str = "version";

    /// Current database version.
    pub const VERSION: &'static str = "Allele-base v1.0.0";

    /// Opens a connection to the database in the given file.
    ///
    /// Reads the header information and the map catalog.
    /// Returns [`Error::Configuration`] if the database version is not supported.
    /// Passes through any database errors.
    pub fn open<P: AsRef<Path>>(filename: P) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let connection = Connection::open_with_flags(filename, flags)?;

        let mut get_tag = connection.prepare(
            "SELECT value FROM Tags WHERE key = ?1"
        )?;
        let version = get_string_value(&mut get_tag, Self::KEY_VERSION)?;
        if version != Self::VERSION {
            return Err(Error::Configuration(format!("Unsupported database version: {} (expected {})", version, Self::VERSION)));
        }
        drop(get_tag);

        let mut maps = BTreeMap::new();
        let mut get_maps = connection.prepare(
            "SELECT name, table_name, codec, codec_version, entries FROM Maps"
        )?;
        let mut rows = get_maps.query(())?;
        while let Some(row) = rows.next()? {
            let info = MapInfo {
                name: row.get(0)?,
                table: row.get(1)?,
                codec: row.get(2)?,
                codec_version: row.get(3)?,
                entries: row.get(4)?,
            };
            maps.insert(info.name.clone(), info);
        }
        drop(rows);
        drop(get_maps);

        Ok(AlleleBase {
            connection,
            version,
            maps,
            handles: RefCell::new(HashMap::new()),
        })
    }

    /// Returns the filename of the database or [`None`] if there is no filename.
    pub fn filename(&self) -> Option<&str> {
        self.connection.path()
    }

    /// Returns the size of the database file in a human-readable format.
    pub fn file_size(&self) -> Option<String> {
        let filename = self.filename()?;
        utils::file_size(filename)
    }

    /// Returns the version of the database.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the catalog entries for all maps in name order.
    pub fn maps(&self) -> impl Iterator<Item = &MapInfo> {
        self.maps.values()
    }

    /// Returns the value of the tag with the given key, or [`None`] if the tag does not exist.
    pub fn get_tag(&self, key: &str) -> Result<Option<String>> {
        let mut statement = self.connection.prepare_cached("SELECT value FROM Tags WHERE key = ?1")?;
        let value = statement.query_row((key,), |row| row.get(0)).optional()?;
        Ok(value)
    }

    /// Returns a handle to the named map.
    ///
    /// Opening the same map again returns the same handle.
    /// Returns [`Error::Configuration`] if the map does not exist or if it was built with a different codec.
    pub fn map<C: Codec + 'static>(&self, name: &str) -> Result<Arc<MapHandle<C>>> {
        let mut handles = self.handles.borrow_mut();
        if let Some(handle) = handles.get(name) {
            return handle.clone().downcast::<MapHandle<C>>().map_err(|_| {
                Error::Configuration(format!("Map {} was opened with a different codec", name))
            });
        }

        let info = self.maps.get(name).ok_or(
            Error::Configuration(format!("Unknown map: {}", name))
        )?;
        if info.codec != C::NAME || info.codec_version != C::VERSION {
            return Err(Error::Configuration(format!(
                "Map {} uses codec {} v{}, expected {} v{}",
                name, info.codec, info.codec_version, C::NAME, C::VERSION
            )));
        }
        let handle = Arc::new(MapHandle::<C> { info: info.clone(), _codec: PhantomData });
        handles.insert(String::from(name), handle.clone());
        Ok(handle)
    }

    /// Returns a handle to the allele map.
    pub fn allele_map(&self) -> Result<Arc<MapHandle<RecordCodec>>> {
        self.map::<RecordCodec>(ALLELE_MAP)
    }

    /// Returns a handle to the ClinVar map.
    pub fn clinvar_map(&self) -> Result<Arc<MapHandle<ClinVarCodec>>> {
        self.map::<ClinVarCodec>(CLINVAR_MAP)
    }
}

//-----------------------------------------------------------------------------

/// Creating the database.
///
/// The builder creates the tables, inserts sorted blocks of encoded entries, and updates the map catalog when finished.
/// Each block is inserted in its own transaction.
#[derive(Debug)]
pub struct StoreBuilder {
    connection: Connection,
    maps: BTreeMap<String, MapInfo>,
}

impl StoreBuilder {
    /// Creates a new database in the given file.
    ///
    /// Returns an error if the file already exists.
    /// Passes through any database errors.
    pub fn create<P: AsRef<Path>>(filename: P) -> Result<Self> {
        info!("Creating database {}", filename.as_ref().display());
        if utils::file_exists(&filename) {
            return Err(Error::Configuration(format!("Database {} already exists", filename.as_ref().display())));
        }

        let connection = Connection::open(filename)?;
        connection.execute(
            "CREATE TABLE Tags (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            ) STRICT",
            (),
        )?;
        connection.execute(
            "CREATE TABLE Maps (
                name TEXT PRIMARY KEY,
                table_name TEXT NOT NULL,
                codec TEXT NOT NULL,
                codec_version INTEGER NOT NULL,
                entries INTEGER NOT NULL
            ) STRICT",
            (),
        )?;
        connection.execute(
            "INSERT INTO Tags(key, value) VALUES (?1, ?2)",
            (AlleleBase::KEY_VERSION, AlleleBase::VERSION),
        )?;

        Ok(StoreBuilder { connection, maps: BTreeMap::new() })
    }

    /// Sets a tag with build metadata.
    ///
    /// The database version cannot be changed.
    pub fn set_tag(&mut self, key: &str, value: &str) -> Result<()> {
        if key == AlleleBase::KEY_VERSION {
            return Err(Error::Configuration(String::from("The version tag is reserved")));
        }
        self.connection.execute(
            "INSERT OR REPLACE INTO Tags(key, value) VALUES (?1, ?2)",
            (key, value),
        )?;
        Ok(())
    }

    /// Creates an empty map with the given name and codec.
    ///
    /// Map names may contain lowercase ASCII letters, digits, and underscores.
    /// Returns [`Error::Configuration`] if the name is invalid or already in use.
    pub fn create_map<C: Codec>(&mut self, name: &str) -> Result<()> {
        if name.is_empty() || !name.bytes().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == b'_') {
            return Err(Error::Configuration(format!("Invalid map name: {}", name)));
        }
        if self.maps.contains_key(name) {
            return Err(Error::Configuration(format!("Map {} already exists", name)));
        }

        let table = format!("Map_{}", name);
        self.connection.execute(
            &format!(
                "CREATE TABLE {} (
                    chromosome INTEGER NOT NULL,
                    position INTEGER NOT NULL,
                    ref TEXT NOT NULL,
                    alt TEXT NOT NULL,
                    value BLOB NOT NULL,
                    PRIMARY KEY (chromosome, position, ref, alt)
                ) STRICT, WITHOUT ROWID",
                table
            ),
            (),
        )?;
        self.connection.execute(
            "INSERT INTO Maps(name, table_name, codec, codec_version, entries) VALUES (?1, ?2, ?3, ?4, 0)",
            (name, &table, C::NAME, C::VERSION),
        )?;

        debug!("Created map {} with codec {} v{}", name, C::NAME, C::VERSION);
        self.maps.insert(String::from(name), MapInfo {
            name: String::from(name),
            table,
            codec: String::from(C::NAME),
            codec_version: C::VERSION,
            entries: 0,
        });
        Ok(())
    }

    /// Inserts a block of encoded entries into the named map.
    ///
    /// Returns an error if the map does not exist or if a key is already present.
    pub fn insert_block(&mut self, map: &str, entries: &[(VariantKey, Vec<u8>)]) -> Result<()> {
        let info = self.maps.get_mut(map).ok_or(Error::Configuration(format!("Unknown map: {}", map)))?;
        let transaction = self.connection.transaction()?;
        {
            let mut insert = transaction.prepare_cached(&format!(
                "INSERT INTO {}(chromosome, position, ref, alt, value) VALUES (?1, ?2, ?3, ?4, ?5)",
                info.table
            ))?;
            for (key, value) in entries.iter() {
                insert.execute((key.chromosome(), key.position(), key.ref_allele(), key.alt_allele(), value))?;
            }
        }
        transaction.commit()?;
        info.entries += entries.len();
        Ok(())
    }

    /// Finishes the database and returns the number of entries in each map.
    ///
    /// The entry counts are recorded in the map catalog.
    pub fn finish(self) -> Result<BTreeMap<String, usize>> {
        let mut result = BTreeMap::new();
        let mut connection = self.connection;
        let transaction = connection.transaction()?;
        {
            let mut update = transaction.prepare("UPDATE Maps SET entries = ?1 WHERE name = ?2")?;
            for (name, info) in self.maps.iter() {
                update.execute((info.entries, name))?;
                result.insert(name.clone(), info.entries);
            }
        }
        transaction.commit()?;
        Ok(result)
    }
}

//-----------------------------------------------------------------------------

/// Lookups in a single map.
///
/// The interface stores prepared statements that borrow the database connection.
/// Values are decoded with the codec of the map.
/// A value that cannot be decoded is reported as [`Error::CorruptRecord`].
#[derive(Debug)]
pub struct MapInterface<'a, C: Codec> {
    get_value: Statement<'a>,
    get_prefix: Statement<'a>,
    get_range: Statement<'a>,
    get_all: Statement<'a>,
    _codec: PhantomData<fn() -> C>,
}

impl<'a, C: Codec> MapInterface<'a, C> {
    // Length prefixes are at most this many bytes.
    const MAX_PREFIX: usize = 10;

    /// Returns a new interface to the map in the given database.
    ///
    /// Passes through any database errors.
    pub fn new(database: &'a AlleleBase, map: &MapHandle<C>) -> Result<Self> {
        let table = &map.info.table;
        let get_value = database.connection.prepare(&format!(
            "SELECT value FROM {} WHERE chromosome = ?1 AND position = ?2 AND ref = ?3 AND alt = ?4",
            table
        ))?;
        let get_prefix = database.connection.prepare(&format!(
            "SELECT substr(value, 1, {}) FROM {} WHERE chromosome = ?1 AND position = ?2 AND ref = ?3 AND alt = ?4",
            Self::MAX_PREFIX, table
        ))?;
        let get_range = database.connection.prepare(&format!(
            "SELECT chromosome, position, ref, alt, value FROM {}
            WHERE chromosome = ?1 AND position >= ?2 AND position < ?3
            ORDER BY chromosome, position, ref, alt",
            table
        ))?;
        let get_all = database.connection.prepare(&format!(
            "SELECT chromosome, position, ref, alt, value FROM {}
            ORDER BY chromosome, position, ref, alt",
            table
        ))?;
        Ok(MapInterface { get_value, get_prefix, get_range, get_all, _codec: PhantomData })
    }

    /// Returns the encoded value for the key, or [`None`] if the key is not in the map.
    pub fn get_bytes(&mut self, key: &VariantKey) -> Result<Option<Vec<u8>>> {
        let value = self.get_value.query_row(
            (key.chromosome(), key.position(), key.ref_allele(), key.alt_allele()),
            |row| row.get(0)
        ).optional()?;
        Ok(value)
    }

    /// Returns the value for the key, or [`None`] if the key is not in the map.
    pub fn get(&mut self, key: &VariantKey) -> Result<Option<C::Value>> {
        match self.get_bytes(key)? {
            Some(bytes) => Ok(Some(C::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns the size of the encoded value for the key, or [`None`] if the key is not in the map.
    ///
    /// The size is determined from the length prefix without decoding the value.
    pub fn entry_size(&mut self, key: &VariantKey) -> Result<Option<usize>> {
        let prefix: Option<Vec<u8>> = self.get_prefix.query_row(
            (key.chromosome(), key.position(), key.ref_allele(), key.alt_allele()),
            |row| row.get(0)
        ).optional()?;
        match prefix {
            Some(bytes) => Ok(Some(codec::entry_size(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns the entries on the chromosome with positions in the given half-open interval, in canonical order.
    pub fn range(&mut self, chromosome: u8, start: u32, end: u32) -> Result<Vec<(VariantKey, C::Value)>> {
        let mut result = Vec::new();
        let mut rows = self.get_range.query((chromosome, start, end))?;
        while let Some(row) = rows.next()? {
            result.push(Self::row_to_entry(row)?);
        }
        Ok(result)
    }

    /// Calls the function for every entry in canonical order and returns the number of entries.
    ///
    /// Stops at the first error.
    pub fn for_each<F: FnMut(VariantKey, C::Value) -> Result<()>>(&mut self, mut f: F) -> Result<usize> {
        let mut count = 0;
        let mut rows = self.get_all.query(())?;
        while let Some(row) = rows.next()? {
            let (key, value) = Self::row_to_entry(row)?;
            f(key, value)?;
            count += 1;
        }
        Ok(count)
    }

    fn row_to_entry(row: &Row) -> Result<(VariantKey, C::Value)> {
        let chromosome: u8 = row.get(0)?;
        let position: u32 = row.get(1)?;
        let ref_allele: String = row.get(2)?;
        let alt_allele: String = row.get(3)?;
        let key = VariantKey::new(chromosome, position, &ref_allele, &alt_allele).map_err(Error::CorruptRecord)?;
        let bytes: Vec<u8> = row.get(4)?;
        let value = C::decode(&bytes)?;
        Ok((key, value))
    }
}

//-----------------------------------------------------------------------------

/// Type of a potential database file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatabaseFileType {
    /// The file does not exist.
    Missing,
    /// The file is not a valid SQLite database.
    NotDatabase,
    /// The file is an unknown SQLite database.
    UnknownDatabase,
    /// The file is a known SQLite database with the given version string.
    Version(String),
}

/// Determines the type of the given file, which may be a SQLite database.
pub fn identify_database<P: AsRef<Path>>(filename: P) -> DatabaseFileType {
    let metadata = match fs::metadata(&filename) {
        Ok(metadata) => metadata,
        Err(_) => return DatabaseFileType::Missing,
    };
    if !metadata.is_file() {
        return DatabaseFileType::NotDatabase;
    }

    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let connection = match Connection::open_with_flags(filename, flags) {
        Ok(connection) => connection,
        Err(_) => return DatabaseFileType::NotDatabase,
    };
    let mut statement = match connection.prepare("SELECT value FROM Tags WHERE key = 'version'") {
        Ok(statement) => statement,
        Err(_) => return DatabaseFileType::UnknownDatabase,
    };
    let version: rusqlite::Result<String> = statement.query_row([], |row| row.get(0));
    match version {
        Ok(version) => DatabaseFileType::Version(version),
        Err(_) => DatabaseFileType::UnknownDatabase,
    }
}

// Executes the statement, which is expected to return a single string value.
// Then returns the value.
fn get_string_value(statement: &mut Statement, key: &str) -> Result<String> {
    let result: rusqlite::Result<String> = statement.query_row(
        (key,),
        |row| row.get(0)
    );
    result.map_err(|x| Error::Configuration(format!("Key not found: {} ({})", key, x)))
}

//-----------------------------------------------------------------------------
