//! Key/value metadata attached to a texture file.
//!
//! Small entries live in one zipped block and are resident once the store is
//! loaded. Large entries only have their headers resident; each payload is a
//! separate zipped block read the first time its value is requested.

use crate::error::Result;
use crate::format::{Fields, MetaDataType};
use crate::source::Source;
use std::collections::HashMap;
use std::fmt;
use std::mem::size_of;
use std::sync::{Arc, OnceLock};
use tracing::instrument;

/// A decoded metadata value.
#[derive(Clone, Debug, PartialEq)]
pub enum MetaValue {
    String(String),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl MetaValue {
    fn decode(kind: MetaDataType, bytes: &[u8]) -> Self {
        fn words<const N: usize, T>(bytes: &[u8], convert: fn([u8; N]) -> T) -> Vec<T> {
            bytes
                .chunks_exact(N)
                .map(|chunk| {
                    let mut word = [0u8; N];
                    word.copy_from_slice(chunk);
                    convert(word)
                })
                .collect()
        }
        match kind {
            MetaDataType::String => {
                let text = bytes.split(|b| *b == 0).next().unwrap_or_default();
                Self::String(String::from_utf8_lossy(text).into_owned())
            },
            MetaDataType::Int8 => Self::Int8(words::<1, _>(bytes, i8::from_le_bytes)),
            MetaDataType::Int16 => Self::Int16(words::<2, _>(bytes, i16::from_le_bytes)),
            MetaDataType::Int32 => Self::Int32(words::<4, _>(bytes, i32::from_le_bytes)),
            MetaDataType::Float => Self::Float(words::<4, _>(bytes, f32::from_le_bytes)),
            MetaDataType::Double => Self::Double(words::<8, _>(bytes, f64::from_le_bytes)),
        }
    }

    pub fn kind(&self) -> MetaDataType {
        match self {
            Self::String(_) => MetaDataType::String,
            Self::Int8(_) => MetaDataType::Int8,
            Self::Int16(_) => MetaDataType::Int16,
            Self::Int32(_) => MetaDataType::Int32,
            Self::Float(_) => MetaDataType::Float,
            Self::Double(_) => MetaDataType::Double,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, values: &[T]) -> fmt::Result {
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{value}")?;
            }
            Ok(())
        }
        match self {
            Self::String(text) => write!(f, "{text:?}"),
            Self::Int8(values) => list(f, values),
            Self::Int16(values) => list(f, values),
            Self::Int32(values) => list(f, values),
            Self::Float(values) => list(f, values),
            Self::Double(values) => list(f, values),
        }
    }
}

/// Where an entry's payload lives.
#[derive(Debug)]
enum Payload {
    Resident(Vec<u8>),
    Large { pos: u64, zip_size: usize, data: OnceLock<Vec<u8>> },
}

#[derive(Debug)]
struct Entry {
    key: String,
    kind: MetaDataType,
    size: usize,
    payload: Payload,
}

/// The metadata of one file, in key insertion order.
pub struct MetaData {
    source: Arc<Source>,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl MetaData {
    pub(crate) fn new(source: Arc<Source>) -> Self {
        Self { source, entries: Vec::new(), index: HashMap::new() }
    }

    /// Parse a zipped block of small entries.
    #[instrument(level = "debug", skip(self))]
    pub(crate) fn read_block(&mut self, pos: u64, zip_size: usize, mem_size: usize) -> Result<()> {
        if zip_size == 0 {
            return Ok(());
        }
        let bytes = self.source.read_zipped(pos, zip_size, mem_size)?;
        let mut fields = Fields::new(&bytes);
        while fields.remaining() > 0 {
            let (key, kind) = Self::parse_key(&mut fields)?;
            let size = fields.u32()? as usize;
            let data = fields.take(size)?.to_vec();
            self.insert(Entry { key, kind, size, payload: Payload::Resident(data) });
        }
        Ok(())
    }

    /// Parse the zipped block of large entry headers. Payloads start at
    /// `data_pos` and follow each other in header order.
    #[instrument(level = "debug", skip(self))]
    pub(crate) fn read_large_headers(
        &mut self,
        pos: u64,
        zip_size: usize,
        mem_size: usize,
        data_pos: u64,
    ) -> Result<()> {
        if zip_size == 0 {
            return Ok(());
        }
        let bytes = self.source.read_zipped(pos, zip_size, mem_size)?;
        let mut fields = Fields::new(&bytes);
        let mut next = data_pos;
        while fields.remaining() > 0 {
            let (key, kind) = Self::parse_key(&mut fields)?;
            let size = fields.u32()? as usize;
            let zip_size = fields.u32()? as usize;
            let payload = Payload::Large { pos: next, zip_size, data: OnceLock::new() };
            next += zip_size as u64;
            self.insert(Entry { key, kind, size, payload });
        }
        Ok(())
    }

    fn parse_key(fields: &mut Fields<'_>) -> Result<(String, MetaDataType)> {
        let key_size = fields.u8()? as usize;
        let raw = fields.take(key_size)?;
        let key = raw.strip_suffix(&[0]).unwrap_or(raw);
        let kind = MetaDataType::from_raw(fields.u8()?)?;
        Ok((String::from_utf8_lossy(key).into_owned(), kind))
    }

    /// Later entries with the same key replace earlier ones in place.
    fn insert(&mut self, entry: Entry) {
        match self.index.get(&entry.key) {
            Some(&slot) => self.entries[slot] = entry,
            None => {
                self.index.insert(entry.key.clone(), self.entries.len());
                self.entries.push(entry);
            },
        }
    }

    pub fn num_keys(&self) -> usize {
        self.entries.len()
    }

    /// Key and type of the `n`th entry.
    pub fn key(&self, n: usize) -> Option<(&str, MetaDataType)> {
        self.entries.get(n).map(|entry| (entry.key.as_str(), entry.kind))
    }

    pub fn keys(&self) -> impl Iterator<Item = (&str, MetaDataType)> + '_ {
        self.entries.iter().map(|entry| (entry.key.as_str(), entry.kind))
    }

    pub fn kind(&self, key: &str) -> Option<MetaDataType> {
        self.entry(key).map(|entry| entry.kind)
    }

    /// Whether the value of `key` is in memory without further I/O.
    pub fn is_resident(&self, key: &str) -> bool {
        self.entry(key).is_some_and(|entry| match &entry.payload {
            Payload::Resident(_) => true,
            Payload::Large { data, .. } => data.get().is_some(),
        })
    }

    fn entry(&self, key: &str) -> Option<&Entry> {
        self.index.get(key).map(|&slot| &self.entries[slot])
    }

    /// Raw little-endian bytes of `key`, loading a large payload on first use.
    pub fn raw(&self, key: &str) -> Result<Option<&[u8]>> {
        let Some(entry) = self.entry(key) else {
            return Ok(None);
        };
        match &entry.payload {
            Payload::Resident(data) => Ok(Some(data.as_slice())),
            Payload::Large { pos, zip_size, data } => {
                if let Some(bytes) = data.get() {
                    return Ok(Some(bytes.as_slice()));
                }
                tracing::debug!(key, size = entry.size, "Loading large metadata entry");
                let bytes = self.source.read_zipped(*pos, *zip_size, entry.size)?;
                Ok(Some(self.source.install(data, bytes, entry.size).as_slice()))
            },
        }
    }

    pub fn value(&self, key: &str) -> Result<Option<MetaValue>> {
        let Some(kind) = self.kind(key) else {
            return Ok(None);
        };
        Ok(self.raw(key)?.map(|bytes| MetaValue::decode(kind, bytes)))
    }

    /// Bytes held, counting only payloads that are always resident.
    pub(crate) fn mem_used(&self) -> usize {
        size_of::<Self>()
            + self
                .entries
                .iter()
                .map(|entry| {
                    let payload = match &entry.payload {
                        Payload::Resident(data) => data.len(),
                        Payload::Large { .. } => 0,
                    };
                    size_of::<Entry>() + size_of::<(String, usize)>() + 2 * entry.key.len() + payload
                })
                .sum::<usize>()
    }

    /// Drop loaded large payloads.
    pub(crate) fn purge(&mut self) {
        for entry in &mut self.entries {
            if let Payload::Large { data, .. } = &mut entry.payload {
                data.take();
            }
        }
    }
}

impl fmt::Debug for MetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaData").field("entries", &self.entries).finish()
    }
}
