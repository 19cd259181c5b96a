//! Execution data model and binary file format.
//!
//! An execution data file is a sequence of blocks, each introduced by a
//! one-byte type tag. The first block must be a header carrying the
//! format magic and version; session-info and execution-data blocks
//! follow in any order. Several files may be concatenated into one
//! stream, so header blocks can reappear mid-stream and are re-checked.
//!
//! All multi-byte values are big-endian. Strings are a u16 length prefix
//! followed by UTF-8 bytes. Probe arrays are a varint element count
//! followed by the probes packed LSB-first, eight per byte.
//!
//! The format is the contract with the probe runtime and report tooling;
//! this module round-trips it bit-exact, which the merge tool depends on
//! for its canonical-form guarantee.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use thiserror::Error;

/// File format magic, `0xC0C0`.
pub const MAGIC_NUMBER: u16 = 0xC0C0;

/// File format version, incremented on every incompatible change.
pub const FORMAT_VERSION: u16 = 0x1006;

/// Block tag for the stream header.
pub const BLOCK_HEADER: u8 = 0x01;

/// Block tag for one session-info record.
pub const BLOCK_SESSION_INFO: u8 = 0x10;

/// Block tag for one per-class execution data record.
pub const BLOCK_EXECUTION_DATA: u8 = 0x11;

#[derive(Debug, Error)]
pub enum ExecDataError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid execution data file magic {0:#06x}")]
    InvalidMagic(u16),
    #[error("incompatible execution data version {actual:#06x}, expected {expected:#06x}")]
    IncompatibleVersion { actual: u16, expected: u16 },
    #[error("unknown block type {0:#04x} in execution data stream")]
    UnknownBlockType(u8),
    #[error("execution data block before stream header")]
    MissingHeader,
    #[error("truncated execution data stream")]
    Truncated,
    #[error("malformed varint in execution data stream")]
    InvalidVarInt,
    #[error("string in execution data stream is not valid UTF-8")]
    InvalidUtf8,
    #[error("incompatible execution data for class {name} (id {id:#018x}): {reason}")]
    Incompatible { id: i64, name: String, reason: String },
}

/// Metadata for one execution run: an identifier plus start and dump
/// timestamps in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub start: i64,
    pub dump: i64,
}

impl SessionInfo {
    pub fn new(id: impl Into<String>, start: i64, dump: i64) -> Self {
        Self {
            id: id.into(),
            start,
            dump,
        }
    }
}

/// Probe array for one class, keyed by the class id and VM name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionData {
    /// Class identifier, a hash of the unmodified classfile.
    pub id: i64,
    /// Internal (slash-separated) name of the class.
    pub name: String,
    /// One flag per probe, true once the probed block has executed.
    pub probes: Vec<bool>,
}

impl ExecutionData {
    pub fn new(id: i64, name: impl Into<String>, probes: Vec<bool>) -> Self {
        Self {
            id,
            name: name.into(),
            probes,
        }
    }

    /// True iff at least one probe has been hit.
    pub fn has_hits(&self) -> bool {
        self.probes.iter().any(|p| *p)
    }

    /// OR-combines `other` into this record, so a probe counts as hit
    /// if it was hit in either input.
    pub fn merge(&mut self, other: &ExecutionData) -> Result<(), ExecDataError> {
        self.assert_compatible(other)?;
        for (mine, theirs) in self.probes.iter_mut().zip(&other.probes) {
            *mine |= *theirs;
        }
        Ok(())
    }

    /// Checks that `other` refers to the same class with the same probe
    /// layout. Differing data under the same id means the inputs came
    /// from different versions of the class and cannot be combined.
    pub fn assert_compatible(&self, other: &ExecutionData) -> Result<(), ExecDataError> {
        let reason = if self.id != other.id {
            Some(format!("different class id {:#018x}", other.id))
        } else if self.name != other.name {
            Some(format!("different class name {:?}", other.name))
        } else if self.probes.len() != other.probes.len() {
            Some(format!(
                "different probe count {} vs {}",
                self.probes.len(),
                other.probes.len()
            ))
        } else {
            None
        };
        match reason {
            Some(reason) => Err(ExecDataError::Incompatible {
                id: self.id,
                name: self.name.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// In-memory collection of [`ExecutionData`] records keyed by class id.
///
/// A `BTreeMap` keeps iteration deterministic, which makes serialized
/// output canonical: re-serializing a loaded file is byte-stable.
#[derive(Debug, Default)]
pub struct ExecutionDataStore {
    entries: BTreeMap<i64, ExecutionData>,
}

impl ExecutionDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `data`, OR-merging with any record already stored under the
    /// same class id.
    pub fn put(&mut self, data: ExecutionData) -> Result<(), ExecDataError> {
        match self.entries.entry(data.id) {
            Entry::Vacant(slot) => {
                slot.insert(data);
                Ok(())
            }
            Entry::Occupied(mut slot) => slot.get_mut().merge(&data),
        }
    }

    pub fn get(&self, id: i64) -> Option<&ExecutionData> {
        self.entries.get(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records in ascending class-id order.
    pub fn contents(&self) -> impl Iterator<Item = &ExecutionData> {
        self.entries.values()
    }

    /// Writes every record through `writer`, in canonical order.
    pub fn accept<W: Write>(&self, writer: &mut ExecutionDataWriter<W>) -> io::Result<()> {
        for data in self.entries.values() {
            writer.write_execution_data(data)?;
        }
        Ok(())
    }
}

/// Collection of [`SessionInfo`] records ordered by dump timestamp.
///
/// All records are preserved - re-reading the same file appends its
/// sessions again, exactly as the underlying format does.
#[derive(Debug, Default)]
pub struct SessionInfoStore {
    infos: Vec<SessionInfo>,
}

impl SessionInfoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `info`, keeping the store sorted by dump timestamp.
    /// Records with equal timestamps keep their arrival order.
    pub fn visit(&mut self, info: SessionInfo) {
        let at = self.infos.partition_point(|s| s.dump <= info.dump);
        self.infos.insert(at, info);
    }

    pub fn infos(&self) -> &[SessionInfo] {
        &self.infos
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn accept<W: Write>(&self, writer: &mut ExecutionDataWriter<W>) -> io::Result<()> {
        for info in &self.infos {
            writer.write_session_info(info)?;
        }
        Ok(())
    }
}

/// Serializer for execution data streams.
///
/// The stream header is written on construction, so even an otherwise
/// empty output is a valid (empty) execution data file.
pub struct ExecutionDataWriter<W: Write> {
    out: W,
}

impl<W: Write> ExecutionDataWriter<W> {
    pub fn new(out: W) -> io::Result<Self> {
        let mut writer = Self { out };
        writer.write_header()?;
        Ok(writer)
    }

    fn write_header(&mut self) -> io::Result<()> {
        self.write_u8(BLOCK_HEADER)?;
        self.write_u16(MAGIC_NUMBER)?;
        self.write_u16(FORMAT_VERSION)
    }

    pub fn write_session_info(&mut self, info: &SessionInfo) -> io::Result<()> {
        self.write_u8(BLOCK_SESSION_INFO)?;
        self.write_utf(&info.id)?;
        self.write_i64(info.start)?;
        self.write_i64(info.dump)
    }

    pub fn write_execution_data(&mut self, data: &ExecutionData) -> io::Result<()> {
        self.write_u8(BLOCK_EXECUTION_DATA)?;
        self.write_i64(data.id)?;
        self.write_utf(&data.name)?;
        self.write_bool_array(&data.probes)
    }

    /// Hands back the underlying sink, e.g. to flush or close it.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_u8(&mut self, v: u8) -> io::Result<()> {
        self.out.write_all(&[v])
    }

    fn write_u16(&mut self, v: u16) -> io::Result<()> {
        self.out.write_all(&v.to_be_bytes())
    }

    fn write_i64(&mut self, v: i64) -> io::Result<()> {
        self.out.write_all(&v.to_be_bytes())
    }

    fn write_utf(&mut self, s: &str) -> io::Result<()> {
        let len = u16::try_from(s.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "string longer than 65535 bytes")
        })?;
        self.write_u16(len)?;
        self.out.write_all(s.as_bytes())
    }

    /// Unsigned LEB128-style varint: seven value bits per byte, high bit
    /// set on every byte but the last.
    fn write_var_int(&mut self, mut v: u32) -> io::Result<()> {
        while v & !0x7F != 0 {
            self.write_u8(0x80 | (v & 0x7F) as u8)?;
            v >>= 7;
        }
        self.write_u8(v as u8)
    }

    fn write_bool_array(&mut self, probes: &[bool]) -> io::Result<()> {
        self.write_var_int(probes.len() as u32)?;
        let mut buffer = 0u8;
        let mut bits = 0;
        for probe in probes {
            if *probe {
                buffer |= 1 << bits;
            }
            bits += 1;
            if bits == 8 {
                self.write_u8(buffer)?;
                buffer = 0;
                bits = 0;
            }
        }
        if bits > 0 {
            self.write_u8(buffer)?;
        }
        Ok(())
    }
}

/// Deserializer for execution data streams.
///
/// Feeds parsed records straight into the caller's stores. Parsing stops
/// cleanly at end of input on a block boundary; end of input anywhere
/// else is a truncation error.
pub struct ExecutionDataReader<R: Read> {
    input: R,
    header_seen: bool,
}

impl<R: Read> ExecutionDataReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            header_seen: false,
        }
    }

    /// Reads every block in the stream.
    ///
    /// Session records go to `sessions`, execution data to `store`
    /// (OR-merged on duplicate class ids). Any error leaves the stores
    /// with whatever was read so far; callers that need all-or-nothing
    /// semantics discard the accumulator on error.
    pub fn read(
        &mut self,
        sessions: &mut SessionInfoStore,
        store: &mut ExecutionDataStore,
    ) -> Result<(), ExecDataError> {
        while let Some(block) = self.read_block_type()? {
            match block {
                BLOCK_HEADER => self.read_header()?,
                BLOCK_SESSION_INFO => {
                    self.require_header()?;
                    sessions.visit(self.read_session_info()?);
                }
                BLOCK_EXECUTION_DATA => {
                    self.require_header()?;
                    store.put(self.read_execution_data()?)?;
                }
                other => return Err(ExecDataError::UnknownBlockType(other)),
            }
        }
        Ok(())
    }

    fn require_header(&self) -> Result<(), ExecDataError> {
        if self.header_seen {
            Ok(())
        } else {
            Err(ExecDataError::MissingHeader)
        }
    }

    fn read_header(&mut self) -> Result<(), ExecDataError> {
        let magic = self.read_u16()?;
        if magic != MAGIC_NUMBER {
            return Err(ExecDataError::InvalidMagic(magic));
        }
        let version = self.read_u16()?;
        if version != FORMAT_VERSION {
            return Err(ExecDataError::IncompatibleVersion {
                actual: version,
                expected: FORMAT_VERSION,
            });
        }
        self.header_seen = true;
        Ok(())
    }

    fn read_session_info(&mut self) -> Result<SessionInfo, ExecDataError> {
        let id = self.read_utf()?;
        let start = self.read_i64()?;
        let dump = self.read_i64()?;
        Ok(SessionInfo { id, start, dump })
    }

    fn read_execution_data(&mut self) -> Result<ExecutionData, ExecDataError> {
        let id = self.read_i64()?;
        let name = self.read_utf()?;
        let probes = self.read_bool_array()?;
        Ok(ExecutionData { id, name, probes })
    }

    /// Returns the next block tag, or `None` at a clean end of stream.
    fn read_block_type(&mut self) -> Result<Option<u8>, ExecDataError> {
        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<(), ExecDataError> {
        self.input.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                ExecDataError::Truncated
            } else {
                e.into()
            }
        })
    }

    fn read_u8(&mut self) -> Result<u8, ExecDataError> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> Result<u16, ExecDataError> {
        let mut buf = [0u8; 2];
        self.fill(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn read_i64(&mut self) -> Result<i64, ExecDataError> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }

    fn read_utf(&mut self) -> Result<String, ExecDataError> {
        let len = self.read_u16()? as usize;
        let mut buf = vec![0u8; len];
        self.fill(&mut buf)?;
        String::from_utf8(buf).map_err(|_| ExecDataError::InvalidUtf8)
    }

    fn read_var_int(&mut self) -> Result<u32, ExecDataError> {
        let mut value = 0u32;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            value |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift >= 32 {
                // More continuation bytes than a u32 can carry: the
                // stream is malformed, not short.
                return Err(ExecDataError::InvalidVarInt);
            }
        }
    }

    fn read_bool_array(&mut self) -> Result<Vec<bool>, ExecDataError> {
        let count = self.read_var_int()? as usize;
        let mut probes = Vec::with_capacity(count.min(1 << 20));
        let mut buffer = 0u8;
        for i in 0..count {
            if i % 8 == 0 {
                buffer = self.read_u8()?;
            }
            probes.push(buffer & (1 << (i % 8)) != 0);
        }
        Ok(probes)
    }
}
