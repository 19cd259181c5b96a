//! Minimal classfile inspection.
//!
//! The agent core never rewrites bytecode itself, but it does need to
//! look *at* classfiles: a plausibility check before handing bytes to
//! the external instrumenter, and the declared interface names of a
//! class under redefinition for the generated-class heuristic. This
//! parser therefore stops after the interface table - fields, methods
//! and attributes are never touched.

use thiserror::Error;

/// `0xCAFEBABE`, the first four bytes of every classfile.
pub const MAGIC: u32 = 0xCAFE_BABE;

#[derive(Debug, Error)]
pub enum ClassFileError {
    #[error("unexpected end of classfile")]
    UnexpectedEof,
    #[error("invalid classfile magic: {0:#x}")]
    InvalidMagic(u32),
    #[error("invalid constant pool index: {0}")]
    InvalidConstantPoolIndex(u16),
    #[error("invalid constant pool tag: {0}")]
    InvalidConstantPoolTag(u8),
}

/// Checks that `bytes` starts with the classfile magic.
pub fn verify_magic(bytes: &[u8]) -> Result<(), ClassFileError> {
    let mut r = Reader::new(bytes);
    let magic = r.read_u4()?;
    if magic != MAGIC {
        return Err(ClassFileError::InvalidMagic(magic));
    }
    Ok(())
}

/// The header portion of a parsed classfile: everything up to and
/// including the interface table, with names resolved out of the
/// constant pool.
#[derive(Debug, Clone)]
pub struct ClassSummary {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    /// Internal name of the class itself.
    pub this_class: String,
    /// Internal name of the superclass; `None` for `java/lang/Object`.
    pub super_class: Option<String>,
    /// Internal names of the directly declared interfaces.
    pub interfaces: Vec<String>,
}

impl ClassSummary {
    pub fn parse(bytes: &[u8]) -> Result<Self, ClassFileError> {
        let mut r = Reader::new(bytes);
        let magic = r.read_u4()?;
        if magic != MAGIC {
            return Err(ClassFileError::InvalidMagic(magic));
        }

        let minor_version = r.read_u2()?;
        let major_version = r.read_u2()?;

        let pool = parse_constant_pool(&mut r)?;

        let access_flags = r.read_u2()?;
        let this_class = pool.class_name(r.read_u2()?)?.to_string();
        let super_index = r.read_u2()?;
        let super_class = if super_index == 0 {
            None
        } else {
            Some(pool.class_name(super_index)?.to_string())
        };

        let interfaces_count = r.read_u2()?;
        let mut interfaces = Vec::with_capacity(interfaces_count as usize);
        for _ in 0..interfaces_count {
            interfaces.push(pool.class_name(r.read_u2()?)?.to_string());
        }

        Ok(Self {
            minor_version,
            major_version,
            access_flags,
            this_class,
            super_class,
            interfaces,
        })
    }
}

/// Constant pool entries the summary needs. Every other entry kind is
/// scanned past and recorded as `Skipped` so indices stay aligned.
#[derive(Debug, Clone)]
enum CpEntry {
    Utf8(String),
    Class { name_index: u16 },
    Skipped,
}

#[derive(Debug)]
struct ConstantPool {
    entries: Vec<Option<CpEntry>>,
}

impl ConstantPool {
    fn get(&self, index: u16) -> Result<&CpEntry, ClassFileError> {
        if index == 0 {
            return Err(ClassFileError::InvalidConstantPoolIndex(index));
        }
        self.entries
            .get(index as usize)
            .and_then(|e| e.as_ref())
            .ok_or(ClassFileError::InvalidConstantPoolIndex(index))
    }

    fn get_utf8(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            CpEntry::Utf8(s) => Ok(s.as_str()),
            _ => Err(ClassFileError::InvalidConstantPoolIndex(index)),
        }
    }

    fn class_name(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            CpEntry::Class { name_index } => self.get_utf8(*name_index),
            _ => Err(ClassFileError::InvalidConstantPoolIndex(index)),
        }
    }
}

fn parse_constant_pool(r: &mut Reader) -> Result<ConstantPool, ClassFileError> {
    let count = r.read_u2()? as usize;
    let mut entries: Vec<Option<CpEntry>> = Vec::with_capacity(count);
    entries.push(None); // index 0 is unused

    let mut i = 1;
    while i < count {
        let tag = r.read_u1()?;
        let entry = match tag {
            1 => {
                let len = r.read_u2()? as usize;
                let bytes = r.read_bytes(len)?;
                CpEntry::Utf8(String::from_utf8_lossy(bytes).to_string())
            }
            7 => CpEntry::Class {
                name_index: r.read_u2()?,
            },
            // Long and Double occupy two pool slots.
            5 | 6 => {
                r.read_bytes(8)?;
                entries.push(Some(CpEntry::Skipped));
                entries.push(None);
                i += 2;
                continue;
            }
            // String, MethodType, Module, Package
            8 | 16 | 19 | 20 => {
                r.read_bytes(2)?;
                CpEntry::Skipped
            }
            // Integer, Float, refs, NameAndType, Dynamic, InvokeDynamic
            3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => {
                r.read_bytes(4)?;
                CpEntry::Skipped
            }
            15 => {
                r.read_bytes(3)?;
                CpEntry::Skipped
            }
            _ => return Err(ClassFileError::InvalidConstantPoolTag(tag)),
        };

        entries.push(Some(entry));
        i += 1;
    }

    Ok(ConstantPool { entries })
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn read_u1(&mut self) -> Result<u8, ClassFileError> {
        if self.remaining() < 1 {
            return Err(ClassFileError::UnexpectedEof);
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn read_u2(&mut self) -> Result<u16, ClassFileError> {
        if self.remaining() < 2 {
            return Err(ClassFileError::UnexpectedEof);
        }
        let v = u16::from_be_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    fn read_u4(&mut self) -> Result<u32, ClassFileError> {
        if self.remaining() < 4 {
            return Err(ClassFileError::UnexpectedEof);
        }
        let v = u32::from_be_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(v)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ClassFileError> {
        if self.remaining() < len {
            return Err(ClassFileError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}
