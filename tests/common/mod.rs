//! Shared helpers: handcrafted classfile bytes for transformer and
//! parser tests.

#![allow(dead_code)]

pub struct CpBuilder {
    entries: Vec<Vec<u8>>,
}

impl CpBuilder {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn push(&mut self, entry: Vec<u8>) -> u16 {
        self.entries.push(entry);
        self.entries.len() as u16
    }

    pub fn utf8(&mut self, s: &str) -> u16 {
        let mut entry = Vec::new();
        entry.push(1);
        entry.extend_from_slice(&(s.len() as u16).to_be_bytes());
        entry.extend_from_slice(s.as_bytes());
        self.push(entry)
    }

    pub fn class(&mut self, name_index: u16) -> u16 {
        let mut entry = Vec::new();
        entry.push(7);
        entry.extend_from_slice(&name_index.to_be_bytes());
        self.push(entry)
    }

    pub fn long(&mut self, value: i64) -> u16 {
        let mut entry = Vec::new();
        entry.push(5);
        entry.extend_from_slice(&value.to_be_bytes());
        let index = self.push(entry);
        // Long takes two constant pool slots.
        self.entries.push(Vec::new());
        index
    }

    /// Writes the constant pool count and entries.
    pub fn emit_into(&self, out: &mut Vec<u8>) {
        u2(out, self.entries.len() as u16 + 1);
        for entry in &self.entries {
            out.extend_from_slice(entry);
        }
    }
}

pub fn u2(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// A minimal but complete classfile: public class `this_name` extending
/// `java/lang/Object` and declaring `interfaces` (internal names).
pub fn class_bytes(this_name: &str, interfaces: &[&str]) -> Vec<u8> {
    let mut cp = CpBuilder::new();
    let this_utf8 = cp.utf8(this_name);
    let this_class = cp.class(this_utf8);
    let super_utf8 = cp.utf8("java/lang/Object");
    let super_class = cp.class(super_utf8);
    let iface_indices: Vec<u16> = interfaces
        .iter()
        .map(|name| {
            let utf8 = cp.utf8(name);
            cp.class(utf8)
        })
        .collect();

    let mut out = Vec::new();
    out.extend_from_slice(&0xCAFEBABE_u32.to_be_bytes());
    u2(&mut out, 0); // minor
    u2(&mut out, 52); // major (Java 8)
    cp.emit_into(&mut out);
    u2(&mut out, 0x0021); // ACC_PUBLIC | ACC_SUPER
    u2(&mut out, this_class);
    u2(&mut out, super_class);
    u2(&mut out, iface_indices.len() as u16);
    for index in iface_indices {
        u2(&mut out, index);
    }
    u2(&mut out, 0); // fields
    u2(&mut out, 0); // methods
    u2(&mut out, 0); // attributes
    out
}
