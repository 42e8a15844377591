//! Fixture builders for unit tests.
//!
//! Everything here writes bytes in an explicit byte order so each decoder can
//! be exercised on both host-order and foreign-order input.

#![allow(dead_code)]

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use crate::macho::*;

/// Offset at which [`MachOBuilder::add_data`] places its first blob.
pub const DATA_START: u32 = 0x800;

// =============================================================================
// Writer
// =============================================================================

/// An endian-aware byte buffer.
#[derive(Debug, Clone)]
pub struct Writer {
    buf: Vec<u8>,
    big_endian: bool,
}

impl Writer {
    pub fn new(big_endian: bool) -> Self {
        Self {
            buf: Vec::new(),
            big_endian,
        }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        if self.big_endian {
            self.buf.write_u16::<BigEndian>(v).unwrap();
        } else {
            self.buf.write_u16::<LittleEndian>(v).unwrap();
        }
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        if self.big_endian {
            self.buf.write_u32::<BigEndian>(v).unwrap();
        } else {
            self.buf.write_u32::<LittleEndian>(v).unwrap();
        }
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        if self.big_endian {
            self.buf.write_u64::<BigEndian>(v).unwrap();
        } else {
            self.buf.write_u64::<LittleEndian>(v).unwrap();
        }
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    /// Writes a NUL-padded fixed 16-byte name.
    pub fn name16(&mut self, name: &str) -> &mut Self {
        let mut raw = [0u8; 16];
        raw[..name.len()].copy_from_slice(name.as_bytes());
        self.bytes(&raw)
    }

    /// Writes a NUL-terminated string.
    pub fn c_str(&mut self, s: &str) -> &mut Self {
        self.bytes(s.as_bytes()).u8(0)
    }

    pub fn align(&mut self, to: usize) -> &mut Self {
        while self.buf.len() % to != 0 {
            self.buf.push(0);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

/// Encodes an unsigned LEB128 value.
pub fn uleb(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            return out;
        }
    }
}

/// Encodes a signed LEB128 value.
pub fn sleb(mut value: i64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        out.push(if done { byte } else { byte | 0x80 });
        if done {
            return out;
        }
    }
}

// =============================================================================
// Mach-O Builder
// =============================================================================

/// A section description for [`MachOBuilder::segment`].
#[derive(Debug, Clone, Copy)]
pub struct SectionSpec {
    pub name: &'static str,
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
}

/// Assembles a Mach-O image: header, load commands, then link-edit blobs
/// starting at [`DATA_START`].
#[derive(Debug, Clone)]
pub struct MachOBuilder {
    big_endian: bool,
    is_64: bool,
    cputype: u32,
    filetype: u32,
    commands: Vec<Vec<u8>>,
    data: Vec<u8>,
}

impl MachOBuilder {
    pub fn new(big_endian: bool, is_64: bool) -> Self {
        Self {
            big_endian,
            is_64,
            cputype: if is_64 { CPU_TYPE_ARM64 } else { CPU_TYPE_ARM },
            filetype: MH_EXECUTE,
            commands: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn filetype(mut self, filetype: u32) -> Self {
        self.filetype = filetype;
        self
    }

    pub fn writer(&self) -> Writer {
        Writer::new(self.big_endian)
    }

    /// Appends a blob to the data area and returns its file offset.
    pub fn add_data(&mut self, bytes: &[u8]) -> u32 {
        let offset = DATA_START + self.data.len() as u32;
        self.data.extend_from_slice(bytes);
        while self.data.len() % 8 != 0 {
            self.data.push(0);
        }
        offset
    }

    /// Appends a raw load command; `body` excludes the cmd/cmdsize pair.
    pub fn raw_command(&mut self, cmd: u32, body: &[u8]) -> &mut Self {
        let mut w = self.writer();
        w.u32(cmd).u32((8 + body.len()) as u32).bytes(body);
        self.commands.push(w.finish());
        self
    }

    pub fn segment(
        &mut self,
        name: &str,
        vmaddr: u64,
        vmsize: u64,
        fileoff: u64,
        filesize: u64,
        sections: &[SectionSpec],
    ) -> &mut Self {
        let mut w = self.writer();
        if self.is_64 {
            let cmdsize = SegmentCommand64::SIZE + sections.len() * Section64::SIZE;
            w.u32(LC_SEGMENT_64).u32(cmdsize as u32).name16(name);
            w.u64(vmaddr).u64(vmsize).u64(fileoff).u64(filesize);
            w.u32(7).u32(5).u32(sections.len() as u32).u32(0);
            for s in sections {
                w.name16(s.name).name16(name);
                w.u64(s.addr).u64(s.size).u32(s.offset).u32(2);
                w.u32(0).u32(0).u32(S_ATTR_PURE_INSTRUCTIONS).u32(0).u32(0).u32(0);
            }
        } else {
            let cmdsize = SegmentCommand32::SIZE + sections.len() * Section32::SIZE;
            w.u32(LC_SEGMENT).u32(cmdsize as u32).name16(name);
            w.u32(vmaddr as u32).u32(vmsize as u32).u32(fileoff as u32).u32(filesize as u32);
            w.u32(7).u32(5).u32(sections.len() as u32).u32(0);
            for s in sections {
                w.name16(s.name).name16(name);
                w.u32(s.addr as u32).u32(s.size as u32).u32(s.offset).u32(2);
                w.u32(0).u32(0).u32(S_ATTR_PURE_INSTRUCTIONS).u32(0).u32(0);
            }
        }
        self.commands.push(w.finish());
        self
    }

    pub fn symtab(&mut self, symoff: u32, nsyms: u32, stroff: u32, strsize: u32) -> &mut Self {
        let mut w = self.writer();
        w.u32(symoff).u32(nsyms).u32(stroff).u32(strsize);
        let body = w.finish();
        self.raw_command(LC_SYMTAB, &body)
    }

    /// Adds LC_DYLD_INFO_ONLY with (offset, size) pairs for rebase, bind,
    /// weak bind, lazy bind and export data.
    pub fn dyld_info(&mut self, ranges: [(u32, u32); 5]) -> &mut Self {
        let mut w = self.writer();
        for (off, size) in ranges {
            w.u32(off).u32(size);
        }
        let body = w.finish();
        self.raw_command(LC_DYLD_INFO_ONLY, &body)
    }

    pub fn linkedit(&mut self, cmd: u32, dataoff: u32, datasize: u32) -> &mut Self {
        let mut w = self.writer();
        w.u32(dataoff).u32(datasize);
        let body = w.finish();
        self.raw_command(cmd, &body)
    }

    pub fn dylib(&mut self, cmd: u32, name: &str, current: u32, compat: u32) -> &mut Self {
        let mut w = self.writer();
        w.u32(DylibCommand::SIZE as u32).u32(2).u32(current).u32(compat);
        w.c_str(name).align(8);
        let body = w.finish();
        self.raw_command(cmd, &body)
    }

    pub fn str_command(&mut self, cmd: u32, value: &str) -> &mut Self {
        let mut w = self.writer();
        w.u32(StrCommand::SIZE as u32).c_str(value).align(8);
        // Body starts after cmd/cmdsize, so the string sits at offset 12.
        let body = w.finish();
        self.raw_command(cmd, &body)
    }

    pub fn uuid(&mut self, uuid: [u8; 16]) -> &mut Self {
        self.raw_command(LC_UUID, &uuid)
    }

    pub fn main(&mut self, entryoff: u64) -> &mut Self {
        let mut w = self.writer();
        w.u64(entryoff).u64(0);
        let body = w.finish();
        self.raw_command(LC_MAIN, &body)
    }

    /// Serializes the image.
    pub fn build(&self) -> Vec<u8> {
        let sizeofcmds: usize = self.commands.iter().map(Vec::len).sum();
        let mut w = self.writer();
        w.u32(if self.is_64 { MH_MAGIC_64 } else { MH_MAGIC });
        w.u32(self.cputype).u32(0).u32(self.filetype);
        w.u32(self.commands.len() as u32).u32(sizeofcmds as u32);
        w.u32((HeaderFlags::DYLDLINK | HeaderFlags::PIE).bits());
        if self.is_64 {
            w.u32(0);
        }
        for cmd in &self.commands {
            w.bytes(cmd);
        }
        assert!(w.len() <= DATA_START as usize, "load commands overflow fixture layout");
        if !self.data.is_empty() {
            while w.len() < DATA_START as usize {
                w.u8(0);
            }
            w.bytes(&self.data);
        }
        w.finish()
    }
}

/// Serializes one nlist entry.
pub fn nlist(big_endian: bool, is_64: bool, strx: u32, n_type: u8, n_sect: u8, n_desc: u16, value: u64) -> Vec<u8> {
    let mut w = Writer::new(big_endian);
    w.u32(strx).u8(n_type).u8(n_sect).u16(n_desc);
    if is_64 {
        w.u64(value);
    } else {
        w.u32(value as u32);
    }
    w.finish()
}

// =============================================================================
// Code Signature Blobs (always big-endian)
// =============================================================================

/// Wraps `payload` in a generic blob header.
pub fn blob(magic: u32, payload: &[u8]) -> Vec<u8> {
    let mut w = Writer::new(true);
    w.u32(magic).u32((8 + payload.len()) as u32).bytes(payload);
    w.finish()
}

/// Builds a super blob from `(slot type, blob bytes)` pairs.
pub fn super_blob(magic: u32, entries: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let header_len = 12 + entries.len() * 8;
    let total: usize = header_len + entries.iter().map(|(_, b)| b.len()).sum::<usize>();

    let mut w = Writer::new(true);
    w.u32(magic).u32(total as u32).u32(entries.len() as u32);
    let mut offset = header_len;
    for (ty, bytes) in entries {
        w.u32(*ty).u32(offset as u32);
        offset += bytes.len();
    }
    for (_, bytes) in entries {
        w.bytes(bytes);
    }
    w.finish()
}

/// Builds a version 0x20400 code directory with `hashes.len()` code slots
/// and `special.len()` special slots (stored in reverse order before the
/// code slot hashes, as codesign does).
pub fn code_directory(identifier: &str, team: Option<&str>, special: &[[u8; 32]], hashes: &[[u8; 32]]) -> Vec<u8> {
    const HEADER: usize = 88;
    let ident_offset = HEADER;
    let team_offset = ident_offset + identifier.len() + 1;
    let hash_base = team_offset + team.map_or(0, |t| t.len() + 1);
    let hash_offset = hash_base + special.len() * 32;
    let length = hash_offset + hashes.len() * 32;

    let mut w = Writer::new(true);
    w.u32(0xfade0c02).u32(length as u32).u32(0x20400).u32(0x0001_0000);
    w.u32(hash_offset as u32).u32(ident_offset as u32);
    w.u32(special.len() as u32).u32(hashes.len() as u32);
    w.u32((hashes.len() * 0x1000) as u32);
    w.u8(32).u8(2).u8(0).u8(12).u32(0);
    // scatter, team, spare3, codeLimit64
    w.u32(0).u32(if team.is_some() { team_offset as u32 } else { 0 }).u32(0).u64(0);
    // execSegBase, execSegLimit, execSegFlags
    w.u64(0).u64(0x4000).u64(1);
    assert_eq!(w.len(), HEADER);
    w.c_str(identifier);
    if let Some(team) = team {
        w.c_str(team);
    }
    for slot in special.iter().rev() {
        w.bytes(slot);
    }
    for hash in hashes {
        w.bytes(hash);
    }
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leb_encoders() {
        assert_eq!(uleb(624485), vec![0xE5, 0x8E, 0x26]);
        assert_eq!(sleb(-128), vec![0x80, 0x7F]);
        assert_eq!(sleb(63), vec![0x3F]);
        assert_eq!(sleb(64), vec![0xC0, 0x00]);
    }
}
