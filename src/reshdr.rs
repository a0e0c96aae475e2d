//! Resource header (`reshdr`) — fixed 24-byte on-disk descriptor of one
//! stored resource (spec.md §3, §6 "Reshdr on-disk encoding").
//!
//! ```text
//! Offset  Size  Field
//!    0      7   size_in_wim        on-disk (compressed) size, LE u56
//!    7      1   flags              bitset, see ReshdrFlags
//!    8      8   offset_in_wim      LE u64
//!   16      8   uncompressed_size  LE u64
//! ```

use std::io::{self, Read, Write};

use bitflags::bitflags;

use crate::le::{pack_u56, unpack_u56};

pub const RESHDR_SIZE: usize = 24;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ReshdrFlags: u8 {
        const FREE       = 0x01;
        const METADATA   = 0x02;
        const COMPRESSED = 0x04;
        const SPANNED    = 0x08;
        const PACKED     = 0x10;
    }
}

/// Fixed record describing one stored resource (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceHeader {
    pub offset_in_wim: u64,
    pub size_in_wim: u64,
    pub uncompressed_size: u64,
    pub flags: ReshdrFlags,
}

impl ResourceHeader {
    pub fn is_compressed(&self) -> bool {
        self.flags.contains(ReshdrFlags::COMPRESSED)
    }

    pub fn is_metadata(&self) -> bool {
        self.flags.contains(ReshdrFlags::METADATA)
    }

    pub fn is_packed(&self) -> bool {
        self.flags.contains(ReshdrFlags::PACKED)
    }

    pub fn is_free(&self) -> bool {
        self.flags.contains(ReshdrFlags::FREE)
    }

    /// Write the bit-exact 24-byte on-disk form.
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut buf = [0u8; RESHDR_SIZE];
        buf[0..7].copy_from_slice(&pack_u56(self.size_in_wim));
        buf[7] = self.flags.bits();
        buf[8..16].copy_from_slice(&self.offset_in_wim.to_le_bytes());
        buf[16..24].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        w.write_all(&buf)
    }

    /// Read and bit-exact-decode a 24-byte on-disk `reshdr`.
    ///
    /// Unknown flag bits are preserved via `from_bits_retain` rather than
    /// rejected — a future minor-version writer may set bits this reader
    /// doesn't act on, and rejecting outright would make every extension a
    /// breaking change.
    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; RESHDR_SIZE];
        r.read_exact(&mut buf)?;
        let size_field: [u8; 7] = buf[0..7].try_into().unwrap();
        let size_in_wim = unpack_u56(&size_field);
        let flags = ReshdrFlags::from_bits_retain(buf[7]);
        let offset_in_wim = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        let uncompressed_size = u64::from_le_bytes(buf[16..24].try_into().unwrap());
        Ok(Self {
            offset_in_wim,
            size_in_wim,
            uncompressed_size,
            flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_bit_exact() {
        let rh = ResourceHeader {
            offset_in_wim: 0x1122_3344_5566,
            size_in_wim: 0x00AA_BBCC_DDEE,
            uncompressed_size: 0x7FFF_FFFF_FFFF,
            flags: ReshdrFlags::COMPRESSED | ReshdrFlags::METADATA,
        };
        let mut buf = Vec::new();
        rh.write(&mut buf).unwrap();
        assert_eq!(buf.len(), RESHDR_SIZE);
        let back = ResourceHeader::read(&mut std::io::Cursor::new(&buf)).unwrap();
        assert_eq!(rh, back);
    }

    #[test]
    fn size_in_wim_is_7_bytes_not_8() {
        // A size that would overflow into byte 7 (the flags byte) must not
        // corrupt the flags field.
        let rh = ResourceHeader {
            offset_in_wim: 0,
            size_in_wim: (1u64 << 56) - 1,
            uncompressed_size: 0,
            flags: ReshdrFlags::FREE,
        };
        let mut buf = Vec::new();
        rh.write(&mut buf).unwrap();
        assert_eq!(buf[7], ReshdrFlags::FREE.bits());
        let back = ResourceHeader::read(&mut std::io::Cursor::new(&buf)).unwrap();
        assert_eq!(back.size_in_wim, rh.size_in_wim);
    }
}
