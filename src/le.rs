//! Little-endian byte primitives.
//!
//! Every on-disk integer in the WIM format is little-endian regardless of
//! host byte order, and every structure is packed by explicit offset
//! arithmetic — never by casting a host struct onto a byte buffer.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

pub fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    r.read_u16::<LittleEndian>()
}

pub fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    r.read_u32::<LittleEndian>()
}

pub fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    r.read_u64::<LittleEndian>()
}

pub fn write_u16<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_u16::<LittleEndian>(v)
}

pub fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_u32::<LittleEndian>(v)
}

pub fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_u64::<LittleEndian>(v)
}

/// Pack a `u64` into a 7-byte little-endian field (the `reshdr.size_in_wim`
/// layout, spec.md §6). Values must fit in 56 bits.
pub fn pack_u56(v: u64) -> [u8; 7] {
    debug_assert!(v < (1u64 << 56), "size_in_wim {v} overflows 7-byte field");
    let full = v.to_le_bytes();
    let mut out = [0u8; 7];
    out.copy_from_slice(&full[..7]);
    out
}

/// Unpack a 7-byte little-endian field into a `u64`.
pub fn unpack_u56(b: &[u8; 7]) -> u64 {
    let mut full = [0u8; 8];
    full[..7].copy_from_slice(b);
    u64::from_le_bytes(full)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u56_roundtrip() {
        for v in [0u64, 1, 255, 65536, (1u64 << 56) - 1] {
            assert_eq!(unpack_u56(&pack_u56(v)), v);
        }
    }

    #[test]
    fn le_roundtrip() {
        let mut buf = Vec::new();
        write_u16(&mut buf, 0xbeef).unwrap();
        write_u32(&mut buf, 0xdead_beef).unwrap();
        write_u64(&mut buf, 0x1122_3344_5566_7788).unwrap();
        let mut cur = std::io::Cursor::new(buf);
        assert_eq!(read_u16(&mut cur).unwrap(), 0xbeef);
        assert_eq!(read_u32(&mut cur).unwrap(), 0xdead_beef);
        assert_eq!(read_u64(&mut cur).unwrap(), 0x1122_3344_5566_7788);
    }
}
