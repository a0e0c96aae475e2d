//! WIM header (spec.md §3, §6) — the 208-byte anchor at offset 0 (and, for
//! pipable WIMs, repeated at the end of the stream — spec.md §9 / §2 item
//! 12).
//!
//! ```text
//! Offset  Size  Field
//!    0      8   magic              "MSWIM\0\0\0" or "WLPWM\0\0\0" (pipable)
//!    8      4   header_size        always HEADER_SIZE
//!   12      4   version
//!   16      4   flags              WimHeaderFlags, includes codec id in low bits
//!   20      4   chunk_size
//!   24     16   guid
//!   40      2   part_number
//!   42      2   total_parts
//!   44      4   image_count
//!   48     24   offset_table_reshdr
//!   72     24   xml_data_reshdr
//!   96     24   boot_metadata_reshdr
//!  120     24   integrity_reshdr
//!  144      4   boot_index
//!  148      4   reserved
//!  152     56   reserved
//! ```

use std::io::{self, Read, Write};

use bitflags::bitflags;
use thiserror::Error;
use uuid::Uuid;

use crate::reshdr::{ResourceHeader, RESHDR_SIZE};

pub const HEADER_SIZE: usize = 208;
pub const MAGIC_NORMAL: [u8; 8] = *b"MSWIM\0\0\0";
pub const MAGIC_PIPABLE: [u8; 8] = *b"WLPWM\0\0\0";
pub const CURRENT_VERSION: u32 = 0x0001_0d00;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("not a WIM file: bad magic {0:02x?}")]
    BadMagic([u8; 8]),
    #[error("unsupported header size {0}, expected {HEADER_SIZE}")]
    BadHeaderSize(u32),
    #[error("header declares codec id {0}, which is not a recognized compression type")]
    BadCodecId(u8),
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WimHeaderFlags: u32 {
        const COMPRESSION    = 0x0000_0002;
        const READONLY       = 0x0000_0004;
        const SPANNED        = 0x0000_0008;
        const RESOURCE_ONLY  = 0x0000_0010;
        const METADATA_ONLY  = 0x0000_0020;
        const WRITE_IN_PROGRESS = 0x0000_0040;
        const RP_FIX         = 0x0000_0080;
        const PIPABLE        = 0x0000_0400;
        /// Low three bits of the codec nibble, spec.md §6.
        const CODEC_XPRESS   = 0x0002_0000;
        const CODEC_LZX      = 0x0004_0000;
        const CODEC_LZMS     = 0x0008_0000;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WimHeader {
    pub pipable: bool,
    pub version: u32,
    pub flags: WimHeaderFlags,
    pub chunk_size: u32,
    pub guid: [u8; 16],
    pub part_number: u16,
    pub total_parts: u16,
    pub image_count: u32,
    pub offset_table_reshdr: ResourceHeader,
    pub xml_data_reshdr: ResourceHeader,
    pub boot_metadata_reshdr: ResourceHeader,
    pub integrity_reshdr: ResourceHeader,
    pub boot_index: u32,
}

impl WimHeader {
    pub fn new(chunk_size: u32, codec_flag: WimHeaderFlags) -> Self {
        Self {
            pipable: false,
            version: CURRENT_VERSION,
            flags: WimHeaderFlags::COMPRESSION | codec_flag,
            chunk_size,
            guid: *Uuid::new_v4().as_bytes(),
            part_number: 1,
            total_parts: 1,
            image_count: 0,
            offset_table_reshdr: ResourceHeader::default(),
            xml_data_reshdr: ResourceHeader::default(),
            boot_metadata_reshdr: ResourceHeader::default(),
            integrity_reshdr: ResourceHeader::default(),
            boot_index: 0,
        }
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<(), HeaderError> {
        let mut buf = [0u8; HEADER_SIZE];
        let magic = if self.pipable { MAGIC_PIPABLE } else { MAGIC_NORMAL };
        buf[0..8].copy_from_slice(&magic);
        buf[8..12].copy_from_slice(&(HEADER_SIZE as u32).to_le_bytes());
        buf[12..16].copy_from_slice(&self.version.to_le_bytes());
        buf[16..20].copy_from_slice(&self.flags.bits().to_le_bytes());
        buf[20..24].copy_from_slice(&self.chunk_size.to_le_bytes());
        buf[24..40].copy_from_slice(&self.guid);
        buf[40..42].copy_from_slice(&self.part_number.to_le_bytes());
        buf[42..44].copy_from_slice(&self.total_parts.to_le_bytes());
        buf[44..48].copy_from_slice(&self.image_count.to_le_bytes());

        let mut reshdr_buf = [0u8; RESHDR_SIZE];
        {
            let mut cur = io::Cursor::new(&mut reshdr_buf[..]);
            self.offset_table_reshdr.write(&mut cur)?;
        }
        buf[48..72].copy_from_slice(&reshdr_buf);
        {
            let mut cur = io::Cursor::new(&mut reshdr_buf[..]);
            self.xml_data_reshdr.write(&mut cur)?;
        }
        buf[72..96].copy_from_slice(&reshdr_buf);
        {
            let mut cur = io::Cursor::new(&mut reshdr_buf[..]);
            self.boot_metadata_reshdr.write(&mut cur)?;
        }
        buf[96..120].copy_from_slice(&reshdr_buf);
        {
            let mut cur = io::Cursor::new(&mut reshdr_buf[..]);
            self.integrity_reshdr.write(&mut cur)?;
        }
        buf[120..144].copy_from_slice(&reshdr_buf);

        buf[144..148].copy_from_slice(&self.boot_index.to_le_bytes());
        // bytes 148..208 remain zero (reserved).

        w.write_all(&buf)?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self, HeaderError> {
        let mut buf = [0u8; HEADER_SIZE];
        r.read_exact(&mut buf)?;

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&buf[0..8]);
        let pipable = match magic {
            MAGIC_NORMAL => false,
            MAGIC_PIPABLE => true,
            other => return Err(HeaderError::BadMagic(other)),
        };

        let header_size = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        if header_size as usize != HEADER_SIZE {
            return Err(HeaderError::BadHeaderSize(header_size));
        }

        let version = u32::from_le_bytes(buf[12..16].try_into().unwrap());
        let flags = WimHeaderFlags::from_bits_retain(u32::from_le_bytes(buf[16..20].try_into().unwrap()));
        let chunk_size = u32::from_le_bytes(buf[20..24].try_into().unwrap());
        let mut guid = [0u8; 16];
        guid.copy_from_slice(&buf[24..40]);
        let part_number = u16::from_le_bytes(buf[40..42].try_into().unwrap());
        let total_parts = u16::from_le_bytes(buf[42..44].try_into().unwrap());
        let image_count = u32::from_le_bytes(buf[44..48].try_into().unwrap());

        let offset_table_reshdr = ResourceHeader::read(&mut io::Cursor::new(&buf[48..72]))?;
        let xml_data_reshdr = ResourceHeader::read(&mut io::Cursor::new(&buf[72..96]))?;
        let boot_metadata_reshdr = ResourceHeader::read(&mut io::Cursor::new(&buf[96..120]))?;
        let integrity_reshdr = ResourceHeader::read(&mut io::Cursor::new(&buf[120..144]))?;

        let boot_index = u32::from_le_bytes(buf[144..148].try_into().unwrap());

        Ok(Self {
            pipable,
            version,
            flags,
            chunk_size,
            guid,
            part_number,
            total_parts,
            image_count,
            offset_table_reshdr,
            xml_data_reshdr,
            boot_metadata_reshdr,
            integrity_reshdr,
            boot_index,
        })
    }

    /// Which codec this header's flags select, per spec.md §6.
    pub fn codec_id(&self) -> Result<crate::codec::CodecId, HeaderError> {
        use crate::codec::CodecId;
        if self.flags.contains(WimHeaderFlags::CODEC_LZMS) {
            Ok(CodecId::Lzms)
        } else if self.flags.contains(WimHeaderFlags::CODEC_LZX) {
            Ok(CodecId::Lzx)
        } else if self.flags.contains(WimHeaderFlags::CODEC_XPRESS) {
            Ok(CodecId::Xpress)
        } else {
            Err(HeaderError::BadCodecId(0))
        }
    }

    pub fn codec_flag(id: crate::codec::CodecId) -> WimHeaderFlags {
        use crate::codec::CodecId;
        match id {
            CodecId::Xpress => WimHeaderFlags::CODEC_XPRESS,
            CodecId::Lzx => WimHeaderFlags::CODEC_LZX,
            CodecId::Lzms => WimHeaderFlags::CODEC_LZMS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecId;

    #[test]
    fn roundtrip_normal() {
        let h = WimHeader::new(32768, WimHeader::codec_flag(CodecId::Lzx));
        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
        let back = WimHeader::read(&mut std::io::Cursor::new(&buf)).unwrap();
        assert_eq!(back, h);
        assert_eq!(back.codec_id().unwrap(), CodecId::Lzx);
    }

    #[test]
    fn roundtrip_pipable() {
        let mut h = WimHeader::new(32768, WimHeader::codec_flag(CodecId::Lzms));
        h.pipable = true;
        h.flags |= WimHeaderFlags::PIPABLE;
        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        assert_eq!(&buf[0..8], &MAGIC_PIPABLE);
        let back = WimHeader::read(&mut std::io::Cursor::new(&buf)).unwrap();
        assert!(back.pipable);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(b"GARBAGE!");
        let err = WimHeader::read(&mut std::io::Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, HeaderError::BadMagic(_)));
    }
}
