//! XML info blob (spec.md §3; schema internals out of scope per spec.md
//! §1). The engine treats this resource as an opaque byte range: it
//! stores and retrieves it verbatim, encoded as UTF-16LE with a leading
//! byte-order mark, which is the on-disk convention WIM readers expect.

use std::io::{self, Read, Write};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlInfoError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("XML info blob has odd byte length, not valid UTF-16LE")]
    OddLength,
}

const BOM: [u8; 2] = [0xff, 0xfe];

/// Encode `text` as a UTF-16LE blob with a leading BOM, the format the XML
/// info resource is stored in.
pub fn encode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() * 2 + 2);
    out.extend_from_slice(&BOM);
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Decode a UTF-16LE (optionally BOM-prefixed) blob back to a `String`.
/// Invalid UTF-16 sequences are replaced with U+FFFD rather than causing a
/// hard failure — the engine never interprets this blob's schema, so a
/// best-effort decode is enough to show it to a caller.
pub fn decode(blob: &[u8]) -> Result<String, XmlInfoError> {
    if blob.len() % 2 != 0 {
        return Err(XmlInfoError::OddLength);
    }
    let mut units: Vec<u16> = blob
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    if units.first() == Some(&u16::from_le_bytes(BOM)) {
        units.remove(0);
    }
    Ok(String::from_utf16_lossy(&units))
}

pub fn write<W: Write>(w: &mut W, text: &str) -> Result<(), XmlInfoError> {
    w.write_all(&encode(text))?;
    Ok(())
}

pub fn read<R: Read>(r: &mut R, len: usize) -> Result<String, XmlInfoError> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    decode(&buf)
}
