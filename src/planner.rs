//! Write planner / overwrite engine (spec.md §4.8).
//!
//! Two write paths:
//!
//! - [`write_new`] lays out a brand-new WIM: every resource has already
//!   been written to the output by the caller (the top-level `Wim` type),
//!   so this module's job is the tail of the file — lookup table, XML
//!   info, optional integrity table — and finally the header, patched at
//!   offset 0 *last*. A crash at any point before the header write leaves
//!   the previous header (absent, for a new file) or nothing at all;
//!   either way there is no half-valid file claiming to be complete.
//! - [`overwrite_in_place`] appends new/changed streams after the
//!   existing file's current end, writes a fresh lookup table and XML
//!   info resource after them, and only then overwrites the header at
//!   offset 0 — the existing header stays valid and points at the old,
//!   still-intact data until the new header is committed. If the caller
//!   requests [`WriteFlags::REBUILD`] (compaction needed to reclaim dead
//!   streams, or recompression), it truncates back to the header-only
//!   region first and proceeds as a fresh build from there instead of
//!   appending.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use bitflags::bitflags;
use fs2::FileExt;
use thiserror::Error;

use crate::header::{HeaderError, WimHeader, WimHeaderFlags};
use crate::integrity::{IntegrityError, IntegrityTable, DEFAULT_INTEGRITY_CHUNK_SIZE};
use crate::lookup_table::{LookupTable, LookupTableError};
use crate::reshdr::ReshdrFlags;
use crate::resource::ResourceError;
use crate::xml_info::{self, XmlInfoError};

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("header error: {0}")]
    Header(#[from] HeaderError),
    #[error("lookup table error: {0}")]
    LookupTable(#[from] LookupTableError),
    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),
    #[error("XML info error: {0}")]
    XmlInfo(#[from] XmlInfoError),
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),
    #[error("could not acquire advisory append lock on {path}: {source}")]
    LockFailed { path: String, source: io::Error },
}

bitflags! {
    /// Write-planner behavior flags (spec.md §6).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WriteFlags: u32 {
        const CHECK_INTEGRITY              = 0x0000_0001;
        const NO_CHECK_INTEGRITY           = 0x0000_0002;
        const PIPABLE                      = 0x0000_0004;
        const NOT_PIPABLE                  = 0x0000_0008;
        const RECOMPRESS                   = 0x0000_0010;
        const FSYNC                        = 0x0000_0020;
        const REBUILD                      = 0x0000_0040;
        const SOFT_DELETE                  = 0x0000_0080;
        const IGNORE_READONLY              = 0x0000_0100;
        const SKIP_EXTERNAL_WIMS           = 0x0000_0200;
        const RETAIN_GUID                  = 0x0000_0400;
        const PACK_STREAMS                 = 0x0000_0800;
        const SEND_DONE_WITH_FILE_MESSAGES = 0x0000_1000;
    }
}

/// Per-write configuration threaded through the planner, replacing any
/// process-wide default (spec.md §9 design notes flag global mutable
/// compression state as a re-architecture target).
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub codec_id: crate::codec::CodecId,
    pub chunk_size: u32,
    pub compression_level: i32,
    pub flags: WriteFlags,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            codec_id: crate::codec::CodecId::Lzx,
            chunk_size: 32768,
            compression_level: 6,
            flags: WriteFlags::CHECK_INTEGRITY,
        }
    }
}

/// Everything the planner needs beyond stream bodies (already written by
/// the caller) to close out a WIM file.
pub struct WritePlan<'a> {
    pub lookup_table: &'a LookupTable,
    pub xml_info: &'a str,
    pub image_count: u32,
    pub boot_index: u32,
    pub guid: [u8; 16],
}

fn codec_flag_for(config: &WriterConfig) -> WimHeaderFlags {
    WimHeader::codec_flag(config.codec_id)
}

/// Write the lookup table, XML info, optional integrity table, and header
/// for a brand-new WIM whose resource bodies are already present in `w`
/// up to the current position. Returns the committed header.
pub fn write_new<W: Write + Read + Seek>(
    w: &mut W,
    config: &WriterConfig,
    plan: &WritePlan,
) -> Result<WimHeader, PlannerError> {
    // Caller has already written all resource bodies starting right after
    // the header region; reserve that region now if we're at offset 0.
    if w.stream_position()? == 0 {
        w.write_all(&[0u8; crate::header::HEADER_SIZE])?;
    }

    let lookup_table_start = w.stream_position()?;
    plan.lookup_table.write_sorted(w)?;

    let xml_start = w.stream_position()?;
    xml_info::write(w, plan.xml_info)?;
    let xml_end = w.stream_position()?;

    let mut header = WimHeader::new(config.chunk_size, codec_flag_for(config));
    header.guid = plan.guid;
    header.image_count = plan.image_count;
    header.boot_index = plan.boot_index;
    header.part_number = 1;
    header.total_parts = 1;
    header.offset_table_reshdr = crate::reshdr::ResourceHeader {
        offset_in_wim: lookup_table_start,
        size_in_wim: xml_start - lookup_table_start,
        uncompressed_size: xml_start - lookup_table_start,
        flags: ReshdrFlags::empty(),
    };
    header.xml_data_reshdr = crate::reshdr::ResourceHeader {
        offset_in_wim: xml_start,
        size_in_wim: xml_end - xml_start,
        uncompressed_size: xml_end - xml_start,
        flags: ReshdrFlags::empty(),
    };

    if config.flags.contains(WriteFlags::PIPABLE) {
        header.pipable = true;
        header.flags |= WimHeaderFlags::PIPABLE;
    }

    if config.flags.contains(WriteFlags::CHECK_INTEGRITY)
        && !config.flags.contains(WriteFlags::NO_CHECK_INTEGRITY)
    {
        let integrity_start = w.stream_position()?;
        let table = IntegrityTable::compute(
            w,
            crate::header::HEADER_SIZE as u64,
            integrity_start,
            DEFAULT_INTEGRITY_CHUNK_SIZE,
        )?;
        table.write(w)?;
        let integrity_end = w.stream_position()?;
        header.integrity_reshdr = crate::reshdr::ResourceHeader {
            offset_in_wim: integrity_start,
            size_in_wim: integrity_end - integrity_start,
            uncompressed_size: integrity_end - integrity_start,
            flags: ReshdrFlags::empty(),
        };
    }

    // Header committed last: every other structure in the file is already
    // durable by the time this write lands.
    w.seek(SeekFrom::Start(0))?;
    header.write(w)?;
    if config.flags.contains(WriteFlags::FSYNC) {
        w.flush()?;
    }

    Ok(header)
}

/// RAII advisory append lock (spec.md §4.8/§5, §2 item 13): held across
/// `overwrite_in_place`, released on every exit path including an early
/// return or panic during drop.
pub struct AppendLockGuard {
    /// An independent handle to the same file description, held only so
    /// the lock can be released without requiring the caller to keep a
    /// borrow alive across the writes the lock protects.
    file: File,
}

impl AppendLockGuard {
    pub fn acquire(file: &File, path: &Path) -> Result<Self, PlannerError> {
        file.try_lock_exclusive().map_err(|source| PlannerError::LockFailed {
            path: path.display().to_string(),
            source,
        })?;
        let handle = file.try_clone().map_err(|source| PlannerError::LockFailed {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self { file: handle })
    }
}

impl Drop for AppendLockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Position `file` for an in-place commit, write any pending resource
/// bodies via `write_bodies`, then commit a fresh lookup table / XML info
/// / header without rewriting unrelated regions. `path` is used only for
/// diagnostics in [`PlannerError::LockFailed`].
///
/// The positioning decision (append at EOF, or truncate back to the
/// header-only region) has to happen before the caller can know where to
/// put new resource bodies, which is why this takes a callback rather
/// than bytes the caller already wrote: `write_bodies` runs after the
/// lock is held and `file`'s position is settled, and is free to update
/// `lookup_table` with the resulting resource headers before this
/// function builds the plan and hands off to [`write_new`].
///
/// If `config.flags` requests [`WriteFlags::REBUILD`], `file` is
/// truncated to the header-only region first and the rest proceeds as a
/// full rebuild from there — used when the caller has determined
/// append-in-place would leave too much dead space (soft-deleted images,
/// recompression) to be worthwhile.
pub fn overwrite_in_place<F>(
    file: &mut File,
    path: &Path,
    config: &WriterConfig,
    lookup_table: &mut LookupTable,
    xml_info: &str,
    image_count: u32,
    boot_index: u32,
    guid: [u8; 16],
    write_bodies: F,
) -> Result<WimHeader, PlannerError>
where
    F: FnOnce(&mut File, &mut LookupTable) -> Result<(), PlannerError>,
{
    let _lock = AppendLockGuard::acquire(file, path)?;

    if config.flags.contains(WriteFlags::REBUILD) {
        file.set_len(crate::header::HEADER_SIZE as u64)?;
        file.seek(SeekFrom::Start(crate::header::HEADER_SIZE as u64))?;
    } else {
        file.seek(SeekFrom::End(0))?;
    }

    write_bodies(file, lookup_table)?;

    let plan = WritePlan {
        lookup_table,
        xml_info,
        image_count,
        boot_index,
        guid,
    };
    write_new(file, config, &plan)
}
