//! Error taxonomy (spec.md §7).
//!
//! Each module owns a `thiserror`-derived error enum for the failures it can
//! produce; [`WimError`] aggregates them at the crate boundary so public
//! entry points return one type. This follows the teacher's per-module
//! error style (`SuperblockError`, `CodecError`, `CryptoError`) rather than
//! one flat enum with every variant mixed together.

use std::io;

use thiserror::Error;

use crate::codec::CodecError;
use crate::header::HeaderError;
use crate::integrity::IntegrityError;
use crate::lookup_table::LookupTableError;
use crate::planner::PlannerError;
use crate::resource::ResourceError;

#[derive(Error, Debug)]
pub enum WimError {
    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    LookupTable(#[from] LookupTableError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("stream not found for hash {0}")]
    StreamNotFound(crate::digest::Sha1Digest),

    #[error("image index {0} out of range (image_count={1})")]
    ImageIndexOutOfRange(u32, u32),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type WimResult<T> = Result<T, WimError>;
