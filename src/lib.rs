//! # wimrs — Windows Imaging (WIM) container core
//!
//! Format guarantees:
//! - All numeric fields are little-endian; never negotiated.
//! - Every stream is identified by the SHA-1 of its uncompressed bytes;
//!   identical content is stored once and reference-counted.
//! - A resource's compression codec is a closed identity (`CodecId`), never
//!   a runtime-negotiated plugin.
//! - The header is always committed last on any write, so a file on disk
//!   is either the previous valid version or the new one — never a mix.
//!
//! Capture/apply adapters, a FUSE mount, and a CLI front-end are out of
//! scope; this crate is a library exposing the container format's read,
//! write, and overwrite-in-place operations.

pub mod chunk_pipeline;
pub mod codec;
pub mod digest;
pub mod error;
pub mod header;
pub mod integrity;
pub mod le;
pub mod lookup_table;
pub mod metadata;
pub mod planner;
pub mod reshdr;
pub mod resource;
pub mod wim;
pub mod xml_info;

pub use codec::{get_codec, Codec, CodecError, CodecId};
pub use digest::{hash, Sha1Digest, Sha1Hasher};
pub use error::{WimError, WimResult};
pub use header::{WimHeader, WimHeaderFlags};
pub use integrity::{CheckResult, IntegrityTable};
pub use lookup_table::{Lte, LookupTable, ResourceLocation};
pub use metadata::{ImageMetadata, MetadataCollaborator};
pub use planner::{WriteFlags, WriterConfig};
pub use reshdr::{ResourceHeader, ReshdrFlags};
pub use wim::Wim;
