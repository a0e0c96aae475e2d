//! Image metadata container (spec.md §4.6).
//!
//! Each image's directory tree is an opaque byte blob to the container
//! engine — parsing NTFS-style directory entries is a capture/apply
//! concern, out of scope per spec.md §1. What the engine owns is the
//! blob's identity (its LTE), whether it has been modified since load, and
//! a caller-supplied parsed-tree cache slot so repeated access doesn't
//! re-run an expensive external parse.

use crate::digest::Sha1Digest;

/// One image's metadata resource handle.
pub struct ImageMetadata {
    /// Hash of the metadata blob as currently stored (or last loaded).
    pub hash: Sha1Digest,
    /// Set once `mark_dirty` is called; a dirty image's metadata must be
    /// re-serialized and re-hashed before the next commit.
    dirty: bool,
    /// Opaque cache a `MetadataCollaborator` may stash a parsed
    /// representation in; the engine never inspects it.
    cache: Option<Box<dyn std::any::Any + Send>>,
}

impl ImageMetadata {
    pub fn new(hash: Sha1Digest) -> Self {
        Self {
            hash,
            dirty: false,
            cache: None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self, new_hash: Sha1Digest) {
        self.hash = new_hash;
        self.dirty = false;
    }

    pub fn set_cache(&mut self, cache: Box<dyn std::any::Any + Send>) {
        self.cache = Some(cache);
    }

    pub fn cache(&self) -> Option<&(dyn std::any::Any + Send)> {
        self.cache.as_deref()
    }

    pub fn invalidate_cache(&mut self) {
        self.cache = None;
    }
}

/// The seam a capture/apply crate implements against (spec.md §1, §4.6):
/// the container engine hands it opaque directory-tree bytes on read, and
/// asks it for fresh bytes to store on write. This crate's default
/// implementations below are sufficient for round-trip tests; a real
/// capture/apply layer would parse and rebuild an NTFS-style directory
/// tree instead.
pub trait MetadataCollaborator {
    /// Called with the freshly-decoded metadata resource bytes for one
    /// image.
    fn on_metadata_loaded(&mut self, image_index: u32, bytes: &[u8]);

    /// Called when the engine needs fresh bytes to store for one image.
    fn serialize_metadata(&mut self, image_index: u32) -> Vec<u8>;

    /// Called once an image's metadata write has committed. Lets a
    /// capture-side implementation report how many entries it could not
    /// reproduce (e.g. device nodes it lacked permission to recreate)
    /// without that count surfacing as a hard error (spec.md §7). Default
    /// is zero: the opaque-blob collaborators below never drop anything.
    fn finalize_image(&mut self, image_index: u32) -> u32 {
        let _ = image_index;
        0
    }
}

/// Metadata collaborator that stores and returns the raw bytes verbatim,
/// used by tests and by any caller that only needs opaque blob storage
/// without directory-tree semantics.
#[derive(Default)]
pub struct OpaqueMetadataStore {
    blobs: std::collections::HashMap<u32, Vec<u8>>,
}

impl MetadataCollaborator for OpaqueMetadataStore {
    fn on_metadata_loaded(&mut self, image_index: u32, bytes: &[u8]) {
        self.blobs.insert(image_index, bytes.to_vec());
    }

    fn serialize_metadata(&mut self, image_index: u32) -> Vec<u8> {
        self.blobs.get(&image_index).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::hash;

    #[test]
    fn dirty_tracking() {
        let mut m = ImageMetadata::new(hash(b"tree-v1"));
        assert!(!m.is_dirty());
        m.mark_dirty();
        assert!(m.is_dirty());
        m.clear_dirty(hash(b"tree-v2"));
        assert!(!m.is_dirty());
        assert_eq!(m.hash, hash(b"tree-v2"));
    }

    #[test]
    fn opaque_store_roundtrip() {
        let mut store = OpaqueMetadataStore::default();
        store.on_metadata_loaded(0, b"root/\0file.txt\0");
        assert_eq!(store.serialize_metadata(0), b"root/\0file.txt\0");
        assert_eq!(store.serialize_metadata(1), Vec::<u8>::new());
    }
}
