use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::directory::{self, WzDirEntry, WzDirectory};
use crate::header::{self, WzHeader};
use crate::reader::{self, WzCursor, WzReader};
use crate::util::crypto_constants::WzRegion;
use crate::util::version::{
    is_valid_wz_name, obfuscate_version_hash, version_hash, VersionCandidates,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open archive: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid archive header: {0}")]
    Header(#[from] header::Error),
    #[error("no version matched the archive (version header {version_header:#06X})")]
    VersionNotFound { version_header: u16 },
    #[error("binary reading error: {0}")]
    Reader(#[from] reader::Error),
    #[error("directory error: {0}")]
    Directory(#[from] directory::Error),
}

/// Encryption and dialect state resolved while opening an archive.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WzArchiveMeta {
    /// old dialect carries a 2-byte obfuscated version header, the 64-bit
    /// dialect does not
    pub has_version_header: bool,
    /// the obfuscated header value, 0 when absent
    pub version_header: u16,
    /// the resolved patch version, -1 when it could not be determined
    pub version: i32,
    /// hash seeding offset decryption
    pub version_hash: u32,
}

/// A parsed WZ archive: the header, the resolved encryption state and the
/// root directory. Deeper directories are decoded on demand through
/// [`WzArchive::directory_at`].
#[derive(Debug)]
pub struct WzArchive<T: AsRef<[u8]> = Mmap> {
    pub reader: Arc<WzReader<T>>,
    pub header: WzHeader,
    pub region: WzRegion,
    pub meta: WzArchiveMeta,
    pub root: WzDirectory,
}

impl WzArchive<Mmap> {
    /// Memory-map and parse the archive at `path`. `version` is the
    /// decimal patch version when known; omitted, it is brute forced.
    pub fn open<P>(path: P, region: WzRegion, version: Option<&str>) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path)?;
        let map = unsafe { Mmap::map(&file)? };

        Self::from_reader(WzReader::new(map).with_iv(region.iv()), region, version)
    }
}

impl<T: AsRef<[u8]>> WzArchive<T> {
    pub fn from_reader(
        reader: WzReader<T>,
        region: WzRegion,
        version: Option<&str>,
    ) -> Result<Self, Error> {
        let header = reader.read_header()?;
        log::debug!(
            "header valid, body_size={} body_offset={} copyright={:?}",
            header.body_size,
            header.body_offset,
            header.copyright
        );

        let reader = Arc::new(reader);
        let cursor = reader.cursor(header.body_offset);

        let (has_version_header, version_header) = detect_version_header(&cursor, &header)?;
        let dir_start = header.body_offset + if has_version_header { 2 } else { 0 };

        let (version, version_hash) = match version {
            Some(version) => resolve_user_version(
                &cursor,
                dir_start,
                has_version_header,
                version_header,
                version,
            ),
            None => brute_force_version(&cursor, dir_start, has_version_header, version_header)
                .ok_or(Error::VersionNotFound { version_header })?,
        };

        cursor.seek(dir_start);
        let root = WzDirectory::read_from(&cursor, version_hash)?;

        log::info!(
            "parsed archive: region={} version={} entries={}",
            region,
            version,
            root.entries.len()
        );

        Ok(WzArchive {
            reader,
            header,
            region,
            meta: WzArchiveMeta {
                has_version_header,
                version_header,
                version,
                version_hash,
            },
            root,
        })
    }

    /// Decode the directory stored at `data_offset`, the recursion step
    /// for `Dir` entries.
    pub fn directory_at(&self, data_offset: u32) -> Result<WzDirectory, Error> {
        let cursor = self.reader.cursor(self.header.body_offset);
        cursor.seek(data_offset as usize);

        WzDirectory::read_from(&cursor, self.meta.version_hash).map_err(Error::from)
    }
}

/// Decide whether the archive stores a version header at `body_offset`.
/// The cursor ends up right after the header when present, back at
/// `body_offset` when not.
fn detect_version_header(
    cursor: &WzCursor,
    header: &WzHeader,
) -> Result<(bool, u16), reader::Error> {
    cursor.seek(header.body_offset);
    let check = cursor.read_u16()?;

    // version headers are single-byte values
    if check > 0xFF {
        log::debug!("no version header (check value {check:#06X})");
        cursor.seek(header.body_offset);
        return Ok((false, 0));
    }

    // 0x80 doubles as the compressed-int escape marker, so decode it both
    // ways and keep the reading that looks like an entry count
    if check == 0x80 {
        cursor.seek(header.body_offset);
        let entry_count = cursor.read_wz_int()?;
        if entry_count > 0 && entry_count <= 0xFFFF {
            log::debug!("no version header (0x80 decodes as entry count {entry_count})");
            cursor.seek(header.body_offset);
            return Ok((false, 0));
        }
        cursor.seek(header.body_offset + 2);
    }

    log::debug!("version header {check:#06X}");
    Ok((true, check))
}

/// Hash a user-supplied version, falling back to brute force when it
/// contradicts the archive's version header. This never fails: if brute
/// force comes up empty too, the user's hash is used as given.
fn resolve_user_version(
    cursor: &WzCursor,
    dir_start: usize,
    has_version_header: bool,
    version_header: u16,
    version: &str,
) -> (i32, u32) {
    let hash = version_hash(version);

    if has_version_header && obfuscate_version_hash(hash) != version_header {
        log::warn!(
            "version {version} does not match the archive version header, trying brute force"
        );
        if let Some(found) = brute_force_version(cursor, dir_start, has_version_header, version_header)
        {
            return found;
        }
        log::warn!("brute force failed, keeping version {version}");
    }

    (version.parse().unwrap_or(-1), hash)
}

/// Walk the candidate version ranges until one decrypts the first
/// directory entry into something believable. The cursor position is
/// restored whatever the outcome.
fn brute_force_version(
    cursor: &WzCursor,
    dir_start: usize,
    has_version_header: bool,
    version_header: u16,
) -> Option<(i32, u32)> {
    let saved = cursor.pos();
    let mut found = None;

    for candidate in VersionCandidates::new(has_version_header) {
        let hash = version_hash(&candidate.to_string());

        // the header narrows the search before any decoding happens
        if has_version_header && obfuscate_version_hash(hash) != version_header {
            continue;
        }

        if probe_version(cursor, dir_start, hash) {
            log::info!("brute force matched version {candidate}");
            found = Some((candidate, hash));
            break;
        }
    }

    cursor.seek(saved);
    found
}

/// Try decoding the first directory entry under `hash`. A correct hash
/// yields a plausible entry count, an in-bounds data offset and a name
/// that survives the character-class check.
fn probe_version(cursor: &WzCursor, dir_start: usize, hash: u32) -> bool {
    cursor.seek(dir_start);

    let Ok(entry_count) = cursor.read_wz_int() else {
        return false;
    };
    if !(1..=1000).contains(&entry_count) {
        return false;
    }

    let Ok(Some(entry)) = WzDirEntry::read_from(cursor, hash, 0) else {
        return false;
    };

    (entry.data_offset as usize) < cursor.len() && is_valid_wz_name(&entry.name)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::directory::WzEntryKind;
    use crate::reader::{encrypt_offset, encrypt_wz_string, WzStringKind};
    use crate::util::crypto_constants::WZ_GMS_IV;
    use crate::util::WzKeyStream;

    const ARCHIVE_LEN: usize = 0x100;

    struct ArchiveBuilder {
        buf: Vec<u8>,
        key: WzKeyStream,
        body_offset: u32,
        hash: u32,
    }

    impl ArchiveBuilder {
        fn new(copyright: &str, iv: [u8; 4], version: &str) -> Self {
            let body_offset = (16 + copyright.len()) as u32;

            let mut buf = Vec::new();
            buf.extend_from_slice(b"PKG1");
            buf.extend_from_slice(&((ARCHIVE_LEN as u64) - u64::from(body_offset)).to_le_bytes());
            buf.extend_from_slice(&body_offset.to_le_bytes());
            buf.extend_from_slice(copyright.as_bytes());

            Self {
                buf,
                key: WzKeyStream::new(iv),
                body_offset,
                hash: version_hash(version),
            }
        }
        fn version_header(&mut self, version: &str) -> &mut Self {
            let obfuscated = obfuscate_version_hash(version_hash(version));
            self.buf.extend_from_slice(&obfuscated.to_le_bytes());
            self
        }
        fn count(&mut self, count: i32) -> &mut Self {
            self.buf.push(count as u8);
            self
        }
        fn entry(&mut self, tag: u8, name: &str, size: i32, checksum: i32, target: u32) -> &mut Self {
            self.buf.push(tag);
            self.buf.push(0x73);
            self.buf
                .extend(encrypt_wz_string(&mut self.key, name, WzStringKind::Ascii));
            self.buf.push(size as u8);
            self.buf.push(checksum as u8);
            let pos = self.buf.len() as u32;
            self.buf
                .extend(encrypt_offset(pos, self.body_offset, self.hash, target).to_le_bytes());
            self
        }
        fn finish(&mut self) -> Vec<u8> {
            assert!(self.buf.len() <= ARCHIVE_LEN);
            self.buf.resize(ARCHIVE_LEN, 0);
            std::mem::take(&mut self.buf)
        }
    }

    fn parse(
        buf: Vec<u8>,
        region: WzRegion,
        version: Option<&str>,
    ) -> Result<WzArchive<Vec<u8>>, Error> {
        WzArchive::from_reader(WzReader::new(buf).with_iv(region.iv()), region, version)
    }

    #[test]
    fn test_parse_with_user_version() {
        let mut builder = ArchiveBuilder::new("test", [0; 4], "83");
        builder
            .version_header("83")
            .count(2)
            .entry(0x03, "Character", 64, 10, 0x60)
            .entry(0x04, "base.img", 16, 5, 0x70);
        let archive = parse(builder.finish(), WzRegion::Classic, Some("83")).unwrap();

        assert_eq!(archive.header.body_offset, 20);
        assert_eq!(archive.header.copyright, "test");
        assert!(archive.meta.has_version_header);
        assert_eq!(archive.meta.version, 83);
        assert_eq!(archive.meta.version_hash, 1876);
        assert_eq!(archive.root.entries.len(), 2);
        assert_eq!(archive.root.entries[0].kind, WzEntryKind::Dir);
        assert_eq!(archive.root.entries[0].name, "Character");
        assert_eq!(archive.root.entries[0].data_offset, 0x60);
        assert_eq!(archive.root.entries[1].name, "base.img");
    }

    #[test]
    fn test_brute_force_with_version_header() {
        let mut builder = ArchiveBuilder::new("test", WZ_GMS_IV, "83");
        builder
            .version_header("83")
            .count(1)
            .entry(0x03, "Cash", 64, 10, 0x60);
        let archive = parse(builder.finish(), WzRegion::Gms, None).unwrap();

        assert_eq!(archive.meta.version, 83);
        assert_eq!(archive.meta.version_hash, version_hash("83"));
        assert_eq!(archive.root.entries[0].name, "Cash");
    }

    #[test]
    fn test_brute_force_without_version_header() {
        // 64-bit dialect: the directory starts right at the body
        let mut builder = ArchiveBuilder::new("", [0; 4], "777");
        builder.count(1).entry(0x03, "Cash", 64, 10, 0x60);
        let archive = parse(builder.finish(), WzRegion::Classic, None).unwrap();

        assert!(!archive.meta.has_version_header);
        assert_eq!(archive.meta.version, 777);
        assert_eq!(archive.meta.version_hash, 59192);
        assert_eq!(archive.root.entries[0].name, "Cash");
    }

    #[test]
    fn test_user_version_without_header_is_trusted() {
        let mut builder = ArchiveBuilder::new("", [0; 4], "777");
        builder.count(1).entry(0x03, "Cash", 64, 10, 0x60);
        let archive = parse(builder.finish(), WzRegion::Classic, Some("777")).unwrap();

        assert_eq!(archive.meta.version, 777);
        assert_eq!(archive.meta.version_hash, 59192);
    }

    #[test]
    fn test_mismatched_user_version_degrades_to_brute_force() {
        let mut builder = ArchiveBuilder::new("test", [0; 4], "83");
        builder
            .version_header("83")
            .count(1)
            .entry(0x03, "Cash", 64, 10, 0x60);
        // obf("100") != obf("83"), so the provided version is rejected and
        // brute force takes over
        let archive = parse(builder.finish(), WzRegion::Classic, Some("100")).unwrap();

        assert_eq!(archive.meta.version, 83);
        assert_eq!(archive.meta.version_hash, version_hash("83"));
    }

    #[test]
    fn test_failed_brute_force_keeps_user_version() {
        // entry name fails the name predicate under every candidate, so
        // brute force dries up and the user version stands
        let mut builder = ArchiveBuilder::new("test", [0; 4], "100");
        builder
            .version_header("83")
            .count(1)
            .entry(0x03, "!!!", 64, 10, 0x60);
        let archive = parse(builder.finish(), WzRegion::Classic, Some("100")).unwrap();

        assert_eq!(archive.meta.version, 100);
        assert_eq!(archive.meta.version_hash, version_hash("100"));
        assert_eq!(archive.root.entries[0].name, "!!!");
    }

    #[test]
    fn test_brute_force_exhaustion_is_an_error() {
        let mut builder = ArchiveBuilder::new("test", [0; 4], "83");
        builder
            .version_header("83")
            .count(1)
            .entry(0x03, "???", 64, 10, 0x60);

        assert!(matches!(
            parse(builder.finish(), WzRegion::Classic, None),
            Err(Error::VersionNotFound { .. })
        ));
    }

    #[test]
    fn test_detection_restores_position_without_header() {
        // first two body bytes read as 0x0301 > 0xFF: no version header
        let mut builder = ArchiveBuilder::new("", [0; 4], "777");
        builder.count(1).entry(0x03, "Cash", 64, 10, 0x60);
        let buf = builder.finish();

        let reader = WzReader::new(buf);
        let header = reader.read_header().unwrap();
        let cursor = reader.cursor(header.body_offset);

        let (has_header, value) = detect_version_header(&cursor, &header).unwrap();
        assert!(!has_header);
        assert_eq!(value, 0);
        assert_eq!(cursor.pos(), header.body_offset);
    }

    #[test]
    fn test_detection_0x80_as_entry_count() {
        // 0x80 followed by an i32 in (0, 0xFFFF]: a compressed entry
        // count, not a version header
        let mut buf = Vec::new();
        buf.extend_from_slice(b"PKG1");
        buf.extend_from_slice(&100u64.to_le_bytes());
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.push(0x80);
        buf.extend_from_slice(&0x3000_i32.to_le_bytes());
        buf.resize(64, 0);

        let reader = WzReader::new(buf);
        let header = reader.read_header().unwrap();
        let cursor = reader.cursor(header.body_offset);

        let (has_header, _) = detect_version_header(&cursor, &header).unwrap();
        assert!(!has_header);
        assert_eq!(cursor.pos(), 16);
    }

    #[test]
    fn test_detection_0x80_as_version_header() {
        // 0x80 whose compressed-int reading is implausible: treat it as a
        // version header and leave the cursor past it
        let mut buf = Vec::new();
        buf.extend_from_slice(b"PKG1");
        buf.extend_from_slice(&100u64.to_le_bytes());
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.push(0x80);
        buf.push(0x00);
        buf.extend_from_slice(&[0x00, 0x00, 0x10]); // i32 = 0x10000000
        buf.resize(64, 0);

        let reader = WzReader::new(buf);
        let header = reader.read_header().unwrap();
        let cursor = reader.cursor(header.body_offset);

        let (has_header, value) = detect_version_header(&cursor, &header).unwrap();
        assert!(has_header);
        assert_eq!(value, 0x80);
        assert_eq!(cursor.pos(), 18);
    }

    #[test]
    fn test_directory_at_recurses() {
        // root holds a Dir entry whose payload at 0x60 is another
        // directory with a single file
        let mut builder = ArchiveBuilder::new("test", [0; 4], "83");
        builder
            .version_header("83")
            .count(1)
            .entry(0x03, "Character", 64, 10, 0x60);
        builder.buf.resize(0x60, 0);
        builder.count(1).entry(0x04, "Hair.img", 32, 3, 0x90);
        let archive = parse(builder.finish(), WzRegion::Classic, Some("83")).unwrap();

        let child = archive.directory_at(archive.root.entries[0].data_offset).unwrap();

        assert_eq!(child.entries.len(), 1);
        assert_eq!(child.entries[0].kind, WzEntryKind::File);
        assert_eq!(child.entries[0].name, "Hair.img");
        assert_eq!(child.entries[0].data_offset, 0x90);
    }

    #[test]
    fn test_bad_magic_surfaces() {
        let mut builder = ArchiveBuilder::new("test", [0; 4], "83");
        builder.version_header("83").count(0);
        let mut buf = builder.finish();
        buf[0] = b'Q';

        assert!(matches!(
            parse(buf, WzRegion::Classic, None),
            Err(Error::Header(header::Error::BadMagic { .. }))
        ));
    }
}
