pub mod archive;
pub mod directory;
pub mod header;
pub mod property;
pub mod reader;
pub mod util;

pub use archive::{WzArchive, WzArchiveMeta};
pub use directory::{WzDirEntry, WzDirectory, WzEntryKind, MAX_REFERENCE_DEPTH};
pub use header::{WzHeader, WZ_MAGIC};
pub use property::{WzPropertyKind, EXTENDED_PROPERTY_TAG};
pub use reader::{
    decrypt_offset, encrypt_offset, encrypt_wz_string, WzCursor, WzReader, WzStringKind,
};
pub use util::crypto_constants::{UnknownRegion, WzRegion};
pub use util::key_stream::WzKeyStream;
pub use util::version::{is_valid_wz_name, obfuscate_version_hash, version_hash};
