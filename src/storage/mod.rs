pub mod certificates;
pub mod metadata;

pub use certificates::{
    ARCHIVE_PREFIX, CertificatePaths, SlotEntry, archive_current, cleanup_archive, ensure_layout,
    list_slots, save,
};
pub use metadata::{CertificateMetadata, METADATA_VERSION, load_metadata, save_metadata};
