//! In-place editing of ISO 9660 filesystems in raw CD-ROM XA images.
//!
//! [`DiscImage`] parses an image into an ordered layout of regions (system
//! area, volume descriptors, path tables, directories, files and free space),
//! replaces file contents with [`DiscImage::patch`], relocating other regions
//! if a file outgrows its extent, and keeps every directory record, path
//! table and volume descriptor consistent with the new layout.
//!
//! ```no_run
//! use std::fs::File;
//! use xapatch_fs::{DiscImage, Patch};
//!
//! # fn main() -> Result<(), xapatch_fs::CdError> {
//! let mut file = File::open("game.bin")?;
//! let mut image = DiscImage::open(&mut file)?;
//! image.patch(vec![Patch::data("cdrom:\\SYSTEM.CNF;1", b"BOOT = cdrom:\\MAIN.EXE;1".to_vec())])?;
//! image.write(File::create("patched.bin")?)?;
//! # Ok(())
//! # }
//! ```

pub mod date;
pub mod image;
pub mod manifest;
pub mod region;
pub mod settings;

pub use image::{DirectoryEntry, DiscImage, Patch, patch_image_file};
pub use manifest::{ManifestEntry, PatchManifest};
pub use region::{Region, RegionId, RegionKind, RegionType};
pub use settings::{ImageOptions, load_options, save_options};
pub use xapatch_core::{CdError, ErrorKind};

#[cfg(test)]
#[path = "tests/fixture.rs"]
pub(crate) mod fixture;
