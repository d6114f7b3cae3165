//! Raw sector model for CD-ROM XA disc images.
//!
//! This crate knows about sectors and streams of sectors only: the sync
//! header, BCD addressing, Mode 1 / Mode 2 layouts, the XA sub-header and the
//! error detection code. Filesystem structures are built on top of it by
//! `xapatch-fs`.

use std::io::{Read, Seek};

pub mod disc;
pub mod error;
pub mod sector;

pub use disc::{Disc, EdcFailure};
pub use error::{CdError, ErrorKind};
pub use sector::{
    CodingInfo, FORM1_DATA_SIZE, FORM2_DATA_SIZE, Form, Mode, Msf, SECTOR_SIZE, SYNC_PATTERN,
    Sector, SubMode,
};

/// A reader that implements both Read and Seek.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}
