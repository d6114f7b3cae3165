//! Regions: contiguous runs of sectors that belong to one filesystem structure.
//!
//! Every region lives in a [`RegionArena`] and is referred to by a stable
//! [`RegionId`]. The directory tree, the volume descriptor chain and the flat
//! start-ordered layout kept by [`crate::DiscImage`] all hold ids, never the
//! regions themselves, so a region can be resized in the layout while the
//! filesystem structures that reference it still find it.

pub mod directory;
pub mod file;
pub mod free;
pub mod path_table;
pub mod system_area;
pub mod volume;

use std::fmt;
use std::io::Write;
use std::ops::{Index, IndexMut};

use chrono::{DateTime, FixedOffset};
use xapatch_core::{CdError, Disc, Form, Mode, Sector, SubMode};

pub use directory::{Directory, RecordTarget};
pub use path_table::{Endian, PathTable};
pub use system_area::SystemArea;
pub use volume::{VolumeDescriptor, VolumeKind};

/// Stable handle to a region stored in a [`RegionArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(usize);

/// Owner of every region discovered on a disc.
#[derive(Debug, Default)]
pub struct RegionArena {
    regions: Vec<Region>,
}

impl RegionArena {
    pub fn insert(&mut self, region: Region) -> RegionId {
        self.regions.push(region);
        RegionId(self.regions.len() - 1)
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl Index<RegionId> for RegionArena {
    type Output = Region;

    fn index(&self, id: RegionId) -> &Region {
        &self.regions[id.0]
    }
}

impl IndexMut<RegionId> for RegionArena {
    fn index_mut(&mut self, id: RegionId) -> &mut Region {
        &mut self.regions[id.0]
    }
}

/// The kind of structure a region holds, with any kind-specific state.
#[derive(Debug)]
pub enum RegionKind {
    SystemArea(SystemArea),
    Volume(VolumeDescriptor),
    PathTable(PathTable),
    Directory(Directory),
    File,
    Free,
}

/// Fieldless discriminant of [`RegionKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionType {
    SystemArea,
    VolumeDescriptor,
    PathTable,
    Directory,
    File,
    Free,
}

impl fmt::Display for RegionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegionType::SystemArea => "SystemArea",
            RegionType::VolumeDescriptor => "VolumeDescriptor",
            RegionType::PathTable => "PathTable",
            RegionType::Directory => "Directory",
            RegionType::File => "File",
            RegionType::Free => "Free",
        };
        f.write_str(name)
    }
}

/// A contiguous run of sectors on the disc.
#[derive(Debug)]
pub struct Region {
    pub(crate) start: u32,
    pub(crate) sectors: Vec<Sector>,
    /// Regions this one forwards metadata updates to.
    pub(crate) sub_regions: Vec<RegionId>,
    /// Fully qualified path, e.g. `VOLUME:\DIR\FILE;1`.
    pub(crate) name: Option<String>,
    /// Logical size recorded in the filesystem, if any.
    pub(crate) byte_len: Option<u32>,
    pub(crate) last_modified: Option<DateTime<FixedOffset>>,
    pub(crate) kind: RegionKind,
}

/// Position and size of a region captured before metadata propagation, so
/// the tree can be walked mutably while describing the changed region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RegionSnapshot {
    pub id: RegionId,
    pub name: Option<String>,
    pub start: u32,
    pub size: u32,
    pub data_size: u32,
    pub is_directory: bool,
}

impl RegionSnapshot {
    pub fn of(arena: &RegionArena, id: RegionId) -> Self {
        let region = &arena[id];
        Self {
            id,
            name: region.name.clone(),
            start: region.start,
            size: region.size(),
            data_size: region.data_size() as u32,
            is_directory: region.region_type() == RegionType::Directory,
        }
    }

    /// First sector after the region.
    pub fn next_start(&self) -> u32 {
        self.start + self.size
    }
}

impl Region {
    pub(crate) fn new(start: u32, sectors: Vec<Sector>, kind: RegionKind) -> Self {
        Self {
            start,
            sectors,
            sub_regions: Vec::new(),
            name: None,
            byte_len: None,
            last_modified: None,
            kind,
        }
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    /// Last sector of the region (inclusive). For an empty region this is
    /// the sector before `start`.
    pub fn end(&self) -> u32 {
        self.next_start().saturating_sub(1)
    }

    /// First sector after the region.
    pub fn next_start(&self) -> u32 {
        self.start + self.size()
    }

    /// Number of sectors in the region.
    pub fn size(&self) -> u32 {
        self.sectors.len() as u32
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn last_modified(&self) -> Option<DateTime<FixedOffset>> {
        self.last_modified
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    pub fn kind(&self) -> &RegionKind {
        &self.kind
    }

    pub fn region_type(&self) -> RegionType {
        match self.kind {
            RegionKind::SystemArea(_) => RegionType::SystemArea,
            RegionKind::Volume(_) => RegionType::VolumeDescriptor,
            RegionKind::PathTable(_) => RegionType::PathTable,
            RegionKind::Directory(_) => RegionType::Directory,
            RegionKind::File => RegionType::File,
            RegionKind::Free => RegionType::Free,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self.kind, RegionKind::Free)
    }

    /// Whether the allocator may shift this region to another position.
    /// The system area and the volume descriptors live at fixed sectors.
    pub fn is_movable(&self) -> bool {
        !matches!(
            self.kind,
            RegionKind::SystemArea(_) | RegionKind::Volume(_)
        )
    }

    /// Sum of the data field capacities of the region's sectors.
    pub fn data_capacity(&self) -> usize {
        self.sectors.iter().map(Sector::data_size).sum()
    }

    /// Logical size in bytes: the size recorded in the filesystem if there is
    /// one, otherwise the data capacity.
    pub fn data_size(&self) -> usize {
        match self.byte_len {
            Some(len) => len as usize,
            None => self.data_capacity(),
        }
    }

    /// Logical content, without sector headers or error codes.
    pub fn data(&self) -> Vec<u8> {
        let size = self.data_size();
        let mut buf = Vec::with_capacity(size);
        for sector in &self.sectors {
            if buf.len() >= size {
                break;
            }
            let take = sector.data_size().min(size - buf.len());
            buf.extend_from_slice(&sector.data()[..take]);
        }
        buf
    }

    pub fn write_data(&self, destination: &mut dyn Write) -> Result<(), CdError> {
        destination.write_all(&self.data())?;
        Ok(())
    }

    /// Write the region's raw sectors at the disc's current position.
    pub fn write<W: Write>(&self, disc: &mut Disc<W>) -> Result<(), CdError> {
        disc.write_sectors(&self.sectors)
    }

    pub fn update_edc(&mut self, force: bool) {
        for sector in &mut self.sectors {
            sector.update_edc(force);
        }
    }

    // -- Resizing --

    fn check_shrink(&self, count: u32) -> Result<(), CdError> {
        if count > self.size() {
            return Err(CdError::invalid_argument(format!(
                "Tried to shrink by {count} sectors but only {} available",
                self.size()
            )));
        }
        Ok(())
    }

    /// Detach `count` sectors from the front of the region.
    ///
    /// With `shift_data`, the content is first copied toward the back so that
    /// the retained sectors hold the region's leading data; what was in the
    /// last `count` sectors is lost.
    pub fn shrink_front(&mut self, count: u32, shift_data: bool) -> Result<Vec<Sector>, CdError> {
        self.check_shrink(count)?;
        let count = count as usize;
        if shift_data && count > 0 {
            for i in (count..self.sectors.len()).rev() {
                let (head, tail) = self.sectors.split_at_mut(i);
                tail[0].copy_from(&head[i - count]);
            }
        }
        let removed = self.sectors.drain(..count).collect();
        self.start += count as u32;
        Ok(removed)
    }

    /// Detach `count` sectors from the back of the region.
    pub fn shrink_back(&mut self, count: u32) -> Result<Vec<Sector>, CdError> {
        self.check_shrink(count)?;
        let keep = self.sectors.len() - count as usize;
        Ok(self.sectors.split_off(keep))
    }

    /// Attach sectors in front of the region.
    ///
    /// With `shift_data`, the existing content is copied forward to begin at
    /// the new first sector.
    pub fn grow_front(&mut self, sectors: Vec<Sector>, shift_data: bool) {
        let count = sectors.len();
        self.sectors.splice(0..0, sectors);
        self.start -= count as u32;
        if shift_data && count > 0 {
            for i in count..self.sectors.len() {
                let (head, tail) = self.sectors.split_at_mut(i);
                head[i - count].copy_from(&tail[0]);
            }
        }
    }

    /// Attach sectors after the end of the region.
    pub fn grow_back(&mut self, sectors: Vec<Sector>) {
        self.sectors.extend(sectors);
    }

    // -- Content replacement --

    /// Overwrite the leading sectors with `sectors`, headers included. Extra
    /// sectors at the end of the region are left untouched.
    pub fn patch_sectors(&mut self, sectors: &[Sector]) -> Result<(), CdError> {
        if sectors.len() > self.sectors.len() {
            return Err(CdError::invalid_argument(format!(
                "Region is not large enough to patch: {} sectors into {}",
                sectors.len(),
                self.sectors.len()
            )));
        }
        for (old, new) in self.sectors.iter_mut().zip(sectors) {
            old.copy_from(new);
        }
        if matches!(self.kind, RegionKind::File) {
            file::patched_sectors(self);
        }
        Ok(())
    }

    /// Overwrite the data fields with `data`, keeping sector headers.
    ///
    /// Sectors that can't carry 0x800 bytes of file data (Mode 2 Form 2 and
    /// Mode 0) are first reformatted as Mode 2 Form 1.
    pub fn patch_data(&mut self, data: &[u8]) -> Result<(), CdError> {
        for sector in &mut self.sectors {
            match (sector.mode(), sector.form()) {
                (Mode::Mode2, Some(Form::Form2)) => sector.set_form(Form::Form1)?,
                (Mode::Mode0, _) => {
                    sector.set_mode(Mode::Mode2);
                    sector.set_sub_mode(SubMode::DATA)?;
                }
                _ => {}
            }
        }
        let capacity = self.data_capacity();
        if capacity < data.len() {
            return Err(CdError::invalid_argument(format!(
                "Region is not large enough to patch: {} bytes into {capacity}",
                data.len()
            )));
        }

        let mut written = 0;
        for sector in &mut self.sectors {
            if written >= data.len() {
                break;
            }
            let chunk = sector.data_size().min(data.len() - written);
            let field = sector.data_mut();
            field[..chunk].copy_from_slice(&data[written..written + chunk]);
            field[chunk..].fill(0);
            sector.update_edc(false);
            written += chunk;
        }
        if matches!(self.kind, RegionKind::File) {
            file::patched_data(self, data.len());
        }
        Ok(())
    }

    // -- Field access across sector boundaries --

    /// Read `len` data bytes starting at `offset` into the data field of
    /// sector `sector_index`, continuing into following sectors as needed.
    pub(crate) fn read_field(
        &self,
        sector_index: usize,
        offset: usize,
        len: usize,
    ) -> Result<Vec<u8>, CdError> {
        let mut out = Vec::with_capacity(len);
        let (mut index, mut offset) = (sector_index, offset);
        while out.len() < len {
            let sector = self.sectors.get(index).ok_or_else(|| {
                CdError::invalid_format(format!("Field runs past the end of region at {}", self.start))
            })?;
            let data = sector.data();
            if offset < data.len() {
                let take = (data.len() - offset).min(len - out.len());
                out.extend_from_slice(&data[offset..offset + take]);
                offset += take;
            }
            if out.len() < len {
                offset = offset.saturating_sub(data.len());
                index += 1;
            }
        }
        Ok(out)
    }

    /// Overwrite data bytes at the given location, splitting the write across
    /// a sector boundary if the field straddles one. Error codes of every
    /// touched sector are recomputed.
    pub(crate) fn write_field(
        &mut self,
        sector_index: usize,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), CdError> {
        let start = self.start;
        let (mut index, mut offset) = (sector_index, offset);
        let mut written = 0;
        while written < bytes.len() {
            let sector = self.sectors.get_mut(index).ok_or_else(|| {
                CdError::invalid_format(format!("Field runs past the end of region at {start}"))
            })?;
            let size = sector.data_size();
            if offset < size {
                let take = (size - offset).min(bytes.len() - written);
                sector.data_mut()[offset..offset + take]
                    .copy_from_slice(&bytes[written..written + take]);
                sector.update_edc(false);
                written += take;
                offset += take;
            }
            if written < bytes.len() {
                offset = offset.saturating_sub(size);
                index += 1;
            }
        }
        Ok(())
    }

    /// Map a byte offset into the concatenated data fields to a sector index
    /// and an offset within that sector's data field.
    pub(crate) fn locate(&self, flat_offset: usize) -> (usize, usize) {
        let mut remaining = flat_offset;
        for (index, sector) in self.sectors.iter().enumerate() {
            let size = sector.data_size();
            if remaining < size {
                return (index, remaining);
            }
            remaining -= size;
        }
        (self.sectors.len(), remaining)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:06}-{:06} ({:05}): {}",
            self.start,
            self.end(),
            self.size(),
            self.region_type()
        )?;
        if let Some(name) = &self.name {
            write!(f, " ({name})")?;
        }
        Ok(())
    }
}

/// Read sectors from `start` until their data fields hold at least
/// `byte_len` bytes.
pub(crate) fn read_extent<S: std::io::Read + std::io::Seek>(
    disc: &mut Disc<S>,
    start: u32,
    byte_len: u32,
) -> Result<Vec<Sector>, CdError> {
    disc.seek(start)?;
    let mut sectors = Vec::new();
    let mut len_so_far = 0usize;
    while len_so_far < byte_len as usize {
        let sector = disc.read_sector()?;
        if sector.data_size() == 0 {
            return Err(CdError::invalid_format(format!(
                "Sector {} holds no data but is part of an extent",
                disc.position() - 1
            )));
        }
        len_so_far += sector.data_size();
        sectors.push(sector);
    }
    Ok(sectors)
}

/// Forward a metadata change to `target`, dispatching on its kind.
pub(crate) fn update_paths(
    arena: &mut RegionArena,
    target: RegionId,
    changed: &RegionSnapshot,
) -> Result<(), CdError> {
    match arena[target].region_type() {
        RegionType::VolumeDescriptor => volume::update_paths(arena, target, changed),
        RegionType::PathTable => path_table::update_paths(arena, target, changed),
        RegionType::Directory => directory::update_paths(arena, target, changed),
        RegionType::Free => Ok(()),
        RegionType::SystemArea | RegionType::File => {
            for sub in arena[target].sub_regions.clone() {
                update_paths(arena, sub, changed)?;
            }
            Ok(())
        }
    }
}

/// Decode a space-padded identifier field.
pub(crate) fn decode_identifier(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

#[cfg(test)]
#[path = "tests/region_tests.rs"]
mod tests;
