//! A whole disc image as an ordered layout of regions.

mod alloc;
mod patch;

pub use patch::Patch;

use std::collections::HashMap;
use std::io::{Seek, Write};
use std::path::Path;

use xapatch_core::{CdError, Disc, ReadSeek};

use crate::date::Timestamp;
use crate::region::{
    Region, RegionArena, RegionId, RegionKind, RecordTarget, RegionType, free, system_area,
};
use crate::settings::ImageOptions;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Name within the directory, e.g. `TEST.TXT;1`.
    pub name: String,
    /// Fully qualified path, e.g. `VOLUME:\TEST.TXT;1`.
    pub path: String,
    pub is_directory: bool,
    pub last_modified: Option<Timestamp>,
}

/// An in-memory, editable disc image.
///
/// The layout is an ordered list of regions covering every sector of the
/// image exactly once. Filesystem regions are discovered by walking the
/// volume descriptors and directory tree; the sectors between them become
/// free space that patches can grow into.
#[derive(Debug)]
pub struct DiscImage {
    arena: RegionArena,
    layout: Vec<RegionId>,
    /// Lower-cased region name to its index in `layout`.
    name_map: HashMap<String, usize>,
    system_area: RegionId,
    primary_volume: RegionId,
    /// Regions left out of the layout because their extent lies inside
    /// another region, keyed by that region. Each alias carries its sector
    /// offset into the owner.
    aliases: HashMap<RegionId, Vec<(RegionId, u32)>>,
}

impl DiscImage {
    pub fn open(reader: &mut dyn ReadSeek) -> Result<Self, CdError> {
        Self::open_with(reader, &ImageOptions::default())
    }

    pub fn open_with(reader: &mut dyn ReadSeek, options: &ImageOptions) -> Result<Self, CdError> {
        let mut disc = Disc::new(reader)?;
        let mut arena = RegionArena::default();
        let mut discovered = system_area::read(&mut arena, &mut disc)?;
        let system_area = discovered[0];
        // Empty extents sort after anything else starting on the same sector.
        discovered.sort_by_key(|&id| {
            let region = &arena[id];
            (region.start(), region.size() == 0, region.next_start())
        });

        let mut layout = Vec::with_capacity(discovered.len() * 2);
        let mut aliases: HashMap<RegionId, Vec<(RegionId, u32)>> = HashMap::new();
        let mut parked = Vec::new();
        let mut covered = 0u32;
        for id in discovered {
            let (start, next_start) = (arena[id].start(), arena[id].next_start());
            if start < covered {
                if next_start == start {
                    // An empty extent inside another region takes up no
                    // space; it joins the end of the filesystem.
                    parked.push(id);
                    continue;
                }
                // Another record already claims these sectors.
                let owner = layout.iter().rev().copied().find(|&owner| {
                    arena[owner].start() <= start && start < arena[owner].next_start()
                });
                log::warn!(
                    "{} overlaps a preceding region; leaving it out of the layout",
                    arena[id]
                );
                if let Some(owner) = owner {
                    let offset = start - arena[owner].start();
                    aliases.entry(owner).or_default().push((id, offset));
                }
                continue;
            }
            if start > covered {
                layout.push(free::read(&mut arena, &mut disc, covered, start, false)?);
            }
            layout.push(id);
            covered = covered.max(next_start);
        }
        for id in parked {
            arena[id].start = covered;
            layout.push(id);
        }

        let total = disc.num_sectors()?;
        if total > covered {
            let trailing =
                free::read(&mut arena, &mut disc, covered, total, options.ignore_invalid)?;
            layout.push(trailing);
        }

        let primary_volume = system_area::primary_volume(&arena, system_area)
            .ok_or_else(|| CdError::invalid_format("CD has no primary volume"))?;

        let mut image = Self {
            arena,
            layout,
            name_map: HashMap::new(),
            system_area,
            primary_volume,
            aliases,
        };
        image.rebuild_name_map();
        log::info!(
            "Opened disc image: {} sectors in {} regions",
            image.num_sectors(),
            image.layout.len()
        );
        Ok(image)
    }

    fn rebuild_name_map(&mut self) {
        self.name_map = self
            .layout
            .iter()
            .enumerate()
            .filter_map(|(index, &id)| {
                self.arena[id]
                    .name()
                    .map(|name| (name.to_lowercase(), index))
            })
            .collect();
    }

    /// Name of the primary volume, used for paths like `VOLUME:\FILE;1`.
    pub fn primary_volume_name(&self) -> &str {
        self.arena[self.primary_volume].name().unwrap_or_default()
    }

    pub fn system_area(&self) -> &Region {
        &self.arena[self.system_area]
    }

    pub fn primary_volume(&self) -> &Region {
        &self.arena[self.primary_volume]
    }

    /// Regions in layout order.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.layout.iter().map(|&id| &self.arena[id])
    }

    /// Look up any region, including those referenced only from the tree.
    pub fn region_by_id(&self, id: RegionId) -> Option<&Region> {
        self.arena.get(id)
    }

    pub fn num_sectors(&self) -> u32 {
        self.regions().map(Region::size).sum()
    }

    // -- Path resolution --

    /// Normalize a user-supplied path.
    ///
    /// `None` means the root of the primary volume. A leading `\` or
    /// `cdrom:\` (any case) refers to the primary volume, a trailing `\` is
    /// dropped except on a volume root, and the result is lower-cased.
    pub fn clean_path(&self, path: Option<&str>) -> String {
        let volume = self.primary_volume_name();
        let mut path = match path {
            None => format!("{volume}:\\"),
            Some(p) => {
                let has_alias = p
                    .get(..7)
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case("cdrom:\\"));
                if has_alias {
                    format!("{volume}:\\{}", &p[7..])
                } else if let Some(rest) = p.strip_prefix('\\') {
                    format!("{volume}:\\{rest}")
                } else {
                    p.to_string()
                }
            }
        };
        if path.ends_with('\\') && !path.ends_with(":\\") {
            path.pop();
        }
        path.to_lowercase()
    }

    /// Layout index of the region at `path`. A missing `;1` version suffix
    /// is tolerated.
    pub fn index_of(&self, path: &str) -> Result<usize, CdError> {
        let clean = self.clean_path(Some(path));
        self.name_map
            .get(&clean)
            .or_else(|| self.name_map.get(&format!("{clean};1")))
            .copied()
            .ok_or_else(|| CdError::not_found(path))
    }

    pub fn region(&self, path: &str) -> Result<&Region, CdError> {
        Ok(&self.arena[self.layout[self.index_of(path)?]])
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.region(path)
            .is_ok_and(|region| region.region_type() == RegionType::Directory)
    }

    /// List a directory, root of the primary volume by default.
    pub fn list_dir(&self, path: Option<&str>) -> Result<Vec<DirectoryEntry>, CdError> {
        let display = path.map(str::to_string).unwrap_or_else(|| self.clean_path(None));
        let region = self.region(&self.clean_path(path))?;
        let RegionKind::Directory(directory) = region.kind() else {
            return Err(CdError::NotADirectory(display));
        };

        Ok(directory
            .entries
            .iter()
            .filter_map(|entry| match entry.target {
                RecordTarget::Child(id) => Some((entry, &self.arena[id])),
                _ => None,
            })
            .map(|(entry, child)| DirectoryEntry {
                name: entry.name.clone(),
                path: child.name().unwrap_or_default().to_string(),
                is_directory: child.region_type() == RegionType::Directory,
                last_modified: child.last_modified(),
            })
            .collect())
    }

    /// Copy a region's content to `destination`.
    ///
    /// With `raw`, whole sectors are written instead of just the logical
    /// data. With `extend`, the free region directly after it is included,
    /// which recovers data that trails a file's recorded length.
    pub fn extract(
        &self,
        path: &str,
        destination: &mut dyn Write,
        raw: bool,
        extend: bool,
    ) -> Result<(), CdError> {
        let index = self.index_of(path)?;
        let mut regions = vec![&self.arena[self.layout[index]]];
        if extend
            && let Some(&next) = self.layout.get(index + 1)
            && self.arena[next].is_free()
        {
            regions.push(&self.arena[next]);
        }

        for region in regions {
            if raw {
                for sector in region.sectors() {
                    destination.write_all(sector.raw())?;
                }
            } else {
                region.write_data(destination)?;
            }
        }
        Ok(())
    }

    // -- Layout bookkeeping --

    pub(crate) fn insert_region(&mut self, index: usize, id: RegionId) {
        self.layout.insert(index, id);
        for position in self.name_map.values_mut() {
            if *position >= index {
                *position += 1;
            }
        }
        if let Some(name) = self.arena[id].name() {
            self.name_map.insert(name.to_lowercase(), index);
        }
    }

    pub(crate) fn remove_region(&mut self, index: usize) -> RegionId {
        let id = self.layout.remove(index);
        if let Some(name) = self.arena[id].name() {
            self.name_map.remove(&name.to_lowercase());
        }
        for position in self.name_map.values_mut() {
            if *position > index {
                *position -= 1;
            }
        }
        id
    }

    /// Check that the layout tiles the image: every region starts where the
    /// previous one ended.
    pub fn verify_layout(&self) -> Result<(), CdError> {
        let mut expected = 0;
        for region in self.regions() {
            if region.start() != expected {
                return Err(CdError::invalid_format(format!(
                    "{region} does not start at sector {expected}"
                )));
            }
            expected = region.next_start();
        }
        Ok(())
    }

    /// Serialize every region, in start order, to `destination`.
    pub fn write<W: Write + Seek>(&mut self, destination: W) -> Result<(), CdError> {
        let arena = &self.arena;
        self.layout
            .sort_by_key(|&id| (arena[id].start(), arena[id].next_start()));
        self.rebuild_name_map();
        self.verify_layout()?;

        let mut disc = Disc::new(destination)?;
        for &id in &self.layout {
            self.arena[id].write(&mut disc)?;
        }
        disc.flush()?;
        log::info!("Wrote {} sectors", disc.position());
        Ok(())
    }
}

/// Apply `patches` to the image file at `image_path`.
///
/// The patched image is written to a temporary file next to the original and
/// then renamed over it, so a failure leaves the original untouched.
pub fn patch_image_file(
    image_path: &Path,
    patches: Vec<Patch>,
    options: &ImageOptions,
) -> Result<(), CdError> {
    let mut image = {
        let mut file = std::fs::File::open(image_path)?;
        DiscImage::open_with(&mut file, options)?
    };
    image.patch(patches)?;

    let mut tmp_name = image_path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp_name);
    let result = std::fs::File::create(&tmp)
        .map_err(CdError::from)
        .and_then(|file| image.write(file));
    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, image_path)?;
    log::info!("Patched {}", image_path.display());
    Ok(())
}

#[cfg(test)]
#[path = "tests/image_tests.rs"]
mod tests;
