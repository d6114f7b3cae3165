//! Sector-granular access to a raw disc image stream.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use crate::CdError;
use crate::sector::{Msf, SECTOR_SIZE, Sector};

/// A sector whose stored EDC does not match its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdcFailure {
    /// Zero-based index of the sector in the image.
    pub index: u32,
    /// Address recorded in the sector header, if it decodes.
    pub msf: Option<Msf>,
}

/// Wrapper around a raw CD-ROM XA image that reads and writes whole sectors.
///
/// The wrapper tracks its own sector offset so that consecutive reads or
/// writes don't need to seek.
#[derive(Debug)]
pub struct Disc<S> {
    stream: S,
    position: u32,
}

impl<S: Seek> Disc<S> {
    /// Wrap a stream, rewinding it to the first sector.
    pub fn new(mut stream: S) -> Result<Self, CdError> {
        stream.seek(SeekFrom::Start(0))?;
        Ok(Self {
            stream,
            position: 0,
        })
    }

    /// Index of the sector the next read or write will touch.
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Move to the sector at zero-based `index`.
    pub fn seek(&mut self, index: u32) -> Result<(), CdError> {
        if index != self.position {
            self.stream
                .seek(SeekFrom::Start(u64::from(index) * SECTOR_SIZE as u64))?;
            self.position = index;
        }
        Ok(())
    }

    /// Number of whole sectors in the stream.
    pub fn num_sectors(&mut self) -> Result<u32, CdError> {
        let here = self.stream.stream_position()?;
        let end = self.stream.seek(SeekFrom::End(0))?;
        self.stream.seek(SeekFrom::Start(here))?;
        u32::try_from(end / SECTOR_SIZE as u64)
            .map_err(|_| CdError::unsupported(format!("Disc image of {end} bytes is too large")))
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read> Disc<S> {
    /// Read up to one sector of raw bytes. Returns `None` at a clean end of
    /// stream and an error if the stream ends mid-sector.
    fn read_raw(&mut self) -> Result<Option<Vec<u8>>, CdError> {
        let mut buf = vec![0u8; SECTOR_SIZE];
        let mut filled = 0;
        while filled < SECTOR_SIZE {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(CdError::Io(e)),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < SECTOR_SIZE {
            return Err(CdError::UnexpectedEof {
                sector: self.position,
            });
        }
        self.position += 1;
        Ok(Some(buf))
    }

    fn parse(index: u32, raw: &[u8]) -> Result<Sector, CdError> {
        Sector::from_bytes(raw).map_err(|e| match e {
            CdError::InvalidFormat(msg) => {
                CdError::invalid_format(format!("Sector {index}: {msg}"))
            }
            other => other,
        })
    }

    /// Read the next sector, or `None` if the stream is exhausted.
    pub fn try_read_sector(&mut self) -> Result<Option<Sector>, CdError> {
        let index = self.position;
        match self.read_raw()? {
            Some(raw) => Self::parse(index, &raw).map(Some),
            None => Ok(None),
        }
    }

    /// Read the next sector; reaching the end of the stream is an error.
    pub fn read_sector(&mut self) -> Result<Sector, CdError> {
        let index = self.position;
        self.try_read_sector()?
            .ok_or(CdError::UnexpectedEof { sector: index })
    }

    /// Read exactly `count` consecutive sectors.
    pub fn read_sectors(&mut self, count: u32) -> Result<Vec<Sector>, CdError> {
        (0..count).map(|_| self.read_sector()).collect()
    }

    /// Read up to `count` sectors, stopping early at the end of the stream or
    /// at the first sector that fails validation.
    pub fn read_valid_sectors(&mut self, count: u32) -> Result<Vec<Sector>, CdError> {
        let mut sectors = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let index = self.position;
            let Some(raw) = self.read_raw()? else {
                break;
            };
            match Self::parse(index, &raw) {
                Ok(sector) => sectors.push(sector),
                Err(e) => {
                    log::warn!("Ignoring sectors from {index} onward: {e}");
                    break;
                }
            }
        }
        Ok(sectors)
    }
}

impl<S: Read + Seek> Disc<S> {
    /// Scan the whole image and report every sector whose EDC is wrong.
    pub fn validate(&mut self) -> Result<Vec<EdcFailure>, CdError> {
        self.seek(0)?;
        let mut failures = Vec::new();
        let mut index = 0;
        while let Some(sector) = self.try_read_sector()? {
            if !sector.validate_edc() {
                let msf = sector.msf();
                match msf {
                    Some(msf) => log::warn!("{index} ({msf}): invalid EDC"),
                    None => log::warn!("{index}: invalid EDC"),
                }
                failures.push(EdcFailure { index, msf });
            }
            index += 1;
        }
        Ok(failures)
    }
}

impl<S: Write> Disc<S> {
    /// Write a sector at the current position.
    pub fn write_sector(&mut self, sector: &Sector) -> Result<(), CdError> {
        self.stream.write_all(sector.raw())?;
        self.position += 1;
        Ok(())
    }

    pub fn write_sectors<'a>(
        &mut self,
        sectors: impl IntoIterator<Item = &'a Sector>,
    ) -> Result<(), CdError> {
        for sector in sectors {
            self.write_sector(sector)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), CdError> {
        self.stream.flush()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/disc_tests.rs"]
mod tests;
