//! Raw 2352-byte CD-ROM and CD-ROM XA sectors.
//!
//! A sector is stored exactly as it appears in a raw (`.bin`) image: sync
//! pattern, BCD address, mode byte, the Mode 2 sub-header, the user data field
//! and the trailing error detection code. Accessors interpret the header
//! according to the sector's mode and form.

use std::fmt;
use std::ops::Range;

use bitflags::bitflags;

use crate::CdError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Size of a raw sector, including sync, header, sub-header and EDC/ECC.
pub const SECTOR_SIZE: usize = 2352;

/// Sync pattern at the start of every raw sector.
pub const SYNC_PATTERN: [u8; 12] = [
    0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00,
];

/// User data carried by a Mode 1 or Mode 2 Form 1 sector.
pub const FORM1_DATA_SIZE: usize = 0x800;

/// User data carried by a Mode 2 Form 2 sector.
pub const FORM2_DATA_SIZE: usize = 0x914;

/// Sectors before LBA 0 (the two-second lead-in).
const LEAD_IN_SECTORS: u32 = 150;

const SECTORS_PER_SECOND: u32 = 75;

const MINUTE_OFFSET: usize = 0x0C;
const SECOND_OFFSET: usize = 0x0D;
const SECTOR_OFFSET: usize = 0x0E;
const MODE_OFFSET: usize = 0x0F;

/// Mode 2 sub-header; the four bytes are repeated at `+4`.
const SUBHEADER_OFFSET: usize = 0x10;
const FILE_NUMBER_OFFSET: usize = SUBHEADER_OFFSET;
const CHANNEL_OFFSET: usize = SUBHEADER_OFFSET + 1;
const SUB_MODE_OFFSET: usize = SUBHEADER_OFFSET + 2;
const CODING_INFO_OFFSET: usize = SUBHEADER_OFFSET + 3;
const SUBHEADER_COPY_DISTANCE: usize = 4;

const MODE1_DATA_OFFSET: usize = 0x10;
const MODE2_DATA_OFFSET: usize = 0x18;

/// Reflected polynomial of the CD-ROM EDC.
const EDC_POLY: u32 = 0xD801_8001;

static EDC_TABLE: [u32; 256] = build_edc_table();

const fn build_edc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut edc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            edc = if edc & 1 != 0 {
                (edc >> 1) ^ EDC_POLY
            } else {
                edc >> 1
            };
            bit += 1;
        }
        table[i] = edc;
        i += 1;
    }
    table
}

// ---------------------------------------------------------------------------
// Header types
// ---------------------------------------------------------------------------

/// Sector mode, from byte 15 of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Mode {
    /// Unspecified; the data field is all zeroes.
    Mode0 = 0,
    /// CD-ROM Mode 1.
    Mode1 = 1,
    /// CD-ROM XA Mode 2 (Form 1 or Form 2).
    Mode2 = 2,
}

impl TryFrom<u8> for Mode {
    type Error = CdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Mode::Mode0),
            1 => Ok(Mode::Mode1),
            2 => Ok(Mode::Mode2),
            other => Err(CdError::invalid_format(format!(
                "Invalid sector mode {other}; expected 0, 1, or 2"
            ))),
        }
    }
}

/// Mode 2 sector form, selected by the FORM2 bit of the sub-mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Form {
    /// 0x800 bytes of data with EDC and ECC.
    Form1,
    /// 0x914 bytes of data with optional EDC.
    Form2,
}

bitflags! {
    /// Sub-mode byte of a Mode 2 sub-header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SubMode: u8 {
        const END_OF_RECORD = 0x01;
        const VIDEO = 0x02;
        const AUDIO = 0x04;
        const DATA = 0x08;
        const TRIGGER = 0x10;
        const FORM2 = 0x20;
        const REAL_TIME = 0x40;
        const END_OF_FILE = 0x80;
    }

    /// Coding information byte of a Mode 2 sub-header (meaningful for audio).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CodingInfo: u8 {
        const STEREO = 0x01;
        const RATE_18900 = 0x04;
        const BITS_8 = 0x10;
        const EMPHASIS = 0x40;
    }
}

/// Absolute disc address in minutes, seconds and sectors (frames).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Msf {
    pub minute: u8,
    pub second: u8,
    pub sector: u8,
}

impl Msf {
    pub fn new(minute: u8, second: u8, sector: u8) -> Self {
        Self {
            minute,
            second,
            sector,
        }
    }

    /// Address of the sector at zero-based image index `lba`.
    pub fn from_lba(lba: u32) -> Self {
        let absolute = lba + LEAD_IN_SECTORS;
        Self {
            minute: (absolute / (60 * SECTORS_PER_SECOND)) as u8,
            second: ((absolute / SECTORS_PER_SECOND) % 60) as u8,
            sector: (absolute % SECTORS_PER_SECOND) as u8,
        }
    }

    /// Zero-based image index of this address, or `None` inside the lead-in.
    pub fn to_lba(self) -> Option<u32> {
        let absolute = (u32::from(self.minute) * 60 + u32::from(self.second))
            * SECTORS_PER_SECOND
            + u32::from(self.sector);
        absolute.checked_sub(LEAD_IN_SECTORS)
    }
}

impl fmt::Display for Msf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.minute, self.second, self.sector)
    }
}

/// Decode a binary-coded decimal byte, or `None` if either nibble exceeds 9.
pub fn from_bcd(value: u8) -> Option<u8> {
    let high = value >> 4;
    let low = value & 0x0F;
    if high > 9 || low > 9 {
        return None;
    }
    Some(high * 10 + low)
}

/// Encode a value below 100 as binary-coded decimal.
pub fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

// ---------------------------------------------------------------------------
// Sector
// ---------------------------------------------------------------------------

/// A single raw sector of a disc image.
#[derive(Clone, PartialEq, Eq)]
pub struct Sector {
    raw: Box<[u8; SECTOR_SIZE]>,
}

impl Sector {
    /// Parse a raw sector, validating its length, sync pattern and mode.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CdError> {
        if bytes.len() != SECTOR_SIZE {
            return Err(CdError::invalid_format(format!(
                "Expected {SECTOR_SIZE} bytes in sector, found {}",
                bytes.len()
            )));
        }
        if bytes[..SYNC_PATTERN.len()] != SYNC_PATTERN {
            return Err(CdError::invalid_format(format!(
                "Bad sector sync header: {:02X?}",
                &bytes[..SYNC_PATTERN.len()]
            )));
        }
        Mode::try_from(bytes[MODE_OFFSET])?;

        let mut raw = Box::new([0u8; SECTOR_SIZE]);
        raw.copy_from_slice(bytes);
        Ok(Self { raw })
    }

    /// Create a blank sector at the given address.
    ///
    /// `form` is only meaningful for Mode 2 sectors and is ignored otherwise.
    pub fn new(address: Msf, mode: Mode, form: Option<Form>) -> Self {
        let mut raw = Box::new([0u8; SECTOR_SIZE]);
        raw[..SYNC_PATTERN.len()].copy_from_slice(&SYNC_PATTERN);
        raw[MINUTE_OFFSET] = to_bcd(address.minute);
        raw[SECOND_OFFSET] = to_bcd(address.second);
        raw[SECTOR_OFFSET] = to_bcd(address.sector);
        raw[MODE_OFFSET] = mode as u8;
        if mode == Mode::Mode2 && form == Some(Form::Form2) {
            raw[SUB_MODE_OFFSET] = SubMode::FORM2.bits();
            raw[SUB_MODE_OFFSET + SUBHEADER_COPY_DISTANCE] = SubMode::FORM2.bits();
        }

        let mut sector = Self { raw };
        sector.update_edc(false);
        sector
    }

    /// Create a blank sector addressed for image index `lba`.
    pub fn at_lba(lba: u32, mode: Mode, form: Option<Form>) -> Self {
        Self::new(Msf::from_lba(lba), mode, form)
    }

    pub fn raw(&self) -> &[u8; SECTOR_SIZE] {
        &self.raw
    }

    pub fn minute(&self) -> Option<u8> {
        from_bcd(self.raw[MINUTE_OFFSET])
    }

    pub fn second(&self) -> Option<u8> {
        from_bcd(self.raw[SECOND_OFFSET])
    }

    pub fn sector(&self) -> Option<u8> {
        from_bcd(self.raw[SECTOR_OFFSET])
    }

    /// Decoded address, or `None` if any field is not valid BCD.
    pub fn msf(&self) -> Option<Msf> {
        Some(Msf::new(self.minute()?, self.second()?, self.sector()?))
    }

    pub fn set_address(&mut self, address: Msf) {
        self.raw[MINUTE_OFFSET] = to_bcd(address.minute);
        self.raw[SECOND_OFFSET] = to_bcd(address.second);
        self.raw[SECTOR_OFFSET] = to_bcd(address.sector);
        // only Mode 1 covers the address with its EDC
        if self.mode() == Mode::Mode1 {
            self.update_edc(false);
        }
    }

    pub fn mode(&self) -> Mode {
        match self.raw[MODE_OFFSET] {
            1 => Mode::Mode1,
            2 => Mode::Mode2,
            _ => Mode::Mode0,
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode() != mode {
            self.raw[MODE_OFFSET] = mode as u8;
            self.update_edc(false);
        }
    }

    fn subheader_byte(&self, offset: usize) -> Option<u8> {
        (self.mode() == Mode::Mode2).then(|| self.raw[offset])
    }

    fn set_subheader_byte(&mut self, offset: usize, value: u8, field: &str) -> Result<(), CdError> {
        if self.mode() != Mode::Mode2 {
            return Err(CdError::invalid_argument(format!(
                "Cannot set {field} on a {:?} sector",
                self.mode()
            )));
        }
        self.raw[offset] = value;
        self.raw[offset + SUBHEADER_COPY_DISTANCE] = value;
        self.update_edc(false);
        Ok(())
    }

    pub fn file_number(&self) -> Option<u8> {
        self.subheader_byte(FILE_NUMBER_OFFSET)
    }

    pub fn set_file_number(&mut self, value: u8) -> Result<(), CdError> {
        self.set_subheader_byte(FILE_NUMBER_OFFSET, value, "file number")
    }

    pub fn channel(&self) -> Option<u8> {
        self.subheader_byte(CHANNEL_OFFSET)
    }

    pub fn set_channel(&mut self, value: u8) -> Result<(), CdError> {
        self.set_subheader_byte(CHANNEL_OFFSET, value, "channel")
    }

    pub fn sub_mode(&self) -> Option<SubMode> {
        self.subheader_byte(SUB_MODE_OFFSET).map(SubMode::from_bits_retain)
    }

    pub fn set_sub_mode(&mut self, value: SubMode) -> Result<(), CdError> {
        self.set_subheader_byte(SUB_MODE_OFFSET, value.bits(), "sub-mode")
    }

    pub fn coding_info(&self) -> Option<CodingInfo> {
        self.subheader_byte(CODING_INFO_OFFSET)
            .map(CodingInfo::from_bits_retain)
    }

    pub fn set_coding_info(&mut self, value: CodingInfo) -> Result<(), CdError> {
        self.set_subheader_byte(CODING_INFO_OFFSET, value.bits(), "coding info")
    }

    /// Form of a Mode 2 sector; `None` for other modes.
    pub fn form(&self) -> Option<Form> {
        self.sub_mode().map(|sub_mode| {
            if sub_mode.contains(SubMode::FORM2) {
                Form::Form2
            } else {
                Form::Form1
            }
        })
    }

    pub fn set_form(&mut self, form: Form) -> Result<(), CdError> {
        let mut sub_mode = self.sub_mode().ok_or_else(|| {
            CdError::invalid_argument(format!("Cannot set form on a {:?} sector", self.mode()))
        })?;
        sub_mode.set(SubMode::FORM2, form == Form::Form2);
        self.set_sub_mode(sub_mode)
    }

    fn data_range(&self) -> Range<usize> {
        match (self.mode(), self.form()) {
            (Mode::Mode0, _) => MODE1_DATA_OFFSET..MODE1_DATA_OFFSET,
            (Mode::Mode1, _) => MODE1_DATA_OFFSET..MODE1_DATA_OFFSET + FORM1_DATA_SIZE,
            (Mode::Mode2, Some(Form::Form2)) => {
                MODE2_DATA_OFFSET..MODE2_DATA_OFFSET + FORM2_DATA_SIZE
            }
            (Mode::Mode2, _) => MODE2_DATA_OFFSET..MODE2_DATA_OFFSET + FORM1_DATA_SIZE,
        }
    }

    /// Capacity of the user data field in bytes.
    pub fn data_size(&self) -> usize {
        self.data_range().len()
    }

    /// The user data field.
    pub fn data(&self) -> &[u8] {
        &self.raw[self.data_range()]
    }

    /// Writable view of the user data field. Callers that modify it are
    /// responsible for calling [`Sector::update_edc`] afterwards.
    pub fn data_mut(&mut self) -> &mut [u8] {
        let range = self.data_range();
        &mut self.raw[range]
    }

    /// Bytes covered by the EDC and the offset where it is stored.
    fn edc_layout(&self) -> Option<(Range<usize>, usize)> {
        match (self.mode(), self.form()) {
            (Mode::Mode0, _) => None,
            (Mode::Mode1, _) => Some((0..0x810, 0x810)),
            (Mode::Mode2, Some(Form::Form2)) => Some((0x10..0x92C, 0x92C)),
            (Mode::Mode2, _) => Some((0x10..0x818, 0x818)),
        }
    }

    /// Stored EDC (zero for Mode 0).
    pub fn edc(&self) -> u32 {
        match self.edc_layout() {
            Some((_, at)) => u32::from_le_bytes([
                self.raw[at],
                self.raw[at + 1],
                self.raw[at + 2],
                self.raw[at + 3],
            ]),
            None => 0,
        }
    }

    /// EDC computed over the sector's current contents.
    pub fn calculate_edc(&self) -> u32 {
        let Some((range, _)) = self.edc_layout() else {
            return 0;
        };
        self.raw[range].iter().fold(0u32, |edc, &byte| {
            (edc >> 8) ^ EDC_TABLE[((edc ^ u32::from(byte)) & 0xFF) as usize]
        })
    }

    /// Recompute and store the EDC.
    ///
    /// The EDC of a Mode 2 Form 2 sector is optional; an absent (zero) one is
    /// left absent unless `force` is set.
    pub fn update_edc(&mut self, force: bool) {
        let Some((_, at)) = self.edc_layout() else {
            return;
        };
        if !force && self.form() == Some(Form::Form2) && self.edc() == 0 {
            return;
        }
        let edc = self.calculate_edc();
        self.raw[at..at + 4].copy_from_slice(&edc.to_le_bytes());
    }

    pub fn validate_edc(&self) -> bool {
        let edc = self.edc();
        if self.form() == Some(Form::Form2) && edc == 0 {
            return true;
        }
        edc == self.calculate_edc()
    }

    /// Copy mode, sub-header, data and error codes from `other` while keeping
    /// this sector's own address.
    pub fn copy_from(&mut self, other: &Sector) {
        self.raw[MODE_OFFSET..].copy_from_slice(&other.raw[MODE_OFFSET..]);
        // a Form 2 EDC doesn't cover the address, so the copied one stays valid
        if self.form() != Some(Form::Form2) {
            self.update_edc(false);
        }
    }
}

impl fmt::Debug for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Sector");
        match self.msf() {
            Some(msf) => debug.field("msf", &format_args!("{msf}")),
            None => debug.field("msf", &"invalid"),
        };
        debug.field("mode", &self.mode());
        if let Some(form) = self.form() {
            debug.field("form", &form);
        }
        debug.finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "tests/sector_tests.rs"]
mod tests;
