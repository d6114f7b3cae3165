use crate::ErrorKind;
use super::*;

// -- Test helpers --

fn form1_sector(lba: u32) -> Sector {
    Sector::at_lba(lba, Mode::Mode2, Some(Form::Form1))
}

// -- BCD / MSF --

#[test]
fn bcd_round_trip() {
    assert_eq!(to_bcd(0), 0x00);
    assert_eq!(to_bcd(9), 0x09);
    assert_eq!(to_bcd(42), 0x42);
    assert_eq!(from_bcd(0x42), Some(42));
    assert_eq!(from_bcd(0x99), Some(99));
}

#[test]
fn bcd_rejects_invalid_nibbles() {
    assert_eq!(from_bcd(0x1A), None);
    assert_eq!(from_bcd(0xA1), None);
}

#[test]
fn msf_from_lba_includes_lead_in() {
    assert_eq!(Msf::from_lba(0), Msf::new(0, 2, 0));
    assert_eq!(Msf::from_lba(16), Msf::new(0, 2, 16));
    assert_eq!(Msf::from_lba(75), Msf::new(0, 3, 0));
    assert_eq!(Msf::from_lba(60 * 75), Msf::new(1, 2, 0));
}

#[test]
fn msf_to_lba() {
    assert_eq!(Msf::new(0, 2, 16).to_lba(), Some(16));
    assert_eq!(Msf::new(0, 1, 0).to_lba(), None);
    assert_eq!(Msf::from_lba(123_456).to_lba(), Some(123_456));
}

#[test]
fn msf_display() {
    assert_eq!(Msf::new(1, 2, 3).to_string(), "01:02:03");
}

// -- Construction and parsing --

#[test]
fn new_sector_has_sync_and_address() {
    let sector = Sector::new(Msf::new(1, 2, 3), Mode::Mode1, None);
    assert_eq!(sector.raw()[..12], SYNC_PATTERN);
    assert_eq!(sector.minute(), Some(1));
    assert_eq!(sector.second(), Some(2));
    assert_eq!(sector.sector(), Some(3));
    assert_eq!(sector.mode(), Mode::Mode1);
}

#[test]
fn from_bytes_round_trips_raw() {
    let sector = form1_sector(20);
    let parsed = Sector::from_bytes(sector.raw()).unwrap();
    assert_eq!(parsed, sector);
}

#[test]
fn from_bytes_rejects_bad_sync() {
    let mut raw = form1_sector(0).raw().to_vec();
    raw[3] = 0x00;
    let err = Sector::from_bytes(&raw).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FormatViolation);
}

#[test]
fn from_bytes_rejects_wrong_length() {
    let raw = vec![0u8; 2048];
    assert!(matches!(
        Sector::from_bytes(&raw),
        Err(CdError::InvalidFormat(_))
    ));
}

#[test]
fn from_bytes_rejects_unknown_mode() {
    let mut raw = form1_sector(0).raw().to_vec();
    raw[15] = 3;
    assert!(Sector::from_bytes(&raw).is_err());
}

// -- Sub-header --

#[test]
fn subheader_fields_only_on_mode2() {
    let mode1 = Sector::new(Msf::new(0, 2, 0), Mode::Mode1, None);
    assert_eq!(mode1.file_number(), None);
    assert_eq!(mode1.sub_mode(), None);
    assert_eq!(mode1.form(), None);

    let mut mode1 = mode1;
    let err = mode1.set_channel(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn subheader_setters_write_both_copies() {
    let mut sector = form1_sector(0);
    sector.set_file_number(1).unwrap();
    sector.set_channel(3).unwrap();
    sector
        .set_sub_mode(SubMode::DATA | SubMode::END_OF_RECORD)
        .unwrap();
    sector
        .set_coding_info(CodingInfo::STEREO | CodingInfo::RATE_18900)
        .unwrap();

    let raw = sector.raw();
    assert_eq!(raw[0x10..0x14], raw[0x14..0x18]);
    assert_eq!(sector.file_number(), Some(1));
    assert_eq!(sector.channel(), Some(3));
    assert_eq!(
        sector.sub_mode(),
        Some(SubMode::DATA | SubMode::END_OF_RECORD)
    );
    assert!(sector.coding_info().unwrap().contains(CodingInfo::STEREO));
}

#[test]
fn form_selects_data_size() {
    let mut sector = form1_sector(0);
    assert_eq!(sector.form(), Some(Form::Form1));
    assert_eq!(sector.data_size(), FORM1_DATA_SIZE);

    sector.set_form(Form::Form2).unwrap();
    assert_eq!(sector.form(), Some(Form::Form2));
    assert_eq!(sector.data_size(), FORM2_DATA_SIZE);
    assert!(sector.sub_mode().unwrap().contains(SubMode::FORM2));
}

#[test]
fn data_size_per_mode() {
    assert_eq!(Sector::at_lba(0, Mode::Mode0, None).data_size(), 0);
    assert_eq!(Sector::at_lba(0, Mode::Mode1, None).data_size(), 0x800);
    assert_eq!(
        Sector::at_lba(0, Mode::Mode2, Some(Form::Form2)).data_size(),
        0x914
    );
}

#[test]
fn data_window_offsets() {
    let mut mode1 = Sector::at_lba(0, Mode::Mode1, None);
    mode1.data_mut()[0] = 0xAB;
    assert_eq!(mode1.raw()[0x10], 0xAB);

    let mut mode2 = form1_sector(0);
    mode2.data_mut()[0] = 0xCD;
    assert_eq!(mode2.raw()[0x18], 0xCD);
}

// -- EDC --

#[test]
fn edc_known_value_mode2_form1() {
    let mut sector = form1_sector(16);
    sector.data_mut()[..11].copy_from_slice(b"hello world");
    sector.update_edc(false);
    assert_eq!(sector.edc(), 0x5BB2_2833);
    assert!(sector.validate_edc());
}

#[test]
fn edc_detects_modified_data() {
    let mut sector = form1_sector(16);
    sector.data_mut()[0] = 1;
    sector.update_edc(false);
    assert!(sector.validate_edc());

    sector.data_mut()[1] = 1;
    assert!(!sector.validate_edc());
}

#[test]
fn mode1_edc_covers_address() {
    let mut sector = Sector::at_lba(0, Mode::Mode1, None);
    let before = sector.edc();
    sector.set_address(Msf::new(10, 20, 30));
    assert_ne!(sector.edc(), before);
    assert!(sector.validate_edc());
}

#[test]
fn absent_form2_edc_is_valid_and_kept_absent() {
    let mut sector = Sector::at_lba(0, Mode::Mode2, Some(Form::Form2));
    sector.data_mut()[0] = 0x55;
    sector.update_edc(false);
    assert_eq!(sector.edc(), 0);
    assert!(sector.validate_edc());

    sector.update_edc(true);
    assert_ne!(sector.edc(), 0);
    assert!(sector.validate_edc());
}

#[test]
fn mode0_has_no_edc() {
    let sector = Sector::at_lba(0, Mode::Mode0, None);
    assert_eq!(sector.edc(), 0);
    assert_eq!(sector.calculate_edc(), 0);
    assert!(sector.validate_edc());
}

// -- copy_from --

#[test]
fn copy_from_keeps_address() {
    let mut target = form1_sector(30);
    let mut source = form1_sector(100);
    source.data_mut()[..4].copy_from_slice(b"DATA");
    source.set_file_number(7).unwrap();

    target.copy_from(&source);
    assert_eq!(target.msf(), Some(Msf::from_lba(30)));
    assert_eq!(&target.data()[..4], b"DATA");
    assert_eq!(target.file_number(), Some(7));
    assert!(target.validate_edc());
}

#[test]
fn copy_from_changes_mode() {
    let mut target = Sector::at_lba(5, Mode::Mode0, None);
    let source = form1_sector(9);
    target.copy_from(&source);
    assert_eq!(target.mode(), Mode::Mode2);
    assert_eq!(target.msf(), Some(Msf::from_lba(5)));
}
