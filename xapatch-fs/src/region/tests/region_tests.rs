use super::*;
use xapatch_core::ErrorKind;

// -- Test helpers --

/// A Form 1 sector at `lba` whose data field starts with `tag`.
fn tagged(lba: u32, tag: u8) -> Sector {
    let mut sector = Sector::at_lba(lba, Mode::Mode2, Some(Form::Form1));
    sector.data_mut()[0] = tag;
    sector.update_edc(false);
    sector
}

/// A file region of `count` sectors from `start`, tagged 0, 1, 2...
fn file_region(start: u32, count: u32) -> Region {
    let sectors = (0..count).map(|i| tagged(start + i, i as u8)).collect();
    Region::new(start, sectors, RegionKind::File)
}

fn tags(sectors: &[Sector]) -> Vec<u8> {
    sectors.iter().map(|s| s.data()[0]).collect()
}

fn addresses(sectors: &[Sector]) -> Vec<u32> {
    sectors
        .iter()
        .map(|s| s.msf().and_then(|msf| msf.to_lba()).unwrap())
        .collect()
}

// -- Geometry --

#[test]
fn size_and_bounds() {
    let region = file_region(10, 3);
    assert_eq!(region.size(), 3);
    assert_eq!(region.start(), 10);
    assert_eq!(region.end(), 12);
    assert_eq!(region.next_start(), 13);
    assert_eq!(region.data_capacity(), 3 * 0x800);
}

#[test]
fn empty_region_ends_before_start() {
    let region = Region::free(10, Vec::new());
    assert_eq!(region.size(), 0);
    assert_eq!(region.end(), 9);
    assert_eq!(region.next_start(), 10);
}

#[test]
fn data_size_prefers_byte_len() {
    let mut region = file_region(0, 2);
    assert_eq!(region.data_size(), 0x1000);
    region.byte_len = Some(5);
    assert_eq!(region.data_size(), 5);
    assert_eq!(region.data().len(), 5);
    assert_eq!(region.data()[0], 0);
}

// -- Shrinking --

#[test]
fn shrink_front_without_shift_drops_leading_content() {
    let mut region = file_region(10, 4);
    let removed = region.shrink_front(1, false).unwrap();
    assert_eq!(tags(&removed), [0]);
    assert_eq!(region.start(), 11);
    assert_eq!(tags(region.sectors()), [1, 2, 3]);
}

#[test]
fn shrink_front_with_shift_keeps_leading_content() {
    let mut region = file_region(10, 4);
    let removed = region.shrink_front(2, true).unwrap();
    assert_eq!(addresses(&removed), [10, 11]);
    assert_eq!(region.start(), 12);
    assert_eq!(addresses(region.sectors()), [12, 13]);
    assert_eq!(tags(region.sectors()), [0, 1]);
    assert!(region.sectors().iter().all(Sector::validate_edc));
}

#[test]
fn shrink_back_detaches_tail() {
    let mut region = file_region(10, 4);
    let removed = region.shrink_back(1).unwrap();
    assert_eq!(addresses(&removed), [13]);
    assert_eq!(region.start(), 10);
    assert_eq!(region.size(), 3);
}

#[test]
fn shrink_beyond_size_fails() {
    let mut region = file_region(10, 2);
    let err = region.shrink_front(3, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = region.shrink_back(3).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(region.size(), 2);
}

#[test]
fn shrink_to_nothing() {
    let mut region = file_region(10, 2);
    let removed = region.shrink_front(2, true).unwrap();
    assert_eq!(removed.len(), 2);
    assert_eq!(region.size(), 0);
    assert_eq!(region.start(), 12);
}

// -- Growing --

#[test]
fn grow_front_with_shift_moves_content_to_new_start() {
    let mut region = file_region(12, 2);
    region.grow_front(vec![tagged(10, 9), tagged(11, 9)], true);
    assert_eq!(region.start(), 10);
    assert_eq!(addresses(region.sectors()), [10, 11, 12, 13]);
    assert_eq!(&tags(region.sectors())[..2], [0, 1]);
}

#[test]
fn grow_front_without_shift_keeps_content_in_place() {
    let mut region = file_region(12, 2);
    region.grow_front(vec![tagged(10, 9), tagged(11, 9)], false);
    assert_eq!(region.start(), 10);
    assert_eq!(tags(region.sectors()), [9, 9, 0, 1]);
}

#[test]
fn grow_back_appends() {
    let mut region = file_region(10, 1);
    region.grow_back(vec![tagged(11, 7)]);
    assert_eq!(region.size(), 2);
    assert_eq!(tags(region.sectors()), [0, 7]);
}

// -- Patching --

#[test]
fn patch_sectors_keeps_addresses_and_clears_file_length() {
    let mut region = file_region(10, 3);
    region.byte_len = Some(100);
    region
        .patch_sectors(&[tagged(200, 7), tagged(201, 8)])
        .unwrap();
    assert_eq!(tags(region.sectors()), [7, 8, 2]);
    assert_eq!(addresses(region.sectors()), [10, 11, 12]);
    assert_eq!(region.byte_len, None);
    assert_eq!(region.data_size(), 3 * 0x800);
}

#[test]
fn patch_sectors_rejects_oversized_input() {
    let mut region = file_region(10, 1);
    let err = region
        .patch_sectors(&[tagged(0, 1), tagged(1, 2)])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn patch_data_spans_sectors_and_sets_length() {
    let mut region = file_region(10, 2);
    let data = vec![0xAA; 0x900];
    region.patch_data(&data).unwrap();

    assert_eq!(region.byte_len, Some(0x900));
    assert_eq!(region.data(), data);
    let second = region.sectors()[1].data();
    assert!(second[..0x100].iter().all(|&b| b == 0xAA));
    assert!(second[0x100..].iter().all(|&b| b == 0));
    assert!(region.sectors().iter().all(Sector::validate_edc));
}

#[test]
fn patch_data_reformats_form2_sectors() {
    let mut sector = Sector::at_lba(10, Mode::Mode2, Some(Form::Form2));
    sector.update_edc(true);
    let mut region = Region::new(10, vec![sector], RegionKind::File);
    region.patch_data(b"abc").unwrap();

    let sector = &region.sectors()[0];
    assert_eq!(sector.form(), Some(Form::Form1));
    assert_eq!(&sector.data()[..3], b"abc");
    assert!(sector.validate_edc());
}

#[test]
fn patch_data_rejects_oversized_input() {
    let mut region = file_region(10, 1);
    let err = region.patch_data(&vec![0; 0x801]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn patch_data_on_free_region_leaves_length_unset() {
    let mut region = Region::free(10, vec![tagged(10, 0)]);
    region.patch_data(b"xyz").unwrap();
    assert_eq!(region.byte_len, None);
}

// -- Field access --

#[test]
fn write_field_straddles_sector_boundary() {
    let mut region = file_region(10, 2);
    let bytes = [1, 2, 3, 4, 5, 6, 7, 8];
    region.write_field(0, 0x7FC, &bytes).unwrap();

    assert_eq!(&region.sectors()[0].data()[0x7FC..], &bytes[..4]);
    assert_eq!(&region.sectors()[1].data()[..4], &bytes[4..]);
    assert_eq!(region.read_field(0, 0x7FC, 8).unwrap(), bytes);
    assert!(region.sectors().iter().all(Sector::validate_edc));
}

#[test]
fn field_offsets_may_point_past_a_sector() {
    let mut region = file_region(10, 2);
    region.write_field(0, 0x805, &[0xEE]).unwrap();
    assert_eq!(region.sectors()[1].data()[5], 0xEE);
    assert_eq!(region.read_field(1, 5, 1).unwrap(), [0xEE]);
}

#[test]
fn field_past_region_end_fails() {
    let mut region = file_region(10, 1);
    assert!(region.write_field(0, 0x7FF, &[1, 2]).is_err());
    assert!(region.read_field(0, 0x7FF, 2).is_err());
}

#[test]
fn locate_maps_flat_offsets() {
    let region = file_region(0, 3);
    assert_eq!(region.locate(0), (0, 0));
    assert_eq!(region.locate(0x7FF), (0, 0x7FF));
    assert_eq!(region.locate(0x805), (1, 5));
}

// -- Display --

#[test]
fn display_lists_bounds_kind_and_name() {
    let mut region = file_region(10, 2);
    region.name = Some("VOL:\\A.BIN;1".to_string());
    assert_eq!(region.to_string(), "000010-000011 (00002): File (VOL:\\A.BIN;1)");

    let free = Region::free(12, vec![tagged(12, 0)]);
    assert_eq!(free.to_string(), "000012-000012 (00001): Free");
}

#[test]
fn only_fixed_structures_are_immovable() {
    assert!(file_region(0, 1).is_movable());
    assert!(Region::free(0, Vec::new()).is_movable());
    let area = Region::new(0, Vec::new(), RegionKind::SystemArea(SystemArea::default()));
    assert!(!area.is_movable());
}
