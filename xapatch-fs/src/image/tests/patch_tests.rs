use super::*;
use crate::fixture::{self, FixtureFile, ImageBuilder, both_endian, find_record, sector_data};
use std::io::Cursor;
use xapatch_core::{ErrorKind, Form, Mode, SECTOR_SIZE, SubMode};

// -- Test helpers --

fn open(bytes: &[u8]) -> DiscImage {
    DiscImage::open(&mut Cursor::new(bytes.to_vec())).unwrap()
}

fn written(image: &mut DiscImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write(&mut out).unwrap();
    out.into_inner()
}

fn patched(bytes: &[u8], patches: Vec<Patch>) -> Vec<u8> {
    let mut image = open(bytes);
    image.patch(patches).unwrap();
    written(&mut image)
}

fn layout(image: &DiscImage) -> Vec<String> {
    image.regions().map(ToString::to_string).collect()
}

/// Raw Form 1 sectors whose data fields are filled with `fill`.
fn raw_sectors(count: u32, fill: u8) -> Vec<u8> {
    let mut raw = Vec::new();
    for lba in 0..count {
        let mut sector = Sector::at_lba(lba, Mode::Mode2, Some(Form::Form1));
        sector.set_sub_mode(SubMode::DATA).unwrap();
        sector.data_mut().fill(fill);
        sector.update_edc(false);
        raw.extend_from_slice(sector.raw());
    }
    raw
}

/// Rewrite sector `lba` of `image` as Mode 2 Form 2, keeping its address.
fn to_form2(image: &mut [u8], lba: u32) {
    let range = lba as usize * SECTOR_SIZE..(lba as usize + 1) * SECTOR_SIZE;
    let mut sector = Sector::from_bytes(&image[range.clone()]).unwrap();
    sector.set_form(Form::Form2).unwrap();
    sector.update_edc(false);
    image[range].copy_from_slice(sector.raw());
}

fn tight_image() -> Vec<u8> {
    let mut builder = ImageBuilder::sample();
    builder.total_sectors = 29;
    builder.build()
}

// -- Patches that fit in place --

#[test]
fn longer_data_in_same_sector() {
    let data = b"this is the test data\n".to_vec();
    let out = patched(&fixture::sample_image(), vec![Patch::data("\\TEST.TXT;1", data.clone())]);

    assert_eq!(find_record(&sector_data(&out, 22), b"TEST.TXT;1"), Some((24, 22)));
    let image = open(&out);
    let text = image.region("\\TEST.TXT").unwrap();
    assert_eq!(text.data_size(), 22);
    assert_eq!(text.data(), data);
    image.verify_layout().unwrap();
}

#[test]
fn identical_content_leaves_image_unchanged() {
    let bytes = fixture::sample_image();
    let out = patched(&bytes, vec![Patch::data("\\TEST.TXT", b"hello world".to_vec())]);
    assert_eq!(out, bytes);
}

#[test]
fn shrinking_releases_sectors() {
    let out = patched(
        &fixture::sample_image(),
        vec![Patch::data("\\DATA\\BIG.BIN", b"0123456789".to_vec())],
    );
    assert_eq!(find_record(&sector_data(&out, 23), b"BIG.BIN;1"), Some((27, 10)));
    let image = open(&out);
    assert_eq!(
        &layout(&image)[10..],
        [
            "000027-000027 (00001): File (01_05_2022:\\DATA\\BIG.BIN;1)",
            "000028-000033 (00006): Free",
        ]
    );
}

#[test]
fn raw_sectors_replace_file_content() {
    let raw = raw_sectors(2, 0x77);
    let out = patched(&fixture::sample_image(), vec![Patch::raw("\\DATA\\BIG.BIN;1", raw)]);

    assert_eq!(find_record(&sector_data(&out, 23), b"BIG.BIN;1"), Some((27, 0x1000)));
    let image = open(&out);
    let big = image.region("\\DATA\\BIG.BIN").unwrap();
    assert_eq!(big.data_size(), 0x1000);
    assert!(big.data().iter().all(|&b| b == 0x77));
    // The file keeps its own sector addresses.
    assert_eq!(big.sectors()[1].msf().and_then(|m| m.to_lba()), Some(28));
}

// -- Relocation --

#[test]
fn growth_moves_following_file_forward() {
    let data = vec![0x5A; 0x2400];
    let out = patched(&fixture::sample_image(), vec![Patch::data("\\TEST.TXT", data.clone())]);

    assert_eq!(find_record(&sector_data(&out, 22), b"TEST.TXT;1"), Some((24, 0x2400)));
    assert_eq!(find_record(&sector_data(&out, 23), b"BIG.BIN;1"), Some((29, 4000)));

    let image = open(&out);
    assert_eq!(image.region("\\TEST.TXT").unwrap().data(), data);
    let big = image.region("\\DATA\\BIG.BIN").unwrap();
    assert_eq!(big.start(), 29);
    assert_eq!(big.data(), fixture::big_bin());
}

#[test]
fn aliased_records_follow_their_extent() {
    let mut builder = ImageBuilder::sample();
    builder.files.push(FixtureFile {
        dir: 0,
        name: "ALIAS.BIN;1",
        lba: 27,
        data: fixture::big_bin(),
    });
    let out = patched(
        &builder.build(),
        vec![Patch::data("\\TEST.TXT", vec![0x5A; 0x2400])],
    );

    assert_eq!(find_record(&sector_data(&out, 23), b"BIG.BIN;1"), Some((29, 4000)));
    assert_eq!(find_record(&sector_data(&out, 22), b"ALIAS.BIN;1"), Some((29, 4000)));
    assert_eq!(sector_data(&out, 29), &fixture::big_bin()[..0x800]);
    open(&out).verify_layout().unwrap();
}

#[test]
fn growth_moves_directories_backward() {
    let out = patched(
        &tight_image(),
        vec![Patch::data("\\DATA\\BIG.BIN", vec![0x33; 6 * 0x800])],
    );

    let pvd = sector_data(&out, 16);
    assert_eq!(&pvd[158..166], &both_endian(20));

    let l_table = sector_data(&out, 18);
    assert_eq!(&l_table[2..6], &20u32.to_le_bytes());
    assert_eq!(&l_table[12..16], &21u32.to_le_bytes());
    let m_table = sector_data(&out, 19);
    assert_eq!(&m_table[2..6], &20u32.to_be_bytes());
    assert_eq!(&m_table[12..16], &21u32.to_be_bytes());
    // Parent numbers stay as they were.
    assert_eq!(&l_table[16..18], &1u16.to_le_bytes());

    let root = sector_data(&out, 20);
    assert_eq!(find_record(&root, &[0]), Some((20, 0x800)));
    assert_eq!(find_record(&root, &[1]), Some((20, 0x800)));
    assert_eq!(find_record(&root, b"DATA"), Some((21, 0x800)));
    assert_eq!(find_record(&root, b"TEST.TXT;1"), Some((22, 11)));

    let data_dir = sector_data(&out, 21);
    assert_eq!(find_record(&data_dir, &[0]), Some((21, 0x800)));
    assert_eq!(find_record(&data_dir, &[1]), Some((20, 0x800)));
    assert_eq!(find_record(&data_dir, b"BIG.BIN;1"), Some((23, 6 * 0x800)));

    let image = open(&out);
    image.verify_layout().unwrap();
    assert_eq!(image.region("\\TEST.TXT").unwrap().data(), b"hello world");
    assert_eq!(image.num_sectors(), 29);
}

#[test]
fn shrinks_apply_before_growth() {
    let bytes = fixture::sample_image();
    let text = vec![0xC3; 10 * 0x800 + 1];

    // Alone, the growth doesn't fit.
    let mut image = open(&bytes);
    let err = image
        .patch(vec![Patch::data("\\TEST.TXT", text.clone())])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);

    let out = patched(
        &bytes,
        vec![
            Patch::data("\\TEST.TXT", text.clone()),
            Patch::data("\\DATA\\BIG.BIN", b"tiny".to_vec()),
        ],
    );
    let image = open(&out);
    assert_eq!(
        &layout(&image)[5..],
        [
            "000020-000020 (00001): Directory (01_05_2022:\\)",
            "000021-000021 (00001): Directory (01_05_2022:\\DATA)",
            "000022-000032 (00011): File (01_05_2022:\\TEST.TXT;1)",
            "000033-000033 (00001): File (01_05_2022:\\DATA\\BIG.BIN;1)",
        ]
    );
    assert_eq!(image.region("\\TEST.TXT").unwrap().data(), text);
    assert_eq!(image.region("\\DATA\\BIG.BIN").unwrap().data(), b"tiny");
}

#[test]
fn volume_space_size_only_rises() {
    let mut builder = ImageBuilder::sample();
    builder.space_size = Some(29);
    let bytes = builder.build();

    let out = patched(&bytes, vec![Patch::data("\\DATA\\BIG.BIN", vec![1; 6 * 0x800])]);
    assert_eq!(&sector_data(&out, 16)[80..88], &both_endian(33));

    let out = patched(&out, vec![Patch::data("\\DATA\\BIG.BIN", vec![2; 10])]);
    assert_eq!(&sector_data(&out, 16)[80..88], &both_endian(33));
}

#[test]
fn form2_file_growing_at_same_length_raises_space_size() {
    // 4600 bytes fit in two Form 2 sectors but need three in Form 1.
    let mut builder = ImageBuilder::sample();
    builder.space_size = Some(31);
    builder.files.push(FixtureFile {
        dir: 0,
        name: "XA.STR;1",
        lba: 29,
        data: vec![0x44; 4600],
    });
    let mut bytes = builder.build();
    to_form2(&mut bytes, 29);
    to_form2(&mut bytes, 30);
    assert_eq!(open(&bytes).region("\\XA.STR").unwrap().size(), 2);

    let out = patched(&bytes, vec![Patch::data("\\XA.STR", vec![0x55; 4600])]);
    assert_eq!(find_record(&sector_data(&out, 22), b"XA.STR;1"), Some((29, 4600)));
    assert_eq!(&sector_data(&out, 16)[80..88], &both_endian(32));
    let image = open(&out);
    assert_eq!(image.region("\\XA.STR").unwrap().size(), 3);
}

#[test]
fn metadata_failures_reach_the_caller() {
    let mut image = open(&tight_image());
    // Point the path table records for \DATA past the end of their tables.
    for &id in &image.layout {
        if let crate::region::RegionKind::PathTable(table) = &mut image.arena[id].kind {
            table.name_map.insert("\\DATA".to_string(), (5, 0));
        }
    }

    let err = image
        .patch(vec![Patch::data("\\DATA\\BIG.BIN", vec![0x33; 6 * 0x800])])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FormatViolation);
}

// -- Rejected batches --

#[test]
fn raw_patch_must_be_whole_sectors() {
    let bytes = fixture::sample_image();
    let mut image = open(&bytes);
    let err = image
        .patch(vec![Patch::raw("\\TEST.TXT", vec![0; 100])])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(written(&mut image), bytes);
}

#[test]
fn unknown_path_rejects_whole_batch() {
    let bytes = fixture::sample_image();
    let mut image = open(&bytes);
    let err = image
        .patch(vec![
            Patch::data("\\TEST.TXT", b"changed".to_vec()),
            Patch::data("\\NOPE.BIN", b"x".to_vec()),
        ])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(image.region("\\TEST.TXT").unwrap().data(), b"hello world");
    assert_eq!(written(&mut image), bytes);
}

#[test]
fn directories_cannot_be_patched() {
    let mut image = open(&fixture::sample_image());
    let err = image
        .patch(vec![Patch::data("\\DATA", b"x".to_vec())])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn sector_counts() {
    assert_eq!(Patch::data("a", Vec::new()).num_sectors(), 0);
    assert_eq!(Patch::data("a", vec![0; 0x800]).num_sectors(), 1);
    assert_eq!(Patch::data("a", vec![0; 0x801]).num_sectors(), 2);
    assert_eq!(Patch::raw("a", vec![0; 2 * SECTOR_SIZE]).num_sectors(), 2);
}
