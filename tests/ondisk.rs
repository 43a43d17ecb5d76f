//! Byte-level checks of the on-disk text format.

mod common;

use common::{fresh, image_path, pattern};
use textfs::{BLOCK_SIZE, FsError, FsOptions, RECORD_SPAN, S_IFREG, STATE_UNKNOWN, TextFs};

#[test]
fn metadata_region_is_bit_exact() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let img = image_path(&dir);
    TextFs::create(&img, 100, 20).unwrap();
    let text = std::fs::read_to_string(&img).unwrap();

    let head = "block-id: 0\n\
                Fragment-Type: partition-description\n\
                encoding: iso-8859-1\n\
                \n\
                block-id: 1\n\
                Fragment-Type: superblock\n\
                file system-state: 1\n\
                zone-bitmap-size_blocks: 1\n\
                inode-bitmap-size_blocks: 1\n\
                number-of-inodes: 20\n\
                number-of-blocks: 100\n\
                first-data-block: 24\n\
                \n\
                block-id: 2\n\
                Fragment-Type: zone-bitmap\n\
                free-blocks-in-file system: 75\n\
                000:\t";
    assert!(text.starts_with(head), "metadata head does not match");

    // zone bitmap: the root block's bit is set, 75 zones are clear, the
    // out-of-range tail stays preset
    assert!(text.contains(
        "free-blocks-in-file system: 75\n000:\t01 00 00 00 00 00 00 00  00 f0 ff ff ff ff ff ff"
    ));
    // inode bitmap: root set, 19 inodes clear, tail preset
    assert!(text.contains("Fragment-Type: inode-bitmap\n000:\t01 00 f0 ff"));

    // root inode record, fields in order
    assert!(text.contains(
        "block-id: 4\n\
         Fragment-Type: inode-1\n\
         file-type: 016877\n\
         links-to-file: 2\n\
         data-zone[0]: 24\n\
         data-zone[1]: 0\n"
    ));
    assert!(text.contains("\nfile-size-in-bytes: 064\n"));

    // an unallocated inode record is all zeroes
    assert!(text.contains(
        "Fragment-Type: inode-2\n\
         file-type: 000000\n\
         links-to-file: 0\n"
    ));

    // the root directory block: `.` and `..` slots for inode 1
    assert!(text.contains("block-id: 24\nFragment-Type: index-block\n000:\t01 00 2e 00"));
    assert!(text.contains("\n032:\t01 00 2e 2e 00"));
}

#[test]
fn data_grid_rows_have_fixed_geometry() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let img = image_path(&dir);
    TextFs::create(&img, 100, 20).unwrap();
    let text = std::fs::read_to_string(&img).unwrap();

    let at = text.find("Fragment-Type: index-block\n").unwrap();
    let grid = &text[at + "Fragment-Type: index-block\n".len()..];
    let rows: Vec<&str> = grid.lines().take(33).collect();
    for (i, row) in rows.iter().take(32).enumerate() {
        assert_eq!(row.len(), 73, "row {i} has the wrong width");
        assert!(row.starts_with(&format!("{:03}:\t", i * 16)));
        // the byte-7 gap: columns 28-29 are both blank
        assert_eq!(&row[28..30], "  ");
        assert_eq!(row.as_bytes()[72], b'|');
    }
    // a record's grid terminates with a blank line
    assert_eq!(rows[32], "");
}

#[test]
fn image_file_keeps_its_fixed_span() {
    let (dir, mut fs) = fresh(100, 20);
    let img = image_path(&dir);
    let span = 100 * RECORD_SPAN - 1;
    assert_eq!(std::fs::metadata(&img).unwrap().len() as usize, span);

    let ino = fs.make_node("/data.bin", S_IFREG | 0o644, 0, 0, 0).unwrap();
    for blk in 0..5 {
        fs.write_block(ino, blk, &pattern(blk as u8)).unwrap();
    }
    fs.truncate(ino, 5 * BLOCK_SIZE as u32).unwrap();
    fs.close().unwrap();
    assert_eq!(std::fs::metadata(&img).unwrap().len() as usize, span);
}

#[test]
fn rewrite_in_place_leaves_record_offsets_alone() {
    let (dir, mut fs) = fresh(100, 20);
    let img = image_path(&dir);

    let ino = fs.make_node("/data.bin", S_IFREG | 0o644, 0, 0, 0).unwrap();
    fs.write_block(ino, 0, &pattern(1)).unwrap();
    fs.truncate(ino, BLOCK_SIZE as u32).unwrap();
    fs.close().unwrap();

    let before = std::fs::read_to_string(&img).unwrap();
    let header = "block-id: 25\nFragment-Type: data-block-from-inode-2\n";
    let offset = before.find(header).expect("data record missing");
    assert_eq!(before.rfind(header), Some(offset), "record must be unique");

    let mut fs = TextFs::open(&img, FsOptions::default()).unwrap();
    fs.write_block(ino, 0, &pattern(200)).unwrap();
    fs.close().unwrap();

    let after = std::fs::read_to_string(&img).unwrap();
    assert_eq!(before.len(), after.len());
    assert_eq!(after.find(header), Some(offset));
    // same offsets, different payload
    assert_ne!(before[offset..offset + 200], after[offset..offset + 200]);

    let fs = TextFs::open(&img, FsOptions::default()).unwrap();
    let mut buf = [0u8; BLOCK_SIZE];
    fs.read_block(ino, 0, &mut buf).unwrap();
    assert_eq!(buf, pattern(200));
}

#[test]
fn missing_sentinel_marks_the_state_unknown() {
    let (dir, fs) = fresh(100, 20);
    let img = image_path(&dir);
    drop(fs);

    // cut the space padding off: no line starts with a blank anymore
    let text = std::fs::read_to_string(&img).unwrap();
    let cut = text.find("\n ").expect("fresh image must have a sentinel");
    std::fs::write(&img, &text[..cut + 1]).unwrap();

    assert!(matches!(
        TextFs::open(
            &img,
            FsOptions {
                fsbad_fatal: true,
                ..FsOptions::default()
            }
        ),
        Err(FsError::CorruptImage(_))
    ));

    let fs = TextFs::open(&img, FsOptions::default()).unwrap();
    assert_eq!(fs.superblock().state, STATE_UNKNOWN);

    // the unknown state is persisted on close and survives the round trip
    fs.close().unwrap();
    let text = std::fs::read_to_string(&img).unwrap();
    assert!(text.contains("\nfile system-state: 0\n"));
    let fs = TextFs::open(&img, FsOptions::default()).unwrap();
    assert_eq!(fs.superblock().state, STATE_UNKNOWN);
}

#[test]
fn reused_zones_keep_their_original_header() {
    let (dir, mut fs) = fresh(100, 20);
    let img = image_path(&dir);

    let first = fs.make_node("/one.bin", S_IFREG | 0o644, 0, 0, 0).unwrap();
    let second = fs.make_node("/two.bin", S_IFREG | 0o644, 0, 0, 0).unwrap();
    assert_ne!(first, second);
    fs.write_block(first, 0, &pattern(1)).unwrap();
    fs.truncate(first, BLOCK_SIZE as u32).unwrap();
    fs.unlink("/one.bin").unwrap();

    // the freed zone goes to a different inode by first fit; the stale
    // record is rewritten grid-in-place, so its header still names the
    // first owner
    fs.write_block(second, 0, &pattern(2)).unwrap();
    fs.truncate(second, BLOCK_SIZE as u32).unwrap();
    assert_eq!(fs.get_inode(second).unwrap().zones[0], 25);
    fs.close().unwrap();

    let text = std::fs::read_to_string(&img).unwrap();
    assert!(text.contains("block-id: 25\nFragment-Type: data-block-from-inode-2\n"));
    assert!(!text.contains("data-block-from-inode-3"));

    let fs = TextFs::open(&img, FsOptions::default()).unwrap();
    let mut buf = [0u8; BLOCK_SIZE];
    fs.read_block(second, 0, &mut buf).unwrap();
    assert_eq!(buf, pattern(2));
}
