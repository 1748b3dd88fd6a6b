//! End-to-end scenarios against the public `Engine` API, exercising the
//! medium through `support::MemoryPort` the way a host firmware would
//! drive the engine over its storage peripheral.

mod support;

use fram_store::format::record::{frame_size, write_record, RecordHeader};
use fram_store::format::{header, IndexTable};
use fram_store::{EngineConfig, EngineError, EngineState, InitOutcome, MetaEntry, Migrator};
use support::MemoryPort;

const WIDGET_TAG: u16 = 0x1001;
const BLOB_TAG: u16 = 0x4001;

struct AppendByte;
impl Migrator for AppendByte {
    fn upgrade_step(&self, buf: &mut [u8], old_len: usize, max_size: usize, _old_version: u8) -> Result<usize, EngineError> {
        let new_len = old_len + 1;
        if new_len > max_size {
            return Err(EngineError::NoBufferMemory { required: new_len as u32 });
        }
        buf[old_len] = old_len as u8;
        Ok(new_len)
    }
}
static APPEND_BYTE: AppendByte = AppendByte;

static TABLE: &[MetaEntry] = &[
    MetaEntry {
        tag: WIDGET_TAG,
        max_length: 64,
        priority: 0,
        version: 1,
        backup: false,
        name: "widget_count",
        migrator: None,
    },
    MetaEntry {
        tag: BLOB_TAG,
        max_length: 256,
        priority: 0,
        version: 3,
        backup: true,
        name: "stream_blob",
        migrator: Some(&APPEND_BYTE),
    },
];

fn new_engine() -> fram_store::Engine<MemoryPort, &'static [MetaEntry]> {
    let port = MemoryPort::new(0x40000);
    fram_store::Engine::new(port, TABLE, EngineConfig::default())
}

#[test]
fn s1_fresh_boot_then_write_and_read_back() {
    let mut e = new_engine();

    assert_eq!(e.init().unwrap(), InitOutcome::FirstBoot);
    assert_eq!(e.get_state(), EngineState::Uninitialised);

    e.format(0).unwrap();
    assert_eq!(e.init().unwrap(), InitOutcome::Ok);
    assert_eq!(e.get_state(), EngineState::Initialised);

    e.write(WIDGET_TAG, &[0x78, 0x56, 0x34, 0x12]).unwrap();

    let mut buf = [0u8; 8];
    let len = e.read(WIDGET_TAG, &mut buf).unwrap();
    assert_eq!(len, 4);
    assert_eq!(&buf[..4], &[0x78, 0x56, 0x34, 0x12]);
}

#[test]
fn s2_in_place_update_shrinks_used_space_without_fragmenting() {
    let mut e = new_engine();
    e.format(0).unwrap();
    e.init().unwrap();
    e.write(WIDGET_TAG, &[0x78, 0x56, 0x34, 0x12]).unwrap();

    let used_before = e.get_used_space();
    let fragments_before = e.get_statistics().fragment_count;

    // A same-or-smaller payload fits the already-allocated frame in place.
    e.write(WIDGET_TAG, &[0xAA, 0xBB]).unwrap();

    assert_eq!(e.get_used_space(), used_before - 2);
    assert_eq!(e.get_statistics().fragment_count, fragments_before);

    let mut buf = [0u8; 8];
    let len = e.read(WIDGET_TAG, &mut buf).unwrap();
    assert_eq!(&buf[..len], &[0xAA, 0xBB]);
}

#[test]
fn s3_grow_and_displace_marks_the_old_frame_as_a_fragment() {
    let mut e = new_engine();
    e.format(0).unwrap();
    e.init().unwrap();
    e.write(WIDGET_TAG, &[0x78, 0x56, 0x34, 0x12]).unwrap();
    let old_frame = 14 + 4 + 2; // header + payload + trailing CRC

    let big: Vec<u8> = (0..40u8).collect();
    e.write(WIDGET_TAG, &big).unwrap();

    let stats = e.get_statistics();
    assert_eq!(stats.fragment_count, 1);
    assert_eq!(stats.fragment_size, old_frame);

    let mut buf = [0u8; 64];
    let len = e.read(WIDGET_TAG, &mut buf).unwrap();
    assert_eq!(&buf[..len], &big[..]);
}

#[test]
fn s4_chunked_write_then_chunked_read_round_trips() {
    let mut e = new_engine();
    e.format(0).unwrap();
    e.init().unwrap();

    let payload: Vec<u8> = (0u8..128).collect();
    let token = e.write_begin(BLOB_TAG, 128).unwrap();
    for chunk in payload.chunks(20) {
        e.write_chunk(token, chunk).unwrap();
    }
    e.write_end(token).unwrap();

    let (read_token, total) = e.read_begin(BLOB_TAG).unwrap();
    assert_eq!(total, 128);

    let mut reconstructed = Vec::new();
    let mut buf = [0u8; 32];
    for _ in 0..4 {
        let n = e.read_chunk(read_token, &mut buf).unwrap();
        reconstructed.extend_from_slice(&buf[..n]);
    }
    e.read_end(read_token).unwrap();

    assert_eq!(reconstructed, payload);
}

#[test]
fn s5_migration_on_read_rewrites_the_stored_record_once() {
    // Hand-assemble a medium that already holds a BLOB_TAG record stamped
    // at schema version 1, as if written by an older firmware build, then
    // boot an engine whose meta table declares version 3 with two
    // migration steps (1->2, 2->3) registered on `AppendByte`.
    let config = EngineConfig::default();
    let mut port = MemoryPort::new(0x40000);

    let stored_header = RecordHeader {
        tag: BLOB_TAG,
        payload_len: 1,
        version: 1,
        flags: 0,
        timestamp: 0,
        write_counter: 1,
    };
    write_record(&mut port, config.data_addr, &stored_header, &[0x01]).unwrap();

    let frame = frame_size(1);
    let mut index = IndexTable::new();
    index.add(BLOB_TAG, config.data_addr, 1).unwrap();
    index.save(&mut port, config.index_addr).unwrap();

    let mut head = header::SystemHeader::new(&config, header::MAGIC);
    head.tag_count = 1;
    head.next_free_addr = config.data_addr + frame;
    head.used_space = frame;
    head.free_space = config.data_region_size - frame;
    head.save(&mut port, config.header_addr).unwrap();

    let mut e = fram_store::Engine::new(port, TABLE, config);
    assert_eq!(e.init().unwrap(), InitOutcome::Ok);

    let mut buf = [0u8; 256];
    let len = e.read(BLOB_TAG, &mut buf).unwrap();
    assert_eq!(len, 3);
    assert_eq!(&buf[..3], &[0x01, 0x01, 0x02]);

    // A second read touches no migration code: same bytes, same length.
    let len2 = e.read(BLOB_TAG, &mut buf).unwrap();
    assert_eq!(len2, 3);
    assert_eq!(&buf[..3], &[0x01, 0x01, 0x02]);
}

#[test]
fn s6_defragment_reclaims_every_other_deleted_record() {
    let tags: Vec<u16> = (0..10).map(|i| 0x2000 + i as u16).collect();
    let dyn_table: Vec<MetaEntry> = tags
        .iter()
        .map(|&tag| MetaEntry {
            tag,
            max_length: 32,
            priority: 0,
            version: 1,
            backup: false,
            name: "scratch",
            migrator: None,
        })
        .collect();
    let leaked: &'static [MetaEntry] = Box::leak(dyn_table.into_boxed_slice());

    let port = MemoryPort::new(0x40000);
    let mut e = fram_store::Engine::new(port, leaked, EngineConfig::default());
    e.format(0).unwrap();
    e.init().unwrap();

    for &tag in &tags {
        e.write(tag, &[tag as u8; 8]).unwrap();
    }
    for (i, &tag) in tags.iter().enumerate() {
        if i % 2 == 0 {
            e.delete(tag).unwrap();
        }
    }

    assert!(e.calculate_fragmentation() > 0);

    let remaining_count = tags.iter().enumerate().filter(|(i, _)| i % 2 != 0).count();
    let expected_used_space = remaining_count as u32 * (14 + 8 + 2);

    let report = e.defragment().unwrap();
    assert!(report.relocated > 0 || report.reclaimed_bytes > 0);

    let stats = e.get_statistics();
    assert_eq!(stats.fragment_count, 0);
    assert_eq!(stats.fragment_size, 0);
    assert_eq!(e.get_used_space(), expected_used_space);

    for (i, &tag) in tags.iter().enumerate() {
        if i % 2 != 0 {
            let mut buf = [0u8; 8];
            let len = e.read(tag, &mut buf).unwrap();
            assert_eq!(&buf[..len], &[tag as u8; 8]);
        }
    }
}

#[test]
fn power_loss_mid_commit_leaves_the_previous_record_intact() {
    let config = EngineConfig::default();
    let mut port = MemoryPort::new(0x40000);

    let stored_header = RecordHeader {
        tag: WIDGET_TAG,
        payload_len: 3,
        version: 1,
        flags: 0,
        timestamp: 0,
        write_counter: 1,
    };
    write_record(&mut port, config.data_addr, &stored_header, &[1, 2, 3]).unwrap();

    let frame = frame_size(3);
    let mut index = IndexTable::new();
    index.add(WIDGET_TAG, config.data_addr, 1).unwrap();
    index.save(&mut port, config.index_addr).unwrap();

    let mut head = header::SystemHeader::new(&config, header::MAGIC);
    head.tag_count = 1;
    head.next_free_addr = config.data_addr + frame;
    head.used_space = frame;
    head.free_space = config.data_region_size - frame;
    head.save(&mut port, config.header_addr).unwrap();

    // Every write from here on simulates the driver dying mid-commit.
    let writes_so_far = port.writes_done();
    port.fail_after_writes(writes_so_far);

    let mut e = fram_store::Engine::new(port, TABLE, config);
    assert_eq!(e.init().unwrap(), InitOutcome::Ok);

    let result = e.write(WIDGET_TAG, &[9, 9, 9, 9, 9]);
    assert!(result.is_err());

    // Nothing was durably overwritten: the previously committed record is
    // still intact and readable.
    let mut buf = [0u8; 8];
    let len = e.read(WIDGET_TAG, &mut buf).unwrap();
    assert_eq!(&buf[..len], &[1, 2, 3]);
}

#[test]
fn restore_from_backup_recovers_from_a_corrupted_index() {
    let config = EngineConfig::default();
    let mut port = MemoryPort::new(0x40000);
    let backup_offset = config.backup_addr - config.header_addr;

    let stored_header = RecordHeader {
        tag: WIDGET_TAG,
        payload_len: 3,
        version: 1,
        flags: 0,
        timestamp: 0,
        write_counter: 1,
    };
    let frame = frame_size(3);

    let mut index = IndexTable::new();
    index.add(WIDGET_TAG, config.data_addr, 1).unwrap();

    let mut head = header::SystemHeader::new(&config, header::MAGIC);
    head.tag_count = 1;
    head.next_free_addr = config.data_addr + frame;
    head.used_space = frame;
    head.free_space = config.data_region_size - frame;

    // Primary region.
    write_record(&mut port, config.data_addr, &stored_header, &[7, 7, 7]).unwrap();
    index.save(&mut port, config.index_addr).unwrap();
    head.save(&mut port, config.header_addr).unwrap();

    // Backup region: an identical mirror at a fixed offset.
    write_record(&mut port, config.data_addr + backup_offset, &stored_header, &[7, 7, 7]).unwrap();
    index.save(&mut port, config.index_addr + backup_offset).unwrap();
    head.save(&mut port, config.header_addr + backup_offset).unwrap();

    // Corrupt only the primary Index's CRC-covered body.
    port.corrupt_byte(config.index_addr);

    let mut e = fram_store::Engine::new(port, TABLE, config);
    let outcome = e.init().unwrap();
    assert_eq!(outcome, InitOutcome::Recovered);

    let mut buf = [0u8; 8];
    let len = e.read(WIDGET_TAG, &mut buf).unwrap();
    assert_eq!(&buf[..len], &[7, 7, 7]);
}
