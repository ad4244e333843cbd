use pgbackrest_core::block_delta::{plan, BlockMapItem};

fn make_map(n: u64, checksum_size: usize) -> Vec<BlockMapItem> {
    (0..n)
        .map(|i| BlockMapItem {
            block_no: i,
            offset: i * 4096,
            size: 4096,
            super_block_size: 4096,
            reference: 0,
            bundle_id: 0,
            checksum: vec![(i % 256) as u8; checksum_size],
        })
        .collect()
}

#[test]
fn unchanged_checksums_need_no_reads() {
    let checksum_size = 20;
    let map = make_map(8, checksum_size);
    let existing: Vec<u8> = map.iter().flat_map(|b| b.checksum.clone()).collect();

    let delta = plan(&map, 4096, checksum_size, Some(&existing));
    assert!(delta.reads.is_empty());
}

#[test]
fn no_existing_checksums_needs_every_block() {
    let checksum_size = 20;
    let map = make_map(4, checksum_size);

    let delta = plan(&map, 4096, checksum_size, None);
    let total_blocks: usize = delta.reads.iter().flat_map(|r| &r.super_blocks).map(|sb| sb.blocks.len()).sum();
    assert_eq!(total_blocks, 4);
}

#[test]
fn a_changed_checksum_in_the_middle_is_the_only_block_needed() {
    let checksum_size = 20;
    let mut map = make_map(6, checksum_size);
    let mut existing: Vec<u8> = map.iter().flat_map(|b| b.checksum.clone()).collect();

    map[3].checksum = vec![0xFF; checksum_size];
    let start = 3 * checksum_size;
    existing[start..start + checksum_size].copy_from_slice(&vec![0xEE; checksum_size]);

    let delta = plan(&map, 4096, checksum_size, Some(&existing));
    let needed: Vec<u64> = delta.reads.iter().flat_map(|r| &r.super_blocks).flat_map(|sb| &sb.blocks).map(|b| b.no).collect();
    assert_eq!(needed, vec![3]);
}

#[test]
fn reads_group_by_reference_then_by_contiguous_offset() {
    let checksum_size = 20;
    let mut map = make_map(4, checksum_size);
    map[0].reference = 1;
    map[1].reference = 1;
    map[2].reference = 2;
    map[3].reference = 2;

    let delta = plan(&map, 4096, checksum_size, None);
    let references: Vec<u32> = delta.reads.iter().map(|r| r.reference).collect();
    assert!(references.contains(&1));
    assert!(references.contains(&2));
}
