//! Synthetic in-memory XFS v5 image used by the integration tests.
//!
//! Geometry: 4 KiB blocks, 512-byte sectors, 512-byte inodes (8 per
//! block), two AGs of 1024 blocks. The root directory (inode 128) holds a
//! short-form child directory, extent-backed files (including a sparse
//! one and one in the second AG), an extents-format directory, and a
//! directory whose second block carries an unrecognized magic.
#![allow(dead_code)] // each test binary uses a different subset

use rxfs_ondisk::crc::stamp_region_crc;
use rxfs_ondisk::dir2::{append_data_entry, append_unused};
use rxfs_ondisk::inode::build_v3_inode;
use rxfs_ondisk::{BmbtRec, DinodeFormat, Extent};
use rxfs_types::{InodeNumber, S_IFDIR, S_IFLNK, S_IFREG};

pub const BLOCK_SIZE: usize = 4096;
pub const SECTOR_SIZE: usize = 512;
pub const INODE_SIZE: usize = 512;
pub const AG_BLOCKS: u64 = 1024;
pub const AG_COUNT: u32 = 2;

pub const ROOT_INO: u64 = 128;
pub const ETC_INO: u64 = 131;
pub const HELLO_INO: u64 = 132;
pub const SHARE_INO: u64 = 133;
pub const PASSWD_INO: u64 = 134;
pub const MOTD_INO: u64 = 135;
pub const LINK_INO: u64 = 136;
pub const A_CONF_INO: u64 = 137;
pub const B_CONF_INO: u64 = 138;
pub const SPARSE_INO: u64 = 139;
pub const WEIRD_INO: u64 = 140;
pub const C_CONF_INO: u64 = 141;
/// AG 1, ag-block 16, slot 0: (1 << 13) | (16 << 3).
pub const FAR_INO: u64 = 8320;

pub const HELLO_CONTENT: &[u8] = b"hello world\n";
pub const PASSWD_CONTENT: &[u8] = b"root:x:0:0\n";
pub const MOTD_CONTENT: &[u8] = b"welcome\n";
pub const FAR_CONTENT: &[u8] = b"far away\n";
pub const SPARSE_SIZE: u64 = 3 * 4096 - 100;

/// mtimes are distinct per inode so stat checks can tell files apart.
pub fn mtime_of(ino: u64) -> u32 {
    1_700_000_000 + u32::try_from(ino).expect("fixture inode fits u32")
}

const XDD3: u32 = 0x5844_4433;
const DIR3_DATA_HDR_SIZE: usize = 64;

fn put(img: &mut [u8], offset: usize, bytes: &[u8]) {
    img[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn sb_region() -> Vec<u8> {
    let mut sb = vec![0_u8; SECTOR_SIZE];
    put(&mut sb, 0x00, &0x5846_5342_u32.to_be_bytes()); // XFSB
    put(&mut sb, 0x04, &(BLOCK_SIZE as u32).to_be_bytes());
    put(&mut sb, 0x08, &(AG_BLOCKS * u64::from(AG_COUNT)).to_be_bytes());
    put(&mut sb, 0x38, &ROOT_INO.to_be_bytes());
    put(&mut sb, 0x54, &(AG_BLOCKS as u32).to_be_bytes());
    put(&mut sb, 0x58, &AG_COUNT.to_be_bytes());
    put(&mut sb, 0x64, &0x8005_u16.to_be_bytes()); // v5
    put(&mut sb, 0x66, &(SECTOR_SIZE as u16).to_be_bytes());
    put(&mut sb, 0x68, &(INODE_SIZE as u16).to_be_bytes());
    put(&mut sb, 0x6A, &8_u16.to_be_bytes()); // inodes per block
    put(&mut sb, 0x6C, b"testimg");
    sb[0x78] = 12; // block log
    sb[0x79] = 9; // sector log
    sb[0x7A] = 9; // inode log
    sb[0x7B] = 3; // inodes-per-block log
    sb[0x7C] = 10; // ag-block log
    put(&mut sb, 0x80, &16_u64.to_be_bytes()); // icount
    put(&mut sb, 0xD8, &1_u32.to_be_bytes()); // incompat: FTYPE
    stamp_region_crc(&mut sb, 0xE0);
    sb
}

fn agf_region(seq: u32) -> Vec<u8> {
    let mut agf = vec![0_u8; SECTOR_SIZE];
    put(&mut agf, 0x00, &0x5841_4746_u32.to_be_bytes()); // XAGF
    put(&mut agf, 0x04, &1_u32.to_be_bytes());
    put(&mut agf, 0x08, &seq.to_be_bytes());
    put(&mut agf, 0x0C, &(AG_BLOCKS as u32).to_be_bytes());
    put(&mut agf, 0x10, &1_u32.to_be_bytes()); // bno root
    put(&mut agf, 0x14, &2_u32.to_be_bytes()); // cnt root
    put(&mut agf, 0x1C, &1_u32.to_be_bytes()); // bno level
    put(&mut agf, 0x20, &1_u32.to_be_bytes()); // cnt level
    put(&mut agf, 0x34, &900_u32.to_be_bytes()); // free blocks
    put(&mut agf, 0x38, &512_u32.to_be_bytes()); // longest
    stamp_region_crc(&mut agf, 0xD8);
    agf
}

fn agi_region(seq: u32) -> Vec<u8> {
    let mut agi = vec![0_u8; SECTOR_SIZE];
    put(&mut agi, 0x00, &0x5841_4749_u32.to_be_bytes()); // XAGI
    put(&mut agi, 0x04, &1_u32.to_be_bytes());
    put(&mut agi, 0x08, &seq.to_be_bytes());
    put(&mut agi, 0x0C, &(AG_BLOCKS as u32).to_be_bytes());
    put(&mut agi, 0x10, &16_u32.to_be_bytes()); // inode count
    put(&mut agi, 0x14, &3_u32.to_be_bytes()); // inobt root
    put(&mut agi, 0x18, &1_u32.to_be_bytes()); // inobt level
    put(&mut agi, 0x20, &(ROOT_INO as u32).to_be_bytes()); // newino
    stamp_region_crc(&mut agi, 0x138);
    agi
}

fn agfl_region(seq: u32) -> Vec<u8> {
    let mut agfl = vec![0_u8; SECTOR_SIZE];
    put(&mut agfl, 0x00, &0x5841_464C_u32.to_be_bytes()); // XAFL
    put(&mut agfl, 0x04, &seq.to_be_bytes());
    stamp_region_crc(&mut agfl, 0x20);
    agfl
}

/// Short-form directory fork with ftype bytes and 4-byte inumbers.
fn sf_fork(parent: u64, entries: &[(&str, u64, u8)]) -> Vec<u8> {
    let mut fork = Vec::new();
    fork.push(u8::try_from(entries.len()).expect("entry count"));
    fork.push(0); // i8count: all inumbers fit 4 bytes
    fork.extend_from_slice(&u32::try_from(parent).expect("parent").to_be_bytes());
    for (name, ino, ftype) in entries {
        fork.push(u8::try_from(name.len()).expect("name length"));
        fork.extend_from_slice(&0_u16.to_be_bytes()); // offset tag
        fork.extend_from_slice(name.as_bytes());
        fork.push(*ftype);
        fork.extend_from_slice(&u32::try_from(*ino).expect("inumber").to_be_bytes());
    }
    fork
}

fn extents_fork(extents: &[Extent]) -> Vec<u8> {
    let mut fork = Vec::new();
    for extent in extents {
        fork.extend_from_slice(&BmbtRec::pack(*extent).to_bytes());
    }
    fork
}

fn dir_data_block(entries: &[(&str, u64, u8)]) -> Vec<u8> {
    let mut block = vec![0_u8; DIR3_DATA_HDR_SIZE];
    put(&mut block, 0, &XDD3.to_be_bytes());
    for (name, ino, ftype) in entries {
        append_data_entry(&mut block, name.as_bytes(), *ino, Some(*ftype));
    }
    let used = block.len();
    block.resize(BLOCK_SIZE, 0);
    append_unused_tail(&mut block, used);
    block
}

fn append_unused_tail(block: &mut [u8], used: usize) {
    let tail = u16::try_from(block.len() - used).expect("tail length");
    block[used..used + 2].copy_from_slice(&0xFFFF_u16.to_be_bytes());
    block[used + 2..used + 4].copy_from_slice(&tail.to_be_bytes());
}

fn single_extent(start_block: u64) -> Vec<Extent> {
    vec![Extent {
        logical_offset: 0,
        start_block,
        block_count: 1,
        unwritten: false,
    }]
}

struct InodeSpec {
    ino: u64,
    mode: u16,
    format: DinodeFormat,
    size: u64,
    nextents: u32,
    fork: Vec<u8>,
}

fn place_inode(img: &mut [u8], spec: &InodeSpec) {
    let ag = spec.ino >> 13;
    let ag_block = (spec.ino >> 3) & 1023;
    let slot = spec.ino & 7;
    let offset = usize::try_from((ag * AG_BLOCKS + ag_block) * BLOCK_SIZE as u64)
        .expect("inode block offset")
        + usize::try_from(slot).expect("slot") * INODE_SIZE;
    let raw = build_v3_inode(
        InodeNumber(spec.ino),
        spec.mode,
        spec.format,
        spec.size,
        spec.nextents,
        mtime_of(spec.ino),
        &spec.fork,
        INODE_SIZE,
    );
    put(img, offset, &raw);
}

/// Assemble the whole image.
pub fn build_image() -> Vec<u8> {
    let ag_bytes = usize::try_from(AG_BLOCKS).expect("ag blocks") * BLOCK_SIZE;
    let mut img = vec![0_u8; ag_bytes * AG_COUNT as usize];

    let sb = sb_region();
    for ag in 0..AG_COUNT {
        let base = ag as usize * ag_bytes;
        put(&mut img, base, &sb);
        put(&mut img, base + SECTOR_SIZE, &agf_region(ag));
        put(&mut img, base + 2 * SECTOR_SIZE, &agi_region(ag));
        put(&mut img, base + 3 * SECTOR_SIZE, &agfl_region(ag));
    }

    // ── Directory tree ──────────────────────────────────────────────────
    let root_fork = sf_fork(
        ROOT_INO,
        &[
            ("etc", ETC_INO, 2),
            ("hello.txt", HELLO_INO, 1),
            ("share", SHARE_INO, 2),
            ("sparse.bin", SPARSE_INO, 1),
            ("far.txt", FAR_INO, 1),
            ("weird", WEIRD_INO, 2),
        ],
    );
    let etc_fork = sf_fork(
        ROOT_INO,
        &[
            ("passwd", PASSWD_INO, 1),
            ("motd", MOTD_INO, 1),
            ("link", LINK_INO, 7),
        ],
    );

    let specs = [
        InodeSpec {
            ino: ROOT_INO,
            mode: S_IFDIR | 0o755,
            format: DinodeFormat::Local,
            size: root_fork.len() as u64,
            nextents: 0,
            fork: root_fork,
        },
        InodeSpec {
            ino: ETC_INO,
            mode: S_IFDIR | 0o755,
            format: DinodeFormat::Local,
            size: etc_fork.len() as u64,
            nextents: 0,
            fork: etc_fork,
        },
        InodeSpec {
            ino: HELLO_INO,
            mode: S_IFREG | 0o644,
            format: DinodeFormat::Extents,
            size: HELLO_CONTENT.len() as u64,
            nextents: 1,
            fork: extents_fork(&single_extent(24)),
        },
        InodeSpec {
            ino: SHARE_INO,
            mode: S_IFDIR | 0o755,
            format: DinodeFormat::Extents,
            size: BLOCK_SIZE as u64,
            nextents: 1,
            fork: extents_fork(&single_extent(30)),
        },
        InodeSpec {
            ino: PASSWD_INO,
            mode: S_IFREG | 0o644,
            format: DinodeFormat::Extents,
            size: PASSWD_CONTENT.len() as u64,
            nextents: 1,
            fork: extents_fork(&single_extent(25)),
        },
        InodeSpec {
            ino: MOTD_INO,
            mode: S_IFREG | 0o644,
            format: DinodeFormat::Extents,
            size: MOTD_CONTENT.len() as u64,
            nextents: 1,
            fork: extents_fork(&single_extent(26)),
        },
        InodeSpec {
            ino: LINK_INO,
            mode: S_IFLNK | 0o777,
            format: DinodeFormat::Local,
            size: 4,
            nextents: 0,
            fork: b"motd".to_vec(),
        },
        InodeSpec {
            ino: A_CONF_INO,
            mode: S_IFREG | 0o600,
            format: DinodeFormat::Extents,
            size: 0,
            nextents: 0,
            fork: Vec::new(),
        },
        InodeSpec {
            ino: B_CONF_INO,
            mode: S_IFREG | 0o600,
            format: DinodeFormat::Extents,
            size: 0,
            nextents: 0,
            fork: Vec::new(),
        },
        InodeSpec {
            ino: SPARSE_INO,
            mode: S_IFREG | 0o644,
            format: DinodeFormat::Extents,
            size: SPARSE_SIZE,
            nextents: 2,
            fork: extents_fork(&[
                Extent {
                    logical_offset: 0,
                    start_block: 27,
                    block_count: 1,
                    unwritten: false,
                },
                Extent {
                    logical_offset: 2,
                    start_block: 28,
                    block_count: 1,
                    unwritten: true,
                },
            ]),
        },
        InodeSpec {
            ino: WEIRD_INO,
            mode: S_IFDIR | 0o755,
            format: DinodeFormat::Extents,
            size: 2 * BLOCK_SIZE as u64,
            nextents: 2,
            fork: extents_fork(&[
                Extent {
                    logical_offset: 0,
                    start_block: 31,
                    block_count: 1,
                    unwritten: false,
                },
                Extent {
                    logical_offset: 1,
                    start_block: 32,
                    block_count: 1,
                    unwritten: false,
                },
            ]),
        },
        InodeSpec {
            ino: C_CONF_INO,
            mode: S_IFREG | 0o600,
            format: DinodeFormat::Extents,
            size: 0,
            nextents: 0,
            fork: Vec::new(),
        },
        InodeSpec {
            ino: FAR_INO,
            mode: S_IFREG | 0o644,
            format: DinodeFormat::Extents,
            size: FAR_CONTENT.len() as u64,
            nextents: 1,
            // AG 1, ag-relative block 40.
            fork: extents_fork(&single_extent((1 << 10) | 40)),
        },
    ];
    for spec in &specs {
        place_inode(&mut img, spec);
    }

    // ── File contents ───────────────────────────────────────────────────
    put(&mut img, 24 * BLOCK_SIZE, HELLO_CONTENT);
    put(&mut img, 25 * BLOCK_SIZE, PASSWD_CONTENT);
    put(&mut img, 26 * BLOCK_SIZE, MOTD_CONTENT);
    img[27 * BLOCK_SIZE..28 * BLOCK_SIZE].fill(0xAB);
    // The unwritten extent's block holds garbage that must read as zeroes.
    img[28 * BLOCK_SIZE..29 * BLOCK_SIZE].fill(0xCD);
    put(
        &mut img,
        (1024 + 40) * BLOCK_SIZE, // AG 1, block 40
        FAR_CONTENT,
    );

    // ── Directory data blocks ───────────────────────────────────────────
    put(
        &mut img,
        30 * BLOCK_SIZE,
        &dir_data_block(&[
            (".", SHARE_INO, 2),
            ("..", ROOT_INO, 2),
            ("a.conf", A_CONF_INO, 1),
            ("b.conf", B_CONF_INO, 1),
        ]),
    );
    put(
        &mut img,
        31 * BLOCK_SIZE,
        &dir_data_block(&[
            (".", WEIRD_INO, 2),
            ("..", ROOT_INO, 2),
            ("c.conf", C_CONF_INO, 1),
        ]),
    );
    // Second weird block: a leaf magic this core does not decode.
    put(&mut img, 32 * BLOCK_SIZE, b"XDL3");

    img
}
