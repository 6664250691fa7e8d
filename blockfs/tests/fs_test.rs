use blockfs::alloc::BlockAllocator;
use blockfs::io::{BlockStorage, FileBlockEmulator, FileBlockEmulatorBuilder, MemoryBlockDevice};
use blockfs::layout::Layout;
use blockfs::table::InodeTable;
use blockfs::{FileSystem, FormatOptions, FsError, InodeType};
use tempfile::NamedTempFile;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn file_device(disk: &NamedTempFile, blocks: usize, clear: bool) -> FileBlockEmulator {
    FileBlockEmulatorBuilder::from(disk.reopen().unwrap())
        .with_block_size(4096)
        .with_block_count(blocks)
        .clear_medium(clear)
        .build()
        .expect("Could not initialize disk emulator.")
}

#[test]
fn can_initialize_disk_with_filesystem() {
    init_logging();
    let tf = NamedTempFile::new().unwrap();

    // Prepare the block with filesystem layout.
    let mut fs = FileSystem::create(file_device(&tf, 64, true), FormatOptions::default()).unwrap();
    let root = fs.root();
    let docs = fs.mkdir(root, "docs").unwrap();
    let readme = fs.mkfile(docs, "readme").unwrap();
    fs.write_file(readme, b"read me").unwrap();
    fs.sync().unwrap();

    // Open filesystem and verify init layout;
    let mut fs = FileSystem::open(file_device(&tf, 64, false)).unwrap();
    let docs = fs.lookup(root, "docs").unwrap();
    let readme = fs.lookup(docs, "readme").unwrap();
    assert_eq!(fs.read_file(readme).unwrap(), b"read me");
}

#[test]
fn unformatted_blocks_fail_to_open() {
    init_logging();
    let tf = NamedTempFile::new().unwrap();
    match FileSystem::open(file_device(&tf, 64, true)) {
        Err(FsError::Corrupt(_)) => (),
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("mounted an unformatted disk"),
    }
}

#[test]
fn allocator_reserves_everything_up_to_its_bitmap() {
    init_logging();
    let mut dev = MemoryBlockDevice::new(4096, 100);
    let alloc = BlockAllocator::format(&mut dev, 5).unwrap();

    assert_eq!(alloc.free_block_cnt(&mut dev).unwrap(), 100 - 6);
    let first = alloc.allocate(&mut dev).unwrap();
    assert!(first >= 6);

    alloc.deallocate(&mut dev, first).unwrap();
    assert_eq!(alloc.free_block_cnt(&mut dev).unwrap(), 100 - 6);
    assert!(matches!(
        alloc.deallocate(&mut dev, first),
        Err(FsError::InvalidArgument(_))
    ));
}

#[test]
fn allocator_roundtrip_for_every_block() {
    init_logging();
    let mut dev = MemoryBlockDevice::new(64, 40);
    let alloc = BlockAllocator::format(&mut dev, 1).unwrap();
    let before = alloc.free_block_cnt(&mut dev).unwrap();

    for _ in 0..before {
        let block = alloc.allocate(&mut dev).unwrap();
        alloc.deallocate(&mut dev, block).unwrap();
        assert_eq!(alloc.free_block_cnt(&mut dev).unwrap(), before);
    }
}

#[test]
fn inode_table_shifts_ids_by_one() {
    init_logging();
    let mut dev = MemoryBlockDevice::new(512, 64);
    let layout = Layout::new(512, 64, 16).unwrap();
    let table = InodeTable::format(&mut dev, layout).unwrap();

    let id = table.allocate_inode(&mut dev, InodeType::File, 40).unwrap();
    assert_eq!(id, 1);
    assert_eq!(table.get(&mut dev, 1).unwrap(), 40);
    assert_eq!(table.free_inode_cnt(&mut dev).unwrap(), 15);
}

#[test]
fn file_content_survives_every_size_class() {
    init_logging();
    // 256 byte blocks: 26 direct slots and 32 indirect entries.
    let dev = MemoryBlockDevice::new(256, 512);
    let mut fs = FileSystem::create(dev, FormatOptions::default()).unwrap();
    let root = fs.root();
    let id = fs.mkfile(root, "data.bin").unwrap();

    let max = (26 + 32) * 256;
    for len in [0, 17, 256, 26 * 256, 26 * 256 + 3, 40 * 256, max] {
        let content: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
        fs.write_file(id, &content).unwrap();
        assert_eq!(fs.read_file(id).unwrap(), content);
    }
    assert!(matches!(
        fs.write_file(id, &vec![0; max + 1]),
        Err(FsError::OutOfResource(_))
    ));
}

#[test]
fn growing_into_indirect_range_and_back_restores_free_count() {
    init_logging();
    let dev = MemoryBlockDevice::new(256, 512);
    let mut fs = FileSystem::create(dev, FormatOptions::default()).unwrap();
    let root = fs.root();
    let id = fs.mkfile(root, "grow").unwrap();

    fs.write_file(id, &vec![1; 26 * 256]).unwrap();
    let direct_full = fs.free_block_cnt().unwrap();

    fs.write_file(id, &vec![2; 50 * 256]).unwrap();
    assert_eq!(fs.free_block_cnt().unwrap(), direct_full - 24 - 1);

    fs.write_file(id, &vec![3; 10 * 256]).unwrap();
    assert_eq!(fs.free_block_cnt().unwrap(), direct_full + 16);

    fs.write_file(id, &vec![4; 26 * 256]).unwrap();
    assert_eq!(fs.free_block_cnt().unwrap(), direct_full);
}

#[test]
fn directory_lifecycle() {
    init_logging();
    let dev = MemoryBlockDevice::new(4096, 128);
    let mut fs = FileSystem::create(dev, FormatOptions::default()).unwrap();
    let root = fs.root();

    let id = fs.mk_helper(root, "a.txt", InodeType::File).unwrap();
    assert_eq!(fs.lookup(root, "a.txt").unwrap(), id);
    assert!(matches!(
        fs.mk_helper(root, "a.txt", InodeType::File),
        Err(FsError::AlreadyExists)
    ));

    fs.unlink(root, "a.txt").unwrap();
    assert!(matches!(
        fs.lookup(root, "a.txt"),
        Err(FsError::DoesNotExist)
    ));
}

#[test]
fn directories_cannot_be_unlinked() {
    init_logging();
    let dev = MemoryBlockDevice::new(4096, 128);
    let mut fs = FileSystem::create(dev, FormatOptions::default()).unwrap();
    let root = fs.root();

    let empty = fs.mkdir(root, "empty").unwrap();
    let full = fs.mkdir(root, "full").unwrap();
    fs.mkfile(full, "child").unwrap();

    for name in ["empty", "full"] {
        assert!(matches!(fs.unlink(root, name), Err(FsError::NotEmpty)));
    }
    assert_eq!(fs.lookup(root, "empty").unwrap(), empty);
    assert_eq!(fs.lookup(root, "full").unwrap(), full);
}

#[test]
fn unlink_returns_storage_to_the_pools() {
    init_logging();
    let dev = MemoryBlockDevice::new(512, 256);
    let mut fs = FileSystem::create(dev, FormatOptions::default()).unwrap();
    let root = fs.root();
    fs.mkfile(root, "first").unwrap();
    let blocks = fs.free_block_cnt().unwrap();
    let inodes = fs.free_inode_cnt().unwrap();

    let big = fs.mkfile(root, "big").unwrap();
    fs.write_file(big, &vec![9; 100 * 512]).unwrap();
    fs.unlink(root, "big").unwrap();

    // The root directory text is back to a single entry, so it uses as many blocks as before.
    assert_eq!(fs.free_block_cnt().unwrap(), blocks);
    assert_eq!(fs.free_inode_cnt().unwrap(), inodes);
}

#[test]
fn mounted_device_can_be_reformatted() {
    init_logging();
    let dev = MemoryBlockDevice::new(1024, 64);
    let mut fs = FileSystem::create(dev, FormatOptions::default().with_max_inodes(8)).unwrap();
    let root = fs.root();
    fs.mkfile(root, "old").unwrap();

    let dev = fs.into_device();
    assert_eq!(dev.total_blocks(), 64);
    let mut fs = FileSystem::create(dev, FormatOptions::default().with_max_inodes(8)).unwrap();
    assert!(fs.read_directory(root).unwrap().is_empty());
    assert_eq!(fs.free_inode_cnt().unwrap(), 7);
}
