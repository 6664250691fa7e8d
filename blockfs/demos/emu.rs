use std::env;

use blockfs::io::FileBlockEmulatorBuilder;
use blockfs::{FileSystem, FormatOptions, InodeType};

/// Formats a file-backed disk image, lists the root directory, then mounts it again.
pub fn main() {
    env_logger::init();

    let blocks = env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(128);
    let disk = tempfile::NamedTempFile::new().unwrap();

    let dev = FileBlockEmulatorBuilder::from(disk.reopen().unwrap())
        .with_block_count(blocks)
        .build()
        .expect("Could not initialize disk emulator.");
    let mut fs = FileSystem::create(dev, FormatOptions::default()).expect("should create");
    let root = fs.root();
    fs.mkdir(root, "etc").unwrap();
    let motd = fs.mkfile(root, "motd").unwrap();
    fs.write_file(motd, b"welcome").unwrap();
    fs.sync().unwrap();

    let dev = FileBlockEmulatorBuilder::from(disk.reopen().unwrap())
        .with_block_count(blocks)
        // Don't reset initialized disk.
        .clear_medium(false)
        .build()
        .unwrap();
    let mut fs = FileSystem::open(dev).expect("should mount");
    for entry in fs.read_directory(root).unwrap() {
        let kind = match fs.gettype(entry.id).unwrap() {
            InodeType::Directory => "dir ",
            InodeType::File => "file",
        };
        println!("{} {:>4} {}", kind, entry.id, entry.name);
    }
    println!(
        "{} free blocks, {} free inodes",
        fs.free_block_cnt().unwrap(),
        fs.free_inode_cnt().unwrap()
    );
}
