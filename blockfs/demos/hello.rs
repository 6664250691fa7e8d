use blockfs::io::MemoryBlockDevice;
use blockfs::{FileSystem, FormatOptions};

pub fn main() {
    env_logger::init();

    let dev = MemoryBlockDevice::new(4096, 64);
    // create a new file system on the device and put a file in /
    let mut fs = FileSystem::create(dev, FormatOptions::default()).expect("should create");
    let root = fs.root();
    let hello = fs.mkfile(root, "hello.txt").unwrap();
    fs.write_file(hello, b"hello, world\n").unwrap();

    let found = fs.lookup(root, "hello.txt").unwrap();
    let content = fs.read_file(found).unwrap();
    print!("{}", String::from_utf8_lossy(&content));
}
