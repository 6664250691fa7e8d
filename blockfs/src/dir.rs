use log::{debug, warn};

use crate::error::{FsError, Result};
use crate::fs::FileSystem;
use crate::io::BlockStorage;
use crate::node::InodeType;
use crate::table::InodeId;

const NAME_ID_SEPARATOR: char = ':';
const ENTRY_TERMINATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub id: InodeId,
}

/// The entries of one directory, in the order they are stored.
///
/// On disk a directory is plain text: each entry is written as `name:id/` and entries are
/// concatenated, e.g. `a.txt:2/docs:3/`. Names can contain neither `:` nor `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    entries: Vec<DirectoryEntry>,
}

impl Directory {
    pub fn parse(src: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for record in src.split(ENTRY_TERMINATOR).filter(|record| !record.is_empty()) {
            let (name, id) = record.split_once(NAME_ID_SEPARATOR).ok_or_else(|| {
                FsError::Corrupt(format!("directory record {:?} has no inode id", record))
            })?;
            let id = id.parse::<InodeId>().map_err(|_| {
                FsError::Corrupt(format!("directory record {:?} has a bad inode id", record))
            })?;
            entries.push(DirectoryEntry {
                name: name.to_string(),
                id,
            });
        }
        Ok(Self { entries })
    }

    pub fn serialize(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                format!(
                    "{}{}{}{}",
                    entry.name, NAME_ID_SEPARATOR, entry.id, ENTRY_TERMINATOR
                )
            })
            .collect()
    }

    pub fn entry(&self, name: &str) -> Option<InodeId> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.id)
    }

    /// Appends an entry at the end.
    pub fn push(&mut self, name: &str, id: InodeId) {
        self.entries.push(DirectoryEntry {
            name: name.to_string(),
            id,
        });
    }

    /// Drops every entry called `name`, returning the id of the first one.
    pub fn remove(&mut self, name: &str) -> Option<InodeId> {
        let found = self.entry(name);
        self.entries.retain(|entry| entry.name != name);
        found
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(NAME_ID_SEPARATOR) || name.contains(ENTRY_TERMINATOR) {
        return Err(FsError::InvalidArgument(format!(
            "{:?} is not a valid entry name",
            name
        )));
    }
    Ok(())
}

impl<T: BlockStorage> FileSystem<T> {
    fn load_directory(&mut self, id: InodeId) -> Result<Directory> {
        if self.gettype(id)? != InodeType::Directory {
            return Err(FsError::InvalidArgument(format!(
                "inode {} is not a directory",
                id
            )));
        }
        let content = String::from_utf8(self.read_file(id)?).map_err(|_| {
            FsError::Corrupt(format!("directory {} does not hold text", id))
        })?;
        Directory::parse(&content)
    }

    fn store_directory(&mut self, id: InodeId, dir: &Directory) -> Result<()> {
        self.write_file(id, dir.serialize().as_bytes())
    }

    /// Lists the entries of directory `id`.
    pub fn read_directory(&mut self, id: InodeId) -> Result<Vec<DirectoryEntry>> {
        Ok(self.load_directory(id)?.entries)
    }

    /// Finds `name` in directory `parent`.
    pub fn lookup(&mut self, parent: InodeId, name: &str) -> Result<InodeId> {
        self.load_directory(parent)?
            .entry(name)
            .ok_or(FsError::DoesNotExist)
    }

    /// Creates an inode of `kind` and links it into `parent` as `name`.
    ///
    /// Nothing is allocated when the name is taken. If rewriting the parent fails after the
    /// inode was created, the inode and its block stay allocated.
    pub fn mk_helper(&mut self, parent: InodeId, name: &str, kind: InodeType) -> Result<InodeId> {
        validate_name(name)?;
        let mut dir = self.load_directory(parent)?;
        if dir.entry(name).is_some() {
            return Err(FsError::AlreadyExists);
        }

        let id = self.alloc_inode(kind)?;
        dir.push(name, id);
        if let Err(err) = self.store_directory(parent, &dir) {
            warn!(
                "could not link {:?} into directory {}, inode {} is orphaned: {}",
                name, parent, id, err
            );
            return Err(err);
        }
        debug!("created {:?} {:?} as inode {} in {}", kind, name, id, parent);
        Ok(id)
    }

    pub fn mkfile(&mut self, parent: InodeId, name: &str) -> Result<InodeId> {
        self.mk_helper(parent, name, InodeType::File)
    }

    pub fn mkdir(&mut self, parent: InodeId, name: &str) -> Result<InodeId> {
        self.mk_helper(parent, name, InodeType::Directory)
    }

    /// Removes file `name` from `parent` and frees all of its blocks and its inode.
    ///
    /// Directories are never removed here: naming one fails with `NotEmpty` whatever it
    /// contains.
    pub fn unlink(&mut self, parent: InodeId, name: &str) -> Result<()> {
        let mut dir = self.load_directory(parent)?;
        let id = dir.entry(name).ok_or(FsError::DoesNotExist)?;
        if self.gettype(id)? == InodeType::Directory {
            return Err(FsError::NotEmpty);
        }

        self.remove_file(id)?;
        dir.remove(name);
        self.store_directory(parent, &dir)?;
        debug!("unlinked {:?} (inode {}) from {}", name, id, parent);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{FormatOptions, ROOT_INODE};
    use crate::io::MemoryBlockDevice;

    fn create_test_fs() -> FileSystem<MemoryBlockDevice> {
        let dev = MemoryBlockDevice::new(128, 256);
        FileSystem::create(dev, FormatOptions::default().with_max_inodes(64)).unwrap()
    }

    #[test]
    fn encodes_entries_in_order() {
        let mut dir = Directory::default();
        dir.push("a.txt", 2);
        dir.push("docs", 13);
        assert_eq!(dir.serialize(), "a.txt:2/docs:13/");
    }

    #[test]
    fn parses_encoded_entries() {
        let dir = Directory::parse("a.txt:2/docs:13/").unwrap();
        assert_eq!(
            dir.entries(),
            &[
                DirectoryEntry {
                    name: "a.txt".to_string(),
                    id: 2
                },
                DirectoryEntry {
                    name: "docs".to_string(),
                    id: 13
                },
            ]
        );
        assert!(Directory::parse("").unwrap().is_empty());
    }

    #[test]
    fn parse_rejects_malformed_records() {
        assert!(matches!(
            Directory::parse("a.txt/"),
            Err(FsError::Corrupt(_))
        ));
        assert!(matches!(
            Directory::parse("a.txt:two/"),
            Err(FsError::Corrupt(_))
        ));
    }

    #[test]
    fn remove_keeps_the_other_entries() {
        let mut dir = Directory::parse("a:2/b:3/c:4/").unwrap();
        assert_eq!(dir.remove("b"), Some(3));
        assert_eq!(dir.remove("b"), None);
        assert_eq!(dir.serialize(), "a:2/c:4/");
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn created_entry_can_be_looked_up() {
        let mut fs = create_test_fs();
        let id = fs.mkfile(ROOT_INODE, "a.txt").unwrap();
        assert_eq!(fs.lookup(ROOT_INODE, "a.txt").unwrap(), id);
        assert_eq!(fs.gettype(id).unwrap(), InodeType::File);

        let raw = fs.read_file(ROOT_INODE).unwrap();
        assert_eq!(raw, format!("a.txt:{}/", id).into_bytes());
    }

    #[test]
    fn duplicate_name_allocates_nothing() {
        let mut fs = create_test_fs();
        fs.mkfile(ROOT_INODE, "a.txt").unwrap();
        let blocks = fs.free_block_cnt().unwrap();
        let inodes = fs.free_inode_cnt().unwrap();

        assert!(matches!(
            fs.mkfile(ROOT_INODE, "a.txt"),
            Err(FsError::AlreadyExists)
        ));
        assert_eq!(fs.free_block_cnt().unwrap(), blocks);
        assert_eq!(fs.free_inode_cnt().unwrap(), inodes);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut fs = create_test_fs();
        for name in ["", "a:b", "a/b"] {
            assert!(matches!(
                fs.mkfile(ROOT_INODE, name),
                Err(FsError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn missing_name_does_not_exist() {
        let mut fs = create_test_fs();
        assert!(matches!(
            fs.lookup(ROOT_INODE, "nope"),
            Err(FsError::DoesNotExist)
        ));
        assert!(matches!(
            fs.unlink(ROOT_INODE, "nope"),
            Err(FsError::DoesNotExist)
        ));
    }

    #[test]
    fn unlink_removes_entry_and_frees_storage() {
        let mut fs = create_test_fs();
        let keep = fs.mkfile(ROOT_INODE, "keep").unwrap();
        let inodes = fs.free_inode_cnt().unwrap();

        let id = fs.mkfile(ROOT_INODE, "a.txt").unwrap();
        fs.write_file(id, &[7; 1000]).unwrap();
        fs.unlink(ROOT_INODE, "a.txt").unwrap();

        assert!(matches!(
            fs.lookup(ROOT_INODE, "a.txt"),
            Err(FsError::DoesNotExist)
        ));
        assert_eq!(fs.lookup(ROOT_INODE, "keep").unwrap(), keep);
        assert_eq!(fs.free_inode_cnt().unwrap(), inodes);
    }

    #[test]
    fn failed_parent_rewrite_orphans_the_new_inode() {
        let mut fs = create_test_fs();
        let blocks = fs.free_block_cnt().unwrap();
        let inodes = fs.free_inode_cnt().unwrap();

        // The entry alone is larger than the 26 blocks a directory can address.
        let name = "x".repeat(3400);
        assert!(matches!(
            fs.mkfile(ROOT_INODE, &name),
            Err(FsError::OutOfResource(_))
        ));

        assert_eq!(fs.free_inode_cnt().unwrap(), inodes - 1);
        assert_eq!(fs.free_block_cnt().unwrap(), blocks - 1);
        assert!(fs.read_directory(ROOT_INODE).unwrap().is_empty());
        assert!(matches!(
            fs.lookup(ROOT_INODE, &name),
            Err(FsError::DoesNotExist)
        ));
    }

    #[test]
    fn unlinking_a_directory_is_refused() {
        let mut fs = create_test_fs();
        let sub = fs.mkdir(ROOT_INODE, "empty").unwrap();

        assert!(matches!(
            fs.unlink(ROOT_INODE, "empty"),
            Err(FsError::NotEmpty)
        ));
        assert_eq!(fs.lookup(ROOT_INODE, "empty").unwrap(), sub);
    }

    #[test]
    fn nested_directories_are_independent() {
        let mut fs = create_test_fs();
        let sub = fs.mkdir(ROOT_INODE, "sub").unwrap();
        let inner = fs.mkfile(sub, "inner").unwrap();

        assert_eq!(fs.lookup(sub, "inner").unwrap(), inner);
        assert!(matches!(
            fs.lookup(ROOT_INODE, "inner"),
            Err(FsError::DoesNotExist)
        ));
        let names: Vec<String> = fs
            .read_directory(ROOT_INODE)
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["sub".to_string()]);
    }

    #[test]
    fn lookup_in_a_file_is_invalid() {
        let mut fs = create_test_fs();
        let file = fs.mkfile(ROOT_INODE, "f").unwrap();
        assert!(matches!(
            fs.lookup(file, "x"),
            Err(FsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn directory_grows_past_one_block() {
        let mut fs = create_test_fs();
        let mut ids = Vec::new();
        for i in 0..40 {
            ids.push(fs.mkfile(ROOT_INODE, &format!("file-{:02}", i)).unwrap());
        }
        assert!(fs.getattr(ROOT_INODE).unwrap().size > 128);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(fs.lookup(ROOT_INODE, &format!("file-{:02}", i)).unwrap(), *id);
        }
    }
}
