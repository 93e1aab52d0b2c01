//! Read-only FUSE filesystem over a [`MountFiles`] mapping.
//!
//! The tree is one root directory holding one regular file per entry.
//! Contents are fixed at mount time; every mutating call fails because the
//! default `Filesystem` methods reply `ENOSYS`.

use std::ffi::OsStr;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry, ReplyOpen,
    Request,
};
use tracing::debug;

use crate::files::MountFiles;
use credvault_common::SensitiveBytes;

const ROOT_INODE: u64 = 1;
const ROOT_MODE: u16 = 0o700;
const FILE_MODE: u16 = 0o400;

/// One exposed file.
struct Entry {
    name: String,
    data: SensitiveBytes,
}

/// FUSE filesystem presenting decrypted credential files.
pub struct CredentialFilesystem {
    /// Inode `n` is `entries[n - 2]`.
    entries: Vec<Entry>,
    uid: u32,
    gid: u32,
    mounted_at: SystemTime,
    ttl: Duration,
    /// Log every request at debug level.
    debug: bool,
}

impl CredentialFilesystem {
    /// Build the tree; files get inodes in name order.
    pub fn new(files: MountFiles) -> Self {
        let entries = files
            .iter()
            .map(|(name, data)| Entry {
                name: name.to_string(),
                data: data.clone(),
            })
            .collect();

        Self {
            entries,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            mounted_at: SystemTime::now(),
            ttl: Duration::from_secs(1),
            debug: false,
        }
    }

    /// Enable per-request tracing.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn trace(&self, op: &'static str, ino: u64) {
        if self.debug {
            debug!(op, ino, "FUSE request");
        }
    }

    fn entry(&self, ino: u64) -> Option<&Entry> {
        ino.checked_sub(2)
            .and_then(|index| self.entries.get(index as usize))
    }

    fn inode_of(&self, name: &str) -> Option<u64> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .map(|index| index as u64 + 2)
    }

    fn attr(&self, ino: u64) -> Option<FileAttr> {
        let (kind, perm, size, nlink) = if ino == ROOT_INODE {
            (FileType::Directory, ROOT_MODE, 0, 2)
        } else {
            let entry = self.entry(ino)?;
            (FileType::RegularFile, FILE_MODE, entry.data.len() as u64, 1)
        };

        Some(FileAttr {
            ino,
            size,
            blocks: size.div_ceil(512),
            atime: self.mounted_at,
            mtime: self.mounted_at,
            ctime: self.mounted_at,
            crtime: self.mounted_at,
            kind,
            perm,
            nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: 4096,
            flags: 0,
        })
    }
}

impl Filesystem for CredentialFilesystem {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        self.trace("lookup", parent);

        let found = (parent == ROOT_INODE)
            .then(|| name.to_str().and_then(|n| self.inode_of(n)))
            .flatten()
            .and_then(|ino| self.attr(ino));

        match found {
            Some(attr) => reply.entry(&self.ttl, &attr, 0),
            None => reply.error(libc::ENOENT),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        self.trace("getattr", ino);
        match self.attr(ino) {
            Some(attr) => reply.attr(&self.ttl, &attr),
            None => reply.error(libc::ENOENT),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        self.trace("readdir", ino);
        if ino != ROOT_INODE {
            reply.error(libc::ENOTDIR);
            return;
        }

        let dots = [
            (ROOT_INODE, FileType::Directory, "."),
            (ROOT_INODE, FileType::Directory, ".."),
        ];
        let files = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, e)| (index as u64 + 2, FileType::RegularFile, e.name.as_str()));

        for (i, (child, kind, name)) in dots
            .into_iter()
            .chain(files)
            .enumerate()
            .skip(offset as usize)
        {
            // The offset handed back is the index of the next entry
            if reply.add(child, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        self.trace("open", ino);
        if self.entry(ino).is_none() {
            reply.error(libc::ENOENT);
            return;
        }
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            reply.error(libc::EACCES);
            return;
        }
        reply.opened(0, 0);
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        self.trace("read", ino);
        let Some(entry) = self.entry(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let data = entry.data.as_bytes();
        let start = (offset.max(0) as usize).min(data.len());
        let end = start.saturating_add(size as usize).min(data.len());
        reply.data(&data[start..end]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filesystem() -> CredentialFilesystem {
        let mut files = MountFiles::new();
        files.append("b-file", b"bee").unwrap();
        files.append("a-file", b"ay").unwrap();
        CredentialFilesystem::new(files)
    }

    #[test]
    fn test_inodes_follow_name_order() {
        let fs = filesystem();
        assert_eq!(fs.inode_of("a-file"), Some(2));
        assert_eq!(fs.inode_of("b-file"), Some(3));
        assert_eq!(fs.inode_of("c-file"), None);
    }

    #[test]
    fn test_request_tracing_follows_debug_flag() {
        assert!(!filesystem().debug);
        assert!(filesystem().with_debug(true).debug);
    }

    #[test]
    fn test_attrs_are_owner_only() {
        let fs = filesystem();

        let root = fs.attr(ROOT_INODE).unwrap();
        assert_eq!(root.kind, FileType::Directory);
        assert_eq!(root.perm, 0o700);

        let file = fs.attr(3).unwrap();
        assert_eq!(file.kind, FileType::RegularFile);
        assert_eq!(file.perm, 0o400);
        assert_eq!(file.size, 3);

        assert!(fs.attr(4).is_none());
    }
}
