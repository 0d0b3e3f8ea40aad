//! Directory contents: a sequence of fixed-size entry slots spread across
//! a directory inode's data blocks. Free slots are tombstones, reused
//! before the entry list is ever grown.

use crate::error::{FsError, FsResult};
use crate::image::Image;
use crate::inode::{append_block, resolve};
use crate::layout::{
    BLOCK_SIZE, DirEntry, ENTRIES_PER_BLOCK, ENTRY_RECORD_SIZE, Inode, check_name_length,
};

/// Number of entry slots in use, counting tombstones — `size / entry_size`,
/// per the on-disk invariant that `size` tracks the logical entry-table
/// length, not the blocks backing it.
fn entry_count(inode: &Inode) -> usize {
    inode.size as usize / ENTRY_RECORD_SIZE
}

fn read_slot(image: &Image, inode: &Inode, slot: usize) -> FsResult<DirEntry> {
    let block_index = slot / ENTRIES_PER_BLOCK;
    let in_block = slot % ENTRIES_PER_BLOCK;
    let dnum = resolve(image, inode, block_index)?.expect("slot within block_count is backed");
    let off = in_block * ENTRY_RECORD_SIZE;
    DirEntry::from_bytes(&image.block(dnum)[off..off + ENTRY_RECORD_SIZE])
}

fn write_slot(image: &mut Image, inode: &Inode, slot: usize, entry: &DirEntry) -> FsResult<()> {
    let block_index = slot / ENTRIES_PER_BLOCK;
    let in_block = slot % ENTRIES_PER_BLOCK;
    let dnum = resolve(image, inode, block_index)?.expect("slot within block_count is backed");
    let off = in_block * ENTRY_RECORD_SIZE;
    entry.to_bytes(&mut image.block_mut(dnum)[off..off + ENTRY_RECORD_SIZE]);
    Ok(())
}

/// Iterates every active entry of a directory.
pub fn entries(image: &Image, dir_inode: &Inode) -> FsResult<Vec<(u32, String)>> {
    let mut out = Vec::new();
    for slot in 0..entry_count(dir_inode) {
        if let DirEntry::Active { inum, name } = read_slot(image, dir_inode, slot)? {
            out.push((inum, name));
        }
    }
    Ok(out)
}

/// Looks up `name` directly under `dir_inode`.
pub fn lookup(image: &Image, dir_inode: &Inode, name: &str) -> FsResult<Option<u32>> {
    for slot in 0..entry_count(dir_inode) {
        if let DirEntry::Active { inum, name: entry_name } = read_slot(image, dir_inode, slot)? {
            if entry_name == name {
                return Ok(Some(inum));
            }
        }
    }
    Ok(None)
}

/// Binds `name` to `inum` in `dir_inode`, reusing the first tombstone slot
/// if one exists and appending a fresh block of slots only if every
/// existing slot is taken.
pub fn add_entry(
    image: &mut Image,
    dir_inode: &mut Inode,
    name: &str,
    inum: u32,
) -> FsResult<()> {
    check_name_length(name)?;
    if lookup(image, dir_inode, name)?.is_some() {
        return Err(FsError::AlreadyExists);
    }

    let entry = DirEntry::Active {
        inum,
        name: name.to_string(),
    };

    for slot in 0..entry_count(dir_inode) {
        if matches!(read_slot(image, dir_inode, slot)?, DirEntry::Tombstone) {
            write_slot(image, dir_inode, slot, &entry)?;
            touch_mtime(dir_inode);
            return Ok(());
        }
    }

    let slot = entry_count(dir_inode);
    let next_size = dir_inode.size + ENTRY_RECORD_SIZE as u64;
    if next_size > dir_inode.block_count as u64 * BLOCK_SIZE as u64 {
        append_block(image, dir_inode)?;
    }
    write_slot(image, dir_inode, slot, &entry)?;
    dir_inode.size = next_size;
    touch_mtime(dir_inode);
    Ok(())
}

/// Replaces the entry named `name` with a tombstone. No-op on the storage
/// side beyond that: reclaiming the directory's own blocks is shrink's job,
/// not unlink's.
pub fn remove_entry(image: &mut Image, dir_inode: &mut Inode, name: &str) -> FsResult<()> {
    for slot in 0..entry_count(dir_inode) {
        if let DirEntry::Active { name: entry_name, .. } = read_slot(image, dir_inode, slot)? {
            if entry_name == name {
                write_slot(image, dir_inode, slot, &DirEntry::Tombstone)?;
                touch_mtime(dir_inode);
                return Ok(());
            }
        }
    }
    Err(FsError::NotFound)
}

/// True if a directory has no active entries left (tombstones don't count).
pub fn is_empty(image: &Image, dir_inode: &Inode) -> FsResult<bool> {
    for slot in 0..entry_count(dir_inode) {
        if matches!(read_slot(image, dir_inode, slot)?, DirEntry::Active { .. }) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn touch_mtime(inode: &mut Inode) {
    let now = crate::util::now_secs();
    inode.mtime = now;
    inode.ctime = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::FileKind;
    use tempfile::NamedTempFile;

    fn fresh_image() -> Image {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).unwrap();
        Image::open(file.path()).unwrap()
    }

    fn fresh_dir_inode() -> Inode {
        let mut inode = Inode::zeroed();
        inode.kind = FileKind::Directory;
        inode.nlink = 2;
        inode
    }

    #[test]
    fn add_then_lookup_round_trips() {
        let mut image = fresh_image();
        let mut dir = fresh_dir_inode();
        add_entry(&mut image, &mut dir, "hello.txt", 5).unwrap();
        assert_eq!(lookup(&image, &dir, "hello.txt").unwrap(), Some(5));
        assert_eq!(lookup(&image, &dir, "missing").unwrap(), None);
    }

    #[test]
    fn removed_entry_slot_is_reused_before_growing() {
        let mut image = fresh_image();
        let mut dir = fresh_dir_inode();
        add_entry(&mut image, &mut dir, "a", 1).unwrap();
        remove_entry(&mut image, &mut dir, "a").unwrap();
        let blocks_before = dir.block_count;
        add_entry(&mut image, &mut dir, "b", 2).unwrap();
        assert_eq!(dir.block_count, blocks_before);
        assert_eq!(lookup(&image, &dir, "b").unwrap(), Some(2));
    }

    #[test]
    fn empty_directory_reports_empty() {
        let image = fresh_image();
        let dir = fresh_dir_inode();
        assert!(is_empty(&image, &dir).unwrap());
    }

    #[test]
    fn directory_with_only_tombstones_is_empty() {
        let mut image = fresh_image();
        let mut dir = fresh_dir_inode();
        add_entry(&mut image, &mut dir, "a", 1).unwrap();
        remove_entry(&mut image, &mut dir, "a").unwrap();
        assert!(is_empty(&image, &dir).unwrap());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut image = fresh_image();
        let mut dir = fresh_dir_inode();
        add_entry(&mut image, &mut dir, "a", 1).unwrap();
        assert!(add_entry(&mut image, &mut dir, "a", 2).is_err());
    }

    #[test]
    fn overlong_names_are_rejected() {
        let mut image = fresh_image();
        let mut dir = fresh_dir_inode();
        let name = "x".repeat(100);
        assert!(add_entry(&mut image, &mut dir, &name, 1).is_err());
    }

    #[test]
    fn tail_append_grows_size_by_one_entry_record() {
        let mut image = fresh_image();
        let mut dir = fresh_dir_inode();
        assert_eq!(dir.size, 0);
        add_entry(&mut image, &mut dir, "a", 1).unwrap();
        assert_eq!(dir.size, ENTRY_RECORD_SIZE as u64);
        add_entry(&mut image, &mut dir, "b", 2).unwrap();
        assert_eq!(dir.size, 2 * ENTRY_RECORD_SIZE as u64);
    }

    #[test]
    fn tombstone_reuse_does_not_change_size() {
        let mut image = fresh_image();
        let mut dir = fresh_dir_inode();
        add_entry(&mut image, &mut dir, "a", 1).unwrap();
        remove_entry(&mut image, &mut dir, "a").unwrap();
        let size_before = dir.size;
        add_entry(&mut image, &mut dir, "b", 2).unwrap();
        assert_eq!(dir.size, size_before);
    }

    #[test]
    fn size_crosses_into_a_second_block_once_the_first_fills_up() {
        let mut image = fresh_image();
        let mut dir = fresh_dir_inode();
        for i in 0..ENTRIES_PER_BLOCK {
            add_entry(&mut image, &mut dir, &format!("f{i}"), (i + 1) as u32).unwrap();
        }
        assert_eq!(dir.block_count, 1);
        assert_eq!(dir.size, (ENTRIES_PER_BLOCK * ENTRY_RECORD_SIZE) as u64);
        add_entry(&mut image, &mut dir, "overflow", 999).unwrap();
        assert_eq!(dir.block_count, 2);
        assert_eq!(dir.size, ((ENTRIES_PER_BLOCK + 1) * ENTRY_RECORD_SIZE) as u64);
    }
}
