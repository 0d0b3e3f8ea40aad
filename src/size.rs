//! Growing and shrinking a file to an exact byte size.

use crate::error::FsResult;
use crate::inode::{append_block, pop_block};
use crate::image::Image;
use crate::layout::{BLOCK_SIZE, Inode};

/// Resizes `inode` to exactly `new_size` bytes, allocating and zero-filling
/// new blocks on growth or freeing trailing blocks (including the
/// indirect block, once it empties out) on shrink.
pub fn truncate(image: &mut Image, inode: &mut Inode, new_size: u64) -> FsResult<()> {
    use std::cmp::Ordering;
    match new_size.cmp(&inode.size) {
        Ordering::Equal => Ok(()),
        Ordering::Greater => grow(image, inode, new_size),
        Ordering::Less => shrink(image, inode, new_size),
    }
}

fn touch_times(inode: &mut Inode) {
    let now = crate::util::now_secs();
    inode.mtime = now;
    inode.ctime = now;
}

fn blocks_needed(size: u64) -> u32 {
    size.div_ceil(BLOCK_SIZE as u64) as u32
}

fn grow(image: &mut Image, inode: &mut Inode, new_size: u64) -> FsResult<()> {
    if inode.block_count > 0 {
        let tail = (inode.size % BLOCK_SIZE as u64) as usize;
        if tail > 0 {
            let last_block = inode.block_count as usize - 1;
            if let Some(dnum) = crate::inode::resolve(image, inode, last_block)? {
                image.block_mut(dnum)[tail..].fill(0);
            }
        }
    }
    let needed = blocks_needed(new_size);
    while inode.block_count < needed {
        append_block(image, inode)?;
    }
    inode.size = new_size;
    touch_times(inode);
    Ok(())
}

fn shrink(image: &mut Image, inode: &mut Inode, new_size: u64) -> FsResult<()> {
    let needed = blocks_needed(new_size);
    while inode.block_count > needed {
        pop_block(image, inode)?;
    }
    inode.size = new_size;
    touch_times(inode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::resolve;
    use crate::layout::{DIRECT_BLOCKS, FileKind};
    use tempfile::NamedTempFile;

    fn fresh_image() -> Image {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).unwrap();
        Image::open(file.path()).unwrap()
    }

    fn fresh_file_inode() -> Inode {
        let mut inode = Inode::zeroed();
        inode.kind = FileKind::Regular;
        inode.nlink = 1;
        inode
    }

    #[test]
    fn growing_from_empty_zero_fills() {
        let mut image = fresh_image();
        let mut inode = fresh_file_inode();
        truncate(&mut image, &mut inode, 10).unwrap();
        assert_eq!(inode.size, 10);
        assert_eq!(inode.block_count, 1);
        let dnum = resolve(&image, &inode, 0).unwrap().unwrap();
        assert!(image.block(dnum)[..10].iter().all(|&b| b == 0));
    }

    #[test]
    fn shrinking_frees_trailing_blocks() {
        let mut image = fresh_image();
        let mut inode = fresh_file_inode();
        truncate(&mut image, &mut inode, (BLOCK_SIZE * 3) as u64).unwrap();
        assert_eq!(inode.block_count, 3);
        truncate(&mut image, &mut inode, 1).unwrap();
        assert_eq!(inode.block_count, 1);
        assert_eq!(inode.size, 1);
    }

    #[test]
    fn shrinking_past_direct_blocks_frees_the_indirect_block() {
        let mut image = fresh_image();
        let mut inode = fresh_file_inode();
        truncate(&mut image, &mut inode, (BLOCK_SIZE * (DIRECT_BLOCKS + 2)) as u64).unwrap();
        assert_ne!(inode.indirect, 0);
        truncate(&mut image, &mut inode, (BLOCK_SIZE * DIRECT_BLOCKS) as u64).unwrap();
        assert_eq!(inode.indirect, 0);
    }

    #[test]
    fn regrowing_within_the_same_block_zero_fills_the_reclaimed_tail() {
        let mut image = fresh_image();
        let mut inode = fresh_file_inode();
        truncate(&mut image, &mut inode, 100).unwrap();
        let dnum = resolve(&image, &inode, 0).unwrap().unwrap();
        image.block_mut(dnum)[..100].fill(0xaa);
        truncate(&mut image, &mut inode, 50).unwrap();
        assert_eq!(inode.block_count, 1, "shrink within one block keeps it allocated");
        truncate(&mut image, &mut inode, 100).unwrap();
        assert!(image.block(dnum)[50..100].iter().all(|&b| b == 0));
    }

    #[test]
    fn truncate_to_same_size_is_a_no_op_on_blocks() {
        let mut image = fresh_image();
        let mut inode = fresh_file_inode();
        truncate(&mut image, &mut inode, 100).unwrap();
        let blocks_before = inode.block_count;
        truncate(&mut image, &mut inode, 100).unwrap();
        assert_eq!(inode.block_count, blocks_before);
    }

    #[test]
    fn truncate_to_same_size_does_not_touch_timestamps() {
        let mut image = fresh_image();
        let mut inode = fresh_file_inode();
        truncate(&mut image, &mut inode, 100).unwrap();
        inode.mtime = 1234;
        inode.ctime = 1234;
        truncate(&mut image, &mut inode, 100).unwrap();
        assert_eq!(inode.mtime, 1234);
        assert_eq!(inode.ctime, 1234);
    }
}
