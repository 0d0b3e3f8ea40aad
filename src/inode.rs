//! Logical-block addressing within a single inode: translating a file-local
//! block index into a physical block number, and growing/shrinking the set
//! of blocks an inode owns.

use crate::bitmap::{allocate_block, free_block};
use crate::error::FsResult;
use crate::image::Image;
use crate::layout::{BlockAddr, DIRECT_BLOCKS, Inode, MAX_BLOCKS_PER_INODE};

/// Resolves the physical block number backing logical block `index` of
/// `inode`, if one is allocated yet.
pub fn resolve(image: &Image, inode: &Inode, index: usize) -> FsResult<Option<u32>> {
    match BlockAddr::of(index)? {
        BlockAddr::Direct(i) => {
            let dnum = inode.blocks[i];
            Ok(if dnum == 0 { None } else { Some(dnum) })
        }
        BlockAddr::Indirect(i) => {
            if inode.indirect == 0 {
                return Ok(None);
            }
            let dnum = image.indirect_entry(inode.indirect, i);
            Ok(if dnum == 0 { None } else { Some(dnum) })
        }
    }
}

/// Appends one freshly allocated block to `inode`, growing its indirect
/// block first if the next slot needs one. Returns the new block's number.
pub fn append_block(image: &mut Image, inode: &mut Inode) -> FsResult<u32> {
    let index = inode.block_count as usize;
    let addr = BlockAddr::of(index)?;
    let dnum = allocate_block(image)?;
    match addr {
        BlockAddr::Direct(i) => {
            inode.blocks[i] = dnum;
        }
        BlockAddr::Indirect(i) => {
            if inode.indirect == 0 {
                inode.indirect = match allocate_block(image) {
                    Ok(indirect_dnum) => indirect_dnum,
                    Err(e) => {
                        free_block(image, dnum);
                        return Err(e);
                    }
                };
            }
            image.set_indirect_entry(inode.indirect, i, dnum);
        }
    }
    inode.block_count += 1;
    Ok(dnum)
}

/// Frees the last block of `inode`, and the indirect block itself once the
/// last indirect-addressed block is gone.
pub fn pop_block(image: &mut Image, inode: &mut Inode) -> FsResult<()> {
    debug_assert!(inode.block_count > 0, "pop_block called on an empty inode");
    let index = inode.block_count as usize - 1;
    let addr = BlockAddr::of(index)?;
    match addr {
        BlockAddr::Direct(i) => {
            image.zero_block(inode.blocks[i]);
            free_block(image, inode.blocks[i]);
            inode.blocks[i] = 0;
        }
        BlockAddr::Indirect(i) => {
            let dnum = image.indirect_entry(inode.indirect, i);
            image.zero_block(dnum);
            free_block(image, dnum);
            image.set_indirect_entry(inode.indirect, i, 0);
            if i == 0 {
                image.zero_block(inode.indirect);
                free_block(image, inode.indirect);
                inode.indirect = 0;
            }
        }
    }
    inode.block_count -= 1;
    Ok(())
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

    fn fresh_inode() -> Inode {
        let mut inode = Inode::zeroed();
        inode.kind = FileKind::Regular;
        inode.nlink = 1;
        inode
    }

    #[test]
    fn appending_past_ten_blocks_allocates_an_indirect_block() {
        let mut image = fresh_image();
        let mut inode = fresh_inode();
        for _ in 0..DIRECT_BLOCKS {
            append_block(&mut image, &mut inode).unwrap();
        }
        assert_eq!(inode.indirect, 0);
        let eleventh = append_block(&mut image, &mut inode).unwrap();
        assert_ne!(inode.indirect, 0);
        assert_eq!(resolve(&image, &inode, DIRECT_BLOCKS).unwrap(), Some(eleventh));
    }

    #[test]
    fn popping_the_last_indirect_block_frees_the_indirect_block_itself() {
        let mut image = fresh_image();
        let mut inode = fresh_inode();
        for _ in 0..=DIRECT_BLOCKS {
            append_block(&mut image, &mut inode).unwrap();
        }
        let indirect_dnum = inode.indirect;
        assert_ne!(indirect_dnum, 0);
        pop_block(&mut image, &mut inode).unwrap();
        assert_eq!(inode.indirect, 0);
        assert_eq!(image.block_bitmap()[indirect_dnum as usize], 0);
    }

    #[test]
    fn resolve_returns_none_for_unallocated_tail() {
        let image = fresh_image();
        let inode = fresh_inode();
        assert_eq!(resolve(&image, &inode, 0).unwrap(), None);
    }

    #[test]
    fn exceeding_max_blocks_per_inode_reports_no_space() {
        assert!(BlockAddr::of(MAX_BLOCKS_PER_INODE).is_err());
        assert!(BlockAddr::of(MAX_BLOCKS_PER_INODE - 1).is_ok());
    }
}
