//! Owns the memory-mapped backing file and hands out byte-range views onto
//! its regions. Nothing above this module ever computes a region offset by
//! hand or touches the map directly.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use memmap2::MmapMut;

use crate::error::{FsError, FsResult};
use crate::layout::{
    BLOCK_BITMAP_OFFSET, BLOCK_BITMAP_SIZE, BLOCK_SIZE, DATA_OFFSET, FileKind, INODE_BITMAP_OFFSET,
    INODE_BITMAP_SIZE, INODE_RECORD_SIZE, INODE_TABLE_OFFSET, Inode, NUM_BLOCKS, NUM_INODES,
    ROOT_INUM,
};

/// The mapped image: a fixed-size file, opened and mapped once for the
/// life of the mount. Resizing or remapping after open is never needed
/// since the image's size is a compile-time constant.
pub struct Image {
    mmap: MmapMut,
}

impl Image {
    /// Opens an existing image file, or creates and formats a new one if
    /// `path` doesn't exist yet. An existing file that is already the
    /// right size and already has a root inode is mounted as-is, never
    /// reformatted out from under its contents.
    pub fn open(path: &Path) -> FsResult<Self> {
        let existed = path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if !existed {
            file.set_len(crate::layout::IMAGE_SIZE as u64)?;
        } else {
            let len = file.metadata()?.len();
            if len != crate::layout::IMAGE_SIZE as u64 {
                return Err(FsError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "image file is not the expected fixed size",
                )));
            }
        }

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let mut image = Image { mmap };

        if !existed || !image.inode_is_allocated(ROOT_INUM) {
            image.format_root()?;
        }

        Ok(image)
    }

    /// Creates and formats a brand-new image at `path`, failing if one
    /// already exists there. Used by the standalone image-creation tool,
    /// which wants explicit overwrite protection rather than the mount
    /// path's "use it if it's already there" behavior.
    pub fn create_new(path: &Path) -> FsResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.set_len(crate::layout::IMAGE_SIZE as u64)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let mut image = Image { mmap };
        image.format_root()?;
        Ok(image)
    }

    /// Flushes pending writes back to the backing file. `fuser` calls
    /// `fsync`/`flush` at points where this matters; everything else relies
    /// on the kernel's own writeback of the mapped pages.
    pub fn sync(&self) -> FsResult<()> {
        self.mmap.flush()?;
        Ok(())
    }

    fn format_root(&mut self) -> FsResult<()> {
        self.mmap[INODE_BITMAP_OFFSET..INODE_BITMAP_OFFSET + INODE_BITMAP_SIZE].fill(0);
        self.mmap[BLOCK_BITMAP_OFFSET..BLOCK_BITMAP_OFFSET + BLOCK_BITMAP_SIZE].fill(0);
        self.mmap[INODE_TABLE_OFFSET..DATA_OFFSET].fill(0);

        self.set_inode_bitmap(ROOT_INUM, true);

        let now = crate::util::now_secs();
        let mut root = Inode::zeroed();
        root.kind = FileKind::Directory;
        root.mode = libc::S_IFDIR as u32 | 0o755;
        root.nlink = 1;
        root.size = 0;
        root.atime = now;
        root.mtime = now;
        root.ctime = now;
        self.write_inode(ROOT_INUM, &root);
        Ok(())
    }

    // --- inode bitmap -----------------------------------------------------

    pub fn inode_bitmap(&self) -> &[u8] {
        &self.mmap[INODE_BITMAP_OFFSET..INODE_BITMAP_OFFSET + INODE_BITMAP_SIZE]
    }

    fn inode_is_allocated(&self, inum: u32) -> bool {
        self.inode_bitmap()[inum as usize] != 0
    }

    pub fn set_inode_bitmap(&mut self, inum: u32, used: bool) {
        self.mmap[INODE_BITMAP_OFFSET + inum as usize] = used as u8;
    }

    // --- block bitmap -------------------------------------------------------

    pub fn block_bitmap(&self) -> &[u8] {
        &self.mmap[BLOCK_BITMAP_OFFSET..BLOCK_BITMAP_OFFSET + BLOCK_BITMAP_SIZE]
    }

    pub fn set_block_bitmap(&mut self, dnum: u32, used: bool) {
        self.mmap[BLOCK_BITMAP_OFFSET + dnum as usize] = used as u8;
    }

    // --- inode table --------------------------------------------------------

    fn inode_offset(inum: u32) -> usize {
        INODE_TABLE_OFFSET + inum as usize * INODE_RECORD_SIZE
    }

    pub fn read_inode(&self, inum: u32) -> FsResult<Inode> {
        if inum as usize >= NUM_INODES {
            return Err(FsError::NotFound);
        }
        let off = Self::inode_offset(inum);
        Inode::from_bytes(&self.mmap[off..off + INODE_RECORD_SIZE])
    }

    pub fn write_inode(&mut self, inum: u32, inode: &Inode) {
        let off = Self::inode_offset(inum);
        inode.to_bytes(&mut self.mmap[off..off + INODE_RECORD_SIZE]);
    }

    // --- data blocks ---------------------------------------------------------

    fn block_offset(dnum: u32) -> usize {
        DATA_OFFSET + dnum as usize * BLOCK_SIZE
    }

    pub fn block(&self, dnum: u32) -> &[u8] {
        let off = Self::block_offset(dnum);
        &self.mmap[off..off + BLOCK_SIZE]
    }

    pub fn block_mut(&mut self, dnum: u32) -> &mut [u8] {
        let off = Self::block_offset(dnum);
        &mut self.mmap[off..off + BLOCK_SIZE]
    }

    pub fn zero_block(&mut self, dnum: u32) {
        self.block_mut(dnum).fill(0);
    }

    /// Reads the `index`-th pointer out of a block being used as an
    /// indirect block (an array of `u32` block numbers, zero meaning
    /// "unused").
    pub fn indirect_entry(&self, indirect_dnum: u32, index: usize) -> u32 {
        let block = self.block(indirect_dnum);
        u32::from_ne_bytes(block[index * 4..index * 4 + 4].try_into().unwrap())
    }

    pub fn set_indirect_entry(&mut self, indirect_dnum: u32, index: usize, dnum: u32) {
        let block = self.block_mut(indirect_dnum);
        block[index * 4..index * 4 + 4].copy_from_slice(&dnum.to_ne_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn fresh_image_has_an_allocated_root_directory() {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).unwrap();
        let image = Image::open(file.path()).unwrap();
        assert!(image.inode_is_allocated(ROOT_INUM));
        let root = image.read_inode(ROOT_INUM).unwrap();
        assert_eq!(root.kind, FileKind::Directory);
        assert_eq!(root.mode, 0o40755);
    }

    #[test]
    fn reopening_an_existing_image_preserves_its_contents() {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).unwrap();
        {
            let mut image = Image::open(file.path()).unwrap();
            image.set_block_bitmap(3, true);
            image.sync().unwrap();
        }
        let image = Image::open(file.path()).unwrap();
        assert_ne!(image.block_bitmap()[3], 0);
    }

    #[test]
    fn create_new_refuses_to_clobber_an_existing_file() {
        let file = NamedTempFile::new().unwrap();
        assert!(Image::create_new(file.path()).is_err());
    }
}
