//! Byte-range reads and writes against a regular file's data blocks.

use crate::error::FsResult;
use crate::inode::{append_block, resolve};
use crate::image::Image;
use crate::layout::{BLOCK_SIZE, Inode};

/// Reads up to `buf.len()` bytes starting at `offset`, stopping at the
/// file's current size. Returns the number of bytes actually read.
pub fn read(image: &Image, inode: &Inode, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
    let size = inode.size;
    if offset >= size {
        return Ok(0);
    }
    let want = buf.len().min((size - offset) as usize);
    let mut done = 0usize;
    while done < want {
        let pos = offset + done as u64;
        let block_index = (pos / BLOCK_SIZE as u64) as usize;
        let in_block = (pos % BLOCK_SIZE as u64) as usize;
        let chunk = (BLOCK_SIZE - in_block).min(want - done);

        match resolve(image, inode, block_index)? {
            Some(dnum) => {
                let block = image.block(dnum);
                buf[done..done + chunk].copy_from_slice(&block[in_block..in_block + chunk]);
            }
            None => {
                buf[done..done + chunk].fill(0);
            }
        }
        done += chunk;
    }
    Ok(done)
}

/// Writes `data` at `offset`, growing the file (allocating blocks and
/// bumping `size`) as needed. Returns the number of bytes written, which
/// is always `data.len()` unless the image runs out of space partway
/// through.
pub fn write(image: &mut Image, inode: &mut Inode, offset: u64, data: &[u8]) -> FsResult<usize> {
    let mut done = 0usize;
    while done < data.len() {
        let pos = offset + done as u64;
        let block_index = (pos / BLOCK_SIZE as u64) as usize;
        let in_block = (pos % BLOCK_SIZE as u64) as usize;
        let chunk = (BLOCK_SIZE - in_block).min(data.len() - done);

        while block_index as u32 >= inode.block_count {
            match append_block(image, inode) {
                Ok(_) => {}
                Err(e) => {
                    if done > 0 {
                        finish_write(inode, offset, done);
                        return Ok(done);
                    }
                    return Err(e);
                }
            }
        }
        let dnum = resolve(image, inode, block_index)?.expect("just grown to cover this index");
        let block = image.block_mut(dnum);
        block[in_block..in_block + chunk].copy_from_slice(&data[done..done + chunk]);
        done += chunk;
    }
    finish_write(inode, offset, done);
    Ok(done)
}

fn finish_write(inode: &mut Inode, offset: u64, written: usize) {
    let end = offset + written as u64;
    if end > inode.size {
        inode.size = end;
    }
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

    fn fresh_file_inode() -> Inode {
        let mut inode = Inode::zeroed();
        inode.kind = FileKind::Regular;
        inode.nlink = 1;
        inode
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut image = fresh_image();
        let mut inode = fresh_file_inode();
        write(&mut image, &mut inode, 0, b"hello world").unwrap();
        assert_eq!(inode.size, 11);
        let mut buf = [0u8; 11];
        let n = read(&image, &inode, 0, &mut buf).unwrap();
        assert_eq!(n, 11);
        assert_eq!(&buf, b"hello world");
    }

    #[test]
    fn read_past_eof_returns_zero_bytes() {
        let image = fresh_image();
        let inode = fresh_file_inode();
        let mut buf = [0u8; 4];
        assert_eq!(read(&image, &inode, 100, &mut buf).unwrap(), 0);
    }

    #[test]
    fn write_crossing_a_block_boundary_spans_two_blocks() {
        let mut image = fresh_image();
        let mut inode = fresh_file_inode();
        let data = vec![7u8; BLOCK_SIZE + 10];
        write(&mut image, &mut inode, 0, &data).unwrap();
        assert_eq!(inode.block_count, 2);
        let mut buf = vec![0u8; data.len()];
        read(&image, &inode, 0, &mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn write_past_current_end_leaves_a_hole_read_as_zeros() {
        let mut image = fresh_image();
        let mut inode = fresh_file_inode();
        write(&mut image, &mut inode, BLOCK_SIZE as u64 + 4, b"x").unwrap();
        let mut buf = [0xffu8; 4];
        read(&image, &inode, 0, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 0]);
    }
}
