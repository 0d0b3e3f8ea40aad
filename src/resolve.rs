//! Walks an absolute path from the root inode to the inode it names.

use crate::dir::lookup;
use crate::error::{FsError, FsResult};
use crate::image::Image;
use crate::layout::{FileKind, ROOT_INUM};
use crate::path;

/// Resolves `path` to an inode number, walking one component at a time
/// from the root. Every intermediate component must itself be a
/// directory.
pub fn resolve(image: &Image, path: &str) -> FsResult<u32> {
    let parts = path::split(path)?;
    let mut inum = ROOT_INUM;
    for part in parts {
        let inode = image.read_inode(inum)?;
        if inode.kind != FileKind::Directory {
            return Err(FsError::NotADirectory);
        }
        inum = lookup(image, &inode, part)?.ok_or(FsError::NotFound)?;
    }
    Ok(inum)
}

/// Resolves a path's parent directory, returning its inode number and the
/// final path component (the name to look up, create, or remove there).
pub fn resolve_parent<'a>(image: &Image, path: &'a str) -> FsResult<(u32, &'a str)> {
    let (parent_path, base) = path::split_parent(path)?;
    let parent_inum = resolve(image, &parent_path)?;
    let parent_inode = image.read_inode(parent_inum)?;
    if parent_inode.kind != FileKind::Directory {
        return Err(FsError::NotADirectory);
    }
    Ok((parent_inum, base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::add_entry;
    use crate::layout::Inode;
    use tempfile::NamedTempFile;

    fn fresh_image() -> Image {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).unwrap();
        Image::open(file.path()).unwrap()
    }

    #[test]
    fn root_resolves_to_inode_zero() {
        let image = fresh_image();
        assert_eq!(resolve(&image, "/").unwrap(), ROOT_INUM);
    }

    #[test]
    fn nested_path_resolves_through_intermediate_directories() {
        let mut image = fresh_image();
        let mut root = image.read_inode(ROOT_INUM).unwrap();

        let mut sub = Inode::zeroed();
        sub.kind = FileKind::Directory;
        sub.nlink = 2;
        image.write_inode(1, &sub);
        image.set_inode_bitmap(1, true);
        add_entry(&mut image, &mut root, "sub", 1).unwrap();
        image.write_inode(ROOT_INUM, &root);

        sub = image.read_inode(1).unwrap();
        let mut file = Inode::zeroed();
        file.kind = FileKind::Regular;
        file.nlink = 1;
        image.write_inode(2, &file);
        image.set_inode_bitmap(2, true);
        add_entry(&mut image, &mut sub, "leaf.txt", 2).unwrap();
        image.write_inode(1, &sub);
        let _ = file;

        assert_eq!(resolve(&image, "/sub/leaf.txt").unwrap(), 2);
    }

    #[test]
    fn missing_component_reports_not_found() {
        let image = fresh_image();
        assert!(matches!(resolve(&image, "/nope"), Err(FsError::NotFound)));
    }

    #[test]
    fn walking_through_a_file_reports_not_a_directory() {
        let mut image = fresh_image();
        let mut root = image.read_inode(ROOT_INUM).unwrap();
        let mut file = Inode::zeroed();
        file.kind = FileKind::Regular;
        file.nlink = 1;
        image.write_inode(1, &file);
        image.set_inode_bitmap(1, true);
        add_entry(&mut image, &mut root, "leaf.txt", 1).unwrap();
        image.write_inode(ROOT_INUM, &root);
        let _ = file;

        assert!(matches!(
            resolve(&image, "/leaf.txt/more"),
            Err(FsError::NotADirectory)
        ));
    }

    #[test]
    fn resolve_parent_splits_path_and_resolves_directory() {
        let image = fresh_image();
        let (parent_inum, base) = resolve_parent(&image, "/hello.txt").unwrap();
        assert_eq!(parent_inum, ROOT_INUM);
        assert_eq!(base, "hello.txt");
    }
}
