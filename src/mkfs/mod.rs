//! The `boxfs-mkfs` tool creates a fresh, formatted image file standalone,
//! independent of mounting it.
//!
//! Same "-h"/positional argument parsing style as `boxfs-mount`, and the
//! same prompt-before-clobbering policy for a device that already looks
//! formatted.

use std::env::ArgsOs;
use std::fs::OpenOptions;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::exit;

use crate::cli::{error, prompt};
use crate::image::Image;
use crate::layout::IMAGE_SIZE;

struct Args {
    image_path: Option<PathBuf>,
    force: bool,
}

fn print_usage() {
    eprintln!("Usage: boxfs-mkfs [-f|--force] <image>");
    eprintln!();
    eprintln!("Creates a fresh boxfs image at <image>, formatted with an empty root directory.");
    eprintln!(
        "Refuses to reformat a file that already looks like a formatted image unless --force is given."
    );
}

fn parse_args(args: ArgsOs) -> Args {
    let mut force = false;
    let mut image_path = None;
    for arg in args.skip(1) {
        match arg.to_str() {
            Some("-h" | "--help") => {
                print_usage();
                exit(0);
            }
            Some("-f" | "--force") => force = true,
            // TODO handle the case when several image paths are given
            _ => image_path = Some(PathBuf::from(arg)),
        }
    }
    Args { image_path, force }
}

/// Tells whether `path` already looks like a formatted boxfs image: the
/// right fixed size, with the root inode's bitmap bit already set.
fn is_present(path: &Path) -> bool {
    let Ok(mut file) = OpenOptions::new().read(true).open(path) else {
        return false;
    };
    let Ok(meta) = file.metadata() else {
        return false;
    };
    if meta.len() != IMAGE_SIZE as u64 {
        return false;
    }
    let mut root_bit = [0u8; 1];
    file.read_exact(&mut root_bit).is_ok() && root_bit[0] != 0
}

pub fn main(args: ArgsOs) {
    let args = parse_args(args);
    let image_path = args
        .image_path
        .unwrap_or_else(|| error("boxfs-mkfs", "specify path to an image file"));

    if !args.force && is_present(&image_path) {
        println!("{} already contains a formatted boxfs image.", image_path.display());
        let confirm = prompt("Proceed and reformat it anyway? (y/N) ")
            .map(|s| s.to_lowercase() == "y")
            .unwrap_or(false);
        if !confirm {
            eprintln!("Abort.");
            exit(1);
        }
        std::fs::remove_file(&image_path).unwrap_or_else(|e| {
            error("boxfs-mkfs", format!("{}: {e}", image_path.display()))
        });
    }

    Image::create_new(&image_path).unwrap_or_else(|e| {
        error("boxfs-mkfs", format!("failed to create {}: {e}", image_path.display()))
    });
    println!("formatted {}", image_path.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn is_present_is_false_for_a_missing_or_wrong_sized_file() {
        assert!(!is_present(Path::new("/nonexistent/boxfs.img")));

        let file = NamedTempFile::new().unwrap();
        assert!(!is_present(file.path()));
    }

    #[test]
    fn is_present_is_true_for_a_freshly_formatted_image() {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).unwrap();
        Image::create_new(file.path()).unwrap();
        assert!(is_present(file.path()));
    }
}
