//! A user-space, single-image, memory-mapped filesystem, exposed over FUSE.
//!
//! The image is a single fixed-size file carved into an inode bitmap, a
//! block bitmap, an inode table, and a flat array of data blocks. There is
//! no journal, no support for more than one image per mount, and no
//! concurrent mounts of the same image; see [`fs::Fs`] for the operation
//! surface this crate actually exposes.

pub mod bitmap;
pub mod cli;
pub mod dir;
pub mod error;
pub mod fileio;
pub mod fs;
pub mod fuse_adapter;
pub mod image;
pub mod inode;
pub mod layout;
pub mod mkfs;
pub mod path;
pub mod resolve;
pub mod size;
pub mod util;

pub use error::{FsError, FsResult};
pub use fs::{Fs, Stat};
