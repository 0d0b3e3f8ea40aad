//! `boxfs-mount`: mounts a boxfs image on a directory via FUSE.

use std::env;

use boxfs::cli::{self, error};
use boxfs::fs::Fs;
use boxfs::fuse_adapter::BoxFs;

fn main() {
    env_logger::init();

    let args = cli::parse(env::args_os());

    let fs = Fs::open(&args.image_path).unwrap_or_else(|e| {
        error(
            "boxfs-mount",
            format!("could not open {:?}: {e}", args.image_path),
        )
    });

    let mut options = vec![fuser::MountOption::FSName("boxfs".to_string())];
    if !args.foreground {
        options.push(fuser::MountOption::AutoUnmount);
    }

    log::info!("mounting {:?} on {:?}", args.image_path, args.mount_point);
    if let Err(e) = fuser::mount2(BoxFs::new(fs), &args.mount_point, &options) {
        error("boxfs-mount", format!("mount failed: {e}"));
    }
}
