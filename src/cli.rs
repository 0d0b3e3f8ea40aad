//! Argument parsing for the `boxfs-mount` binary, in the same unadorned
//! `env::args_os()` + `match` style the rest of this project's tools use
//! rather than reaching for an argument-parsing crate.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::exit;

pub struct Args {
    pub image_path: PathBuf,
    pub mount_point: PathBuf,
    pub foreground: bool,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!(" boxfs-mount [-f] <image> <mountpoint>");
    eprintln!();
    eprintln!("Options:");
    eprintln!(" -f:\t\trun in the foreground instead of forking off the mount");
    eprintln!(" image:\tpath to the backing image file (created if missing)");
    eprintln!(" mountpoint:\tdirectory to mount the filesystem on");
}

/// Reports a usage error the way this project's other binaries do and
/// exits the process; never returns.
pub fn error(bin: &str, msg: impl std::fmt::Display) -> ! {
    eprintln!("{bin}: error: {msg}");
    exit(1);
}

/// Shows a prompt and reads back one line of input. Deliberately plain:
/// nothing in this crate ever needs hidden/password input, so there is no
/// termios fiddling here, just a flush and a line read.
pub fn prompt(text: &str) -> Option<String> {
    use std::io::{self, BufRead, Write};
    print!("{text}");
    io::stdout().flush().ok()?;
    io::stdin().lock().lines().next()?.ok()
}

pub fn parse(args: impl Iterator<Item = OsString>) -> Args {
    let args: Vec<_> = args.skip(1).collect();
    let mut foreground = false;
    let mut positional = Vec::new();

    for arg in args {
        match arg.to_str() {
            Some("-h") => {
                print_usage();
                exit(0);
            }
            Some("-f") => foreground = true,
            _ => positional.push(arg),
        }
    }

    let [image_path, mount_point] = <[OsString; 2]>::try_from(positional).unwrap_or_else(|got| {
        eprintln!("expected exactly 2 positional arguments, got {}", got.len());
        print_usage();
        exit(1);
    });

    Args {
        image_path: PathBuf::from(image_path),
        mount_point: PathBuf::from(mount_point),
        foreground,
    }
}
