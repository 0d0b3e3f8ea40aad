//! `boxfs-mkfs`: formats a fresh boxfs image file, independent of mounting it.

use std::env;

fn main() {
    boxfs::mkfs::main(env::args_os());
}
