use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use flatfs::disk_format::layout::MAX_BLOCKS;
use flatfs::shell::Shell;
use flatfs::storage::{BlockStorage, FileBackedStorage};
use flatfs::{FlatFs, BLOCK_SIZE};

const MIB: usize = 1024 * 1024;
/// The largest image a volume can use, in MiB.
const MAX_IMAGE_MIB: u64 = (MAX_BLOCKS * BLOCK_SIZE / MIB) as u64;

#[derive(Parser)]
struct Args {
    /// Disk image, created if missing
    image: PathBuf,
    /// Size of a new image in MiB
    #[arg(value_parser = clap::value_parser!(u64).range(1..=MAX_IMAGE_MIB))]
    size: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let size_hint = args.size.map(|mib| mib as usize * MIB / BLOCK_SIZE);
    let storage = FileBackedStorage::open_or_create(&args.image, size_hint)
        .context("unable to open disk image")?;

    println!("Opened image {}.", args.image.display());
    println!(
        "Size {} blocks ({} bytes).",
        storage.num_blocks(),
        storage.num_blocks() * BLOCK_SIZE
    );

    let fs = FlatFs::mount(storage)?;
    if !fs.is_formatted() {
        println!("The volume is not formatted. Run `format` before using it.");
    }

    Shell::new(fs).run(io::stdin().lock(), &mut io::stdout())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_is_bounded() {
        let args = Args::try_parse_from(["flatfs", "disk.img", "256"]).unwrap();
        assert_eq!(args.size, Some(256));

        assert!(Args::try_parse_from(["flatfs", "disk.img", "0"]).is_err());
        assert!(Args::try_parse_from(["flatfs", "disk.img", "257"]).is_err());
        assert!(Args::try_parse_from(["flatfs", "disk.img", "99999999999999999999"]).is_err());
    }
}
