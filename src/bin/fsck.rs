use std::{fs::File, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use flatfs::{storage::FileBackedStorage, FlatFs};

#[derive(Parser)]
struct Args {
    /// Disk image
    image: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let image = File::options()
        .read(true)
        .open(&args.image)
        .context("unable to open disk image in read-only mode")?;
    let storage = FileBackedStorage::new(image)?;

    let fs = FlatFs::mount(storage)?;
    fs.check()?;

    println!("{}: clean, {} bytes free", args.image.display(), fs.free_space()?);

    Ok(())
}
