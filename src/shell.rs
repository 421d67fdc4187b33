use std::{
    fs::File,
    io::{BufRead, Read, Write},
    ops::ControlFlow,
    path::{Path, PathBuf},
};

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use crate::{
    file_handle::OpenMode,
    flatfs::{FileId, FlatFs},
    storage::BlockStorage,
};

/// The number of bytes moved per read/write pair when copying.
pub const COPY_BUFFER_SIZE: usize = 512;

#[derive(Parser)]
#[command(multicall = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Erase the volume
    Format,
    /// List files and free space
    List,
    /// Create an empty file
    Create { file: String },
    /// Remove a file
    Remove { file: String },
    /// Copy a file within the volume
    Copy { source: String, destination: String },
    /// Copy a host file into the volume
    Copyf { real_file: PathBuf, file: String },
    /// Copy a file out of the volume to the host
    Copyt { file: String, real_file: PathBuf },
    /// Leave the shell
    Exit,
}

/// A line-oriented command interpreter over a mounted volume.
pub struct Shell<S: BlockStorage> {
    fs: FlatFs<S>,
}

impl<S: BlockStorage> Shell<S> {
    pub fn new(fs: FlatFs<S>) -> Self {
        Shell { fs }
    }

    pub fn into_inner(self) -> FlatFs<S> {
        self.fs
    }

    /// Runs commands from `input` until `exit` or the end of input. Failed commands are reported
    /// on `output`; only failures of `input` and `output` themselves end the loop early.
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, output: &mut W) -> Result<()> {
        let mut line = String::new();

        loop {
            write!(output, "> ")?;
            output.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                writeln!(output)?;
                return Ok(());
            }

            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }

            let command = match ShellLine::try_parse_from(tokens) {
                Ok(parsed) => parsed.command,
                Err(err) => {
                    write!(output, "{err}")?;
                    continue;
                }
            };

            match self.execute(command, output) {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => return Ok(()),
                Err(err) => writeln!(output, "error: {err:#}")?,
            }
        }
    }

    fn execute<W: Write>(&mut self, command: Command, output: &mut W) -> Result<ControlFlow<()>> {
        match command {
            Command::Format => {
                self.fs.format()?;
                writeln!(output, "Format complete. {} bytes free.", self.fs.free_space()?)?;
            }
            Command::List => {
                for file in self.fs.list()? {
                    writeln!(output, "{}\t\t{}", file.name, file.size)?;
                }
                writeln!(output, "{} bytes free.", self.fs.free_space()?)?;
            }
            Command::Create { file } => {
                self.fs.create(&file)?;
            }
            Command::Remove { file } => {
                self.fs.remove(&file)?;
            }
            Command::Copy {
                source,
                destination,
            } => self.copy(&source, &destination)?,
            Command::Copyf { real_file, file } => self.copy_from_host(&real_file, &file)?,
            Command::Copyt { file, real_file } => self.copy_to_host(&file, &real_file)?,
            Command::Exit => return Ok(ControlFlow::Break(())),
        }

        Ok(ControlFlow::Continue(()))
    }

    fn copy(&mut self, source: &str, destination: &str) -> Result<()> {
        ensure!(source != destination, "can't copy {source} onto itself");

        let reader = self.fs.open(source, OpenMode::Read)?;
        let writer = match self.fs.open(destination, OpenMode::Write) {
            Ok(writer) => writer,
            Err(err) => {
                self.fs.close(reader)?;
                return Err(err.into());
            }
        };

        let mut buffer = [0; COPY_BUFFER_SIZE];
        let copied = loop {
            let read = match self.fs.read(reader, &mut buffer) {
                Ok(0) => break Ok(()),
                Ok(read) => read,
                Err(err) => break Err(err),
            };

            if let Err(err) = self.fs.write(writer, &buffer[..read]) {
                break Err(err);
            }
        };

        let closed_reader = self.fs.close(reader);
        let closed_writer = self.finish(writer);

        copied?;
        closed_reader?;
        closed_writer?;

        info!("copied {source} to {destination}");
        Ok(())
    }

    fn copy_from_host(&mut self, real_file: &Path, file: &str) -> Result<()> {
        let mut stream = File::open(real_file)
            .with_context(|| format!("opening {} for reading", real_file.display()))?;

        let writer = self.fs.open(file, OpenMode::Write)?;

        let mut buffer = [0; COPY_BUFFER_SIZE];
        let copied = loop {
            let read = match stream.read(&mut buffer) {
                Ok(0) => break Ok(()),
                Ok(read) => read,
                Err(err) => {
                    break Err(err).with_context(|| format!("reading {}", real_file.display()))
                }
            };

            if let Err(err) = self.fs.write(writer, &buffer[..read]) {
                break Err(err.into());
            }
        };

        let closed = self.finish(writer);

        copied?;
        closed?;

        info!("copied {} to {file}", real_file.display());
        Ok(())
    }

    fn copy_to_host(&mut self, file: &str, real_file: &Path) -> Result<()> {
        let reader = self.fs.open(file, OpenMode::Read)?;

        let mut stream = match File::create(real_file) {
            Ok(stream) => stream,
            Err(err) => {
                self.fs.close(reader)?;
                return Err(err)
                    .with_context(|| format!("opening {} for writing", real_file.display()));
            }
        };

        let mut buffer = [0; COPY_BUFFER_SIZE];
        let copied = loop {
            let read = match self.fs.read(reader, &mut buffer) {
                Ok(0) => break Ok(()),
                Ok(read) => read,
                Err(err) => break Err(err.into()),
            };

            if let Err(err) = stream.write_all(&buffer[..read]) {
                break Err(err).with_context(|| format!("writing {}", real_file.display()));
            }
        };

        let closed = self.fs.close(reader);

        copied?;
        closed?;

        info!("copied {file} to {}", real_file.display());
        Ok(())
    }

    /// Closes a write handle. If the final flush fails the handle is discarded along with the
    /// bytes it still buffers.
    fn finish(&mut self, writer: FileId) -> Result<()> {
        if let Err(err) = self.fs.close(writer) {
            self.fs.discard(writer)?;
            return Err(err).context("closing the destination, its last bytes were dropped");
        }

        Ok(())
    }
}
