#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rxfs_fs::{FileInfo, XfsFilesystem};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

// ── CLI definition ──────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "rxfs", about = "Read-only XFS image reader")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show superblock geometry and per-AG summaries.
    Inspect {
        /// Path to the XFS image.
        image: PathBuf,
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
    /// List a directory inside the image.
    Ls {
        /// Path to the XFS image.
        image: PathBuf,
        /// Directory path inside the image (`.` for the root).
        #[arg(default_value = ".")]
        path: String,
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
    /// Write a file's contents to stdout.
    Cat {
        /// Path to the XFS image.
        image: PathBuf,
        /// File path inside the image.
        path: String,
    },
    /// Show one entry's metadata.
    Stat {
        /// Path to the XFS image.
        image: PathBuf,
        /// Entry path inside the image.
        path: String,
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
}

// ── Serializable outputs ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct InspectOutput {
    fs_name: String,
    version: u16,
    block_size: u32,
    sector_size: u16,
    inode_size: u16,
    ag_blocks: u32,
    ag_count: u32,
    data_blocks: u64,
    inode_count: u64,
    free_inode_count: u64,
    free_data_blocks: u64,
    root_ino: u64,
    dir_entry_ftype: bool,
    allocation_groups: Vec<AgOutput>,
}

#[derive(Debug, Serialize)]
struct AgOutput {
    index: u32,
    length_blocks: u32,
    free_blocks: u32,
    longest_free_extent: u32,
    inode_count: u32,
    free_inode_count: u32,
    free_list_len: usize,
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Inspect { image, json } => inspect(&image, json),
        Command::Ls { image, path, json } => ls(&image, &path, json),
        Command::Cat { image, path } => cat(&image, &path),
        Command::Stat { image, path, json } => stat(&image, &path, json),
    }
}

fn open_image(image: &PathBuf) -> Result<XfsFilesystem> {
    XfsFilesystem::open_path(image)
        .with_context(|| format!("failed to open XFS image {}", image.display()))
}

fn inspect(image: &PathBuf, json: bool) -> Result<()> {
    let fs = open_image(image)?;
    let sb = fs.superblock();

    let output = InspectOutput {
        fs_name: sb.fs_name.clone(),
        version: sb.version_num(),
        block_size: sb.block_size,
        sector_size: sb.sector_size,
        inode_size: sb.inode_size,
        ag_blocks: sb.ag_blocks,
        ag_count: sb.ag_count,
        data_blocks: sb.data_blocks,
        inode_count: sb.inode_count,
        free_inode_count: sb.free_inode_count,
        free_data_blocks: sb.free_data_blocks,
        root_ino: sb.root_ino.0,
        dir_entry_ftype: sb.has_ftype(),
        allocation_groups: fs
            .allocation_groups()
            .iter()
            .map(|ag| AgOutput {
                index: ag.index.0,
                length_blocks: ag.agf.length,
                free_blocks: ag.agf.free_blocks,
                longest_free_extent: ag.agf.longest_free,
                inode_count: ag.agi.inode_count,
                free_inode_count: ag.agi.free_count,
                free_list_len: ag.agfl.free_list.len(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("filesystem:   {} (v{})", output.fs_name, output.version);
    println!(
        "geometry:     {} blocks of {} bytes, {} AGs of {} blocks",
        output.data_blocks, output.block_size, output.ag_count, output.ag_blocks
    );
    println!(
        "inodes:       {} bytes each, {} total, {} free, root at {}",
        output.inode_size, output.inode_count, output.free_inode_count, output.root_ino
    );
    for ag in &output.allocation_groups {
        println!(
            "ag {:>3}:       {} blocks, {} free (longest {}), {} inodes ({} free)",
            ag.index,
            ag.length_blocks,
            ag.free_blocks,
            ag.longest_free_extent,
            ag.inode_count,
            ag.free_inode_count
        );
    }
    Ok(())
}

fn ls(image: &PathBuf, path: &str, json: bool) -> Result<()> {
    let fs = open_image(image)?;
    let entries = fs.read_dir(path)?;

    if json {
        let infos: Vec<&FileInfo> = entries.iter().map(|e| &e.info).collect();
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    for entry in &entries {
        let info = &entry.info;
        let kind = if info.is_dir { 'd' } else { '-' };
        println!(
            "{kind}{:04o} {:>10} {:>12} {}",
            info.mode & 0o7777,
            info.size,
            info.mtime,
            info.name
        );
    }
    Ok(())
}

fn cat(image: &PathBuf, path: &str) -> Result<()> {
    let fs = open_image(image)?;
    let file = fs.open_file(path)?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(&file.into_contents())?;
    handle.flush()?;
    Ok(())
}

fn stat(image: &PathBuf, path: &str, json: bool) -> Result<()> {
    let fs = open_image(image)?;
    let info = fs.stat(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("name:  {}", info.name);
    println!("inode: {}", info.ino);
    println!("size:  {}", info.size);
    println!("mtime: {}", info.mtime);
    println!("mode:  {:06o}", info.mode);
    println!("type:  {}", if info.is_dir { "directory" } else { "file" });
    Ok(())
}
