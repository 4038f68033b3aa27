//! Standalone SSTable dump tool.
//!
//! Reads raw SSTable files directly off disk — it does not open an
//! [`ordinalkv::engine::Engine`] or a [`ordinalkv::catalog::Catalog`], so it
//! keeps working even against a store whose catalog can't currently be
//! recovered. Prints, for every record: its file offset, timestamp, key,
//! value length, and a truncated preview of the value.
//!
//! ```text
//! ordinalkv-dump --all <root>
//! ordinalkv-dump --level <L> --id <I> <root>
//! ```

use std::env;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const PREVIEW_LEN: usize = 60;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut all = false;
    let mut level: Option<usize> = None;
    let mut id: Option<usize> = None;
    let mut root: Option<PathBuf> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--all" => all = true,
            "--level" => {
                i += 1;
                level = args.get(i).and_then(|s| s.parse().ok());
            }
            "--id" => {
                i += 1;
                id = args.get(i).and_then(|s| s.parse().ok());
            }
            other => root = Some(PathBuf::from(other)),
        }
        i += 1;
    }

    let Some(root) = root else {
        eprintln!("usage: ordinalkv-dump --all <root>");
        eprintln!("       ordinalkv-dump --level <L> --id <I> <root>");
        return ExitCode::FAILURE;
    };

    let result = match (all, level, id) {
        (true, _, _) => dump_all(&root),
        (false, Some(level), Some(id)) => dump_table(&root, level, id),
        _ => {
            eprintln!("usage: ordinalkv-dump --all <root>");
            eprintln!("       ordinalkv-dump --level <L> --id <I> <root>");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn dump_all(root: &Path) -> std::io::Result<()> {
    let mut level = 0usize;
    loop {
        let level_dir = root.join(format!("level-{level}"));
        if !level_dir.is_dir() {
            break;
        }
        let mut id = 0usize;
        loop {
            let path = level_dir.join(format!("sstable-{id}"));
            if !path.is_file() {
                break;
            }
            println!("\n### {}", path.display());
            dump_file(&path)?;
            id += 1;
        }
        level += 1;
    }
    Ok(())
}

fn dump_table(root: &Path, level: usize, id: usize) -> std::io::Result<()> {
    let path = root.join(format!("level-{level}")).join(format!("sstable-{id}"));
    if !path.is_file() {
        println!("{} doesn't exist", path.display());
        return Ok(());
    }
    dump_file(&path)
}

/// Reads the 8-byte footer to find where the index region starts, then
/// streams records from the beginning of the file up to that offset.
fn dump_file(path: &Path) -> std::io::Result<()> {
    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();
    if file_len < 8 {
        println!("[meta] file too short to contain a footer");
        return Ok(());
    }

    file.seek(SeekFrom::End(-8))?;
    let mut footer = [0u8; 8];
    file.read_exact(&mut footer)?;
    let index_region_start = u64::from_le_bytes(footer);
    println!("[meta] index table @ {index_region_start}");

    file.seek(SeekFrom::Start(0))?;
    let mut pos = 0u64;
    while pos < index_region_start {
        let offset = pos;
        let mut head = [0u8; 24];
        file.read_exact(&mut head)?;
        let key = u64::from_le_bytes(head[0..8].try_into().unwrap());
        let timestamp = i64::from_le_bytes(head[8..16].try_into().unwrap());
        let len = u64::from_le_bytes(head[16..24].try_into().unwrap());

        let mut value = vec![0u8; len as usize];
        file.read_exact(&mut value)?;

        let preview_len = value.len().min(PREVIEW_LEN);
        let preview = String::from_utf8_lossy(&value[..preview_len]);
        println!("<{offset}> {timestamp}\t{key}: [{len}] {preview}");

        pos = file.stream_position()?;
    }
    Ok(())
}
