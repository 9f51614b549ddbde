use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use wz_parse::{WzArchive, WzDirectory, WzEntryKind, WzRegion};

#[derive(Parser)]
#[command(name = "wz-parse", version, about = "Parse MapleStory WZ archives")]
struct Args {
    /// Path to the .wz archive
    input: PathBuf,

    /// Game region, selects the decryption IV (gms, kms, sea, tms, classic)
    #[arg(short, long)]
    region: WzRegion,

    /// MapleStory patch version, brute forced when omitted
    #[arg(short = 'g', long)]
    game_version: Option<String>,

    /// Recurse into subdirectories
    #[arg(long)]
    recurse: bool,

    /// Maximum recursion depth
    #[arg(long, default_value_t = 8)]
    max_depth: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    let archive = WzArchive::open(&args.input, args.region, args.game_version.as_deref())
        .with_context(|| format!("failed to parse {}", args.input.display()))?;

    println!(
        "{}: version {} (hash {:#010x}), region {}, {} root entries",
        args.input.display(),
        archive.meta.version,
        archive.meta.version_hash,
        archive.region,
        archive.root.entries.len()
    );

    let max_depth = if args.recurse { args.max_depth } else { 0 };
    print_directory(&archive, &archive.root, 0, max_depth)
}

fn print_directory(
    archive: &WzArchive,
    directory: &WzDirectory,
    depth: usize,
    max_depth: usize,
) -> Result<()> {
    let indent = "  ".repeat(depth + 1);

    for entry in &directory.entries {
        match entry.kind {
            WzEntryKind::Dir => {
                println!("{indent}{}/", entry.name);
                if depth < max_depth {
                    let child = archive
                        .directory_at(entry.data_offset)
                        .with_context(|| format!("failed to read directory {}", entry.name))?;
                    print_directory(archive, &child, depth + 1, max_depth)?;
                }
            }
            WzEntryKind::File => {
                println!(
                    "{indent}{} ({} bytes at {:#x})",
                    entry.name, entry.file_size, entry.data_offset
                );
            }
        }
    }

    Ok(())
}
