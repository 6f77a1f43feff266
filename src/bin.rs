//! Command-line entry point: format a fresh image, or mount an existing one over FUSE.
//!
//! `-v`/`--version` is handled ahead of [`Cli::parse`] so it prints and exits before clap's
//! required-subcommand check would otherwise reject a bare `blockfs -v`; clap's own `-V` short
//! flag is reserved for `--version` by default, but the pinned short flag here is lowercase `-v`.

use anyhow::Context;
use blockfs::fuse_bridge::FuseBridge;
use blockfs::Engine;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "blockfs", about = "A userspace block-filesystem engine", disable_version_flag = true)]
struct Cli {
    /// Path to the image file.
    image: PathBuf,

    /// Increase logging verbosity; repeat for more detail (-d, -dd, -ddd).
    #[arg(short = 'd', long = "debug", action = ArgAction::Count, global = true)]
    debug: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initializes a new image file with an empty root directory.
    Format {
        block_size: u32,
        block_count: u32,
        inode_count: u32,
    },
    /// Mounts an existing image at a directory via FUSE.
    Mount {
        mountpoint: PathBuf,
        /// Kept for CLI compatibility; the process always runs in the foreground.
        #[arg(long)]
        foreground: bool,
        #[arg(long)]
        allow_other: bool,
        #[arg(short = 'o', long = "option")]
        options: Vec<String>,
    },
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> anyhow::Result<()> {
    if matches!(std::env::args().nth(1).as_deref(), Some("-v") | Some("--version")) {
        println!("blockfs {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let cli = Cli::parse();
    init_logging(cli.debug);

    match cli.command {
        Command::Format {
            block_size,
            block_count,
            inode_count,
        } => {
            Engine::format(&cli.image, block_size, block_count, inode_count)
                .with_context(|| format!("formatting {}", cli.image.display()))?;
            println!(
                "formatted {} ({block_count} blocks of {block_size} bytes, {inode_count} inodes)",
                cli.image.display()
            );
            Ok(())
        }
        Command::Mount {
            mountpoint,
            foreground: _,
            allow_other,
            options,
        } => {
            let engine =
                Engine::mount(&cli.image).with_context(|| format!("mounting {}", cli.image.display()))?;
            let block_size = engine.block_size();

            let mut mount_options = vec![fuser::MountOption::FSName("blockfs".to_string())];
            if allow_other {
                mount_options.push(fuser::MountOption::AllowOther);
            }
            for opt in options {
                mount_options.push(fuser::MountOption::CUSTOM(opt));
            }

            let bridge = FuseBridge::new(engine, block_size);
            log::info!("mounting {} at {}", cli.image.display(), mountpoint.display());
            fuser::mount2(bridge, &mountpoint, &mount_options)
                .with_context(|| format!("mounting at {}", mountpoint.display()))?;
            Ok(())
        }
    }
}
