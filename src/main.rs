use std::{
    io::{self, IsTerminal},
    path::PathBuf,
    process::ExitCode,
};

use clap::Parser;
use env_logger::Env;

use pseudo_fs::{
    disk::{
        init::open_or_format, DEFAULT_CLUSTER_SIZE, DEFAULT_DISK_SIZE, DEFAULT_IMAGE_PATH,
        DEFAULT_INODE_COUNT,
    },
    fs::config::FormatOptions,
    shell::{command::Session, start_shell},
    utils::parse_size,
};

/// i-node based pseudo file system stored in a single host file
#[derive(Parser, Debug)]
#[command(name = "pseudo-fs", version, about)]
struct Cli {
    /// Backing image; created and formatted when missing
    #[arg(default_value = DEFAULT_IMAGE_PATH)]
    image: PathBuf,

    /// Disk size for a new image, e.g. 600MB
    #[arg(long, value_parser = parse_size, default_value_t = DEFAULT_DISK_SIZE)]
    size: u64,

    /// Cluster size in bytes for a new image
    #[arg(long, default_value_t = DEFAULT_CLUSTER_SIZE)]
    cluster_size: u32,

    /// Number of i-nodes for a new image
    #[arg(long, default_value_t = DEFAULT_INODE_COUNT)]
    inodes: u32,

    /// Replay commands from this host file before reading stdin
    #[arg(long)]
    script: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if !io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let options = FormatOptions {
        disk_size: cli.size,
        cluster_size: cli.cluster_size,
        inode_count: cli.inodes,
        ..FormatOptions::default()
    };

    let fs = match open_or_format(&cli.image, &options) {
        Ok(fs) => fs,
        Err(e) => {
            eprintln!("{}: {}", e.diagnostic(), e);
            return ExitCode::FAILURE;
        }
    };

    let interactive = io::stdin().is_terminal();
    let mut session = Session::new(fs, cli.image, options, interactive);
    match start_shell(&mut session, cli.script.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("IO ERROR: {}", e);
            ExitCode::FAILURE
        }
    }
}
