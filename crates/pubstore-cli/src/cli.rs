use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "pubstore",
    about = "Publish package repositories to Cloud Storage buckets",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Bucket to publish to (overrides the configuration file)
    #[arg(short, long, global = true)]
    pub bucket: Option<String>,

    /// Key prefix inside the bucket (overrides the configuration file)
    #[arg(short, long, global = true)]
    pub prefix: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a directory (no-op on blob stores)
    Mkdir(PathArgs),
    /// Upload a local file
    Put(PutArgs),
    /// Upload every file of a local directory tree
    Push(PushArgs),
    /// Remove a single file
    Rm(PathArgs),
    /// Remove a directory and everything under it
    Rmdir(PathArgs),
    /// List files under a directory
    Ls(LsArgs),
    /// Rename a file
    Mv(MvArgs),
    /// Check whether a file exists
    Exists(PathArgs),
    /// Publish a file from the package pool
    Link(LinkArgs),
    /// Create a symbolic or hard link
    Ln(LnArgs),
    /// Read the target of a symbolic link
    Readlink(PathArgs),
}

#[derive(Args)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Args)]
pub struct PutArgs {
    pub source: PathBuf,
    pub dest: String,
}

#[derive(Args)]
pub struct PushArgs {
    pub source: PathBuf,
    #[arg(default_value = "")]
    pub dest: String,
}

#[derive(Args)]
pub struct LsArgs {
    #[arg(default_value = "")]
    pub dir: String,
}

#[derive(Args)]
pub struct MvArgs {
    pub old: String,
    pub new: String,
}

#[derive(Args)]
pub struct LinkArgs {
    /// Directory inside the published repository
    pub published_dir: String,
    /// Root directory of the package pool
    pub pool_root: PathBuf,
    /// Path of the package inside the pool
    pub pool_path: String,
    /// File name to publish as (defaults to the pool file's name)
    #[arg(long)]
    pub name: Option<String>,
    /// Expected MD5 of the package, hex encoded
    #[arg(long)]
    pub md5: Option<String>,
    /// Overwrite a different file at the destination
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args)]
pub struct LnArgs {
    pub src: String,
    pub dst: String,
    #[arg(short = 's', long, conflicts_with = "hard")]
    pub symbolic: bool,
    #[arg(short = 'H', long)]
    pub hard: bool,
}
