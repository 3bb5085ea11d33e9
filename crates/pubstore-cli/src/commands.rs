use std::path::Path;

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use pubstore_publish::{
    BlobPublishedStorage, LinkOutcome, LocalPackagePool, LogProgress, PublishedStorage,
    StorageConfig,
};
use pubstore_types::{join_key, ChecksumInfo};
use serde_json::json;
use tracing::debug;
use walkdir::WalkDir;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(cli.config.as_deref(), cli.bucket, cli.prefix)?;
    let storage = BlobPublishedStorage::connect(&config)?;
    debug!(storage = %storage, "connected");
    dispatch(&storage, cli.command, cli.format)
}

/// Configuration file values with command-line overrides applied on top.
fn resolve_config(
    path: Option<&Path>,
    bucket: Option<String>,
    prefix: Option<String>,
) -> anyhow::Result<StorageConfig> {
    let mut config = match path {
        Some(path) => StorageConfig::read(path)?,
        None => StorageConfig::default(),
    };
    if let Some(bucket) = bucket {
        config.bucket = bucket;
    }
    if let Some(prefix) = prefix {
        config.prefix = prefix;
    }
    config
        .validate()
        .context("a bucket is required (--bucket or the configuration file)")?;
    Ok(config)
}

fn dispatch(
    storage: &dyn PublishedStorage,
    command: Command,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match command {
        Command::Mkdir(args) => {
            storage.mkdir(&args.path)?;
            report(format, json!({ "created": args.path }), || {
                println!("{} {}", "✓".green(), args.path.bold());
            });
            Ok(())
        }
        Command::Put(args) => cmd_put(storage, args, format),
        Command::Push(args) => cmd_push(storage, args, format),
        Command::Rm(args) => {
            storage.remove(&args.path)?;
            report(format, json!({ "removed": args.path }), || {
                println!("{} Removed {}", "✓".green(), args.path.bold());
            });
            Ok(())
        }
        Command::Rmdir(args) => cmd_rmdir(storage, args, format),
        Command::Ls(args) => cmd_ls(storage, args, format),
        Command::Mv(args) => {
            storage.rename_file(&args.old, &args.new)?;
            report(format, json!({ "from": args.old, "to": args.new }), || {
                println!("{} {} → {}", "✓".green(), args.old.bold(), args.new.bold());
            });
            Ok(())
        }
        Command::Exists(args) => {
            let exists = storage.file_exists(&args.path)?;
            report(format, json!({ "path": args.path, "exists": exists }), || {
                if exists {
                    println!("{} {}", "exists".green(), args.path);
                } else {
                    println!("{} {}", "missing".yellow(), args.path);
                }
            });
            Ok(())
        }
        Command::Link(args) => cmd_link(storage, args, format),
        Command::Ln(args) => {
            if args.symbolic {
                storage.symlink(&args.src, &args.dst)?;
            } else {
                storage.hard_link(&args.src, &args.dst)?;
            }
            Ok(())
        }
        Command::Readlink(args) => {
            let target = storage.read_link(&args.path)?;
            report(format, json!({ "path": args.path, "target": target }), || {
                println!("{target}");
            });
            Ok(())
        }
    }
}

fn report(format: OutputFormat, value: serde_json::Value, text: impl FnOnce()) {
    match format {
        OutputFormat::Json => println!("{value}"),
        OutputFormat::Text => text(),
    }
}

fn cmd_put(
    storage: &dyn PublishedStorage,
    args: PutArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    storage.put_file(&args.dest, &args.source)?;
    report(format, json!({ "uploaded": [args.dest] }), || {
        println!("{} {} → {}", "✓".green(), args.source.display(), args.dest.bold());
    });
    Ok(())
}

fn cmd_push(
    storage: &dyn PublishedStorage,
    args: PushArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut uploaded = Vec::new();
    for entry in WalkDir::new(&args.source).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", args.source.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(&args.source)?;
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let dest = join_key(&[&args.dest, &relative.join("/")]);
        storage.put_file(&dest, entry.path())?;
        uploaded.push(dest);
    }

    report(format, json!({ "uploaded": uploaded }), || {
        for dest in &uploaded {
            println!("  {} {}", "uploaded:".green(), dest);
        }
        println!(
            "{} {} files pushed to {}",
            "✓".green().bold(),
            uploaded.len(),
            storage.to_string().cyan()
        );
    });
    Ok(())
}

fn cmd_rmdir(
    storage: &dyn PublishedStorage,
    args: PathArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut progress = LogProgress::new();
    let removal = storage.remove_dirs(&args.path, &mut progress)?;

    report(format, json!(removal), || {
        println!(
            "{} Removed {} objects under {}",
            "✓".green(),
            removal.deleted,
            args.path.bold()
        );
        for failed in &removal.failed {
            println!("  {} {}: {}", "failed:".red(), failed.key, failed.error);
        }
    });
    if !removal.is_complete() {
        bail!(
            "{} objects under {} could not be removed",
            removal.failed.len(),
            args.path
        );
    }
    Ok(())
}

fn cmd_ls(
    storage: &dyn PublishedStorage,
    args: LsArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let files = storage.filelist(&args.dir)?;
    report(format, json!(files), || {
        for file in &files {
            println!("{file}");
        }
    });
    Ok(())
}

fn cmd_link(
    storage: &dyn PublishedStorage,
    args: LinkArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let base_name = match args.name {
        Some(name) => name,
        None => Path::new(&args.pool_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("cannot derive a file name from {}", args.pool_path))?,
    };
    let checksums = args.md5.map(ChecksumInfo::with_md5).unwrap_or_default();
    let pool = LocalPackagePool::new(args.pool_root);

    let outcome = storage.link_from_pool(
        &args.published_dir,
        &base_name,
        &pool,
        &args.pool_path,
        &checksums,
        args.force,
    )?;

    let dest = join_key(&[&args.published_dir, &base_name]);
    report(format, json!({ "path": dest, "outcome": outcome }), || {
        let status = match outcome {
            LinkOutcome::AlreadyPresent => "unchanged".dimmed(),
            LinkOutcome::Uploaded => "uploaded".green(),
            LinkOutcome::Replaced => "replaced".yellow(),
        };
        println!("{} {}", status, dest.bold());
    });
    Ok(())
}
