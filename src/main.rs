use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use driftsync::blobsync::{self, BlobPaths};
use driftsync::config::{self, ConfigOverrides};
use driftsync::executor;
use driftsync::indexer;
use driftsync::logging;
use driftsync::manifest::Manifest;
use driftsync::providers::{FileBackedDump, LocalDirStore, ObjectStore};
use driftsync::reconcile::{self, Direction};
use driftsync::resolver;

#[derive(Parser, Debug)]
#[command(name = "driftsync", version)]
struct Cli {
    /// Path to config file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// App root override (takes precedence over env/config)
    #[arg(long = "app-root")]
    app_root: Option<PathBuf>,

    /// Accept every row's default decision instead of prompting
    #[arg(short = 'y', long = "yes", default_value_t = false)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload local changes for a tree task to the remote bucket
    Push {
        /// Task name; becomes the conf subdirectory (reserved chars sanitized)
        #[arg(long = "task", default_value = "filesystem")]
        task: String,
        /// Local directory to synchronize
        #[arg(long = "dest")]
        dest: PathBuf,
    },
    /// Download remote changes for a tree task into the local directory
    Fetch {
        #[arg(long = "task", default_value = "filesystem")]
        task: String,
        #[arg(long = "dest")]
        dest: PathBuf,
    },
    /// Show pending changes for a tree task without transferring anything
    Diff {
        #[arg(long = "task", default_value = "filesystem")]
        task: String,
        #[arg(long = "dest")]
        dest: PathBuf,
    },
    /// Database-dump sync variant
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Print the resolved app root directory
    ConfigPath,
}

#[derive(Subcommand, Debug)]
enum DbCommands {
    Push {
        #[arg(long = "dbname")]
        dbname: String,
        /// File standing in for the live database being dumped/restored
        #[arg(long = "db-file")]
        db_file: PathBuf,
    },
    Fetch {
        #[arg(long = "dbname")]
        dbname: String,
        #[arg(long = "db-file")]
        db_file: PathBuf,
    },
    Diff {
        #[arg(long = "dbname")]
        dbname: String,
        #[arg(long = "db-file")]
        db_file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = config::resolve_config_path(cli.config.as_deref());
    let overrides = ConfigOverrides {
        app_root: cli.app_root.clone(),
    };
    let app_root = config::resolve_app_root(&config_path, &overrides)?;
    let log_path = logging::init_default_log_file(&app_root)?;
    logging::info_kv(
        "driftsync start",
        &[
            ("app_root", app_root.display().to_string().as_str()),
            ("log", log_path.display().to_string().as_str()),
        ],
    );

    match cli.command {
        Commands::Push { task, dest } => run_tree_push(&app_root, &task, &dest, cli.yes),
        Commands::Fetch { task, dest } => run_tree_fetch(&app_root, &task, &dest, cli.yes),
        Commands::Diff { task, dest } => run_tree_diff(&app_root, &task, &dest),
        Commands::Db { command } => match command {
            DbCommands::Push { dbname, db_file } => run_db_push(&app_root, &dbname, &db_file, cli.yes),
            DbCommands::Fetch { dbname, db_file } => run_db_fetch(&app_root, &dbname, &db_file, cli.yes),
            DbCommands::Diff { dbname, db_file } => run_db_diff(&app_root, &dbname, &db_file),
        },
        Commands::ConfigPath => {
            println!("{}", app_root.display());
            Ok(())
        }
    }
}

fn bucket_root(app_root: &std::path::Path) -> PathBuf {
    app_root.join("bucket")
}

fn open_store(app_root: &std::path::Path, dest: &std::path::Path) -> LocalDirStore {
    LocalDirStore::new(bucket_root(app_root), dest)
}

fn run_tree_push(app_root: &std::path::Path, task: &str, dest: &std::path::Path, yes: bool) -> Result<()> {
    let conf_dir = config::task_conf_dir(app_root, task)?;
    let store = open_store(app_root, dest);

    let last_local = Manifest::load(&indexer::last_local_manifest_path(&conf_dir))?;
    let current = indexer::build_current(dest, &last_local)?;
    current.save(&indexer::current_manifest_path(&conf_dir))?;

    let remote_local = indexer::remote_manifest_path(&conf_dir);
    let _ = store.download_abs("/filesystem.checksum.tsv", &remote_local);
    let remote = Manifest::load(&remote_local)?;

    let plan = reconcile::reconcile(&current, &last_local, &remote, Direction::Push);
    let conflict_decisions = resolver::resolve("conflicts", &plan.conflicts, yes)?;
    let rename_decisions = resolver::resolve("renames", &plan.renames, yes)?;
    let copy_decisions = resolver::resolve("copies", &plan.copies, yes)?;

    let report = executor::execute_push(&store, &plan, &conflict_decisions, &rename_decisions, &copy_decisions);

    report.new_last_local.save(&indexer::last_local_manifest_path(&conf_dir))?;
    store.upload_abs(&indexer::last_local_manifest_path(&conf_dir), "/filesystem.checksum.tsv")?;

    logging::info_kv(
        "push complete",
        &[
            ("task", task),
            ("uploaded", &report.uploaded.to_string()),
            ("errors", &report.errors.len().to_string()),
        ],
    );
    println!("uploaded {} file(s), {} error(s)", report.uploaded, report.errors.len());
    for e in &report.errors {
        eprintln!("error: {e}");
    }
    Ok(())
}

fn run_tree_fetch(app_root: &std::path::Path, task: &str, dest: &std::path::Path, yes: bool) -> Result<()> {
    let conf_dir = config::task_conf_dir(app_root, task)?;
    let store = open_store(app_root, dest);

    let last_local = Manifest::load(&indexer::last_local_manifest_path(&conf_dir))?;
    let current = indexer::build_current(dest, &last_local)?;
    current.save(&indexer::current_manifest_path(&conf_dir))?;

    let remote_local = indexer::remote_manifest_path(&conf_dir);
    if store.download_abs("/filesystem.checksum.tsv", &remote_local).is_err() {
        return Err(driftsync::error::RemoteEmpty.into());
    }
    let remote = Manifest::load(&remote_local)?;

    let plan = reconcile::reconcile(&current, &last_local, &remote, Direction::Fetch);
    let conflict_decisions = resolver::resolve("conflicts", &plan.conflicts, yes)?;
    let rename_decisions = resolver::resolve("renames", &plan.renames, yes)?;
    let copy_decisions = resolver::resolve("copies", &plan.copies, yes)?;
    let deletion_decisions = resolver::resolve("locally deleted", &plan.locally_deleted, yes)?;

    let report = executor::execute_fetch(
        &store,
        dest,
        &plan,
        &conflict_decisions,
        &rename_decisions,
        &copy_decisions,
        &deletion_decisions,
    );

    report.new_last_local.save(&indexer::last_local_manifest_path(&conf_dir))?;

    logging::info_kv(
        "fetch complete",
        &[
            ("task", task),
            ("downloaded", &report.downloaded.to_string()),
            ("errors", &report.errors.len().to_string()),
        ],
    );
    println!("downloaded {} file(s), {} error(s)", report.downloaded, report.errors.len());
    for e in &report.errors {
        eprintln!("error: {e}");
    }
    Ok(())
}

fn run_tree_diff(app_root: &std::path::Path, task: &str, dest: &std::path::Path) -> Result<()> {
    let conf_dir = config::task_conf_dir(app_root, task)?;
    let store = open_store(app_root, dest);

    let last_local = Manifest::load(&indexer::last_local_manifest_path(&conf_dir))?;
    let current = indexer::build_current(dest, &last_local)?;

    let remote_local = indexer::remote_manifest_path(&conf_dir);
    let _ = store.download_abs("/filesystem.checksum.tsv", &remote_local);
    let remote = Manifest::load(&remote_local)?;

    let plan = reconcile::reconcile(&current, &last_local, &remote, Direction::Push);
    println!("unchanged:       {}", plan.unchanged.len());
    println!("auto-transfer:   {}", plan.auto_transfer.len());
    println!("conflicts:       {}", plan.conflicts.len());
    println!("renames:         {}", plan.renames.len());
    println!("copies:          {}", plan.copies.len());
    println!("pure uploads:    {}", plan.pure_transfers.len());
    println!("locally deleted: {}", plan.locally_deleted.len());
    Ok(())
}

fn db_paths(app_root: &std::path::Path, dbname: &str) -> Result<BlobPaths> {
    let conf_dir = config::task_conf_dir(app_root, &format!("db-{dbname}"))?;
    Ok(BlobPaths::new(conf_dir, dbname))
}

fn confirm_blob(yes: bool, label: &str) -> bool {
    if yes {
        return false;
    }
    dialoguer::Confirm::new()
        .with_prompt(label)
        .default(false)
        .interact()
        .unwrap_or(false)
}

fn run_db_push(app_root: &std::path::Path, dbname: &str, db_file: &std::path::Path, yes: bool) -> Result<()> {
    let paths = db_paths(app_root, dbname)?;
    let store = open_store(app_root, &paths.conf_dir);
    let dump = FileBackedDump::new(db_file);

    let outcome = blobsync::push(&store, &dump, &paths, |current, last_local, remote| {
        println!("conflict on database {dbname}:");
        println!("  current:    {} @ {:.3}", current.hash, current.sync_time);
        match last_local {
            Some(ll) => println!("  last-local: {} @ {:.3}", ll.hash, ll.sync_time),
            None => println!("  last-local: (none)"),
        }
        println!("  remote:     {} @ {:.3}", remote.hash, remote.sync_time);
        confirm_blob(yes, "upload local dump, overwriting remote?")
    })?;

    logging::info_kv("db push complete", &[("dbname", dbname), ("outcome", &format!("{outcome:?}"))]);
    println!("{outcome:?}");
    Ok(())
}

fn run_db_fetch(app_root: &std::path::Path, dbname: &str, db_file: &std::path::Path, yes: bool) -> Result<()> {
    let paths = db_paths(app_root, dbname)?;
    let store = open_store(app_root, &paths.conf_dir);
    let dump = FileBackedDump::new(db_file);

    let outcome = blobsync::fetch(&store, &dump, &paths, |current, last_local, remote| {
        println!("conflict on database {dbname}:");
        println!("  current:    {} @ {:.3}", current.hash, current.sync_time);
        match last_local {
            Some(ll) => println!("  last-local: {} @ {:.3}", ll.hash, ll.sync_time),
            None => println!("  last-local: (none)"),
        }
        println!("  remote:     {} @ {:.3}", remote.hash, remote.sync_time);
        confirm_blob(yes, "download remote dump, overwriting local?")
    })?;

    logging::info_kv("db fetch complete", &[("dbname", dbname), ("outcome", &format!("{outcome:?}"))]);
    println!("{outcome:?}");
    Ok(())
}

fn run_db_diff(app_root: &std::path::Path, dbname: &str, db_file: &std::path::Path) -> Result<()> {
    let paths = db_paths(app_root, dbname)?;
    let store = open_store(app_root, &paths.conf_dir);
    let dump = FileBackedDump::new(db_file);

    let diff = blobsync::diff(&store, &dump, &paths)?;
    println!("current:    {} @ {:.3}", diff.current.hash, diff.current.sync_time);
    match &diff.last_local {
        Some(ll) => println!("last-local: {} @ {:.3}", ll.hash, ll.sync_time),
        None => println!("last-local: (none)"),
    }
    match &diff.remote {
        Some(r) => println!("remote:     {} @ {:.3}", r.hash, r.sync_time),
        None => println!("remote:     (none)"),
    }
    println!("in sync: {}", diff.in_sync);
    Ok(())
}
