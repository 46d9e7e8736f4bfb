use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use scm_update_lib::config::UpdateConfig;
use scm_update_lib::ledger::{JsonFileVersionLedger, VersionLedger};
use scm_update_lib::legacy::{
    self, GroupV1PropertyReader, RepositoryV1PropertyReader, UserV1PropertyReader, V1Properties,
    V1PropertyReader,
};
use scm_update_lib::store::{StoreRelocation, StoreType};
use scm_update_lib::{logging, time, Version};

#[derive(Debug, Parser)]
#[command(
    name = "scm-update",
    about = "Inspect and repair SCM server data migration state",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("SCM_UPDATE_GIT_HASH"), ")")
)]
struct Cli {
    /// Server home directory. Defaults to $SCM_HOME, then ~/.scm.
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Also write JSON logs to a daily file in this directory. Overrides
    /// $SCM_UPDATE_LOG_DIR.
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the versions recorded in the update ledger.
    Status {
        /// Emit the raw ledger entries as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Record a version for a data type by hand.
    Record {
        data_type: String,
        version: String,
        /// Allow recording a version older than the one already recorded.
        #[arg(long)]
        force: bool,
    },
    /// Dump a legacy property store.
    Legacy {
        #[arg(value_enum)]
        kind: LegacyKind,
        /// Only owners having every one of these keys.
        #[arg(long = "having-all", value_name = "KEY")]
        having_all: Vec<String>,
        /// Only owners having at least one of these keys.
        #[arg(long = "having-any", value_name = "KEY")]
        having_any: Vec<String>,
    },
    /// Rename or delete a persisted store.
    #[command(subcommand)]
    Store(StoreCommand),
    /// Version string utilities.
    #[command(subcommand)]
    Version(VersionCommand),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LegacyKind {
    Repository,
    User,
    Group,
}

#[derive(Debug, Args)]
struct StoreTarget {
    #[arg(long = "type", value_parser = parse_store_type)]
    store_type: StoreType,
    #[arg(long)]
    name: String,
    #[arg(long)]
    repository: Option<String>,
    #[arg(long)]
    namespace: Option<String>,
}

#[derive(Debug, Subcommand)]
enum StoreCommand {
    Rename {
        #[command(flatten)]
        target: StoreTarget,
        /// New store name.
        #[arg(long)]
        to: String,
    },
    Delete {
        #[command(flatten)]
        target: StoreTarget,
    },
}

#[derive(Debug, Subcommand)]
enum VersionCommand {
    /// Print how two versions order.
    Compare { left: String, right: String },
}

fn parse_store_type(value: &str) -> std::result::Result<StoreType, String> {
    value.parse::<StoreType>().map_err(|err| err.message().to_string())
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    if let Commands::Version(command) = &cli.command {
        return handle_version_command(command);
    }

    let mut config = UpdateConfig::resolve(cli.home).context("resolve server home")?;
    if let Some(log_dir) = cli.log_dir {
        config = config.with_log_dir(log_dir);
    }
    // A second init only happens in embedded use; the first subscriber wins.
    let _ = logging::init(config.log_dir());
    tracing::debug!(
        target: "scm_update",
        event = "cli_start",
        home = %config.home().display()
    );

    match cli.command {
        Commands::Status { json } => handle_status(&config, json),
        Commands::Record {
            data_type,
            version,
            force,
        } => handle_record(&config, &data_type, &version, force),
        Commands::Legacy {
            kind,
            having_all,
            having_any,
        } => handle_legacy(&config, kind, &having_all, &having_any),
        Commands::Store(command) => handle_store_command(&config, command),
        Commands::Version(_) => Ok(0),
    }
}

fn handle_status(config: &UpdateConfig, json: bool) -> Result<i32> {
    let ledger = JsonFileVersionLedger::open(config.ledger_path())?;
    let entries = ledger.entries();

    if json {
        let serialized =
            serde_json::to_string_pretty(entries).context("serialize ledger entries")?;
        println!("{serialized}");
        return Ok(0);
    }

    if entries.is_empty() {
        println!("No update steps recorded.");
        return Ok(0);
    }
    println!("{:<40} {:<16} APPLIED AT", "DATA TYPE", "VERSION");
    for (data_type, entry) in entries {
        println!(
            "{data_type:<40} {:<16} {}",
            entry.version,
            time::format_ms(entry.applied_at)
        );
    }
    Ok(0)
}

fn handle_record(config: &UpdateConfig, data_type: &str, version: &str, force: bool) -> Result<i32> {
    let version: Version = version.parse()?;
    config.ensure_layout()?;
    let mut ledger = JsonFileVersionLedger::open(config.ledger_path())?;
    if let Some(current) = ledger.get(data_type)? {
        if current.is_newer(&version) {
            if !force {
                bail!(
                    "{data_type} is already at {current}; refusing to record older version \
                     {version} without --force"
                );
            }
            tracing::warn!(
                target: "scm_update",
                event = "ledger_downgrade_forced",
                data_type = %data_type,
                from = %current,
                to = %version
            );
        }
    }
    ledger.record(data_type, &version)?;
    println!("Recorded {data_type} at version {version}.");
    Ok(0)
}

fn handle_legacy(
    config: &UpdateConfig,
    kind: LegacyKind,
    having_all: &[String],
    having_any: &[String],
) -> Result<i32> {
    let reader: &dyn V1PropertyReader = match kind {
        LegacyKind::Repository => &RepositoryV1PropertyReader,
        LegacyKind::User => &UserV1PropertyReader,
        LegacyKind::Group => &GroupV1PropertyReader,
    };
    let all = legacy::load_legacy_store(config, reader)?;

    let mut instance = reader.create_instance(&all);
    if !having_all.is_empty() {
        instance = instance.having_all_of(having_all);
    }
    if !having_any.is_empty() {
        instance = instance.having_any_of(having_any);
    }

    let selected: BTreeMap<&str, &V1Properties> = instance.entries().collect();
    let serialized = serde_json::to_string_pretty(&selected).context("serialize legacy store")?;
    println!("{serialized}");
    Ok(0)
}

fn handle_store_command(config: &UpdateConfig, command: StoreCommand) -> Result<i32> {
    match command {
        StoreCommand::Rename { target, to } => {
            let updater = relocation(config, target).build()?;
            let from = updater.path();
            updater.rename_store(&to)?;
            println!("Renamed {} store {} to {to}.", updater.store_type(), from.display());
            Ok(0)
        }
        StoreCommand::Delete { target } => {
            let updater = relocation(config, target).build()?;
            if updater.delete_store()? {
                println!("Deleted {}.", updater.path().display());
            } else {
                println!("Nothing to delete at {}.", updater.path().display());
            }
            Ok(0)
        }
    }
}

fn relocation(config: &UpdateConfig, target: StoreTarget) -> StoreRelocation<'_> {
    let mut relocation = StoreRelocation::new(config)
        .for_type(target.store_type)
        .for_name(target.name);
    if let Some(repository) = target.repository {
        relocation = relocation.for_repository(repository);
    }
    if let Some(namespace) = target.namespace {
        relocation = relocation.for_namespace(namespace);
    }
    relocation
}

fn handle_version_command(command: &VersionCommand) -> Result<i32> {
    match command {
        VersionCommand::Compare { left, right } => {
            let left: Version = left.parse()?;
            let right: Version = right.parse()?;
            let symbol = match left.cmp(&right) {
                Ordering::Less => "<",
                Ordering::Equal => "=",
                Ordering::Greater => ">",
            };
            println!("{left} {symbol} {right}");
            Ok(0)
        }
    }
}
