//! Command-line front end for the pet shelter store.
//!
//! # Responsibility
//! - Issue CRUD calls through `petstore_core` by resource URI.
//! - Attach a live loader and print each delivery (`watch`).

use clap::{Parser, Subcommand};
use petstore_core::model::schema::{COLUMN_BREED, COLUMN_GENDER, COLUMN_NAME, COLUMN_WEIGHT};
use petstore_core::{
    init_logging_with, Filter, LoaderManager, LoggingOptions, Pet, QuerySpec, Record, Snapshot,
    SortOrder, StorageEngine, StoreConfig,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "petstore")]
#[command(version)]
#[command(about = "Pet shelter store - URI-addressed pets with live query loaders")]
struct Cli {
    /// Path to the database file
    #[arg(long, env = "PETSTORE_DB", default_value = "shelter.db", global = true)]
    db: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off without it
    #[arg(long, env = "PETSTORE_LOG_DIR", global = true)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert the sample pet "Toto"
    InsertDummy,

    /// List every pet as JSON lines
    List {
        /// Sort by this column
        #[arg(long)]
        sort: Option<String>,

        /// Sort descending
        #[arg(long)]
        desc: bool,
    },

    /// Show one pet
    Show { id: i64 },

    /// Update fields of one pet
    Update {
        id: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        breed: Option<String>,

        /// 0 = unknown, 1 = male, 2 = female
        #[arg(long)]
        gender: Option<i64>,

        #[arg(long)]
        weight: Option<i64>,
    },

    /// Delete one pet
    Delete { id: i64 },

    /// Delete every pet
    DeleteAll,

    /// Attach a loader to the pets collection and print deliveries
    Watch {
        /// Stop after this many deliveries
        #[arg(long, default_value = "3")]
        count: usize,

        /// Insert this many sample pets in the background while watching
        #[arg(long, default_value = "0")]
        insert: usize,

        /// Give up after this many seconds
        #[arg(long, default_value = "10")]
        timeout_secs: u64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    if let Some(log_dir) = &cli.log_dir {
        init_logging_with(&LoggingOptions {
            level: cli
                .log_level
                .clone()
                .unwrap_or_else(|| petstore_core::default_log_level().to_string()),
            log_dir: log_dir.clone(),
            echo_stderr: true,
        })?;
    }

    let engine = Arc::new(StorageEngine::open(&StoreConfig::file(&cli.db))?);
    let pets = engine.collection_uri().to_string();

    match cli.command {
        Commands::InsertDummy => {
            let id = engine.insert(&pets, &toto())?;
            println!("{}", engine.item_uri(id));
        }
        Commands::List { sort, desc } => {
            let order = match sort {
                Some(column) if desc => SortOrder::new().desc(column),
                Some(column) => SortOrder::new().asc(column),
                None => SortOrder::default(),
            };
            for row in engine.query(&pets, &[], &Filter::default(), &order)? {
                println!("{}", serde_json::to_string(&row)?);
            }
        }
        Commands::Show { id } => {
            let uri = engine.item_uri(id).to_string();
            let rows = engine.query(&uri, &[], &Filter::default(), &SortOrder::default())?;
            match rows.first() {
                Some(row) => println!("{}", serde_json::to_string(&Pet::try_from(row)?)?),
                None => return Err(format!("no pet at {uri}").into()),
            }
        }
        Commands::Update {
            id,
            name,
            breed,
            gender,
            weight,
        } => {
            let mut values = Record::new();
            if let Some(name) = name {
                values.set(COLUMN_NAME, name);
            }
            if let Some(breed) = breed {
                values.set(COLUMN_BREED, breed);
            }
            if let Some(gender) = gender {
                values.set(COLUMN_GENDER, gender);
            }
            if let Some(weight) = weight {
                values.set(COLUMN_WEIGHT, weight);
            }
            let uri = engine.item_uri(id).to_string();
            let changed = engine.update(&uri, &values, &Filter::default())?;
            println!("updated={changed}");
        }
        Commands::Delete { id } => {
            let removed = engine.delete(&engine.item_uri(id).to_string(), &Filter::default())?;
            println!("deleted={removed}");
        }
        Commands::DeleteAll => {
            let removed = engine.delete(&pets, &Filter::default())?;
            println!("deleted={removed}");
        }
        Commands::Watch {
            count,
            insert,
            timeout_secs,
        } => watch(engine, &pets, count, insert, Duration::from_secs(timeout_secs))?,
    }
    Ok(())
}

fn watch(
    engine: Arc<StorageEngine>,
    pets: &str,
    count: usize,
    insert: usize,
    timeout: Duration,
) -> CliResult<()> {
    let mut manager = LoaderManager::new(Arc::clone(&engine))?;
    let delivered = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&delivered);

    manager.init_loader(0, QuerySpec::new(pets), move |snapshot: Snapshot| {
        let round = seen.fetch_add(1, Ordering::SeqCst) + 1;
        println!("delivery={round} rows={}", snapshot.len());
        for row in snapshot.iter() {
            if let Ok(line) = serde_json::to_string(row) {
                println!("  {line}");
            }
        }
    })?;

    let writer = (insert > 0).then(|| {
        let engine = Arc::clone(&engine);
        let pets = pets.to_string();
        thread::spawn(move || {
            for _ in 0..insert {
                thread::sleep(Duration::from_millis(100));
                if let Err(err) = engine.insert(&pets, &toto()) {
                    eprintln!("insert failed: {err}");
                }
            }
        })
    });

    let finished = manager.run_until(timeout, || delivered.load(Ordering::SeqCst) >= count);
    if let Some(writer) = writer {
        let _ = writer.join();
    }
    manager.destroy_loader(0);

    if !finished {
        return Err(format!(
            "saw {} of {count} deliveries before timeout",
            delivered.load(Ordering::SeqCst)
        )
        .into());
    }
    Ok(())
}

fn toto() -> Record {
    Record::new()
        .with(COLUMN_NAME, "Toto")
        .with(COLUMN_BREED, "Terrier")
        .with(COLUMN_GENDER, 1)
        .with(COLUMN_WEIGHT, 7)
}
