//! GraphDB CLI
//!
//! - `demo`: walk through the store on a small counting graph
//! - `bench`: synthetic insert / lookup / chain throughput
//! - `store`, `delete`, `find`, `query`, `items`, `relations`: operate on a
//!   file-backed store (`--db PATH` or `--config graphdb.json`)
//!
//! Arguments naming items are parsed as literals: `true`/`false` become
//! booleans, integers become integers, anything else is text.

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use graphdb_core::{GraphStore, Value};
use graphdb_storage::StorageConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod bench;
mod demo;

const DEFAULT_DB: &str = "graph.log";

#[derive(Parser)]
#[command(name = "graphdb")]
#[command(author, version, about = "GraphDB: an embeddable triple store with chain queries")]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Log file to open, or `:memory:` for a throwaway store (default: graph.log)
    #[arg(long)]
    db: Option<String>,
    /// JSON storage config
    #[arg(long, conflicts_with = "db")]
    config: Option<PathBuf>,
}

impl StoreArgs {
    fn storage_config(&self) -> Result<StorageConfig> {
        match (&self.config, &self.db) {
            (Some(path), _) => StorageConfig::from_json_file(path),
            (None, Some(spec)) => Ok(StorageConfig::from_path_spec(spec)),
            (None, None) => Ok(StorageConfig::file(DEFAULT_DB)),
        }
    }

    fn open(&self) -> Result<GraphStore> {
        let config = self.storage_config()?;
        tracing::debug!(?config, "opening store");
        let db = graphdb_storage::open(&config)?;
        tracing::debug!(
            items = db.item_count(),
            relations = db.relation_count(),
            "store opened"
        );
        Ok(db)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the feature walkthrough on an in-memory store.
    Demo,

    /// Time relation inserts, lookups and chain materialization.
    Bench {
        /// Number of items in the synthetic graph
        #[arg(long, default_value_t = 10_000)]
        items: usize,
        /// Hops per chain query
        #[arg(long, default_value_t = 5)]
        hops: usize,
    },

    /// Store an item, or a relation when PREDICATE and OBJECT are given.
    Store {
        #[command(flatten)]
        store: StoreArgs,
        subject: String,
        #[arg(requires = "object")]
        predicate: Option<String>,
        object: Option<String>,
    },

    /// Delete an item (with its relations), or one relation when PREDICATE
    /// and OBJECT are given.
    Delete {
        #[command(flatten)]
        store: StoreArgs,
        subject: String,
        #[arg(requires = "object")]
        predicate: Option<String>,
        object: Option<String>,
    },

    /// List values related to SUBJECT through PREDICATE.
    Find {
        #[command(flatten)]
        store: StoreArgs,
        subject: String,
        predicate: String,
    },

    /// Follow a dotted predicate path from ROOT, e.g. `precedes.precedes.even`.
    Query {
        #[command(flatten)]
        store: StoreArgs,
        root: String,
        path: String,
        /// Keep only results whose FIELD relates to VALUE (`FIELD=VALUE`)
        #[arg(long = "where", value_name = "FIELD=VALUE")]
        conditions: Vec<String>,
    },

    /// List every item with its ID.
    Items {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// List every relation.
    Relations {
        #[command(flatten)]
        store: StoreArgs,
        /// Emit a JSON array of `[subject, predicate, object]`
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Demo => demo::run()?,
        Commands::Bench { items, hops } => bench::run(items, hops)?,
        Commands::Store {
            store,
            subject,
            predicate,
            object,
        } => cmd_store(&store, &subject, predicate.as_deref(), object.as_deref())?,
        Commands::Delete {
            store,
            subject,
            predicate,
            object,
        } => cmd_delete(&store, &subject, predicate.as_deref(), object.as_deref())?,
        Commands::Find {
            store,
            subject,
            predicate,
        } => cmd_find(&store, &subject, &predicate)?,
        Commands::Query {
            store,
            root,
            path,
            conditions,
        } => cmd_query(&store, &root, &path, &conditions)?,
        Commands::Items { store } => cmd_items(&store)?,
        Commands::Relations { store, json } => cmd_relations(&store, json)?,
    }
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_store(
    args: &StoreArgs,
    subject: &str,
    predicate: Option<&str>,
    object: Option<&str>,
) -> Result<()> {
    let mut db = args.open()?;
    let subject = Value::parse_literal(subject);
    match (predicate, object) {
        (Some(predicate), Some(object)) => {
            let object = Value::parse_literal(object);
            db.store_relation(subject.clone(), predicate, object.clone())?;
            eprintln!("{} {subject} {} {object}", "stored".green().bold(), predicate.cyan());
        }
        _ => {
            let id = db.store_item(subject.clone())?;
            eprintln!("{} {subject} as {id}", "stored".green().bold());
        }
    }
    db.close()?;
    Ok(())
}

fn cmd_delete(
    args: &StoreArgs,
    subject: &str,
    predicate: Option<&str>,
    object: Option<&str>,
) -> Result<()> {
    let mut db = args.open()?;
    let subject = Value::parse_literal(subject);
    match (predicate, object) {
        (Some(predicate), Some(object)) => {
            let object = Value::parse_literal(object);
            db.delete_relation(&subject, predicate, &object)?;
            eprintln!("{} {subject} {} {object}", "deleted".yellow().bold(), predicate.cyan());
        }
        _ => {
            if !db.contains(&subject) {
                eprintln!("{} {subject} is not stored", "note:".yellow());
            }
            db.delete_item(&subject)?;
            eprintln!("{} {subject}", "deleted".yellow().bold());
        }
    }
    db.close()?;
    Ok(())
}

fn cmd_find(args: &StoreArgs, subject: &str, predicate: &str) -> Result<()> {
    let db = args.open()?;
    for value in db.find(&Value::parse_literal(subject), predicate) {
        println!("{value}");
    }
    Ok(())
}

fn cmd_query(args: &StoreArgs, root: &str, path: &str, conditions: &[String]) -> Result<()> {
    let db = args.open()?;
    let mut chain = db.chain(&Value::parse_literal(root)).expand_path(path)?;
    for condition in conditions {
        let (field, expected) = condition
            .split_once('=')
            .ok_or_else(|| anyhow!("expected FIELD=VALUE, got `{condition}`"))?;
        let expected = Value::parse_literal(expected);
        chain = chain.filter_related(field.trim(), move |value| *value == expected);
    }

    let mut count = 0usize;
    for value in chain.collect(&db)? {
        println!("{value}");
        count += 1;
    }
    eprintln!("{} {count} result(s)", "ok".green().bold());
    Ok(())
}

fn cmd_items(args: &StoreArgs) -> Result<()> {
    let db = args.open()?;
    for (id, value) in db.identities().iter() {
        println!("{:>6}  {value}", id.to_string().dimmed());
    }
    eprintln!("{} {} item(s)", "ok".green().bold(), db.item_count());
    Ok(())
}

fn cmd_relations(args: &StoreArgs, json: bool) -> Result<()> {
    let db = args.open()?;
    if json {
        let rows: Vec<[String; 3]> = db
            .relations()
            .map(|(s, p, o)| [s.to_string(), p.to_string(), o.to_string()])
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for (s, p, o) in db.relations() {
        println!("{s} {} {o}", format!("-{p}->").cyan());
    }
    eprintln!("{} {} relation(s)", "ok".green().bold(), db.relation_count());
    Ok(())
}
