//! Throughput harness.
//!
//! Not a microbenchmark framework. It builds a synthetic graph in memory and
//! times the three hot paths: relation inserts, single-hop lookups and
//! multi-hop chain materialization. Run in release mode:
//!
//! ```bash
//! cargo run -p graphdb-cli --release -- bench --items 200000 --hops 8
//! ```

use anyhow::{anyhow, Result};
use colored::Colorize;
use graphdb_core::{GraphStore, Value};
use std::time::{Duration, Instant};

/// Residue classes each item is tagged with (`mod` predicate).
const BUCKETS: i64 = 7;

fn report(label: &str, ops: usize, elapsed: Duration) {
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    println!(
        "  {:<28} {:>10} ops  {:>10.2?}  {:>12.0} ops/s",
        label,
        ops,
        elapsed,
        ops as f64 / secs
    );
}

pub fn run(items: usize, hops: usize) -> Result<()> {
    if items < 2 {
        return Err(anyhow!("bench needs at least 2 items"));
    }
    let n = i64::try_from(items)?;
    let mut db: GraphStore = GraphStore::new();

    println!(
        "{} items={items} hops={hops}",
        "bench".bold().underline()
    );

    // Inserts: a `next` ring plus one `mod` edge per item.
    let start = Instant::now();
    for i in 0..n {
        db.store_relation(Value::Int(i), "next", Value::Int((i + 1) % n))?;
        db.store_relation(Value::Int(i), "mod", Value::Int(n + i % BUCKETS))?;
    }
    report("store_relation", items * 2, start.elapsed());

    let start = Instant::now();
    let mut found = 0usize;
    for i in 0..n {
        found += db.find(&Value::Int(i), "next").count();
    }
    report("find", items, start.elapsed());
    if found != items {
        return Err(anyhow!("expected {items} lookups to hit, got {found}"));
    }

    let start = Instant::now();
    let mut reached = 0usize;
    for i in 0..n {
        let mut chain = db.chain(&Value::Int(i));
        for _ in 0..hops {
            chain = chain.expand("next");
        }
        reached += chain.collect(&db)?.count();
    }
    report("chain collect", items, start.elapsed());

    let start = Instant::now();
    let buckets: Vec<Value> = (0..BUCKETS).map(|b| Value::Int(n + b)).collect();
    let fan_in: usize = buckets
        .iter()
        .map(|bucket| db.relations_to(bucket, false).count())
        .sum();
    let members = db
        .chain_many(db.items())
        .expand("mod")
        .collect(&db)?
        .count();
    report("fan-in scan", buckets.len() + 1, start.elapsed());

    println!(
        "  {} {} relations, {} chain results, {} buckets hit, {} predicates into buckets",
        "ok".green().bold(),
        db.relation_count(),
        reached,
        members,
        fan_in
    );
    Ok(())
}
