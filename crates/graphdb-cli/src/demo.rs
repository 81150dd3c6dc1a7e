//! Feature walkthrough on an in-memory counting graph.
//!
//! Builds `0 precedes 1 precedes ... precedes 9`, tags every number with its
//! `even` and `odd` flags, then exercises chains, filters, deletes, renames
//! and cascading item removal, printing each step.

use anyhow::Result;
use colored::Colorize;
use graphdb_core::{GraphStore, QueryChain, Value};

fn v(x: impl Into<Value>) -> Value {
    x.into()
}

fn section(title: &str) {
    println!();
    println!("{}", title.bold().underline());
}

fn show(label: &str, values: impl IntoIterator<Item = impl std::fmt::Display>) {
    let rendered: Vec<String> = values.into_iter().map(|x| x.to_string()).collect();
    println!("  {:<44} {}", label.dimmed(), format!("[{}]", rendered.join(", ")).green());
}

fn show_chain(db: &GraphStore, label: &str, chain: &QueryChain<Value>) -> Result<()> {
    show(label, chain.collect(db)?);
    Ok(())
}

pub fn run() -> Result<()> {
    let mut db = GraphStore::new();

    section("Building the counting graph");
    for i in 1..10i64 {
        let (src, dst) = (i - 1, i);
        db.store_relation(v(src), "precedes", v(dst))?;
        db.store_relation(v(src), "even", v(src % 2 == 0))?;
        db.chain(&v(src)).assign(&mut db, "odd", v(src % 2 == 1))?;
    }
    println!(
        "  {} items, {} relations",
        db.item_count().to_string().bold(),
        db.relation_count().to_string().bold()
    );

    section("Membership and attributes");
    println!("  {:<44} {}", "6 stored?".dimmed(), db.contains(&v(6)));
    println!("  {:<44} {}", "99 stored?".dimmed(), db.contains(&v(99)));
    show_chain(&db, "6.precedes", &db.chain(&v(6)).expand("precedes"))?;
    show_chain(&db, "6.precedes.even", &db.chain(&v(6)).expand("precedes").expand("even"))?;
    show_chain(
        &db,
        "6.precedes.precedes.even",
        &db.chain(&v(6)).expand_path("precedes.precedes.even")?,
    )?;
    show("relations of 7", db.relations_of(&v(7), false));

    section("Assigning through a chain");
    db.chain(&v(6)).expand("precedes").assign(&mut db, "prime", v(true))?;
    show_chain(
        &db,
        "5.precedes.precedes.prime",
        &db.chain(&v(5)).expand_path("precedes.precedes.prime")?,
    )?;

    section("Filtering");
    for i in 1..5i64 {
        db.store_relation(v(5), "greater_than", v(i))?;
    }
    show("5.greater_than", db.find(&v(5), "greater_than"));
    show_chain(
        &db,
        "5.greater_than where value is even",
        &db.chain(&v(5))
            .expand("greater_than")
            .filter(|x| x.as_int().is_some_and(|n| n % 2 == 0)),
    )?;
    show_chain(
        &db,
        "5.greater_than where even = true",
        &db.chain(&v(5))
            .expand("greater_than")
            .filter_related("even", Value::is_truthy),
    )?;
    show_chain(
        &db,
        "5.greater_than.precedes",
        &db.chain(&v(5)).expand("greater_than").expand("precedes"),
    )?;
    show_chain(
        &db,
        "5.greater_than.precedes x6",
        &db.chain(&v(5))
            .expand("greater_than")
            .expand_path("precedes.precedes.precedes.precedes.precedes.precedes")?,
    )?;

    section("Deleting relations");
    db.delete_relation(&v(5), "greater_than", &v(2))?;
    // Deleting a missing relation is a no-op.
    db.delete_relation(&v(5), "greater_than", &v(2))?;
    db.delete_relation(&v(5), "greater_than", &v(3))?;
    show("5.greater_than after deleting 2 and 3", db.find(&v(5), "greater_than"));
    db.delete_relation(&v(5), "greater_than", &v(1))?;
    db.delete_relation(&v(5), "greater_than", &v(4))?;
    show("relations of 5", db.relations_of(&v(5), false));
    show("relations of 5 (include empty)", db.relations_of(&v(5), true));

    section("Replacing an item");
    db.store_relation(v(5), "greater_than", v(1))?;
    db.replace_item(&v(5), v("waffles"))?;
    show("4.precedes", db.chain(&v(4)).expand("precedes").collect(&db)?);
    show("waffles.greater_than", db.find(&v("waffles"), "greater_than"));

    section("Deleting an item");
    db.delete_item(&v(6))?;
    println!("  {:<44} {}", "6 stored?".dimmed(), db.contains(&v(6)));
    show("waffles.precedes", db.find(&v("waffles"), "precedes"));

    section("Enumeration");
    show("items", db.items());
    println!(
        "  {} items, {} relations",
        db.item_count().to_string().bold(),
        db.relation_count().to_string().bold()
    );
    Ok(())
}
