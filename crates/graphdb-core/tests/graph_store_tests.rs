//! GraphStore E2E Tests

use graphdb_core::*;

fn v(x: impl Into<Value>) -> Value {
    x.into()
}

/// The counting walkthrough: 0..9 chained by `precedes`,
/// every item tagged `even` and `odd`.
fn counting_db() -> GraphStore {
    let mut db = GraphStore::new();
    for i in 1..10i64 {
        let (src, dst) = (i - 1, i);
        db.store_relation(v(src), "precedes", v(dst)).unwrap();
        db.store_relation(v(src), "even", v(src % 2 == 0)).unwrap();
        db.chain(&v(src)).assign(&mut db, "odd", v(src % 2 == 1)).unwrap();
    }
    db
}

fn collect(db: &GraphStore, chain: QueryChain<Value>) -> Vec<Value> {
    chain.collect_into(db).unwrap()
}

// ============================================================================
// Interning
// ============================================================================

#[test]
fn test_membership_tracks_interned_values() {
    let db = counting_db();
    assert!(db.contains(&v(6)));
    assert!(db.contains(&v(true)));
    assert!(!db.contains(&v(99)));
    assert_eq!(db.id_of(&v(99)), None);
}

#[test]
fn test_store_item_without_relations_is_member() {
    let mut db = GraphStore::new();
    let id = db.store_item(v("lonely")).unwrap();
    assert_eq!(db.store_item(v("lonely")).unwrap(), id);
    assert!(db.contains(&v("lonely")));
    assert_eq!(db.relations_of(&v("lonely"), true).count(), 0);
}

// ============================================================================
// Relations
// ============================================================================

#[test]
fn test_find_follows_insertion_order() {
    let mut db = GraphStore::new();
    for i in 1..5i64 {
        db.store_relation(v(5), "greater_than", v(i)).unwrap();
    }
    db.store_relation(v(5), "greater_than", v(2)).unwrap();

    let found: Vec<&Value> = db.find(&v(5), "greater_than").collect();
    assert_eq!(found, vec![&v(1), &v(2), &v(3), &v(4)]);
    assert_eq!(db.find(&v(5), "unknown").count(), 0);
    assert_eq!(db.find(&v(404), "greater_than").count(), 0);
}

#[test]
fn test_relations_of_lists_predicates_once() {
    let db = counting_db();
    let rels: Vec<&str> = db.relations_of(&v(7), false).collect();
    assert_eq!(rels, vec!["precedes", "even", "odd"]);

    let incoming: Vec<&str> = db.relations_to(&v(7), false).collect();
    assert_eq!(incoming, vec!["precedes"]);
}

#[test]
fn test_delete_relation_is_idempotent_and_include_empty() {
    let mut db = counting_db();
    for i in 1..5i64 {
        db.store_relation(v(5), "greater_than", v(i)).unwrap();
    }

    db.delete_relation(&v(5), "greater_than", &v(2)).unwrap();
    db.delete_relation(&v(5), "greater_than", &v(2)).unwrap();
    db.delete_relation(&v(5), "greater_than", &v(3)).unwrap();

    let remaining: Vec<&Value> = db.find(&v(5), "greater_than").collect();
    assert_eq!(remaining, vec![&v(1), &v(4)]);
    assert!(db.relations_of(&v(5), false).any(|p| p == "greater_than"));

    db.delete_relation(&v(5), "greater_than", &v(1)).unwrap();
    db.delete_relation(&v(5), "greater_than", &v(4)).unwrap();

    assert!(!db.relations_of(&v(5), false).any(|p| p == "greater_than"));
    assert!(db.relations_of(&v(5), true).any(|p| p == "greater_than"));
    assert!(db.relations_to(&v(2), true).any(|p| p == "greater_than"));
    assert!(!db.relations_to(&v(2), false).any(|p| p == "greater_than"));
    db.index().verify().unwrap();
}

#[test]
fn test_delete_relation_with_unknown_values_is_noop() {
    let mut db = counting_db();
    let before = db.relation_count();
    db.delete_relation(&v("nope"), "precedes", &v(1)).unwrap();
    db.delete_relation(&v(0), "never_seen", &v(1)).unwrap();
    assert_eq!(db.relation_count(), before);
}

// ============================================================================
// Chains
// ============================================================================

#[test]
fn test_two_hop_chain() {
    let mut db = GraphStore::new();
    db.store_relation(v(1), "precedes", v(2)).unwrap();
    db.store_relation(v(2), "precedes", v(3)).unwrap();

    let chain = db.chain(&v(1)).expand("precedes").expand("precedes");
    assert_eq!(collect(&db, chain), vec![v(3)]);
}

#[test]
fn test_chain_attribute_lookups() {
    let db = counting_db();
    assert_eq!(collect(&db, db.chain(&v(6)).expand("precedes")), vec![v(7)]);
    assert_eq!(
        collect(&db, db.chain(&v(6)).expand("precedes").expand("even")),
        vec![v(false)]
    );
    assert_eq!(
        collect(&db, db.chain(&v(6)).expand_path("precedes.precedes.even").unwrap()),
        vec![v(true)]
    );
}

#[test]
fn test_assign_through_a_chain() {
    let mut db = counting_db();
    let seven = db.chain(&v(6)).expand("precedes");
    assert_eq!(seven.assign(&mut db, "prime", v(true)).unwrap(), 1);

    let prime = db.chain(&v(5)).expand("precedes").expand("precedes").expand("prime");
    assert_eq!(collect(&db, prime), vec![v(true)]);
}

#[test]
fn test_filter_scenarios() {
    let mut db = counting_db();
    for i in 1..5i64 {
        db.store_relation(v(5), "greater_than", v(i)).unwrap();
    }

    let evens = db
        .chain(&v(5))
        .expand("greater_than")
        .filter(|x| x.as_int().is_some_and(|n| n % 2 == 0));
    assert_eq!(collect(&db, evens), vec![v(2), v(4)]);

    let related_even = db
        .chain(&v(5))
        .expand("greater_than")
        .filter_related("even", |x| *x == Value::Bool(true));
    assert_eq!(collect(&db, related_even), vec![v(2), v(4)]);

    let truthy = db
        .chain(&v(5))
        .expand("greater_than")
        .filter_related("even", Value::is_truthy);
    assert_eq!(collect(&db, truthy), vec![v(2), v(4)]);

    let next = db.chain(&v(5)).expand("greater_than").expand("precedes");
    assert_eq!(collect(&db, next), vec![v(2), v(3), v(4), v(5)]);

    let far = db
        .chain(&v(5))
        .expand("greater_than")
        .expand_path("precedes.precedes.precedes.precedes.precedes.precedes")
        .unwrap();
    assert_eq!(collect(&db, far), vec![v(7), v(8), v(9)]);
}

#[test]
fn test_chain_over_unknown_root_is_empty() {
    let db = counting_db();
    let chain = db.chain(&v("ghost")).expand("precedes");
    assert!(collect(&db, chain).is_empty());

    let dead_end = db.chain(&v(9)).expand("precedes").expand("precedes");
    assert_eq!(dead_end.collect(&db).unwrap().count(), 0);
}

#[test]
fn test_chain_many_deduplicates_roots() {
    let db = counting_db();
    let chain = db.chain_many([&v(1), &v(3), &v(1)]).expand("precedes");
    assert_eq!(chain.sources().len(), 2);
    assert_eq!(collect(&db, chain), vec![v(2), v(4)]);
}

#[test]
fn test_chain_is_restartable() {
    let db = counting_db();
    let chain = db.chain(&v(2)).expand("precedes").filter(|x| x.as_int() == Some(3));
    let first: Vec<&Value> = chain.collect(&db).unwrap().collect();
    let second: Vec<&Value> = chain.collect(&db).unwrap().collect();
    assert_eq!(first, second);
    assert_eq!(chain.ids(&db).unwrap(), vec![db.id_of(&v(3)).unwrap()]);
}

// ============================================================================
// Item lifecycle
// ============================================================================

#[test]
fn test_replace_item_preserves_relations() {
    let mut db = counting_db();
    for i in 1..5i64 {
        db.store_relation(v(5), "greater_than", v(i)).unwrap();
    }
    let id = db.id_of(&v(5)).unwrap();

    db.replace_item(&v(5), v("waffles")).unwrap();

    assert!(!db.contains(&v(5)));
    assert_eq!(db.id_of(&v("waffles")), Some(id));
    let found: Vec<&Value> = db.find(&v("waffles"), "greater_than").collect();
    assert_eq!(found, vec![&v(1), &v(2), &v(3), &v(4)]);
    assert_eq!(
        collect(&db, db.chain(&v(4)).expand("precedes")),
        vec![v("waffles")]
    );
}

#[test]
fn test_delete_item_cascades() {
    let mut db = counting_db();
    let six = db.id_of(&v(6)).unwrap();

    db.delete_item(&v(6)).unwrap();
    db.delete_item(&v(6)).unwrap();

    assert!(!db.contains(&v(6)));
    assert!(db
        .index()
        .triples()
        .all(|(s, _, o)| s != six && o != six));
    assert_eq!(db.find(&v(5), "precedes").count(), 0);
    assert!(db.relations_of(&v(5), true).any(|p| p == "precedes"));
    assert!(!db.relations_of(&v(5), false).any(|p| p == "precedes"));
    db.index().verify().unwrap();
}

#[test]
fn test_enumeration_is_insertion_ordered() {
    let mut db = GraphStore::new();
    db.store_relation(v("b"), "likes", v("a")).unwrap();
    db.store_relation(v("a"), "likes", v("c")).unwrap();
    db.store_relation(v("b"), "knows", v("c")).unwrap();

    let items: Vec<&Value> = db.items().collect();
    assert_eq!(items, vec![&v("b"), &v("a"), &v("c")]);

    let rels: Vec<(&Value, &str, &Value)> = db.relations().collect();
    assert_eq!(
        rels,
        vec![
            (&v("b"), "likes", &v("a")),
            (&v("b"), "knows", &v("c")),
            (&v("a"), "likes", &v("c")),
        ]
    );
}
