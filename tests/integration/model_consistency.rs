//! Randomized mutations checked against an in-memory reference model, plus
//! snapshot isolation across concurrent writes.

use std::collections::HashSet;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tetrad::{QuadPattern, QuadStore, StoreOptions, Term};

fn open(dir: &std::path::Path, indexes: &[&str]) -> QuadStore {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    QuadStore::open(
        StoreOptions::new(dir)
            .map_size(64 << 20)
            .indexes(indexes.iter().copied()),
    )
    .unwrap()
}

fn subject(n: u32) -> Term {
    Term::iri(format!("http://example.org/s{n}"))
}

fn predicate(n: u32) -> Term {
    Term::iri(format!("http://example.org/p{n}"))
}

fn object(n: u32) -> Term {
    Term::literal(format!("value {n}"))
}

fn graph(n: u32) -> Option<Term> {
    (n > 0).then(|| Term::iri(format!("http://example.org/g{n}")))
}

/// Resolves every stored quad back to term labels for model comparison.
fn materialize(store: &QuadStore) -> HashSet<(Term, Term, Term, Option<Term>)> {
    store
        .scan(&QuadPattern::any(), &[], None)
        .map(|quad| {
            let quad = quad.unwrap();
            let s = store.term_of(quad.subject).unwrap().unwrap();
            let p = store.term_of(quad.predicate).unwrap().unwrap();
            let o = store.term_of(quad.object).unwrap().unwrap();
            let g = if quad.graph.is_default_graph() {
                None
            } else {
                Some(store.term_of(quad.graph).unwrap().unwrap())
            };
            (s, p, o, g)
        })
        .collect()
}

#[test]
fn random_mutations_match_a_reference_model() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path(), &["spoc", "posc", "cspo"]);

    let mut rng = ChaCha8Rng::seed_from_u64(0x7e7ad);
    let mut model: HashSet<(Term, Term, Term, Option<Term>)> = HashSet::new();

    for round in 0..40 {
        let mut writer = store.begin_write().unwrap();
        for _ in 0..25 {
            if rng.gen_bool(0.7) || model.is_empty() {
                let s = subject(rng.gen_range(0..20));
                let p = predicate(rng.gen_range(0..5));
                let o = object(rng.gen_range(0..30));
                let g = graph(rng.gen_range(0..3));
                writer.add(&s, &p, &o, g.as_ref(), true).unwrap();
                model.insert((s, p, o, g));
            } else {
                // Remove everything under one random subject.
                let s = subject(rng.gen_range(0..20));
                let id = writer.resolve_or_create(&s).unwrap();
                writer.remove([Some(id.0), None, None, None], true).unwrap();
                model.retain(|(ms, _, _, _)| *ms != s);
            }
        }
        writer.commit().unwrap();

        assert_eq!(store.len().unwrap(), model.len() as u64, "round {round}");
    }

    assert_eq!(materialize(&store), model);

    // Per-graph counts agree with the model.
    for n in 0..3 {
        let (graph_id, expected) = match graph(n) {
            Some(g) => (
                store.id_of(&g).unwrap(),
                model.iter().filter(|(_, _, _, mg)| mg.as_ref() == Some(&g)).count(),
            ),
            None => (
                tetrad::DEFAULT_GRAPH_ID,
                model.iter().filter(|(_, _, _, mg)| mg.is_none()).count(),
            ),
        };
        assert_eq!(store.graph_count(graph_id).unwrap(), expected as u64);
    }

    // Spot-check pattern scans against the model.
    for n in 0..5 {
        let p = predicate(n);
        let p_id = store.id_of(&p).unwrap();
        if p_id.is_unknown() {
            continue;
        }
        let pattern = QuadPattern::new(None, Some(p_id), None, None);
        let scanned = store.scan(&pattern, &[], None).count();
        let expected = model.iter().filter(|(_, mp, _, _)| *mp == p).count();
        assert_eq!(scanned, expected, "predicate p{n}");
    }
}

#[test]
fn readers_keep_their_snapshot_across_a_commit() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path(), &["spoc", "posc"]);

    let mut writer = store.begin_write().unwrap();
    for n in 0..100 {
        writer.add(&subject(n), &predicate(0), &object(n), None, true).unwrap();
    }
    writer.commit().unwrap();

    let mut early = store.scan(&QuadPattern::any(), &[], None);
    let first = early.next().unwrap().unwrap();
    assert!(!first.subject.is_unknown());

    let mut writer = store.begin_write().unwrap();
    for n in 100..150 {
        writer.add(&subject(n), &predicate(0), &object(n), None, true).unwrap();
    }
    writer.commit().unwrap();

    // 1 already pulled; the pre-commit snapshot holds for the rest.
    assert_eq!(early.count(), 99);

    let late = store.scan(&QuadPattern::any(), &[], None);
    assert_eq!(late.count(), 150);
}

#[test]
fn bulk_load_grows_the_map_transparently() {
    let dir = tempfile::tempdir().unwrap();
    // Deliberately tiny initial map; the load must outgrow it several times.
    let store = QuadStore::open(
        StoreOptions::new(dir.path()).map_size(1 << 20),
    )
    .unwrap();

    let mut writer = store.begin_write().unwrap();
    for n in 0..5000u32 {
        let padded = Term::literal(format!("{n:0>6} {}", "payload ".repeat(8)));
        writer.add(&subject(n % 500), &predicate(n % 7), &padded, None, true).unwrap();
    }
    writer.commit().unwrap();

    assert_eq!(store.len().unwrap(), 5000);
    let scanned = store.scan(&QuadPattern::any(), &[], None).count();
    assert_eq!(scanned, 5000);
}
