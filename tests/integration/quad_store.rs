//! End-to-end behavior of the store facade: scans, term resolution, graph
//! constraints, counts, and clear.

use tetrad::{QuadPattern, QuadStore, StoreOptions, Term, TermId};

fn open(dir: &std::path::Path) -> QuadStore {
    QuadStore::open(StoreOptions::new(dir).map_size(32 << 20)).unwrap()
}

fn iri(name: &str) -> Term {
    Term::iri(format!("http://example.org/{name}"))
}

fn drain(store: &QuadStore, pattern: &QuadPattern, graphs: &[TermId]) -> Vec<[u64; 4]> {
    let mut out: Vec<[u64; 4]> = store
        .scan(pattern, graphs, None)
        .map(|quad| quad.unwrap().ids())
        .collect();
    out.sort_unstable();
    out
}

#[test]
fn two_objects_under_one_subject_predicate() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());

    let mut writer = store.begin_write().unwrap();
    let g = Term::iri("http://example.org/g1");
    writer.add(&iri("s1"), &iri("p1"), &iri("o1"), Some(&g), true).unwrap();
    writer.add(&iri("s1"), &iri("p1"), &iri("o2"), Some(&g), true).unwrap();
    writer.add(&iri("s2"), &iri("p1"), &iri("o1"), Some(&g), true).unwrap();
    writer.commit().unwrap();

    let s1 = store.id_of(&iri("s1")).unwrap();
    let p1 = store.id_of(&iri("p1")).unwrap();
    let o1 = store.id_of(&iri("o1")).unwrap();
    let o2 = store.id_of(&iri("o2")).unwrap();
    let g1 = store.id_of(&g).unwrap();

    let pattern = QuadPattern::new(Some(s1), Some(p1), None, None);
    let found = drain(&store, &pattern, &[]);
    let mut expected = vec![[s1.0, p1.0, o1.0, g1.0], [s1.0, p1.0, o2.0, g1.0]];
    expected.sort_unstable();
    assert_eq!(found, expected, "exactly the two objects, no duplicates");
}

#[test]
fn terms_round_trip_through_the_facade() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());

    let terms = [
        iri("thing"),
        Term::bnode("b1"),
        Term::literal("plain"),
        Term::literal_lang("bonjour", "fr"),
        Term::literal_typed("3.14", "http://www.w3.org/2001/XMLSchema#decimal"),
    ];
    let mut writer = store.begin_write().unwrap();
    let ids: Vec<TermId> = terms
        .iter()
        .map(|t| writer.resolve_or_create(t).unwrap())
        .collect();
    writer.commit().unwrap();

    for (term, id) in terms.iter().zip(&ids) {
        assert_eq!(store.id_of(term).unwrap(), *id);
        assert_eq!(store.term_of(*id).unwrap().as_ref(), Some(term));
    }
    assert!(store.id_of(&iri("never-stored")).unwrap().is_unknown());
}

#[test]
fn graph_constraints_concatenate_per_graph_scans() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());

    let g1 = Term::iri("http://example.org/g1");
    let g2 = Term::iri("http://example.org/g2");
    let mut writer = store.begin_write().unwrap();
    writer.add(&iri("s"), &iri("p"), &iri("a"), Some(&g1), true).unwrap();
    writer.add(&iri("s"), &iri("p"), &iri("b"), Some(&g2), true).unwrap();
    writer.add(&iri("s"), &iri("p"), &iri("c"), None, true).unwrap();
    writer.commit().unwrap();

    let g1_id = store.id_of(&g1).unwrap();
    let g2_id = store.id_of(&g2).unwrap();
    let s = store.id_of(&iri("s")).unwrap();
    let pattern = QuadPattern::new(Some(s), None, None, None);

    assert_eq!(drain(&store, &pattern, &[]).len(), 3);
    assert_eq!(drain(&store, &pattern, &[g1_id]).len(), 1);
    assert_eq!(drain(&store, &pattern, &[g1_id, g2_id]).len(), 2);
    // The default graph is addressable as a constraint too.
    assert_eq!(drain(&store, &pattern, &[tetrad::DEFAULT_GRAPH_ID]).len(), 1);
    // An unknown graph constraint contributes nothing.
    assert_eq!(drain(&store, &pattern, &[tetrad::UNKNOWN_ID, g2_id]).len(), 1);
}

#[test]
fn explicit_and_inferred_quads_are_filterable() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());

    let mut writer = store.begin_write().unwrap();
    writer.add(&iri("s"), &iri("p"), &iri("asserted"), None, true).unwrap();
    writer.add(&iri("s"), &iri("p"), &iri("inferred"), None, false).unwrap();
    writer.commit().unwrap();

    let pattern = QuadPattern::any();
    let explicit: Vec<_> = store
        .scan(&pattern, &[], Some(true))
        .map(|q| q.unwrap())
        .collect();
    let inferred: Vec<_> = store
        .scan(&pattern, &[], Some(false))
        .map(|q| q.unwrap())
        .collect();
    assert_eq!(explicit.len(), 1);
    assert_eq!(inferred.len(), 1);
    assert_ne!(explicit[0].object, inferred[0].object);
}

#[test]
fn counts_track_adds_and_removes() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());

    let g = Term::iri("http://example.org/g");
    let mut writer = store.begin_write().unwrap();
    for n in 0..10 {
        writer.add(&iri(&format!("s{n}")), &iri("p"), &iri("o"), Some(&g), true).unwrap();
    }
    writer.add(&iri("s0"), &iri("p"), &iri("o"), None, true).unwrap();
    writer.commit().unwrap();

    let g_id = store.id_of(&g).unwrap();
    assert_eq!(store.len().unwrap(), 11);
    assert_eq!(store.graph_count(g_id).unwrap(), 10);
    assert_eq!(store.graph_count(tetrad::DEFAULT_GRAPH_ID).unwrap(), 1);

    let s0 = store.id_of(&iri("s0")).unwrap();
    let mut writer = store.begin_write().unwrap();
    let removed = writer.remove([Some(s0.0), None, None, None], true).unwrap();
    assert_eq!(removed, 2);
    writer.commit().unwrap();

    assert_eq!(store.len().unwrap(), 9);
    assert_eq!(store.graph_count(g_id).unwrap(), 9);
    assert_eq!(store.graph_count(tetrad::DEFAULT_GRAPH_ID).unwrap(), 0);
}

#[test]
fn clear_invalidates_cached_ids_and_empties_scans() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());

    let mut writer = store.begin_write().unwrap();
    writer.add(&iri("s"), &iri("p"), &iri("o"), None, true).unwrap();
    writer.commit().unwrap();

    let s = store.id_of(&iri("s")).unwrap();
    let revision = store.revision();
    store.clear().unwrap();

    assert!(store.scan(&QuadPattern::any(), &[], None).next().is_none());
    assert_eq!(store.len().unwrap(), 0);
    assert!(store.revision() > revision, "clear bumps the revision");
    assert!(
        store.id_of(&iri("s")).unwrap().is_unknown(),
        "pre-clear mapping must not survive"
    );
    assert_eq!(store.term_of(s).unwrap(), None);
}

#[test]
fn cardinality_estimates_are_sane() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());

    let mut writer = store.begin_write().unwrap();
    for n in 0..20 {
        writer.add(&iri("s"), &iri("p"), &iri(&format!("o{n}")), None, true).unwrap();
    }
    writer.commit().unwrap();

    let s = store.id_of(&iri("s")).unwrap();
    let p = store.id_of(&iri("p")).unwrap();
    let o0 = store.id_of(&iri("o0")).unwrap();

    let bound = QuadPattern::new(Some(s), Some(p), Some(o0), Some(tetrad::DEFAULT_GRAPH_ID));
    assert_eq!(store.cardinality(&bound).unwrap(), 1.0);
    let absent = QuadPattern::new(Some(o0), Some(p), Some(s), Some(tetrad::DEFAULT_GRAPH_ID));
    assert_eq!(store.cardinality(&absent).unwrap(), 0.0);
    assert_eq!(store.cardinality(&QuadPattern::any()).unwrap(), 20.0);
    let unknown = QuadPattern::new(Some(tetrad::UNKNOWN_ID), None, None, None);
    assert_eq!(store.cardinality(&unknown).unwrap(), 0.0);
}

#[test]
fn scans_can_be_closed_midway() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());

    let mut writer = store.begin_write().unwrap();
    for n in 0..50 {
        writer.add(&iri(&format!("s{n}")), &iri("p"), &iri("o"), None, true).unwrap();
    }
    writer.commit().unwrap();

    let mut scan = store.scan(&QuadPattern::any(), &[], None);
    assert!(scan.next().is_some());
    scan.close();
    assert!(scan.next().is_none());
    assert!(scan.next().is_none());
}

#[test]
fn pipelined_writes_land_after_commit() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());

    let pipeline = store.begin_pipelined().unwrap();
    for n in 0..200u32 {
        pipeline
            .add(iri(&format!("s{n}")), iri("p"), iri("o"), None, true)
            .unwrap();
    }
    assert_eq!(pipeline.commit().unwrap(), 200);
    assert_eq!(store.len().unwrap(), 200);
}
