//! Reopen behavior: data and ID stability across restarts, live reindexing
//! when the configured index set changes, and format version enforcement.

use std::collections::HashSet;
use std::fs;

use tetrad::{QuadPattern, QuadStore, StoreError, StoreOptions, Term, TermId};

fn options(dir: &std::path::Path, indexes: &[&str]) -> StoreOptions {
    StoreOptions::new(dir)
        .map_size(32 << 20)
        .indexes(indexes.iter().copied())
}

fn iri(name: &str) -> Term {
    Term::iri(format!("http://example.org/{name}"))
}

fn seed(store: &QuadStore) -> Vec<TermId> {
    let mut writer = store.begin_write().unwrap();
    for s in 0..10 {
        for o in 0..5 {
            writer
                .add(&iri(&format!("s{s}")), &iri("p"), &iri(&format!("o{o}")), None, true)
                .unwrap();
        }
    }
    writer.commit().unwrap();
    (0..10).map(|s| store.id_of(&iri(&format!("s{s}"))).unwrap()).collect()
}

fn scan_all(store: &QuadStore) -> HashSet<[u64; 4]> {
    store
        .scan(&QuadPattern::any(), &[], None)
        .map(|q| q.unwrap().ids())
        .collect()
}

#[test]
fn data_and_ids_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let before;
    let subject_ids;
    {
        let store = QuadStore::open(options(dir.path(), &["spoc", "posc"])).unwrap();
        subject_ids = seed(&store);
        before = scan_all(&store);
    }

    let store = QuadStore::open(options(dir.path(), &["spoc", "posc"])).unwrap();
    assert_eq!(scan_all(&store), before);
    for (s, id) in subject_ids.iter().enumerate() {
        assert_eq!(store.id_of(&iri(&format!("s{s}"))).unwrap(), *id);
    }

    // New terms keep allocating past the recovered serial counter.
    let mut writer = store.begin_write().unwrap();
    let fresh = writer.resolve_or_create(&iri("fresh")).unwrap();
    writer.commit().unwrap();
    assert!(subject_ids.iter().all(|id| id.serial() < fresh.serial()));
}

#[test]
fn changed_index_set_reindexes_and_answers_identically() {
    let dir = tempfile::tempdir().unwrap();
    let before;
    {
        let store = QuadStore::open(options(dir.path(), &["spoc", "posc"])).unwrap();
        seed(&store);
        before = scan_all(&store);
    }

    let store = QuadStore::open(options(dir.path(), &["cspo", "ospc"])).unwrap();
    assert_eq!(store.indexes(), vec!["cspo", "ospc"]);
    assert_eq!(scan_all(&store), before);

    // Pattern answers come from the new permutations.
    let o0 = store.id_of(&iri("o0")).unwrap();
    let by_object = QuadPattern::new(None, None, Some(o0), None);
    assert_eq!(store.scan(&by_object, &[], None).count(), 10);
    drop(store);

    // The rewritten metadata keeps the new set across another reopen.
    let store = QuadStore::open(options(dir.path(), &["cspo", "ospc"])).unwrap();
    assert_eq!(store.indexes(), vec!["cspo", "ospc"]);
    assert_eq!(scan_all(&store), before);
}

#[test]
fn incompatible_format_version_refuses_to_open() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = QuadStore::open(options(dir.path(), &["spoc"])).unwrap();
        seed(&store);
    }

    let meta = dir.path().join("tetrad.toml");
    fs::write(&meta, "format_version = 2\nindexes = [\"spoc\"]\n").unwrap();

    match QuadStore::open(options(dir.path(), &["spoc"])) {
        Err(StoreError::FormatVersion { found, supported }) => {
            assert_eq!(found, 2);
            assert_eq!(supported, tetrad::FORMAT_VERSION);
        }
        other => panic!("expected a format version refusal, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn invalid_index_configurations_are_rejected_at_open() {
    let dir = tempfile::tempdir().unwrap();
    assert!(QuadStore::open(options(dir.path(), &["spox"])).is_err());
    assert!(QuadStore::open(options(dir.path(), &["spoc", "spoc"])).is_err());
    assert!(QuadStore::open(options(dir.path(), &[])).is_err());
}
