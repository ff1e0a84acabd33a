use super::*;
use conman_core::{ImageSpec, MachineRecord};

fn open_temp() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(dir.path().join("db")).expect("open store");
    (dir, store)
}

fn test_support_record(name: &str) -> MachineRecord {
    MachineRecord::builder().name(name).image(ImageSpec::new("ubuntu")).build()
}

#[test]
fn round_trips_a_container_record() {
    let (_dir, store) = open_temp();
    let record = test_support_record("alpha");
    store.set_container(record.id, &record).unwrap();

    let loaded = store.get_container(record.id).unwrap().expect("present");
    assert_eq!(loaded.name, "alpha");
    assert_eq!(loaded.id, record.id);
}

#[test]
fn missing_container_is_none_not_error() {
    let (_dir, store) = open_temp();
    let id = conman_core::MachineId::new();
    assert!(store.get_container(id).unwrap().is_none());
}

#[test]
fn delete_removes_the_record() {
    let (_dir, store) = open_temp();
    let record = test_support_record("beta");
    store.set_container(record.id, &record).unwrap();
    store.delete_container(record.id).unwrap();
    assert!(store.get_container(record.id).unwrap().is_none());
}

#[test]
fn list_returns_every_persisted_record() {
    let (_dir, store) = open_temp();
    let a = test_support_record("a");
    let b = test_support_record("b");
    store.set_container(a.id, &a).unwrap();
    store.set_container(b.id, &b).unwrap();

    let mut names: Vec<_> = store.list_containers().unwrap().into_iter().map(|r| r.name).collect();
    names.sort();
    assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn last_and_default_container_id_round_trip() {
    let (_dir, store) = open_temp();
    assert!(store.get_last_container_id().unwrap().is_none());
    let id = conman_core::MachineId::new();
    store.set_last_container_id(id).unwrap();
    assert_eq!(store.get_last_container_id().unwrap(), Some(id));

    store.set_default_container_id(id).unwrap();
    assert_eq!(store.get_default_container_id().unwrap(), Some(id));
}

#[test]
fn dns_recent_queries_round_trip_and_default_to_empty() {
    let (_dir, store) = open_temp();
    assert!(store.get_dns_recent_queries().unwrap().is_empty());

    let queries = vec![DnsQuery {
        name: "foo.local".to_string(),
        query_type: "A".to_string(),
        answer: Some("192.168.1.1".to_string()),
        epoch_ms: 42,
    }];
    store.set_dns_recent_queries(&queries).unwrap();
    assert_eq!(store.get_dns_recent_queries().unwrap(), queries);
}

#[test]
fn schema_version_is_stamped_on_first_open() {
    let (_dir, store) = open_temp();
    assert_eq!(store.get_version().unwrap(), Some(CURRENT_SCHEMA_VERSION));
}

#[test]
fn reopening_an_existing_store_preserves_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");
    let record = test_support_record("persisted");
    {
        let store = Store::open(&path).unwrap();
        store.set_container(record.id, &record).unwrap();
        store.flush().unwrap();
    }
    let store = Store::open(&path).unwrap();
    assert_eq!(store.get_container(record.id).unwrap().unwrap().name, "persisted");
}

#[test]
fn rename_container_rewrites_the_name_field() {
    let (_dir, store) = open_temp();
    let record = test_support_record("old-name");
    store.set_container(record.id, &record).unwrap();

    store.rename_container(record.id, "new-name").unwrap();
    let loaded = store.get_container(record.id).unwrap().unwrap();
    assert_eq!(loaded.name, "new-name");
}

#[test]
fn rename_missing_container_is_not_found() {
    let (_dir, store) = open_temp();
    let id = conman_core::MachineId::new();
    let err = store.rename_container(id, "whatever").unwrap_err();
    assert!(matches!(err, StoreError::NotFound));
}
