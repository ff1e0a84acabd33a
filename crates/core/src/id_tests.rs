// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn new_ids_are_26_chars_and_sortable() {
    let a = MachineId::new();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let b = MachineId::new();
    assert_eq!(a.as_str().len(), 26);
    assert_eq!(b.as_str().len(), 26);
    assert!(a < b, "ULIDs generated later should sort after earlier ones");
}

#[test]
fn round_trips_through_display_and_parse() {
    let id = MachineId::new();
    let parsed = MachineId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn rejects_garbage() {
    assert!(MachineId::parse("not-a-ulid").is_err());
    assert!(MachineId::parse("").is_err());
}

#[test]
fn round_trips_through_serde() {
    let id = MachineId::new();
    let json = serde_json::to_string(&id).unwrap();
    let back: MachineId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, back);
}
