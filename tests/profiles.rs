//! Profile store CRUD, folder handling and import/export.

use culvert::profile::{ConnectionProfile, ProfileStore, DEFAULT_FOLDER};
use tempfile::TempDir;

fn profile(name: &str) -> ConnectionProfile {
    ConnectionProfile::new(name, "10.0.0.5", "admin", "bastion.test")
}

#[test]
fn default_folder_always_exists() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::open(dir.path()).unwrap();
    assert_eq!(store.folders(), vec![DEFAULT_FOLDER.to_string()]);
}

#[test]
fn crud_roundtrip_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = ProfileStore::open(dir.path()).unwrap();
        store.add_profile(profile("rack-7"), DEFAULT_FOLDER).unwrap();
        store.add_folder("lab").unwrap();
        store.add_profile(profile("lab-ilo"), "lab").unwrap();

        let mut updated = profile("rack-7");
        updated.ssh_port = 2222;
        store.update_profile(DEFAULT_FOLDER, 0, updated).unwrap();
    }

    let mut store = ProfileStore::open(dir.path()).unwrap();
    assert_eq!(store.folders(), vec![DEFAULT_FOLDER.to_string(), "lab".to_string()]);
    assert_eq!(store.profiles(DEFAULT_FOLDER)[0].ssh_port, 2222);
    assert_eq!(store.profiles("lab")[0].name, "lab-ilo");

    store.delete_profile("lab", 0).unwrap();
    assert!(store.profiles("lab").is_empty());
    assert!(store.delete_profile("lab", 0).is_err());
}

#[test]
fn duplicate_names_in_a_folder_are_rejected() {
    let dir = TempDir::new().unwrap();
    let mut store = ProfileStore::open(dir.path()).unwrap();
    store.add_profile(profile("rack-7"), DEFAULT_FOLDER).unwrap();
    assert!(store.add_profile(profile("rack-7"), DEFAULT_FOLDER).is_err());
    // Same name in a different folder is fine.
    store.add_folder("lab").unwrap();
    store.add_profile(profile("rack-7"), "lab").unwrap();
}

#[test]
fn invalid_profiles_are_rejected() {
    let dir = TempDir::new().unwrap();
    let mut store = ProfileStore::open(dir.path()).unwrap();
    let mut incomplete = profile("x");
    incomplete.gateway_ip.clear();
    assert!(store.add_profile(incomplete, DEFAULT_FOLDER).is_err());
    assert!(store.profiles(DEFAULT_FOLDER).is_empty());
}

#[test]
fn folder_management() {
    let dir = TempDir::new().unwrap();
    let mut store = ProfileStore::open(dir.path()).unwrap();

    store.add_folder("lab").unwrap();
    assert!(store.add_folder("lab").is_err());
    assert!(store.add_folder("").is_err());

    store.rename_folder("lab", "datacenter").unwrap();
    assert!(store.folders().contains(&"datacenter".to_string()));
    assert!(store.rename_folder(DEFAULT_FOLDER, "other").is_err());

    store.delete_folder("datacenter").unwrap();
    assert!(store.delete_folder(DEFAULT_FOLDER).is_err());
}

#[test]
fn move_profile_between_folders() {
    let dir = TempDir::new().unwrap();
    let mut store = ProfileStore::open(dir.path()).unwrap();
    store.add_profile(profile("rack-7"), DEFAULT_FOLDER).unwrap();
    store.add_folder("lab").unwrap();

    store.move_profile(DEFAULT_FOLDER, 0, "lab").unwrap();
    assert!(store.profiles(DEFAULT_FOLDER).is_empty());
    assert_eq!(store.profiles("lab")[0].name, "rack-7");

    assert!(store.move_profile("lab", 5, DEFAULT_FOLDER).is_err());
    assert!(store.move_profile("lab", 0, "missing").is_err());
}

#[test]
fn find_by_name_searches_all_folders() {
    let dir = TempDir::new().unwrap();
    let mut store = ProfileStore::open(dir.path()).unwrap();
    store.add_folder("lab").unwrap();
    store.add_profile(profile("lab-ilo"), "lab").unwrap();

    let (found, folder, index) = store.find_by_name("lab-ilo", None).unwrap();
    assert_eq!(found.name, "lab-ilo");
    assert_eq!(folder, "lab");
    assert_eq!(index, 0);

    assert!(store.find_by_name("lab-ilo", Some(DEFAULT_FOLDER)).is_none());
    assert!(store.find_by_name("missing", None).is_none());
}

#[test]
fn export_import_roundtrip() {
    let dir = TempDir::new().unwrap();
    let mut store = ProfileStore::open(dir.path()).unwrap();
    store.add_profile(profile("rack-7"), DEFAULT_FOLDER).unwrap();
    store.add_folder("lab").unwrap();
    store.add_profile(profile("lab-ilo"), "lab").unwrap();
    let json = store.export_json().unwrap();

    let other_dir = TempDir::new().unwrap();
    let mut other = ProfileStore::open(other_dir.path()).unwrap();
    let report = other.import_json(&json).unwrap();
    assert_eq!(report.imported, 2);
    assert!(report.errors.is_empty());
    assert_eq!(other.profiles("lab")[0].name, "lab-ilo");
}

#[test]
fn import_accepts_bare_profile_list() {
    let dir = TempDir::new().unwrap();
    let mut store = ProfileStore::open(dir.path()).unwrap();
    let json = r#"[{"name":"a","target_ip":"10.0.0.5","ssh_user":"u","gateway_ip":"g"}]"#;
    let report = store.import_json(json).unwrap();
    assert_eq!(report.imported, 1);
    assert_eq!(store.profiles(DEFAULT_FOLDER)[0].name, "a");
}

#[test]
fn import_skips_invalid_records_but_keeps_valid_ones() {
    let dir = TempDir::new().unwrap();
    let mut store = ProfileStore::open(dir.path()).unwrap();
    let json = r#"{
        "DEFAULT": [
            {"name":"ok","target_ip":"10.0.0.5","ssh_user":"u","gateway_ip":"g"},
            {"name":"no-gateway","target_ip":"10.0.0.5","ssh_user":"u","gateway_ip":""},
            "not an object"
        ],
        "broken": "not a list"
    }"#;
    let report = store.import_json(json).unwrap();
    assert_eq!(report.imported, 1);
    assert_eq!(report.errors.len(), 3);

    assert!(store.import_json("not json").is_err());
}

#[test]
fn legacy_bare_list_on_disk_is_migrated() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("profiles.json"),
        r#"[{"name":"old","target_ip":"10.0.0.5","ssh_user":"u","gateway_ip":"g"}]"#,
    )
    .unwrap();
    let store = ProfileStore::open(dir.path()).unwrap();
    assert_eq!(store.profiles(DEFAULT_FOLDER)[0].name, "old");
}
