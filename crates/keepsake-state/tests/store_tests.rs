//! Integration tests for the dual-copy reconciliation protocol.

use std::fs;
use std::path::Path;

use keepsake_prefs::prelude::*;
use keepsake_state::prelude::*;

// -- test payload -----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
struct SaveData {
    coins: u64,
    unlocked_levels: Vec<u32>,
}

// -- helpers ----------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn prefs_at(dir: &Path) -> Prefs {
    let backend = FileBackend::open(dir.join("prefs.json")).unwrap();
    Prefs::new(Box::new(backend), Box::new(Passthrough))
}

fn store_at(dir: &Path, clock: ManualClock) -> StateStore<SaveData> {
    let config = StoreConfig::save_state(dir, "demo").plaintext();
    StateStore::json(config, prefs_at(dir), Box::new(clock))
}

fn serialize_state(schema_version: u32, last_modified: i64, coins: u64) -> String {
    serde_json::to_string(&VersionedState {
        schema_version,
        last_modified,
        payload: SaveData {
            coins,
            unlocked_levels: Vec::new(),
        },
    })
    .unwrap()
}

/// Plant a raw string as the file copy.
fn plant_file_copy(dir: &Path, raw: &str) {
    fs::write(dir.join("demo.sav"), raw).unwrap();
}

/// Plant a raw string as the preference copy, the way a save would have.
fn plant_prefs_copy(dir: &Path, raw: &str) {
    let mut prefs = prefs_at(dir);
    prefs.set("m_GameState", &raw.to_owned(), false).unwrap();
    prefs.flush().unwrap();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

// -- Save then load yields the same payload ---------------------------------

#[test]
fn save_then_load_is_idempotent_on_payload() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::starting_at(1_000);

    let mut store = store_at(dir.path(), clock.clone());
    {
        let state = store.state_mut().unwrap();
        state.payload.coins = 42;
        state.payload.unlocked_levels = vec![1, 2, 3];
    }
    clock.advance(10);
    store.save().unwrap();

    let mut reloaded = store_at(dir.path(), clock);
    let state = reloaded.load().unwrap();
    assert_eq!(state.payload.coins, 42);
    assert_eq!(state.payload.unlocked_levels, vec![1, 2, 3]);
    // The stamp moved with the save; only the payload is idempotent.
    assert_eq!(state.last_modified, 1_010);
}

// -- Fresh install: all three locations absent ------------------------------

#[test]
fn fresh_install_constructs_persists_and_reloads() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::starting_at(7);

    let mut store = store_at(dir.path(), clock.clone());
    let state = store.load().unwrap();
    assert_eq!(state.payload, SaveData::default());
    assert_eq!(state.last_modified, 7);

    // Both copies were written by the implicit first save.
    assert!(dir.path().join("demo.sav").exists());
    assert!(!dir.path().join("demo.sav.tmp").exists());

    // A second process sees an equivalent state.
    let mut second = store_at(dir.path(), clock);
    assert_eq!(second.load().unwrap().payload, SaveData::default());
}

// -- Newer copy wins --------------------------------------------------------

#[test]
fn newer_file_copy_wins() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    // Prefs copy is older (t=100, coins=50); file copy newer (t=200, coins=75).
    plant_prefs_copy(dir.path(), &serialize_state(0, 100, 50));
    plant_file_copy(dir.path(), &serialize_state(0, 200, 75));

    let mut store = store_at(dir.path(), ManualClock::starting_at(999));
    assert_eq!(store.load().unwrap().payload.coins, 75);
}

#[test]
fn newer_prefs_copy_wins() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    plant_prefs_copy(dir.path(), &serialize_state(0, 300, 90));
    plant_file_copy(dir.path(), &serialize_state(0, 200, 75));

    let mut store = store_at(dir.path(), ManualClock::starting_at(999));
    assert_eq!(store.load().unwrap().payload.coins, 90);
}

#[test]
fn timestamp_tie_adopts_file_copy() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    // Equal stamps but different payloads: the prefs copy must be strictly
    // newer to win, so the file copy is adopted.
    plant_prefs_copy(dir.path(), &serialize_state(0, 500, 1));
    plant_file_copy(dir.path(), &serialize_state(0, 500, 2));

    let mut store = store_at(dir.path(), ManualClock::starting_at(999));
    assert_eq!(store.load().unwrap().payload.coins, 2);
}

// -- Identical raw copies skip reconciliation --------------------------------

#[test]
fn identical_raw_copies_load_without_comparison() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    let raw = serialize_state(1, 500, 10);
    plant_prefs_copy(dir.path(), &raw);
    plant_file_copy(dir.path(), &raw);

    let mut store = store_at(dir.path(), ManualClock::starting_at(999));
    let state = store.load().unwrap();
    assert_eq!(state.schema_version, 1);
    assert_eq!(state.last_modified, 500);
    assert_eq!(state.payload.coins, 10);
}

// -- Crash recovery ----------------------------------------------------------

#[test]
fn leftover_staging_file_is_promoted_before_reading() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    // Crash scenario: staging holds the newest save, canonical is stale.
    fs::write(dir.path().join("demo.sav"), serialize_state(0, 100, 5)).unwrap();
    fs::write(dir.path().join("demo.sav.tmp"), serialize_state(0, 900, 99)).unwrap();

    let mut store = store_at(dir.path(), ManualClock::starting_at(999));
    let state = store.load().unwrap();
    assert_eq!(state.payload.coins, 99);
    assert!(!dir.path().join("demo.sav.tmp").exists());
}

#[test]
fn staging_file_without_canonical_is_promoted() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    fs::write(dir.path().join("demo.sav.tmp"), serialize_state(0, 900, 31)).unwrap();

    let mut store = store_at(dir.path(), ManualClock::starting_at(999));
    assert_eq!(store.load().unwrap().payload.coins, 31);
}

// -- Partial corruption tolerance --------------------------------------------

#[test]
fn corrupt_prefs_copy_falls_back_to_file_copy() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    plant_prefs_copy(dir.path(), "garbage that is not a state");
    plant_file_copy(dir.path(), &serialize_state(0, 100, 12));

    let mut store = store_at(dir.path(), ManualClock::starting_at(999));
    assert_eq!(store.load().unwrap().payload.coins, 12);
}

#[test]
fn corrupt_file_copy_falls_back_to_prefs_copy() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    // Even with an older stamp: a corrupt survivor comparison never happens.
    plant_prefs_copy(dir.path(), &serialize_state(0, 50, 8));
    plant_file_copy(dir.path(), "{\"schema_version\": 0, truncated");

    let mut store = store_at(dir.path(), ManualClock::starting_at(999));
    assert_eq!(store.load().unwrap().payload.coins, 8);
}

#[test]
fn absent_prefs_copy_uses_file_copy() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    plant_file_copy(dir.path(), &serialize_state(0, 100, 21));

    let mut store = store_at(dir.path(), ManualClock::starting_at(999));
    assert_eq!(store.load().unwrap().payload.coins, 21);
}

// -- Both copies unreadable ---------------------------------------------------

#[test]
fn both_copies_corrupt_fails_by_default() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    plant_prefs_copy(dir.path(), "not a state either");
    plant_file_copy(dir.path(), "not a state");

    let mut store = store_at(dir.path(), ManualClock::starting_at(999));
    assert!(matches!(
        store.load(),
        Err(StateError::BothCopiesCorrupt { .. })
    ));
    // The unreadable copies are left in place for inspection.
    assert_eq!(
        fs::read_to_string(dir.path().join("demo.sav")).unwrap(),
        "not a state"
    );
}

#[test]
fn both_copies_corrupt_can_reset_to_default() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    plant_prefs_copy(dir.path(), "not a state either");
    plant_file_copy(dir.path(), "not a state");

    let config = StoreConfig::save_state(dir.path(), "demo")
        .plaintext()
        .with_corrupt_policy(CorruptPolicy::ResetToDefault);
    let mut store: StateStore<SaveData> = StateStore::json(
        config,
        prefs_at(dir.path()),
        Box::new(ManualClock::starting_at(40)),
    );

    let state = store.load().unwrap();
    assert_eq!(state.payload, SaveData::default());
    assert_eq!(state.last_modified, 40);
}

// -- Sealed stores ------------------------------------------------------------

#[test]
fn sealed_save_roundtrips_and_obfuscates_the_file() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::starting_at(10);

    let sealed_prefs = || {
        Prefs::new(
            Box::new(FileBackend::open(dir.path().join("prefs.json")).unwrap()),
            Box::new(KeystreamCipher::new(b"project-key", b"project-iv")),
        )
    };

    let config = StoreConfig::save_state(dir.path(), "demo");
    let mut store: StateStore<SaveData> =
        StateStore::json(config.clone(), sealed_prefs(), Box::new(clock.clone()));
    store.state_mut().unwrap().payload.coins = 1234;
    store.save().unwrap();

    // The canonical file must not leak field names.
    let on_disk = fs::read_to_string(dir.path().join("demo.sav")).unwrap();
    assert!(!on_disk.contains("coins"));

    let mut reloaded: StateStore<SaveData> =
        StateStore::json(config, sealed_prefs(), Box::new(clock));
    assert_eq!(reloaded.load().unwrap().payload.coins, 1234);
}

#[test]
fn sealed_store_with_wrong_key_reads_neither_copy() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::starting_at(10);

    let config = StoreConfig::save_state(dir.path(), "demo");
    let good_key = || -> Prefs {
        Prefs::new(
            Box::new(FileBackend::open(dir.path().join("prefs.json")).unwrap()),
            Box::new(KeystreamCipher::new(b"project-key", b"project-iv")),
        )
    };

    let mut store: StateStore<SaveData> =
        StateStore::json(config.clone(), good_key(), Box::new(clock.clone()));
    store.state_mut().unwrap().payload.coins = 5;
    store.save().unwrap();

    // A build shipped with different key material can read neither copy.
    let wrong_key = Prefs::new(
        Box::new(FileBackend::open(dir.path().join("prefs.json")).unwrap()),
        Box::new(KeystreamCipher::new(b"other-key", b"project-iv")),
    );
    let mut broken: StateStore<SaveData> =
        StateStore::json(config, wrong_key, Box::new(clock));
    assert!(matches!(
        broken.load(),
        Err(StateError::BothCopiesCorrupt { .. })
    ));
}

// -- Settings profile ----------------------------------------------------------

#[test]
fn settings_store_lives_beside_the_save_store() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::starting_at(1);

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Settings {
        brightness: f32,
        master_volume: f32,
    }
    impl Default for Settings {
        fn default() -> Self {
            Self {
                brightness: 1.0,
                master_volume: 0.8,
            }
        }
    }

    let config = StoreConfig::settings(dir.path(), "demo").plaintext();
    let mut store: StateStore<Settings> =
        StateStore::json(config.clone(), prefs_at(dir.path()), Box::new(clock.clone()));
    store.state_mut().unwrap().payload.brightness = 0.4;
    store.save().unwrap();

    assert!(dir.path().join("demo_Settings.json").exists());

    let mut reloaded: StateStore<Settings> =
        StateStore::json(config, prefs_at(dir.path()), Box::new(clock));
    assert_eq!(reloaded.load().unwrap().payload.brightness, 0.4);
}

// -- Save failure propagates ----------------------------------------------------

#[test]
fn save_into_unwritable_location_errors() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    // Point the canonical path inside a path segment that is a file, so
    // directory creation fails.
    fs::write(dir.path().join("blocker"), "").unwrap();
    let config = StoreConfig {
        prefs_key: "m_GameState".to_owned(),
        canonical_path: dir.path().join("blocker/demo.sav"),
        temp_path: dir.path().join("blocker/demo.sav.tmp"),
        schema_version: 0,
        encrypt: false,
        corrupt_policy: CorruptPolicy::Fail,
    };

    let mut store: StateStore<SaveData> = StateStore::json(
        config,
        prefs_at(dir.path()),
        Box::new(ManualClock::starting_at(1)),
    );

    // The fresh-install path has to persist itself, which cannot succeed here.
    assert!(matches!(store.load(), Err(StateError::Io { .. })));
}
