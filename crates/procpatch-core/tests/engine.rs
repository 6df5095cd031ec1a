//! End-to-end engine behaviour against a simulated target process

use std::io::Write;

use procpatch_core::memory::{MockProcess, MockProvider};
use procpatch_core::{
    BulkMode, Error, ErrorKind, Event, PatchEngine, SiteState, load_catalog,
};

const BASE: u64 = 0x140000000;
const MODULE_SIZE: usize = 0x753000;
const CHECK_OFFSET: usize = 0x751F5C;
const UNLOCK_AT: u64 = 0x140752038;

const CATALOG: &str = r#"{
    "version": "1.0",
    "target": { "process": "game.exe" },
    "patches": [
        { "name": "skip_check", "signature": "74 4F", "offset": 0,
          "original": "74 4F", "patched": "90 90" }
    ],
    "unlocks": [
        { "name": "costume_a", "address": "0x140752038", "selectable": true }
    ],
    "bundles": [
        { "name": "starter_pack", "addresses": ["0x140752040", "0x140752041", "0x140752042"] }
    ]
}"#;

fn game_process() -> MockProcess {
    let mut bytes = vec![0u8; MODULE_SIZE];
    bytes[CHECK_OFFSET..CHECK_OFFSET + 2].copy_from_slice(&[0x74, 0x4F]);
    MockProcess::builder("Game.exe")
        .pid(1337)
        .module("Game.exe", BASE, bytes)
        .build()
}

fn engine_for(process: &MockProcess) -> PatchEngine<MockProvider> {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CATALOG.as_bytes()).unwrap();
    let catalog = load_catalog(file.path()).unwrap();
    PatchEngine::new(MockProvider::with(process.clone()), catalog).unwrap()
}

#[test]
fn patch_round_trip_at_resolved_address() {
    let process = game_process();
    let mut engine = engine_for(&process);
    engine.attach().unwrap();

    engine.apply_patch("skip_check").unwrap();
    assert_eq!(engine.cached_address("skip_check"), Some(0x140751F5C));
    assert_eq!(engine.read_bytes(0x140751F5C, 2).unwrap(), vec![0x90, 0x90]);
    assert_eq!(engine.inspect_patch("skip_check").unwrap(), SiteState::Patched);

    engine.remove_patch("skip_check").unwrap();
    assert_eq!(engine.read_bytes(0x140751F5C, 2).unwrap(), vec![0x74, 0x4F]);
    assert!(!engine.patches().get("skip_check").unwrap().is_enabled());
}

#[test]
fn unlock_flag_round_trip() {
    let process = game_process();
    let mut engine = engine_for(&process);
    engine.attach().unwrap();

    engine.enable_unlock("costume_a").unwrap();
    assert_eq!(engine.read_byte(UNLOCK_AT).unwrap(), 0x01);

    engine.disable_unlock("costume_a").unwrap();
    assert_eq!(engine.read_byte(UNLOCK_AT).unwrap(), 0x00);
}

#[test]
fn resolution_scans_once_per_session() {
    let process = game_process();
    let mut engine = engine_for(&process);
    engine.attach().unwrap();

    engine.apply_patch("skip_check").unwrap();
    let reads_after_scan = process.reads();
    assert!(reads_after_scan > 0);

    engine.remove_patch("skip_check").unwrap();
    engine.apply_patch("skip_check").unwrap();
    engine.remove_patch("skip_check").unwrap();
    assert_eq!(process.reads(), reads_after_scan);
    assert_eq!(engine.scan_count(), 1);

    engine.detach();
    engine.attach().unwrap();
    assert!(engine.cached_address("skip_check").is_none());

    engine.apply_patch("skip_check").unwrap();
    assert!(process.reads() > reads_after_scan);
    assert_eq!(engine.scan_count(), 1);
}

#[test]
fn target_exit_is_detected_without_detach() {
    let process = game_process();
    let mut engine = engine_for(&process);
    engine.attach().unwrap();
    engine.apply_patch("skip_check").unwrap();
    engine.drain_events();

    process.kill();

    assert!(!engine.is_attached());
    assert!(!engine.patches().get("skip_check").unwrap().is_enabled());
    assert!(engine.cached_address("skip_check").is_none());

    let events = engine.drain_events();
    assert!(events.contains(&Event::ProcessDetached));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::Error { kind: ErrorKind::ProcessExited, .. }
    )));

    assert!(matches!(engine.apply_patch("skip_check"), Err(Error::NotAttached)));
}

#[test]
fn restarted_target_can_be_reattached() {
    let process = game_process();
    let provider = MockProvider::with(process.clone());
    let catalog = procpatch_core::Catalog::from_json(CATALOG).unwrap();
    let mut engine = PatchEngine::new(provider.clone(), catalog).unwrap();

    engine.attach().unwrap();
    process.kill();
    assert!(!engine.is_attached());
    assert!(matches!(engine.attach(), Err(Error::ProcessNotFound(_))));

    provider.add(game_process());
    let info = engine.attach().unwrap();
    assert_eq!(info.pid, 1337);
    engine.apply_patch("skip_check").unwrap();
}

#[test]
fn bundle_partial_failure_keeps_successful_writes() {
    let process = game_process();
    let mut engine = engine_for(&process);
    engine.attach().unwrap();
    process.fail_writes_at(0x140752041);

    let err = engine.enable_bundle("starter_pack").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PartialWriteFailed);
    assert!(!engine.bundles().get("starter_pack").unwrap().is_enabled());
    assert_eq!(process.peek(0x140752040, 3), vec![0x01, 0x00, 0x01]);
}

#[test]
fn open_denied_reports_open_failed() {
    let process = game_process();
    let provider = MockProvider::with(process);
    provider.deny_open(true);
    let catalog = procpatch_core::Catalog::from_json(CATALOG).unwrap();
    let mut engine = PatchEngine::new(provider, catalog).unwrap();

    let err = engine.attach().unwrap_err();
    assert!(matches!(err, Error::OpenFailed { pid: 1337, .. }));
    assert!(err.to_string().contains("administrator"));
}

#[test]
fn bulk_apply_reports_missing_pattern() {
    let process = game_process();
    let mut engine = engine_for(&process);
    engine.attach().unwrap();
    process.poke(0x140751F5C, &[0x00, 0x00]);

    let outcome = engine.apply_all(&["skip_check"], BulkMode::Chain);
    assert!(!outcome.is_success());
    assert!(matches!(outcome.failed[0].1, Error::PatternNotFound { .. }));
    assert_eq!(process.peek(0x140751F5C, 2), vec![0x00, 0x00]);
}

#[test]
fn remove_after_reattach_restores_original_bytes() {
    let process = game_process();
    let mut engine = engine_for(&process);
    engine.attach().unwrap();
    engine.apply_patch("skip_check").unwrap();

    engine.detach();
    engine.attach().unwrap();
    engine.remove_patch("skip_check").unwrap();

    assert_eq!(process.peek(0x140751F5C, 2), vec![0x74, 0x4F]);
}

#[test]
fn operations_without_target_report_not_attached() {
    let process = game_process();
    let mut engine = engine_for(&process);

    assert!(matches!(engine.disable_unlock("costume_a"), Err(Error::NotAttached)));
    assert!(matches!(engine.disable_bundle("starter_pack"), Err(Error::NotAttached)));
    assert!(matches!(engine.remove_patch("skip_check"), Err(Error::NotAttached)));

    engine.attach().unwrap();
    process.kill();
    assert!(matches!(engine.disable_unlock("costume_a"), Err(Error::ProcessExited)));
}
