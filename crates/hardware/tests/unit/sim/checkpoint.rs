//! Checkpoint Tests.
//!
//! A warmed-up hierarchy is saved to a file, restored into a fresh simulation and
//! compared block by block; the restored run must then behave like the original.

use std::fs;
use std::io::Write;

use hetsim_core::common::data::AccessKind;
use hetsim_core::config::Topology;
use hetsim_core::core::units::cache::BlockState;
use hetsim_core::sim::checkpoint::{BlockImage, CHECKPOINT_VERSION, Checkpoint, ModuleImage};
use hetsim_core::{SimError, Simulation};
use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;

use crate::common::harness::{TestContext, abc_config};

const ADDRS: [u64; 4] = [0x0, 0x48, 0x100, 0x1008];

fn warmed() -> TestContext {
    let mut ctx = TestContext::new(abc_config(Topology::Crossbar));
    let _ = ctx.load("A", 0x0);
    ctx.store("B", 0x48, 7);
    let _ = ctx.load("A", 0x48);
    ctx.store("A", 0x100, 21);
    ctx.store("B", 0x1008, 5);
    ctx
}

fn assert_same_memory(a: &Simulation, b: &Simulation) {
    for module in ["A", "B", "C", "mem"] {
        for addr in ADDRS {
            assert_eq!(a.block_state(module, addr), b.block_state(module, addr), "{module} {addr:#x}");
            assert_eq!(a.peek_word(module, addr), b.peek_word(module, addr), "{module} {addr:#x}");
            assert_eq!(a.sharers(module, addr), b.sharers(module, addr), "{module} {addr:#x}");
            assert_eq!(a.owner(module, addr), b.owner(module, addr), "{module} {addr:#x}");
        }
    }
}

#[test]
fn test_roundtrip_through_file() {
    let ctx = warmed();
    let json = ctx.sim.serialize().unwrap();

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    let read_back = fs::read_to_string(file.path()).unwrap();

    let restored = Simulation::deserialize(abc_config(Topology::Crossbar), &read_back).unwrap();
    assert_eq!(restored.now(), ctx.sim.now());
    assert!(restored.is_quiescent());
    restored.check_invariants().unwrap();
    assert_same_memory(&ctx.sim, &restored);
}

#[test]
fn test_restored_run_sees_saved_values() {
    let mut original = warmed();
    let json = original.sim.serialize().unwrap();
    let mut restored = TestContext {
        sim: Simulation::deserialize(abc_config(Topology::Crossbar), &json).unwrap(),
    };

    for ctx in [&mut original, &mut restored] {
        assert_eq!(ctx.load("B", 0x100), 21);
        assert_eq!(ctx.load("A", 0x1008), 5);
        ctx.store("A", 0x48, 8);
        assert_eq!(ctx.load("B", 0x48), 8);
        ctx.sim.check_invariants().unwrap();
    }
}

#[test]
fn test_checkpoint_records_version_and_names() {
    let ctx = warmed();
    let json = ctx.sim.serialize().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["version"], 1);
    let names: Vec<&str> = value["modules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["A", "B", "C", "mem"]);
}

#[test]
fn test_serialize_refuses_pending_events() {
    let mut ctx = TestContext::new(abc_config(Topology::Crossbar));
    let _ = ctx
        .sim
        .schedule_access(5, "A", AccessKind::Load, 0x0, 0)
        .unwrap();
    let err = ctx.sim.serialize().unwrap_err();
    assert!(matches!(err, SimError::Checkpoint(_)));
}

#[test]
fn test_restore_rejects_other_geometry() {
    let json = warmed().sim.serialize().unwrap();
    let mut config = abc_config(Topology::Crossbar);
    config.modules[2].num_ways = 4;
    let err = Simulation::deserialize(config, &json).unwrap_err();
    assert!(err.to_string().contains("geometry"), "{err}");
}

#[test]
fn test_restore_rejects_unknown_module() {
    let json = warmed().sim.serialize().unwrap();
    let mut config = abc_config(Topology::Crossbar);
    config.modules[1].name = "D".into();
    let err = Simulation::deserialize(config, &json).unwrap_err();
    assert!(matches!(err, SimError::Checkpoint(_)));
}

#[test]
fn test_restore_rejects_garbage() {
    let err = Simulation::deserialize(abc_config(Topology::Crossbar), "{ not json").unwrap_err();
    assert!(matches!(err, SimError::Checkpoint(_)));
}

fn image(name: &str, sets: usize, ways: usize, blocks: Vec<BlockImage>) -> ModuleImage {
    ModuleImage {
        name: name.into(),
        block_size: 64,
        num_sets: sets,
        num_ways: ways,
        blocks,
    }
}

fn block_zero(state: BlockState, owner: Option<&str>, sharers: &[&str]) -> BlockImage {
    BlockImage {
        set: 0,
        way: 0,
        tag: 0,
        state,
        owner: owner.map(String::from),
        sharers: sharers.iter().map(|s| (*s).to_string()).collect(),
        data: vec![0; 8],
    }
}

/// A checkpoint where `A` holds block 0 modified, and `B` too if `conflict` is set.
fn hand_written(conflict: bool) -> String {
    let upper = |on: bool| {
        if on {
            vec![block_zero(BlockState::Modified, None, &[])]
        } else {
            Vec::new()
        }
    };
    let sharers: &[&str] = if conflict { &["A", "B"] } else { &["A"] };
    let checkpoint = Checkpoint {
        version: CHECKPOINT_VERSION,
        cycle: 40,
        modules: vec![
            image("A", 4, 2, upper(true)),
            image("B", 4, 2, upper(conflict)),
            image("C", 4, 2, vec![block_zero(BlockState::Exclusive, Some("A"), sharers)]),
            image("mem", 256, 8, vec![block_zero(BlockState::Exclusive, Some("C"), &["C"])]),
        ],
        backing: Vec::new(),
    };
    serde_json::to_string(&checkpoint).unwrap()
}

#[test]
fn test_restore_accepts_consistent_hand_written_state() {
    let sim = Simulation::deserialize(abc_config(Topology::Bus), &hand_written(false)).unwrap();
    assert_eq!(sim.block_state("A", 0x0), Some(BlockState::Modified));
    assert_eq!(sim.owner("C", 0x0), Some("A".to_string()));
    assert_eq!(sim.now(), 40);
}

#[test]
fn test_restore_rejects_two_modified_copies() {
    let err = Simulation::deserialize(abc_config(Topology::Bus), &hand_written(true)).unwrap_err();
    assert!(matches!(err, SimError::Checkpoint(_)), "{err}");
    assert!(err.to_string().contains("conflicting copies"), "{err}");
}
