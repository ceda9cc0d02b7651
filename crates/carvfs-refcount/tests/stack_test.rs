//! Priority picks over a populated refcount stack.

use std::sync::Arc;

use carvfs_ohash::{DigestKind, MemoryHashLog, OpportunisticHashCollection};
use carvfs_path::Context;
use carvfs_refcount::{
    MemoryCacheAdvisor, MemoryTransitionLog, Pick, RefcountStack, StackError,
};

const A: &str = "0+100";
const B: &str = "50+100";
const C: &str = "200+10";
const D: &str = "60+10";

fn empty() -> RefcountStack {
    let hashes =
        OpportunisticHashCollection::new(DigestKind::Blake2b, Arc::new(MemoryHashLog::new()));
    RefcountStack::new(
        Context::in_memory(),
        hashes,
        Arc::new(MemoryCacheAdvisor::new()),
        Arc::new(MemoryTransitionLog::new()),
    )
}

/// L0 = 0+150_200+10, L1 = 50+50, L2 = 60+10
fn populated() -> RefcountStack {
    let mut stack = empty();
    for address in [A, B, C, D] {
        stack.add(address).unwrap();
    }
    stack
}

fn pick(stack: &RefcountStack, policy: &str, candidates: &[&str]) -> String {
    match stack.priority_pick(policy, candidates).unwrap() {
        Some(Pick::Address(address)) => address,
        other => panic!("unexpected pick {:?}", other),
    }
}

#[test]
fn test_levels_of_fixture() {
    let stack = populated();
    let levels: Vec<String> = stack.levels().iter().map(|l| l.to_string()).collect();
    assert_eq!(levels, vec!["0+150_200+10", "50+50", "60+10"]);
}

#[test]
fn test_pick_hot_overlap() {
    let stack = populated();
    // A and B both touch the top level; the tie goes to the smaller address
    assert_eq!(pick(&stack, "R", &[C, B, A]), A);
    assert_eq!(pick(&stack, "R", &[C, B]), B);
}

#[test]
fn test_hot_level_is_shared_by_all_candidates() {
    let stack = populated();
    // The top level only touches B, so C (which touches nothing above 0)
    // must lose on both the flag and the density.
    assert_eq!(pick(&stack, "RS", &[C, B]), B);
    assert_eq!(pick(&stack, "D", &[C, B]), B);
}

#[test]
fn test_pick_size_and_offset() {
    let stack = populated();
    assert_eq!(pick(&stack, "S", &[A, C]), C);
    assert_eq!(pick(&stack, "O", &[B, C]), B);
    assert_eq!(pick(&stack, "SO", &[A, B]), A);
}

#[test]
fn test_pick_weighted_density() {
    let stack = populated();
    assert_eq!(pick(&stack, "W", &[C, A]), A);
    assert_eq!(pick(&stack, "dW", &[C, A]), A);
}

#[test]
fn test_pick_hash_progress() {
    let mut stack = populated();
    stack.hashes_mut().read(200, b"0123456789");
    assert_eq!(stack.hashes().is_done(C), Some(true));
    assert_eq!(pick(&stack, "H", &[A, C]), C);
}

#[test]
fn test_pick_hash_closest_to_completion() {
    let mut stack = empty();
    let big = "1000+10000";
    let small = "20000+100";
    stack.add(big).unwrap();
    stack.add(small).unwrap();
    stack.hashes_mut().read(1000, &[1u8; 100]);
    stack.hashes_mut().read(20000, &[2u8; 90]);
    assert_eq!(stack.hashes().offset(big), Some(100));
    assert_eq!(stack.hashes().offset(small), Some(90));
    // 10 bytes left beat 9900, even though fewer bytes were hashed
    assert_eq!(pick(&stack, "H", &[big, small]), small);
}

#[test]
fn test_pick_special_cases() {
    let stack = populated();
    assert_eq!(
        stack.priority_pick("K", [A]).unwrap(),
        Some(Pick::Kickstart)
    );
    assert_eq!(stack.priority_pick("R", Vec::<String>::new()).unwrap(), None);
    assert!(matches!(
        stack.priority_pick("Rx", [A]),
        Err(StackError::InvalidPolicy { .. })
    ));
    assert!(matches!(
        stack.priority_pick("R", [A, "1+1"]),
        Err(StackError::UnknownAddress(_))
    ));
}

#[test]
fn test_advisory_info_counts() {
    let stack = populated();
    assert_eq!(stack.advisory_info("140+80").unwrap(), (20, 60));
    assert_eq!(stack.advisory_info("S10").unwrap(), (0, 10));
}
