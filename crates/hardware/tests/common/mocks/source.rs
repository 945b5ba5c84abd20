use hetsim_core::core::{Instruction, InstructionSource};
use mockall::mock;
use std::collections::VecDeque;

mock! {
    pub Source {}
    impl InstructionSource for Source {
        fn next_instruction(&mut self) -> Option<Instruction>;
    }
}

/// Builds a mock that hands out `insts` in order and then reports exhaustion once.
///
/// The core stops asking after the first `None`, so the mock expects exactly
/// `insts.len() + 1` calls.
pub fn scripted(insts: Vec<Instruction>) -> MockSource {
    let calls = insts.len() + 1;
    let mut queue: VecDeque<Instruction> = insts.into();
    let mut mock = MockSource::new();
    let _ = mock
        .expect_next_instruction()
        .times(calls)
        .returning(move || queue.pop_front());
    mock
}
