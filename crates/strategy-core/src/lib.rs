//! Internal id-generation and naming infrastructure for the strategy
//! orchestration core. Not intended for direct use outside this workspace —
//! mirrors the role `agtrace-core` plays for the teacher CLI.

pub mod cancel;
pub mod ids;
pub mod naming;
