//! Shared protocol definitions for the `MatchChat` messaging wire format.

pub mod event;
pub mod message;
