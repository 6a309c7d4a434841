//! File-backed dataset sources.

pub mod jsonl;
