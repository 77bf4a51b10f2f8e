//! Operator integration test modules

mod ordering;
mod preflight;
mod rendering;
