//! Operators and the per-variant method tables.

pub mod array;
pub mod number;
pub mod object;
pub mod ops;
pub mod registry;
pub mod string;
pub mod time;
