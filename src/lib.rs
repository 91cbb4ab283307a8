//! Ideatrium: capture ideas, place them on an impact/effort matrix, and turn
//! the promising ones into tracked tasks.

pub mod ai;
pub mod config;
pub mod error;
pub mod filter;
pub mod offline;
pub mod quadrant;
pub mod realtime;
pub mod records;
pub mod store;
pub mod validation;
