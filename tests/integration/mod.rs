//! Integration test modules for tactus

pub mod engine;
pub mod recall;
pub mod ring;
pub mod threads;
pub mod timing;
