#![allow(dead_code)]

pub mod builders;
pub mod executors;
pub mod recorders;
pub mod strategies;

pub use builders::*;
pub use executors::*;
pub use recorders::*;
