//! API handlers module

pub mod audience;
pub mod compile;
pub mod health;
pub mod reconcile;
