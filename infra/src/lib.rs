//! Storage plumbing for the coffee shop menu: typed row ids, the
//! [`Storage`](persistence::Storage) seam, and the two pool-able backends.

pub mod ids;
pub mod memory;
pub mod persistence;
pub mod pg;
