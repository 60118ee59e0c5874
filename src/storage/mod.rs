//! On-disk storage: the transient scratch directory

pub mod temp;

pub use temp::{start_stale_sweep_task, TempStorage};
