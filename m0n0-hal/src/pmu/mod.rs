//! Power management: DVFS performance levels.
//!
//! The level is applied by the PCSM and settles asynchronously; see
//! [`System::set_perf`](crate::System::set_perf).

pub mod dvfs;

pub use dvfs::PerfLevel;
