//! Polling scheduler
//!
//! Fixed-interval tick generation and the cooperative loop that feeds
//! ticks to a driver.

pub mod interval;
pub mod poller;

pub use interval::PollScheduler;
pub use poller::Poller;
