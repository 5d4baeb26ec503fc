//! Scheduling primitives for coordinating view updates.
//!
//! [`DebounceScheduler`] coalesces bursts into one trailing-edge invocation;
//! [`Throttled`] runs at most once per window on the leading edge;
//! [`PriorityScheduler`] maps urgency tiers onto debounce windows.

pub mod debounce;
pub mod priority;
pub mod throttle;

pub use debounce::{DebounceScheduler, Debounced, ScheduleHandle};
pub use priority::{PriorityDelays, PriorityScheduler, UpdatePriority};
pub use throttle::Throttled;
