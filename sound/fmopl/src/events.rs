//! Outward notifications from a chip to the host's scheduler.

use std::time::Duration;

/// The two hardware timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// 80us resolution (at the standard clock), `0x02`
    A,
    /// 320us resolution, `0x03`
    B,
}

impl Timer {
    pub(crate) const fn index(self) -> usize {
        match self {
            Timer::A => 0,
            Timer::B => 1,
        }
    }
}

/// Callbacks raised by a [`Chip`](crate::Chip). Every method has an empty
/// default, implement only what the host needs.
///
/// The chip never keeps time itself. A host that cares about timers arms
/// its own timer from [`ChipEvents::timer_reload`] and calls
/// [`Chip::timer_expired`](crate::Chip::timer_expired) when it fires.
pub trait ChipEvents {
    /// A timer was started (`Some(period)`), stopped (`None`) or needs its
    /// next period after an overflow
    fn timer_reload(&mut self, _timer: Timer, _period: Option<Duration>) {}

    /// The IRQ line changed state
    fn irq_changed(&mut self, _asserted: bool) {}

    /// Chip state is about to change; a streaming host should render up to
    /// the current time first
    fn update_request(&mut self) {}

    /// Finest timer granularity, for sizing the host's scheduler tick
    fn update_interval_hint(&mut self, _interval: Duration) {}
}

/// Ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvents;

impl ChipEvents for NoEvents {}
