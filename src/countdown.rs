use crate::clock::Clock;
use std::time::Duration;

pub const DEFAULT_COUNTDOWN_FROM: u32 = 3;
const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Marker returned once a countdown has ticked all the way to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownFinished;

/// Ticking clock that counts down from a fixed value.
///
/// The start value is reported immediately, then one decrement per period
/// until zero. Dropping the future returned by [`Countdown::run`] cancels the
/// countdown; no completion is observed in that case.
#[derive(Debug, Clone, Copy)]
pub struct Countdown {
    from: u32,
    period: Duration,
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTDOWN_FROM)
    }
}

impl Countdown {
    pub fn new(from: u32) -> Self {
        Self {
            from,
            period: TICK_PERIOD,
        }
    }

    pub async fn run<F>(&self, clock: &dyn Clock, mut on_tick: F) -> CountdownFinished
    where
        F: FnMut(u32),
    {
        let mut remaining = self.from;
        on_tick(remaining);
        while remaining > 0 {
            clock.sleep(self.period).await;
            remaining -= 1;
            on_tick(remaining);
        }
        CountdownFinished
    }
}
