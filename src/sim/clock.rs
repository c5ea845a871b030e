/// A simulation clock that walks a time window in fixed steps.
///
/// The `Clock` yields the absolute start time of each step, from the
/// reference time up to (excluding) the horizon.
///
/// # Examples
///
/// ```
/// use hems_sched::sim::clock::Clock;
///
/// let mut clock = Clock::new(0, 180, 60);
/// let mut times = Vec::new();
///
/// clock.run(|t| times.push(t));
/// assert_eq!(times, vec![0, 60, 120]);
/// ```
#[derive(Debug, Clone)]
pub struct Clock {
    /// Start of the next step (seconds).
    current: i64,
    /// End of the window (seconds, exclusive).
    horizon: i64,
    /// Step width (seconds).
    step_size: i64,
}

impl Clock {
    /// Creates a new clock over `[reference_time, horizon)`.
    ///
    /// # Arguments
    ///
    /// * `reference_time` - Start of the first step
    /// * `horizon` - End of the window; a trailing partial step is still
    ///   visited, clipped by [`tick_span`](Self::tick_span)
    /// * `step_size` - Step width in seconds
    ///
    /// # Panics
    ///
    /// Panics if `step_size <= 0`.
    pub fn new(reference_time: i64, horizon: i64, step_size: i64) -> Self {
        assert!(step_size > 0, "step size must be positive");
        Self {
            current: reference_time,
            horizon,
            step_size,
        }
    }

    /// Advances the clock by one step.
    ///
    /// # Returns
    ///
    /// * `Some(t)` - Start time of the step before advancing
    /// * `None` - If the horizon has been reached
    pub fn tick(&mut self) -> Option<i64> {
        if self.current < self.horizon {
            let t = self.current;
            self.current += self.step_size;
            Some(t)
        } else {
            None
        }
    }

    /// Like [`tick`](Self::tick), also returning the step's width clipped
    /// to the horizon.
    pub fn tick_span(&mut self) -> Option<(i64, i64)> {
        let horizon = self.horizon;
        let step_size = self.step_size;
        self.tick().map(|t| (t, step_width(t, horizon, step_size)))
    }

    /// Number of steps not yet visited.
    pub fn remaining(&self) -> usize {
        if self.current >= self.horizon {
            0
        } else {
            ((self.horizon - self.current + self.step_size - 1) / self.step_size) as usize
        }
    }

    /// Runs a function for each remaining step.
    ///
    /// # Arguments
    ///
    /// * `f` - A function that takes the step start time as an argument
    pub fn run(&mut self, mut f: impl FnMut(i64)) {
        while let Some(t) = self.tick() {
            f(t);
        }
    }
}

/// Width of the step starting at `t`; never reaches past `horizon`.
pub fn step_width(t: i64, horizon: i64, step_size: i64) -> i64 {
    step_size.min(horizon - t).max(0)
}

/// Number of steps needed to cover `[reference_time, horizon)`.
pub fn step_count(reference_time: i64, horizon: i64, step_size: i64) -> usize {
    Clock::new(reference_time, horizon, step_size).remaining()
}
