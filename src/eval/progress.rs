//! Percent-bucket progress reporting for long evaluation runs.

/// Logs completion at a fixed percent cadence.
///
/// A cadence outside the open interval (0, 100) disables reporting
/// entirely, as does an empty total.
pub struct Progress {
    total: usize,
    percent_step: u32,
    completed: usize,
    last_logged: u32,
}

impl Progress {
    pub fn new(total: usize, percent_step: u32) -> Self {
        Self {
            total,
            percent_step,
            completed: 0,
            last_logged: 0,
        }
    }

    /// Mark one item complete. Returns whether a report was emitted, which
    /// happens each time completion crosses into a new cadence bucket.
    pub fn tick(&mut self) -> bool {
        self.completed += 1;
        if !(1..100).contains(&self.percent_step) || self.total == 0 {
            return false;
        }

        let percent = (self.completed * 100 / self.total) as u32;
        let bucket = percent / self.percent_step * self.percent_step;
        if bucket > self.last_logged {
            self.last_logged = bucket;
            log::info!(
                "Processed {}/{} files ({}%)",
                self.completed,
                self.total,
                percent
            );
            return true;
        }
        false
    }
}
