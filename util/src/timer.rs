use std::time::{Duration, Instant};

/// Utility for keeping track of how long a test or a whole suite took.
pub struct Timer {
    start_time: Instant,
}

impl Timer {
    /// Create a new `Timer`.
    pub fn now() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    /// Reset internal timer to now.
    pub fn reset(&mut self) {
        self.start_time = Instant::now();
    }

    /// Time since the timer was last reset.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Print a message with the elapsed time since the timer was last reset.
    pub fn print_elapsed(&self, what: &str) {
        eprintln!("{} took {:.2?}", what, self.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::Timer;

    #[test]
    fn test_reset_moves_start_forward() {
        let mut timer = Timer::now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let before = timer.elapsed();
        timer.reset();
        assert!(timer.elapsed() < before);
    }
}
