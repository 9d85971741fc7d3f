use std::collections::VecDeque;

/// A fixed-capacity ring of recent call outcomes (`true` = success), used only to evaluate the
/// closed-state failure rate. Lives in-process per service; reset on restart is acceptable since
/// a fresh window just means the breaker re-earns its evidence before it can trip
/// names "rolling window", not a durable log of individual calls).
#[derive(Debug, Default)]
pub struct Window {
    samples: VecDeque<bool>,
    capacity: usize,
}

impl Window {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, success: bool) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(success);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn failure_rate(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let failures = self.samples.iter().filter(|ok| !**ok).count();
        failures as f64 / self.samples.len() as f64
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_rate_over_capacity_drops_oldest() {
        let mut window = Window::new(3);
        window.push(false);
        window.push(true);
        window.push(true);
        assert_eq!(window.len(), 3);
        assert!((window.failure_rate() - (1.0 / 3.0)).abs() < 1e-9);

        // Pushing a 4th sample evicts the oldest failure, so the rate should drop to 0.
        window.push(true);
        assert_eq!(window.len(), 3);
        assert_eq!(window.failure_rate(), 0.0);
    }

    #[test]
    fn empty_window_has_zero_failure_rate() {
        let window = Window::new(20);
        assert_eq!(window.failure_rate(), 0.0);
    }
}
