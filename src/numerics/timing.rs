use std::time::{Duration, Instant};

/// Wall-clock accounting for one `solve()` call.
///
/// Assembly and preconditioner work are kept apart so the cost of forming the
/// Jacobian can be told from the cost of factorizing it.
#[derive(Default, Clone, Debug)]
pub struct SolverTimers {
    pub assembly_times: Vec<Duration>,
    pub precond_times: Vec<Duration>,
    pub total_time: Duration,
}

impl SolverTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn record_assembly<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();
        log::trace!("assembly took {:.3}ms", elapsed.as_secs_f64() * 1000.0);
        self.assembly_times.push(elapsed);
        result
    }

    pub fn record_precond<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();
        log::trace!("preconditioner took {:.3}ms", elapsed.as_secs_f64() * 1000.0);
        self.precond_times.push(elapsed);
        result
    }

    pub fn finalize(&mut self, total_time: Duration) {
        self.total_time = total_time;
    }

    pub fn assembly_time(&self) -> Duration {
        self.assembly_times.iter().sum()
    }

    pub fn precond_time(&self) -> Duration {
        self.precond_times.iter().sum()
    }

    pub fn solve_time(&self) -> Duration {
        self.total_time
    }

    #[cfg(feature = "timing")]
    pub fn print_summary(&self) {
        if self.assembly_times.is_empty() {
            return;
        }

        let total_assembly = self.assembly_time();
        let total_precond = self.precond_time();
        let overhead = self
            .total_time
            .saturating_sub(total_assembly + total_precond);

        log::info!("{}", "=".repeat(60));
        log::info!("{:^60}", "SOLVER TIMING SUMMARY");
        log::info!("{}", "=".repeat(60));
        log::info!(
            "Total solver time:             {:.3}s",
            self.total_time.as_secs_f64()
        );
        log::info!("{}", "-".repeat(60));
        log::info!(
            "  Assembly:                  {:>9.3}ms  (avg: {:>9.3}ms)",
            total_assembly.as_secs_f64() * 1000.0,
            total_assembly.as_secs_f64() * 1000.0 / self.assembly_times.len() as f64
        );
        if !self.precond_times.is_empty() {
            log::info!(
                "  Preconditioner:            {:>9.3}ms  (avg: {:>9.3}ms)",
                total_precond.as_secs_f64() * 1000.0,
                total_precond.as_secs_f64() * 1000.0 / self.precond_times.len() as f64
            );
        }
        log::info!("{}", "=".repeat(60));
        log::info!(
            "Overhead/Other:                {:>9.3}ms",
            overhead.as_secs_f64() * 1000.0
        );
        log::info!(
            "Calls:                         {} assembly, {} preconditioner",
            self.assembly_times.len(),
            self.precond_times.len()
        );
    }

    #[cfg(not(feature = "timing"))]
    pub fn print_summary(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulators_grow_and_reset() {
        let mut timers = SolverTimers::new();
        let mut previous = Duration::ZERO;
        for i in 0..5 {
            let value = timers.record_assembly(|| {
                std::thread::sleep(Duration::from_micros(50));
                i * 2
            });
            assert_eq!(value, i * 2);
            assert!(timers.assembly_time() >= previous);
            previous = timers.assembly_time();
        }
        timers.record_precond(|| ());
        assert_eq!(timers.assembly_times.len(), 5);
        assert_eq!(timers.precond_times.len(), 1);
        assert!(timers.assembly_time() >= Duration::from_micros(250));

        timers.reset();
        assert_eq!(timers.assembly_time(), Duration::ZERO);
        assert_eq!(timers.precond_time(), Duration::ZERO);
        assert_eq!(timers.solve_time(), Duration::ZERO);
    }
}
