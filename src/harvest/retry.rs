//! Exponential backoff around task generation, with templated fallback.
//!
//! - Default: 3 attempts, waiting 2s then 4s between them
//! - An attempt that returns no usable tasks counts as a failure
//! - Short answers are padded from the templates
//! - Exhaustion falls back to the templates entirely

use std::time::Duration;

use tracing::{debug, warn};

use super::collaborators::WorkGenerator;
use super::templates::fallback_tasks;
use crate::types::Category;

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Cap for exponential growth.
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (typically 2.0).
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// 3 attempts with 2s and 4s delays between them.
    pub const DEFAULT: Self = Self {
        max_retries: 2,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(16),
        backoff_multiplier: 2.0,
    };

    /// A single attempt.
    pub const NO_RETRY: Self = Self {
        max_retries: 0,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        backoff_multiplier: 1.0,
    };

    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Computes the delay for the given retry attempt (0-indexed).
    ///
    /// `initial_delay * backoff_multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped_secs)
    }

    /// Returns an iterator over all retry delays.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Where the tasks returned by [`generate_with_fallback`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSource {
    Generated,
    /// Generated, topped up from the templates.
    Padded,
    Fallback,
}

/// Generates `count` tasks, retrying with backoff and falling back to the
/// templates.
///
/// Never fails. Returns at most `count` tasks; fewer only when the generator
/// and the templates together cannot supply `count` distinct tasks.
pub async fn generate_with_fallback<G: WorkGenerator>(
    generator: &G,
    config: &RetryConfig,
    category: &Category,
    location: &str,
    count: usize,
) -> (Vec<String>, TaskSource) {
    if count == 0 {
        return (Vec::new(), TaskSource::Generated);
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        match generator.generate(category, location, count).await {
            Ok(tasks) => {
                let mut tasks = clean(tasks);
                if !tasks.is_empty() {
                    tasks.truncate(count);
                    if tasks.len() == count {
                        return (tasks, TaskSource::Generated);
                    }
                    debug!(location, got = tasks.len(), wanted = count, "Padding generated tasks");
                    for task in fallback_tasks(category, location, count) {
                        if tasks.len() == count {
                            break;
                        }
                        if !tasks.contains(&task) {
                            tasks.push(task);
                        }
                    }
                    return (tasks, TaskSource::Padded);
                }
                warn!(location, attempt, "Generator returned no tasks");
            }
            Err(e) => {
                warn!(location, attempt, error = %e, "Task generation failed");
            }
        }

        if attempt >= config.max_attempts() {
            warn!(location, attempts = attempt, "Falling back to templated tasks");
            return (fallback_tasks(category, location, count), TaskSource::Fallback);
        }
        tokio::time::sleep(config.delay_for_attempt(attempt - 1)).await;
    }
}

/// Trims tasks, dropping empty ones and duplicates while keeping order.
fn clean(tasks: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tasks.len());
    for task in tasks {
        let task = task.trim();
        if !task.is_empty() && !out.iter().any(|t| t == task) {
            out.push(task.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::collaborators::GenerateError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    /// Fails a fixed number of times, then returns `tasks`.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        tasks: Vec<String>,
    }

    impl Flaky {
        fn new(failures: u32, tasks: &[&str]) -> Self {
            Flaky {
                failures,
                calls: AtomicU32::new(0),
                tasks: tasks.iter().map(|t| t.to_string()).collect(),
            }
        }
    }

    impl WorkGenerator for Flaky {
        async fn generate(
            &self,
            _category: &Category,
            _location: &str,
            _count: usize,
        ) -> Result<Vec<String>, GenerateError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(GenerateError("upstream unavailable".into()))
            } else {
                Ok(self.tasks.clone())
            }
        }
    }

    fn category() -> Category {
        Category::parse("chiropractic").unwrap()
    }

    #[test]
    fn default_delays_are_2_then_4() {
        let delays: Vec<_> = RetryConfig::DEFAULT.delays().collect();
        assert_eq!(delays, vec![Duration::from_secs(2), Duration::from_secs(4)]);
        assert_eq!(RetryConfig::DEFAULT.max_attempts(), 3);
    }

    #[test]
    fn delays_respect_cap() {
        let config = RetryConfig::new(6, Duration::from_secs(1), Duration::from_secs(5), 2.0);
        let delays: Vec<_> = config.delays().collect();
        assert_eq!(delays[2], Duration::from_secs(4));
        assert!(delays[3..].iter().all(|d| *d == Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let generator = Flaky::new(2, &["a", "b", "c"]);
        let start = Instant::now();

        let (tasks, source) =
            generate_with_fallback(&generator, &RetryConfig::DEFAULT, &category(), "Reno, NV 89501", 3).await;

        assert_eq!(tasks, vec!["a", "b", "c"]);
        assert_eq!(source, TaskSource::Generated);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_falls_back_to_templates() {
        let generator = Flaky::new(u32::MAX, &[]);

        let (tasks, source) =
            generate_with_fallback(&generator, &RetryConfig::DEFAULT, &category(), "Reno, NV 89501", 5).await;

        assert_eq!(source, TaskSource::Fallback);
        assert_eq!(tasks, fallback_tasks(&category(), "Reno, NV 89501", 5));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn short_answers_are_padded_and_long_ones_truncated() {
        let short = Flaky::new(0, &["only one", "  ", "only one"]);
        let (tasks, source) =
            generate_with_fallback(&short, &RetryConfig::NO_RETRY, &category(), "Reno, NV 89501", 3).await;
        assert_eq!(source, TaskSource::Padded);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0], "only one");
        assert_eq!(tasks[1], "chiropractic software vendors in Reno, NV 89501");

        let long = Flaky::new(0, &["a", "b", "c", "d"]);
        let (tasks, _) =
            generate_with_fallback(&long, &RetryConfig::NO_RETRY, &category(), "Reno, NV 89501", 2).await;
        assert_eq!(tasks, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn empty_answers_count_as_failures() {
        let generator = Flaky::new(0, &[]);
        let (_, source) =
            generate_with_fallback(&generator, &RetryConfig::NO_RETRY, &category(), "Reno, NV 89501", 2).await;
        assert_eq!(source, TaskSource::Fallback);
    }
}
