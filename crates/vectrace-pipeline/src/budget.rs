//! Cooperative time budget and per-conversion bookkeeping.
//!
//! Every iterative stage checks [`TimeBudget::is_exhausted`] at its
//! iteration boundaries and stops with whatever it has accumulated. The
//! [`TraceContext`] carries the budget together with the notices and
//! stage diagnostics gathered along the way.

use std::time::Duration;

use web_time::Instant;

use crate::diagnostics::{StageDiagnostics, StageMetrics, duration_ms};
use crate::types::TraceNotice;

/// Wall-clock allowance for one conversion.
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    start: Instant,
    limit: Duration,
}

impl TimeBudget {
    /// Start a budget of `limit_ms` milliseconds now.
    #[must_use]
    pub fn new(limit_ms: u64) -> Self {
        Self {
            start: Instant::now(),
            limit: Duration::from_millis(limit_ms),
        }
    }

    /// A budget that never runs out.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            start: Instant::now(),
            limit: Duration::MAX,
        }
    }

    /// Time since the budget started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Whether the allowance has been used up.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.elapsed() >= self.limit
    }

    /// Fraction of the allowance consumed, saturating at 1.
    #[must_use]
    pub fn fraction_used(&self) -> f64 {
        if self.limit.is_zero() {
            return 1.0;
        }
        (self.elapsed().as_secs_f64() / self.limit.as_secs_f64()).min(1.0)
    }
}

/// Budget, notices and stage timings for one conversion.
#[derive(Debug)]
pub struct TraceContext {
    budget: TimeBudget,
    notices: Vec<TraceNotice>,
    stages: Vec<StageDiagnostics>,
    partial: bool,
}

impl TraceContext {
    /// Create a context around `budget`.
    #[must_use]
    pub const fn new(budget: TimeBudget) -> Self {
        Self {
            budget,
            notices: Vec::new(),
            stages: Vec::new(),
            partial: false,
        }
    }

    /// A context with an unlimited budget, for direct stage use.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(TimeBudget::unlimited())
    }

    /// The time budget.
    #[must_use]
    pub const fn budget(&self) -> &TimeBudget {
        &self.budget
    }

    /// Whether the budget has run out.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.budget.is_exhausted()
    }

    /// Record a recoverable condition.
    pub fn notice(&mut self, notice: TraceNotice) {
        log::warn!("{notice}");
        self.notices.push(notice);
    }

    /// Record that `stage` stopped early because the budget ran out.
    ///
    /// Only the first timeout per stage is recorded.
    pub fn timeout(&mut self, stage: &str) {
        self.partial = true;
        let seen = self
            .notices
            .iter()
            .any(|n| matches!(n, TraceNotice::Timeout { stage: s } if s == stage));
        if !seen {
            self.notice(TraceNotice::Timeout {
                stage: stage.to_string(),
            });
        }
    }

    /// Record the diagnostics of a finished stage.
    pub fn record(&mut self, stage: &str, duration: Duration, metrics: StageMetrics) {
        log::debug!("{stage}: {:.3}ms {metrics:?}", duration_ms(duration));
        self.stages.push(StageDiagnostics {
            stage: stage.to_string(),
            duration,
            metrics,
        });
    }

    /// Run `f` as a named stage, timing it and recording its metrics.
    pub fn stage<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> (T, StageMetrics),
    ) -> T {
        let start = Instant::now();
        let (value, metrics) = f(self);
        self.record(name, start.elapsed(), metrics);
        value
    }

    /// Whether any stage was cut short.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.partial
    }

    /// Notices recorded so far.
    #[must_use]
    pub fn notices(&self) -> &[TraceNotice] {
        &self.notices
    }

    /// Consume the context, returning notices, stages and the partial flag.
    #[must_use]
    pub fn finish(self) -> (Vec<TraceNotice>, Vec<StageDiagnostics>, bool) {
        (self.notices, self.stages, self.partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_is_exhausted_immediately() {
        let budget = TimeBudget::new(0);
        assert!(budget.is_exhausted());
        assert!((budget.fraction_used() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unlimited_budget_never_runs_out() {
        let budget = TimeBudget::unlimited();
        assert!(!budget.is_exhausted());
        assert!(budget.fraction_used() < 0.01);
    }

    #[test]
    fn timeout_is_recorded_once_per_stage() {
        let mut ctx = TraceContext::new(TimeBudget::new(0));
        ctx.timeout("thinning");
        ctx.timeout("thinning");
        ctx.timeout("slic");
        assert!(ctx.is_partial());
        assert_eq!(ctx.notices().len(), 2);
    }

    #[test]
    fn stage_records_metrics() {
        let mut ctx = TraceContext::unlimited();
        let value = ctx.stage("Style", |_| (7, StageMetrics::Style { stylized: 3 }));
        assert_eq!(value, 7);
        let (notices, stages, partial) = ctx.finish();
        assert!(notices.is_empty());
        assert!(!partial);
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].stage, "Style");
    }
}
