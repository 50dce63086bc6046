//! Stage-stamped latency capture.
//!
//! The tracer only does bookkeeping: the caller performs the (usually async)
//! work between [`LatencyTracer::mark`] calls.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

/// Pipeline stages timed during a question evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Retrieval,
    Reranking,
    Generation,
    AgentReasoning,
    ToolCall,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Retrieval,
        Stage::Reranking,
        Stage::Generation,
        Stage::AgentReasoning,
        Stage::ToolCall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Retrieval => "retrieval",
            Stage::Reranking => "reranking",
            Stage::Generation => "generation",
            Stage::AgentReasoning => "agentReasoning",
            Stage::ToolCall => "toolCall",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Elapsed milliseconds per stage plus the total since `start`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub total_ms: f64,
    pub stages: BTreeMap<Stage, f64>,
}

impl LatencySummary {
    /// Milliseconds spent in `stage`; `0.0` when it was never marked.
    pub fn stage_ms(&self, stage: Stage) -> f64 {
        self.stages.get(&stage).copied().unwrap_or(0.0)
    }
}

/// Records elapsed time between consecutive marks.
#[derive(Debug, Clone)]
pub struct LatencyTracer {
    origin: Instant,
    last: Instant,
    stages: BTreeMap<Stage, f64>,
}

impl LatencyTracer {
    /// Start timing now.
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            origin: now,
            last: now,
            stages: BTreeMap::new(),
        }
    }

    /// Attribute the time since the previous mark (or start) to `stage`.
    ///
    /// Marking the same stage twice accumulates.
    pub fn mark(&mut self, stage: Stage) -> f64 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f64() * 1000.0;
        self.last = now;
        *self.stages.entry(stage).or_insert(0.0) += elapsed;
        elapsed
    }

    /// Skip the time since the previous mark without attributing it.
    pub fn skip(&mut self) {
        self.last = Instant::now();
    }

    /// Per-stage milliseconds, every known stage present, plus total.
    ///
    /// Total is the sum of the attributed stages, so skipped intervals
    /// (e.g. metric computation) never count as pipeline latency.
    pub fn summary(&self) -> LatencySummary {
        let stages: BTreeMap<Stage, f64> = Stage::ALL
            .iter()
            .map(|stage| (*stage, self.stages.get(stage).copied().unwrap_or(0.0)))
            .collect();
        LatencySummary {
            total_ms: stages.values().sum(),
            stages,
        }
    }

    /// Wall-clock milliseconds since `start`, including skipped time.
    pub fn wall_clock_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_unmarked_stages_default_to_zero() {
        let tracer = LatencyTracer::start();
        let summary = tracer.summary();

        assert_eq!(summary.stages.len(), Stage::ALL.len());
        for stage in Stage::ALL {
            assert_eq!(summary.stage_ms(stage), 0.0);
        }
        assert_eq!(summary.total_ms, 0.0);
    }

    #[test]
    fn test_marks_attribute_elapsed_time() {
        let mut tracer = LatencyTracer::start();
        std::thread::sleep(Duration::from_millis(5));
        tracer.mark(Stage::Retrieval);
        std::thread::sleep(Duration::from_millis(5));
        tracer.mark(Stage::Generation);

        let summary = tracer.summary();
        assert!(summary.stage_ms(Stage::Retrieval) >= 5.0);
        assert!(summary.stage_ms(Stage::Generation) >= 5.0);
        assert_eq!(summary.stage_ms(Stage::Reranking), 0.0);
        let sum = summary.stage_ms(Stage::Retrieval) + summary.stage_ms(Stage::Generation);
        assert!((summary.total_ms - sum).abs() < 1e-9);
    }

    #[test]
    fn test_skip_excludes_interval() {
        let mut tracer = LatencyTracer::start();
        tracer.mark(Stage::Retrieval);
        std::thread::sleep(Duration::from_millis(20));
        tracer.skip();
        tracer.mark(Stage::Generation);

        let summary = tracer.summary();
        assert!(summary.total_ms < 20.0);
        assert!(tracer.wall_clock_ms() >= 20.0);
    }

    #[test]
    fn test_repeated_marks_accumulate() {
        let mut tracer = LatencyTracer::start();
        std::thread::sleep(Duration::from_millis(2));
        let first = tracer.mark(Stage::Generation);
        std::thread::sleep(Duration::from_millis(2));
        let second = tracer.mark(Stage::Generation);

        let summary = tracer.summary();
        assert!((summary.stage_ms(Stage::Generation) - (first + second)).abs() < 1e-9);
    }
}
