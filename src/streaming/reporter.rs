//! Sinks for loss series entries

use super::evaluator::LossPoint;

/// Receives every new loss series entry as soon as its window is flushed
pub trait LossReporter {
    fn report(&mut self, point: &LossPoint);
}

/// Logs each entry at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl LossReporter for TracingReporter {
    fn report(&mut self, point: &LossPoint) {
        tracing::info!(
            batch_index = point.batch_index,
            loss = point.loss,
            n_pairs = point.n_pairs,
            "window log-loss"
        );
    }
}

/// Keeps every entry in memory
#[derive(Debug, Default, Clone)]
pub struct CollectingReporter {
    pub points: Vec<LossPoint>,
}

impl LossReporter for CollectingReporter {
    fn report(&mut self, point: &LossPoint) {
        self.points.push(*point);
    }
}
