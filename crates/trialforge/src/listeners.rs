use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use trialforge_engine::{BoxError, GraphListener, MetricData, Model};

use crate::format::format_metric;
use crate::study::Direction;

/// Mirrors every engine event into the log.
#[derive(Debug, Default)]
pub struct TrialLog;

impl GraphListener for TrialLog {
    fn on_training_end(&self, model: &Model, success: bool) -> Result<(), BoxError> {
        log::info!(
            "training end: model={} success={success}",
            model.graph().name
        );
        Ok(())
    }

    fn on_intermediate_metric(&self, model: &Model, metric: &MetricData) -> Result<(), BoxError> {
        log::debug!(
            "intermediate metric: model={} metric={metric}",
            model.graph().name
        );
        Ok(())
    }

    fn on_metric(&self, model: &Model, metric: &MetricData) -> Result<(), BoxError> {
        log::info!("final metric: model={} metric={metric}", model.graph().name);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BestTrial {
    pub model_name: String,
    pub metric: MetricData,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeaderboardSummary {
    pub trained: usize,
    pub failed: usize,
    pub best: Option<BestTrial>,
}

impl LeaderboardSummary {
    pub fn lines(&self, study_name: &str) -> Vec<String> {
        let mut lines = vec![format!(
            "Study {study_name}: {} trained, {} failed",
            self.trained, self.failed
        )];
        if let Some(best) = &self.best {
            lines.push(format!(
                "Best: {} with metric {} (reported {})",
                best.model_name,
                format_metric(Some(&best.metric)),
                best.reported_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
        lines
    }
}

/// Tracks outcomes and the best final metric of the study.
#[derive(Debug)]
pub struct Leaderboard {
    direction: Direction,
    summary: Mutex<LeaderboardSummary>,
}

impl Leaderboard {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            summary: Mutex::new(LeaderboardSummary::default()),
        }
    }

    pub fn summary(&self) -> LeaderboardSummary {
        self.summary.lock().clone()
    }
}

impl GraphListener for Leaderboard {
    fn on_training_end(&self, _model: &Model, success: bool) -> Result<(), BoxError> {
        let mut summary = self.summary.lock();
        if success {
            summary.trained += 1;
        } else {
            summary.failed += 1;
        }
        Ok(())
    }

    fn on_metric(&self, model: &Model, metric: &MetricData) -> Result<(), BoxError> {
        let mut summary = self.summary.lock();
        let best = summary.best.as_ref().map(|b| &b.metric);
        if self.direction.improves(metric, best) {
            summary.best = Some(BestTrial {
                model_name: model.graph().name.clone(),
                metric: metric.clone(),
                reported_at: Utc::now(),
            });
        }
        Ok(())
    }
}
