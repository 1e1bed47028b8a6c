use std::sync::Arc;

use crate::{
    common::{SchedulerError, TaskContext},
    driver::{DriverMetrics, DriverPlugin},
};

/// 内置指标插件，由 `TimerBuilder` 自动注入到插件链的最前面
pub struct MetricsPlugin {
    metrics: Arc<DriverMetrics>,
}

impl MetricsPlugin {
    pub fn new(metrics: Arc<DriverMetrics>) -> Self {
        Self { metrics }
    }
}

impl DriverPlugin for MetricsPlugin {
    // 触发数 +1, active +1
    fn before_execute(&self, _ctx: &TaskContext) {
        self.metrics.inc_fired();
        self.metrics.inc_active();
    }
    // 任务成功 -> -1, success+1
    fn on_success(&self, _ctx: &TaskContext) {
        self.metrics.dec_active();
        self.metrics.inc_success();
    }
    // 任务失败 -> -1, failure+1
    fn on_failure(&self, _ctx: &TaskContext, _error: &SchedulerError) {
        self.metrics.dec_active();
        self.metrics.inc_failure();
    }
}
