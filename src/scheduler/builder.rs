use std::sync::Arc;

use tracing::debug;

use crate::{
    common::{Clock, Result, SchedulerConfig, SystemClock, next_thread_name},
    driver::{DriverContext, DriverMetrics, DriverPlugin, MetricsPlugin, TaskDriver},
    scheduler::Timer,
};

/// Timer 构建器
///
/// 用于一步步配置并生成 Timer 实例。
#[derive(Default)]
pub struct TimerBuilder {
    /// 全局配置
    config: SchedulerConfig,
    /// 选填: 时钟 (默认系统时钟)
    clock: Option<Arc<dyn Clock>>,
    /// 选填: 自定义插件链路
    plugins: Vec<Box<dyn DriverPlugin>>,
}

impl TimerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 整体替换配置
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// [可选] 设置工作线程名
    /// 不填则自动生成 `talos-timer-<序号>`。
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.worker.thread_name = Some(name.into());
        self
    }

    /// [可选] 替换时钟，测试时可以注入 `ManualClock`
    pub fn with_clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// [可选] 注入自定义插件
    /// 例如：日志记录器、错误报警
    pub fn with_plugin<PL>(mut self, plugin: PL) -> Self
    where
        PL: DriverPlugin,
    {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// [核心] 构建 Timer 并启动工作线程
    ///
    /// Config -> Context -> Driver (线程) -> Timer
    pub fn build(self) -> Result<Timer> {
        self.config.validate()?;

        let name = self
            .config
            .worker
            .thread_name
            .clone()
            .unwrap_or_else(next_thread_name);
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let metrics = Arc::new(DriverMetrics::default());

        // 指标插件放在最前面，用户插件看到的计数已经更新
        let mut plugins = self.plugins;
        plugins.insert(0, Box::new(MetricsPlugin::new(metrics.clone())));

        let ctx = Arc::new(DriverContext::new(name, self.config, clock, metrics));
        let handle = TaskDriver::new(ctx.clone(), plugins).spawn()?;
        debug!("[Timer-{}] Worker spawned.", ctx.name);

        Ok(Timer::from_parts(ctx, handle))
    }
}
