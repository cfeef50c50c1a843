//! WorkerBuilder - Worker の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - registry は build() で `Arc` に固定され、以後は変更できない

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use super::config::{ConfigError, WorkerConfig};
use super::worker::Worker;
use crate::domain::{ActivityError, ActivityType};
use crate::ports::{IdGenerator, SystemClock, UlidGenerator, WorkflowService};
use crate::typed::{
    Activity, ActivityArgs, ActivityContext, ActivityImplementation, ActivityRegistry,
};

/// WorkerBuilder は Worker を構築
///
/// # 使用例
/// ```ignore
/// let worker = Worker::builder(config)
///     .service(service)
///     .register_implementation(Greeter::new(), None)
///     .expect_activities(&["Greeter::hello"])
///     .build()?;
/// let handle = worker.start();
/// ```
///
/// # Fail-fast 設計
/// - expect_activities() で期待される activity 名を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば BuildError を返す
pub struct WorkerBuilder {
    config: WorkerConfig,
    registry: ActivityRegistry,
    service: Option<Arc<dyn WorkflowService>>,
    ids: Option<Arc<dyn IdGenerator>>,
    expected_activities: Option<Vec<String>>,
}

/// BuildError は Worker 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing activity types: {0:?}. These activities were expected but not registered.")]
    MissingActivityTypes(Vec<String>),

    #[error("no workflow service configured")]
    MissingService,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl WorkerBuilder {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            registry: ActivityRegistry::new(),
            service: None,
            ids: None,
            expected_activities: None,
        }
    }

    pub fn service(mut self, service: Arc<dyn WorkflowService>) -> Self {
        self.service = Some(service);
        self
    }

    /// ID 生成器を差し替える（テストで Clock を固定したいとき）
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn register<A: Activity>(mut self, name: impl Into<ActivityType>, activity: A) -> Self {
        self.registry.register(name, activity);
        self
    }

    pub fn register_fn<Args, O, F, Fut>(mut self, name: impl Into<ActivityType>, f: F) -> Self
    where
        F: Fn(ActivityContext, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ActivityError>> + Send + 'static,
        Args: ActivityArgs,
        O: Serialize + Send + 'static,
    {
        self.registry.register_fn(name, f);
        self
    }

    pub fn register_implementation<I: ActivityImplementation>(
        mut self,
        instance: I,
        implementation_name: Option<&str>,
    ) -> Self {
        self.registry.register_implementation(instance, implementation_name);
        self
    }

    /// Direct access for registrations the chained methods do not cover.
    pub fn registry_mut(&mut self) -> &mut ActivityRegistry {
        &mut self.registry
    }

    /// 期待される activity 名のリストを設定
    pub fn expect_activities(mut self, activity_types: &[&str]) -> Self {
        self.expected_activities = Some(activity_types.iter().map(|t| t.to_string()).collect());
        self
    }

    /// # 検証
    /// - 設定値（`WorkerConfig::validate`）
    /// - service が設定されているか
    /// - expect_activities() の名前が全て登録されているか
    pub fn build(self) -> Result<Worker, BuildError> {
        self.config.validate()?;
        let service = self.service.ok_or(BuildError::MissingService)?;

        if let Some(expected) = &self.expected_activities {
            let missing: Vec<String> = expected
                .iter()
                .filter(|name| !self.registry.contains(name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingActivityTypes(missing));
            }
        }

        let identity = self
            .config
            .identity
            .clone()
            .unwrap_or_else(|| service.identity());
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)));

        Ok(Worker::new(
            self.config,
            Arc::new(self.registry),
            service,
            identity,
            ids,
        ))
    }
}
