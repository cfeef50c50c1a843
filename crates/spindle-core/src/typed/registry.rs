//! ActivityRegistry - activity の登録と管理
//!
//! # 設計
//! - 起動前に WorkerBuilder が可変で組み立てる
//! - `build()` で `Arc<ActivityRegistry>` に固定され、以後は読み取り専用
//! - 同じ名前の再登録は上書き（last write wins、エラーにしない）
//!
//! 実装クラスのメソッドをまとめて登録したいときは
//! `ActivityImplementation` を実装し、`register_implementation()` を使う。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use super::activity::{Activity, DynActivity, FnActivity, TypedActivity};
use super::context::ActivityContext;
use super::codec::ActivityArgs;
use crate::domain::errors::short_type_name;
use crate::domain::{ActivityError, ActivityType};

#[derive(Default)]
pub struct ActivityRegistry {
    activities: HashMap<ActivityType, Arc<dyn DynActivity>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self {
            activities: HashMap::new(),
        }
    }

    /// Register an activity under a qualified name.
    ///
    /// Returns the handler it replaced, if any.
    pub fn register<A: Activity>(
        &mut self,
        name: impl Into<ActivityType>,
        activity: A,
    ) -> Option<Arc<dyn DynActivity>> {
        self.register_dyn(name, Arc::new(TypedActivity::new(activity)))
    }

    /// Register an async closure taking the context and the positional arguments.
    ///
    /// ```ignore
    /// registry.register_fn("Greeter::hello", |_ctx, (name,): (String,)| async move {
    ///     Ok(format!("Hello {name}"))
    /// });
    /// ```
    pub fn register_fn<Args, O, F, Fut>(
        &mut self,
        name: impl Into<ActivityType>,
        f: F,
    ) -> Option<Arc<dyn DynActivity>>
    where
        F: Fn(ActivityContext, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ActivityError>> + Send + 'static,
        Args: ActivityArgs,
        O: Serialize + Send + 'static,
    {
        self.register(name, FnActivity::new(f))
    }

    pub fn register_dyn(
        &mut self,
        name: impl Into<ActivityType>,
        activity: Arc<dyn DynActivity>,
    ) -> Option<Arc<dyn DynActivity>> {
        let name = name.into();
        let previous = self.activities.insert(name.clone(), activity);
        if previous.is_some() {
            warn!(activity_type = %name, "activity re-registered, previous handler replaced");
        }
        previous
    }

    /// Register every method an implementation exposes, each under
    /// `"<implementation_name>::<method>"`.
    ///
    /// Without a name, the type name of `I` (without module path) is used.
    pub fn register_implementation<I: ActivityImplementation>(
        &mut self,
        instance: I,
        implementation_name: Option<&str>,
    ) {
        let name = implementation_name
            .map(str::to_string)
            .unwrap_or_else(|| short_type_name::<I>().to_string());
        let mut scope = self.implementation(name);
        Arc::new(instance).register_methods(&mut scope);
    }

    /// Scope that prefixes every registration with `"<name>::"`.
    pub fn implementation(&mut self, name: impl Into<String>) -> ImplementationScope<'_> {
        ImplementationScope {
            registry: self,
            implementation: name.into(),
        }
    }

    pub fn get(&self, name: &ActivityType) -> Option<Arc<dyn DynActivity>> {
        self.activities.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.activities.contains_key(&ActivityType::new(name))
    }

    /// Registered names, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .activities
            .keys()
            .map(|k| k.as_str().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}

/// A group of activities exposed by one implementation object.
///
/// # 使用例
/// ```ignore
/// impl ActivityImplementation for Greeter {
///     fn register_methods(self: Arc<Self>, scope: &mut ImplementationScope<'_>) {
///         scope.method("hello", &self, |this, _ctx, (name,): (String,)| async move {
///             this.hello(&name)
///         });
///     }
/// }
/// ```
pub trait ActivityImplementation: Send + Sync + 'static {
    fn register_methods(self: Arc<Self>, scope: &mut ImplementationScope<'_>);
}

pub struct ImplementationScope<'a> {
    registry: &'a mut ActivityRegistry,
    implementation: String,
}

impl ImplementationScope<'_> {
    pub fn implementation_name(&self) -> &str {
        &self.implementation
    }

    fn qualified(&self, method: &str) -> ActivityType {
        ActivityType::qualified(&self.implementation, method)
    }

    pub fn activity<A: Activity>(&mut self, method: &str, activity: A) -> &mut Self {
        let name = self.qualified(method);
        self.registry.register(name, activity);
        self
    }

    pub fn activity_fn<Args, O, F, Fut>(&mut self, method: &str, f: F) -> &mut Self
    where
        F: Fn(ActivityContext, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ActivityError>> + Send + 'static,
        Args: ActivityArgs,
        O: Serialize + Send + 'static,
    {
        let name = self.qualified(method);
        self.registry.register_fn(name, f);
        self
    }

    /// Register a method of a shared instance; the closure receives the
    /// instance and the context on every call.
    pub fn method<I, Args, O, F, Fut>(&mut self, method: &str, instance: &Arc<I>, f: F) -> &mut Self
    where
        I: Send + Sync + 'static,
        F: Fn(Arc<I>, ActivityContext, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ActivityError>> + Send + 'static,
        Args: ActivityArgs,
        O: Serialize + Send + 'static,
    {
        let instance = Arc::clone(instance);
        self.activity_fn(method, move |ctx: ActivityContext, args: Args| {
            f(Arc::clone(&instance), ctx, args)
        })
    }
}
