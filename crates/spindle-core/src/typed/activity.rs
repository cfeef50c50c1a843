//! Activity trait - 型付き activity の定義
//!
//! # 学習ポイント
//! - 関連型で「引数の並び」と「戻り値」を宣言（`Args`, `Output`）
//! - Object-safe trait (DynActivity)
//! - Type erasure パターン (TypedActivity<A> / FnActivity → DynActivity)

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::codec::ActivityArgs;
use super::context::ActivityContext;
use crate::domain::ActivityError;

/// Activity は位置引数を受け取り、JSON にできる値を返す
///
/// # 使用例
/// ```ignore
/// struct Hello;
///
/// #[async_trait]
/// impl Activity for Hello {
///     type Args = (String,);
///     type Output = String;
///
///     async fn execute(&self, _ctx: &ActivityContext, (name,): (String,)) -> Result<String, ActivityError> {
///         Ok(format!("Hello {name}"))
///     }
/// }
/// ```
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    /// Ordered parameter contract, a tuple such as `(String, u32)`.
    type Args: ActivityArgs;
    type Output: Serialize + Send;

    async fn execute(
        &self,
        ctx: &ActivityContext,
        args: Self::Args,
    ) -> Result<Self::Output, ActivityError>;
}

/// DynActivity は object-safe な Activity の抽象化
///
/// `HashMap<ActivityType, Arc<dyn DynActivity>>` に格納するための形。
/// 引数のデコードと戻り値のエンコードはここで行う。
#[async_trait]
pub trait DynActivity: Send + Sync {
    fn arity(&self) -> usize;

    async fn invoke(&self, ctx: ActivityContext, args: Vec<Value>) -> Result<Value, ActivityError>;
}

pub struct TypedActivity<A: Activity> {
    activity: A,
}

impl<A: Activity> TypedActivity<A> {
    pub fn new(activity: A) -> Self {
        Self { activity }
    }
}

#[async_trait]
impl<A: Activity> DynActivity for TypedActivity<A> {
    fn arity(&self) -> usize {
        A::Args::ARITY
    }

    async fn invoke(&self, ctx: ActivityContext, args: Vec<Value>) -> Result<Value, ActivityError> {
        let args = A::Args::from_args(args)
            .map_err(|e| ActivityError::new(ActivityError::DECODE, e.to_string()))?;
        let output = self.activity.execute(&ctx, args).await?;
        serde_json::to_value(output)
            .map_err(|e| ActivityError::new(ActivityError::ENCODE, e.to_string()))
    }
}

/// An [`Activity`] backed by an async closure.
///
/// The closure receives its own copy of the [`ActivityContext`] so the
/// returned future can watch for cancellation without borrowing.
pub struct FnActivity<F, Args, O> {
    f: F,
    _marker: PhantomData<fn(Args) -> O>,
}

impl<F, Args, O> FnActivity<F, Args, O> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, Args, O> Activity for FnActivity<F, Args, O>
where
    F: Fn(ActivityContext, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ActivityError>> + Send + 'static,
    Args: ActivityArgs,
    O: Serialize + Send + 'static,
{
    type Args = Args;
    type Output = O;

    async fn execute(&self, ctx: &ActivityContext, args: Args) -> Result<O, ActivityError> {
        (self.f)(ctx.clone(), args).await
    }
}
