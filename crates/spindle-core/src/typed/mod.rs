//! Typed - 型付き Activity API
//!
//! activity 名の typo や引数の並びの食い違いを型で排除します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Activity` trait, `ActivityArgs`（タプルで引数契約）
//! - **内部（Dyn）**: `DynActivity` trait - object-safe, type erasure

pub mod activity;
pub mod codec;
pub mod context;
pub mod registry;

pub use self::activity::{Activity, DynActivity, FnActivity, TypedActivity};
pub use self::codec::{ActivityArgs, CodecError, PayloadCodec};
pub use self::context::ActivityContext;
pub use self::registry::{ActivityImplementation, ActivityRegistry, ImplementationScope};
