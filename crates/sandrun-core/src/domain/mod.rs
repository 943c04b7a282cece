//! Domain model (ids, variables, native values, task context, outcomes, errors).
//!
//! # 含まれる型
//! - **TypedVariable / VariableSet**: engine の wire 形式
//! - **NativeValue / NativeMapping**: 子プロセスが読み書きする JSON 側の値
//! - **TaskContext / TaskConfig**: lease された task と topic ごとの設定
//! - **ExecutionResult / TaskOutcome**: 子プロセスの結果と engine への報告
//! - **SandrunError**: outcome を作れなかった場合のエラー
//!
//! I/O はここには置かない (ports / impls 側)。

pub mod errors;
pub mod ids;
pub mod native;
pub mod outcome;
pub mod task;
pub mod variable;

pub use errors::SandrunError;
pub use ids::RunId;
pub use native::{NativeMapping, NativeValue};
pub use outcome::{ExecutionResult, OutcomeKind, TaskOutcome};
pub use task::{LeaseScope, OutcomePolicy, TaskConfig, TaskContext};
pub use variable::{TypedVariable, ValueInfo, ValueType, VariableSet};
