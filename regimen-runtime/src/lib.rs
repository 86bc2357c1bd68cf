//! # Regimen Runtime
//!
//! INI 式行为管理脚本语言的核心运行时库。
//!
//! ## 架构概述
//!
//! `regimen-runtime` 是纯逻辑核心，不依赖任何 IO 或界面框架。
//! 脚本文本经过三层加载通道成为只读"程序"，运行期由引擎驱动：
//!
//! ```text
//! 脚本文本 ──► SectionMap ──► CompiledScript（只读定义）
//!                                    │
//!                        Engine ◄────┘
//!                          │  持有 SessionState（唯一可变状态）
//!                          │  通过 Environment 发出外部效果
//! ```
//!
//! ## 核心类型
//!
//! - [`CompiledScript`]：编译后的定义表
//! - [`SessionState`]：可序列化的会话状态
//! - [`Engine`]：对外门面（过程、任务动词、清理、存档）
//! - [`Environment`]：注入的外部协作者（时钟、随机、邮件、相机、呈现）
//!
//! ## 使用示例
//!
//! ```ignore
//! use regimen_runtime::{Engine, Environment, script};
//!
//! let result = script::load("script.rgm")?;
//! for diag in &result.diagnostics {
//!     eprintln!("{diag}");
//! }
//!
//! let mut engine = Engine::new(result.script, Environment::new(/* 协作者 */));
//! engine.run_procedure("startup");
//!
//! // 宿主的事件循环按 tick 驱动清理
//! engine.tick();
//! ```
//!
//! ## 模块结构
//!
//! - [`script`]：段读取、定义编译与表达式求值
//! - [`runtime`]：解释器、任务生命周期与引擎
//! - [`state`]：会话状态
//! - [`save`]：会话持久化
//! - [`diagnostic`]：脚本诊断
//! - [`error`]：错误类型定义

pub mod diagnostic;
pub mod error;
pub mod runtime;
pub mod save;
pub mod script;
pub mod state;

// 重导出核心类型
pub use diagnostic::{Diagnostic, DiagnosticLevel, analyze};
pub use error::{LifecycleError, ParseError, RegimenError, RegimenResult, SaveError};
pub use runtime::{
    Engine, Environment, Interpreter, MAX_PROCEDURE_DEPTH, Presenter, RandomSource,
};
pub use save::{SAVE_VERSION, dump_variables, restore_state, serialize_state};
pub use script::{
    CompileResult, CompiledScript, SCRIPT_VERSION, SectionMap, Step, Timestamp, load, load_str,
};
pub use state::{AssignmentInstance, AssignmentKind, AssignmentPhase, SessionState};
