//! # Script 模块
//!
//! 脚本加载流水线：段读取、表达式求值与定义编译。
//!
//! ## 模块结构
//!
//! - [`section`]：行式文本 → 有序多值段映射（含 `%include` 展开）
//! - [`defs`]：编译器输出的结构化定义
//! - [`expr`]：条件表达式求值
//! - [`compile`]：段映射 → [`defs::CompiledScript`]

pub mod compile;
pub mod defs;
pub mod expr;
pub mod section;

pub use compile::{CompileResult, SCRIPT_VERSION, load, load_str};
pub use defs::*;
pub use expr::{EvalContext, Timestamp, evaluate};
pub use section::{Section, SectionMap};
