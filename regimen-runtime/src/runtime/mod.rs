//! # Runtime 模块
//!
//! 执行层：把编译后的定义作用到会话状态上。
//!
//! - [`env`]：外部协作者接口与桩实现
//! - [`select`]：共享的选择工具
//! - [`case`]：Case 块的分支求值
//! - [`interpreter`]：动作解释器（生命周期方法见 [`assignments`]）
//! - [`assignments`]：任务实例的生命周期管理
//! - [`engine`]：对外门面

pub mod assignments;
pub mod case;
pub mod engine;
pub mod env;
pub mod interpreter;
pub mod select;

pub use assignments::severity_to_amounts;
pub use engine::Engine;
pub use env::{
    Camera, Clock, Environment, FixedClock, MailSender, NullCamera, NullMailSender, Presenter,
    RandomSource, SequenceRandom, SilentPresenter,
};
pub use interpreter::{Interpreter, MAX_PROCEDURE_DEPTH, StateContext};
