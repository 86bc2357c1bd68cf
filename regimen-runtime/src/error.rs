//! # Error 模块
//!
//! 定义 regimen-runtime 中使用的错误类型。

use thiserror::Error;

/// 脚本加载错误（致命）
///
/// 只有无法继续编译的情况才会产生 `ParseError`，
/// 可恢复的问题（未知键、格式错误的取值范围等）以 [`crate::Diagnostic`] 形式收集。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// 脚本文件不可读
    #[error("脚本文件 '{path}' 不可读: {reason}")]
    UnreadableFile { path: String, reason: String },

    /// 缺少 [General] 段
    #[error("脚本缺少 [General] 段")]
    MissingGeneral,

    /// [General] 段缺少 MinVersion 键
    #[error("[General] 段缺少 MinVersion 键")]
    MissingMinVersion,

    /// 脚本要求的版本高于当前运行时
    #[error("脚本要求版本 {required}，当前运行时版本 {current}")]
    VersionTooNew { required: String, current: String },
}

/// 任务生命周期操作被拒绝的原因
///
/// 拒绝是**策略性**的：操作不执行、状态不变，由调用方决定如何提示。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LifecycleError {
    /// 任务实例不存在
    #[error("任务实例 {id} 不存在")]
    NotFound { id: u64 },

    /// 定义不存在
    #[error("未找到名为 '{name}' 的 {kind} 定义")]
    UnknownDefinition { kind: &'static str, name: String },

    /// 资源冲突：另一个活动实例占用了同名资源
    #[error("资源 '{resource}' 已被任务实例 {holder} 占用")]
    ResourceConflict { resource: String, holder: u64 },

    /// 有阻塞性惩罚正在执行
    #[error("惩罚 '{punishment}' 正在执行且不可中断")]
    Blocked { punishment: String },

    /// 没有匹配的活动实例
    #[error("没有名为 '{name}' 的活动 {kind} 实例")]
    NoActiveInstance { kind: &'static str, name: String },

    /// 实例已经开始
    #[error("任务 '{name}' 已经开始")]
    AlreadyStarted { name: String },

    /// 必须先开始（started 标志不存在）
    #[error("任务 '{name}' 必须先开始才能完成")]
    NotStarted { name: String },

    /// 实例已处于终止状态
    #[error("任务实例 {id} 已结束，无法再操作")]
    AlreadyFinished { id: u64 },

    /// 定义不允许删除
    #[error("任务 '{name}' 不允许删除")]
    DeleteForbidden { name: String },
}

/// 会话存档错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SaveError {
    /// 存档主版本与当前运行时不兼容
    #[error("存档版本 {found} 与当前版本 {current} 不兼容")]
    IncompatibleVersion { found: String, current: String },

    /// 存档缺少 Version 头
    #[error("存档缺少 Version 头")]
    MissingVersion,
}

/// regimen-runtime 统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegimenError {
    /// 加载错误
    #[error("加载错误: {0}")]
    Parse(#[from] ParseError),

    /// 生命周期操作被拒绝
    #[error("操作被拒绝: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// 存档错误
    #[error("存档错误: {0}")]
    Save(#[from] SaveError),
}

/// Result 类型别名
pub type RegimenResult<T> = Result<T, RegimenError>;
