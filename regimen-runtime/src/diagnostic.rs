//! # 诊断模块
//!
//! 脚本编译期的非致命问题以诊断条目形式收集，由宿主决定如何呈现。
//!
//! ## 设计原则
//!
//! - 纯值 API，不依赖 IO 或日志框架
//! - 诊断分级：Error（必须修复）、Warn（建议修复）、Info（信息提示）
//! - 可恢复的解析缺口（未知键、格式错误的范围）永远不会中断编译

use crate::script::CompiledScript;

/// 诊断级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticLevel {
    /// 信息提示
    Info,
    /// 警告（建议修复）
    Warn,
    /// 错误（必须修复）
    Error,
}

impl std::fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// 诊断条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 诊断级别
    pub level: DiagnosticLevel,
    /// 所属段名（小写，如果可定位）
    pub section: Option<String>,
    /// 诊断消息
    pub message: String,
}

impl Diagnostic {
    /// 创建错误诊断
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            section: None,
            message: message.into(),
        }
    }

    /// 创建警告诊断
    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warn,
            section: None,
            message: message.into(),
        }
    }

    /// 创建信息诊断
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Info,
            section: None,
            message: message.into(),
        }
    }

    /// 设置所属段名
    pub fn in_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.level)?;
        if let Some(section) = &self.section {
            write!(f, " [{}]", section)?;
        }
        write!(f, " {}", self.message)
    }
}

/// 对编译结果做静态检查
///
/// 检查编译后定义之间的引用完整性：
/// - 动作引用的过程是否存在
/// - 弹窗组 / 指令集的成员是否存在
/// - 生命周期钩子过程是否存在
///
/// 检查是纯函数，不重新解析脚本文本。
pub fn analyze(script: &CompiledScript) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    // 生命周期钩子引用
    for (name, job) in &script.jobs {
        check_hooks(script, "job", name, &job.behavior, &mut out);
    }
    for (name, punishment) in &script.punishments {
        check_hooks(script, "punishment", name, &punishment.behavior, &mut out);
    }

    // 弹窗组成员
    for (name, group) in &script.popup_groups {
        for member in &group.members {
            if !script.popups.contains_key(member) {
                out.push(
                    Diagnostic::warn(format!("弹窗组成员 '{}' 未定义", member))
                        .in_section(format!("popupgroup-{}", name)),
                );
            }
        }
    }

    // 指令集成员
    for (name, set) in &script.instruction_sets {
        for member in &set.members {
            if !script.instructions.contains_key(member) {
                out.push(
                    Diagnostic::warn(format!("指令集成员 '{}' 未定义", member))
                        .in_section(format!("set-{}", name)),
                );
            }
        }
    }

    out
}

fn check_hooks(
    script: &CompiledScript,
    kind: &str,
    name: &str,
    behavior: &crate::script::AssignmentBehavior,
    out: &mut Vec<Diagnostic>,
) {
    let hooks = [
        ("Start", &behavior.start_procedure),
        ("Announce", &behavior.announce_procedure),
        ("Done", &behavior.done_procedure),
        ("Abort", &behavior.abort_procedure),
        ("BeforeDelete", &behavior.before_delete_procedure),
    ];
    for (label, hook) in hooks {
        if let Some(proc_name) = hook
            && !script.procedures.contains_key(proc_name.as_str())
        {
            out.push(
                Diagnostic::warn(format!("{} 钩子引用的过程 '{}' 未定义", label, proc_name))
                    .in_section(format!("{}-{}", kind, name)),
            );
        }
    }
}
