//! # Compile 模块
//!
//! 定义编译器：把段映射按名字前缀分组并产出类型化定义。
//!
//! ## 架构
//!
//! ```text
//! 脚本文本 → [section] → SectionMap → [compile] → CompiledScript + 诊断
//! ```
//!
//! ## 失败策略
//!
//! - 致命：根文件不可读、缺少 `[General]` 段、缺少 `MinVersion` 键
//! - 可恢复：未知前缀、未知键、格式错误的范围 → 诊断后继续
//! - 重名定义：后者覆盖前者，产生警告诊断
//!
//! ## 模块结构
//!
//! - `helpers`: 声明式键的解析函数
//! - `steps`: 行为键流（动作表、Case 块、消息组）
//! - `assignments`: 作业 / 惩罚 / 许可 / 汇报 / 坦白
//! - `interaction`: 状态 / 过程 / 指令 / 定时器 / 弹窗 / 问题 / 标志 / 服装类型

mod assignments;
pub(crate) mod helpers;
mod interaction;
mod steps;

#[cfg(test)]
mod tests;

use std::path::Path;

use crate::diagnostic::Diagnostic;
use crate::error::ParseError;
use crate::script::defs::{CompiledScript, GeneralInfo};
use crate::script::section::{self, Section, SectionMap};

pub use steps::action_kind_for;

/// 当前运行时的脚本语言版本
pub const SCRIPT_VERSION: &str = "1.0";

/// 编译结果
#[derive(Debug, Clone)]
pub struct CompileResult {
    /// 编译后的脚本（只读程序）
    pub script: CompiledScript,
    /// 编译期诊断（警告 / 信息，永不包含致命错误）
    pub diagnostics: Vec<Diagnostic>,
}

/// 从文件加载并编译脚本
pub fn load(path: &Path) -> Result<CompileResult, ParseError> {
    let map = section::read_file(path).map_err(|reason| ParseError::UnreadableFile {
        path: path.display().to_string(),
        reason,
    })?;
    compile(&map)
}

/// 从字符串加载并编译脚本（测试与宿主内嵌脚本用）
pub fn load_str(text: &str) -> Result<CompileResult, ParseError> {
    compile(&section::read_str(text))
}

/// 编译段映射
///
/// 同一 `SectionMap` 编译两次产生结构相同的 `CompiledScript`（确定性；
/// 编译期没有任何随机选择）。
pub fn compile(map: &SectionMap) -> Result<CompileResult, ParseError> {
    let mut diagnostics = map.diagnostics.clone();

    // [General] 与 MinVersion 是硬性要求
    let general_section = map.get("general").ok_or(ParseError::MissingGeneral)?;
    let min_version = general_section
        .last("minversion")
        .ok_or(ParseError::MissingMinVersion)?
        .to_string();
    check_version(&min_version, &mut diagnostics)?;

    let mut script = CompiledScript {
        general: GeneralInfo {
            min_version,
            title: general_section.last("title").unwrap_or_default().to_string(),
            sub_name: general_section
                .last("subname")
                .unwrap_or_default()
                .to_string(),
        },
        ..CompiledScript::default()
    };

    for sec in map.iter_ordered() {
        if sec.name == "general" {
            continue;
        }
        compile_section(&mut script, sec, &mut diagnostics);
    }

    Ok(CompileResult {
        script,
        diagnostics,
    })
}

/// 版本检查：脚本要求的版本高于运行时则拒绝加载
fn check_version(min_version: &str, diagnostics: &mut Vec<Diagnostic>) -> Result<(), ParseError> {
    match (min_version.parse::<f64>(), SCRIPT_VERSION.parse::<f64>()) {
        (Ok(required), Ok(current)) => {
            if required > current {
                return Err(ParseError::VersionTooNew {
                    required: min_version.to_string(),
                    current: SCRIPT_VERSION.to_string(),
                });
            }
        }
        _ => {
            diagnostics.push(
                Diagnostic::warn(format!("MinVersion '{}' 无法解析，跳过版本检查", min_version))
                    .in_section("general"),
            );
        }
    }
    Ok(())
}

/// 按前缀分派单个段
fn compile_section(script: &mut CompiledScript, sec: &Section, diagnostics: &mut Vec<Diagnostic>) {
    let Some((prefix, name)) = sec.name.split_once('-') else {
        diagnostics.push(
            Diagnostic::info(format!("段 '[{}]' 没有已知前缀，被忽略", sec.name))
                .in_section(&sec.name),
        );
        return;
    };
    let name = name.to_string();

    macro_rules! insert {
        ($table:expr, $def:expr) => {{
            if $table.insert(name.clone(), $def).is_some() {
                diagnostics.push(
                    Diagnostic::warn(format!("重复定义 '{}'，后者覆盖前者", sec.name))
                        .in_section(&sec.name),
                );
            }
        }};
    }

    match prefix {
        "status" => insert!(
            script.statuses,
            interaction::compile_status(sec, &name, diagnostics)
        ),
        "job" => insert!(script.jobs, assignments::compile_job(sec, &name, diagnostics)),
        "punishment" => insert!(
            script.punishments,
            assignments::compile_punishment(sec, &name, diagnostics)
        ),
        "permission" => insert!(
            script.permissions,
            assignments::compile_permission(sec, &name, diagnostics)
        ),
        "report" => insert!(
            script.reports,
            assignments::compile_report(sec, &name, diagnostics)
        ),
        "confession" => insert!(
            script.confessions,
            assignments::compile_confession(sec, &name, diagnostics)
        ),
        "procedure" => insert!(
            script.procedures,
            interaction::compile_procedure(sec, &name, diagnostics)
        ),
        // instruction- 与 clothing- 共用指令编译器
        "instruction" | "clothing" => insert!(
            script.instructions,
            interaction::compile_instruction(sec, &name, diagnostics)
        ),
        "set" => insert!(
            script.instruction_sets,
            interaction::compile_instruction_set(sec, &name, diagnostics)
        ),
        "choice" => insert!(
            script.choices,
            interaction::compile_choice(sec, &name, diagnostics)
        ),
        "timer" => insert!(
            script.timers,
            interaction::compile_timer(sec, &name, diagnostics)
        ),
        "popup" => insert!(
            script.popups,
            interaction::compile_popup(sec, &name, diagnostics)
        ),
        "popupgroup" => insert!(
            script.popup_groups,
            interaction::compile_popup_group(sec, &name, diagnostics)
        ),
        "question" => insert!(
            script.questions,
            interaction::compile_question(sec, &name, diagnostics)
        ),
        "flag" => insert!(
            script.flag_defs,
            interaction::compile_flag(sec, &name, diagnostics)
        ),
        "clothtype" => insert!(
            script.clothing_types,
            interaction::compile_clothing_type(sec, &name, diagnostics)
        ),
        _ => {
            diagnostics.push(
                Diagnostic::info(format!("未知段前缀 '{}'，段被忽略", prefix))
                    .in_section(&sec.name),
            );
        }
    }
}
