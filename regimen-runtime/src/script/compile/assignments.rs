//! # 任务类定义的编译
//!
//! 作业、惩罚、许可、汇报、坦白共享"积分变动 + 行为键流"的编译骨架；
//! 作业与惩罚额外携带 [`AssignmentBehavior`] 组件。
//!
//! 声明式字段允许被后续同键条目覆盖（取最后一次出现），
//! 行为键严格按文件顺序进入步骤流。

use crate::diagnostic::Diagnostic;
use crate::script::compile::helpers::{parse_bool, parse_i64, parse_name_list, parse_range};
use crate::script::compile::steps::StepCollector;
use crate::script::defs::{
    AssignmentBehavior, ConfessionDef, JobDef, PermissionDef, PunishmentDef, Range, ReportDef,
    ValueUnit,
};
use crate::script::section::Section;

/// 尝试把条目解析为 [`AssignmentBehavior`] 的声明式键
///
/// 返回 true 表示条目已被消费。
fn offer_behavior(
    behavior: &mut AssignmentBehavior,
    key: &str,
    value: &str,
    section: &Section,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    match key {
        "meritadd" => assign_i64(&mut behavior.merit_add, key, value, section, diagnostics),
        "meritsubtract" => {
            assign_i64(&mut behavior.merit_subtract, key, value, section, diagnostics)
        }
        "longrunning" => assign_bool(&mut behavior.long_running, key, value, section, diagnostics),
        "muststart" => assign_bool(&mut behavior.must_start, key, value, section, diagnostics),
        "interruptable" => {
            assign_bool(&mut behavior.interruptable, key, value, section, diagnostics)
        }
        "deleteallowed" => {
            assign_bool(&mut behavior.delete_allowed, key, value, section, diagnostics)
        }
        "resources" => {
            behavior.resources = parse_name_list(value);
        }
        "deadline" => assign_opt_i64(&mut behavior.deadline_minutes, key, value, section, diagnostics),
        "remindinterval" => {
            assign_opt_i64(&mut behavior.remind_minutes, key, value, section, diagnostics)
        }
        "startprocedure" => behavior.start_procedure = some_name(value),
        "announceprocedure" => behavior.announce_procedure = some_name(value),
        "doneprocedure" => behavior.done_procedure = some_name(value),
        "abortprocedure" => behavior.abort_procedure = some_name(value),
        "beforedeleteprocedure" => behavior.before_delete_procedure = some_name(value),
        _ => return false,
    }
    true
}

fn some_name(value: &str) -> Option<String> {
    let value = value.trim().to_lowercase();
    if value.is_empty() { None } else { Some(value) }
}

fn assign_i64(
    field: &mut i64,
    key: &str,
    value: &str,
    section: &Section,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match parse_i64(value) {
        Some(v) => *field = v,
        None => diagnostics.push(
            Diagnostic::warn(format!("键 '{}' 的值 '{}' 不是整数", key, value))
                .in_section(&section.name),
        ),
    }
}

fn assign_opt_i64(
    field: &mut Option<i64>,
    key: &str,
    value: &str,
    section: &Section,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match parse_i64(value) {
        Some(v) => *field = Some(v),
        None => diagnostics.push(
            Diagnostic::warn(format!("键 '{}' 的值 '{}' 不是整数", key, value))
                .in_section(&section.name),
        ),
    }
}

fn assign_bool(
    field: &mut bool,
    key: &str,
    value: &str,
    section: &Section,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match parse_bool(value) {
        Some(v) => *field = v,
        None => diagnostics.push(
            Diagnostic::warn(format!("键 '{}' 的值 '{}' 不是布尔值", key, value))
                .in_section(&section.name),
        ),
    }
}

fn unknown_key(key_display: &str, section: &Section, diagnostics: &mut Vec<Diagnostic>) {
    diagnostics.push(
        Diagnostic::info(format!("未知键 '{}' 被忽略", key_display)).in_section(&section.name),
    );
}

/// 编译 `job-` 段
pub fn compile_job(section: &Section, name: &str, diagnostics: &mut Vec<Diagnostic>) -> JobDef {
    let mut def = JobDef {
        name: name.to_string(),
        title: name.to_string(),
        group: None,
        behavior: AssignmentBehavior {
            // 作业默认可被打断
            interruptable: true,
            ..AssignmentBehavior::default()
        },
        body: Vec::new(),
    };
    let mut collector = StepCollector::new(&section.name);

    for entry in &section.entries {
        match entry.key.as_str() {
            "title" => def.title = entry.value.clone(),
            "group" => def.group = some_name(&entry.value),
            _ => {
                if offer_behavior(&mut def.behavior, &entry.key, &entry.value, section, diagnostics)
                    || collector.offer(&entry.key, &entry.value, diagnostics)
                {
                    continue;
                }
                unknown_key(&entry.display_key, section, diagnostics);
            }
        }
    }

    def.body = collector.finish(diagnostics);
    def
}

/// 编译 `punishment-` 段
pub fn compile_punishment(
    section: &Section,
    name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> PunishmentDef {
    let mut def = PunishmentDef {
        name: name.to_string(),
        title: name.to_string(),
        group: None,
        behavior: AssignmentBehavior::default(),
        value: 1,
        value_unit: ValueUnit::default(),
        amount: Range::new(1, 100),
        body: Vec::new(),
    };
    let mut collector = StepCollector::new(&section.name);

    for entry in &section.entries {
        match entry.key.as_str() {
            "title" => def.title = entry.value.clone(),
            "group" => def.group = some_name(&entry.value),
            "value" => {
                match parse_i64(&entry.value) {
                    // 除数不可为 0
                    Some(v) if v != 0 => def.value = v,
                    _ => diagnostics.push(
                        Diagnostic::warn(format!("Value '{}' 无效", entry.value))
                            .in_section(&section.name),
                    ),
                }
            }
            "valueunit" => def.value_unit = ValueUnit::parse(&entry.value),
            "amount" => match parse_range(&entry.value) {
                Some(r) => def.amount = r,
                None => diagnostics.push(
                    Diagnostic::warn(format!("Amount 范围 '{}' 无效", entry.value))
                        .in_section(&section.name),
                ),
            },
            _ => {
                if offer_behavior(&mut def.behavior, &entry.key, &entry.value, section, diagnostics)
                    || collector.offer(&entry.key, &entry.value, diagnostics)
                {
                    continue;
                }
                unknown_key(&entry.display_key, section, diagnostics);
            }
        }
    }

    def.body = collector.finish(diagnostics);
    def
}

/// 编译 `permission-` 段
pub fn compile_permission(
    section: &Section,
    name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> PermissionDef {
    let mut def = PermissionDef {
        name: name.to_string(),
        title: name.to_string(),
        min_merits: None,
        percent: Range::new(100, 100),
        merit_add: 0,
        merit_subtract: 0,
        body: Vec::new(),
    };
    let mut collector = StepCollector::new(&section.name);

    for entry in &section.entries {
        match entry.key.as_str() {
            "title" => def.title = entry.value.clone(),
            "minmerits" => {
                assign_opt_i64(&mut def.min_merits, "minmerits", &entry.value, section, diagnostics)
            }
            "percent" => match parse_range(&entry.value) {
                Some(r) => def.percent = r,
                None => diagnostics.push(
                    Diagnostic::warn(format!("Percent 范围 '{}' 无效", entry.value))
                        .in_section(&section.name),
                ),
            },
            "meritadd" => assign_i64(&mut def.merit_add, "meritadd", &entry.value, section, diagnostics),
            "meritsubtract" => assign_i64(
                &mut def.merit_subtract,
                "meritsubtract",
                &entry.value,
                section,
                diagnostics,
            ),
            _ => {
                if collector.offer(&entry.key, &entry.value, diagnostics) {
                    continue;
                }
                unknown_key(&entry.display_key, section, diagnostics);
            }
        }
    }

    def.body = collector.finish(diagnostics);
    def
}

/// 编译 `report-` 段
pub fn compile_report(section: &Section, name: &str, diagnostics: &mut Vec<Diagnostic>) -> ReportDef {
    let (title, merit_add, merit_subtract, body) = compile_merit_body(section, name, diagnostics);
    ReportDef {
        name: name.to_string(),
        title,
        merit_add,
        merit_subtract,
        body,
    }
}

/// 编译 `confession-` 段
pub fn compile_confession(
    section: &Section,
    name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> ConfessionDef {
    let (title, merit_add, merit_subtract, body) = compile_merit_body(section, name, diagnostics);
    ConfessionDef {
        name: name.to_string(),
        title,
        merit_add,
        merit_subtract,
        body,
    }
}

/// 汇报 / 坦白共用的编译骨架
fn compile_merit_body(
    section: &Section,
    name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> (String, i64, i64, Vec<crate::script::defs::Step>) {
    let mut title = name.to_string();
    let mut merit_add = 0i64;
    let mut merit_subtract = 0i64;
    let mut collector = StepCollector::new(&section.name);

    for entry in &section.entries {
        match entry.key.as_str() {
            "title" => title = entry.value.clone(),
            "meritadd" => assign_i64(&mut merit_add, "meritadd", &entry.value, section, diagnostics),
            "meritsubtract" => assign_i64(
                &mut merit_subtract,
                "meritsubtract",
                &entry.value,
                section,
                diagnostics,
            ),
            _ => {
                if collector.offer(&entry.key, &entry.value, diagnostics) {
                    continue;
                }
                unknown_key(&entry.display_key, section, diagnostics);
            }
        }
    }

    (title, merit_add, merit_subtract, collector.finish(diagnostics))
}
