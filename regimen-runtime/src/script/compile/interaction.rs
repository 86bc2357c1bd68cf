//! # 交互类定义的编译
//!
//! 状态、过程、指令（含服装指令）、指令集、选择、定时器、
//! 弹窗 / 弹窗组、问题、标志预定义、服装类型。
//!
//! 问题与选择使用与 Case 块同型的"块提取"：`Answer=` / `Option=`
//! 在条目流中开启新块，其后的行为键归入该块。

use crate::diagnostic::Diagnostic;
use crate::script::compile::helpers::{
    parse_bool, parse_i64, parse_name_list, parse_range, parse_time_window,
};
use crate::script::compile::steps::StepCollector;
use crate::script::defs::{
    AnswerBlock, ChoiceDef, ChoiceOption, ClothingTypeDef, FlagDef, InstructionDef,
    InstructionSetDef, PopupDef, PopupGroupDef, ProcedureDef, QuestionDef, Range, SelectMode,
    StatusDef, TimerDef,
};
use crate::script::section::Section;

fn unknown_key(key_display: &str, section: &Section, diagnostics: &mut Vec<Diagnostic>) {
    diagnostics.push(
        Diagnostic::info(format!("未知键 '{}' 被忽略", key_display)).in_section(&section.name),
    );
}

/// 编译 `status-` 段
pub fn compile_status(section: &Section, name: &str, diagnostics: &mut Vec<Diagnostic>) -> StatusDef {
    let mut def = StatusDef {
        name: name.to_string(),
        title: name.to_string(),
        merits: None,
        body: Vec::new(),
    };
    let mut collector = StepCollector::new(&section.name);

    for entry in &section.entries {
        match entry.key.as_str() {
            "title" => def.title = entry.value.clone(),
            "merits" => match parse_range(&entry.value) {
                Some(r) => def.merits = Some(r),
                None => diagnostics.push(
                    Diagnostic::warn(format!("Merits 范围 '{}' 无效", entry.value))
                        .in_section(&section.name),
                ),
            },
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

/// 编译 `procedure-` 段：全部条目都是行为键
pub fn compile_procedure(
    section: &Section,
    name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> ProcedureDef {
    let mut collector = StepCollector::new(&section.name);
    for entry in &section.entries {
        if !collector.offer(&entry.key, &entry.value, diagnostics) {
            unknown_key(&entry.display_key, section, diagnostics);
        }
    }
    ProcedureDef {
        name: name.to_string(),
        body: collector.finish(diagnostics),
    }
}

/// 编译 `instruction-` / `clothing-` 段
pub fn compile_instruction(
    section: &Section,
    name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> InstructionDef {
    let mut def = InstructionDef {
        name: name.to_string(),
        title: name.to_string(),
        group: None,
        clothtype: None,
        body: Vec::new(),
    };
    let mut collector = StepCollector::new(&section.name);

    for entry in &section.entries {
        match entry.key.as_str() {
            "title" => def.title = entry.value.clone(),
            "group" => def.group = non_empty_lower(&entry.value),
            "clothtype" => def.clothtype = non_empty_lower(&entry.value),
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

/// 编译 `set-` 段
pub fn compile_instruction_set(
    section: &Section,
    name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> InstructionSetDef {
    let mut def = InstructionSetDef {
        name: name.to_string(),
        title: name.to_string(),
        mode: SelectMode::All,
        members: Vec::new(),
    };

    for entry in &section.entries {
        match entry.key.as_str() {
            "title" => def.title = entry.value.clone(),
            "select" => def.mode = SelectMode::parse(&entry.value),
            // 成员既可逐条写 `Member=`，也可逗号列表
            "member" | "members" => def.members.extend(parse_name_list(&entry.value)),
            _ => unknown_key(&entry.display_key, section, diagnostics),
        }
    }

    def
}

/// 编译 `choice-` 段
///
/// `Option=text` 开启一个选项块，其后的行为键归入该选项。
pub fn compile_choice(section: &Section, name: &str, diagnostics: &mut Vec<Diagnostic>) -> ChoiceDef {
    let mut def = ChoiceDef {
        name: name.to_string(),
        title: name.to_string(),
        options: Vec::new(),
    };
    let mut current: Option<(String, StepCollector)> = None;

    for entry in &section.entries {
        match entry.key.as_str() {
            "title" if current.is_none() => def.title = entry.value.clone(),
            "option" => {
                if let Some((text, collector)) = current.take() {
                    def.options.push(ChoiceOption {
                        text,
                        body: collector.finish(diagnostics),
                    });
                }
                current = Some((entry.value.clone(), StepCollector::new(&section.name)));
            }
            _ => match &mut current {
                Some((_, collector)) => {
                    if !collector.offer(&entry.key, &entry.value, diagnostics) {
                        unknown_key(&entry.display_key, section, diagnostics);
                    }
                }
                None => unknown_key(&entry.display_key, section, diagnostics),
            },
        }
    }

    if let Some((text, collector)) = current.take() {
        def.options.push(ChoiceOption {
            text,
            body: collector.finish(diagnostics),
        });
    }

    def
}

/// 编译 `timer-` 段
pub fn compile_timer(section: &Section, name: &str, diagnostics: &mut Vec<Diagnostic>) -> TimerDef {
    let mut def = TimerDef {
        name: name.to_string(),
        interval: Range::single(60),
        window: None,
        enabled: true,
        body: Vec::new(),
    };
    let mut collector = StepCollector::new(&section.name);

    for entry in &section.entries {
        match entry.key.as_str() {
            "interval" => match parse_range(&entry.value) {
                Some(r) => def.interval = r,
                None => diagnostics.push(
                    Diagnostic::warn(format!("Interval 范围 '{}' 无效", entry.value))
                        .in_section(&section.name),
                ),
            },
            "window" => match parse_time_window(&entry.value) {
                Some(w) => def.window = Some(w),
                None => diagnostics.push(
                    Diagnostic::warn(format!("Window '{}' 无效（应为 HH:MM,HH:MM）", entry.value))
                        .in_section(&section.name),
                ),
            },
            "enabled" => {
                if let Some(v) = parse_bool(&entry.value) {
                    def.enabled = v;
                }
            }
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

/// 编译 `popup-` 段
pub fn compile_popup(section: &Section, name: &str, diagnostics: &mut Vec<Diagnostic>) -> PopupDef {
    let mut def = PopupDef {
        name: name.to_string(),
        title: name.to_string(),
        text: String::new(),
        weight: 1,
        body: Vec::new(),
    };
    let mut collector = StepCollector::new(&section.name);

    for entry in &section.entries {
        match entry.key.as_str() {
            "title" => def.title = entry.value.clone(),
            "text" => def.text = entry.value.clone(),
            "weight" => match parse_i64(&entry.value) {
                Some(v) if v > 0 => def.weight = v,
                _ => diagnostics.push(
                    Diagnostic::warn(format!("Weight '{}' 无效", entry.value))
                        .in_section(&section.name),
                ),
            },
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

/// 编译 `popupgroup-` 段
pub fn compile_popup_group(
    section: &Section,
    name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> PopupGroupDef {
    let mut def = PopupGroupDef {
        name: name.to_string(),
        mode: SelectMode::Random,
        members: Vec::new(),
    };

    for entry in &section.entries {
        match entry.key.as_str() {
            "select" => def.mode = SelectMode::parse(&entry.value),
            "member" | "members" => def.members.extend(parse_name_list(&entry.value)),
            _ => unknown_key(&entry.display_key, section, diagnostics),
        }
    }

    def
}

/// 编译 `question-` 段
///
/// `Answer=text` 开启一个答案块，其后的行为键归入该块。
pub fn compile_question(
    section: &Section,
    name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> QuestionDef {
    let mut def = QuestionDef {
        name: name.to_string(),
        text: String::new(),
        answers: Vec::new(),
    };
    let mut current: Option<(String, StepCollector)> = None;

    for entry in &section.entries {
        match entry.key.as_str() {
            "text" if current.is_none() => def.text = entry.value.clone(),
            "answer" => {
                if let Some((text, collector)) = current.take() {
                    def.answers.push(AnswerBlock {
                        text,
                        body: collector.finish(diagnostics),
                    });
                }
                current = Some((entry.value.clone(), StepCollector::new(&section.name)));
            }
            _ => match &mut current {
                Some((_, collector)) => {
                    if !collector.offer(&entry.key, &entry.value, diagnostics) {
                        unknown_key(&entry.display_key, section, diagnostics);
                    }
                }
                None => unknown_key(&entry.display_key, section, diagnostics),
            },
        }
    }

    if let Some((text, collector)) = current.take() {
        def.answers.push(AnswerBlock {
            text,
            body: collector.finish(diagnostics),
        });
    }

    def
}

/// 编译 `flag-` 段
pub fn compile_flag(section: &Section, name: &str, diagnostics: &mut Vec<Diagnostic>) -> FlagDef {
    let mut def = FlagDef {
        name: name.to_string(),
        groups: Vec::new(),
        text: String::new(),
        expiry_minutes: None,
    };

    for entry in &section.entries {
        match entry.key.as_str() {
            "groups" | "group" => def.groups.extend(parse_name_list(&entry.value)),
            "text" => def.text = entry.value.clone(),
            "expiry" => match parse_i64(&entry.value) {
                Some(v) => def.expiry_minutes = Some(v),
                None => diagnostics.push(
                    Diagnostic::warn(format!("Expiry '{}' 无效", entry.value))
                        .in_section(&section.name),
                ),
            },
            _ => unknown_key(&entry.display_key, section, diagnostics),
        }
    }

    def
}

/// 编译 `clothtype-` 段
pub fn compile_clothing_type(
    section: &Section,
    name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> ClothingTypeDef {
    let mut def = ClothingTypeDef {
        name: name.to_string(),
        title: name.to_string(),
        group: None,
    };

    for entry in &section.entries {
        match entry.key.as_str() {
            "title" => def.title = entry.value.clone(),
            "group" => def.group = non_empty_lower(&entry.value),
            _ => unknown_key(&entry.display_key, section, diagnostics),
        }
    }

    def
}

fn non_empty_lower(value: &str) -> Option<String> {
    let value = value.trim().to_lowercase();
    if value.is_empty() { None } else { Some(value) }
}
