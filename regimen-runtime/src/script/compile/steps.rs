//! # 行为键编译
//!
//! 把段条目流中的行为键按文件顺序编译为 [`Step`] 列表。
//!
//! ## 职责
//!
//! - 键 → [`ActionKind`] 的映射表
//! - `Case=<mode>` … `Case=End` 块的提取（支持嵌套）
//! - `Select=` / `Message=` 消息组的聚合
//!
//! 同一个键（如 `If`）可以多次出现，效果取决于它在流中的位置，
//! 因此这里绝不去重、绝不重排。

use crate::diagnostic::Diagnostic;
use crate::script::defs::{
    Action, ActionKind, Branch, BranchTag, CaseBlock, MessageGroup, SelectMode, Step,
};

/// 行为键映射表
///
/// 返回 `None` 表示该键不是动作键（可能是声明式键或未知键）。
pub fn action_kind_for(key: &str) -> Option<ActionKind> {
    use ActionKind::*;
    let kind = match key {
        // 标志
        "setflag" => SetFlag,
        "removeflag" => RemoveFlag,
        "toggleflag" => ToggleFlag,
        "flagtext" => FlagText,
        "addflaggroup" => AddFlagGroup,
        "removeflaggroup" => RemoveFlagGroup,
        // 计数器
        "set#" => SetCounter,
        "add#" => AddCounter,
        "subtract#" => SubtractCounter,
        "multiply#" => MultiplyCounter,
        "divide#" => DivideCounter,
        "random#" => RandomCounter,
        "input#" => InputCounter,
        // 字符串
        "set$" => SetString,
        "append$" => AppendString,
        "input$" => InputString,
        // 时间
        "set!" => SetTime,
        "add!" => AddTime,
        "subtract!" => SubtractTime,
        "input!" => InputTime,
        // 列表
        "set*" => SetList,
        "add*" => AddList,
        "push*" => PushList,
        "pop*" => PopList,
        "remove*" => RemoveList,
        "clear*" => ClearList,
        "pick*" => PickList,
        // 条件门
        "if" => If,
        "notif" => NotIf,
        // 过程
        "procedure" => ProcedureCall,
        // 显示
        "notify" => Notify,
        "popup" => Popup,
        "question" => Question,
        "instruction" => ShowInstruction,
        "instructionset" => ShowInstructionSet,
        "choice" => ShowChoice,
        // 状态
        "newstatus" => NewStatus,
        "previousstatus" => PreviousStatus,
        // 积分
        "addmerits" => AddMerits,
        "subtractmerits" => SubtractMerits,
        "setmerits" => SetMerits,
        // 任务控制
        "punish" => Punish,
        "assignjob" => AssignJob,
        "assignpunishment" => AssignPunishment,
        "start" => StartAssignment,
        "markdone" => MarkDone,
        "abort" => AbortAssignment,
        "delete" => DeleteAssignment,
        "remind" => Remind,
        "extenddeadline" => ExtendDeadline,
        // 服装
        "clothing" => ClothingWear,
        "removeclothing" => ClothingRemove,
        "checkclothing" => ClothingCheck,
        // 外部协作者
        "takepicture" => TakePicture,
        "sendmail" => SendMail,
        "signin" => SignIn,
        // 定时器
        "enabletimer" => EnableTimer,
        "disabletimer" => DisableTimer,
        "resettimer" => ResetTimer,
        // 其他
        "dumpvariables" => DumpVariables,
        _ => return None,
    };
    Some(kind)
}

/// 分支标签键映射
fn branch_tag_for(key: &str) -> Option<BranchTag> {
    let tag = match key {
        "when" => BranchTag::When,
        "whennot" => BranchTag::WhenNot,
        "whenall" => BranchTag::WhenAll,
        "whennotall" => BranchTag::WhenNotAll,
        "whenany" => BranchTag::WhenAny,
        "whennone" => BranchTag::WhenNone,
        "whenrandom" => BranchTag::WhenRandom,
        _ => return None,
    };
    Some(tag)
}

/// 构造中的 Case 块
struct CaseBuilder {
    mode: SelectMode,
    branches: Vec<Branch>,
    current: Option<Branch>,
}

impl CaseBuilder {
    fn new(mode: SelectMode) -> Self {
        Self {
            mode,
            branches: Vec::new(),
            current: None,
        }
    }

    fn open_branch(&mut self, tag: BranchTag, value: &str) {
        self.close_branch();
        let conditions = match tag {
            BranchTag::WhenRandom => Vec::new(),
            BranchTag::WhenAll | BranchTag::WhenNotAll | BranchTag::WhenAny | BranchTag::WhenNone => {
                value
                    .split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            }
            BranchTag::When | BranchTag::WhenNot => vec![value.trim().to_string()],
        };
        self.current = Some(Branch {
            tag,
            conditions,
            body: Vec::new(),
        });
    }

    fn close_branch(&mut self) {
        if let Some(branch) = self.current.take() {
            self.branches.push(branch);
        }
    }

    fn finish(mut self) -> CaseBlock {
        self.close_branch();
        CaseBlock {
            mode: self.mode,
            branches: self.branches,
        }
    }
}

/// 行为步骤收集器
///
/// 按文件顺序接收 `(key, value)` 条目，维护 Case 嵌套栈与当前消息组。
pub struct StepCollector {
    root: Vec<Step>,
    stack: Vec<CaseBuilder>,
    pending_messages: Option<MessageGroup>,
    section: String,
}

impl StepCollector {
    pub fn new(section: impl Into<String>) -> Self {
        Self {
            root: Vec::new(),
            stack: Vec::new(),
            pending_messages: None,
            section: section.into(),
        }
    }

    /// 尝试消费一个条目；返回 false 表示该键不属于行为流
    pub fn offer(&mut self, key: &str, value: &str, diagnostics: &mut Vec<Diagnostic>) -> bool {
        // Case 块开启 / 结束
        if key == "case" {
            self.flush_messages();
            if value.trim().eq_ignore_ascii_case("end") {
                match self.stack.pop() {
                    Some(builder) => {
                        let block = builder.finish();
                        self.push_step(Step::Case(block));
                    }
                    None => diagnostics.push(
                        Diagnostic::warn("多余的 Case=End").in_section(&self.section),
                    ),
                }
            } else {
                self.stack.push(CaseBuilder::new(SelectMode::parse(value)));
            }
            return true;
        }

        // 分支标签
        if let Some(tag) = branch_tag_for(key) {
            self.flush_messages();
            match self.stack.last_mut() {
                Some(builder) => builder.open_branch(tag, value),
                None => diagnostics.push(
                    Diagnostic::warn(format!("Case 块外出现分支标签 '{}'", key))
                        .in_section(&self.section),
                ),
            }
            return true;
        }

        // 消息组
        if key == "select" {
            self.flush_messages();
            self.pending_messages = Some(MessageGroup {
                mode: SelectMode::parse(value),
                lines: Vec::new(),
            });
            return true;
        }
        if key == "message" {
            match &mut self.pending_messages {
                Some(group) => group.lines.push(value.to_string()),
                // 没有 Select 前缀的消息构成单行组
                None => {
                    self.pending_messages = Some(MessageGroup {
                        mode: SelectMode::All,
                        lines: vec![value.to_string()],
                    });
                }
            }
            return true;
        }

        // 普通动作
        if let Some(kind) = action_kind_for(key) {
            self.flush_messages();
            self.push_step(Step::Action(Action::new(kind, value)));
            return true;
        }

        false
    }

    /// 完成收集
    pub fn finish(mut self, diagnostics: &mut Vec<Diagnostic>) -> Vec<Step> {
        self.flush_messages();
        // 未闭合的 Case 块在段尾隐式闭合
        while let Some(builder) = self.stack.pop() {
            diagnostics.push(
                Diagnostic::warn("Case 块未以 Case=End 结束").in_section(&self.section),
            );
            let block = builder.finish();
            self.push_step(Step::Case(block));
        }
        self.root
    }

    fn flush_messages(&mut self) {
        if let Some(group) = self.pending_messages.take() {
            self.push_step(Step::Messages(group));
        }
    }

    /// 把步骤放进最内层容器：当前分支体，否则根列表
    fn push_step(&mut self, step: Step) {
        if let Some(builder) = self.stack.last_mut() {
            match &mut builder.current {
                Some(branch) => branch.body.push(step),
                // 第一个分支标签之前的语句挂到一个隐式 WhenRandom 分支
                None => {
                    builder.current = Some(Branch {
                        tag: BranchTag::WhenRandom,
                        conditions: Vec::new(),
                        body: vec![step],
                    });
                }
            }
        } else {
            self.root.push(step);
        }
    }
}
