//! # Defs 模块
//!
//! 定义编译器的输出：脚本的结构化表示。
//!
//! ## 设计说明
//!
//! 定义（Definition）在脚本加载时一次性创建，之后只读；
//! 运行时状态（[`crate::state::SessionState`]）与定义严格分离。
//!
//! 声明式键写入类型化字段；行为键按文件顺序编译为 [`Step`] 列表，
//! 顺序承载语义（`SetFlag` 之后的 `If` 必须看到更新后的标志）。

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 选择策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectMode {
    /// 全部执行 / 全部显示
    All,
    /// 只取第一个符合条件的
    First,
    /// 均匀随机取一个
    Random,
}

impl SelectMode {
    /// 从脚本取值解析；无法识别时回退为 `All`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "first" => Self::First,
            "random" => Self::Random,
            _ => Self::All,
        }
    }
}

/// 闭合的数值范围（`Min,Max`；单值时 min=max）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub min: i64,
    pub max: i64,
}

impl Range {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// 单值范围
    pub fn single(value: i64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// 把数值钳制进范围
    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.min, self.max)
    }
}

/// 一天内的活动时间窗（`Start,End`，格式 HH:MM）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    /// 时刻是否落在窗口内（闭区间；支持跨午夜窗口）
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= t && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }
}

/// 动作种类
///
/// 闭合枚举：编译器只会产出这里列出的种类，未知键在编译期被跳过。
/// 解释器对暂不支持的种类按无操作处理（见 `runtime::interpreter`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    // ── 标志 ──
    /// `SetFlag=name[,duration_minutes]`
    SetFlag,
    /// `RemoveFlag=name`
    RemoveFlag,
    /// `ToggleFlag=name`
    ToggleFlag,
    /// `FlagText=name,text`
    FlagText,
    /// `AddFlagGroup=name,group`
    AddFlagGroup,
    /// `RemoveFlagGroup=group`（移除组内全部标志）
    RemoveFlagGroup,

    // ── 计数器 ──
    /// `Set#=name,amount`
    SetCounter,
    /// `Add#=name,amount`
    AddCounter,
    /// `Subtract#=name,amount`
    SubtractCounter,
    /// `Multiply#=name,amount`
    MultiplyCounter,
    /// `Divide#=name,amount`（除数为 0 时无操作）
    DivideCounter,
    /// `Random#=name,min,max`
    RandomCounter,
    /// `Input#=name[,prompt]`
    InputCounter,

    // ── 字符串 ──
    /// `Set$=name,value`
    SetString,
    /// `Append$=name,value`
    AppendString,
    /// `Input$=name[,prompt]`
    InputString,

    // ── 时间 ──
    /// `Set!=name,value`（`now`、`+分钟数` 或日期时间字面量）
    SetTime,
    /// `Add!=name,minutes`
    AddTime,
    /// `Subtract!=name,minutes`
    SubtractTime,
    /// `Input!=name[,prompt]`
    InputTime,

    // ── 列表 ──
    /// `Set*=name,a,b,c`
    SetList,
    /// `Add*=name,item`（去重追加）
    AddList,
    /// `Push*=name,item`（无条件追加）
    PushList,
    /// `Pop*=name[,target]`（弹出末尾，可存入字符串变量）
    PopList,
    /// `Remove*=name,item`
    RemoveList,
    /// `Clear*=name`
    ClearList,
    /// `Pick*=name,target`（随机取一个元素存入字符串变量）
    PickList,

    // ── 条件门 ──
    /// `If=condition`
    If,
    /// `NotIf=condition`
    NotIf,

    // ── 过程 ──
    /// `Procedure=name`（递归执行过程定义）
    ProcedureCall,

    // ── 显示 ──
    /// `Notify=text`（不参与消息分组的直接消息）
    Notify,
    /// `Popup=name`（弹窗或弹窗组）
    Popup,
    /// `Question=name`
    Question,
    /// `Instruction=name`
    ShowInstruction,
    /// `InstructionSet=name`
    ShowInstructionSet,
    /// `Choice=name`
    ShowChoice,

    // ── 状态 ──
    /// `NewStatus=name`
    NewStatus,
    /// `PreviousStatus=`
    PreviousStatus,

    // ── 积分 ──
    /// `AddMerits=amount`
    AddMerits,
    /// `SubtractMerits=amount`
    SubtractMerits,
    /// `SetMerits=amount`
    SetMerits,

    // ── 任务控制 ──
    /// `Punish=severity[,name]`（未给名时随机挑选惩罚定义）
    Punish,
    /// `AssignJob=name[,deadline_minutes]`
    AssignJob,
    /// `AssignPunishment=name,severity`
    AssignPunishment,
    /// `Start=kind,name`
    StartAssignment,
    /// `MarkDone=kind,name`
    MarkDone,
    /// `Abort=kind,name`
    AbortAssignment,
    /// `Delete=kind,name`
    DeleteAssignment,
    /// `Remind=kind,name`
    Remind,
    /// `ExtendDeadline=kind,name,minutes`
    ExtendDeadline,

    // ── 服装 ──
    /// `Clothing=name`
    ClothingWear,
    /// `RemoveClothing=name`
    ClothingRemove,
    /// `CheckClothing=name`
    ClothingCheck,

    // ── 外部协作者 ──
    /// `TakePicture=prefix`
    TakePicture,
    /// `SendMail=subject[,body]`
    SendMail,
    /// `SignIn=`
    SignIn,

    // ── 定时器 ──
    /// `EnableTimer=name`
    EnableTimer,
    /// `DisableTimer=name`
    DisableTimer,
    /// `ResetTimer=name`
    ResetTimer,

    // ── 其他 ──
    /// `DumpVariables=target`（把字符串变量转储文本写入字符串变量）
    DumpVariables,
}

/// 一条有序的、有副作用的指令
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// 动作种类
    pub kind: ActionKind,
    /// 脚本中的原始取值（操作数在执行时才解析）
    pub raw_value: String,
}

impl Action {
    pub fn new(kind: ActionKind, raw_value: impl Into<String>) -> Self {
        Self {
            kind,
            raw_value: raw_value.into(),
        }
    }
}

/// 消息组
///
/// `Select=All|First|Random` 开启一个消息组，
/// 其后的 `Message=` 行归入该组直到下一个 `Select` 或段尾。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageGroup {
    pub mode: SelectMode,
    pub lines: Vec<String>,
}

/// 分支标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchTag {
    /// 单条件成立
    When,
    /// 单条件不成立
    WhenNot,
    /// 全部条件成立
    WhenAll,
    /// 并非全部条件成立
    WhenNotAll,
    /// 任一条件成立
    WhenAny,
    /// 所有条件都不成立
    WhenNone,
    /// 永远符合条件（参与随机选择）
    WhenRandom,
}

/// Case 块中的一个分支
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub tag: BranchTag,
    /// 条件表达式；多条件标签的键值为逗号分隔的条件列表
    pub conditions: Vec<String>,
    /// 分支语句（顺序执行，支持嵌套 Case）
    pub body: Vec<Step>,
}

/// `Case=<mode>` … `Case=End` 结构化条件块
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseBlock {
    pub mode: SelectMode,
    pub branches: Vec<Branch>,
}

/// 行为列表中的一个步骤
///
/// Case 块与消息组在编译期提升为结构化节点，其余键保持扁平动作。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    Action(Action),
    Case(CaseBlock),
    Messages(MessageGroup),
}

/// 作业 / 惩罚共享的"任务行为"组件
///
/// 以值的形式嵌入 [`JobDef`] / [`PunishmentDef`]，不做继承。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentBehavior {
    /// 完成时增加的积分
    pub merit_add: i64,
    /// 过期 / 中止时扣除的积分
    pub merit_subtract: i64,
    /// 长期任务（完成前必须显式开始）
    pub long_running: bool,
    /// 必须先开始才能标记完成
    pub must_start: bool,
    /// 执行中可被其他任务打断
    pub interruptable: bool,
    /// 允许删除
    pub delete_allowed: bool,
    /// 占用的资源令牌（小写）；活动实例间不允许重叠
    pub resources: Vec<String>,
    /// 显式截止间隔（分钟）；缺省时截止为当天 23:59:59
    pub deadline_minutes: Option<i64>,
    /// 提醒间隔（分钟）
    pub remind_minutes: Option<i64>,
    /// 生命周期钩子过程
    pub start_procedure: Option<String>,
    pub announce_procedure: Option<String>,
    pub done_procedure: Option<String>,
    pub abort_procedure: Option<String>,
    pub before_delete_procedure: Option<String>,
}

/// 惩罚量纲
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueUnit {
    /// 一次性（amount = max(min, 1)，与严重度无关）
    Once,
    /// 分钟
    Minute,
    /// 小时
    Hour,
    /// 天
    Day,
    /// 抽象单位（写行数、次数等）
    #[default]
    Unit,
}

impl ValueUnit {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "once" => Self::Once,
            "minute" | "minutes" => Self::Minute,
            "hour" | "hours" => Self::Hour,
            "day" | "days" => Self::Day,
            _ => Self::Unit,
        }
    }

    /// 是否是基于真实时间的量纲
    pub fn is_time_based(&self) -> bool {
        matches!(self, Self::Minute | Self::Hour | Self::Day)
    }
}

/// 状态定义（`status-` 前缀）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDef {
    pub name: String,
    pub title: String,
    /// 进入该状态所需的积分范围
    pub merits: Option<Range>,
    /// 进入状态时执行的动作
    pub body: Vec<Step>,
}

/// 作业定义（`job-` 前缀）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDef {
    pub name: String,
    pub title: String,
    pub group: Option<String>,
    pub behavior: AssignmentBehavior,
    /// 分派时执行的动作
    pub body: Vec<Step>,
}

/// 惩罚定义（`punishment-` 前缀）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunishmentDef {
    pub name: String,
    pub title: String,
    pub group: Option<String>,
    pub behavior: AssignmentBehavior,
    /// 严重度换算：amount = round(severity / value)
    pub value: i64,
    pub value_unit: ValueUnit,
    /// 单实例数量的钳制范围
    pub amount: Range,
    pub body: Vec<Step>,
}

/// 许可定义（`permission-` 前缀）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDef {
    pub name: String,
    pub title: String,
    /// 申请许可所需的最低积分
    pub min_merits: Option<i64>,
    /// 批准概率范围（百分比）
    pub percent: Range,
    /// 积分变动（批准时结算）
    pub merit_add: i64,
    pub merit_subtract: i64,
    /// 批准时执行的动作
    pub body: Vec<Step>,
}

/// 汇报定义（`report-` 前缀）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDef {
    pub name: String,
    pub title: String,
    pub merit_add: i64,
    pub merit_subtract: i64,
    pub body: Vec<Step>,
}

/// 坦白定义（`confession-` 前缀）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfessionDef {
    pub name: String,
    pub title: String,
    pub merit_add: i64,
    pub merit_subtract: i64,
    pub body: Vec<Step>,
}

/// 过程定义（`procedure-` 前缀）：纯动作列表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureDef {
    pub name: String,
    pub body: Vec<Step>,
}

/// 指令定义（`instruction-` / `clothing-` 前缀）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionDef {
    pub name: String,
    pub title: String,
    pub group: Option<String>,
    /// 服装指令关联的服装类型
    pub clothtype: Option<String>,
    pub body: Vec<Step>,
}

/// 指令集定义（`set-` 前缀）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionSetDef {
    pub name: String,
    pub title: String,
    pub mode: SelectMode,
    /// 成员指令名（小写）
    pub members: Vec<String>,
}

/// 选择项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// 选项显示文本
    pub text: String,
    /// 选中后执行的动作
    pub body: Vec<Step>,
}

/// 选择定义（`choice-` 前缀；由 `instruction-` 族扩展）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceDef {
    pub name: String,
    pub title: String,
    pub options: Vec<ChoiceOption>,
}

/// 定时器定义（`timer-` 前缀）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerDef {
    pub name: String,
    /// 触发间隔（分钟范围，按"居中随机"抽取）
    pub interval: Range,
    /// 活动时间窗；缺省为全天
    pub window: Option<TimeWindow>,
    /// 默认是否启用
    pub enabled: bool,
    pub body: Vec<Step>,
}

/// 弹窗定义（`popup-` 前缀）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupDef {
    pub name: String,
    pub title: String,
    pub text: String,
    /// 参与弹窗组加权随机的权重
    pub weight: i64,
    pub body: Vec<Step>,
}

/// 弹窗组定义（`popupgroup-` 前缀）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupGroupDef {
    pub name: String,
    pub mode: SelectMode,
    pub members: Vec<String>,
}

/// 问题的一个答案块
///
/// `Answer=text` 开启答案块，其后的行为键归入该块。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerBlock {
    pub text: String,
    pub body: Vec<Step>,
}

/// 问题定义（`question-` 前缀）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDef {
    pub name: String,
    pub text: String,
    pub answers: Vec<AnswerBlock>,
}

/// 标志预定义（`flag-` 前缀）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagDef {
    pub name: String,
    pub groups: Vec<String>,
    pub text: String,
    /// 默认过期时长（分钟）
    pub expiry_minutes: Option<i64>,
}

/// 服装类型定义（`clothtype-` 前缀）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClothingTypeDef {
    pub name: String,
    pub title: String,
    pub group: Option<String>,
}

/// `[General]` 段的元信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralInfo {
    /// 脚本要求的最低运行时版本
    pub min_version: String,
    pub title: String,
    /// 称呼（`$zzSubName` 伪变量的来源）
    pub sub_name: String,
}

/// 编译后的脚本（只读"程序"）
///
/// 各定义表使用 `BTreeMap` 保证确定性顺序：
/// 同一文本编译两次产生结构相同的结果。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledScript {
    pub general: GeneralInfo,
    pub statuses: BTreeMap<String, StatusDef>,
    pub jobs: BTreeMap<String, JobDef>,
    pub punishments: BTreeMap<String, PunishmentDef>,
    pub permissions: BTreeMap<String, PermissionDef>,
    pub reports: BTreeMap<String, ReportDef>,
    pub confessions: BTreeMap<String, ConfessionDef>,
    pub procedures: BTreeMap<String, ProcedureDef>,
    pub instructions: BTreeMap<String, InstructionDef>,
    pub instruction_sets: BTreeMap<String, InstructionSetDef>,
    pub choices: BTreeMap<String, ChoiceDef>,
    pub timers: BTreeMap<String, TimerDef>,
    pub popups: BTreeMap<String, PopupDef>,
    pub popup_groups: BTreeMap<String, PopupGroupDef>,
    pub questions: BTreeMap<String, QuestionDef>,
    pub flag_defs: BTreeMap<String, FlagDef>,
    pub clothing_types: BTreeMap<String, ClothingTypeDef>,
}

impl CompiledScript {
    /// 按名取过程定义（名字大小写不敏感）
    pub fn procedure(&self, name: &str) -> Option<&ProcedureDef> {
        self.procedures.get(&name.to_lowercase())
    }

    /// 定义总数（诊断显示用）
    pub fn definition_count(&self) -> usize {
        self.statuses.len()
            + self.jobs.len()
            + self.punishments.len()
            + self.permissions.len()
            + self.reports.len()
            + self.confessions.len()
            + self.procedures.len()
            + self.instructions.len()
            + self.instruction_sets.len()
            + self.choices.len()
            + self.timers.len()
            + self.popups.len()
            + self.popup_groups.len()
            + self.questions.len()
            + self.flag_defs.len()
            + self.clothing_types.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_single_duplicates() {
        let r = Range::single(5);
        assert_eq!(r.min, 5);
        assert_eq!(r.max, 5);
        assert_eq!(r.clamp(10), 5);
        assert_eq!(r.clamp(-1), 5);
    }

    #[test]
    fn test_time_window_contains() {
        let w = TimeWindow {
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
        };
        assert!(w.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(23, 0, 0).unwrap()));

        // 跨午夜窗口
        let night = TimeWindow {
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        };
        assert!(night.contains(NaiveTime::from_hms_opt(23, 30, 0).unwrap()));
        assert!(night.contains(NaiveTime::from_hms_opt(5, 0, 0).unwrap()));
        assert!(!night.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn test_select_mode_parse() {
        assert_eq!(SelectMode::parse("First"), SelectMode::First);
        assert_eq!(SelectMode::parse("RANDOM"), SelectMode::Random);
        assert_eq!(SelectMode::parse("all"), SelectMode::All);
        // 无法识别时回退为 All
        assert_eq!(SelectMode::parse("什么"), SelectMode::All);
    }

    #[test]
    fn test_value_unit() {
        assert_eq!(ValueUnit::parse("once"), ValueUnit::Once);
        assert_eq!(ValueUnit::parse("Hours"), ValueUnit::Hour);
        assert!(ValueUnit::Minute.is_time_based());
        assert!(!ValueUnit::Once.is_time_based());
        assert!(!ValueUnit::Unit.is_time_based());
    }
}
