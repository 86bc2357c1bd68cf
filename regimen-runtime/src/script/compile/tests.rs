//! # 编译器测试
//!
//! 覆盖前缀分派、致命错误、行为键顺序、Case 块提取、消息组与重名覆盖。

use super::*;
use crate::diagnostic::DiagnosticLevel;
use crate::script::defs::{ActionKind, BranchTag, SelectMode, Step, ValueUnit};

fn compile_ok(text: &str) -> CompileResult {
    load_str(text).expect("脚本应当编译成功")
}

const MINIMAL: &str = "[General]\nMinVersion=1.0\n";

// -------------------------------------------------------------------------
// 致命错误
// -------------------------------------------------------------------------

#[test]
fn test_missing_general_is_fatal() {
    let err = load_str("[job-a]\nTitle=x\n").unwrap_err();
    assert_eq!(err, ParseError::MissingGeneral);
}

#[test]
fn test_missing_min_version_is_fatal() {
    let err = load_str("[General]\nTitle=x\n").unwrap_err();
    assert_eq!(err, ParseError::MissingMinVersion);
}

#[test]
fn test_version_too_new_is_fatal() {
    let err = load_str("[General]\nMinVersion=99.0\n").unwrap_err();
    assert!(matches!(err, ParseError::VersionTooNew { .. }));
}

#[test]
fn test_no_definitions_on_failure() {
    // 加载失败时不产出任何定义
    assert!(load_str("[job-a]\nTitle=x\n").is_err());
}

#[test]
fn test_unparseable_version_warns_but_loads() {
    let result = compile_ok("[General]\nMinVersion=banana\n");
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.level == DiagnosticLevel::Warn));
}

// -------------------------------------------------------------------------
// 前缀分派与重名
// -------------------------------------------------------------------------

#[test]
fn test_prefix_dispatch() {
    let text = format!(
        "{MINIMAL}\
         [status-new]\nTitle=新人\n\
         [job-dishes]\nTitle=洗碗\n\
         [punishment-lines]\nTitle=抄写\n\
         [permission-tv]\nTitle=看电视\n\
         [report-daily]\nTitle=日报\n\
         [confession-late]\nTitle=迟到\n\
         [procedure-wakeup]\nNotify=起床\n\
         [instruction-posture]\nTitle=姿势\n\
         [clothing-socks]\nTitle=袜子\n\
         [set-morning]\nMember=posture\n\
         [choice-supper]\nOption=米饭\n\
         [timer-random]\nInterval=30,60\n\
         [popup-praise]\nText=做得好\n\
         [popupgroup-any]\nMember=praise\n\
         [question-mood]\nText=心情如何？\nAnswer=好\n\
         [flag-grounded]\nText=禁足中\n\
         [clothtype-underwear]\nTitle=内衣\n"
    );
    let result = compile_ok(&text);
    let s = &result.script;
    assert_eq!(s.statuses.len(), 1);
    assert_eq!(s.jobs.len(), 1);
    assert_eq!(s.punishments.len(), 1);
    assert_eq!(s.permissions.len(), 1);
    assert_eq!(s.reports.len(), 1);
    assert_eq!(s.confessions.len(), 1);
    assert_eq!(s.procedures.len(), 1);
    // instruction- 与 clothing- 都进入指令表
    assert_eq!(s.instructions.len(), 2);
    assert_eq!(s.instruction_sets.len(), 1);
    assert_eq!(s.choices.len(), 1);
    assert_eq!(s.timers.len(), 1);
    assert_eq!(s.popups.len(), 1);
    assert_eq!(s.popup_groups.len(), 1);
    assert_eq!(s.questions.len(), 1);
    assert_eq!(s.flag_defs.len(), 1);
    assert_eq!(s.clothing_types.len(), 1);
    assert_eq!(s.definition_count(), 17);
}

#[test]
fn test_duplicate_definition_overwrites_with_warning() {
    let text = format!("{MINIMAL}[job-a]\nTitle=第一个\n[job-a]\nTitle=第二个\n");
    let result = compile_ok(&text);
    // 同一段重开属于追加，不算重名；这里验证追加后 Title 取最后值
    assert_eq!(result.script.jobs["a"].title, "第二个");
}

#[test]
fn test_colliding_names_across_prefixes_warn() {
    // instruction- 与 clothing- 共用指令表，重名触发覆盖警告
    let text = format!("{MINIMAL}[instruction-x]\nTitle=甲\n[clothing-x]\nTitle=乙\n");
    let result = compile_ok(&text);
    assert_eq!(result.script.instructions["x"].title, "乙");
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.level == DiagnosticLevel::Warn && d.message.contains("重复定义")));
}

#[test]
fn test_unknown_prefix_and_key_are_ignored() {
    let text = format!("{MINIMAL}[widget-x]\nFoo=1\n[job-a]\nFrobnicate=yes\n");
    let result = compile_ok(&text);
    assert!(result.script.jobs.contains_key("a"));
    let infos: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| d.level == DiagnosticLevel::Info)
        .collect();
    assert!(infos.len() >= 2);
}

#[test]
fn test_section_names_case_insensitive() {
    let text = format!("{MINIMAL}[Job-Dishes]\nTitle=洗碗\n");
    let result = compile_ok(&text);
    assert!(result.script.jobs.contains_key("dishes"));
}

// -------------------------------------------------------------------------
// 行为键流
// -------------------------------------------------------------------------

#[test]
fn test_action_order_preserved() {
    let text = format!(
        "{MINIMAL}[procedure-p]\n\
         SetFlag=ready\n\
         If=ready\n\
         Add#=score,1\n\
         If=#score>0\n\
         Notify=完成\n"
    );
    let result = compile_ok(&text);
    let body = &result.script.procedures["p"].body;
    let kinds: Vec<ActionKind> = body
        .iter()
        .map(|s| match s {
            Step::Action(a) => a.kind,
            _ => panic!("应当全是扁平动作"),
        })
        .collect();
    // 同一个键（If）多次出现，位置保留
    assert_eq!(
        kinds,
        vec![
            ActionKind::SetFlag,
            ActionKind::If,
            ActionKind::AddCounter,
            ActionKind::If,
            ActionKind::Notify,
        ]
    );
}

#[test]
fn test_message_groups() {
    let text = format!(
        "{MINIMAL}[procedure-p]\n\
         Select=Random\n\
         Message=一\n\
         Message=二\n\
         Select=All\n\
         Message=三\n\
         SetFlag=done\n"
    );
    let result = compile_ok(&text);
    let body = &result.script.procedures["p"].body;
    assert_eq!(body.len(), 3);
    match &body[0] {
        Step::Messages(g) => {
            assert_eq!(g.mode, SelectMode::Random);
            assert_eq!(g.lines, vec!["一", "二"]);
        }
        other => panic!("期望消息组，得到 {:?}", other),
    }
    match &body[1] {
        Step::Messages(g) => {
            assert_eq!(g.mode, SelectMode::All);
            assert_eq!(g.lines, vec!["三"]);
        }
        other => panic!("期望消息组，得到 {:?}", other),
    }
    assert!(matches!(&body[2], Step::Action(a) if a.kind == ActionKind::SetFlag));
}

#[test]
fn test_bare_message_forms_single_line_group() {
    let text = format!("{MINIMAL}[procedure-p]\nMessage=独行\n");
    let result = compile_ok(&text);
    let body = &result.script.procedures["p"].body;
    assert!(matches!(&body[0], Step::Messages(g) if g.lines == vec!["独行"]));
}

// -------------------------------------------------------------------------
// Case 块
// -------------------------------------------------------------------------

#[test]
fn test_case_block_extraction() {
    let text = format!(
        "{MINIMAL}[procedure-p]\n\
         Case=First\n\
         When=#score>10\n\
         Notify=高分\n\
         WhenNot=grounded\n\
         Notify=自由\n\
         WhenRandom=\n\
         Notify=随便\n\
         Case=End\n\
         SetFlag=after\n"
    );
    let result = compile_ok(&text);
    let body = &result.script.procedures["p"].body;
    assert_eq!(body.len(), 2);
    let Step::Case(block) = &body[0] else {
        panic!("期望 Case 块");
    };
    assert_eq!(block.mode, SelectMode::First);
    assert_eq!(block.branches.len(), 3);
    assert_eq!(block.branches[0].tag, BranchTag::When);
    assert_eq!(block.branches[0].conditions, vec!["#score>10"]);
    assert_eq!(block.branches[0].body.len(), 1);
    assert_eq!(block.branches[1].tag, BranchTag::WhenNot);
    assert_eq!(block.branches[2].tag, BranchTag::WhenRandom);
    assert!(block.branches[2].conditions.is_empty());
    assert!(matches!(&body[1], Step::Action(a) if a.kind == ActionKind::SetFlag));
}

#[test]
fn test_nested_case_blocks() {
    let text = format!(
        "{MINIMAL}[procedure-p]\n\
         Case=All\n\
         When=outer\n\
         Case=Random\n\
         When=inner\n\
         Notify=里层\n\
         Case=End\n\
         Notify=外层\n\
         Case=End\n"
    );
    let result = compile_ok(&text);
    let body = &result.script.procedures["p"].body;
    assert_eq!(body.len(), 1);
    let Step::Case(outer) = &body[0] else {
        panic!("期望外层 Case 块");
    };
    assert_eq!(outer.branches.len(), 1);
    let branch = &outer.branches[0];
    assert_eq!(branch.body.len(), 2);
    assert!(matches!(&branch.body[0], Step::Case(inner) if inner.mode == SelectMode::Random));
}

#[test]
fn test_multi_condition_tags_split_on_comma() {
    let text = format!(
        "{MINIMAL}[procedure-p]\n\
         Case=All\n\
         WhenAll=#a>1,#b>2\n\
         Notify=都满足\n\
         Case=End\n"
    );
    let result = compile_ok(&text);
    let Step::Case(block) = &result.script.procedures["p"].body[0] else {
        panic!();
    };
    assert_eq!(block.branches[0].conditions, vec!["#a>1", "#b>2"]);
}

#[test]
fn test_unterminated_case_closes_with_warning() {
    let text = format!("{MINIMAL}[procedure-p]\nCase=First\nWhen=x\nNotify=好\n");
    let result = compile_ok(&text);
    assert!(matches!(&result.script.procedures["p"].body[0], Step::Case(_)));
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("Case")));
}

// -------------------------------------------------------------------------
// 任务类定义
// -------------------------------------------------------------------------

#[test]
fn test_job_fields() {
    let text = format!(
        "{MINIMAL}[job-dishes]\n\
         Title=洗碗\n\
         Group=厨房\n\
         MeritAdd=10\n\
         MeritSubtract=15\n\
         LongRunning=yes\n\
         MustStart=yes\n\
         Interruptable=no\n\
         DeleteAllowed=yes\n\
         Resources=hands,sink\n\
         Deadline=120\n\
         RemindInterval=30\n\
         StartProcedure=announce\n\
         DoneProcedure=cleanup\n"
    );
    let result = compile_ok(&text);
    let job = &result.script.jobs["dishes"];
    assert_eq!(job.title, "洗碗");
    assert_eq!(job.group.as_deref(), Some("厨房"));
    let b = &job.behavior;
    assert_eq!(b.merit_add, 10);
    // MeritSubtract 必须写入 subtract 字段
    assert_eq!(b.merit_subtract, 15);
    assert!(b.long_running);
    assert!(b.must_start);
    assert!(!b.interruptable);
    assert!(b.delete_allowed);
    assert_eq!(b.resources, vec!["hands", "sink"]);
    assert_eq!(b.deadline_minutes, Some(120));
    assert_eq!(b.remind_minutes, Some(30));
    assert_eq!(b.start_procedure.as_deref(), Some("announce"));
    assert_eq!(b.done_procedure.as_deref(), Some("cleanup"));
}

#[test]
fn test_job_defaults() {
    let text = format!("{MINIMAL}[job-a]\nTitle=x\n");
    let result = compile_ok(&text);
    let b = &result.script.jobs["a"].behavior;
    // 作业默认可被打断、不允许删除、无显式截止
    assert!(b.interruptable);
    assert!(!b.delete_allowed);
    assert!(b.deadline_minutes.is_none());
}

#[test]
fn test_punishment_fields() {
    let text = format!(
        "{MINIMAL}[punishment-lines]\n\
         Title=抄写\n\
         Value=10\n\
         ValueUnit=unit\n\
         Amount=1,20\n\
         MeritSubtract=5\n"
    );
    let result = compile_ok(&text);
    let p = &result.script.punishments["lines"];
    assert_eq!(p.value, 10);
    assert_eq!(p.value_unit, ValueUnit::Unit);
    assert_eq!((p.amount.min, p.amount.max), (1, 20));
    assert_eq!(p.behavior.merit_subtract, 5);
    // 惩罚默认不可打断
    assert!(!p.behavior.interruptable);
}

#[test]
fn test_punishment_rejects_zero_value() {
    let text = format!("{MINIMAL}[punishment-p]\nValue=0\n");
    let result = compile_ok(&text);
    // Value=0 被拒绝，保留默认 1
    assert_eq!(result.script.punishments["p"].value, 1);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.level == DiagnosticLevel::Warn));
}

#[test]
fn test_permission_fields() {
    let text = format!(
        "{MINIMAL}[permission-tv]\n\
         Title=看电视\n\
         MinMerits=50\n\
         Percent=20,80\n\
         MeritSubtract=5\n\
         Notify=已批准\n"
    );
    let result = compile_ok(&text);
    let p = &result.script.permissions["tv"];
    assert_eq!(p.min_merits, Some(50));
    assert_eq!((p.percent.min, p.percent.max), (20, 80));
    assert_eq!(p.merit_subtract, 5);
    assert_eq!(p.body.len(), 1);
}

#[test]
fn test_declarative_range_single_value() {
    let text = format!("{MINIMAL}[status-mid]\nMerits=40\n");
    let result = compile_ok(&text);
    let r = result.script.statuses["mid"].merits.unwrap();
    assert_eq!((r.min, r.max), (40, 40));
}

#[test]
fn test_declarative_field_last_occurrence_wins() {
    let text = format!("{MINIMAL}[job-a]\nMeritAdd=1\nMeritAdd=7\n");
    let result = compile_ok(&text);
    assert_eq!(result.script.jobs["a"].behavior.merit_add, 7);
}

// -------------------------------------------------------------------------
// 交互类定义
// -------------------------------------------------------------------------

#[test]
fn test_question_answer_blocks() {
    let text = format!(
        "{MINIMAL}[question-mood]\n\
         Text=心情如何？\n\
         Answer=好\n\
         AddMerits=5\n\
         Answer=不好\n\
         SubtractMerits=5\n\
         Notify=加油\n"
    );
    let result = compile_ok(&text);
    let q = &result.script.questions["mood"];
    assert_eq!(q.text, "心情如何？");
    assert_eq!(q.answers.len(), 2);
    assert_eq!(q.answers[0].text, "好");
    assert_eq!(q.answers[0].body.len(), 1);
    assert_eq!(q.answers[1].body.len(), 2);
}

#[test]
fn test_choice_option_blocks() {
    let text = format!(
        "{MINIMAL}[choice-supper]\n\
         Title=晚饭\n\
         Option=米饭\n\
         SetFlag=rice\n\
         Option=面条\n\
         SetFlag=noodles\n"
    );
    let result = compile_ok(&text);
    let c = &result.script.choices["supper"];
    assert_eq!(c.title, "晚饭");
    assert_eq!(c.options.len(), 2);
    assert_eq!(c.options[1].text, "面条");
}

#[test]
fn test_timer_fields() {
    let text = format!(
        "{MINIMAL}[timer-nag]\n\
         Interval=15,45\n\
         Window=08:00,22:00\n\
         Enabled=no\n\
         Notify=别偷懒\n"
    );
    let result = compile_ok(&text);
    let t = &result.script.timers["nag"];
    assert_eq!((t.interval.min, t.interval.max), (15, 45));
    assert!(t.window.is_some());
    assert!(!t.enabled);
    assert_eq!(t.body.len(), 1);
}

#[test]
fn test_flag_def() {
    let text = format!("{MINIMAL}[flag-grounded]\nGroups=restriction,mood\nText=禁足中\nExpiry=1440\n");
    let result = compile_ok(&text);
    let f = &result.script.flag_defs["grounded"];
    assert_eq!(f.groups, vec!["restriction", "mood"]);
    assert_eq!(f.expiry_minutes, Some(1440));
}

#[test]
fn test_popup_group_members() {
    let text = format!(
        "{MINIMAL}[popup-a]\nText=甲\nWeight=3\n[popup-b]\nText=乙\n[popupgroup-g]\nMember=a\nMember=b\n"
    );
    let result = compile_ok(&text);
    assert_eq!(result.script.popups["a"].weight, 3);
    assert_eq!(result.script.popup_groups["g"].members, vec!["a", "b"]);
}

// -------------------------------------------------------------------------
// 确定性
// -------------------------------------------------------------------------

#[test]
fn test_compile_is_deterministic() {
    let text = format!(
        "{MINIMAL}[job-b]\nTitle=乙\n[job-a]\nTitle=甲\nIf=x\nAdd#=n,1\n\
         [procedure-p]\nCase=Random\nWhen=x\nNotify=好\nCase=End\n"
    );
    let first = compile_ok(&text).script;
    let second = compile_ok(&text).script;
    // 两次编译结构完全相同（编译期无随机选择）
    assert_eq!(first, second);
}
