//! # Interpreter 模块
//!
//! 动作解释器：把一个定义的 [`Step`] 列表按声明顺序作用到会话状态上。
//!
//! ## 设计原则
//!
//! - **解释器不报错**：未知操作数、缺失定义、格式错误一律退化为默认值或无操作
//! - `If` / `NotIf` 维护一个门：门类动作永远被求值（可以重新打开门），
//!   其余动作在门关闭时跳过
//! - 过程调用与嵌套定义体递归执行，深度超过 [`MAX_PROCEDURE_DEPTH`] 时放弃
//! - 所有外部效果通过注入的 [`Environment`] 发出

use chrono::{Datelike, Duration, Timelike};

use crate::runtime::case;
use crate::runtime::env::Environment;
use crate::runtime::select;
use crate::script::compile::helpers::{parse_i64, split_first};
use crate::script::defs::{
    Action, ActionKind, CaseBlock, CompiledScript, MessageGroup, SelectMode, Step,
};
use crate::script::expr::{EvalContext, Timestamp, evaluate, format_timestamp, parse_timestamp};
use crate::state::{AssignmentKind, SessionState};

/// 递归深度上限：过程调用与嵌套定义体（弹窗、指令、状态、答案）
/// 共用同一个计数，超过后该层执行被放弃（无操作）
pub const MAX_PROCEDURE_DEPTH: usize = 16;

/// `SendMail` 动作的附件来源列表变量；发送后清空
pub const ATTACHMENTS_LIST: &str = "zzattachments";

/// 删除钩子用来否决删除的信号标志
pub const DENY_DELETE_FLAG: &str = "zzdenydelete";

/// 基于会话状态的求值上下文
///
/// `zz` 前缀的伪变量在这里解析，普通名字落回状态表。
pub struct StateContext<'a> {
    pub state: &'a SessionState,
    pub script: &'a CompiledScript,
    pub now: Timestamp,
}

impl StateContext<'_> {
    fn active_count(&self, kind: AssignmentKind) -> i64 {
        self.state
            .active_assignments()
            .filter(|a| a.kind == kind)
            .count() as i64
    }
}

impl EvalContext for StateContext<'_> {
    fn counter(&self, name: &str) -> f64 {
        match name.to_lowercase().as_str() {
            "zzmerits" => self.state.merits as f64,
            "zzjobsactive" => self.active_count(AssignmentKind::Job) as f64,
            "zzjobsoverdue" => self
                .state
                .active_assignments()
                .filter(|a| a.kind == AssignmentKind::Job && a.deadline < self.now)
                .count() as f64,
            "zzpunishmentsactive" => self.active_count(AssignmentKind::Punishment) as f64,
            "zzminute" => self.now.minute() as f64,
            "zzhour" => self.now.hour() as f64,
            "zzweekday" => self.now.weekday().number_from_monday() as f64,
            _ => self.state.counter(name) as f64,
        }
    }

    fn string_var(&self, name: &str) -> String {
        match name.to_lowercase().as_str() {
            "zzsubname" => self.script.general.sub_name.clone(),
            "zzstatus" => self.state.status.clone(),
            _ => self.state.string_var(name),
        }
    }

    fn time_var(&self, name: &str) -> Option<Timestamp> {
        match name.to_lowercase().as_str() {
            "zznow" => Some(self.now),
            "zzdate" => self.now.date().and_hms_opt(0, 0, 0),
            _ => self.state.time_var(name),
        }
    }

    fn has_flag(&self, name: &str) -> bool {
        self.state.has_flag(name)
    }
}

/// 动作解释器
///
/// 持有编译后的脚本（只读）、会话状态（可变）和外部协作者。
/// 生命周期操作（Assign / Start / Done / …）在 `runtime::assignments`
/// 中以同一类型的方法实现。
pub struct Interpreter<'a> {
    pub(crate) script: &'a CompiledScript,
    pub(crate) state: &'a mut SessionState,
    pub(crate) env: &'a mut Environment,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        script: &'a CompiledScript,
        state: &'a mut SessionState,
        env: &'a mut Environment,
    ) -> Self {
        Self {
            script,
            state,
            env,
            depth: 0,
        }
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.env.clock.now()
    }

    fn eval(&self, expr: &str) -> bool {
        let ctx = StateContext {
            state: self.state,
            script: self.script,
            now: self.env.clock.now(),
        };
        evaluate(expr, &ctx)
    }

    /// 按印记规则解析数值操作数；不可解析回退 0
    fn number_operand(&self, raw: &str) -> i64 {
        let raw = raw.trim();
        let ctx = StateContext {
            state: self.state,
            script: self.script,
            now: self.env.clock.now(),
        };
        if let Some(name) = raw.strip_prefix('#') {
            return ctx.counter(name).round() as i64;
        }
        if let Some(name) = raw.strip_prefix('$') {
            return ctx
                .string_var(name)
                .trim()
                .parse::<f64>()
                .map(|v| v.round() as i64)
                .unwrap_or(0);
        }
        parse_i64(raw).unwrap_or(0)
    }

    /// 按印记规则解析文本操作数；字面量原样返回
    fn text_operand(&self, raw: &str) -> String {
        let raw = raw.trim();
        let ctx = StateContext {
            state: self.state,
            script: self.script,
            now: self.env.clock.now(),
        };
        if let Some(name) = raw.strip_prefix('$') {
            return ctx.string_var(name);
        }
        if let Some(name) = raw.strip_prefix('#') {
            return crate::script::expr::format_number(ctx.counter(name));
        }
        if let Some(name) = raw.strip_prefix('!') {
            return ctx.time_var(name).map(format_timestamp).unwrap_or_default();
        }
        raw.to_string()
    }

    /// 解析时间操作数：`now`、`+分钟数`、`!变量` 或日期时间字面量
    fn time_operand(&self, raw: &str) -> Option<Timestamp> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("now") {
            return Some(self.now());
        }
        if let Some(mins) = raw.strip_prefix('+') {
            let mins = parse_i64(mins)?;
            return Some(self.now() + Duration::minutes(mins));
        }
        if let Some(name) = raw.strip_prefix('!') {
            return self.state.time_var(name);
        }
        parse_timestamp(raw)
    }

    /// 执行一段步骤列表
    ///
    /// 门状态是列表局部的：进入过程体、分支体时重新打开。
    pub fn run_steps(&mut self, steps: &[Step]) {
        let mut gate_open = true;
        for step in steps {
            match step {
                // 门类动作永远被求值，可以重新打开门
                Step::Action(a) if a.kind == ActionKind::If => {
                    gate_open = self.eval(&a.raw_value);
                }
                Step::Action(a) if a.kind == ActionKind::NotIf => {
                    gate_open = !self.eval(&a.raw_value);
                }
                _ if !gate_open => {}
                Step::Action(a) => self.run_action(a),
                Step::Case(block) => self.run_case(block),
                Step::Messages(group) => self.run_messages(group),
            }
        }
    }

    fn run_case(&mut self, block: &CaseBlock) {
        let picked = {
            let ctx = StateContext {
                state: self.state,
                script: self.script,
                now: self.env.clock.now(),
            };
            case::eligible_branches(block, &ctx, self.env.random.as_mut())
        };
        for branch in picked {
            self.run_steps(&branch.body);
        }
    }

    fn run_messages(&mut self, group: &MessageGroup) {
        let indices = select::dispatch(group.mode, self.env.random.as_mut(), group.lines.len());
        for i in indices {
            let text = group.lines[i].clone();
            self.env.presenter.message(&text);
        }
    }

    /// 递归执行过程定义；深度超限或定义缺失时无操作
    pub fn run_procedure(&mut self, name: &str) {
        if self.depth >= MAX_PROCEDURE_DEPTH {
            return;
        }
        let Some(def) = self.script.procedure(name) else {
            return;
        };
        self.depth += 1;
        self.run_steps(&def.body);
        self.depth -= 1;
    }

    /// 执行嵌套定义体（弹窗、指令、状态、答案、选项）；深度超限时放弃。
    /// 定义体可以再次引用自身，不设上限会栈溢出
    fn run_nested(&mut self, steps: &[Step]) {
        if self.depth >= MAX_PROCEDURE_DEPTH {
            return;
        }
        self.depth += 1;
        self.run_steps(steps);
        self.depth -= 1;
    }

    fn run_action(&mut self, action: &Action) {
        let value = action.raw_value.as_str();
        match action.kind {
            // 门类动作在 run_steps 中处理
            ActionKind::If | ActionKind::NotIf => {}

            // ── 标志 ──
            ActionKind::SetFlag => {
                let (name, rest) = split_first(value);
                if name.is_empty() {
                    return;
                }
                let now = self.now();
                let explicit = rest.and_then(parse_i64);
                // 显式时长优先，其次取标志预定义的默认过期时长
                let minutes = explicit.or_else(|| {
                    self.script
                        .flag_defs
                        .get(&name.to_lowercase())
                        .and_then(|d| d.expiry_minutes)
                });
                let expiry = minutes.map(|m| now + Duration::minutes(m));
                self.state.set_flag(name, now, expiry);
                if let Some(def) = self.script.flag_defs.get(&name.to_lowercase())
                    && let Some(entry) = self.state.flag_mut(name)
                {
                    if entry.groups.is_empty() {
                        entry.groups = def.groups.clone();
                    }
                    if entry.text.is_empty() {
                        entry.text = def.text.clone();
                    }
                }
            }
            ActionKind::RemoveFlag => self.state.remove_flag(value.trim()),
            ActionKind::ToggleFlag => {
                let name = value.trim();
                if self.state.has_flag(name) {
                    self.state.remove_flag(name);
                } else {
                    let now = self.now();
                    self.state.set_flag(name, now, None);
                }
            }
            ActionKind::FlagText => {
                let (name, rest) = split_first(value);
                let text = self.text_operand(rest.unwrap_or(""));
                if let Some(entry) = self.state.flag_mut(name) {
                    entry.text = text;
                }
            }
            ActionKind::AddFlagGroup => {
                let (name, rest) = split_first(value);
                let Some(group) = rest else { return };
                let group = group.to_lowercase();
                if let Some(entry) = self.state.flag_mut(name)
                    && !entry.groups.contains(&group)
                {
                    entry.groups.push(group);
                }
            }
            ActionKind::RemoveFlagGroup => self.state.remove_flag_group(value.trim()),

            // ── 计数器 ──
            ActionKind::SetCounter => {
                let (name, rest) = split_first(value);
                let amount = self.number_operand(rest.unwrap_or("0"));
                self.state.set_counter(name, amount);
            }
            ActionKind::AddCounter => {
                let (name, rest) = split_first(value);
                let amount = self.number_operand(rest.unwrap_or("0"));
                let base = self.state.counter(name);
                self.state.set_counter(name, base + amount);
            }
            ActionKind::SubtractCounter => {
                let (name, rest) = split_first(value);
                let amount = self.number_operand(rest.unwrap_or("0"));
                let base = self.state.counter(name);
                self.state.set_counter(name, base - amount);
            }
            ActionKind::MultiplyCounter => {
                let (name, rest) = split_first(value);
                let amount = self.number_operand(rest.unwrap_or("1"));
                let base = self.state.counter(name);
                self.state.set_counter(name, base * amount);
            }
            ActionKind::DivideCounter => {
                let (name, rest) = split_first(value);
                let amount = self.number_operand(rest.unwrap_or("1"));
                // 除数为 0 时无操作
                if amount != 0 {
                    let base = self.state.counter(name);
                    self.state.set_counter(name, base / amount);
                }
            }
            ActionKind::RandomCounter => {
                let (name, rest) = split_first(value);
                let Some(rest) = rest else { return };
                let (min, max) = split_first(rest);
                let min = self.number_operand(min);
                let max = max.map(|m| self.number_operand(m)).unwrap_or(min);
                let v = self.env.random.uniform(min.min(max), min.max(max));
                self.state.set_counter(name, v);
            }
            ActionKind::InputCounter => {
                let (name, rest) = split_first(value);
                let prompt = rest.unwrap_or(name).to_string();
                if let Some(v) = self.env.presenter.input_number(&prompt) {
                    self.state.set_counter(name, v);
                }
            }

            // ── 字符串 ──
            ActionKind::SetString => {
                let (name, rest) = split_first(value);
                let v = self.text_operand(rest.unwrap_or(""));
                self.state.set_string(name, v);
            }
            ActionKind::AppendString => {
                let (name, rest) = split_first(value);
                let suffix = self.text_operand(rest.unwrap_or(""));
                let mut v = self.state.string_var(name);
                v.push_str(&suffix);
                self.state.set_string(name, v);
            }
            ActionKind::InputString => {
                let (name, rest) = split_first(value);
                let prompt = rest.unwrap_or(name).to_string();
                if let Some(v) = self.env.presenter.input_text(&prompt) {
                    self.state.set_string(name, v);
                }
            }

            // ── 时间 ──
            ActionKind::SetTime => {
                let (name, rest) = split_first(value);
                if let Some(t) = self.time_operand(rest.unwrap_or("now")) {
                    self.state.set_time(name, t);
                }
            }
            ActionKind::AddTime => {
                let (name, rest) = split_first(value);
                let minutes = self.number_operand(rest.unwrap_or("0"));
                if let Some(t) = self.state.time_var(name) {
                    self.state.set_time(name, t + Duration::minutes(minutes));
                }
            }
            ActionKind::SubtractTime => {
                let (name, rest) = split_first(value);
                let minutes = self.number_operand(rest.unwrap_or("0"));
                if let Some(t) = self.state.time_var(name) {
                    self.state.set_time(name, t - Duration::minutes(minutes));
                }
            }
            ActionKind::InputTime => {
                let (name, rest) = split_first(value);
                let prompt = rest.unwrap_or(name).to_string();
                if let Some(text) = self.env.presenter.input_text(&prompt)
                    && let Some(t) = parse_timestamp(&text)
                {
                    self.state.set_time(name, t);
                }
            }

            // ── 列表 ──
            ActionKind::SetList => {
                let (name, rest) = split_first(value);
                let items: Vec<String> = rest
                    .map(|r| r.split(',').map(|p| p.trim().to_string()).collect())
                    .unwrap_or_default();
                *self.state.list_mut(name) = items;
            }
            ActionKind::AddList => {
                let (name, rest) = split_first(value);
                let Some(item) = rest else { return };
                let item = item.to_string();
                let list = self.state.list_mut(name);
                // 去重追加（大小写不敏感）
                if !list.iter().any(|e| e.eq_ignore_ascii_case(&item)) {
                    list.push(item);
                }
            }
            ActionKind::PushList => {
                let (name, rest) = split_first(value);
                let Some(item) = rest else { return };
                self.state.list_mut(name).push(item.to_string());
            }
            ActionKind::PopList => {
                let (name, rest) = split_first(value);
                if let Some(item) = self.state.list_mut(name).pop()
                    && let Some(target) = rest
                {
                    self.state.set_string(target, item);
                }
            }
            ActionKind::RemoveList => {
                let (name, rest) = split_first(value);
                let Some(item) = rest else { return };
                self.state
                    .list_mut(name)
                    .retain(|e| !e.eq_ignore_ascii_case(item));
            }
            ActionKind::ClearList => self.state.list_mut(value.trim()).clear(),
            ActionKind::PickList => {
                let (name, rest) = split_first(value);
                let Some(target) = rest else { return };
                let list = self.state.list(name);
                if let Some(i) = select::uniform_index(self.env.random.as_mut(), list.len()) {
                    self.state.set_string(target, list[i].clone());
                }
            }

            // ── 过程 ──
            ActionKind::ProcedureCall => self.run_procedure(value.trim()),

            // ── 显示 ──
            ActionKind::Notify => {
                let text = self.text_operand(value);
                self.env.presenter.message(&text);
            }
            ActionKind::Popup => self.show_popup(value.trim()),
            ActionKind::Question => self.show_question(value.trim()),
            ActionKind::ShowInstruction => self.show_instruction(value.trim()),
            ActionKind::ShowInstructionSet => self.show_instruction_set(value.trim()),
            ActionKind::ShowChoice => self.show_choice(value.trim()),

            // ── 状态 ──
            ActionKind::NewStatus => {
                let name = value.trim();
                self.state.push_status(name);
                if let Some(def) = self.script.statuses.get(&name.to_lowercase()) {
                    let body = def.body.clone();
                    self.run_nested(&body);
                }
            }
            ActionKind::PreviousStatus => {
                self.state.pop_status();
            }

            // ── 积分 ──
            ActionKind::AddMerits => {
                self.state.merits += self.number_operand(value);
            }
            ActionKind::SubtractMerits => {
                self.state.merits -= self.number_operand(value);
            }
            ActionKind::SetMerits => {
                self.state.merits = self.number_operand(value);
            }

            // ── 任务控制 ──
            // 生命周期方法定义在 runtime::assignments；
            // 被拒绝的操作在动作层面按无操作处理（解释器不报错）。
            ActionKind::Punish => {
                let (severity, rest) = split_first(value);
                let severity = self.number_operand(severity);
                let _ = self.punish(severity, rest);
            }
            ActionKind::AssignJob => {
                let (name, rest) = split_first(value);
                let deadline = rest.and_then(parse_i64);
                let _ = self.assign_job(name, deadline);
            }
            ActionKind::AssignPunishment => {
                let (name, rest) = split_first(value);
                let severity = rest.map(|r| self.number_operand(r)).unwrap_or(0);
                let _ = self.assign_punishment(name, severity);
            }
            ActionKind::StartAssignment => {
                if let Some((kind, name)) = parse_kind_name(value) {
                    let _ = self.start_assignment(kind, &name);
                }
            }
            ActionKind::MarkDone => {
                if let Some((kind, name)) = parse_kind_name(value) {
                    let _ = self.mark_done(kind, &name);
                }
            }
            ActionKind::AbortAssignment => {
                if let Some((kind, name)) = parse_kind_name(value) {
                    let _ = self.abort_assignment(kind, &name);
                }
            }
            ActionKind::DeleteAssignment => {
                if let Some((kind, name)) = parse_kind_name(value) {
                    let _ = self.delete_assignment(kind, &name);
                }
            }
            ActionKind::Remind => {
                if let Some((kind, name)) = parse_kind_name(value) {
                    self.remind(kind, &name);
                }
            }
            ActionKind::ExtendDeadline => {
                let (head, rest) = split_first(value);
                if let Some(rest) = rest
                    && let Some(kind) = AssignmentKind::parse(head)
                {
                    let (name, minutes) = split_first(rest);
                    let minutes = minutes.and_then(parse_i64).unwrap_or(0);
                    self.extend_deadline(kind, name, minutes);
                }
            }

            // ── 服装 ──
            ActionKind::ClothingWear => {
                let name = value.trim();
                let now = self.now();
                self.state.set_flag(&format!("wearing_{}", name.to_lowercase()), now, None);
                self.show_instruction(name);
            }
            ActionKind::ClothingRemove => {
                let name = value.trim().to_lowercase();
                self.state.remove_flag(&format!("wearing_{name}"));
            }
            ActionKind::ClothingCheck => {
                let name = value.trim();
                let title = self
                    .script
                    .instructions
                    .get(&name.to_lowercase())
                    .map(|d| d.title.clone())
                    .unwrap_or_else(|| name.to_string());
                let answers = vec!["yes".to_string(), "no".to_string()];
                // 否认穿着时撤掉 wearing 标志，由脚本自行追究
                if self.env.presenter.ask(&title, &answers) == Some(1) {
                    self.state
                        .remove_flag(&format!("wearing_{}", name.to_lowercase()));
                }
            }

            // ── 外部协作者 ──
            ActionKind::TakePicture => {
                let prefix = self.text_operand(value);
                self.env.camera.take_picture(&prefix);
            }
            ActionKind::SendMail => {
                let (subject, body) = split_first(value);
                let subject = self.text_operand(subject);
                let body = self.text_operand(body.unwrap_or(""));
                // 附件取自 zzAttachments 列表，发送后清空
                let attachments = self.state.list(ATTACHMENTS_LIST);
                if !attachments.is_empty() {
                    self.state.list_mut(ATTACHMENTS_LIST).clear();
                }
                self.env.mail.send(&subject, &attachments, &body);
            }
            ActionKind::SignIn => {
                let now = self.now();
                self.state.set_time("zzsignin", now);
            }

            // ── 定时器 ──
            ActionKind::EnableTimer => {
                self.state
                    .timer_overrides
                    .insert(value.trim().to_lowercase(), true);
            }
            ActionKind::DisableTimer => {
                self.state
                    .timer_overrides
                    .insert(value.trim().to_lowercase(), false);
            }
            ActionKind::ResetTimer => {
                // 清掉排程，下次 run_timers 重新抽间隔
                self.state.timer_next.remove(&value.trim().to_lowercase());
            }

            // ── 其他 ──
            ActionKind::DumpVariables => {
                let dump = crate::save::dump_variables(self.state);
                self.state.set_string(value.trim(), dump);
            }
        }
    }

    fn show_popup(&mut self, name: &str) {
        let key = name.to_lowercase();
        if let Some(def) = self.script.popups.get(&key) {
            let def = def.clone();
            self.env.presenter.message(&def.text);
            self.run_nested(&def.body);
            return;
        }
        // 弹窗组：Random 模式按权重抽取，其余按策略分发
        let Some(group) = self.script.popup_groups.get(&key).cloned() else {
            return;
        };
        let members: Vec<String> = group
            .members
            .iter()
            .filter(|m| self.script.popups.contains_key(*m))
            .cloned()
            .collect();
        let chosen: Vec<String> = match group.mode {
            SelectMode::Random => {
                let weights: Vec<i64> = members
                    .iter()
                    .map(|m| self.script.popups[m].weight)
                    .collect();
                select::weighted_index(self.env.random.as_mut(), &weights)
                    .map(|i| members[i].clone())
                    .into_iter()
                    .collect()
            }
            mode => select::dispatch(mode, self.env.random.as_mut(), members.len())
                .into_iter()
                .map(|i| members[i].clone())
                .collect(),
        };
        for member in chosen {
            self.show_popup(&member);
        }
    }

    fn show_question(&mut self, name: &str) {
        let Some(def) = self.script.questions.get(&name.to_lowercase()).cloned() else {
            return;
        };
        let answers: Vec<String> = def.answers.iter().map(|a| a.text.clone()).collect();
        if let Some(i) = self.env.presenter.ask(&def.text, &answers)
            && let Some(answer) = def.answers.get(i)
        {
            self.run_nested(&answer.body);
        }
    }

    fn show_instruction(&mut self, name: &str) {
        let Some(def) = self.script.instructions.get(&name.to_lowercase()).cloned() else {
            return;
        };
        if !def.title.is_empty() {
            self.env.presenter.message(&def.title);
        }
        self.run_nested(&def.body);
    }

    fn show_instruction_set(&mut self, name: &str) {
        let Some(def) = self.script.instruction_sets.get(&name.to_lowercase()).cloned() else {
            return;
        };
        let indices = select::dispatch(def.mode, self.env.random.as_mut(), def.members.len());
        for i in indices {
            let member = def.members[i].clone();
            self.show_instruction(&member);
        }
    }

    fn show_choice(&mut self, name: &str) {
        let Some(def) = self.script.choices.get(&name.to_lowercase()).cloned() else {
            return;
        };
        let texts: Vec<String> = def.options.iter().map(|o| o.text.clone()).collect();
        if let Some(i) = self.env.presenter.ask(&def.title, &texts)
            && let Some(option) = def.options.get(i)
        {
            self.run_nested(&option.body);
        }
    }
}

/// 解析 `kind,name` 形式的操作数
fn parse_kind_name(value: &str) -> Option<(AssignmentKind, String)> {
    let (head, rest) = split_first(value);
    let kind = AssignmentKind::parse(head)?;
    let name = rest?.to_lowercase();
    if name.is_empty() {
        return None;
    }
    Some((kind, name))
}
