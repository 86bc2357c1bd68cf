//! # Assignments 模块
//!
//! 任务实例的生命周期管理：分派、开始、完成、中止、删除与到期。
//!
//! ## 状态机
//!
//! `Assigned → Started → Done | Aborted | Deleted`，
//! 截止后从 Assigned / Started 隐式进入 `Expired` 终态。
//!
//! ## 策略拒绝
//!
//! 每个转换的前置条件不满足时返回 [`LifecycleError`]，
//! 被拒绝的操作**不改变任何状态**（删除钩子的副作用除外，
//! 钩子本身就是脚本代码）。

use chrono::Duration;

use crate::error::LifecycleError;
use crate::runtime::interpreter::{DENY_DELETE_FLAG, Interpreter};
use crate::runtime::select;
use crate::script::Timestamp;
use crate::script::defs::{AssignmentBehavior, PunishmentDef, ValueUnit};
use crate::state::{AssignmentInstance, AssignmentKind, AssignmentPhase};

/// 严重度换算为具体数量
///
/// `amount = round(severity / value)` 钳制进 `[min, max]`；
/// 总量超过 `max` 时按 `max` 分块，每块一个实例。
/// `value_unit = once` 时数量固定为 `max(min, 1)`，与严重度无关。
pub fn severity_to_amounts(severity: i64, def: &PunishmentDef) -> Vec<i64> {
    if def.value_unit == ValueUnit::Once {
        return vec![def.amount.min.max(1)];
    }
    // 编译器不会产出 value=0 的定义；这里按 1 处理以杜绝除零
    let value = if def.value == 0 { 1 } else { def.value };
    let mut total = (severity as f64 / value as f64).round() as i64;
    if total < def.amount.min {
        total = def.amount.min;
    }
    if total <= def.amount.max {
        return vec![total];
    }
    let mut chunks = Vec::new();
    while total > 0 {
        let chunk = total.min(def.amount.max);
        chunks.push(chunk.max(def.amount.min));
        total -= chunk;
    }
    chunks
}

/// 缺省截止时刻：分派当天 23:59:59
fn deadline_for(
    now: Timestamp,
    behavior: &AssignmentBehavior,
    explicit_minutes: Option<i64>,
) -> Timestamp {
    match explicit_minutes.or(behavior.deadline_minutes) {
        Some(m) => now + Duration::minutes(m),
        None => now.date().and_hms_opt(23, 59, 59).unwrap_or(now),
    }
}

impl Interpreter<'_> {
    /// 分派一个作业实例，返回实例 id
    ///
    /// `explicit_deadline` 为脚本里随动作给出的截止间隔（分钟），
    /// 覆盖定义上的缺省值。
    pub fn assign_job(
        &mut self,
        name: &str,
        explicit_deadline: Option<i64>,
    ) -> Result<u64, LifecycleError> {
        let key = name.trim().to_lowercase();
        let Some(def) = self.script.jobs.get(&key) else {
            return Err(LifecycleError::UnknownDefinition {
                kind: "job",
                name: key,
            });
        };
        let behavior = def.behavior.clone();
        let body = def.body.clone();
        let now = self.now();

        let id = self.state.allocate_assignment_id();
        self.state.assignments.insert(
            id,
            AssignmentInstance {
                id,
                kind: AssignmentKind::Job,
                name: key,
                phase: AssignmentPhase::Assigned,
                assigned_at: now,
                deadline: deadline_for(now, &behavior, explicit_deadline),
                next_remind: behavior.remind_minutes.map(|m| now + Duration::minutes(m)),
                amount: 0,
                resources: behavior.resources.clone(),
                prev_status: None,
            },
        );
        self.run_steps(&body);
        Ok(id)
    }

    /// 按严重度分派惩罚实例；总量超过单实例上限时产生多个实例
    pub fn assign_punishment(
        &mut self,
        name: &str,
        severity: i64,
    ) -> Result<Vec<u64>, LifecycleError> {
        let key = name.trim().to_lowercase();
        let Some(def) = self.script.punishments.get(&key) else {
            return Err(LifecycleError::UnknownDefinition {
                kind: "punishment",
                name: key,
            });
        };
        let behavior = def.behavior.clone();
        let body = def.body.clone();
        let amounts = severity_to_amounts(severity, def);
        let now = self.now();

        let mut ids = Vec::with_capacity(amounts.len());
        for amount in amounts {
            let id = self.state.allocate_assignment_id();
            self.state.assignments.insert(
                id,
                AssignmentInstance {
                    id,
                    kind: AssignmentKind::Punishment,
                    name: key.clone(),
                    phase: AssignmentPhase::Assigned,
                    assigned_at: now,
                    deadline: deadline_for(now, &behavior, None),
                    next_remind: behavior.remind_minutes.map(|m| now + Duration::minutes(m)),
                    amount,
                    resources: behavior.resources.clone(),
                    prev_status: None,
                },
            );
            ids.push(id);
        }
        self.run_steps(&body);
        Ok(ids)
    }

    /// 施加惩罚：指定名字则分派该定义，否则随机挑一个惩罚定义
    pub fn punish(
        &mut self,
        severity: i64,
        name: Option<&str>,
    ) -> Result<Vec<u64>, LifecycleError> {
        let key = match name {
            Some(n) => n.trim().to_lowercase(),
            None => {
                let names: Vec<&String> = self.script.punishments.keys().collect();
                let Some(i) = select::uniform_index(self.env.random.as_mut(), names.len())
                else {
                    return Err(LifecycleError::UnknownDefinition {
                        kind: "punishment",
                        name: String::new(),
                    });
                };
                names[i].clone()
            }
        };
        self.assign_punishment(&key, severity)
    }

    /// 开始一个已分派的实例
    ///
    /// 拒绝条件：资源与其他活动实例重叠；有阻塞性
    /// （不可中断且非长期）惩罚正在执行。
    pub fn start_assignment(
        &mut self,
        kind: AssignmentKind,
        name: &str,
    ) -> Result<(), LifecycleError> {
        let key = name.trim().to_lowercase();
        let Some(inst) = self.state.find_active(kind, &key) else {
            return Err(LifecycleError::NoActiveInstance {
                kind: kind.label(),
                name: key,
            });
        };
        let id = inst.id;
        if inst.phase == AssignmentPhase::Started {
            return Err(LifecycleError::AlreadyStarted { name: key });
        }

        // 资源冲突：与任何其他活动实例的资源令牌重叠即拒绝
        let resources = inst.resources.clone();
        for other in self.state.active_assignments().filter(|a| a.id != id) {
            for token in &resources {
                if other.resources.contains(token) {
                    return Err(LifecycleError::ResourceConflict {
                        resource: token.clone(),
                        holder: other.id,
                    });
                }
            }
        }

        // 阻塞性惩罚：不可中断且非长期的惩罚执行期间不得开始其他任务
        for other in self.state.active_assignments() {
            if other.id == id
                || other.kind != AssignmentKind::Punishment
                || other.phase != AssignmentPhase::Started
            {
                continue;
            }
            if let Some(def) = self.script.punishments.get(&other.name)
                && !def.behavior.interruptable
                && !def.behavior.long_running
            {
                return Err(LifecycleError::Blocked {
                    punishment: other.name.clone(),
                });
            }
        }

        let behavior = self.behavior_of(kind, &key);
        let now = self.now();
        let prev_status = (!self.state.status.is_empty()).then(|| self.state.status.clone());
        let inst = self
            .state
            .assignments
            .get_mut(&id)
            .ok_or(LifecycleError::NotFound { id })?;
        inst.phase = AssignmentPhase::Started;
        inst.prev_status = prev_status;
        let flag = inst.started_flag();
        self.state.set_flag(&flag, now, None);

        if let Some(behavior) = behavior {
            if let Some(proc) = &behavior.start_procedure {
                self.run_procedure(proc);
            }
            if let Some(proc) = &behavior.announce_procedure {
                self.run_procedure(proc);
            }
        }
        Ok(())
    }

    /// 标记完成
    ///
    /// 必须先开始的任务（`must_start` / `long_running` / 时间量纲惩罚）
    /// 在 started 标志缺失时拒绝。
    pub fn mark_done(
        &mut self,
        kind: AssignmentKind,
        name: &str,
    ) -> Result<(), LifecycleError> {
        let key = name.trim().to_lowercase();
        let Some(inst) = self.state.find_active(kind, &key) else {
            return Err(LifecycleError::NoActiveInstance {
                kind: kind.label(),
                name: key,
            });
        };
        let id = inst.id;
        let flag = inst.started_flag();
        let behavior = self.behavior_of(kind, &key);

        let requires_start = match kind {
            AssignmentKind::Job => behavior
                .as_ref()
                .is_some_and(|b| b.must_start || b.long_running),
            AssignmentKind::Punishment => {
                let time_based = self
                    .script
                    .punishments
                    .get(&key)
                    .is_some_and(|d| d.value_unit.is_time_based());
                behavior
                    .as_ref()
                    .is_some_and(|b| b.must_start || b.long_running)
                    || time_based
            }
        };
        if requires_start && !self.state.has_flag(&flag) {
            return Err(LifecycleError::NotStarted { name: key });
        }

        let inst = self
            .state
            .assignments
            .get_mut(&id)
            .ok_or(LifecycleError::NotFound { id })?;
        inst.phase = AssignmentPhase::Done;
        self.state.remove_flag(&flag);

        if let Some(behavior) = behavior {
            self.state.merits += behavior.merit_add;
            if let Some(proc) = &behavior.done_procedure {
                self.run_procedure(proc);
            }
        }
        Ok(())
    }

    /// 中止：要求 started 标志存在；恢复开始时记录的状态
    pub fn abort_assignment(
        &mut self,
        kind: AssignmentKind,
        name: &str,
    ) -> Result<(), LifecycleError> {
        let key = name.trim().to_lowercase();
        let Some(inst) = self.state.find_active(kind, &key) else {
            return Err(LifecycleError::NoActiveInstance {
                kind: kind.label(),
                name: key,
            });
        };
        let id = inst.id;
        let flag = inst.started_flag();
        if !self.state.has_flag(&flag) {
            return Err(LifecycleError::NotStarted { name: key });
        }

        let behavior = self.behavior_of(kind, &key);
        let inst = self
            .state
            .assignments
            .get_mut(&id)
            .ok_or(LifecycleError::NotFound { id })?;
        inst.phase = AssignmentPhase::Aborted;
        let prev_status = inst.prev_status.take();
        self.state.remove_flag(&flag);
        if let Some(prev) = prev_status {
            self.state.status = prev;
        }

        if let Some(behavior) = behavior {
            self.state.merits -= behavior.merit_subtract;
            if let Some(proc) = &behavior.abort_procedure {
                self.run_procedure(proc);
            }
        }
        Ok(())
    }

    /// 删除：定义必须允许删除，且删除前钩子未举起否决信号
    pub fn delete_assignment(
        &mut self,
        kind: AssignmentKind,
        name: &str,
    ) -> Result<(), LifecycleError> {
        let key = name.trim().to_lowercase();
        let Some(inst) = self.state.find_active(kind, &key) else {
            return Err(LifecycleError::NoActiveInstance {
                kind: kind.label(),
                name: key,
            });
        };
        let id = inst.id;
        let flag = inst.started_flag();
        let Some(behavior) = self.behavior_of(kind, &key) else {
            return Err(LifecycleError::UnknownDefinition {
                kind: kind.label(),
                name: key,
            });
        };
        if !behavior.delete_allowed {
            return Err(LifecycleError::DeleteForbidden { name: key });
        }

        // 钩子通过设置否决标志来拒绝删除；钩子运行前先清掉残留信号
        if let Some(proc) = &behavior.before_delete_procedure {
            self.state.remove_flag(DENY_DELETE_FLAG);
            self.run_procedure(proc);
            if self.state.has_flag(DENY_DELETE_FLAG) {
                self.state.remove_flag(DENY_DELETE_FLAG);
                return Err(LifecycleError::DeleteForbidden { name: key });
            }
        }

        let inst = self
            .state
            .assignments
            .get_mut(&id)
            .ok_or(LifecycleError::NotFound { id })?;
        inst.phase = AssignmentPhase::Deleted;
        self.state.remove_flag(&flag);
        Ok(())
    }

    /// 主动提醒一次：运行 announce 钩子并推迟下次提醒
    pub fn remind(&mut self, kind: AssignmentKind, name: &str) {
        let key = name.trim().to_lowercase();
        let Some(inst) = self.state.find_active(kind, &key) else {
            return;
        };
        let id = inst.id;
        let behavior = self.behavior_of(kind, &key);
        let now = self.now();
        if let Some(behavior) = behavior {
            if let Some(m) = behavior.remind_minutes
                && let Some(inst) = self.state.assignments.get_mut(&id)
            {
                inst.next_remind = Some(now + Duration::minutes(m));
            }
            if let Some(proc) = &behavior.announce_procedure {
                self.run_procedure(proc);
            }
        }
    }

    /// 延长截止时刻
    pub fn extend_deadline(&mut self, kind: AssignmentKind, name: &str, minutes: i64) {
        let key = name.trim().to_lowercase();
        let Some(id) = self.state.find_active(kind, &key).map(|i| i.id) else {
            return;
        };
        if let Some(inst) = self.state.assignments.get_mut(&id) {
            inst.deadline += Duration::minutes(minutes);
        }
    }

    /// 任务清理：过期活动实例进入 Expired 并结算扣分，
    /// 到达提醒时刻的实例触发 announce 钩子
    ///
    /// 幂等：同一 `now` 重复调用不会重复结算或重复提醒。
    pub fn sweep_assignments(&mut self, now: Timestamp) {
        let due: Vec<u64> = self
            .state
            .active_assignments()
            .filter(|a| a.deadline < now)
            .map(|a| a.id)
            .collect();
        for id in due {
            let Some(inst) = self.state.assignments.get_mut(&id) else {
                continue;
            };
            inst.phase = AssignmentPhase::Expired;
            let kind = inst.kind;
            let name = inst.name.clone();
            let flag = inst.started_flag();
            self.state.remove_flag(&flag);
            if let Some(behavior) = self.behavior_of(kind, &name) {
                self.state.merits -= behavior.merit_subtract;
            }
        }

        let remind: Vec<u64> = self
            .state
            .active_assignments()
            .filter(|a| a.next_remind.is_some_and(|t| t <= now))
            .map(|a| a.id)
            .collect();
        for id in remind {
            let Some(inst) = self.state.assignments.get(&id) else {
                continue;
            };
            let kind = inst.kind;
            let name = inst.name.clone();
            let Some(behavior) = self.behavior_of(kind, &name) else {
                continue;
            };
            if let Some(inst) = self.state.assignments.get_mut(&id) {
                inst.next_remind = behavior.remind_minutes.map(|m| now + Duration::minutes(m));
            }
            if let Some(proc) = &behavior.announce_procedure {
                self.run_procedure(proc);
            }
        }
    }

    /// 拿到定义上的任务行为组件
    fn behavior_of(&self, kind: AssignmentKind, name: &str) -> Option<AssignmentBehavior> {
        match kind {
            AssignmentKind::Job => self.script.jobs.get(name).map(|d| d.behavior.clone()),
            AssignmentKind::Punishment => self
                .script
                .punishments
                .get(name)
                .map(|d| d.behavior.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::interpreter::tests::{compile, test_env, ts};
    use crate::state::SessionState;

    #[test]
    fn test_severity_conversion() {
        let script = compile("[punishment-lines]\nTitle=写句子\nValue=10\nAmount=1,20");
        let def = &script.punishments["lines"];
        assert_eq!(severity_to_amounts(30, def), vec![3]);
        // round(0.5) 取整后仍然被下限托住
        assert_eq!(severity_to_amounts(5, def), vec![1]);
        // 总量超过上限时按上限分块
        assert_eq!(severity_to_amounts(500, def), vec![20, 20, 10]);
    }

    #[test]
    fn test_severity_once_ignores_severity() {
        let script =
            compile("[punishment-corner]\nTitle=罚站\nValue=10\nValueUnit=once\nAmount=2,5");
        let def = &script.punishments["corner"];
        assert_eq!(severity_to_amounts(999, def), vec![2]);
    }

    #[test]
    fn test_assign_job_default_deadline_is_end_of_day() {
        let script = compile("[job-dishes]\nTitle=洗碗");
        let mut state = SessionState::new();
        let mut env = test_env(ts("2025-06-01 09:15:00"));
        let mut interp = Interpreter::new(&script, &mut state, &mut env);
        let id = interp.assign_job("dishes", None).unwrap();
        assert_eq!(state.assignments[&id].deadline, ts("2025-06-01 23:59:59"));
    }

    #[test]
    fn test_assign_job_explicit_deadline() {
        let script = compile("[job-dishes]\nTitle=洗碗\nDeadline=120");
        let mut state = SessionState::new();
        let mut env = test_env(ts("2025-06-01 09:00:00"));
        let mut interp = Interpreter::new(&script, &mut state, &mut env);
        let id = interp.assign_job("dishes", None).unwrap();
        assert_eq!(state.assignments[&id].deadline, ts("2025-06-01 11:00:00"));
    }

    #[test]
    fn test_resource_conflict_then_success_after_done() {
        let script = compile(
            "[job-wash]\nTitle=洗\nResources=hands\n[job-iron]\nTitle=熨\nResources=hands,iron",
        );
        let mut state = SessionState::new();
        let mut env = test_env(ts("2025-06-01 09:00:00"));
        let mut interp = Interpreter::new(&script, &mut state, &mut env);

        interp.assign_job("wash", None).unwrap();
        interp.start_assignment(AssignmentKind::Job, "wash").unwrap();

        interp.assign_job("iron", None).unwrap();
        let err = interp
            .start_assignment(AssignmentKind::Job, "iron")
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::ResourceConflict { ref resource, .. } if resource == "hands"
        ));

        // 冲突实例完成后同样的开始操作成功
        interp.mark_done(AssignmentKind::Job, "wash").unwrap();
        interp.start_assignment(AssignmentKind::Job, "iron").unwrap();
    }

    #[test]
    fn test_blocking_punishment_rejects_start() {
        let script = compile(
            "[punishment-corner]\nTitle=罚站\nValue=1\nInterruptable=no\n[job-dishes]\nTitle=洗碗",
        );
        let mut state = SessionState::new();
        let mut env = test_env(ts("2025-06-01 09:00:00"));
        let mut interp = Interpreter::new(&script, &mut state, &mut env);

        interp.assign_punishment("corner", 1).unwrap();
        interp
            .start_assignment(AssignmentKind::Punishment, "corner")
            .unwrap();

        interp.assign_job("dishes", None).unwrap();
        let err = interp
            .start_assignment(AssignmentKind::Job, "dishes")
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Blocked { .. }));
    }

    #[test]
    fn test_start_sets_flag_and_runs_hooks() {
        let script = compile(
            "[procedure-announce]\nSet#=announced,1\n[job-walk]\nTitle=散步\nStartProcedure=announce",
        );
        let mut state = SessionState::new();
        let mut env = test_env(ts("2025-06-01 09:00:00"));
        let mut interp = Interpreter::new(&script, &mut state, &mut env);

        interp.assign_job("walk", None).unwrap();
        interp.start_assignment(AssignmentKind::Job, "walk").unwrap();
        assert!(state.has_flag("job_walk_started"));
        assert_eq!(state.counter("announced"), 1);
    }

    #[test]
    fn test_done_requires_start_for_must_start_job() {
        let script = compile("[job-run]\nTitle=跑步\nMustStart=yes\nMeritAdd=10");
        let mut state = SessionState::new();
        let mut env = test_env(ts("2025-06-01 09:00:00"));
        let mut interp = Interpreter::new(&script, &mut state, &mut env);

        interp.assign_job("run", None).unwrap();
        let err = interp.mark_done(AssignmentKind::Job, "run").unwrap_err();
        assert!(matches!(err, LifecycleError::NotStarted { .. }));
        // 拒绝不产生任何变动
        assert_eq!(state.merits, 0);

        let mut interp = Interpreter::new(&script, &mut state, &mut env);
        interp.start_assignment(AssignmentKind::Job, "run").unwrap();
        interp.mark_done(AssignmentKind::Job, "run").unwrap();
        assert_eq!(state.merits, 10);
        assert!(!state.has_flag("job_run_started"));
    }

    #[test]
    fn test_time_based_punishment_requires_start() {
        let script =
            compile("[punishment-detention]\nTitle=禁闭\nValue=30\nValueUnit=minutes");
        let mut state = SessionState::new();
        let mut env = test_env(ts("2025-06-01 09:00:00"));
        let mut interp = Interpreter::new(&script, &mut state, &mut env);

        interp.assign_punishment("detention", 30).unwrap();
        let err = interp
            .mark_done(AssignmentKind::Punishment, "detention")
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotStarted { .. }));
    }

    #[test]
    fn test_abort_restores_previous_status() {
        let script = compile("[job-essay]\nTitle=写作文\nMeritSubtract=5");
        let mut state = SessionState::new();
        state.push_status("normal");
        state.merits = 20;
        let mut env = test_env(ts("2025-06-01 09:00:00"));
        let mut interp = Interpreter::new(&script, &mut state, &mut env);

        interp.assign_job("essay", None).unwrap();
        interp.start_assignment(AssignmentKind::Job, "essay").unwrap();
        state.status = "busy".to_string();

        let mut interp = Interpreter::new(&script, &mut state, &mut env);
        interp.abort_assignment(AssignmentKind::Job, "essay").unwrap();
        assert_eq!(state.status, "normal");
        assert_eq!(state.merits, 15);
        assert!(!state.has_flag("job_essay_started"));
    }

    #[test]
    fn test_abort_without_start_rejected() {
        let script = compile("[job-essay]\nTitle=写作文");
        let mut state = SessionState::new();
        let mut env = test_env(ts("2025-06-01 09:00:00"));
        let mut interp = Interpreter::new(&script, &mut state, &mut env);

        interp.assign_job("essay", None).unwrap();
        let err = interp
            .abort_assignment(AssignmentKind::Job, "essay")
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotStarted { .. }));
    }

    #[test]
    fn test_delete_forbidden_by_definition() {
        let script = compile("[job-chore]\nTitle=家务\nDeleteAllowed=no");
        let mut state = SessionState::new();
        let mut env = test_env(ts("2025-06-01 09:00:00"));
        let mut interp = Interpreter::new(&script, &mut state, &mut env);

        interp.assign_job("chore", None).unwrap();
        let err = interp
            .delete_assignment(AssignmentKind::Job, "chore")
            .unwrap_err();
        assert!(matches!(err, LifecycleError::DeleteForbidden { .. }));
    }

    #[test]
    fn test_delete_vetoed_by_hook() {
        let script = compile(
            "[procedure-veto]\nSetFlag=zzDenyDelete\n[job-chore]\nTitle=家务\nDeleteAllowed=yes\nBeforeDeleteProcedure=veto",
        );
        let mut state = SessionState::new();
        let mut env = test_env(ts("2025-06-01 09:00:00"));
        let mut interp = Interpreter::new(&script, &mut state, &mut env);

        interp.assign_job("chore", None).unwrap();
        let err = interp
            .delete_assignment(AssignmentKind::Job, "chore")
            .unwrap_err();
        assert!(matches!(err, LifecycleError::DeleteForbidden { .. }));
        // 否决信号不残留
        assert!(!state.has_flag("zzdenydelete"));
        assert!(state.find_active(AssignmentKind::Job, "chore").is_some());
    }

    #[test]
    fn test_delete_allowed() {
        let script = compile("[job-chore]\nTitle=家务\nDeleteAllowed=yes");
        let mut state = SessionState::new();
        let mut env = test_env(ts("2025-06-01 09:00:00"));
        let mut interp = Interpreter::new(&script, &mut state, &mut env);

        interp.assign_job("chore", None).unwrap();
        interp.delete_assignment(AssignmentKind::Job, "chore").unwrap();
        assert!(state.find_active(AssignmentKind::Job, "chore").is_none());
    }

    #[test]
    fn test_sweep_expires_overdue_and_settles_merits() {
        let script = compile("[job-late]\nTitle=迟交\nMeritSubtract=7");
        let mut state = SessionState::new();
        state.merits = 50;
        let mut env = test_env(ts("2025-06-01 09:00:00"));
        let mut interp = Interpreter::new(&script, &mut state, &mut env);

        interp.assign_job("late", None).unwrap();
        interp.sweep_assignments(ts("2025-06-02 00:00:00"));
        assert_eq!(state.merits, 43);
        assert!(state.find_active(AssignmentKind::Job, "late").is_none());

        // 幂等：再扫一遍不再扣分
        let mut interp = Interpreter::new(&script, &mut state, &mut env);
        interp.sweep_assignments(ts("2025-06-02 00:00:00"));
        assert_eq!(state.merits, 43);
    }

    #[test]
    fn test_sweep_fires_reminder_and_reschedules() {
        let script = compile(
            "[procedure-nag]\nAdd#=nagged,1\n[job-slow]\nTitle=慢活\nRemindInterval=60\nAnnounceProcedure=nag",
        );
        let mut state = SessionState::new();
        let mut env = test_env(ts("2025-06-01 09:00:00"));
        let mut interp = Interpreter::new(&script, &mut state, &mut env);

        interp.assign_job("slow", None).unwrap();
        interp.sweep_assignments(ts("2025-06-01 10:00:00"));
        assert_eq!(state.counter("nagged"), 1);

        // 下次提醒被推迟：10:30 不再触发，11:00 触发第二次
        let mut interp = Interpreter::new(&script, &mut state, &mut env);
        interp.sweep_assignments(ts("2025-06-01 10:30:00"));
        interp.sweep_assignments(ts("2025-06-01 11:00:00"));
        assert_eq!(state.counter("nagged"), 2);
    }

    #[test]
    fn test_punish_random_definition() {
        let script = compile(
            "[punishment-a]\nTitle=甲\nValue=1\n[punishment-b]\nTitle=乙\nValue=1",
        );
        let mut state = SessionState::new();
        let mut env = test_env(ts("2025-06-01 09:00:00"));
        env.random = Box::new(crate::runtime::env::SequenceRandom::new(vec![1]));
        let mut interp = Interpreter::new(&script, &mut state, &mut env);

        let ids = interp.punish(3, None).unwrap();
        assert_eq!(state.assignments[&ids[0]].name, "b");
    }
}
