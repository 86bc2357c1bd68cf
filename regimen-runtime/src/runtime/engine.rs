//! # Engine 模块
//!
//! 运行时的对外门面：持有编译后的脚本（只读程序）、会话状态与
//! 外部协作者，暴露全部公开操作。
//!
//! ## 设计原则
//!
//! - 单线程：每个操作在调用线程上跑完才处理下一个外部事件
//! - 周期性清理（标志过期、任务到期、定时器）是解释器仅有的
//!   重入入口，每个 tick 幂等
//! - 没有全局单例：上下文全部显式传递

use crate::error::{LifecycleError, SaveError};
use crate::runtime::env::Environment;
use crate::runtime::interpreter::Interpreter;
use crate::runtime::select;
use crate::save;
use crate::script::Timestamp;
use crate::script::defs::CompiledScript;
use crate::state::{AssignmentKind, SessionState};

/// 脚本运行时引擎
pub struct Engine {
    script: CompiledScript,
    state: SessionState,
    env: Environment,
}

impl Engine {
    /// 以全新会话启动
    pub fn new(script: CompiledScript, env: Environment) -> Self {
        Self {
            script,
            state: SessionState::new(),
            env,
        }
    }

    /// 以恢复的会话状态启动
    pub fn with_state(script: CompiledScript, state: SessionState, env: Environment) -> Self {
        Self { script, state, env }
    }

    pub fn script(&self) -> &CompiledScript {
        &self.script
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    fn interpreter(&mut self) -> Interpreter<'_> {
        Interpreter::new(&self.script, &mut self.state, &mut self.env)
    }

    // ── 过程与触发 ──

    /// 执行一个过程定义；定义缺失时无操作
    pub fn run_procedure(&mut self, name: &str) {
        self.interpreter().run_procedure(name);
    }

    /// 提交一次汇报：结算加分并执行汇报体
    pub fn trigger_report(&mut self, name: &str) -> Result<(), LifecycleError> {
        let key = name.trim().to_lowercase();
        let Some(def) = self.script.reports.get(&key) else {
            return Err(LifecycleError::UnknownDefinition {
                kind: "report",
                name: key,
            });
        };
        let merit_add = def.merit_add;
        let body = def.body.clone();
        self.state.merits += merit_add;
        self.interpreter().run_steps(&body);
        Ok(())
    }

    /// 提交一次坦白：结算扣分并执行坦白体
    pub fn trigger_confession(&mut self, name: &str) -> Result<(), LifecycleError> {
        let key = name.trim().to_lowercase();
        let Some(def) = self.script.confessions.get(&key) else {
            return Err(LifecycleError::UnknownDefinition {
                kind: "confession",
                name: key,
            });
        };
        let merit_subtract = def.merit_subtract;
        let body = def.body.clone();
        self.state.merits -= merit_subtract;
        self.interpreter().run_steps(&body);
        Ok(())
    }

    /// 申请许可
    ///
    /// 积分低于门槛直接拒绝；否则在批准概率范围内抽一个百分比掷骰。
    /// 批准时结算积分变动并执行许可体；返回是否批准。
    pub fn request_permission(&mut self, name: &str) -> Result<bool, LifecycleError> {
        let key = name.trim().to_lowercase();
        let Some(def) = self.script.permissions.get(&key) else {
            return Err(LifecycleError::UnknownDefinition {
                kind: "permission",
                name: key,
            });
        };
        if let Some(min) = def.min_merits
            && self.state.merits < min
        {
            return Ok(false);
        }
        let percent = def.percent;
        let merit_add = def.merit_add;
        let merit_subtract = def.merit_subtract;
        let body = def.body.clone();

        let pct = self.env.random.uniform(percent.min, percent.max).clamp(0, 100);
        let roll = self.env.random.uniform(1, 100);
        if roll > pct {
            return Ok(false);
        }

        self.state.merits += merit_add;
        self.state.merits -= merit_subtract;
        self.interpreter().run_steps(&body);
        Ok(true)
    }

    // ── 任务动词 ──

    pub fn assign_job(
        &mut self,
        name: &str,
        deadline_minutes: Option<i64>,
    ) -> Result<u64, LifecycleError> {
        self.interpreter().assign_job(name, deadline_minutes)
    }

    pub fn assign_punishment(
        &mut self,
        name: &str,
        severity: i64,
    ) -> Result<Vec<u64>, LifecycleError> {
        self.interpreter().assign_punishment(name, severity)
    }

    pub fn punish(&mut self, severity: i64, name: Option<&str>) -> Result<Vec<u64>, LifecycleError> {
        self.interpreter().punish(severity, name)
    }

    pub fn start_assignment(
        &mut self,
        kind: AssignmentKind,
        name: &str,
    ) -> Result<(), LifecycleError> {
        self.interpreter().start_assignment(kind, name)
    }

    pub fn mark_done(&mut self, kind: AssignmentKind, name: &str) -> Result<(), LifecycleError> {
        self.interpreter().mark_done(kind, name)
    }

    pub fn abort_assignment(
        &mut self,
        kind: AssignmentKind,
        name: &str,
    ) -> Result<(), LifecycleError> {
        self.interpreter().abort_assignment(kind, name)
    }

    pub fn delete_assignment(
        &mut self,
        kind: AssignmentKind,
        name: &str,
    ) -> Result<(), LifecycleError> {
        self.interpreter().delete_assignment(kind, name)
    }

    // ── 周期性清理 ──

    /// 一个完整的 tick：按固定顺序跑全部清理
    pub fn tick(&mut self) {
        let now = self.env.clock.now();
        self.sweep_flags(now);
        self.sweep_assignments(now);
        self.run_timers(now);
    }

    /// 清除到期标志；返回清除数量
    pub fn sweep_flags(&mut self, now: Timestamp) -> usize {
        self.state.sweep_flags(now)
    }

    /// 任务到期与提醒清理
    pub fn sweep_assignments(&mut self, now: Timestamp) {
        self.interpreter().sweep_assignments(now);
    }

    /// 定时器调度
    ///
    /// 首次见到的定时器先排程（居中随机抽间隔），到点且落在活动
    /// 时间窗内才执行并重排；窗外到点只重排不执行。幂等：同一
    /// `now` 重复调用不会重复触发。
    pub fn run_timers(&mut self, now: Timestamp) {
        let names: Vec<String> = self.script.timers.keys().cloned().collect();
        for name in names {
            let def = &self.script.timers[&name];
            // 运行期覆盖优先，其次取定义上的默认启用状态
            let enabled = self.state.timer_override(&name).unwrap_or(def.enabled);
            if !enabled {
                continue;
            }

            let Some(next) = self.state.timer_next.get(&name).copied() else {
                let next = self.schedule_timer(&name, now);
                self.state.timer_next.insert(name.clone(), next);
                continue;
            };
            if next > now {
                continue;
            }

            let def = &self.script.timers[&name];
            let in_window = def.window.is_none_or(|w| w.contains(now.time()));
            let body = in_window.then(|| def.body.clone());
            let next = self.schedule_timer(&name, now);
            self.state.timer_next.insert(name.clone(), next);
            if let Some(body) = body {
                self.interpreter().run_steps(&body);
            }
        }
    }

    fn schedule_timer(&mut self, name: &str, now: Timestamp) -> Timestamp {
        let interval = self.script.timers[name].interval;
        let minutes = select::centered(self.env.random.as_mut(), interval.min, interval.max);
        now + chrono::Duration::minutes(minutes.max(1))
    }

    // ── 持久化 ──

    /// 序列化当前会话
    pub fn save_state(&self) -> String {
        save::serialize_state(&self.state)
    }

    /// 用存档替换当前会话
    pub fn restore_state(&mut self, text: &str) -> Result<(), SaveError> {
        self.state = save::restore_state(text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::env::SequenceRandom;
    use crate::runtime::interpreter::tests::{compile, test_env, ts};

    fn engine(body: &str, now: &str) -> Engine {
        Engine::new(compile(body), test_env(ts(now)))
    }

    #[test]
    fn test_run_procedure_mutates_state() {
        let mut engine = engine("[procedure-init]\nSet#=ready,1", "2025-06-01 10:00:00");
        engine.run_procedure("init");
        assert_eq!(engine.state().counter("ready"), 1);
        // 缺失的过程无操作
        engine.run_procedure("missing");
    }

    #[test]
    fn test_report_and_confession_settle_merits() {
        let mut engine = engine(
            "[report-daily]\nTitle=日报\nMeritAdd=5\n[confession-late]\nTitle=迟到\nMeritSubtract=8",
            "2025-06-01 10:00:00",
        );
        engine.state_mut().merits = 10;
        engine.trigger_report("daily").unwrap();
        assert_eq!(engine.state().merits, 15);
        engine.trigger_confession("late").unwrap();
        assert_eq!(engine.state().merits, 7);

        assert!(engine.trigger_report("missing").is_err());
    }

    #[test]
    fn test_permission_min_merits_gate() {
        let mut engine = engine(
            "[permission-tv]\nTitle=看电视\nMinMerits=50\nPercent=100",
            "2025-06-01 10:00:00",
        );
        engine.state_mut().merits = 10;
        assert_eq!(engine.request_permission("tv").unwrap(), false);

        engine.state_mut().merits = 60;
        assert_eq!(engine.request_permission("tv").unwrap(), true);
    }

    #[test]
    fn test_permission_roll_and_settlement() {
        let mut engine = engine(
            "[permission-out]\nTitle=外出\nPercent=40\nMeritSubtract=3\nSetFlag=outing",
            "2025-06-01 10:00:00",
        );
        engine.state_mut().merits = 20;
        // 第一次抽取是批准概率（40），第二次是掷骰：41 > 40 拒绝
        engine.env.random = Box::new(SequenceRandom::new(vec![40, 41]));
        assert_eq!(engine.request_permission("out").unwrap(), false);
        assert_eq!(engine.state().merits, 20);
        assert!(!engine.state().has_flag("outing"));

        // 40 <= 40 批准，结算扣分并执行许可体
        engine.env.random = Box::new(SequenceRandom::new(vec![40, 40]));
        assert_eq!(engine.request_permission("out").unwrap(), true);
        assert_eq!(engine.state().merits, 17);
        assert!(engine.state().has_flag("outing"));
    }

    #[test]
    fn test_timer_schedules_then_fires() {
        let mut engine = engine(
            "[timer-nag]\nInterval=10,10\nSet#=fired,1",
            "2025-06-01 10:00:00",
        );
        // 第一次调用只排程
        engine.run_timers(ts("2025-06-01 10:00:00"));
        assert_eq!(engine.state().counter("fired"), 0);

        // 到点触发并重排
        engine.run_timers(ts("2025-06-01 10:10:00"));
        assert_eq!(engine.state().counter("fired"), 1);

        // 幂等：同一时刻再跑不重复触发
        engine.run_timers(ts("2025-06-01 10:10:00"));
        assert_eq!(engine.state().counter("fired"), 1);
    }

    #[test]
    fn test_timer_respects_window() {
        let mut engine = engine(
            "[timer-day]\nInterval=10,10\nWindow=08:00,22:00\nAdd#=fired,1",
            "2025-06-01 23:00:00",
        );
        engine.run_timers(ts("2025-06-01 23:00:00"));
        // 窗外到点：只重排不执行
        engine.run_timers(ts("2025-06-01 23:10:00"));
        assert_eq!(engine.state().counter("fired"), 0);

        engine.run_timers(ts("2025-06-02 09:00:00"));
        assert_eq!(engine.state().counter("fired"), 1);
    }

    #[test]
    fn test_disabled_timer_does_not_fire() {
        let mut engine = engine(
            "[timer-nag]\nInterval=10,10\nSet#=fired,1\n[procedure-off]\nDisableTimer=nag",
            "2025-06-01 10:00:00",
        );
        engine.run_procedure("off");
        engine.run_timers(ts("2025-06-01 10:00:00"));
        engine.run_timers(ts("2025-06-01 11:00:00"));
        assert_eq!(engine.state().counter("fired"), 0);
    }

    #[test]
    fn test_tick_sweeps_flags() {
        let mut engine = engine(
            "[procedure-mark]\nSetFlag=brief,5",
            "2025-06-01 10:00:00",
        );
        engine.run_procedure("mark");
        assert!(engine.state().has_flag("brief"));

        engine.env.clock = Box::new(
            crate::runtime::interpreter::tests::FixedTestClock(ts("2025-06-01 10:06:00")),
        );
        engine.tick();
        assert!(!engine.state().has_flag("brief"));
    }

    #[test]
    fn test_save_restore_round_trip() {
        let mut engine = engine("[procedure-init]\nSet#=score,3\nSetFlag=ok", "2025-06-01 10:00:00");
        engine.run_procedure("init");
        let saved = engine.save_state();

        let mut other = Engine::new(compile(""), test_env(ts("2025-06-01 10:00:00")));
        other.restore_state(&saved).unwrap();
        assert_eq!(other.state(), engine.state());
    }
}
