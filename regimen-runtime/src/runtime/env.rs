//! # Env 模块
//!
//! 运行时的外部协作者接口。
//!
//! ## 设计原则
//!
//! 核心库不做任何 IO：时钟、随机数、邮件、相机、消息呈现
//! 全部通过 trait 注入。宿主提供真实实现，测试提供桩实现。

use crate::script::Timestamp;

/// 时钟
pub trait Clock {
    /// 当前时刻
    fn now(&self) -> Timestamp;
}

/// 随机源
pub trait RandomSource {
    /// `[min, max]` 闭区间内的均匀随机整数
    ///
    /// `min > max` 时实现方应返回 `min`。
    fn uniform(&mut self, min: i64, max: i64) -> i64;
}

/// 邮件发送
pub trait MailSender {
    /// 附件为文件名列表，可以为空
    fn send(&mut self, subject: &str, attachments: &[String], body: &str);
}

/// 相机触发
pub trait Camera {
    /// 以给定前缀拍一张照片
    fn take_picture(&mut self, prefix: &str);
}

/// 消息 / 问题呈现
///
/// 呈现是阻塞语义的外部调用：问题与选择立即返回所选下标，
/// 核心从不等待真实用户（宿主自行决定如何交互）。
pub trait Presenter {
    /// 显示一条消息
    fn message(&mut self, text: &str);

    /// 提出问题，返回所选答案的下标；None 表示未回答
    fn ask(&mut self, text: &str, answers: &[String]) -> Option<usize>;

    /// 请求一个数值输入
    fn input_number(&mut self, prompt: &str) -> Option<i64>;

    /// 请求一个文本输入
    fn input_text(&mut self, prompt: &str) -> Option<String>;
}

/// 注入到解释器的协作者集合
pub struct Environment {
    pub clock: Box<dyn Clock>,
    pub random: Box<dyn RandomSource>,
    pub mail: Box<dyn MailSender>,
    pub camera: Box<dyn Camera>,
    pub presenter: Box<dyn Presenter>,
}

impl Environment {
    pub fn new(
        clock: Box<dyn Clock>,
        random: Box<dyn RandomSource>,
        mail: Box<dyn MailSender>,
        camera: Box<dyn Camera>,
        presenter: Box<dyn Presenter>,
    ) -> Self {
        Self {
            clock,
            random,
            mail,
            camera,
            presenter,
        }
    }

    /// 全桩环境（固定时钟 + 确定性随机），测试与检查模式用
    pub fn silent(now: Timestamp) -> Self {
        Self {
            clock: Box::new(FixedClock(now)),
            random: Box::new(SequenceRandom::default()),
            mail: Box::new(NullMailSender),
            camera: Box::new(NullCamera),
            presenter: Box::new(SilentPresenter),
        }
    }
}

/// 固定时钟
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

/// 按脚本回放的随机源
///
/// 依次返回预置序列中的值（钳制进请求区间），耗尽后回退 `min`。
#[derive(Default)]
pub struct SequenceRandom {
    values: Vec<i64>,
    cursor: usize,
}

impl SequenceRandom {
    pub fn new(values: Vec<i64>) -> Self {
        Self { values, cursor: 0 }
    }
}

impl RandomSource for SequenceRandom {
    fn uniform(&mut self, min: i64, max: i64) -> i64 {
        if min > max {
            return min;
        }
        match self.values.get(self.cursor) {
            Some(&v) => {
                self.cursor += 1;
                v.clamp(min, max)
            }
            None => min,
        }
    }
}

/// 丢弃一切的邮件桩
pub struct NullMailSender;

impl MailSender for NullMailSender {
    fn send(&mut self, _subject: &str, _attachments: &[String], _body: &str) {}
}

/// 丢弃一切的相机桩
pub struct NullCamera;

impl Camera for NullCamera {
    fn take_picture(&mut self, _prefix: &str) {}
}

/// 静默呈现器：不显示，问题一律选第一个答案，输入一律放弃
pub struct SilentPresenter;

impl Presenter for SilentPresenter {
    fn message(&mut self, _text: &str) {}

    fn ask(&mut self, _text: &str, answers: &[String]) -> Option<usize> {
        if answers.is_empty() { None } else { Some(0) }
    }

    fn input_number(&mut self, _prompt: &str) -> Option<i64> {
        None
    }

    fn input_text(&mut self, _prompt: &str) -> Option<String> {
        None
    }
}
