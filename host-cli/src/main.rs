//! # Regimen CLI
//!
//! regimen 脚本的无界面宿主。
//!
//! ## 用法
//!
//! ```bash
//! # 检查脚本（文件或目录），打印诊断
//! cargo run -p host-cli -- check scripts/main.rgm
//! cargo run -p host-cli -- check scripts/
//!
//! # 导出编译后的定义为 JSON
//! cargo run -p host-cli -- dump scripts/main.rgm --pretty
//!
//! # 运行一个过程（系统时钟 + 真随机），可选恢复 / 写回会话
//! cargo run -p host-cli -- run scripts/main.rgm --procedure startup
//! cargo run -p host-cli -- run scripts/main.rgm --procedure startup --state session.sav --save
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rand::Rng;
use walkdir::WalkDir;

use regimen_runtime::runtime::env::{
    Camera, Clock, Environment, MailSender, Presenter, RandomSource,
};
use regimen_runtime::script::Timestamp;
use regimen_runtime::{CompileResult, DiagnosticLevel, Engine, analyze, load};

#[derive(Parser)]
#[command(name = "regimen")]
#[command(about = "regimen 脚本的无界面宿主 - 检查、导出与运行")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 检查脚本并打印诊断
    Check {
        /// 脚本文件或目录（目录时递归检查所有 .rgm 文件）
        path: PathBuf,

        /// 把 Warn 级诊断也当作失败
        #[arg(long)]
        strict: bool,
    },

    /// 导出编译后的定义为 JSON
    Dump {
        /// 脚本文件路径
        script: PathBuf,

        /// 缩进输出
        #[arg(long)]
        pretty: bool,
    },

    /// 运行一个过程
    Run {
        /// 脚本文件路径
        script: PathBuf,

        /// 要执行的过程名
        #[arg(short, long)]
        procedure: String,

        /// 会话存档文件（存在则恢复）
        #[arg(short, long)]
        state: Option<PathBuf>,

        /// 运行结束后把会话写回存档文件
        #[arg(long, requires = "state")]
        save: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { path, strict } => check(&path, strict),
        Commands::Dump { script, pretty } => dump(&script, pretty),
        Commands::Run {
            script,
            procedure,
            state,
            save,
        } => run(&script, &procedure, state.as_deref(), save),
    };
    if let Err(e) = result {
        eprintln!("❌ {e:#}");
        std::process::exit(1);
    }
}

/// 加载单个脚本并打印全部诊断；返回是否有失败级别的诊断
fn check_one(path: &Path, strict: bool) -> Result<bool> {
    let result = load(path).with_context(|| format!("加载 {} 失败", path.display()))?;
    let mut failed = false;
    let mut diagnostics = result.diagnostics.clone();
    diagnostics.extend(analyze(&result.script));

    for diag in &diagnostics {
        println!("{}: {diag}", path.display());
        failed |= match diag.level {
            DiagnosticLevel::Error => true,
            DiagnosticLevel::Warn => strict,
            DiagnosticLevel::Info => false,
        };
    }
    println!(
        "✅ {}: {} 个定义",
        path.display(),
        result.script.definition_count()
    );
    Ok(failed)
}

fn check(path: &Path, strict: bool) -> Result<()> {
    let mut failed = false;
    if path.is_dir() {
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().is_some_and(|e| e == "rgm")
            {
                failed |= check_one(entry.path(), strict)?;
            }
        }
    } else {
        failed = check_one(path, strict)?;
    }
    if failed {
        bail!("检查未通过");
    }
    Ok(())
}

fn dump(script: &Path, pretty: bool) -> Result<()> {
    let CompileResult { script, .. } =
        load(script).with_context(|| format!("加载 {} 失败", script.display()))?;
    let json = if pretty {
        serde_json::to_string_pretty(&script)?
    } else {
        serde_json::to_string(&script)?
    };
    println!("{json}");
    Ok(())
}

fn run(script: &Path, procedure: &str, state: Option<&Path>, save: bool) -> Result<()> {
    let result = load(script).with_context(|| format!("加载 {} 失败", script.display()))?;
    for diag in &result.diagnostics {
        eprintln!("{diag}");
    }

    let env = Environment::new(
        Box::new(SystemClock),
        Box::new(ThreadRandom),
        Box::new(ConsoleMail),
        Box::new(ConsoleCamera),
        Box::new(ConsolePresenter),
    );
    let mut engine = Engine::new(result.script, env);

    if let Some(path) = state
        && path.exists()
    {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取存档 {} 失败", path.display()))?;
        engine
            .restore_state(&text)
            .context("恢复会话失败")?;
    }

    engine.run_procedure(procedure);
    engine.tick();

    if save && let Some(path) = state {
        std::fs::write(path, engine.save_state())
            .with_context(|| format!("写入存档 {} 失败", path.display()))?;
        println!("💾 会话已保存到 {}", path.display());
    }
    Ok(())
}

// ── 真实协作者 ──

struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Local::now().naive_local()
    }
}

struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn uniform(&mut self, min: i64, max: i64) -> i64 {
        if min > max {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }
}

struct ConsoleMail;

impl MailSender for ConsoleMail {
    fn send(&mut self, subject: &str, attachments: &[String], body: &str) {
        if attachments.is_empty() {
            println!("📧 {subject}: {body}");
        } else {
            println!("📧 {subject} [{}]: {body}", attachments.join(", "));
        }
    }
}

struct ConsoleCamera;

impl Camera for ConsoleCamera {
    fn take_picture(&mut self, prefix: &str) {
        println!("📷 拍照: {prefix}");
    }
}

/// 终端呈现器：消息打到标准输出，问题从标准输入读选项序号（1 起）
struct ConsolePresenter;

impl ConsolePresenter {
    fn read_line(&self, prompt: &str) -> Option<String> {
        print!("{prompt}> ");
        std::io::stdout().flush().ok()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).ok()?;
        let line = line.trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

impl Presenter for ConsolePresenter {
    fn message(&mut self, text: &str) {
        println!("{text}");
    }

    fn ask(&mut self, text: &str, answers: &[String]) -> Option<usize> {
        println!("{text}");
        for (i, answer) in answers.iter().enumerate() {
            println!("  {}. {answer}", i + 1);
        }
        let choice: usize = self.read_line("")?.parse().ok()?;
        (1..=answers.len()).contains(&choice).then(|| choice - 1)
    }

    fn input_number(&mut self, prompt: &str) -> Option<i64> {
        self.read_line(prompt)?.parse().ok()
    }

    fn input_text(&mut self, prompt: &str) -> Option<String> {
        self.read_line(prompt)
    }
}
