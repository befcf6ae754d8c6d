//! rstoggler 命令行：离线评估、校验规则文件，或从标准输入模拟流式消息

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rstoggler::{
    spawn_toggler, CompileOutcome, ConfigManager, ContentUnit, Evaluation, FiredState, GlobalConfig,
    summarize_rule, MemoryContentSource, MemoryFlagRegistry, Rule, RuleStore, RuleTransfer,
    TriggerCompiler, TriggerEngine,
};

#[derive(Debug, Parser)]
#[command(name = "rstoggler", version, about = "按正则规则自动切换提示词开关")]
struct Cli {
    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 对一段文本评估规则并输出开关变更
    Eval {
        /// 规则文件（JSON数组）
        #[arg(long)]
        rules: PathBuf,
        /// 开关文件（{id: {enabled, name}}）
        #[arg(long)]
        flags: PathBuf,
        /// 待评估文本，缺省时读取标准输入
        #[arg(long)]
        text: Option<String>,
        /// 以JSON输出
        #[arg(long)]
        json: bool,
    },
    /// 校验规则文件：报告空规则与无效正则
    Check {
        #[arg(long)]
        rules: PathBuf,
        /// 开关文件，提供时以显示名称展示目标
        #[arg(long)]
        flags: Option<PathBuf>,
    },
    /// 从标准输入读取流式消息："user:" 开头为用户发言，"---" 开始新的回复，其余行追加到当前回复
    Stream {
        #[arg(long)]
        rules: PathBuf,
        #[arg(long)]
        flags: PathBuf,
        /// 防抖静默期（毫秒）
        #[arg(long, default_value_t = 200)]
        debounce_ms: u64,
    },
}

/// 流式输入中用户发言的行前缀，例如 "user: 你好"
static USER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*user\s*:\s*(.*)$").unwrap()
});

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigManager::custom().verbose(cli.verbose).build();
    init_tracing(&config);

    match cli.command {
        Command::Eval { rules, flags, text, json } => run_eval(&rules, &flags, text, json).await,
        Command::Check { rules, flags } => run_check(&rules, flags.as_deref()).await,
        Command::Stream { rules, flags, debounce_ms } => {
            let config = GlobalConfig {
                debounce_delay: Duration::from_millis(debounce_ms),
                ..config
            };
            run_stream(&config, &rules, &flags).await
        }
    }
}

fn init_tracing(config: &GlobalConfig) {
    let default_level = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_rules(path: &Path) -> Result<Vec<Rule>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("读取规则文件失败：{}", path.display()))?;
    Ok(RuleTransfer::parse_rules(&content)?)
}

async fn load_flags(path: &Path) -> Result<MemoryFlagRegistry> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("读取开关文件失败：{}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("开关文件格式无效：{}", path.display()))
}

async fn run_eval(rules: &Path, flags: &Path, text: Option<String>, as_json: bool) -> Result<()> {
    let rules = load_rules(rules).await?;
    let mut registry = load_flags(flags).await?;

    let text = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await.context("读取标准输入失败")?;
            buf
        }
    };

    let mut engine = TriggerEngine::new();
    let mut fired = FiredState::new();
    let evaluation = engine.run(&text, &rules, &mut fired, &mut registry);

    for skipped in &evaluation.skipped {
        warn!("规则#{} 已跳过：{}", skipped.index, skipped.reason);
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report_json(&evaluation, &fired, &registry))?);
    } else {
        print_report(&evaluation, &registry);
    }
    Ok(())
}

async fn run_check(rules: &Path, flags: Option<&Path>) -> Result<()> {
    let rules = load_rules(rules).await?;
    let registry = match flags {
        Some(path) => Some(load_flags(path).await?),
        None => None,
    };
    let mut compiler = TriggerCompiler::new();
    let (outcomes, stats) = compiler.compile_all(&rules);

    for (index, (rule, outcome)) in rules.iter().zip(&outcomes).enumerate() {
        let status = match outcome {
            CompileOutcome::Ready(_) if rule.enabled => "ok".to_string(),
            CompileOutcome::Ready(_) => "disabled".to_string(),
            CompileOutcome::Inert => "inert".to_string(),
            CompileOutcome::Invalid(reason) => format!("invalid: {}", reason),
        };
        match &registry {
            Some(registry) => println!("#{:<3} {:<10} {}", index, status, summarize_rule(rule, registry)),
            None => println!("#{:<3} {:<10} {}", index, status, rule),
        }
    }
    println!("ok={} inert={} invalid={}", stats.ready, stats.inert, stats.invalid);

    if stats.invalid > 0 {
        bail!("{} 条规则的正则无效", stats.invalid);
    }
    Ok(())
}

async fn run_stream(config: &GlobalConfig, rules: &Path, flags: &Path) -> Result<()> {
    let rules = load_rules(rules).await?;
    let registry = Arc::new(Mutex::new(load_flags(flags).await?));

    let store = Arc::new(RwLock::new(RuleStore::from_legacy(&config.default_profile, rules)));
    let source = Arc::new(MemoryContentSource::new());

    let handle = spawn_toggler(config, Arc::clone(&source), store, Arc::clone(&registry));
    // 让观察器先完成订阅
    tokio::task::yield_now().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut start_new = true;
    while let Some(line) = lines.next_line().await.context("读取标准输入失败")? {
        if let Some(caps) = USER_LINE.captures(&line) {
            source.push(ContentUnit::own(caps[1].trim()));
            start_new = true;
        } else if line.trim() == "---" {
            start_new = true;
        } else if start_new {
            source.push(ContentUnit::external(line));
            start_new = false;
        } else {
            source.append_to_last(&format!("\n{}", line));
        }
    }

    source.close();
    handle.join().await;

    let registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
    info!("流结束，共提交 {} 次", registry.commit_count());
    for (id, entry) in registry.entries() {
        println!("{}\t{}\t{}", id, entry.enabled, entry.display_name);
    }
    Ok(())
}

fn print_report(evaluation: &Evaluation, registry: &MemoryFlagRegistry) {
    if evaluation.mutations.is_empty() {
        println!("无开关变更");
    }
    for mutation in &evaluation.mutations {
        println!("{} -> {} ({})", mutation.flag_id, mutation.enabled, mutation.display_name);
    }
    println!("---");
    for (id, entry) in registry.entries() {
        println!("{}\t{}", id, entry.enabled);
    }
}

fn report_json(evaluation: &Evaluation, fired: &FiredState, registry: &MemoryFlagRegistry) -> serde_json::Value {
    let mutations: Vec<_> = evaluation
        .mutations
        .iter()
        .map(|m| json!({"flagId": m.flag_id, "enabled": m.enabled, "displayName": m.display_name}))
        .collect();
    let skipped: Vec<_> = evaluation
        .skipped
        .iter()
        .map(|s| json!({"index": s.index, "reason": s.reason}))
        .collect();
    json!({
        "mutations": mutations,
        "fired": fired.iter().collect::<Vec<_>>(),
        "skipped": skipped,
        "flags": registry,
    })
}
