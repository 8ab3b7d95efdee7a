use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use segment_sql::config::{ConfigError, SegmentConfig, DEFAULT_CONFIG_PATH};
use segment_sql::operator::FieldType;
use segment_sql::sql_parser::parse_sql;
use segment_sql::{validate_criteria, SegmentDefinition, SegmentEditor};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "分段条件树与SQL之间的相互转换", long_about = None)]
struct Cli {
    /// JSON配置文件路径，默认读取当前目录下的 segment_config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 把分段定义编译为SQL
    Generate { segment: PathBuf },
    /// 把SQL反向解析为条件树（参数、--file 或标准输入）
    Parse {
        sql: Option<String>,
        #[arg(long, conflicts_with = "sql")]
        file: Option<PathBuf>,
    },
    /// 生成预览或计数语句
    Preview {
        segment: PathBuf,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long)]
        count: bool,
    },
    /// 检查分段定义中的运算符和字段
    Validate { segment: PathBuf },
    /// 列出每种字段类型可用的运算符
    Operators {
        #[arg(value_parser = parse_field_type)]
        field_type: Option<FieldType>,
    },
    /// 交互式SQL编辑器
    Editor {
        #[arg(long)]
        segment: Option<PathBuf>,
        #[arg(long, default_value = "customers")]
        dataset: String,
    },
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Generate { segment } => {
            let segment = read_segment(&segment)?;
            info!(segment = %segment.segment_id, dataset = %segment.dataset, "generating SQL");
            println!("{}", config.compiler().compile_segment(&segment));
        }
        Command::Parse { sql, file } => {
            let sql = match (sql, file) {
                (Some(sql), _) => sql,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("无法读取SQL文件 {}", path.display()))?,
                (None, None) => {
                    let mut input = String::new();
                    io::stdin().read_to_string(&mut input).context("无法读取标准输入")?;
                    input
                }
            };
            let parsed = parse_sql(&sql);
            for fragment in &parsed.dropped {
                warn!(reason = %fragment.reason, text = %fragment.text, "dropped SQL fragment");
            }
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
        Command::Preview { segment, limit, count } => {
            let segment = read_segment(&segment)?;
            let compiler = config.compiler();
            let statement = if count {
                compiler.count_sql(&segment.dataset, &segment.filter_criteria)
            } else {
                let limit = limit.unwrap_or(config.preview.limit);
                compiler.preview_sql(&segment.dataset, &segment.filter_criteria, limit)
            };
            println!("{}", statement);
        }
        Command::Validate { segment } => {
            let segment = read_segment(&segment)?;
            let issues = validate_criteria(&segment.filter_criteria, &segment.dataset, &config);
            if issues.is_empty() {
                println!("✅ {} 没有发现问题", segment.segment_id);
            } else {
                for issue in &issues {
                    println!("• {}", issue);
                }
                bail!("{} 有 {} 个问题", segment.segment_id, issues.len());
            }
        }
        Command::Operators { field_type } => {
            let families = match field_type {
                Some(field_type) => vec![field_type],
                None => FieldType::ALL.to_vec(),
            };
            for family in families {
                let operators: Vec<&str> = config
                    .operators
                    .operators_for(family)
                    .iter()
                    .map(|op| op.as_str())
                    .collect();
                println!("{}: {}", family, operators.join(", "));
            }
        }
        Command::Editor { segment, dataset } => {
            let editor = match segment {
                Some(path) => SegmentEditor::from_segment(read_segment(&path)?, config.compiler()),
                None => SegmentEditor::new(dataset, config.compiler()),
            };
            run_editor(editor)?;
        }
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
    Ok(())
}

/// 优先使用JSON配置；未指定路径且默认文件不存在时使用默认配置
fn load_config(path: Option<&Path>) -> Result<SegmentConfig> {
    if let Some(path) = path {
        let config = SegmentConfig::from_json_file(path)?;
        info!(path = %path.display(), "loaded configuration");
        return Ok(config);
    }

    match SegmentConfig::from_json_file(DEFAULT_CONFIG_PATH) {
        Ok(config) => {
            info!(path = DEFAULT_CONFIG_PATH, "loaded configuration");
            Ok(config)
        }
        Err(e @ ConfigError::NotFound(_)) => {
            warn!("{}, using default configuration", e);
            Ok(SegmentConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

fn read_segment(path: &Path) -> Result<SegmentDefinition> {
    let content =
        fs::read_to_string(path).with_context(|| format!("无法读取分段定义 {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("无法解析分段定义 {}", path.display()))
}

fn parse_field_type(s: &str) -> Result<FieldType, String> {
    FieldType::ALL
        .into_iter()
        .find(|field_type| field_type.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("unknown field type `{}`", s))
}

fn run_editor(mut editor: SegmentEditor) -> Result<()> {
    let mut rl = DefaultEditor::new().context("无法初始化行编辑器")?;
    println!("--- 分段SQL编辑器 ({}) ---", editor.dataset());
    println!("输入以 ; 结尾的SQL，命令: :tree :sql :dropped :quit");
    println!("{}", editor.sql());

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() { "sql> " } else { "...> " };
        match rl.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if buffer.is_empty() && trimmed.starts_with(':') {
                    rl.add_history_entry(trimmed).ok();
                    match trimmed {
                        ":quit" | ":q" => break,
                        ":tree" => println!("{}", serde_json::to_string_pretty(editor.criteria())?),
                        ":sql" => println!("{}", editor.sql()),
                        ":dropped" => print_dropped(&editor),
                        other => println!("未知命令: {}", other),
                    }
                    continue;
                }

                if !buffer.is_empty() {
                    buffer.push('\n');
                }
                buffer.push_str(&line);
                if trimmed.ends_with(';') {
                    let sql = std::mem::take(&mut buffer);
                    rl.add_history_entry(sql.as_str()).ok();
                    apply_edit(&mut editor, &sql);
                }
            }
            Err(ReadlineError::Interrupted) => buffer.clear(),
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err).context("读取输入失败"),
        }
    }
    Ok(())
}

fn apply_edit(editor: &mut SegmentEditor, sql: &str) {
    if !editor.has_unsaved_changes(sql) {
        println!("没有变化");
        return;
    }

    let dropped = editor.apply_sql(sql).len();
    let regenerated = editor.sql();
    debug!(sql = %regenerated, "editor regenerated SQL");
    println!("{}", regenerated);
    if dropped > 0 {
        println!("⚠️ 有损转换: {} 个片段被丢弃 (:dropped 查看)", dropped);
    } else if editor.has_unsaved_changes(sql) {
        println!("✓ 已解析，SQL已规范化");
    } else {
        println!("✓ 已解析");
    }
}

fn print_dropped(editor: &SegmentEditor) {
    if editor.dropped().is_empty() {
        println!("没有被丢弃的片段");
    }
    for fragment in editor.dropped() {
        println!("• {}", fragment);
    }
}
