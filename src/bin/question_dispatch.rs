//! question-dispatch — 批量提交目录中的题目图片并打印识别结果
//!
//! Usage:
//!   question-dispatch <image-dir> [--config <file.yaml>]

use anyhow::{bail, Context};
use question_dispatch::{Dispatcher, DispatcherConfig, GatewayConfig, HttpGateway, PayloadSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            if args.is_empty() {
                std::process::exit(1);
            }
        }
        Some("version") | Some("--version") | Some("-V") => {
            println!("question-dispatch {}", env!("CARGO_PKG_VERSION"));
        }
        Some(_) => match run(&args).await {
            Ok(0) => {}
            Ok(failed) => {
                eprintln!("{} item(s) failed", failed);
                std::process::exit(1);
            }
            Err(err) => {
                eprintln!("error: {:#}", err);
                std::process::exit(1);
            }
        },
    }
}

fn print_usage() {
    println!(
        r#"question-dispatch — 题目图片批量识别

USAGE:
    question-dispatch <image-dir> [--config <file.yaml>]

ENVIRONMENT:
    QD_GATEWAY_URL              Analysis backend base URL
    QD_BATCH_SMALL / QD_BATCH_LARGE / QD_BATCH_THRESHOLD
    QD_MAX_WORKERS              Worker-count hint sent with each batch
    RUST_LOG                    Log filter (default: info)"#
    );
}

async fn run(args: &[String]) -> anyhow::Result<usize> {
    let dir = PathBuf::from(&args[0]);
    let config = match flag_value(args, "--config") {
        Some(path) => DispatcherConfig::from_yaml_file(&path)
            .with_context(|| format!("loading {}", path))?
            .with_env_overrides(),
        None => DispatcherConfig::from_env(),
    };

    let files = list_images(&dir)?;
    if files.is_empty() {
        bail!("no images found in {}", dir.display());
    }

    let gateway = HttpGateway::new(&GatewayConfig::from_env())?;
    let dispatcher = Dispatcher::new(Arc::new(gateway), config)?;
    dispatcher.adjust_concurrency(files.len());

    let pending: Vec<_> = files
        .iter()
        .map(|path| (path.clone(), dispatcher.submit(PayloadSource::file(path))))
        .collect();
    dispatcher.shutdown().await;

    let mut failed = 0;
    for (path, rx) in pending {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        match rx.await {
            Ok(Ok(question)) => {
                println!("[ok]   {} [{}] {}", name, question.question_type, question.question_text);
                for option in &question.options {
                    println!("         {}", option);
                }
            }
            Ok(Err(err)) => {
                failed += 1;
                println!("[fail] {} ({}): {}", name, err.class(), err);
            }
            Err(_) => {
                failed += 1;
                println!("[fail] {}: no outcome", name);
            }
        }
    }
    println!("{} of {} item(s) recognized", files.len() - failed, files.len());
    Ok(failed)
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn list_images(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image(p))
        .collect();
    files.sort();
    Ok(files)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
