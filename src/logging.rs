//! # Logging モジュール
//!
//! 捜索救助シミュレーションのログ管理機能を提供します。
//!
//! tracing-subscriber によるコンソール出力と、tracing-appender による
//! 非ブロッキングなファイル出力（日次ローテーション・JSON形式）を
//! 組み合わせます。ステップ処理の速度に影響を与えないよう、ファイル
//! 書き込みは専用スレッドで行われます。
//!
//! ## 出力先
//!
//! - `Console`: コンソールのみ（コンパクト形式）
//! - `File`: ファイルのみ（logs/sarsim.YYYY-MM-DD、JSON形式）
//! - `Both`: コンソールとファイルの両方

use std::str::FromStr;
use tracing::Level;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// ログ出力先の設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogOutput {
    /// コンソールのみ
    Console,
    /// ファイルのみ
    File,
    /// コンソールとファイルの両方
    Both,
}

impl FromStr for LogOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" | "stdout" => Ok(LogOutput::Console),
            "file" => Ok(LogOutput::File),
            "both" | "all" => Ok(LogOutput::Both),
            _ => Err(format!("無効な出力先: {}. 利用可能: console, file, both", s)),
        }
    }
}

/// ログ設定構造体
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// ログレベル
    pub level: Level,
    /// 出力先
    pub output: LogOutput,
    /// ログファイルのディレクトリ（File または Both の場合）
    pub log_dir: String,
    /// ログファイル名のプレフィックス
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            output: LogOutput::Console,
            log_dir: "logs".to_string(),
            file_prefix: "sarsim".to_string(),
        }
    }
}

/// ログシステムを初期化
///
/// 指定された設定に基づいて tracing-subscriber の Registry を構成します。
/// レベルは環境変数 `RUST_LOG` が設定されていればそちらが優先されます。
/// ファイル出力時は書き込みガードを意図的にリークさせ、プロセス終了まで
/// 非同期書き込みを維持します。
///
/// # 引数
///
/// * `config` - ログ設定
///
/// # 戻り値
///
/// 初期化に成功した場合は Ok(())、失敗した場合はエラー
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_string()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = || {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
    };

    match config.output {
        LogOutput::Console => {
            Registry::default()
                .with(env_filter)
                .with(console_layer())
                .init();
        }
        LogOutput::File => {
            ensure_log_directory(&config.log_dir)?;
            let file_appender = rolling::daily(&config.log_dir, &config.file_prefix);
            let (non_blocking_appender, guard) = non_blocking(file_appender);

            Registry::default()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(non_blocking_appender)
                        .with_ansi(false)
                        .with_target(true)
                        .json(),
                )
                .init();

            // ガードをリークさせて非同期書き込みを維持
            std::mem::forget(guard);
        }
        LogOutput::Both => {
            ensure_log_directory(&config.log_dir)?;
            let file_appender = rolling::daily(&config.log_dir, &config.file_prefix);
            let (non_blocking_appender, guard) = non_blocking(file_appender);

            Registry::default()
                .with(env_filter)
                .with(console_layer())
                .with(
                    fmt::layer()
                        .with_writer(non_blocking_appender)
                        .with_ansi(false)
                        .with_target(true)
                        .json(),
                )
                .init();

            std::mem::forget(guard);
        }
    }

    Ok(())
}

/// ログレベルを文字列から解析
///
/// 無効な文字列の場合は警告を出して INFO を返します。
pub fn parse_log_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!("警告: 無効なログレベル '{}'. INFOを使用します", level_str);
            Level::INFO
        }
    }
}

/// ログディレクトリを作成
///
/// ファイル出力時、ディレクトリが存在しなければ作成します。
pub fn ensure_log_directory(log_dir: &str) -> Result<(), std::io::Error> {
    std::fs::create_dir_all(log_dir)?;
    Ok(())
}
