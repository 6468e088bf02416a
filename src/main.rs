mod environment;
mod logging;
mod models;
mod scenario;

use clap::{Arg, Command};
use rand::Rng;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{Level, error, info};

use environment::Environment;
use logging::{LogConfig, LogOutput, init_logging};
use models::{GridPosition, ObservationMask, RescueTarget, SearchAgent};
use scenario::ScenarioConfig;

fn main() {
    // コマンドライン引数の解析
    let matches = Command::new("sarsim")
        .version("0.1.0")
        .about("捜索救助シミュレーション (Search and Rescue Simulation)")
        .long_about(
            "グリッドワールド上のマルチエージェント捜索救助シミュレータ\n\
             離散時間ステップでエージェントを動かし、ステップ毎のテレメトリを\n\
             JSONエピソードログとして生成します。",
        )
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定")
                .long_help(
                    "実行するシナリオファイル(.yaml)のパスを指定します。\n\
                     指定しない場合、利用可能なシナリオ一覧を表示します。",
                ),
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(clap::ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了")
                .conflicts_with("test"),
        )
        .arg(
            Arg::new("test")
                .short('t')
                .long("test")
                .action(clap::ArgAction::SetTrue)
                .help("モデルの生成テストを実行")
                .conflicts_with("info"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("詳細出力レベル (-v: 基本, -vv: グリッド表示, -vvv: デバッグ)"),
        )
        .arg(
            Arg::new("log")
                .long("log")
                .value_name("DEST")
                .default_value("console")
                .help("ログ出力先 (console, file, both)"),
        )
        .get_matches();

    println!("捜索救助シミュレーション (Search and Rescue Simulation) - sarsim v0.1.0");
    println!();

    // 詳細レベルの設定
    let verbose_level = matches.get_count("verbose");

    // ログシステムの初期化
    let log_output = matches
        .get_one::<String>("log")
        .map(|s| LogOutput::from_str(s))
        .unwrap_or(Ok(LogOutput::Console));
    let log_output = match log_output {
        Ok(output) => output,
        Err(e) => {
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        }
    };
    let log_config = LogConfig {
        level: match verbose_level {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        },
        output: log_output,
        ..LogConfig::default()
    };
    if let Err(e) = init_logging(log_config) {
        eprintln!("ログ初期化エラー: {}", e);
    }

    // テストモードの実行
    if matches.get_flag("test") {
        println!("=== モデルテストモード ===");
        test_models();
        return;
    }

    // シナリオファイルの処理
    if let Some(scenario_path) = matches.get_one::<String>("scenario") {
        match run_scenario(scenario_path, matches.get_flag("info"), verbose_level) {
            Ok(_) => {
                if verbose_level > 0 {
                    println!("シナリオ実行が正常に完了しました。");
                }
            }
            Err(e) => {
                eprintln!("エラー: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        // デフォルト動作: 利用可能なシナリオ一覧を表示
        show_default_help();
    }
}

/// モデルの生成テスト
fn test_models() {
    println!("\n=== モデルの生成テスト ===");

    // エージェントの作成
    let agent = SearchAgent::new(
        "agent_0".to_string(),
        GridPosition::new(0, 0),
        GridPosition::new(2, 1),
    );
    println!("エージェントが作成されました: {} (ゴール: {:?})", agent.id, agent.goal.to_array());

    // 計画経路の生成
    let path: Vec<[i32; 2]> = agent.planned_path().iter().map(|p| p.to_array()).collect();
    println!("計画経路が生成されました: {:?}", path);

    // 要救助者の作成
    let target = RescueTarget::new(GridPosition::new(5, 5));
    println!("要救助者が作成されました: 位置 {:?}", target.position.to_array());
    println!(
        "検知判定: (5,4)から -> {}",
        target.is_detected_from(&GridPosition::new(5, 4))
    );

    // 観測マスクの生成
    let mask = ObservationMask::generate(&GridPosition::new(0, 0), 10, 3);
    println!("観測マスクが生成されました: {:?}", mask.rows());

    println!("\n全てのモデルが正常に作成されました！");
}

/// シナリオファイルを読み込んで実行
fn run_scenario(
    scenario_path: &str,
    info_only: bool,
    verbose_level: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    // シナリオファイルの読み込み
    let scenario = ScenarioConfig::from_file(scenario_path)?;

    if verbose_level > 0 {
        println!("シナリオファイル読み込み完了: {}", scenario_path);
    }

    // 情報表示のみの場合
    if info_only {
        scenario.print_summary();
        return Ok(());
    }

    // 基本情報表示
    scenario.print_summary();
    println!();

    execute_episode(&scenario, verbose_level)?;

    Ok(())
}

/// 1エピソードを実行
///
/// 環境を構築し、終了フラグが立つまで一様乱数で行動を選択して
/// ステップを進めます。終了後にエピソードログを書き出します。
fn execute_episode(
    config: &ScenarioConfig,
    verbose_level: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut env = Environment::new(config)?;
    let agent_ids = env.agent_ids();
    let mut rng = rand::thread_rng();
    let mut total_rewards: BTreeMap<String, f64> = BTreeMap::new();

    info!("=== エピソード実行開始 ===");

    while !env.is_done() {
        // 行動の一様乱数サンプリング（外部の行動供給の代替）
        let actions: BTreeMap<String, u8> = agent_ids
            .iter()
            .map(|id| (id.clone(), rng.gen_range(0..=4u8)))
            .collect();

        let outcome = env.step(&actions)?;

        for (agent_id, reward) in &outcome.rewards {
            *total_rewards.entry(agent_id.clone()).or_insert(0.0) += reward;
        }

        if verbose_level > 1 {
            println!("--- Step {} ---", env.step_count);
            println!("{}", env.render());
            println!();
        }
    }

    info!("=== エピソード完了 ===");
    println!("総ステップ数: {}", env.step_count);
    println!("テレメトリ記録数: {}", env.episode_log.len());
    for (agent_id, reward) in &total_rewards {
        println!("  {}: 累積報酬 {:.1}", agent_id, reward);
    }

    // エピソードログの書き出し（失敗しても続行可能）
    match env.close() {
        Ok(_) => println!("エピソードログ: {}", env.output_path),
        Err(e) => error!("{}", e),
    }

    Ok(())
}

/// デフォルトヘルプとシナリオ一覧を表示
fn show_default_help() {
    println!("使用方法:");
    println!("  sarsim [オプション]");
    println!();
    println!("オプション:");
    println!("  -s, --scenario <FILE>  シナリオファイルを指定して実行");
    println!("  -i, --info             シナリオ情報のみ表示");
    println!("  -t, --test             モデルの生成テスト実行");
    println!("  -v, --verbose          詳細出力 (複数指定で詳細レベル上昇)");
    println!("      --log <DEST>       ログ出力先 (console, file, both)");
    println!("  -h, --help             このヘルプを表示");
    println!();
    println!("利用可能なシナリオファイル:");
    println!("  scenarios/scenario_basic_search.yaml  - 基本捜索シナリオ");
    println!("  scenarios/scenario_multi_agent.yaml   - 複数エージェントシナリオ");
    println!("  scenarios/scenario_replay_seed.yaml   - シード固定の再現実行用");
    println!();
    println!("例:");
    println!("  sarsim -s scenarios/scenario_basic_search.yaml");
    println!("  sarsim -s scenarios/scenario_multi_agent.yaml -vv");
    println!("  sarsim -s scenarios/scenario_replay_seed.yaml -i");
    println!("  sarsim --test");
}
