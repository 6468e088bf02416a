//! # Environment モジュール
//!
//! 捜索救助シミュレーションの中核となる環境状態機械を提供します。
//!
//! このモジュールは、有界グリッド上の複数エージェントの状態遷移を管理し、
//! 局所観測の生成、ゴールへの貪欲経路の合成、エージェントごとの
//! テレメトリ記録の組み立てと永続化を行います。
//!
//! ## 主要機能
//!
//! - **ライフサイクル管理**: new（構築） / reset / step / close
//! - **観測生成**: エージェント中心の可視性マスク（範囲内判定のみ）
//! - **検知判定**: チェビシェフ距離によるエージェント毎の要救助者検知
//! - **テレメトリ組み立て**: ステップ毎のスナップショット生成とログ追記
//!
//! ## ステップ処理順序
//!
//! 各ステップにおいて、以下の順序で処理が実行されます：
//!
//! 1. **入力検証**: 全行動コードとエージェントIDの検証（変更前に完了）
//! 2. **エージェント更新**: 入力順に移動・訪問記録・検知判定・記録生成
//! 3. **カウンタ更新**: 全エージェント処理後にステップカウンタを1回加算
//! 4. **終了判定**: カウンタが最大ステップ数に達した時点で `__all__` が真
//!
//! 終了はグローバルフラグのみで、エージェント個別の終了フラグは常に偽です。
//! エージェント単位でエピソードを打ち切ることはありません。
//!
//! ## 使用例
//!
//! ```rust
//! use sarsim::environment::Environment;
//! use sarsim::scenario::ScenarioConfig;
//!
//! // シナリオファイルを読み込み
//! let config = ScenarioConfig::from_file("scenarios/scenario_basic_search.yaml")?;
//!
//! // 環境を構築（初回リセットを含む）
//! let mut env = Environment::new(&config)?;
//!
//! // 行動を与えて1ステップ進める
//! let actions = env.agent_ids().iter().map(|id| (id.clone(), 4u8)).collect();
//! let outcome = env.step(&actions)?;
//!
//! // エピソードログを書き出して終了
//! env.close()?;
//! ```
//!
//! 環境は単一スレッド・同期・非リエントラントです。内部ロックは持たず、
//! 同時に実行できる `step`/`reset`/`close` は高々1つであることを
//! 呼び出し側が保証する必要があります。

use std::collections::{BTreeMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Local;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::models::{
    Action, AgentStepRecord, EpisodeLog, GridPosition, ObservationMask, OutputError,
    RescueTarget, SearchAgent, battery_level, scan_confidence,
};
use crate::scenario::ScenarioConfig;

/// グローバル終了フラグのキー
pub const ALL_DONE_KEY: &str = "__all__";

/// 検知1件あたりの報酬
pub const REWARD_PER_DETECTION: f64 = 10.0;

/// エージェントごとの補足情報（現行モデルでは常に空）
pub type AgentInfo = serde_json::Map<String, serde_json::Value>;

/// 捜索救助環境
///
/// シミュレーション状態の全てを保持する環境本体です。構築時に確定する
/// 固定設定と、`reset()` でクリアされるエピソード可変状態からなります。
/// 乱数シードが同一であれば決定的に動作します。
pub struct Environment {
    /// グリッドの一辺のセル数（構築時に確定）
    pub grid_size: i32,
    /// 捜索エージェント数（構築時に確定）
    pub num_agents: usize,
    /// 要救助者数（構築時に確定）
    pub num_targets: usize,
    /// 観測マスクの一辺のセル数（構築時に確定、奇数）
    pub observation_size: usize,
    /// エピソードの最大ステップ数（構築時に確定）
    pub max_steps: u64,
    /// エピソードログの出力先パス
    pub output_path: String,
    /// 設定された乱数シード（未指定なら時刻ベース）
    pub seed: Option<u64>,

    /// 捜索エージェント（ID昇順、エピソードをまたいで不変の集合）
    pub agents: Vec<SearchAgent>,
    /// 要救助者の集合（リセット時に確定、エピソード中不変）
    pub targets: Vec<RescueTarget>,
    /// いずれかのエージェントが通過した全セル（エピソード内で単調増加）
    pub visited: HashSet<GridPosition>,
    /// エピソードログ（追記専用）
    pub episode_log: EpisodeLog,
    /// エージェントごとの最新ステップ記録
    pub agent_states: BTreeMap<String, AgentStepRecord>,
    /// グローバルステップカウンタ
    pub step_count: u64,

    rng: StdRng,
}

/// 1ステップの処理結果
///
/// 各マップのキーはエージェントIDで、`dones` のみ追加で
/// グローバル終了フラグ `__all__` を含みます。`records` は入力の
/// 反復順（ID昇順）に対応します。
pub struct StepOutcome {
    /// エージェントごとの観測マスク（移動後の位置基準）
    pub observations: BTreeMap<String, ObservationMask>,
    /// エージェントごとの報酬（検知数 × 10.0）
    pub rewards: BTreeMap<String, f64>,
    /// 終了フラグ（エージェント個別は常にfalse、`__all__` のみ終了を示す）
    pub dones: BTreeMap<String, bool>,
    /// エージェントごとの補足情報（常に空マップ）
    pub infos: BTreeMap<String, AgentInfo>,
    /// このステップで生成されたテレメトリ記録（処理順）
    pub records: Vec<AgentStepRecord>,
}

impl Environment {
    /// シナリオ設定から環境を構築
    ///
    /// 固定設定を検証してエージェントID集合 `agent_0..agent_{n-1}` を構築し、
    /// 初回の `reset()` を実行して初期状態を生成します。
    ///
    /// # 引数
    ///
    /// * `config` - シナリオ設定
    ///
    /// # 戻り値
    ///
    /// 構築された環境。設定が不正な場合は `ConfigError`（環境は生成されない）
    pub fn new(config: &ScenarioConfig) -> Result<Self, ConfigError> {
        if config.world.grid_size <= 0 {
            return Err(ConfigError::InvalidGridSize(config.world.grid_size));
        }
        if config.world.num_agents < 1 {
            return Err(ConfigError::InvalidAgentCount(config.world.num_agents));
        }
        if config.world.observation_size == 0 || config.world.observation_size % 2 == 0 {
            return Err(ConfigError::InvalidObservationSize(
                config.world.observation_size,
            ));
        }
        if config.sim.max_steps == 0 {
            return Err(ConfigError::InvalidMaxSteps(config.sim.max_steps));
        }

        // 固定のエージェントID集合を構築（位置とゴールはreset()で割り当て）
        let agents = (0..config.world.num_agents)
            .map(|i| {
                SearchAgent::new(
                    format!("agent_{}", i),
                    GridPosition::new(0, 0),
                    GridPosition::new(0, 0),
                )
            })
            .collect();

        let mut env = Self {
            grid_size: config.world.grid_size,
            num_agents: config.world.num_agents,
            num_targets: config.world.num_targets,
            observation_size: config.world.observation_size,
            max_steps: config.sim.max_steps,
            output_path: config.output.path.clone(),
            seed: config.sim.seed,
            agents,
            targets: Vec::new(),
            visited: HashSet::new(),
            episode_log: EpisodeLog::new(),
            agent_states: BTreeMap::new(),
            step_count: 0,
            rng: StdRng::seed_from_u64(0),
        };

        env.reset();

        Ok(env)
    }

    /// エピソードをリセット
    ///
    /// 乱数源を再シードし（設定シードがあればその値、なければ現在時刻）、
    /// 全てのエピソード可変状態をクリアした上で、各エージェントの開始位置・
    /// ゴール・要救助者を独立な一様乱数で再配置します。ゴールと開始位置の
    /// 一致や、エージェント・要救助者同士の重なりは許容されます。
    ///
    /// # 戻り値
    ///
    /// エージェントIDから初期観測マスクへのマップ
    pub fn reset(&mut self) -> BTreeMap<String, ObservationMask> {
        let seed = self.seed.unwrap_or_else(time_based_seed);
        self.rng = StdRng::seed_from_u64(seed);

        self.step_count = 0;
        self.visited.clear();
        self.episode_log.clear();
        self.agent_states.clear();

        for i in 0..self.agents.len() {
            let position = self.random_position();
            let goal = self.random_position();
            self.agents[i].respawn(position, goal);
        }
        self.targets = RescueTarget::spawn_random(&mut self.rng, self.num_targets, self.grid_size);

        // 配置の診断出力（観測フック）
        info!(
            "[RESET] 要救助者配置: {:?}",
            self.targets
                .iter()
                .map(|t| t.position.to_array())
                .collect::<Vec<_>>()
        );
        info!(
            "[RESET] エージェント配置: {:?}",
            self.agents
                .iter()
                .map(|a| (a.id.as_str(), a.position.to_array()))
                .collect::<Vec<_>>()
        );
        debug!("[RESET] シード値: {}", seed);

        (0..self.agents.len())
            .map(|i| (self.agents[i].id.clone(), self.observe(i)))
            .collect()
    }

    /// 行動を適用して1ステップ進める
    ///
    /// 入力は「エージェントID → 行動コード（0=up, 1=down, 2=left, 3=right,
    /// 4=stay）」のマップです。検証は全ての変更に先行し、不正な入力で
    /// 拒否された呼び出しは内部状態を一切変更しません（エージェント間の
    /// 部分的な変更も外部から観測されません）。
    ///
    /// # 引数
    ///
    /// * `actions` - エージェントIDから行動コードへのマップ
    ///
    /// # 戻り値
    ///
    /// 観測・報酬・終了フラグ・補足情報・テレメトリ記録をまとめた結果。
    /// 行動コードが範囲外なら `StepError::InvalidAction`、未知のIDなら
    /// `StepError::UnknownAgent`
    pub fn step(&mut self, actions: &BTreeMap<String, u8>) -> Result<StepOutcome, StepError> {
        // 検証フェーズ：変更を加える前に全入力を確認する
        let mut decoded: Vec<(usize, Action)> = Vec::with_capacity(actions.len());
        for (agent_id, code) in actions {
            let index = self
                .agents
                .iter()
                .position(|a| &a.id == agent_id)
                .ok_or_else(|| StepError::UnknownAgent {
                    agent_id: agent_id.clone(),
                })?;
            let action = Action::from_code(*code).ok_or(StepError::InvalidAction {
                agent_id: agent_id.clone(),
                code: *code,
            })?;
            decoded.push((index, action));
        }

        // 更新フェーズ：入力の反復順にエージェントを処理する
        let mut observations = BTreeMap::new();
        let mut rewards = BTreeMap::new();
        let mut dones = BTreeMap::new();
        let mut infos = BTreeMap::new();
        let mut records = Vec::with_capacity(decoded.len());

        for (index, action) in decoded {
            let record = self.update_agent(index, action);
            let agent_id = self.agents[index].id.clone();

            observations.insert(agent_id.clone(), self.observe(index));
            rewards.insert(agent_id.clone(), record.reward);
            dones.insert(agent_id.clone(), false);
            infos.insert(agent_id, AgentInfo::new());
            records.push(record);
        }

        // 全エージェント処理後にカウンタを1回だけ進める
        self.step_count += 1;
        let all_done = self.step_count >= self.max_steps;
        dones.insert(ALL_DONE_KEY.to_string(), all_done);

        if all_done {
            info!(
                "エピソード終了: {}ステップ、記録{}件",
                self.step_count,
                self.episode_log.len()
            );
        }

        Ok(StepOutcome {
            observations,
            rewards,
            dones,
            infos,
            records,
        })
    }

    /// 1エージェントの更新処理
    ///
    /// 移動、訪問記録、検知判定、テレメトリ記録の生成・追記を行います。
    fn update_agent(&mut self, index: usize, action: Action) -> AgentStepRecord {
        let grid_size = self.grid_size;
        let new_pos = self.agents[index].apply_action(action, grid_size);
        self.visited.insert(new_pos);

        let detected = self
            .targets
            .iter()
            .filter(|t| t.is_detected_from(&new_pos))
            .count();
        let reward = REWARD_PER_DETECTION * detected as f64;

        if detected > 0 {
            info!(
                "[Step {}] {} が要救助者を検知 (位置: {:?}, 検知数: {})",
                self.step_count, self.agents[index].id, new_pos.to_array(), detected
            );
        }

        let agent = &self.agents[index];
        let record = AgentStepRecord {
            timestamp: Local::now().to_rfc3339(),
            agent_id: agent.id.clone(),
            position: new_pos.to_geo(),
            goal: agent.goal.to_geo(),
            action: action.as_str().to_string(),
            step_number: self.step_count,
            battery_level: battery_level(self.step_count),
            orientation: action.as_str().to_string(),
            victim_found: detected > 0,
            needs_help: false,
            reward,
            scan_confidence: scan_confidence(self.visited.len()),
            surroundings: new_pos
                .neighbors_in_bounds(grid_size)
                .iter()
                .map(GridPosition::to_array)
                .collect(),
            planned_path: agent
                .planned_path()
                .iter()
                .map(GridPosition::to_array)
                .collect(),
        };

        self.agent_states.insert(agent.id.clone(), record.clone());
        self.episode_log.append(record.clone());

        record
    }

    /// エピソードログを出力ファイルに書き出し
    ///
    /// 設定された出力パスに単一のJSON配列として書き出します。書き込み失敗は
    /// 呼び出し側に報告されますが致命的ではなく、メモリ上のログと
    /// エピソード状態はそのまま照会可能です。
    pub fn close(&self) -> Result<(), OutputError> {
        self.episode_log.write_json(&self.output_path)?;
        info!(
            "エピソードログを書き出しました: {} ({}件)",
            self.output_path,
            self.episode_log.len()
        );
        Ok(())
    }

    /// グリッドのスナップショットを文字列として生成
    ///
    /// `.` = 空きセル、`T` = 要救助者、`A` = エージェント。重なった場合は
    /// 後から描画されるエージェントが優先されます。デバッグ専用で、
    /// ステップ契約の一部ではありません。
    pub fn render(&self) -> String {
        let n = self.grid_size as usize;
        let mut grid = vec![vec!['.'; n]; n];

        for target in &self.targets {
            grid[target.position.row as usize][target.position.col as usize] = 'T';
        }
        for agent in &self.agents {
            grid[agent.position.row as usize][agent.position.col as usize] = 'A';
        }

        grid.iter()
            .map(|row| {
                row.iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// エージェントごとの最新ステップ記録を取得
    pub fn get_agent_states(&self) -> &BTreeMap<String, AgentStepRecord> {
        &self.agent_states
    }

    /// エージェントIDの一覧を取得（ID昇順）
    pub fn agent_ids(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.id.clone()).collect()
    }

    /// エピソードが終了しているかどうか
    pub fn is_done(&self) -> bool {
        self.step_count >= self.max_steps
    }

    /// 指定インデックスのエージェントの観測マスクを生成
    fn observe(&self, index: usize) -> ObservationMask {
        ObservationMask::generate(
            &self.agents[index].position,
            self.grid_size,
            self.observation_size,
        )
    }

    /// グリッド内の一様乱数位置を生成
    fn random_position(&mut self) -> GridPosition {
        GridPosition::new(
            self.rng.gen_range(0..self.grid_size),
            self.rng.gen_range(0..self.grid_size),
        )
    }
}

/// 時刻ベースの乱数シードを生成
///
/// シード未指定時のリセットに使用します。この場合、エピソード間で
/// 配置は再現されません。
fn time_based_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// 環境構築エラー
///
/// 構築パラメータが不正な場合のエラーで、致命的です（環境は生成されません）。
#[derive(Debug)]
pub enum ConfigError {
    InvalidGridSize(i32),
    InvalidAgentCount(usize),
    InvalidObservationSize(usize),
    InvalidMaxSteps(u64),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidGridSize(size) => {
                write!(f, "グリッドサイズが不正です: {} (正の値が必要)", size)
            }
            ConfigError::InvalidAgentCount(count) => {
                write!(f, "エージェント数が不正です: {} (1以上が必要)", count)
            }
            ConfigError::InvalidObservationSize(size) => {
                write!(f, "観測サイズが不正です: {} (正の奇数が必要)", size)
            }
            ConfigError::InvalidMaxSteps(steps) => {
                write!(f, "最大ステップ数が不正です: {} (正の値が必要)", steps)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// ステップ入力エラー
///
/// 不正な `step` 入力に対する回復可能なエラーです。拒否された呼び出しは
/// 状態を変更しないため、呼び出し側は入力を修正して再試行できます。
#[derive(Debug)]
pub enum StepError {
    /// 行動コードが 0..=4 の範囲外
    InvalidAction { agent_id: String, code: u8 },
    /// エージェント集合に存在しないID
    UnknownAgent { agent_id: String },
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepError::InvalidAction { agent_id, code } => {
                write!(
                    f,
                    "不正な行動コードです: {} (エージェント: {}, 有効範囲: 0..=4)",
                    code, agent_id
                )
            }
            StepError::UnknownAgent { agent_id } => {
                write!(f, "未知のエージェントIDです: {}", agent_id)
            }
        }
    }
}

impl std::error::Error for StepError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::common::GEO_ORIGIN_LAT;

    /// シード固定のテスト用シナリオ設定を生成
    fn test_config(num_agents: usize, num_targets: usize, max_steps: u64) -> ScenarioConfig {
        let mut config = ScenarioConfig::default();
        config.world.num_agents = num_agents;
        config.world.num_targets = num_targets;
        config.sim.max_steps = max_steps;
        config.sim.seed = Some(42);
        config
    }

    /// 全エージェントに同一の行動コードを割り当てたマップを生成
    fn uniform_actions(env: &Environment, code: u8) -> BTreeMap<String, u8> {
        env.agent_ids().into_iter().map(|id| (id, code)).collect()
    }

    #[test]
    fn test_new_rejects_invalid_grid_size() {
        let mut config = test_config(1, 1, 100);
        config.world.grid_size = 0;
        assert!(matches!(
            Environment::new(&config),
            Err(ConfigError::InvalidGridSize(0))
        ));
    }

    #[test]
    fn test_new_rejects_even_observation_size() {
        let mut config = test_config(1, 1, 100);
        config.world.observation_size = 4;
        assert!(matches!(
            Environment::new(&config),
            Err(ConfigError::InvalidObservationSize(4))
        ));
    }

    #[test]
    fn test_new_rejects_zero_max_steps() {
        let config = test_config(1, 1, 100);
        let mut bad = config.clone();
        bad.sim.max_steps = 0;
        assert!(matches!(
            Environment::new(&bad),
            Err(ConfigError::InvalidMaxSteps(0))
        ));
    }

    #[test]
    fn test_new_rejects_zero_agents() {
        let mut config = test_config(1, 1, 100);
        config.world.num_agents = 0;
        assert!(matches!(
            Environment::new(&config),
            Err(ConfigError::InvalidAgentCount(0))
        ));
    }

    #[test]
    fn test_new_builds_fixed_agent_id_set() {
        let env = Environment::new(&test_config(3, 1, 100)).unwrap();
        assert_eq!(env.agent_ids(), vec!["agent_0", "agent_1", "agent_2"]);
    }

    #[test]
    fn test_reset_places_everything_in_bounds() {
        let mut env = Environment::new(&test_config(4, 5, 100)).unwrap();
        for _ in 0..10 {
            env.reset();
            for agent in &env.agents {
                assert!(agent.position.is_in_bounds(env.grid_size));
                assert!(agent.goal.is_in_bounds(env.grid_size));
            }
            for target in &env.targets {
                assert!(target.position.is_in_bounds(env.grid_size));
            }
        }
    }

    #[test]
    fn test_reset_is_deterministic_with_seed() {
        let mut env_a = Environment::new(&test_config(3, 2, 100)).unwrap();
        let mut env_b = Environment::new(&test_config(3, 2, 100)).unwrap();
        env_a.reset();
        env_b.reset();
        for (a, b) in env_a.agents.iter().zip(env_b.agents.iter()) {
            assert_eq!(a.position, b.position);
            assert_eq!(a.goal, b.goal);
        }
        assert_eq!(env_a.targets, env_b.targets);
    }

    #[test]
    fn test_reset_clears_episode_state() {
        let mut env = Environment::new(&test_config(2, 1, 100)).unwrap();
        env.step(&uniform_actions(&env, 4)).unwrap();
        assert!(!env.episode_log.is_empty());

        let observations = env.reset();
        assert_eq!(observations.len(), 2);
        assert_eq!(env.step_count, 0);
        assert!(env.visited.is_empty());
        assert!(env.episode_log.is_empty());
        assert!(env.agent_states.is_empty());
        for agent in &env.agents {
            assert!(agent.path_history.is_empty());
        }
    }

    #[test]
    fn test_step_returns_entries_for_every_agent() {
        let mut env = Environment::new(&test_config(3, 1, 100)).unwrap();
        let outcome = env.step(&uniform_actions(&env, 4)).unwrap();
        assert_eq!(outcome.observations.len(), 3);
        assert_eq!(outcome.rewards.len(), 3);
        assert_eq!(outcome.infos.len(), 3);
        assert_eq!(outcome.records.len(), 3);
        // dones はエージェント3件 + __all__
        assert_eq!(outcome.dones.len(), 4);
        assert!(outcome.infos.values().all(|info| info.is_empty()));
    }

    #[test]
    fn test_done_flags_progression() {
        let mut env = Environment::new(&test_config(1, 0, 3)).unwrap();
        for expected_done in [false, false, true] {
            let outcome = env.step(&uniform_actions(&env, 4)).unwrap();
            assert_eq!(outcome.dones[ALL_DONE_KEY], expected_done);
            // エージェント個別の終了フラグは常に偽
            assert_eq!(outcome.dones["agent_0"], false);
        }
        assert!(env.is_done());
    }

    #[test]
    fn test_reward_for_adjacent_target() {
        let mut env = Environment::new(&test_config(1, 1, 100)).unwrap();
        // シナリオ: 要救助者(5,5)、エージェント(5,4)から右へ移動
        env.targets = vec![RescueTarget::new(GridPosition::new(5, 5))];
        env.agents[0].position = GridPosition::new(5, 4);

        let outcome = env.step(&uniform_actions(&env, 3)).unwrap();
        let record = &outcome.records[0];

        assert_eq!(outcome.rewards["agent_0"], 10.0);
        assert!(record.victim_found);
        assert_eq!(record.action, "right");
        assert_eq!(record.position, GridPosition::new(5, 5).to_geo());
    }

    #[test]
    fn test_reward_zero_without_targets_in_range() {
        let mut env = Environment::new(&test_config(1, 1, 100)).unwrap();
        env.targets = vec![RescueTarget::new(GridPosition::new(9, 9))];
        env.agents[0].position = GridPosition::new(0, 0);

        let outcome = env.step(&uniform_actions(&env, 4)).unwrap();
        assert_eq!(outcome.rewards["agent_0"], 0.0);
        assert!(!outcome.records[0].victim_found);
    }

    #[test]
    fn test_reward_counts_multiple_targets() {
        let mut env = Environment::new(&test_config(1, 2, 100)).unwrap();
        env.targets = vec![
            RescueTarget::new(GridPosition::new(5, 5)),
            RescueTarget::new(GridPosition::new(4, 4)),
        ];
        env.agents[0].position = GridPosition::new(5, 4);

        let outcome = env.step(&uniform_actions(&env, 4)).unwrap();
        assert_eq!(outcome.rewards["agent_0"], 20.0);
    }

    #[test]
    fn test_invalid_action_leaves_state_unchanged() {
        let mut env = Environment::new(&test_config(2, 1, 100)).unwrap();
        let positions_before: Vec<_> = env.agents.iter().map(|a| a.position).collect();
        let step_before = env.step_count;
        let log_before = env.episode_log.len();
        let visited_before = env.visited.len();

        let mut actions = uniform_actions(&env, 4);
        actions.insert("agent_1".to_string(), 7);

        let result = env.step(&actions);
        assert!(matches!(result, Err(StepError::InvalidAction { .. })));

        let positions_after: Vec<_> = env.agents.iter().map(|a| a.position).collect();
        assert_eq!(positions_after, positions_before);
        assert_eq!(env.step_count, step_before);
        assert_eq!(env.episode_log.len(), log_before);
        assert_eq!(env.visited.len(), visited_before);
    }

    #[test]
    fn test_unknown_agent_rejected_before_mutation() {
        let mut env = Environment::new(&test_config(1, 1, 100)).unwrap();
        let position_before = env.agents[0].position;

        let mut actions = uniform_actions(&env, 4);
        actions.insert("agent_99".to_string(), 4);

        let result = env.step(&actions);
        assert!(matches!(result, Err(StepError::UnknownAgent { .. })));
        assert_eq!(env.agents[0].position, position_before);
        assert_eq!(env.step_count, 0);
    }

    #[test]
    fn test_battery_decreases_across_steps() {
        let mut env = Environment::new(&test_config(1, 0, 100)).unwrap();
        let mut last_battery = f64::INFINITY;
        for _ in 0..10 {
            let outcome = env.step(&uniform_actions(&env, 4)).unwrap();
            let battery = outcome.records[0].battery_level;
            assert!(battery <= last_battery);
            assert!(battery >= 0.0);
            last_battery = battery;
        }
    }

    #[test]
    fn test_record_positions_project_back_in_bounds() {
        let mut env = Environment::new(&test_config(2, 1, 100)).unwrap();
        for code in [0, 1, 2, 3, 4] {
            let outcome = env.step(&uniform_actions(&env, code)).unwrap();
            for record in &outcome.records {
                let pos = GridPosition::from_geo(record.position[0], record.position[1]);
                let goal = GridPosition::from_geo(record.goal[0], record.goal[1]);
                assert!(pos.is_in_bounds(env.grid_size));
                assert!(goal.is_in_bounds(env.grid_size));
                assert!(record.position[0] >= GEO_ORIGIN_LAT);
            }
        }
    }

    #[test]
    fn test_episode_log_grows_by_agent_count_per_step() {
        let mut env = Environment::new(&test_config(3, 1, 100)).unwrap();
        for expected in [3, 6, 9] {
            env.step(&uniform_actions(&env, 4)).unwrap();
            assert_eq!(env.episode_log.len(), expected);
        }
    }

    #[test]
    fn test_scan_confidence_decays_with_coverage() {
        let mut env = Environment::new(&test_config(1, 0, 100)).unwrap();
        env.agents[0].position = GridPosition::new(0, 0);

        // 右に移動し続けて訪問セルを増やす
        let first = env.step(&uniform_actions(&env, 3)).unwrap().records[0].scan_confidence;
        let mut last = first;
        for _ in 0..5 {
            let current = env.step(&uniform_actions(&env, 3)).unwrap().records[0].scan_confidence;
            assert!(current <= last);
            last = current;
        }
        assert!(last < first);
    }

    #[test]
    fn test_get_agent_states_holds_latest_record() {
        let mut env = Environment::new(&test_config(2, 1, 100)).unwrap();
        env.step(&uniform_actions(&env, 4)).unwrap();
        let second = env.step(&uniform_actions(&env, 4)).unwrap();

        let states = env.get_agent_states();
        assert_eq!(states.len(), 2);
        for record in &second.records {
            assert_eq!(&states[&record.agent_id], record);
        }
    }

    #[test]
    fn test_reset_then_close_writes_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.json");

        let mut config = test_config(1, 1, 100);
        config.output.path = path.to_string_lossy().into_owned();

        let mut env = Environment::new(&config).unwrap();
        env.reset();
        env.close().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<AgentStepRecord> = serde_json::from_str(&contents).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_close_writes_all_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.json");

        let mut config = test_config(2, 1, 100);
        config.output.path = path.to_string_lossy().into_owned();

        let mut env = Environment::new(&config).unwrap();
        env.step(&uniform_actions(&env, 4)).unwrap();
        env.step(&uniform_actions(&env, 4)).unwrap();
        env.close().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<AgentStepRecord> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed, env.episode_log.records);
    }

    #[test]
    fn test_close_failure_is_nonfatal() {
        let mut config = test_config(1, 1, 100);
        config.output.path = "/nonexistent_dir_sarsim/output.json".to_string();

        let mut env = Environment::new(&config).unwrap();
        env.step(&uniform_actions(&env, 4)).unwrap();

        assert!(env.close().is_err());
        // メモリ上のログと状態は保持される
        assert_eq!(env.episode_log.len(), 1);
        assert_eq!(env.get_agent_states().len(), 1);
    }

    #[test]
    fn test_render_markers_and_precedence() {
        let mut env = Environment::new(&test_config(1, 1, 100)).unwrap();
        env.targets = vec![
            RescueTarget::new(GridPosition::new(0, 0)),
            RescueTarget::new(GridPosition::new(2, 2)),
        ];
        env.agents[0].position = GridPosition::new(0, 0);

        let rendered = env.render();
        let rows: Vec<&str> = rendered.lines().collect();
        assert_eq!(rows.len(), env.grid_size as usize);
        // 重なりはエージェントが優先
        assert!(rows[0].starts_with('A'));
        assert_eq!(rows[2].split(' ').nth(2), Some("T"));
    }
}
