use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// シナリオメタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    pub description: String,
}

impl Default for ScenarioMeta {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: "unnamed".to_string(),
            description: String::new(),
        }
    }
}

/// 世界設定（グリッドと配置）
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorldConfig {
    /// グリッドの一辺のセル数
    pub grid_size: i32,
    /// 捜索エージェント数
    pub num_agents: usize,
    /// 要救助者数
    pub num_targets: usize,
    /// 観測マスクの一辺のセル数（中心セルが存在するよう奇数必須）
    pub observation_size: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            grid_size: 10,
            num_agents: 1,
            num_targets: 1,
            observation_size: 3,
        }
    }
}

/// シミュレーション設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// エピソードの最大ステップ数（到達時点でエピソード終了）
    pub max_steps: u64,
    /// 乱数シード。未指定の場合はリセットごとに現在時刻でシードされ、
    /// エピソード間の再現性は意図的に持ちません。
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            seed: None,
        }
    }
}

/// 出力設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// エピソードログの出力先パス
    pub path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: "output.json".to_string(),
        }
    }
}

/// 完全なシナリオ設定
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub meta: ScenarioMeta,
    pub world: WorldConfig,
    pub sim: SimulationConfig,
    pub output: OutputConfig,
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        // ファイル存在チェック
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        // ファイル読み込み
        let contents = fs::read_to_string(path)
            .map_err(|e| ScenarioError::IoError(path.to_path_buf(), e))?;

        // YAML解析
        let config: ScenarioConfig = serde_yaml::from_str(&contents)
            .map_err(|e| ScenarioError::ParseError(path.to_path_buf(), e))?;

        // 基本的な検証
        config.validate()?;

        Ok(config)
    }

    /// 設定の基本的な検証
    ///
    /// 環境構築時の `ConfigError` と同じ条件をファイル読み込み段階でも
    /// 検証し、不正なシナリオを早期に弾きます。
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.world.grid_size <= 0 {
            return Err(ScenarioError::ValidationError(
                "grid_size must be positive".to_string(),
            ));
        }
        if self.world.num_agents < 1 {
            return Err(ScenarioError::ValidationError(
                "num_agents must be at least 1".to_string(),
            ));
        }
        if self.world.observation_size == 0 || self.world.observation_size % 2 == 0 {
            return Err(ScenarioError::ValidationError(format!(
                "observation_size must be a positive odd number, got {}",
                self.world.observation_size
            )));
        }
        if self.sim.max_steps == 0 {
            return Err(ScenarioError::ValidationError(
                "max_steps must be positive".to_string(),
            ));
        }
        if self.output.path.is_empty() {
            return Err(ScenarioError::ValidationError(
                "output path must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== 世界設定 ===");
        println!("グリッド: {}x{}", self.world.grid_size, self.world.grid_size);
        println!("エージェント数: {}", self.world.num_agents);
        println!("要救助者数: {}", self.world.num_targets);
        println!("観測マスク: {}x{}", self.world.observation_size, self.world.observation_size);
        println!();

        println!("=== シミュレーション設定 ===");
        println!("最大ステップ数: {}", self.sim.max_steps);
        match self.sim.seed {
            Some(seed) => println!("シード値: {}", seed),
            None => println!("シード値: 未指定（時刻ベース）"),
        }
        println!("出力ファイル: {}", self.output.path);
    }
}

/// シナリオ読み込みエラー
#[derive(Debug)]
pub enum ScenarioError {
    FileNotFound(std::path::PathBuf),
    IoError(std::path::PathBuf, std::io::Error),
    ParseError(std::path::PathBuf, serde_yaml::Error),
    ValidationError(String),
}

impl std::fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioError::FileNotFound(path) => {
                write!(f, "シナリオファイルが見つかりません: {}", path.display())
            }
            ScenarioError::IoError(path, err) => {
                write!(f, "ファイル読み込みエラー {}: {}", path.display(), err)
            }
            ScenarioError::ParseError(path, err) => {
                write!(f, "YAML解析エラー {}: {}", path.display(), err)
            }
            ScenarioError::ValidationError(msg) => {
                write!(f, "設定検証エラー: {}", msg)
            }
        }
    }
}

impl std::error::Error for ScenarioError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_matches_documented_defaults() {
        let config = ScenarioConfig::default();
        assert_eq!(config.world.grid_size, 10);
        assert_eq!(config.world.num_agents, 1);
        assert_eq!(config.world.num_targets, 1);
        assert_eq!(config.world.observation_size, 3);
        assert_eq!(config.sim.max_steps, 100);
        assert_eq!(config.sim.seed, None);
        assert_eq!(config.output.path, "output.json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "world:\n  grid_size: 20\nsim:\n  seed: 123\n";
        let config: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.world.grid_size, 20);
        assert_eq!(config.world.num_agents, 1);
        assert_eq!(config.sim.max_steps, 100);
        assert_eq!(config.sim.seed, Some(123));
    }

    #[test]
    fn test_validate_rejects_even_observation_size() {
        let mut config = ScenarioConfig::default();
        config.world.observation_size = 4;
        assert!(matches!(
            config.validate(),
            Err(ScenarioError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_nonpositive_grid() {
        let mut config = ScenarioConfig::default();
        config.world.grid_size = 0;
        assert!(config.validate().is_err());
        config.world.grid_size = -5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_max_steps() {
        let mut config = ScenarioConfig::default();
        config.sim.max_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_missing_path() {
        let result = ScenarioConfig::from_file("no_such_scenario.yaml");
        assert!(matches!(result, Err(ScenarioError::FileNotFound(_))));
    }

    #[test]
    fn test_from_file_valid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.yaml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            "meta:\n  name: test\nworld:\n  grid_size: 8\n  num_agents: 2\nsim:\n  max_steps: 50"
        )
        .unwrap();

        let config = ScenarioConfig::from_file(&path).unwrap();
        assert_eq!(config.meta.name, "test");
        assert_eq!(config.world.grid_size, 8);
        assert_eq!(config.world.num_agents, 2);
        assert_eq!(config.sim.max_steps, 50);
    }
}
