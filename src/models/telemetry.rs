use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// エージェントのステップ記録
///
/// 1エージェント・1ステップごとに生成される不変のスナップショットです。
/// フィールド定義順がそのままJSON出力のキー順になります。
/// 位置とゴールは表示用の合成地理座標（`[lat, lon]`）、
/// `surroundings` と `planned_path` はグリッド座標（`[row, col]`）です。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStepRecord {
    /// 記録生成時刻（ISO 8601形式）
    pub timestamp: String,
    /// エージェントの一意識別子
    pub agent_id: String,
    /// 移動後の位置の地理座標投影 `[lat, lon]`
    pub position: [f64; 2],
    /// ゴール位置の地理座標投影 `[lat, lon]`
    pub goal: [f64; 2],
    /// このステップで取った行動の名称
    pub action: String,
    /// ステップ番号（エピソード内のグローバルカウンタ）
    pub step_number: u64,
    /// バッテリー残量（パーセント、単調非増加）
    pub battery_level: f64,
    /// 機体の向き（行動名と同一）
    pub orientation: String,
    /// このステップで要救助者を検知したかどうか
    pub victim_found: bool,
    /// 救援要請フラグ（現行モデルでは常にfalse）
    pub needs_help: bool,
    /// このステップの報酬（検知数 × 10.0）
    pub reward: f64,
    /// スキャン信頼度（クランプなし、負値になり得る）
    pub scan_confidence: f64,
    /// 隣接する範囲内セルの一覧 `[[row, col], ...]`
    pub surroundings: Vec<[i32; 2]>,
    /// ゴールへの計画経路 `[[row, col], ...]`（行優先のL字経路）
    pub planned_path: Vec<[i32; 2]>,
}

/// エピソードログ
///
/// エピソード全体のステップ記録を追記専用で保持します。
/// 1エージェント・1ステップごとに1件追加され、エピソード途中で
/// 切り詰められることはありません。`close()` で単一のJSON配列として
/// 出力ファイルに書き出されます。
#[derive(Debug, Clone, Default)]
pub struct EpisodeLog {
    /// ステップ記録（追記順）
    pub records: Vec<AgentStepRecord>,
}

impl EpisodeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// ステップ記録を追記
    pub fn append(&mut self, record: AgentStepRecord) {
        self.records.push(record);
    }

    /// 記録件数を取得
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 全記録をクリア（リセット時のみ使用）
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// 全記録をJSON配列としてファイルに書き出し
    ///
    /// 書き込みに失敗してもメモリ上のログは失われません。
    ///
    /// # 引数
    ///
    /// * `path` - 出力ファイルのパス
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), OutputError> {
        let path = path.as_ref();

        let json = serde_json::to_string_pretty(&self.records)
            .map_err(OutputError::SerializeError)?;

        fs::write(path, json)
            .map_err(|e| OutputError::IoError(path.to_path_buf(), e))?;

        Ok(())
    }
}

/// エピソードログ出力エラー
///
/// `close()` の書き込み失敗を表します。呼び出し側に報告されますが
/// 致命的ではなく、メモリ上のログとエピソード状態は保持されます。
#[derive(Debug)]
pub enum OutputError {
    IoError(PathBuf, std::io::Error),
    SerializeError(serde_json::Error),
}

impl std::fmt::Display for OutputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputError::IoError(path, err) => {
                write!(f, "ログファイル書き込みエラー {}: {}", path.display(), err)
            }
            OutputError::SerializeError(err) => {
                write!(f, "ログシリアライズエラー: {}", err)
            }
        }
    }
}

impl std::error::Error for OutputError {}
