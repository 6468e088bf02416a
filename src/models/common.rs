use serde::{Deserialize, Serialize};

/// グリッド座標の最小値（行・列共通）
pub const GRID_MIN: i32 = 0;

/// バッテリー残量の初期値（パーセント）
pub const BATTERY_FULL: f64 = 100.0;
/// 1ステップあたりのバッテリー消費量（パーセント）
pub const BATTERY_DRAIN_PER_STEP: f64 = 0.5;

/// スキャン信頼度の基準値
pub const SCAN_CONFIDENCE_BASE: f64 = 0.8;
/// 訪問済みセル1つあたりのスキャン信頼度減衰量
pub const SCAN_CONFIDENCE_DECAY: f64 = 0.01;

/// 要救助者の検知範囲（チェビシェフ距離、セル単位）
pub const DETECTION_RANGE_CELLS: i32 = 1;

/// 地理座標投影の基準緯度（グリッド原点に対応）
pub const GEO_ORIGIN_LAT: f64 = 40.0;
/// 地理座標投影の基準経度（グリッド原点に対応）
pub const GEO_ORIGIN_LON: f64 = -74.0;
/// グリッド1セルあたりの度数（緯度・経度共通）
pub const GEO_DEG_PER_CELL: f64 = 0.001;

/// グリッド上の位置を表す構造体
///
/// 行・列の整数ペアで、常に `0 <= row, col < grid_size` の範囲に収まります。
/// 境界を越える移動はクランプされ、ラップアラウンドは発生しません。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPosition {
    pub row: i32,
    pub col: i32,
}

impl GridPosition {
    pub fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// 行動を適用した後の位置を計算
    ///
    /// 単一セルの4方向移動＋静止のみで、グリッド境界でクランプされます。
    /// 斜め移動・衝突判定・障害物はありません。
    ///
    /// # 引数
    ///
    /// * `action` - 適用する行動
    /// * `grid_size` - グリッドの一辺のセル数
    pub fn moved(&self, action: Action, grid_size: i32) -> Self {
        let mut row = self.row;
        let mut col = self.col;
        match action {
            Action::Up => row = (row - 1).max(GRID_MIN),
            Action::Down => row = (row + 1).min(grid_size - 1),
            Action::Left => col = (col - 1).max(GRID_MIN),
            Action::Right => col = (col + 1).min(grid_size - 1),
            Action::Stay => {}
        }
        Self { row, col }
    }

    /// チェビシェフ距離を計算
    ///
    /// `max(|Δrow|, |Δcol|)`。要救助者の検知判定に使用します。
    pub fn chebyshev_distance(&self, other: &GridPosition) -> i32 {
        (self.row - other.row).abs().max((self.col - other.col).abs())
    }

    /// グリッド範囲内かどうかを判定
    pub fn is_in_bounds(&self, grid_size: i32) -> bool {
        self.row >= GRID_MIN && self.row < grid_size && self.col >= GRID_MIN && self.col < grid_size
    }

    /// 上下左右の隣接セルのうちグリッド範囲内のものを列挙
    ///
    /// テレメトリの `surroundings` フィールドに使用します。
    /// 列挙順は上・下・左・右で固定です。
    pub fn neighbors_in_bounds(&self, grid_size: i32) -> Vec<GridPosition> {
        const OFFSETS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
        OFFSETS
            .iter()
            .map(|(dr, dc)| GridPosition::new(self.row + dr, self.col + dc))
            .filter(|p| p.is_in_bounds(grid_size))
            .collect()
    }

    /// 合成地理座標への投影
    ///
    /// 固定アフィン写像 `lat = 40.0 + row * 0.001`、`lon = -74.0 + col * 0.001`
    /// で `[lat, lon]` に変換します。外部表示専用の値です。
    pub fn to_geo(&self) -> [f64; 2] {
        [
            GEO_ORIGIN_LAT + self.row as f64 * GEO_DEG_PER_CELL,
            GEO_ORIGIN_LON + self.col as f64 * GEO_DEG_PER_CELL,
        ]
    }

    /// 地理座標からグリッド座標への逆投影
    ///
    /// `to_geo` の逆写像。投影値の検証に使用します。
    pub fn from_geo(lat: f64, lon: f64) -> Self {
        Self {
            row: ((lat - GEO_ORIGIN_LAT) / GEO_DEG_PER_CELL).round() as i32,
            col: ((lon - GEO_ORIGIN_LON) / GEO_DEG_PER_CELL).round() as i32,
        }
    }

    /// シリアライズ用の `[row, col]` 配列表現
    pub fn to_array(&self) -> [i32; 2] {
        [self.row, self.col]
    }
}

/// エージェントの行動を表す列挙型
///
/// ワイヤコードは 0=up, 1=down, 2=left, 3=right, 4=stay です。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Up,
    Down,
    Left,
    Right,
    Stay,
}

impl Action {
    /// 全行動の一覧（コード順）
    pub const ALL: [Action; 5] = [
        Action::Up,
        Action::Down,
        Action::Left,
        Action::Right,
        Action::Stay,
    ];

    /// ワイヤコードから行動を復元
    ///
    /// # 戻り値
    ///
    /// コードが 0..=4 の範囲外の場合は `None`
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Action::Up),
            1 => Some(Action::Down),
            2 => Some(Action::Left),
            3 => Some(Action::Right),
            4 => Some(Action::Stay),
            _ => None,
        }
    }

    /// 行動のワイヤコード
    pub fn code(&self) -> u8 {
        match self {
            Action::Up => 0,
            Action::Down => 1,
            Action::Left => 2,
            Action::Right => 3,
            Action::Stay => 4,
        }
    }

    /// 行動の名称（テレメトリの `action` / `orientation` フィールド値）
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Up => "up",
            Action::Down => "down",
            Action::Left => "left",
            Action::Right => "right",
            Action::Stay => "stay",
        }
    }
}

/// ステップ番号からバッテリー残量を計算
///
/// `max(0, 100 - 0.5 * step)`。単調非増加で、負値にはなりません。
pub fn battery_level(step: u64) -> f64 {
    (BATTERY_FULL - BATTERY_DRAIN_PER_STEP * step as f64).max(0.0)
}

/// 訪問済みセル数からスキャン信頼度を計算
///
/// `0.8 - 0.01 * visited`。クランプしないため負値になり得ます。
/// 呼び出し側は [0, 1] 範囲外の値を想定する必要があります。
pub fn scan_confidence(visited_count: usize) -> f64 {
    SCAN_CONFIDENCE_BASE - SCAN_CONFIDENCE_DECAY * visited_count as f64
}
