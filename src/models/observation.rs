use serde::{Deserialize, Serialize};

use crate::models::common::GridPosition;

/// エージェント中心の可視性マスク
///
/// `observation_size × observation_size` の正方格子で、中心セルが
/// エージェントの現在位置に対応します。各セルの値は対応する絶対グリッド
/// セルが範囲内なら 1.0、範囲外なら 0.0 です。他エージェントや要救助者の
/// 位置は一切含まれません（占有マスクではなく可視性マスク）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationMask {
    /// マスクの一辺のセル数（奇数）
    pub size: usize,
    /// 行優先のフラット格納（長さ `size * size`）
    pub cells: Vec<f32>,
}

impl ObservationMask {
    /// 可視性マスクを生成
    ///
    /// `(position, grid_size, observation_size)` の純粋関数です。
    /// `observation_size = 2k+1` として、各軸 `-k..=k` のオフセット位置が
    /// グリッド範囲内かどうかを判定します。
    ///
    /// # 引数
    ///
    /// * `center` - エージェントの現在位置（マスク中心）
    /// * `grid_size` - グリッドの一辺のセル数
    /// * `observation_size` - マスクの一辺のセル数（奇数）
    pub fn generate(center: &GridPosition, grid_size: i32, observation_size: usize) -> Self {
        let half = (observation_size / 2) as i32;
        let mut cells = Vec::with_capacity(observation_size * observation_size);

        for dr in -half..=half {
            for dc in -half..=half {
                let cell = GridPosition::new(center.row + dr, center.col + dc);
                cells.push(if cell.is_in_bounds(grid_size) { 1.0 } else { 0.0 });
            }
        }

        Self {
            size: observation_size,
            cells,
        }
    }

    /// マスク内セルの値を取得
    ///
    /// # 引数
    ///
    /// * `i` - マスク内の行インデックス（0 = 上端）
    /// * `j` - マスク内の列インデックス（0 = 左端）
    pub fn at(&self, i: usize, j: usize) -> f32 {
        self.cells[i * self.size + j]
    }

    /// 行ごとのベクターに展開（表示・検証用）
    pub fn rows(&self) -> Vec<Vec<f32>> {
        self.cells.chunks(self.size).map(|row| row.to_vec()).collect()
    }
}
