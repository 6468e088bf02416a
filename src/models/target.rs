use rand::Rng;

use crate::models::common::{DETECTION_RANGE_CELLS, GridPosition};

/// 要救助者（捜索対象）
///
/// グリッド上の1セルを占める捜索対象で、位置はエピソード中不変です。
/// 対象の集合はリセット時に確定し、以後追加も移動もされません。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescueTarget {
    /// 要救助者の位置
    pub position: GridPosition,
}

impl RescueTarget {
    pub fn new(position: GridPosition) -> Self {
        Self { position }
    }

    /// 指定位置から検知可能かどうかを判定
    ///
    /// チェビシェフ距離が検知範囲（1セル）以内であれば検知成立です。
    pub fn is_detected_from(&self, pos: &GridPosition) -> bool {
        pos.chebyshev_distance(&self.position) <= DETECTION_RANGE_CELLS
    }

    /// 要救助者を一様乱数で一括配置
    ///
    /// 各対象の位置は独立に `[0, grid_size)` の一様乱数で決まります。
    /// エージェントや他の対象との重なりは許容されます（衝突回避は行いません）。
    ///
    /// # 引数
    ///
    /// * `rng` - 配置に使用する乱数生成器
    /// * `count` - 生成する対象数
    /// * `grid_size` - グリッドの一辺のセル数
    ///
    /// # 戻り値
    ///
    /// 生成された要救助者のベクター
    pub fn spawn_random<R: Rng>(rng: &mut R, count: usize, grid_size: i32) -> Vec<RescueTarget> {
        (0..count)
            .map(|_| {
                RescueTarget::new(GridPosition::new(
                    rng.gen_range(0..grid_size),
                    rng.gen_range(0..grid_size),
                ))
            })
            .collect()
    }
}
