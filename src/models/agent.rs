use crate::models::common::{Action, GridPosition};

/// 捜索エージェント
///
/// グリッド上を移動して要救助者を捜索するエージェントです。
/// エピソード開始時に割り当てられた固定のゴール位置を持ち、
/// 通過したセルの履歴を保持します（履歴は内省用で、動作には影響しません）。
#[derive(Debug, Clone)]
pub struct SearchAgent {
    /// エージェントの一意識別子（`agent_0` 形式、エピソードをまたいで不変）
    pub id: String,
    /// エージェントの現在位置
    pub position: GridPosition,
    /// エピソード中固定のゴール位置
    pub goal: GridPosition,
    /// このエピソードで通過した位置の履歴（移動順）
    pub path_history: Vec<GridPosition>,
}

impl SearchAgent {
    /// 新しい捜索エージェントを作成
    ///
    /// # 引数
    ///
    /// * `id` - エージェントの一意識別子
    /// * `position` - 初期位置
    /// * `goal` - エピソード中固定のゴール位置
    pub fn new(id: String, position: GridPosition, goal: GridPosition) -> Self {
        Self {
            id,
            position,
            goal,
            path_history: Vec::new(),
        }
    }

    /// 行動を適用して1セル移動
    ///
    /// 移動は境界クランプ付きで、新しい位置が履歴に追加されます。
    ///
    /// # 引数
    ///
    /// * `action` - 適用する行動
    /// * `grid_size` - グリッドの一辺のセル数
    ///
    /// # 戻り値
    ///
    /// 移動後の位置
    pub fn apply_action(&mut self, action: Action, grid_size: i32) -> GridPosition {
        self.position = self.position.moved(action, grid_size);
        self.path_history.push(self.position);
        self.position
    }

    /// ゴールへの計画経路を生成
    ///
    /// 現在位置からゴールまで、まず行方向に1セルずつ進み、行が一致した後に
    /// 列方向に進む貪欲な直線経路（L字型）を返します。現在位置は含まれません。
    /// 毎ステップ再計算される参考情報であり、移動モデルはこの経路に従いません。
    ///
    /// # 戻り値
    ///
    /// ゴールまでの経由セルの列（現在位置がゴールと一致する場合は空）
    pub fn planned_path(&self) -> Vec<GridPosition> {
        let mut path = Vec::new();
        let mut row = self.position.row;
        let mut col = self.position.col;

        while row != self.goal.row {
            row += if self.goal.row > row { 1 } else { -1 };
            path.push(GridPosition::new(row, col));
        }
        while col != self.goal.col {
            col += if self.goal.col > col { 1 } else { -1 };
            path.push(GridPosition::new(row, col));
        }

        path
    }

    /// エピソード開始時の状態に再配置
    ///
    /// 位置とゴールを新しい値に置き換え、経路履歴をクリアします。
    pub fn respawn(&mut self, position: GridPosition, goal: GridPosition) {
        self.position = position;
        self.goal = goal;
        self.path_history.clear();
    }
}
