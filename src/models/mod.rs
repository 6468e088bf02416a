// 基本的なデータ型（グリッド座標・行動・定数）
pub mod common;

// 各モデルの実装
pub mod agent;
pub mod observation;
pub mod target;
pub mod telemetry;

// 便利な re-export
pub use agent::SearchAgent;
pub use common::*;
pub use observation::ObservationMask;
pub use target::RescueTarget;
pub use telemetry::{AgentStepRecord, EpisodeLog, OutputError};
