//! 客户端接口模块
//!
//! 本模块提供骨架道具的用户友好接口，包括：
//! - 动作会话跟踪（刷新/切换/自然到期，协议没有停止命令）
//! - 灯光状态去抖（只下发变化字段，固定 分区 → 模式 → 参数 顺序）
//! - 经典蓝牙音频桥协调（固定启用序列 + 配对 + 断链即中止）
//! - [`Skelly`] 门面与 Builder
//!
//! # 使用场景
//!
//! 这是大多数用户应该使用的模块。如果需要直接下发协议帧或
//! 自定义调度，可以使用 `skelly-driver`。

pub mod audio;
pub mod config;
mod error;
pub mod lighting;
pub mod movement;
mod skelly;

pub use audio::{AudioBridgeConfig, AudioBridgeState, AudioCoordinator, Pairer};
#[cfg(target_os = "linux")]
pub use audio::BluetoothctlPairer;
pub use config::SkellyConfig;
pub use error::ClientError;
pub use lighting::{CommittedLight, LightRequest, LightTracker};
pub use movement::{MovementPhase, MovementTracker, random_movement};
pub use skelly::Skelly;
#[cfg(feature = "btleplug-backend")]
pub use skelly::SkellyBuilder;
