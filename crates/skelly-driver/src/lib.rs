//! 驱动层模块
//!
//! 本模块提供骨架道具的链路驱动功能，包括：
//! - 连接生命周期管理（扫描、连接、服务发现、CCCD 订阅）
//! - 认证握手（一次性会话闸门，未确认前不放行任何命令）
//! - 命令调度（单写者、强制节流、立即/常规两级优先级）
//! - 通知路由（认证应答与状态记账，保序、不阻塞 BLE 栈）
//! - 断链感知与有界退避重连
//!
//! # 使用场景
//!
//! 适用于需要直接下发协议帧、自行组织控制逻辑的场景。
//! 大多数用户应该使用 `skelly-client` 提供的更高级接口。

pub mod auth;
pub mod backoff;
pub mod command;
mod connection;
mod error;
pub mod router;
pub mod state;

pub(crate) mod dispatcher;

#[cfg(any(test, feature = "mock"))]
pub mod testing;

pub use auth::{AuthConfig, AuthState};
pub use backoff::BackoffPolicy;
pub use command::{CommandPriority, CommandRequest, CommandTicket};
pub use connection::{ConnectionConfig, SkellyConnection};
pub use dispatcher::DispatcherConfig;
pub use error::DriverError;
pub use router::{StatusBook, StatusSnapshot};
pub use state::DeviceState;
