//! # Skelly SDK
//!
//! 骨架道具（"Animated Skelly"）BLE 控制 SDK 的统一入口。
//!
//! ## 分层
//!
//! - [`protocol`]：帧编码（纯函数，无 I/O）
//! - [`ble`]：GATT 链路抽象与 btleplug 后端
//! - [`driver`]：连接生命周期、认证、命令调度、通知路由
//! - [`client`]：动作/灯光/音频的高级接口与 [`Skelly`] 门面
//!
//! ## 快速上手
//!
//! ```no_run
//! use skelly_sdk::SkellyBuilder;
//!
//! # async fn run() -> Result<(), skelly_sdk::ClientError> {
//! skelly_sdk::init_logging();
//!
//! let skelly = SkellyBuilder::new().connect().await?;
//! skelly.apply_default_lights().await?;
//! skelly.perform_random().await?;
//! # Ok(())
//! # }
//! ```

pub use skelly_ble as ble;
pub use skelly_client as client;
pub use skelly_driver as driver;
pub use skelly_protocol as protocol;

// 常用类型平铺到根
pub use skelly_client::{
    AudioBridgeConfig, AudioBridgeState, ClientError, LightRequest, MovementPhase, Pairer, Skelly,
    SkellyConfig,
};
#[cfg(feature = "btleplug-backend")]
pub use skelly_client::SkellyBuilder;
#[cfg(target_os = "linux")]
pub use skelly_client::BluetoothctlPairer;
pub use skelly_driver::{DeviceState, DriverError};
pub use skelly_protocol::{
    Command, EffectSpeed, EyeAnimation, LightColor, LightMode, LightZone, Movement,
};

/// 初始化 tracing 订阅器（含 log 桥接）
///
/// 过滤规则来自 `RUST_LOG`，缺省 `info`。重复调用安全（后续调用
/// 是空操作），方便示例和测试随手使用。
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // log → tracing 桥（btleplug 等依赖用的是 log 宏）
    let _ = tracing_log::LogTracer::init();
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
