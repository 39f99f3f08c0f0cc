//! # Skelly BLE 链路层
//!
//! GATT 链路抽象，提供统一的写入/通知接口。
//!
//! 协议层 ([`skelly_protocol`]) 只关心帧内容；本层负责把帧字节写入
//! 设备的写特征值，并把通知特征值上的异步数据交给上层路由。
//! 具体后端通过 [`GattLink`] trait 解耦：生产环境用
//! [`BtleplugLink`]（feature `btleplug-backend`），测试用
//! `MockLink`（feature `mock`）。
//!
//! [`BtleplugLink`]: central::BtleplugLink

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};

#[cfg(feature = "btleplug-backend")]
pub mod central;

#[cfg(feature = "btleplug-backend")]
pub use central::{BtleplugFactory, BtleplugLink};

#[cfg(any(feature = "mock", test))]
pub mod mock;

#[cfg(any(feature = "mock", test))]
pub use mock::{MockController, MockLink};

/// 控制服务与特征值 UUID
pub mod uuids {
    use uuid::Uuid;

    /// 主控制服务
    pub const CONTROL_SERVICE: Uuid = Uuid::from_u128(0x0000ae00_0000_1000_8000_00805f9b34fb);

    /// 写特征值（命令下发）
    pub const WRITE_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0000ae01_0000_1000_8000_00805f9b34fb);

    /// 通知特征值（应答/状态），认证前必须完成 CCCD 订阅
    pub const NOTIFY_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0000ae02_0000_1000_8000_00805f9b34fb);
}

/// 链路层统一错误类型
#[derive(Error, Debug)]
pub enum BleError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] BleDeviceError),
    #[error("No matching device found")]
    NotFound,
    #[error("Operation timed out")]
    Timeout,
    #[error("Connection dropped")]
    Dropped,
    #[error("Notification subscription rejected")]
    SubscriptionFailed,
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleDeviceErrorKind {
    Unknown,
    /// 主机没有可用蓝牙适配器
    AdapterMissing,
    /// 目标特征值不存在（服务发现结果不完整）
    CharacteristicMissing,
    AccessDenied,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct BleDeviceError {
    pub kind: BleDeviceErrorKind,
    pub message: String,
}

impl BleDeviceError {
    pub fn new(kind: BleDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            BleDeviceErrorKind::AdapterMissing | BleDeviceErrorKind::AccessDenied
        )
    }
}

impl From<String> for BleDeviceError {
    fn from(message: String) -> Self {
        Self::new(BleDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for BleDeviceError {
    fn from(message: &str) -> Self {
        Self::new(BleDeviceErrorKind::Unknown, message)
    }
}

/// 扫描目标：按广播名或 MAC 地址匹配
///
/// 名称按大小写不敏感的子串匹配，地址同理；两者有其一命中即算命中。
#[derive(Debug, Clone, Default)]
pub struct DeviceTarget {
    /// 广播名片段（如 "Animated Skelly"）
    pub name_fragment: Option<String>,
    /// BLE MAC 地址（如 "24:F4:95:CA:21:91"）
    pub address: Option<String>,
}

impl DeviceTarget {
    /// 按广播名匹配
    pub fn by_name(fragment: impl Into<String>) -> Self {
        Self {
            name_fragment: Some(fragment.into()),
            address: None,
        }
    }

    /// 按 MAC 地址匹配
    pub fn by_address(address: impl Into<String>) -> Self {
        Self {
            name_fragment: None,
            address: Some(address.into()),
        }
    }

    /// 判断一个扫描结果是否命中目标
    pub fn matches(&self, advertised_name: Option<&str>, address: &str) -> bool {
        if let (Some(fragment), Some(name)) = (&self.name_fragment, advertised_name)
            && name.to_lowercase().contains(&fragment.to_lowercase())
        {
            return true;
        }
        if let Some(wanted) = &self.address
            && address.to_lowercase().contains(&wanted.to_lowercase())
        {
            return true;
        }
        false
    }
}

/// 链路超时配置
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// 扫描超时
    pub scan_timeout: Duration,
    /// 单次 connect() 的硬超时
    pub connect_timeout: Duration,
    /// 服务发现超时
    pub discovery_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(8),
            connect_timeout: Duration::from_secs(10),
            discovery_timeout: Duration::from_secs(15),
        }
    }
}

/// 链路建立后交给上层的事件通道
///
/// - `notifications`：通知特征值上的原始负载，严格保序
/// - `connected`：链路存活标志，断链监视任务翻转为 `false`
pub struct LinkEvents {
    pub notifications: mpsc::Receiver<Vec<u8>>,
    pub connected: watch::Receiver<bool>,
}

/// GATT 链路统一抽象
///
/// 驱动层以泛型 `L: GattLink` 使用本 trait，测试时注入 mock。
/// 方法返回 `impl Future + Send`，允许在 tokio 任务间移动。
pub trait GattLink: Send + Sync + 'static {
    /// 向写特征值写入一条命令（write-without-response）
    fn write_command(&self, payload: &[u8]) -> impl Future<Output = Result<(), BleError>> + Send;

    /// 链路当前是否存活
    fn is_connected(&self) -> impl Future<Output = bool> + Send;

    /// 断开链路（幂等）
    fn disconnect(&self) -> impl Future<Output = Result<(), BleError>> + Send;
}

/// 链路工厂：建立（或重建）一条 GATT 链路
///
/// 重连走的也是这个入口，上层只管拿新链路，不关心后端细节。
/// 任何 `Fn() -> Result<(L, LinkEvents), BleError>` 闭包都自动实现
/// 本 trait，测试里直接用闭包捏 mock 链路即可。
pub trait LinkFactory: Send + Sync + 'static {
    type Link: GattLink;

    /// 打开一条新链路
    fn open(&self) -> impl Future<Output = Result<(Self::Link, LinkEvents), BleError>> + Send;
}

impl<L, F> LinkFactory for F
where
    L: GattLink,
    F: Fn() -> Result<(L, LinkEvents), BleError> + Send + Sync + 'static,
{
    type Link = L;

    async fn open(&self) -> Result<(L, LinkEvents), BleError> {
        self()
    }
}
