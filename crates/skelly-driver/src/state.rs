//! 设备连接状态

/// 设备连接状态
///
/// 每个道具同一时刻只有一个活动连接，状态由连接管理器独占推进，
/// 其余组件通过 `watch` 通道只读观察。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    /// 未连接（初始与终止状态）
    #[default]
    Disconnected,
    /// 扫描/建链中
    Connecting,
    /// 链路已建立、CCCD 已订阅，认证尚未开始
    Connected,
    /// 认证握手进行中
    Authenticating,
    /// 认证已确认，命令调度解锁
    Ready,
}

impl DeviceState {
    /// 是否可以下发命令
    pub fn is_ready(self) -> bool {
        matches!(self, DeviceState::Ready)
    }

    /// 链路是否存活（Connected/Authenticating/Ready）
    pub fn is_linked(self) -> bool {
        matches!(
            self,
            DeviceState::Connected | DeviceState::Authenticating | DeviceState::Ready
        )
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeviceState::Disconnected => "disconnected",
            DeviceState::Connecting => "connecting",
            DeviceState::Connected => "connected",
            DeviceState::Authenticating => "authenticating",
            DeviceState::Ready => "ready",
        };
        f.write_str(name)
    }
}
