//! 客户端配置
//!
//! 配置由宿主应用以普通参数提供（环境加载、文件解析不在本层），
//! 全部字段都有开箱可用的默认值。

use std::time::Duration;

use skelly_driver::{BackoffPolicy, ConnectionConfig};
use skelly_protocol::EyeAnimation;

use crate::audio::AudioBridgeConfig;
use crate::lighting::LightRequest;

/// 目标设备的默认广播名
pub const DEFAULT_DEVICE_NAME: &str = "Animated Skelly";

/// 客户端配置
#[derive(Debug, Clone)]
pub struct SkellyConfig {
    /// 标称动作时长（设备实测 15-20 秒）
    pub movement_duration: Duration,
    /// 默认眼睛动画
    pub default_eye_animation: EyeAnimation,
    /// 默认灯光
    pub default_lights: LightRequest,
    /// 驱动层连接配置（认证 + 调度）
    pub connection: ConnectionConfig,
    /// 音频桥配置
    pub audio: AudioBridgeConfig,
    /// 重连退避策略
    pub reconnect: BackoffPolicy,
}

impl Default for SkellyConfig {
    fn default() -> Self {
        Self {
            movement_duration: Duration::from_secs(15),
            default_eye_animation: EyeAnimation::FIRST,
            default_lights: LightRequest::default(),
            connection: ConnectionConfig::default(),
            audio: AudioBridgeConfig::default(),
            reconnect: BackoffPolicy::default(),
        }
    }
}
