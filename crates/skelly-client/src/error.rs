//! 客户端层错误类型定义

use skelly_driver::DriverError;
use thiserror::Error;

/// 客户端层错误类型
#[derive(Error, Debug)]
pub enum ClientError {
    /// 驱动层错误
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// 设备未就绪（未连接或认证未通过）
    #[error("Device not ready")]
    NotReady,

    /// 经典蓝牙配对被拒绝
    ///
    /// 配对失败不影响 BLE 控制通路，只是音频不可用。
    #[error("Classic BT pairing rejected")]
    PairingRejected,

    /// 经典蓝牙配对超时
    #[error("Classic BT pairing timed out")]
    PairingTimeout,

    /// 配对工具不可用（如 bluetoothctl 未安装）
    #[error("Pairing tool unavailable: {0}")]
    PairingUnavailable(String),

    /// 音频桥因 BLE 断链被中止
    #[error("Audio bridge aborted: BLE link lost")]
    AudioAborted,

    /// 音频启用重试次数耗尽
    #[error("Audio bridge retry ceiling reached after {attempts} attempt(s)")]
    AudioRetriesExhausted { attempts: u32 },
}

impl ClientError {
    /// 是否为配对类错误（BLE 控制通路仍然完好）
    pub fn is_pairing_failure(&self) -> bool {
        matches!(
            self,
            ClientError::PairingRejected
                | ClientError::PairingTimeout
                | ClientError::PairingUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairing_failures_classified() {
        assert!(ClientError::PairingRejected.is_pairing_failure());
        assert!(ClientError::PairingTimeout.is_pairing_failure());
        assert!(!ClientError::NotReady.is_pairing_failure());
        assert!(!ClientError::AudioAborted.is_pairing_failure());
    }

    #[test]
    fn test_driver_error_wraps() {
        let err: ClientError = DriverError::NotAuthenticated.into();
        assert!(matches!(err, ClientError::Driver(_)));
    }
}
