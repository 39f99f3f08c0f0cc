//! 驱动层错误类型定义

use skelly_ble::BleError;
use skelly_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// BLE 链路错误
    #[error("BLE link error: {0}")]
    Ble(#[from] BleError),

    /// 协议编码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 认证尚未通过
    ///
    /// 设备确认认证载荷之前，任何命令都不会到达传输层。
    #[error("Not authenticated: device has not acknowledged the auth payload")]
    NotAuthenticated,

    /// 认证应答窗口内未收到任何通知
    #[error("Authentication timed out after {attempts} attempt(s)")]
    AuthTimeout { attempts: u32 },

    /// 设备显式拒绝认证
    #[error("Authentication rejected by device (code 0x{code:02X})")]
    AuthRejected { code: u8 },

    /// 写入在有界重试后仍然失败
    #[error("Write failed after {attempts} attempt(s)")]
    WriteFailed { attempts: u32 },

    /// 立即命令被更新的立即命令覆盖（邮箱语义：新者胜）
    #[error("Command superseded by a newer immediate command")]
    Superseded,

    /// 命令通道已关闭（调度任务退出）
    #[error("Command channel closed")]
    ChannelClosed,

    /// 常规命令队列已满
    #[error("Command queue full")]
    QueueFull,

    /// 链路在操作进行中断开
    #[error("Connection lost")]
    ConnectionLost,

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::DriverError;
    use skelly_ble::BleError;
    use skelly_protocol::ProtocolError;

    /// 测试 DriverError 的 Display 实现
    #[test]
    fn test_driver_error_display() {
        let err = DriverError::Ble(BleError::NotFound);
        assert!(format!("{err}").contains("No matching device"));

        let err = DriverError::Protocol(ProtocolError::Unsupported {
            family: 0xF3,
            params: vec![0x81],
        });
        assert!(format!("{err}").contains("Unsupported command"));

        let err = DriverError::AuthRejected { code: 0x00 };
        assert!(format!("{err}").contains("0x00"));

        let err = DriverError::WriteFailed { attempts: 4 };
        assert!(format!("{err}").contains("4 attempt"));
    }

    /// 测试 From<BleError> 转换
    #[test]
    fn test_from_ble_error() {
        let err: DriverError = BleError::Timeout.into();
        assert!(matches!(err, DriverError::Ble(BleError::Timeout)));
    }

    /// 测试 From<ProtocolError> 转换
    #[test]
    fn test_from_protocol_error() {
        let err: DriverError = ProtocolError::InvalidValue {
            field: "Movement".to_string(),
            value: 0x07,
        }
        .into();
        assert!(matches!(err, DriverError::Protocol(_)));
    }
}
