//! 认证握手
//!
//! 每个连接只跑一次：写入固定认证载荷（`0x02` + ASCII `"pass"`），
//! 然后在有界应答窗口内等待设备确认。设备确认前，固件会静默丢弃
//! 其余所有命令，因此握手是整个命令通路的闸门。
//!
//! 应答分类（固件未文档化，按抓包行为约定）：
//! - 窗口内收到首字节为 `0x00` 的通知 → 显式拒绝
//! - 窗口内收到任何其他非空通知 → 确认
//! - 空通知忽略，继续等待
//! - 窗口耗尽 → 超时，按配置退避重试

use std::time::Duration;

use skelly_ble::GattLink;
use skelly_protocol::AUTH_PAYLOAD;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::DriverError;

/// 认证会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// 尚未发送认证载荷
    #[default]
    Pending,
    /// 载荷已写入，等待应答
    Sent,
    /// 设备已确认
    Acked,
    /// 设备显式拒绝
    Rejected,
    /// 应答窗口耗尽
    TimedOut,
}

/// 认证配置
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// 应答窗口（合理区间 300-500ms）
    pub ack_window: Duration,
    /// 超时重试次数（不含首次尝试）
    pub retries: u32,
    /// 重试间隔
    pub retry_backoff: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            ack_window: Duration::from_millis(400),
            retries: 2,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// 认证结果（内部记录最终状态与尝试次数）
#[derive(Debug)]
pub(crate) struct AuthOutcome {
    pub state: AuthState,
    pub attempts: u32,
}

/// 执行认证握手
///
/// `auth_rx` 是通知路由器在认证阶段灌入的收件箱。
/// 超时按配置重试；显式拒绝立即终止（重发相同口令不会改变结果）。
pub(crate) async fn authenticate<L: GattLink>(
    link: &L,
    auth_rx: &mut mpsc::Receiver<Vec<u8>>,
    config: &AuthConfig,
) -> Result<AuthOutcome, DriverError> {
    let total_attempts = config.retries + 1;

    for attempt in 1..=total_attempts {
        debug!(attempt, total_attempts, "sending auth payload");
        link.write_command(AUTH_PAYLOAD).await?;

        match wait_for_ack(auth_rx, config.ack_window).await {
            AuthState::Acked => {
                info!(attempt, "device acknowledged authentication");
                return Ok(AuthOutcome {
                    state: AuthState::Acked,
                    attempts: attempt,
                });
            },
            AuthState::Rejected => {
                warn!(attempt, "device rejected authentication");
                return Err(DriverError::AuthRejected { code: 0x00 });
            },
            AuthState::TimedOut => {
                warn!(attempt, window = ?config.ack_window, "no auth ack within window");
                if attempt < total_attempts {
                    tokio::time::sleep(config.retry_backoff).await;
                }
            },
            // wait_for_ack 只返回上面三种终态
            state => unreachable!("unexpected auth state {state:?}"),
        }
    }

    Err(DriverError::AuthTimeout {
        attempts: total_attempts,
    })
}

/// 在应答窗口内等待并分类设备应答
async fn wait_for_ack(auth_rx: &mut mpsc::Receiver<Vec<u8>>, window: Duration) -> AuthState {
    let deadline = Instant::now() + window;

    loop {
        match tokio::time::timeout_at(deadline, auth_rx.recv()).await {
            Ok(Some(payload)) => match payload.first() {
                // 空通知不算应答
                None => continue,
                Some(0x00) => return AuthState::Rejected,
                Some(_) => return AuthState::Acked,
            },
            // 收件箱关闭等价于链路没了，按超时处理，外层重试时写入会报错
            Ok(None) => return AuthState::TimedOut,
            Err(_) => return AuthState::TimedOut,
        }
    }
}
