//! 命令类型定义模块
//!
//! 提供命令优先级和提交回执机制。

use std::time::Duration;

use skelly_protocol::SkellyFrame;
use tokio::sync::oneshot;

use crate::error::DriverError;

/// 命令优先级
///
/// 用于区分不同类型的命令，优化调度策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandPriority {
    /// 立即命令（邮箱语义，新者胜）
    ///
    /// 用于动作切换：必须插到常规队列前面，且旧的未发出的动作
    /// 命令被新命令覆盖。**不会**绕过节流下限——固件要求严格
    /// 串行、限速的输入。
    Immediate,

    /// 常规命令（FIFO，不可覆盖）
    ///
    /// 用于灯光、眼睛动画、系统命令等例行更新。
    #[default]
    Routine,
}

/// 一次命令提交
#[derive(Debug, Clone, Copy)]
pub struct CommandRequest {
    /// 协议命令
    pub command: skelly_protocol::Command,
    /// 优先级
    pub priority: CommandPriority,
    /// 写入成功后的额外静候时间（叠加在节流下限之上）
    ///
    /// 音频模式启用序列的各步需要留给固件反应时间。
    pub settle: Option<Duration>,
}

impl CommandRequest {
    /// 常规优先级提交
    pub fn routine(command: skelly_protocol::Command) -> Self {
        Self {
            command,
            priority: CommandPriority::Routine,
            settle: None,
        }
    }

    /// 立即优先级提交
    pub fn immediate(command: skelly_protocol::Command) -> Self {
        Self {
            command,
            priority: CommandPriority::Immediate,
            settle: None,
        }
    }

    /// 附加写后静候时间
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = Some(settle);
        self
    }
}

/// 进入调度队列的命令（已编码）
#[derive(Debug)]
pub(crate) struct QueuedCommand {
    pub frame: SkellyFrame,
    pub settle: Option<Duration>,
    pub done: oneshot::Sender<Result<(), DriverError>>,
}

/// 命令回执
///
/// `submit` 在入队后立刻返回本回执，调用方可以选择等待写入结果，
/// 也可以直接丢弃（fire-and-forget）。调度器不会因为没人等待而阻塞。
#[derive(Debug)]
pub struct CommandTicket {
    pub(crate) done: oneshot::Receiver<Result<(), DriverError>>,
}

impl CommandTicket {
    /// 等待命令真正写入设备（或失败）
    pub async fn wait(self) -> Result<(), DriverError> {
        match self.done.await {
            Ok(result) => result,
            // 调度任务连同回执发送端一起消失，只可能是链路被拆除
            Err(_) => Err(DriverError::ConnectionLost),
        }
    }
}
