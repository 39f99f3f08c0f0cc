//! # Skelly Protocol
//!
//! 骨架道具 BLE 控制协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 命令族操作码与认证常量
//! - `command`: 控制命令类型与帧构建
//! - `checksum`: 校验和查找表（逐条抓包验证）
//!
//! ## 帧格式
//!
//! 除认证载荷外，所有命令帧以 `0xAA` 开头，第二字节为命令族操作码，
//! 随后是参数字节，最后一个字节为校验和。帧长按命令族固定（3-10 字节）。
//!
//! 校验和算法未被逆向出通用公式（对 12 条抓包帧穷举 CRC-8 参数无一命中），
//! 因此编码器使用按 (命令族, 参数) 键入的逐条验证查找表，
//! 表外组合一律返回 [`ProtocolError::Unsupported`]，绝不猜测。

pub mod checksum;
pub mod command;
pub mod constants;

// 重新导出常用类型
pub use command::*;
pub use constants::*;

use thiserror::Error;

/// 单条控制帧的统一抽象
///
/// # 设计目的
///
/// `SkellyFrame` 是协议层和传输层之间的中间抽象，提供：
/// - **层次解耦**：协议层不依赖底层 GATT 实现
/// - **统一接口**：上层通过 `GattLink` trait 使用统一的帧类型
/// - **类型安全**：编译时保证帧格式正确，避免原始字节操作错误
///
/// # 设计特性
///
/// - **Copy trait**：零成本复制，命令在调度队列中按值传递
/// - **固定 12 字节容量**：最长线缆帧为 10 字节（动作帧），避免堆分配
/// - **无生命周期**：自包含数据结构，简化 API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkellyFrame {
    /// 帧数据（固定 12 字节，未使用部分为 0）
    data: [u8; 12],

    /// 有效数据长度 (0-12)
    len: u8,
}

impl SkellyFrame {
    /// 从字节切片构建帧（超过 12 字节的部分被截断）
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = [0u8; 12];
        let len = bytes.len().min(12);
        data[..len].copy_from_slice(&bytes[..len]);

        Self {
            data,
            len: len as u8,
        }
    }

    /// 获取数据切片（只包含有效数据）
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 有效数据长度
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// 是否为空帧
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 命令族操作码（`0xAA` 之后的第二个字节）
    ///
    /// 认证载荷等非 `0xAA` 帧返回 `None`。
    pub fn family_opcode(&self) -> Option<u8> {
        match self.bytes() {
            [constants::FRAME_HEADER, opcode, ..] => Some(*opcode),
            _ => None,
        }
    }
}

impl std::fmt::Display for SkellyFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.bytes() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// 协议层错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// 字段取值非法
    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: u8 },

    /// 校验和表中不存在该 (命令族, 参数) 组合
    ///
    /// 校验和算法未逆向成功，表外组合宁可拒绝也不猜测。
    #[error("Unsupported command: no verified checksum for family 0x{family:02X} params {params:02x?}")]
    Unsupported { family: u8, params: Vec<u8> },
}


#[cfg(all(test, feature = "serde"))]
mod serde_tests {
    use super::*;

    #[test]
    fn test_frame_json_roundtrip() {
        let frame = Command::Movement(Movement::All).encode().unwrap();
        let json = serde_json::to_string(&frame).unwrap();
        let back: SkellyFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_command_types_serialize() {
        let json = serde_json::to_string(&Movement::HeadTorso).unwrap();
        let back: Movement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Movement::HeadTorso);
    }
}
