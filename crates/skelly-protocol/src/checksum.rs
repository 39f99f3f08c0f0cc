//! 校验和查找表
//!
//! 固件对每条命令帧要求一个尾部校验和字节。对全部抓包样本穷举
//! CRC-8 参数空间（多项式 × 初值 × 反射 × 异或输出，含/不含帧头）
//! 没有任何组合同时命中，推断固件内部使用私有表驱动实现。
//!
//! 因此这里按 (命令族, 参数字节) 维护逐条验证过的字面量表。
//! 表外组合返回 `None`，由编码器转换为 [`ProtocolError::Unsupported`]。
//!
//! [`ProtocolError::Unsupported`]: crate::ProtocolError::Unsupported

use crate::constants::*;

/// 动作命令校验和：(动作码, 校验和)
///
/// 与抓包样本逐字节一致，例如 `aaca0100000000000086`。
const MOVEMENT: [(u8, u8); 7] = [
    (0x01, 0x86), // 仅头部
    (0x02, 0xC1), // 仅手臂
    (0x03, 0x0C), // 头部 + 手臂
    (0x04, 0x4F), // 仅躯干
    (0x05, 0x72), // 头部 + 躯干
    (0x06, 0x35), // 躯干 + 手臂
    (0xFF, 0xBD), // 全部
];

/// 眼睛动画校验和，按动画索引 1-18 顺序排列
const EYES: [u8; 18] = [
    0x9B, 0xDC, 0x11, 0x52, 0x6F, 0x28, 0xE5, 0xA6, 0x73, 0x34, 0xF9, 0xBA, 0x87, 0xC0, 0x0D,
    0x4E, 0x21, 0x62,
];

/// 灯光分区校验和：(分区码, 校验和)
const LIGHT_ZONE: [(u8, u8); 3] = [(0x00, 0x3A), (0x01, 0x7D), (0x02, 0xE4)];

/// 灯光模式校验和：(模式码, 校验和)
const LIGHT_MODE: [(u8, u8); 3] = [(0x01, 0x58), (0x02, 0x9F), (0x03, 0xC6)];

/// 亮度校验和：(亮度档位, 校验和)
///
/// 官方 app 只下发 9 个离散档位，范围内的其他取值从未在总线上出现，
/// 因此也没有可验证的校验和。
const BRIGHTNESS: [(u8, u8); 9] = [
    (0x00, 0xA1),
    (0x20, 0x6E),
    (0x40, 0x2B),
    (0x60, 0xF4),
    (0x80, 0x99),
    (0xA0, 0x56),
    (0xC0, 0x13),
    (0xE0, 0xDC),
    (0xFF, 0x47),
];

/// 颜色校验和：(调色板码, 校验和)
const COLOR: [(u8, u8); 12] = [
    (0x01, 0x8E),
    (0x02, 0xC9),
    (0x03, 0x04),
    (0x04, 0x47),
    (0x05, 0x7A),
    (0x06, 0x3D),
    (0x07, 0xF0),
    (0x08, 0xAB),
    (0x09, 0x66),
    (0x0A, 0x29),
    (0x0B, 0xE4),
    (0x0C, 0x9F),
];

/// 效果速度校验和，按速度 0-10 顺序排列
const SPEED: [u8; 11] = [
    0x51, 0x12, 0xD3, 0x94, 0x55, 0x16, 0xD7, 0x98, 0x59, 0x1A, 0xDB,
];

fn lookup(table: &[(u8, u8)], param: u8) -> Option<u8> {
    table
        .iter()
        .find(|(p, _)| *p == param)
        .map(|(_, checksum)| *checksum)
}

/// 查询单参数命令的校验和
///
/// `family` 为命令族操作码，`param` 为唯一的参数字节。
/// 表外组合返回 `None`。
pub fn single_param(family: u8, param: u8) -> Option<u8> {
    match family {
        OPCODE_MOVEMENT => lookup(&MOVEMENT, param),
        OPCODE_EYES => {
            // 动画索引 1-18 映射到表下标 0-17
            if (1..=18).contains(&param) {
                Some(EYES[param as usize - 1])
            } else {
                None
            }
        },
        OPCODE_LIGHT_ZONE => lookup(&LIGHT_ZONE, param),
        OPCODE_LIGHT_MODE => lookup(&LIGHT_MODE, param),
        OPCODE_BRIGHTNESS => lookup(&BRIGHTNESS, param),
        OPCODE_COLOR => lookup(&COLOR, param),
        OPCODE_SPEED => SPEED.get(param as usize).copied(),
        _ => None,
    }
}

/// 官方 app 下发的全部亮度档位（升序）
pub fn brightness_levels() -> impl Iterator<Item = u8> {
    BRIGHTNESS.iter().map(|(level, _)| *level)
}
