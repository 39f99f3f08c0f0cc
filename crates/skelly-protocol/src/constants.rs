//! 协议常量定义
//!
//! 所有操作码与固定载荷均来自对官方 app 控制流量的抓包。

/// 所有命令帧的帧头
pub const FRAME_HEADER: u8 = 0xAA;

// ============================================================================
// 命令族操作码（帧头之后的第二个字节）
// ============================================================================

/// 动作命令族（头/躯干/手臂及其组合）
pub const OPCODE_MOVEMENT: u8 = 0xCA;

/// 眼睛动画命令族（动画索引 1-18）
pub const OPCODE_EYES: u8 = 0xF9;

/// 灯光分区选择
pub const OPCODE_LIGHT_ZONE: u8 = 0xF5;

/// 灯光模式选择（常亮/频闪/呼吸）
pub const OPCODE_LIGHT_MODE: u8 = 0xF2;

/// 灯光亮度
pub const OPCODE_BRIGHTNESS: u8 = 0xF3;

/// 灯光颜色（设备调色板编码）
pub const OPCODE_COLOR: u8 = 0xF4;

/// 灯光效果速度 (0-10)
pub const OPCODE_SPEED: u8 = 0xF6;

// ============================================================================
// 系统命令族（经典蓝牙音频模式启用序列使用）
// ============================================================================

/// 预设查询
pub const OPCODE_PRESET_QUERY: u8 = 0xD0;

/// 预设确认
pub const OPCODE_PRESET_CONFIRM: u8 = 0xD1;

/// 初始化（进入 live 模式前后各发送一次）
pub const OPCODE_INITIALIZE: u8 = 0xE5;

/// live 模式装配
pub const OPCODE_LIVE_SETUP: u8 = 0xC6;

/// 录音模式触发（使设备开始广播经典蓝牙音频端点）
pub const OPCODE_RECORD_TRIGGER: u8 = 0xFD;

// ============================================================================
// 认证
// ============================================================================

/// 认证载荷：`0x02` + ASCII `"pass"`
///
/// 连接后必须先写入此载荷，设备确认前其余命令一律被固件忽略。
/// 注意它不走 `0xAA` 帧格式，也没有校验和。
pub const AUTH_PAYLOAD: &[u8] = &[0x02, b'p', b'a', b's', b's'];

/// 动作帧总长（帧头 2 + 动作码 1 + 填充 6 + 校验和 1）
pub const MOVEMENT_FRAME_LEN: usize = 10;
