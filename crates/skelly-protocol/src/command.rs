//! 控制命令类型与帧构建
//!
//! 包含所有控制命令的结构化描述，提供构建 [`SkellyFrame`] 的方法。
//! 帧构建是纯函数：不触网、无副作用、完全确定，方便独立单元测试。

use crate::checksum;
use crate::constants::*;
use crate::{ProtocolError, SkellyFrame};

// ============================================================================
// 动作命令
// ============================================================================

/// 动作类型（0xAA 0xCA）
///
/// 设备固件共支持 7 种动作，每种动作执行约 15-20 秒后自行停止。
/// 协议中**没有**显式的停止命令：只能等待自然到期，
/// 或者发送另一种动作立即切换。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Movement {
    /// 仅头部
    #[default]
    Head = 0x01,
    /// 仅手臂
    Arm = 0x02,
    /// 头部 + 手臂
    HeadArm = 0x03,
    /// 仅躯干
    Torso = 0x04,
    /// 头部 + 躯干
    HeadTorso = 0x05,
    /// 躯干 + 手臂
    TorsoArm = 0x06,
    /// 全部（头部 + 躯干 + 手臂）
    All = 0xFF,
}

impl Movement {
    /// 线缆上的动作码
    pub fn code(self) -> u8 {
        self as u8
    }

    /// 全部 7 种动作（固件枚举顺序）
    pub const ALL_KINDS: [Movement; 7] = [
        Movement::Head,
        Movement::Arm,
        Movement::HeadArm,
        Movement::Torso,
        Movement::HeadTorso,
        Movement::TorsoArm,
        Movement::All,
    ];
}

impl TryFrom<u8> for Movement {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Movement::Head),
            0x02 => Ok(Movement::Arm),
            0x03 => Ok(Movement::HeadArm),
            0x04 => Ok(Movement::Torso),
            0x05 => Ok(Movement::HeadTorso),
            0x06 => Ok(Movement::TorsoArm),
            0xFF => Ok(Movement::All),
            _ => Err(ProtocolError::InvalidValue {
                field: "Movement".to_string(),
                value,
            }),
        }
    }
}

impl std::fmt::Display for Movement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Movement::Head => "head",
            Movement::Arm => "arm",
            Movement::HeadArm => "head+arm",
            Movement::Torso => "torso",
            Movement::HeadTorso => "head+torso",
            Movement::TorsoArm => "torso+arm",
            Movement::All => "all",
        };
        f.write_str(name)
    }
}

// ============================================================================
// 眼睛动画命令
// ============================================================================

/// 眼睛动画（0xAA 0xF9），按索引 1-18 选择
///
/// 固件不对动画命名，官方 app 也只按序号展示，因此这里用经过
/// 范围校验的 newtype 而不是臆造 18 个名字。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EyeAnimation(u8);

impl EyeAnimation {
    /// 有效动画索引数量
    pub const COUNT: u8 = 18;

    /// 第一个动画（官方 app 的默认选择）
    pub const FIRST: EyeAnimation = EyeAnimation(1);

    /// 校验并构建动画索引（1-18）
    pub fn new(index: u8) -> Result<Self, ProtocolError> {
        if (1..=Self::COUNT).contains(&index) {
            Ok(Self(index))
        } else {
            Err(ProtocolError::InvalidValue {
                field: "EyeAnimation".to_string(),
                value: index,
            })
        }
    }

    /// 动画索引 (1-18)
    pub fn index(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for EyeAnimation {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

// ============================================================================
// 灯光命令
// ============================================================================

/// 灯光分区（0xAA 0xF5）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LightZone {
    /// 全部灯组
    #[default]
    All = 0x00,
    /// 灯组 1（眼窝）
    Group1 = 0x01,
    /// 灯组 2（胸腔）
    Group2 = 0x02,
}

impl TryFrom<u8> for LightZone {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(LightZone::All),
            0x01 => Ok(LightZone::Group1),
            0x02 => Ok(LightZone::Group2),
            _ => Err(ProtocolError::InvalidValue {
                field: "LightZone".to_string(),
                value,
            }),
        }
    }
}

/// 灯光模式（0xAA 0xF2）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LightMode {
    /// 常亮
    #[default]
    Static = 0x01,
    /// 频闪
    Strobe = 0x02,
    /// 呼吸
    Pulsing = 0x03,
}

impl TryFrom<u8> for LightMode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(LightMode::Static),
            0x02 => Ok(LightMode::Strobe),
            0x03 => Ok(LightMode::Pulsing),
            _ => Err(ProtocolError::InvalidValue {
                field: "LightMode".to_string(),
                value,
            }),
        }
    }
}

/// 亮度档位（0xAA 0xF3）
///
/// 固件接受 0-255，但校验和表只覆盖官方 app 下发过的 9 个档位，
/// 因此任意亮度请求需先经 [`BrightnessLevel::quantize`] 就近取档。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BrightnessLevel(u8);

impl BrightnessLevel {
    /// 构建亮度档位，要求取值恰好是已验证的档位之一
    pub fn new(level: u8) -> Result<Self, ProtocolError> {
        if checksum::single_param(OPCODE_BRIGHTNESS, level).is_some() {
            Ok(Self(level))
        } else {
            Err(ProtocolError::InvalidValue {
                field: "BrightnessLevel".to_string(),
                value: level,
            })
        }
    }

    /// 把任意 0-255 亮度请求就近量化到已验证档位
    pub fn quantize(raw: u8) -> Self {
        let level = checksum::brightness_levels()
            .min_by_key(|level| (*level as i16 - raw as i16).unsigned_abs())
            .expect("brightness table is non-empty");
        Self(level)
    }

    /// 档位原始值
    pub fn level(self) -> u8 {
        self.0
    }
}

impl Default for BrightnessLevel {
    fn default() -> Self {
        Self(0xFF)
    }
}

/// 灯光颜色（0xAA 0xF4），设备调色板编码
///
/// 设备不接受 RGB 三元组，只认 12 个调色板编号。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LightColor {
    Red = 0x01,
    Orange = 0x02,
    Yellow = 0x03,
    #[default]
    Green = 0x04,
    Cyan = 0x05,
    Blue = 0x06,
    Purple = 0x07,
    Pink = 0x08,
    White = 0x09,
    WarmWhite = 0x0A,
    Lime = 0x0B,
    IceBlue = 0x0C,
}

impl TryFrom<u8> for LightColor {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(LightColor::Red),
            0x02 => Ok(LightColor::Orange),
            0x03 => Ok(LightColor::Yellow),
            0x04 => Ok(LightColor::Green),
            0x05 => Ok(LightColor::Cyan),
            0x06 => Ok(LightColor::Blue),
            0x07 => Ok(LightColor::Purple),
            0x08 => Ok(LightColor::Pink),
            0x09 => Ok(LightColor::White),
            0x0A => Ok(LightColor::WarmWhite),
            0x0B => Ok(LightColor::Lime),
            0x0C => Ok(LightColor::IceBlue),
            _ => Err(ProtocolError::InvalidValue {
                field: "LightColor".to_string(),
                value,
            }),
        }
    }
}

/// 灯光效果速度（0xAA 0xF6），0-10
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EffectSpeed(u8);

impl EffectSpeed {
    /// 最大速度值
    pub const MAX: u8 = 10;

    /// 校验并构建速度（0-10）
    pub fn new(speed: u8) -> Result<Self, ProtocolError> {
        if speed <= Self::MAX {
            Ok(Self(speed))
        } else {
            Err(ProtocolError::InvalidValue {
                field: "EffectSpeed".to_string(),
                value: speed,
            })
        }
    }

    /// 速度原始值
    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for EffectSpeed {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<u8> for EffectSpeed {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

// ============================================================================
// 系统命令（经典蓝牙音频模式启用序列）
// ============================================================================

/// 系统命令
///
/// 这些帧是整帧抓包字面量（校验和已含在内），只在启用经典蓝牙
/// 音频模式的固定序列中使用，顺序不可调换。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SystemCommand {
    /// 预设查询（加载主菜单）
    PresetQuery,
    /// 初始化
    Initialize,
    /// 预设确认
    PresetConfirm,
    /// live 模式装配
    LiveSetup,
    /// 录音模式触发（设备随后开始广播经典蓝牙端点）
    RecordTrigger,
}

impl SystemCommand {
    /// 整帧字面量（含校验和）
    pub fn frame_bytes(self) -> &'static [u8] {
        match self {
            SystemCommand::PresetQuery => &[0xAA, 0xD0, 0x5E],
            SystemCommand::Initialize => &[0xAA, 0xE5, 0xDF],
            SystemCommand::PresetConfirm => &[0xAA, 0xD1, 0x00],
            SystemCommand::LiveSetup => &[0xAA, 0xC6, 0x00, 0x00, 0x00, 0xBE],
            SystemCommand::RecordTrigger => &[0xAA, 0xFD, 0x01, 0xD2],
        }
    }
}

// ============================================================================
// 统一命令类型
// ============================================================================

/// 结构化控制命令
///
/// 编码为 [`SkellyFrame`] 后经调度器下发。命令一经构建即不可变，
/// 由编码器生产、调度器一次性消费。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// 动作命令
    Movement(Movement),
    /// 眼睛动画命令
    Eyes(EyeAnimation),
    /// 灯光分区选择
    LightZone(LightZone),
    /// 灯光模式选择
    LightMode(LightMode),
    /// 亮度设置
    Brightness(BrightnessLevel),
    /// 颜色设置
    Color(LightColor),
    /// 效果速度设置
    Speed(EffectSpeed),
    /// 系统命令
    System(SystemCommand),
}

impl Command {
    /// 命令族操作码
    pub fn family(&self) -> u8 {
        match self {
            Command::Movement(_) => OPCODE_MOVEMENT,
            Command::Eyes(_) => OPCODE_EYES,
            Command::LightZone(_) => OPCODE_LIGHT_ZONE,
            Command::LightMode(_) => OPCODE_LIGHT_MODE,
            Command::Brightness(_) => OPCODE_BRIGHTNESS,
            Command::Color(_) => OPCODE_COLOR,
            Command::Speed(_) => OPCODE_SPEED,
            Command::System(cmd) => cmd.frame_bytes()[1],
        }
    }

    /// 参数字节
    fn param(&self) -> u8 {
        match self {
            Command::Movement(movement) => movement.code(),
            Command::Eyes(animation) => animation.index(),
            Command::LightZone(zone) => *zone as u8,
            Command::LightMode(mode) => *mode as u8,
            Command::Brightness(level) => level.level(),
            Command::Color(color) => *color as u8,
            Command::Speed(speed) => speed.value(),
            // 系统命令是整帧字面量，没有独立参数字节
            Command::System(_) => 0,
        }
    }

    /// 编码为线缆帧
    ///
    /// 纯函数；(命令族, 参数) 不在校验和表内时返回
    /// [`ProtocolError::Unsupported`]。
    pub fn encode(&self) -> Result<SkellyFrame, ProtocolError> {
        if let Command::System(cmd) = self {
            return Ok(SkellyFrame::from_bytes(cmd.frame_bytes()));
        }

        let family = self.family();
        let param = self.param();
        let checksum =
            checksum::single_param(family, param).ok_or_else(|| ProtocolError::Unsupported {
                family,
                params: vec![param],
            })?;

        let frame = match self {
            // 动作帧带 6 字节零填充，总长 10 字节
            Command::Movement(_) => {
                let mut bytes = [0u8; MOVEMENT_FRAME_LEN];
                bytes[0] = FRAME_HEADER;
                bytes[1] = family;
                bytes[2] = param;
                bytes[MOVEMENT_FRAME_LEN - 1] = checksum;
                SkellyFrame::from_bytes(&bytes)
            },
            // 其余命令族都是 4 字节：帧头 + 操作码 + 参数 + 校验和
            _ => SkellyFrame::from_bytes(&[FRAME_HEADER, family, param, checksum]),
        };

        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 7 条动作帧必须与抓包样本逐字节一致
    #[test]
    fn test_movement_frames_match_captures() {
        let captures = [
            (Movement::Head, "aaca0100000000000086"),
            (Movement::Torso, "aaca040000000000004f"),
            (Movement::Arm, "aaca02000000000000c1"),
            (Movement::HeadTorso, "aaca0500000000000072"),
            (Movement::HeadArm, "aaca030000000000000c"),
            (Movement::TorsoArm, "aaca0600000000000035"),
            (Movement::All, "aacaff000000000000bd"),
        ];

        for (movement, expected) in captures {
            let frame = Command::Movement(movement).encode().unwrap();
            assert_eq!(frame.bytes(), hex::decode(expected).unwrap(), "{movement}");
            assert_eq!(frame.to_string(), expected, "{movement}");
            assert_eq!(frame.len(), MOVEMENT_FRAME_LEN);
        }
    }

    #[test]
    fn test_system_frames_match_captures() {
        let captures = [
            (SystemCommand::PresetQuery, "aad05e"),
            (SystemCommand::Initialize, "aae5df"),
            (SystemCommand::PresetConfirm, "aad100"),
            (SystemCommand::LiveSetup, "aac6000000be"),
            (SystemCommand::RecordTrigger, "aafd01d2"),
        ];

        for (cmd, expected) in captures {
            let frame = Command::System(cmd).encode().unwrap();
            assert_eq!(frame.to_string(), expected);
        }
    }

    #[test]
    fn test_eye_animation_frame_shape() {
        let frame = Command::Eyes(EyeAnimation::new(7).unwrap()).encode().unwrap();
        let bytes = frame.bytes();
        assert_eq!(bytes.len(), 4);
        assert_eq!(&bytes[..3], &[0xAA, 0xF9, 0x07]);
    }

    #[test]
    fn test_eye_animation_out_of_range() {
        assert!(matches!(
            EyeAnimation::new(0),
            Err(ProtocolError::InvalidValue { .. })
        ));
        assert!(matches!(
            EyeAnimation::new(19),
            Err(ProtocolError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_light_frames_are_four_bytes() {
        let commands = [
            Command::LightZone(LightZone::Group1),
            Command::LightMode(LightMode::Strobe),
            Command::Brightness(BrightnessLevel::quantize(128)),
            Command::Color(LightColor::Purple),
            Command::Speed(EffectSpeed::new(3).unwrap()),
        ];
        for cmd in commands {
            let frame = cmd.encode().unwrap();
            assert_eq!(frame.len(), 4, "{cmd:?}");
            assert_eq!(frame.bytes()[0], FRAME_HEADER);
        }
    }

    #[test]
    fn test_brightness_quantize_snaps_to_nearest() {
        assert_eq!(BrightnessLevel::quantize(0).level(), 0x00);
        assert_eq!(BrightnessLevel::quantize(0x21).level(), 0x20);
        assert_eq!(BrightnessLevel::quantize(0x90).level(), 0x80);
        assert_eq!(BrightnessLevel::quantize(255).level(), 0xFF);
    }

    #[test]
    fn test_brightness_rejects_unverified_level() {
        assert!(BrightnessLevel::new(0x80).is_ok());
        assert!(matches!(
            BrightnessLevel::new(0x81),
            Err(ProtocolError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_movement_try_from_roundtrip() {
        for kind in Movement::ALL_KINDS {
            assert_eq!(Movement::try_from(kind.code()).unwrap(), kind);
        }
        assert!(Movement::try_from(0x07).is_err());
    }

    #[test]
    fn test_speed_bounds() {
        assert!(EffectSpeed::new(10).is_ok());
        assert!(matches!(
            EffectSpeed::new(11),
            Err(ProtocolError::InvalidValue { .. })
        ));
    }
}
