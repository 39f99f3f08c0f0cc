//! # Skelly CLI
//!
//! 骨架道具命令行工具（内部：扫描 -> 连接 -> 认证 -> 执行 -> 断开）。
//!
//! ```bash
//! # 随机动一下
//! skelly-cli move --random
//!
//! # 指定动作 + 眼睛动画
//! skelly-cli move head-torso
//! skelly-cli eyes 7
//!
//! # 灯光
//! skelly-cli light --zone all --mode pulsing --brightness 200 --color purple --speed 6
//!
//! # 启用经典蓝牙音频（Linux，需要 bluetoothctl）
//! skelly-cli audio
//!
//! # 演示循环：默认灯光 + 周期性随机动作，Ctrl+C 退出
//! skelly-cli demo
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use skelly_sdk::{
    EffectSpeed, EyeAnimation, LightColor, LightMode, LightRequest, LightZone, Movement, Skelly,
    SkellyBuilder,
};
use tracing::info;

/// Skelly CLI - 骨架道具命令行工具
#[derive(Parser, Debug)]
#[command(name = "skelly-cli")]
#[command(about = "Command-line interface for the Animated Skelly prop", long_about = None)]
#[command(version)]
struct Cli {
    /// 目标广播名片段
    #[arg(long, global = true, default_value = "Animated Skelly")]
    name: String,

    /// 目标 BLE MAC 地址（名称匹配失败时的兜底）
    #[arg(long, global = true)]
    address: Option<String>,

    /// 标称动作时长（秒）
    #[arg(long, global = true, default_value_t = 15)]
    movement_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 执行动作
    Move {
        /// 动作类型
        #[arg(value_enum)]
        kind: Option<MovementArg>,

        /// 按权重随机挑一个动作
        #[arg(long, conflicts_with = "kind")]
        random: bool,
    },

    /// 播放眼睛动画（索引 1-18）
    Eyes {
        index: u8,
    },

    /// 设置灯光
    Light {
        #[arg(long, value_enum, default_value = "all")]
        zone: ZoneArg,
        #[arg(long, value_enum, default_value = "static")]
        mode: ModeArg,
        /// 亮度 0-255（就近量化到设备支持的档位）
        #[arg(long, default_value_t = 255)]
        brightness: u8,
        #[arg(long, value_enum, default_value = "green")]
        color: ColorArg,
        /// 效果速度 0-10
        #[arg(long, default_value_t = 5)]
        speed: u8,
    },

    /// 启用经典蓝牙音频模式并配对（Linux）
    Audio,

    /// 演示循环：默认灯光 + 周期性随机动作，Ctrl+C 退出
    Demo {
        /// 两次动作之间的间隔（秒）
        #[arg(long, default_value_t = 10)]
        interval: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MovementArg {
    Head,
    Arm,
    HeadArm,
    Torso,
    HeadTorso,
    TorsoArm,
    All,
}

impl From<MovementArg> for Movement {
    fn from(arg: MovementArg) -> Self {
        match arg {
            MovementArg::Head => Movement::Head,
            MovementArg::Arm => Movement::Arm,
            MovementArg::HeadArm => Movement::HeadArm,
            MovementArg::Torso => Movement::Torso,
            MovementArg::HeadTorso => Movement::HeadTorso,
            MovementArg::TorsoArm => Movement::TorsoArm,
            MovementArg::All => Movement::All,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ZoneArg {
    All,
    Group1,
    Group2,
}

impl From<ZoneArg> for LightZone {
    fn from(arg: ZoneArg) -> Self {
        match arg {
            ZoneArg::All => LightZone::All,
            ZoneArg::Group1 => LightZone::Group1,
            ZoneArg::Group2 => LightZone::Group2,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Static,
    Strobe,
    Pulsing,
}

impl From<ModeArg> for LightMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Static => LightMode::Static,
            ModeArg::Strobe => LightMode::Strobe,
            ModeArg::Pulsing => LightMode::Pulsing,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ColorArg {
    Red,
    Orange,
    Yellow,
    Green,
    Cyan,
    Blue,
    Purple,
    Pink,
    White,
    WarmWhite,
    Lime,
    IceBlue,
}

impl From<ColorArg> for LightColor {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Red => LightColor::Red,
            ColorArg::Orange => LightColor::Orange,
            ColorArg::Yellow => LightColor::Yellow,
            ColorArg::Green => LightColor::Green,
            ColorArg::Cyan => LightColor::Cyan,
            ColorArg::Blue => LightColor::Blue,
            ColorArg::Purple => LightColor::Purple,
            ColorArg::Pink => LightColor::Pink,
            ColorArg::White => LightColor::White,
            ColorArg::WarmWhite => LightColor::WarmWhite,
            ColorArg::Lime => LightColor::Lime,
            ColorArg::IceBlue => LightColor::IceBlue,
        }
    }
}

async fn connect(cli: &Cli) -> Result<Skelly<skelly_sdk::ble::BtleplugFactory>> {
    let mut builder = SkellyBuilder::new()
        .name(cli.name.clone())
        .movement_duration(Duration::from_secs(cli.movement_secs));
    if let Some(address) = &cli.address {
        builder = builder.address(address.clone());
    }

    info!("connecting to prop…");
    builder.connect().await.context("failed to connect to the prop")
}

#[tokio::main]
async fn main() -> Result<()> {
    skelly_sdk::init_logging();

    let cli = Cli::parse();
    let skelly = connect(&cli).await?;

    let result = run(&cli, &skelly).await;
    let _ = skelly.disconnect().await;
    result
}

async fn run(cli: &Cli, skelly: &Skelly<skelly_sdk::ble::BtleplugFactory>) -> Result<()> {
    match &cli.command {
        Commands::Move { kind, random } => {
            let performed = match kind {
                Some(arg) if !*random => {
                    let kind = Movement::from(*arg);
                    skelly.perform(kind).await?;
                    kind
                },
                _ => skelly.perform_random().await?,
            };
            println!("performing: {performed}");
        },

        Commands::Eyes { index } => {
            let animation = EyeAnimation::new(*index)
                .with_context(|| format!("invalid eye animation index {index} (valid: 1-18)"))?;
            skelly.play_eyes(animation).await?;
            println!("eye animation {index} playing");
        },

        Commands::Light {
            zone,
            mode,
            brightness,
            color,
            speed,
        } => {
            let speed = EffectSpeed::new(*speed)
                .with_context(|| format!("invalid speed {speed} (valid: 0-10)"))?;
            skelly
                .set_light(LightRequest {
                    zone: (*zone).into(),
                    mode: (*mode).into(),
                    brightness: *brightness,
                    color: (*color).into(),
                    speed,
                })
                .await?;
            println!("lights updated");
        },

        Commands::Audio => {
            #[cfg(target_os = "linux")]
            {
                let pairer = skelly_sdk::BluetoothctlPairer::default();
                skelly.enable_audio(&pairer).await?;
                let sink =
                    skelly_sdk::client::audio::pulse_sink_name(&skelly.config().audio.audio_address);
                println!("Classic BT audio enabled, PulseAudio sink: {sink}");
            }
            #[cfg(not(target_os = "linux"))]
            bail!("audio pairing requires bluetoothctl and is only supported on Linux");
        },

        Commands::Demo { interval } => {
            let running = Arc::new(AtomicBool::new(true));
            {
                let running = running.clone();
                ctrlc::set_handler(move || {
                    running.store(false, Ordering::SeqCst);
                })
                .context("failed to install Ctrl+C handler")?;
            }

            skelly.apply_default_lights().await?;
            skelly.play_default_eyes().await?;
            println!("demo running, Ctrl+C to stop");

            while running.load(Ordering::SeqCst) {
                match skelly.perform_random().await {
                    Ok(kind) => println!("performing: {kind}"),
                    Err(e) => {
                        tracing::warn!("movement failed: {e}, reconnecting");
                        if let Err(e) = skelly.reconnect().await {
                            bail!("prop unreachable: {e}");
                        }
                    },
                }

                for _ in 0..(*interval * 10) {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
            println!("demo stopped");
        },
    }

    Ok(())
}
