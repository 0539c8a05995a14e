//! Command-line surface. Grounded on `backend-rust/src/cli.rs`'s `clap`
//! derive layout (flat struct, `ValueEnum` for closed choices).

use clap::{Parser, ValueEnum};

/// ISO 11783 Task Controller server bridging an ISOBUS implement to AgOpenGPS.
#[derive(Debug, Parser)]
#[command(name = "aog-task-controller", version, about)]
pub struct Args {
    /// Mirror log output to a file alongside stdout.
    #[arg(long = "log2file")]
    pub log_to_file: bool,

    /// Which CAN adapter backend to use.
    #[arg(long = "can_adapter", value_enum, default_value_t = CanAdapter::Loopback)]
    pub can_adapter: CanAdapter,

    /// CAN channel index, adapter-specific.
    #[arg(long = "can_channel", default_value_t = 0)]
    pub can_channel: u8,

    /// Minimum log level emitted.
    #[arg(long = "log_level", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Skip AOG frame checksum validation, for implements that still emit
    /// legacy bad checksums (§9 design note).
    #[arg(long = "skip-checksum-validation")]
    pub skip_checksum_validation: bool,
}

/// Accepted values are exactly `debug|info|warning|error|critical`, per
/// spec §6's `--log_level={debug|info|warning|error|critical}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    #[value(name = "warning")]
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
            LogLevel::Critical => "error",
        }
    }
}

/// Only one channel is supported per spec's Non-goals ("no support for
/// multiple CAN channels"); the enum names the adapters required by §6/§7,
/// plus the in-process fallback used when no hardware is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CanAdapter {
    #[value(name = "peak-pcan")]
    PeakPcan,
    #[value(name = "innomaker-usb2can")]
    InnomakerUsb2Can,
    #[value(name = "rusoku-toucan")]
    RusokuToucan,
    #[value(name = "sys-tec-usb2can")]
    SysTecUsb2Can,
    #[value(name = "loopback")]
    Loopback,
}
