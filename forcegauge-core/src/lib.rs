//! Shared sampling pipeline and HID report logic for the force gauge.
//!
//! This crate is `no_std` so the AVR firmware and the host tool run the same
//! code. Nothing in here touches hardware registers: the firmware feeds raw
//! conversions in and plugs its USB driver and UART in behind traits.

#![cfg_attr(not(test), no_std)]

pub mod consumer;
pub mod report;
pub mod ring;
pub mod sampler;
pub mod usb;

pub use consumer::{format_sample, SampleConsumer, SampleSink};
pub use report::{modifier, KeyState, KeyboardReport, LedState, ReportSender};
pub use ring::{Consumer, Producer, SampleRing};
pub use sampler::AnalogSampler;
pub use usb::{wait_for_host, UsbError, UsbKeyboard};

/// Number of slots in the ADC sample ring. One slot always stays empty,
/// so at most `ADC_BUFSIZE - 1` samples are held at once.
pub const ADC_BUFSIZE: usize = 32;

/// Maximum number of simultaneous non-modifier keys in a boot keyboard report.
pub const MAX_KEYS: usize = 6;

/// Main loop back-off when the sample ring is empty.
pub const POLL_INTERVAL_MS: u16 = 10;

/// Extra wait after the host configures the device, so the OS has time to
/// load its HID driver before the first report.
pub const HOST_SETTLE_MS: u16 = 1000;

/// Separator written after every sample on the output stream.
pub const SAMPLE_SEPARATOR: &str = ",";
