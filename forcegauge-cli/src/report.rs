//! Offline view of what the firmware puts on the wire for a given key state.

use anyhow::{bail, Result};

use forcegauge_core::{
    KeyState, KeyboardReport, LedState, ReportSender, UsbError, UsbKeyboard, MAX_KEYS,
};

/// Stands in for the USB controller and keeps every report it is given.
#[derive(Default)]
pub struct CaptureKeyboard {
    pub reports: Vec<[u8; KeyboardReport::LEN]>,
}

impl UsbKeyboard for CaptureKeyboard {
    fn init(&mut self) {}

    fn is_configured(&mut self) -> bool {
        true
    }

    fn send_report(&mut self, report: &KeyboardReport) -> Result<(), UsbError> {
        self.reports.push(report.to_bytes());
        Ok(())
    }

    fn led_state(&self) -> LedState {
        LedState::default()
    }
}

/// Build a key state from the arguments, send it once and return the wire bytes.
pub fn assemble(modifiers: u8, keys: &[u8]) -> Result<[u8; KeyboardReport::LEN]> {
    if keys.len() > MAX_KEYS {
        bail!("a boot keyboard report holds at most {MAX_KEYS} keys, got {}", keys.len());
    }

    let mut state = KeyState::new();
    state.press_modifier(modifiers);
    for &key in keys {
        state.press(key);
    }

    let mut usb = CaptureKeyboard::default();
    ReportSender::new().send(&mut state, &mut usb);
    debug_assert!(state.is_empty());

    match usb.reports.pop() {
        Some(bytes) => Ok(bytes),
        None => bail!("sender produced no report"),
    }
}

/// Parse a byte given as decimal or `0x`-prefixed hex.
pub fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("{s:?} is not a byte value: {e}"))
}

pub fn format_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
