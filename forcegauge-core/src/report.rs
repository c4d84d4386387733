//! HID boot keyboard report state and sender.
//!
//! A key-scan component (not part of this crate) fills a [`KeyState`] with the
//! modifiers and keys it saw. [`ReportSender`] turns that into the 8-byte
//! boot report, hands it to the USB layer and empties the state again.

use crate::usb::UsbKeyboard;
use crate::MAX_KEYS;

/// Modifier byte bits (bit 0 = LCtrl, bit 7 = RGui).
pub mod modifier {
    pub const LEFT_CTRL: u8 = 1 << 0;
    pub const LEFT_SHIFT: u8 = 1 << 1;
    pub const LEFT_ALT: u8 = 1 << 2;
    pub const LEFT_GUI: u8 = 1 << 3;
    pub const RIGHT_CTRL: u8 = 1 << 4;
    pub const RIGHT_SHIFT: u8 = 1 << 5;
    pub const RIGHT_ALT: u8 = 1 << 6;
    pub const RIGHT_GUI: u8 = 1 << 7;
}

/// Standard USB HID keyboard report (8 bytes).
/// Byte 0: modifier keys bitmask
/// Byte 1: reserved (0x00)
/// Bytes 2-7: up to 6 simultaneous keycodes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyboardReport {
    pub modifiers: u8,
    pub reserved: u8,
    pub keys: [u8; MAX_KEYS],
}

impl KeyboardReport {
    pub const LEN: usize = 2 + MAX_KEYS;

    pub const fn empty() -> Self {
        Self {
            modifiers: 0,
            reserved: 0,
            keys: [0; MAX_KEYS],
        }
    }

    /// Wire layout sent on the interrupt IN endpoint.
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.modifiers;
        out[1] = self.reserved;
        out[2..].copy_from_slice(&self.keys);
        out
    }
}

impl Default for KeyboardReport {
    fn default() -> Self {
        Self::empty()
    }
}

/// Host keyboard LED state, as delivered in the HID output report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LedState(pub u8);

impl LedState {
    pub const NUM_LOCK: u8 = 1 << 0;
    pub const CAPS_LOCK: u8 = 1 << 1;
    pub const SCROLL_LOCK: u8 = 1 << 2;
    pub const COMPOSE: u8 = 1 << 3;
    pub const KANA: u8 = 1 << 4;

    pub fn num_lock(self) -> bool {
        self.0 & Self::NUM_LOCK != 0
    }

    pub fn caps_lock(self) -> bool {
        self.0 & Self::CAPS_LOCK != 0
    }

    pub fn scroll_lock(self) -> bool {
        self.0 & Self::SCROLL_LOCK != 0
    }

    pub fn compose(self) -> bool {
        self.0 & Self::COMPOSE != 0
    }

    pub fn kana(self) -> bool {
        self.0 & Self::KANA != 0
    }
}

/// Keys collected since the last report was sent.
///
/// Only the first `sent_count` entries of `keys` are meaningful; anything
/// after that may be left over from an earlier, larger report until the
/// sender clears it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyState {
    pub modifiers: u8,
    pub keys: [u8; MAX_KEYS],
    sent_count: u8,
}

impl KeyState {
    pub const fn new() -> Self {
        Self {
            modifiers: 0,
            keys: [0; MAX_KEYS],
            sent_count: 0,
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent_count as usize
    }

    /// Set the number of valid entries in `keys`, clamped to six.
    pub fn set_sent_count(&mut self, count: usize) {
        self.sent_count = count.min(MAX_KEYS) as u8;
    }

    /// Append a key code. Returns `false` once six keys are already held.
    pub fn press(&mut self, keycode: u8) -> bool {
        let idx = self.sent_count as usize;
        if idx >= MAX_KEYS {
            return false;
        }
        self.keys[idx] = keycode;
        self.sent_count += 1;
        true
    }

    pub fn press_modifier(&mut self, bits: u8) {
        self.modifiers |= bits;
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers == 0 && self.sent_count == 0
    }

    /// Zero every key slot past `sent_count` and build the report.
    fn assemble(&mut self) -> KeyboardReport {
        for key in &mut self.keys[self.sent_count as usize..] {
            *key = 0;
        }
        KeyboardReport {
            modifiers: self.modifiers,
            reserved: 0,
            keys: self.keys,
        }
    }

    fn reset(&mut self) {
        self.modifiers = 0;
        self.sent_count = 0;
    }
}

/// Drains a [`KeyState`] into HID reports.
pub struct ReportSender {
    last_sent: KeyboardReport,
}

impl ReportSender {
    pub const fn new() -> Self {
        Self {
            last_sent: KeyboardReport::empty(),
        }
    }

    /// The last report the USB layer accepted.
    pub fn last_sent(&self) -> &KeyboardReport {
        &self.last_sent
    }

    /// Send the current state unconditionally, then clear it.
    ///
    /// The state is reset whether or not the USB layer accepted the report.
    pub fn send<U: UsbKeyboard>(&mut self, state: &mut KeyState, usb: &mut U) {
        let report = state.assemble();
        if usb.send_report(&report).is_ok() {
            self.last_sent = report;
        }
        state.reset();
    }

    /// Like [`send`](Self::send), but skips the transfer when the report is
    /// identical to the last one the USB layer accepted. The state is cleared
    /// either way; a rejected report is retried on the next flush.
    ///
    /// Returns whether a report went out.
    pub fn flush<U: UsbKeyboard>(&mut self, state: &mut KeyState, usb: &mut U) -> bool {
        let report = state.assemble();
        let delivered = report != self.last_sent && usb.send_report(&report).is_ok();
        if delivered {
            self.last_sent = report;
        }
        state.reset();
        delivered
    }
}

impl Default for ReportSender {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::UsbError;
    use std::vec::Vec;

    /// USB capability that records every report it is asked to send.
    #[derive(Default)]
    struct Recorder {
        sent: Vec<[u8; 8]>,
        fail: bool,
    }

    impl UsbKeyboard for Recorder {
        fn init(&mut self) {}

        fn is_configured(&mut self) -> bool {
            true
        }

        fn send_report(&mut self, report: &KeyboardReport) -> Result<(), UsbError> {
            self.sent.push(report.to_bytes());
            if self.fail {
                Err(UsbError::NotConfigured)
            } else {
                Ok(())
            }
        }

        fn led_state(&self) -> LedState {
            LedState::default()
        }
    }

    #[test]
    fn test_shift_a_report_bytes() {
        let mut state = KeyState::new();
        state.modifiers = modifier::LEFT_SHIFT;
        state.keys = [0x04, 0, 0, 0, 0, 0];
        state.set_sent_count(1);

        let mut usb = Recorder::default();
        ReportSender::new().send(&mut state, &mut usb);

        assert_eq!(usb.sent, [[0x02u8, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00]]);
        assert_eq!(state.modifiers, 0);
        assert_eq!(state.sent_count(), 0);
    }

    #[test]
    fn test_stale_keys_are_zeroed() {
        let mut state = KeyState::new();
        state.keys = [0x04, 0x05, 0x06, 0x07, 0x08, 0x09];
        state.set_sent_count(2);

        let mut usb = Recorder::default();
        ReportSender::new().send(&mut state, &mut usb);

        assert_eq!(usb.sent[0][2..], [0x04u8, 0x05, 0, 0, 0, 0]);
        assert_eq!(state.keys, [0x04, 0x05, 0, 0, 0, 0]);
    }

    #[test]
    fn test_zero_padding_for_every_count() {
        for count in 0..=MAX_KEYS {
            let mut state = KeyState::new();
            state.keys = [0xAA; MAX_KEYS];
            state.set_sent_count(count);

            let mut usb = Recorder::default();
            ReportSender::new().send(&mut state, &mut usb);

            let keys = &usb.sent[0][2..];
            assert!(keys[..count].iter().all(|&k| k == 0xAA), "count {count}");
            assert!(keys[count..].iter().all(|&k| k == 0), "count {count}");
        }
    }

    #[test]
    fn test_empty_send_still_resets() {
        let mut state = KeyState::new();
        let mut usb = Recorder::default();
        ReportSender::new().send(&mut state, &mut usb);

        assert_eq!(usb.sent, [[0u8; 8]]);
        assert!(state.is_empty());
    }

    #[test]
    fn test_failed_transfer_still_resets() {
        let mut state = KeyState::new();
        state.press_modifier(modifier::RIGHT_ALT);
        state.press(0x1E);

        let mut usb = Recorder {
            fail: true,
            ..Default::default()
        };
        let mut sender = ReportSender::new();
        sender.send(&mut state, &mut usb);

        assert_eq!(usb.sent.len(), 1);
        assert!(state.is_empty());
        assert_eq!(*sender.last_sent(), KeyboardReport::empty());
    }

    #[test]
    fn test_press_stops_at_six_keys() {
        let mut state = KeyState::new();
        for code in 0x04..0x0A {
            assert!(state.press(code));
        }
        assert!(!state.press(0x0A));
        assert_eq!(state.sent_count(), MAX_KEYS);
        assert_eq!(state.keys, [0x04, 0x05, 0x06, 0x07, 0x08, 0x09]);
    }

    #[test]
    fn test_sent_count_is_clamped() {
        let mut state = KeyState::new();
        state.set_sent_count(40);
        assert_eq!(state.sent_count(), MAX_KEYS);
    }

    #[test]
    fn test_flush_skips_repeated_report() {
        let mut sender = ReportSender::new();
        let mut usb = Recorder::default();
        let mut state = KeyState::new();

        // Empty matches the initial report: nothing goes out.
        assert!(!sender.flush(&mut state, &mut usb));

        state.press(0x04);
        assert!(sender.flush(&mut state, &mut usb));
        assert!(state.is_empty());

        // Key still held on the next scan.
        state.press(0x04);
        assert!(!sender.flush(&mut state, &mut usb));
        assert!(state.is_empty());

        // Released: the empty report is sent once.
        assert!(sender.flush(&mut state, &mut usb));
        assert!(!sender.flush(&mut state, &mut usb));

        assert_eq!(usb.sent, [[0, 0, 0x04, 0, 0, 0, 0, 0], [0u8; 8]]);
        assert_eq!(*sender.last_sent(), KeyboardReport::empty());
    }

    #[test]
    fn test_flush_retries_after_failed_transfer() {
        let mut sender = ReportSender::new();
        let mut usb = Recorder {
            fail: true,
            ..Default::default()
        };
        let mut state = KeyState::new();

        state.press(0x04);
        assert!(!sender.flush(&mut state, &mut usb));
        assert_eq!(*sender.last_sent(), KeyboardReport::empty());

        // Endpoint frees up while the key is still held.
        usb.fail = false;
        for _ in 0..5 {
            state.press(0x04);
            sender.flush(&mut state, &mut usb);
        }

        // The rejected attempt, then one retry while held.
        let held = [0u8, 0, 0x04, 0, 0, 0, 0, 0];
        assert_eq!(usb.sent, [held, held]);
        assert_eq!(sender.last_sent().to_bytes(), held);

        // Release still goes out once.
        assert!(sender.flush(&mut state, &mut usb));
        assert_eq!(usb.sent.last(), Some(&[0u8; 8]));
    }

    #[test]
    fn test_led_bits() {
        let leds = LedState(LedState::CAPS_LOCK | LedState::KANA);
        assert!(leds.caps_lock());
        assert!(leds.kana());
        assert!(!leds.num_lock());
        assert!(!leds.scroll_lock());
        assert!(!leds.compose());
    }
}
