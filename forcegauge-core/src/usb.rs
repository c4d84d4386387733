//! The USB keyboard capability the core depends on.
//!
//! The firmware implements this on top of the ATmega32U4 USB controller; tests
//! and the host tool implement it with recorders.

use crate::report::{KeyboardReport, LedState};
use crate::HOST_SETTLE_MS;

/// Why a report could not be handed to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsbError {
    /// The host has not selected a configuration yet.
    NotConfigured,
    /// The endpoint did not free up before the driver gave up waiting.
    Timeout,
}

pub trait UsbKeyboard {
    /// Bring up the USB controller and attach to the bus.
    fn init(&mut self);

    /// Whether the host has configured the device.
    ///
    /// Polling drivers may service pending bus events while answering,
    /// which is why this takes `&mut self`.
    fn is_configured(&mut self) -> bool;

    /// Queue one boot keyboard report on the interrupt IN endpoint.
    fn send_report(&mut self, report: &KeyboardReport) -> Result<(), UsbError>;

    /// LED state last written by the host.
    fn led_state(&self) -> LedState;
}

/// Initialise USB and block until a host configures the device.
///
/// There is no timeout: without a host there is nothing useful to do, so a
/// board powered from a charger will sit here forever. Once configured, waits
/// `HOST_SETTLE_MS` more so the host OS can finish loading its driver.
pub fn wait_for_host<U, D>(usb: &mut U, mut delay_ms: D)
where
    U: UsbKeyboard,
    D: FnMut(u16),
{
    usb.init();
    while !usb.is_configured() {}
    delay_ms(HOST_SETTLE_MS);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowHost {
        initialised: bool,
        polls_until_ready: u32,
        polls: u32,
    }

    impl UsbKeyboard for SlowHost {
        fn init(&mut self) {
            self.initialised = true;
        }

        fn is_configured(&mut self) -> bool {
            assert!(self.initialised, "polled before init");
            self.polls += 1;
            self.polls > self.polls_until_ready
        }

        fn send_report(&mut self, _report: &KeyboardReport) -> Result<(), UsbError> {
            Err(UsbError::NotConfigured)
        }

        fn led_state(&self) -> LedState {
            LedState(0)
        }
    }

    #[test]
    fn test_waits_for_configuration_then_settles() {
        let mut usb = SlowHost {
            initialised: false,
            polls_until_ready: 25,
            polls: 0,
        };
        let mut waited = 0u32;

        wait_for_host(&mut usb, |ms| waited += u32::from(ms));

        assert_eq!(usb.polls, 26);
        assert_eq!(waited, u32::from(HOST_SETTLE_MS));
    }
}
