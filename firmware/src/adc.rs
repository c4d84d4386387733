//! ADC setup for the force sensor input.
//!
//! The sensor sits on ADC7 (pin F7). The converter runs free-running against
//! the internal 2.56V reference and raises `ADC` after every conversion.

use avr_device::atmega32u4::ADC;

/// ADC7, single-ended, 1x gain.
const CHANNEL: u8 = 0x07;

// ADMUX
const REFS_INTERNAL_2V56: u8 = (1 << 7) | (1 << 6);

// ADCSRA
const ADEN: u8 = 1 << 7;
const ADSC: u8 = 1 << 6;
const ADATE: u8 = 1 << 5;
const ADIE: u8 = 1 << 3;
/// 16MHz / 64 = 250kHz ADC clock.
const PRESCALER_64: u8 = (1 << 2) | (1 << 1);

// ADCSRB
const ADHSM: u8 = 1 << 7;

/// Power up the converter and select the sensor channel. Nothing is sampled
/// until [`start_free_running`] is called.
pub fn init(adc: &ADC) {
    adc.adcsra.write(|w| unsafe { w.bits(ADEN | PRESCALER_64) });
    // High speed mode; auto trigger source stays at free running (ADTS = 0)
    adc.adcsrb.write(|w| unsafe { w.bits(ADHSM) });
    adc.admux
        .write(|w| unsafe { w.bits(REFS_INTERNAL_2V56 | (CHANNEL & 0x1F)) });
}

/// Kick off the first conversion; the hardware retriggers itself after that.
pub fn start_free_running(adc: &ADC) {
    adc.adcsra
        .write(|w| unsafe { w.bits(ADSC | ADEN | ADATE | ADIE | PRESCALER_64) });
}

/// Latest conversion result (right-adjusted, 10 bits).
#[inline(always)]
pub fn read(adc: &ADC) -> u16 {
    adc.adc.read().bits()
}
