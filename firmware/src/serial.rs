//! USART1 link: receive side of the force gauge's RS-232 port.

use avr_device::atmega32u4::USART1;

const F_CPU: u32 = 16_000_000;

/// Line speed of the force gauge's RS-232 port.
pub const BAUD: u32 = 2400;

// UCSR1B: RX complete interrupt, receiver. The transmitter stays off.
const RXCIE1: u8 = 1 << 7;
const RXEN1: u8 = 1 << 4;
// UCSR1C: asynchronous, 8 data bits, no parity, 1 stop bit
const FRAME_8N1: u8 = (1 << 2) | (1 << 1);

/// Baud rate register value for normal (16x) asynchronous mode, rounded.
pub const fn ubrr(f_cpu: u32, baud: u32) -> u16 {
    ((f_cpu + 8 * baud) / (16 * baud) - 1) as u16
}

pub fn init(usart: &USART1) {
    usart
        .ubrr1
        .write(|w| unsafe { w.bits(ubrr(F_CPU, BAUD)) });
    usart
        .ucsr1b
        .write(|w| unsafe { w.bits(RXCIE1 | RXEN1) });
    usart.ucsr1c.write(|w| unsafe { w.bits(FRAME_8N1) });
}

/// Body of the RX complete interrupt.
///
/// Reading UDR1 acknowledges the byte. Decoding the gauge's protocol is not
/// implemented yet, so the value is discarded. Interrupts stay enabled: the
/// ADC interrupt must keep running while this executes.
pub fn receive_stub(usart: &USART1) {
    let _value = usart.udr1.read().bits();
}
