//! Force gauge firmware for ATmega32U4 (Teensy 2.0).
//!
//! - The ADC samples the force sensor free-running; its interrupt pushes every
//!   conversion into a lock-free ring
//! - The main loop drains the ring and prints each sample as `<value>,` on the
//!   USB debug interface
//! - A USB boot keyboard interface carries key reports to the host
//! - USART1 listens to the gauge's RS-232 output

#![no_std]
#![no_main]
#![feature(abi_avr_interrupt)]
#![feature(asm_experimental_arch)]

mod adc;
mod serial;
mod usb;

use core::cell::RefCell;

use avr_device::atmega32u4::Peripherals;
use avr_device::interrupt::{self, Mutex};
use forcegauge_core::{
    wait_for_host, AnalogSampler, KeyState, ReportSender, SampleConsumer, SampleRing,
    UsbKeyboard, ADC_BUFSIZE, POLL_INTERVAL_MS,
};

use usb::BootKeyboard;

/// Teensy on-board LED (PD6), mirrors the host's Caps Lock.
const LED_PD6: u8 = 1 << 6;

static mut SAMPLE_RING: SampleRing<ADC_BUFSIZE> = SampleRing::new();

/// Producer half of the ring, handed to the ADC interrupt once at startup.
static SAMPLER: Mutex<RefCell<Option<AnalogSampler<'static, ADC_BUFSIZE>>>> =
    Mutex::new(RefCell::new(None));

/// Panic handler: on AVR we just loop forever.
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[no_mangle]
pub extern "C" fn main() -> ! {
    let dp = unsafe { Peripherals::steal() };

    // Run at the full 16MHz
    dp.CPU.clkpr.write(|w| w.clkpce().set_bit());
    dp.CPU.clkpr.write(|w| unsafe { w.bits(0) });

    init_pins(&dp);
    serial::init(&dp.USART1);

    // SAFETY: the only reference ever taken to SAMPLE_RING, before interrupts are enabled.
    let ring = unsafe { &mut *core::ptr::addr_of_mut!(SAMPLE_RING) };
    let (producer, consumer) = ring.split();
    interrupt::free(|cs| {
        SAMPLER
            .borrow(cs)
            .replace(Some(AnalogSampler::new(producer)));
    });

    adc::init(&dp.ADC);
    adc::start_free_running(&dp.ADC);
    unsafe { interrupt::enable() };

    // Blocks until a host configures us; samples taken meanwhile are dropped
    // once the ring fills.
    let mut usb = BootKeyboard::new(&dp.USB_DEVICE, &dp.PLL);
    wait_for_host(&mut usb, delay_ms);

    let mut consumer = SampleConsumer::new(consumer);
    let mut keys = KeyState::new();
    let mut sender = ReportSender::new();

    loop {
        usb.poll();

        let printed = consumer.poll(&mut usb);

        // No key-scan input on this board, so `keys` stays empty
        sender.flush(&mut keys, &mut usb);

        if usb.led_state().caps_lock() {
            dp.PORTD
                .portd
                .modify(|r, w| unsafe { w.bits(r.bits() | LED_PD6) });
        } else {
            dp.PORTD
                .portd
                .modify(|r, w| unsafe { w.bits(r.bits() & !LED_PD6) });
        }

        if printed.is_none() {
            usb.flush_debug();
            delay_ms(POLL_INTERVAL_MS);
        }
    }
}

/// All pins inputs without pull-ups, except the LED.
fn init_pins(dp: &Peripherals) {
    dp.PORTB.ddrb.write(|w| unsafe { w.bits(0) });
    dp.PORTC.ddrc.write(|w| unsafe { w.bits(0) });
    dp.PORTD.ddrd.write(|w| unsafe { w.bits(LED_PD6) });
    dp.PORTE.ddre.write(|w| unsafe { w.bits(0) });
    dp.PORTF.ddrf.write(|w| unsafe { w.bits(0) });

    dp.PORTB.portb.write(|w| unsafe { w.bits(0) });
    dp.PORTC.portc.write(|w| unsafe { w.bits(0) });
    dp.PORTD.portd.write(|w| unsafe { w.bits(0) });
    dp.PORTE.porte.write(|w| unsafe { w.bits(0) });
    dp.PORTF.portf.write(|w| unsafe { w.bits(0) });
}

#[avr_device::interrupt(atmega32u4)]
fn ADC() {
    let dp = unsafe { Peripherals::steal() };
    let raw = adc::read(&dp.ADC);

    interrupt::free(|cs| {
        if let Some(sampler) = SAMPLER.borrow(cs).borrow_mut().as_mut() {
            sampler.on_conversion(raw);
        }
    });
}

#[avr_device::interrupt(atmega32u4)]
fn USART1_RX() {
    let dp = unsafe { Peripherals::steal() };
    serial::receive_stub(&dp.USART1);
}

/// Busy-wait delay in milliseconds (approximate, at 16MHz).
fn delay_ms(ms: u16) {
    for _ in 0..ms {
        // ~1ms at 16MHz: 16000 cycles / 4 cycles per loop iteration
        for _ in 0..4000u16 {
            unsafe { core::arch::asm!("nop") };
        }
    }
}
