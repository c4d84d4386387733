//! Boot keyboard USB device on the ATmega32U4 controller.
//!
//! This is the platform side of [`forcegauge_core::UsbKeyboard`]: enumeration,
//! the HID class requests a boot keyboard must answer, and the 8-byte interrupt
//! IN endpoint. The controller is polled from the main loop rather than driven
//! by the USB general interrupt.
//!
//! A second HID interface carries debug text in 32-byte vendor reports, the
//! format `hid_listen` reads. The sample stream goes out on it.

use avr_device::atmega32u4::{PLL, USB_DEVICE};
use forcegauge_core::{KeyboardReport, LedState, SampleSink, UsbError, UsbKeyboard};

const EP0_SIZE: u8 = 64; // Control endpoint size
const EP1_SIZE: u8 = 8; // Interrupt IN endpoint size (keyboard reports)
const DEBUG_EP: u8 = 2;
const DEBUG_EP_SIZE: u8 = 32; // Interrupt IN endpoint size (debug text)

const KEYBOARD_INTERFACE: u8 = 0;
const DEBUG_INTERFACE: u8 = 1;

/// Spins allowed while waiting for the IN endpoint before a report is given up.
const SEND_TIMEOUT: u16 = 0xFFFF;

/// Keyboard report descriptor; identical layout to the boot protocol report.
static HID_REPORT_DESCRIPTOR: [u8; 64] = [
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x06, // Usage (Keyboard)
    0xA1, 0x01, // Collection (Application)
    0x05, 0x07, //   Usage Page (Key Codes)
    0x19, 0xE0, //   Usage Minimum (224) - LCtrl
    0x29, 0xE7, //   Usage Maximum (231) - RGui
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x08, //   Report Count (8)
    0x81, 0x02, //   Input (Data, Variable, Absolute) - modifier byte
    0x95, 0x01, //   Report Count (1)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x01, //   Input (Constant) - reserved byte
    0x95, 0x05, //   Report Count (5)
    0x75, 0x01, //   Report Size (1)
    0x05, 0x08, //   Usage Page (LEDs)
    0x19, 0x01, //   Usage Minimum (1) - Num Lock
    0x29, 0x05, //   Usage Maximum (5) - Kana
    0x91, 0x02, //   Output (Data, Variable, Absolute) - LED report
    0x95, 0x01, //   Report Count (1)
    0x75, 0x03, //   Report Size (3)
    0x91, 0x01, //   Output (Constant) - LED padding
    0x95, 0x06, //   Report Count (6)
    0x75, 0x08, //   Report Size (8)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, // Logical Maximum (255)
    0x05, 0x07, //   Usage Page (Key Codes)
    0x19, 0x00, //   Usage Minimum (0)
    0x29, 0xFF, //   Usage Maximum (255)
    0x81, 0x00, //   Input (Data, Array) - key codes
    0xC0, // End Collection
];

/// Vendor-defined input report the debug listener looks for (usage page 0xFF31).
static DEBUG_REPORT_DESCRIPTOR: [u8; 21] = [
    0x06, 0x31, 0xFF, // Usage Page (Vendor 0xFF31)
    0x09, 0x74, // Usage (0x74)
    0xA1, 0x53, // Collection (Vendor 0x53)
    0x75, 0x08, //   Report Size (8)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, // Logical Maximum (255)
    0x95, DEBUG_EP_SIZE, // Report Count (32)
    0x09, 0x75, //   Usage (0x75)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0xC0, // End Collection
];

static DEVICE_DESCRIPTOR: [u8; 18] = [
    18,   // bLength
    1,    // bDescriptorType (Device)
    0x00, 0x02, // bcdUSB (2.0)
    0,    // bDeviceClass (defined at interface level)
    0,    // bDeviceSubClass
    0,    // bDeviceProtocol
    EP0_SIZE, // bMaxPacketSize0
    0xC0, 0x16, // idVendor (0x16C0)
    0x7E, 0x04, // idProduct (0x047E)
    0x01, 0x00, // bcdDevice (1.0)
    1,    // iManufacturer
    2,    // iProduct
    0,    // iSerialNumber
    1,    // bNumConfigurations
];

/// Offsets of the two HID class descriptors inside [`CONFIG_DESCRIPTOR`].
const KEYBOARD_HID_OFFSET: usize = 18;
const DEBUG_HID_OFFSET: usize = 43;

static CONFIG_DESCRIPTOR: [u8; 59] = [
    9, 2, 59, 0, // Configuration, wTotalLength = 59
    2,    // bNumInterfaces
    1,    // bConfigurationValue
    0,    // iConfiguration
    0x80, // bmAttributes (bus powered)
    50,   // bMaxPower (100mA)
    9, 4, // Interface
    KEYBOARD_INTERFACE, // bInterfaceNumber
    0,    // bAlternateSetting
    1,    // bNumEndpoints
    3,    // bInterfaceClass (HID)
    1,    // bInterfaceSubClass (Boot)
    1,    // bInterfaceProtocol (Keyboard)
    0,    // iInterface
    9, 0x21, // HID
    0x11, 0x01, // bcdHID (1.11)
    0,    // bCountryCode
    1,    // bNumDescriptors
    0x22, // bDescriptorType (Report)
    HID_REPORT_DESCRIPTOR.len() as u8, 0,
    7, 5, // Endpoint
    0x81, // bEndpointAddress (EP1 IN)
    0x03, // bmAttributes (Interrupt)
    EP1_SIZE, 0,
    10,   // bInterval (10ms polling)
    9, 4, // Interface
    DEBUG_INTERFACE, // bInterfaceNumber
    0,    // bAlternateSetting
    1,    // bNumEndpoints
    3,    // bInterfaceClass (HID)
    0,    // bInterfaceSubClass (None)
    0,    // bInterfaceProtocol (None)
    0,    // iInterface
    9, 0x21, // HID
    0x11, 0x01, // bcdHID (1.11)
    0,    // bCountryCode
    1,    // bNumDescriptors
    0x22, // bDescriptorType (Report)
    DEBUG_REPORT_DESCRIPTOR.len() as u8, 0,
    7, 5, // Endpoint
    0x80 | DEBUG_EP, // bEndpointAddress (EP2 IN)
    0x03, // bmAttributes (Interrupt)
    DEBUG_EP_SIZE, 0,
    1,    // bInterval (1ms polling)
];

static STRING_LANGUAGE: [u8; 4] = [4, 3, 0x09, 0x04]; // English (US)

static STRING_MANUFACTURER: [u8; 14] = [
    14, 3, b'T', 0, b'e', 0, b'e', 0, b'n', 0, b's', 0, b'y', 0,
];

static STRING_PRODUCT: [u8; 24] = [
    24, 3, b'F', 0, b'o', 0, b'r', 0, b'c', 0, b'e', 0, b' ', 0, b'G', 0, b'a', 0, b'u', 0,
    b'g', 0, b'e', 0,
];

// Standard requests
const GET_STATUS: u8 = 0x00;
const SET_ADDRESS: u8 = 0x05;
const GET_DESCRIPTOR: u8 = 0x06;
const GET_CONFIGURATION: u8 = 0x08;
const SET_CONFIGURATION: u8 = 0x09;

// HID class requests
const HID_GET_REPORT: u8 = 0x01;
const HID_GET_IDLE: u8 = 0x02;
const HID_GET_PROTOCOL: u8 = 0x03;
const HID_SET_REPORT: u8 = 0x09;
const HID_SET_IDLE: u8 = 0x0A;
const HID_SET_PROTOCOL: u8 = 0x0B;

pub struct BootKeyboard<'a> {
    usb: &'a USB_DEVICE,
    pll: &'a PLL,
    configured: bool,
    leds: LedState,
    /// Idle rate set by the host, in 4ms units. Stored and reported back only.
    idle_rate: u8,
    /// 0 = boot protocol, 1 = report protocol. Both use the same 8-byte layout.
    protocol: u8,
    last_report: KeyboardReport,
    /// Bytes sit in the debug endpoint bank that have not been released yet.
    debug_pending: bool,
}

impl<'a> BootKeyboard<'a> {
    pub fn new(usb: &'a USB_DEVICE, pll: &'a PLL) -> Self {
        Self {
            usb,
            pll,
            configured: false,
            leds: LedState(0),
            idle_rate: 125,
            protocol: 1,
            last_report: KeyboardReport::empty(),
            debug_pending: false,
        }
    }

    /// Handle bus reset and any pending control request. Call every main loop pass.
    ///
    /// EP0 is only serviced here, so control transfers wait for the rest of
    /// the pass: printing a sample and the idle delay both hold them up.
    /// A pass must stay well under the host's control transfer timeout.
    pub fn poll(&mut self) {
        let usb = self.usb;

        if usb.udint.read().eorsti().bit_is_set() {
            usb.udint.modify(|_, w| w.eorsti().clear_bit());
            self.configure_ep0();
            self.configured = false;
            self.debug_pending = false;
        }

        self.select_endpoint(0);
        if usb.ueintx.read().rxstpi().bit_is_set() {
            self.handle_setup();
        }
    }

    fn configure_ep0(&self) {
        let usb = self.usb;

        self.select_endpoint(0);
        usb.ueconx.write(|w| w.epen().set_bit());
        usb.uecfg0x.write(|w| w.eptype().bits(0b00));
        usb.uecfg1x.write(|w| w.epsize().bits(0b011).alloc().set_bit());
    }

    fn configure_ep1(&self) {
        let usb = self.usb;

        self.select_endpoint(1);
        usb.ueconx.write(|w| w.epen().set_bit());
        usb.uecfg0x
            .write(|w| w.eptype().bits(0b11).epdir().set_bit());
        usb.uecfg1x.write(|w| w.epsize().bits(0b000).alloc().set_bit());
    }

    fn configure_debug_ep(&self) {
        let usb = self.usb;

        self.select_endpoint(DEBUG_EP);
        usb.ueconx.write(|w| w.epen().set_bit());
        usb.uecfg0x
            .write(|w| w.eptype().bits(0b11).epdir().set_bit());
        usb.uecfg1x.write(|w| w.epsize().bits(0b010).alloc().set_bit());
    }

    fn select_endpoint(&self, ep: u8) {
        self.usb.uenum.write(|w| w.bits(ep & 0x07));
    }

    fn handle_setup(&mut self) {
        let usb = self.usb;

        let bm_request_type = usb.uedatx.read().bits();
        let b_request = usb.uedatx.read().bits();
        let w_value_l = usb.uedatx.read().bits();
        let w_value_h = usb.uedatx.read().bits();
        let w_index_l = usb.uedatx.read().bits();
        let _w_index_h = usb.uedatx.read().bits();
        let w_length_l = usb.uedatx.read().bits();
        let w_length_h = usb.uedatx.read().bits();

        usb.ueintx.modify(|_, w| w.rxstpi().clear_bit());

        let w_length = (w_length_h as u16) << 8 | w_length_l as u16;

        match (bm_request_type, b_request) {
            (0x80, GET_DESCRIPTOR) => match (w_value_h, w_value_l) {
                (1, _) => self.send_descriptor(&DEVICE_DESCRIPTOR, w_length),
                (2, _) => self.send_descriptor(&CONFIG_DESCRIPTOR, w_length),
                (3, 0) => self.send_descriptor(&STRING_LANGUAGE, w_length),
                (3, 1) => self.send_descriptor(&STRING_MANUFACTURER, w_length),
                (3, 2) => self.send_descriptor(&STRING_PRODUCT, w_length),
                _ => self.stall(),
            },

            (0x81, GET_DESCRIPTOR) => match (w_value_h, w_index_l) {
                (0x21, KEYBOARD_INTERFACE) => self.send_descriptor(
                    &CONFIG_DESCRIPTOR[KEYBOARD_HID_OFFSET..KEYBOARD_HID_OFFSET + 9],
                    w_length,
                ),
                (0x21, DEBUG_INTERFACE) => self.send_descriptor(
                    &CONFIG_DESCRIPTOR[DEBUG_HID_OFFSET..DEBUG_HID_OFFSET + 9],
                    w_length,
                ),
                (0x22, KEYBOARD_INTERFACE) => {
                    self.send_descriptor(&HID_REPORT_DESCRIPTOR, w_length)
                }
                (0x22, DEBUG_INTERFACE) => {
                    self.send_descriptor(&DEBUG_REPORT_DESCRIPTOR, w_length)
                }
                _ => self.stall(),
            },

            (0x00, SET_ADDRESS) => {
                // Status stage goes out on the old address
                self.send_zlp();
                while usb.ueintx.read().txini().bit_is_clear() {}
                usb.udaddr
                    .write(|w| w.uadd().bits(w_value_l & 0x7F).adden().set_bit());
            }

            (0x00, SET_CONFIGURATION) => {
                self.send_zlp();
                self.configure_ep1();
                self.configure_debug_ep();
                self.configured = w_value_l != 0;
                self.debug_pending = false;
            }

            (0x80, GET_CONFIGURATION) => self.send_in(&[self.configured as u8]),

            (0x80 | 0x81 | 0x82, GET_STATUS) => self.send_in(&[0, 0]),

            (0xA1, HID_GET_REPORT) if w_index_l == DEBUG_INTERFACE => {
                self.send_in(&[0; DEBUG_EP_SIZE as usize]);
            }

            (0xA1, HID_GET_REPORT) => {
                let report = self.last_report.to_bytes();
                self.send_in(&report);
            }

            (0xA1, HID_GET_IDLE) => self.send_in(&[self.idle_rate]),

            (0xA1, HID_GET_PROTOCOL) => self.send_in(&[self.protocol]),

            // The debug interface has no output report
            (0x21, HID_SET_REPORT) if w_index_l == DEBUG_INTERFACE => self.stall(),

            (0x21, HID_SET_REPORT) => {
                // One byte of LED state in the data stage
                while usb.ueintx.read().rxouti().bit_is_clear() {}
                self.leds = LedState(usb.uedatx.read().bits());
                usb.ueintx.modify(|_, w| w.rxouti().clear_bit());
                self.send_zlp();
            }

            (0x21, HID_SET_IDLE) => {
                if w_index_l == KEYBOARD_INTERFACE {
                    self.idle_rate = w_value_h;
                }
                self.send_zlp();
            }

            (0x21, HID_SET_PROTOCOL) => {
                if w_index_l == KEYBOARD_INTERFACE {
                    self.protocol = w_value_l;
                }
                self.send_zlp();
            }

            _ => self.stall(),
        }
    }

    /// Short IN data stage followed by the host's zero-length OUT status.
    fn send_in(&self, data: &[u8]) {
        let usb = self.usb;
        while usb.ueintx.read().txini().bit_is_clear() {}
        for &byte in data {
            usb.uedatx.write(|w| w.bits(byte));
        }
        usb.ueintx.modify(|_, w| w.txini().clear_bit());
    }

    fn send_zlp(&self) {
        self.usb.ueintx.modify(|_, w| w.txini().clear_bit());
    }

    fn send_descriptor(&self, desc: &[u8], max_length: u16) {
        let usb = self.usb;
        let len = core::cmp::min(desc.len(), max_length as usize);
        let mut sent = 0;

        while sent < len {
            while usb.ueintx.read().txini().bit_is_clear() {}

            let chunk_end = core::cmp::min(sent + EP0_SIZE as usize, len);
            for &byte in &desc[sent..chunk_end] {
                usb.uedatx.write(|w| w.bits(byte));
            }

            usb.ueintx.modify(|_, w| w.txini().clear_bit());
            sent = chunk_end;
        }

        while usb.ueintx.read().rxouti().bit_is_clear() {}
        usb.ueintx.modify(|_, w| w.rxouti().clear_bit());
    }

    fn stall(&self) {
        self.usb.ueconx.modify(|_, w| w.stallrq().set_bit());
    }

    /// Queue one byte of debug text. Dropped when unconfigured or when the host
    /// stops reading.
    fn debug_write(&mut self, byte: u8) {
        if !self.configured {
            return;
        }

        let usb = self.usb;
        self.select_endpoint(DEBUG_EP);

        let mut timeout = SEND_TIMEOUT;
        while usb.ueintx.read().rwal().bit_is_clear() {
            timeout -= 1;
            if timeout == 0 {
                return;
            }
        }

        usb.uedatx.write(|w| w.bits(byte));
        self.debug_pending = true;

        // Bank full: hand the packet to the host
        if usb.ueintx.read().rwal().bit_is_clear() {
            usb.ueintx
                .modify(|_, w| w.fifocon().clear_bit().txini().clear_bit());
            self.debug_pending = false;
        }
    }

    /// Zero-pad and release a partly filled debug packet.
    pub fn flush_debug(&mut self) {
        if !self.debug_pending || !self.configured {
            return;
        }

        let usb = self.usb;
        self.select_endpoint(DEBUG_EP);
        while usb.ueintx.read().rwal().bit_is_set() {
            usb.uedatx.write(|w| w.bits(0));
        }
        usb.ueintx
            .modify(|_, w| w.fifocon().clear_bit().txini().clear_bit());
        self.debug_pending = false;
    }
}

/// Sample text goes out on the debug interface.
impl SampleSink for BootKeyboard<'_> {
    fn write_str(&mut self, s: &str) {
        for &byte in s.as_bytes() {
            self.debug_write(byte);
        }
    }
}

impl UsbKeyboard for BootKeyboard<'_> {
    fn init(&mut self) {
        let usb = self.usb;

        usb.uhwcon.write(|w| w.uvrege().set_bit());
        usb.usbcon
            .write(|w| w.usbe().set_bit().otgpade().set_bit());

        // 16MHz crystal -> 96MHz PLL -> 48MHz USB clock
        self.pll
            .pllcsr
            .write(|w| w.pindiv().set_bit().plle().set_bit());
        while self.pll.pllcsr.read().plock().bit_is_clear() {}

        usb.usbcon.modify(|_, w| w.frzclk().clear_bit());
        usb.udcon.modify(|_, w| w.detach().clear_bit());

        self.configured = false;
    }

    fn is_configured(&mut self) -> bool {
        self.poll();
        self.configured
    }

    fn send_report(&mut self, report: &KeyboardReport) -> Result<(), UsbError> {
        if !self.configured {
            return Err(UsbError::NotConfigured);
        }

        let usb = self.usb;
        self.select_endpoint(1);

        // RWAL set means the bank has room for the report
        let mut timeout = SEND_TIMEOUT;
        while usb.ueintx.read().rwal().bit_is_clear() {
            timeout -= 1;
            if timeout == 0 {
                return Err(UsbError::Timeout);
            }
        }

        for byte in report.to_bytes() {
            usb.uedatx.write(|w| w.bits(byte));
        }
        usb.ueintx
            .modify(|_, w| w.fifocon().clear_bit().txini().clear_bit());

        self.last_report = *report;
        Ok(())
    }

    fn led_state(&self) -> LedState {
        self.leds
    }
}
