//! Interface addressing.
//!
//! Every packet targets one `(interface type, unit)` pair packed into the
//! 16-bit `ifTypeUnit` header field as `(type << 8) | unit`.
//!
//! Types 0x00-0x7F are reserved for built-in interfaces.
//! Types 0x80-0xFF are available for custom interfaces.

use std::fmt;

/// Controller housekeeping (identity, ping, system configuration).
pub const SYSTEM: u8 = 0x00;

/// Serial ports.
pub const UART: u8 = 0x01;

/// SPI-like register bus.
pub const SPI: u8 = 0x02;

/// General purpose I/O banks.
pub const GPIO: u8 = 0x04;

/// First interface type available for custom interfaces.
pub const CUSTOM_TYPE_START: u8 = 0x80;

/// Returns a human-readable name for an interface type.
pub fn interface_type_name(if_type: u8) -> &'static str {
    match if_type {
        SYSTEM => "SYSTEM",
        UART => "UART",
        SPI => "SPI",
        GPIO => "GPIO",
        0x03 | 0x05..=0x7F => "RESERVED",
        _ => "CUSTOM",
    }
}

/// Returns true if the interface type is in the reserved range.
pub fn is_reserved(if_type: u8) -> bool {
    if_type < CUSTOM_TYPE_START
}

/// A packed interface address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    /// Interface type.
    pub if_type: u8,
    /// Hardware unit within the interface type.
    pub unit: u8,
}

impl Address {
    pub const fn new(if_type: u8, unit: u8) -> Self {
        Self { if_type, unit }
    }

    /// Unpack an `ifTypeUnit` header value.
    pub const fn from_raw(raw: u16) -> Self {
        Self {
            if_type: (raw >> 8) as u8,
            unit: (raw & 0xFF) as u8,
        }
    }

    /// Pack into an `ifTypeUnit` header value.
    pub const fn to_raw(self) -> u16 {
        ((self.if_type as u16) << 8) | self.unit as u16
    }
}

impl From<u16> for Address {
    fn from(raw: u16) -> Self {
        Self::from_raw(raw)
    }
}

impl From<Address> for u16 {
    fn from(address: Address) -> Self {
        address.to_raw()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[0x{:02X}]/{}",
            interface_type_name(self.if_type),
            self.if_type,
            self.unit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_type_into_high_byte() {
        assert_eq!(Address::new(GPIO, 0).to_raw(), 0x0400);
        assert_eq!(Address::new(UART, 3).to_raw(), 0x0103);
        assert_eq!(Address::from_raw(0x82_07), Address::new(0x82, 7));
    }

    #[test]
    fn names() {
        assert_eq!(interface_type_name(GPIO), "GPIO");
        assert_eq!(interface_type_name(0x03), "RESERVED");
        assert_eq!(interface_type_name(0x90), "CUSTOM");
        assert!(is_reserved(SPI));
        assert!(!is_reserved(CUSTOM_TYPE_START));
    }

    #[test]
    fn display_includes_unit() {
        assert_eq!(Address::new(GPIO, 1).to_string(), "GPIO[0x04]/1");
    }
}
