//! Control-bus capability probe.
//!
//! The probe runs once at startup and answers a single question: which
//! peripheral addresses acknowledge on the control bus? The resulting
//! [`PeripheralAddressSet`] drives drivetrain selection and nothing else.
//!
//! The probe never fails: a bus that cannot be opened, a scan that is not
//! supported on this build, or a bus with nothing attached all yield an
//! empty set, which is a meaningful result ("no recognized hardware").
//!
//! Bus locators follow the same convention as the camera device:
//! - `/dev/i2c-1` scans a real I2C bus (requires the `hardware-i2c` feature)
//! - `stub://0x40,0x60` pretends the listed addresses acknowledged

use std::collections::BTreeSet;

/// First and last addresses a bus scan will touch. Addresses below 0x03 are
/// reserved, addresses above 0x77 collide with 10-bit addressing.
#[cfg(feature = "hardware-i2c")]
const SCAN_FIRST_ADDR: u16 = 0x03;
const SCAN_LAST_ADDR: u16 = 0x77;

const STUB_PREFIX: &str = "stub://";

/// The set of bus addresses that acknowledged during the startup probe.
///
/// Addresses are stored as canonical lowercase hex strings ("0x48") so that
/// configuration files, log lines and membership checks all agree on one
/// spelling. Built once, read-only afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeripheralAddressSet {
    addresses: BTreeSet<String>,
}

impl PeripheralAddressSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from anything address-like; invalid entries are dropped.
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addresses = addresses
            .into_iter()
            .filter_map(|a| normalize_address(a.as_ref()))
            .collect();
        Self { addresses }
    }

    pub(crate) fn insert(&mut self, addr: u16) {
        self.addresses.insert(format!("{addr:#04x}"));
    }

    /// Membership check; the query is normalized first, so "0X48" and bare
    /// "48" both match a probed 0x48.
    pub fn contains(&self, addr: &str) -> bool {
        normalize_address(addr)
            .map(|a| self.addresses.contains(&a))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.addresses.iter().map(String::as_str)
    }
}

impl std::fmt::Display for PeripheralAddressSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for addr in &self.addresses {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{addr}")?;
            first = false;
        }
        Ok(())
    }
}

/// Parse an address string into its numeric value.
///
/// Accepts "0x48", "0X48" and bare "48"; bare strings are parsed as hex too,
/// since every datasheet writes bus addresses that way.
pub(crate) fn parse_address(raw: &str) -> Option<u16> {
    let trimmed = raw.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let value = u16::from_str_radix(hex, 16).ok()?;
    if value > SCAN_LAST_ADDR {
        return None;
    }
    Some(value)
}

/// Canonical "0xNN" spelling of an address string.
fn normalize_address(raw: &str) -> Option<String> {
    parse_address(raw).map(|value| format!("{value:#04x}"))
}

/// Scan the control bus once and return the set of responding addresses.
///
/// This is the only bus-wide operation in the kernel; it has no side effects
/// beyond the scan itself and never returns an error. Failures to open or
/// scan the bus are logged and collapse to the empty set.
pub fn probe_addresses(bus: &str) -> PeripheralAddressSet {
    if let Some(listing) = bus.strip_prefix(STUB_PREFIX) {
        return probe_stub(listing);
    }
    probe_bus(bus)
}

/// Synthetic bus: the locator itself lists the acknowledging addresses.
fn probe_stub(listing: &str) -> PeripheralAddressSet {
    let mut set = PeripheralAddressSet::new();
    for entry in listing.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match parse_address(entry) {
            Some(addr) => set.insert(addr),
            None => log::warn!("probe: ignoring malformed stub address '{entry}'"),
        }
    }
    log::info!("probe: synthetic bus reports [{set}]");
    set
}

#[cfg(feature = "hardware-i2c")]
fn probe_bus(bus: &str) -> PeripheralAddressSet {
    use i2cdev::core::I2CDevice;
    use i2cdev::linux::LinuxI2CDevice;

    let mut set = PeripheralAddressSet::new();
    for addr in SCAN_FIRST_ADDR..=SCAN_LAST_ADDR {
        let acknowledged = LinuxI2CDevice::new(bus, addr)
            .and_then(|mut dev| dev.smbus_read_byte())
            .is_ok();
        if acknowledged {
            set.insert(addr);
        }
    }
    log::info!("probe: {bus} reports [{set}]");
    set
}

#[cfg(not(feature = "hardware-i2c"))]
fn probe_bus(bus: &str) -> PeripheralAddressSet {
    log::warn!("probe: built without hardware-i2c, cannot scan {bus}; reporting no peripherals");
    PeripheralAddressSet::new()
}
