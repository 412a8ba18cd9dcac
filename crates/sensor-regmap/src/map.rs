//! Register descriptors and the shadow register file

use crate::error::RegisterError;
use std::collections::BTreeMap;
use tracing::debug;

/// Values a register accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegalValues {
    /// Inclusive range
    Range { min: u8, max: u8 },
    /// Explicit set of encodings
    OneOf(&'static [u8]),
}

impl LegalValues {
    /// Check whether `value` is legal
    pub fn allows(&self, value: u8) -> bool {
        match self {
            LegalValues::Range { min, max } => (*min..=*max).contains(&value),
            LegalValues::OneOf(values) => values.contains(&value),
        }
    }
}

/// Description of one writable control register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDescriptor {
    /// Page-qualified address
    pub address: u16,
    /// Datasheet mnemonic
    pub name: &'static str,
    /// Legal values
    pub legal: LegalValues,
}

impl RegisterDescriptor {
    pub const fn new(address: u16, name: &'static str, legal: LegalValues) -> Self {
        Self {
            address,
            name,
            legal,
        }
    }
}

/// A single register write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterWrite {
    pub address: u16,
    pub value: u8,
}

impl RegisterWrite {
    pub const fn new(address: u16, value: u8) -> Self {
        Self { address, value }
    }
}

/// Ordered, immutable register map for one sensor type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterMap {
    registers: Vec<RegisterDescriptor>,
}

impl RegisterMap {
    /// Build a map, rejecting duplicate addresses
    pub fn new(registers: Vec<RegisterDescriptor>) -> Result<Self, RegisterError> {
        for (i, reg) in registers.iter().enumerate() {
            if registers[..i].iter().any(|r| r.address == reg.address) {
                return Err(RegisterError::DuplicateRegister(reg.address));
            }
        }
        debug!("Register map built with {} registers", registers.len());
        Ok(Self { registers })
    }

    /// Build a map from a static table already known to be free of duplicates
    pub(crate) fn from_table(table: &[RegisterDescriptor]) -> Self {
        Self {
            registers: table.to_vec(),
        }
    }

    /// Copy of this map with one register removed
    pub fn without(&self, address: u16) -> Self {
        Self {
            registers: self
                .registers
                .iter()
                .filter(|r| r.address != address)
                .copied()
                .collect(),
        }
    }

    /// Look up a register descriptor
    pub fn descriptor(&self, address: u16) -> Option<&RegisterDescriptor> {
        self.registers.iter().find(|r| r.address == address)
    }

    /// Check that `value` may be written to `address`
    pub fn check(&self, address: u16, value: u8) -> Result<(), RegisterError> {
        let desc = self
            .descriptor(address)
            .ok_or(RegisterError::InvalidRegister(address))?;
        if desc.legal.allows(value) {
            Ok(())
        } else {
            Err(RegisterError::ValueOutOfRange { address, value })
        }
    }

    /// Registers in map order
    pub fn iter(&self) -> impl Iterator<Item = &RegisterDescriptor> {
        self.registers.iter()
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

/// Register map plus the last value written to each register
///
/// The hardware registers are treated as write-only, so the shadow values are
/// the only record of what the sensor was told.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    map: RegisterMap,
    shadow: BTreeMap<u16, u8>,
}

impl RegisterFile {
    /// Create an empty register file over `map`
    pub fn new(map: RegisterMap) -> Self {
        Self {
            map,
            shadow: BTreeMap::new(),
        }
    }

    pub fn map(&self) -> &RegisterMap {
        &self.map
    }

    /// Check and record a write
    pub fn write(&mut self, address: u16, value: u8) -> Result<(), RegisterError> {
        self.map.check(address, value)?;
        self.record(address, value);
        Ok(())
    }

    /// Record a write that already passed `RegisterMap::check`
    pub fn record(&mut self, address: u16, value: u8) {
        self.shadow.insert(address, value);
    }

    /// Last known value of a register
    pub fn read(&self, address: u16) -> Option<u8> {
        self.shadow.get(&address).copied()
    }

    /// Apply writes in order, stopping at the first rejected one
    pub fn apply(&mut self, writes: &[RegisterWrite]) -> Result<(), RegisterError> {
        for w in writes {
            self.write(w.address, w.value)?;
        }
        Ok(())
    }

    /// Snapshot of every shadow value
    pub fn snapshot(&self) -> BTreeMap<u16, u8> {
        self.shadow.clone()
    }

    /// Forget every shadow value
    pub fn clear(&mut self) {
        self.shadow.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODES: &[u8] = &[0x00, 0x0F];

    fn small_map() -> RegisterMap {
        RegisterMap::new(vec![
            RegisterDescriptor::new(0x0017, "ANALOG_MODE1", LegalValues::Range { min: 0x14, max: 0x17 }),
            RegisterDescriptor::new(0x00F2, "PAD_IO", LegalValues::OneOf(MODES)),
        ])
        .unwrap()
    }

    #[test]
    fn test_check_unknown_address() {
        let map = small_map();
        assert_eq!(map.check(0x1234, 0), Err(RegisterError::InvalidRegister(0x1234)));
    }

    #[test]
    fn test_check_range_and_set() {
        let map = small_map();
        assert!(map.check(0x0017, 0x14).is_ok());
        assert!(map.check(0x0017, 0x17).is_ok());
        assert_eq!(
            map.check(0x0017, 0x18),
            Err(RegisterError::ValueOutOfRange { address: 0x0017, value: 0x18 })
        );
        assert!(map.check(0x00F2, 0x0F).is_ok());
        assert!(map.check(0x00F2, 0x01).is_err());
    }

    #[test]
    fn test_duplicate_rejected() {
        let result = RegisterMap::new(vec![
            RegisterDescriptor::new(0x0017, "A", LegalValues::Range { min: 0, max: 1 }),
            RegisterDescriptor::new(0x0017, "B", LegalValues::Range { min: 0, max: 1 }),
        ]);
        assert_eq!(result, Err(RegisterError::DuplicateRegister(0x0017)));
    }

    #[test]
    fn test_without_removes_register() {
        let map = small_map().without(0x00F2);
        assert_eq!(map.len(), 1);
        assert!(map.descriptor(0x00F2).is_none());
    }

    #[test]
    fn test_register_file_tracks_last_value() {
        let mut file = RegisterFile::new(small_map());
        assert_eq!(file.read(0x0017), None);

        file.write(0x0017, 0x15).unwrap();
        file.write(0x0017, 0x16).unwrap();
        assert_eq!(file.read(0x0017), Some(0x16));

        // Rejected writes leave the shadow untouched
        assert!(file.write(0x0017, 0xFF).is_err());
        assert_eq!(file.read(0x0017), Some(0x16));
    }

    #[test]
    fn test_apply_stops_at_first_failure() {
        let mut file = RegisterFile::new(small_map());
        let writes = [
            RegisterWrite::new(0x0017, 0x15),
            RegisterWrite::new(0x0042, 0x00),
            RegisterWrite::new(0x00F2, 0x0F),
        ];
        assert_eq!(file.apply(&writes), Err(RegisterError::InvalidRegister(0x0042)));
        assert_eq!(file.read(0x0017), Some(0x15));
        assert_eq!(file.read(0x00F2), None);
    }
}
