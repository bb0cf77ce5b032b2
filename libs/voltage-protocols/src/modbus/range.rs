//! Address-contiguous element ranges
//!
//! A range starts at a declared address and covers its elements back to
//! back. Overlaps and gaps are rejected when the range is built; skipped
//! addresses must be filled with dummy elements.

use std::fmt;

use super::element::{ElementSpace, ModbusElement};
use super::error::{ModbusError, Result};

pub struct RegisterRange {
    start: u16,
    length: u16,
    space: ElementSpace,
    elements: Vec<Box<dyn ModbusElement>>,
}

impl RegisterRange {
    pub fn new(start: u16, elements: Vec<Box<dyn ModbusElement>>) -> Result<Self> {
        let first = elements.first().ok_or(ModbusError::EmptyRange(start))?;
        if first.address() != start {
            return Err(ModbusError::StartMismatch {
                start,
                actual: first.address(),
            });
        }
        let space = first.space();

        let mut next = u32::from(start);
        for element in &elements {
            let address = u32::from(element.address());
            if address < next {
                return Err(ModbusError::Overlap {
                    address: element.address(),
                    previous_end: next - 1,
                });
            }
            if address > next {
                return Err(ModbusError::Gap {
                    address: element.address(),
                    expected: next,
                });
            }
            next += u32::from(element.length());
        }

        let length = next - u32::from(start);
        if next > u32::from(u16::MAX) + 1 {
            return Err(ModbusError::AddressOverflow { start });
        }

        Ok(Self {
            start,
            length: length as u16,
            space,
            elements,
        })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    /// Number of registers or coils covered
    pub fn length(&self) -> u16 {
        self.length
    }

    /// Address space of the first element
    pub fn space(&self) -> ElementSpace {
        self.space
    }

    pub fn elements(&self) -> &[Box<dyn ModbusElement>] {
        &self.elements
    }

    /// Offset of `element` within the range
    pub fn offset_of(&self, element: &dyn ModbusElement) -> usize {
        (element.address() - self.start) as usize
    }
}

impl fmt::Debug for RegisterRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for RegisterRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}-{}]",
            self.start,
            u32::from(self.start) + u32::from(self.length).saturating_sub(1)
        )
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::modbus::element::{
        DummyElement, SignedWordElement, UnsignedDoublewordElement, UnsignedWordElement,
    };

    #[test]
    fn test_contiguous_range() {
        let range = RegisterRange::new(
            100,
            vec![
                UnsignedWordElement::new(100).boxed(),
                UnsignedDoublewordElement::new(101).boxed(),
                DummyElement::registers(103, 4).boxed(),
                SignedWordElement::new(107).boxed(),
            ],
        )
        .unwrap();
        assert_eq!(range.length(), 8);
        assert_eq!(range.to_string(), "[100-107]");
        assert_eq!(range.offset_of(range.elements()[3].as_ref()), 7);
    }

    #[test]
    fn test_start_mismatch() {
        let result = RegisterRange::new(100, vec![UnsignedWordElement::new(101).boxed()]);
        assert_eq!(
            result.unwrap_err(),
            ModbusError::StartMismatch {
                start: 100,
                actual: 101
            }
        );
    }

    #[test]
    fn test_gap_requires_dummy() {
        let result = RegisterRange::new(
            0,
            vec![
                UnsignedWordElement::new(0).boxed(),
                UnsignedWordElement::new(2).boxed(),
            ],
        );
        assert_eq!(
            result.unwrap_err(),
            ModbusError::Gap {
                address: 2,
                expected: 1
            }
        );
    }

    #[test]
    fn test_overlap() {
        let result = RegisterRange::new(
            0,
            vec![
                UnsignedDoublewordElement::new(0).boxed(),
                UnsignedWordElement::new(1).boxed(),
            ],
        );
        assert_eq!(
            result.unwrap_err(),
            ModbusError::Overlap {
                address: 1,
                previous_end: 1
            }
        );
    }

    #[test]
    fn test_empty_and_overflowing_ranges() {
        assert_eq!(
            RegisterRange::new(5, Vec::new()).unwrap_err(),
            ModbusError::EmptyRange(5)
        );
        assert!(RegisterRange::new(u16::MAX, vec![UnsignedWordElement::new(u16::MAX).boxed()]).is_ok());
        assert_eq!(
            RegisterRange::new(u16::MAX, vec![UnsignedDoublewordElement::new(u16::MAX).boxed()])
                .unwrap_err(),
            ModbusError::AddressOverflow { start: u16::MAX }
        );
    }
}
