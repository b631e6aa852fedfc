//! Caller-side site storage
//!
//! The transport addresses local storage only through [`FieldSlot`], by the
//! slot index a [`crate::SiteMap`] hands out. Precision conversion between the
//! working type and the single-precision wire type happens here.

use crate::error::{Result, TransferError};
use ksprop_formats::{ColorVector, WireReal, WorkingReal};

/// Local storage for one color of a distributed field
pub trait FieldSlot {
    /// Number of local sites
    fn sites(&self) -> usize;

    /// Site `slot` converted to wire precision
    fn wire_site(&self, slot: usize) -> Result<ColorVector<WireReal>>;

    /// Store a wire-precision record into site `slot`
    fn store_wire_site(&mut self, slot: usize, v: &ColorVector<WireReal>) -> Result<()>;
}

fn out_of_range(slot: usize, sites: usize) -> TransferError {
    TransferError::InvalidOperation(format!(
        "slot {slot} is outside a local field of {sites} sites"
    ))
}

impl<R: WorkingReal> FieldSlot for [ColorVector<R>] {
    fn sites(&self) -> usize {
        self.len()
    }

    fn wire_site(&self, slot: usize) -> Result<ColorVector<WireReal>> {
        self.get(slot)
            .map(ColorVector::to_wire)
            .ok_or_else(|| out_of_range(slot, self.len()))
    }

    fn store_wire_site(&mut self, slot: usize, v: &ColorVector<WireReal>) -> Result<()> {
        let sites = self.len();
        let site = self.get_mut(slot).ok_or_else(|| out_of_range(slot, sites))?;
        *site = ColorVector::from_wire(v);
        Ok(())
    }
}

impl<R: WorkingReal> FieldSlot for Vec<ColorVector<R>> {
    fn sites(&self) -> usize {
        self.as_slice().sites()
    }

    fn wire_site(&self, slot: usize) -> Result<ColorVector<WireReal>> {
        self.as_slice().wire_site(slot)
    }

    fn store_wire_site(&mut self, slot: usize, v: &ColorVector<WireReal>) -> Result<()> {
        self.as_mut_slice().store_wire_site(slot, v)
    }
}

/// Local storage for `len` sites, zero-initialized
pub fn zeroed_field<R: WorkingReal>(len: usize) -> Vec<ColorVector<R>> {
    vec![ColorVector::default(); len]
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use ksprop_formats::Complex;

    #[test]
    fn test_double_precision_round_trip_rounds_to_wire() {
        let mut field: Vec<ColorVector<f64>> = zeroed_field(2);
        let v = ColorVector::new([
            Complex::new(0.1_f32, -0.2),
            Complex::new(1.5, 2.25),
            Complex::new(0.0, -1.0e-3),
        ]);
        field.store_wire_site(1, &v).unwrap();

        assert_eq!(field[1].c[0].re, f64::from(0.1_f32));
        assert_eq!(field.wire_site(1).unwrap(), v);
        assert_eq!(field.wire_site(0).unwrap(), ColorVector::default());
    }

    #[test]
    fn test_slot_out_of_range() {
        let mut field: Vec<ColorVector<f32>> = zeroed_field(1);
        assert!(field.wire_site(1).is_err());
        assert!(
            field
                .store_wire_site(5, &ColorVector::default())
                .is_err()
        );
    }
}
