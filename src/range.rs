//! Range lists held by the driver.
//!
//! Devices report rates, frequencies, gains and bandwidths as range lists.
//! [`RangeList`] owns such a list on the driver side; [`MetaRange`] is the
//! plain value read back out of it.

use std::sync::Arc;

use uhd_driver::handle::{self, Usrp};
use uhd_driver::{Driver, MetaRange, Range, Raw, Status};

use crate::error::Result;
use crate::handle::Owned;

/// A driver-side list of ranges.
#[derive(Debug)]
pub struct RangeList {
    handle: Owned<handle::MetaRange>,
}

impl RangeList {
    pub(crate) fn new(driver: &Arc<dyn Driver>) -> Result<Self> {
        Ok(Self {
            handle: Owned::make(driver, |d, out| d.meta_range_make(out))?,
        })
    }

    pub fn push(&mut self, range: Range) -> Result<()> {
        self.handle.call(|d, h| d.meta_range_push_back(h, &range))
    }

    pub fn get(&self, index: usize) -> Result<Range> {
        self.handle.read(|d, h, out| d.meta_range_at(h, index, out))
    }

    pub fn len(&self) -> Result<usize> {
        self.handle.read(|d, h, out| d.meta_range_size(h, out))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn start(&self) -> Result<f64> {
        self.handle.read(|d, h, out| d.meta_range_start(h, out))
    }

    pub fn stop(&self) -> Result<f64> {
        self.handle.read(|d, h, out| d.meta_range_stop(h, out))
    }

    pub fn step(&self) -> Result<f64> {
        self.handle.read(|d, h, out| d.meta_range_step(h, out))
    }

    /// Clip `value` to the list, as computed by the driver.
    pub fn clip(&self, value: f64, clip_step: bool) -> Result<f64> {
        self.handle.read(|d, h, out| d.meta_range_clip(h, value, clip_step, out))
    }

    pub fn pp_string(&self) -> Result<String> {
        self.handle.read_string(|d, h, buf| d.meta_range_to_pp_string(h, buf))
    }

    /// Read every range back into a value.
    pub fn to_meta_range(&self) -> Result<MetaRange> {
        let len = self.len()?;
        let ranges = (0..len).map(|i| self.get(i)).collect::<Result<Vec<_>>>()?;
        Ok(MetaRange::new(ranges)?)
    }
}

/// Fill a fresh range list with a call made on `usrp`.
pub(crate) fn read_meta_range(
    usrp: &Owned<Usrp>,
    f: impl FnOnce(&dyn Driver, Raw<Usrp>, Raw<handle::MetaRange>) -> Status,
) -> Result<MetaRange> {
    let list = RangeList::new(usrp.driver())?;
    usrp.call(|d, h| f(d, h, list.handle.raw()))?;
    list.to_meta_range()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use approx::assert_relative_eq;
    use uhd_driver::sim::SimDriver;

    fn driver() -> Arc<dyn Driver> {
        Arc::new(SimDriver::new())
    }

    #[test]
    fn test_list_matches_value_model() {
        let driver = driver();
        let mut list = RangeList::new(&driver).unwrap();
        list.push(Range::new(0.0, 10.0, 1.0)).unwrap();
        list.push(Range::new(20.0, 30.0, 2.0)).unwrap();
        assert_eq!(list.len().unwrap(), 2);
        assert_relative_eq!(list.start().unwrap(), 0.0);
        assert_relative_eq!(list.stop().unwrap(), 30.0);
        assert_relative_eq!(list.step().unwrap(), 1.0);
        let value = list.to_meta_range().unwrap();
        for v in [-5.0, 4.3, 14.0, 16.0, 23.1, 99.0] {
            assert_relative_eq!(list.clip(v, true).unwrap(), value.clip(v, true));
            assert_relative_eq!(list.clip(v, false).unwrap(), value.clip(v, false));
        }
    }

    #[test]
    fn test_empty_list() {
        let driver = driver();
        let list = RangeList::new(&driver).unwrap();
        assert!(list.is_empty().unwrap());
        assert_eq!(list.to_meta_range().unwrap_err(), Error::EmptyRange);
        let err = list.get(0).unwrap_err();
        assert!(err.status().is_some());
    }

    #[test]
    fn test_pp_string_is_forwarded() {
        let driver = driver();
        let mut list = RangeList::new(&driver).unwrap();
        list.push(Range::point(5.0)).unwrap();
        assert!(!list.pp_string().unwrap().is_empty());
    }
}
