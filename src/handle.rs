//! Owned driver handles.
//!
//! [`Owned`] pairs a raw handle with the driver that issued it and frees it
//! exactly once when dropped. Constructions that need several handles build
//! each one as an `Owned` first, so whatever was already acquired is
//! released on every failure path.

use std::fmt;
use std::sync::Arc;

use uhd_driver::{Driver, Kind, Out, Raw, Status};

use crate::error::{Error, Result, check, with_scratch};

pub struct Owned<K: Kind> {
    driver: Arc<dyn Driver>,
    raw: Raw<K>,
}

impl<K: Kind> Owned<K> {
    /// Create a handle with one of the driver's `*_make` calls.
    pub(crate) fn make(
        driver: &Arc<dyn Driver>,
        f: impl FnOnce(&dyn Driver, Out<'_, K>) -> Status,
    ) -> Result<Self> {
        let mut out = None;
        let status = f(driver.as_ref(), &mut out);
        // Own whatever came back, even on failure, so it gets freed.
        let owned = out.map(|raw| Owned {
            driver: Arc::clone(driver),
            raw,
        });
        check(driver.as_ref(), None, status)?;
        let owned = owned.ok_or(Error::UnexpectedValue {
            what: "null handle",
            raw: 0,
        })?;
        tracing::debug!("created {:?}", owned.raw);
        Ok(owned)
    }

    pub fn raw(&self) -> Raw<K> {
        self.raw
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Refuse to pair this handle with one issued by another driver: raw
    /// values are only meaningful to the driver that issued them.
    pub(crate) fn same_driver<J: Kind>(&self, other: &Owned<J>) -> Result<()> {
        if Arc::ptr_eq(&self.driver, &other.driver) {
            Ok(())
        } else {
            Err(Error::invalid_argument(format!(
                "{:?} belongs to another driver than {:?}",
                other.raw, self.raw
            )))
        }
    }

    /// Make a call scoped to this handle.
    pub(crate) fn call(&self, f: impl FnOnce(&dyn Driver, Raw<K>) -> Status) -> Result<()> {
        let status = f(self.driver.as_ref(), self.raw);
        check(self.driver.as_ref(), Some(self.raw.erase()), status)
    }

    /// Make a call that returns a value through an out-parameter.
    pub(crate) fn read<T: Default>(
        &self,
        f: impl FnOnce(&dyn Driver, Raw<K>, &mut T) -> Status,
    ) -> Result<T> {
        let mut value = T::default();
        self.call(|d, h| f(d, h, &mut value))?;
        Ok(value)
    }

    /// Make a call that writes a string into a buffer.
    pub(crate) fn read_string(
        &self,
        f: impl FnOnce(&dyn Driver, Raw<K>, &mut [u8]) -> Status,
    ) -> Result<String> {
        let (status, text) = with_scratch(|buf| f(self.driver.as_ref(), self.raw, buf));
        check(self.driver.as_ref(), Some(self.raw.erase()), status)?;
        Ok(text)
    }
}

impl<K: Kind> Drop for Owned<K> {
    fn drop(&mut self) {
        let status = self.driver.free(self.raw.erase());
        if status.is_ok() {
            tracing::debug!("released {:?}", self.raw);
        } else {
            tracing::warn!("failed to release {:?}: {status}", self.raw);
        }
    }
}

impl<K: Kind> fmt::Debug for Owned<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.raw).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uhd_driver::handle::{MetaRange, Usrp};
    use uhd_driver::sim::SimDriver;

    fn sim() -> (Arc<SimDriver>, Arc<dyn Driver>) {
        let sim = Arc::new(SimDriver::new());
        let driver: Arc<dyn Driver> = sim.clone();
        (sim, driver)
    }

    #[test]
    fn test_drop_frees_once() {
        let (sim, driver) = sim();
        let range = Owned::<MetaRange>::make(&driver, |d, out| d.meta_range_make(out)).unwrap();
        assert_eq!(sim.live_handles(), 1);
        drop(range);
        assert_eq!(sim.live_handles(), 0);
    }

    #[test]
    fn test_failed_make_leaves_nothing() {
        let (sim, driver) = sim();
        let err = Owned::<Usrp>::make(&driver, |d, out| d.usrp_make(out, "serial=nope"))
            .unwrap_err();
        assert_eq!(err.status(), Some(Status::Key));
        assert!(err.message().unwrap().contains("No devices found"));
        assert_eq!(sim.live_handles(), 0);
    }

    #[test]
    fn test_read_string_is_scoped() {
        let (_sim, driver) = sim();
        let usrp = Owned::<Usrp>::make(&driver, |d, out| d.usrp_make(out, "")).unwrap();
        let name = usrp
            .read_string(|d, h, buf| d.usrp_mboard_name(h, 0, buf))
            .unwrap();
        assert_eq!(name, "B210");
        let err = usrp
            .read_string(|d, h, buf| d.usrp_mboard_name(h, 4, buf))
            .unwrap_err();
        assert_eq!(err.status(), Some(Status::Index));
        assert!(err.message().unwrap().contains("mboard"));
    }
}
