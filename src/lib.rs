#![doc = include_str!("../readme.md")]

use std::sync::Arc;

use uhd_driver::Driver;
use uhd_driver::sim::SimDriver;

pub mod config;
pub mod error;
pub mod handle;
pub mod metadata;
pub mod range;
pub mod rx;
pub mod sample;
pub mod sensor;
pub mod tx;
pub mod usrp;

pub use config::{ChainConfig, Gain, Tuned, UsrpConfig};
pub use error::{Error, Result};
pub use metadata::{AsyncEvent, AsyncMetadata, RxMetadata, TxMetadata, TxMetadataArgs};
pub use range::RangeList;
pub use rx::RxStreamer;
pub use sample::{Sample, SampleFormat};
pub use sensor::{SensorReading, SensorValue, StringList, SubdevPair, SubdevSpec};
pub use tx::{AsyncEvents, TxSender, TxStreamer};
pub use usrp::{Channel, Mboard, Usrp};

pub use uhd_driver;
pub use uhd_driver::{
    ALL_CHANS, ALL_GAINS, ALL_LOS, ALL_MBOARDS, AsyncEventCode, ChainInfo, DeviceArgs, Direction,
    MetaRange, Range, RxErrorCode, SensorType, Status, StreamArgs, StreamCmd, StreamMode,
    TimeSpec, TunePolicy, TuneRequest, TuneResult, UserPayload,
};

use crate::error::{check, no_nul, with_scratch};

/**
 * Entry point: a driver backend plus the library-level calls
 */
#[derive(Clone)]
pub struct Uhd {
    driver: Arc<dyn Driver>,
}

impl std::fmt::Debug for Uhd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uhd").finish_non_exhaustive()
    }
}

impl Uhd {
    /// Use any driver backend
    pub fn with_driver(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    /// Use a fresh simulated driver with one B210-like device
    pub fn sim() -> Self {
        Self::with_driver(Arc::new(SimDriver::new()))
    }

    /// Use the system libuhd (requires "native" feature)
    #[cfg(feature = "native")]
    pub fn native() -> Self {
        Self::with_driver(Arc::new(uhd_driver::native::NativeDriver::new()))
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Driver version string
    pub fn version(&self) -> Result<String> {
        let (status, version) = with_scratch(|buf| self.driver.version_string(buf));
        check(self.driver.as_ref(), None, status)?;
        Ok(version)
    }

    /// ABI compatibility string of the driver
    pub fn abi(&self) -> Result<String> {
        let (status, abi) = with_scratch(|buf| self.driver.abi_string(buf));
        check(self.driver.as_ref(), None, status)?;
        Ok(abi)
    }

    /// Raise the scheduling priority of the calling thread.
    ///
    /// `priority` is in `[-1, 1]`; `realtime` requests a real-time class.
    pub fn set_thread_priority(&self, priority: f32, realtime: bool) -> Result<()> {
        let status = self.driver.set_thread_priority(priority, realtime);
        check(self.driver.as_ref(), None, status)
    }

    /// Discover devices matching `args`, one device-argument string each.
    pub fn find(&self, args: &str) -> Result<Vec<String>> {
        no_nul(args)?;
        let list = StringList::new(&self.driver)?;
        let status = self.driver.usrp_find(args, list.raw());
        check(self.driver.as_ref(), None, status)?;
        let found = list.to_vec()?;
        tracing::debug!("found {} device(s) for '{args}'", found.len());
        Ok(found)
    }

    /// Open the first device matching `args`.
    pub fn open(&self, args: &str) -> Result<Usrp> {
        Usrp::open(&self.driver, args)
    }

    pub fn rx_metadata(&self) -> Result<RxMetadata> {
        RxMetadata::new(&self.driver)
    }

    pub fn tx_metadata(&self, args: TxMetadataArgs) -> Result<TxMetadata> {
        TxMetadata::new(&self.driver, args)
    }

    pub fn async_metadata(&self) -> Result<AsyncMetadata> {
        AsyncMetadata::new(&self.driver)
    }

    pub fn string_list(&self) -> Result<StringList> {
        StringList::new(&self.driver)
    }

    pub fn range_list(&self) -> Result<RangeList> {
        RangeList::new(&self.driver)
    }

    /// Parse a sub-device specification such as `A:A A:B`
    pub fn subdev_spec(&self, markup: &str) -> Result<SubdevSpec> {
        SubdevSpec::new(&self.driver, markup)
    }

    pub fn sensor_bool(
        &self,
        name: &str,
        value: bool,
        utrue: &str,
        ufalse: &str,
    ) -> Result<SensorValue> {
        SensorValue::from_bool(&self.driver, name, value, utrue, ufalse)
    }

    pub fn sensor_int(
        &self,
        name: &str,
        value: i32,
        unit: &str,
        formatter: &str,
    ) -> Result<SensorValue> {
        SensorValue::from_int(&self.driver, name, value, unit, formatter)
    }

    pub fn sensor_real(
        &self,
        name: &str,
        value: f64,
        unit: &str,
        formatter: &str,
    ) -> Result<SensorValue> {
        SensorValue::from_real(&self.driver, name, value, unit, formatter)
    }

    pub fn sensor_text(&self, name: &str, value: &str, unit: &str) -> Result<SensorValue> {
        SensorValue::from_text(&self.driver, name, value, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_reported() {
        let uhd = Uhd::sim();
        assert!(!uhd.version().unwrap().is_empty());
        assert!(!uhd.abi().unwrap().is_empty());
    }

    #[test]
    fn test_find_and_open() {
        let uhd = Uhd::sim();
        let found = uhd.find("").unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].contains("serial=31A1B2C"));
        assert!(uhd.find("serial=nope").unwrap().is_empty());

        let usrp = uhd.open(&found[0]).unwrap();
        assert_eq!(usrp.mboard_name(0).unwrap(), "B210");
    }

    #[test]
    fn test_find_failure_carries_library_diagnostic() {
        let err = Uhd::sim().find("type").unwrap_err();
        assert_eq!(err.status(), Some(Status::Value));
        assert!(err.message().unwrap().contains("missing '='"));
    }

    #[test]
    fn test_open_without_match() {
        let err = Uhd::sim().open("serial=nope").unwrap_err();
        assert_eq!(err.status(), Some(Status::Key));
        assert!(err.message().unwrap().contains("No devices found"));
    }
}
