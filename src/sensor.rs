//! Sensors, sub-device specifications and string lists.

use std::fmt;
use std::sync::Arc;

use uhd_driver::handle::{self, Usrp};
use uhd_driver::{Driver, Raw, SensorType, Status};

use crate::error::{Result, check, no_nul, with_scratch};
use crate::handle::Owned;

/// A driver-side list of strings.
#[derive(Debug)]
pub struct StringList {
    handle: Owned<handle::StringVector>,
}

impl StringList {
    pub(crate) fn new(driver: &Arc<dyn Driver>) -> Result<Self> {
        Ok(Self {
            handle: Owned::make(driver, |d, out| d.string_vector_make(out))?,
        })
    }

    pub(crate) fn raw(&self) -> Raw<handle::StringVector> {
        self.handle.raw()
    }

    pub fn push(&mut self, value: &str) -> Result<()> {
        no_nul(value)?;
        self.handle.call(|d, h| d.string_vector_push_back(h, value))
    }

    pub fn get(&self, index: usize) -> Result<String> {
        self.handle.read_string(|d, h, buf| d.string_vector_at(h, index, buf))
    }

    pub fn len(&self) -> Result<usize> {
        self.handle.read(|d, h, out| d.string_vector_size(h, out))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn to_vec(&self) -> Result<Vec<String>> {
        (0..self.len()?).map(|i| self.get(i)).collect()
    }
}

/// Fill a fresh string list with a call made on `usrp`.
pub(crate) fn read_strings(
    usrp: &Owned<Usrp>,
    f: impl FnOnce(&dyn Driver, Raw<Usrp>, Raw<handle::StringVector>) -> Status,
) -> Result<Vec<String>> {
    let list = StringList::new(usrp.driver())?;
    usrp.call(|d, h| f(d, h, list.raw()))?;
    list.to_vec()
}

/// Typed content of a sensor reading.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorReading {
    Boolean(bool),
    Integer(i32),
    Real(f64),
    Text(String),
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorReading::Boolean(v) => write!(f, "{v}"),
            SensorReading::Integer(v) => write!(f, "{v}"),
            SensorReading::Real(v) => write!(f, "{v}"),
            SensorReading::Text(v) => f.write_str(v),
        }
    }
}

/// A sensor value held by the driver.
#[derive(Debug)]
pub struct SensorValue {
    handle: Owned<handle::SensorValue>,
}

impl SensorValue {
    pub(crate) fn empty(driver: &Arc<dyn Driver>) -> Result<Self> {
        Ok(Self {
            handle: Owned::make(driver, |d, out| d.sensor_value_make(out))?,
        })
    }

    pub(crate) fn from_bool(
        driver: &Arc<dyn Driver>,
        name: &str,
        value: bool,
        utrue: &str,
        ufalse: &str,
    ) -> Result<Self> {
        no_nul(name)?;
        no_nul(utrue)?;
        no_nul(ufalse)?;
        Ok(Self {
            handle: Owned::make(driver, |d, out| {
                d.sensor_value_make_from_bool(out, name, value, utrue, ufalse)
            })?,
        })
    }

    pub(crate) fn from_int(
        driver: &Arc<dyn Driver>,
        name: &str,
        value: i32,
        unit: &str,
        formatter: &str,
    ) -> Result<Self> {
        no_nul(name)?;
        no_nul(unit)?;
        no_nul(formatter)?;
        Ok(Self {
            handle: Owned::make(driver, |d, out| {
                d.sensor_value_make_from_int(out, name, value, unit, formatter)
            })?,
        })
    }

    pub(crate) fn from_real(
        driver: &Arc<dyn Driver>,
        name: &str,
        value: f64,
        unit: &str,
        formatter: &str,
    ) -> Result<Self> {
        no_nul(name)?;
        no_nul(unit)?;
        no_nul(formatter)?;
        Ok(Self {
            handle: Owned::make(driver, |d, out| {
                d.sensor_value_make_from_realnum(out, name, value, unit, formatter)
            })?,
        })
    }

    pub(crate) fn from_text(
        driver: &Arc<dyn Driver>,
        name: &str,
        value: &str,
        unit: &str,
    ) -> Result<Self> {
        no_nul(name)?;
        no_nul(value)?;
        no_nul(unit)?;
        Ok(Self {
            handle: Owned::make(driver, |d, out| {
                d.sensor_value_make_from_string(out, name, value, unit)
            })?,
        })
    }

    pub fn name(&self) -> Result<String> {
        self.handle.read_string(|d, h, buf| d.sensor_value_name(h, buf))
    }

    /// The value as the driver formats it.
    pub fn value(&self) -> Result<String> {
        self.handle.read_string(|d, h, buf| d.sensor_value_value(h, buf))
    }

    pub fn unit(&self) -> Result<String> {
        self.handle.read_string(|d, h, buf| d.sensor_value_unit(h, buf))
    }

    pub fn data_type(&self) -> Result<SensorType> {
        let mut ty = SensorType::Unknown;
        self.handle.call(|d, h| d.sensor_value_data_type(h, &mut ty))?;
        Ok(ty)
    }

    pub fn to_bool(&self) -> Result<bool> {
        self.handle.read(|d, h, out| d.sensor_value_to_bool(h, out))
    }

    pub fn to_int(&self) -> Result<i32> {
        self.handle.read(|d, h, out| d.sensor_value_to_int(h, out))
    }

    pub fn to_real(&self) -> Result<f64> {
        self.handle.read(|d, h, out| d.sensor_value_to_realnum(h, out))
    }

    pub fn pp_string(&self) -> Result<String> {
        self.handle.read_string(|d, h, buf| d.sensor_value_to_pp_string(h, buf))
    }

    /// Read the value with the conversion its data type calls for.
    pub fn reading(&self) -> Result<SensorReading> {
        Ok(match self.data_type()? {
            SensorType::Boolean => SensorReading::Boolean(self.to_bool()?),
            SensorType::Integer => SensorReading::Integer(self.to_int()?),
            SensorType::Real => SensorReading::Real(self.to_real()?),
            SensorType::String | SensorType::Unknown => SensorReading::Text(self.value()?),
        })
    }
}

/// Fill a fresh sensor value with a call made on `usrp`.
pub(crate) fn read_sensor(
    usrp: &Owned<Usrp>,
    f: impl FnOnce(&dyn Driver, Raw<Usrp>, Raw<handle::SensorValue>) -> Status,
) -> Result<SensorValue> {
    let sensor = SensorValue::empty(usrp.driver())?;
    usrp.call(|d, h| f(d, h, sensor.handle.raw()))?;
    Ok(sensor)
}

/// One daughterboard/sub-device pair of a specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubdevPair {
    pub db_name: String,
    pub sd_name: String,
}

impl fmt::Display for SubdevPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.db_name, self.sd_name)
    }
}

/// Sub-device specification, e.g. `A:A A:B`.
#[derive(Debug)]
pub struct SubdevSpec {
    handle: Owned<handle::SubdevSpec>,
}

impl SubdevSpec {
    pub(crate) fn new(driver: &Arc<dyn Driver>, markup: &str) -> Result<Self> {
        no_nul(markup)?;
        Ok(Self {
            handle: Owned::make(driver, |d, out| d.subdev_spec_make(out, markup))?,
        })
    }

    pub(crate) fn raw(&self) -> Raw<handle::SubdevSpec> {
        self.handle.raw()
    }

    pub fn push(&mut self, markup: &str) -> Result<()> {
        no_nul(markup)?;
        self.handle.call(|d, h| d.subdev_spec_push_back(h, markup))
    }

    pub fn len(&self) -> Result<usize> {
        self.handle.read(|d, h, out| d.subdev_spec_size(h, out))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, index: usize) -> Result<SubdevPair> {
        let driver = self.handle.driver().as_ref();
        let mut sd_name = String::new();
        // Two strings come back from one call: the scratch buffer takes the
        // daughterboard, a local one the sub-device.
        let (status, db_name) = with_scratch(|db_buf| {
            let mut sd_buf = [0u8; 256];
            let status = driver.subdev_spec_at(self.handle.raw(), index, db_buf, &mut sd_buf);
            sd_name = String::from_utf8_lossy(uhd_driver::read_c_str(&sd_buf)).into_owned();
            status
        });
        check(driver, Some(self.handle.raw().erase()), status)?;
        Ok(SubdevPair { db_name, sd_name })
    }

    pub fn pairs(&self) -> Result<Vec<SubdevPair>> {
        (0..self.len()?).map(|i| self.get(i)).collect()
    }

    /// The specification in markup form.
    pub fn markup(&self) -> Result<String> {
        self.handle.read_string(|d, h, buf| d.subdev_spec_to_string(h, buf))
    }

    pub fn pp_string(&self) -> Result<String> {
        self.handle.read_string(|d, h, buf| d.subdev_spec_to_pp_string(h, buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uhd_driver::sim::SimDriver;

    fn driver() -> Arc<dyn Driver> {
        Arc::new(SimDriver::new())
    }

    #[test]
    fn test_string_list() {
        let driver = driver();
        let mut list = StringList::new(&driver).unwrap();
        assert!(list.is_empty().unwrap());
        list.push("internal").unwrap();
        list.push("external").unwrap();
        assert_eq!(list.to_vec().unwrap(), vec!["internal", "external"]);
        assert_eq!(list.get(5).unwrap_err().status(), Some(Status::Index));
    }

    #[test]
    fn test_sensor_readings() {
        let driver = driver();
        let locked = SensorValue::from_bool(&driver, "lo_locked", true, "locked", "unlocked")
            .unwrap();
        assert_eq!(locked.name().unwrap(), "lo_locked");
        assert_eq!(locked.value().unwrap(), "true");
        assert_eq!(locked.unit().unwrap(), "locked");
        assert_eq!(locked.reading().unwrap(), SensorReading::Boolean(true));

        let temp = SensorValue::from_real(&driver, "temp", 42.5, "C", "%f").unwrap();
        assert_eq!(temp.data_type().unwrap(), SensorType::Real);
        assert_eq!(temp.unit().unwrap(), "C");
        assert_eq!(temp.reading().unwrap(), SensorReading::Real(42.5));

        let count = SensorValue::from_int(&driver, "count", -3, "", "%d").unwrap();
        assert_eq!(count.to_int().unwrap(), -3);

        let text = SensorValue::from_text(&driver, "ref", "gpsdo", "").unwrap();
        assert_eq!(text.reading().unwrap().to_string(), "gpsdo");
        assert!(text.to_bool().is_err());
        assert!(!text.pp_string().unwrap().is_empty());
    }

    #[test]
    fn test_subdev_spec_pairs() {
        let driver = driver();
        let mut spec = SubdevSpec::new(&driver, "A:A").unwrap();
        spec.push("A:B").unwrap();
        assert_eq!(spec.len().unwrap(), 2);
        assert_eq!(
            spec.get(1).unwrap(),
            SubdevPair {
                db_name: "A".to_string(),
                sd_name: "B".to_string()
            }
        );
        assert_eq!(spec.markup().unwrap(), "A:A A:B");
        let shown: Vec<String> = spec.pairs().unwrap().iter().map(|p| p.to_string()).collect();
        assert_eq!(shown, vec!["A:A", "A:B"]);
        assert!(spec.get(2).is_err());
    }
}
