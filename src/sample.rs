//! Host sample types and their CPU formats.

use std::fmt;
use std::str::FromStr;

use num_complex::Complex;

use crate::error::Error;

/// CPU-side sample format understood by the streamers
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Complex 64-bit float (fc64)
    Fc64,
    /// Complex 32-bit float (fc32)
    Fc32,
    /// Complex signed 16-bit (sc16)
    Sc16,
    /// Complex signed 8-bit (sc8)
    Sc8,
}

impl SampleFormat {
    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::Fc64 => "fc64",
            SampleFormat::Fc32 => "fc32",
            SampleFormat::Sc16 => "sc16",
            SampleFormat::Sc8 => "sc8",
        }
    }

    /// Bytes per complex sample
    pub fn size(self) -> usize {
        match self {
            SampleFormat::Fc64 => 16,
            SampleFormat::Fc32 => 8,
            SampleFormat::Sc16 => 4,
            SampleFormat::Sc8 => 2,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fc64" => Ok(SampleFormat::Fc64),
            "fc32" => Ok(SampleFormat::Fc32),
            "sc16" => Ok(SampleFormat::Sc16),
            "sc8" => Ok(SampleFormat::Sc8),
            other => Err(Error::invalid_argument(format!(
                "unknown sample format '{other}'"
            ))),
        }
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for num_complex::Complex<f64> {}
    impl Sealed for num_complex::Complex<f32> {}
    impl Sealed for num_complex::Complex<i16> {}
    impl Sealed for num_complex::Complex<i8> {}
}

/// A host type samples can be streamed into or out of.
///
/// Buffers of these types are handed to the driver as bytes without copying.
pub trait Sample: sealed::Sealed + bytemuck::Pod + Send + 'static {
    const FORMAT: SampleFormat;
}

impl Sample for Complex<f64> {
    const FORMAT: SampleFormat = SampleFormat::Fc64;
}

impl Sample for Complex<f32> {
    const FORMAT: SampleFormat = SampleFormat::Fc32;
}

impl Sample for Complex<i16> {
    const FORMAT: SampleFormat = SampleFormat::Sc16;
}

impl Sample for Complex<i8> {
    const FORMAT: SampleFormat = SampleFormat::Sc8;
}

/// Channel counts up to this size pass their buffers without allocating.
pub(crate) const STACK_CHANNELS: usize = 16;

pub(crate) fn as_bytes<T: Sample>(samples: &[T]) -> &[u8] {
    bytemuck::cast_slice(samples)
}

pub(crate) fn as_bytes_mut<T: Sample>(samples: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_match_types() {
        assert_eq!(SampleFormat::Fc64.size(), size_of::<Complex<f64>>());
        assert_eq!(SampleFormat::Fc32.size(), size_of::<Complex<f32>>());
        assert_eq!(SampleFormat::Sc16.size(), size_of::<Complex<i16>>());
        assert_eq!(SampleFormat::Sc8.size(), size_of::<Complex<i8>>());
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("FC32".parse::<SampleFormat>().unwrap(), SampleFormat::Fc32);
        assert_eq!(<Complex<i16> as Sample>::FORMAT.to_string(), "sc16");
        assert!("cu8".parse::<SampleFormat>().is_err());
    }

    #[test]
    fn test_byte_view_is_in_place() {
        let mut buf = [Complex::new(1.0f32, -1.0); 4];
        let ptr = buf.as_ptr() as *const u8;
        let bytes = as_bytes_mut(&mut buf);
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes.as_ptr(), ptr);
        assert_eq!(as_bytes(&buf[..1]).len(), 8);
    }
}
