//! Typed raw handles.
//!
//! A raw handle is the opaque value the driver hands out from a `*_make` call.
//! It carries no ownership: whoever receives it from `make` is responsible for
//! passing it to [`Driver::free`](crate::Driver::free) exactly once.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::num::NonZeroUsize;

/// Every kind of object the driver can hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Usrp,
    RxStreamer,
    TxStreamer,
    RxMetadata,
    TxMetadata,
    AsyncMetadata,
    MetaRange,
    SensorValue,
    SubdevSpec,
    StringVector,
}

impl HandleKind {
    pub fn name(self) -> &'static str {
        match self {
            HandleKind::Usrp => "usrp",
            HandleKind::RxStreamer => "rx_streamer",
            HandleKind::TxStreamer => "tx_streamer",
            HandleKind::RxMetadata => "rx_metadata",
            HandleKind::TxMetadata => "tx_metadata",
            HandleKind::AsyncMetadata => "async_metadata",
            HandleKind::MetaRange => "meta_range",
            HandleKind::SensorValue => "sensor_value",
            HandleKind::SubdevSpec => "subdev_spec",
            HandleKind::StringVector => "string_vector",
        }
    }
}

/// Marker trait tying a zero-sized kind type to its [`HandleKind`].
pub trait Kind: Send + Sync + 'static {
    const KIND: HandleKind;
}

macro_rules! kinds {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug)]
            pub enum $name {}

            impl Kind for $name {
                const KIND: HandleKind = HandleKind::$name;
            }
        )*
    };
}

kinds! {
    /// Device session.
    Usrp,
    /// Receive streamer.
    RxStreamer,
    /// Transmit streamer.
    TxStreamer,
    /// Per-call receive metadata.
    RxMetadata,
    /// Per-call transmit metadata.
    TxMetadata,
    /// Transmit-path event record.
    AsyncMetadata,
    /// List of ranges.
    MetaRange,
    /// Sensor reading.
    SensorValue,
    /// Sub-device specification.
    SubdevSpec,
    /// List of strings.
    StringVector,
}

/// Opaque handle of kind `K`.
pub struct Raw<K: Kind> {
    value: NonZeroUsize,
    _kind: PhantomData<fn() -> K>,
}

impl<K: Kind> Raw<K> {
    pub fn from_value(value: NonZeroUsize) -> Self {
        Self {
            value,
            _kind: PhantomData,
        }
    }

    /// Build a handle from a raw driver value, `None` for a null handle.
    pub fn new(value: usize) -> Option<Self> {
        NonZeroUsize::new(value).map(Self::from_value)
    }

    pub fn value(self) -> usize {
        self.value.get()
    }

    /// Forget the kind for the calls that accept any handle.
    pub fn erase(self) -> AnyRaw {
        AnyRaw {
            kind: K::KIND,
            value: self.value,
        }
    }
}

// Manual impls: the derives would require `K: Clone` and friends.
impl<K: Kind> Clone for Raw<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: Kind> Copy for Raw<K> {}

impl<K: Kind> PartialEq for Raw<K> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<K: Kind> Eq for Raw<K> {}

impl<K: Kind> Hash for Raw<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<K: Kind> fmt::Debug for Raw<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:#x}", K::KIND.name(), self.value)
    }
}

/// A handle of any kind.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnyRaw {
    kind: HandleKind,
    value: NonZeroUsize,
}

impl AnyRaw {
    pub fn kind(self) -> HandleKind {
        self.kind
    }

    pub fn value(self) -> usize {
        self.value.get()
    }

    /// Recover the typed handle if the kind matches.
    pub fn downcast<K: Kind>(self) -> Option<Raw<K>> {
        (self.kind == K::KIND).then(|| Raw::from_value(self.value))
    }
}

impl fmt::Debug for AnyRaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:#x}", self.kind.name(), self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_is_rejected() {
        assert!(Raw::<Usrp>::new(0).is_none());
        assert_eq!(Raw::<Usrp>::new(7).map(Raw::value), Some(7));
    }

    #[test]
    fn test_erase_and_downcast() {
        let raw = Raw::<MetaRange>::new(3).unwrap();
        let any = raw.erase();
        assert_eq!(any.kind(), HandleKind::MetaRange);
        assert_eq!(any.downcast::<MetaRange>(), Some(raw));
        assert!(any.downcast::<StringVector>().is_none());
    }
}
