//! In-process simulated device.
//!
//! [`SimDriver`] implements the whole [`Driver`] surface without hardware.
//! Objects live in a handle table guarded by one mutex; streaming calls that
//! have to wait (`recv` on an idle stream, `recv_async_msg` with an empty
//! queue) block on a condition variable until something changes or the
//! timeout expires.
//!
//! The device clock does not follow wall time. It starts at zero, can be set
//! with the time calls and advances by the samples streamed through it, which
//! keeps every run deterministic.
//!
//! ```
//! use std::sync::Arc;
//! use uhd_driver::sim::SimDriver;
//!
//! let sim = Arc::new(SimDriver::new());
//! assert_eq!(sim.live_handles(), 0);
//! ```

mod device;
mod stream;

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::api::{Driver, Out, write_c_str};
use crate::args::DeviceArgs;
use crate::handle::{self, AnyRaw, HandleKind, Kind, Raw};
use crate::range::{MetaRange, Range};
use crate::status::Status;
use crate::types::{
    AsyncEventCode, ChainInfo, Direction, RxErrorCode, SensorType, StreamArgs, StreamCmd,
    TimeSpec, TuneRequest, TuneResult, UserPayload,
};

pub use device::{Chain, RF_STEP, Session, SimDevice};
pub use stream::{MAX_EVENTS, MAX_NUM_SAMPS, TONE_PERIOD, tone};

use device::{Reading, Sensor};
use stream::{AsyncMeta, CpuFormat, RxMeta, RxStream, TxMeta, TxStream};

thread_local! {
    static LAST_ERROR: RefCell<String> = const { RefCell::new(String::new()) };
}

/// A failed simulated call: the status plus the diagnostic stored for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub status: Status,
    pub message: String,
}

impl Fault {
    fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::new(Status::Index, message)
    }

    pub fn key(message: impl Into<String>) -> Self {
        Self::new(Status::Key, message)
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new(Status::Value, message)
    }

    pub fn lookup(message: impl Into<String>) -> Self {
        Self::new(Status::Lookup, message)
    }

    fn runtime(message: impl Into<String>) -> Self {
        Self::new(Status::Runtime, message)
    }

    fn invalid(handle: AnyRaw) -> Self {
        Self::new(
            Status::InvalidDevice,
            format!("invalid {} handle {:#x}", handle.kind().name(), handle.value()),
        )
    }
}

type SimResult<T = ()> = Result<T, Fault>;

#[derive(Debug)]
enum Object {
    StringVector(Vec<String>),
    MetaRange(Vec<Range>),
    SensorValue(Sensor),
    SubdevSpec(Vec<(String, String)>),
    RxMetadata(RxMeta),
    TxMetadata(TxMeta),
    AsyncMetadata(AsyncMeta),
    RxStreamer(Option<RxStream>),
    TxStreamer(Option<TxStream>),
    Usrp(u64),
}

#[derive(Debug)]
struct Entry {
    kind: HandleKind,
    object: Object,
    last_error: String,
}

#[derive(Debug, Default)]
struct Table {
    entries: HashMap<usize, Entry>,
    issued: usize,
}

macro_rules! accessor {
    ($name:ident, $kind:ident, $ty:ty) => {
        fn $name(&mut self, h: Raw<handle::$kind>) -> SimResult<&mut $ty> {
            match self.object(h.erase())? {
                Object::$kind(value) => Ok(value),
                _ => Err(Fault::invalid(h.erase())),
            }
        }
    };
}

impl Table {
    fn insert<K: Kind>(&mut self, object: Object) -> Raw<K> {
        self.issued += 1;
        let value = NonZeroUsize::MIN.saturating_add(self.issued);
        self.entries.insert(
            value.get(),
            Entry {
                kind: K::KIND,
                object,
                last_error: String::new(),
            },
        );
        Raw::from_value(value)
    }

    fn object(&mut self, h: AnyRaw) -> SimResult<&mut Object> {
        match self.entries.get_mut(&h.value()) {
            Some(entry) if entry.kind == h.kind() => Ok(&mut entry.object),
            _ => Err(Fault::invalid(h)),
        }
    }

    fn remove(&mut self, h: AnyRaw) -> SimResult<Object> {
        match self.entries.get(&h.value()) {
            Some(entry) if entry.kind == h.kind() => {}
            _ => return Err(Fault::invalid(h)),
        }
        self.entries
            .remove(&h.value())
            .map(|e| e.object)
            .ok_or_else(|| Fault::invalid(h))
    }

    accessor!(string_vector, StringVector, Vec<String>);
    accessor!(meta_range, MetaRange, Vec<Range>);
    accessor!(sensor_value, SensorValue, Sensor);
    accessor!(subdev_spec, SubdevSpec, Vec<(String, String)>);
    accessor!(rx_metadata, RxMetadata, RxMeta);
    accessor!(tx_metadata, TxMetadata, TxMeta);
    accessor!(async_metadata, AsyncMetadata, AsyncMeta);
    accessor!(rx_slot, RxStreamer, Option<RxStream>);
    accessor!(tx_slot, TxStreamer, Option<TxStream>);

    fn rx_streamer(&mut self, h: Raw<handle::RxStreamer>) -> SimResult<&mut RxStream> {
        self.rx_slot(h)?
            .as_mut()
            .ok_or_else(|| Fault::runtime("rx streamer is not bound to a device"))
    }

    fn tx_streamer(&mut self, h: Raw<handle::TxStreamer>) -> SimResult<&mut TxStream> {
        self.tx_slot(h)?
            .as_mut()
            .ok_or_else(|| Fault::runtime("tx streamer is not bound to a device"))
    }

    fn session_id(&mut self, h: Raw<handle::Usrp>) -> SimResult<u64> {
        match self.object(h.erase())? {
            Object::Usrp(id) => Ok(*id),
            _ => Err(Fault::invalid(h.erase())),
        }
    }

    fn meta_range_value(&mut self, h: Raw<handle::MetaRange>) -> SimResult<MetaRange> {
        MetaRange::new(self.meta_range(h)?.clone())
            .map_err(|e| Fault::runtime(e.to_string()))
    }
}

#[derive(Debug)]
struct SimState {
    devices: Vec<SimDevice>,
    table: Table,
    sessions: BTreeMap<u64, Session>,
    next_session: u64,
    rx_faults: VecDeque<RxErrorCode>,
    send_faults: usize,
    last_tune: Option<(Direction, usize, TuneRequest)>,
    last_stream_cmd: Option<StreamCmd>,
}

impl SimState {
    fn session(&mut self, h: Raw<handle::Usrp>) -> SimResult<&mut Session> {
        let id = self.table.session_id(h)?;
        self.sessions
            .get_mut(&id)
            .ok_or_else(|| Fault::invalid(h.erase()))
    }

    fn release(&mut self, id: u64) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.refs -= 1;
            if session.refs == 0 {
                tracing::debug!("sim: closing device {}", session.device.serial());
                self.sessions.remove(&id);
            }
        }
    }

    fn acquire(&mut self, id: u64) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.refs += 1;
        }
    }

    fn record(&mut self, scope: Option<AnyRaw>, result: SimResult) -> Status {
        let entry = scope.and_then(|h| {
            self.table
                .entries
                .get_mut(&h.value())
                .filter(|e| e.kind == h.kind())
        });
        match result {
            Ok(()) => {
                if let Some(entry) = entry {
                    entry.last_error.clear();
                }
                Status::None
            }
            Err(fault) => {
                tracing::trace!("sim: {}: {}", fault.status, fault.message);
                LAST_ERROR.with(|slot| slot.borrow_mut().clone_from(&fault.message));
                if let Some(entry) = entry {
                    entry.last_error = fault.message;
                }
                fault.status
            }
        }
    }

    fn check_buffers(
        stream_channels: usize,
        sizes: impl ExactSizeIterator<Item = usize>,
        need: usize,
    ) -> SimResult {
        if sizes.len() != stream_channels {
            return Err(Fault::value(format!(
                "expected {stream_channels} channel buffers, got {}",
                sizes.len()
            )));
        }
        for (i, len) in sizes.enumerate() {
            if len < need {
                return Err(Fault::value(format!(
                    "buffer {i} holds {len} bytes, {need} required"
                )));
            }
        }
        Ok(())
    }

    /// One receive attempt; `Ok(false)` means nothing to do yet.
    #[allow(clippy::too_many_arguments)]
    fn try_recv(
        &mut self,
        h: Raw<handle::RxStreamer>,
        buffs: &mut [&mut [u8]],
        samps_per_buff: usize,
        md: Raw<handle::RxMetadata>,
        one_packet: bool,
        give_up: bool,
        items: &mut usize,
    ) -> SimResult<bool> {
        self.table.rx_metadata(md)?;
        let stream = self.table.rx_streamer(h)?;
        let need = samps_per_buff * stream.format.size();
        Self::check_buffers(stream.channels.len(), buffs.iter().map(|b| b.len()), need)?;

        let (n, meta) = if let Some(code) = self.rx_faults.pop_front() {
            (
                0,
                RxMeta {
                    error_code: code.as_raw(),
                    ..Default::default()
                },
            )
        } else if !stream.is_active() && !give_up {
            return Ok(false);
        } else {
            let session = self
                .sessions
                .get_mut(&stream.session)
                .ok_or_else(|| Fault::runtime("device session is gone"))?;
            stream.recv(session, buffs, samps_per_buff, one_packet)
        };
        *self.table.rx_metadata(md)? = meta;
        *items = n;
        Ok(true)
    }

    fn try_async(
        &mut self,
        h: Raw<handle::TxStreamer>,
        md: Raw<handle::AsyncMetadata>,
    ) -> SimResult<bool> {
        self.table.async_metadata(md)?;
        let Some(event) = self.table.tx_streamer(h)?.pop() else {
            return Ok(false);
        };
        *self.table.async_metadata(md)? = event;
        Ok(true)
    }
}

/// Simulated driver; see the module documentation.
#[derive(Debug)]
pub struct SimDriver {
    state: Mutex<SimState>,
    changed: Condvar,
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDriver {
    /// A driver that can find one two-channel device.
    pub fn new() -> Self {
        Self::with_devices(vec![SimDevice::b210("31A1B2C")])
    }

    pub fn with_devices(devices: Vec<SimDevice>) -> Self {
        Self {
            state: Mutex::new(SimState {
                devices,
                table: Table::default(),
                sessions: BTreeMap::new(),
                next_session: 1,
                rx_faults: VecDeque::new(),
                send_faults: 0,
                last_tune: None,
                last_stream_cmd: None,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn call(&self, scope: Option<AnyRaw>, f: impl FnOnce(&mut SimState) -> SimResult) -> Status {
        let mut st = self.lock();
        let result = f(&mut st);
        st.record(scope, result)
    }

    /// Like [`SimDriver::call`], then wake waiting streaming calls.
    fn call_notify(
        &self,
        scope: Option<AnyRaw>,
        f: impl FnOnce(&mut SimState) -> SimResult,
    ) -> Status {
        let status = self.call(scope, f);
        self.changed.notify_all();
        status
    }

    fn usrp_call(
        &self,
        h: Raw<handle::Usrp>,
        f: impl FnOnce(&mut Session) -> SimResult,
    ) -> Status {
        self.call(Some(h.erase()), |st| f(st.session(h)?))
    }

    fn make<K: Kind>(&self, out: Out<'_, K>, object: Object) -> Status {
        self.call(None, |st| {
            let raw = st.table.insert::<K>(object);
            tracing::trace!("sim: made {raw:?}");
            *out = Some(raw);
            Ok(())
        })
    }

    /// Write a list of strings into a string-vector handle, scoped to `h`.
    fn usrp_list(
        &self,
        h: Raw<handle::Usrp>,
        out: Raw<handle::StringVector>,
        f: impl FnOnce(&Session) -> SimResult<Vec<String>>,
    ) -> Status {
        self.call(Some(h.erase()), |st| {
            let list = f(&*st.session(h)?)?;
            *st.table.string_vector(out)? = list;
            Ok(())
        })
    }

    fn usrp_range(
        &self,
        h: Raw<handle::Usrp>,
        out: Raw<handle::MetaRange>,
        f: impl FnOnce(&Session) -> SimResult<MetaRange>,
    ) -> Status {
        self.call(Some(h.erase()), |st| {
            let range = f(&*st.session(h)?)?;
            *st.table.meta_range(out)? = range.ranges().to_vec();
            Ok(())
        })
    }

    fn usrp_sensor_into(
        &self,
        h: Raw<handle::Usrp>,
        name: &str,
        out: Raw<handle::SensorValue>,
        f: impl FnOnce(&Session) -> SimResult<Vec<Sensor>>,
    ) -> Status {
        self.call(Some(h.erase()), |st| {
            let sensor = f(&*st.session(h)?)?
                .into_iter()
                .find(|s| s.name == name)
                .ok_or_else(|| Fault::key(format!("Invalid sensor name: {name}")))?;
            *st.table.sensor_value(out)? = sensor;
            Ok(())
        })
    }

    fn wait<'a>(
        &self,
        st: MutexGuard<'a, SimState>,
        deadline: Option<Instant>,
    ) -> (MutexGuard<'a, SimState>, bool) {
        match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return (st, true);
                }
                let (st, _) = self
                    .changed
                    .wait_timeout(st, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                (st, false)
            }
            None => (
                self.changed.wait(st).unwrap_or_else(PoisonError::into_inner),
                false,
            ),
        }
    }

    /// Number of live handles of every kind.
    pub fn live_handles(&self) -> usize {
        self.lock().table.entries.len()
    }

    /// Number of opened device sessions still referenced by a handle.
    pub fn open_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    /// The most recent tune request with its direction and channel.
    pub fn last_tune_request(&self) -> Option<(Direction, usize, TuneRequest)> {
        self.lock().last_tune.clone()
    }

    pub fn last_stream_cmd(&self) -> Option<StreamCmd> {
        self.lock().last_stream_cmd
    }

    /// RF and DSP frequency of an RX channel of the most recently opened session.
    pub fn rx_frequency_state(&self, chan: usize) -> Option<(f64, f64)> {
        let st = self.lock();
        let chain = st.sessions.values().next_back()?.rx.get(chan)?;
        Some((chain.rf_freq, chain.dsp_freq))
    }

    /// Device time of the most recently opened session.
    pub fn device_time(&self) -> Option<TimeSpec> {
        self.lock().sessions.values().next_back().map(|s| s.time)
    }

    /// Make the next `recv` on any RX streamer report `code` with no samples.
    pub fn inject_rx_error(&self, code: RxErrorCode) {
        self.lock().rx_faults.push_back(code);
        self.changed.notify_all();
    }

    /// Make the next `count` sends on any TX streamer fail with [`Status::Io`].
    pub fn inject_send_fault(&self, count: usize) {
        self.lock().send_faults += count;
    }

    /// Queue an event on every bound TX streamer.
    pub fn inject_async_event(
        &self,
        channel: usize,
        code: AsyncEventCode,
        user_payload: Option<UserPayload>,
    ) {
        let mut st = self.lock();
        let SimState {
            table, sessions, ..
        } = &mut *st;
        for entry in table.entries.values_mut() {
            if let Object::TxStreamer(Some(tx)) = &mut entry.object {
                let time = sessions.get(&tx.session).map(|s| s.time);
                let mut event_code = code;
                if user_payload.is_some() {
                    event_code |= AsyncEventCode::USER_PAYLOAD;
                }
                tx.push(AsyncMeta {
                    channel,
                    has_time_spec: time.is_some(),
                    time_spec: time.unwrap_or_default(),
                    event_code: event_code.bits(),
                    user_payload: user_payload.unwrap_or_default(),
                });
            }
        }
        drop(st);
        self.changed.notify_all();
    }

    /// Total samples accepted by TX streamers still alive.
    pub fn tx_samples_sent(&self) -> u64 {
        self.lock()
            .table
            .entries
            .values()
            .filter_map(|e| match &e.object {
                Object::TxStreamer(Some(tx)) => Some(tx.samples_sent),
                _ => None,
            })
            .sum()
    }
}

fn deadline(timeout: f64) -> Option<Instant> {
    let timeout = Duration::try_from_secs_f64(timeout.max(0.0)).ok()?;
    Instant::now().checked_add(timeout)
}

fn bind_stream(
    session: &Session,
    dir: Direction,
    args: &StreamArgs,
) -> SimResult<(CpuFormat, Vec<usize>)> {
    let format = CpuFormat::parse(&args.cpu_format)?;
    stream::check_otw_format(&args.otw_format)?;
    let channels = if args.channels.is_empty() {
        vec![0]
    } else {
        args.channels.clone()
    };
    for &chan in &channels {
        session.chain(dir, chan)?;
    }
    Ok((format, channels))
}

impl Driver for SimDriver {
    fn last_error(&self, buf: &mut [u8]) -> Status {
        LAST_ERROR.with(|slot| write_c_str(buf, &slot.borrow()));
        Status::None
    }

    fn version_string(&self, buf: &mut [u8]) -> Status {
        write_c_str(buf, concat!("sim-", env!("CARGO_PKG_VERSION")));
        Status::None
    }

    fn abi_string(&self, buf: &mut [u8]) -> Status {
        write_c_str(buf, "sim");
        Status::None
    }

    fn set_thread_priority(&self, priority: f32, realtime: bool) -> Status {
        self.call(None, |_| {
            if !(-1.0..=1.0).contains(&priority) {
                return Err(Fault::value(format!(
                    "thread priority {priority} out of range [-1, 1]"
                )));
            }
            tracing::debug!("sim: thread priority {priority} (realtime: {realtime})");
            Ok(())
        })
    }

    fn free(&self, h: AnyRaw) -> Status {
        self.call_notify(None, |st| {
            match st.table.remove(h)? {
                Object::Usrp(id) => st.release(id),
                Object::RxStreamer(Some(rx)) => st.release(rx.session),
                Object::TxStreamer(Some(tx)) => st.release(tx.session),
                _ => {}
            }
            tracing::trace!("sim: freed {h:?}");
            Ok(())
        })
    }

    fn handle_last_error(&self, h: AnyRaw, buf: &mut [u8]) -> Status {
        let st = self.lock();
        match st.table.entries.get(&h.value()) {
            Some(entry) if entry.kind == h.kind() => {
                write_c_str(buf, &entry.last_error);
                Status::None
            }
            _ => Status::InvalidDevice,
        }
    }

    fn string_vector_make(&self, out: Out<'_, handle::StringVector>) -> Status {
        self.make(out, Object::StringVector(Vec::new()))
    }

    fn string_vector_push_back(&self, h: Raw<handle::StringVector>, value: &str) -> Status {
        self.call(Some(h.erase()), |st| {
            st.table.string_vector(h)?.push(value.to_string());
            Ok(())
        })
    }

    fn string_vector_at(
        &self,
        h: Raw<handle::StringVector>,
        index: usize,
        buf: &mut [u8],
    ) -> Status {
        self.call(Some(h.erase()), |st| {
            let list = st.table.string_vector(h)?;
            let value = list.get(index).ok_or_else(|| {
                Fault::index(format!("index {index} out of range for {} strings", list.len()))
            })?;
            write_c_str(buf, value);
            Ok(())
        })
    }

    fn string_vector_size(&self, h: Raw<handle::StringVector>, out: &mut usize) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.string_vector(h)?.len();
            Ok(())
        })
    }

    fn meta_range_make(&self, out: Out<'_, handle::MetaRange>) -> Status {
        self.make(out, Object::MetaRange(Vec::new()))
    }

    fn meta_range_push_back(&self, h: Raw<handle::MetaRange>, range: &Range) -> Status {
        self.call(Some(h.erase()), |st| {
            st.table.meta_range(h)?.push(*range);
            Ok(())
        })
    }

    fn meta_range_at(&self, h: Raw<handle::MetaRange>, index: usize, out: &mut Range) -> Status {
        self.call(Some(h.erase()), |st| {
            let ranges = st.table.meta_range(h)?;
            *out = *ranges.get(index).ok_or_else(|| {
                Fault::index(format!("index {index} out of range for {} ranges", ranges.len()))
            })?;
            Ok(())
        })
    }

    fn meta_range_size(&self, h: Raw<handle::MetaRange>, out: &mut usize) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.meta_range(h)?.len();
            Ok(())
        })
    }

    fn meta_range_start(&self, h: Raw<handle::MetaRange>, out: &mut f64) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.meta_range_value(h)?.start();
            Ok(())
        })
    }

    fn meta_range_stop(&self, h: Raw<handle::MetaRange>, out: &mut f64) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.meta_range_value(h)?.stop();
            Ok(())
        })
    }

    fn meta_range_step(&self, h: Raw<handle::MetaRange>, out: &mut f64) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.meta_range_value(h)?.step();
            Ok(())
        })
    }

    fn meta_range_clip(
        &self,
        h: Raw<handle::MetaRange>,
        value: f64,
        clip_step: bool,
        out: &mut f64,
    ) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.meta_range_value(h)?.clip(value, clip_step);
            Ok(())
        })
    }

    fn meta_range_to_pp_string(&self, h: Raw<handle::MetaRange>, buf: &mut [u8]) -> Status {
        self.call(Some(h.erase()), |st| {
            let ranges = st.table.meta_range(h)?;
            let pp: Vec<String> = ranges
                .iter()
                .map(|r| format!("({}, {}, {})", r.start, r.stop, r.step))
                .collect();
            write_c_str(buf, &pp.join("\n"));
            Ok(())
        })
    }

    fn sensor_value_make(&self, out: Out<'_, handle::SensorValue>) -> Status {
        self.make(out, Object::SensorValue(Sensor::empty()))
    }

    fn sensor_value_make_from_bool(
        &self,
        out: Out<'_, handle::SensorValue>,
        name: &str,
        value: bool,
        utrue: &str,
        ufalse: &str,
    ) -> Status {
        self.make(
            out,
            Object::SensorValue(Sensor::boolean(name, value, utrue, ufalse)),
        )
    }

    fn sensor_value_make_from_int(
        &self,
        out: Out<'_, handle::SensorValue>,
        name: &str,
        value: i32,
        unit: &str,
        _formatter: &str,
    ) -> Status {
        self.make(out, Object::SensorValue(Sensor::int(name, value, unit)))
    }

    fn sensor_value_make_from_realnum(
        &self,
        out: Out<'_, handle::SensorValue>,
        name: &str,
        value: f64,
        unit: &str,
        _formatter: &str,
    ) -> Status {
        self.make(out, Object::SensorValue(Sensor::real(name, value, unit)))
    }

    fn sensor_value_make_from_string(
        &self,
        out: Out<'_, handle::SensorValue>,
        name: &str,
        value: &str,
        unit: &str,
    ) -> Status {
        self.make(out, Object::SensorValue(Sensor::text(name, value, unit)))
    }

    fn sensor_value_to_bool(&self, h: Raw<handle::SensorValue>, out: &mut bool) -> Status {
        self.call(Some(h.erase()), |st| match st.table.sensor_value(h)?.reading {
            Reading::Bool { value, .. } => {
                *out = value;
                Ok(())
            }
            _ => Err(Fault::new(Status::Type, "sensor value is not a boolean")),
        })
    }

    fn sensor_value_to_int(&self, h: Raw<handle::SensorValue>, out: &mut i32) -> Status {
        self.call(Some(h.erase()), |st| match st.table.sensor_value(h)?.reading {
            Reading::Int { value, .. } => {
                *out = value;
                Ok(())
            }
            _ => Err(Fault::new(Status::Type, "sensor value is not an integer")),
        })
    }

    fn sensor_value_to_realnum(&self, h: Raw<handle::SensorValue>, out: &mut f64) -> Status {
        self.call(Some(h.erase()), |st| match st.table.sensor_value(h)?.reading {
            Reading::Real { value, .. } => {
                *out = value;
                Ok(())
            }
            _ => Err(Fault::new(Status::Type, "sensor value is not a real number")),
        })
    }

    fn sensor_value_name(&self, h: Raw<handle::SensorValue>, buf: &mut [u8]) -> Status {
        self.call(Some(h.erase()), |st| {
            write_c_str(buf, &st.table.sensor_value(h)?.name);
            Ok(())
        })
    }

    fn sensor_value_value(&self, h: Raw<handle::SensorValue>, buf: &mut [u8]) -> Status {
        self.call(Some(h.erase()), |st| {
            write_c_str(buf, &st.table.sensor_value(h)?.value());
            Ok(())
        })
    }

    fn sensor_value_unit(&self, h: Raw<handle::SensorValue>, buf: &mut [u8]) -> Status {
        self.call(Some(h.erase()), |st| {
            write_c_str(buf, &st.table.sensor_value(h)?.unit());
            Ok(())
        })
    }

    fn sensor_value_data_type(&self, h: Raw<handle::SensorValue>, out: &mut SensorType) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = match st.table.sensor_value(h)?.reading {
                Reading::Bool { .. } => SensorType::Boolean,
                Reading::Int { .. } => SensorType::Integer,
                Reading::Real { .. } => SensorType::Real,
                Reading::Text { .. } => SensorType::String,
            };
            Ok(())
        })
    }

    fn sensor_value_to_pp_string(&self, h: Raw<handle::SensorValue>, buf: &mut [u8]) -> Status {
        self.call(Some(h.erase()), |st| {
            write_c_str(buf, &st.table.sensor_value(h)?.pp_string());
            Ok(())
        })
    }

    fn subdev_spec_make(&self, out: Out<'_, handle::SubdevSpec>, markup: &str) -> Status {
        self.make(out, Object::SubdevSpec(device::parse_subdev(markup)))
    }

    fn subdev_spec_push_back(&self, h: Raw<handle::SubdevSpec>, markup: &str) -> Status {
        self.call(Some(h.erase()), |st| {
            st.table
                .subdev_spec(h)?
                .extend(device::parse_subdev(markup));
            Ok(())
        })
    }

    fn subdev_spec_size(&self, h: Raw<handle::SubdevSpec>, out: &mut usize) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.subdev_spec(h)?.len();
            Ok(())
        })
    }

    fn subdev_spec_at(
        &self,
        h: Raw<handle::SubdevSpec>,
        index: usize,
        db_name: &mut [u8],
        sd_name: &mut [u8],
    ) -> Status {
        self.call(Some(h.erase()), |st| {
            let pairs = st.table.subdev_spec(h)?;
            let (db, sd) = pairs.get(index).ok_or_else(|| {
                Fault::index(format!("index {index} out of range for {} entries", pairs.len()))
            })?;
            write_c_str(db_name, db);
            write_c_str(sd_name, sd);
            Ok(())
        })
    }

    fn subdev_spec_to_pp_string(&self, h: Raw<handle::SubdevSpec>, buf: &mut [u8]) -> Status {
        self.call(Some(h.erase()), |st| {
            write_c_str(buf, &device::subdev_pp_string(st.table.subdev_spec(h)?));
            Ok(())
        })
    }

    fn subdev_spec_to_string(&self, h: Raw<handle::SubdevSpec>, buf: &mut [u8]) -> Status {
        self.call(Some(h.erase()), |st| {
            write_c_str(buf, &device::subdev_markup(st.table.subdev_spec(h)?));
            Ok(())
        })
    }

    fn rx_metadata_make(&self, out: Out<'_, handle::RxMetadata>) -> Status {
        self.make(out, Object::RxMetadata(RxMeta::default()))
    }

    fn rx_metadata_has_time_spec(&self, h: Raw<handle::RxMetadata>, out: &mut bool) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.rx_metadata(h)?.has_time_spec;
            Ok(())
        })
    }

    fn rx_metadata_time_spec(&self, h: Raw<handle::RxMetadata>, out: &mut TimeSpec) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.rx_metadata(h)?.time_spec;
            Ok(())
        })
    }

    fn rx_metadata_more_fragments(&self, h: Raw<handle::RxMetadata>, out: &mut bool) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.rx_metadata(h)?.more_fragments;
            Ok(())
        })
    }

    fn rx_metadata_fragment_offset(&self, h: Raw<handle::RxMetadata>, out: &mut usize) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.rx_metadata(h)?.fragment_offset;
            Ok(())
        })
    }

    fn rx_metadata_start_of_burst(&self, h: Raw<handle::RxMetadata>, out: &mut bool) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.rx_metadata(h)?.start_of_burst;
            Ok(())
        })
    }

    fn rx_metadata_end_of_burst(&self, h: Raw<handle::RxMetadata>, out: &mut bool) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.rx_metadata(h)?.end_of_burst;
            Ok(())
        })
    }

    fn rx_metadata_out_of_sequence(&self, h: Raw<handle::RxMetadata>, out: &mut bool) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.rx_metadata(h)?.out_of_sequence;
            Ok(())
        })
    }

    fn rx_metadata_error_code(&self, h: Raw<handle::RxMetadata>, out: &mut u32) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.rx_metadata(h)?.error_code;
            Ok(())
        })
    }

    fn rx_metadata_to_pp_string(&self, h: Raw<handle::RxMetadata>, buf: &mut [u8]) -> Status {
        self.call(Some(h.erase()), |st| {
            write_c_str(buf, &st.table.rx_metadata(h)?.pp_string());
            Ok(())
        })
    }

    fn rx_metadata_strerror(&self, h: Raw<handle::RxMetadata>, buf: &mut [u8]) -> Status {
        self.call(Some(h.erase()), |st| {
            write_c_str(buf, &stream::strerror(st.table.rx_metadata(h)?.error_code));
            Ok(())
        })
    }

    fn tx_metadata_make(
        &self,
        out: Out<'_, handle::TxMetadata>,
        has_time_spec: bool,
        time_spec: TimeSpec,
        start_of_burst: bool,
        end_of_burst: bool,
    ) -> Status {
        self.make(
            out,
            Object::TxMetadata(TxMeta {
                has_time_spec,
                time_spec,
                start_of_burst,
                end_of_burst,
            }),
        )
    }

    fn tx_metadata_has_time_spec(&self, h: Raw<handle::TxMetadata>, out: &mut bool) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.tx_metadata(h)?.has_time_spec;
            Ok(())
        })
    }

    fn tx_metadata_time_spec(&self, h: Raw<handle::TxMetadata>, out: &mut TimeSpec) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.tx_metadata(h)?.time_spec;
            Ok(())
        })
    }

    fn tx_metadata_start_of_burst(&self, h: Raw<handle::TxMetadata>, out: &mut bool) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.tx_metadata(h)?.start_of_burst;
            Ok(())
        })
    }

    fn tx_metadata_end_of_burst(&self, h: Raw<handle::TxMetadata>, out: &mut bool) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.tx_metadata(h)?.end_of_burst;
            Ok(())
        })
    }

    fn async_metadata_make(&self, out: Out<'_, handle::AsyncMetadata>) -> Status {
        self.make(out, Object::AsyncMetadata(AsyncMeta::default()))
    }

    fn async_metadata_channel(&self, h: Raw<handle::AsyncMetadata>, out: &mut usize) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.async_metadata(h)?.channel;
            Ok(())
        })
    }

    fn async_metadata_has_time_spec(
        &self,
        h: Raw<handle::AsyncMetadata>,
        out: &mut bool,
    ) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.async_metadata(h)?.has_time_spec;
            Ok(())
        })
    }

    fn async_metadata_time_spec(
        &self,
        h: Raw<handle::AsyncMetadata>,
        out: &mut TimeSpec,
    ) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.async_metadata(h)?.time_spec;
            Ok(())
        })
    }

    fn async_metadata_event_code(&self, h: Raw<handle::AsyncMetadata>, out: &mut u32) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.async_metadata(h)?.event_code;
            Ok(())
        })
    }

    fn async_metadata_user_payload(
        &self,
        h: Raw<handle::AsyncMetadata>,
        out: &mut UserPayload,
    ) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.async_metadata(h)?.user_payload;
            Ok(())
        })
    }

    fn rx_streamer_make(&self, out: Out<'_, handle::RxStreamer>) -> Status {
        self.make(out, Object::RxStreamer(None))
    }

    fn rx_streamer_num_channels(&self, h: Raw<handle::RxStreamer>, out: &mut usize) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.rx_streamer(h)?.channels.len();
            Ok(())
        })
    }

    fn rx_streamer_max_num_samps(&self, h: Raw<handle::RxStreamer>, out: &mut usize) -> Status {
        self.call(Some(h.erase()), |st| {
            st.table.rx_streamer(h)?;
            *out = MAX_NUM_SAMPS;
            Ok(())
        })
    }

    fn rx_streamer_recv(
        &self,
        h: Raw<handle::RxStreamer>,
        buffs: &mut [&mut [u8]],
        samps_per_buff: usize,
        md: Raw<handle::RxMetadata>,
        timeout: f64,
        one_packet: bool,
        items_recvd: &mut usize,
    ) -> Status {
        *items_recvd = 0;
        let deadline = deadline(timeout);
        let mut st = self.lock();
        let mut give_up = false;
        let result = loop {
            match st.try_recv(h, buffs, samps_per_buff, md, one_packet, give_up, items_recvd) {
                Ok(true) => break Ok(()),
                Ok(false) => {}
                Err(fault) => break Err(fault),
            }
            (st, give_up) = self.wait(st, deadline);
        };
        st.record(Some(h.erase()), result)
    }

    fn rx_streamer_issue_stream_cmd(&self, h: Raw<handle::RxStreamer>, cmd: &StreamCmd) -> Status {
        self.call_notify(Some(h.erase()), |st| {
            let stream = st.table.rx_streamer(h)?;
            let now = st
                .sessions
                .get(&stream.session)
                .map_or(TimeSpec::ZERO, |s| s.time);
            stream.issue(cmd, now);
            st.last_stream_cmd = Some(*cmd);
            Ok(())
        })
    }

    fn tx_streamer_make(&self, out: Out<'_, handle::TxStreamer>) -> Status {
        self.make(out, Object::TxStreamer(None))
    }

    fn tx_streamer_num_channels(&self, h: Raw<handle::TxStreamer>, out: &mut usize) -> Status {
        self.call(Some(h.erase()), |st| {
            *out = st.table.tx_streamer(h)?.channels.len();
            Ok(())
        })
    }

    fn tx_streamer_max_num_samps(&self, h: Raw<handle::TxStreamer>, out: &mut usize) -> Status {
        self.call(Some(h.erase()), |st| {
            st.table.tx_streamer(h)?;
            *out = MAX_NUM_SAMPS;
            Ok(())
        })
    }

    fn tx_streamer_send(
        &self,
        h: Raw<handle::TxStreamer>,
        buffs: &[&[u8]],
        samps_per_buff: usize,
        md: Raw<handle::TxMetadata>,
        _timeout: f64,
        items_sent: &mut usize,
    ) -> Status {
        *items_sent = 0;
        self.call_notify(Some(h.erase()), |st| {
            if st.send_faults > 0 {
                st.send_faults -= 1;
                return Err(Fault::new(Status::Io, "send: transport error"));
            }
            let meta = *st.table.tx_metadata(md)?;
            let stream = st.table.tx_streamer(h)?;
            let need = samps_per_buff * stream.format.size();
            SimState::check_buffers(stream.channels.len(), buffs.iter().map(|b| b.len()), need)?;
            let session = st
                .sessions
                .get_mut(&stream.session)
                .ok_or_else(|| Fault::runtime("device session is gone"))?;
            *items_sent = stream.send(session, &meta, samps_per_buff);
            Ok(())
        })
    }

    fn tx_streamer_recv_async_msg(
        &self,
        h: Raw<handle::TxStreamer>,
        md: Raw<handle::AsyncMetadata>,
        timeout: f64,
        valid: &mut bool,
    ) -> Status {
        *valid = false;
        let deadline = deadline(timeout);
        let mut st = self.lock();
        let result = loop {
            match st.try_async(h, md) {
                Ok(true) => {
                    *valid = true;
                    break Ok(());
                }
                Ok(false) => {}
                Err(fault) => break Err(fault),
            }
            let expired;
            (st, expired) = self.wait(st, deadline);
            if expired {
                break Ok(());
            }
        };
        st.record(Some(h.erase()), result)
    }

    fn usrp_find(&self, args: &str, out: Raw<handle::StringVector>) -> Status {
        self.call(None, |st| {
            let filter: DeviceArgs = args.parse().map_err(|e| Fault::value(format!("{e}")))?;
            let found = st
                .devices
                .iter()
                .filter(|d| filter.is_subset_of(&d.args))
                .map(|d| d.args.to_string())
                .collect();
            *st.table.string_vector(out)? = found;
            Ok(())
        })
    }

    fn usrp_make(&self, out: Out<'_, handle::Usrp>, args: &str) -> Status {
        self.call(None, |st| {
            let filter: DeviceArgs = args.parse().map_err(|e| Fault::value(format!("{e}")))?;
            let device = st
                .devices
                .iter()
                .find(|d| filter.is_subset_of(&d.args))
                .cloned()
                .ok_or_else(|| {
                    Fault::key(format!(
                        "LookupError: KeyError: No devices found for ----->\nDevice Address:\n    {filter}"
                    ))
                })?;
            tracing::debug!("sim: opening device {}", device.serial());
            let id = st.next_session;
            st.next_session += 1;
            st.sessions.insert(id, Session::new(device));
            *out = Some(st.table.insert(Object::Usrp(id)));
            Ok(())
        })
    }

    fn usrp_get_rx_stream(
        &self,
        h: Raw<handle::Usrp>,
        args: &StreamArgs,
        out: Raw<handle::RxStreamer>,
    ) -> Status {
        self.call(Some(h.erase()), |st| {
            let id = st.table.session_id(h)?;
            let (format, channels) = bind_stream(st.session(h)?, Direction::Rx, args)?;
            let slot = st.table.rx_slot(out)?;
            let previous = slot.replace(RxStream::new(id, channels, format));
            st.acquire(id);
            if let Some(previous) = previous {
                st.release(previous.session);
            }
            Ok(())
        })
    }

    fn usrp_get_tx_stream(
        &self,
        h: Raw<handle::Usrp>,
        args: &StreamArgs,
        out: Raw<handle::TxStreamer>,
    ) -> Status {
        self.call(Some(h.erase()), |st| {
            let id = st.table.session_id(h)?;
            let (format, channels) = bind_stream(st.session(h)?, Direction::Tx, args)?;
            let slot = st.table.tx_slot(out)?;
            let previous = slot.replace(TxStream::new(id, channels, format));
            st.acquire(id);
            if let Some(previous) = previous {
                st.release(previous.session);
            }
            Ok(())
        })
    }

    fn usrp_info(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        chan: usize,
        out: &mut ChainInfo,
    ) -> Status {
        self.usrp_call(h, |s| {
            *out = s.info(dir, chan)?;
            Ok(())
        })
    }

    fn usrp_pp_string(&self, h: Raw<handle::Usrp>, buf: &mut [u8]) -> Status {
        self.usrp_call(h, |s| {
            write_c_str(buf, &s.pp_string());
            Ok(())
        })
    }

    fn usrp_mboard_name(&self, h: Raw<handle::Usrp>, mboard: usize, buf: &mut [u8]) -> Status {
        self.usrp_call(h, |s| {
            s.check_mboard(mboard, false)?;
            write_c_str(buf, &s.device.mboard_name);
            Ok(())
        })
    }

    fn usrp_num_mboards(&self, h: Raw<handle::Usrp>, out: &mut usize) -> Status {
        self.usrp_call(h, |_| {
            *out = 1;
            Ok(())
        })
    }

    fn usrp_set_master_clock_rate(&self, h: Raw<handle::Usrp>, rate: f64, mboard: usize) -> Status {
        self.usrp_call(h, |s| {
            s.check_mboard(mboard, true)?;
            if !(5e6..=61.44e6).contains(&rate) {
                return Err(Fault::value(format!(
                    "master clock rate {rate} outside [5e6, 61.44e6]"
                )));
            }
            s.master_clock_rate = rate;
            Ok(())
        })
    }

    fn usrp_master_clock_rate(&self, h: Raw<handle::Usrp>, mboard: usize, out: &mut f64) -> Status {
        self.usrp_call(h, |s| {
            s.check_mboard(mboard, false)?;
            *out = s.master_clock_rate;
            Ok(())
        })
    }

    fn usrp_time_now(&self, h: Raw<handle::Usrp>, mboard: usize, out: &mut TimeSpec) -> Status {
        self.usrp_call(h, |s| {
            s.check_mboard(mboard, false)?;
            *out = s.time;
            Ok(())
        })
    }

    fn usrp_time_last_pps(
        &self,
        h: Raw<handle::Usrp>,
        mboard: usize,
        out: &mut TimeSpec,
    ) -> Status {
        self.usrp_call(h, |s| {
            s.check_mboard(mboard, false)?;
            *out = s.last_pps;
            Ok(())
        })
    }

    fn usrp_set_time_now(&self, h: Raw<handle::Usrp>, time: TimeSpec, mboard: usize) -> Status {
        self.usrp_call(h, |s| {
            s.check_mboard(mboard, true)?;
            s.time = time;
            Ok(())
        })
    }

    fn usrp_set_time_next_pps(
        &self,
        h: Raw<handle::Usrp>,
        time: TimeSpec,
        mboard: usize,
    ) -> Status {
        // The simulated PPS edge arrives immediately.
        self.usrp_call(h, |s| {
            s.check_mboard(mboard, true)?;
            s.time = time;
            s.last_pps = time;
            Ok(())
        })
    }

    fn usrp_set_time_unknown_pps(&self, h: Raw<handle::Usrp>, time: TimeSpec) -> Status {
        self.usrp_call(h, |s| {
            s.time = time;
            s.last_pps = time;
            Ok(())
        })
    }

    fn usrp_time_synchronized(&self, h: Raw<handle::Usrp>, out: &mut bool) -> Status {
        self.usrp_call(h, |_| {
            *out = true;
            Ok(())
        })
    }

    fn usrp_set_command_time(&self, h: Raw<handle::Usrp>, time: TimeSpec, mboard: usize) -> Status {
        self.usrp_call(h, |s| {
            s.check_mboard(mboard, true)?;
            s.command_time = Some(time);
            Ok(())
        })
    }

    fn usrp_clear_command_time(&self, h: Raw<handle::Usrp>, mboard: usize) -> Status {
        self.usrp_call(h, |s| {
            s.check_mboard(mboard, true)?;
            s.command_time = None;
            Ok(())
        })
    }

    fn usrp_set_time_source(&self, h: Raw<handle::Usrp>, source: &str, mboard: usize) -> Status {
        self.usrp_call(h, |s| {
            s.check_mboard(mboard, true)?;
            if !device::TIME_SOURCES.contains(&source) {
                return Err(Fault::value(format!("Invalid time source: {source}")));
            }
            s.time_source = source.to_string();
            Ok(())
        })
    }

    fn usrp_time_source(&self, h: Raw<handle::Usrp>, mboard: usize, buf: &mut [u8]) -> Status {
        self.usrp_call(h, |s| {
            s.check_mboard(mboard, false)?;
            write_c_str(buf, &s.time_source);
            Ok(())
        })
    }

    fn usrp_time_sources(
        &self,
        h: Raw<handle::Usrp>,
        mboard: usize,
        out: Raw<handle::StringVector>,
    ) -> Status {
        self.usrp_list(h, out, |s| {
            s.check_mboard(mboard, false)?;
            Ok(device::TIME_SOURCES.map(String::from).to_vec())
        })
    }

    fn usrp_set_clock_source(&self, h: Raw<handle::Usrp>, source: &str, mboard: usize) -> Status {
        self.usrp_call(h, |s| {
            s.check_mboard(mboard, true)?;
            if !device::CLOCK_SOURCES.contains(&source) {
                return Err(Fault::value(format!("Invalid clock source: {source}")));
            }
            s.clock_source = source.to_string();
            Ok(())
        })
    }

    fn usrp_clock_source(&self, h: Raw<handle::Usrp>, mboard: usize, buf: &mut [u8]) -> Status {
        self.usrp_call(h, |s| {
            s.check_mboard(mboard, false)?;
            write_c_str(buf, &s.clock_source);
            Ok(())
        })
    }

    fn usrp_clock_sources(
        &self,
        h: Raw<handle::Usrp>,
        mboard: usize,
        out: Raw<handle::StringVector>,
    ) -> Status {
        self.usrp_list(h, out, |s| {
            s.check_mboard(mboard, false)?;
            Ok(device::CLOCK_SOURCES.map(String::from).to_vec())
        })
    }

    fn usrp_set_clock_source_out(
        &self,
        h: Raw<handle::Usrp>,
        enable: bool,
        mboard: usize,
    ) -> Status {
        self.usrp_call(h, |s| {
            s.check_mboard(mboard, true)?;
            s.clock_source_out = enable;
            Ok(())
        })
    }

    fn usrp_set_time_source_out(
        &self,
        h: Raw<handle::Usrp>,
        enable: bool,
        mboard: usize,
    ) -> Status {
        self.usrp_call(h, |s| {
            s.check_mboard(mboard, true)?;
            s.time_source_out = enable;
            Ok(())
        })
    }

    fn usrp_mboard_sensor(
        &self,
        h: Raw<handle::Usrp>,
        name: &str,
        mboard: usize,
        out: Raw<handle::SensorValue>,
    ) -> Status {
        self.usrp_sensor_into(h, name, out, |s| {
            s.check_mboard(mboard, false)?;
            Ok(s.mboard_sensors())
        })
    }

    fn usrp_mboard_sensor_names(
        &self,
        h: Raw<handle::Usrp>,
        mboard: usize,
        out: Raw<handle::StringVector>,
    ) -> Status {
        self.usrp_list(h, out, |s| {
            s.check_mboard(mboard, false)?;
            Ok(s.mboard_sensors().into_iter().map(|s| s.name).collect())
        })
    }

    fn usrp_set_user_register(
        &self,
        h: Raw<handle::Usrp>,
        addr: u8,
        data: u32,
        mboard: usize,
    ) -> Status {
        self.usrp_call(h, |s| {
            s.check_mboard(mboard, true)?;
            s.user_registers.insert(addr, data);
            Ok(())
        })
    }

    fn usrp_set_subdev_spec(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        spec: Raw<handle::SubdevSpec>,
        mboard: usize,
    ) -> Status {
        self.call(Some(h.erase()), |st| {
            let pairs = st.table.subdev_spec(spec)?.clone();
            let session = st.session(h)?;
            session.check_mboard(mboard, true)?;
            session.set_subdev(dir, &pairs)
        })
    }

    fn usrp_subdev_spec(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        mboard: usize,
        out: Raw<handle::SubdevSpec>,
    ) -> Status {
        self.call(Some(h.erase()), |st| {
            let session = st.session(h)?;
            session.check_mboard(mboard, false)?;
            let pairs = session.subdev_pairs(dir);
            *st.table.subdev_spec(out)? = pairs;
            Ok(())
        })
    }

    fn usrp_num_channels(&self, h: Raw<handle::Usrp>, dir: Direction, out: &mut usize) -> Status {
        self.usrp_call(h, |s| {
            *out = s.chains(dir).len();
            Ok(())
        })
    }

    fn usrp_subdev_name(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        chan: usize,
        buf: &mut [u8],
    ) -> Status {
        self.usrp_call(h, |s| {
            write_c_str(buf, &s.chain(dir, chan)?.subdev_name());
            Ok(())
        })
    }

    fn usrp_set_rate(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        rate: f64,
        chan: usize,
    ) -> Status {
        self.usrp_call(h, |s| {
            s.for_chains(dir, chan, |c| {
                c.set_rate(rate);
                Ok(())
            })
        })
    }

    fn usrp_rate(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        chan: usize,
        out: &mut f64,
    ) -> Status {
        self.usrp_call(h, |s| {
            *out = s.chain(dir, chan)?.rate;
            Ok(())
        })
    }

    fn usrp_rates(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<handle::MetaRange>,
    ) -> Status {
        self.usrp_range(h, out, |s| {
            s.chain(dir, chan)?;
            Ok(device::rate_range())
        })
    }

    fn usrp_set_freq(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        request: &TuneRequest,
        chan: usize,
        result: &mut TuneResult,
    ) -> Status {
        self.call(Some(h.erase()), |st| {
            *result = st.session(h)?.chain_mut(dir, chan)?.tune(request);
            st.last_tune = Some((dir, chan, request.clone()));
            Ok(())
        })
    }

    fn usrp_freq(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        chan: usize,
        out: &mut f64,
    ) -> Status {
        self.usrp_call(h, |s| {
            *out = s.chain(dir, chan)?.freq();
            Ok(())
        })
    }

    fn usrp_freq_range(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<handle::MetaRange>,
    ) -> Status {
        self.usrp_range(h, out, |s| Ok(s.chain(dir, chan)?.freq_range()))
    }

    fn usrp_fe_freq_range(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<handle::MetaRange>,
    ) -> Status {
        self.usrp_range(h, out, |s| {
            s.chain(dir, chan)?;
            Ok(device::fe_freq_range())
        })
    }

    fn usrp_lo_names(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<handle::StringVector>,
    ) -> Status {
        self.usrp_list(h, out, |s| {
            s.chain(dir, chan)?;
            Ok(vec![device::lo_name(dir).to_string()])
        })
    }

    fn usrp_set_lo_source(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        source: &str,
        name: &str,
        chan: usize,
    ) -> Status {
        self.usrp_call(h, |s| s.for_chains(dir, chan, |c| c.set_lo_source(source, name)))
    }

    fn usrp_lo_source(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        buf: &mut [u8],
    ) -> Status {
        self.usrp_call(h, |s| {
            let chain = s.chain(dir, chan)?;
            chain.check_lo(name)?;
            write_c_str(buf, &chain.lo_source);
            Ok(())
        })
    }

    fn usrp_lo_sources(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        out: Raw<handle::StringVector>,
    ) -> Status {
        self.usrp_list(h, out, |s| {
            s.chain(dir, chan)?.check_lo(name)?;
            Ok(device::LO_SOURCES.map(String::from).to_vec())
        })
    }

    fn usrp_set_lo_export_enabled(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        enabled: bool,
        name: &str,
        chan: usize,
    ) -> Status {
        self.usrp_call(h, |s| {
            s.for_chains(dir, chan, |c| {
                c.check_lo(name)?;
                c.lo_export = enabled;
                Ok(())
            })
        })
    }

    fn usrp_lo_export_enabled(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        out: &mut bool,
    ) -> Status {
        self.usrp_call(h, |s| {
            let chain = s.chain(dir, chan)?;
            chain.check_lo(name)?;
            *out = chain.lo_export;
            Ok(())
        })
    }

    fn usrp_set_lo_freq(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        freq: f64,
        name: &str,
        chan: usize,
        coerced: &mut f64,
    ) -> Status {
        self.usrp_call(h, |s| {
            *coerced = s.chain_mut(dir, chan)?.set_lo_freq(freq, name)?;
            Ok(())
        })
    }

    fn usrp_lo_freq(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        out: &mut f64,
    ) -> Status {
        self.usrp_call(h, |s| {
            let chain = s.chain(dir, chan)?;
            chain.check_lo(name)?;
            *out = chain.rf_freq;
            Ok(())
        })
    }

    fn usrp_set_gain(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        gain: f64,
        chan: usize,
        name: &str,
    ) -> Status {
        self.usrp_call(h, |s| s.for_chains(dir, chan, |c| c.set_gain(name, gain)))
    }

    fn usrp_set_normalized_gain(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        gain: f64,
        chan: usize,
    ) -> Status {
        self.usrp_call(h, |s| s.for_chains(dir, chan, |c| c.set_normalized_gain(gain)))
    }

    fn usrp_gain(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        chan: usize,
        name: &str,
        out: &mut f64,
    ) -> Status {
        self.usrp_call(h, |s| {
            *out = s.chain(dir, chan)?.gain(name)?;
            Ok(())
        })
    }

    fn usrp_normalized_gain(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        chan: usize,
        out: &mut f64,
    ) -> Status {
        self.usrp_call(h, |s| {
            *out = s.chain(dir, chan)?.normalized_gain();
            Ok(())
        })
    }

    fn usrp_gain_range(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        out: Raw<handle::MetaRange>,
    ) -> Status {
        self.usrp_range(h, out, |s| {
            s.chain(dir, chan)?.gain(name)?;
            Ok(device::gain_range(dir))
        })
    }

    fn usrp_gain_names(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<handle::StringVector>,
    ) -> Status {
        self.usrp_list(h, out, |s| Ok(s.chain(dir, chan)?.gains.keys().cloned().collect()))
    }

    fn usrp_set_antenna(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        antenna: &str,
        chan: usize,
    ) -> Status {
        self.usrp_call(h, |s| s.for_chains(dir, chan, |c| c.set_antenna(antenna)))
    }

    fn usrp_antenna(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        chan: usize,
        buf: &mut [u8],
    ) -> Status {
        self.usrp_call(h, |s| {
            write_c_str(buf, &s.chain(dir, chan)?.antenna);
            Ok(())
        })
    }

    fn usrp_antennas(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<handle::StringVector>,
    ) -> Status {
        self.usrp_list(h, out, |s| {
            s.chain(dir, chan)?;
            Ok(device::antennas(dir).iter().map(|a| a.to_string()).collect())
        })
    }

    fn usrp_set_bandwidth(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        bandwidth: f64,
        chan: usize,
    ) -> Status {
        self.usrp_call(h, |s| {
            s.for_chains(dir, chan, |c| {
                c.set_bandwidth(bandwidth);
                Ok(())
            })
        })
    }

    fn usrp_bandwidth(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        chan: usize,
        out: &mut f64,
    ) -> Status {
        self.usrp_call(h, |s| {
            *out = s.chain(dir, chan)?.bandwidth;
            Ok(())
        })
    }

    fn usrp_bandwidth_range(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<handle::MetaRange>,
    ) -> Status {
        self.usrp_range(h, out, |s| {
            s.chain(dir, chan)?;
            Ok(device::bandwidth_range())
        })
    }

    fn usrp_sensor(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        out: Raw<handle::SensorValue>,
    ) -> Status {
        self.usrp_sensor_into(h, name, out, |s| s.chain_sensors(dir, chan))
    }

    fn usrp_sensor_names(
        &self,
        h: Raw<handle::Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<handle::StringVector>,
    ) -> Status {
        self.usrp_list(h, out, |s| {
            Ok(s.chain_sensors(dir, chan)?.into_iter().map(|s| s.name).collect())
        })
    }

    fn usrp_set_rx_agc(&self, h: Raw<handle::Usrp>, enable: bool, chan: usize) -> Status {
        self.usrp_call(h, |s| {
            s.for_chains(Direction::Rx, chan, |c| {
                c.agc = enable;
                Ok(())
            })
        })
    }

    fn usrp_set_rx_dc_offset_enabled(
        &self,
        h: Raw<handle::Usrp>,
        enable: bool,
        chan: usize,
    ) -> Status {
        self.usrp_call(h, |s| {
            s.for_chains(Direction::Rx, chan, |c| {
                c.dc_offset = enable;
                Ok(())
            })
        })
    }

    fn usrp_set_rx_iq_balance_enabled(
        &self,
        h: Raw<handle::Usrp>,
        enable: bool,
        chan: usize,
    ) -> Status {
        self.usrp_call(h, |s| {
            s.for_chains(Direction::Rx, chan, |c| {
                c.iq_balance = enable;
                Ok(())
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::read_c_str;

    fn open(sim: &SimDriver) -> Raw<handle::Usrp> {
        let mut usrp = None;
        assert_eq!(sim.usrp_make(&mut usrp, ""), Status::None);
        usrp.unwrap()
    }

    #[test]
    fn test_make_and_free_track_handles() {
        let sim = SimDriver::new();
        let mut md = None;
        assert_eq!(sim.rx_metadata_make(&mut md), Status::None);
        assert_eq!(sim.live_handles(), 1);
        let md = md.unwrap();
        assert_eq!(sim.free(md.erase()), Status::None);
        assert_eq!(sim.live_handles(), 0);
        assert_eq!(sim.free(md.erase()), Status::InvalidDevice);
    }

    #[test]
    fn test_make_without_match_sets_last_error() {
        let sim = SimDriver::new();
        let mut usrp = None;
        assert_eq!(sim.usrp_make(&mut usrp, "serial=nope"), Status::Key);
        assert!(usrp.is_none());
        let mut buf = [0u8; 256];
        sim.last_error(&mut buf);
        let msg = String::from_utf8_lossy(read_c_str(&buf)).to_string();
        assert!(msg.contains("No devices found"), "{msg}");
    }

    #[test]
    fn test_find_failure_sets_last_error() {
        let sim = SimDriver::new();
        let mut list = None;
        sim.string_vector_make(&mut list);
        let list = list.unwrap();
        assert_eq!(sim.usrp_find("serial", list), Status::Value);
        let mut buf = [0u8; 256];
        sim.last_error(&mut buf);
        assert!(read_c_str(&buf).starts_with(b"missing '='"));
        sim.handle_last_error(list.erase(), &mut buf);
        assert!(read_c_str(&buf).is_empty());
    }

    #[test]
    fn test_injected_send_faults_run_out() {
        let sim = SimDriver::new();
        let usrp = open(&sim);
        let (mut tx, mut md) = (None, None);
        sim.tx_streamer_make(&mut tx);
        sim.tx_metadata_make(&mut md, false, TimeSpec::default(), true, true);
        let (tx, md) = (tx.unwrap(), md.unwrap());
        assert_eq!(sim.usrp_get_tx_stream(usrp, &StreamArgs::new("fc32", ""), tx), Status::None);

        sim.inject_send_fault(1);
        let samples = [0u8; 64];
        let mut sent = 0;
        assert_eq!(sim.tx_streamer_send(tx, &[&samples[..]], 8, md, 0.1, &mut sent), Status::Io);
        let mut buf = [0u8; 256];
        sim.handle_last_error(tx.erase(), &mut buf);
        assert!(read_c_str(&buf).starts_with(b"send: transport error"));
        assert_eq!(sim.tx_streamer_send(tx, &[&samples[..]], 8, md, 0.1, &mut sent), Status::None);
        assert_eq!(sent, 8);
    }

    #[test]
    fn test_errors_are_scoped_to_handle() {
        let sim = SimDriver::new();
        let usrp = open(&sim);
        assert_eq!(
            sim.usrp_set_antenna(usrp, Direction::Rx, "NOPE", 0),
            Status::Value
        );
        let mut buf = [0u8; 256];
        assert_eq!(sim.handle_last_error(usrp.erase(), &mut buf), Status::None);
        assert!(read_c_str(&buf).starts_with(b"Invalid RX antenna"));

        assert_eq!(sim.usrp_set_antenna(usrp, Direction::Rx, "TX/RX", 0), Status::None);
        sim.handle_last_error(usrp.erase(), &mut buf);
        assert!(read_c_str(&buf).is_empty());
    }

    #[test]
    fn test_wrong_kind_is_invalid() {
        let sim = SimDriver::new();
        let mut sv = None;
        sim.string_vector_make(&mut sv);
        let sv = sv.unwrap();
        let forged = Raw::<handle::MetaRange>::from_value(NonZeroUsize::new(sv.value()).unwrap());
        let mut n = 0;
        assert_eq!(sim.meta_range_size(forged, &mut n), Status::InvalidDevice);
    }

    #[test]
    fn test_streamer_keeps_session_alive() {
        let sim = SimDriver::new();
        let usrp = open(&sim);
        let mut rx = None;
        sim.rx_streamer_make(&mut rx);
        let rx = rx.unwrap();
        let args = StreamArgs::new("fc32", "sc16");
        assert_eq!(sim.usrp_get_rx_stream(usrp, &args, rx), Status::None);

        sim.free(usrp.erase());
        assert_eq!(sim.open_sessions(), 1);
        let mut n = 0;
        assert_eq!(sim.rx_streamer_num_channels(rx, &mut n), Status::None);
        assert_eq!(n, 1);
        sim.free(rx.erase());
        assert_eq!(sim.open_sessions(), 0);
    }

    #[test]
    fn test_unbound_streamer_fails() {
        let sim = SimDriver::new();
        let mut tx = None;
        sim.tx_streamer_make(&mut tx);
        let mut n = 0;
        assert_eq!(sim.tx_streamer_num_channels(tx.unwrap(), &mut n), Status::Runtime);
    }

    #[test]
    fn test_bind_rejects_unknown_format() {
        let sim = SimDriver::new();
        let usrp = open(&sim);
        let mut rx = None;
        sim.rx_streamer_make(&mut rx);
        let args = StreamArgs::new("s24", "");
        assert_eq!(sim.usrp_get_rx_stream(usrp, &args, rx.unwrap()), Status::Lookup);
        let args = StreamArgs::new("fc32", "").channels([5]);
        assert_eq!(sim.usrp_get_rx_stream(usrp, &args, rx.unwrap()), Status::Index);
    }
}
