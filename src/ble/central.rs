//! BLE central state machine.
//!
//! ```text
//! Idle → Initializing → Scanning → Connecting → DiscoveringCharacteristics → Ready
//!                          ↑______________ link terminated ______________________|
//! any ──hardware error──→ Error (absorbing)
//! ```
//!
//! If the stack refuses to start a scan, the central drops to `Idle` and
//! tries again on the next [`CentralEvent::ScanRetry`] or scan-ended event.
//!
//! All connection state lives inside one [`Central`] value behind a
//! blocking mutex. Stack callbacks feed it through [`Central::handle_event`];
//! application tasks use [`Central::read`], [`Central::write`] and
//! [`Central::state`]. Listeners are called after the lock is released so
//! they may freely call back into the central.

use core::cell::RefCell;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use embassy_sync::signal::Signal;
use embedded_hal_async::delay::DelayNs;

use super::adv_parser::{extract_local_name, name_matches};
use super::profile::{decode_i16, encode_i16, CharId, CharValue};
use super::stack::{
    AdvReport, BleStack, ConnHandle, CentralEvent, ScanFilter, ATT_HANDLE_MAX, ATT_HANDLE_MIN,
    HCI_SUCCESS,
};
use crate::config::CentralConfig;
use crate::error::Error;
use crate::event::EventHandler;

/// Connection state of the central.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Idle,
    Initializing,
    Scanning,
    Connecting,
    DiscoveringCharacteristics,
    Ready,
    Error,
}

/// Receives central notifications. Called outside the central's lock.
pub trait CentralListener {
    fn state_changed(&self, state: ConnectionState);
    fn value_notified(&self, id: CharId, value: &[u8]);
}

impl CentralListener for () {
    fn state_changed(&self, _state: ConnectionState) {}
    fn value_notified(&self, _id: CharId, _value: &[u8]) {}
}

impl<T: CentralListener + ?Sized> CentralListener for &T {
    fn state_changed(&self, state: ConnectionState) {
        (**self).state_changed(state)
    }
    fn value_notified(&self, id: CharId, value: &[u8]) {
        (**self).value_notified(id, value)
    }
}

/// Remote value handle of each characteristic.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HandleTable([Option<u16>; CharId::COUNT]);

impl HandleTable {
    pub fn get(&self, id: CharId) -> Option<u16> {
        self.0[id.index()]
    }

    pub fn set(&mut self, id: CharId, handle: u16) {
        self.0[id.index()] = Some(handle);
    }

    /// Characteristic owning `handle`.
    pub fn find(&self, handle: u16) -> Option<CharId> {
        CharId::ALL.into_iter().find(|id| self.get(*id) == Some(handle))
    }

    pub fn is_complete(&self) -> bool {
        self.0.iter().all(Option::is_some)
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    pub fn clear(&mut self) {
        self.0 = [None; CharId::COUNT];
    }
}

/// Completion of an outstanding read.
#[derive(Debug, Clone)]
struct ReadResponse {
    handle: u16,
    result: Result<CharValue, Error>,
}

/// Side effects of a transition that must run after the lock is dropped.
#[derive(Default)]
struct Outcome {
    notified: Option<(CharId, CharValue)>,
    aborted_read: Option<u16>,
}

struct Link<S> {
    stack: S,
    state: ConnectionState,
    conn: Option<ConnHandle>,
    handles: HandleTable,
    discovery_retries: u8,
    pending_read: Option<u16>,
    scanning_enabled: bool,
    /// The last scan start was refused; the central waits in `Idle`.
    rescan_pending: bool,
}

impl<S: BleStack> Link<S> {
    fn step(&mut self, event: CentralEvent, config: &CentralConfig) -> Outcome {
        use ConnectionState::{
            Connecting, DiscoveringCharacteristics, Idle, Initializing, Ready, Scanning,
        };

        let mut outcome = Outcome::default();

        if self.state == ConnectionState::Error {
            trace!("central in error state, ignoring event");
            return outcome;
        }

        match (self.state, event) {
            (_, CentralEvent::HardwareError) => {
                error!("BLE hardware error");
                self.state = ConnectionState::Error;
            }

            (Initializing, CentralEvent::InitDone { success: true }) => {
                info!("central initialised");
                self.scanning_enabled = true;
                if let Err(e) = self.stack.configure_scan(&ScanFilter::PEER_SEARCH) {
                    warn!("scan filter setup failed: {}", e);
                }
                self.begin_scan(config);
            }

            (Initializing, CentralEvent::InitDone { success: false }) => {
                warn!("central init reported failure");
            }

            (Scanning, CentralEvent::AdvReport(report)) => self.on_adv_report(report, config),

            (Scanning, CentralEvent::ScanDurationEnded) => {
                if config.scan_period > 0 {
                    self.state = Idle;
                } else {
                    debug!("scan window ended, restarting");
                    self.begin_scan(config);
                }
            }

            (
                Idle,
                CentralEvent::ScanRetry
                | CentralEvent::ScanDurationEnded
                | CentralEvent::ScanPeriodEnded,
            ) if self.rescan_pending => self.begin_scan(config),

            (Idle, CentralEvent::ScanPeriodEnded) if self.scanning_enabled => {
                self.state = Scanning;
            }

            (Connecting, CentralEvent::LinkEstablished { status, conn, peer }) => {
                if status == HCI_SUCCESS {
                    info!("connected to {}, handle {}", peer, conn);
                    self.conn = Some(conn);
                    self.handles.clear();
                    self.discovery_retries = 0;
                    self.state = DiscoveringCharacteristics;
                    self.discover();
                } else {
                    warn!("connect failed, status {}", status);
                    self.begin_scan(config);
                }
            }

            (DiscoveringCharacteristics, CentralEvent::CharDiscovered { uuid, handle }) => {
                match CharId::from_uuid(uuid) {
                    Some(id) => {
                        debug!("found {} at handle {}", id, handle);
                        self.handles.set(id, handle);
                        if self.handles.is_complete() {
                            self.enter_ready();
                        }
                    }
                    None => trace!("ignoring characteristic {=u16:#x}", uuid),
                }
            }

            (
                DiscoveringCharacteristics,
                CentralEvent::DiscoveryComplete | CentralEvent::DiscoveryTimeout,
            ) => {
                if self.discovery_retries < config.max_discovery_retries {
                    self.discovery_retries += 1;
                    warn!("discovery incomplete, retry {}", self.discovery_retries);
                    self.discover();
                } else if let Some(conn) = self.conn {
                    warn!("discovery failed, dropping link");
                    if let Err(e) = self.stack.disconnect(conn) {
                        error!("disconnect request failed: {}", e);
                    }
                }
            }

            (_, CentralEvent::LinkTerminated { conn, reason }) if self.conn == Some(conn) => {
                info!("link {} terminated, reason {=u8:#x}", conn, reason);
                self.conn = None;
                self.handles.clear();
                outcome.aborted_read = self.pending_read.take();
                self.begin_scan(config);
            }

            (Ready, CentralEvent::CharNotified { handle, value }) => {
                match self.handles.find(handle) {
                    Some(id) => outcome.notified = Some((id, value)),
                    None => trace!("notification for unknown handle {}", handle),
                }
            }

            (state, _) => trace!("event not handled in {}", state),
        }

        outcome
    }

    fn on_adv_report(&mut self, report: AdvReport, config: &CentralConfig) {
        let Some(name) = extract_local_name(&report.data) else {
            return;
        };
        if !name_matches(&name, config.peer_name, config.name_match) {
            trace!("skipping {=str}", name.as_str());
            return;
        }

        info!("found {=str} ({} dBm)", name.as_str(), report.rssi);
        if let Err(e) = self.stack.stop_scan() {
            warn!("stop scan failed: {}", e);
        }
        match self.stack.connect(report.address) {
            Ok(()) => self.state = ConnectionState::Connecting,
            Err(e) => {
                warn!("connect request rejected: {}", e);
                self.begin_scan(config);
            }
        }
    }

    fn begin_scan(&mut self, config: &CentralConfig) {
        match self.stack.start_scan(config.scan_duration, config.scan_period) {
            Ok(()) => {
                self.rescan_pending = false;
                self.state = ConnectionState::Scanning;
            }
            Err(e) => {
                warn!("scan start failed: {}, retrying", e);
                self.rescan_pending = true;
                self.state = ConnectionState::Idle;
            }
        }
    }

    fn discover(&mut self) {
        let Some(conn) = self.conn else { return };
        if let Err(e) = self
            .stack
            .discover_characteristics(conn, ATT_HANDLE_MIN, ATT_HANDLE_MAX)
        {
            warn!("discovery request failed: {}", e);
        }
    }

    fn enter_ready(&mut self) {
        self.state = ConnectionState::Ready;
        info!("central ready");

        let Some(conn) = self.conn else { return };
        for id in [CharId::Speed, CharId::Turn] {
            if let Some(handle) = self.handles.get(id) {
                if let Err(e) = self.stack.enable_notifications(conn, handle) {
                    warn!("enable notifications for {} failed: {}", id, e);
                }
            }
        }
    }

    /// Connection and handle for `id`, provided the link is ready.
    fn ready_handle(&self, id: CharId) -> Result<(ConnHandle, u16), Error> {
        if self.state == ConnectionState::Error {
            return Err(Error::HardwareFault);
        }
        if self.state != ConnectionState::Ready {
            return Err(Error::NotReady);
        }
        match (self.conn, self.handles.get(id)) {
            (Some(conn), Some(handle)) => Ok((conn, handle)),
            _ => Err(Error::NotReady),
        }
    }
}

/// The BLE central: connection state machine plus read/write access to
/// the barebot profile once connected.
pub struct Central<M: RawMutex, S: BleStack, L: CentralListener> {
    link: Mutex<M, RefCell<Link<S>>>,
    listener: L,
    config: CentralConfig,
    reads: AsyncMutex<M, ()>,
    read_done: Signal<M, ReadResponse>,
}

impl<M: RawMutex, S: BleStack, L: CentralListener> Central<M, S, L> {
    pub fn new(stack: S, listener: L, config: CentralConfig) -> Self {
        Self {
            link: Mutex::new(RefCell::new(Link {
                stack,
                state: ConnectionState::Idle,
                conn: None,
                handles: HandleTable::default(),
                discovery_retries: 0,
                pending_read: None,
                scanning_enabled: false,
                rescan_pending: false,
            })),
            listener,
            config,
            reads: AsyncMutex::new(()),
            read_done: Signal::new(),
        }
    }

    /// `Idle → Initializing`: ask the stack to bring up the central role.
    pub fn start(&self) -> Result<(), Error> {
        let (before, after, result) = self.transition(|link, _| {
            if link.state != ConnectionState::Idle || link.scanning_enabled {
                return Err(Error::NotReady);
            }
            link.stack.init_central()?;
            link.state = ConnectionState::Initializing;
            Ok(())
        });
        self.publish_state(before, after);
        result
    }

    /// Feed one stack event through the state machine. Returns the new state.
    pub fn handle_event(&self, event: CentralEvent) -> ConnectionState {
        let (before, after, outcome) = self.transition(|link, config| link.step(event, config));

        if let Some(handle) = outcome.aborted_read {
            self.read_done.signal(ReadResponse {
                handle,
                result: Err(Error::Disconnected),
            });
        }
        self.publish_state(before, after);
        if let Some((id, value)) = outcome.notified {
            self.listener.value_notified(id, &value);
        }
        after
    }

    pub fn state(&self) -> ConnectionState {
        self.link.lock(|link| link.borrow().state)
    }

    /// Handle of `id` on the current link, if discovered.
    pub fn handle(&self, id: CharId) -> Option<u16> {
        self.link.lock(|link| link.borrow().handles.get(id))
    }

    pub fn handles(&self) -> HandleTable {
        self.link.lock(|link| link.borrow().handles)
    }

    /// Whether a refused scan start is waiting for [`CentralEvent::ScanRetry`].
    pub fn rescan_pending(&self) -> bool {
        self.link.lock(|link| link.borrow().rescan_pending)
    }

    pub fn conn(&self) -> Option<ConnHandle> {
        self.link.lock(|link| link.borrow().conn)
    }

    pub fn config(&self) -> &CentralConfig {
        &self.config
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    /// Read `id` from the peer and wait for the response.
    ///
    /// Reads are serialised; a second caller waits for the first to finish.
    /// `delay` bounds the wait when `read_timeout_ms` is configured.
    pub async fn read<D: DelayNs>(&self, id: CharId, delay: &mut D) -> Result<CharValue, Error> {
        let _serial = self.reads.lock().await;

        self.read_done.reset();
        let handle = self.link.lock(|link| {
            let mut link = link.borrow_mut();
            let (conn, handle) = link.ready_handle(id)?;
            link.stack.read(conn, handle)?;
            link.pending_read = Some(handle);
            Ok::<_, Error>(handle)
        })?;

        let completion = async {
            loop {
                let response = self.read_done.wait().await;
                if response.handle == handle {
                    return response.result;
                }
                debug!("dropping read response for handle {}", response.handle);
            }
        };

        let result = match self.config.read_timeout_ms {
            None => completion.await,
            Some(ms) => match select(completion, delay.delay_ms(ms)).await {
                Either::First(result) => result,
                Either::Second(()) => {
                    warn!("read of {} timed out", id);
                    Err(Error::NoResponse)
                }
            },
        };

        self.link.lock(|link| link.borrow_mut().pending_read = None);
        result
    }

    /// Read `id` and decode it as an `i16`.
    pub async fn read_i16<D: DelayNs>(&self, id: CharId, delay: &mut D) -> Result<i16, Error> {
        let value = self.read(id, delay).await?;
        decode_i16(&value).ok_or(Error::InvalidValueSize)
    }

    /// Write `value` to `id` without waiting for the peer.
    pub fn write(&self, id: CharId, value: &[u8]) -> Result<(), Error> {
        if value.len() != id.value_len() {
            return Err(Error::InvalidValueSize);
        }
        self.link.lock(|link| {
            let mut link = link.borrow_mut();
            let (conn, handle) = link.ready_handle(id)?;
            link.stack.write(conn, handle, value)?;
            Ok(())
        })
    }

    /// Send a signed delta to an update characteristic.
    pub fn write_delta(&self, id: CharId, delta: i16) -> Result<(), Error> {
        self.write(id, &encode_i16(delta))
    }

    /// Read response from the stack's callback context.
    ///
    /// Responses that don't match the outstanding read are dropped.
    pub fn on_read_response(&self, handle: u16, data: &[u8]) {
        let result = CharValue::from_slice(data).map_err(|_| Error::BufferOverflow);
        self.complete_read(handle, result);
    }

    /// Read failure (ATT error code) from the stack's callback context.
    pub fn on_read_error(&self, handle: u16, att_code: u8) {
        self.complete_read(handle, Err(Error::ReadFailed(att_code)));
    }

    fn complete_read(&self, handle: u16, result: Result<CharValue, Error>) {
        let expected = self.link.lock(|link| link.borrow().pending_read);
        if expected != Some(handle) {
            debug!("unexpected read response for handle {}", handle);
            return;
        }
        self.read_done.signal(ReadResponse { handle, result });
    }

    fn transition<R>(
        &self,
        f: impl FnOnce(&mut Link<S>, &CentralConfig) -> R,
    ) -> (ConnectionState, ConnectionState, R) {
        self.link.lock(|link| {
            let mut link = link.borrow_mut();
            let before = link.state;
            let result = f(&mut link, &self.config);
            (before, link.state, result)
        })
    }

    fn publish_state(&self, before: ConnectionState, after: ConnectionState) {
        if before != after {
            debug!("central {} -> {}", before, after);
            self.listener.state_changed(after);
        }
    }
}

/// Lets the central's own task run it from an event queue.
impl<M: RawMutex, S: BleStack, L: CentralListener> EventHandler<CentralEvent> for &Central<M, S, L> {
    async fn handle(&mut self, event: CentralEvent) {
        self.handle_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::profile::*;
    use crate::ble::stack::BdAddr;
    use crate::error::StackError;
    use core::cell::{Cell, RefCell};
    use embassy_futures::{block_on, join::join, yield_now};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Req {
        Init,
        ConfigureScan(ScanFilter),
        StartScan,
        StopScan,
        Connect(BdAddr),
        Disconnect(ConnHandle),
        Discover,
        Read(u16),
        Write(u16, Vec<u8>),
        EnableNotify(u16),
    }

    #[derive(Clone, Default)]
    struct FakeStack {
        log: Rc<RefCell<Vec<Req>>>,
        reject_connect: bool,
        refuse_scan: Rc<Cell<bool>>,
    }

    impl BleStack for FakeStack {
        fn init_central(&mut self) -> Result<(), StackError> {
            self.log.borrow_mut().push(Req::Init);
            Ok(())
        }
        fn configure_scan(&mut self, filter: &ScanFilter) -> Result<(), StackError> {
            self.log.borrow_mut().push(Req::ConfigureScan(*filter));
            Ok(())
        }
        fn start_scan(&mut self, _duration: u16, _period: u16) -> Result<(), StackError> {
            if self.refuse_scan.get() {
                return Err(StackError::Busy);
            }
            self.log.borrow_mut().push(Req::StartScan);
            Ok(())
        }
        fn stop_scan(&mut self) -> Result<(), StackError> {
            self.log.borrow_mut().push(Req::StopScan);
            Ok(())
        }
        fn connect(&mut self, peer: BdAddr) -> Result<(), StackError> {
            if self.reject_connect {
                return Err(StackError::Busy);
            }
            self.log.borrow_mut().push(Req::Connect(peer));
            Ok(())
        }
        fn disconnect(&mut self, conn: ConnHandle) -> Result<(), StackError> {
            self.log.borrow_mut().push(Req::Disconnect(conn));
            Ok(())
        }
        fn discover_characteristics(
            &mut self,
            _conn: ConnHandle,
            _start: u16,
            _end: u16,
        ) -> Result<(), StackError> {
            self.log.borrow_mut().push(Req::Discover);
            Ok(())
        }
        fn read(&mut self, _conn: ConnHandle, handle: u16) -> Result<(), StackError> {
            self.log.borrow_mut().push(Req::Read(handle));
            Ok(())
        }
        fn write(&mut self, _conn: ConnHandle, handle: u16, value: &[u8]) -> Result<(), StackError> {
            self.log.borrow_mut().push(Req::Write(handle, value.to_vec()));
            Ok(())
        }
        fn enable_notifications(&mut self, _conn: ConnHandle, handle: u16) -> Result<(), StackError> {
            self.log.borrow_mut().push(Req::EnableNotify(handle));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        states: RefCell<Vec<ConnectionState>>,
        values: RefCell<Vec<(CharId, Vec<u8>)>>,
    }

    impl CentralListener for Recorder {
        fn state_changed(&self, state: ConnectionState) {
            self.states.borrow_mut().push(state);
        }
        fn value_notified(&self, id: CharId, value: &[u8]) {
            self.values.borrow_mut().push((id, value.to_vec()));
        }
    }

    /// Delay that never elapses.
    struct Forever;

    impl DelayNs for Forever {
        async fn delay_ns(&mut self, _ns: u32) {
            core::future::pending::<()>().await
        }
    }

    /// Delay that elapses immediately, counting how often it was used.
    #[derive(Default)]
    struct Instant(Cell<u32>);

    impl DelayNs for Instant {
        async fn delay_ns(&mut self, _ns: u32) {
            self.0.set(self.0.get() + 1);
        }
    }

    type TestCentral = Central<NoopRawMutex, FakeStack, Recorder>;

    const PEER: BdAddr = BdAddr {
        addr_type: 1,
        bytes: [1, 2, 3, 4, 5, 6],
    };
    const CONN: ConnHandle = 7;

    fn handle_of(id: CharId) -> u16 {
        0x10 + 2 * id.index() as u16
    }

    fn adv_named(name: &str) -> CentralEvent {
        let mut data = heapless::Vec::new();
        data.extend_from_slice(&[0x02, 0x01, 0x06]).unwrap();
        data.push(name.len() as u8 + 1).unwrap();
        data.push(0x09).unwrap();
        data.extend_from_slice(name.as_bytes()).unwrap();
        CentralEvent::AdvReport(AdvReport {
            address: PEER,
            rssi: -60,
            data,
        })
    }

    fn central_with(config: CentralConfig) -> (TestCentral, Rc<RefCell<Vec<Req>>>) {
        let stack = FakeStack::default();
        let log = stack.log.clone();
        (Central::new(stack, Recorder::default(), config), log)
    }

    fn scanning_central() -> (TestCentral, Rc<RefCell<Vec<Req>>>) {
        let (central, log) = central_with(CentralConfig::default());
        central.start().unwrap();
        central.handle_event(CentralEvent::InitDone { success: true });
        assert_eq!(central.state(), ConnectionState::Scanning);
        (central, log)
    }

    fn discovering_central() -> (TestCentral, Rc<RefCell<Vec<Req>>>) {
        let (central, log) = scanning_central();
        central.handle_event(adv_named("BP"));
        central.handle_event(CentralEvent::LinkEstablished {
            status: HCI_SUCCESS,
            conn: CONN,
            peer: PEER,
        });
        assert_eq!(central.state(), ConnectionState::DiscoveringCharacteristics);
        (central, log)
    }

    fn ready_central() -> (TestCentral, Rc<RefCell<Vec<Req>>>) {
        let (central, log) = discovering_central();
        for id in CharId::ALL {
            central.handle_event(CentralEvent::CharDiscovered {
                uuid: id.uuid(),
                handle: handle_of(id),
            });
        }
        assert_eq!(central.state(), ConnectionState::Ready);
        log.borrow_mut().clear();
        (central, log)
    }

    fn value(bytes: &[u8]) -> CharValue {
        CharValue::from_slice(bytes).unwrap()
    }

    // ════════════════════════════════════════════════════════════════════════
    // Connection lifecycle
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn starts_idle() {
        let (central, log) = central_with(CentralConfig::default());
        assert_eq!(central.state(), ConnectionState::Idle);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn runs_from_event_queue() {
        use crate::event::{EventBridge, EventLoop};

        let (central, _) = central_with(CentralConfig::default());
        central.start().unwrap();
        let queue: EventBridge<NoopRawMutex, CentralEvent, 4> = EventBridge::new();
        queue.post(CentralEvent::InitDone { success: true }).unwrap();
        queue.post(adv_named("BP")).unwrap();

        let mut handler = &central;
        assert_eq!(block_on(EventLoop::new(&queue).drain(&mut handler)), 2);
        assert_eq!(central.state(), ConnectionState::Connecting);
    }

    #[test]
    fn init_then_scan_with_filters() {
        let (central, log) = scanning_central();
        assert_eq!(
            *log.borrow(),
            vec![
                Req::Init,
                Req::ConfigureScan(ScanFilter::PEER_SEARCH),
                Req::StartScan
            ]
        );
        assert_eq!(
            *central.listener().states.borrow(),
            vec![ConnectionState::Initializing, ConnectionState::Scanning]
        );
    }

    #[test]
    fn start_twice_is_rejected() {
        let (central, _) = central_with(CentralConfig::default());
        central.start().unwrap();
        assert_eq!(central.start(), Err(Error::NotReady));
    }

    #[test]
    fn failed_init_is_ignored() {
        let (central, _) = central_with(CentralConfig::default());
        central.start().unwrap();
        central.handle_event(CentralEvent::InitDone { success: false });
        assert_eq!(central.state(), ConnectionState::Initializing);
    }

    #[test]
    fn matching_name_connects() {
        let (central, log) = scanning_central();
        log.borrow_mut().clear();
        assert_eq!(central.handle_event(adv_named("BP")), ConnectionState::Connecting);
        assert_eq!(*log.borrow(), vec![Req::StopScan, Req::Connect(PEER)]);
    }

    #[test]
    fn other_names_keep_scanning() {
        let (central, log) = scanning_central();
        log.borrow_mut().clear();
        for name in ["BPX", "B", "robot", ""] {
            assert_eq!(central.handle_event(adv_named(name)), ConnectionState::Scanning);
        }
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn prefix_match_accepts_longer_names() {
        let config = CentralConfig {
            name_match: crate::ble::adv_parser::NameMatch::Prefix,
            ..CentralConfig::default()
        };
        let (central, _) = central_with(config);
        central.start().unwrap();
        central.handle_event(CentralEvent::InitDone { success: true });
        assert_eq!(central.handle_event(adv_named("BP-7")), ConnectionState::Connecting);
    }

    #[test]
    fn rejected_connect_keeps_scanning() {
        let mut stack = FakeStack::default();
        stack.reject_connect = true;
        let central: TestCentral = Central::new(stack, Recorder::default(), CentralConfig::default());
        central.start().unwrap();
        central.handle_event(CentralEvent::InitDone { success: true });
        assert_eq!(central.handle_event(adv_named("BP")), ConnectionState::Scanning);
    }

    #[test]
    fn failed_link_returns_to_scanning() {
        let (central, log) = scanning_central();
        central.handle_event(adv_named("BP"));
        log.borrow_mut().clear();
        let state = central.handle_event(CentralEvent::LinkEstablished {
            status: 0x3E,
            conn: CONN,
            peer: PEER,
        });
        assert_eq!(state, ConnectionState::Scanning);
        assert_eq!(*log.borrow(), vec![Req::StartScan]);
        assert_eq!(central.conn(), None);
    }

    fn refuse_scans(central: &TestCentral) -> Rc<Cell<bool>> {
        let refuse = central.link.lock(|link| link.borrow().stack.refuse_scan.clone());
        refuse.set(true);
        refuse
    }

    #[test]
    fn refused_rescan_after_link_loss_waits_in_idle() {
        let (central, log) = ready_central();
        let refuse = refuse_scans(&central);

        central.handle_event(CentralEvent::LinkTerminated {
            conn: CONN,
            reason: 0x13,
        });
        assert_eq!(central.state(), ConnectionState::Idle);
        assert!(central.rescan_pending());
        assert!(central.handles().is_empty());
        assert_eq!(central.conn(), None);

        // Still refused: stay put.
        central.handle_event(CentralEvent::ScanRetry);
        assert_eq!(central.state(), ConnectionState::Idle);
        assert!(log.borrow().is_empty());

        refuse.set(false);
        assert_eq!(
            central.handle_event(CentralEvent::ScanRetry),
            ConnectionState::Scanning
        );
        assert!(!central.rescan_pending());
        assert_eq!(*log.borrow(), vec![Req::StartScan]);
    }

    #[test]
    fn refused_rescan_after_failed_link_retries_on_scan_end() {
        let (central, log) = scanning_central();
        central.handle_event(adv_named("BP"));
        let refuse = refuse_scans(&central);

        let state = central.handle_event(CentralEvent::LinkEstablished {
            status: 0x3E,
            conn: CONN,
            peer: PEER,
        });
        assert_eq!(state, ConnectionState::Idle);

        refuse.set(false);
        log.borrow_mut().clear();
        central.handle_event(CentralEvent::ScanDurationEnded);
        assert_eq!(central.state(), ConnectionState::Scanning);
        assert_eq!(*log.borrow(), vec![Req::StartScan]);
    }

    #[test]
    fn scan_retry_is_ignored_without_a_refused_scan() {
        let (central, log) = scanning_central();
        log.borrow_mut().clear();
        assert_eq!(
            central.handle_event(CentralEvent::ScanRetry),
            ConnectionState::Scanning
        );
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn link_starts_discovery() {
        let (central, log) = discovering_central();
        assert_eq!(log.borrow().last(), Some(&Req::Discover));
        assert_eq!(central.conn(), Some(CONN));
    }

    #[test]
    fn ready_only_when_all_handles_known() {
        let (central, log) = discovering_central();
        for id in &CharId::ALL[..4] {
            central.handle_event(CentralEvent::CharDiscovered {
                uuid: id.uuid(),
                handle: handle_of(*id),
            });
            assert_eq!(central.state(), ConnectionState::DiscoveringCharacteristics);
        }
        // Unknown UUIDs don't count.
        central.handle_event(CentralEvent::CharDiscovered {
            uuid: 0x2A00,
            handle: 0x03,
        });
        assert_eq!(central.state(), ConnectionState::DiscoveringCharacteristics);

        central.handle_event(CentralEvent::CharDiscovered {
            uuid: TURN_UPDATE_UUID,
            handle: handle_of(CharId::TurnUpdate),
        });
        assert_eq!(central.state(), ConnectionState::Ready);
        assert!(central.handles().is_complete());

        let log = log.borrow();
        assert!(log.contains(&Req::EnableNotify(handle_of(CharId::Speed))));
        assert!(log.contains(&Req::EnableNotify(handle_of(CharId::Turn))));
    }

    #[test]
    fn discovery_retries_then_disconnects() {
        let (central, log) = discovering_central();
        log.borrow_mut().clear();

        central.handle_event(CentralEvent::DiscoveryComplete);
        central.handle_event(CentralEvent::DiscoveryTimeout);
        assert_eq!(*log.borrow(), vec![Req::Discover, Req::Discover]);

        central.handle_event(CentralEvent::DiscoveryComplete);
        assert_eq!(log.borrow().last(), Some(&Req::Disconnect(CONN)));

        let state = central.handle_event(CentralEvent::LinkTerminated {
            conn: CONN,
            reason: 0x16,
        });
        assert_eq!(state, ConnectionState::Scanning);
    }

    #[test]
    fn disconnect_clears_handles_and_rescans() {
        let (central, log) = ready_central();
        let state = central.handle_event(CentralEvent::LinkTerminated {
            conn: CONN,
            reason: 0x13,
        });
        assert_eq!(state, ConnectionState::Scanning);
        assert!(central.handles().is_empty());
        assert_eq!(*log.borrow(), vec![Req::StartScan]);
    }

    #[test]
    fn termination_of_other_link_is_ignored() {
        let (central, _) = ready_central();
        central.handle_event(CentralEvent::LinkTerminated {
            conn: CONN + 1,
            reason: 0x13,
        });
        assert_eq!(central.state(), ConnectionState::Ready);
    }

    #[test]
    fn hardware_error_is_absorbing() {
        let (central, log) = ready_central();
        assert_eq!(central.handle_event(CentralEvent::HardwareError), ConnectionState::Error);
        log.borrow_mut().clear();

        central.handle_event(CentralEvent::LinkTerminated { conn: CONN, reason: 0 });
        central.handle_event(CentralEvent::InitDone { success: true });
        assert_eq!(central.state(), ConnectionState::Error);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn halted_central_reports_hardware_fault() {
        let (central, log) = ready_central();
        central.handle_event(CentralEvent::HardwareError);

        assert_eq!(
            central.write_delta(CharId::SpeedUpdate, 1),
            Err(Error::HardwareFault)
        );
        assert_eq!(
            block_on(central.read(CharId::Speed, &mut Forever)),
            Err(Error::HardwareFault)
        );
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn one_shot_scan_restarts_after_window() {
        let (central, log) = scanning_central();
        log.borrow_mut().clear();
        assert_eq!(
            central.handle_event(CentralEvent::ScanDurationEnded),
            ConnectionState::Scanning
        );
        assert_eq!(*log.borrow(), vec![Req::StartScan]);
    }

    #[test]
    fn periodic_scan_toggles_idle() {
        let config = CentralConfig {
            scan_period: 4,
            ..CentralConfig::default()
        };
        let (central, log) = central_with(config);
        central.start().unwrap();
        central.handle_event(CentralEvent::InitDone { success: true });
        log.borrow_mut().clear();

        assert_eq!(central.handle_event(CentralEvent::ScanDurationEnded), ConnectionState::Idle);
        assert_eq!(central.handle_event(CentralEvent::ScanPeriodEnded), ConnectionState::Scanning);
        // The stack restarts periodic windows itself.
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn period_end_before_start_is_ignored() {
        let (central, _) = central_with(CentralConfig::default());
        assert_eq!(central.handle_event(CentralEvent::ScanPeriodEnded), ConnectionState::Idle);
    }

    #[test]
    fn listener_hears_every_transition_once() {
        let (central, _) = ready_central();
        assert_eq!(
            *central.listener().states.borrow(),
            vec![
                ConnectionState::Initializing,
                ConnectionState::Scanning,
                ConnectionState::Connecting,
                ConnectionState::DiscoveringCharacteristics,
                ConnectionState::Ready,
            ]
        );
    }

    // ════════════════════════════════════════════════════════════════════════
    // Notifications
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn notifications_map_to_ids() {
        let (central, _) = ready_central();
        central.handle_event(CentralEvent::CharNotified {
            handle: handle_of(CharId::Speed),
            value: value(&encode_i16(3)),
        });
        central.handle_event(CentralEvent::CharNotified {
            handle: 0x99,
            value: value(&[1, 2]),
        });
        assert_eq!(
            *central.listener().values.borrow(),
            vec![(CharId::Speed, vec![3, 0])]
        );
    }

    // ════════════════════════════════════════════════════════════════════════
    // Read / write
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn read_before_ready_fails() {
        let (central, log) = scanning_central();
        log.borrow_mut().clear();
        assert_eq!(
            block_on(central.read(CharId::Speed, &mut Forever)),
            Err(Error::NotReady)
        );
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn read_waits_for_matching_response() {
        let (central, log) = ready_central();
        let speed = handle_of(CharId::Speed);

        let responder = async {
            while !log.borrow().contains(&Req::Read(speed)) {
                yield_now().await;
            }
            // A response for another handle must not complete the read.
            central.on_read_response(handle_of(CharId::Turn), &[9, 9]);
            yield_now().await;
            central.on_read_response(speed, &encode_i16(42));
        };

        let (result, ()) = block_on(join(central.read_i16(CharId::Speed, &mut Forever), responder));
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn back_to_back_reads_never_swap() {
        let (central, log) = ready_central();
        let speed = handle_of(CharId::Speed);

        let responder = async {
            for _ in 0..2 {
                let handle = loop {
                    let pending = log.borrow().iter().rev().find_map(|r| match r {
                        Req::Read(h) => Some(*h),
                        _ => None,
                    });
                    if let Some(h) = pending {
                        log.borrow_mut().clear();
                        break h;
                    }
                    yield_now().await;
                };
                let v = if handle == speed { 5 } else { -3 };
                central.on_read_response(handle, &encode_i16(v));
            }
        };

        let (mut d1, mut d2) = (Forever, Forever);
        let reads = join(
            central.read_i16(CharId::Speed, &mut d1),
            central.read_i16(CharId::Turn, &mut d2),
        );
        let ((speed_v, turn_v), ()) = block_on(join(reads, responder));
        assert_eq!(speed_v, Ok(5));
        assert_eq!(turn_v, Ok(-3));
    }

    #[test]
    fn read_times_out_when_configured() {
        let config = CentralConfig {
            read_timeout_ms: Some(100),
            ..CentralConfig::default()
        };
        let (central, _) = central_with(config);
        central.start().unwrap();
        central.handle_event(CentralEvent::InitDone { success: true });
        central.handle_event(adv_named("BP"));
        central.handle_event(CentralEvent::LinkEstablished {
            status: HCI_SUCCESS,
            conn: CONN,
            peer: PEER,
        });
        for id in CharId::ALL {
            central.handle_event(CentralEvent::CharDiscovered {
                uuid: id.uuid(),
                handle: handle_of(id),
            });
        }

        let mut delay = Instant::default();
        assert_eq!(
            block_on(central.read(CharId::Thoughts, &mut delay)),
            Err(Error::NoResponse)
        );
        assert!(delay.0.get() >= 1);

        // A late response for the abandoned read is dropped.
        central.on_read_response(handle_of(CharId::Thoughts), b"late");
        assert!(!central.read_done.signaled());
    }

    #[test]
    fn disconnect_aborts_pending_read() {
        let (central, log) = ready_central();
        let responder = async {
            while log.borrow().is_empty() {
                yield_now().await;
            }
            central.handle_event(CentralEvent::LinkTerminated { conn: CONN, reason: 0x08 });
        };
        let (result, ()) = block_on(join(central.read(CharId::Turn, &mut Forever), responder));
        assert_eq!(result, Err(Error::Disconnected));
    }

    #[test]
    fn read_error_is_reported() {
        let (central, log) = ready_central();
        let responder = async {
            while log.borrow().is_empty() {
                yield_now().await;
            }
            central.on_read_error(handle_of(CharId::Thoughts), 0x02);
        };
        let (result, ()) = block_on(join(central.read(CharId::Thoughts, &mut Forever), responder));
        assert_eq!(result, Err(Error::ReadFailed(0x02)));
    }

    #[test]
    fn write_checks_length() {
        let (central, log) = ready_central();
        assert_eq!(central.write(CharId::Speed, &[1, 2, 3]), Err(Error::InvalidValueSize));
        assert!(log.borrow().is_empty());

        central.write(CharId::Speed, &[1, 0]).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![Req::Write(handle_of(CharId::Speed), vec![1, 0])]
        );
    }

    #[test]
    fn write_delta_encodes_le() {
        let (central, log) = ready_central();
        central.write_delta(CharId::TurnUpdate, -1).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![Req::Write(handle_of(CharId::TurnUpdate), vec![0xFF, 0xFF])]
        );
    }

    #[test]
    fn write_before_ready_fails() {
        let (central, _) = discovering_central();
        assert_eq!(central.write_delta(CharId::SpeedUpdate, 1), Err(Error::NotReady));
    }
}
