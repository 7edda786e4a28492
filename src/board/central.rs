//! SoftDevice implementation of [`BleStack`].
//!
//! [`SoftdeviceStack`] only queues [`StackCommand`]s. [`run_stack`] owns the
//! SoftDevice side: it executes the commands one at a time and reports every
//! outcome as a [`CentralEvent`] on the central's queue, or through the
//! central's read-completion path. Between commands it listens for
//! notifications and link loss on the open connection.
//!
//! [`run_central`] is the consuming end: it feeds the queue through the
//! state machine and times out characteristic discovery.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::Timer;
use heapless::Vec;
use nrf_softdevice::ble::gatt_client::{self, Characteristic, Descriptor, DiscoverError, HvxType};
use nrf_softdevice::ble::{central, Address, AddressType, Connection, Uuid};
use nrf_softdevice::{raw, RawError, Softdevice};

use crate::ble::central::{Central, CentralListener, ConnectionState};
use crate::ble::profile::{
    CharId, CharValue, CLIENT_CHAR_CONFIG_UUID, MAX_VALUE_LEN, SERVICE_UUID,
};
use crate::ble::stack::{
    AdvReport, BdAddr, BleStack, CentralEvent, ConnHandle, FaultCounter, ScanFilter,
    ADV_DATA_MAX_LEN, HCI_SUCCESS,
};
use crate::config::{
    BLE_CONN_INTERVAL_MAX, BLE_CONN_INTERVAL_MIN, BLE_SLAVE_LATENCY, BLE_SUP_TIMEOUT,
    CENTRAL_QUEUE_DEPTH, DISCOVERY_TIMEOUT_MS, SCAN_DURATION, SCAN_RETRY_MS, STACK_FAULT_LIMIT,
};
use crate::error::StackError;
use crate::event::{EventBridge, EventLoop};

/// Outstanding requests between the central and the driver.
pub const STACK_QUEUE_DEPTH: usize = 8;

/// HCI "Connection Failed to be Established".
const HCI_CONN_FAILED: u8 = 0x3E;
/// HCI "Remote User Terminated Connection".
const HCI_REMOTE_TERMINATED: u8 = 0x13;
/// HCI "Connection Terminated by Local Host".
const HCI_LOCAL_TERMINATED: u8 = 0x16;
/// ATT "Unlikely Error", reported when the SoftDevice gives no ATT code.
const ATT_UNLIKELY_ERROR: u8 = 0x0E;

/// CCCD value enabling notifications.
const CCCD_NOTIFY: [u8; 2] = [0x01, 0x00];

/// Advertisers remembered for duplicate filtering within one window.
const SEEN_CAPACITY: usize = 16;

pub type StackCommands = Channel<CriticalSectionRawMutex, StackCommand, STACK_QUEUE_DEPTH>;
pub type CentralEvents = EventBridge<CriticalSectionRawMutex, CentralEvent, CENTRAL_QUEUE_DEPTH>;

/// A request queued by [`SoftdeviceStack`].
#[derive(Clone, defmt::Format)]
pub enum StackCommand {
    InitCentral,
    ConfigureScan(ScanFilter),
    StartScan { duration: u16, period: u16 },
    StopScan,
    Connect(BdAddr),
    Disconnect(ConnHandle),
    Discover(ConnHandle),
    Read { conn: ConnHandle, handle: u16 },
    Write { conn: ConnHandle, handle: u16, value: CharValue },
    EnableNotifications { conn: ConnHandle, handle: u16 },
}

/// The central's handle on the SoftDevice driver.
pub struct SoftdeviceStack {
    commands: &'static StackCommands,
}

impl SoftdeviceStack {
    pub const fn new(commands: &'static StackCommands) -> Self {
        Self { commands }
    }

    fn submit(&self, command: StackCommand) -> Result<(), StackError> {
        self.commands.try_send(command).map_err(|_| {
            warn!("stack command queue full");
            StackError::Busy
        })
    }
}

impl BleStack for SoftdeviceStack {
    fn init_central(&mut self) -> Result<(), StackError> {
        self.submit(StackCommand::InitCentral)
    }

    fn configure_scan(&mut self, filter: &ScanFilter) -> Result<(), StackError> {
        self.submit(StackCommand::ConfigureScan(*filter))
    }

    fn start_scan(&mut self, duration: u16, period: u16) -> Result<(), StackError> {
        self.submit(StackCommand::StartScan { duration, period })
    }

    fn stop_scan(&mut self) -> Result<(), StackError> {
        self.submit(StackCommand::StopScan)
    }

    fn connect(&mut self, peer: BdAddr) -> Result<(), StackError> {
        self.submit(StackCommand::Connect(peer))
    }

    fn disconnect(&mut self, conn: ConnHandle) -> Result<(), StackError> {
        self.submit(StackCommand::Disconnect(conn))
    }

    fn discover_characteristics(
        &mut self,
        conn: ConnHandle,
        _start: u16,
        _end: u16,
    ) -> Result<(), StackError> {
        // The SoftDevice client discovers by service UUID, over the whole table.
        self.submit(StackCommand::Discover(conn))
    }

    fn read(&mut self, conn: ConnHandle, handle: u16) -> Result<(), StackError> {
        self.submit(StackCommand::Read { conn, handle })
    }

    fn write(&mut self, conn: ConnHandle, handle: u16, value: &[u8]) -> Result<(), StackError> {
        let value = CharValue::from_slice(value).map_err(|_| StackError::NoResources)?;
        self.submit(StackCommand::Write { conn, handle, value })
    }

    fn enable_notifications(
        &mut self,
        conn: ConnHandle,
        value_handle: u16,
    ) -> Result<(), StackError> {
        self.submit(StackCommand::EnableNotifications {
            conn,
            handle: value_handle,
        })
    }
}

pub fn to_bd_addr(address: &Address) -> BdAddr {
    let addr_type = match address.address_type() {
        AddressType::Public => 0u8,
        AddressType::RandomStatic => 1u8,
        AddressType::RandomPrivateResolvable => 2u8,
        AddressType::RandomPrivateNonResolvable => 3u8,
        AddressType::Anonymous => 4u8,
    };
    BdAddr {
        addr_type,
        bytes: address.bytes(),
    }
}

pub fn to_address(addr: &BdAddr) -> Address {
    let addr_type = match addr.addr_type {
        0 => AddressType::Public,
        2 => AddressType::RandomPrivateResolvable,
        3 => AddressType::RandomPrivateNonResolvable,
        4 => AddressType::Anonymous,
        _ => AddressType::RandomStatic,
    };
    Address::new(addr_type, addr.bytes)
}

/// A notification received on the open link.
pub struct Notification {
    handle: u16,
    value: CharValue,
}

/// A barebot characteristic found by discovery.
#[derive(Clone, Copy)]
struct Found {
    uuid: u16,
    value_handle: u16,
    cccd_handle: Option<u16>,
}

/// GATT client for the barebot service.
///
/// Hand-written rather than derived so that discovery keeps every
/// characteristic handle, including the write-only update ones.
pub struct BarebotClient {
    found: Vec<Found, { CharId::COUNT }>,
}

impl gatt_client::Client for BarebotClient {
    type Event = Notification;

    fn on_hvx(
        &self,
        _conn: &Connection,
        type_: HvxType,
        handle: u16,
        data: &[u8],
    ) -> Option<Self::Event> {
        if !matches!(type_, HvxType::Notification) {
            return None;
        }
        let value = CharValue::from_slice(data).ok()?;
        Some(Notification { handle, value })
    }

    fn uuid() -> Uuid {
        Uuid::new_16(SERVICE_UUID)
    }

    fn new_undiscovered(_conn: Connection) -> Self {
        Self { found: Vec::new() }
    }

    fn discovered_characteristic(
        &mut self,
        characteristic: &Characteristic,
        descriptors: &[Descriptor],
    ) {
        let Some(uuid) = characteristic.uuid else {
            return;
        };
        let Some(id) = CharId::ALL
            .into_iter()
            .find(|id| uuid == Uuid::new_16(id.uuid()))
        else {
            return;
        };

        let cccd = Uuid::new_16(CLIENT_CHAR_CONFIG_UUID);
        let cccd_handle = descriptors
            .iter()
            .find(|d| d.uuid == Some(cccd))
            .map(|d| d.handle);

        let _ = self.found.push(Found {
            uuid: id.uuid(),
            value_handle: characteristic.handle_value,
            cccd_handle,
        });
    }

    fn discovery_complete(&mut self) -> Result<(), DiscoverError> {
        Ok(())
    }
}

struct Driver {
    sd: &'static Softdevice,
    events: &'static CentralEvents,
    filter: ScanFilter,
    scan_timeout: u16,
    link: Option<Connection>,
    found: Vec<Found, { CharId::COUNT }>,
    disconnecting: bool,
    faults: FaultCounter,
}

impl Driver {
    fn post(&self, event: CentralEvent) {
        // Overflow is counted by the bridge.
        let _ = self.events.post(event);
    }

    fn softdevice_failed(&mut self, e: RawError) {
        if self.faults.failed(StackError::Raw(e as u32)).is_err() {
            error!("SoftDevice keeps failing, halting the central");
            self.post(CentralEvent::HardwareError);
        }
    }

    fn link_for(&self, conn: ConnHandle) -> Option<Connection> {
        self.link
            .as_ref()
            .filter(|link| link.handle() == Some(conn))
            .cloned()
    }

    /// Execute one command. Returns a command that interrupted it, if any.
    async fn execute<L: CentralListener>(
        &mut self,
        command: StackCommand,
        commands: &'static StackCommands,
        central: &Central<CriticalSectionRawMutex, SoftdeviceStack, L>,
    ) -> Option<StackCommand> {
        trace!("stack command {}", command);
        match command {
            StackCommand::InitCentral => {
                // The SoftDevice is enabled before any task runs.
                self.post(CentralEvent::InitDone { success: true });
            }
            StackCommand::ConfigureScan(filter) => self.filter = filter,
            StackCommand::StartScan { duration, period } => {
                return self.scan(duration, period, commands).await;
            }
            StackCommand::StopScan => {}
            StackCommand::Connect(peer) => return self.connect(peer, commands).await,
            StackCommand::Disconnect(conn) => {
                if let Some(link) = self.link_for(conn) {
                    self.disconnecting = true;
                    if link.disconnect().is_err() {
                        debug!("link {} already gone", conn);
                    }
                }
            }
            StackCommand::Discover(conn) => {
                if let Some(link) = self.link_for(conn) {
                    self.discover(&link).await;
                }
            }
            StackCommand::Read { conn, handle } => match self.link_for(conn) {
                Some(link) => {
                    let mut buf = [0u8; MAX_VALUE_LEN];
                    match gatt_client::read(&link, handle, &mut buf).await {
                        Ok(len) => central.on_read_response(handle, &buf[..len]),
                        Err(_) => {
                            warn!("read of handle {=u16:#x} failed", handle);
                            central.on_read_error(handle, ATT_UNLIKELY_ERROR);
                        }
                    }
                }
                None => central.on_read_error(handle, ATT_UNLIKELY_ERROR),
            },
            StackCommand::Write {
                conn,
                handle,
                value,
            } => {
                if let Some(link) = self.link_for(conn) {
                    if gatt_client::write_without_response(&link, handle, &value)
                        .await
                        .is_err()
                    {
                        warn!("write to handle {=u16:#x} failed", handle);
                    }
                }
            }
            StackCommand::EnableNotifications { conn, handle } => {
                if let Some(link) = self.link_for(conn) {
                    let cccd = self
                        .found
                        .iter()
                        .find(|f| f.value_handle == handle)
                        .and_then(|f| f.cccd_handle)
                        .unwrap_or(handle.saturating_add(1));
                    if gatt_client::write(&link, cccd, &CCCD_NOTIFY).await.is_err() {
                        warn!("enabling notifications on {=u16:#x} failed", handle);
                    }
                }
            }
        }
        None
    }

    async fn scan(
        &mut self,
        duration: u16,
        period: u16,
        commands: &'static StackCommands,
    ) -> Option<StackCommand> {
        if period != 0 {
            debug!("periodic scanning unsupported, scanning one window");
        }
        self.scan_timeout = duration;

        let config = central::ScanConfig {
            active: true,
            timeout: duration,
            ..Default::default()
        };
        let filter = self.filter;
        let events = self.events;
        let mut seen: Vec<BdAddr, SEEN_CAPACITY> = Vec::new();

        let scan = central::scan(self.sd, &config, |params| {
            if filter.connectable_only && params.type_.connectable() == 0 {
                return None;
            }
            if filter.complete_only
                && params.type_.status() != raw::BLE_GAP_ADV_DATA_STATUS_COMPLETE as u16
            {
                return None;
            }

            let address = to_bd_addr(&Address::from_raw(params.peer_addr));
            if filter.filter_duplicates {
                if seen.contains(&address) {
                    return None;
                }
                let _ = seen.push(address);
            }

            let data =
                unsafe { core::slice::from_raw_parts(params.data.p_data, params.data.len as usize) };
            let data = &data[..data.len().min(ADV_DATA_MAX_LEN)];
            let report = AdvReport {
                address,
                rssi: params.rssi,
                data: Vec::from_slice(data).unwrap_or_default(),
            };
            let _ = events.post(CentralEvent::AdvReport(report));
            None::<()>
        });

        match select(scan, commands.receive()).await {
            Either::First(result) => {
                match result {
                    Err(central::ScanError::Raw(e)) => self.softdevice_failed(e),
                    _ => {
                        debug!("scan window closed");
                        self.faults.succeeded();
                    }
                }
                self.post(CentralEvent::ScanDurationEnded);
                None
            }
            // Dropping the scan future stops the scanner.
            Either::Second(command) => Some(command),
        }
    }

    async fn connect(
        &mut self,
        peer: BdAddr,
        commands: &'static StackCommands,
    ) -> Option<StackCommand> {
        let address = to_address(&peer);
        let whitelist = [&address];
        let config = central::ConnectConfig {
            scan_config: central::ScanConfig {
                whitelist: Some(&whitelist),
                timeout: if self.scan_timeout == 0 {
                    SCAN_DURATION
                } else {
                    self.scan_timeout
                },
                ..Default::default()
            },
            conn_params: raw::ble_gap_conn_params_t {
                min_conn_interval: BLE_CONN_INTERVAL_MIN,
                max_conn_interval: BLE_CONN_INTERVAL_MAX,
                slave_latency: BLE_SLAVE_LATENCY,
                conn_sup_timeout: BLE_SUP_TIMEOUT,
            },
            ..Default::default()
        };

        let failed = CentralEvent::LinkEstablished {
            status: HCI_CONN_FAILED,
            conn: 0,
            peer,
        };
        match select(central::connect(self.sd, &config), commands.receive()).await {
            Either::First(Ok(link)) => {
                let conn = link.handle().unwrap_or_default();
                info!("connected, handle {}", conn);
                self.faults.succeeded();
                self.link = Some(link);
                self.found.clear();
                self.disconnecting = false;
                self.post(CentralEvent::LinkEstablished {
                    status: HCI_SUCCESS,
                    conn,
                    peer,
                });
                None
            }
            Either::First(Err(e)) => {
                warn!("connect failed");
                if let central::ConnectError::Raw(e) = e {
                    self.softdevice_failed(e);
                }
                self.post(failed);
                None
            }
            Either::Second(command) => {
                self.post(failed);
                Some(command)
            }
        }
    }

    async fn discover(&mut self, link: &Connection) {
        match gatt_client::discover::<BarebotClient>(link).await {
            Ok(client) => {
                self.found = client.found;
                for f in self.found.iter() {
                    self.post(CentralEvent::CharDiscovered {
                        uuid: f.uuid,
                        handle: f.value_handle,
                    });
                }
            }
            Err(_) => warn!("barebot service not found"),
        }
        self.post(CentralEvent::DiscoveryComplete);
    }

    /// Wait for a notification, link loss or the next command.
    async fn watch(
        &mut self,
        link: Connection,
        commands: &'static StackCommands,
    ) -> Option<StackCommand> {
        let client = <BarebotClient as gatt_client::Client>::new_undiscovered(link.clone());
        let events = self.events;
        let notifications = gatt_client::run(&link, &client, |n: Notification| {
            let _ = events.post(CentralEvent::CharNotified {
                handle: n.handle,
                value: n.value,
            });
        });

        match select(notifications, commands.receive()).await {
            Either::First(_) => {
                let reason = if self.disconnecting {
                    HCI_LOCAL_TERMINATED
                } else {
                    HCI_REMOTE_TERMINATED
                };
                let conn = link.handle().unwrap_or_default();
                info!("link {} terminated", conn);
                self.link = None;
                self.found.clear();
                self.disconnecting = false;
                self.post(CentralEvent::LinkTerminated { conn, reason });
                None
            }
            Either::Second(command) => Some(command),
        }
    }
}

/// SoftDevice side of the central. Never returns.
pub async fn run_stack<L: CentralListener>(
    sd: &'static Softdevice,
    commands: &'static StackCommands,
    events: &'static CentralEvents,
    central: &Central<CriticalSectionRawMutex, SoftdeviceStack, L>,
) -> ! {
    let mut driver = Driver {
        sd,
        events,
        filter: ScanFilter::PEER_SEARCH,
        scan_timeout: 0,
        link: None,
        found: Vec::new(),
        disconnecting: false,
        faults: FaultCounter::new(STACK_FAULT_LIMIT),
    };
    let mut next: Option<StackCommand> = None;

    loop {
        let command = match next.take() {
            Some(command) => command,
            None => match driver.link.clone() {
                Some(link) => match driver.watch(link, commands).await {
                    Some(command) => command,
                    None => continue,
                },
                None => commands.receive().await,
            },
        };
        next = driver.execute(command, commands, central).await;
    }
}

/// The central's task: start it, then run its event queue forever.
///
/// While characteristics are being discovered, a quiet queue for
/// [`DISCOVERY_TIMEOUT_MS`] produces a [`CentralEvent::DiscoveryTimeout`];
/// a refused scan start is retried every [`SCAN_RETRY_MS`]. A hardware
/// error parks the task.
pub async fn run_central<L: CentralListener>(
    central: &Central<CriticalSectionRawMutex, SoftdeviceStack, L>,
    events: &CentralEvents,
) -> ! {
    if let Err(e) = central.start() {
        error!("central start failed: {}", e);
    }

    let queue = EventLoop::new(events);
    let mut handler = central;
    loop {
        let timeout = if central.rescan_pending() {
            Some((SCAN_RETRY_MS, CentralEvent::ScanRetry))
        } else if central.state() == ConnectionState::DiscoveringCharacteristics {
            Some((DISCOVERY_TIMEOUT_MS, CentralEvent::DiscoveryTimeout))
        } else {
            None
        };
        let event = match timeout {
            Some((ms, tick)) => match select(queue.wait(), Timer::after_millis(ms)).await {
                Either::First(event) => event,
                Either::Second(()) => tick,
            },
            None => queue.wait().await,
        };
        central.handle_event(event);
        queue.drain(&mut handler).await;

        if central.state() == ConnectionState::Error {
            error!("central halted after hardware error");
            core::future::pending::<()>().await;
        }
    }
}
