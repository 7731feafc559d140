//! HLK-LD8001H radar level sensor driver (Modbus-RTU)
//!
//! Each polling tick issues exactly one request. The response is picked
//! up by later `service` calls; if it has not arrived by the response
//! timeout, the exchange is dropped and the published value is left as
//! it was. Nothing is retried within a cycle.
//!
//! Before measuring, the device's installation height (when configured)
//! and range registers are read and rewritten if they differ. This sync
//! uses the same one-exchange-per-tick rhythm, gives up after a few
//! incomplete rounds, and is repeated when the device has produced no
//! valid reading for a while.

use tidewatch_core::config::{ConfigError, Ld8001hConfig, Validate};
use tidewatch_core::measurement::{Measurement, MeasurementPublisher};
use tidewatch_core::traits::{RangeSensor, TickOutcome};
use tidewatch_hal::time::{deadline_reached, elapsed_ms};
use tidewatch_hal::{Uart, UartConfig};
use tidewatch_protocol::modbus::{reg, ModbusError, Request, Response, ResponseParser};

use super::transform::{MeasurementTransform, Passthrough};
use super::{bump, DriverStats};
use crate::transport::{self, SerialLink, READ_CHUNK};

const DEVICE: &str = "ld8001h";

/// Port framing the LD8001H requires
pub const REQUIRED_UART: UartConfig = UartConfig::n81(115_200);

/// Incomplete sync rounds before measuring with the device's own settings
pub const MAX_SYNC_ROUNDS: u8 = 3;

/// Silence after which the device settings are synced again (ms)
pub const RESYNC_AFTER_MS: u32 = 30_000;

const MAX_DRAIN_CHUNKS: usize = 4;

/// Register reconciliation steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncStep {
    ReadInstallationHeight,
    WriteInstallationHeight,
    ReadRange,
    WriteRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum ReadTarget {
    SpaceHeight,
    WaterLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purpose {
    Sync(SyncStep),
    Measure(ReadTarget),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncResult {
    Read(u16),
    Written,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sync {
    /// `step` runs on the next tick; `failed` marks a write that did not stick
    Pending {
        step: SyncStep,
        round: u8,
        failed: bool,
    },
    Done,
}

#[derive(Debug, Clone)]
enum Exchange {
    Idle,
    Awaiting {
        purpose: Purpose,
        parser: ResponseParser,
        deadline_ms: u32,
    },
}

/// LD8001H driver
///
/// `T` turns the space-height reading (plus the optional auxiliary value)
/// into the published value.
pub struct Ld8001hDriver<U, T = Passthrough> {
    config: Ld8001hConfig,
    link: SerialLink<U>,
    transform: T,
    aux: Option<f32>,
    publisher: MeasurementPublisher,
    water: MeasurementPublisher,
    exchange: Exchange,
    sync: Sync,
    device_sync: bool,
    next_target: ReadTarget,
    last_valid_ms: Option<u32>,
    stats: DriverStats,
    enabled: bool,
}

impl<U: Uart> Ld8001hDriver<U, Passthrough> {
    /// Create a driver publishing the raw space height
    pub fn new(config: Ld8001hConfig, uart: U) -> Result<Self, ConfigError> {
        Self::with_transform(config, uart, Passthrough)
    }
}

impl<U: Uart, T: MeasurementTransform> Ld8001hDriver<U, T> {
    /// Create a driver with a custom publication transform
    pub fn with_transform(config: Ld8001hConfig, uart: U, transform: T) -> Result<Self, ConfigError> {
        if let Err(e) = config.validate() {
            error!("{}: configuration rejected: {}", DEVICE, e);
            return Err(e);
        }

        info!(
            "{}: address {}, range {} m, update {} ms",
            DEVICE, config.modbus_address, config.range_m, config.update_interval_ms
        );
        if let Some(height_cm) = config.installation_height_cm {
            info!("{}: installation height {} cm", DEVICE, height_cm);
        }

        Ok(Self {
            config,
            link: SerialLink::new(uart),
            transform,
            aux: None,
            publisher: MeasurementPublisher::new(config.stale_after_cycles),
            water: MeasurementPublisher::new(config.stale_after_cycles),
            exchange: Exchange::Idle,
            sync: Sync::Pending {
                step: first_sync_step(&config),
                round: 0,
                failed: false,
            },
            device_sync: true,
            next_target: ReadTarget::SpaceHeight,
            last_valid_ms: None,
            stats: DriverStats::default(),
            enabled: true,
        })
    }

    /// Measure straight away without touching the device registers
    pub fn without_device_sync(mut self) -> Self {
        self.device_sync = false;
        self.sync = Sync::Done;
        self
    }

    pub fn config(&self) -> &Ld8001hConfig {
        &self.config
    }

    /// Supply the auxiliary reading passed to the transform
    pub fn set_auxiliary(&mut self, value: Option<f32>) {
        self.aux = value;
    }

    /// Latest water level, when the readout is enabled
    pub fn water_level(&self) -> Option<Measurement> {
        if self.reads_water_level() {
            Some(self.water.current())
        } else {
            None
        }
    }

    /// Check if the device registers have been reconciled
    pub fn is_synced(&self) -> bool {
        self.sync == Sync::Done
    }

    /// Sync step that will run on the next tick
    pub fn sync_step(&self) -> Option<SyncStep> {
        match self.sync {
            Sync::Pending { step, .. } => Some(step),
            Sync::Done => None,
        }
    }

    /// Check if a request is waiting for its response
    pub fn is_exchange_pending(&self) -> bool {
        matches!(self.exchange, Exchange::Awaiting { .. })
    }

    /// Diagnostic counters
    pub fn stats(&self) -> DriverStats {
        DriverStats {
            link_errors: self.link.link_errors(),
            ..self.stats
        }
    }

    /// Warn if the port is not opened the way the sensor needs
    pub fn check_port(&self, actual: &UartConfig) -> bool {
        transport::check_uart_config(DEVICE, &REQUIRED_UART, actual)
    }

    /// Stop polling, abandoning any in-flight exchange
    ///
    /// A response arriving later is flushed before the next request.
    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.enabled = false;
        self.exchange = Exchange::Idle;
        info!("{}: disabled", DEVICE);
    }

    pub fn enable(&mut self) {
        if !self.enabled {
            self.enabled = true;
            info!("{}: enabled", DEVICE);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Tear down the driver and return the port
    pub fn release(self) -> U {
        self.link.release()
    }

    fn reads_water_level(&self) -> bool {
        self.config.water_level_readout && self.config.installation_height_cm.is_some()
    }

    fn pick_target(&mut self) -> ReadTarget {
        if !self.reads_water_level() {
            return ReadTarget::SpaceHeight;
        }
        let target = self.next_target;
        self.next_target = match target {
            ReadTarget::SpaceHeight => ReadTarget::WaterLevel,
            ReadTarget::WaterLevel => ReadTarget::SpaceHeight,
        };
        target
    }

    fn request_for(&self, purpose: Purpose) -> Request {
        let slave = self.config.modbus_address;
        match purpose {
            Purpose::Sync(SyncStep::ReadInstallationHeight) => {
                Request::read(slave, reg::INSTALLATION_HEIGHT)
            }
            Purpose::Sync(SyncStep::WriteInstallationHeight) => Request::write(
                slave,
                reg::INSTALLATION_HEIGHT,
                self.config.installation_height_cm.unwrap_or_default(),
            ),
            Purpose::Sync(SyncStep::ReadRange) => Request::read(slave, reg::RANGE),
            Purpose::Sync(SyncStep::WriteRange) => {
                Request::write(slave, reg::RANGE, self.config.range_m)
            }
            Purpose::Measure(ReadTarget::SpaceHeight) => Request::read(slave, reg::SPACE_HEIGHT),
            Purpose::Measure(ReadTarget::WaterLevel) => Request::read(slave, reg::WATER_LEVEL),
        }
    }

    fn maybe_resync(&mut self, now_ms: u32) {
        let since = *self.last_valid_ms.get_or_insert(now_ms);
        if !self.device_sync || self.sync != Sync::Done {
            return;
        }
        if elapsed_ms(since, now_ms) > RESYNC_AFTER_MS {
            warn!(
                "{}: no valid reading for {} ms, syncing device settings again",
                DEVICE,
                elapsed_ms(since, now_ms)
            );
            self.last_valid_ms = Some(now_ms);
            self.sync = Sync::Pending {
                step: first_sync_step(&self.config),
                round: 0,
                failed: false,
            };
        }
    }

    fn start_exchange(&mut self, purpose: Purpose, now_ms: u32) -> TickOutcome {
        let request = self.request_for(purpose);

        let stale = self.link.discard_input();
        if stale > 0 {
            debug!("{}: dropped {} stray bytes before request", DEVICE, stale);
        }

        if !self.link.send(&request.encode()) {
            return self.exchange_failed(purpose, TickOutcome::NoData, now_ms);
        }
        trace!("{}: sent {:?}", DEVICE, request);

        self.exchange = Exchange::Awaiting {
            purpose,
            parser: ResponseParser::new(request),
            deadline_ms: now_ms.wrapping_add(self.config.response_timeout_ms),
        };

        match purpose {
            Purpose::Sync(_) => TickOutcome::Configuring,
            Purpose::Measure(_) => TickOutcome::Pending,
        }
    }

    /// Record a failed exchange and return the outcome to report
    fn exchange_failed(&mut self, purpose: Purpose, outcome: TickOutcome, now_ms: u32) -> TickOutcome {
        match purpose {
            Purpose::Sync(step) => {
                self.advance_sync(step, SyncResult::Failed, now_ms);
                outcome
            }
            Purpose::Measure(ReadTarget::SpaceHeight) => {
                if self.publisher.record_miss() {
                    warn!(
                        "{}: measurement stale after {} failed cycles",
                        DEVICE,
                        self.publisher.missed_cycles()
                    );
                    TickOutcome::WentStale
                } else {
                    outcome
                }
            }
            Purpose::Measure(ReadTarget::WaterLevel) => {
                if self.water.record_miss() {
                    warn!("{}: water level stale", DEVICE);
                }
                outcome
            }
        }
    }

    fn handle_response(&mut self, purpose: Purpose, response: Response, now_ms: u32) -> TickOutcome {
        bump(&mut self.stats.frames_decoded);
        match (purpose, response) {
            (Purpose::Sync(step), Response::WriteAck { .. }) => {
                self.advance_sync(step, SyncResult::Written, now_ms);
                TickOutcome::Configuring
            }
            (Purpose::Sync(step), response) => {
                let result = match response.first_register() {
                    Some(value) => SyncResult::Read(value),
                    None => SyncResult::Failed,
                };
                self.advance_sync(step, result, now_ms);
                TickOutcome::Configuring
            }
            (Purpose::Measure(target), response) => match response.first_register() {
                Some(raw) => self.handle_measurement(target, raw, now_ms),
                None => self.exchange_failed(purpose, TickOutcome::NoData, now_ms),
            },
        }
    }

    fn handle_measurement(&mut self, target: ReadTarget, raw: u16, now_ms: u32) -> TickOutcome {
        let value_mm = f32::from(raw);

        if u32::from(raw) > self.config.range_mm() {
            bump(&mut self.stats.out_of_range);
            debug!(
                "{}: {:?} reading {} mm beyond range {} mm",
                DEVICE,
                target,
                raw,
                self.config.range_mm()
            );
            return self.exchange_failed(Purpose::Measure(target), TickOutcome::Rejected, now_ms);
        }

        self.last_valid_ms = Some(now_ms);

        match target {
            ReadTarget::WaterLevel => {
                self.water.publish(value_mm, now_ms);
                debug!("{}: water level {} mm", DEVICE, value_mm);
                TickOutcome::PublishedSecondary(value_mm)
            }
            ReadTarget::SpaceHeight => match self.transform.apply(value_mm, self.aux) {
                Some(published) => {
                    self.publisher.publish(published, now_ms);
                    info!("{}: published {} mm (radar {} mm)", DEVICE, published, value_mm);
                    TickOutcome::Published(published)
                }
                None => {
                    debug!("{}: transform withheld {} mm", DEVICE, value_mm);
                    self.exchange_failed(Purpose::Measure(target), TickOutcome::Rejected, now_ms)
                }
            },
        }
    }

    fn advance_sync(&mut self, step: SyncStep, result: SyncResult, now_ms: u32) {
        let Sync::Pending {
            round, mut failed, ..
        } = self.sync
        else {
            return;
        };

        let wanted_height = self.config.installation_height_cm;
        let wanted_range = self.config.range_m;

        let next = match (step, result) {
            (SyncStep::ReadInstallationHeight, SyncResult::Read(height_cm)) => {
                info!("{}: device installation height {} cm", DEVICE, height_cm);
                if Some(height_cm) == wanted_height {
                    Some(SyncStep::ReadRange)
                } else {
                    Some(SyncStep::WriteInstallationHeight)
                }
            }
            (SyncStep::ReadInstallationHeight, _) => {
                warn!("{}: could not read installation height, writing it anyway", DEVICE);
                Some(SyncStep::WriteInstallationHeight)
            }
            (SyncStep::WriteInstallationHeight, SyncResult::Written) => {
                info!(
                    "{}: installation height set to {} cm",
                    DEVICE,
                    wanted_height.unwrap_or_default()
                );
                Some(SyncStep::ReadRange)
            }
            (SyncStep::WriteInstallationHeight, _) => {
                warn!("{}: failed to set installation height", DEVICE);
                failed = true;
                Some(SyncStep::ReadRange)
            }
            (SyncStep::ReadRange, SyncResult::Read(range_m)) => {
                info!("{}: device range {} m", DEVICE, range_m);
                if range_m == wanted_range {
                    None
                } else {
                    Some(SyncStep::WriteRange)
                }
            }
            (SyncStep::ReadRange, _) => {
                warn!("{}: could not read range, writing it anyway", DEVICE);
                Some(SyncStep::WriteRange)
            }
            (SyncStep::WriteRange, SyncResult::Written) => {
                info!("{}: range set to {} m", DEVICE, wanted_range);
                None
            }
            (SyncStep::WriteRange, _) => {
                warn!("{}: failed to set range", DEVICE);
                failed = true;
                None
            }
        };

        self.sync = match next {
            Some(step) => Sync::Pending {
                step,
                round,
                failed,
            },
            None if !failed => {
                info!("{}: device settings in sync", DEVICE);
                self.last_valid_ms = Some(now_ms);
                Sync::Done
            }
            None => {
                let round = round + 1;
                if round >= MAX_SYNC_ROUNDS {
                    warn!(
                        "{}: device sync incomplete after {} rounds, measuring with device settings",
                        DEVICE, round
                    );
                    self.last_valid_ms = Some(now_ms);
                    Sync::Done
                } else {
                    warn!(
                        "{}: device sync incomplete, retrying (round {} of {})",
                        DEVICE,
                        round + 1,
                        MAX_SYNC_ROUNDS
                    );
                    Sync::Pending {
                        step: first_sync_step(&self.config),
                        round,
                        failed: false,
                    }
                }
            }
        };
    }
}

fn first_sync_step(config: &Ld8001hConfig) -> SyncStep {
    if config.installation_height_cm.is_some() {
        SyncStep::ReadInstallationHeight
    } else {
        SyncStep::ReadRange
    }
}

impl<U: Uart, T: MeasurementTransform> RangeSensor for Ld8001hDriver<U, T> {
    fn poll_tick(&mut self, now_ms: u32) -> TickOutcome {
        if !self.enabled {
            return TickOutcome::Disabled;
        }

        // Tick came due before the previous exchange resolved
        let abandoned = match core::mem::replace(&mut self.exchange, Exchange::Idle) {
            Exchange::Awaiting { purpose, .. } => {
                bump(&mut self.stats.exchange_timeouts);
                warn!("{}: previous request still unanswered, abandoning it", DEVICE);
                Some(self.exchange_failed(purpose, TickOutcome::Timeout, now_ms))
            }
            Exchange::Idle => None,
        };

        self.maybe_resync(now_ms);

        let purpose = match self.sync {
            Sync::Pending { step, .. } => Purpose::Sync(step),
            Sync::Done => Purpose::Measure(self.pick_target()),
        };
        let outcome = self.start_exchange(purpose, now_ms);

        if abandoned == Some(TickOutcome::WentStale) {
            return TickOutcome::WentStale;
        }
        outcome
    }

    fn service(&mut self, now_ms: u32) -> Option<TickOutcome> {
        if !self.enabled {
            return None;
        }

        let Exchange::Awaiting {
            purpose,
            parser,
            deadline_ms,
        } = &mut self.exchange
        else {
            return None;
        };
        let purpose = *purpose;
        let deadline_ms = *deadline_ms;

        let mut result = None;
        let mut buf = [0u8; READ_CHUNK];
        'read: for _ in 0..MAX_DRAIN_CHUNKS {
            let n = self.link.read_chunk(&mut buf);
            if n == 0 {
                break;
            }
            for &byte in &buf[..n] {
                match parser.feed(byte) {
                    Ok(None) => {}
                    other => {
                        result = Some(other);
                        break 'read;
                    }
                }
            }
        }

        match result {
            Some(Ok(Some(response))) => {
                self.exchange = Exchange::Idle;
                Some(self.handle_response(purpose, response, now_ms))
            }
            Some(Err(e)) => {
                self.exchange = Exchange::Idle;
                match e {
                    ModbusError::CrcMismatch => bump(&mut self.stats.crc_failures),
                    _ => bump(&mut self.stats.protocol_errors),
                }
                debug!("{}: response rejected: {:?}", DEVICE, e);
                Some(self.exchange_failed(purpose, TickOutcome::NoData, now_ms))
            }
            _ if deadline_reached(now_ms, deadline_ms) => {
                self.exchange = Exchange::Idle;
                bump(&mut self.stats.exchange_timeouts);
                debug!("{}: no response within {} ms", DEVICE, self.config.response_timeout_ms);
                Some(self.exchange_failed(purpose, TickOutcome::Timeout, now_ms))
            }
            _ => None,
        }
    }

    fn current(&self) -> Measurement {
        self.publisher.current()
    }

    fn update_interval_ms(&self) -> u32 {
        self.config.update_interval_ms
    }
}
