//! HLK-LD2413 radar level sensor driver
//!
//! The LD2413 streams a 14-byte distance frame every report cycle. The
//! driver drains the port between ticks, keeps only the newest frame
//! inside the configured window, and publishes it on the next tick.
//!
//! Before streaming, the device is configured over the command channel:
//!
//! 1. enter config mode (up to 5 attempts)
//! 2. set min distance, set max distance, set report cycle
//! 3. recalibrate the threshold (only with `calibrate_on_boot`)
//! 4. exit config mode
//!
//! Every step waits for its ACK without blocking; the wait is resumed
//! on each `service`/`poll_tick` call. A step that is never acknowledged
//! is logged and skipped. If config mode cannot be entered at all, the
//! driver streams with whatever the device already holds.

use heapless::{Deque, Vec};

use tidewatch_core::config::{ConfigError, Ld2413Config, Validate};
use tidewatch_core::measurement::{Measurement, MeasurementPublisher};
use tidewatch_core::traits::{RangeSensor, TickOutcome};
use tidewatch_hal::time::{deadline_reached, elapsed_ms};
use tidewatch_hal::{Uart, UartConfig};
use tidewatch_protocol::ld2413::{cmd, AckParser, Command, FrameDecoder, FrameError};

use super::{bump, DriverStats};
use crate::transport::{self, SerialLink, BACKLOG_WARN_BYTES, DUMP_LIMIT, READ_CHUNK};

const DEVICE: &str = "ld2413";

/// Port framing the LD2413 requires
pub const REQUIRED_UART: UartConfig = UartConfig::n81(115_200);

/// Time the sensor needs after power-up before it accepts commands (ms)
pub const STARTUP_DELAY_MS: u32 = 1000;

/// Wait for a command ACK (ms)
pub const ACK_TIMEOUT_MS: u32 = 200;

/// Wait for the calibration ACK (ms)
pub const CALIBRATE_ACK_TIMEOUT_MS: u32 = 500;

/// Gap between consecutive commands (ms)
pub const COMMAND_GAP_MS: u32 = 50;

/// Gap before retrying an unacknowledged command (ms)
pub const RETRY_GAP_MS: u32 = 100;

/// Silence after which a warning is logged (ms)
pub const SILENCE_WARN_MS: u32 = 5000;

/// Upper bound on reads per drain so a chattering port cannot stall the loop
const MAX_DRAIN_CHUNKS: usize = 16;

/// Device configuration steps, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SetupStep {
    EnterConfig,
    SetMinDistance,
    SetMaxDistance,
    SetReportCycle,
    Calibrate,
    ExitConfig,
}

impl SetupStep {
    fn command(self, config: &Ld2413Config) -> Command {
        match self {
            SetupStep::EnterConfig => Command::enter_config(),
            SetupStep::SetMinDistance => Command::set_min_distance(config.min_distance_mm),
            SetupStep::SetMaxDistance => Command::set_max_distance(config.max_distance_mm),
            SetupStep::SetReportCycle => Command::set_report_cycle(config.report_cycle_ms),
            SetupStep::Calibrate => Command::calibrate_threshold(),
            SetupStep::ExitConfig => Command::exit_config(),
        }
    }

    fn command_word(self) -> u16 {
        match self {
            SetupStep::EnterConfig => cmd::ENTER_CONFIG,
            SetupStep::SetMinDistance => cmd::SET_MIN_DISTANCE,
            SetupStep::SetMaxDistance => cmd::SET_MAX_DISTANCE,
            SetupStep::SetReportCycle => cmd::SET_REPORT_CYCLE,
            SetupStep::Calibrate => cmd::UPDATE_THRESHOLD,
            SetupStep::ExitConfig => cmd::EXIT_CONFIG,
        }
    }

    fn max_attempts(self) -> u8 {
        match self {
            SetupStep::EnterConfig => 5,
            SetupStep::ExitConfig => 3,
            SetupStep::Calibrate => 2,
            _ => 1,
        }
    }

    fn ack_timeout_ms(self) -> u32 {
        match self {
            SetupStep::Calibrate => CALIBRATE_ACK_TIMEOUT_MS,
            _ => ACK_TIMEOUT_MS,
        }
    }

    fn next(self, config: &Ld2413Config) -> Option<SetupStep> {
        match self {
            SetupStep::EnterConfig => Some(SetupStep::SetMinDistance),
            SetupStep::SetMinDistance => Some(SetupStep::SetMaxDistance),
            SetupStep::SetMaxDistance => Some(SetupStep::SetReportCycle),
            SetupStep::SetReportCycle if config.calibrate_on_boot => Some(SetupStep::Calibrate),
            SetupStep::SetReportCycle | SetupStep::Calibrate => Some(SetupStep::ExitConfig),
            SetupStep::ExitConfig => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Setup {
    /// Waiting for the sensor to boot; deadline is set on the first call
    Warmup { until_ms: Option<u32> },
    /// Ready to send `step` once `at_ms` is reached
    Send {
        step: SetupStep,
        attempt: u8,
        at_ms: u32,
    },
    /// Command sent, waiting for its ACK
    AwaitAck {
        step: SetupStep,
        attempt: u8,
        deadline_ms: u32,
    },
    /// Streaming distance frames
    Done,
}

/// LD2413 driver
pub struct Ld2413Driver<U> {
    config: Ld2413Config,
    link: SerialLink<U>,
    decoder: FrameDecoder,
    acks: AckParser,
    publisher: MeasurementPublisher,
    setup: Setup,
    /// Newest in-window distance since the last tick
    latest: Option<f32>,
    /// An out-of-window reading arrived since the last tick
    rejected: bool,
    /// Bytes received since the last valid frame, for the hex dump
    recent: Deque<u8, DUMP_LIMIT>,
    stats: DriverStats,
    enabled: bool,
    last_success_ms: Option<u32>,
    silence_warned: bool,
    /// Time of the previous drain; bytes read now arrived no earlier
    last_drain_ms: Option<u32>,
}

impl<U: Uart> Ld2413Driver<U> {
    /// Create a driver, rejecting an invalid configuration
    ///
    /// Nothing is sent or read until the first `service` or `poll_tick`.
    pub fn new(config: Ld2413Config, uart: U) -> Result<Self, ConfigError> {
        if let Err(e) = config.validate() {
            error!("{}: configuration rejected: {}", DEVICE, e);
            return Err(e);
        }

        info!(
            "{}: min {} mm, max {} mm, report cycle {} ms, update {} ms",
            DEVICE,
            config.min_distance_mm,
            config.max_distance_mm,
            config.report_cycle_ms,
            config.update_interval_ms
        );

        Ok(Self {
            config,
            link: SerialLink::new(uart),
            decoder: FrameDecoder::new(),
            acks: AckParser::new(),
            publisher: MeasurementPublisher::new(config.stale_after_cycles),
            setup: Setup::Warmup { until_ms: None },
            latest: None,
            rejected: false,
            recent: Deque::new(),
            stats: DriverStats::default(),
            enabled: true,
            last_success_ms: None,
            silence_warned: false,
            last_drain_ms: None,
        })
    }

    /// Skip device configuration and stream straight away
    ///
    /// For sensors already configured with the desired settings.
    pub fn without_device_setup(mut self) -> Self {
        self.setup = Setup::Done;
        self
    }

    pub fn config(&self) -> &Ld2413Config {
        &self.config
    }

    /// Check if device configuration has finished
    pub fn is_streaming(&self) -> bool {
        self.setup == Setup::Done
    }

    /// Configuration step currently in progress
    pub fn setup_step(&self) -> Option<SetupStep> {
        match self.setup {
            Setup::Send { step, .. } | Setup::AwaitAck { step, .. } => Some(step),
            Setup::Warmup { .. } | Setup::Done => None,
        }
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

    /// Stop reading and publishing
    ///
    /// Partial frames and any unfinished configuration are abandoned;
    /// configuration restarts from the beginning on [`Self::enable`].
    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.enabled = false;
        self.decoder.reset();
        self.acks.reset();
        self.latest = None;
        self.rejected = false;
        self.recent.clear();
        self.last_drain_ms = None;
        if self.setup != Setup::Done {
            self.setup = Setup::Warmup { until_ms: None };
        }
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

    fn advance_setup(&mut self, now_ms: u32) {
        loop {
            let next = match self.setup {
                Setup::Done => return,
                Setup::Warmup { until_ms: None } => Setup::Warmup {
                    until_ms: Some(now_ms.wrapping_add(STARTUP_DELAY_MS)),
                },
                Setup::Warmup {
                    until_ms: Some(until),
                } => {
                    if !deadline_reached(now_ms, until) {
                        return;
                    }
                    let dropped = self.link.discard_input();
                    info!("{}: configuring device ({} stale bytes dropped)", DEVICE, dropped);
                    Setup::Send {
                        step: SetupStep::EnterConfig,
                        attempt: 1,
                        at_ms: now_ms,
                    }
                }
                Setup::Send {
                    step,
                    attempt,
                    at_ms,
                } => {
                    if !deadline_reached(now_ms, at_ms) {
                        return;
                    }
                    self.send_setup_command(step, attempt, now_ms)
                }
                Setup::AwaitAck {
                    step,
                    attempt,
                    deadline_ms,
                } => match self.poll_ack(step, now_ms) {
                    Some(true) => self.step_succeeded(step, now_ms),
                    Some(false) => self.step_failed(step, attempt, now_ms),
                    None if deadline_reached(now_ms, deadline_ms) => {
                        debug!("{}: no ack for {:?}", DEVICE, step);
                        self.step_failed(step, attempt, now_ms)
                    }
                    None => return,
                },
            };
            self.setup = next;
        }
    }

    fn send_setup_command(&mut self, step: SetupStep, attempt: u8, now_ms: u32) -> Setup {
        let frame = match step.command(&self.config).encode_to_vec() {
            Ok(frame) => frame,
            Err(e) => {
                error!("{}: cannot encode {:?}: {:?}", DEVICE, step, e);
                return self.step_failed(step, step.max_attempts(), now_ms);
            }
        };

        if attempt > 1 {
            warn!(
                "{}: retrying {:?} (attempt {} of {})",
                DEVICE,
                step,
                attempt,
                step.max_attempts()
            );
        }

        self.acks.reset();
        if !self.link.send(&frame) {
            return self.step_failed(step, attempt, now_ms);
        }
        debug!("{}: sent {:?}", DEVICE, step);

        Setup::AwaitAck {
            step,
            attempt,
            deadline_ms: now_ms.wrapping_add(step.ack_timeout_ms()),
        }
    }

    /// Look for the ACK of `step` in pending input
    ///
    /// `Some(true)` on success, `Some(false)` on a failure status, `None`
    /// while nothing conclusive has arrived.
    fn poll_ack(&mut self, step: SetupStep, now_ms: u32) -> Option<bool> {
        let mut buf = [0u8; READ_CHUNK];
        for _ in 0..MAX_DRAIN_CHUNKS {
            let n = self.link.read_chunk(&mut buf);
            if n == 0 {
                return None;
            }
            for &byte in &buf[..n] {
                match self.acks.feed(byte, now_ms) {
                    Ok(Some(ack)) if ack.answers(step.command_word()) => {
                        if ack.is_success() {
                            return Some(true);
                        }
                        warn!("{}: {:?} failed with status {}", DEVICE, step, ack.status);
                        return Some(false);
                    }
                    Ok(Some(ack)) => {
                        debug!("{}: ignoring ack for command {}", DEVICE, ack.command);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!("{}: bad ack frame: {:?}", DEVICE, e);
                    }
                }
            }
        }
        None
    }

    fn step_succeeded(&mut self, step: SetupStep, now_ms: u32) -> Setup {
        debug!("{}: {:?} acknowledged", DEVICE, step);
        match step.next(&self.config) {
            Some(next) => Setup::Send {
                step: next,
                attempt: 1,
                at_ms: now_ms.wrapping_add(COMMAND_GAP_MS),
            },
            None => self.finish_setup(now_ms),
        }
    }

    fn step_failed(&mut self, step: SetupStep, attempt: u8, now_ms: u32) -> Setup {
        if attempt < step.max_attempts() {
            return Setup::Send {
                step,
                attempt: attempt + 1,
                at_ms: now_ms.wrapping_add(RETRY_GAP_MS),
            };
        }

        if step == SetupStep::EnterConfig {
            warn!(
                "{}: device did not enter config mode after {} attempts, using device settings",
                DEVICE, attempt
            );
            return self.finish_setup(now_ms);
        }

        warn!("{}: {:?} not acknowledged, continuing anyway", DEVICE, step);
        match step.next(&self.config) {
            Some(next) => Setup::Send {
                step: next,
                attempt: 1,
                at_ms: now_ms.wrapping_add(COMMAND_GAP_MS),
            },
            None => self.finish_setup(now_ms),
        }
    }

    fn finish_setup(&mut self, now_ms: u32) -> Setup {
        self.link.discard_input();
        self.decoder.reset();
        self.acks.reset();
        self.last_success_ms = Some(now_ms);
        self.last_drain_ms = None;
        info!("{}: streaming", DEVICE);
        Setup::Done
    }

    fn drain(&mut self, now_ms: u32) {
        let pending = self.link.bytes_available();
        if pending > BACKLOG_WARN_BYTES {
            warn!("{}: {} bytes waiting, reads are falling behind", DEVICE, pending);
        }

        // Arrival times are unknown; anything read now may have landed
        // right after the previous drain.
        let arrived_ms = self.last_drain_ms.unwrap_or(now_ms);
        self.last_drain_ms = Some(now_ms);

        let mut read = 0;
        let mut buf = [0u8; READ_CHUNK];
        for _ in 0..MAX_DRAIN_CHUNKS {
            let n = self.link.read_chunk(&mut buf);
            if n == 0 {
                break;
            }
            read += n;
            for &byte in &buf[..n] {
                self.decode_byte(byte, arrived_ms);
            }
        }

        // Only a drain that found the port quiet can tell a frame stalled
        if read == 0 {
            if let Err(FrameError::Timeout) = self.decoder.check_timeout(now_ms) {
                bump(&mut self.stats.interbyte_timeouts);
            }
        }
    }

    fn decode_byte(&mut self, byte: u8, now_ms: u32) {
        if self.recent.is_full() {
            self.recent.pop_front();
        }
        let _ = self.recent.push_back(byte);

        match self.decoder.feed(byte, now_ms) {
            Ok(None) => {}
            Ok(Some(frame)) => {
                self.recent.clear();
                self.last_success_ms = Some(now_ms);
                self.silence_warned = false;
                bump(&mut self.stats.frames_decoded);
                if self.config.accepts(frame.distance_mm) {
                    trace!("{}: frame {} mm", DEVICE, frame.distance_mm);
                    self.latest = Some(frame.distance_mm);
                } else {
                    bump(&mut self.stats.out_of_range);
                    self.rejected = true;
                    debug!(
                        "{}: {} mm outside [{}, {}] mm",
                        DEVICE,
                        frame.distance_mm,
                        self.config.min_distance_mm,
                        self.config.max_distance_mm
                    );
                }
            }
            Err(FrameError::Timeout) => bump(&mut self.stats.interbyte_timeouts),
            Err(e) => {
                bump(&mut self.stats.malformed_frames);
                debug!("{}: discarded frame: {:?}", DEVICE, e);
            }
        }
    }

    fn dump_recent(&mut self) {
        let bytes: Vec<u8, DUMP_LIMIT> = self.recent.iter().copied().collect();
        transport::dump_bytes(DEVICE, &bytes);
        self.recent.clear();
    }
}

impl<U: Uart> RangeSensor for Ld2413Driver<U> {
    fn poll_tick(&mut self, now_ms: u32) -> TickOutcome {
        if !self.enabled {
            return TickOutcome::Disabled;
        }

        if !self.is_streaming() {
            self.advance_setup(now_ms);
            if !self.is_streaming() {
                return TickOutcome::Configuring;
            }
        }

        self.drain(now_ms);

        if let Some(distance_mm) = self.latest.take() {
            self.rejected = false;
            self.recent.clear();
            self.last_success_ms = Some(now_ms);
            self.silence_warned = false;
            self.publisher.publish(distance_mm, now_ms);
            info!("{}: published {} mm", DEVICE, distance_mm);
            return TickOutcome::Published(distance_mm);
        }

        let rejected = core::mem::take(&mut self.rejected);
        self.dump_recent();

        if let Some(since) = self.last_success_ms {
            if !self.silence_warned && elapsed_ms(since, now_ms) > SILENCE_WARN_MS {
                warn!("{}: no valid reading for {} ms", DEVICE, elapsed_ms(since, now_ms));
                self.silence_warned = true;
            }
        }

        if self.publisher.record_miss() {
            warn!(
                "{}: measurement stale after {} empty cycles",
                DEVICE,
                self.publisher.missed_cycles()
            );
            return TickOutcome::WentStale;
        }

        if rejected {
            TickOutcome::Rejected
        } else {
            TickOutcome::NoData
        }
    }

    fn service(&mut self, now_ms: u32) -> Option<TickOutcome> {
        if !self.enabled {
            return None;
        }
        if self.is_streaming() {
            self.drain(now_ms);
        } else {
            self.advance_setup(now_ms);
        }
        None
    }

    fn current(&self) -> Measurement {
        self.publisher.current()
    }

    fn update_interval_ms(&self) -> u32 {
        self.config.update_interval_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tidewatch_hal::mock::MockUart;
    use tidewatch_protocol::ld2413::{Ack, DataFrame, MAX_COMMAND_FRAME_LEN};

    fn driver(config: Ld2413Config) -> Ld2413Driver<MockUart> {
        Ld2413Driver::new(config, MockUart::new()).unwrap()
    }

    fn streaming(config: Ld2413Config) -> Ld2413Driver<MockUart> {
        driver(config).without_device_setup()
    }

    fn push(driver: &mut Ld2413Driver<MockUart>, bytes: &[u8]) {
        driver.link.uart_mut().push_rx(bytes);
    }

    fn ack_for(word: u16) -> Vec<u8, MAX_COMMAND_FRAME_LEN> {
        Ack {
            command: word,
            status: 0,
            data: Vec::new(),
        }
        .encode_to_vec()
        .unwrap()
    }

    /// Step the driver through setup, acknowledging commands accepted by
    /// `answer`. Returns the command words sent, in order.
    fn run_setup(
        driver: &mut Ld2413Driver<MockUart>,
        answer: impl Fn(u16) -> bool,
    ) -> Vec<u16, 16> {
        let mut sent = Vec::new();
        let mut now = 0;
        for _ in 0..500 {
            driver.service(now);
            let tx = driver.link.uart_mut().take_tx();
            if tx.len() >= 8 {
                let word = u16::from_le_bytes([tx[6], tx[7]]);
                sent.push(word).unwrap();
                if answer(word) {
                    push(driver, &ack_for(word));
                }
            }
            if driver.is_streaming() {
                break;
            }
            now += 10;
        }
        sent
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = Ld2413Config {
            min_distance_mm: 5000,
            max_distance_mm: 1000,
            ..Default::default()
        };
        let err = Ld2413Driver::new(config, MockUart::new()).err();
        assert_eq!(
            err,
            Some(ConfigError::DistanceBoundsInverted {
                min_mm: 5000,
                max_mm: 1000
            })
        );
    }

    #[test]
    fn test_nothing_sent_before_startup_delay() {
        let mut d = driver(Ld2413Config::default());
        assert_eq!(d.poll_tick(0), TickOutcome::Configuring);
        d.service(STARTUP_DELAY_MS - 1);
        assert_eq!(d.link.uart_mut().write_count(), 0);
        d.service(STARTUP_DELAY_MS);
        assert_eq!(d.setup_step(), Some(SetupStep::EnterConfig));
        assert_eq!(d.link.uart_mut().write_count(), 1);
    }

    #[test]
    fn test_setup_sequence() {
        let mut d = driver(Ld2413Config::default());
        let sent = run_setup(&mut d, |_| true);
        assert_eq!(
            sent,
            [
                cmd::ENTER_CONFIG,
                cmd::SET_MIN_DISTANCE,
                cmd::SET_MAX_DISTANCE,
                cmd::SET_REPORT_CYCLE,
                cmd::EXIT_CONFIG
            ]
        );
        assert!(d.is_streaming());
    }

    #[test]
    fn test_setup_sends_configured_values() {
        let mut d = driver(Ld2413Config {
            min_distance_mm: 250,
            ..Default::default()
        });
        // Enter config and wait for it to be acknowledged
        d.service(0);
        d.service(STARTUP_DELAY_MS);
        d.link.uart_mut().take_tx();
        push(&mut d, &ack_for(cmd::ENTER_CONFIG));
        d.service(STARTUP_DELAY_MS + 10);
        d.service(STARTUP_DELAY_MS + 10 + COMMAND_GAP_MS);

        let tx = d.link.uart_mut().take_tx();
        assert_eq!(
            tx.as_slice(),
            Command::set_min_distance(250).encode_to_vec().unwrap().as_slice()
        );
    }

    #[test]
    fn test_calibrate_on_boot() {
        let mut d = driver(Ld2413Config {
            calibrate_on_boot: true,
            ..Default::default()
        });
        let sent = run_setup(&mut d, |_| true);
        assert_eq!(sent[4], cmd::UPDATE_THRESHOLD);
        assert_eq!(sent[5], cmd::EXIT_CONFIG);
    }

    #[test]
    fn test_enter_config_retries_then_streams() {
        let mut d = driver(Ld2413Config::default());
        let sent = run_setup(&mut d, |_| false);
        assert_eq!(sent, [cmd::ENTER_CONFIG; 5]);
        assert!(d.is_streaming());
    }

    #[test]
    fn test_unacknowledged_settings_continue() {
        let mut d = driver(Ld2413Config::default());
        let sent = run_setup(&mut d, |word| word == cmd::ENTER_CONFIG);
        assert_eq!(
            sent,
            [
                cmd::ENTER_CONFIG,
                cmd::SET_MIN_DISTANCE,
                cmd::SET_MAX_DISTANCE,
                cmd::SET_REPORT_CYCLE,
                cmd::EXIT_CONFIG,
                cmd::EXIT_CONFIG,
                cmd::EXIT_CONFIG
            ]
        );
        assert!(d.is_streaming());
    }

    #[test]
    fn test_failure_status_retries() {
        let mut d = driver(Ld2413Config::default());
        d.service(0);
        d.service(STARTUP_DELAY_MS);
        d.link.uart_mut().take_tx();
        let nack = Ack {
            command: cmd::ENTER_CONFIG,
            status: 1,
            data: Vec::new(),
        }
        .encode_to_vec()
        .unwrap();
        push(&mut d, &nack);
        d.service(STARTUP_DELAY_MS + 10);
        d.service(STARTUP_DELAY_MS + 10 + RETRY_GAP_MS);
        assert_eq!(d.setup_step(), Some(SetupStep::EnterConfig));
        assert_eq!(d.link.uart_mut().write_count(), 2);
    }

    #[test]
    fn test_scenario_publishes_4200() {
        let config = Ld2413Config {
            min_distance_mm: 150,
            max_distance_mm: 10_500,
            report_cycle_ms: 160,
            ..Default::default()
        };
        let mut d = driver(config);
        run_setup(&mut d, |_| true);

        push(&mut d, &DataFrame::new(4200.0).encode());
        assert_eq!(d.poll_tick(5000), TickOutcome::Published(4200.0));
        let m = d.current();
        assert_eq!(m.distance_mm, 4200.0);
        assert!(m.valid);
        assert_eq!(m.updated_at_ms, 5000);
    }

    #[test]
    fn test_only_latest_frame_published() {
        let mut d = streaming(Ld2413Config::default());
        for distance in [1000.0, 2000.0, 3000.0] {
            push(&mut d, &DataFrame::new(distance).encode());
        }
        assert_eq!(d.poll_tick(0), TickOutcome::Published(3000.0));
        assert_eq!(d.stats().frames_decoded, 3);
        // Nothing new
        assert_eq!(d.poll_tick(1000), TickOutcome::NoData);
        assert_eq!(d.current().distance_mm, 3000.0);
    }

    #[test]
    fn test_service_keeps_latest_between_ticks() {
        let mut d = streaming(Ld2413Config::default());
        push(&mut d, &DataFrame::new(1200.0).encode());
        d.service(10);
        assert_eq!(d.link.uart_mut().pending_rx(), 0);
        push(&mut d, &DataFrame::new(1300.0).encode());
        d.service(20);
        assert_eq!(d.poll_tick(30), TickOutcome::Published(1300.0));
    }

    #[test]
    fn test_fragmented_frame() {
        let mut d = streaming(Ld2413Config::default());
        let raw = DataFrame::new(2500.0).encode();
        push(&mut d, &raw[..5]);
        d.service(0);
        push(&mut d, &raw[5..]);
        assert_eq!(d.poll_tick(20), TickOutcome::Published(2500.0));
    }

    #[test]
    fn test_out_of_window_rejected() {
        let mut d = streaming(Ld2413Config::default());
        push(&mut d, &DataFrame::new(100.0).encode());
        assert_eq!(d.poll_tick(0), TickOutcome::Rejected);
        assert_eq!(d.stats().out_of_range, 1);
        assert!(!d.current().valid);

        push(&mut d, &DataFrame::new(12_000.0).encode());
        assert_eq!(d.poll_tick(1000), TickOutcome::Rejected);
        assert_eq!(d.stats().out_of_range, 2);
    }

    #[test]
    fn test_malformed_frame_counted() {
        let mut d = streaming(Ld2413Config::default());
        let mut raw = DataFrame::new(2000.0).encode();
        raw[12] = 0x00;
        push(&mut d, &raw);
        assert_eq!(d.poll_tick(0), TickOutcome::NoData);
        assert_eq!(d.stats().malformed_frames, 1);

        // Decoder resumed seeking
        push(&mut d, &DataFrame::new(2100.0).encode());
        assert_eq!(d.poll_tick(1000), TickOutcome::Published(2100.0));
    }

    #[test]
    fn test_stalled_frame_times_out() {
        let mut d = streaming(Ld2413Config::default());
        let raw = DataFrame::new(2000.0).encode();
        push(&mut d, &raw[..7]);
        d.service(0);
        assert_eq!(d.poll_tick(500), TickOutcome::NoData);
        assert_eq!(d.stats().interbyte_timeouts, 1);
    }

    #[test]
    fn test_frame_split_across_ticks() {
        let mut d = streaming(Ld2413Config::default());
        let raw = DataFrame::new(2500.0).encode();
        push(&mut d, &raw[..7]);
        assert_eq!(d.poll_tick(0), TickOutcome::NoData);
        push(&mut d, &raw[7..]);
        assert_eq!(d.poll_tick(1000), TickOutcome::Published(2500.0));
        assert_eq!(d.stats().interbyte_timeouts, 0);
        assert_eq!(d.stats().frames_decoded, 1);
    }

    #[test]
    fn test_stall_detected_only_on_quiet_drain() {
        let mut d = streaming(Ld2413Config::default());
        let raw = DataFrame::new(2500.0).encode();
        push(&mut d, &raw[..7]);
        d.poll_tick(0);
        assert_eq!(d.poll_tick(1000), TickOutcome::NoData);
        assert_eq!(d.stats().interbyte_timeouts, 1);

        // Remainder of the abandoned frame is seen as noise
        push(&mut d, &raw[7..]);
        push(&mut d, &DataFrame::new(2600.0).encode());
        assert_eq!(d.poll_tick(2000), TickOutcome::Published(2600.0));
    }

    #[test]
    fn test_out_of_window_frames_keep_device_alive() {
        let mut d = streaming(Ld2413Config {
            stale_after_cycles: 0,
            ..Default::default()
        });
        for tick in 0..8u32 {
            push(&mut d, &DataFrame::new(100.0).encode());
            assert_eq!(d.poll_tick(tick * 1000), TickOutcome::Rejected);
        }
        assert!(!d.silence_warned);
        assert_eq!(d.last_success_ms, Some(6000));
    }

    #[test]
    fn test_silent_device_warned_once() {
        let mut d = streaming(Ld2413Config::default());
        push(&mut d, &DataFrame::new(800.0).encode());
        d.poll_tick(0);
        for tick in 1..=5u32 {
            d.poll_tick(tick * 1000);
        }
        assert!(!d.silence_warned);
        d.poll_tick(6000);
        assert!(d.silence_warned);
    }

    #[test]
    fn test_goes_stale() {
        let mut d = streaming(Ld2413Config {
            stale_after_cycles: 3,
            ..Default::default()
        });
        push(&mut d, &DataFrame::new(800.0).encode());
        assert!(d.poll_tick(0).is_published());

        assert_eq!(d.poll_tick(1000), TickOutcome::NoData);
        assert_eq!(d.poll_tick(2000), TickOutcome::NoData);
        assert_eq!(d.poll_tick(3000), TickOutcome::WentStale);
        let m = d.current();
        assert!(m.stale);
        assert_eq!(m.distance_mm, 800.0);

        push(&mut d, &DataFrame::new(900.0).encode());
        assert_eq!(d.poll_tick(4000), TickOutcome::Published(900.0));
        assert!(!d.current().stale);
    }

    #[test]
    fn test_disconnected_port_is_no_data() {
        let mut d = streaming(Ld2413Config::default());
        push(&mut d, &DataFrame::new(800.0).encode());
        d.link.uart_mut().set_disconnected(true);
        assert_eq!(d.poll_tick(0), TickOutcome::NoData);
        assert!(d.stats().link_errors >= 1);

        d.link.uart_mut().set_disconnected(false);
        assert_eq!(d.poll_tick(1000), TickOutcome::Published(800.0));
    }

    #[test]
    fn test_disable_abandons_setup() {
        let mut d = driver(Ld2413Config::default());
        d.service(0);
        d.service(STARTUP_DELAY_MS);
        assert_eq!(d.setup_step(), Some(SetupStep::EnterConfig));

        d.disable();
        assert_eq!(d.poll_tick(STARTUP_DELAY_MS + 10), TickOutcome::Disabled);
        assert_eq!(d.service(STARTUP_DELAY_MS + 20), None);
        assert_eq!(d.setup_step(), None);

        d.enable();
        assert_eq!(d.poll_tick(STARTUP_DELAY_MS + 30), TickOutcome::Configuring);
    }

    #[test]
    fn test_release_returns_port() {
        let mut d = streaming(Ld2413Config::default());
        push(&mut d, &[1, 2, 3]);
        d.disable();
        let uart = d.release();
        assert_eq!(uart.pending_rx(), 3);
    }

    #[test]
    fn test_check_port() {
        let d = streaming(Ld2413Config::default());
        assert!(d.check_port(&UartConfig::n81(115_200)));
        assert!(!d.check_port(&UartConfig::n81(256_000)));
    }

    proptest! {
        #[test]
        fn prop_chunked_stream_publishes_last_in_window(
            distances in proptest::collection::vec(150.0f32..10_500.0, 1..6),
            chunk in 1usize..20,
        ) {
            let mut d = streaming(Ld2413Config::default());
            let mut stream: Vec<u8, 96> = Vec::new();
            for &distance in &distances {
                stream.extend_from_slice(&DataFrame::new(distance).encode()).unwrap();
            }

            for (i, piece) in stream.chunks(chunk).enumerate() {
                push(&mut d, piece);
                d.service(i as u32);
            }

            let last = distances[distances.len() - 1];
            prop_assert_eq!(d.poll_tick(100), TickOutcome::Published(last));
            prop_assert_eq!(d.stats().frames_decoded, distances.len() as u32);
        }
    }
}
