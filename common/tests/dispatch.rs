use core::sync::atomic::{AtomicU32, Ordering};

use embassy_executor::{Executor, Spawner};
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Instant, Timer};
use static_cell::StaticCell;
use loratrail_common::{
    RawMutex,
    config::Config,
    dispatcher::{COMMANDS, Command, Dispatcher, PERIODIC_REMAINING, STATUS_SNAPSHOTS},
    error::Error,
    event::{Event, EventQueue},
    payload::{AcquisitionGate, Payload, PayloadBuilder},
    radio::{JoinRequest, LoraRadio, MessageKind, RadioMutex},
    status::Status,
};

type SendRecord = (u8, Payload, MessageKind);

static SENT: Channel<RawMutex, SendRecord, 16> = Channel::new();
/// Scripted send outcomes; an unscripted send succeeds.
static SEND_SCRIPT: Channel<RawMutex, Result<(), Error>, 4> = Channel::new();
static JOIN_CALLS: AtomicU32 = AtomicU32::new(0);
static GATE_EVENTS: Channel<RawMutex, bool, 16> = Channel::new();

static RADIO: RadioMutex<FakeRadio> = Mutex::new(None);
static QUEUE: EventQueue = EventQueue::new();

struct FakeRadio;

impl LoraRadio for FakeRadio {
    async fn start(&mut self) -> loratrail_common::Result<()> {
        Ok(())
    }

    async fn set_data_rate(
        &mut self,
        _data_rate: loratrail_common::config::DataRate,
    ) -> loratrail_common::Result<()> {
        Ok(())
    }

    async fn join(&mut self, _request: &JoinRequest) -> loratrail_common::Result<()> {
        JOIN_CALLS.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn send(
        &mut self,
        port: u8,
        payload: &[u8],
        kind: MessageKind,
    ) -> loratrail_common::Result<()> {
        let mut copy = Payload::new();
        copy.extend_from_slice(payload).unwrap();
        SENT.send((port, copy, kind)).await;
        SEND_SCRIPT.try_receive().unwrap_or(Ok(()))
    }
}

/// One-byte record carrying the fix flag, enough to observe the builder
/// input.
struct FakeBuilder;

impl PayloadBuilder for FakeBuilder {
    const GATED: bool = true;

    fn build(&mut self, fix: bool) -> Payload {
        let mut payload = Payload::new();
        payload.push(fix as u8).unwrap();
        payload
    }
}

struct FakeGate;

impl AcquisitionGate for FakeGate {
    fn set_enabled(&mut self, enabled: bool) {
        GATE_EVENTS.try_send(enabled).unwrap();
    }
}

type TestDispatcher = Dispatcher<FakeRadio, FakeBuilder, FakeGate>;

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

#[test]
fn dispatcher_control_loop() {
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(main(spawner).unwrap());
    });
}

#[embassy_executor::task]
async fn dispatcher_loop(mut dispatcher: TestDispatcher) {
    dispatcher.run().await;
}

#[embassy_executor::task]
async fn join_worker_loop(
    mut worker: loratrail_common::join::JoinWorker<FakeRadio, NeverReboot>,
) {
    worker.run().await;
}

struct NeverReboot;

impl loratrail_common::join::Reboot for NeverReboot {
    fn reboot(&mut self) {
        panic!("unexpected reboot");
    }
}

async fn snapshot() -> Status {
    COMMANDS.send(Command::ReportStatus).await;
    STATUS_SNAPSHOTS.wait().await
}

async fn wait_joined() {
    loop {
        if snapshot().await.joined {
            return;
        }
        Timer::after_millis(20).await;
    }
}

/// Skips acquisition-off notifications, returns on the next gate opening.
async fn gate_opened() {
    while !GATE_EVENTS.receive().await {}
}

fn test_config() -> Config {
    Config {
        auto_join: true,
        // periodic sending disabled at boot
        send_interval: 0,
        send_min_delay: 1,
        max_sensor_on_time: 1,
        join_try_count: 1,
        join_attempt_delay: 0,
        join_retry_interval: 60,
        max_failed_msgs: 0,
        ..Default::default()
    }
}

#[embassy_executor::task]
async fn main(spawner: Spawner) {
    {
        *(RADIO.lock().await) = Some(FakeRadio);
    }
    let config = test_config();
    let worker = loratrail_common::join::JoinWorker::new(
        &RADIO,
        NeverReboot,
        Duration::from_secs(30),
    );
    spawner.spawn(join_worker_loop(worker).unwrap());

    let mut dispatcher = TestDispatcher::new(&RADIO, &QUEUE, FakeBuilder, FakeGate, config);
    dispatcher.start().await.unwrap();
    spawner.spawn(dispatcher_loop(dispatcher).unwrap());
    wait_joined().await;
    assert_eq!(JOIN_CALLS.load(Ordering::Relaxed), 1);

    // With a zero send interval every request is blocked; a burst is still
    // fully drained.
    QUEUE.push(Event::PeriodicTimer);
    QUEUE.push(Event::SensorTrigger);
    QUEUE.push(Event::SensorTrigger);
    QUEUE.push(Event::ButtonPressed);
    Timer::after_millis(100).await;
    assert!(QUEUE.is_empty());
    assert!(SENT.is_empty());
    assert!(GATE_EVENTS.is_empty());
    let status = snapshot().await;
    assert_eq!(status.msgs_sent, 0);
    // the second trigger fell into the debounce window
    assert_eq!(status.trigger_events, 1);

    // No periodic timer is armed while the interval is zero.
    COMMANDS.send(Command::PeriodicRemaining).await;
    assert_eq!(PERIODIC_REMAINING.wait().await, None);

    // Enable sending, far-away periodic timer so only our events drive the
    // loop.
    let mut config = test_config();
    config.send_interval = 3600;
    COMMANDS.send(Command::ApplyConfig(config)).await;
    COMMANDS.send(Command::UpdatePeriodic).await;
    COMMANDS.send(Command::PeriodicRemaining).await;
    let remaining = PERIODIC_REMAINING.wait().await.unwrap();
    assert!(remaining <= Duration::from_secs(3600));
    assert!(remaining >= Duration::from_secs(3590));

    // First send: acquisition opens, a fix closes it, the first message is
    // the confirmed connectivity probe.
    QUEUE.push(Event::ButtonPressed);
    gate_opened().await;
    QUEUE.push(Event::LocationFix);
    let (port, payload, kind) = SENT.receive().await;
    assert_eq!(port, 2);
    assert_eq!(payload.as_slice(), &[1]);
    assert_eq!(kind, MessageKind::Confirmed);

    // Two requests inside the minimum spacing: the first arms one delayed
    // send, the second is dropped.
    let before = Instant::now();
    QUEUE.push(Event::ButtonPressed);
    QUEUE.push(Event::ButtonPressed);
    Timer::after_millis(50).await;
    assert!(snapshot().await.delayed_pending);
    gate_opened().await;
    assert!(Instant::now() - before >= Duration::from_millis(500));
    assert!(!snapshot().await.delayed_pending);
    QUEUE.push(Event::LocationFix);
    let (_, payload, kind) = SENT.receive().await;
    assert_eq!(payload.as_slice(), &[1]);
    assert_eq!(kind, MessageKind::Unconfirmed);
    // exactly one acquisition ran for the two requests
    Timer::after_millis(1500).await;
    assert!(!GATE_EVENTS.receive().await);
    assert!(GATE_EVENTS.is_empty());
    assert!(SENT.is_empty());

    // No fix within the acquisition window: the telemetry goes out anyway,
    // without the fix flag.
    QUEUE.push(Event::ButtonPressed);
    gate_opened().await;
    let (_, payload, _) = SENT.receive().await;
    assert_eq!(payload.as_slice(), &[0]);
    assert!(!GATE_EVENTS.receive().await);

    // A failed send above the failure limit forces a re-join.
    SEND_SCRIPT.send(Err(Error::SendError)).await;
    Timer::after_millis(1100).await;
    QUEUE.push(Event::ButtonPressed);
    gate_opened().await;
    QUEUE.push(Event::LocationFix);
    let _ = SENT.receive().await;
    wait_joined().await;
    assert_eq!(JOIN_CALLS.load(Ordering::Relaxed), 2);
    let status = snapshot().await;
    assert_eq!(status.msgs_sent, 3);
    assert_eq!(status.msgs_failed_total, 1);

    // The re-armed periodic timer drives a send on its own.
    let mut config = test_config();
    config.send_interval = 1;
    COMMANDS.send(Command::ApplyConfig(config)).await;
    Timer::after_millis(1100).await;
    QUEUE.push(Event::LocationFix);
    let (_, payload, _) = SENT.receive().await;
    assert_eq!(payload.as_slice(), &[1]);

    std::process::exit(0); // Exit from executor
}
