//! Integration tests for delivery discipline and timing diagnostics.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use vmx::command::CommandKind;
use vmx::config::DriverConfig;
use vmx::events::DeviceEvent;
use vmx::scheduler::{CommandQueue, QueueEvent, QueueOptions, SendMode, TokioClock};
use vmx::timeline::{Content, TimelineObject, TimelineState};

use crate::common::fixtures::paused_device;
use crate::common::init_test_logging;

type Log = Arc<Mutex<Vec<String>>>;

fn queue(mode: SendMode, options: QueueOptions) -> CommandQueue<String> {
    CommandQueue::new(Arc::new(TokioClock::starting_at(0)), mode, options)
}

fn push(log: &Log, entry: String) {
    log.lock().unwrap().push(entry);
}

/// Enqueue an operation that logs its start and end around `work_ms`.
fn slow_op(
    queue: &CommandQueue<String>,
    log: &Log,
    time: i64,
    name: &str,
    work_ms: u64,
) {
    let log = Arc::clone(log);
    queue
        .enqueue(
            time,
            move |name: String| async move {
                push(&log, format!("start {name}"));
                tokio::time::sleep(Duration::from_millis(work_ms)).await;
                push(&log, format!("end {name}"));
                Ok(())
            },
            name.to_string(),
        )
        .unwrap();
}

/// In-order delivery finishes each send before starting the next.
#[tokio::test(start_paused = true)]
async fn test_in_order_serializes_sends() {
    init_test_logging();
    let log: Log = Arc::default();
    let q = queue(SendMode::InOrder, QueueOptions::default());
    slow_op(&q, &log, 10, "a", 100);
    slow_op(&q, &log, 10, "b", 10);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        *log.lock().unwrap(),
        vec!["start a", "end a", "start b", "end b"]
    );
}

/// Burst delivery starts every due send without waiting.
#[tokio::test(start_paused = true)]
async fn test_burst_overlaps_sends() {
    init_test_logging();
    let log: Log = Arc::default();
    let q = queue(SendMode::Burst, QueueOptions::default());
    slow_op(&q, &log, 10, "a", 100);
    slow_op(&q, &log, 10, "b", 10);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let log = log.lock().unwrap().clone();
    assert_eq!(&log[..2], ["start a", "start b"]);
    assert_eq!(log.len(), 4);
}

/// A send that stalls in-order delivery is reported as slow fulfillment.
#[tokio::test(start_paused = true)]
async fn test_slow_fulfillment_is_reported() {
    init_test_logging();
    let log: Log = Arc::default();
    let q = queue(
        SendMode::InOrder,
        QueueOptions {
            limit_slow_fulfilled_command: Some(50),
            ..QueueOptions::default()
        },
    );
    let mut rx = q.subscribe();
    slow_op(&q, &log, 10, "a", 200);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let event = rx.try_recv().unwrap();
    let QueueEvent::SlowFulfilled(report) = event else {
        panic!("expected SlowFulfilled, got {event:?}");
    };
    assert_eq!(report.planned, 10);
    assert!(report.fulfilled.is_some_and(|t| t >= 210));
}

/// Slow sends surface as driver events carrying the device name.
#[tokio::test(start_paused = true)]
async fn test_driver_forwards_slow_diagnostics() {
    init_test_logging();
    let config = DriverConfig {
        limit_slow_fulfilled_command_ms: Some(50),
        ..DriverConfig::default()
    };
    let (device, receiver) = paused_device(config, 0);
    receiver.set_latency(Duration::from_millis(120));
    let mut rx = device.subscribe();
    device.init().await.unwrap();

    let timeline = TimelineState::new(0)
        .with_layer("rec", TimelineObject::new("obj-rec", Content::StartRecording));
    device.apply_state(&timeline).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    receiver.assert_kinds(&[CommandKind::StartRecording]);
    let mut slow = None;
    while let Ok(event) = rx.try_recv() {
        if let DeviceEvent::SlowFulfilled { device, message, .. } = event {
            slow = Some((device, message));
        }
    }
    let (name, message) = slow.expect("slow fulfillment event");
    assert_eq!(name, "VMix-Send vmix0");
    assert!(message.starts_with("VMix-Send vmix0: "), "{message}");
}
