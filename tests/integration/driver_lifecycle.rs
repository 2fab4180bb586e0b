//! Integration tests for the driver lifecycle using MockReceiver.
//!
//! All tests run on paused tokio time, so sleeps advance the driver's
//! clock without waiting.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast::Receiver;

use vmx::command::{Command, CommandKind, CommandValue};
use vmx::config::DriverConfig;
use vmx::device::{CommandReceiver, ConnectionEvent, MixerDevice, MAKE_READY_CONTEXT};
use vmx::error::VmxError;
use vmx::events::DeviceEvent;
use vmx::scheduler::TokioClock;
use vmx::state::{InputRef, MixerState, Transition, TransitionEffect};
use vmx::timeline::{Content, TimelineObject, TimelineState};

use crate::common::fixtures::{audio, cut_at, paused_device};
use crate::common::init_test_logging;

fn drain(rx: &mut Receiver<DeviceEvent>) -> Vec<DeviceEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// A transport whose send crashes instead of returning an error.
struct CrashingReceiver;

#[async_trait]
impl CommandReceiver for CrashingReceiver {
    async fn send(
        &self,
        _time: i64,
        command: &Command,
        _context: Option<&str>,
        _timeline_id: &str,
    ) -> vmx::error::Result<()> {
        panic!("transport crashed while sending {command}");
    }

    async fn connect(&self) -> vmx::error::Result<Option<MixerState>> {
        Ok(None)
    }
}

/// Applying before init is refused and leaves no trace.
#[tokio::test(start_paused = true)]
async fn test_apply_before_init() {
    init_test_logging();
    let (device, receiver) = paused_device(DriverConfig::default(), 0);
    let mut rx = device.subscribe();

    let result = device.apply_state(&cut_at(100, 2));
    assert!(matches!(result, Err(VmxError::NotInitialized { .. })));

    advance(500).await;
    receiver.assert_nothing_sent();
    assert!(device.queue().is_empty());
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, DeviceEvent::Info { .. })));
}

/// A cut is delivered at its planned time, in reconciliation order.
#[tokio::test(start_paused = true)]
async fn test_cut_is_delivered_on_time() {
    init_test_logging();
    let (device, receiver) = paused_device(DriverConfig::default(), 0);
    device.init().await.unwrap();

    let result = device.apply_state(&cut_at(100, 2)).unwrap();
    assert_eq!(result.commands.len(), 4);
    assert_eq!(device.queue().len(), 4);

    advance(50).await;
    receiver.assert_nothing_sent();

    advance(100).await;
    receiver.assert_kinds(&[
        CommandKind::PreviewInput,
        CommandKind::TransitionEffect,
        CommandKind::TransitionDuration,
        CommandKind::Transition,
    ]);
    let sent = receiver.sent();
    assert!(sent.iter().all(|s| s.time == 100));
    assert_eq!(sent[3].context.as_deref(), Some("program"));
    assert_eq!(sent[3].timeline_id, "obj-program-2");
    assert!(device.queue().is_empty());
}

/// Re-planning the same future time replaces the queued commands.
#[tokio::test(start_paused = true)]
async fn test_replan_replaces_future_commands() {
    init_test_logging();
    let (device, receiver) = paused_device(DriverConfig::default(), 0);
    device.init().await.unwrap();

    device.apply_state(&cut_at(1_000, 2)).unwrap();
    advance(100).await;
    let replanned = device.apply_state(&cut_at(1_000, 3)).unwrap();

    // Diffed against the state before t=1000, not the cancelled plan.
    assert_eq!(replanned.commands.len(), 4);
    assert_eq!(device.queue().len(), 4);

    advance(1_000).await;
    let sent = receiver.sent();
    assert_eq!(sent.len(), 4);
    assert_eq!(sent[0].command.input, Some(InputRef::Number(3)));
    assert_eq!(
        device.current_state().and_then(|s| s.active),
        Some(InputRef::Number(3))
    );
}

/// An identical state applied later produces no commands.
#[tokio::test(start_paused = true)]
async fn test_unchanged_state_is_quiet() {
    init_test_logging();
    let (device, receiver) = paused_device(DriverConfig::default(), 0);
    device.init().await.unwrap();

    device.apply_state(&cut_at(10, 2)).unwrap();
    advance(50).await;
    let again = device.apply_state(&cut_at(60, 2)).unwrap();

    assert!(again.commands.is_empty());
    advance(50).await;
    assert_eq!(receiver.sent_count(), 4);
}

/// Volume changes on a known input produce exactly one command.
#[tokio::test(start_paused = true)]
async fn test_volume_change_on_reported_input() {
    init_test_logging();
    let (device, receiver) = paused_device(DriverConfig::default(), 0);
    let mut reported = MixerState::new();
    reported.inputs.push(vmx::state::Input {
        number: Some(3),
        volume: Some(50),
        ..vmx::state::Input::default()
    });
    device.on_connection_event(ConnectionEvent::Connected {
        state: Some(reported),
    });

    let timeline = TimelineState::new(10).with_layer("music", audio(3, 80));
    device.apply_state(&timeline).unwrap();
    advance(20).await;

    let sent = receiver.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].command.kind, CommandKind::Audio);
    assert_eq!(sent[0].command.value, Some(CommandValue::Int(80)));
}

/// cancel_from and clear_future differ only at the boundary.
#[tokio::test(start_paused = true)]
async fn test_cancel_boundaries() {
    init_test_logging();
    let (device, receiver) = paused_device(DriverConfig::default(), 0);
    device.init().await.unwrap();

    let rec = TimelineState::new(500)
        .with_layer("rec", TimelineObject::new("obj-rec", Content::StartRecording));
    device.apply_state(&rec).unwrap();
    let stream = TimelineState::new(800)
        .with_layer("rec", TimelineObject::new("obj-rec", Content::StartRecording))
        .with_layer("stream", TimelineObject::new("obj-stream", Content::StartStreaming));
    device.apply_state(&stream).unwrap();
    assert_eq!(device.queue().len(), 2);

    assert_eq!(device.clear_future(800), 0);
    assert_eq!(device.cancel_from(800), 1);
    assert_eq!(device.queue().len(), 1);

    advance(1_000).await;
    receiver.assert_kinds(&[CommandKind::StartRecording]);
}

/// Make-ready sends the configured commands with their own context.
#[tokio::test(start_paused = true)]
async fn test_make_ready() {
    init_test_logging();
    let config = DriverConfig {
        make_ready_commands: vec![
            Command::new(CommandKind::StopRecording),
            Command::new(CommandKind::FadeToBlack),
        ],
        ..DriverConfig::default()
    };
    let (device, receiver) = paused_device(config, 0);
    device.init().await.unwrap();

    assert_eq!(device.make_ready(false).unwrap(), 0);
    assert_eq!(device.make_ready(true).unwrap(), 2);
    advance(10).await;

    receiver.assert_kinds(&[CommandKind::StopRecording, CommandKind::FadeToBlack]);
    let sent = receiver.sent();
    assert!(sent
        .iter()
        .all(|s| s.context.as_deref() == Some(MAKE_READY_CONTEXT) && s.timeline_id.is_empty()));
}

/// Layers mapped to another device are ignored.
#[tokio::test(start_paused = true)]
async fn test_unmapped_layers_are_ignored() {
    init_test_logging();
    let mut config = DriverConfig::default();
    config.mappings.insert("program".to_string(), "vmix0".to_string());
    config.mappings.insert("other".to_string(), "atem0".to_string());
    let (device, receiver) = paused_device(config, 0);
    device.init().await.unwrap();

    let timeline = TimelineState::new(10)
        .with_layer("other", TimelineObject::new("obj-x", Content::StartStreaming))
        .with_layer("program", TimelineObject::new("obj-y", Content::StartRecording));
    device.apply_state(&timeline).unwrap();
    advance(20).await;

    receiver.assert_kinds(&[CommandKind::StartRecording]);
}

/// A rejected command is reported and later commands still go out.
#[tokio::test(start_paused = true)]
async fn test_send_failure_is_reported() {
    init_test_logging();
    let (device, receiver) = paused_device(DriverConfig::default(), 0);
    let mut rx = device.subscribe();
    device.init().await.unwrap();

    receiver.inject_error(VmxError::DeviceCommunication("socket closed".to_string()));
    let timeline = TimelineState::new(10)
        .with_layer("rec", TimelineObject::new("obj-rec", Content::StartRecording))
        .with_layer("stream", TimelineObject::new("obj-stream", Content::StartStreaming));
    device.apply_state(&timeline).unwrap();
    advance(20).await;

    receiver.assert_kinds(&[CommandKind::StartStreaming]);
    let events = drain(&mut rx);
    let names: Vec<_> = events.iter().map(DeviceEvent::name).collect();
    assert!(names.contains(&"command_error"), "events: {names:?}");
    assert!(names.contains(&"error"), "events: {names:?}");
    assert_eq!(names.iter().filter(|n| **n == "command_sent").count(), 2);
}

/// Connection changes surface as status events.
#[tokio::test(start_paused = true)]
async fn test_connection_events() {
    init_test_logging();
    let (device, _receiver) = paused_device(DriverConfig::default(), 0);
    let mut rx = device.subscribe();

    device.init().await.unwrap();
    device.on_connection_event(ConnectionEvent::Disconnected);
    device.on_connection_event(ConnectionEvent::Error("timeout".to_string()));

    let names: Vec<_> = drain(&mut rx).iter().map(DeviceEvent::name).collect();
    assert_eq!(
        names,
        vec![
            "connection_changed",
            "reset_requested",
            "connection_changed",
            "error"
        ]
    );
    assert!(!device.is_connected());
}

/// An externally changed device state asks the owner to resync.
#[tokio::test(start_paused = true)]
async fn test_external_change_requests_reset() {
    init_test_logging();
    let (device, _receiver) = paused_device(DriverConfig::default(), 0);
    device.init().await.unwrap();
    let mut rx = device.subscribe();

    let mut state = MixerState::new();
    state.streaming = true;
    device.on_device_state(state.clone());
    device.on_device_state(state);

    let resets = drain(&mut rx)
        .iter()
        .filter(|e| matches!(e, DeviceEvent::ResetRequested))
        .count();
    assert_eq!(resets, 1);
}

/// With retention set, history does not grow without bound.
#[tokio::test(start_paused = true)]
async fn test_history_retention() {
    init_test_logging();
    let config = DriverConfig {
        history_retention_ms: Some(100),
        ..DriverConfig::default()
    };
    let (device, _receiver) = paused_device(config, 0);
    device.init().await.unwrap();

    for step in 0..10 {
        device.apply_state(&cut_at(step * 50, 2)).unwrap();
        advance(50).await;
    }
    // The state as of now is still answerable after pruning.
    assert_eq!(
        device.current_state().and_then(|s| s.active),
        Some(InputRef::Number(2))
    );
}

/// Shutdown drops pending work.
#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending() {
    init_test_logging();
    let (device, receiver) = paused_device(DriverConfig::default(), 0);
    device.init().await.unwrap();

    device.apply_state(&cut_at(1_000, 2)).unwrap();
    device.shutdown();
    advance(2_000).await;

    receiver.assert_nothing_sent();
    assert!(device.queue().is_empty());
}

/// A program switch through a transition the mixer already knows still cuts.
#[tokio::test(start_paused = true)]
async fn test_switch_after_connect_with_transition_table() {
    init_test_logging();
    let (device, receiver) = paused_device(DriverConfig::default(), 0);
    let mut reported = MixerState::new();
    reported.active = Some(InputRef::Number(1));
    reported.transitions = vec![
        Transition {
            number: 1,
            effect: TransitionEffect::Cut,
            duration: 0,
        },
        Transition {
            number: 2,
            effect: TransitionEffect::Fade,
            duration: 500,
        },
    ];
    device.on_connection_event(ConnectionEvent::Connected {
        state: Some(reported),
    });

    let result = device.apply_state(&cut_at(10, 5)).unwrap();
    assert_eq!(result.commands.len(), 4);
    advance(20).await;

    receiver.assert_kinds(&[
        CommandKind::PreviewInput,
        CommandKind::TransitionEffect,
        CommandKind::TransitionDuration,
        CommandKind::Transition,
    ]);
    assert_eq!(receiver.sent()[0].command.input, Some(InputRef::Number(5)));
}

/// A crashing send is reported with the command that caused it.
#[tokio::test(start_paused = true)]
async fn test_crashed_send_keeps_correlation() {
    init_test_logging();
    let device = MixerDevice::new(
        DriverConfig::default(),
        Arc::new(TokioClock::starting_at(0)),
        Arc::new(CrashingReceiver),
    )
    .unwrap();
    let mut rx = device.subscribe();
    device.init().await.unwrap();

    let timeline = TimelineState::new(10)
        .with_layer("rec", TimelineObject::new("obj-rec", Content::StartRecording));
    device.apply_state(&timeline).unwrap();
    advance(50).await;

    let failure = drain(&mut rx).into_iter().find_map(|event| match event {
        DeviceEvent::Error {
            message,
            command: Some(command),
            ..
        } => Some((message, command)),
        _ => None,
    });
    let (message, command) = failure.expect("error event carrying the command");
    assert_eq!(command.kind, CommandKind::StartRecording);
    assert_eq!(command.context.as_deref(), Some("rec"));
    assert_eq!(command.timeline_id, "obj-rec");
    assert!(message.contains("transport crashed"), "{message}");
    assert!(message.contains("obj-rec"), "{message}");
}

/// After shutdown, applying is refused without touching the history.
#[tokio::test(start_paused = true)]
async fn test_apply_after_shutdown_is_refused() {
    init_test_logging();
    let (device, receiver) = paused_device(DriverConfig::default(), 0);
    device.init().await.unwrap();
    device.apply_state(&cut_at(10, 2)).unwrap();
    advance(20).await;
    device.shutdown();

    // Unchanged state: no commands to enqueue, still refused.
    let same = device.apply_state(&cut_at(30, 2));
    assert!(matches!(same, Err(VmxError::InvalidArgument(_))));
    let switch = device.apply_state(&cut_at(30, 3));
    assert!(matches!(switch, Err(VmxError::InvalidArgument(_))));

    advance(50).await;
    assert_eq!(
        device.current_state().and_then(|s| s.active),
        Some(InputRef::Number(2))
    );
    assert_eq!(receiver.sent_count(), 4);
}
