//! Phase 2: ordered command list between two mixer states.

use tracing::trace;

use super::Origins;
use crate::command::{Command, CommandKind};
use crate::state::{InputRef, MixerState, MomentaryAction, PlaybackState, Transition};

/// Compute the commands that move the mixer from `previous` to `projected`.
///
/// Returns the final state (with `fade_to_black` cleared where a switch
/// implies it) and the commands in emission order.
#[must_use]
pub fn diff(
    previous: &MixerState,
    mut projected: MixerState,
    origins: &Origins,
) -> (MixerState, Vec<Command>) {
    let mut commands = Vec::new();
    let active_changed = !same_input(previous.active.as_ref(), projected.active.as_ref());

    // Program bus and transitions.
    if let Some(active) = projected.active.clone() {
        if same_transitions(&previous.transitions, &projected.transitions) {
            if active_changed {
                commands.push(
                    Command::new(CommandKind::ActiveInput)
                        .input(active)
                        .origin(origins.active.as_ref()),
                );
                projected.fade_to_black = false;
            }
        } else {
            let mut introduced: Vec<Transition> = projected
                .transitions
                .iter()
                .filter(|t| !previous.transitions.contains(t))
                .cloned()
                .collect();
            // A switch through a transition the mixer already has still
            // has to configure and execute it.
            if introduced.is_empty() && active_changed {
                introduced.clone_from(&projected.transitions);
            }
            if introduced.is_empty() && active_changed {
                commands.push(
                    Command::new(CommandKind::ActiveInput)
                        .input(active.clone())
                        .origin(origins.active.as_ref()),
                );
                projected.fade_to_black = false;
            }
            for transition in introduced {
                if active_changed {
                    commands.push(Command::new(CommandKind::PreviewInput).input(active.clone()));
                    projected.fade_to_black = false;
                }
                commands.push(
                    Command::new(CommandKind::TransitionEffect)
                        .input(u32::from(transition.number))
                        .value(transition.effect.to_string()),
                );
                commands.push(
                    Command::new(CommandKind::TransitionDuration)
                        .input(u32::from(transition.number))
                        .value(transition.duration),
                );
                if active_changed {
                    commands.push(
                        Command::new(CommandKind::Transition)
                            .input(u32::from(transition.number))
                            .origin(origins.active.as_ref()),
                    );
                }
            }
        }
    }

    // Preview bus.
    if let Some(preview) = &projected.preview {
        if !same_input(previous.preview.as_ref(), Some(preview)) {
            commands.push(
                Command::new(CommandKind::PreviewInput)
                    .input(preview.clone())
                    .origin(origins.preview.as_ref()),
            );
            projected.fade_to_black = false;
        }
    }

    diff_inputs(previous, &projected, origins, &mut commands);

    // Fader bar, only when nothing else switches the program this cycle.
    if projected.active.is_none() && projected.preview.is_none() {
        if let Some(position) = projected.fader_position {
            if previous.fader_position != Some(position) {
                commands.push(
                    Command::new(CommandKind::Fader)
                        .value(position)
                        .origin(origins.fader.as_ref()),
                );
                projected.fade_to_black = false;
            }
        }
    }

    if previous.recording != projected.recording {
        let kind = if projected.recording {
            CommandKind::StartRecording
        } else {
            CommandKind::StopRecording
        };
        commands.push(Command::new(kind).origin(origins.recording.as_ref()));
    }

    if previous.streaming != projected.streaming {
        let kind = if projected.streaming {
            CommandKind::StartStreaming
        } else {
            CommandKind::StopStreaming
        };
        commands.push(Command::new(kind).origin(origins.streaming.as_ref()));
    }

    if projected.fade_to_black && !previous.fade_to_black {
        commands.push(
            Command::new(CommandKind::FadeToBlack).origin(origins.fade_to_black.as_ref()),
        );
    }

    for action in &projected.momentary {
        match action {
            MomentaryAction::AddInput {
                file_path,
                media_type,
                origin,
            } => {
                let origin = (!origin.layer.is_empty()).then_some(origin);
                commands.push(
                    Command::new(CommandKind::AddInput)
                        .value(format!("{media_type}|{file_path}"))
                        .origin(origin),
                );
            }
        }
    }

    trace!(commands = commands.len(), "Diff complete");
    (projected, commands)
}

/// Per-input facet commands for inputs known to both states.
fn diff_inputs(
    previous: &MixerState,
    projected: &MixerState,
    origins: &Origins,
    commands: &mut Vec<Command>,
) {
    for input in &projected.inputs {
        let Some(id) = input.identifier() else {
            continue;
        };
        let Some(old) = previous.input(&id) else {
            continue;
        };
        if old == input {
            continue;
        }
        let origin = origins.inputs.get(&id);
        let command = |kind| Command::new(kind).input(id.clone()).origin(origin);

        if old.position != input.position {
            if let Some(position) = input.position {
                commands.push(command(CommandKind::SetPosition).value(position));
            }
        }
        if old.state != input.state {
            match input.state {
                Some(PlaybackState::Running) => commands.push(command(CommandKind::PlayInput)),
                Some(PlaybackState::Paused) => commands.push(command(CommandKind::PauseInput)),
                Some(PlaybackState::Completed) | None => {}
            }
        }
        if old.volume != input.volume {
            if let Some(volume) = input.volume {
                commands.push(command(CommandKind::Audio).value(volume));
            }
        }
        if old.name != input.name {
            if let Some(name) = &input.name {
                commands.push(command(CommandKind::SetInputName).value(name.as_str()));
            }
        }
    }
}

fn same_input(a: Option<&InputRef>, b: Option<&InputRef>) -> bool {
    a.map(InputRef::normalized) == b.map(InputRef::normalized)
}

/// Transition lists compare as sets.
fn same_transitions(a: &[Transition], b: &[Transition]) -> bool {
    a.len() == b.len() && a.iter().all(|t| b.contains(t))
}
