//! Phase 1: fold a timeline state onto the previous mixer state.

use tracing::{debug, trace};

use super::{Origins, Projection};
use crate::state::{
    Input, InputRef, InputUpdate, MixerState, MomentaryAction, Origin, PlaybackState,
};
use crate::timeline::{Content, TimelineState};

/// Project `timeline` onto a copy of `previous`.
///
/// Layers are applied in ascending byte order of their names, so when two
/// layers touch the same facet the later name wins. The momentary list of
/// `previous` is never carried over.
#[must_use]
pub fn project(previous: &MixerState, timeline: &TimelineState) -> Projection {
    let mut state = previous.clone();
    state.momentary.clear();
    let mut origins = Origins::default();

    for (layer, object) in timeline.sorted_layers() {
        let origin = Origin::new(layer, object.id.as_str());
        trace!(layer, id = %object.id, kind = object.content.kind(), "Projecting layer");

        match &object.content {
            Content::Input { input, transition } => {
                if !state.has_input(input) {
                    debug!(layer, %input, "Selecting input not known to the mixer");
                }
                state.active = Some(input.clone());
                if let Some(transition) = transition {
                    state.transitions = vec![transition.to_transition()];
                }
                origins.active = Some(origin);
            }
            Content::Preview { input } => {
                state.preview = Some(input.clone());
                origins.preview = Some(origin);
            }
            Content::Audio { input, volume } => {
                upsert(&mut state, &mut origins, input, InputUpdate::Volume(*volume), origin);
            }
            Content::Fader { position } => {
                state.fader_position = Some(*position);
                origins.fader = Some(origin);
            }
            Content::StartRecording | Content::StopRecording => {
                state.recording = matches!(object.content, Content::StartRecording);
                origins.recording = Some(origin);
            }
            Content::StartStreaming | Content::StopStreaming => {
                state.streaming = matches!(object.content, Content::StartStreaming);
                origins.streaming = Some(origin);
            }
            Content::FadeToBlack => {
                state.fade_to_black = true;
                origins.fade_to_black = Some(origin);
            }
            Content::AddInput {
                file_path,
                media_type,
            } => {
                if state.has_media(file_path, *media_type) {
                    debug!(layer, file_path, "Input already present, skipping add");
                    continue;
                }
                // Provisional record so the same request is suppressed next cycle.
                state.inputs.push(Input {
                    title: Some(file_path.clone()),
                    input_type: Some(*media_type),
                    ..Input::default()
                });
                state.momentary.push(MomentaryAction::AddInput {
                    file_path: file_path.clone(),
                    media_type: *media_type,
                    origin,
                });
            }
            Content::PlayInput { input } => {
                let update = InputUpdate::State(PlaybackState::Running);
                upsert(&mut state, &mut origins, input, update, origin);
            }
            Content::PauseInput { input } => {
                let update = InputUpdate::State(PlaybackState::Paused);
                upsert(&mut state, &mut origins, input, update, origin);
            }
            Content::RestartInput { input } => {
                upsert(&mut state, &mut origins, input, InputUpdate::Position(0), origin);
            }
            Content::SetPosition { input, position } => {
                let update = InputUpdate::Position(*position);
                upsert(&mut state, &mut origins, input, update, origin);
            }
            Content::SetInputName { input, name } => {
                let update = InputUpdate::Name(name.clone());
                upsert(&mut state, &mut origins, input, update, origin);
            }
        }
    }

    Projection { state, origins }
}

fn upsert(
    state: &mut MixerState,
    origins: &mut Origins,
    input: &InputRef,
    update: InputUpdate,
    origin: Origin,
) {
    let id = state.upsert_input(input, update);
    origins.inputs.insert(id, origin);
}
