//! Imperative mixer commands produced by the reconciliation engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::{InputRef, Origin};

/// Kind of instruction sent to the mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    PreviewInput,
    ActiveInput,
    Transition,
    TransitionEffect,
    TransitionDuration,
    Audio,
    Fader,
    StartRecording,
    StopRecording,
    StartStreaming,
    StopStreaming,
    FadeToBlack,
    AddInput,
    PlayInput,
    PauseInput,
    SetPosition,
    SetInputName,
}

impl CommandKind {
    /// Stable snake_case name, as serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreviewInput => "preview_input",
            Self::ActiveInput => "active_input",
            Self::Transition => "transition",
            Self::TransitionEffect => "transition_effect",
            Self::TransitionDuration => "transition_duration",
            Self::Audio => "audio",
            Self::Fader => "fader",
            Self::StartRecording => "start_recording",
            Self::StopRecording => "stop_recording",
            Self::StartStreaming => "start_streaming",
            Self::StopStreaming => "stop_streaming",
            Self::FadeToBlack => "fade_to_black",
            Self::AddInput => "add_input",
            Self::PlayInput => "play_input",
            Self::PauseInput => "pause_input",
            Self::SetPosition => "set_position",
            Self::SetInputName => "set_input_name",
        }
    }

    /// Name of the mixer API function this command maps to.
    #[must_use]
    pub const fn function_name(self) -> &'static str {
        match self {
            Self::PreviewInput => "PreviewInput",
            Self::ActiveInput => "ActiveInput",
            Self::Transition => "Transition",
            Self::TransitionEffect => "SetTransitionEffect",
            Self::TransitionDuration => "SetTransitionDuration",
            Self::Audio => "SetVolume",
            Self::Fader => "SetFader",
            Self::StartRecording => "StartRecording",
            Self::StopRecording => "StopRecording",
            Self::StartStreaming => "StartStreaming",
            Self::StopStreaming => "StopStreaming",
            Self::FadeToBlack => "FadeToBlack",
            Self::AddInput => "AddInput",
            Self::PlayInput => "Play",
            Self::PauseInput => "Pause",
            Self::SetPosition => "SetPosition",
            Self::SetInputName => "SetInputName",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value payload of a command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for CommandValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for CommandValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for CommandValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u8> for CommandValue {
    fn from(v: u8) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<String> for CommandValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for CommandValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// One imperative instruction for the mixer.
///
/// `context` and `timeline_id` correlate the command with the timeline
/// object that caused it; synthetic commands leave them empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<CommandValue>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub timeline_id: String,
}

impl Command {
    /// Create a synthetic command with no input, value, or correlation.
    #[must_use]
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            input: None,
            value: None,
            context: None,
            timeline_id: String::new(),
        }
    }

    /// Set the input target.
    #[must_use]
    pub fn input(mut self, input: impl Into<InputRef>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Set the value payload.
    #[must_use]
    pub fn value(mut self, value: impl Into<CommandValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Correlate the command with the timeline object that caused it.
    #[must_use]
    pub fn origin(mut self, origin: Option<&Origin>) -> Self {
        if let Some(origin) = origin {
            self.context = Some(origin.layer.clone());
            self.timeline_id.clone_from(&origin.timeline_id);
        }
        self
    }

    /// Override the context token.
    #[must_use]
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// True if the command carries no timeline correlation.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.timeline_id.is_empty()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(input) = &self.input {
            write!(f, " input={input}")?;
        }
        if let Some(value) = &self.value {
            write!(f, " value={value}")?;
        }
        Ok(())
    }
}
