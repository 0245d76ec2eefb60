// FILE: src\audio_engine\command.rs
// ==================================

use super::helpers::{timestamped_session_path, WavSessionWriter};
use super::{EffectParams, EngineHandle};
use crate::audio_device::{get_host, get_input_devices, get_output_devices};
use crate::error::Result;
use crate::fx::FxComponentType;
use crate::fx_components::Quality;
use crate::looper::LoopId;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FxParam {
    GateThreshold(f32),
    GateAttackMs(f32),
    GateReleaseMs(f32),
    PitchSemitones(f32),
    PitchQuality(Quality),
    PitchFeedback(f32),
    ReverbDecay(f32),
    ReverbWet(f32),
    ReverbDelayMs(f32),
}

/// One line of the text control surface. `None` on a boolean means toggle.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioCommand {
    AddLoop(f32),
    DeleteLoop(LoopId),
    SetLoopLength(LoopId, f32),
    ClearLoop(LoopId),
    Mute(LoopId, Option<bool>),
    Solo(LoopId, Option<bool>),
    SelectLoop(LoopId),
    Recording(Option<bool>),
    Overdub(Option<bool>),
    StartSession,
    StopSession,
    SaveSession(Option<PathBuf>),
    FxBypass(FxComponentType, Option<bool>),
    FxOverdub(FxComponentType, Option<bool>),
    FxInput(FxComponentType, LoopId),
    FxOutput(FxComponentType, LoopId),
    FxReset(FxComponentType),
    FxParam(FxParam),
    Render(usize),
    Status,
    Devices,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("missing {0}")]
    MissingArgument(&'static str),
    #[error("invalid {what}: '{value}'")]
    InvalidArgument { what: &'static str, value: String },
}

pub const HELP: &str = "\
add <seconds> | delete <id> | length <id> <seconds> | clear <id>
mute <id> [on|off] | solo <id> [on|off] | select <id>
rec [on|off] | overdub [on|off]
session start | session stop | session save [path]
<gate|pitch|reverb> bypass [on|off] | overdub [on|off] | in <id> | out <id> | reset
gate threshold|attack|release <value>
pitch semitones|feedback <value> | pitch quality low|medium|high
reverb decay|wet|delay <value>
render <cycles> | status | devices | help | quit";

struct Args<'a> {
    words: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn next(&mut self, what: &'static str) -> std::result::Result<&'a str, CommandParseError> {
        self.words.next().ok_or(CommandParseError::MissingArgument(what))
    }

    fn parse<T: FromStr>(&mut self, what: &'static str) -> std::result::Result<T, CommandParseError> {
        let word = self.next(what)?;
        word.parse().map_err(|_| CommandParseError::InvalidArgument {
            what,
            value: word.to_string(),
        })
    }

    fn loop_id(&mut self) -> std::result::Result<LoopId, CommandParseError> {
        let word = self.next("loop id")?;
        word.trim_start_matches('#')
            .parse()
            .map(LoopId)
            .map_err(|_| CommandParseError::InvalidArgument {
                what: "loop id",
                value: word.to_string(),
            })
    }

    fn switch(&mut self) -> std::result::Result<Option<bool>, CommandParseError> {
        match self.words.next() {
            None => Ok(None),
            Some("on") | Some("1") | Some("true") => Ok(Some(true)),
            Some("off") | Some("0") | Some("false") => Ok(Some(false)),
            Some(other) => Err(CommandParseError::InvalidArgument {
                what: "switch",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for AudioCommand {
    type Err = CommandParseError;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let mut args = Args {
            words: line.split_whitespace(),
        };
        let verb = args.words.next().ok_or(CommandParseError::Empty)?;
        let command = match verb.to_ascii_lowercase().as_str() {
            "add" => AudioCommand::AddLoop(args.parse("seconds")?),
            "delete" | "del" => AudioCommand::DeleteLoop(args.loop_id()?),
            "length" | "len" => {
                let id = args.loop_id()?;
                AudioCommand::SetLoopLength(id, args.parse("seconds")?)
            }
            "clear" => AudioCommand::ClearLoop(args.loop_id()?),
            "mute" => {
                let id = args.loop_id()?;
                AudioCommand::Mute(id, args.switch()?)
            }
            "solo" => {
                let id = args.loop_id()?;
                AudioCommand::Solo(id, args.switch()?)
            }
            "select" => AudioCommand::SelectLoop(args.loop_id()?),
            "rec" | "record" => AudioCommand::Recording(args.switch()?),
            "overdub" => AudioCommand::Overdub(args.switch()?),
            "session" => match args.next("session action")? {
                "start" => AudioCommand::StartSession,
                "stop" => AudioCommand::StopSession,
                "save" => AudioCommand::SaveSession(args.words.next().map(PathBuf::from)),
                other => {
                    return Err(CommandParseError::InvalidArgument {
                        what: "session action",
                        value: other.to_string(),
                    })
                }
            },
            "render" => AudioCommand::Render(args.parse("cycles")?),
            "status" => AudioCommand::Status,
            "devices" => AudioCommand::Devices,
            "help" | "?" => AudioCommand::Help,
            "quit" | "exit" => AudioCommand::Quit,
            other => match other.parse::<FxComponentType>() {
                Ok(kind) => parse_fx(kind, &mut args)?,
                Err(_) => return Err(CommandParseError::Unknown(verb.to_string())),
            },
        };
        Ok(command)
    }
}

fn parse_fx(
    kind: FxComponentType,
    args: &mut Args<'_>,
) -> std::result::Result<AudioCommand, CommandParseError> {
    let action = args.next("effect action")?;
    let command = match action {
        "bypass" => AudioCommand::FxBypass(kind, args.switch()?),
        "overdub" => AudioCommand::FxOverdub(kind, args.switch()?),
        "in" | "input" => AudioCommand::FxInput(kind, args.loop_id()?),
        "out" | "output" => AudioCommand::FxOutput(kind, args.loop_id()?),
        "reset" => AudioCommand::FxReset(kind),
        param => AudioCommand::FxParam(match (kind, param) {
            (FxComponentType::Gate, "threshold") => FxParam::GateThreshold(args.parse("threshold")?),
            (FxComponentType::Gate, "attack") => FxParam::GateAttackMs(args.parse("attack ms")?),
            (FxComponentType::Gate, "release") => FxParam::GateReleaseMs(args.parse("release ms")?),
            (FxComponentType::PitchShift, "semitones") => {
                FxParam::PitchSemitones(args.parse("semitones")?)
            }
            (FxComponentType::PitchShift, "quality") => FxParam::PitchQuality(args.parse("quality")?),
            (FxComponentType::PitchShift, "feedback") => {
                FxParam::PitchFeedback(args.parse("feedback")?)
            }
            (FxComponentType::Reverb, "decay") => FxParam::ReverbDecay(args.parse("decay")?),
            (FxComponentType::Reverb, "wet") => FxParam::ReverbWet(args.parse("wet")?),
            (FxComponentType::Reverb, "delay") => FxParam::ReverbDelayMs(args.parse("delay ms")?),
            _ => {
                return Err(CommandParseError::InvalidArgument {
                    what: "effect parameter",
                    value: param.to_string(),
                })
            }
        }),
    };
    Ok(command)
}

/// What the control surface knows beyond the engine itself.
#[derive(Debug, Clone, Default)]
pub struct ControlContext {
    pub recordings_dir: PathBuf,
    pub host_name: Option<String>,
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

/// Applies `command` to the engine and returns a line for the user.
/// `Quit` is the caller's business and yields an empty reply.
pub fn dispatch(handle: &EngineHandle, command: AudioCommand, ctx: &ControlContext) -> Result<String> {
    let reply = match command {
        AudioCommand::AddLoop(seconds) => format!("added loop {}", handle.add_loop(seconds)?),
        AudioCommand::DeleteLoop(id) => {
            handle.delete_loop(id)?;
            format!("deleted loop {}", id)
        }
        AudioCommand::SetLoopLength(id, seconds) => {
            handle.update_loop_length(id, seconds)?;
            format!("loop {} resized", id)
        }
        AudioCommand::ClearLoop(id) => {
            handle.clear_loop(id)?;
            format!("loop {} cleared", id)
        }
        AudioCommand::Mute(id, value) => {
            let muted = match value {
                Some(v) => handle.set_mute(id, v).map(|_| v)?,
                None => handle.toggle_mute(id)?,
            };
            format!("loop {} mute {}", id, on_off(muted))
        }
        AudioCommand::Solo(id, value) => {
            let soloed = match value {
                Some(v) => handle.set_solo(id, v).map(|_| v)?,
                None => handle.toggle_solo(id)?,
            };
            format!("loop {} solo {}", id, on_off(soloed))
        }
        AudioCommand::SelectLoop(id) => {
            handle.select_current_loop(id)?;
            format!("recording target is loop {}", id)
        }
        AudioCommand::Recording(value) => {
            let enabled = match value {
                Some(v) => {
                    handle.set_recording_enabled(v);
                    v
                }
                None => handle.toggle_recording(),
            };
            format!("live recording {}", on_off(enabled))
        }
        AudioCommand::Overdub(value) => {
            let enabled = match value {
                Some(v) => {
                    handle.set_overdub_enabled(v);
                    v
                }
                None => handle.toggle_overdub(),
            };
            format!("overdub {}", on_off(enabled))
        }
        AudioCommand::StartSession => {
            handle.start_session();
            "session recording started".to_string()
        }
        AudioCommand::StopSession => {
            handle.stop_session();
            format!("session recording stopped ({} samples)", handle.session_len())
        }
        AudioCommand::SaveSession(path) => {
            let path = path.unwrap_or_else(|| timestamped_session_path(&ctx.recordings_dir));
            handle.save_session(&path, &WavSessionWriter)?;
            format!("session saved to {}", path.display())
        }
        AudioCommand::FxBypass(kind, value) => {
            let bypass = match value {
                Some(v) => {
                    handle.set_bypass(kind, v);
                    v
                }
                None => handle.toggle_bypass(kind),
            };
            format!("{} bypass {}", kind, on_off(bypass))
        }
        AudioCommand::FxOverdub(kind, value) => {
            let overdub = value.unwrap_or(!handle.routing(kind).overdub);
            handle.set_effect_overdub(kind, overdub);
            format!("{} overdub {}", kind, on_off(overdub))
        }
        AudioCommand::FxInput(kind, id) => {
            handle.set_input_loop(kind, id);
            format!("{} input loop {}", kind, id)
        }
        AudioCommand::FxOutput(kind, id) => {
            handle.set_output_loop(kind, id);
            format!("{} output loop {}", kind, id)
        }
        AudioCommand::FxReset(kind) => {
            handle.reset_effect(kind);
            format!("{} state reset", kind)
        }
        AudioCommand::FxParam(param) => {
            apply_param(handle, param);
            format!("{:?}", param)
        }
        AudioCommand::Render(cycles) => {
            let rendered = handle.render_cycles(cycles);
            let peak = rendered.iter().fold(0.0f32, |p, s| p.max(s.abs()));
            format!("rendered {} samples, peak {:.3}", rendered.len(), peak)
        }
        AudioCommand::Status => format_status(handle),
        AudioCommand::Devices => list_devices(ctx.host_name.as_deref())?,
        AudioCommand::Help => HELP.to_string(),
        AudioCommand::Quit => String::new(),
    };
    Ok(reply)
}

fn apply_param(handle: &EngineHandle, param: FxParam) {
    match param {
        FxParam::GateThreshold(v) => handle.set_gate_threshold(v),
        FxParam::GateAttackMs(v) => handle.set_gate_attack_ms(v),
        FxParam::GateReleaseMs(v) => handle.set_gate_release_ms(v),
        FxParam::PitchSemitones(v) => handle.set_pitch_semitones(v),
        FxParam::PitchQuality(q) => handle.set_pitch_quality(q),
        FxParam::PitchFeedback(v) => handle.set_pitch_feedback(v),
        FxParam::ReverbDecay(v) => handle.set_reverb_decay(v),
        FxParam::ReverbWet(v) => handle.set_reverb_wet(v),
        FxParam::ReverbDelayMs(v) => handle.set_reverb_delay_ms(v),
    }
}

fn format_status(handle: &EngineHandle) -> String {
    let snap = handle.snapshot();
    let mut out = format!(
        "{} | {} Hz, {} frames/chunk | rec {} | overdub {} | session {} ({} samples) | xruns {}",
        if snap.running { "running" } else { "stopped" },
        snap.sample_rate,
        snap.chunk_size,
        on_off(snap.recording_enabled),
        on_off(snap.overdub_enabled),
        on_off(snap.session_active),
        snap.session_samples,
        snap.xruns,
    );
    for lp in &snap.loops {
        let _ = write!(
            out,
            "\n{} loop {}: {:6.2}s  {:>5}/{:<5}{}{}",
            if lp.current { '>' } else { ' ' },
            lp.id,
            lp.seconds,
            lp.position,
            lp.size,
            if lp.muted { " muted" } else { "" },
            if lp.soloed { " solo" } else { "" },
        );
    }
    for fx in &snap.effects {
        let params = match fx.params {
            EffectParams::Gate(p) => format!(
                "threshold {:.2} attack {}ms release {}ms",
                p.threshold, p.attack_ms, p.release_ms
            ),
            EffectParams::PitchShift(p) => format!(
                "semitones {} quality {:?} feedback {:.2}",
                p.semitones, p.quality, p.feedback
            ),
            EffectParams::Reverb(p) => format!(
                "decay {:.2} wet {:.2} delay {}ms",
                p.decay, p.wet, p.delay_ms
            ),
        };
        let _ = write!(
            out,
            "\n  {:<11} {} {} -> {}{} | {}",
            fx.kind.to_string(),
            if fx.routing.bypass { "bypassed" } else { "active  " },
            fx.routing.input_loop,
            fx.routing.output_loop,
            if fx.routing.overdub { " (overdub)" } else { "" },
            params,
        );
    }
    out
}

fn list_devices(host_name: Option<&str>) -> Result<String> {
    let host = get_host(host_name)?;
    let mut out = format!("host: {}", host.id().name());
    out.push_str("\ninputs:");
    for (name, _) in get_input_devices(&host)? {
        let _ = write!(out, "\n  {}", name);
    }
    out.push_str("\noutputs:");
    for (name, _) in get_output_devices(&host)? {
        let _ = write!(out, "\n  {}", name);
    }
    Ok(out)
}
