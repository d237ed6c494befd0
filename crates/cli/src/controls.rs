use std::str::FromStr;

use anyhow::bail;
use scheduler::PlayerHandle;

/// Transport command typed on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Play,
    Pause,
    Step,
    Back,
    Faster,
    Slower,
    Reverse,
    Goto(String),
    Reset,
    Quit,
}

impl FromStr for Control {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> anyhow::Result<Self> {
        let mut words = line.split_whitespace();
        let cmd = words.next().unwrap_or_default().to_ascii_lowercase();
        let arg = words.next();
        Ok(match (cmd.as_str(), arg) {
            ("play", _) => Control::Play,
            ("pause", _) => Control::Pause,
            ("step" | "next", _) => Control::Step,
            ("back" | "prev", _) => Control::Back,
            ("faster" | "+", _) => Control::Faster,
            ("slower" | "-", _) => Control::Slower,
            ("reverse", _) => Control::Reverse,
            ("goto", Some(id)) => Control::Goto(id.to_string()),
            ("goto", None) => bail!("usage: goto <step-id>"),
            ("reset", _) => Control::Reset,
            ("quit" | "exit" | "q", _) => Control::Quit,
            (other, _) => bail!("unknown command: {other:?}"),
        })
    }
}

impl Control {
    pub fn apply(self, player: &PlayerHandle) {
        match self {
            Control::Play => player.play(),
            Control::Pause => player.pause(),
            Control::Step => player.step(false),
            Control::Back => player.step(true),
            Control::Faster => player.speed_up(),
            Control::Slower => player.speed_down(),
            Control::Reverse => player.reverse(),
            Control::Goto(id) => player.goto(id),
            Control::Reset => player.reset(),
            Control::Quit => player.stop(),
        }
    }
}
