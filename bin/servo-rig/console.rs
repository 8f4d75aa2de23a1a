use servo_rig::{AXIS_COUNT, Axis, Command, Position};
use std::path::PathBuf;

pub const HELP: &str = "\
SERVO RIG CONSOLE - COMMANDS

  connect <port>        open the controller port (e.g. COM3, /dev/ttyACM0)
  disconnect            close the port
  set <axis> <angle>    move one axis live; axis is 1-4 or base/shoulder/elbow/gripper
  pose <a> <b> <c> <d>  move all four axes live
  record                append the live position to the sequence
  play                  replay the sequence (1 step per delay)
  clear-last            remove the last recorded position
  clear-all             remove every recorded position
  save <file>           write the sequence to a file (the path may contain spaces)
  load <file>           replace the sequence with a file's contents
  list                  show the recorded sequence
  ports                 list serial ports
  status                show connection and sequence state
  help                  show this text
  shutdown              close the port, stop streaming and exit
  quit                  same as shutdown";

/// One parsed line of operator input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Rig(Command),
    SetAxis { axis: Axis, angle: u16 },
    Pose(Position),
    List,
    Ports,
    Status,
    Help,
    Quit,
}

/// Parse a line; `Ok(None)` for blank lines
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();
    // Everything after the verb, for arguments that may contain spaces
    let rest = line.trim_start()[verb.len()..].trim();

    let command = match (verb.to_lowercase().as_str(), args.as_slice()) {
        ("connect", [port]) => ConsoleCommand::Rig(Command::Connect {
            port: port.to_string(),
        }),
        ("disconnect", []) => ConsoleCommand::Rig(Command::Disconnect),
        ("set", [axis, angle]) => ConsoleCommand::SetAxis {
            axis: axis.parse().map_err(|e| format!("{e}"))?,
            angle: parse_angle(angle)?,
        },
        ("pose", values) if values.len() == AXIS_COUNT => {
            let mut axes = [0u16; AXIS_COUNT];
            for (slot, value) in values.iter().enumerate() {
                axes[slot] = parse_angle(value)?;
            }
            let position = Axis::ALL
                .iter()
                .fold(Position::default(), |p, &axis| p.with_axis(axis, axes[axis.index()]));
            ConsoleCommand::Pose(position)
        }
        ("record", []) => ConsoleCommand::Rig(Command::RecordCurrent),
        ("play", []) => ConsoleCommand::Rig(Command::Play),
        ("clear-last", []) => ConsoleCommand::Rig(Command::ClearLast),
        ("clear-all", []) => ConsoleCommand::Rig(Command::ClearAll),
        ("save", [_, ..]) => ConsoleCommand::Rig(Command::Save {
            path: PathBuf::from(rest),
        }),
        ("load", [_, ..]) => ConsoleCommand::Rig(Command::Load {
            path: PathBuf::from(rest),
        }),
        ("list", []) => ConsoleCommand::List,
        ("ports", []) => ConsoleCommand::Ports,
        ("status", []) => ConsoleCommand::Status,
        ("help", []) | ("?", []) => ConsoleCommand::Help,
        ("shutdown", []) => ConsoleCommand::Rig(Command::Shutdown),
        ("quit", []) | ("exit", []) => ConsoleCommand::Quit,
        (other, _) => return Err(format!("Unknown or malformed command '{other}', try 'help'")),
    };
    Ok(Some(command))
}

fn parse_angle(text: &str) -> Result<u16, String> {
    text.parse::<u16>()
        .map_err(|_| format!("'{text}' is not an angle"))
}
