//! Offline dump of a binary command stream.

use std::path::Path;

use eyre::{Result, WrapErr};
use extruder_core::error::ProtocolFault;
use extruder_core::{Command, CommandQueue, Decode, decode};

fn describe(cmd: &Command) -> serde_json::Value {
    use serde_json::json;
    match cmd {
        Command::QueuePointAbs { target, step_rate } => json!({
            "op": "queue_point_abs",
            "x": target.x, "y": target.y, "z": target.z,
            "step_rate": step_rate,
        }),
        Command::SetPosition(p) => json!({
            "op": "set_position",
            "x": p.x, "y": p.y, "z": p.z,
        }),
        Command::Delay { micros } => json!({ "op": "delay", "micros": micros }),
        Command::WaitForTool {
            tool,
            ping_ms,
            timeout_s,
        } => json!({
            "op": "wait_for_tool",
            "tool": tool,
            "ping_ms": ping_ms,
            "timeout_s": timeout_s,
        }),
    }
}

/// Walk the stream command by command. Unknown opcodes are reported and
/// skipped one byte at a time; the first one becomes the error.
pub fn run_decode(path: &Path, json: bool) -> Result<usize> {
    let bytes =
        std::fs::read(path).wrap_err_with(|| format!("reading command stream {}", path.display()))?;
    let mut queue = CommandQueue::new(bytes.len().max(1));
    queue.extend(&bytes)?;

    let mut offset = 0usize;
    let mut commands = 0usize;
    let mut first_unknown = None;
    loop {
        match decode(&queue) {
            Decode::Empty => break,
            Decode::Command(cmd) => {
                let mut v = describe(&cmd);
                v["offset"] = offset.into();
                if json {
                    println!("{v}");
                } else {
                    println!("{offset:>6}: {cmd:?}");
                }
                let len = cmd.encoded_len();
                queue.discard(len);
                offset += len;
                commands += 1;
            }
            Decode::Incomplete {
                opcode,
                available,
                required,
            } => {
                if json {
                    println!(
                        "{}",
                        serde_json::json!({
                            "op": "incomplete",
                            "offset": offset,
                            "opcode": opcode,
                            "available": available,
                            "required": required,
                        })
                    );
                } else {
                    println!("{offset:>6}: truncated opcode {opcode} ({available} of {required} bytes)");
                }
                break;
            }
            Decode::Unknown(op) => {
                if json {
                    println!(
                        "{}",
                        serde_json::json!({ "op": "unknown", "offset": offset, "opcode": op })
                    );
                } else {
                    println!("{offset:>6}: unknown opcode {op}");
                }
                first_unknown.get_or_insert(op);
                queue.discard(1);
                offset += 1;
            }
        }
    }

    if let Some(op) = first_unknown {
        return Err(ProtocolFault::UnknownOpcode(op).into());
    }
    Ok(commands)
}
