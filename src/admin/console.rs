//! Operator console: reads admin commands line by line and funnels them onto
//! the dispatcher. Replies are printed by the task that ran the command.

use crate::admin::commands::{parse_admin_command, AdminCommand};
use crate::tasks::TaskStreamHandle;
use crate::telemetry::logging::log_game;
use crate::world::engine::WorldEngine;
use std::io::BufRead;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;
use tracing::warn;

/// Reads `input` until `!shutdown` or end of file, both of which shut the
/// world down and are signalled on `stop`.
pub fn spawn<R>(input: R, stream: TaskStreamHandle<WorldEngine>, stop: Sender<()>) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    std::thread::spawn(move || read_commands(input, &stream, &stop))
}

fn read_commands<R: BufRead>(input: R, stream: &TaskStreamHandle<WorldEngine>, stop: &Sender<()>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(target: "error", error = %err, "console read failed");
                break;
            }
        };
        let command = match parse_admin_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        let shutdown = command == AdminCommand::Shutdown;
        let queued = stream.dispatch(move |world: &mut WorldEngine| {
            let reply = world.run_admin_command(&command);
            log_game(&format!("admin {command:?}: {reply}"));
            println!("{reply}");
        });
        if !queued || shutdown {
            let _ = stop.send(());
            return;
        }
    }
    stream.dispatch(|world: &mut WorldEngine| world.request_shutdown());
    let _ = stop.send(());
}
