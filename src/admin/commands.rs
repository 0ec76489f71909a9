use crate::world::engine::WorldEngine;
use crate::world::holder::ThingRef;
use crate::world::position::Position;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Kick { target: String },
    Online,
    Save,
    Shutdown,
    Teleport { target: String, position: Position },
    Where { target: String },
    Unknown(String),
}

pub fn parse_admin_command(message: &str) -> Result<Option<AdminCommand>, String> {
    let trimmed = message.trim();
    let Some(body) = trimmed.strip_prefix('!') else {
        return Ok(None);
    };

    let mut parts = body.split_whitespace();
    let command = parts
        .next()
        .ok_or_else(|| "admin command missing name".to_string())?;
    let command = command.to_ascii_lowercase();
    let parsed = match command.as_str() {
        "kick" => AdminCommand::Kick {
            target: parse_name(parts.next())?,
        },
        "online" => AdminCommand::Online,
        "save" => AdminCommand::Save,
        "shutdown" => AdminCommand::Shutdown,
        "teleport" | "tp" => {
            let target = parse_name(parts.next())?;
            let x = parse_u16(parts.next())?;
            let y = parse_u16(parts.next())?;
            let z = parse_u8(parts.next())?;
            AdminCommand::Teleport {
                target,
                position: Position { x, y, z },
            }
        }
        "where" | "pos" => AdminCommand::Where {
            target: parse_name(parts.next())?,
        },
        _ => AdminCommand::Unknown(command),
    };
    Ok(Some(parsed))
}

fn parse_name(value: Option<&str>) -> Result<String, String> {
    value
        .map(str::to_string)
        .ok_or_else(|| "admin command missing player name".to_string())
}

fn parse_u16(value: Option<&str>) -> Result<u16, String> {
    let value = value.ok_or_else(|| "admin command missing position value".to_string())?;
    value
        .parse::<u16>()
        .map_err(|_| format!("admin command expected u16, got '{value}'"))
}

fn parse_u8(value: Option<&str>) -> Result<u8, String> {
    let value = value.ok_or_else(|| "admin command missing position value".to_string())?;
    value
        .parse::<u8>()
        .map_err(|_| format!("admin command expected u8, got '{value}'"))
}

impl WorldEngine {
    /// Runs a console command on the world and returns the reply line.
    pub fn run_admin_command(&mut self, command: &AdminCommand) -> String {
        match command {
            AdminCommand::Kick { target } => match self.player_by_name(target) {
                Ok(id) => match self.logout_player(id) {
                    Ok(()) => format!("{target} kicked"),
                    Err(reason) => format!("cannot kick {target}: {reason}"),
                },
                Err(reason) => format!("{target}: {reason}"),
            },
            AdminCommand::Online => {
                let names: Vec<String> = self
                    .online_players()
                    .into_iter()
                    .filter_map(|id| self.creature(id).map(|creature| creature.name.clone()))
                    .collect();
                format!("{} online: {}", names.len(), names.join(", "))
            }
            AdminCommand::Save => {
                let report = self.global_save();
                if report.is_clean() {
                    format!("saved {} players", report.saved_players)
                } else {
                    format!(
                        "saved {} players, {} errors",
                        report.saved_players,
                        report.player_errors.len() + usize::from(report.globals_error.is_some())
                    )
                }
            }
            AdminCommand::Shutdown => {
                self.request_shutdown();
                "shutdown requested".to_string()
            }
            AdminCommand::Teleport { target, position } => match self.player_by_name(target) {
                Ok(id) => match self.teleport(ThingRef::Creature(id), *position) {
                    Ok(()) => format!("{target} teleported to {position}"),
                    Err(reason) => format!("cannot teleport {target}: {reason}"),
                },
                Err(reason) => format!("{target}: {reason}"),
            },
            AdminCommand::Where { target } => match self
                .player_by_name(target)
                .ok()
                .and_then(|id| self.creature(id))
            {
                Some(creature) => format!("{} is at {}", creature.name, creature.position),
                None => format!("{target} is not online"),
            },
            AdminCommand::Unknown(name) => format!("unknown command '{name}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::testkit::{self, CENTER};

    #[test]
    fn parse_admin_command_ignores_non_command() {
        assert_eq!(parse_admin_command("hello").expect("parse"), None);
    }

    #[test]
    fn parse_admin_command_parses_online_and_save() {
        assert_eq!(parse_admin_command("!online").expect("parse"), Some(AdminCommand::Online));
        assert_eq!(parse_admin_command(" !SAVE ").expect("parse"), Some(AdminCommand::Save));
    }

    #[test]
    fn parse_admin_command_parses_where_target() {
        assert_eq!(
            parse_admin_command("!where Bob").expect("parse"),
            Some(AdminCommand::Where {
                target: "Bob".to_string()
            })
        );
        assert!(parse_admin_command("!where").is_err());
    }

    #[test]
    fn parse_admin_command_parses_teleport() {
        assert_eq!(
            parse_admin_command("!tp Bob 100 200 7").expect("parse"),
            Some(AdminCommand::Teleport {
                target: "Bob".to_string(),
                position: Position { x: 100, y: 200, z: 7 }
            })
        );
        assert!(parse_admin_command("!tp Bob 100 north 7").is_err());
    }

    #[test]
    fn parse_admin_command_handles_unknown() {
        assert_eq!(
            parse_admin_command("!whoami").expect("parse"),
            Some(AdminCommand::Unknown("whoami".to_string()))
        );
    }

    #[test]
    fn commands_run_against_the_world() {
        let mut world = testkit::world();
        let bob = testkit::spawn_player(&mut world, "Bob", CENTER);

        let reply = world.run_admin_command(&AdminCommand::Where {
            target: "bob".to_string(),
        });
        assert_eq!(reply, format!("Bob is at {CENTER}"));

        let destination = testkit::east_of(CENTER);
        world.run_admin_command(&AdminCommand::Teleport {
            target: "Bob".to_string(),
            position: destination,
        });
        assert_eq!(world.creature(bob).map(|creature| creature.position), Some(destination));

        assert_eq!(world.run_admin_command(&AdminCommand::Online), "1 online: Bob");
        world.run_admin_command(&AdminCommand::Shutdown);
        assert!(world.shutdown_requested());
    }
}
