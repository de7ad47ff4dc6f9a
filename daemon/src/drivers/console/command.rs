use anyhow::{anyhow, bail, Context};
use mcbot_protocol::config::{AccountType, WorkerConfig};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;

pub const HELP: &str = "\
commands:
  install <id> | start <id> | stop <id>
  status [id] | report <id>
  install-all | start-all | stop-all
  accounts
  account <id> <offline|mojang|microsoft> <username> [password]
  server ip|version|repeat|delay <value>
  message add <text> | message clear
  import <path> | sync
  help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerField {
    Address(String),
    ProtocolVersion(String),
    Repeat(bool),
    RepeatDelay(NonZeroU32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Install(String),
    Start(String),
    Stop(String),
    Status(Option<String>),
    Report(String),
    InstallAll,
    StartAll,
    StopAll,
    Accounts,
    Account {
        worker_id: String,
        account: WorkerConfig,
    },
    Server(ServerField),
    MessageAdd(String),
    MessageClear,
    /// replace the shared document with a file of the same shape
    Import(PathBuf),
    /// re-push accounts and server settings into every private document
    Sync,
    Help,
    Quit,
}

impl Command {
    /// Commands that write the shared document.
    pub fn is_save(&self) -> bool {
        matches!(
            self,
            Command::Account { .. }
                | Command::Server(_)
                | Command::MessageAdd(_)
                | Command::MessageClear
                | Command::Import(_)
        )
    }
}

fn worker_arg(verb: &str, args: &[&str]) -> anyhow::Result<String> {
    match args {
        [worker_id] => Ok(worker_id.to_string()),
        _ => bail!("usage: {} <worker id>", verb),
    }
}

fn no_args(verb: &str, args: &[&str], command: Command) -> anyhow::Result<Command> {
    if !args.is_empty() {
        bail!("{} takes no arguments", verb);
    }
    Ok(command)
}

fn parse_switch(value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        other => bail!("expected on/off, got {:?}", other),
    }
}

fn parse_account(args: &[&str]) -> anyhow::Result<Command> {
    let (worker_id, account_type, username, password) = match args {
        [worker_id, account_type, username] => (worker_id, account_type, username, ""),
        [worker_id, account_type, username, password] => {
            (worker_id, account_type, username, *password)
        }
        _ => bail!("usage: account <id> <offline|mojang|microsoft> <username> [password]"),
    };
    let account_type = AccountType::from_str(account_type).map_err(|err| anyhow!(err))?;
    if account_type.requires_auth() && password.is_empty() {
        bail!("{} accounts need a password", account_type);
    }
    Ok(Command::Account {
        worker_id: worker_id.to_string(),
        account: WorkerConfig {
            username: username.to_string(),
            password: password.to_owned(),
            account_type,
        },
    })
}

fn parse_server(args: &[&str]) -> anyhow::Result<Command> {
    let field = match args {
        ["ip", address] => ServerField::Address(address.to_string()),
        ["version", version] => ServerField::ProtocolVersion(version.to_string()),
        ["repeat", value] => ServerField::Repeat(parse_switch(value)?),
        ["delay", value] => ServerField::RepeatDelay(
            value
                .parse()
                .with_context(|| format!("invalid repeat delay {:?}", value))?,
        ),
        _ => bail!("usage: server ip|version|repeat|delay <value>"),
    };
    Ok(Command::Server(field))
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map(|(verb, rest)| (verb, rest.trim()))
            .unwrap_or((line, ""));
        let args: Vec<&str> = rest.split_whitespace().collect();

        match verb.to_ascii_lowercase().as_str() {
            "install" => Ok(Command::Install(worker_arg(verb, &args)?)),
            "start" => Ok(Command::Start(worker_arg(verb, &args)?)),
            "stop" => Ok(Command::Stop(worker_arg(verb, &args)?)),
            "report" => Ok(Command::Report(worker_arg(verb, &args)?)),
            "status" => match args.as_slice() {
                [] => Ok(Command::Status(None)),
                [worker_id] => Ok(Command::Status(Some(worker_id.to_string()))),
                _ => bail!("usage: status [worker id]"),
            },
            "install-all" => no_args(verb, &args, Command::InstallAll),
            "start-all" => no_args(verb, &args, Command::StartAll),
            "stop-all" => no_args(verb, &args, Command::StopAll),
            "accounts" => no_args(verb, &args, Command::Accounts),
            "account" => parse_account(&args),
            "server" => parse_server(&args),
            "message" => match rest.split_once(char::is_whitespace) {
                Some(("add", text)) if !text.trim().is_empty() => {
                    Ok(Command::MessageAdd(text.trim().to_owned()))
                }
                None if rest == "clear" => Ok(Command::MessageClear),
                _ => bail!("usage: message add <text> | message clear"),
            },
            "import" if !rest.is_empty() => Ok(Command::Import(PathBuf::from(rest))),
            "import" => bail!("usage: import <path>"),
            "sync" => no_args(verb, &args, Command::Sync),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            "" => bail!("empty command"),
            other => bail!("unknown command {:?}, try help", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(line: &str) -> Command {
        line.parse().unwrap()
    }

    #[test]
    fn worker_commands() {
        assert_eq!(parse("install MC1"), Command::Install("MC1".into()));
        assert_eq!(parse("  start   MC2 "), Command::Start("MC2".into()));
        assert_eq!(parse("status"), Command::Status(None));
        assert_eq!(parse("status MC3"), Command::Status(Some("MC3".into())));
        assert_eq!(parse("STOP-ALL"), Command::StopAll);
        assert!("install".parse::<Command>().is_err());
        assert!("install MC1 MC2".parse::<Command>().is_err());
    }

    #[test]
    fn account_command() {
        assert_eq!(
            parse("account MC1 microsoft alice@example.com hunter2"),
            Command::Account {
                worker_id: "MC1".into(),
                account: WorkerConfig {
                    username: "alice@example.com".into(),
                    password: "hunter2".into(),
                    account_type: AccountType::Microsoft,
                },
            }
        );
        assert_eq!(
            parse("account MC2 offline Bob"),
            Command::Account {
                worker_id: "MC2".into(),
                account: WorkerConfig::offline("Bob"),
            }
        );
        assert!("account MC1 mojang alice".parse::<Command>().is_err());
        assert!("account MC1 steam alice pw".parse::<Command>().is_err());
    }

    #[test]
    fn server_command() {
        assert_eq!(
            parse("server ip mc.example.org"),
            Command::Server(ServerField::Address("mc.example.org".into()))
        );
        assert_eq!(
            parse("server repeat off"),
            Command::Server(ServerField::Repeat(false))
        );
        assert_eq!(
            parse("server delay 12"),
            Command::Server(ServerField::RepeatDelay(NonZeroU32::new(12).unwrap()))
        );
        assert!("server delay 0".parse::<Command>().is_err());
        assert!("server port 25565".parse::<Command>().is_err());
    }

    #[test]
    fn message_keeps_spaces() {
        assert_eq!(
            parse("message add /msg friend  hello there"),
            Command::MessageAdd("/msg friend  hello there".into())
        );
        assert_eq!(parse("message clear"), Command::MessageClear);
        assert!("message add".parse::<Command>().is_err());
        assert!(parse("message clear").is_save());
        assert!(!parse("sync").is_save());
    }

    #[test]
    fn import_takes_the_rest_as_path() {
        assert_eq!(
            parse("import /srv/bots/My Configs/config.json"),
            Command::Import(PathBuf::from("/srv/bots/My Configs/config.json"))
        );
        assert!(parse("import config.json").is_save());
        assert!("import".parse::<Command>().is_err());
        assert!("import   ".parse::<Command>().is_err());
    }
}
