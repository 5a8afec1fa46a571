use dbnav_core::ConnectionProfile;
use std::path::PathBuf;

pub const USAGE: &str = "\
Usage: dbnav --server <host> [--database <name>] [--user <name>] [--port <n>]
             [--name <label>] [--option <key=value>]... [--group <id>]
             [--depth <n>] [--config <path>]

Connects through the configured metadata service and prints the object tree.";

const DEFAULT_DEPTH: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    pub profile: ConnectionProfile,
    pub depth: usize,
    /// File a new connection under this group before connecting.
    pub group: Option<String>,
    pub config: Option<PathBuf>,
}

pub fn parse(args: &[String]) -> Result<Args, String> {
    let mut server = None;
    let mut database = String::new();
    let mut user = String::new();
    let mut port = None;
    let mut name = None;
    let mut options = Vec::new();
    let mut group = None;
    let mut depth = DEFAULT_DEPTH;
    let mut config = None;

    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{flag} needs a value"))
        };

        match flag.as_str() {
            "--server" | "-s" => server = Some(value()?),
            "--database" | "-d" => database = value()?,
            "--user" | "-u" => user = value()?,
            "--name" => name = Some(value()?),
            "--group" => group = Some(value()?),
            "--config" => config = Some(PathBuf::from(value()?)),
            "--option" => {
                let raw = value()?;
                let (key, val) = raw
                    .split_once('=')
                    .filter(|(key, _)| !key.is_empty())
                    .ok_or_else(|| format!("invalid option '{raw}', expected key=value"))?;
                options.push((key.to_string(), val.to_string()));
            }
            "--port" => {
                let raw = value()?;
                port = Some(
                    raw.parse::<u16>()
                        .map_err(|_| format!("invalid port '{raw}'"))?,
                );
            }
            "--depth" => {
                let raw = value()?;
                depth = raw
                    .parse::<usize>()
                    .map_err(|_| format!("invalid depth '{raw}'"))?;
            }
            other => return Err(format!("unknown argument '{other}'")),
        }
    }

    let server = server.ok_or_else(|| "--server is required".to_string())?;

    let mut profile = ConnectionProfile::new(server, database, user);
    if let Some(port) = port {
        profile = profile.with_port(port);
    }
    if let Some(name) = name {
        profile = profile.with_name(name);
    }
    for (key, value) in options {
        profile = profile.with_option(key, value);
    }

    Ok(Args {
        profile,
        depth,
        group,
        config,
    })
}
