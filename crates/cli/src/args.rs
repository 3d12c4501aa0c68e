//! Accepts the host's classic single-dash switches (`-Install`,
//! `-ServiceName=foo`, ...) alongside regular clap syntax.

/// Single-dash commands and the subcommand each maps to.
const COMMANDS: &[(&str, &str)] = &[
    ("install", "install"),
    ("uninstall", "uninstall"),
    ("remove", "uninstall"),
    ("start", "start"),
    ("stop", "stop"),
    ("pause", "pause"),
    ("resume", "resume"),
    ("continue", "resume"),
    ("status", "status"),
    ("consolehost", "consolehost"),
];

/// Single-dash `name=value` options and the long flag each maps to.
const OPTIONS: &[(&str, &str)] = &[
    ("servicename", "--service-name"),
    ("displayname", "--display-name"),
    ("description", "--description"),
    ("configdir", "--config-dir"),
];

/// Rewrite legacy switches into clap form, leaving everything else untouched.
pub fn normalize<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut normalized: Vec<String> = args.next().into_iter().collect();

    for arg in args {
        normalized.push(rewrite(&arg).unwrap_or(arg));
    }

    normalized
}

fn rewrite(arg: &str) -> Option<String> {
    let body = arg.strip_prefix('-')?;
    if body.starts_with('-') || body.len() < 2 {
        return None;
    }

    if let Some((key, value)) = body.split_once('=') {
        let key = key.to_ascii_lowercase();
        let flag = OPTIONS.iter().find(|(name, _)| *name == key)?.1;
        let value = value.trim_matches('"');
        return Some(format!("{}={}", flag, value));
    }

    let key = body.to_ascii_lowercase();
    COMMANDS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, command)| command.to_string())
}
