use chrono::{DateTime, NaiveDateTime, Utc};

/// A parsed control-connection command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    User(String),
    Pass(String),
    Syst,
    Feat,
    Opts(String),
    Noop,
    Type(String),
    Mode(String),
    Stru(String),
    Quit,
    Pwd,
    Cwd(String),
    Cdup,
    Pasv,
    Epsv,
    List(String),
    Nlst(String),
    Stor(String),
    Appe(String),
    Allo(u64),
    Mkd(String),
    Rmd(String),
    Dele(String),
    Rnfr(String),
    Rnto(String),
    Chmod { mode: u32, path: String },
    Mfmt { modified: DateTime<Utc>, path: String },
    Size(String),
    /// Recognised verb with unusable arguments
    Invalid { verb: String, reason: &'static str },
    Unknown(String),
}

impl Command {
    /// Parses one control line, without its trailing CRLF.
    pub fn parse(line: &str) -> Command {
        let line = line.trim_end_matches(['\r', '\n']);
        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (line, ""),
        };
        let verb = verb.to_ascii_uppercase();

        match verb.as_str() {
            "USER" => Command::User(arg.to_string()),
            "PASS" => Command::Pass(arg.to_string()),
            "SYST" => Command::Syst,
            "FEAT" => Command::Feat,
            "OPTS" => Command::Opts(arg.to_string()),
            "NOOP" => Command::Noop,
            "TYPE" => Command::Type(arg.to_ascii_uppercase()),
            "MODE" => Command::Mode(arg.to_ascii_uppercase()),
            "STRU" => Command::Stru(arg.to_ascii_uppercase()),
            "QUIT" => Command::Quit,
            "PWD" | "XPWD" => Command::Pwd,
            "CWD" | "XCWD" => Command::Cwd(arg.to_string()),
            "CDUP" | "XCUP" => Command::Cdup,
            "PASV" => Command::Pasv,
            "EPSV" => Command::Epsv,
            "LIST" => Command::List(strip_list_flags(arg).to_string()),
            "NLST" => Command::Nlst(strip_list_flags(arg).to_string()),
            "STOR" => required(&verb, arg, Command::Stor),
            "APPE" => required(&verb, arg, Command::Appe),
            "ALLO" => match arg.split_whitespace().next().map(str::parse::<u64>) {
                Some(Ok(size)) => Command::Allo(size),
                _ => invalid(&verb, "expected a byte count"),
            },
            "MKD" | "XMKD" => required(&verb, arg, Command::Mkd),
            "RMD" | "XRMD" => required(&verb, arg, Command::Rmd),
            "DELE" => required(&verb, arg, Command::Dele),
            "RNFR" => required(&verb, arg, Command::Rnfr),
            "RNTO" => required(&verb, arg, Command::Rnto),
            "SIZE" => required(&verb, arg, Command::Size),
            "SITE" => parse_site(arg),
            "MFMT" => parse_mfmt(arg),
            _ => Command::Unknown(verb),
        }
    }
}

fn required(verb: &str, arg: &str, build: fn(String) -> Command) -> Command {
    if arg.is_empty() {
        invalid(verb, "missing path argument")
    } else {
        build(arg.to_string())
    }
}

fn invalid(verb: &str, reason: &'static str) -> Command {
    Command::Invalid {
        verb: verb.to_string(),
        reason,
    }
}

/// Clients commonly send `LIST -la`; the flags are ignored.
fn strip_list_flags(arg: &str) -> &str {
    let mut rest = arg;
    while rest.starts_with('-') {
        rest = match rest.split_once(' ') {
            Some((_, tail)) => tail.trim_start(),
            None => "",
        };
    }
    rest
}

fn parse_site(arg: &str) -> Command {
    let mut parts = arg.splitn(3, ' ');
    let sub = parts.next().unwrap_or_default().to_ascii_uppercase();
    if sub != "CHMOD" {
        return Command::Unknown(format!("SITE {sub}"));
    }

    let mode = parts.next().map(|m| u32::from_str_radix(m, 8));
    let path = parts.next().map(str::trim).filter(|p| !p.is_empty());
    match (mode, path) {
        (Some(Ok(mode)), Some(path)) if mode <= 0o7777 => Command::Chmod {
            mode,
            path: path.to_string(),
        },
        _ => invalid("SITE CHMOD", "expected <octal mode> <path>"),
    }
}

fn parse_mfmt(arg: &str) -> Command {
    let Some((stamp, path)) = arg.split_once(' ') else {
        return invalid("MFMT", "expected <YYYYMMDDHHMMSS> <path>");
    };
    let path = path.trim();
    match NaiveDateTime::parse_from_str(stamp, "%Y%m%d%H%M%S") {
        Ok(naive) if !path.is_empty() => Command::Mfmt {
            modified: naive.and_utc(),
            path: path.to_string(),
        },
        _ => invalid("MFMT", "expected <YYYYMMDDHHMMSS> <path>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_verbs_are_case_insensitive() {
        assert_eq!(Command::parse("user admin\r\n"), Command::User("admin".into()));
        assert_eq!(Command::parse("Pass  secret word"), Command::Pass("secret word".into()));
        assert_eq!(Command::parse("pwd"), Command::Pwd);
        assert_eq!(Command::parse("type i"), Command::Type("I".into()));
    }

    #[test]
    fn test_paths_keep_spaces() {
        assert_eq!(Command::parse("STOR My Plugin.jar"), Command::Stor("My Plugin.jar".into()));
        assert_eq!(Command::parse("RNTO new name.yml"), Command::Rnto("new name.yml".into()));
    }

    #[test]
    fn test_missing_arguments_are_invalid() {
        assert!(matches!(Command::parse("STOR"), Command::Invalid { .. }));
        assert!(matches!(Command::parse("DELE "), Command::Invalid { .. }));
        assert!(matches!(Command::parse("ALLO many"), Command::Invalid { .. }));
        assert_eq!(Command::parse("ALLO 1024"), Command::Allo(1024));
    }

    #[test]
    fn test_list_flags_are_dropped() {
        assert_eq!(Command::parse("LIST -la"), Command::List(String::new()));
        assert_eq!(Command::parse("LIST -a -l sub dir"), Command::List("sub dir".into()));
        assert_eq!(Command::parse("NLST"), Command::Nlst(String::new()));
    }

    #[test]
    fn test_site_chmod() {
        assert_eq!(
            Command::parse("SITE CHMOD 755 run.sh"),
            Command::Chmod {
                mode: 0o755,
                path: "run.sh".into()
            }
        );
        assert!(matches!(Command::parse("SITE CHMOD 999 x"), Command::Invalid { .. }));
        assert_eq!(Command::parse("SITE HELP"), Command::Unknown("SITE HELP".into()));
    }

    #[test]
    fn test_mfmt() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 9, 17, 5, 42).unwrap();
        assert_eq!(
            Command::parse("MFMT 20240309170542 Demo.jar"),
            Command::Mfmt {
                modified: expected,
                path: "Demo.jar".into()
            }
        );
        assert!(matches!(Command::parse("MFMT yesterday Demo.jar"), Command::Invalid { .. }));
    }

    #[test]
    fn test_unknown() {
        assert_eq!(Command::parse("RETR a.jar"), Command::Unknown("RETR".into()));
        assert_eq!(Command::parse("PORT 1,2,3,4,5,6"), Command::Unknown("PORT".into()));
    }
}
