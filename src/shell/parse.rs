use std::fmt;

use crate::{shell::command::Command, utils::parse_size};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Empty,                                    // 空行或注释
    UnknownVerb(String),
    MissingArgument { usage: &'static str },
    InvalidArgument(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => Ok(()),
            ParseError::UnknownVerb(verb) => write!(f, "UNKNOWN COMMAND: {}", verb),
            ParseError::MissingArgument { usage } => write!(f, "USAGE: {}", usage),
            ParseError::InvalidArgument(msg) => write!(f, "INVALID ARGUMENT: {}", msg),
        }
    }
}

/// 所有命令动词，交互模式下用于补全
pub const VERBS: &[&str] = &[
    "cp", "mv", "rm", "mkdir", "rmdir", "ls", "cat", "cd", "pwd", "info", "incp", "outcp", "load",
    "format", "slink", "printfs", "help", "quit", "exit",
];

pub fn parse_command(input: &str) -> Result<Command, ParseError> {
    let tokens: Vec<&str> = input.trim().split_ascii_whitespace().collect();
    let Some((&verb, args)) = tokens.split_first() else {
        return Err(ParseError::Empty);
    };
    if verb.starts_with('#') {
        return Err(ParseError::Empty);
    }

    let arg = |i: usize, usage: &'static str| {
        args.get(i)
            .map(|s| s.to_string())
            .ok_or(ParseError::MissingArgument { usage })
    };
    let optional = |i: usize| args.get(i).map(|s| s.to_string());

    let cmd = match verb {
        "cp" => Command::Cp(arg(0, "cp <src> <dst>")?, arg(1, "cp <src> <dst>")?),
        "mv" => Command::Mv(arg(0, "mv <src> <dst>")?, arg(1, "mv <src> <dst>")?),
        "rm" => Command::Rm(arg(0, "rm <file>")?),
        "mkdir" => Command::Mkdir(arg(0, "mkdir <dir>")?),
        "rmdir" => Command::Rmdir(arg(0, "rmdir <dir>")?),
        "ls" => Command::Ls(optional(0)),
        "cat" => Command::Cat(arg(0, "cat <file>")?),
        "cd" => Command::Cd(optional(0)),
        "pwd" => Command::Pwd,
        "info" => Command::Info(arg(0, "info <path>")?),
        "incp" => Command::Incp(arg(0, "incp <host-file> [dst]")?, optional(1)),
        "outcp" => Command::Outcp(
            arg(0, "outcp <file> <host-dir>")?,
            arg(1, "outcp <file> <host-dir>")?,
        ),
        "load" => Command::Load(arg(0, "load <host-script>")?),
        "format" => {
            let size = arg(0, "format <size>, e.g. 600MB")?;
            Command::Format(parse_size(&size).map_err(ParseError::InvalidArgument)?)
        }
        "slink" => Command::Slink(
            arg(0, "slink <target> <link>")?,
            arg(1, "slink <target> <link>")?,
        ),
        "printfs" => Command::Printfs,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ParseError::UnknownVerb(other.to_string())),
    };
    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbs_and_arguments() {
        assert_eq!(
            parse_command("cp a.txt /docs\n"),
            Ok(Command::Cp("a.txt".into(), "/docs".into()))
        );
        assert_eq!(parse_command("  ls  "), Ok(Command::Ls(None)));
        assert_eq!(parse_command("ls /a"), Ok(Command::Ls(Some("/a".into()))));
        assert_eq!(parse_command("incp host.bin"), Ok(Command::Incp("host.bin".into(), None)));
        assert_eq!(parse_command("format 10KB"), Ok(Command::Format(10_000)));
        assert_eq!(parse_command("exit"), Ok(Command::Quit));
    }

    #[test]
    fn errors() {
        assert_eq!(parse_command("   "), Err(ParseError::Empty));
        assert_eq!(parse_command("# comment"), Err(ParseError::Empty));
        assert_eq!(
            parse_command("frobnicate x"),
            Err(ParseError::UnknownVerb("frobnicate".into()))
        );
        assert!(matches!(
            parse_command("mv only-one"),
            Err(ParseError::MissingArgument { .. })
        ));
        assert!(matches!(
            parse_command("format lots"),
            Err(ParseError::InvalidArgument(_))
        ));
    }

    #[test]
    fn every_verb_parses_with_arguments() {
        for verb in VERBS {
            let line = format!("{} a b", verb);
            assert!(parse_command(&line).is_ok() || *verb == "format", "{}", verb);
        }
    }
}
