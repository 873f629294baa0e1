//! Parsing of console input lines.

/// Rows printed by `top` when no count is given.
pub const DEFAULT_TOP_COUNT: i64 = 25;

/// A single console command. The verb is matched case-insensitively, everything after
/// the first run of whitespace is its argument string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Echo(String),
    Top(Option<String>),
    Sql { statement: String, full: bool },
    Delete(String),
    Count,
    Help,
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }

        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_ascii_lowercase().as_str() {
            "exit" | "stop" | "quit" | "end" => Command::Exit,
            "echo" => Command::Echo(rest.to_string()),
            "top" => Command::Top((!rest.is_empty()).then(|| rest.to_string())),
            "sql" => Command::Sql {
                statement: rest.to_string(),
                full: false,
            },
            "sqlf" => Command::Sql {
                statement: rest.to_string(),
                full: true,
            },
            "rm" | "del" | "delete" => Command::Delete(rest.to_string()),
            "count" => Command::Count,
            "help" => Command::Help,
            _ => Command::Unknown(verb.to_string()),
        }
    }
}

/// Id fragments named in a delete argument string.
///
/// Fragments are separated by spaces or commas. Anything that is not purely ASCII
/// alphanumeric is dropped, as are repeats.
pub fn delete_fragments(args: &str) -> Vec<String> {
    let mut fragments: Vec<String> = Vec::new();
    for fragment in args.split([' ', ',', '\t']) {
        if fragment.is_empty() || !fragment.chars().all(|c| c.is_ascii_alphanumeric()) {
            continue;
        }
        if !fragments.iter().any(|seen| seen == fragment) {
            fragments.push(fragment.to_string());
        }
    }
    fragments
}

/// The row count for `top`, or a message explaining why the argument was refused.
pub fn top_count(arg: Option<&str>) -> Result<i64, String> {
    match arg {
        None => Ok(DEFAULT_TOP_COUNT),
        Some(raw) => match raw.parse::<i64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(format!("'{raw}' is not a positive number")),
        },
    }
}
