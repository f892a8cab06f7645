//! Command grammar — raw chat text into a typed `Command`.
//!
//! The boundary layer has already stripped the bot mention; what arrives
//! here is the command body. Splitting is on whitespace except for `create`,
//! where quoted substrings are the atomic tokens: the first is the question,
//! the rest are options, and unquoted text between them is ignored.

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Render the fixed help text. Also the fallback for anything
    /// unrecognized or underspecified — a control outcome, not an error.
    Help,
    Create {
        question: String,
        options: Vec<String>,
    },
    Vote {
        vote_id: String,
        option: String,
    },
    Results {
        vote_id: String,
    },
    Close {
        vote_id: String,
    },
    Delete {
        vote_id: String,
    },
}

impl Command {
    /// Parse a command body.
    pub fn parse(text: &str) -> Command {
        let text = text.trim();
        if text == "help" {
            return Command::Help;
        }

        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.len() < 2 {
            return Command::Help;
        }

        match fields[0] {
            "create" => {
                let mut quoted = quoted_substrings(text);
                if quoted.is_empty() {
                    // No question at all; validation downstream would reject
                    // an empty question anyway, but an unquoted create is
                    // just someone who hasn't seen the syntax.
                    return Command::Create {
                        question: String::new(),
                        options: Vec::new(),
                    };
                }
                let question = quoted.remove(0);
                Command::Create {
                    question,
                    options: quoted,
                }
            }
            "vote" => {
                // vote <pollID> <option...>; trailing fields joined so
                // multi-word labels work without quoting.
                if fields.len() < 3 {
                    return Command::Help;
                }
                Command::Vote {
                    vote_id: fields[1].to_string(),
                    option: fields[2..].join(" "),
                }
            }
            "results" => {
                if fields.len() != 2 {
                    return Command::Help;
                }
                Command::Results {
                    vote_id: fields[1].to_string(),
                }
            }
            "close" => Command::Close {
                vote_id: fields[1].to_string(),
            },
            "delete" => Command::Delete {
                vote_id: fields[1].to_string(),
            },
            // Bare shorthand: <pollID> <option...>
            _ => Command::Vote {
                vote_id: fields[0].to_string(),
                option: fields[1..].join(" "),
            },
        }
    }
}

/// Extract the contents of each complete `"..."` pair, in order.
///
/// A trailing unpaired quote is ignored, so malformed quoting degrades to
/// however many complete pairs were found.
fn quoted_substrings(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Option<String> = None;
    for ch in text.chars() {
        match (&mut current, ch) {
            (None, '"') => current = Some(String::new()),
            (Some(buf), '"') => {
                out.push(std::mem::take(buf));
                current = None;
            }
            (Some(buf), ch) => buf.push(ch),
            (None, _) => {}
        }
    }
    out
}
