use tabula_core::contacts::{ContactDraft, ContactField, ContactId, ContactPatch};
use tabula_core::events::ActiveView;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Sql(String),
    View(ActiveView),
    Contacts,
    Search(String),
    Show(ContactId),
    Add(ContactDraft),
    Edit(ContactId, ContactPatch),
    Delete(ContactId),
    Schema,
    Table(String),
    Refresh(Option<String>),
    CreateIndex {
        table: String,
        column: String,
        name: Option<String>,
    },
    DropIndex {
        table: String,
        name: String,
    },
    History,
    Replay(usize),
    Samples,
    Sample(usize),
    Editor,
    Run,
    Clear,
    Health,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command `:{0}`; type :help")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("`{0}` is not a contact field (name, email, phone, address, company)")]
    UnknownField(String),
    #[error("unterminated quote")]
    UnterminatedQuote,
}

pub const HELP: &str = "\
Plain lines are sent to the engine as SQL.

  :view contacts|sql|schema        switch view
  :contacts                        reload the contact list
  :search <text>                   filter contacts (blank reloads all)
  :show <id>                       fetch one contact
  :add name=.. email=.. [phone=.. address=.. company=..]
  :edit <id> field=value ...       update some fields
  :delete <id>                     delete after confirmation
  :schema                          list tables
  :table <name>                    select a table and show its columns
  :refresh [table]                 re-fetch the schema or one table
  :index <table> <column> [name]   create an index
  :drop-index <table> <name>       drop an index
  :history                         list submitted statements
  :replay <n>                      copy history entry n into the editor
  :samples / :sample <n>           list or load sample statements
  :editor                          show the editor buffer
  :run                             execute the editor buffer
  :clear                           clear the last result
  :health                          probe the engine
  :help                            this text
  :quit                            leave";

/// Parses one console line. Returns `Ok(None)` for a blank line.
pub fn parse_line(line: &str) -> Result<Option<Command>, CommandError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let Some(rest) = trimmed.strip_prefix(':') else {
        return Ok(Some(Command::Sql(trimmed.to_string())));
    };

    let (name, args) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(name, args)| (name, args.trim()));

    let command = match name {
        "view" => Command::View(
            ActiveView::parse(args).ok_or(CommandError::Usage(":view contacts|sql|schema"))?,
        ),
        "contacts" => Command::Contacts,
        "search" => Command::Search(args.to_string()),
        "show" => Command::Show(parse_id(args, ":show <id>")?),
        "add" => Command::Add(parse_draft(args)?),
        "edit" => {
            let (id, assignments) = args
                .split_once(char::is_whitespace)
                .ok_or(CommandError::Usage(":edit <id> field=value ..."))?;
            Command::Edit(
                parse_id(id, ":edit <id> field=value ...")?,
                parse_patch(assignments)?,
            )
        }
        "delete" => Command::Delete(parse_id(args, ":delete <id>")?),
        "schema" => Command::Schema,
        "table" => Command::Table(required(args, ":table <name>")?),
        "refresh" => Command::Refresh((!args.is_empty()).then(|| args.to_string())),
        "index" => {
            let words = tokenize(args)?;
            match words.as_slice() {
                [table, column] => Command::CreateIndex {
                    table: table.clone(),
                    column: column.clone(),
                    name: None,
                },
                [table, column, name] => Command::CreateIndex {
                    table: table.clone(),
                    column: column.clone(),
                    name: Some(name.clone()),
                },
                _ => return Err(CommandError::Usage(":index <table> <column> [name]")),
            }
        }
        "drop-index" => match tokenize(args)?.as_slice() {
            [table, name] => Command::DropIndex {
                table: table.clone(),
                name: name.clone(),
            },
            _ => return Err(CommandError::Usage(":drop-index <table> <name>")),
        },
        "history" => Command::History,
        "replay" => Command::Replay(parse_position(args, ":replay <n>")?),
        "samples" => Command::Samples,
        "sample" => Command::Sample(parse_position(args, ":sample <n>")?),
        "editor" => Command::Editor,
        "run" => Command::Run,
        "clear" => Command::Clear,
        "health" => Command::Health,
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

/// Answers to the delete prompt. Anything but `y`/`yes` cancels.
#[must_use]
pub fn is_confirmation(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn required(args: &str, usage: &'static str) -> Result<String, CommandError> {
    if args.is_empty() {
        return Err(CommandError::Usage(usage));
    }
    Ok(args.to_string())
}

fn parse_id(raw: &str, usage: &'static str) -> Result<ContactId, CommandError> {
    raw.trim()
        .parse::<u64>()
        .map(ContactId)
        .map_err(|_| CommandError::Usage(usage))
}

// History and samples are shown 1-based.
fn parse_position(raw: &str, usage: &'static str) -> Result<usize, CommandError> {
    match raw.trim().parse::<usize>() {
        Ok(position) if position > 0 => Ok(position - 1),
        _ => Err(CommandError::Usage(usage)),
    }
}

fn parse_patch(raw: &str) -> Result<ContactPatch, CommandError> {
    let mut patch = ContactPatch::default();
    for token in tokenize(raw)? {
        let (key, value) = token
            .split_once('=')
            .ok_or(CommandError::Usage("field=value"))?;
        let field =
            ContactField::parse(key).ok_or_else(|| CommandError::UnknownField(key.to_string()))?;
        patch.set(field, value);
    }
    Ok(patch)
}

fn parse_draft(raw: &str) -> Result<ContactDraft, CommandError> {
    let patch = parse_patch(raw)?;
    Ok(ContactDraft {
        name: patch.name.unwrap_or_default(),
        email: patch.email.unwrap_or_default(),
        phone: patch.phone,
        address: patch.address,
        company: patch.company,
    })
}

/// Splits on whitespace; double quotes group words, including inside `key="a b"`.
fn tokenize(raw: &str) -> Result<Vec<String>, CommandError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for ch in raw.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            ch if ch.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            ch => {
                current.push(ch);
                has_token = true;
            }
        }
    }

    if in_quotes {
        return Err(CommandError::UnterminatedQuote);
    }
    if has_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use tabula_core::contacts::{ContactDraft, ContactId, ContactPatch};
    use tabula_core::events::ActiveView;

    use super::{is_confirmation, parse_line, Command, CommandError};

    fn parse(line: &str) -> Command {
        parse_line(line)
            .expect("line should parse")
            .expect("line should not be blank")
    }

    #[test]
    fn plain_lines_are_sql_and_blank_lines_are_ignored() {
        assert_eq!(
            parse("  SELECT * FROM contacts LIMIT 10 "),
            Command::Sql("SELECT * FROM contacts LIMIT 10".to_string())
        );
        assert_eq!(parse_line("   ").expect("blank should parse"), None);
    }

    #[test]
    fn view_switching_accepts_aliases() {
        assert_eq!(parse(":view sql"), Command::View(ActiveView::SqlConsole));
        assert_eq!(parse(":view schema"), Command::View(ActiveView::SchemaBrowser));
        assert!(matches!(
            parse_line(":view reports"),
            Err(CommandError::Usage(_))
        ));
    }

    #[test]
    fn add_parses_quoted_assignments() {
        let command = parse(r#":add name="Ada Lovelace" email=ada@x.io company=Engines"#);

        assert_eq!(
            command,
            Command::Add(ContactDraft::new("Ada Lovelace", "ada@x.io").with_company("Engines"))
        );
    }

    #[test]
    fn edit_requires_id_and_known_fields() {
        let command = parse(":edit 7 phone=555-0100");
        let expected = ContactPatch {
            phone: Some("555-0100".to_string()),
            ..ContactPatch::default()
        };
        assert_eq!(command, Command::Edit(ContactId(7), expected));

        assert_eq!(
            parse_line(":edit 7 shoe=42"),
            Err(CommandError::UnknownField("shoe".to_string()))
        );
        assert!(matches!(parse_line(":edit seven"), Err(CommandError::Usage(_))));
    }

    #[test]
    fn index_commands_take_optional_name() {
        assert_eq!(
            parse(":index contacts email"),
            Command::CreateIndex {
                table: "contacts".to_string(),
                column: "email".to_string(),
                name: None,
            }
        );
        assert_eq!(
            parse(":drop-index contacts idx_email"),
            Command::DropIndex {
                table: "contacts".to_string(),
                name: "idx_email".to_string(),
            }
        );
        assert!(parse_line(":index contacts").is_err());
    }

    #[test]
    fn positions_are_one_based() {
        assert_eq!(parse(":replay 1"), Command::Replay(0));
        assert_eq!(parse(":sample 3"), Command::Sample(2));
        assert!(parse_line(":replay 0").is_err());
    }

    #[test]
    fn unknown_commands_and_open_quotes_are_reported() {
        assert_eq!(
            parse_line(":frobnicate"),
            Err(CommandError::Unknown("frobnicate".to_string()))
        );
        assert_eq!(
            parse_line(r#":add name="Ada"#),
            Err(CommandError::UnterminatedQuote)
        );
    }

    #[test]
    fn only_yes_confirms() {
        assert!(is_confirmation("y"));
        assert!(is_confirmation(" YES "));
        assert!(!is_confirmation(""));
        assert!(!is_confirmation("n"));
    }
}
