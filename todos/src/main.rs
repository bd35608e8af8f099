//! Terminal front end for the todo list.
//!
//! Restores the session (or asks for an email, and a name when the email is
//! unknown), then reads one command per line:
//!
//! ```text
//! add <title>            toggle <id>          edit <id> <title>
//! rm <id>                clear                filter all|active|completed
//! dismiss                logout               quit
//! ```

use anyhow::{Context, Result};
use std::time::Duration;
use todosync::{
    AppError, Config, FilterStatus, LoginOutcome, RenameOutcome, TodoApp, TodoId, TodosState,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type Input = Lines<BufReader<Stdin>>;

/// One line of user input
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Add(String),
    Toggle(TodoId),
    Edit(TodoId, String),
    Remove(TodoId),
    Clear,
    Filter(FilterStatus),
    Dismiss,
    Logout,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        let id = |text: &str| {
            text.parse::<TodoId>()
                .map_err(|_| format!("expected a todo id, got {text:?}"))
        };

        match verb {
            "add" => Ok(Self::Add(rest.to_string())),
            "toggle" => id(rest).map(Self::Toggle),
            "edit" => {
                let (target, title) = rest.split_once(' ').unwrap_or((rest, ""));
                Ok(Self::Edit(id(target)?, title.to_string()))
            },
            "rm" => id(rest).map(Self::Remove),
            "clear" => Ok(Self::Clear),
            "filter" => FilterStatus::from_name(rest)
                .map(Self::Filter)
                .ok_or_else(|| format!("unknown filter {rest:?}")),
            "dismiss" => Ok(Self::Dismiss),
            "logout" => Ok(Self::Logout),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("unknown command {other:?}")),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` may carry RUST_LOG, and config warnings need the subscriber
    let _ = dotenvy::dotenv();
    init_tracing()?;
    let config = Config::from_env();
    tracing::info!(api_url = %config.api_url, "Starting todosync");

    let app = TodoApp::from_config(&config).context("building the todo client")?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    if app.start().await?.is_none() && !sign_in(&app, &mut input).await? {
        return Ok(());
    }
    render(&app.todos_state().await);

    while let Some(line) = prompt(&mut input, "> ").await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            },
        };

        match run(&app, command).await {
            Ok(true) => {},
            Ok(false) => break,
            Err(AppError::Todos(_)) => {},
            Err(error) => println!("{error}"),
        }

        if app.user().await.is_none() && !sign_in(&app, &mut input).await? {
            break;
        }
        render(&app.todos_state().await);
    }

    if let Err(error) = app.shutdown(Duration::from_secs(5)).await {
        tracing::warn!(%error, "Shutdown incomplete");
    }
    Ok(())
}

/// Executes one command; returns false to quit
async fn run(app: &TodoApp, command: Command) -> Result<bool, AppError> {
    match command {
        Command::Add(title) => {
            let todo = app.add_todo(&title).await?;
            tracing::debug!(id = todo.id, "Added");
        },
        Command::Toggle(id) => {
            app.toggle_todo(id).await?;
        },
        Command::Edit(id, title) => match app.rename_todo(id, &title).await? {
            RenameOutcome::Unchanged => println!("unchanged"),
            RenameOutcome::Deleted => println!("deleted {id}"),
            RenameOutcome::Renamed(todo) => println!("renamed to {:?}", todo.title),
        },
        Command::Remove(id) => app.delete_todo(id).await?,
        Command::Clear => {
            let removed = app.clear_completed().await?;
            println!("removed {removed}");
        },
        Command::Filter(filter) => app.set_filter(filter).await?,
        Command::Dismiss => app.dismiss_error().await?,
        Command::Logout => app.logout().await?,
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

/// Runs the login flow; returns false if input ended first
async fn sign_in(app: &TodoApp, input: &mut Input) -> Result<bool> {
    loop {
        let Some(email) = prompt(input, "email: ").await? else {
            return Ok(false);
        };
        match app.login(&email).await {
            Ok(LoginOutcome::SignedIn(user)) => {
                println!("Welcome back, {}", user.name);
                return Ok(true);
            },
            Ok(LoginOutcome::RegistrationRequired { email }) => {
                println!("No account for {email}; registering");
                if register(app, input).await? {
                    return Ok(true);
                }
                return Ok(false);
            },
            Err(error) => println!("{error}"),
        }
    }
}

async fn register(app: &TodoApp, input: &mut Input) -> Result<bool> {
    loop {
        let Some(name) = prompt(input, "name: ").await? else {
            return Ok(false);
        };
        match app.register(&name).await {
            Ok(user) => {
                println!("Welcome, {}", user.name);
                return Ok(true);
            },
            Err(error) => println!("{error}"),
        }
    }
}

async fn prompt(input: &mut Input, label: &str) -> Result<Option<String>> {
    use std::io::Write;

    print!("{label}");
    std::io::stdout().flush()?;
    Ok(input.next_line().await?)
}

fn render(state: &TodosState) {
    println!();
    for todo in state.visible_todos() {
        let mark = if todo.completed { 'x' } else { ' ' };
        let busy = if state.is_pending(todo.id) { " …" } else { "" };
        println!("  [{mark}] {:>4}  {}{busy}", todo.id, todo.title);
    }
    if let Some(temp) = state.temp_todo() {
        println!("  [ ]    …  {}", temp.title);
    }

    let left = state.items_left();
    let noun = if left == 1 { "item" } else { "items" };
    let filters: Vec<String> = FilterStatus::ALL
        .iter()
        .map(|filter| {
            if *filter == state.filter {
                format!("[{filter}]")
            } else {
                filter.to_string()
            }
        })
        .collect();
    let clear = if state.has_completed() { "  clear" } else { "" };
    println!("{left} {noun} left   {}{clear}", filters.join(" "));

    if let Some(error) = state.error {
        println!("! {error}");
    }
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todosync=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("add  Buy milk "), Ok(Command::Add("Buy milk".into())));
        assert_eq!(Command::parse("toggle 5"), Ok(Command::Toggle(5)));
        assert_eq!(
            Command::parse("edit 5 Buy bread"),
            Ok(Command::Edit(5, "Buy bread".into()))
        );
        assert_eq!(Command::parse("edit 5"), Ok(Command::Edit(5, String::new())));
        assert_eq!(Command::parse("rm 7"), Ok(Command::Remove(7)));
        assert_eq!(
            Command::parse("filter Completed"),
            Ok(Command::Filter(FilterStatus::Completed))
        );
        assert_eq!(Command::parse("quit"), Ok(Command::Quit));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Command::parse("toggle five").is_err());
        assert!(Command::parse("filter done").is_err());
        assert!(Command::parse("launch").is_err());
    }
}
