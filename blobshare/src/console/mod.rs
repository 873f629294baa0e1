//! Operator console running next to the HTTP server.
//!
//! Reads one command per line and works directly on the shared pool: listing the most
//! downloaded files, deleting by id fragment, and running arbitrary SQL. In production the
//! input is stdin (see [`spawn_stdin_reader`]) and the output stdout; tests drive it with
//! in-memory streams.
//!
//! A failing command prints `Error: <message>` and the loop carries on. The loop ends
//! with [`ConsoleExit::Shutdown`] on `exit`/`stop`/`quit`/`end`, or with
//! [`ConsoleExit::EndOfInput`] once the input is exhausted.

pub mod commands;

use crate::db::errors::DbError;
use crate::db::handlers::{Files, RawQueryOutcome, run_raw_query};
use commands::{Command, delete_fragments, top_count};
use futures::stream::{Fuse, Stream, StreamExt};
use sqlx::SqlitePool;
use sqlx::pool::PoolConnection;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

pub const PROMPT: &str = "share> ";
pub const DELETE_PROMPT: &str = "file(s) to delete> ";

/// Rows printed by `sql` before the output is cut short. `sqlf` prints everything.
pub const SQL_ROW_LIMIT: usize = 100;

const HELP: &str = "\
Commands:
  top [n]            most downloaded files (default 25)
  count              number of stored files
  rm|del|delete ids  delete files whose id contains any of the fragments
  sql <statement>    run a statement, showing at most 100 rows
  sqlf <statement>   run a statement, showing every row
  echo <text>        print text
  help               this list
  exit|stop|quit|end shut the server down";

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("Console I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Why the console loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// The operator asked for the server to stop
    Shutdown,
    /// Input closed; the server keeps running without a console
    EndOfInput,
}

enum Flow {
    Continue,
    Exit,
}

pub struct Console {
    db: SqlitePool,
}

impl Console {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Run commands from `input` until an exit command or the end of input.
    ///
    /// Only failures to write to `output` end the loop with an error.
    pub async fn run<S, W>(&self, input: S, mut output: W) -> Result<ConsoleExit, ConsoleError>
    where
        S: Stream<Item = String> + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut input = input.fuse();

        loop {
            output.write_all(PROMPT.as_bytes()).await?;
            output.flush().await?;

            let Some(line) = input.next().await else {
                return Ok(ConsoleExit::EndOfInput);
            };

            match self.execute(Command::parse(&line), &mut input, &mut output).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => return Ok(ConsoleExit::Shutdown),
                Err(ConsoleError::Io(e)) => return Err(ConsoleError::Io(e)),
                Err(e) => {
                    warn!(command = %line.trim(), "Console command failed: {:#}", e);
                    write_line(&mut output, &format!("Error: {e}")).await?;
                }
            }
        }
    }

    async fn execute<S, W>(&self, command: Command, input: &mut Fuse<S>, output: &mut W) -> Result<Flow, ConsoleError>
    where
        S: Stream<Item = String> + Unpin,
        W: AsyncWrite + Unpin,
    {
        match command {
            Command::Exit => {
                info!("Shutdown requested from the console");
                return Ok(Flow::Exit);
            }
            Command::Empty => {}
            Command::Echo(text) => write_line(output, &text).await?,
            Command::Help => write_line(output, HELP).await?,
            Command::Unknown(_) => write_line(output, "Unknown command").await?,
            Command::Count => {
                let mut conn = self.connection().await?;
                let count = Files::new(&mut conn).count().await?;
                write_line(output, &format!("{count} files stored")).await?;
            }
            Command::Top(arg) => {
                let limit = top_count(arg.as_deref()).map_err(ConsoleError::InvalidArgument)?;
                self.top(limit, output).await?;
            }
            Command::Sql { statement, full } => self.sql(&statement, full, output).await?,
            Command::Delete(args) => self.delete(&args, input, output).await?,
        }
        Ok(Flow::Continue)
    }

    async fn connection(&self) -> Result<PoolConnection<sqlx::Sqlite>, ConsoleError> {
        Ok(self.db.acquire().await.map_err(DbError::from)?)
    }

    async fn top<W: AsyncWrite + Unpin>(&self, limit: i64, output: &mut W) -> Result<(), ConsoleError> {
        let mut conn = self.connection().await?;
        let files = Files::new(&mut conn).list_top_by_hits(limit).await?;

        if files.is_empty() {
            return write_line(output, "No files in database").await;
        }
        for file in files {
            let line = format!("File {}/{} - {} hits ({})", file.id, file.filename, file.hits, file.content_type);
            write_line(output, &line).await?;
        }
        Ok(())
    }

    async fn sql<W: AsyncWrite + Unpin>(&self, statement: &str, full: bool, output: &mut W) -> Result<(), ConsoleError> {
        if statement.is_empty() {
            return Err(ConsoleError::InvalidArgument("Usage: sql <statement>".to_string()));
        }

        info!(statement, "Running console statement");
        let mut conn = self.connection().await?;
        let outcome = run_raw_query(&mut conn, statement).await?;

        match outcome {
            RawQueryOutcome::Affected(n) => write_line(output, &format!("{n} affected rows")).await?,
            RawQueryOutcome::Rows { columns, rows } => {
                let shown = if full { rows.len() } else { rows.len().min(SQL_ROW_LIMIT) };
                for row in &rows[..shown] {
                    let line = columns
                        .iter()
                        .zip(row)
                        .map(|(column, value)| format!("{column}={value}"))
                        .collect::<Vec<_>>()
                        .join(" | ");
                    write_line(output, &line).await?;
                }
                if shown < rows.len() {
                    write_line(output, "<more results, limit or use sqlf to show all>").await?;
                }
            }
        }
        Ok(())
    }

    async fn delete<S, W>(&self, args: &str, input: &mut Fuse<S>, output: &mut W) -> Result<(), ConsoleError>
    where
        S: Stream<Item = String> + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut fragments = delete_fragments(args);

        while fragments.is_empty() {
            output.write_all(DELETE_PROMPT.as_bytes()).await?;
            output.flush().await?;
            match input.next().await {
                Some(line) => fragments = delete_fragments(&line),
                // Nothing to delete; the main loop sees the end of input next
                None => return Ok(()),
            }
        }

        let mut conn = self.connection().await?;
        let mut repo = Files::new(&mut conn);
        for fragment in fragments {
            let affected = repo.delete_where_id_contains(&fragment).await?;
            info!(fragment = %fragment, affected, "Deleted files from the console");
            write_line(output, &format!("Deleting {fragment} -> {affected} affected rows")).await?;
        }
        Ok(())
    }
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, line: &str) -> Result<(), ConsoleError> {
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}

/// Lines typed on stdin, as a stream.
///
/// Reading happens on a dedicated OS thread so that a pending read never holds up the
/// runtime at shutdown. The stream ends when stdin is closed.
pub fn spawn_stdin_reader() -> std::io::Result<ReceiverStream<String>> {
    let (tx, rx) = mpsc::channel(16);

    std::thread::Builder::new().name("console-stdin".to_string()).spawn(move || {
        use std::io::BufRead;

        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read console input: {}", e);
                    break;
                }
            }
        }
    })?;

    Ok(ReceiverStream::new(rx))
}
