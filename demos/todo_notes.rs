//! # Example: Todos and Notes
//!
//! Two processors cooperating through a coordinator:
//! - `todos` completes tasks (slowly, and one of them fails);
//! - `notes` drives `todos` and writes a note once each task completes.
//!
//! Run with: `RUST_LOG=info cargo run --example todo_notes --features logging`

use std::sync::Arc;
use std::time::Duration;

use eventvisor::{
    CorrelationId, HandlerError, HandlerFn, HandlerRef, LogWriter, Processor, Strategy, Tracked,
};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct Todo {
    title: &'static str,
    work_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Note {
    Done(&'static str),
    Failed(&'static str, String),
}

fn todos_handler() -> HandlerRef<Todo, Vec<&'static str>> {
    HandlerFn::arc("complete-todo", |todo: Todo, mut done: Vec<&'static str>| {
        async_stream::stream! {
            tokio::time::sleep(Duration::from_millis(todo.work_ms)).await;
            if todo.title.contains("taxes") {
                yield Err(HandlerError::fail(format!("{} is due next year", todo.title)));
            } else {
                done.push(todo.title);
                yield Ok(done);
            }
        }
    })
}

fn notes_handler() -> HandlerRef<Note, Vec<String>> {
    HandlerFn::arc("write-note", |note: Note, mut notes: Vec<String>| {
        let line = match note {
            Note::Done(title) => format!("done: {title}"),
            Note::Failed(title, why) => format!("skipped: {title} ({why})"),
        };
        notes.push(line);
        futures::stream::iter([Ok::<_, HandlerError>(notes)])
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let todos = Processor::builder("todos", Vec::new(), todos_handler())
        .strategy(Strategy::Concurrent)
        .timeout(Duration::from_secs(2))
        .build();
    let notes = Processor::builder("notes", Vec::new(), notes_handler())
        .strategy(Strategy::Sequential)
        .build();

    let plan = [
        Todo {
            title: "buy milk",
            work_ms: 150,
        },
        Todo {
            title: "file taxes",
            work_ms: 50,
        },
        Todo {
            title: "walk dog",
            work_ms: 300,
        },
    ];

    for todo in plan {
        let id = CorrelationId::next();
        todos.bus().subscribe(id, Arc::new(LogWriter::new()));

        let notes_handle = notes.handle();
        notes
            .coordinator()
            .drive_tracked(&todos, Tracked::with_id(id, todo), move |done| {
                let title = done.event().title;
                let note = match done.error() {
                    None => Note::Done(title),
                    Some(err) => Note::Failed(title, err.to_string()),
                };
                if let Err(err) = notes_handle.try_submit(note) {
                    tracing::warn!(error = %err, "note dropped");
                }
            })
            .await?;
    }

    let mut written = notes.states();
    while notes.state().len() < 3 {
        written.recv().await?;
    }

    println!("todos done: {:?}", todos.state());
    for line in notes.state() {
        println!("note: {line}");
    }

    notes.close().await;
    todos.close().await;
    Ok(())
}
