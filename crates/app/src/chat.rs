//! Terminal chat loop over local PDFs.

use anyhow::Context;
use docux_core::{
    discover_pdf_files, load_document, ApiKey, AppConfig, CancelHandle, ChatEngine, ChatError,
    SessionStore, UploadedDocument,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

pub struct Sources {
    pub pdfs: Vec<PathBuf>,
    pub folder: Option<PathBuf>,
}

impl Sources {
    /// Explicit files first, then the folder's PDFs in path order.
    pub fn load(&self) -> anyhow::Result<Vec<UploadedDocument>> {
        let mut paths = self.pdfs.clone();
        if let Some(folder) = &self.folder {
            let found = discover_pdf_files(folder);
            if found.is_empty() {
                warn!(folder = %folder.display(), "no PDFs found");
            }
            paths.extend(found);
        }

        paths
            .iter()
            .map(|path| {
                load_document(path).with_context(|| format!("reading {}", path.display()))
            })
            .collect()
    }
}

enum Input {
    Quit,
    History,
    Question(String),
}

fn parse_input(line: &str) -> Option<Input> {
    match line.trim() {
        "" => None,
        "/quit" | "/exit" => Some(Input::Quit),
        "/history" => Some(Input::History),
        question => Some(Input::Question(question.to_string())),
    }
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, label: &str) -> anyhow::Result<Option<String>> {
    let mut stdout = io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;
    Ok(lines.next_line().await?)
}

pub async fn run(
    config: AppConfig,
    api_key: Option<String>,
    sources: Sources,
    session_id: &str,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(io::stdin()).lines();

    let api_key = match ApiKey::parse(api_key.as_deref()) {
        Ok(key) => key,
        Err(_) => {
            println!("Please enter the Groq API key.");
            let entered = prompt(&mut lines, "Groq API key: ").await?;
            ApiKey::parse(entered.as_deref())?
        }
    };

    let engine = ChatEngine::from_config(&config, api_key, Arc::new(SessionStore::new()))?;

    let documents = sources.load()?;
    if documents.is_empty() {
        println!("No PDFs given; pass --pdf or --folder to ask about documents.");
    } else {
        let summary = engine
            .pipeline()
            .index_batch(&documents, &engine.context())
            .await?;
        println!(
            "Indexed {} file(s): {} page(s), {} chunk(s).",
            summary.documents, summary.text_units, summary.chunks
        );
    }
    println!("Session {session_id}. Type a question, /history, or /quit.");

    while let Some(line) = prompt(&mut lines, "> ").await? {
        match parse_input(&line) {
            None => continue,
            Some(Input::Quit) => break,
            Some(Input::History) => {
                for turn in engine.sessions().history(session_id) {
                    println!("{:?}: {}", turn.role, turn.text);
                }
            }
            Some(Input::Question(question)) => match ask(&engine, session_id, &question).await {
                Ok(answer) => println!("Assistant: {answer}"),
                Err(error) => println!("{:?}: {error}", error.kind()),
            },
        }
    }

    info!(session_id, turns = engine.sessions().history(session_id).len(), "chat ended");
    Ok(())
}

/// Ctrl-C cancels the in-flight question instead of the whole session.
async fn ask(engine: &ChatEngine, session_id: &str, question: &str) -> Result<String, ChatError> {
    let cancel = CancelHandle::new();
    let ctx = cancel.context(engine.request_timeout());
    let answer = engine.ask(session_id, question, &ctx);
    tokio::pin!(answer);

    let finished = tokio::select! {
        report = &mut answer => Some(report),
        _ = tokio::signal::ctrl_c() => None,
    };
    let report = match finished {
        Some(report) => report?,
        None => {
            cancel.cancel();
            answer.await?
        }
    };
    Ok(report.answer.text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_and_questions_are_told_apart() {
        assert!(parse_input("   ").is_none());
        assert!(matches!(parse_input("/quit"), Some(Input::Quit)));
        assert!(matches!(parse_input(" /history "), Some(Input::History)));
        match parse_input(" What is on page 2? ") {
            Some(Input::Question(question)) => assert_eq!(question, "What is on page 2?"),
            _ => panic!("expected a question"),
        }
    }

    #[test]
    fn missing_pdf_path_is_an_error() {
        let sources = Sources {
            pdfs: vec![PathBuf::from("/definitely/not/here.pdf")],
            folder: None,
        };
        let error = sources.load().unwrap_err();
        assert!(error.to_string().contains("here.pdf"));
    }

    #[test]
    fn empty_sources_load_nothing() {
        let sources = Sources {
            pdfs: Vec::new(),
            folder: None,
        };
        assert!(sources.load().unwrap().is_empty());
    }
}
