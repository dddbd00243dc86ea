//! Thread-safe parser pool for tree-sitter parsers
//!
//! Tree-sitter parsers are not `Sync`, so each worker thread owns one parser
//! and requests are handed over a channel.

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tree_sitter::{Language, Parser};

/// Grammars the pool can parse with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Python,
}

impl FileType {
    /// Get the tree-sitter language for this file type
    pub fn get_language(&self) -> Language {
        match self {
            FileType::Python => tree_sitter_python::LANGUAGE.into(),
        }
    }
}

/// A parsing request sent to the parser pool
#[derive(Debug)]
pub struct ParseRequest {
    pub file_type: FileType,
    pub content: String,
    pub path: PathBuf,
}

/// Result of a parsing operation
#[derive(Debug)]
pub struct ParseResult {
    pub tree: tree_sitter::Tree,
    pub path: PathBuf,
}

/// Internal message for the parser worker
#[derive(Debug)]
struct WorkerRequest {
    request: ParseRequest,
    response_sender: Sender<Result<ParseResult>>,
}

/// Thread-safe parser pool
#[derive(Clone)]
pub struct ParserPool {
    sender: Sender<WorkerRequest>,
}

impl std::fmt::Debug for ParserPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserPool").finish_non_exhaustive()
    }
}

impl ParserPool {
    /// Create a new parser pool with the specified number of worker threads
    pub fn new(num_workers: usize) -> Self {
        let (sender, receiver) = channel::<WorkerRequest>();
        let receiver = Arc::new(Mutex::new(receiver));

        for i in 0..num_workers.max(1) {
            let receiver = Arc::clone(&receiver);
            std::thread::spawn(move || {
                Self::worker_thread(i, receiver);
            });
        }

        Self { sender }
    }

    /// Worker thread function that processes parsing requests
    fn worker_thread(worker_id: usize, receiver: Arc<Mutex<Receiver<WorkerRequest>>>) {
        tracing::debug!("Parser worker {} started", worker_id);

        let mut parser = Parser::new();
        let mut current: Option<FileType> = None;

        loop {
            let next = match receiver.lock() {
                Ok(guard) => guard.recv(),
                Err(_) => break,
            };
            let WorkerRequest {
                request,
                response_sender,
            } = match next {
                Ok(req) => req,
                Err(_) => break,
            };

            if current != Some(request.file_type) {
                if let Err(e) = parser.set_language(&request.file_type.get_language()) {
                    let _ = response_sender.send(Err(anyhow::anyhow!("Failed to set language: {}", e)));
                    continue;
                }
                current = Some(request.file_type);
            }

            let result = match parser.parse(&request.content, None) {
                Some(tree) => Ok(ParseResult {
                    tree,
                    path: request.path,
                }),
                None => Err(anyhow::anyhow!("Failed to parse content")),
            };

            if response_sender.send(result).is_err() {
                tracing::warn!("Failed to send parse result back to caller");
            }
        }

        tracing::debug!("Parser worker {} shutting down", worker_id);
    }

    /// Parse content, blocking the current thread until a worker answers.
    pub fn parse_blocking(&self, request: ParseRequest) -> Result<ParseResult> {
        let (response_sender, response_receiver) = channel();

        let worker_request = WorkerRequest {
            request,
            response_sender,
        };

        self.sender
            .send(worker_request)
            .map_err(|_| anyhow::anyhow!("Parser pool is shut down"))?;

        response_receiver
            .recv()
            .map_err(|_| anyhow::anyhow!("Parser worker died"))?
    }
}
