//! Scripted vision transport for testing
//!
//! Returns a fixed reply (or a fixed transport failure) and records how it
//! was called. Useful for unit tests and for running the pipeline without
//! watsonx credentials.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result, TransportStage};
use crate::normalizer::NormalizedImage;

use super::VisionTransport;

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(TransportStage, String),
}

/// Mock vision transport
///
/// Clones share call counters, so a test can keep one handle and give the
/// other to a `VisionClient`.
#[derive(Debug, Clone)]
pub struct MockTransport {
    name: String,
    reply: Reply,
    calls: Arc<AtomicUsize>,
    last_instruction: Arc<Mutex<Option<String>>>,
}

impl MockTransport {
    /// A transport that always answers with `text`
    pub fn replying(name: &str, text: impl Into<String>) -> Self {
        Self::with_reply(name, Reply::Text(text.into()))
    }

    /// A transport that always fails at `stage`
    pub fn failing(name: &str, stage: TransportStage, detail: impl Into<String>) -> Self {
        Self::with_reply(name, Reply::Fail(stage, detail.into()))
    }

    fn with_reply(name: &str, reply: Reply) -> Self {
        Self {
            name: name.to_string(),
            reply,
            calls: Arc::new(AtomicUsize::new(0)),
            last_instruction: Arc::new(Mutex::new(None)),
        }
    }

    /// Number of times `send` was called
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Instruction passed to the most recent `send`
    pub fn last_instruction(&self) -> Option<String> {
        self.last_instruction
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl VisionTransport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, _image: &NormalizedImage, instruction: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_instruction.lock() {
            *guard = Some(instruction.to_string());
        }

        match &self.reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Fail(stage, detail) => Err(Error::transport(*stage, detail.clone())),
        }
    }
}
