use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::base::{RetrieveOptions, Retriever, SearchResults};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub question: String,
    pub options: RetrieveOptions,
}

/// A mock retriever that records every call and returns queued outcomes.
/// With an empty queue it answers with an empty result set.
#[derive(Default)]
pub struct MockRetriever {
    calls: Mutex<Vec<RecordedCall>>,
    outcomes: Mutex<VecDeque<Result<SearchResults, String>>>,
}

impl MockRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_results(&self, results: SearchResults) {
        self.outcomes.lock().unwrap().push_back(Ok(results));
    }

    pub fn push_error<S: Into<String>>(&self, message: S) {
        self.outcomes.lock().unwrap().push_back(Err(message.into()));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for MockRetriever {
    async fn retrieve(&self, question: &str, options: RetrieveOptions) -> Result<SearchResults> {
        self.calls.lock().unwrap().push(RecordedCall {
            question: question.to_string(),
            options,
        });

        match self.outcomes.lock().unwrap().pop_front() {
            Some(Ok(results)) => Ok(results),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(SearchResults::default()),
        }
    }
}
