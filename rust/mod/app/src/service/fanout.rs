//! Concurrent sibling writes with partial-failure accounting.

use futures_util::future::join_all;
use tracing::warn;

use lowcode_core::ServiceError;

use super::AppError;
use crate::store::{DocOps, Document};

pub(crate) async fn save_all<T: Document>(
    ops: &DocOps<T>,
    docs: Vec<T>,
) -> Vec<Result<T, ServiceError>> {
    join_all(docs.into_iter().map(|doc| ops.save(doc))).await
}

pub(crate) async fn insert_all<T: Document>(
    ops: &DocOps<T>,
    docs: Vec<T>,
) -> Vec<Result<T, ServiceError>> {
    join_all(docs.into_iter().map(|doc| ops.insert(doc))).await
}

pub(crate) async fn archive_all<T: Document>(
    ops: &DocOps<T>,
    docs: Vec<T>,
) -> Vec<Result<T, ServiceError>> {
    join_all(docs.into_iter().map(|doc| ops.archive(doc))).await
}

/// Running count of writes issued by one multi-document operation.
pub(crate) struct WriteTally {
    operation: &'static str,
    written: usize,
    failed: usize,
    first_error: Option<ServiceError>,
}

impl WriteTally {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            written: 0,
            failed: 0,
            first_error: None,
        }
    }

    /// Count the outcomes of one batch and keep the successful documents.
    pub fn record<T>(&mut self, results: Vec<Result<T, ServiceError>>) -> Vec<T> {
        let mut ok = Vec::with_capacity(results.len());
        for result in results {
            if let Some(doc) = self.record_one(result) {
                ok.push(doc);
            }
        }
        ok
    }

    pub fn record_one<T>(&mut self, result: Result<T, ServiceError>) -> Option<T> {
        match result {
            Ok(doc) => {
                self.written += 1;
                Some(doc)
            }
            Err(e) => {
                warn!("{}: write failed: {}", self.operation, e);
                self.failed += 1;
                self.first_error.get_or_insert(e);
                None
            }
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Stop here if anything failed so far. Writes already made stay.
    pub fn checkpoint(&mut self) -> Result<(), AppError> {
        match self.first_error.take() {
            None => Ok(()),
            Some(source) => Err(AppError::PartialFailure {
                operation: self.operation,
                written: self.written,
                failed: self.failed,
                source,
            }),
        }
    }
}
