//! Operation audit log.

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::color::Rgb;
use crate::command::{Effect, Percent};
use crate::control::{Applied, Call, LedControl, Operation};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { leaves: usize },
    Failure { error: String },
}

/// One forwarded operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationRecord {
    pub target: String,
    pub operation: Operation,
    pub args: String,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
}

/// Append-only record of operations, shared between logging proxies.
#[derive(Debug, Default)]
pub struct OperationLog {
    records: RefCell<Vec<OperationRecord>>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: OperationRecord) {
        self.records.borrow_mut().push(record);
    }

    pub fn records(&self) -> Vec<OperationRecord> {
        self.records.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }
}

/// Records every call and its outcome, then hands the result back untouched.
pub struct LoggingProxy<C> {
    inner: C,
    log: Rc<OperationLog>,
}

impl<C: LedControl> LoggingProxy<C> {
    pub fn new(inner: C, log: Rc<OperationLog>) -> Self {
        LoggingProxy { inner, log }
    }

    async fn logged(&mut self, call: Call) -> Result<Applied> {
        let operation = call.operation();
        let args = call.args();
        let result = call.invoke(&mut self.inner).await;
        let target = self.inner.target().to_string();
        let outcome = match &result {
            Ok(applied) => {
                log::info!("{target}: {operation}({args}) ok, {} leaves", applied.leaves);
                Outcome::Success {
                    leaves: applied.leaves,
                }
            }
            Err(e) => {
                log::info!("{target}: {operation}({args}) failed: {e}");
                Outcome::Failure {
                    error: e.to_string(),
                }
            }
        };
        self.log.append(OperationRecord {
            target,
            operation,
            args,
            outcome,
            timestamp: Utc::now(),
        });
        result
    }
}

#[async_trait(?Send)]
impl<C: LedControl> LedControl for LoggingProxy<C> {
    fn target(&self) -> &str {
        self.inner.target()
    }

    async fn set_color(&mut self, color: Rgb) -> Result<Applied> {
        self.logged(Call::SetColor(color)).await
    }

    async fn set_brightness(&mut self, level: Percent) -> Result<Applied> {
        self.logged(Call::SetBrightness(level)).await
    }

    async fn toggle_power(&mut self) -> Result<Applied> {
        self.logged(Call::TogglePower).await
    }

    async fn set_effect(&mut self, effect: Effect) -> Result<Applied> {
        self.logged(Call::SetEffect(effect)).await
    }
}
