//! Polling the instrument's error queue.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, ErrorRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollMode {
    /// Drain the error queue after every operation.
    Always,
    /// Only when `Session::poll_errors()` is called.
    OnDemand,
}

impl Default for PollMode {
    fn default() -> Self {
        PollMode::OnDemand
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorPolicy {
    pub mode: PollMode,
    /// Upper bound on error queries per drain, guards against instruments that never
    /// report the no-error sentinel.
    pub max_polls: usize,
    /// Fail the operation with `Error::Instrument` if the automatic drain finds errors.
    pub raise_on_error: bool,
    pub query: String,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self {
            mode: PollMode::default(),
            max_polls: 10,
            raise_on_error: false,
            query: "CMR?".to_string(),
        }
    }
}

impl ErrorPolicy {
    pub fn polls_after_operation(&self) -> bool {
        self.mode == PollMode::Always
    }
}

/// Outcome of draining the error queue.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPoll {
    /// Non-zero records, oldest first.
    pub records: Vec<ErrorRecord>,
    /// The no-error record that ended the drain, `None` if the bound was hit.
    pub sentinel: Option<ErrorRecord>,
}

impl ErrorPoll {
    pub fn is_drained(&self) -> bool {
        self.sentinel.is_some()
    }
}

#[async_trait]
pub trait Querier: Send {
    async fn query(&mut self, text: &str) -> crate::Result<String>;
}

/// Issue the error query until the instrument reports no error or `max_polls` is reached.
pub async fn drain<Q: Querier + ?Sized>(querier: &mut Q, policy: &ErrorPolicy) -> crate::Result<ErrorPoll> {
    let mut ret = ErrorPoll::default();
    for _ in 0..policy.max_polls {
        let answer = querier.query(&policy.query).await?;
        let record = ErrorRecord::parse(&answer)?;
        if record.is_no_error() {
            ret.sentinel = Some(record);
            return Ok(ret);
        }
        ret.records.push(record);
    }
    log::warn!(
        "Error queue not drained after {} polls, {} records read",
        policy.max_polls,
        ret.records.len()
    );
    Ok(ret)
}

/// Turn the first drained record into an error if the policy asks for it.
pub fn escalate(poll: &ErrorPoll, policy: &ErrorPolicy) -> crate::Result<()> {
    if !policy.raise_on_error {
        return Ok(());
    }
    match poll.records.first() {
        Some(record) => Err(Error::Instrument(record.clone())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeQuerier {
        answers: Vec<String>,
        queries: Vec<String>,
    }

    impl FakeQuerier {
        fn new(answers: &[&str]) -> Self {
            Self {
                answers: answers.iter().rev().map(|x| x.to_string()).collect(),
                queries: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl Querier for FakeQuerier {
        async fn query(&mut self, text: &str) -> crate::Result<String> {
            self.queries.push(text.to_string());
            match self.answers.len() {
                0 => Err(Error::Timeout),
                1 => Ok(self.answers[0].clone()),
                _ => Ok(self.answers.pop().unwrap()),
            }
        }
    }

    #[tokio::test]
    async fn drain_until_sentinel() {
        let mut querier = FakeQuerier::new(&["CMR 13", "21,\"Permission error\"", "0"]);
        let policy = ErrorPolicy::default();
        let poll = drain(&mut querier, &policy).await.unwrap();
        assert!(poll.is_drained());
        assert_eq!(
            poll.records,
            vec![ErrorRecord::new(13, ""), ErrorRecord::new(21, "Permission error")]
        );
        assert_eq!(querier.queries, vec!["CMR?"; 3]);
    }

    #[tokio::test]
    async fn drain_stops_at_bound() {
        let mut querier = FakeQuerier::new(&["5,busy"]);
        let policy = ErrorPolicy::default();
        let poll = drain(&mut querier, &policy).await.unwrap();
        assert!(!poll.is_drained());
        assert_eq!(poll.records.len(), 10);
        assert_eq!(querier.queries.len(), 10);
    }

    #[tokio::test]
    async fn drain_propagates_faults() {
        let mut querier = FakeQuerier::new(&["garbage"]);
        let ret = drain(&mut querier, &ErrorPolicy::default()).await;
        assert!(matches!(ret, Err(Error::Format(_))));

        let mut querier = FakeQuerier::new(&[]);
        let ret = drain(&mut querier, &ErrorPolicy::default()).await;
        assert!(matches!(ret, Err(Error::Timeout)));
    }

    #[test]
    fn escalate_only_if_configured() {
        let poll = ErrorPoll {
            records: vec![ErrorRecord::new(21, "Permission error"), ErrorRecord::new(3, "")],
            sentinel: Some(ErrorRecord::no_error()),
        };
        let mut policy = ErrorPolicy::default();
        assert!(escalate(&poll, &policy).is_ok());
        policy.raise_on_error = true;
        match escalate(&poll, &policy) {
            Err(Error::Instrument(record)) => assert_eq!(record.code, 21),
            _ => panic!(),
        }
        assert!(escalate(&ErrorPoll::default(), &policy).is_ok());
    }
}
