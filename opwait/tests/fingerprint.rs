use std::{cell::RefCell, time::Duration};

use futures_executor::block_on;
use opwait::{
    operation::{ComputeOperation, ComputeOperationHandle, Snapshot},
    remote::{
        mem::{Reply, ScriptedClient},
        ApiClient,
    },
    BackoffSchedule, ClientConfig, Error, ErrorKind, Fingerprint, FingerprintRetryWrapper,
    ManualTimer, OperationHandle, OperationPoller, PollOptions, RetryBudget, RetryOptions,
    Service, TransportError, Versioned,
};
use rstest::rstest;
use serde::Deserialize;
use serde_json::json;

const STALE: &str = include_str!("fixtures/stale_metadata_fingerprint.json");
const INVALID: &str = include_str!("fixtures/invalid_fingerprint.json");
const NOT_FOUND: &str = include_str!("fixtures/resource_not_found.json");
const INSTANCE: &str = include_str!("fixtures/instance_metadata.json");
const RUNNING: &str = include_str!("fixtures/compute_operation_running.json");
const DONE: &str = include_str!("fixtures/compute_operation_done.json");

fn reply_error(status: u16, body: &str) -> Error {
    Error::Transport(TransportError::from_reply(
        http::StatusCode::from_u16(status).unwrap(),
        body.to_owned(),
    ))
}

/// Server stand-in: every read returns a new fingerprint, the first
/// `conflicts` submissions are rejected.
#[derive(Default)]
struct Remote {
    version: u32,
    conflicts: usize,
    reads: Vec<Fingerprint>,
    submits: Vec<Fingerprint>,
}

impl Remote {
    fn read(&mut self) -> Versioned<Vec<String>> {
        self.version += 1;
        let fingerprint = Fingerprint::new(format!("fp-{}", self.version));
        self.reads.push(fingerprint.clone());
        Versioned {
            value: vec!["a=1".to_owned()],
            fingerprint,
        }
    }

    fn submit(&mut self, update: &Versioned<Vec<String>>) -> Result<u32, Error> {
        self.submits.push(update.fingerprint.clone());
        if self.conflicts > 0 {
            self.conflicts -= 1;
            return Err(reply_error(412, STALE));
        }
        Ok(self.version)
    }
}

fn run(remote: &RefCell<Remote>, timer: &ManualTimer) -> Result<u32, Error> {
    let wrapper = FingerprintRetryWrapper::new(timer.clone());
    block_on(wrapper.update_with_retry(
        || {
            let current = remote.borrow_mut().read();
            async move { Ok(current) }
        },
        |mut items: Vec<String>| {
            items.push("b=2".to_owned());
            Ok(items)
        },
        |update| {
            let out = remote.borrow_mut().submit(&update);
            async move { out }
        },
    ))
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(4)]
#[case(9)]
fn conflicts_reread_before_every_submit(#[case] conflicts: usize) {
    let timer = ManualTimer::new();
    let remote = RefCell::new(Remote {
        conflicts,
        ..Remote::default()
    });
    let version = run(&remote, &timer).unwrap();

    let remote = remote.into_inner();
    assert_eq!(remote.reads.len(), conflicts + 1);
    assert_eq!(remote.submits.len(), conflicts + 1);
    // each submit carries the fingerprint of the read right before it
    assert_eq!(remote.submits, remote.reads);
    assert_eq!(version as usize, conflicts + 1);
    assert_eq!(timer.sleeps().len(), conflicts);
}

#[test]
fn non_conflict_error_aborts_after_one_cycle() {
    let timer = ManualTimer::new();
    let wrapper = FingerprintRetryWrapper::new(timer.clone());
    let reads = RefCell::new(0);
    let submits = RefCell::new(0);
    let err = block_on(wrapper.update_with_retry(
        || {
            *reads.borrow_mut() += 1;
            async { Ok(Versioned::new(json!({"labels": {}}), "fp-1")) }
        },
        Ok,
        |_| {
            *submits.borrow_mut() += 1;
            async { Err::<(), _>(reply_error(404, NOT_FOUND)) }
        },
    ))
    .unwrap_err();

    assert_eq!((*reads.borrow(), *submits.borrow()), (1, 1));
    assert_eq!(err.transport().and_then(TransportError::status), Some(404));
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert!(timer.sleeps().is_empty());
}

#[test]
fn persistent_conflict_exhausts_the_budget() {
    let timer = ManualTimer::new();
    let remote = RefCell::new(Remote {
        conflicts: usize::MAX,
        ..Remote::default()
    });
    let err = run(&remote, &timer).unwrap_err();

    assert_eq!(remote.borrow().submits.len(), 10);
    assert_eq!(remote.borrow().reads.len(), 10);
    assert_eq!(timer.sleeps(), vec![Duration::from_millis(100); 9]);
    assert_eq!(err.kind(), ErrorKind::Exhausted);
    match err {
        Error::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 10);
            assert_eq!(source.kind(), ErrorKind::FingerprintConflict);
            assert!(source.to_string().contains("Supplied fingerprint does not match"));
        }
        other => panic!("unexpected {other}"),
    }
}

#[test]
fn budget_and_schedule_are_configurable() {
    let timer = ManualTimer::new();
    let wrapper = FingerprintRetryWrapper::new(timer.clone()).with_options(RetryOptions {
        budget: RetryBudget::Attempts(3),
        schedule: BackoffSchedule::Linear {
            initial: Duration::from_millis(50),
            step: Duration::from_millis(50),
            max: Duration::from_millis(500),
        },
    });
    let submits = RefCell::new(0);
    let err = block_on(wrapper.update_with_retry(
        || async { Ok(Versioned::new((), "fp")) },
        Ok,
        |_| {
            *submits.borrow_mut() += 1;
            async { Err::<(), _>(reply_error(412, STALE)) }
        },
    ))
    .unwrap_err();

    assert_eq!(*submits.borrow(), 3);
    assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(
        timer.sleeps(),
        vec![Duration::from_millis(50), Duration::from_millis(100)]
    );
}

#[test]
fn malformed_fingerprint_fails_on_the_first_submit() {
    let timer = ManualTimer::new();
    let wrapper = FingerprintRetryWrapper::new(timer.clone());
    let submits = RefCell::new(0);
    let err = block_on(wrapper.update_with_retry(
        || async { Ok(Versioned::new((), "not-base64")) },
        Ok,
        |_| {
            *submits.borrow_mut() += 1;
            async { Err::<(), _>(reply_error(400, INVALID)) }
        },
    ))
    .unwrap_err();

    assert_eq!(*submits.borrow(), 1);
    assert_eq!(err.transport().and_then(TransportError::status), Some(400));
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert!(timer.sleeps().is_empty());
}

#[derive(Debug, Deserialize)]
struct Instance {
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    fingerprint: String,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

/// Fingerprint retry governs the submission, the poller the completion.
#[test]
fn submit_then_wait_for_the_operation() {
    let http = ScriptedClient::new();
    http.push(Reply::ok(INSTANCE))
        .push(Reply::status(412, STALE))
        .push(Reply::ok(INSTANCE))
        .push(Reply::ok(RUNNING))
        .push(Reply::ok(DONE));
    let config = ClientConfig::builder()
        .endpoint(Service::Compute, "http://compute.test/v1/")
        .billing_project("billing-project")
        .build()
        .unwrap();
    let api = ApiClient::new(http.clone(), config);
    let timer = ManualTimer::new();
    let instance = ["projects", "my-project", "zones", "us-central1-a", "instances", "vm-1"];

    let (api_ref, instance) = (&api, &instance);
    let snapshot = block_on(FingerprintRetryWrapper::new(timer.clone()).update_with_retry(
        || async move {
            let url = api_ref.service_url(Service::Compute, instance)?;
            let (current, _): (Instance, _) = api_ref.get_json(&url).await?;
            Ok::<_, Error>(Versioned::new(
                current.metadata.items,
                current.metadata.fingerprint,
            ))
        },
        |mut items: Vec<serde_json::Value>| {
            items.push(json!({"key": "enable-oslogin", "value": "TRUE"}));
            Ok(items)
        },
        |update: Versioned<Vec<serde_json::Value>>| async move {
            let mut segments = instance.to_vec();
            segments.push("setMetadata");
            let url = api_ref.service_url(Service::Compute, &segments)?;
            let body = json!({
                "fingerprint": update.fingerprint.as_str(),
                "items": update.value,
            });
            let (op, raw): (ComputeOperation, _) =
                api_ref.send_json(http::Method::POST, &url, &body).await?;
            Ok::<_, Error>(Snapshot::new(op, raw))
        },
    ))
    .unwrap();

    let handle = ComputeOperationHandle::derived(api.clone(), "my-project", snapshot).unwrap();
    let poller = OperationPoller::new(timer.clone(), PollOptions::default()).unwrap();
    let done = block_on(poller.wait(handle, "Setting Metadata")).unwrap();
    assert!(done.is_terminal());

    let requests = http.requests();
    assert_eq!(requests.len(), 5);
    let posts: Vec<_> = requests
        .iter()
        .filter(|r| r.method == http::Method::POST)
        .collect();
    assert_eq!(posts.len(), 2);
    for post in posts {
        let body = post.body_json().unwrap();
        assert_eq!(body["fingerprint"], "9WtGVXNEOh0=");
        assert_eq!(body["items"].as_array().unwrap().len(), 2);
        assert_eq!(post.headers["x-goog-user-project"], "billing-project");
    }
    assert_eq!(
        requests[4].uri,
        "http://compute.test/v1/projects/my-project/zones/us-central1-a/operations/operation-1710000000000-disk-create"
    );
}
