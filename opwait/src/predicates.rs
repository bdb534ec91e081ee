//! Retry predicates for transient conditions the API reports with an
//! ordinary client-error status.
//!
//! [`defaults`] applies to every request. The rest are known to be transient
//! only for particular endpoints and are opted into per call site.

use std::{
    borrow::Cow,
    fmt,
    sync::{Arc, LazyLock},
};

use regex::Regex;

use crate::error::TransportError;

type CheckFn = dyn Fn(&TransportError) -> Option<Cow<'static, str>> + Send + Sync;

/// Decides whether a transport error is transient, returning a human readable
/// reason when it is.
#[derive(Clone)]
pub struct RetryPredicate {
    name: &'static str,
    check: Arc<CheckFn>,
}

impl fmt::Debug for RetryPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RetryPredicate").field(&self.name).finish()
    }
}

impl RetryPredicate {
    pub fn new<F>(name: &'static str, check: F) -> Self
    where
        F: Fn(&TransportError) -> Option<Cow<'static, str>> + Send + Sync + 'static,
    {
        Self {
            name,
            check: Arc::new(check),
        }
    }

    /// Predicate on the reply status and body with a fixed reason.
    pub fn on_reply<F>(name: &'static str, reason: &'static str, check: F) -> Self
    where
        F: Fn(u16, &str) -> bool + Send + Sync + 'static,
    {
        Self::new(name, move |err| match reply(err) {
            Some((status, body)) if check(status, body) => Some(Cow::Borrowed(reason)),
            _ => None,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn check(&self, err: &TransportError) -> Option<Cow<'static, str>> {
        (self.check)(err)
    }
}

fn reply(err: &TransportError) -> Option<(u16, &str)> {
    match err {
        TransportError::Status { status, body, .. } => Some((status.as_u16(), body.as_str())),
        _ => None,
    }
}

/// Predicates applied to every request.
pub fn defaults() -> Vec<RetryPredicate> {
    vec![
        operation_in_progress(),
        subnetwork_unready(),
        quota_exceeded_per_minute(),
    ]
}

/// Some APIs (Cloud SQL in particular) answer 409 while another operation on
/// the same resource is still running.
pub fn operation_in_progress() -> RetryPredicate {
    RetryPredicate::on_reply(
        "operation_in_progress",
        "Operation still in progress",
        |status, body| status == 409 && body.contains("operationInProgress"),
    )
}

/// Subnetworks are briefly unready after certain operations.
pub fn subnetwork_unready() -> RetryPredicate {
    RetryPredicate::on_reply(
        "subnetwork_unready",
        "Subnetwork not ready",
        |status, body| {
            status == 400 && body.contains("resourceNotReady") && body.contains("subnetworks")
        },
    )
}

static QUOTA_PER_MINUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Quota exceeded for quota metric '(?P<metric>.*)' and limit '(?P<limit>.* per minute)' of service",
    )
    .expect("quota regex is valid")
});

/// Rate limits reported as 403 rather than 429.
pub fn quota_exceeded_per_minute() -> RetryPredicate {
    RetryPredicate::new("quota_exceeded_per_minute", |err| {
        let (status, body) = reply(err)?;
        if status != 403 {
            return None;
        }
        let caps = QUOTA_PER_MINUTE.captures(body)?;
        Some(Cow::Owned(format!(
            "Waiting for quota limit {} to refresh",
            &caps["limit"]
        )))
    })
}

/// Retry 404s for an endpoint known to be eventually consistent.
/// `op_type` describes what is being fetched, for the log line.
pub fn not_found(op_type: impl Into<String>) -> RetryPredicate {
    let op_type = op_type.into();
    RetryPredicate::new("not_found", move |err| match reply(err) {
        Some((404, _)) => Some(Cow::Owned(format!("Retry 404s for {op_type}"))),
        _ => None,
    })
}

/// A permission granted in the same change may not have propagated yet.
pub fn iam_member_missing() -> RetryPredicate {
    RetryPredicate::on_reply(
        "iam_member_missing",
        "Waiting for IAM member permissions to propagate.",
        |status, body| status == 400 && body.contains("permission"),
    )
}

/// Any 409 from Cloud SQL except "instance already exists".
pub fn sql_operation_in_progress() -> RetryPredicate {
    RetryPredicate::on_reply(
        "sql_operation_in_progress",
        "Waiting for other concurrent Cloud SQL operations to finish",
        |status, body| status == 409 && !body.contains("instanceAlreadyExists"),
    )
}

pub fn service_activation_in_progress() -> RetryPredicate {
    RetryPredicate::on_reply(
        "service_activation_in_progress",
        "Waiting for same service activation/deactivation to finish",
        |status, body| {
            status == 400 && body.contains("Another activation or deactivation is in progress")
        },
    )
}

pub fn bigquery_iam_quota() -> RetryPredicate {
    RetryPredicate::on_reply(
        "bigquery_iam_quota",
        "Waiting for Bigquery edit quota to refresh",
        |status, body| status == 403 && body.to_lowercase().contains("exceeded rate limits"),
    )
}

pub fn monitoring_concurrent_edit() -> RetryPredicate {
    RetryPredicate::on_reply(
        "monitoring_concurrent_edit",
        "Waiting for other Monitoring changes to finish",
        |status, body| {
            let body = body.to_lowercase();
            status == 409
                && (body.contains("too many concurrent edits")
                    || body.contains("could not fulfill the request"))
        },
    )
}

pub fn datastore_index_contention() -> RetryPredicate {
    RetryPredicate::on_reply(
        "datastore_index_contention",
        "too much contention - waiting for less activity",
        |status, body| status == 409 && body.contains("too much contention"),
    )
}

pub fn apigee_resource_locked() -> RetryPredicate {
    RetryPredicate::on_reply(
        "apigee_resource_locked",
        "Waiting for other concurrent operations to finish",
        |status, body| {
            status == 400
                && body
                    .to_lowercase()
                    .contains("the resource is locked by another operation")
        },
    )
}

pub fn peering_operation_in_progress() -> RetryPredicate {
    RetryPredicate::on_reply(
        "peering_operation_in_progress",
        "Waiting peering operation to complete",
        |status, body| status == 400 && body.contains("There is a peering operation in progress"),
    )
}

/// A topic's parent project was just created and its org policy has not
/// propagated.
pub fn pubsub_project_not_ready() -> RetryPredicate {
    RetryPredicate::on_reply(
        "pubsub_project_not_ready",
        "Waiting for Pubsub topic's project to properly initialize with organization policy",
        |status, body| status == 400 && body.contains("retry this operation"),
    )
}
