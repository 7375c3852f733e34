//! Post-update smoke test.
//!
//! Every deployed function is invoked with `{ "<sentinel>": 1 }` and must
//! answer `{ "test": "ok" }` with a success status. The runtime shim inside
//! the archive recognises the sentinel field and short-circuits the handler.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{Result, VerificationError};
use crate::remote::ControlPlane;

/// Payload field marking a smoke-test request.
pub const DEFAULT_SENTINEL: &str = "__healthcheck";

/// Canonical smoke-test answer.
#[must_use]
pub fn expected_ack() -> Value {
    json!({ "test": "ok" })
}

/// Invokes deployed functions with the sentinel payload.
#[derive(Clone)]
pub struct SmokeTest {
    control: Arc<dyn ControlPlane>,
    sentinel: String,
}

impl std::fmt::Debug for SmokeTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmokeTest")
            .field("sentinel", &self.sentinel)
            .finish_non_exhaustive()
    }
}

impl SmokeTest {
    /// Creates a smoke test using `sentinel` as the marker field.
    #[must_use]
    pub fn new(control: Arc<dyn ControlPlane>, sentinel: impl Into<String>) -> Self {
        Self {
            control,
            sentinel: sentinel.into(),
        }
    }

    /// Request payload.
    #[must_use]
    pub fn payload(&self) -> Value {
        let mut payload = serde_json::Map::new();
        payload.insert(self.sentinel.clone(), json!(1));
        Value::Object(payload)
    }

    /// Pings one deployed function.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::InvokeFailed`] if the function raised and
    /// [`VerificationError::SmokeTestFailed`] if the answer is not the
    /// canonical acknowledgement.
    pub async fn ping(&self, deployed_name: &str) -> Result<()> {
        debug!("Pinging {deployed_name}");
        let result = self.control.invoke(deployed_name, &self.payload()).await?;

        if let Some(error) = result.function_error {
            warn!("{deployed_name} raised during smoke test: {error}");
            return Err(VerificationError::InvokeFailed {
                function: deployed_name.to_string(),
                message: error,
            }
            .into());
        }

        if !result.is_success() || result.payload != expected_ack() {
            warn!(
                "{deployed_name} answered {} {}",
                result.status_code, result.payload
            );
            return Err(VerificationError::SmokeTestFailed {
                function: deployed_name.to_string(),
                status: result.status_code,
                payload: result.payload.to_string(),
            }
            .into());
        }

        info!("{deployed_name} is healthy");
        Ok(())
    }

    /// Pings every function in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first verification or remote error.
    pub async fn ping_all(&self, deployed_names: &[String]) -> Result<()> {
        for name in deployed_names {
            self.ping(name).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{InvokeResult, MockControlPlane};
    use mockall::predicate::{always, eq};

    fn answering(result: InvokeResult) -> SmokeTest {
        let mut mock = MockControlPlane::new();
        mock.expect_invoke()
            .with(eq("shop-users"), always())
            .returning(move |_, payload| {
                assert_eq!(payload, &json!({"__healthcheck": 1}));
                Ok(result.clone())
            });
        SmokeTest::new(Arc::new(mock), DEFAULT_SENTINEL)
    }

    #[tokio::test]
    async fn test_canonical_ack_passes() {
        let smoke = answering(InvokeResult {
            status_code: 200,
            payload: expected_ack(),
            function_error: None,
        });
        assert!(smoke.ping("shop-users").await.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_payload_is_a_verification_error() {
        let smoke = answering(InvokeResult {
            status_code: 200,
            payload: json!({"test": "nope"}),
            function_error: None,
        });
        let err = smoke.ping("shop-users").await.expect_err("must fail");
        assert!(err.is_verification());
    }

    #[tokio::test]
    async fn test_error_status_fails() {
        let smoke = answering(InvokeResult {
            status_code: 500,
            payload: expected_ack(),
            function_error: None,
        });
        assert!(smoke.ping("shop-users").await.is_err());
    }

    #[tokio::test]
    async fn test_function_error_fails() {
        let smoke = answering(InvokeResult {
            status_code: 200,
            payload: Value::Null,
            function_error: Some(String::from("Unhandled")),
        });
        let err = smoke
            .ping_all(&[String::from("shop-users")])
            .await
            .expect_err("must fail");
        assert!(err.is_verification());
    }
}
