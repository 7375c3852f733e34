//! In-memory control plane for pipeline tests.
//!
//! Every operation settles instantly. Calls are recorded by name so tests
//! can assert on ordering.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{HalldyllError, RemoteError, Result};

use super::api::ControlPlane;
use super::types::{
    FunctionSummary, InvokeResult, LogPage, LogQuery, LogStream, StackDescription, StackStatus,
};

/// Physical id reported for every resource.
pub const FAKE_PHYSICAL_ID: &str = "abc123";

#[derive(Debug)]
struct FakeStack {
    status: StackStatus,
    template: String,
}

#[derive(Debug)]
struct FakeState {
    stacks: HashMap<String, FakeStack>,
    calls: Vec<String>,
    applied: Vec<String>,
    invoke_response: InvokeResult,
    force_no_changes: bool,
}

/// Control plane double backed by a hash map.
#[derive(Debug)]
pub struct FakeControlPlane {
    state: Mutex<FakeState>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                stacks: HashMap::new(),
                calls: Vec::new(),
                applied: Vec::new(),
                invoke_response: InvokeResult {
                    status_code: 200,
                    payload: json!({"test": "ok"}),
                    function_error: None,
                },
                force_no_changes: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake control plane lock")
    }

    /// Names of the calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Template bodies passed to `update_stack`, including refused ones.
    pub fn applied_templates(&self) -> Vec<String> {
        self.lock().applied.clone()
    }

    /// Template currently applied to a stack.
    pub fn current_template(&self, stack: &str) -> Option<String> {
        self.lock().stacks.get(stack).map(|s| s.template.clone())
    }

    /// Replaces the answer to every invoke.
    pub fn set_invoke_response(&self, response: InvokeResult) {
        self.lock().invoke_response = response;
    }

    /// Makes every update report that there is nothing to change.
    pub fn force_no_changes(&self) {
        self.lock().force_no_changes = true;
    }

    fn record(&self, call: &str) {
        self.lock().calls.push(call.to_string());
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn describe_stack(&self, stack: &str) -> Result<Option<StackDescription>> {
        self.record("describe_stack");
        Ok(self
            .lock()
            .stacks
            .get(stack)
            .map(|s| StackDescription::new(stack, s.status)))
    }

    async fn create_stack(&self, stack: &str, template: &str) -> Result<()> {
        self.record("create_stack");
        self.lock().stacks.insert(
            stack.to_string(),
            FakeStack {
                status: StackStatus::CreateComplete,
                template: template.to_string(),
            },
        );
        Ok(())
    }

    async fn update_stack(&self, stack: &str, template: &str) -> Result<()> {
        self.record("update_stack");
        let mut state = self.lock();
        state.applied.push(template.to_string());
        let force_no_changes = state.force_no_changes;

        let entry = state.stacks.get_mut(stack).ok_or_else(|| {
            HalldyllError::Remote(RemoteError::StackNotFound {
                stack: stack.to_string(),
            })
        })?;

        if force_no_changes || entry.template == template {
            return Err(HalldyllError::Remote(RemoteError::NoChanges {
                stack: stack.to_string(),
            }));
        }

        entry.template = template.to_string();
        entry.status = StackStatus::UpdateComplete;
        Ok(())
    }

    async fn cancel_update(&self, stack: &str) -> Result<()> {
        self.record("cancel_update");
        Err(HalldyllError::Remote(RemoteError::CannotCancel {
            stack: stack.to_string(),
            status: String::from("UPDATE_COMPLETE"),
        }))
    }

    async fn delete_stack(&self, stack: &str) -> Result<()> {
        self.record("delete_stack");
        self.lock().stacks.remove(stack);
        Ok(())
    }

    async fn describe_resource(&self, _stack: &str, _logical_id: &str) -> Result<String> {
        self.record("describe_resource");
        Ok(String::from(FAKE_PHYSICAL_ID))
    }

    async fn list_functions(&self) -> Result<Vec<FunctionSummary>> {
        self.record("list_functions");
        Ok(Vec::new())
    }

    async fn invoke(&self, function: &str, _payload: &serde_json::Value) -> Result<InvokeResult> {
        self.record(&format!("invoke:{function}"));
        Ok(self.lock().invoke_response.clone())
    }

    async fn list_log_streams(&self, _log_group: &str) -> Result<Vec<LogStream>> {
        self.record("list_log_streams");
        Ok(Vec::new())
    }

    async fn filter_log_events(&self, _query: &LogQuery) -> Result<LogPage> {
        self.record("filter_log_events");
        Ok(LogPage::default())
    }
}
