//! Command handler for relay requests
//!
//! Translates each relay command into one debug-session operation and wraps
//! the outcome in exactly one response carrying the request's id.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;

use crate::common::{Error, Result};
use crate::relay::protocol::{Command, Request, Response, ResponseBody};

use super::capability::{DebugSession, SessionSlot};

/// Stack depth requested for `getStackTrace`
pub const STACK_TRACE_LEVELS: i64 = 100;

/// Handle a relay request
///
/// Always yields exactly one response for `request.id`, including when the
/// session panics mid-operation.
pub async fn handle_request<S: DebugSession>(slot: &SessionSlot<S>, request: Request) -> Response {
    let Request { id, command } = request;

    let outcome = AssertUnwindSafe(handle_command_inner(slot, &command))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(body)) => Response::success(id, body),
        Ok(Err(e)) => {
            tracing::debug!(id = %id, command = command.name(), error = %e, "Command failed");
            Response::error(id, &command, e.response_text())
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(id = %id, command = command.name(), panic = %message, "Debug session panicked");
            Response::error(id, &command, format!("internal error: {}", message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("debug session panicked")
}

async fn handle_command_inner<S: DebugSession>(
    slot: &SessionSlot<S>,
    command: &Command,
) -> Result<ResponseBody> {
    let session = slot.current().ok_or(Error::SessionNotActive)?;

    match command {
        Command::ExecuteLldbCommand { lldb_command } => {
            let result = session.evaluate_command(lldb_command).await?;
            Ok(ResponseBody::ExecuteLldbCommand {
                result: Some(result),
            })
        }

        Command::GetStackTrace { thread_id } => {
            let frames = session.stack_trace(*thread_id, STACK_TRACE_LEVELS).await?;
            Ok(ResponseBody::GetStackTrace {
                stack_frames: Some(frames),
            })
        }

        Command::GetVariables {
            variables_reference,
        } => {
            if *variables_reference == 0 {
                return Err(Error::InvalidVariablesReference);
            }
            let variables = session.variables(*variables_reference).await?;
            Ok(ResponseBody::GetVariables {
                variables: Some(variables),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::relay::protocol::{StackFrameInfo, VariableInfo};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Session that answers from fixed data and counts every call
    #[derive(Default)]
    struct CountingSession {
        calls: AtomicUsize,
        last_levels: std::sync::Mutex<Option<i64>>,
    }

    #[async_trait]
    impl DebugSession for CountingSession {
        async fn evaluate_command(&self, command: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match command {
                "bogus" => Err(Error::dap_request_failed(
                    "evaluate",
                    "'bogus' is not a valid command.",
                )),
                other => Ok(format!("ran {}", other)),
            }
        }

        async fn stack_trace(&self, thread_id: i64, levels: i64) -> Result<Vec<StackFrameInfo>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_levels.lock().unwrap() = Some(levels);
            Ok(vec![StackFrameInfo {
                id: thread_id * 1000,
                name: "main".to_string(),
                source: Some("main.c".to_string()),
                line: 3,
                column: 1,
            }])
        }

        async fn variables(&self, reference: i64) -> Result<Vec<VariableInfo>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                VariableInfo {
                    name: "b".to_string(),
                    value: "2".to_string(),
                    type_name: Some("int".to_string()),
                    variables_reference: 0,
                },
                VariableInfo {
                    name: "a".to_string(),
                    value: format!("ref {}", reference),
                    type_name: None,
                    variables_reference: reference + 1,
                },
            ])
        }
    }

    fn request(id: &str, command: Command) -> Request {
        Request {
            id: id.to_string(),
            command,
        }
    }

    fn all_commands() -> Vec<Command> {
        vec![
            Command::ExecuteLldbCommand {
                lldb_command: "bt".to_string(),
            },
            Command::GetStackTrace { thread_id: 1 },
            Command::GetVariables {
                variables_reference: 4,
            },
        ]
    }

    #[tokio::test]
    async fn test_no_session_fails_every_command() {
        let slot = SessionSlot::<CountingSession>::empty();

        for (i, command) in all_commands().into_iter().enumerate() {
            let id = format!("r{}", i);
            let name = command.name();
            let response = handle_request(&slot, request(&id, command)).await;
            assert_eq!(response.id, id);
            assert!(!response.success);
            assert_eq!(response.error.as_deref(), Some("No active debug session"));
            assert_eq!(response.command_name(), name);
        }
    }

    #[tokio::test]
    async fn test_zero_reference_never_reaches_session() {
        let session = Arc::new(CountingSession::default());
        let slot = SessionSlot::with_session(Arc::clone(&session));

        let response = handle_request(
            &slot,
            request(
                "v0",
                Command::GetVariables {
                    variables_reference: 0,
                },
            ),
        )
        .await;

        assert!(!response.success);
        assert!(response
            .error
            .as_deref()
            .unwrap()
            .contains("non-zero variablesReference"));
        assert_eq!(session.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stack_trace_depth_and_frames() {
        let session = Arc::new(CountingSession::default());
        let slot = SessionSlot::with_session(Arc::clone(&session));

        let response =
            handle_request(&slot, request("s", Command::GetStackTrace { thread_id: 2 })).await;

        assert!(response.success);
        match response.body {
            ResponseBody::GetStackTrace {
                stack_frames: Some(frames),
            } => assert_eq!(frames[0].id, 2000),
            other => panic!("Unexpected body {:?}", other),
        }
        assert_eq!(*session.last_levels.lock().unwrap(), Some(STACK_TRACE_LEVELS));
    }

    #[tokio::test]
    async fn test_variables_keep_session_order() {
        let slot = SessionSlot::with_session(Arc::new(CountingSession::default()));

        let response = handle_request(
            &slot,
            request(
                "v",
                Command::GetVariables {
                    variables_reference: 9,
                },
            ),
        )
        .await;

        match response.body {
            ResponseBody::GetVariables {
                variables: Some(vars),
            } => {
                let names: Vec<_> = vars.iter().map(|v| v.name.as_str()).collect();
                assert_eq!(names, ["b", "a"]);
                assert_eq!(vars[1].variables_reference, 10);
            }
            other => panic!("Unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_command_error_text_is_verbatim() {
        let slot = SessionSlot::with_session(Arc::new(CountingSession::default()));

        let response = handle_request(
            &slot,
            request(
                "e",
                Command::ExecuteLldbCommand {
                    lldb_command: "bogus".to_string(),
                },
            ),
        )
        .await;

        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("'bogus' is not a valid command.")
        );

        let ok = handle_request(
            &slot,
            request(
                "e2",
                Command::ExecuteLldbCommand {
                    lldb_command: "register read".to_string(),
                },
            ),
        )
        .await;
        assert_eq!(
            ok.body,
            ResponseBody::ExecuteLldbCommand {
                result: Some("ran register read".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_cleared_slot_fails_again() {
        let slot = SessionSlot::with_session(Arc::new(CountingSession::default()));
        assert!(slot.clear().is_some());

        let response =
            handle_request(&slot, request("c", Command::GetStackTrace { thread_id: 1 })).await;
        assert_eq!(response.error.as_deref(), Some("No active debug session"));
    }

    struct PanickingSession;

    #[async_trait]
    impl DebugSession for PanickingSession {
        async fn evaluate_command(&self, command: &str) -> Result<String> {
            panic!("lost the thread list while running {}", command);
        }

        async fn stack_trace(&self, _thread_id: i64, _levels: i64) -> Result<Vec<StackFrameInfo>> {
            panic!("frame walk failed");
        }

        async fn variables(&self, _reference: i64) -> Result<Vec<VariableInfo>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_session_panic_becomes_failed_response() {
        let slot = SessionSlot::with_session(Arc::new(PanickingSession));

        let response = handle_request(
            &slot,
            request(
                "p1",
                Command::ExecuteLldbCommand {
                    lldb_command: "thread list".to_string(),
                },
            ),
        )
        .await;
        assert_eq!(response.id, "p1");
        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("internal error: lost the thread list while running thread list")
        );
        assert_eq!(response.command_name(), "executeLldbCommand");

        let response =
            handle_request(&slot, request("p2", Command::GetStackTrace { thread_id: 1 })).await;
        assert_eq!(response.error.as_deref(), Some("internal error: frame walk failed"));

        // The slot still serves later requests
        let response = handle_request(
            &slot,
            request(
                "p3",
                Command::GetVariables {
                    variables_reference: 2,
                },
            ),
        )
        .await;
        assert!(response.success);
    }
}
