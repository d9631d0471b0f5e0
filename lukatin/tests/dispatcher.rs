//! `Bash` tool tests through `CommandDispatcher`.
//!
//! Verifies the JSON result contract, transparent restart of a dead shell,
//! and serialization of concurrent invocations onto one session.

#![cfg(unix)]

use std::sync::Arc;

use lukatin::core::types::BashResponse;
use lukatin::io::dispatcher::{CommandDispatcher, CommandInvocation};
use lukatin::test_support::fast_shell_config;
use lukatin::ui::{UiEvent, UiHandle};

#[tokio::test]
async fn successful_command_returns_output_and_zero() {
    let dispatcher = CommandDispatcher::new(fast_shell_config(), None);
    let response = dispatcher.dispatch(&CommandInvocation::new("echo hi")).await;
    assert_eq!(response, BashResponse::success("hi".to_string()));
    assert_eq!(
        response.to_json(),
        r#"{"output":"hi","error":"","exit_code":0}"#
    );
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn timeout_is_an_execution_error() {
    let dispatcher = CommandDispatcher::new(fast_shell_config(), None);
    let invocation = CommandInvocation::new("sleep 2").with_timeout_ms(100);
    let response = dispatcher.dispatch(&invocation).await;
    assert_eq!(response.exit_code, BashResponse::EXIT_FAILED);
    assert!(response.error.contains("command execution timeout"));
    assert!(response.output.is_empty());
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn dead_shell_is_restarted_on_next_call() {
    let dispatcher = CommandDispatcher::new(fast_shell_config(), None);
    let died = dispatcher.dispatch(&CommandInvocation::new("exit 0")).await;
    assert_eq!(died.exit_code, BashResponse::EXIT_FAILED);

    let response = dispatcher.dispatch(&CommandInvocation::new("echo back")).await;
    assert_eq!(response.output, "back");
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn shutdown_then_dispatch_starts_fresh_session() {
    let dispatcher = CommandDispatcher::new(fast_shell_config(), None);
    dispatcher
        .dispatch(&CommandInvocation::new("export LUKATIN_MARK=old"))
        .await;
    let first = dispatcher.session().await.expect("session");
    dispatcher.shutdown().await;
    assert!(!first.is_running());

    let response = dispatcher
        .dispatch(&CommandInvocation::new("echo \"[$LUKATIN_MARK]\""))
        .await;
    assert_eq!(response.output, "[]");
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn concurrent_calls_each_get_their_own_output() {
    let dispatcher = Arc::new(CommandDispatcher::new(fast_shell_config(), None));
    let mut handles = Vec::new();
    for i in 0..8 {
        let dispatcher = Arc::clone(&dispatcher);
        handles.push(tokio::spawn(async move {
            let command = format!("echo start-{i}; sleep 0.05; echo end-{i}");
            (i, dispatcher.dispatch(&CommandInvocation::new(command)).await)
        }));
    }
    for handle in handles {
        let (i, response) = handle.await.expect("join");
        assert_eq!(response.output, format!("start-{i}\nend-{i}"));
    }
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn description_is_sent_before_execution() {
    let (ui, mut events) = UiHandle::channel();
    let dispatcher = CommandDispatcher::new(fast_shell_config(), Some(ui));
    let invocation = CommandInvocation::new("echo hi").with_description("Say hi");
    let response = dispatcher.dispatch(&invocation).await;
    assert!(response.is_success());
    match events.try_recv().expect("description") {
        UiEvent::ToolDescription(text) => assert_eq!(text, "Say hi"),
        other => panic!("unexpected event {other:?}"),
    }
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn timed_out_command_does_not_wedge_later_calls() {
    let dispatcher = CommandDispatcher::new(fast_shell_config(), None);
    let hung = dispatcher
        .dispatch(&CommandInvocation::new("sleep 30").with_timeout_ms(200))
        .await;
    assert_eq!(hung.exit_code, BashResponse::EXIT_FAILED);

    let response = dispatcher.dispatch(&CommandInvocation::new("echo next")).await;
    assert_eq!(response, BashResponse::success("next".to_string()));
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn unterminated_quote_does_not_wedge_later_calls() {
    let dispatcher = CommandDispatcher::new(fast_shell_config(), None);
    let broken = dispatcher
        .dispatch(&CommandInvocation::new("echo 'oops").with_timeout_ms(500))
        .await;
    assert_eq!(broken.exit_code, BashResponse::EXIT_FAILED);

    let response = dispatcher.dispatch(&CommandInvocation::new("echo next")).await;
    assert_eq!(response, BashResponse::success("next".to_string()));
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn shell_killed_between_calls_is_replaced_transparently() {
    let dispatcher = CommandDispatcher::new(fast_shell_config(), None);
    dispatcher.dispatch(&CommandInvocation::new("echo hi")).await;
    let first = dispatcher.session().await.expect("session");
    let pid = first.pid().await.expect("pid");
    let killed = std::process::Command::new("kill")
        .args(["-9", &pid.to_string()])
        .status()
        .expect("kill");
    assert!(killed.success());
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let response = dispatcher.dispatch(&CommandInvocation::new("echo back")).await;
    assert_eq!(response, BashResponse::success("back".to_string()));
    assert!(!first.is_running());
    dispatcher.shutdown().await;
}
