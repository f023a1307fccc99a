use rabbitmq_cli_consumer::command::{Command, CommandFactory, Executor, Outcome, ProcessExecutor};

fn shell(script: &str) -> Command {
    Command {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string(), "payload".to_string()],
    }
}

#[tokio::test]
async fn test_payload_is_last_argument() {
    let command = CommandFactory::new("printf %s").unwrap().create("dGhlX2JvZHk=");

    let invocation = ProcessExecutor.execute(&command).await;

    assert_eq!(invocation.outcome, Outcome::Exited(0));
    assert_eq!(invocation.output, b"dGhlX2JvZHk=");
}

#[tokio::test]
async fn test_exit_code_and_stdout_are_captured() {
    let invocation = ProcessExecutor
        .execute(&shell("printf reply; echo oops >&2; exit 3"))
        .await;

    assert_eq!(invocation.outcome, Outcome::Exited(3));
    assert_eq!(invocation.output, b"reply");
}

#[tokio::test]
async fn test_stdin_is_closed() {
    let invocation = ProcessExecutor.execute(&shell("cat; printf done")).await;

    assert_eq!(invocation.outcome, Outcome::Exited(0));
    assert_eq!(invocation.output, b"done");
}

#[tokio::test]
async fn test_killed_process_has_no_exit_code() {
    let invocation = ProcessExecutor.execute(&shell("kill -9 $$")).await;

    assert_eq!(invocation.outcome, Outcome::Terminated);
}

#[tokio::test]
async fn test_cancelled_invocation_kills_the_child() {
    let marker = std::env::temp_dir().join(format!("consumer-marker-{}", uuid::Uuid::new_v4()));
    let command = Command {
        program: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            "sleep 1; touch \"$0\"".to_string(),
            marker.display().to_string(),
        ],
    };

    let result = tokio::time::timeout(
        std::time::Duration::from_millis(200),
        ProcessExecutor.execute(&command),
    )
    .await;
    assert!(result.is_err());

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    assert!(!marker.exists());
}
