use std::path::PathBuf;

use gitlayer_docker::client::{BuildError, DockerClient, InspectError};
use gitlayer_docker::docker::DockerError;
use gitlayer_docker::executor::DockerExecutor;
use mockall::mock;

mock! {
    Executor {}

    impl DockerExecutor for Executor {
        async fn exec(&self, args: &[String]) -> Result<String, DockerError>;
        async fn exec_streaming(&self, args: &[String]) -> Result<(), DockerError>;
    }
}

fn not_found() -> DockerError {
    DockerError::NotFound {
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
    }
}

// ── Doctor Tests ──

#[tokio::test]
async fn doctor_all_docker_checks_pass() {
    let mut mock = MockExecutor::new();

    mock.expect_exec()
        .withf(|args| args.first().is_some_and(|a| a == "version"))
        .returning(|_| Ok("27.1.1\n".to_owned()));
    mock.expect_exec()
        .withf(|args| args.first().is_some_and(|a| a == "info"))
        .returning(|_| Ok("27.1.1\n".to_owned()));

    let client = DockerClient::with_executor(mock);
    let report = client.doctor().await;

    assert!(report.docker.passed);
    assert_eq!(report.docker.detail, "27.1.1");
    assert!(report.daemon.passed);
    assert_eq!(report.daemon.detail, "server 27.1.1");
    // filled in by the caller
    assert!(!report.all_passed());
}

#[tokio::test]
async fn doctor_missing_cli_skips_daemon() {
    let mut mock = MockExecutor::new();

    mock.expect_exec()
        .withf(|args| args.first().is_some_and(|a| a == "version"))
        .returning(|_| Err(not_found()));
    mock.expect_exec()
        .withf(|args| args.first().is_some_and(|a| a == "info"))
        .never();

    let client = DockerClient::with_executor(mock);
    let report = client.doctor().await;

    assert!(!report.docker.passed);
    assert!(report.docker.detail.contains("docker CLI not found"));
    assert!(!report.daemon.passed);
}

#[tokio::test]
async fn doctor_reports_unreachable_daemon() {
    let mut mock = MockExecutor::new();

    mock.expect_exec()
        .withf(|args| args.first().is_some_and(|a| a == "version"))
        .returning(|args| {
            Err(DockerError::CommandFailed {
                args: args.to_vec(),
                stderr: "Cannot connect to the Docker daemon".to_owned(),
            })
        });
    mock.expect_exec()
        .withf(|args| args.first().is_some_and(|a| a == "info"))
        .returning(|args| {
            Err(DockerError::CommandFailed {
                args: args.to_vec(),
                stderr: "Cannot connect to the Docker daemon".to_owned(),
            })
        });

    let client = DockerClient::with_executor(mock);
    let report = client.doctor().await;

    assert!(report.docker.passed);
    assert!(!report.daemon.passed);
    assert!(report.daemon.detail.contains("docker command failed"));
}

#[tokio::test]
async fn doctor_report_renders_every_check() {
    let mut mock = MockExecutor::new();
    mock.expect_exec().returning(|_| Ok("27.1.1\n".to_owned()));

    let client = DockerClient::with_executor(mock);
    let report = client.doctor().await;
    let text = report.to_string();

    assert!(text.contains("docker CLI"));
    assert!(text.contains("docker daemon"));
    assert!(text.contains("gitlayer.toml"));
    assert!(text.contains("NG"));
}

// ── Build Tests ──

#[tokio::test]
async fn build_image_streams_docker_build() {
    let mut mock = MockExecutor::new();

    mock.expect_exec_streaming()
        .withf(|args| {
            args.iter()
                .map(String::as_str)
                .eq(["build", "--tag", "gitlayer:latest", "/tmp/ctx"])
        })
        .times(1)
        .returning(|_| Ok(()));

    let client = DockerClient::with_executor(mock);
    client
        .build_image(&PathBuf::from("/tmp/ctx"), "gitlayer:latest")
        .await
        .unwrap();
}

#[tokio::test]
async fn build_image_failure_is_wrapped() {
    let mut mock = MockExecutor::new();

    mock.expect_exec_streaming().returning(|args| {
        Err(DockerError::CommandFailed {
            args: args.to_vec(),
            stderr: "exit code: 1".to_owned(),
        })
    });

    let client = DockerClient::with_executor(mock);
    let err = client
        .build_image(&PathBuf::from("/tmp/ctx"), "gitlayer:latest")
        .await
        .unwrap_err();
    assert!(matches!(err, BuildError::Build { .. }));
}

// ── Inspect Tests ──

#[tokio::test]
async fn image_id_is_trimmed() {
    let mut mock = MockExecutor::new();

    mock.expect_exec()
        .withf(|args| args.contains(&"inspect".to_owned()) && args.contains(&"app:dev".to_owned()))
        .returning(|_| Ok("sha256:abc123\n".to_owned()));

    let client = DockerClient::with_executor(mock);
    assert_eq!(client.image_id("app:dev").await.unwrap(), "sha256:abc123");
}

#[tokio::test]
async fn image_id_missing_image() {
    let mut mock = MockExecutor::new();

    mock.expect_exec().returning(|args| {
        Err(DockerError::CommandFailed {
            args: args.to_vec(),
            stderr: "No such image".to_owned(),
        })
    });

    let client = DockerClient::with_executor(mock);
    let err = client.image_id("missing:tag").await.unwrap_err();
    assert!(matches!(err, InspectError::Inspect { ref tag, .. } if tag == "missing:tag"));
}
