//! Integration tests for CLI commands
//!
//! Everything here fails or finishes before a cluster would be contacted.

use std::path::Path;
use std::process::{Command, Output};

use berth_kube::testing::write_chart;
use tempfile::TempDir;

/// Helper to run the berth binary with a private credential store
fn berth(store: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_berth"))
        .args(args)
        .env("BERTH_CREDENTIALS_FILE", store)
        .env_remove("BERTH_NAMESPACE")
        .env_remove("BERTH_KUBECONFIG_ID")
        .env_remove("BERTH_SERVICE_NAMESPACE")
        .env_remove("BERTH_WORKSPACE")
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute berth")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

mod usage {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        let dir = TempDir::new().unwrap();
        let output = berth(&dir.path().join("credentials.yaml"), &["--help"]);

        assert!(output.status.success());
        let out = stdout(&output);
        assert!(out.contains("deploy"));
        assert!(out.contains("status"));
        assert!(out.contains("credentials"));
    }

    #[test]
    fn test_unknown_command_is_usage_error() {
        let dir = TempDir::new().unwrap();
        let output = berth(&dir.path().join("credentials.yaml"), &["frobnicate"]);

        assert_eq!(output.status.code(), Some(64));
    }
}

mod deploy_command {
    use super::*;

    #[test]
    fn test_missing_namespace() {
        let dir = TempDir::new().unwrap();
        let output = berth(
            &dir.path().join("credentials.yaml"),
            &["deploy", "demo", "--chart", "app"],
        );

        assert_eq!(output.status.code(), Some(64));
        assert!(stderr(&output).contains("--namespace"));
    }

    #[test]
    fn test_invalid_release_name() {
        let dir = TempDir::new().unwrap();
        let output = berth(
            &dir.path().join("credentials.yaml"),
            &["deploy", "Not_A_Name", "--chart", "app", "--namespace", "prod"],
        );

        assert_eq!(output.status.code(), Some(64));
    }

    #[test]
    fn test_missing_chart() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path().to_str().unwrap();
        let output = berth(
            &dir.path().join("credentials.yaml"),
            &[
                "deploy",
                "demo",
                "--chart",
                "app",
                "--namespace",
                "prod",
                "--workspace",
                workspace,
            ],
        );

        assert_eq!(output.status.code(), Some(4));
        assert!(stderr(&output).contains("app"));
    }

    #[test]
    fn test_missing_chart_wins_over_unreadable_credentials() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("credentials.yaml");
        std::fs::write(&store, "credentials: [not: {valid").unwrap();
        let workspace = dir.path().to_str().unwrap();

        let output = berth(
            &store,
            &[
                "deploy",
                "demo",
                "--chart",
                "missing-chart",
                "--namespace",
                "prod",
                "--workspace",
                workspace,
                "--kubeconfig-id",
                "prod-cluster",
            ],
        );

        assert_eq!(output.status.code(), Some(4));
        let err = stderr(&output);
        assert!(err.contains("missing-chart"));
        assert!(!err.contains("cannot parse"));
    }

    #[test]
    fn test_unreadable_credentials_after_chart_loads() {
        let dir = TempDir::new().unwrap();
        write_chart(dir.path(), "app", "1.0.0").unwrap();
        let store = dir.path().join("credentials.yaml");
        std::fs::write(&store, "credentials: [not: {valid").unwrap();
        let workspace = dir.path().to_str().unwrap();

        let output = berth(
            &store,
            &[
                "deploy",
                "demo",
                "--chart",
                "app",
                "--namespace",
                "prod",
                "--workspace",
                workspace,
                "--kubeconfig-id",
                "prod-cluster",
            ],
        );

        assert_eq!(output.status.code(), Some(6));
        assert!(stderr(&output).contains("cannot parse"));
    }

    #[test]
    fn test_unknown_credential() {
        let dir = TempDir::new().unwrap();
        write_chart(dir.path(), "app", "1.0.0").unwrap();
        let workspace = dir.path().to_str().unwrap();
        let output = berth(
            &dir.path().join("credentials.yaml"),
            &[
                "deploy",
                "demo",
                "--chart",
                "app",
                "--namespace",
                "prod",
                "--workspace",
                workspace,
                "--kubeconfig-id",
                "prod-cluster",
            ],
        );

        assert_eq!(output.status.code(), Some(6));
        assert!(stderr(&output).contains("prod-cluster"));
    }

    #[test]
    fn test_deployment_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("deploy.yaml");
        std::fs::write(
            &file,
            "chartLocation: missing-chart\ntargetNamespace: prod\nreleaseName: demo\n",
        )
        .unwrap();
        let workspace = dir.path().to_str().unwrap();

        let output = berth(
            &dir.path().join("credentials.yaml"),
            &[
                "deploy",
                "--file",
                file.to_str().unwrap(),
                "--workspace",
                workspace,
            ],
        );

        assert_eq!(output.status.code(), Some(4));
        assert!(stderr(&output).contains("missing-chart"));
    }
}

mod credentials_command {
    use super::*;

    #[test]
    fn test_add_list_remove() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("credentials.yaml");
        let kubeconfig = dir.path().join("config");
        std::fs::write(&kubeconfig, "apiVersion: v1\nkind: Config\n# secret-token\n").unwrap();

        let output = berth(
            &store,
            &[
                "credentials",
                "add",
                "prod-cluster",
                "--kubeconfig",
                kubeconfig.to_str().unwrap(),
                "--embed",
                "--owner",
                "team-a",
                "--description",
                "production",
            ],
        );
        assert!(output.status.success(), "add failed: {}", stderr(&output));
        assert!(store.exists());

        let output = berth(&store, &["credentials", "list"]);
        assert!(output.status.success());
        let out = stdout(&output);
        assert!(out.contains("prod-cluster"));
        assert!(out.contains("team-a"));
        assert!(out.contains("inline"));
        assert!(!out.contains("secret-token"));

        let output = berth(&store, &["credentials", "list", "--owner", "team-b"]);
        assert!(stdout(&output).contains("No credentials stored"));

        let output = berth(&store, &["credentials", "remove", "prod-cluster"]);
        assert!(output.status.success());

        let output = berth(&store, &["credentials", "list"]);
        assert!(stdout(&output).contains("No credentials stored"));
    }

    #[test]
    fn test_remove_unknown() {
        let dir = TempDir::new().unwrap();
        let output = berth(
            &dir.path().join("credentials.yaml"),
            &["credentials", "remove", "nope"],
        );

        assert_eq!(output.status.code(), Some(64));
    }
}
