// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Podgate Control CLI
//!
//! CLI tool for submitting workloads to podgate-gateway.
//!
//! Usage:
//!   podgate-ctl <command> [options]
//!
//! Commands:
//!   health                        Check gateway health
//!   hello <name>                  Round-trip a greeting
//!   create --file <path> [--namespace <ns>] [--token <token>] [--timeout-ms <ms>]

use podgate_sdk::{CreateWorkloadOptions, GatewaySdk, SdkConfig};
use std::io::Read;
use std::process::ExitCode;
use std::time::Duration;

fn print_usage() {
    eprintln!(
        r#"Usage: podgate-ctl <command> [options]

Submit workloads to podgate-gateway.

COMMANDS:
    health                          Check gateway health
    hello <name>                    Round-trip a greeting
    create                          Submit a workload document

CREATE OPTIONS:
    --file <path>                   Workload document, YAML or JSON (required, "-" for stdin)
    --namespace <ns>                Target namespace
    --token <token>                 Idempotency token
    --timeout-ms <ms>               Per-call control-plane timeout

ENVIRONMENT:
    PODGATE_RPC_ADDR                Gateway address (default: 127.0.0.1:3000)
    PODGATE_SKIP_CERT_VERIFICATION  Skip TLS verification (default: false)
    PODGATE_CA_CERT_FILE            Extra PEM certificates to trust for the gateway

EXAMPLES:
    # Check health
    podgate-ctl health

    # Submit a pod, safe to retry with the same token
    podgate-ctl create --file pod.yaml --namespace default --token deploy-42
"#
    );
}

#[derive(Debug)]
enum Command {
    Health,
    Hello {
        name: String,
    },
    Create {
        file: String,
        namespace: Option<String>,
        token: Option<String>,
        timeout_ms: Option<u64>,
    },
}

fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from_vec(&args)
}

fn parse_args_from_vec(args: &[String]) -> Result<Command, String> {
    if args.len() < 2 {
        return Err("No command specified".to_string());
    }

    match args[1].as_str() {
        "help" | "--help" | "-h" => {
            print_usage();
            std::process::exit(0);
        }
        "health" => Ok(Command::Health),
        "hello" => {
            let name = args.get(2).ok_or("Name required")?.clone();
            Ok(Command::Hello { name })
        }
        "create" => {
            let mut file: Option<String> = None;
            let mut namespace: Option<String> = None;
            let mut token: Option<String> = None;
            let mut timeout_ms: Option<u64> = None;

            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "--file" | "-f" => {
                        i += 1;
                        file = Some(args.get(i).ok_or("--file requires a path")?.clone());
                    }
                    "--namespace" | "-n" => {
                        i += 1;
                        namespace =
                            Some(args.get(i).ok_or("--namespace requires a value")?.clone());
                    }
                    "--token" => {
                        i += 1;
                        token = Some(args.get(i).ok_or("--token requires a value")?.clone());
                    }
                    "--timeout-ms" => {
                        i += 1;
                        let ms: u64 = args
                            .get(i)
                            .ok_or("--timeout-ms requires a number")?
                            .parse()
                            .map_err(|_| "Invalid timeout")?;
                        if ms == 0 {
                            return Err("Invalid timeout".to_string());
                        }
                        timeout_ms = Some(ms);
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            Ok(Command::Create {
                file: file.ok_or("--file is required")?,
                namespace,
                token,
                timeout_ms,
            })
        }
        cmd => Err(format!("Unknown command: {}", cmd)),
    }
}

fn read_document(path: &str) -> Result<String, String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("Failed to read stdin: {}", e))?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path, e))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cmd = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let config = match SdkConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let sdk = match GatewaySdk::new(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to create SDK: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = sdk.connect().await {
        eprintln!("Failed to connect to gateway: {}", e);
        return ExitCode::FAILURE;
    }

    let result = execute_command(&sdk, cmd).await;
    sdk.close().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute_command(sdk: &GatewaySdk, cmd: Command) -> Result<(), String> {
    match cmd {
        Command::Health => {
            let health = sdk.health_check().await.map_err(|e| e.to_string())?;
            println!(
                "{}",
                serde_json::to_string_pretty(&health).map_err(|e| e.to_string())?
            );
        }

        Command::Hello { name } => {
            let message = sdk.hello(&name).await.map_err(|e| e.to_string())?;
            println!("{}", message);
        }

        Command::Create {
            file,
            namespace,
            token,
            timeout_ms,
        } => {
            let document = read_document(&file)?;

            let mut options = CreateWorkloadOptions::new(document);
            if let Some(ns) = namespace {
                options = options.with_namespace(ns);
            }
            if let Some(token) = token {
                options = options.with_idempotency_token(token);
            }
            if let Some(ms) = timeout_ms {
                options = options.with_timeout(Duration::from_millis(ms));
            }

            let outcome = sdk
                .create_workload(options)
                .await
                .map_err(|e| e.to_string())?;

            println!(
                "{}",
                serde_json::to_string_pretty(&outcome).map_err(|e| e.to_string())?
            );

            if !outcome.success {
                return Err(outcome
                    .error_message
                    .unwrap_or_else(|| format!("{:?}", outcome.outcome)));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(a: &[&str]) -> Vec<String> {
        a.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_no_command() {
        let result = parse_args_from_vec(&args(&["podgate-ctl"]));
        assert_eq!(result.unwrap_err(), "No command specified");
    }

    #[test]
    fn test_parse_unknown_command() {
        let result = parse_args_from_vec(&args(&["podgate-ctl", "deploy"]));
        assert!(result.unwrap_err().contains("Unknown command"));
    }

    #[test]
    fn test_parse_health() {
        let result = parse_args_from_vec(&args(&["podgate-ctl", "health"]));
        assert!(matches!(result.unwrap(), Command::Health));
    }

    #[test]
    fn test_parse_hello() {
        match parse_args_from_vec(&args(&["podgate-ctl", "hello", "ops"])).unwrap() {
            Command::Hello { name } => assert_eq!(name, "ops"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse_args_from_vec(&args(&["podgate-ctl", "hello"])).is_err());
    }

    #[test]
    fn test_parse_create_minimal() {
        let cmd = parse_args_from_vec(&args(&["podgate-ctl", "create", "--file", "pod.yaml"]));
        match cmd.unwrap() {
            Command::Create {
                file,
                namespace,
                token,
                timeout_ms,
            } => {
                assert_eq!(file, "pod.yaml");
                assert!(namespace.is_none());
                assert!(token.is_none());
                assert!(timeout_ms.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_create_full() {
        let cmd = parse_args_from_vec(&args(&[
            "podgate-ctl",
            "create",
            "-f",
            "-",
            "-n",
            "staging",
            "--token",
            "deploy-42",
            "--timeout-ms",
            "2500",
        ]));
        match cmd.unwrap() {
            Command::Create {
                file,
                namespace,
                token,
                timeout_ms,
            } => {
                assert_eq!(file, "-");
                assert_eq!(namespace.as_deref(), Some("staging"));
                assert_eq!(token.as_deref(), Some("deploy-42"));
                assert_eq!(timeout_ms, Some(2500));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_create_missing_file() {
        let result = parse_args_from_vec(&args(&["podgate-ctl", "create", "-n", "default"]));
        assert!(result.unwrap_err().contains("--file is required"));

        let result = parse_args_from_vec(&args(&["podgate-ctl", "create", "--file"]));
        assert!(result.unwrap_err().contains("--file requires a path"));
    }

    #[test]
    fn test_parse_create_invalid_timeout() {
        for bad in ["soon", "0", "-1"] {
            let result = parse_args_from_vec(&args(&[
                "podgate-ctl",
                "create",
                "--file",
                "pod.yaml",
                "--timeout-ms",
                bad,
            ]));
            assert_eq!(result.unwrap_err(), "Invalid timeout", "{}", bad);
        }
    }

    #[test]
    fn test_parse_create_unknown_arg() {
        let result = parse_args_from_vec(&args(&[
            "podgate-ctl",
            "create",
            "--file",
            "pod.yaml",
            "--dry-run",
        ]));
        assert!(result.unwrap_err().contains("Unknown argument: --dry-run"));
    }

    #[test]
    fn test_read_document_missing_file() {
        let err = read_document("/nonexistent/pod.yaml").unwrap_err();
        assert!(err.contains("Failed to read /nonexistent/pod.yaml"));
    }
}
