// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! AuditBench CLI entry point.

use clap::Parser;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = auditbench_cli::Cli::parse();
    auditbench_cli::init_tracing(cli.log_format);

    if let Err(e) = auditbench_cli::run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
